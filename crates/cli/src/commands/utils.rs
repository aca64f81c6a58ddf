use std::fmt;

use ctxproxy_core::proxy::ProxyError;

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Usage(String),
    Rpc(String),
    Io(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Usage(msg) => write!(f, "Invalid arguments: {msg}"),
            Self::Rpc(msg) => write!(f, "RPC failed: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<ProxyError> for CliError {
    fn from(error: ProxyError) -> Self {
        Self::Rpc(error.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

// stdout carries RPC answers only, so status lines go to stderr.

pub fn print_success(message: &str) {
    eprintln!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    eprintln!("[INFO] {message}");
}
