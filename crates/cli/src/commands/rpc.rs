use std::sync::Arc;

use clap::{Args, Subcommand, ValueEnum};
use ctxproxy_core::{
    config::AppConfig,
    proxy::{ProxyDispatcher, ProxyError},
    types::{RequestPath, Verb},
    upstream::{HttpDelegate, RemoteDelegate},
};
use serde_json::Value;

use super::utils::{CliError, CliResult};

/// How RPCs reach the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Every call is a plain HTTP round trip to the node.
    Client,
    /// Block-context calls are answered from a local replica.
    Proxy,
}

#[derive(Subcommand)]
pub enum RpcCommands {
    /// GET one or more paths, in order, sharing one replica
    Get {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// POST to a path
    Post(BodyArgs),

    /// PUT to a path
    Put(BodyArgs),

    /// PATCH a path
    Patch(BodyArgs),

    /// DELETE a path
    Delete(BodyArgs),
}

#[derive(Args)]
pub struct BodyArgs {
    pub path: String,

    /// JSON request body
    #[arg(short, long)]
    pub data: Option<String>,
}

/// Where `rpc` commands are sent.
pub enum RpcBackend {
    Client(Arc<HttpDelegate>),
    Proxy(ProxyDispatcher),
}

impl RpcBackend {
    /// Builds the backend for `mode` from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the node endpoint or routing overrides are unusable.
    pub fn from_config(mode: Mode, config: &AppConfig) -> CliResult<Self> {
        match mode {
            Mode::Client => {
                let delegate = HttpDelegate::new(
                    &config.node.endpoint,
                    config.node.http_client_config(),
                    config.node.timeout(),
                )
                .map_err(|e| CliError::Config(e.to_string()))?;
                Ok(Self::Client(Arc::new(delegate)))
            }
            Mode::Proxy => ProxyDispatcher::from_config(config)
                .map(Self::Proxy)
                .map_err(|e| CliError::Config(e.to_string())),
        }
    }

    pub async fn call(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ProxyError> {
        match self {
            Self::Client(delegate) => {
                let path = RequestPath::parse(path)?;
                Ok(delegate.call(verb, path.as_str(), body.as_ref()).await?)
            }
            Self::Proxy(dispatcher) => dispatcher.call(verb, path, body).await,
        }
    }
}

pub async fn handle_rpc_command(command: RpcCommands, backend: &RpcBackend) -> CliResult<()> {
    match command {
        RpcCommands::Get { paths } => {
            for path in &paths {
                let answer = backend.call(Verb::Get, path, None).await?;
                print_json(&answer)?;
            }
            Ok(())
        }
        RpcCommands::Post(args) => send_with_body(backend, Verb::Post, args).await,
        RpcCommands::Put(args) => send_with_body(backend, Verb::Put, args).await,
        RpcCommands::Patch(args) => send_with_body(backend, Verb::Patch, args).await,
        RpcCommands::Delete(args) => send_with_body(backend, Verb::Delete, args).await,
    }
}

async fn send_with_body(backend: &RpcBackend, verb: Verb, args: BodyArgs) -> CliResult<()> {
    let body = args.data.as_deref().map(parse_body).transpose()?;
    let answer = backend.call(verb, &args.path, body).await?;
    print_json(&answer)
}

fn parse_body(data: &str) -> CliResult<Value> {
    serde_json::from_str(data).map_err(|e| CliError::Usage(format!("--data is not JSON: {e}")))
}

fn print_json(value: &Value) -> CliResult<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| CliError::Io(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}
