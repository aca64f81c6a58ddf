use std::{
    io::{self, IsTerminal},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use ctxproxy_core::{
    config::AppConfig,
    diagnostics::{build_env_filter, FACILITY_SELECTOR_ENV},
};
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

mod commands;
use commands::{
    handle_config_command, handle_rpc_command,
    utils::{print_error, CliError, CliResult},
    ConfigCommands, Mode, RpcBackend, RpcCommands,
};

#[derive(Parser)]
#[command(name = "ctxproxy")]
#[command(about = "RPC client for a node, answering block-context queries from a local replica")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Node RPC endpoint, overriding `node.endpoint`
    #[arg(short = 'E', long, global = true, env = "CTXPROXY_ENDPOINT")]
    endpoint: Option<String>,

    /// Client mode
    #[arg(short, long, global = true, value_enum, default_value_t = Mode::Proxy)]
    mode: Mode,

    /// Path to config file
    #[arg(short, long, global = true, env = "CTXPROXY_CONFIG", default_value = "config/config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an RPC of the node
    #[command(subcommand)]
    Rpc(RpcCommands),

    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Compact log lines without timestamps, colored only when `ansi` is set.
///
/// Facility lines come out as `<LEVEL> <facility>: <message>`, which scripts grep for.
fn log_layer<W>(writer: W, ansi: bool) -> impl Layer<Layered<EnvFilter, Registry>> + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .compact()
        .without_time()
        .with_target(true)
}

/// Logs compactly to stderr so stdout stays parseable.
///
/// Facility lines (`proxy_rpc`, `proxy_rpc_ctxt`) are off unless enabled through
/// `CTXPROXY_LOG`, e.g. `CTXPROXY_LOG="proxy_rpc_ctxt->debug"`. Escape codes are only
/// written to a terminal.
fn init_logging() -> CliResult<()> {
    let base = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let selector = std::env::var(FACILITY_SELECTOR_ENV).ok();
    let filter = build_env_filter(&base, selector.as_deref())
        .map_err(|e| CliError::Config(format!("{FACILITY_SELECTOR_ENV}: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(log_layer(io::stderr, io::stderr().is_terminal()))
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> CliResult<AppConfig> {
    let mut config =
        AppConfig::from_file(&cli.config).map_err(|e| CliError::Config(e.to_string()))?;
    if let Some(endpoint) = &cli.endpoint {
        config.node.endpoint.clone_from(endpoint);
    }
    Ok(config)
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Rpc(rpc_command) => {
            config.validate().map_err(CliError::Config)?;
            let backend = RpcBackend::from_config(cli.mode, &config)?;
            handle_rpc_command(rpc_command, &backend).await
        }
        Commands::Config(config_command) => handle_config_command(config_command, &config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging() {
        print_error(&e.to_string());
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
