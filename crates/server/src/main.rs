use anyhow::Result;
use axum::serve;
use ctxproxy_core::{
    config::{AppConfig, LoggingConfig},
    diagnostics::{build_env_filter, TraceBuffer, TraceBufferLayer, FACILITY_SELECTOR_ENV},
    proxy::ProxyDispatcher,
};
use server::router::{self, AppState, RouterLimits};
use std::{
    io::{self, IsTerminal},
    sync::Arc,
};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type LogSubscriber = Layered<TraceBufferLayer, Layered<EnvFilter, Registry>>;

/// Output layer for `format` (`json`, `compact`, anything else is pretty).
///
/// Escape codes are written only when `ansi` is set, so facility lines stay greppable
/// once stdout is redirected.
fn output_layer<W>(format: &str, writer: W, ansi: bool) -> Box<dyn Layer<LogSubscriber> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        "json" => tracing_subscriber::fmt::layer().json().with_writer(writer).boxed(),
        "compact" => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        // Targets stay visible: they carry the facility name.
        _ => tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// Initializes logging.
///
/// `RUST_LOG` replaces the configured base level. The facility selector (`CTXPROXY_LOG`,
/// falling back to `logging.facilities`) adds the trace facilities on top, and every
/// facility line is also captured into `trace_buffer` for `/debug/traces`.
fn init_logging(config: &LoggingConfig, trace_buffer: Arc<TraceBuffer>) -> Result<()> {
    let base = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if config.level.contains(['=', ',']) {
            config.level.clone()
        } else {
            format!("warn,ctxproxy_core={0},server={0}", config.level)
        }
    });
    let selector = std::env::var(FACILITY_SELECTOR_ENV).ok().or_else(|| config.facilities.clone());
    let filter = build_env_filter(&base, selector.as_deref())?;

    tracing_subscriber::registry()
        .with(filter)
        .with(TraceBufferLayer::new(trace_buffer))
        .with(output_layer(&config.format, io::stdout, io::stdout().is_terminal()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    let trace_buffer = Arc::new(TraceBuffer::new(config.logging.trace_buffer_size));
    init_logging(&config.logging, Arc::clone(&trace_buffer))?;

    info!("Starting context proxy");
    debug!(
        node = %config.node.endpoint,
        miss_policy = ?config.cache.miss_policy,
        prefetch_count = config.cache.prefetch.len(),
        local_overrides = config.routing.local.len(),
        remote_overrides = config.routing.remote.len(),
        "Configuration loaded"
    );

    let dispatcher = Arc::new(ProxyDispatcher::from_config(&config)?);
    let app = router::create_app(AppState::new(dispatcher, trace_buffer), RouterLimits::from(&config));

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, node = %config.node.endpoint, "Context proxy listening");

    if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error occurred");
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(
                error = %e,
                "Failed to install Ctrl+C handler"
            );
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Failed to install signal handler"
                );

                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
