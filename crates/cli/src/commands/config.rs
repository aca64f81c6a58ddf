use clap::Subcommand;
use ctxproxy_core::{config::AppConfig, routing::Route};

use super::utils::{print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the effective configuration (file, then environment, then flags)
    Validate,

    /// Show the effective configuration and routing table
    Show,
}

pub fn handle_config_command(command: ConfigCommands, config: &AppConfig) -> CliResult<()> {
    match command {
        ConfigCommands::Validate => validate_config(config),
        ConfigCommands::Show => {
            show_config(config);
            Ok(())
        }
    }
}

fn validate_config(config: &AppConfig) -> CliResult<()> {
    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;
    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Node: {}", config.node.endpoint);
    println!("  Miss policy: {:?}", config.cache.miss_policy);
    println!("  Prefetch: {} subpaths", config.cache.prefetch.len());
    println!(
        "  Routing overrides: {} local, {} remote",
        config.routing.local.len(),
        config.routing.remote.len()
    );

    Ok(())
}

fn show_config(config: &AppConfig) {
    println!("[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);
    println!("  Max Concurrent Requests: {}", config.server.max_concurrent_requests);
    println!("  Request Timeout: {}s", config.server.request_timeout_seconds);

    println!("\n[Node]");
    println!("  Endpoint: {}", config.node.endpoint);
    println!("  Timeout: {}s", config.node.timeout_seconds);
    println!("  Concurrent Limit: {}", config.node.concurrent_limit);

    println!("\n[Cache]");
    println!("  Miss Policy: {:?}", config.cache.miss_policy);
    for subpath in &config.cache.prefetch {
        println!("  Prefetch: {subpath}");
    }

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);
    println!("  Facilities: {}", config.logging.facilities.as_deref().unwrap_or("-"));

    println!("\n[Routing]");
    match config.routing_table() {
        Ok(table) => {
            for rule in table.rules() {
                let route = match rule.route {
                    Route::Local => "local",
                    Route::RemoteOnly => "remote",
                };
                println!("  {route:<6} {}", rule.pattern.as_str());
            }
        }
        Err(e) => println!("  invalid: {e}"),
    }
}
