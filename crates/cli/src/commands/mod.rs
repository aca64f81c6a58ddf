pub mod config;
pub mod rpc;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use rpc::{handle_rpc_command, Mode, RpcBackend, RpcCommands};
