//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses the
//! jsoncmd-core dispatcher and the jsoncmd-server registry/bootstrap.

pub mod call;
pub mod server;
pub mod targets;

use std::sync::Arc;

use jsoncmd_core::{DispatchConfig, Dispatcher};

/// Load the dispatch configuration, falling back to defaults when no file is given.
pub fn load_dispatch_config(path: Option<&str>) -> Result<DispatchConfig, String> {
    match path {
        Some(path) => {
            let config = DispatchConfig::from_file(path)?;
            tracing::info!("[Config] Loaded dispatch configuration from '{}'", path);
            Ok(config)
        }
        None => Ok(DispatchConfig::default()),
    }
}

/// Build an in-process dispatcher over the built-in controllers.
///
/// This mirrors `jsoncmd_server::create_app_state` without binding a port.
pub fn init_dispatcher(config: DispatchConfig) -> Result<Dispatcher, String> {
    let registry = jsoncmd_server::controllers::default_registry()
        .map_err(|e| format!("Failed to register built-in controllers: {}", e))?;
    Ok(Dispatcher::new(Arc::new(registry)).with_config(config))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
