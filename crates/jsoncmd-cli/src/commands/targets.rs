//! `jsoncmd targets`: List registered targets and operations.

use jsoncmd_core::Dispatcher;

use super::print_json;

pub fn list(dispatcher: &Dispatcher) -> Result<(), String> {
    let targets = dispatcher.registry().describe();
    if targets.is_empty() {
        return Err("No targets registered".to_string());
    }
    print_json(&serde_json::json!({ "targets": targets }));
    Ok(())
}
