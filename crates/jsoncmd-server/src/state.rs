//! Shared application state for the axum server.

use std::sync::Arc;

use jsoncmd_core::{DispatchConfig, Dispatcher, TargetRegistry};

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub dispatcher: Dispatcher,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(registry: Arc<dyn TargetRegistry>, dispatch: DispatchConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry).with_config(dispatch),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TargetRegistry> {
        self.dispatcher.registry()
    }
}
