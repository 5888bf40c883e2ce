//! Built-in controllers registered by every server.
//!
//! `System` gives callers a cheap way to check the command endpoint itself
//! (as opposed to `/api/health`, which never touches the dispatcher).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsoncmd_core::{OperationError, RegistrationError, StaticRegistry, TargetType};
use serde_json::Value;

pub const SYSTEM_TARGET: &str = "System";

#[derive(Debug, Default)]
pub struct SystemController;

impl SystemController {
    pub fn ping(&self) -> &'static str {
        "pong"
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Current Unix time in milliseconds.
    pub fn time(&self) -> Result<u64, OperationError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(OperationError::from_error)?;
        Ok(since_epoch.as_millis() as u64)
    }

    pub fn echo(&self, value: Value) -> Value {
        value
    }

    pub fn target_type() -> Result<Arc<TargetType>, RegistrationError> {
        TargetType::builder::<SystemController>("SystemController")
            .operation("ping", 0, |s, _args| async move { Ok(s.ping()) })
            .operation("version", 0, |s, _args| async move { Ok(s.version()) })
            .operation("time", 0, |s, _args| async move { s.time() })
            .operation("echo", 1, |s, args| async move {
                let value: Value = args.get(0)?;
                Ok(s.echo(value))
            })
            .build()
    }
}

/// A registry holding only the built-in controllers.
pub fn default_registry() -> Result<StaticRegistry, RegistrationError> {
    let registry = StaticRegistry::new();
    register_builtins(&registry)?;
    Ok(registry)
}

pub fn register_builtins(registry: &StaticRegistry) -> Result<(), RegistrationError> {
    registry.register(
        SYSTEM_TARGET,
        Arc::new(SystemController),
        SystemController::target_type()?,
    )
}
