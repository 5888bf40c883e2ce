//! Operation lookup with a process-lifetime cache.
//!
//! Keys are `target.operation.argc`. Entries are inserted on the first
//! successful resolution and never removed: operation tables are fixed once
//! the registry is built, so the cache only grows to the number of distinct
//! signatures actually called. If a target name is later re-registered with a
//! different type, calls keep hitting the old entry; re-registration is a
//! startup-time concern.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::DispatchError;
use crate::registry::{OperationPolicy, OperationSpec, TargetType};

/// A resolved, cacheable operation handle.
#[derive(Debug)]
pub struct ResolvedOperation {
    key: String,
    spec: Arc<OperationSpec>,
}

impl ResolvedOperation {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn policy(&self) -> OperationPolicy {
        self.spec.policy()
    }

    pub fn is_self_handling(&self) -> bool {
        self.spec.policy().self_handling
    }

    pub(crate) fn spec(&self) -> &OperationSpec {
        &self.spec
    }
}

pub fn operation_key(target: &str, operation: &str, arg_count: usize) -> String {
    format!("{}.{}.{}", target, operation, arg_count)
}

#[derive(Debug, Default)]
pub struct OperationResolver {
    cache: RwLock<HashMap<String, Arc<ResolvedOperation>>>,
    scans: AtomicU64,
}

impl OperationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `operation` with `arg_count` arguments on a target registered
    /// as `target_name`.
    ///
    /// Disallowed operations are reported as `MethodNotAllowed` and are not
    /// cached, so the policy is re-checked on every call.
    pub fn resolve(
        &self,
        target_name: &str,
        target_type: &TargetType,
        operation: &str,
        arg_count: usize,
    ) -> Result<Arc<ResolvedOperation>, DispatchError> {
        let key = operation_key(target_name, operation, arg_count);

        if let Some(hit) = self.cache.read().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let spec = match target_type.find_operation(operation, arg_count) {
            Some(spec) => Arc::clone(spec),
            None => {
                tracing::warn!("[Resolver] Method not found: {}", key);
                return Err(DispatchError::MethodNotFound { key });
            }
        };

        if !spec.policy().allowed {
            tracing::info!(
                "[Resolver] Method '{}' on '{}' is not allowed via HTTP",
                operation,
                target_name
            );
            return Err(DispatchError::MethodNotAllowed {
                operation: operation.to_string(),
            });
        }

        let resolved = Arc::new(ResolvedOperation {
            key: key.clone(),
            spec,
        });

        // Concurrent misses on the same key may both scan; the first insert
        // is kept and handed to every caller.
        match self.cache.write() {
            Ok(mut cache) => Ok(Arc::clone(cache.entry(key).or_insert(resolved))),
            Err(_) => Ok(resolved),
        }
    }

    /// Number of cache misses that scanned a target type.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}
