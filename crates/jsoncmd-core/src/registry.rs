//! Targets, their operation tables, and the registry that resolves them by name.
//!
//! A target type is described once, at startup, by a `TargetType` built from
//! typed handlers:
//!
//! ```ignore
//! let greeter = TargetType::builder::<Greeter>("Greeter")
//!     .operation("sayHello", 1, |g, args| async move {
//!         let name: String = args.get(0)?;
//!         Ok(g.greet(&name))
//!     })
//!     .build()?;
//!
//! let registry = StaticRegistry::new();
//! registry.register("Greeter", Arc::new(Greeter::default()), greeter)?;
//! ```
//!
//! Handlers are erased to a common signature so the dispatcher never needs to
//! know the concrete target type.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OperationError, RegistrationError, RegistryError};

pub type TargetInstance = Arc<dyn Any + Send + Sync>;

pub type OperationFuture = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

/// Returns `None` when the instance is not of the handler's target type.
type ErasedHandler = Arc<dyn Fn(TargetInstance, Arguments) -> Option<OperationFuture> + Send + Sync>;

// ---------------------------------------------------------------------------
// Operation metadata
// ---------------------------------------------------------------------------

/// Per-operation access and response-handling flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPolicy {
    /// When false the operation exists but may not be called over the wire.
    pub allowed: bool,
    /// When true the operation writes its own response through the request
    /// context and the envelope step is skipped.
    pub self_handling: bool,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            allowed: true,
            self_handling: false,
        }
    }
}

impl OperationPolicy {
    pub const fn disallowed() -> Self {
        Self {
            allowed: false,
            self_handling: false,
        }
    }

    pub const fn self_handling() -> Self {
        Self {
            allowed: true,
            self_handling: true,
        }
    }
}

/// A single callable operation on a target type.
pub struct OperationSpec {
    name: String,
    arity: usize,
    policy: OperationPolicy,
    handler: ErasedHandler,
}

impl OperationSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn policy(&self) -> OperationPolicy {
        self.policy
    }

    pub(crate) fn call(&self, instance: TargetInstance, args: Arguments) -> Option<OperationFuture> {
        (self.handler)(instance, args)
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Decoded positional arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Vec<Value>);

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The undecoded JSON value at `index`.
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Deserialize the argument at `index` into `D`.
    pub fn get<D: DeserializeOwned>(&self, index: usize) -> Result<D, OperationError> {
        let value = self
            .0
            .get(index)
            .ok_or_else(|| OperationError::invalid_argument(index, "missing"))?;
        D::deserialize(value).map_err(|e| OperationError::invalid_argument(index, e))
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Target types
// ---------------------------------------------------------------------------

/// The operation table of one concrete target type.
#[derive(Debug)]
pub struct TargetType {
    type_name: String,
    instance_type: TypeId,
    controller: bool,
    operations: Vec<Arc<OperationSpec>>,
}

impl TargetType {
    pub fn builder<T: Send + Sync + 'static>(type_name: impl Into<String>) -> TargetTypeBuilder<T> {
        TargetTypeBuilder {
            type_name: type_name.into(),
            controller: true,
            operations: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the type carries the controller marker (dispatch-eligible).
    pub fn is_controller(&self) -> bool {
        self.controller
    }

    pub fn operations(&self) -> &[Arc<OperationSpec>] {
        &self.operations
    }

    /// Scan for an operation by name and arity. First registered match wins;
    /// `build()` guarantees there is at most one.
    pub fn find_operation(&self, name: &str, arity: usize) -> Option<&Arc<OperationSpec>> {
        self.operations
            .iter()
            .find(|op| op.arity == arity && op.name == name)
    }

    fn describe(&self, name: &str) -> TargetDescription {
        TargetDescription {
            name: name.to_string(),
            type_name: self.type_name.clone(),
            controller: self.controller,
            operations: self
                .operations
                .iter()
                .map(|op| OperationDescription {
                    name: op.name.clone(),
                    arity: op.arity,
                    allowed: op.policy.allowed,
                    self_handling: op.policy.self_handling,
                })
                .collect(),
        }
    }
}

pub struct TargetTypeBuilder<T> {
    type_name: String,
    controller: bool,
    operations: Vec<OperationSpec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TargetTypeBuilder<T> {
    /// Register the type without the controller marker. The router refuses
    /// to dispatch to such targets.
    pub fn not_controller(mut self) -> Self {
        self.controller = false;
        self
    }

    /// Register an operation with the default policy.
    pub fn operation<F, Fut, R>(self, name: &str, arity: usize, handler: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.operation_with(name, arity, OperationPolicy::default(), handler)
    }

    pub fn operation_with<F, Fut, R>(
        mut self,
        name: &str,
        arity: usize,
        policy: OperationPolicy,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
        R: Serialize + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |instance: TargetInstance, args: Arguments| {
            let target = instance.downcast::<T>().ok()?;
            let handler = Arc::clone(&handler);
            let fut: OperationFuture = Box::pin(async move {
                let out = handler.as_ref()(target, args).await?;
                serde_json::to_value(out).map_err(OperationError::from)
            });
            Some(fut)
        });

        self.operations.push(OperationSpec {
            name: name.to_string(),
            arity,
            policy,
            handler: erased,
        });
        self
    }

    /// Finish the type. Fails on an empty operation name or on two
    /// operations sharing a name and arity.
    pub fn build(self) -> Result<Arc<TargetType>, RegistrationError> {
        let mut seen = HashSet::new();
        for op in &self.operations {
            if op.name.trim().is_empty() {
                return Err(RegistrationError::EmptyOperationName(self.type_name.clone()));
            }
            if !seen.insert((op.name.as_str(), op.arity)) {
                return Err(RegistrationError::DuplicateOperation {
                    type_name: self.type_name.clone(),
                    operation: op.name.clone(),
                    arity: op.arity,
                });
            }
        }
        Ok(Arc::new(TargetType {
            type_name: self.type_name,
            instance_type: TypeId::of::<T>(),
            controller: self.controller,
            operations: self.operations.into_iter().map(Arc::new).collect(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Targets and the registry
// ---------------------------------------------------------------------------

/// A named instance paired with its operation table.
#[derive(Clone)]
pub struct Target {
    name: String,
    instance: TargetInstance,
    target_type: Arc<TargetType>,
}

impl Target {
    /// Pair an instance with its type. Fails when `T` is not the type the
    /// operation table was built for.
    pub fn new<T: Send + Sync + 'static>(
        name: impl Into<String>,
        instance: Arc<T>,
        target_type: Arc<TargetType>,
    ) -> Result<Self, RegistrationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistrationError::EmptyTargetName);
        }
        if target_type.instance_type != TypeId::of::<T>() {
            return Err(RegistrationError::InstanceTypeMismatch {
                target: name,
                expected: target_type.type_name.clone(),
            });
        }
        Ok(Self {
            name,
            instance,
            target_type,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &TargetInstance {
        &self.instance
    }

    pub fn target_type(&self) -> &Arc<TargetType> {
        &self.target_type
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("type", &self.target_type.type_name)
            .finish_non_exhaustive()
    }
}

/// Serializable view of one registered target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescription {
    pub name: String,
    pub type_name: String,
    pub controller: bool,
    pub operations: Vec<OperationDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescription {
    pub name: String,
    pub arity: usize,
    pub allowed: bool,
    pub self_handling: bool,
}

/// Resolves target names to callable targets.
pub trait TargetRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Target, RegistryError>;

    /// Whether the router may dispatch to targets of this type.
    fn is_dispatch_eligible(&self, target_type: &TargetType) -> bool {
        target_type.is_controller()
    }

    /// Every registered target, for discovery endpoints.
    fn describe(&self) -> Vec<TargetDescription> {
        Vec::new()
    }
}

/// In-memory registry populated at startup.
#[derive(Default)]
pub struct StaticRegistry {
    targets: RwLock<HashMap<String, Target>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under `name`, replacing any previous target of
    /// that name.
    pub fn register<T: Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Arc<T>,
        target_type: Arc<TargetType>,
    ) -> Result<(), RegistrationError> {
        let target = Target::new(name, instance, target_type)?;
        self.insert(target);
        Ok(())
    }

    pub fn insert(&self, target: Target) {
        let name = target.name.clone();
        if let Ok(mut targets) = self.targets.write() {
            if targets.insert(name.clone(), target).is_some() {
                tracing::warn!("[Registry] Replaced existing target '{}'", name);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .targets
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.targets.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TargetRegistry for StaticRegistry {
    fn resolve(&self, name: &str) -> Result<Target, RegistryError> {
        self.targets
            .read()
            .ok()
            .and_then(|t| t.get(name).cloned())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn describe(&self) -> Vec<TargetDescription> {
        let mut out: Vec<TargetDescription> = self
            .targets
            .read()
            .map(|t| {
                t.values()
                    .map(|target| target.target_type.describe(&target.name))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
