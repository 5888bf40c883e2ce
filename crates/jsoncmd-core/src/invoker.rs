//! Runs a resolved operation against its target.
//!
//! Each call is spawned as its own task with the request context installed, so
//! a panicking operation is contained and reported like any other operation
//! failure. Only failures of the mechanism itself (a target whose instance does
//! not match its operation table, a cancelled task) escape as `InvokeError`.

use std::any::Any;
use std::error::Error as StdError;

use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{InvokeError, OperationError};
use crate::registry::{Arguments, Target};
use crate::resolver::ResolvedOperation;

/// Outcome of an invocation that reached the operation body.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The operation's return value, or the failure text when `succeeded` is false.
    pub result: Value,
    pub succeeded: bool,
}

impl Invocation {
    pub fn success(result: Value) -> Self {
        Self {
            result,
            succeeded: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            result: Value::String(message.into()),
            succeeded: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Invoker;

impl Invoker {
    pub fn new() -> Self {
        Self
    }

    pub async fn invoke(
        &self,
        operation: &ResolvedOperation,
        target: &Target,
        args: Arguments,
        context: RequestContext,
    ) -> Result<Invocation, InvokeError> {
        let spec = operation.spec();
        let fut = spec
            .call(target.instance().clone(), args)
            .ok_or_else(|| InvokeError::TargetMismatch {
                target: target.name().to_string(),
                expected: "its registered type",
            })?;

        let outcome = match tokio::spawn(context.scope(fut)).await {
            Ok(outcome) => outcome,
            Err(join_err) if join_err.is_panic() => {
                Err(OperationError::panic(panic_message(join_err.into_panic())))
            }
            Err(_) => {
                return Err(InvokeError::Cancelled {
                    operation: spec.name().to_string(),
                });
            }
        };

        match outcome {
            Ok(value) => Ok(Invocation::success(value)),
            Err(err) => {
                tracing::warn!(
                    "[Invoker] An error occurred calling '{}.{}': {}",
                    target.name(),
                    spec.name(),
                    error_chain(&err)
                );
                Ok(Invocation::failure(format!(
                    "error: '{}' failed with the following error: {}",
                    spec.name(),
                    err
                )))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}

fn error_chain(err: &OperationError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RawResponse, RequestHead, RequestMethod, ResponseSlot};
    use crate::registry::{OperationPolicy, TargetType};
    use crate::resolver::OperationResolver;
    use serde_json::json;
    use std::sync::Arc;

    struct Calc;
    struct Impostor;

    fn calc_type() -> Arc<TargetType> {
        TargetType::builder::<Calc>("Calc")
            .operation("div", 2, |_c, args| async move {
                let a: i64 = args.get(0)?;
                let b: i64 = args.get(1)?;
                if b == 0 {
                    return Err(OperationError::with_kind("ArithmeticError", "/ by zero"));
                }
                Ok(a / b)
            })
            .operation("boom", 0, |_c, _a| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            })
            .operation_with(
                "export",
                0,
                OperationPolicy::self_handling(),
                |_c, _a| async move {
                    let cx = RequestContext::current().ok_or("no request context")?;
                    cx.response()
                        .write(RawResponse::new(200).body(cx.request().path.clone()));
                    Ok(())
                },
            )
            .build()
            .unwrap()
    }

    fn context() -> (RequestContext, ResponseSlot) {
        let slot = ResponseSlot::new();
        let cx = RequestContext::new(
            Arc::new(RequestHead::new(RequestMethod::Post, "/Calc/export")),
            slot.clone(),
        );
        (cx, slot)
    }

    async fn call(name: &str, args: Vec<Value>) -> (Invocation, ResponseSlot) {
        let ty = calc_type();
        let target = Target::new("Calc", Arc::new(Calc), ty.clone()).unwrap();
        let resolved = OperationResolver::new()
            .resolve("Calc", &ty, name, args.len())
            .unwrap();
        let (cx, slot) = context();
        let out = Invoker::new()
            .invoke(&resolved, &target, Arguments::new(args), cx)
            .await
            .unwrap();
        (out, slot)
    }

    // ── Test 1 ──
    #[tokio::test]
    async fn success_returns_value() {
        let (out, _) = call("div", vec![json!(9), json!(3)]).await;
        assert_eq!(out, Invocation::success(json!(3)));
    }

    // ── Test 2 ──
    #[tokio::test]
    async fn operation_error_becomes_failure_text() {
        let (out, _) = call("div", vec![json!(1), json!(0)]).await;
        assert!(!out.succeeded);
        assert_eq!(
            out.result,
            json!("error: 'div' failed with the following error: ArithmeticError / by zero")
        );
    }

    // ── Test 3 ──
    #[tokio::test]
    async fn panic_is_contained() {
        let (out, _) = call("boom", vec![]).await;
        assert!(!out.succeeded);
        assert_eq!(
            out.result,
            json!("error: 'boom' failed with the following error: panic kaboom")
        );
        assert!(RequestContext::current().is_none());
    }

    // ── Test 4 ──
    #[tokio::test]
    async fn self_handling_operation_sees_context() {
        let (out, slot) = call("export", vec![]).await;
        assert!(out.succeeded);
        assert_eq!(slot.take().unwrap().body, b"/Calc/export");
    }

    // ── Test 5 ──
    #[tokio::test]
    async fn mismatched_instance_is_mechanism_failure() {
        let ty = calc_type();
        let resolved = OperationResolver::new()
            .resolve("Calc", &ty, "div", 2)
            .unwrap();
        // Build a target whose instance does not match the table.
        let impostor_type = TargetType::builder::<Impostor>("Impostor")
            .operation("div", 2, |_i, _a| async move { Ok(0) })
            .build()
            .unwrap();
        let target = Target::new("Calc", Arc::new(Impostor), impostor_type).unwrap();
        let (cx, _) = context();
        let err = Invoker::new()
            .invoke(&resolved, &target, Arguments::default(), cx)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::TargetMismatch { .. }));
    }
}
