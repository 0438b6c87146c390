//! Operation descriptors and the errors unit operations report.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Message returned to callers for faults whose details must not leak.
pub const GENERIC_INTERNAL_ERROR: &str = "An internal server error occurred.";

/// Future returned by every operation handle.
pub type OperationFuture = BoxFuture<'static, Result<Value, UnitError>>;

/// Type-erased callable bound to its owning unit instance.
///
/// Receives the positional argument list produced by the argument adapter.
pub type OperationHandle = Arc<dyn Fn(Vec<Value>) -> OperationFuture + Send + Sync>;

/// Static metadata for one callable unit operation.
///
/// Built once at startup from a unit's registration table and owned by the
/// `UnitRegistry` from then on.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub unit_name: &'static str,
    pub operation_name: &'static str,
    /// Number of declared parameters.
    pub arity: usize,
    pub handle: OperationHandle,
}

impl OperationDescriptor {
    pub fn new<F, Fut>(
        unit_name: &'static str,
        operation_name: &'static str,
        arity: usize,
        handler: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, UnitError>> + Send + 'static,
    {
        Self {
            unit_name,
            operation_name,
            arity,
            handle: Arc::new(move |args: Vec<Value>| -> OperationFuture { handler(args).boxed() }),
        }
    }

    /// Binds a synchronous method of `unit` as an arity-1 operation whose
    /// single argument is decoded into `A`.
    pub fn method<U, A, F>(unit: &Arc<U>, unit_name: &'static str, operation_name: &'static str, method: F) -> Self
    where
        U: Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        F: Fn(&U, A) -> Result<Value, UnitError> + Send + Sync + 'static,
    {
        let unit = Arc::clone(unit);
        Self::new(unit_name, operation_name, 1, move |mut args: Vec<Value>| {
            let result = decode_arg::<A>(args.pop().unwrap_or(Value::Null)).and_then(|arg| method(&unit, arg));
            future::ready(result)
        })
    }

    /// Binds a synchronous method of `unit` that takes no arguments.
    pub fn query<U, F>(unit: &Arc<U>, unit_name: &'static str, operation_name: &'static str, query: F) -> Self
    where
        U: Send + Sync + 'static,
        F: Fn(&U) -> Result<Value, UnitError> + Send + Sync + 'static,
    {
        let unit = Arc::clone(unit);
        Self::new(unit_name, operation_name, 0, move |_args: Vec<Value>| future::ready(query(&unit)))
    }

    /// `"Unit/operation"`, the path suffix this operation is served under.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.unit_name, self.operation_name)
    }

    /// Invokes the operation with already-adapted arguments.
    pub fn call(&self, args: Vec<Value>) -> OperationFuture {
        (self.handle)(args)
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("unit_name", &self.unit_name)
            .field("operation_name", &self.operation_name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Errors returned by unit operations and by dispatch.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// The operation rejected its input (violated precondition, missing
    /// entity, malformed arguments). The message is shown to the caller.
    #[error("{0}")]
    Rejected(String),
    #[error("no operation {unit}/{operation}")]
    UnknownOperation { unit: String, operation: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl UnitError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Message safe to return to a network caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            UnitError::Rejected(msg) if !msg.is_empty() => msg.clone(),
            UnitError::Rejected(_) | UnitError::Internal(_) => GENERIC_INTERNAL_ERROR.to_string(),
            UnitError::UnknownOperation { .. } => self.to_string(),
        }
    }
}

/// Decodes a DTO-style argument into `T`.
///
/// # Errors
///
/// Returns [`UnitError::Rejected`] describing the first field serde could not
/// decode.
pub fn decode_arg<T: DeserializeOwned>(arg: Value) -> Result<T, UnitError> {
    serde_json::from_value(arg).map_err(|e| UnitError::Rejected(format!("Invalid arguments: {e}")))
}

/// Encodes an operation result as a JSON value.
///
/// # Errors
///
/// Returns [`UnitError::Internal`] if `value` cannot be represented as JSON.
pub fn encode_result<T: Serialize>(value: &T) -> Result<Value, UnitError> {
    serde_json::to_value(value).map_err(|e| UnitError::Internal(e.into()))
}
