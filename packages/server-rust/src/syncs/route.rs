//! Route synchronizations: bind a mediated request path to a handler and
//! resolve the pending request with whatever the handler produces.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use mediator_core::{ActionPattern, Document, Frames, Term};
use serde_json::Value;
use tracing::{error, warn};

use crate::engine::{SyncContext, SyncRule};
use crate::requesting::REQUESTING;
use crate::service::operation::{UnitError, GENERIC_INTERNAL_ERROR};

/// Builds the rule serving `path` (e.g. `"/Following/follow"`).
///
/// The rule matches `Requesting/request` actions for `path`, calls `handler`
/// once per match with the request body (minus `path`), and invokes
/// `Requesting/respond` with the handler's object result merged in, or with
/// `{error}` when the handler fails or panics. Every match is answered; a
/// failing handler never affects the other matches of the same pass.
pub fn route_sync<F, Fut>(path: &'static str, handler: F) -> SyncRule
where
    F: Fn(SyncContext, Document) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, UnitError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    SyncRule::new(format!("route {path}"))
        .when(
            ActionPattern::new(REQUESTING, "request")
                .input("path", Term::lit(path))
                .input("input", Term::var("input"))
                .output("request", Term::var("request")),
        )
        .compute(move |ctx: SyncContext, frames: Frames| {
            let handler = Arc::clone(&handler);
            async move {
                for frame in frames {
                    let Some(request) = frame.get_str("request").map(str::to_string) else {
                        error!(path, "missing request identifier");
                        continue;
                    };
                    let mut body = match frame.get("input") {
                        Some(Value::Object(doc)) => doc.clone(),
                        _ => Document::new(),
                    };
                    body.remove("path");

                    let outcome = AssertUnwindSafe(handler(ctx.clone(), body)).catch_unwind().await;
                    let mut response = match outcome {
                        Ok(Ok(Value::Object(doc))) => doc,
                        Ok(Ok(_)) => Document::new(),
                        Ok(Err(e)) => {
                            warn!(path, request = %request, error = %e, "route handler failed");
                            error_document(e.public_message())
                        }
                        Err(_) => {
                            error!(path, request = %request, "route handler panicked");
                            error_document(GENERIC_INTERNAL_ERROR.to_string())
                        }
                    };
                    response.insert("request".to_string(), Value::String(request.clone()));
                    if let Err(e) = ctx.invoke(REQUESTING, "respond", Value::Object(response)).await {
                        error!(path, request = %request, error = %e, "could not resolve request");
                    }
                }
                Ok::<_, anyhow::Error>(Frames::new())
            }
        })
}

fn error_document(message: String) -> Document {
    let mut doc = Document::new();
    doc.insert("error".to_string(), Value::String(message));
    doc
}
