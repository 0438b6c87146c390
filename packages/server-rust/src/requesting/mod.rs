//! Requesting mediator: correlates inbound network calls with the rule that
//! eventually answers them.
//!
//! `request` records a pending request under a fresh id and emits the action
//! route rules match on. `respond` resolves it exactly once; the network
//! handler suspended in [`RequestingUnit::await_response`] then receives the
//! response document. Resolved and expired ids are remembered for a while so
//! a second resolution is reported precisely instead of as an unknown id.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mediator_core::{ClockSource, Document};
use quick_cache::sync::Cache;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::service::operation::{decode_arg, OperationDescriptor, UnitError};
use crate::service::registry::{Unit, UnitDeps};
use crate::storage::fresh_id;

/// Unit name the mediator registers under.
pub const REQUESTING: &str = "Requesting";

/// Mediator faults. All of them indicate a caller or rule bug and are
/// surfaced, never ignored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestingError {
    #[error("unknown request `{0}`")]
    UnknownRequest(String),
    #[error("request `{0}` was already resolved")]
    AlreadyResolved(String),
    #[error("request `{0}` expired before it was resolved")]
    Expired(String),
    #[error("request `{request}` timed out after {after:?}")]
    Timeout { request: String, after: Duration },
}

impl From<RequestingError> for UnitError {
    fn from(e: RequestingError) -> Self {
        UnitError::Internal(anyhow::Error::new(e))
    }
}

/// Final state of a request that is no longer pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Resolved,
    Expired,
}

/// An in-flight network call awaiting resolution.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: String,
    pub path: String,
    pub input: Value,
    pub created_at: u64,
    responder: oneshot::Sender<Document>,
}

#[derive(Debug, Deserialize)]
struct RequestArgs {
    path: String,
    #[serde(default)]
    input: Value,
}

/// The Requesting mediator unit.
pub struct RequestingUnit {
    pending: DashMap<String, PendingRequest>,
    receivers: DashMap<String, oneshot::Receiver<Document>>,
    settled: Cache<String, Settled>,
    clock: Arc<dyn ClockSource>,
}

impl RequestingUnit {
    #[must_use]
    pub fn new(deps: &UnitDeps) -> Self {
        Self {
            pending: DashMap::new(),
            receivers: DashMap::new(),
            settled: Cache::new(deps.config.request_tombstones.max(1)),
            clock: Arc::clone(&deps.clock),
        }
    }

    /// Records a new pending request and returns its id.
    pub fn open(&self, path: &str, input: Value) -> String {
        let id = fresh_id();
        let (tx, rx) = oneshot::channel();
        self.receivers.insert(id.clone(), rx);
        self.pending.insert(
            id.clone(),
            PendingRequest {
                id: id.clone(),
                path: path.to_string(),
                input,
                created_at: self.clock.now(),
                responder: tx,
            },
        );
        debug!(request = %id, path, "request opened");
        id
    }

    /// Resolves `request` with `response`.
    ///
    /// # Errors
    ///
    /// [`RequestingError::AlreadyResolved`] or [`RequestingError::Expired`]
    /// for an id that is no longer pending, and
    /// [`RequestingError::UnknownRequest`] for one never seen (or forgotten).
    pub fn resolve(&self, request: &str, response: Document) -> Result<(), RequestingError> {
        let Some((_, pending)) = self.pending.remove(request) else {
            let err = match self.settled.get(request) {
                Some(Settled::Resolved) => RequestingError::AlreadyResolved(request.to_string()),
                Some(Settled::Expired) => RequestingError::Expired(request.to_string()),
                None => RequestingError::UnknownRequest(request.to_string()),
            };
            error!(request, error = %err, "rejected resolution");
            return Err(err);
        };
        self.settled.insert(request.to_string(), Settled::Resolved);
        if pending.responder.send(response).is_err() {
            debug!(request, "resolved request has no waiting caller");
        }
        Ok(())
    }

    /// Suspends until `request` is resolved or `timeout` elapses.
    ///
    /// On timeout the request is expired, so a later resolution fails with
    /// [`RequestingError::Expired`] instead of reaching a caller that is gone.
    ///
    /// # Errors
    ///
    /// [`RequestingError::Timeout`] when nothing resolved the request in time,
    /// [`RequestingError::UnknownRequest`] when the id has no waiter (never
    /// opened, or already awaited).
    pub async fn await_response(&self, request: &str, timeout: Duration) -> Result<Document, RequestingError> {
        let Some((_, mut rx)) = self.receivers.remove(request) else {
            return Err(RequestingError::UnknownRequest(request.to_string()));
        };

        if let Ok(outcome) = tokio::time::timeout(timeout, &mut rx).await {
            return outcome.map_err(|_| RequestingError::Expired(request.to_string()));
        }

        if self.pending.remove(request).is_some() {
            self.settled.insert(request.to_string(), Settled::Expired);
            warn!(request, ?timeout, "request timed out");
            return Err(RequestingError::Timeout {
                request: request.to_string(),
                after: timeout,
            });
        }
        // Resolved between the deadline and the expiry above.
        rx.try_recv().map_err(|_| RequestingError::Timeout {
            request: request.to_string(),
            after: timeout,
        })
    }

    /// Number of requests still awaiting resolution.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, request: &str) -> bool {
        self.pending.contains_key(request)
    }
}

impl Unit for RequestingUnit {
    fn name(&self) -> &'static str {
        REQUESTING
    }

    fn operations(self: Arc<Self>) -> Vec<OperationDescriptor> {
        let unit = Arc::clone(&self);
        let request = OperationDescriptor::new(REQUESTING, "request", 1, move |mut args: Vec<Value>| {
            let unit = Arc::clone(&unit);
            async move {
                let args: RequestArgs = decode_arg(args.pop().unwrap_or(Value::Null))?;
                let input = match args.input {
                    Value::Null => Value::Object(Document::new()),
                    other => other,
                };
                let id = unit.open(&args.path, input);
                Ok(json!({ "request": id }))
            }
        });

        let unit = self;
        let respond = OperationDescriptor::new(REQUESTING, "respond", 1, move |mut args: Vec<Value>| {
            let unit = Arc::clone(&unit);
            async move {
                let Value::Object(mut response) = args.pop().unwrap_or(Value::Null) else {
                    return Err(UnitError::rejected("respond expects an object"));
                };
                let request = match response.remove("request") {
                    Some(Value::String(id)) => id,
                    _ => return Err(UnitError::rejected("respond requires a request id")),
                };
                unit.resolve(&request, response)?;
                Ok(json!({ "request": request }))
            }
        });

        vec![request, respond]
    }
}
