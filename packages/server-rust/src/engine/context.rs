//! Per-flow state and the handle rule compute steps act through.

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use mediator_core::{ActionRecord, FlowId};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::Engine;
use crate::service::adapter::adapt_arguments;
use crate::service::operation::UnitError;

/// Mutable state of one reaction chain.
///
/// A flow starts with a top-level invocation and lasts until its work queue
/// drains. Nested invocations made by rules join the same flow.
pub(crate) struct FlowState {
    pub(crate) id: FlowId,
    /// Completed actions waiting to be matched, breadth-first.
    pub(crate) queue: Mutex<VecDeque<ActionRecord>>,
    /// Actions already matched, in processing order.
    pub(crate) history: Mutex<Vec<ActionRecord>>,
    pub(crate) processed: AtomicUsize,
}

impl FlowState {
    pub(crate) fn new(id: FlowId) -> Self {
        Self {
            id,
            queue: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            processed: AtomicUsize::new(0),
        }
    }
}

/// Handle to the engine scoped to one flow.
///
/// Passed to every compute step. Operations invoked through it are recorded
/// as actions of the same flow and matched after the current action.
#[derive(Clone)]
pub struct SyncContext {
    engine: Engine,
    flow: Arc<FlowState>,
}

impl SyncContext {
    pub(crate) fn new(engine: Engine, flow: Arc<FlowState>) -> Self {
        Self { engine, flow }
    }

    #[must_use]
    pub fn flow(&self) -> FlowId {
        self.flow.id
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn state(&self) -> &Arc<FlowState> {
        &self.flow
    }

    /// Invokes `unit`/`operation` with `input` and records the completed
    /// action on this flow's queue.
    ///
    /// Failed invocations produce no action record.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::UnknownOperation`] if nothing is registered under
    /// that name, otherwise whatever the operation returns.
    pub async fn invoke(&self, unit: &str, operation: &str, input: Value) -> Result<Value, UnitError> {
        let descriptor = self
            .engine
            .registry()
            .operation(unit, operation)
            .ok_or_else(|| UnitError::UnknownOperation {
                unit: unit.to_string(),
                operation: operation.to_string(),
            })?;

        let args = adapt_arguments(&descriptor, &input);
        let output = match descriptor.call(args).await {
            Ok(output) => output,
            Err(e) => {
                if self.engine.logging().traces() {
                    info!(flow = %self.flow.id, action = %descriptor.key(), error = %e, "action failed");
                }
                return Err(e);
            }
        };

        let record = ActionRecord {
            id: self.engine.next_action_id(),
            flow: self.flow.id,
            unit: descriptor.unit_name.to_string(),
            operation: descriptor.operation_name.to_string(),
            input,
            output: Some(output.clone()),
        };

        let logging = self.engine.logging();
        if logging.is_verbose() {
            info!(
                flow = %record.flow,
                action = %record.id,
                input = %record.input,
                output = %output,
                "{}",
                record.label()
            );
        } else if logging.traces() {
            info!(flow = %record.flow, action = %record.id, "{}", record.label());
        } else {
            debug!(flow = %record.flow, action = %record.id, "{}", record.label());
        }

        self.flow.queue.lock().push_back(record);
        Ok(output)
    }

    /// Every action this flow has matched so far, in processing order.
    #[must_use]
    pub fn trace(&self) -> Vec<ActionRecord> {
        self.flow.history.lock().clone()
    }

    /// Matches queued actions until the flow is quiescent.
    pub async fn settle(&self) {
        self.engine.drain(self).await;
    }
}
