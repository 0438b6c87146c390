use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keyed structured document exchanged with units.
///
/// Backed by `serde_json::Map` with the `preserve_order` feature, so iteration
/// follows key-insertion order. The argument adapter relies on this ordering
/// when spreading a document over a multi-parameter operation.
pub type Document = serde_json::Map<String, Value>;

/// Identifier of one completed action within the process.
///
/// Assigned from a monotonically increasing counter by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Identifier of one reaction chain: the top-level invocation plus every
/// action triggered, directly or transitively, by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub u64);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// One completed unit operation invocation.
///
/// Records are emitted once, after the operation returns successfully, and are
/// immutable from then on. They live only as long as the flow that produced
/// them; units persist whatever they need themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    pub flow: FlowId,
    pub unit: String,
    pub operation: String,
    /// The inbound argument document exactly as the caller supplied it.
    pub input: Value,
    /// The operation's result. `None` only while the invocation is in flight.
    pub output: Option<Value>,
}

impl ActionRecord {
    /// `"Unit/operation"` label used in logs and route paths.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.unit, self.operation)
    }

    /// Looks up a top-level field of the input document.
    #[must_use]
    pub fn input_field(&self, field: &str) -> Option<&Value> {
        self.input.as_object().and_then(|doc| doc.get(field))
    }

    /// Looks up a top-level field of the output document.
    #[must_use]
    pub fn output_field(&self, field: &str) -> Option<&Value> {
        self.output
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|doc| doc.get(field))
    }
}

/// Abstraction over the system clock for dependency injection.
///
/// Units stamp records (request creation, notification delivery) through this
/// trait so tests can substitute a deterministic clock.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        now_millis()
    }
}

/// Milliseconds since Unix epoch, saturating to 0 for a clock set before 1970.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
