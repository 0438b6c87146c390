//! Mediator core: action records, binding frames, and the match patterns
//! synchronization rules are written in.

pub mod frame;
pub mod logging;
pub mod pattern;
pub mod types;

pub use frame::{Frame, Frames};
pub use logging::Logging;
pub use pattern::{ActionPattern, ActionTemplate, PatternError, Term};
pub use types::{now_millis, ActionId, ActionRecord, ClockSource, Document, FlowId, SystemClock};

