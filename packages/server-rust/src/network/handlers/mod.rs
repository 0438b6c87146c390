//! HTTP handlers and the state they share.

pub mod dispatch;
pub mod health;

pub use dispatch::{mediated_handler, passthrough_handler};
pub use health::{banner_handler, health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::engine::Engine;
use crate::requesting::RequestingUnit;

/// Shared state passed to every handler via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Pending-request store that mediated calls wait on.
    pub requesting: Arc<RequestingUnit>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Number of operation routes mounted for direct calls.
    pub passthrough_routes: usize,
    pub start_time: Instant,
}
