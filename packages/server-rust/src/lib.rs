//! Mediator server: unit registry, synchronization engine, Requesting
//! mediator, built-in units and rules, and the axum HTTP surface.

pub mod engine;
pub mod network;
pub mod requesting;
pub mod service;
pub mod storage;
pub mod syncs;
pub mod units;

pub use engine::{Engine, SyncContext, SyncRule};
pub use network::{NetworkConfig, NetworkModule, RoutePolicy};
pub use requesting::RequestingUnit;
pub use service::{ServerConfig, UnitError, UnitRegistry};
