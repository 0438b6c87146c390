//! HTTP surface: configuration, passthrough policy, routing, handlers, and
//! shutdown control.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod passthrough;
pub mod shutdown;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use passthrough::{RouteAccess, RoutePolicy};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
