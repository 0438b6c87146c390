//! Synchronization rules shipped with the server.
//!
//! Route rules answer mediated requests (`Requesting/request` actions) for a
//! fixed path. The category fan-out reacts to resource creation regardless of
//! whether it came through a route.

pub mod body;
mod following;
mod notification_log;
pub mod notifications;
mod resource;
pub mod route;

pub use notifications::{category_fan_out, fan_out_category_post, CategoryPost, FanOutSummary, FanOutTarget};
pub use route::route_sync;

use crate::engine::SyncRule;

/// Every built-in rule, ready for [`Engine::register`](crate::engine::Engine::register).
#[must_use]
pub fn all_syncs() -> Vec<SyncRule> {
    let mut rules = Vec::new();
    rules.extend(resource::syncs());
    rules.extend(following::syncs());
    rules.extend(notification_log::syncs());
    rules.push(category_fan_out());
    rules
}
