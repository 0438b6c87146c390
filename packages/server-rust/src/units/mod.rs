//! Built-in units: plain data-backed services over the shared store.
//!
//! Every operation takes a single named-field argument object and returns a
//! JSON object. Read-then-write sequences inside a unit are not atomic with
//! respect to concurrent calls.

pub mod following;
pub mod notification_log;
pub mod resource;

use std::sync::atomic::{AtomicU64, Ordering};

use mediator_core::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use following::FollowingUnit;
pub use notification_log::NotificationLogUnit;
pub use resource::ResourceUnit;

use crate::requesting::RequestingUnit;
use crate::service::operation::UnitError;
use crate::service::registry::UnitLoader;

/// Every unit the server ships with, in registration order.
#[must_use]
pub fn catalog() -> UnitLoader {
    UnitLoader::new()
        .with("Requesting", |deps| Ok(RequestingUnit::new(deps)))
        .with("Following", |deps| Ok(FollowingUnit::new(deps)))
        .with("NotificationLog", |deps| Ok(NotificationLogUnit::new(deps)))
        .with("Resource", |deps| Ok(ResourceUnit::new(deps)))
}

/// An id passed either as `{ "<field>": id }` or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum IdArg<T> {
    Named(T),
    Bare(String),
}

/// Monotonic per-unit insertion counter, used to keep listings in creation
/// order.
#[derive(Debug, Default)]
pub(crate) struct Sequence(AtomicU64);

impl Sequence {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document, UnitError> {
    match serde_json::to_value(value).map_err(|e| UnitError::Internal(e.into()))? {
        serde_json::Value::Object(doc) => Ok(doc),
        other => Err(UnitError::Internal(anyhow::anyhow!("expected a document, got {other}"))),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, UnitError> {
    serde_json::from_value(serde_json::Value::Object(doc)).map_err(|e| UnitError::Internal(e.into()))
}
