//! Unit storage.
//!
//! - [`StorageEngine`]: collection-oriented document store handed to units
//! - [`engines::HashMapStorage`]: the in-memory `DashMap` engine
//!
//! Persistence beyond process lifetime is the concern of an external backend
//! and is not provided here.

pub mod engine;
pub mod engines;

pub use engine::*;

/// Generates a fresh unique document id.
#[must_use]
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
