//! Document storage engine trait shared by every unit.
//!
//! Defines [`StorageEngine`], the store handed to units through their
//! dependency bundle. Documents are grouped into named collections and keyed
//! by a string id. All operations are synchronous; implementations are
//! in-memory.

use mediator_core::Document;

/// Errors raised by storage operations with a uniqueness requirement.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document `{id}` already exists in `{collection}`")]
    Conflict { collection: String, id: String },
}

/// Collection-oriented key-value storage for unit state.
///
/// Wrapped in `Arc<dyn StorageEngine>` for sharing across async boundaries.
/// Single-key operations are atomic; anything a unit builds from a read
/// followed by a write is not.
pub trait StorageEngine: Send + Sync + 'static {
    /// Inserts `doc` under `id`, failing if the id is already taken.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a document with `id` exists.
    fn insert(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Inserts or replaces a document. Returns the previous document if any.
    fn put(&self, collection: &str, id: &str, doc: Document) -> Option<Document>;

    /// Retrieves a document by id, or `None` if not present.
    fn get(&self, collection: &str, id: &str) -> Option<Document>;

    /// Applies `mutate` to the stored document in place.
    ///
    /// Returns `false` if no document with `id` exists.
    fn update(&self, collection: &str, id: &str, mutate: &mut dyn FnMut(&mut Document)) -> bool;

    /// Removes a document by id, returning it.
    fn remove(&self, collection: &str, id: &str) -> Option<Document>;

    /// Returns a point-in-time snapshot of every `(id, document)` in the
    /// collection accepted by `filter`.
    fn scan(&self, collection: &str, filter: &dyn Fn(&Document) -> bool) -> Vec<(String, Document)>;

    /// Removes every document accepted by `filter`. Returns the count removed.
    fn remove_where(&self, collection: &str, filter: &dyn Fn(&Document) -> bool) -> usize;
}
