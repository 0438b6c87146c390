//! In-memory [`StorageEngine`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking.
//! Suitable for development, testing, and single-process deployments where
//! all unit state fits in memory.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mediator_core::Document;

use crate::storage::engine::{StorageEngine, StoreError};

type Collection = DashMap<String, Document>;

/// In-memory storage: one [`DashMap`] per collection.
///
/// The outer map is only touched to resolve a collection handle; the handle
/// is cloned out so no outer shard lock is held while the inner map is used.
pub struct HashMapStorage {
    collections: DashMap<String, Arc<Collection>>,
}

impl HashMapStorage {
    /// Creates a new, empty `HashMapStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|c| Arc::clone(c.value()))
    }

    fn collection_or_create(&self, name: &str) -> Arc<Collection> {
        if let Some(existing) = self.collection(name) {
            return existing;
        }
        Arc::clone(self.collections.entry(name.to_string()).or_default().value())
    }
}

impl Default for HashMapStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for HashMapStorage {
    fn insert(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        match self.collection_or_create(collection).entry(id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(doc);
                Ok(())
            }
        }
    }

    fn put(&self, collection: &str, id: &str, doc: Document) -> Option<Document> {
        self.collection_or_create(collection).insert(id.to_string(), doc)
    }

    fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collection(collection)?.get(id).map(|d| d.clone())
    }

    fn update(&self, collection: &str, id: &str, mutate: &mut dyn FnMut(&mut Document)) -> bool {
        let Some(coll) = self.collection(collection) else {
            return false;
        };
        let Some(mut doc) = coll.get_mut(id) else {
            return false;
        };
        mutate(doc.value_mut());
        true
    }

    fn remove(&self, collection: &str, id: &str) -> Option<Document> {
        self.collection(collection)?.remove(id).map(|(_, d)| d)
    }

    fn scan(&self, collection: &str, filter: &dyn Fn(&Document) -> bool) -> Vec<(String, Document)> {
        let Some(coll) = self.collection(collection) else {
            return Vec::new();
        };
        coll.iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn remove_where(&self, collection: &str, filter: &dyn Fn(&Document) -> bool) -> usize {
        let Some(coll) = self.collection(collection) else {
            return 0;
        };
        let before = coll.len();
        coll.retain(|_, doc| !filter(doc));
        before - coll.len()
    }
}
