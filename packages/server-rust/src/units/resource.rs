//! Resource: owned listings with a name, optional category and description.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::{from_document, to_document, IdArg, Sequence};
use crate::service::operation::{encode_result, OperationDescriptor, UnitError};
use crate::service::registry::{Unit, UnitDeps};
use crate::storage::{fresh_id, StorageEngine};

const COLLECTION: &str = "resource.resources";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stored {
    owner: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    seq: u64,
}

/// A resource as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resource {
    fn new(id: String, stored: Stored) -> Self {
        Self {
            id,
            owner: stored.owner,
            name: stored.name,
            category: stored.category,
            description: stored.description,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewResource {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Change to an optional field: absent leaves it, `null` clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Keep,
    Clear,
    Set(String),
}

impl FieldChange {
    fn from_json(value: Option<Value>, field: &str) -> Result<Self, UnitError> {
        match value {
            None => Ok(Self::Keep),
            Some(Value::Null) => Ok(Self::Clear),
            Some(Value::String(s)) => Ok(Self::Set(s)),
            Some(_) => Err(UnitError::rejected(format!("{field} must be a string or null."))),
        }
    }

    fn apply(self, slot: &mut Option<String>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(s) => *slot = Some(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    #[serde(rename = "resourceID")]
    resource_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    category: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    description: Option<Value>,
}

/// `Some` whenever the field is present, including an explicit `null`.
fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
struct ById {
    #[serde(rename = "resourceID")]
    resource_id: String,
}

#[derive(Debug, Deserialize)]
struct ByOwner {
    owner: String,
}

pub struct ResourceUnit {
    store: Arc<dyn StorageEngine>,
    seq: Sequence,
}

impl ResourceUnit {
    #[must_use]
    pub fn new(deps: &UnitDeps) -> Self {
        Self {
            store: Arc::clone(&deps.store),
            seq: Sequence::default(),
        }
    }

    /// Stores a new resource and returns its id.
    ///
    /// # Errors
    ///
    /// Rejects an empty or whitespace-only name.
    pub fn create(&self, new: NewResource) -> Result<String, UnitError> {
        if new.name.trim().is_empty() {
            return Err(UnitError::rejected("Resource name cannot be empty."));
        }
        let id = fresh_id();
        let stored = Stored {
            owner: new.owner,
            name: new.name,
            category: new.category,
            description: new.description,
            seq: self.seq.next(),
        };
        self.store.put(COLLECTION, &id, to_document(&stored)?);
        Ok(id)
    }

    /// # Errors
    ///
    /// Rejects unknown ids and a blank new name.
    pub fn update(
        &self,
        id: &str,
        name: Option<String>,
        category: FieldChange,
        description: FieldChange,
    ) -> Result<(), UnitError> {
        if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(UnitError::rejected("Resource name cannot be updated to an empty string."));
        }
        let mut stored: Stored = from_document(self.doc(id)?)?;
        if let Some(name) = name {
            stored.name = name;
        }
        category.apply(&mut stored.category);
        description.apply(&mut stored.description);
        let doc = to_document(&stored)?;

        let mut replacement = Some(doc);
        let found = self.store.update(COLLECTION, id, &mut |slot| {
            if let Some(doc) = replacement.take() {
                *slot = doc;
            }
        });
        if found {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// # Errors
    ///
    /// Rejects unknown ids.
    pub fn delete(&self, id: &str) -> Result<(), UnitError> {
        self.store.remove(COLLECTION, id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    /// # Errors
    ///
    /// Rejects unknown ids.
    pub fn get(&self, id: &str) -> Result<Resource, UnitError> {
        Ok(Resource::new(id.to_string(), from_document(self.doc(id)?)?))
    }

    /// Every resource, in creation order.
    pub fn list(&self) -> Result<Vec<Resource>, UnitError> {
        self.select(|_| true)
    }

    /// Resources owned by `owner`, in creation order.
    pub fn list_by_owner(&self, owner: &str) -> Result<Vec<Resource>, UnitError> {
        self.select(|s| s.owner == owner)
    }

    fn doc(&self, id: &str) -> Result<mediator_core::Document, UnitError> {
        self.store.get(COLLECTION, id).ok_or_else(|| not_found(id))
    }

    fn select(&self, keep: impl Fn(&Stored) -> bool) -> Result<Vec<Resource>, UnitError> {
        let mut rows = Vec::new();
        for (id, doc) in self.store.scan(COLLECTION, &|_| true) {
            let stored: Stored = from_document(doc)?;
            if keep(&stored) {
                rows.push((id, stored));
            }
        }
        rows.sort_by_key(|(_, s)| s.seq);
        Ok(rows.into_iter().map(|(id, s)| Resource::new(id, s)).collect())
    }
}

fn not_found(id: &str) -> UnitError {
    UnitError::rejected(format!("Resource with ID '{id}' not found."))
}

fn resource_id(args: IdArg<ById>) -> String {
    match args {
        IdArg::Named(ById { resource_id }) | IdArg::Bare(resource_id) => resource_id,
    }
}

impl Unit for ResourceUnit {
    fn name(&self) -> &'static str {
        "Resource"
    }

    fn operations(self: Arc<Self>) -> Vec<OperationDescriptor> {
        const NAME: &str = "Resource";
        vec![
            OperationDescriptor::method(&self, NAME, "createResource", |unit, new: NewResource| {
                Ok(json!({ "resourceID": unit.create(new)? }))
            }),
            OperationDescriptor::method(&self, NAME, "updateResource", |unit, args: UpdateArgs| {
                let category = FieldChange::from_json(args.category, "category")?;
                let description = FieldChange::from_json(args.description, "description")?;
                unit.update(&args.resource_id, args.name, category, description)?;
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, NAME, "deleteResource", |unit, args: IdArg<ById>| {
                unit.delete(&resource_id(args))?;
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, NAME, "getResource", |unit, args: IdArg<ById>| {
                Ok(json!({ "resource": encode_result(&unit.get(&resource_id(args))?)? }))
            }),
            OperationDescriptor::query(&self, NAME, "listResources", |unit| {
                Ok(json!({ "resources": encode_result(&unit.list()?)? }))
            }),
            OperationDescriptor::method(&self, NAME, "listResourcesByOwner", |unit, args: IdArg<ByOwner>| {
                let owner = match args {
                    IdArg::Named(ByOwner { owner }) | IdArg::Bare(owner) => owner,
                };
                Ok(json!({ "resources": encode_result(&unit.list_by_owner(&owner)?)? }))
            }),
        ]
    }
}
