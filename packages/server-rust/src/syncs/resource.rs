//! Mediated Resource routes. Mutations require the caller to own the
//! resource they touch.

use mediator_core::Document;
use serde_json::{json, Value};

use super::body::{auth_user, has_key, pick_nullable_string, pick_string, require_caller, require_string};
use super::route::route_sync;
use crate::engine::{SyncContext, SyncRule};
use crate::service::operation::UnitError;

const RESOURCE_ID: &[&str] = &["resourceID", "resourceId", "resource", "id"];

/// Rejects unless `authUser` owns resource `id`.
async fn assert_owner(ctx: &SyncContext, body: &Document, id: &str) -> Result<(), UnitError> {
    let Some(user) = auth_user(body) else {
        return Err(UnitError::rejected("Unauthorized: missing auth user."));
    };
    let found = match ctx.invoke("Resource", "getResource", json!({ "resourceID": id })).await {
        Ok(out) => out,
        Err(UnitError::Rejected(_)) => {
            return Err(UnitError::rejected("Not found: resource does not exist."));
        }
        Err(e) => return Err(e),
    };
    match found["resource"]["owner"].as_str() {
        Some(owner) if owner == user => Ok(()),
        _ => Err(UnitError::rejected("Forbidden: not the resource owner.")),
    }
}

async fn create_resource(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    let owner = require_string(&body, &["owner", "ownerId", "user"], "owner")?;
    require_caller(&body, &owner, "owner")?;
    let name = require_string(&body, &["name", "title"], "name")?;

    let mut input = Document::new();
    input.insert("owner".into(), owner.into());
    input.insert("name".into(), name.into());
    if let Some(Some(category)) = pick_nullable_string(&body, &["category"]) {
        input.insert("category".into(), category.into());
    }
    if let Some(Some(description)) = pick_nullable_string(&body, &["description", "details"]) {
        input.insert("description".into(), description.into());
    }

    let out = ctx.invoke("Resource", "createResource", Value::Object(input)).await?;
    Ok(json!({ "resourceID": out["resourceID"] }))
}

async fn update_resource(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    let id = require_string(&body, RESOURCE_ID, "resourceID")?;
    assert_owner(&ctx, &body, &id).await?;

    let mut input = Document::new();
    input.insert("resourceID".into(), id.into());
    if let Some(name) = pick_string(&body, &["name", "title"]) {
        input.insert("name".into(), name.into());
    }
    if has_key(&body, "category") {
        let category = pick_nullable_string(&body, &["category"]).flatten();
        input.insert("category".into(), category.map_or(Value::Null, Value::from));
    }
    if has_key(&body, "description") {
        let description = pick_nullable_string(&body, &["description", "details"]).flatten();
        input.insert("description".into(), description.map_or(Value::Null, Value::from));
    }

    ctx.invoke("Resource", "updateResource", Value::Object(input)).await?;
    Ok(json!({}))
}

async fn delete_resource(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    let id = require_string(&body, RESOURCE_ID, "resourceID")?;
    assert_owner(&ctx, &body, &id).await?;
    ctx.invoke("Resource", "deleteResource", json!({ "resourceID": id })).await?;
    Ok(json!({}))
}

async fn get_resource(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    let id = require_string(&body, RESOURCE_ID, "resourceID")?;
    ctx.invoke("Resource", "getResource", json!({ "resourceID": id })).await
}

async fn list_resources(ctx: SyncContext, _body: Document) -> Result<Value, UnitError> {
    ctx.invoke("Resource", "listResources", json!({})).await
}

pub(super) fn syncs() -> Vec<SyncRule> {
    vec![
        route_sync("/Resource/createResource", create_resource),
        route_sync("/Resource/updateResource", update_resource),
        route_sync("/Resource/deleteResource", delete_resource),
        route_sync("/ResourceConcept/getResource", get_resource),
        route_sync("/ResourceConcept/listResources", list_resources),
    ]
}
