//! Mediated Following routes. The follower is always the caller.

use mediator_core::Document;
use serde_json::{json, Value};

use super::body::{require_caller, require_string};
use super::route::route_sync;
use crate::engine::{SyncContext, SyncRule};
use crate::service::operation::UnitError;

fn pair(body: &Document) -> Result<Value, UnitError> {
    let follower = require_string(body, &["follower", "followerId", "user"], "follower")?;
    require_caller(body, &follower, "follower")?;
    let followee = require_string(body, &["followee", "followeeId", "target", "id"], "followee")?;
    Ok(json!({ "follower": follower, "followee": followee }))
}

async fn follow(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("Following", "follow", pair(&body)?).await?;
    Ok(json!({}))
}

async fn unfollow(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("Following", "unfollow", pair(&body)?).await?;
    Ok(json!({}))
}

pub(super) fn syncs() -> Vec<SyncRule> {
    vec![
        route_sync("/Following/follow", follow),
        route_sync("/Following/unfollow", unfollow),
    ]
}
