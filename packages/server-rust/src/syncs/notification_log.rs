//! Mediated NotificationLog routes.

use mediator_core::Document;
use serde_json::{json, Value};

use super::body::{pick_boolean, require_string, require_text};
use super::route::route_sync;
use crate::engine::{SyncContext, SyncRule};
use crate::service::operation::UnitError;

const RECIPIENT: &[&str] = &["recipient", "recipientId", "user", "id"];
const NOTIFICATION_ID: &[&str] = &["notificationID", "notificationId", "id"];

fn recipient(body: &Document) -> Result<String, UnitError> {
    require_string(body, RECIPIENT, "recipient")
}

fn notification(body: &Document) -> Result<Value, UnitError> {
    let id = require_string(body, NOTIFICATION_ID, "notificationID")?;
    Ok(json!({ "notificationID": id }))
}

fn filter(body: &Document) -> Result<Value, UnitError> {
    Ok(json!({
        "recipient": recipient(body)?,
        "delivered": pick_boolean(body, &["delivered"]),
        "dismissed": pick_boolean(body, &["dismissed"]),
    }))
}

async fn log_notification(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    let recipient = recipient(&body)?;
    let content = require_text(&body, &["content"], "content")?;
    ctx.invoke(
        "NotificationLog",
        "logNotification",
        json!({ "recipient": recipient, "content": content }),
    )
    .await
}

async fn mark_as_delivered(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("NotificationLog", "markAsDelivered", notification(&body)?).await?;
    Ok(json!({}))
}

async fn dismiss_notification(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("NotificationLog", "dismissNotification", notification(&body)?).await?;
    Ok(json!({}))
}

async fn clear_dismissed(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    let recipient = recipient(&body)?;
    ctx.invoke("NotificationLog", "clearDismissedNotifications", json!({ "recipient": recipient }))
        .await?;
    Ok(json!({}))
}

async fn get_notifications(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("NotificationLog", "getNotifications", filter(&body)?).await
}

async fn list_with_content(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("NotificationLog", "listNotificationsWithContent", filter(&body)?).await
}

async fn get_with_content(ctx: SyncContext, body: Document) -> Result<Value, UnitError> {
    ctx.invoke("NotificationLog", "getNotificationWithContent", notification(&body)?).await
}

pub(super) fn syncs() -> Vec<SyncRule> {
    vec![
        route_sync("/NotificationLog/logNotification", log_notification),
        route_sync("/NotificationLog/markAsDelivered", mark_as_delivered),
        route_sync("/NotificationLog/dismissNotification", dismiss_notification),
        route_sync("/NotificationLog/clearDismissedNotifications", clear_dismissed),
        route_sync("/NotificationLog/getNotifications", get_notifications),
        route_sync("/NotificationLog/listNotificationsWithContent", list_with_content),
        route_sync("/NotificationLog/getNotificationWithContent", get_with_content),
    ]
}
