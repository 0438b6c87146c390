//! NotificationLog: per-recipient notifications with delivery and dismissal
//! state.
//!
//! Content is stored as text and must hold a JSON object.

use std::sync::Arc;

use mediator_core::ClockSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{from_document, to_document, IdArg, Sequence};
use crate::service::operation::{encode_result, OperationDescriptor, UnitError};
use crate::service::registry::{Unit, UnitDeps};
use crate::storage::{fresh_id, StorageEngine};

const COLLECTION: &str = "notification_log.notifications";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Notification {
    recipient: String,
    content: String,
    sent_at: u64,
    delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dismissed_at: Option<u64>,
    seq: u64,
}

impl Notification {
    fn matches(&self, filter: &Filter) -> bool {
        self.recipient == filter.recipient
            && filter.delivered.map_or(true, |d| d == self.delivered)
            && filter.dismissed.map_or(true, |d| d == self.dismissed_at.is_some())
    }
}

/// A notification as shown to clients, with its content parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    /// Parsed content, or `null` when the stored text is not a JSON object.
    pub content: Option<serde_json::Map<String, Value>>,
    /// The stored text, present only when it could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    pub sent_at: u64,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<u64>,
}

impl NotificationView {
    fn new(id: String, n: Notification) -> Self {
        let (content, raw_content) = match serde_json::from_str::<Value>(&n.content) {
            Ok(Value::Object(doc)) => (Some(doc), None),
            _ => (None, Some(n.content)),
        };
        Self {
            id,
            content,
            raw_content,
            sent_at: n.sent_at,
            delivered: n.delivered,
            dismissed_at: n.dismissed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogArgs {
    recipient: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ById {
    #[serde(rename = "notificationID")]
    notification_id: String,
}

#[derive(Debug, Deserialize)]
struct ByRecipient {
    recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Filter {
    pub recipient: String,
    #[serde(default)]
    pub delivered: Option<bool>,
    #[serde(default)]
    pub dismissed: Option<bool>,
}

pub struct NotificationLogUnit {
    store: Arc<dyn StorageEngine>,
    clock: Arc<dyn ClockSource>,
    seq: Sequence,
}

impl NotificationLogUnit {
    #[must_use]
    pub fn new(deps: &UnitDeps) -> Self {
        Self {
            store: Arc::clone(&deps.store),
            clock: Arc::clone(&deps.clock),
            seq: Sequence::default(),
        }
    }

    /// Logs a notification and returns its id.
    ///
    /// # Errors
    ///
    /// Rejects content that is not the text of a JSON object.
    pub fn log(&self, recipient: &str, content: &str) -> Result<String, UnitError> {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(_)) => {}
            Ok(_) => return Err(UnitError::rejected("Content must be a JSON object.")),
            Err(e) => return Err(UnitError::rejected(format!("Invalid JSON content: {e}"))),
        }
        let id = fresh_id();
        let notification = Notification {
            recipient: recipient.to_string(),
            content: content.to_string(),
            sent_at: self.clock.now(),
            delivered: false,
            dismissed_at: None,
            seq: self.seq.next(),
        };
        self.store.put(COLLECTION, &id, to_document(&notification)?);
        Ok(id)
    }

    /// # Errors
    ///
    /// Rejects unknown and already delivered notifications.
    pub fn mark_delivered(&self, id: &str) -> Result<(), UnitError> {
        let n = self.load(id)?;
        if n.delivered {
            return Err(UnitError::rejected("Notification already delivered."));
        }
        self.store.update(COLLECTION, id, &mut |doc| {
            doc.insert("delivered".to_string(), Value::Bool(true));
        });
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects unknown and already dismissed notifications.
    pub fn dismiss(&self, id: &str) -> Result<(), UnitError> {
        let now = self.clock.now();
        let mut already = false;
        let found = self.store.update(COLLECTION, id, &mut |doc| {
            if doc.get("dismissedAt").is_some_and(|v| !v.is_null()) {
                already = true;
            } else {
                doc.insert("dismissedAt".to_string(), json!(now));
            }
        });
        match (found, already) {
            (false, _) => Err(UnitError::rejected("Notification not found.")),
            (true, true) => Err(UnitError::rejected("Notification already dismissed.")),
            (true, false) => Ok(()),
        }
    }

    /// Deletes every dismissed notification of `recipient`. Returns how many.
    pub fn clear_dismissed(&self, recipient: &str) -> usize {
        self.store.remove_where(COLLECTION, &|doc| {
            doc.get("recipient").and_then(Value::as_str) == Some(recipient)
                && doc.get("dismissedAt").is_some_and(|v| !v.is_null())
        })
    }

    /// Ids of the notifications matching `filter`, oldest first.
    pub fn ids(&self, filter: &Filter) -> Result<Vec<String>, UnitError> {
        Ok(self.select(filter)?.into_iter().map(|(id, _)| id).collect())
    }

    /// Notifications matching `filter` with parsed content, newest first.
    pub fn views(&self, filter: &Filter) -> Result<Vec<NotificationView>, UnitError> {
        Ok(self
            .select(filter)?
            .into_iter()
            .rev()
            .map(|(id, n)| NotificationView::new(id, n))
            .collect())
    }

    #[must_use]
    pub fn view(&self, id: &str) -> Option<NotificationView> {
        let doc = self.store.get(COLLECTION, id)?;
        from_document(doc).ok().map(|n| NotificationView::new(id.to_string(), n))
    }

    fn load(&self, id: &str) -> Result<Notification, UnitError> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .ok_or_else(|| UnitError::rejected("Notification not found."))?;
        from_document(doc)
    }

    fn select(&self, filter: &Filter) -> Result<Vec<(String, Notification)>, UnitError> {
        let mut out = Vec::new();
        for (id, doc) in self.store.scan(COLLECTION, &|_| true) {
            let n: Notification = from_document(doc)?;
            if n.matches(filter) {
                out.push((id, n));
            }
        }
        out.sort_by_key(|(_, n)| (n.sent_at, n.seq));
        Ok(out)
    }
}

fn notification_id(args: IdArg<ById>) -> String {
    match args {
        IdArg::Named(ById { notification_id }) | IdArg::Bare(notification_id) => notification_id,
    }
}

impl Unit for NotificationLogUnit {
    fn name(&self) -> &'static str {
        "NotificationLog"
    }

    fn operations(self: Arc<Self>) -> Vec<OperationDescriptor> {
        const NAME: &str = "NotificationLog";
        vec![
            OperationDescriptor::method(&self, NAME, "logNotification", |unit, args: LogArgs| {
                let id = unit.log(&args.recipient, &args.content)?;
                Ok(json!({ "notificationID": id }))
            }),
            OperationDescriptor::method(&self, NAME, "markAsDelivered", |unit, args: IdArg<ById>| {
                unit.mark_delivered(&notification_id(args))?;
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, NAME, "dismissNotification", |unit, args: IdArg<ById>| {
                unit.dismiss(&notification_id(args))?;
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, NAME, "clearDismissedNotifications", |unit, args: ByRecipient| {
                unit.clear_dismissed(&args.recipient);
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, NAME, "getNotifications", |unit, filter: Filter| {
                Ok(json!({ "notificationIDs": unit.ids(&filter)? }))
            }),
            OperationDescriptor::method(&self, NAME, "getNotificationWithContent", |unit, args: IdArg<ById>| {
                match unit.view(&notification_id(args)) {
                    Some(view) => Ok(json!({ "notification": encode_result(&view)? })),
                    None => Ok(json!({})),
                }
            }),
            OperationDescriptor::method(&self, NAME, "listNotificationsWithContent", |unit, filter: Filter| {
                Ok(json!({ "notifications": encode_result(&unit.views(&filter)?)? }))
            }),
        ]
    }
}
