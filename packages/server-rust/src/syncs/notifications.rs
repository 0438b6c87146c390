//! Category fan-out: when a resource is created in a category, notify every
//! follower of that category except the owner.

use async_trait::async_trait;
use futures_util::future::join_all;
use mediator_core::{ActionPattern, Document, Frame, Frames, Term};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::engine::{SyncContext, SyncRule};
use crate::service::operation::UnitError;
use crate::units::following::follower_ids;

/// The reads and writes the fan-out needs, so it can run against the engine
/// or against a test double.
#[async_trait]
pub trait FanOutTarget: Send + Sync {
    async fn followers(&self, followee: &str) -> Result<Vec<String>, UnitError>;

    /// Logs one notification and returns its id.
    async fn log_notification(&self, recipient: &str, content: &str) -> Result<String, UnitError>;
}

#[async_trait]
impl FanOutTarget for SyncContext {
    async fn followers(&self, followee: &str) -> Result<Vec<String>, UnitError> {
        let out = self
            .invoke("Following", "getFollowers", serde_json::json!({ "followee": followee }))
            .await?;
        Ok(follower_ids(&out))
    }

    async fn log_notification(&self, recipient: &str, content: &str) -> Result<String, UnitError> {
        let out = self
            .invoke(
                "NotificationLog",
                "logNotification",
                serde_json::json!({ "recipient": recipient, "content": content }),
            )
            .await?;
        out.get("notificationID")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| UnitError::Internal(anyhow::anyhow!("logNotification returned no id")))
    }
}

/// A newly created resource, as seen by the fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPost {
    pub owner: String,
    pub category: Option<String>,
    pub resource_id: String,
    pub name: String,
    pub description: Option<String>,
}

impl CategoryPost {
    /// Reads a post from a `createResource` input document and its new id.
    #[must_use]
    pub fn from_input(input: &Document, resource_id: &str) -> Self {
        let text = |key: &str| input.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            owner: text("owner").unwrap_or_default(),
            category: text("category"),
            resource_id: resource_id.to_string(),
            name: text("name").unwrap_or_default(),
            description: text("description"),
        }
    }

    fn content(&self, category: &str) -> String {
        let mut doc = Document::new();
        doc.insert("type".into(), "category_post".into());
        doc.insert("category".into(), category.into());
        doc.insert("resourceID".into(), self.resource_id.clone().into());
        doc.insert("owner".into(), self.owner.clone().into());
        doc.insert("name".into(), self.name.clone().into());
        if let Some(description) = &self.description {
            doc.insert("description".into(), description.clone().into());
        }
        Value::Object(doc).to_string()
    }
}

/// Outcome counts of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    pub attempted: usize,
    pub notified: usize,
}

/// Notifies the followers of `post`'s category, skipping the owner.
///
/// A missing or blank category returns zero counts without any lookup. Each
/// recipient is attempted independently; individual failures are logged and
/// only lower `notified`.
///
/// # Errors
///
/// Fails only when the follower lookup itself fails.
pub async fn fan_out_category_post<T>(post: &CategoryPost, target: &T) -> Result<FanOutSummary, UnitError>
where
    T: FanOutTarget + ?Sized,
{
    let category = post.category.as_deref().map(str::trim).unwrap_or_default();
    if category.is_empty() {
        return Ok(FanOutSummary::default());
    }

    let recipients: Vec<String> = target
        .followers(category)
        .await?
        .into_iter()
        .filter(|id| *id != post.owner)
        .collect();
    if recipients.is_empty() {
        return Ok(FanOutSummary::default());
    }

    let content = post.content(category);
    let results = join_all(recipients.iter().map(|r| target.log_notification(r, &content))).await;

    let mut notified = 0;
    for (recipient, result) in recipients.iter().zip(results) {
        match result {
            Ok(_) => notified += 1,
            Err(e) => warn!(recipient = %recipient, error = %e, "failed to log notification"),
        }
    }
    Ok(FanOutSummary {
        attempted: recipients.len(),
        notified,
    })
}

fn post_from_frame(frame: &Frame) -> Option<CategoryPost> {
    let input = frame.get("resource_input")?.as_object()?;
    let id = frame.get_str("resourceID")?;
    Some(CategoryPost::from_input(input, id))
}

/// Rule reacting to every successful `Resource/createResource`.
#[must_use]
pub fn category_fan_out() -> SyncRule {
    SyncRule::new("notify category followers")
        .when(
            ActionPattern::new("Resource", "createResource")
                .input_doc("resource_input")
                .output("resourceID", Term::var("resourceID")),
        )
        .compute(|ctx: SyncContext, frames: Frames| async move {
            for frame in &frames {
                let Some(post) = post_from_frame(frame) else {
                    continue;
                };
                match fan_out_category_post(&post, &ctx).await {
                    Ok(summary) if summary.attempted > 0 => info!(
                        category = post.category.as_deref().unwrap_or_default(),
                        attempted = summary.attempted,
                        notified = summary.notified,
                        "notifications fanned out"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(resource = %post.resource_id, error = %e, "notification fan-out failed"),
                }
            }
            Ok::<_, anyhow::Error>(Frames::new())
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::engine::Engine;
    use crate::service::config::ServerConfig;
    use crate::service::registry::{UnitDeps, UnitRegistry};
    use crate::units::{catalog, NotificationLogUnit};
    use crate::units::notification_log::Filter;

    #[derive(Default)]
    struct Fake {
        followers: Vec<String>,
        failing: HashSet<String>,
        lookups: Mutex<usize>,
        logged: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FanOutTarget for Fake {
        async fn followers(&self, _followee: &str) -> Result<Vec<String>, UnitError> {
            *self.lookups.lock() += 1;
            Ok(self.followers.clone())
        }

        async fn log_notification(&self, recipient: &str, content: &str) -> Result<String, UnitError> {
            if self.failing.contains(recipient) {
                return Err(UnitError::rejected("storage unavailable"));
            }
            self.logged.lock().push((recipient.to_string(), content.to_string()));
            Ok(format!("n-{recipient}"))
        }
    }

    fn post(owner: &str, category: Option<&str>) -> CategoryPost {
        CategoryPost {
            owner: owner.to_string(),
            category: category.map(str::to_string),
            resource_id: "res-1".to_string(),
            name: "Post Title".to_string(),
            description: Some("Details".to_string()),
        }
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[tokio::test]
    async fn notifies_followers_except_owner() {
        let fake = Fake {
            followers: vec!["a".into(), "owner".into(), "b".into()],
            ..Fake::default()
        };
        let summary = fan_out_category_post(&post("owner", Some(" bikes ")), &fake).await.unwrap();
        assert_eq!(summary, FanOutSummary { attempted: 2, notified: 2 });

        let logged = fake.logged.lock();
        let recipients: Vec<_> = logged.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(recipients, vec!["a", "b"]);
        let content: Value = serde_json::from_str(&logged[0].1).unwrap();
        assert_eq!(
            content,
            json!({
                "type": "category_post",
                "category": "bikes",
                "resourceID": "res-1",
                "owner": "owner",
                "name": "Post Title",
                "description": "Details",
            })
        );
    }

    #[tokio::test]
    async fn blank_category_skips_lookup() {
        let fake = Fake {
            followers: vec!["a".into()],
            ..Fake::default()
        };
        for category in [None, Some(""), Some("   ")] {
            let summary = fan_out_category_post(&post("owner", category), &fake).await.unwrap();
            assert_eq!(summary, FanOutSummary::default());
        }
        assert_eq!(*fake.lookups.lock(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let fake = Fake {
            followers: vec!["a".into(), "b".into(), "c".into()],
            failing: HashSet::from(["b".to_string()]),
            ..Fake::default()
        };
        let summary = fan_out_category_post(&post("owner", Some("x")), &fake).await.unwrap();
        assert_eq!(summary, FanOutSummary { attempted: 3, notified: 2 });
    }

    proptest! {
        #[test]
        fn attempts_every_follower_but_the_owner(
            others in prop::collection::hash_set("[a-z]{1,6}", 0..12),
            owner_follows in any::<bool>(),
            owner_at in 0usize..12,
        ) {
            let owner = "OWNER".to_string();
            let mut followers: Vec<String> = others.into_iter().collect();
            if owner_follows {
                let at = owner_at.min(followers.len());
                followers.insert(at, owner.clone());
            }
            let expected = followers.len() - usize::from(owner_follows);

            let fake = Fake { followers, ..Fake::default() };
            let summary = block_on(fan_out_category_post(&post(&owner, Some("c")), &fake)).unwrap();

            prop_assert_eq!(summary.attempted, expected);
            prop_assert_eq!(summary.notified, expected);
            prop_assert!(fake.logged.lock().iter().all(|(r, _)| *r != owner));
        }
    }

    #[tokio::test]
    async fn rule_notifies_through_the_engine() {
        let registry = Arc::new(UnitRegistry::new());
        catalog().load(&UnitDeps::in_memory(), &registry);
        let engine = Engine::new(Arc::clone(&registry), &ServerConfig::default());
        engine.register([category_fan_out()]);

        for follower in ["alice", "bob"] {
            engine
                .invoke("Following", "follow", json!({"follower": follower, "followee": "bikes"}))
                .await
                .unwrap();
        }
        engine
            .invoke("Resource", "createResource", json!({"owner": "alice", "name": "Bike", "category": "bikes"}))
            .await
            .unwrap();
        engine
            .invoke("Resource", "createResource", json!({"owner": "bob", "name": "Lamp"}))
            .await
            .unwrap();

        let log = registry.get::<NotificationLogUnit>().unwrap();
        let ids = |recipient: &str| {
            log.ids(&Filter {
                recipient: recipient.to_string(),
                delivered: None,
                dismissed: None,
            })
            .unwrap()
        };
        assert_eq!(ids("bob").len(), 1);
        assert!(ids("alice").is_empty());
    }
}
