//! Which operation routes network clients may call directly.
//!
//! Included routes are public reads with a recorded reason. Excluded routes
//! are never mounted; requests to them fall through to the Requesting
//! mediator and are answered by a route rule. Anything else is served
//! directly but reported as unverified at startup.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// How a route is exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// Explicitly allowed, with the reason given for it.
    Included(String),
    /// Reached only through the mediator.
    Excluded,
    /// Served directly but never reviewed.
    Unlisted,
}

/// Allow/deny lists keyed by full route, e.g. `/api/Resource/getResource`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoutePolicy {
    #[serde(default)]
    inclusions: BTreeMap<String, String>,
    #[serde(default)]
    exclusions: BTreeSet<String>,
}

const INCLUDED: &[(&str, &str)] = &[
    ("Resource/getResource", "publicly expose read-only resource details"),
    ("Resource/listResources", "allow unauthenticated browsing of available resources"),
    ("Resource/listResourcesByOwner", "enable clients to load owner-scoped resource lists"),
    ("Following/isFollowing", "expose read-only following checks for UI state"),
    ("Following/getFollowees", "support listing who a user follows for public profiles"),
    ("Following/getFollowers", "support listing followers where visibility is allowed"),
    (
        "NotificationLog/listNotificationsWithContent",
        "publish human-readable notifications for UI rendering",
    ),
    (
        "NotificationLog/getNotificationWithContent",
        "fetch a single notification with parsed content for detail views",
    ),
];

const EXCLUDED: &[&str] = &[
    "Resource/createResource",
    "Resource/updateResource",
    "Resource/deleteResource",
    "Following/follow",
    "Following/unfollow",
    "NotificationLog/logNotification",
    "NotificationLog/markAsDelivered",
    "NotificationLog/dismissNotification",
    "NotificationLog/clearDismissedNotifications",
    "NotificationLog/getNotifications",
    "Requesting/request",
    "Requesting/respond",
];

impl RoutePolicy {
    /// The policy shipped with the server, for routes under `base`.
    #[must_use]
    pub fn builtin(base: &str) -> Self {
        Self {
            inclusions: INCLUDED
                .iter()
                .map(|(route, reason)| (format!("{base}/{route}"), (*reason).to_string()))
                .collect(),
            exclusions: EXCLUDED.iter().map(|route| format!("{base}/{route}")).collect(),
        }
    }

    /// Parses `{"inclusions": {route: reason}, "exclusions": [route]}`.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, or when a route is both included and
    /// excluded.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let policy: Self = serde_json::from_str(text).context("invalid passthrough policy")?;
        if let Some(route) = policy.exclusions.iter().find(|r| policy.inclusions.contains_key(*r)) {
            anyhow::bail!("route {route} is both included and excluded");
        }
        Ok(policy)
    }

    /// Reads a policy file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading passthrough policy {}", path.display()))?;
        Self::from_json(&text)
    }

    #[must_use]
    pub fn classify(&self, route: &str) -> RouteAccess {
        if self.exclusions.contains(route) {
            RouteAccess::Excluded
        } else if let Some(reason) = self.inclusions.get(route) {
            RouteAccess::Included(reason.clone())
        } else {
            RouteAccess::Unlisted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policy_covers_every_requesting_operation() {
        let policy = RoutePolicy::builtin("/api");
        assert_eq!(policy.classify("/api/Requesting/request"), RouteAccess::Excluded);
        assert_eq!(policy.classify("/api/Requesting/respond"), RouteAccess::Excluded);
    }

    #[test]
    fn builtin_policy_splits_reads_from_writes() {
        let policy = RoutePolicy::builtin("/api");
        assert!(matches!(policy.classify("/api/Resource/getResource"), RouteAccess::Included(_)));
        assert_eq!(policy.classify("/api/Resource/createResource"), RouteAccess::Excluded);
        assert_eq!(policy.classify("/api/Probe/poke"), RouteAccess::Unlisted);
        // Keys are full routes, so another base does not match.
        assert_eq!(policy.classify("/v2/Resource/createResource"), RouteAccess::Unlisted);
    }

    #[test]
    fn parses_policy_file_shape() {
        let policy = RoutePolicy::from_json(
            r#"{"inclusions": {"/api/A/read": "public"}, "exclusions": ["/api/A/write"]}"#,
        )
        .unwrap();
        assert_eq!(policy.classify("/api/A/read"), RouteAccess::Included("public".into()));
        assert_eq!(policy.classify("/api/A/write"), RouteAccess::Excluded);
        assert_eq!(RoutePolicy::from_json("{}").unwrap(), RoutePolicy::default());
    }

    #[test]
    fn rejects_contradictory_policy() {
        let err = RoutePolicy::from_json(r#"{"inclusions": {"/x": "r"}, "exclusions": ["/x"]}"#).unwrap_err();
        assert!(err.to_string().contains("both included and excluded"));
        assert!(RoutePolicy::from_json("[").is_err());
    }
}
