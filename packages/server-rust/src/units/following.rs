//! Following: directed follow relationships between ids.
//!
//! A followee may be a user or any other followable id, such as a category
//! name; the fan-out rule looks up followers of a category this way.

use std::sync::Arc;

use mediator_core::ClockSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{from_document, to_document, IdArg, Sequence};
use crate::service::operation::{OperationDescriptor, UnitError};
use crate::service::registry::{Unit, UnitDeps};
use crate::storage::StorageEngine;

const COLLECTION: &str = "following.relationships";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Relationship {
    follower: String,
    followee: String,
    created_at: u64,
    seq: u64,
}

#[derive(Debug, Deserialize)]
struct Pair {
    follower: String,
    followee: String,
}

#[derive(Debug, Deserialize)]
struct ByFollower {
    follower: String,
}

#[derive(Debug, Deserialize)]
struct ByFollowee {
    followee: String,
}

pub struct FollowingUnit {
    store: Arc<dyn StorageEngine>,
    clock: Arc<dyn ClockSource>,
    seq: Sequence,
}

impl FollowingUnit {
    #[must_use]
    pub fn new(deps: &UnitDeps) -> Self {
        Self {
            store: Arc::clone(&deps.store),
            clock: Arc::clone(&deps.clock),
            seq: Sequence::default(),
        }
    }

    fn key(follower: &str, followee: &str) -> String {
        format!("{follower}\u{1f}{followee}")
    }

    /// # Errors
    ///
    /// Rejects self-follows and relationships that already exist.
    pub fn follow(&self, follower: &str, followee: &str) -> Result<(), UnitError> {
        if follower == followee {
            return Err(UnitError::rejected("Cannot follow yourself."));
        }
        let rel = Relationship {
            follower: follower.to_string(),
            followee: followee.to_string(),
            created_at: self.clock.now(),
            seq: self.seq.next(),
        };
        self.store
            .insert(COLLECTION, &Self::key(follower, followee), to_document(&rel)?)
            .map_err(|_| {
                UnitError::rejected(format!(
                    "Follower '{follower}' is already following followee '{followee}'."
                ))
            })
    }

    /// # Errors
    ///
    /// Rejects when no such relationship exists.
    pub fn unfollow(&self, follower: &str, followee: &str) -> Result<(), UnitError> {
        match self.store.remove(COLLECTION, &Self::key(follower, followee)) {
            Some(_) => Ok(()),
            None => Err(UnitError::rejected(format!(
                "No existing follow relationship found between follower '{follower}' and followee '{followee}'."
            ))),
        }
    }

    #[must_use]
    pub fn is_following(&self, follower: &str, followee: &str) -> bool {
        self.store.get(COLLECTION, &Self::key(follower, followee)).is_some()
    }

    /// Ids `follower` follows, oldest relationship first.
    pub fn followees(&self, follower: &str) -> Result<Vec<String>, UnitError> {
        Ok(self
            .relationships(|r| r.follower == follower)?
            .into_iter()
            .map(|r| r.followee)
            .collect())
    }

    /// Ids following `followee`, oldest relationship first.
    pub fn followers(&self, followee: &str) -> Result<Vec<String>, UnitError> {
        Ok(self
            .relationships(|r| r.followee == followee)?
            .into_iter()
            .map(|r| r.follower)
            .collect())
    }

    fn relationships(&self, keep: impl Fn(&Relationship) -> bool) -> Result<Vec<Relationship>, UnitError> {
        let mut out = self
            .store
            .scan(COLLECTION, &|_| true)
            .into_iter()
            .map(|(_, doc)| from_document::<Relationship>(doc))
            .collect::<Result<Vec<_>, _>>()?;
        out.retain(|r| keep(r));
        out.sort_by_key(|r| r.seq);
        Ok(out)
    }
}

impl Unit for FollowingUnit {
    fn name(&self) -> &'static str {
        "Following"
    }

    fn operations(self: Arc<Self>) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::method(&self, "Following", "follow", |unit, args: Pair| {
                unit.follow(&args.follower, &args.followee)?;
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, "Following", "unfollow", |unit, args: Pair| {
                unit.unfollow(&args.follower, &args.followee)?;
                Ok(json!({}))
            }),
            OperationDescriptor::method(&self, "Following", "isFollowing", |unit, args: Pair| {
                Ok(json!({ "isFollowing": unit.is_following(&args.follower, &args.followee) }))
            }),
            OperationDescriptor::method(&self, "Following", "getFollowees", |unit, args: IdArg<ByFollower>| {
                let follower = match args {
                    IdArg::Named(ByFollower { follower }) | IdArg::Bare(follower) => follower,
                };
                if follower.is_empty() {
                    return Err(UnitError::rejected("Missing follower"));
                }
                Ok(json!({ "followeeIDs": unit.followees(&follower)? }))
            }),
            OperationDescriptor::method(&self, "Following", "getFollowers", |unit, args: IdArg<ByFollowee>| {
                let followee = match args {
                    IdArg::Named(ByFollowee { followee }) | IdArg::Bare(followee) => followee,
                };
                if followee.is_empty() {
                    return Err(UnitError::rejected("Missing followee"));
                }
                Ok(json!({ "followerIDs": unit.followers(&followee)? }))
            }),
        ]
    }
}

/// Convenience for callers holding the output of `getFollowers`.
#[must_use]
pub fn follower_ids(output: &Value) -> Vec<String> {
    output["followerIDs"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}
