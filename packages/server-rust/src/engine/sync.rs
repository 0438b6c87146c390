//! Synchronization rules: trigger patterns, a compute step, and fire templates.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mediator_core::{ActionId, ActionPattern, ActionRecord, ActionTemplate, Frame, Frames};

use super::context::SyncContext;

/// Future returned by a compute step.
pub type ComputeFuture = BoxFuture<'static, anyhow::Result<Frames>>;

/// Compute step: receives every new frame of one matching pass and returns
/// the frames to fire for. May invoke unit operations through the context.
pub type ComputeFn = Arc<dyn Fn(SyncContext, Frames) -> ComputeFuture + Send + Sync>;

/// A frame together with the actions that produced it, one per trigger
/// pattern, in pattern order.
pub type Match = (Frame, Vec<ActionId>);

/// Declarative reaction to completed actions.
///
/// `when` is a conjunction of action patterns that must all be satisfied by
/// distinct actions of the same flow. `compute` filters or enriches the
/// resulting frames (and may perform effects). Each `then` template is fired
/// once per frame that survives `compute`.
#[derive(Clone)]
pub struct SyncRule {
    pub name: String,
    pub when: Vec<ActionPattern>,
    pub compute: Option<ComputeFn>,
    pub then: Vec<ActionTemplate>,
}

impl SyncRule {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: Vec::new(),
            compute: None,
            then: Vec::new(),
        }
    }

    #[must_use]
    pub fn when(mut self, pattern: ActionPattern) -> Self {
        self.when.push(pattern);
        self
    }

    #[must_use]
    pub fn compute<F, Fut>(mut self, step: F) -> Self
    where
        F: Fn(SyncContext, Frames) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Frames>> + Send + 'static,
    {
        self.compute = Some(Arc::new(move |ctx: SyncContext, frames: Frames| -> ComputeFuture {
            step(ctx, frames).boxed()
        }));
        self
    }

    #[must_use]
    pub fn then(mut self, template: ActionTemplate) -> Self {
        self.then.push(template);
        self
    }

    /// Whether `record` could satisfy at least one trigger pattern by name.
    #[must_use]
    pub fn triggered_by(&self, record: &ActionRecord) -> bool {
        self.when.iter().any(|p| p.targets(record))
    }

    /// Every way the trigger is satisfied with `record` taking part.
    ///
    /// `history` is the flow's processed actions, which must already contain
    /// `record`. Each pattern is matched by a distinct action. The same
    /// assignment of actions to patterns is returned once, even when `record`
    /// could seed it from more than one pattern.
    #[must_use]
    pub fn match_frames(&self, record: &ActionRecord, history: &[ActionRecord]) -> Vec<Match> {
        let mut seen: HashSet<Vec<ActionId>> = HashSet::new();
        let mut out = Vec::new();

        for (seed, pattern) in self.when.iter().enumerate() {
            let Some(frame) = pattern.match_record(&Frame::new(), record) else {
                continue;
            };
            let mut partial: Vec<(Frame, Vec<Option<ActionId>>)> = {
                let mut ids = vec![None; self.when.len()];
                ids[seed] = Some(record.id);
                vec![(frame, ids)]
            };

            for (idx, other) in self.when.iter().enumerate() {
                if idx == seed {
                    continue;
                }
                let mut next = Vec::new();
                for (frame, ids) in &partial {
                    for candidate in history {
                        if ids.contains(&Some(candidate.id)) {
                            continue;
                        }
                        if let Some(extended) = other.match_record(frame, candidate) {
                            let mut ids = ids.clone();
                            ids[idx] = Some(candidate.id);
                            next.push((extended, ids));
                        }
                    }
                }
                partial = next;
                if partial.is_empty() {
                    break;
                }
            }

            for (frame, ids) in partial {
                let ids: Vec<ActionId> = ids.into_iter().flatten().collect();
                if ids.len() == self.when.len() && seen.insert(ids.clone()) {
                    out.push((frame, ids));
                }
            }
        }
        out
    }
}

impl fmt::Debug for SyncRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRule")
            .field("name", &self.name)
            .field("when", &self.when)
            .field("compute", &self.compute.is_some())
            .field("then", &self.then)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use mediator_core::{FlowId, Term};
    use serde_json::{json, Value};

    use super::*;

    fn record(id: u64, unit: &str, op: &str, input: Value, output: Value) -> ActionRecord {
        ActionRecord {
            id: ActionId(id),
            flow: FlowId(1),
            unit: unit.to_string(),
            operation: op.to_string(),
            input,
            output: Some(output),
        }
    }

    #[test]
    fn single_pattern_yields_one_frame() {
        let rule = SyncRule::new("r").when(
            ActionPattern::new("Resource", "createResource")
                .input("category", Term::var("category"))
                .output("resourceID", Term::var("id")),
        );
        let r = record(1, "Resource", "createResource", json!({"category": "c"}), json!({"resourceID": "x"}));
        let matches = rule.match_frames(&r, std::slice::from_ref(&r));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0.get_str("id"), Some("x"));
        assert_eq!(matches[0].1, vec![ActionId(1)]);
    }

    #[test]
    fn conjunction_joins_on_shared_variable() {
        let rule = SyncRule::new("join")
            .when(ActionPattern::new("Requesting", "request").output("request", Term::var("r")))
            .when(ActionPattern::new("Requesting", "respond").input("request", Term::var("r")));

        let req1 = record(1, "Requesting", "request", json!({}), json!({"request": "r1"}));
        let req2 = record(2, "Requesting", "request", json!({}), json!({"request": "r2"}));
        let resp = record(3, "Requesting", "respond", json!({"request": "r2"}), json!({"request": "r2"}));
        let history = vec![req1, req2, resp.clone()];

        let matches = rule.match_frames(&resp, &history);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0.get_str("r"), Some("r2"));
        assert_eq!(matches[0].1, vec![ActionId(2), ActionId(3)]);
    }

    #[test]
    fn independent_matches_each_produce_a_frame() {
        let rule = SyncRule::new("pairs")
            .when(ActionPattern::new("A", "x").input("k", Term::var("k")))
            .when(ActionPattern::new("B", "y").input("k", Term::var("k")));

        let b1 = record(1, "B", "y", json!({"k": 1}), json!({}));
        let b2 = record(2, "B", "y", json!({"k": 1}), json!({}));
        let a = record(3, "A", "x", json!({"k": 1}), json!({}));
        let matches = rule.match_frames(&a, &[b1, b2, a.clone()]);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn same_action_cannot_fill_two_patterns() {
        let rule = SyncRule::new("twice")
            .when(ActionPattern::new("A", "x"))
            .when(ActionPattern::new("A", "x"));
        let a = record(1, "A", "x", json!({}), json!({}));
        assert!(rule.match_frames(&a, std::slice::from_ref(&a)).is_empty());

        let b = record(2, "A", "x", json!({}), json!({}));
        // b seeds either pattern; the two role assignments are distinct.
        assert_eq!(rule.match_frames(&b, &[a, b.clone()]).len(), 2);
    }

    #[test]
    fn untargeted_record_is_ignored() {
        let rule = SyncRule::new("r").when(ActionPattern::new("A", "x"));
        let other = record(1, "A", "y", json!({}), json!({}));
        assert!(!rule.triggered_by(&other));
        assert!(rule.match_frames(&other, std::slice::from_ref(&other)).is_empty());
    }
}
