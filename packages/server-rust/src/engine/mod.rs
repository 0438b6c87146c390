//! Synchronization engine.
//!
//! Every completed unit operation becomes an [`ActionRecord`] on its flow's
//! work queue. The engine drains the queue breadth-first: each record is
//! appended to the flow history, matched against every registered
//! [`SyncRule`], and the matching rules run their compute and fire steps.
//! Actions produced along the way join the back of the same queue, so a
//! reaction chain is a flat, ordered trace rather than a call stack.
//!
//! Each action is matched exactly once and only combinations that include it
//! are considered, so a rule never fires twice for the same actions. A flow
//! stops after `max_reactions_per_flow` actions, so rules that keep
//! triggering each other cannot loop forever.

mod context;
mod sync;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use mediator_core::{ActionId, ActionRecord, FlowId, Frames, Logging};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, info, warn};

pub use context::SyncContext;
use context::FlowState;
pub use sync::{ComputeFn, ComputeFuture, Match, SyncRule};

use crate::service::config::ServerConfig;
use crate::service::operation::UnitError;
use crate::service::registry::UnitRegistry;

struct EngineInner {
    registry: Arc<UnitRegistry>,
    rules: RwLock<Vec<Arc<SyncRule>>>,
    logging: Logging,
    next_action: AtomicU64,
    next_flow: AtomicU64,
    max_reactions: usize,
}

/// Rule-matching mediator between units.
///
/// Cheap to clone; every clone shares the same registry and rule set.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    #[must_use]
    pub fn new(registry: Arc<UnitRegistry>, config: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                rules: RwLock::new(Vec::new()),
                logging: config.logging,
                next_action: AtomicU64::new(1),
                next_flow: AtomicU64::new(1),
                max_reactions: config.max_reactions_per_flow.max(1),
            }),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.inner.registry
    }

    /// Adds a batch of rules. Returns how many were added; a rule whose name
    /// is already registered is skipped with a warning.
    pub fn register(&self, rules: impl IntoIterator<Item = SyncRule>) -> usize {
        let mut registered = self.inner.rules.write();
        let mut added = 0;
        for rule in rules {
            if registered.iter().any(|r| r.name == rule.name) {
                warn!(sync = %rule.name, "sync name already registered, skipping");
                continue;
            }
            info!(sync = %rule.name, patterns = rule.when.len(), "registered sync");
            registered.push(Arc::new(rule));
            added += 1;
        }
        added
    }

    /// Registered rule names in registration order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.inner.rules.read().iter().map(|r| r.name.clone()).collect()
    }

    #[must_use]
    pub fn logging(&self) -> Logging {
        self.inner.logging
    }

    /// Starts a new, empty flow.
    #[must_use]
    pub fn begin_flow(&self) -> SyncContext {
        let id = FlowId(self.inner.next_flow.fetch_add(1, Ordering::Relaxed));
        SyncContext::new(self.clone(), Arc::new(FlowState::new(id)))
    }

    /// Invokes an operation as the root of a new flow and processes every
    /// reaction it causes before returning the operation's result.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error; rule failures are only logged.
    pub async fn invoke(&self, unit: &str, operation: &str, input: Value) -> Result<Value, UnitError> {
        let ctx = self.begin_flow();
        let result = ctx.invoke(unit, operation, input).await;
        ctx.settle().await;
        result
    }

    pub(crate) fn next_action_id(&self) -> ActionId {
        ActionId(self.inner.next_action.fetch_add(1, Ordering::Relaxed))
    }

    fn rules(&self) -> Vec<Arc<SyncRule>> {
        self.inner.rules.read().clone()
    }

    /// Drains the flow's work queue.
    pub(crate) async fn drain(&self, ctx: &SyncContext) {
        let flow = Arc::clone(ctx.state());
        loop {
            if flow.processed() >= self.inner.max_reactions {
                let dropped = flow.abandon();
                if dropped > 0 {
                    error!(
                        flow = %flow.id,
                        limit = self.inner.max_reactions,
                        dropped,
                        "reaction bound reached, abandoning remaining actions"
                    );
                }
                break;
            }
            let Some(record) = flow.next() else {
                break;
            };

            for rule in self.rules() {
                if !rule.triggered_by(&record) {
                    continue;
                }
                let frames = flow.frames_for(&rule, &record);
                if frames.is_empty() {
                    continue;
                }
                self.run_rule(ctx, &rule, &record, frames).await;
            }
        }
    }

    async fn run_rule(&self, ctx: &SyncContext, rule: &SyncRule, trigger: &ActionRecord, frames: Frames) {
        let logging = self.logging();
        if logging.is_verbose() {
            info!(flow = %ctx.flow(), sync = %rule.name, trigger = %trigger.id, frames = ?frames, "sync matched");
        } else if logging.traces() {
            info!(flow = %ctx.flow(), sync = %rule.name, trigger = %trigger.id, frames = frames.len(), "sync matched");
        }

        let frames = match &rule.compute {
            Some(compute) => match AssertUnwindSafe(compute(ctx.clone(), frames)).catch_unwind().await {
                Ok(Ok(frames)) => frames,
                Ok(Err(e)) => {
                    error!(flow = %ctx.flow(), sync = %rule.name, error = %format_args!("{e:#}"), "compute step failed");
                    return;
                }
                Err(_) => {
                    error!(flow = %ctx.flow(), sync = %rule.name, "compute step panicked");
                    return;
                }
            },
            None => frames,
        };

        for frame in &frames {
            for template in &rule.then {
                let input = match template.instantiate(frame) {
                    Ok(input) => input,
                    Err(e) => {
                        warn!(flow = %ctx.flow(), sync = %rule.name, error = %e, "cannot build fired action");
                        continue;
                    }
                };
                if let Err(e) = ctx.invoke(&template.unit, &template.operation, input).await {
                    warn!(
                        flow = %ctx.flow(),
                        sync = %rule.name,
                        action = %format!("{}/{}", template.unit, template.operation),
                        error = %e,
                        "fired action failed"
                    );
                }
            }
        }
    }
}

impl FlowState {
    /// Pops the next queued action and appends it to the history.
    fn next(&self) -> Option<ActionRecord> {
        let record = self.queue.lock().pop_front()?;
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.history.lock().push(record.clone());
        Some(record)
    }

    fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Clears the queue, returning how many actions were dropped.
    fn abandon(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Frames for every way `rule` is satisfied with `record` taking part.
    fn frames_for(&self, rule: &SyncRule, record: &ActionRecord) -> Frames {
        rule.match_frames(record, &self.history.lock())
            .into_iter()
            .map(|(frame, _)| frame)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use mediator_core::{ActionPattern, ActionTemplate, Frame, Term};
    use serde_json::json;

    use super::*;
    use crate::service::operation::OperationDescriptor;
    use crate::service::registry::Unit;

    /// Echoes its input as output; `check` rejects `{"v": "bad"}`.
    struct EchoUnit {
        unit_name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl EchoUnit {
        fn named(unit_name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                unit_name,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl Unit for EchoUnit {
        fn name(&self) -> &'static str {
            self.unit_name
        }

        fn operations(self: Arc<Self>) -> Vec<OperationDescriptor> {
            let echo = |op: &'static str, unit: &Arc<Self>| {
                let calls = Arc::clone(&unit.calls);
                OperationDescriptor::new(unit.unit_name, op, 1, move |mut args: Vec<Value>| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(args.pop().unwrap_or(Value::Null))
                    }
                })
            };
            let calls = Arc::clone(&self.calls);
            let check = OperationDescriptor::new(self.unit_name, "check", 1, move |mut args: Vec<Value>| {
                let calls = Arc::clone(&calls);
                async move {
                    let arg = args.pop().unwrap_or(Value::Null);
                    if arg["v"] == "bad" {
                        return Err(UnitError::rejected("bad value"));
                    }
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(arg)
                }
            });
            vec![echo("x", &self), echo("y", &self), echo("z", &self), check]
        }
    }

    fn engine_with(units: &[&Arc<EchoUnit>], max_reactions: usize) -> Engine {
        let registry = Arc::new(UnitRegistry::new());
        for unit in units {
            registry.register(Arc::clone(unit));
        }
        let config = ServerConfig {
            max_reactions_per_flow: max_reactions,
            ..ServerConfig::default()
        };
        Engine::new(registry, &config)
    }

    fn labels(trace: &[ActionRecord]) -> Vec<String> {
        trace.iter().map(ActionRecord::label).collect()
    }

    #[tokio::test]
    async fn fire_template_invokes_follow_up_action() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let engine = engine_with(&[&a, &b], 100);
        engine.register([SyncRule::new("AtoB")
            .when(ActionPattern::new("A", "x").output("v", Term::var("v")))
            .then(ActionTemplate::new("B", "y").input("v", Term::var("v")))]);

        let ctx = engine.begin_flow();
        let out = ctx.invoke("A", "x", json!({"v": 7})).await.unwrap();
        ctx.settle().await;

        assert_eq!(out, json!({"v": 7}));
        let trace = ctx.trace();
        assert_eq!(labels(&trace), vec!["A/x", "B/y"]);
        assert_eq!(trace[1].input, json!({"v": 7}));
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conjunction_fires_once_both_actions_are_in_the_flow() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let c = EchoUnit::named("C");
        let engine = engine_with(&[&a, &b, &c], 100);
        engine.register([
            SyncRule::new("AtoB")
                .when(ActionPattern::new("A", "x").input("k", Term::var("k")))
                .then(ActionTemplate::new("B", "y").input("k", Term::var("k"))),
            SyncRule::new("AandB")
                .when(ActionPattern::new("A", "x").input("k", Term::var("k")))
                .when(ActionPattern::new("B", "y").input("k", Term::var("k")))
                .then(ActionTemplate::new("C", "z").input("k", Term::var("k"))),
        ]);

        engine.invoke("A", "x", json!({"k": "same"})).await.unwrap();
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compute_can_invoke_and_filter() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let engine = engine_with(&[&a, &b], 100);
        engine.register([SyncRule::new("effects")
            .when(ActionPattern::new("A", "x").input("n", Term::var("n")))
            .compute(|ctx: SyncContext, _frames: Frames| async move {
                ctx.invoke("B", "z", json!({"from": "compute"})).await?;
                Ok::<_, anyhow::Error>(Frames::new())
            })
            .then(ActionTemplate::new("B", "y"))]);

        let ctx = engine.begin_flow();
        ctx.invoke("A", "x", json!({"n": 1})).await.unwrap();
        ctx.settle().await;

        assert_eq!(labels(&ctx.trace()), vec!["A/x", "B/z"]);
    }

    #[tokio::test]
    async fn failing_compute_does_not_stop_other_rules() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let engine = engine_with(&[&a, &b], 100);
        engine.register([
            SyncRule::new("broken")
                .when(ActionPattern::new("A", "x"))
                .compute(|_ctx: SyncContext, _frames: Frames| async move {
                    Err::<Frames, _>(anyhow::anyhow!("boom"))
                })
                .then(ActionTemplate::new("B", "z")),
            SyncRule::new("healthy")
                .when(ActionPattern::new("A", "x"))
                .then(ActionTemplate::new("B", "y")),
        ]);

        let ctx = engine.begin_flow();
        ctx.invoke("A", "x", json!({})).await.unwrap();
        ctx.settle().await;
        assert_eq!(labels(&ctx.trace()), vec!["A/x", "B/y"]);
    }

    #[tokio::test]
    async fn panicking_compute_does_not_end_the_flow() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let engine = engine_with(&[&a, &b], 100);
        engine.register([
            SyncRule::new("panics")
                .when(ActionPattern::new("A", "x"))
                .compute(|_ctx: SyncContext, frames: Frames| async move {
                    if !frames.is_empty() {
                        panic!("compute blew up");
                    }
                    Ok::<_, anyhow::Error>(frames)
                })
                .then(ActionTemplate::new("B", "z")),
            SyncRule::new("after")
                .when(ActionPattern::new("A", "x"))
                .then(ActionTemplate::new("B", "y")),
            SyncRule::new("chained")
                .when(ActionPattern::new("B", "y"))
                .then(ActionTemplate::new("A", "y")),
        ]);

        let ctx = engine.begin_flow();
        ctx.invoke("A", "x", json!({})).await.unwrap();
        ctx.settle().await;
        assert_eq!(labels(&ctx.trace()), vec!["A/x", "B/y", "A/y"]);
    }

    #[tokio::test]
    async fn failed_fire_for_one_frame_keeps_siblings() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let engine = engine_with(&[&a, &b], 100);
        engine.register([SyncRule::new("split")
            .when(ActionPattern::new("A", "x"))
            .compute(|_ctx: SyncContext, _frames: Frames| async move {
                Ok::<_, anyhow::Error>(
                    ["ok", "bad", "fine"]
                        .into_iter()
                        .map(|v| Frame::new().with("v", json!(v)))
                        .collect::<Frames>(),
                )
            })
            .then(ActionTemplate::new("B", "check").input("v", Term::var("v")))]);

        engine.invoke("A", "x", json!({})).await.unwrap();
        assert_eq!(b.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn self_triggering_rule_is_bounded() {
        let a = EchoUnit::named("A");
        let engine = engine_with(&[&a], 25);
        engine.register([SyncRule::new("loop")
            .when(ActionPattern::new("A", "x"))
            .then(ActionTemplate::new("A", "x").input("again", Term::lit(true)))]);

        let ctx = engine.begin_flow();
        ctx.invoke("A", "x", json!({})).await.unwrap();
        ctx.settle().await;

        assert_eq!(ctx.trace().len(), 25);
    }

    #[tokio::test]
    async fn symmetric_pair_fires_once_per_role_assignment() {
        let a = EchoUnit::named("A");
        let b = EchoUnit::named("B");
        let engine = engine_with(&[&a, &b], 100);
        // The second A/x can fill either pattern, with the first filling the
        // other; the first A/x alone satisfies nothing.
        engine.register([SyncRule::new("pair")
            .when(ActionPattern::new("A", "x").input("n", Term::var("first")))
            .when(ActionPattern::new("A", "x").input("n", Term::var("second")))
            .then(ActionTemplate::new("B", "y"))]);

        let ctx = engine.begin_flow();
        ctx.invoke("A", "x", json!({"n": 1})).await.unwrap();
        ctx.invoke("A", "x", json!({"n": 2})).await.unwrap();
        ctx.settle().await;
        assert_eq!(b.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_operation_is_reported() {
        let engine = engine_with(&[], 100);
        let err = engine.invoke("Nope", "missing", json!({})).await.unwrap_err();
        assert!(matches!(err, UnitError::UnknownOperation { .. }));
    }

    #[tokio::test]
    async fn failed_invocation_records_nothing() {
        let a = EchoUnit::named("A");
        let engine = engine_with(&[&a], 100);
        let ctx = engine.begin_flow();
        assert!(ctx.invoke("A", "check", json!({"v": "bad"})).await.is_err());
        ctx.settle().await;
        assert!(ctx.trace().is_empty());
    }

    #[test]
    fn duplicate_rule_names_are_skipped() {
        let engine = engine_with(&[], 100);
        let added = engine.register([
            SyncRule::new("r").when(ActionPattern::new("A", "x")),
            SyncRule::new("r").when(ActionPattern::new("B", "y")),
        ]);
        assert_eq!(added, 1);
        assert_eq!(engine.rule_names(), vec!["r"]);
    }
}
