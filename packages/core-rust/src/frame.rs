//! Binding environments produced by matching synchronization triggers.
//!
//! A [`Frame`] maps rule-local variable names to concrete values. A trigger can
//! be satisfied several independent ways at once, so matching yields
//! [`Frames`]: an unordered collection in which duplicates are meaningful.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One variable-binding environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    bindings: BTreeMap<String, Value>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `var`, if any.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.bindings.get(var)
    }

    /// Returns the value bound to `var` if it is a string.
    #[must_use]
    pub fn get_str(&self, var: &str) -> Option<&str> {
        self.get(var).and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_bound(&self, var: &str) -> bool {
        self.bindings.contains_key(var)
    }

    /// Binds `var` to `value`, replacing any previous binding.
    ///
    /// Matching never rebinds; this is for compute steps that enrich frames.
    pub fn bind(&mut self, var: impl Into<String>, value: Value) {
        self.bindings.insert(var.into(), value);
    }

    /// Builder form of [`Frame::bind`].
    #[must_use]
    pub fn with(mut self, var: impl Into<String>, value: Value) -> Self {
        self.bind(var, value);
        self
    }

    /// Unifies `var` with `value`.
    ///
    /// Succeeds when `var` is free (binding it) or already bound to an equal
    /// value. Returns `false` on conflict and leaves the frame untouched.
    pub fn unify(&mut self, var: &str, value: &Value) -> bool {
        match self.bindings.get(var) {
            Some(existing) => existing == value,
            None => {
                self.bindings.insert(var.to_string(), value.clone());
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Frame {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Multiset of frames flowing through a rule's compute and fire steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frames(Vec<Frame>);

impl Frames {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.0.push(frame);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.0.iter()
    }
}

impl From<Vec<Frame>> for Frames {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames)
    }
}

impl FromIterator<Frame> for Frames {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Frames {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Frames {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
