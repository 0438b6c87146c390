//! Action patterns for synchronization triggers and action templates for
//! the actions a synchronization fires.
//!
//! A pattern is a conjunction: exact unit and operation names plus one
//! [`Term`] per named input/output field. Matching a completed
//! [`ActionRecord`] against a pattern under an existing [`Frame`] either
//! extends the frame or fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::Frame;
use crate::types::{ActionRecord, Document};

/// One position in a pattern or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Logical variable: binds when free, must be equal when already bound.
    Var(String),
    /// Literal value compared by deep equality.
    Lit(Value),
    /// Field must be present; its value is not captured.
    Any,
}

impl Term {
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    #[must_use]
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Lit(value.into())
    }

    /// Matches `value` under `frame`, binding into it on success.
    fn unify(&self, frame: &mut Frame, value: &Value) -> bool {
        match self {
            Term::Var(name) => frame.unify(name, value),
            Term::Lit(expected) => expected == value,
            Term::Any => true,
        }
    }
}

/// Errors raised when instantiating an [`ActionTemplate`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PatternError {
    #[error("variable `{var}` is not bound in frame")]
    Unbound { var: String },
    #[error("wildcard cannot be instantiated (field `{field}`)")]
    Wildcard { field: String },
}

/// Trigger pattern matched against completed actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPattern {
    pub unit: String,
    pub operation: String,
    pub input: Vec<(String, Term)>,
    pub output: Vec<(String, Term)>,
    /// Variable bound to the whole input document, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_doc: Option<String>,
}

impl ActionPattern {
    #[must_use]
    pub fn new(unit: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            operation: operation.into(),
            input: Vec::new(),
            output: Vec::new(),
            input_doc: None,
        }
    }

    /// Binds the entire input document to `var`, so optional fields stay
    /// reachable without constraining them.
    #[must_use]
    pub fn input_doc(mut self, var: impl Into<String>) -> Self {
        self.input_doc = Some(var.into());
        self
    }

    /// Adds a constraint on an input field.
    #[must_use]
    pub fn input(mut self, field: impl Into<String>, term: Term) -> Self {
        self.input.push((field.into(), term));
        self
    }

    /// Adds a constraint on an output field.
    #[must_use]
    pub fn output(mut self, field: impl Into<String>, term: Term) -> Self {
        self.output.push((field.into(), term));
        self
    }

    /// Whether `record` names this pattern's unit and operation.
    #[must_use]
    pub fn targets(&self, record: &ActionRecord) -> bool {
        self.unit == record.unit && self.operation == record.operation
    }

    /// Matches `record` under `frame`.
    ///
    /// Returns the extended frame, or `None` when names differ, a constrained
    /// field is missing, a literal differs, or a variable conflicts with an
    /// existing binding. Records without output never match a pattern that
    /// constrains output fields.
    #[must_use]
    pub fn match_record(&self, frame: &Frame, record: &ActionRecord) -> Option<Frame> {
        if !self.targets(record) {
            return None;
        }
        let mut next = frame.clone();
        if let Some(var) = &self.input_doc {
            if !next.unify(var, &record.input) {
                return None;
            }
        }
        for (field, term) in &self.input {
            let value = record.input_field(field)?;
            if !term.unify(&mut next, value) {
                return None;
            }
        }
        for (field, term) in &self.output {
            let value = record.output_field(field)?;
            if !term.unify(&mut next, value) {
                return None;
            }
        }
        Some(next)
    }
}

/// Action fired by a synchronization once per resulting frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub unit: String,
    pub operation: String,
    pub input: Vec<(String, Term)>,
}

impl ActionTemplate {
    #[must_use]
    pub fn new(unit: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            operation: operation.into(),
            input: Vec::new(),
        }
    }

    #[must_use]
    pub fn input(mut self, field: impl Into<String>, term: Term) -> Self {
        self.input.push((field.into(), term));
        self
    }

    /// Builds the input document for this template from `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Unbound`] when a variable has no binding and
    /// [`PatternError::Wildcard`] when a template position is `Any`.
    pub fn instantiate(&self, frame: &Frame) -> Result<Value, PatternError> {
        let mut doc = Document::new();
        for (field, term) in &self.input {
            let value = match term {
                Term::Var(var) => frame
                    .get(var)
                    .cloned()
                    .ok_or_else(|| PatternError::Unbound { var: var.clone() })?,
                Term::Lit(value) => value.clone(),
                Term::Any => return Err(PatternError::Wildcard { field: field.clone() }),
            };
            doc.insert(field.clone(), value);
        }
        Ok(Value::Object(doc))
    }
}
