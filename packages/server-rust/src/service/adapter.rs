//! Argument adapter: maps an inbound body onto the positional argument list
//! an operation expects.
//!
//! Precedence, first match wins:
//! 1. arity 0: no arguments, body ignored
//! 2. array body: elements used verbatim as positional arguments
//! 3. object body, arity 1: the whole document is the single argument
//! 4. object body, arity > 1: values spread in key-insertion order
//! 5. absent body (`null`): one `null` placeholder per declared parameter
//! 6. any other primitive: a single-element argument list
//!
//! The adapter never fails. Shape mismatches surface as operation errors.

use serde_json::Value;
use tracing::debug;

use super::operation::OperationDescriptor;

/// Produces the positional arguments for `descriptor` from `body`.
#[must_use]
pub fn adapt_arguments(descriptor: &OperationDescriptor, body: &Value) -> Vec<Value> {
    let args = adapt_for_arity(descriptor.arity, body);
    if descriptor.arity > 1 && body.is_object() {
        // Key order is the only thing tying fields to parameters here.
        debug!(
            operation = %descriptor.key(),
            arity = descriptor.arity,
            "spreading keyed document positionally"
        );
    }
    args
}

/// Arity-driven core of [`adapt_arguments`].
#[must_use]
pub fn adapt_for_arity(arity: usize, body: &Value) -> Vec<Value> {
    if arity == 0 {
        return Vec::new();
    }
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(doc) if arity == 1 => vec![Value::Object(doc.clone())],
        Value::Object(doc) => doc.values().cloned().collect(),
        Value::Null => vec![Value::Null; arity],
        primitive => vec![primitive.clone()],
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn arity_zero_ignores_body() {
        assert!(adapt_for_arity(0, &json!({"a": 1})).is_empty());
        assert!(adapt_for_arity(0, &json!([1, 2])).is_empty());
    }

    #[test]
    fn array_body_is_positional() {
        assert_eq!(adapt_for_arity(2, &json!(["X", "Y"])), vec![json!("X"), json!("Y")]);
        // Verbatim even when longer than the arity.
        assert_eq!(adapt_for_arity(1, &json!([1, 2, 3])).len(), 3);
    }

    #[test]
    fn single_arity_receives_whole_document() {
        let body = json!({"a": 1, "b": 2});
        assert_eq!(adapt_for_arity(1, &body), vec![body.clone()]);
    }

    #[test]
    fn multi_arity_spreads_in_insertion_order() {
        let body: Value = serde_json::from_str(r#"{"x": 10, "y": 20}"#).unwrap();
        assert_eq!(adapt_for_arity(2, &body), vec![json!(10), json!(20)]);

        let reversed: Value = serde_json::from_str(r#"{"y": 20, "x": 10}"#).unwrap();
        assert_eq!(adapt_for_arity(2, &reversed), vec![json!(20), json!(10)]);
    }

    #[test]
    fn absent_body_fills_placeholders() {
        assert_eq!(adapt_for_arity(3, &Value::Null), vec![Value::Null; 3]);
    }

    #[test]
    fn primitive_body_is_single_argument() {
        assert_eq!(adapt_for_arity(2, &json!("r-1")), vec![json!("r-1")]);
        assert_eq!(adapt_for_arity(1, &json!(42)), vec![json!(42)]);
        assert_eq!(adapt_for_arity(1, &json!(true)), vec![json!(true)]);
    }

    proptest! {
        #[test]
        fn spread_follows_key_order(keys in prop::collection::hash_set("[a-z]{1,6}", 2..6)) {
            let keys: Vec<String> = keys.into_iter().collect();
            let mut doc = serde_json::Map::new();
            for (i, k) in keys.iter().enumerate() {
                doc.insert(k.clone(), json!(i));
            }
            let args = adapt_for_arity(keys.len(), &Value::Object(doc));
            let expected: Vec<Value> = (0..keys.len()).map(|i| json!(i)).collect();
            prop_assert_eq!(args, expected);
        }
    }
}
