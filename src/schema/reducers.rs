//! Built-in per-key reducers for [`MapSchema`](super::MapSchema).
//!
//! A reducer combines the current value under a key with an incoming update
//! for the same key. Reducers must be pure; where parallel siblings update
//! the same key they should also be associative, since the executor folds
//! parallel results left-to-right.

use std::sync::Arc;

use serde_json::Value;

use super::map::SharedValue;
use super::{json_type_name, SchemaError};

/// Combines the current and incoming values stored under one key.
pub trait Reducer: Send + Sync {
    /// Merge `incoming` into `current`, returning the stored result.
    fn combine(
        &self,
        key: &str,
        current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError>;
}

/// Replace the current value with the incoming one.
#[derive(Clone, Copy, Debug, Default)]
pub struct Overwrite;

impl Reducer for Overwrite {
    fn combine(
        &self,
        _key: &str,
        _current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        Ok(Arc::clone(incoming))
    }
}

/// Keep the current value and ignore the incoming one.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepCurrent;

impl Reducer for KeepCurrent {
    fn combine(
        &self,
        _key: &str,
        current: &SharedValue,
        _incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        Ok(Arc::clone(current))
    }
}

/// Append to a sequence.
///
/// The current value must be an array. An incoming array is concatenated;
/// an incoming scalar is pushed as a single element.
#[derive(Clone, Copy, Debug, Default)]
pub struct Append;

impl Reducer for Append {
    fn combine(
        &self,
        key: &str,
        current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        let Value::Array(base) = &**current else {
            return Err(SchemaError::TypeMismatch {
                key: key.to_string(),
                expected: "array",
                found: json_type_name(current),
            });
        };
        let mut merged = base.clone();
        match &**incoming {
            Value::Array(items) => merged.extend(items.iter().cloned()),
            other => merged.push(other.clone()),
        }
        Ok(Arc::new(Value::Array(merged)))
    }
}

/// Add numeric values. Integers stay integral when both sides are integral.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

impl Reducer for Sum {
    fn combine(
        &self,
        key: &str,
        current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        match (current.as_i64(), incoming.as_i64()) {
            (Some(a), Some(b)) => return Ok(Arc::new(Value::from(a + b))),
            _ => {}
        }
        let (Some(a), Some(b)) = (current.as_f64(), incoming.as_f64()) else {
            let offender = if current.as_f64().is_none() {
                current
            } else {
                incoming
            };
            return Err(SchemaError::TypeMismatch {
                key: key.to_string(),
                expected: "number",
                found: json_type_name(offender),
            });
        };
        Ok(Arc::new(Value::from(a + b)))
    }
}

/// Keep the smaller of two numeric values.
#[derive(Clone, Copy, Debug, Default)]
pub struct Min;

impl Reducer for Min {
    fn combine(
        &self,
        key: &str,
        current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        pick_numeric(key, current, incoming, |a, b| a <= b)
    }
}

/// Keep the larger of two numeric values.
#[derive(Clone, Copy, Debug, Default)]
pub struct Max;

impl Reducer for Max {
    fn combine(
        &self,
        key: &str,
        current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        pick_numeric(key, current, incoming, |a, b| a >= b)
    }
}

fn pick_numeric(
    key: &str,
    current: &SharedValue,
    incoming: &SharedValue,
    keep_current: impl Fn(f64, f64) -> bool,
) -> Result<SharedValue, SchemaError> {
    let (Some(a), Some(b)) = (current.as_f64(), incoming.as_f64()) else {
        let offender = if current.as_f64().is_none() {
            current
        } else {
            incoming
        };
        return Err(SchemaError::TypeMismatch {
            key: key.to_string(),
            expected: "number",
            found: json_type_name(offender),
        });
    };
    if keep_current(a, b) {
        Ok(Arc::clone(current))
    } else {
        Ok(Arc::clone(incoming))
    }
}

/// Append message sequences, deduplicating by each item's `"id"` field.
///
/// Incoming items whose `"id"` already occurs in the current sequence are
/// skipped; items without an id are always appended.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppendMessages;

impl Reducer for AppendMessages {
    fn combine(
        &self,
        key: &str,
        current: &SharedValue,
        incoming: &SharedValue,
    ) -> Result<SharedValue, SchemaError> {
        let Value::Array(base) = &**current else {
            return Err(SchemaError::TypeMismatch {
                key: key.to_string(),
                expected: "array",
                found: json_type_name(current),
            });
        };
        let Value::Array(items) = &**incoming else {
            return Err(SchemaError::TypeMismatch {
                key: key.to_string(),
                expected: "array",
                found: json_type_name(incoming),
            });
        };
        let seen: Vec<&str> = base.iter().filter_map(message_id).collect();
        let mut merged = base.clone();
        for item in items {
            match message_id(item) {
                Some(id) if seen.contains(&id) => continue,
                _ => merged.push(item.clone()),
            }
        }
        Ok(Arc::new(Value::Array(merged)))
    }
}

fn message_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shared(v: Value) -> SharedValue {
        Arc::new(v)
    }

    #[test]
    fn append_concatenates_arrays() {
        let merged = Append
            .combine("k", &shared(json!(["a"])), &shared(json!(["b", "c"])))
            .unwrap();
        assert_eq!(*merged, json!(["a", "b", "c"]));
    }

    #[test]
    fn append_pushes_scalar() {
        let merged = Append
            .combine("k", &shared(json!([1])), &shared(json!(2)))
            .unwrap();
        assert_eq!(*merged, json!([1, 2]));
    }

    #[test]
    fn append_rejects_non_sequence_current() {
        let err = Append
            .combine("k", &shared(json!("x")), &shared(json!(["y"])))
            .unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn sum_keeps_integers_integral() {
        let merged = Sum
            .combine("k", &shared(json!(2)), &shared(json!(3)))
            .unwrap();
        assert_eq!(*merged, json!(5));
    }

    #[test]
    fn sum_falls_back_to_float() {
        let merged = Sum
            .combine("k", &shared(json!(1.5)), &shared(json!(2)))
            .unwrap();
        assert_eq!(merged.as_f64(), Some(3.5));
    }

    #[test]
    fn min_max_pick_operands() {
        let min = Min
            .combine("k", &shared(json!(4)), &shared(json!(2)))
            .unwrap();
        assert_eq!(*min, json!(2));
        let max = Max
            .combine("k", &shared(json!(4)), &shared(json!(2)))
            .unwrap();
        assert_eq!(*max, json!(4));
    }

    #[test]
    fn append_messages_dedupes_by_id() {
        let current = shared(json!([{"id": "m1", "content": "hi"}]));
        let incoming = shared(json!([
            {"id": "m1", "content": "hi"},
            {"id": "m2", "content": "there"},
            {"content": "no id"}
        ]));
        let merged = AppendMessages.combine("k", &current, &incoming).unwrap();
        let items = merged.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1]["id"], json!("m2"));
    }

    #[test]
    fn overwrite_and_keep_current() {
        let cur = shared(json!(1));
        let new = shared(json!(2));
        assert_eq!(*Overwrite.combine("k", &cur, &new).unwrap(), json!(2));
        assert_eq!(*KeepCurrent.combine("k", &cur, &new).unwrap(), json!(1));
    }
}
