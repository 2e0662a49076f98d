#![allow(dead_code)]

pub mod nodes;

pub use nodes::*;

use std::sync::Arc;

use serde_json::{json, Value};
use stepgraph::schema::{Append, MapSchema, MapState, Sum};

/// Map state seeded with a `messages` array.
pub fn messages_state(items: &[&str]) -> MapState {
    MapState::new().with("messages", json!(items))
}

/// Schema appending to the `messages` key.
pub fn append_schema() -> MapSchema {
    MapSchema::new()
        .with_initial(MapState::new().with("messages", json!([])))
        .with_reducer("messages", Arc::new(Append))
}

/// Schema summing the `count` key.
pub fn sum_schema() -> MapSchema {
    MapSchema::new()
        .with_initial(MapState::new().with("count", json!(0)))
        .with_reducer("count", Arc::new(Sum))
}

/// The `messages` array of a state, as plain strings.
pub fn messages_of(state: &MapState) -> Vec<String> {
    state
        .get("messages")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The `count` key of a state.
pub fn count_of(state: &MapState) -> i64 {
    state.get("count").and_then(Value::as_i64).unwrap_or(0)
}
