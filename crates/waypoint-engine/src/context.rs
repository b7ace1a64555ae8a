//! Context object contents.
//!
//! ```text
//!   $$.Execution.Id / .Input / .StartTime   set once per execution
//!   $$.State.Name / .EnteredTime / .RetryCount   set on every state entry
//!   $$.Map.Item.Index / .Value   set for each Map iteration
//! ```

use chrono::Utc;
use serde_json::{Map, Value, json};
use waypoint_asl::Timestamp;
use waypoint_path::ContextObject;

fn now() -> String {
  Timestamp::from(Utc::now()).to_string()
}

/// Returns a copy of `context` with the top-level `key` replaced.
fn with_section(context: &ContextObject, key: &str, section: Value) -> ContextObject {
  let mut map = match context.value() {
    Value::Object(map) => map.clone(),
    _ => Map::new(),
  };
  map.insert(key.to_string(), section);
  ContextObject::from_value(Value::Object(map))
}

pub(crate) fn for_execution(execution_id: &str, input: &Value) -> ContextObject {
  ContextObject::from_value(json!({
    "Execution": {
      "Id": execution_id,
      "Input": input,
      "StartTime": now(),
    }
  }))
}

pub(crate) fn enter_state(context: &ContextObject, name: &str, retry_count: u32) -> ContextObject {
  with_section(
    context,
    "State",
    json!({
      "Name": name,
      "EnteredTime": now(),
      "RetryCount": retry_count,
    }),
  )
}

pub(crate) fn for_map_item(context: &ContextObject, index: usize, item: &Value) -> ContextObject {
  with_section(
    context,
    "Map",
    json!({ "Item": { "Index": index, "Value": item } }),
  )
}
