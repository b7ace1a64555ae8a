//! Raw document shapes, as written by users.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Keeps `null` apart from an absent field: absent is `None`, `null` is
/// `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawDocument {
  pub comment: Option<String>,
  pub start_at: Option<String>,
  pub version: Option<String>,
  pub timeout_seconds: Option<u64>,
  pub states: Option<Map<String, Value>>,
}

/// The union of every field any state type accepts. Fields a type does
/// not use are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawState {
  pub comment: Option<String>,
  pub next: Option<String>,
  pub end: Option<bool>,

  #[serde(default, deserialize_with = "nullable")]
  pub input_path: Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub output_path: Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub result_path: Option<Option<String>>,
  pub parameters: Option<Value>,
  pub result_selector: Option<Value>,
  pub result: Option<Value>,
  pub retry: Option<Vec<Value>>,
  pub catch: Option<Vec<RawCatcher>>,

  pub resource: Option<String>,
  pub timeout_seconds: Option<u64>,

  pub choices: Option<Vec<Value>>,
  pub default: Option<String>,

  pub seconds: Option<u64>,
  pub timestamp: Option<String>,
  pub seconds_path: Option<String>,
  pub timestamp_path: Option<String>,

  pub error: Option<String>,
  pub cause: Option<String>,

  pub branches: Option<Vec<Value>>,
  pub iterator: Option<Value>,
  pub items_path: Option<String>,
  pub max_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawCatcher {
  pub error_equals: Vec<String>,
  pub next: String,
  #[serde(default, deserialize_with = "nullable")]
  pub result_path: Option<Option<String>>,
}
