//! Retry and Catch policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use waypoint_path::ReferencePath;

use crate::names::{ErrorName, STATES_ALL};
use crate::state::PathSpec;

fn default_interval_seconds() -> u64 {
  1
}

fn default_max_attempts() -> u32 {
  3
}

fn default_backoff_rate() -> f64 {
  2.0
}

/// One entry of a state's `Retry` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Retrier {
  pub error_equals: Vec<String>,
  #[serde(default = "default_interval_seconds")]
  pub interval_seconds: u64,
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_backoff_rate")]
  pub backoff_rate: f64,
}

impl Retrier {
  /// `States.ALL` only covers errors that are retried by default; anything
  /// else has to be named.
  pub fn matches(&self, error: &ErrorName) -> bool {
    self.error_equals.iter().any(|name| {
      if name == STATES_ALL {
        error.is_retried_by_default()
      } else {
        name == error.as_str()
      }
    })
  }

  /// Delay before retry number `attempt` (0-based). Saturates at
  /// `Duration::MAX` once the backoff overflows.
  pub fn delay(&self, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let seconds = self.interval_seconds as f64 * self.backoff_rate.powi(exponent);
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
  }

  pub(crate) fn validate(&self) -> Result<(), String> {
    validate_error_equals(&self.error_equals)?;
    if !(self.backoff_rate >= 1.0 && self.backoff_rate.is_finite()) {
      return Err(format!("BackoffRate must be at least 1.0, got {}", self.backoff_rate));
    }
    if self.interval_seconds == 0 {
      return Err("IntervalSeconds must be positive".to_string());
    }
    Ok(())
  }
}

/// One entry of a state's `Catch` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catcher {
  pub error_equals: Vec<String>,
  pub next: String,
  /// Where the error object is written into the state's input. `None`
  /// means `$`.
  pub result_path: Option<PathSpec<ReferencePath>>,
}

impl Catcher {
  pub fn matches(&self, error: &ErrorName) -> bool {
    self
      .error_equals
      .iter()
      .any(|name| name == STATES_ALL || name == error.as_str())
  }
}

/// `States.ALL` has to stand alone, and the list can't be empty.
pub(crate) fn validate_error_equals(names: &[String]) -> Result<(), String> {
  if names.is_empty() {
    return Err("ErrorEquals must not be empty".to_string());
  }
  if names.len() > 1 && names.iter().any(|name| name == STATES_ALL) {
    return Err(format!("{} must appear alone in ErrorEquals", STATES_ALL));
  }
  Ok(())
}

/// A `States.ALL` entry must be the last one in its list.
pub(crate) fn validate_all_is_last<'a>(lists: impl Iterator<Item = &'a [String]>) -> Result<(), String> {
  let lists: Vec<&[String]> = lists.collect();
  let last = lists.len().saturating_sub(1);
  for (i, names) in lists.iter().enumerate() {
    if i != last && names.iter().any(|name| name == STATES_ALL) {
      return Err(format!("{} must be in the last entry", STATES_ALL));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_retrier_defaults() {
    let retrier: Retrier = serde_json::from_value(json!({ "ErrorEquals": ["States.ALL"] })).unwrap();
    assert_eq!(retrier.interval_seconds, 1);
    assert_eq!(retrier.max_attempts, 3);
    assert_eq!(retrier.backoff_rate, 2.0);
  }

  #[test]
  fn test_retrier_delay() {
    let retrier: Retrier = serde_json::from_value(json!({
      "ErrorEquals": ["States.TaskFailed"],
      "IntervalSeconds": 2,
      "BackoffRate": 1.5
    }))
    .unwrap();
    assert_eq!(retrier.delay(0), Duration::from_secs(2));
    assert_eq!(retrier.delay(1), Duration::from_secs(3));
    assert_eq!(retrier.delay(2), Duration::from_secs_f64(4.5));
  }

  #[test]
  fn test_retrier_delay_saturates() {
    let retrier: Retrier = serde_json::from_value(json!({
      "ErrorEquals": ["States.TaskFailed"],
      "BackoffRate": 1e300
    }))
    .unwrap();
    assert!(retrier.validate().is_ok());
    assert_eq!(retrier.delay(0), Duration::from_secs(1));
    assert_eq!(retrier.delay(2), Duration::MAX);

    let retrier: Retrier = serde_json::from_value(json!({
      "ErrorEquals": ["States.TaskFailed"],
      "MaxAttempts": 1100
    }))
    .unwrap();
    assert_eq!(retrier.delay(1024), Duration::MAX);
    assert_eq!(retrier.delay(u32::MAX), Duration::MAX);
  }

  #[test]
  fn test_retrier_all_skips_data_errors() {
    let retrier: Retrier = serde_json::from_value(json!({ "ErrorEquals": ["States.ALL"] })).unwrap();
    assert!(retrier.matches(&ErrorName::TaskFailed));
    assert!(retrier.matches(&ErrorName::Custom("Oops".to_string())));
    assert!(!retrier.matches(&ErrorName::ParameterPathFailure));

    let named: Retrier =
      serde_json::from_value(json!({ "ErrorEquals": ["States.ParameterPathFailure"] })).unwrap();
    assert!(named.matches(&ErrorName::ParameterPathFailure));
  }

  #[test]
  fn test_catcher_all_matches_everything() {
    let catcher = Catcher {
      error_equals: vec![STATES_ALL.to_string()],
      next: "Recover".to_string(),
      result_path: None,
    };
    assert!(catcher.matches(&ErrorName::NoChoiceMatched));
    assert!(catcher.matches(&ErrorName::Custom("X".to_string())));
  }

  #[test]
  fn test_validation() {
    assert!(validate_error_equals(&[]).is_err());
    assert!(validate_error_equals(&["States.ALL".to_string(), "X".to_string()]).is_err());
    assert!(validate_error_equals(&["A".to_string(), "B".to_string()]).is_ok());

    let lists = [vec![STATES_ALL.to_string()], vec!["A".to_string()]];
    assert!(validate_all_is_last(lists.iter().map(Vec::as_slice)).is_err());
    let lists = [vec!["A".to_string()], vec![STATES_ALL.to_string()]];
    assert!(validate_all_is_last(lists.iter().map(Vec::as_slice)).is_ok());

    let bad: Retrier =
      serde_json::from_value(json!({ "ErrorEquals": ["A"], "BackoffRate": 0.5 })).unwrap();
    assert!(bad.validate().is_err());
  }
}
