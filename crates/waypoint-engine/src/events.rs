//! Execution events and notifiers for observability.
//!
//! Events are emitted as an execution moves through its states so callers
//! can follow progress, persist history or stream it elsewhere.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// Execution has started.
  ExecutionStarted {
    execution_id: String,
    start_at: String,
  },

  /// A state was entered. Also emitted for states inside Parallel
  /// branches and Map iterations.
  StateEntered {
    execution_id: String,
    state: String,
    input: serde_json::Value,
  },

  /// A state finished and produced its output.
  StateExited {
    execution_id: String,
    state: String,
    output: serde_json::Value,
  },

  /// A state failed and will be retried after `delay_ms`.
  StateRetried {
    execution_id: String,
    state: String,
    error: String,
    attempt: u32,
    delay_ms: u64,
  },

  /// A state failed and a catcher routed execution to `next`.
  StateCaught {
    execution_id: String,
    state: String,
    error: String,
    next: String,
  },

  /// Execution reached a Succeed state or an End transition.
  ExecutionSucceeded {
    execution_id: String,
    output: serde_json::Value,
  },

  /// Execution ended at a Fail state or with an unhandled error.
  ExecutionFailed { execution_id: String, error: String },
}

/// Receives execution events.
///
/// `notify` is called inline by the runtime, so implementations should
/// return quickly.
pub trait ExecutionNotifier: Send + Sync {
  /// Called when an execution event occurs.
  fn notify(&self, event: ExecutionEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
