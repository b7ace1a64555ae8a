use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_asl::{CompileError, Workflow, compile_str};

/// A registered workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
  pub name: String,
  /// The document as it was registered.
  pub asl: String,
  pub workflow: Arc<Workflow>,
  pub created_at: DateTime<Utc>,
}

impl WorkflowRecord {
  /// Compile `asl` into a record stamped with the current time.
  pub fn compile(name: impl Into<String>, asl: impl Into<String>) -> Result<Self, CompileError> {
    let asl = asl.into();
    let workflow = compile_str(&asl)?;
    Ok(Self {
      name: name.into(),
      asl,
      workflow: Arc::new(workflow),
      created_at: Utc::now(),
    })
  }
}
