use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Runs the work behind one task resource type.
///
/// `path` is the part of the resource after the colon, so for
/// `script:/usr/local/bin/resize` the `script` executor receives
/// `/usr/local/bin/resize`. Implementations must stop promptly once
/// `cancel` fires and release what they hold.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
  async fn execute(
    &self,
    cancel: CancellationToken,
    path: &str,
    input: Value,
  ) -> Result<Value, TaskError>;
}
