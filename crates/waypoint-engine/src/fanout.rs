//! Concurrent sub-workflow runs for Parallel and Map.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use waypoint_asl::{ErrorName, Workflow};
use waypoint_path::ContextObject;

use crate::error::{Halt, StatesError};
use crate::events::ExecutionNotifier;
use crate::runtime::{Runtime, Scope};

/// One sub-workflow run.
pub(crate) struct Job {
  pub workflow: Arc<Workflow>,
  pub input: Value,
  pub context: ContextObject,
}

impl<N: ExecutionNotifier + 'static> Runtime<N> {
  /// Runs every job and returns their outputs in job order.
  ///
  /// At most `limit` jobs run at once; zero means no limit. The first
  /// failure cancels the remaining jobs.
  pub(crate) async fn fan_out(&self, jobs: Vec<Job>, limit: usize, scope: &Scope) -> Result<Vec<Value>, Halt> {
    let token = scope.cancel.child_token();
    let _siblings = token.clone().drop_guard();
    let semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));

    let mut results = vec![Value::Null; jobs.len()];
    let mut join_set = JoinSet::new();

    for (index, job) in jobs.into_iter().enumerate() {
      let runtime = self.clone();
      let semaphore = semaphore.clone();
      let child = Scope {
        execution_id: scope.execution_id.clone(),
        cancel: token.clone(),
      };

      join_set.spawn(async move {
        let _permit = match semaphore {
          Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => return (index, Err(Halt::Cancelled)),
          },
          None => None,
        };
        let result = runtime
          .run_workflow(job.workflow, job.input, job.context, child)
          .await;
        (index, result)
      });
    }

    loop {
      tokio::select! {
        joined = join_set.join_next() => match joined {
          None => break,
          Some(Ok((index, Ok(output)))) => results[index] = output,
          Some(Ok((index, Err(halt)))) => {
            warn!(execution_id = %scope.execution_id, branch = index, "branch failed, cancelling siblings");
            wind_down(&token, &mut join_set).await;
            return Err(halt.into_branch_failure(index));
          }
          Some(Err(e)) => {
            wind_down(&token, &mut join_set).await;
            return Err(Halt::Error(StatesError::new(ErrorName::Runtime, e)));
          }
        },
        _ = scope.cancel.cancelled() => {
          wind_down(&token, &mut join_set).await;
          return Err(Halt::Cancelled);
        }
      }
    }

    Ok(results)
  }
}

/// Cancels the remaining jobs and waits for them to observe it.
async fn wind_down<T: 'static>(token: &CancellationToken, join_set: &mut JoinSet<T>) {
  token.cancel();
  while join_set.join_next().await.is_some() {}
}
