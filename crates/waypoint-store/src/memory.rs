use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{StoreError, WorkflowRecord, WorkflowStore};

/// In-memory store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
  workflows: RwLock<BTreeMap<String, WorkflowRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
  async fn save_workflow(&self, record: &WorkflowRecord, replace: bool) -> Result<(), StoreError> {
    let mut workflows = self.workflows.write().await;
    if !replace && workflows.contains_key(&record.name) {
      return Err(StoreError::AlreadyExists {
        name: record.name.clone(),
      });
    }
    workflows.insert(record.name.clone(), record.clone());
    Ok(())
  }

  async fn load_workflow(&self, name: &str) -> Result<WorkflowRecord, StoreError> {
    self
      .workflows
      .read()
      .await
      .get(name)
      .cloned()
      .ok_or_else(|| StoreError::NotFound {
        name: name.to_string(),
      })
  }

  async fn delete_workflow(&self, name: &str) -> Result<(), StoreError> {
    match self.workflows.write().await.remove(name) {
      Some(_) => Ok(()),
      None => Err(StoreError::NotFound {
        name: name.to_string(),
      }),
    }
  }

  async fn list_workflows(&self) -> Result<Vec<String>, StoreError> {
    Ok(self.workflows.read().await.keys().cloned().collect())
  }
}
