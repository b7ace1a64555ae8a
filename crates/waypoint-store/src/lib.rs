//! Waypoint Store
//!
//! Persistence for registered workflows, keyed by name. Each record keeps
//! the source document alongside the compiled [`Workflow`], so a stored
//! workflow can be executed without recompiling and shown as written.
//!
//! The [`WorkflowStore`] trait has two implementations:
//! - [`SqliteStore`], backed by `sqlx` with an embedded migration
//! - [`MemoryStore`], for tests and embedding

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::WorkflowRecord;

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// No workflow is registered under the name.
  #[error("workflow not found: {name}")]
  NotFound { name: String },

  /// A workflow is already registered under the name.
  #[error("workflow already exists: {name}")]
  AlreadyExists { name: String },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running the schema migration failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for registered workflows.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
  /// Save a workflow. An existing record with the same name is replaced
  /// only when `replace` is set.
  async fn save_workflow(&self, record: &WorkflowRecord, replace: bool) -> Result<(), StoreError>;

  /// Load a workflow by name.
  async fn load_workflow(&self, name: &str) -> Result<WorkflowRecord, StoreError>;

  /// Delete a workflow by name.
  async fn delete_workflow(&self, name: &str) -> Result<(), StoreError>;

  /// Names of every registered workflow, sorted.
  async fn list_workflows(&self) -> Result<Vec<String>, StoreError>;
}
