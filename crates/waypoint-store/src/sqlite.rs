use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use waypoint_asl::Workflow;

use crate::{StoreError, WorkflowRecord, WorkflowStore};

#[derive(FromRow)]
struct WorkflowRow {
  name: String,
  asl: String,
  workflow: Json<Workflow>,
  created_at: DateTime<Utc>,
}

impl From<WorkflowRow> for WorkflowRecord {
  fn from(row: WorkflowRow) -> Self {
    Self {
      name: row.name,
      asl: row.asl,
      workflow: Arc::new(row.workflow.0),
      created_at: row.created_at,
    }
  }
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database file at `path` and migrate it.
  pub async fn open(path: &Path) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    debug!(path = %path.display(), "workflow store opened");
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!().run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl WorkflowStore for SqliteStore {
  async fn save_workflow(&self, record: &WorkflowRecord, replace: bool) -> Result<(), StoreError> {
    let sql = if replace {
      r#"
      INSERT INTO workflows (name, asl, workflow, created_at)
      VALUES (?, ?, ?, ?)
      ON CONFLICT(name) DO UPDATE
      SET asl = excluded.asl, workflow = excluded.workflow, created_at = excluded.created_at
      "#
    } else {
      r#"
      INSERT INTO workflows (name, asl, workflow, created_at)
      VALUES (?, ?, ?, ?)
      "#
    };

    let result = sqlx::query(sql)
      .bind(&record.name)
      .bind(&record.asl)
      .bind(Json(record.workflow.as_ref()))
      .bind(record.created_at)
      .execute(&self.pool)
      .await;

    match result {
      Ok(_) => Ok(()),
      Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::AlreadyExists {
        name: record.name.clone(),
      }),
      Err(e) => Err(e.into()),
    }
  }

  async fn load_workflow(&self, name: &str) -> Result<WorkflowRecord, StoreError> {
    let row: Option<WorkflowRow> = sqlx::query_as(
      r#"
      SELECT name, asl, workflow, created_at
      FROM workflows
      WHERE name = ?
      "#,
    )
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;

    row.map(WorkflowRecord::from).ok_or_else(|| StoreError::NotFound {
      name: name.to_string(),
    })
  }

  async fn delete_workflow(&self, name: &str) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM workflows WHERE name = ?")
      .bind(name)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::NotFound {
        name: name.to_string(),
      });
    }
    Ok(())
  }

  async fn list_workflows(&self) -> Result<Vec<String>, StoreError> {
    let names = sqlx::query_scalar("SELECT name FROM workflows ORDER BY name ASC")
      .fetch_all(&self.pool)
      .await?;
    Ok(names)
  }
}
