use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use waypoint_asl::{Workflow, compile_reader};
use waypoint_engine::{ExecutionStatus, Runtime, RuntimeConfig};
use waypoint_server::AppState;
use waypoint_store::{SqliteStore, WorkflowRecord, WorkflowStore};

/// Waypoint - A state-machine workflow engine
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.waypoint)
  #[arg(long, global = true, env = "WAYPOINT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Also write logs to <dir>/dt=YYYYMMDD/<uuid>.log
  #[arg(long, global = true)]
  log: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile and run a workflow document
  StartExecution {
    /// Path to the workflow document
    #[arg(long)]
    asl: PathBuf,

    /// Path to the input JSON (default: stdin, or {} when stdin is a terminal)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Execution timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
  },

  /// Manage registered workflows
  Workflow {
    #[command(subcommand)]
    command: WorkflowCommand,
  },

  /// Serve the HTTP interface
  Serve {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,
  },
}

#[derive(Subcommand)]
enum WorkflowCommand {
  /// Register a workflow under a name
  Register {
    name: String,

    /// Path to the workflow document
    #[arg(long)]
    asl: PathBuf,

    /// Replace an existing workflow with the same name
    #[arg(long)]
    force: bool,
  },

  /// List registered workflows
  List,

  /// Run a registered workflow
  Exec {
    name: String,

    /// Path to the input JSON (default: stdin, or {} when stdin is a terminal)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Execution timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
  },

  /// Remove a registered workflow
  Rm { name: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.log.as_deref())?;

  let Some(command) = cli.command else {
    println!("waypoint - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".waypoint"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  let result = rt.block_on(run(command, data_dir));
  if let Err(e) = &result {
    error!(error = %format!("{:#}", e), "command failed");
  }
  result
}

async fn run(command: Commands, data_dir: PathBuf) -> Result<()> {
  match command {
    Commands::StartExecution {
      asl,
      input,
      timeout,
    } => {
      let workflow = load_document(&asl)?;
      let input = read_input(input.as_deref())?;
      execute(Arc::new(workflow), input, timeout).await
    }
    Commands::Workflow { command } => {
      let store = open_store(&data_dir).await?;
      match command {
        WorkflowCommand::Register { name, asl, force } => {
          let source = fs::read_to_string(&asl)
            .with_context(|| format!("failed to read workflow file: {}", asl.display()))?;
          let record = WorkflowRecord::compile(&name, source)
            .with_context(|| format!("failed to compile workflow file: {}", asl.display()))?;
          store
            .save_workflow(&record, force)
            .await
            .with_context(|| format!("failed to register workflow '{}'", name))?;
          info!(workflow = %name, "workflow registered");
        }
        WorkflowCommand::List => {
          for name in store.list_workflows().await? {
            println!("{}", name);
          }
        }
        WorkflowCommand::Exec {
          name,
          input,
          timeout,
        } => {
          let record = store
            .load_workflow(&name)
            .await
            .with_context(|| format!("failed to load workflow '{}'", name))?;
          let input = read_input(input.as_deref())?;
          execute(record.workflow, input, timeout).await?;
        }
        WorkflowCommand::Rm { name } => {
          store
            .delete_workflow(&name)
            .await
            .with_context(|| format!("failed to remove workflow '{}'", name))?;
          info!(workflow = %name, "workflow removed");
        }
      }
      Ok(())
    }
    Commands::Serve { addr } => {
      let store = open_store(&data_dir).await?;
      let state = AppState::new(Arc::new(store), Runtime::new(RuntimeConfig::default()));
      let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

      let shutdown = state.shutdown.clone();
      tokio::spawn(cancel_on_ctrl_c(shutdown));

      waypoint_server::serve(listener, state).await.context("server failed")
    }
  }
}

async fn execute(workflow: Arc<Workflow>, input: serde_json::Value, timeout: Option<u64>) -> Result<()> {
  let config = RuntimeConfig {
    timeout: timeout.filter(|t| *t > 0).map(Duration::from_secs),
    ..RuntimeConfig::default()
  };
  let runtime = Runtime::new(config);

  let cancel = CancellationToken::new();
  tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

  let result = runtime
    .execute(workflow, input, cancel)
    .await
    .context("workflow execution failed")?;

  match result.status {
    ExecutionStatus::Succeeded => {
      println!("{}", serde_json::to_string_pretty(&result.output)?);
      Ok(())
    }
    ExecutionStatus::Failed { error, cause } => bail!(
      "execution {} failed: {}: {}",
      result.execution_id,
      error.as_deref().unwrap_or("Fail"),
      cause.as_deref().unwrap_or_default()
    ),
  }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
  if tokio::signal::ctrl_c().await.is_ok() {
    warn!("interrupted, cancelling");
    cancel.cancel();
  }
}

async fn open_store(data_dir: &Path) -> Result<SqliteStore> {
  fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  SqliteStore::open(&data_dir.join("waypoint.db"))
    .await
    .context("failed to open workflow store")
}

fn load_document(path: &Path) -> Result<Workflow> {
  let file = File::open(path).with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  compile_reader(BufReader::new(file))
    .with_context(|| format!("failed to compile workflow file: {}", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  let text = match path {
    Some(path) => {
      fs::read_to_string(path).with_context(|| format!("failed to read input file: {}", path.display()))?
    }
    None if io::stdin().is_terminal() => String::new(),
    None => {
      let mut text = String::new();
      io::stdin()
        .read_to_string(&mut text)
        .context("failed to read input from stdin")?;
      text
    }
  };

  if text.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&text).context("failed to parse input JSON")
  }
}

fn log_file_path(dir: &Path) -> PathBuf {
  dir
    .join(format!("dt={}", chrono::Utc::now().format("%Y%m%d")))
    .join(format!("{}.log", uuid::Uuid::new_v4()))
}

fn init_logging(log_dir: Option<&Path>) -> Result<()> {
  let file_layer = match log_dir {
    Some(dir) => {
      let path = log_file_path(dir);
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
          .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
      }
      let file = File::create(&path).with_context(|| format!("failed to create log file: {}", path.display()))?;
      Some(
        tracing_subscriber::fmt::layer()
          .with_ansi(false)
          .with_writer(Mutex::new(file)),
      )
    }
    None => None,
  };

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .with(file_layer)
    .init();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_log_file_path_layout() {
    let path = log_file_path(Path::new("/var/log/waypoint"));
    let partition = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
    assert!(partition.starts_with("dt="));
    assert_eq!(partition.len(), "dt=YYYYMMDD".len());
    assert_eq!(path.extension().unwrap(), "log");
  }

  #[test]
  fn test_read_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.json");

    fs::write(&path, r#"{ "a": 1 }"#).unwrap();
    assert_eq!(read_input(Some(&path)).unwrap(), serde_json::json!({ "a": 1 }));

    fs::write(&path, "  \n").unwrap();
    assert_eq!(read_input(Some(&path)).unwrap(), serde_json::json!({}));

    fs::write(&path, "{ nope").unwrap();
    assert!(read_input(Some(&path)).is_err());
  }

  #[test]
  fn test_load_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");

    fs::write(&path, r#"{ "StartAt": "a1", "States": { "a1": { "Type": "Succeed" } } }"#).unwrap();
    assert_eq!(load_document(&path).unwrap().start_at(), "a1");

    fs::write(&path, r#"{ "States": {} }"#).unwrap();
    assert!(load_document(&path).is_err());
    assert!(load_document(&dir.path().join("missing.json")).is_err());
  }

  #[test]
  fn test_cli_parses_commands() {
    let cli = Cli::try_parse_from([
      "waypoint",
      "start-execution",
      "--asl",
      "flow.json",
      "--input",
      "in.json",
      "--timeout",
      "30",
      "--log",
      "/tmp/logs",
    ])
    .unwrap();
    assert_eq!(cli.log, Some(PathBuf::from("/tmp/logs")));
    assert!(matches!(
      cli.command,
      Some(Commands::StartExecution { timeout: Some(30), .. })
    ));

    let cli = Cli::try_parse_from(["waypoint", "workflow", "register", "greet", "--asl", "flow.json", "--force"])
      .unwrap();
    assert!(matches!(
      cli.command,
      Some(Commands::Workflow {
        command: WorkflowCommand::Register { force: true, .. }
      })
    ));
  }
}
