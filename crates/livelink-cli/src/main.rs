//! Dry-run traversal driver.
//!
//! Runs the Livelink traversal against a JSON repository fixture and
//! prints every document as a JSON line, committing checkpoints to a file
//! so repeated runs pick up where the last one stopped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use livelink_connector::config::ConnectorConfig;
use livelink_connector::runtime::{DocumentSink, RuntimeConfig, TraversalRuntime};
use livelink_connector::store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use livelink_connector::testing::MockRepository;
use livelink_connector::{ConnectorError, Document, LivelinkConfig, TraversalManager};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Livelink crawl - replay a traversal against a repository fixture
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository fixture (JSON)
    #[arg(short, long)]
    fixture: PathBuf,

    /// Checkpoint file; without one every run starts over
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Stop after this many document batches
    #[arg(long)]
    batches: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Configuration file layout.
///
/// ```toml
/// [connector]
/// included.location.nodes = [2000]
/// batch.size = 50
/// track.deleted.items = true
/// ```
///
/// A key that is also a prefix of another, such as `genealogist` next to
/// `genealogist.cache.max`, must be quoted.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    connector: toml::Table,
}

/// Flattens nested tables back into dotted keys; arrays become
/// comma-separated lists.
fn flatten(prefix: &str, table: &toml::Table, out: &mut ConnectorConfig) -> Result<()> {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten(&key, inner, out)?,
            toml::Value::Array(items) => {
                let parts = items.iter().map(scalar).collect::<Result<Vec<_>>>()?;
                out.set(key, parts.join(","));
            }
            other => out.set(key, scalar(other)?),
        }
    }
    Ok(())
}

fn scalar(value: &toml::Value) -> Result<String> {
    Ok(match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            anyhow::bail!("nested value not allowed here: {value}")
        }
    })
}

fn load_config(path: Option<&Path>) -> Result<LivelinkConfig> {
    let mut config = ConnectorConfig::new("livelink");
    if let Some(path) = path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: FileConfig =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        flatten("", &file.connector, &mut config)?;
    }
    for key in config.unknown_keys(&LivelinkConfig::config_keys()) {
        warn!(key, "ignoring unknown configuration key");
    }
    Ok(LivelinkConfig::from_config(&config)?)
}

/// Writes each document as one JSON line on stdout.
struct JsonLinesSink {
    out: std::io::Stdout,
}

#[async_trait]
impl DocumentSink for JsonLinesSink {
    async fn write_batch(&mut self, documents: Vec<Document>) -> Result<(), ConnectorError> {
        let mut out = self.out.lock();
        for doc in &documents {
            serde_json::to_writer(&mut out, doc).map_err(std::io::Error::from)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectorError> {
        self.out.lock().flush()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the documents.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("livelink_connector={0},livelink_crawl={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref())?;
    let fixture = std::fs::read_to_string(&args.fixture)
        .with_context(|| format!("reading {}", args.fixture.display()))?;
    let repo = MockRepository::from_json(&fixture)?;
    let manager = TraversalManager::new(repo, config)?;
    let metrics = Arc::clone(manager.metrics());

    let store: Arc<dyn CheckpointStore> = match args.checkpoint {
        Some(ref path) => Arc::new(FileCheckpointStore::new(path)),
        None => Arc::new(MemoryCheckpointStore::new()),
    };
    let runtime = TraversalRuntime::new(RuntimeConfig {
        stop_when_caught_up: true,
        max_batches: args.batches,
        ..RuntimeConfig::default()
    });

    let handle = runtime.spawn(
        manager,
        Arc::clone(&store),
        JsonLinesSink {
            out: std::io::stdout(),
        },
    );
    handle.join().await?;

    let snapshot = metrics.snapshot();
    info!(
        batches = snapshot.batches,
        documents = snapshot.documents,
        deletes = snapshot.deletes,
        queries = snapshot.queries,
        "traversal finished"
    );
    match store.load()? {
        Some(checkpoint) => eprintln!("checkpoint: {checkpoint}"),
        None => eprintln!("checkpoint: (none)"),
    }
    Ok(())
}
