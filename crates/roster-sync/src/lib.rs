//! Cleanse pipeline: load, normalize, partition, persist, export.

use std::path::Path;
use std::time::Duration;

use roster_core::Partition;
use roster_source::{load, normalize_records, LoadError, NormalizeReport};
use roster_storage::{
    ArtifactStore, PgRecordStore, PgStoreConfig, RecordSink, StoreError, StoredArtifact, Table,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};

mod config;
mod export;
mod partition;

pub use config::{default_run_token, CleanseConfig};
pub use export::{render_clean_json, render_rejected_csv};
pub use partition::partition;

pub const CRATE_NAME: &str = "roster-sync";

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("run token {0:?} cannot name an artifact file")]
    InvalidRunToken(String),
    #[error(transparent)]
    Artifact(#[from] anyhow::Error),
}

/// Normalized and partitioned snapshot, before anything is written.
#[derive(Debug, Clone)]
pub struct StagedSnapshot {
    pub partition: Partition,
    pub report: NormalizeReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
}

impl From<StoredArtifact> for ArtifactSummary {
    fn from(stored: StoredArtifact) -> Self {
        Self {
            path: stored.absolute_path.display().to_string(),
            sha256: stored.content_hash,
            bytes: stored.byte_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub clean_count: usize,
    pub rejected_count: usize,
    pub run_token: String,
    pub missing_dates: usize,
    pub dropped_track_ids: usize,
    pub clean_table_total: i64,
    pub reject_table_total: i64,
    pub clean_artifact: ArtifactSummary,
    pub rejected_artifact: ArtifactSummary,
}

pub struct CleansePipeline {
    config: CleanseConfig,
    artifacts: ArtifactStore,
    sink: Box<dyn RecordSink>,
}

impl CleansePipeline {
    pub fn new(config: CleanseConfig, sink: Box<dyn RecordSink>) -> Self {
        let artifacts = ArtifactStore::new(config.output_dir.clone());
        Self {
            config,
            artifacts,
            sink,
        }
    }

    pub fn config(&self) -> &CleanseConfig {
        &self.config
    }

    /// Load, normalize and partition a snapshot without touching the store.
    pub async fn stage(&self, source_path: &Path) -> Result<StagedSnapshot, RunError> {
        let raw = load(source_path).await?;
        let (records, report) = normalize_records(raw);
        let partition = partition(records);
        info!(
            clean = partition.clean.len(),
            rejected = partition.rejected.len(),
            "partitioned snapshot"
        );
        Ok(StagedSnapshot { partition, report })
    }

    /// Runs the configured snapshot under the configured run token.
    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let source_path = self.config.source_path.clone();
        let run_token = self.config.run_token.clone();
        self.run(&source_path, &run_token).await
    }

    /// Processes one snapshot. The sink is closed whether or not the run succeeds.
    pub async fn run(&self, source_path: &Path, run_token: &str) -> Result<RunSummary, RunError> {
        let span = info_span!("cleanse_run", run_token);
        let result = self.execute(source_path, run_token).instrument(span).await;
        self.sink.close().await;
        match &result {
            Ok(summary) => info!(
                run_token,
                clean = summary.clean_count,
                rejected = summary.rejected_count,
                "cleanse run completed"
            ),
            Err(err) => error!(run_token, error = %err, "cleanse run failed"),
        }
        result
    }

    async fn execute(&self, source_path: &Path, run_token: &str) -> Result<RunSummary, RunError> {
        validate_run_token(run_token)?;
        info!(source = %source_path.display(), "starting cleanse run");

        let StagedSnapshot { partition, report } = self.stage(source_path).await?;

        self.sink.prepare().await?;
        self.sink.append(Table::Clean, &partition.clean).await?;
        self.sink.append(Table::Rejected, &partition.rejected).await?;

        let clean_artifact = self
            .artifacts
            .write(
                &ArtifactStore::clean_artifact_name(run_token),
                &render_clean_json(&partition.clean)?,
            )
            .await?;
        let rejected_artifact = self
            .artifacts
            .write(
                &ArtifactStore::rejected_artifact_name(run_token),
                &render_rejected_csv(&partition.rejected)?,
            )
            .await?;

        let clean_table_total = self.sink.count(Table::Clean).await?;
        let reject_table_total = self.sink.count(Table::Rejected).await?;
        info!(
            clean_table_total,
            reject_table_total, "table totals after append"
        );

        Ok(RunSummary {
            clean_count: partition.clean.len(),
            rejected_count: partition.rejected.len(),
            run_token: run_token.to_string(),
            missing_dates: report.missing_dates,
            dropped_track_ids: report.dropped_track_ids,
            clean_table_total,
            reject_table_total,
            clean_artifact: clean_artifact.into(),
            rejected_artifact: rejected_artifact.into(),
        })
    }
}

fn validate_run_token(run_token: &str) -> Result<(), RunError> {
    let usable = !run_token.is_empty()
        && run_token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if usable {
        Ok(())
    } else {
        Err(RunError::InvalidRunToken(run_token.to_string()))
    }
}

pub fn pg_store_config(config: &CleanseConfig) -> PgStoreConfig {
    PgStoreConfig {
        database_url: config.database_url.clone(),
        max_connections: config.max_connections,
        timeout: Duration::from_secs(config.store_timeout_secs),
    }
}

/// Connects to Postgres and processes the configured snapshot once.
pub async fn run_once_with_config(config: CleanseConfig) -> Result<RunSummary, RunError> {
    let store = PgRecordStore::connect(&pg_store_config(&config)).await?;
    CleansePipeline::new(config, Box::new(store)).run_once().await
}

pub async fn run_once_from_env() -> Result<RunSummary, RunError> {
    run_once_with_config(CleanseConfig::from_env()).await
}

/// Creates both tables if they do not exist yet.
pub async fn migrate_with_config(config: &CleanseConfig) -> Result<(), RunError> {
    let store = PgRecordStore::connect(&pg_store_config(config)).await?;
    let result = store.prepare().await;
    store.close().await;
    Ok(result?)
}
