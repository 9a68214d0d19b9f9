use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use roster_core::{NormalizedRecord, COLUMNS};
use sqlx::error::ErrorKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, info_span, Instrument};

use crate::sink::{RecordSink, StoreError, StoreRow, Table};

// 13 binds per row keeps each statement well under the 65535 parameter cap.
const INSERT_CHUNK_ROWS: usize = 1000;

#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub timeout: Duration,
}

/// Postgres-backed sink for the `data` and `data_reject` tables.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgRecordStore {
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.timeout)
            .connect(&config.database_url)
            .await
            .map_err(StoreError::Connect)?;
        info!("store connection established");
        Ok(Self {
            pool,
            timeout: config.timeout,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout {
                operation,
                seconds: self.timeout.as_secs(),
            })?
    }

    async fn insert_rows(&self, table: Table, rows: Vec<StoreRow>) -> Result<u64, StoreError> {
        let write_error = |source: sqlx::Error| classify_write_error(table, source);
        let mut tx = self.pool.begin().await.map_err(write_error)?;
        let mut appended = 0u64;

        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk = rows.by_ref().take(INSERT_CHUNK_ROWS).collect::<Vec<_>>();
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}) ",
                table.name(),
                COLUMNS.join(", ")
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.dates)
                    .push_bind(row.ids)
                    .push_bind(row.names)
                    .push_bind(row.monthly_listeners)
                    .push_bind(row.popularity)
                    .push_bind(row.followers)
                    .push_bind(row.genres)
                    .push_bind(row.first_release)
                    .push_bind(row.last_release)
                    .push_bind(row.num_releases)
                    .push_bind(row.num_tracks)
                    .push_bind(row.playlists_found)
                    .push_bind(row.feat_track_ids);
            });
            let result = builder.build().execute(&mut *tx).await.map_err(write_error)?;
            appended += result.rows_affected();
        }

        tx.commit().await.map_err(write_error)?;
        Ok(appended)
    }
}

fn classify_write_error(table: Table, source: sqlx::Error) -> StoreError {
    if let Some(db) = source.as_database_error() {
        if matches!(
            db.kind(),
            ErrorKind::UniqueViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation
        ) {
            return StoreError::Constraint {
                table,
                detail: db.message().to_string(),
            };
        }
    }
    StoreError::Write { table, source }
}

#[async_trait]
impl RecordSink for PgRecordStore {
    async fn prepare(&self) -> Result<(), StoreError> {
        self.bounded("schema migration", async {
            sqlx::migrate!("../../migrations").run(&self.pool).await?;
            Ok::<(), StoreError>(())
        })
        .await
    }

    async fn append(&self, table: Table, records: &[NormalizedRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let rows = records.iter().map(StoreRow::from).collect::<Vec<_>>();
        let span = info_span!("store_append", table = table.name(), rows = rows.len());
        let appended = self
            .bounded("table append", self.insert_rows(table, rows))
            .instrument(span)
            .await?;
        info!(table = table.name(), appended, "appended rows");
        Ok(appended)
    }

    async fn count(&self, table: Table) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        self.bounded("table count", async {
            sqlx::query_scalar::<_, i64>(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|source| StoreError::Write { table, source })
        })
        .await
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("store connection closed");
    }
}
