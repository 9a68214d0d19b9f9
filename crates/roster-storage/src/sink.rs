use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use roster_core::{integral_text, parse_integral, render_list_literal, NormalizedRecord};
use thiserror::Error;
use tokio::sync::Mutex;

/// The two append-only tables the pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Clean,
    Rejected,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::Clean => "data",
            Self::Rejected => "data_reject",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to store: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("preparing store schema: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{table} rejected rows: {detail}")]
    Constraint { table: Table, detail: String },
    #[error("writing to {table}: {source}")]
    Write {
        table: Table,
        #[source]
        source: sqlx::Error,
    },
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

/// Column values of one stored row. List fields are stored as literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRow {
    pub dates: Option<NaiveDate>,
    pub ids: Option<String>,
    pub names: Option<String>,
    pub monthly_listeners: Option<i64>,
    pub popularity: Option<i32>,
    pub followers: Option<i64>,
    pub genres: String,
    pub first_release: Option<String>,
    pub last_release: Option<String>,
    pub num_releases: Option<i32>,
    pub num_tracks: Option<i32>,
    pub playlists_found: Option<String>,
    pub feat_track_ids: String,
}

fn int32(raw: Option<&str>) -> Option<i32> {
    raw.and_then(parse_integral)
        .and_then(|value| i32::try_from(value).ok())
}

impl From<&NormalizedRecord> for StoreRow {
    fn from(record: &NormalizedRecord) -> Self {
        Self {
            dates: record.dates.as_date(),
            ids: record.ids.clone(),
            names: record.names.clone(),
            monthly_listeners: record.monthly_listeners.as_deref().and_then(parse_integral),
            popularity: int32(record.popularity.as_deref()),
            followers: record.followers.as_deref().and_then(parse_integral),
            genres: render_list_literal(&record.genres),
            first_release: integral_text(record.first_release.as_deref()),
            last_release: integral_text(record.last_release.as_deref()),
            num_releases: int32(record.num_releases.as_deref()),
            num_tracks: int32(record.num_tracks.as_deref()),
            playlists_found: record.playlists_found.clone(),
            feat_track_ids: render_list_literal(&record.feat_track_ids),
        }
    }
}

/// Persistent destination for both partitions.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Ensures both tables exist.
    async fn prepare(&self) -> Result<(), StoreError>;

    /// Appends rows in order. A rejected row fails the whole call.
    async fn append(&self, table: Table, records: &[NormalizedRecord]) -> Result<u64, StoreError>;

    /// Total rows currently held by `table`.
    async fn count(&self, table: Table) -> Result<i64, StoreError>;

    /// Releases the connection. Called once on every exit path of a run.
    async fn close(&self);
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    async fn prepare(&self) -> Result<(), StoreError> {
        (**self).prepare().await
    }

    async fn append(&self, table: Table, records: &[NormalizedRecord]) -> Result<u64, StoreError> {
        (**self).append(table, records).await
    }

    async fn count(&self, table: Table) -> Result<i64, StoreError> {
        (**self).count(table).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// In-process sink with the same key constraint as the clean table.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<Table, Vec<StoreRow>>>,
    closed: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self, table: Table) -> Vec<StoreRow> {
        self.tables
            .lock()
            .await
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for MemoryRecordStore {
    async fn prepare(&self) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.entry(Table::Clean).or_default();
        tables.entry(Table::Rejected).or_default();
        Ok(())
    }

    async fn append(&self, table: Table, records: &[NormalizedRecord]) -> Result<u64, StoreError> {
        let rows = records.iter().map(StoreRow::from).collect::<Vec<_>>();
        let mut tables = self.tables.lock().await;
        let existing = tables.entry(table).or_default();

        if table == Table::Clean {
            let mut seen = existing
                .iter()
                .filter_map(|row| row.ids.clone())
                .collect::<HashSet<_>>();
            for row in &rows {
                let Some(key) = &row.ids else {
                    return Err(StoreError::Constraint {
                        table,
                        detail: "null value in column \"ids\"".to_string(),
                    });
                };
                if !seen.insert(key.clone()) {
                    return Err(StoreError::Constraint {
                        table,
                        detail: format!("duplicate key ids={key}"),
                    });
                }
            }
        }

        let appended = rows.len() as u64;
        existing.extend(rows);
        Ok(appended)
    }

    async fn count(&self, table: Table) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.get(&table).map_or(0, Vec::len) as i64)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::DateValue;

    fn record(ids: Option<&str>) -> NormalizedRecord {
        NormalizedRecord {
            ids: ids.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn store_row_coerces_numbers_to_null_and_lists_to_literals() {
        let row = StoreRow::from(&NormalizedRecord {
            dates: DateValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).expect("date")),
            ids: Some("1".into()),
            monthly_listeners: Some("1000000.0".into()),
            popularity: Some("high".into()),
            num_tracks: Some("99999999999".into()),
            first_release: Some("2020.0".into()),
            genres: vec!["pop".into(), "rock".into()],
            ..Default::default()
        });
        assert_eq!(row.monthly_listeners, Some(1_000_000));
        assert_eq!(row.popularity, None);
        assert_eq!(row.num_tracks, None);
        assert_eq!(row.followers, None);
        assert_eq!(row.first_release.as_deref(), Some("2020"));
        assert_eq!(row.genres, "['pop', 'rock']");
        assert_eq!(row.feat_track_ids, "[]");
    }

    #[tokio::test]
    async fn clean_table_rejects_duplicate_keys_without_partial_append() {
        let store = MemoryRecordStore::new();
        store.prepare().await.expect("prepare");
        store
            .append(Table::Clean, &[record(Some("1"))])
            .await
            .expect("first append");

        let err = store
            .append(Table::Clean, &[record(Some("2")), record(Some("1"))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { table: Table::Clean, .. }));
        assert_eq!(store.count(Table::Clean).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn reject_table_accepts_repeated_keys() {
        let store = MemoryRecordStore::new();
        let appended = store
            .append(Table::Rejected, &[record(Some("1")), record(Some("1")), record(None)])
            .await
            .expect("append");
        assert_eq!(appended, 3);
        assert_eq!(store.rows(Table::Rejected).await.len(), 3);
        assert!(store
            .append(Table::Clean, &[record(None)])
            .await
            .is_err());
    }
}
