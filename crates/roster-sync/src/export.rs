//! Rendering of the per-run artifacts.

use anyhow::{anyhow, Context, Result};
use roster_core::{
    integral_text, parse_integral, render_list_literal, DateValue, NormalizedRecord, COLUMNS,
};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct CleanDocument<'a> {
    row_count: usize,
    data: Vec<CleanEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct CleanEntry<'a> {
    dates: DateValue,
    ids: &'a str,
    names: &'a str,
    monthly_listeners: i64,
    popularity: i64,
    followers: i64,
    genres: &'a [String],
    first_release: String,
    last_release: String,
    num_releases: i64,
    num_tracks: i64,
    playlists_found: &'a str,
    feat_track_ids: &'a [String],
}

/// Whole part of a numeric cell. Fractional values truncate toward zero.
fn truncated_number(text: &str) -> Option<i64> {
    parse_integral(text).or_else(|| {
        let value = text.trim().parse::<f64>().ok()?;
        let whole = value.trunc();
        (value.is_finite() && whole.abs() < i64::MAX as f64).then_some(whole as i64)
    })
}

/// Missing and unparseable numbers are written as `0`; only the log tells them apart.
fn json_number(ids: &str, field: &'static str, raw: Option<&str>) -> i64 {
    match raw {
        None => {
            debug!(ids, field, "missing numeric value written as 0");
            0
        }
        Some(text) => truncated_number(text).unwrap_or_else(|| {
            warn!(ids, field, raw = text, "unparseable numeric value written as 0");
            0
        }),
    }
}

impl<'a> CleanEntry<'a> {
    fn new(record: &'a NormalizedRecord) -> Self {
        let ids = record.ids.as_deref().unwrap_or_default();
        Self {
            dates: record.dates,
            ids,
            names: record.names.as_deref().unwrap_or_default(),
            monthly_listeners: json_number(
                ids,
                "monthly_listeners",
                record.monthly_listeners.as_deref(),
            ),
            popularity: json_number(ids, "popularity", record.popularity.as_deref()),
            followers: json_number(ids, "followers", record.followers.as_deref()),
            genres: &record.genres,
            first_release: integral_text(record.first_release.as_deref()).unwrap_or_default(),
            last_release: integral_text(record.last_release.as_deref()).unwrap_or_default(),
            num_releases: json_number(ids, "num_releases", record.num_releases.as_deref()),
            num_tracks: json_number(ids, "num_tracks", record.num_tracks.as_deref()),
            playlists_found: record.playlists_found.as_deref().unwrap_or_default(),
            feat_track_ids: &record.feat_track_ids,
        }
    }
}

/// `{"row_count": n, "data": [...]}`, pretty-printed with two-space indent.
pub fn render_clean_json(clean: &[NormalizedRecord]) -> Result<Vec<u8>> {
    let document = CleanDocument {
        row_count: clean.len(),
        data: clean.iter().map(CleanEntry::new).collect(),
    };
    serde_json::to_vec_pretty(&document).context("serializing clean records")
}

/// Delimited text with the source column order and a header row.
pub fn render_rejected_csv(rejected: &[NormalizedRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(COLUMNS)
        .context("writing rejected csv header")?;
    for record in rejected {
        let cell = |value: &Option<String>| value.clone().unwrap_or_default();
        writer
            .write_record([
                record.dates.to_cell(),
                cell(&record.ids),
                cell(&record.names),
                cell(&record.monthly_listeners),
                cell(&record.popularity),
                cell(&record.followers),
                render_list_literal(&record.genres),
                cell(&record.first_release),
                cell(&record.last_release),
                cell(&record.num_releases),
                cell(&record.num_tracks),
                cell(&record.playlists_found),
                render_list_literal(&record.feat_track_ids),
            ])
            .with_context(|| format!("writing rejected row ids={}", cell(&record.ids)))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("flushing rejected csv: {}", err.error()))
}
