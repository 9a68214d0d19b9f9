//! Core data model for the artist roster cleanser.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

pub const CRATE_NAME: &str = "roster-core";

/// Source columns in snapshot order. Output artifacts and store tables follow it.
pub const COLUMNS: [&str; 13] = [
    "dates",
    "ids",
    "names",
    "monthly_listeners",
    "popularity",
    "followers",
    "genres",
    "first_release",
    "last_release",
    "num_releases",
    "num_tracks",
    "playlists_found",
    "feat_track_ids",
];

/// One snapshot row as read from disk. Blank cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRecord {
    pub dates: Option<String>,
    pub ids: Option<String>,
    pub names: Option<String>,
    pub monthly_listeners: Option<String>,
    pub popularity: Option<String>,
    pub followers: Option<String>,
    pub genres: Option<String>,
    pub first_release: Option<String>,
    pub last_release: Option<String>,
    pub num_releases: Option<String>,
    pub num_tracks: Option<String>,
    pub playlists_found: Option<String>,
    pub feat_track_ids: Option<String>,
}

impl RawRecord {
    /// Builds a record from cells aligned with [`COLUMNS`].
    pub fn from_cells(mut cells: [Option<String>; 13]) -> Self {
        let mut take = |idx: usize| cells[idx].take();
        Self {
            dates: take(0),
            ids: take(1),
            names: take(2),
            monthly_listeners: take(3),
            popularity: take(4),
            followers: take(5),
            genres: take(6),
            first_release: take(7),
            last_release: take(8),
            num_releases: take(9),
            num_tracks: take(10),
            playlists_found: take(11),
            feat_track_ids: take(12),
        }
    }
}

/// A calendar date, or the explicit marker for a cell that did not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateValue {
    Date(NaiveDate),
    #[default]
    Missing,
}

impl DateValue {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// `YYYY-MM-DD`, or an empty string when missing.
    pub fn to_cell(&self) -> String {
        match self {
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
            Self::Missing => String::new(),
        }
    }
}

impl Serialize for DateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Date(date) => serializer.collect_str(&date.format("%Y-%m-%d")),
            Self::Missing => serializer.serialize_none(),
        }
    }
}

/// A snapshot row after field-level cleansing.
///
/// Numeric columns stay textual here; they are coerced when a sink or an
/// artifact needs a number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedRecord {
    pub dates: DateValue,
    pub ids: Option<String>,
    pub names: Option<String>,
    pub monthly_listeners: Option<String>,
    pub popularity: Option<String>,
    pub followers: Option<String>,
    pub genres: Vec<String>,
    pub first_release: Option<String>,
    pub last_release: Option<String>,
    pub num_releases: Option<String>,
    pub num_tracks: Option<String>,
    pub playlists_found: Option<String>,
    pub feat_track_ids: Vec<String>,
}

impl NormalizedRecord {
    /// Primary key used for duplicate detection.
    pub fn key(&self) -> Option<&str> {
        self.ids.as_deref()
    }
}

/// Clean (first occurrence per key) and rejected (later duplicates) rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub clean: Vec<NormalizedRecord>,
    pub rejected: Vec<NormalizedRecord>,
}

impl Partition {
    pub fn total(&self) -> usize {
        self.clean.len() + self.rejected.len()
    }
}

/// Parses a numeric cell as an integer.
///
/// Float text is accepted when it has no fractional part (`"1000.0"`).
pub fn parse_integral(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Integer text for a numeric cell that parses, otherwise the cell as given.
///
/// Keeps year columns such as `2020.0` from a float export in their `2020` form.
pub fn integral_text(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    Some(match parse_integral(raw) {
        Some(value) => value.to_string(),
        None => raw.to_string(),
    })
}

/// Renders a sequence as a bracketed literal, e.g. `['pop', 'rock']`.
///
/// The output parses back through the list-literal path of the normalizer.
pub fn render_list_literal(items: &[String]) -> String {
    let mut out = String::from("[");
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        out.push_str(&quote_literal(item));
    }
    out.push(']');
    out
}

/// Quotes one element the way [`render_list_literal`] does.
pub fn quote_literal(item: &str) -> String {
    let mut out = String::with_capacity(item.len() + 2);
    let quote = if item.contains('\'') && !item.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for ch in item.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
