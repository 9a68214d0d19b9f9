//! Field-level cleansing of raw snapshot rows.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use roster_core::{DateValue, NormalizedRecord, RawRecord};
use tracing::{info, warn};

use crate::literal::parse_list_literal;

/// Length of a well-formed track identifier.
pub const TRACK_ID_LEN: usize = 22;

/// How many invalid identifiers are echoed per row before truncating.
const INVALID_ID_LOG_LIMIT: usize = 5;

/// Drops every character outside 7-bit ASCII.
pub fn ascii_clean(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

pub fn normalize_name(raw: &str) -> String {
    ascii_clean(&raw.to_uppercase())
}

/// Parses a list-shaped cell of the row keyed `ids`.
///
/// A cell starting with `[` is first read as a list literal. When that fails the
/// cell is split on commas exactly like an unbracketed cell, so stray bracket
/// characters stay on the outer tokens.
pub fn parse_list_field(raw: Option<&str>, ids: &str) -> Vec<String> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Vec::new();
    };
    if raw.trim_start().starts_with('[') {
        match parse_list_literal(raw) {
            Ok(items) => {
                return items
                    .iter()
                    .map(|item| ascii_clean(item.trim()))
                    .collect();
            }
            Err(err) => {
                warn!(
                    ids,
                    raw,
                    error = %err,
                    "list literal did not parse; falling back to comma split"
                );
            }
        }
    }
    split_list(raw)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ascii_clean)
        .collect()
}

pub fn is_track_id(candidate: &str) -> bool {
    candidate.len() == TRACK_ID_LEN && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Candidates of an identifier cell sorted into kept and dropped, in cell order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSplit {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

pub fn split_identifiers(raw: Option<&str>) -> IdentifierSplit {
    let mut split = IdentifierSplit::default();
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return split;
    };
    let candidates: Vec<&str> = if raw.contains(',') {
        raw.split(',').map(str::trim).collect()
    } else {
        vec![raw.trim()]
    };
    for candidate in candidates {
        if is_track_id(candidate) {
            split.valid.push(ascii_clean(candidate));
        } else {
            split.invalid.push(candidate.to_string());
        }
    }
    split
}

/// Splits an identifier cell of the row keyed `ids`, logging what gets dropped.
pub fn filter_identifiers(raw: Option<&str>, ids: &str) -> IdentifierSplit {
    let split = split_identifiers(raw);
    if !split.invalid.is_empty() {
        let shown = &split.invalid[..split.invalid.len().min(INVALID_ID_LOG_LIMIT)];
        let more = if split.invalid.len() > INVALID_ID_LOG_LIMIT {
            " and more"
        } else {
            ""
        };
        warn!(
            ids,
            field = "feat_track_ids",
            dropped = split.invalid.len(),
            "invalid track ids dropped: {shown:?}{more}"
        );
    }
    split
}

/// Keeps the well-formed identifiers of a cell and logs the rest.
pub fn parse_identifier_list(raw: Option<&str>, ids: &str) -> Vec<String> {
    filter_identifiers(raw, ids).valid
}

const YEAR_FIRST_DATETIME: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

// Day-first layouts come before their month-first twins so `03/04/2024` reads
// as 3 April; the month-first ones still catch `12/25/2024`.
const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m.%d.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const DAY_FIRST_DATETIME: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TWO_DIGIT_YEAR: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y", "%m/%d/%y", "%m-%d-%y"];

/// Reads a date cell, preferring day-first when the layout is ambiguous.
pub fn normalize_date(raw: Option<&str>) -> DateValue {
    let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DateValue::Missing;
    };
    parse_date(text).map_or(DateValue::Missing, DateValue::Date)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let four_digit = |date: NaiveDate| (1000..=9999).contains(&date.year());

    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.date_naive());
    }
    YEAR_FIRST_DATETIME
        .iter()
        .chain(DAY_FIRST_DATETIME)
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .map(|stamp| stamp.date())
        .filter(|date| four_digit(*date))
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .filter_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .find(|date| four_digit(*date))
        })
        .or_else(|| {
            TWO_DIGIT_YEAR
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
        })
}

/// Counters for the recoverable per-row issues of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows: usize,
    pub missing_dates: usize,
    pub dropped_track_ids: usize,
}

pub fn normalize_record(raw: RawRecord) -> NormalizedRecord {
    normalize_row(raw).0
}

/// Normalized row plus the number of track ids dropped from it.
fn normalize_row(raw: RawRecord) -> (NormalizedRecord, usize) {
    let ids = raw.ids.as_deref().unwrap_or_default();
    let dates = normalize_date(raw.dates.as_deref());
    if dates.is_missing() {
        warn!(
            ids,
            field = "dates",
            raw = raw.dates.as_deref().unwrap_or_default(),
            "unparseable date; using missing sentinel"
        );
    }
    let genres = parse_list_field(raw.genres.as_deref(), ids);
    let IdentifierSplit { valid, invalid } =
        filter_identifiers(raw.feat_track_ids.as_deref(), ids);

    let record = NormalizedRecord {
        dates,
        names: raw.names.as_deref().map(normalize_name),
        monthly_listeners: raw.monthly_listeners,
        popularity: raw.popularity,
        followers: raw.followers,
        genres,
        first_release: raw.first_release,
        last_release: raw.last_release,
        num_releases: raw.num_releases,
        num_tracks: raw.num_tracks,
        playlists_found: raw.playlists_found.as_deref().map(ascii_clean),
        feat_track_ids: valid,
        ids: raw.ids,
    };
    (record, invalid.len())
}

/// Normalizes every row, keeping cardinality and order.
pub fn normalize_records(rows: Vec<RawRecord>) -> (Vec<NormalizedRecord>, NormalizeReport) {
    let mut report = NormalizeReport {
        rows: rows.len(),
        ..Default::default()
    };
    let records = rows
        .into_iter()
        .map(|raw| {
            let span =
                tracing::debug_span!("normalize_row", ids = raw.ids.as_deref().unwrap_or_default());
            let _guard = span.enter();
            let (record, dropped) = normalize_row(raw);
            report.dropped_track_ids += dropped;
            if record.dates.is_missing() {
                report.missing_dates += 1;
            }
            record
        })
        .collect::<Vec<_>>();

    if report.missing_dates > 0 {
        warn!(count = report.missing_dates, "rows with missing or invalid dates");
    }
    info!(
        rows = report.rows,
        dropped_track_ids = report.dropped_track_ids,
        "normalized snapshot rows"
    );
    (records, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture_info_logs;

    fn date(y: i32, m: u32, d: u32) -> DateValue {
        DateValue::Date(NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
    }

    #[test]
    fn list_literal_and_flat_cells_agree() {
        assert_eq!(parse_list_field(Some("['pop', 'rock']"), "1"), vec!["pop", "rock"]);
        assert_eq!(parse_list_field(Some("pop, rock"), "1"), vec!["pop", "rock"]);
        assert_eq!(parse_list_field(Some("pop,, rock ,"), "1"), vec!["pop", "rock"]);
    }

    #[test]
    fn malformed_literal_falls_back_to_literal_comma_split() {
        assert_eq!(parse_list_field(Some("[pop, rock"), "1"), vec!["[pop", "rock"]);
        assert_eq!(parse_list_field(Some("[pop, rock]"), "1"), vec!["[pop", "rock]"]);
    }

    #[test]
    fn list_elements_are_trimmed_then_ascii_cleaned() {
        assert_eq!(
            parse_list_field(Some("['  k-pop ', 'música', 'é rock']"), "1"),
            vec!["k-pop", "msica", " rock"]
        );
        assert!(parse_list_field(None, "1").is_empty());
        assert!(parse_list_field(Some("   "), "1").is_empty());
        assert!(parse_list_field(Some("[]"), "1").is_empty());
    }

    #[test]
    fn identifier_filtering_keeps_only_22_alphanumerics() {
        assert_eq!(
            parse_identifier_list(Some("abcdefghijklmnopqrstuv,bad!!"), "1"),
            vec!["abcdefghijklmnopqrstuv"]
        );
        let split = split_identifiers(Some("0123456789ABCDEFGHIJKl, short,,abcdefghijklmnopqrstuvw"));
        assert_eq!(split.valid, vec!["0123456789ABCDEFGHIJKl"]);
        assert_eq!(split.invalid, vec!["short", "", "abcdefghijklmnopqrstuvw"]);
    }

    #[test]
    fn single_identifier_without_comma_is_one_candidate() {
        assert_eq!(
            parse_identifier_list(Some("  abcdefghijklmnopqrstuv  "), "1"),
            vec!["abcdefghijklmnopqrstuv"]
        );
        assert!(parse_identifier_list(Some("['track1']"), "1").is_empty());
        assert!(parse_identifier_list(None, "1").is_empty());
    }

    #[test]
    fn identifier_check_rejects_non_ascii_of_same_length() {
        assert!(!is_track_id("abcdefghijklmnopqrstué"));
        assert!(is_track_id("4Z8W4fKeB5YxbusRsdQVPb"));
    }

    #[test]
    fn dates_prefer_day_first() {
        assert_eq!(normalize_date(Some("2024-01-02")), date(2024, 1, 2));
        assert_eq!(normalize_date(Some("03/04/2024")), date(2024, 4, 3));
        assert_eq!(normalize_date(Some("12/25/2024")), date(2024, 12, 25));
        assert_eq!(normalize_date(Some("25.12.2024")), date(2024, 12, 25));
        assert_eq!(normalize_date(Some("01/02/24")), date(2024, 2, 1));
        assert_eq!(normalize_date(Some("2024-01-02 10:30:00")), date(2024, 1, 2));
        assert_eq!(normalize_date(Some("2024-01-02T10:30:00+07:00")), date(2024, 1, 2));
        assert_eq!(normalize_date(Some("5 March 2023")), date(2023, 3, 5));
    }

    #[test]
    fn unparseable_dates_become_missing() {
        assert_eq!(normalize_date(Some("not a date")), DateValue::Missing);
        assert_eq!(normalize_date(Some("32/13/2024")), DateValue::Missing);
        assert_eq!(normalize_date(Some("")), DateValue::Missing);
        assert_eq!(normalize_date(None), DateValue::Missing);
    }

    #[test]
    fn names_are_uppercased_and_stripped_of_non_ascii() {
        assert_eq!(normalize_name("Beyoncé"), "BEYONC");
        assert_eq!(normalize_name("sigur rós"), "SIGUR RS");
        assert_eq!(normalize_name("artist one"), "ARTIST ONE");
    }

    #[test]
    fn normalization_never_drops_rows() {
        let rows = vec![
            RawRecord {
                ids: Some("1".into()),
                dates: Some("garbage".into()),
                feat_track_ids: Some("bad,abcdefghijklmnopqrstuv".into()),
                playlists_found: Some("Top Hits ✓".into()),
                ..Default::default()
            },
            RawRecord::default(),
        ];
        let (records, report) = normalize_records(rows);
        assert_eq!(records.len(), 2);
        assert_eq!(report.rows, 2);
        assert_eq!(report.missing_dates, 2);
        assert_eq!(report.dropped_track_ids, 1);
        assert_eq!(records[0].feat_track_ids, vec!["abcdefghijklmnopqrstuv"]);
        assert_eq!(records[0].playlists_found.as_deref(), Some("Top Hits "));
        assert!(records[1].ids.is_none());
    }

    #[test]
    fn per_row_warnings_carry_the_row_key() {
        let logs = capture_info_logs(|| {
            let (records, report) = normalize_records(vec![RawRecord {
                ids: Some("ROWKEY42".into()),
                dates: Some("2024-01-02".into()),
                genres: Some("[pop, rock".into()),
                feat_track_ids: Some("bad!!,abcdefghijklmnopqrstuv".into()),
                ..Default::default()
            }]);
            assert_eq!(records[0].genres, vec!["[pop", "rock"]);
            assert_eq!(report.dropped_track_ids, 1);
        });

        let fallback = logs
            .lines()
            .find(|line| line.contains("falling back to comma split"))
            .expect("fallback warning logged");
        assert!(fallback.contains("WARN"));
        assert!(fallback.contains("ROWKEY42"));
        assert!(fallback.contains("[pop, rock"));

        let dropped = logs
            .lines()
            .find(|line| line.contains("invalid track ids dropped"))
            .expect("dropped ids warning logged");
        assert!(dropped.contains("ROWKEY42"));
        assert!(dropped.contains("bad!!"));
    }
}
