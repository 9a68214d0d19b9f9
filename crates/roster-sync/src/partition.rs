use std::collections::HashSet;

use roster_core::{NormalizedRecord, Partition};

/// Splits rows into first occurrences and later duplicates by `ids`.
///
/// Single pass; both halves keep input order. Rows without an id share one
/// key, so only the first of them is clean.
pub fn partition(records: Vec<NormalizedRecord>) -> Partition {
    let mut seen: HashSet<Option<String>> = HashSet::new();
    let mut out = Partition::default();
    for record in records {
        if seen.insert(record.ids.clone()) {
            out.clean.push(record);
        } else {
            out.rejected.push(record);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(ids: &str, names: &str) -> NormalizedRecord {
        NormalizedRecord {
            ids: Some(ids.to_string()),
            names: Some(names.to_string()),
            ..Default::default()
        }
    }

    fn labels(records: &[NormalizedRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r.names.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn first_occurrence_wins() {
        let out = partition(vec![
            mk("A", "a1"),
            mk("B", "b1"),
            mk("A", "a2"),
            mk("A", "a3"),
            mk("C", "c1"),
        ]);
        assert_eq!(labels(&out.clean), vec!["a1", "b1", "c1"]);
        assert_eq!(labels(&out.rejected), vec!["a2", "a3"]);
    }

    #[test]
    fn empty_input_gives_empty_halves() {
        let out = partition(Vec::new());
        assert!(out.clean.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn invariants_hold_and_repeat_runs_agree() {
        let keys = ["3", "1", "3", "2", "1", "1", "4", "2", "5"];
        let input = keys
            .iter()
            .enumerate()
            .map(|(i, k)| mk(k, &format!("row{i}")))
            .collect::<Vec<_>>();

        let first = partition(input.clone());
        let second = partition(input.clone());
        assert_eq!(first, second);
        assert_eq!(first.total(), input.len());

        let clean_keys = first.clean.iter().map(|r| r.key()).collect::<Vec<_>>();
        let unique = clean_keys.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), clean_keys.len());
        assert!(first
            .rejected
            .iter()
            .all(|r| clean_keys.contains(&r.key())));
    }

    #[test]
    fn keys_compare_exactly() {
        let out = partition(vec![mk("abc", "x"), mk("ABC", "y"), mk("abc ", "z")]);
        assert_eq!(out.clean.len(), 3);
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn rows_without_ids_collapse_to_one_key() {
        let out = partition(vec![
            NormalizedRecord::default(),
            mk("1", "one"),
            NormalizedRecord::default(),
        ]);
        assert_eq!(out.clean.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert!(out.rejected[0].ids.is_none());
    }
}
