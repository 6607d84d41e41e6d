use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::database::{CellValue, QueryResult, RowObject};

/// Immutable capture of a result set, held for later comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSnapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub columns: Vec<String>,
    pub data: Vec<RowObject>,
}

impl ResultSnapshot {
    pub fn capture(query: &str, result: &QueryResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            query: query.to_string(),
            columns: result.columns.clone(),
            data: result.row_objects(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDiff {
    pub column: String,
    pub old_value: CellValue,
    pub new_value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RowDiff {
    Added {
        row_index: usize,
        data: RowObject,
    },
    /// Removed rows have no position in the new result.
    Removed {
        data: RowObject,
    },
    Modified {
        row_index: usize,
        data: RowObject,
        changes: Vec<CellDiff>,
    },
    Unchanged {
        row_index: usize,
        data: RowObject,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffResult {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub rows: Vec<RowDiff>,
}

/// Pick a likely primary key: a column named `id`, `uuid` or `_id` (any
/// case), or ending in `_id`, whose values are non-null and unique across
/// `data`. Heuristic by nature, so kept as its own function.
pub fn find_primary_key(columns: &[String], data: &[RowObject]) -> Option<String> {
    let candidates = columns.iter().filter(|name| {
        let lower = name.to_lowercase();
        lower == "id" || lower == "uuid" || lower == "_id" || lower.ends_with("_id")
    });

    'candidates: for candidate in candidates {
        let mut seen = HashSet::new();
        for row in data {
            let value = row.get(candidate.as_str()).unwrap_or(&CellValue::Null);
            if value.is_null() || !seen.insert(value.lookup_key()) {
                continue 'candidates;
            }
        }
        return Some(candidate.clone());
    }
    None
}

/// Row-level and cell-level differences between two snapshots of the same
/// query. Rows match by inferred primary key when one qualifies, by position
/// otherwise.
pub fn compute_result_diff(
    old_data: &[RowObject],
    new_data: &[RowObject],
    columns: &[String],
) -> DiffResult {
    let pk = find_primary_key(columns, old_data).or_else(|| find_primary_key(columns, new_data));

    match pk {
        Some(pk) => diff_by_key(old_data, new_data, columns, &pk),
        None => diff_by_position(old_data, new_data, columns),
    }
}

fn cell_changes(old_row: &RowObject, new_row: &RowObject, columns: &[String]) -> Vec<CellDiff> {
    columns
        .iter()
        .filter_map(|column| {
            let old_value = old_row.get(column).unwrap_or(&CellValue::Null);
            let new_value = new_row.get(column).unwrap_or(&CellValue::Null);
            (old_value != new_value).then(|| CellDiff {
                column: column.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
        })
        .collect()
}

fn diff_by_key(
    old_data: &[RowObject],
    new_data: &[RowObject],
    columns: &[String],
    pk: &str,
) -> DiffResult {
    let key_of = |row: &RowObject| {
        row.get(pk)
            .unwrap_or(&CellValue::Null)
            .lookup_key()
    };

    let old_map: HashMap<String, &RowObject> =
        old_data.iter().map(|row| (key_of(row), row)).collect();

    let mut result = DiffResult::default();
    let mut processed_keys = HashSet::new();

    for (i, new_row) in new_data.iter().enumerate() {
        let key = key_of(new_row);
        processed_keys.insert(key.clone());

        match old_map.get(&key) {
            Some(old_row) => {
                let changes = cell_changes(old_row, new_row, columns);
                if changes.is_empty() {
                    result.unchanged += 1;
                    result.rows.push(RowDiff::Unchanged {
                        row_index: i,
                        data: new_row.clone(),
                    });
                } else {
                    result.modified += 1;
                    result.rows.push(RowDiff::Modified {
                        row_index: i,
                        data: new_row.clone(),
                        changes,
                    });
                }
            }
            None => {
                result.added += 1;
                result.rows.push(RowDiff::Added {
                    row_index: i,
                    data: new_row.clone(),
                });
            }
        }
    }

    for old_row in old_data {
        if !processed_keys.contains(&key_of(old_row)) {
            result.removed += 1;
            result.rows.push(RowDiff::Removed {
                data: old_row.clone(),
            });
        }
    }

    result
}

fn diff_by_position(
    old_data: &[RowObject],
    new_data: &[RowObject],
    columns: &[String],
) -> DiffResult {
    let mut result = DiffResult::default();

    for i in 0..old_data.len().max(new_data.len()) {
        match (old_data.get(i), new_data.get(i)) {
            (Some(old_row), Some(new_row)) => {
                let changes = cell_changes(old_row, new_row, columns);
                if changes.is_empty() {
                    result.unchanged += 1;
                    result.rows.push(RowDiff::Unchanged {
                        row_index: i,
                        data: new_row.clone(),
                    });
                } else {
                    result.modified += 1;
                    result.rows.push(RowDiff::Modified {
                        row_index: i,
                        data: new_row.clone(),
                        changes,
                    });
                }
            }
            (None, Some(new_row)) => {
                result.added += 1;
                result.rows.push(RowDiff::Added {
                    row_index: i,
                    data: new_row.clone(),
                });
            }
            (Some(old_row), None) => {
                result.removed += 1;
                result.rows.push(RowDiff::Removed {
                    data: old_row.clone(),
                });
            }
            (None, None) => unreachable!(),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> RowObject {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.into())
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_id_column_when_unique() {
        let data = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(2.0)), ("a", text("y"))]),
        ];
        assert_eq!(
            find_primary_key(&cols(&["id", "a"]), &data),
            Some("id".into())
        );
    }

    #[test]
    fn rejects_duplicate_and_null_keys() {
        let duplicated = vec![
            row(&[("id", num(1.0))]),
            row(&[("id", num(1.0))]),
        ];
        assert_eq!(find_primary_key(&cols(&["id"]), &duplicated), None);

        let with_null = vec![row(&[("id", num(1.0))]), row(&[("id", CellValue::Null)])];
        assert_eq!(find_primary_key(&cols(&["id"]), &with_null), None);
    }

    #[test]
    fn suffix_id_column_qualifies() {
        let data = vec![
            row(&[("user_id", num(10.0)), ("name", text("a"))]),
            row(&[("user_id", num(11.0)), ("name", text("b"))]),
        ];
        assert_eq!(
            find_primary_key(&cols(&["name", "user_id"]), &data),
            Some("user_id".into())
        );
    }

    #[test]
    fn pk_diff_reports_cell_changes() {
        let old = vec![row(&[("id", num(1.0)), ("a", text("x"))])];
        let new = vec![row(&[("id", num(1.0)), ("a", text("y"))])];
        let diff = compute_result_diff(&old, &new, &cols(&["id", "a"]));

        assert_eq!(
            (diff.added, diff.removed, diff.modified, diff.unchanged),
            (0, 0, 1, 0)
        );
        match &diff.rows[0] {
            RowDiff::Modified { changes, .. } => {
                assert_eq!(
                    changes,
                    &[CellDiff {
                        column: "a".into(),
                        old_value: text("x"),
                        new_value: text("y"),
                    }]
                );
            }
            other => panic!("expected modified row, got {other:?}"),
        }
    }

    #[test]
    fn pk_diff_detects_added_and_removed() {
        let old = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(2.0)), ("a", text("y"))]),
        ];
        let new = vec![
            row(&[("id", num(2.0)), ("a", text("y"))]),
            row(&[("id", num(3.0)), ("a", text("z"))]),
        ];
        let diff = compute_result_diff(&old, &new, &cols(&["id", "a"]));

        assert_eq!(
            (diff.added, diff.removed, diff.modified, diff.unchanged),
            (1, 1, 0, 1)
        );
        // New-side rows first, removed rows after.
        assert!(matches!(diff.rows[0], RowDiff::Unchanged { row_index: 0, .. }));
        assert!(matches!(diff.rows[1], RowDiff::Added { row_index: 1, .. }));
        assert!(matches!(diff.rows[2], RowDiff::Removed { .. }));
    }

    #[test]
    fn empty_old_set_is_all_added() {
        let new = vec![row(&[("id", num(1.0))]), row(&[("id", num(2.0))])];
        let diff = compute_result_diff(&[], &new, &cols(&["id"]));
        assert_eq!(diff.added, 2);
        assert_eq!(diff.rows.len(), 2);
    }

    #[test]
    fn empty_new_set_is_all_removed() {
        let old = vec![row(&[("id", num(1.0))]), row(&[("id", num(2.0))])];
        let diff = compute_result_diff(&old, &[], &cols(&["id"]));
        assert_eq!(diff.removed, 2);
        assert_eq!(diff.rows.len(), 2);
    }

    #[test]
    fn identical_sets_are_all_unchanged() {
        let data = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(2.0)), ("a", text("y"))]),
        ];
        let diff = compute_result_diff(&data, &data, &cols(&["id", "a"]));
        assert_eq!(
            (diff.added, diff.removed, diff.modified, diff.unchanged),
            (0, 0, 0, 2)
        );
    }

    #[test]
    fn duplicate_id_falls_back_to_positional() {
        // The id column repeats on both sides, so it cannot serve as a key
        // and rows match by position instead.
        let old = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(1.0)), ("a", text("y"))]),
        ];
        let new = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(1.0)), ("a", text("z"))]),
        ];
        let diff = compute_result_diff(&old, &new, &cols(&["id", "a"]));
        assert_eq!(
            (diff.added, diff.removed, diff.modified, diff.unchanged),
            (0, 0, 1, 1)
        );
    }

    #[test]
    fn unique_new_side_key_still_enables_pk_matching() {
        // Key inference checks the old rows first and falls back to the new
        // rows, so a key that is only unique on the new side is still used.
        let old = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(1.0)), ("a", text("y"))]),
        ];
        let new = vec![row(&[("id", num(2.0)), ("a", text("z"))])];
        let diff = compute_result_diff(&old, &new, &cols(&["id", "a"]));
        assert_eq!(diff.added, 1);
    }

    #[test]
    fn positional_fallback_reports_swap_as_modified() {
        // Without a usable key, reordered identical rows read as two
        // modifications. Accepted limitation of positional matching.
        let old = vec![row(&[("a", num(1.0))]), row(&[("a", num(2.0))])];
        let new = vec![row(&[("a", num(2.0))]), row(&[("a", num(1.0))])];
        let diff = compute_result_diff(&old, &new, &cols(&["a"]));
        assert_eq!(
            (diff.added, diff.removed, diff.modified, diff.unchanged),
            (0, 0, 2, 0)
        );
    }

    #[test]
    fn every_input_row_appears_exactly_once() {
        let old = vec![
            row(&[("id", num(1.0)), ("a", text("x"))]),
            row(&[("id", num(2.0)), ("a", text("y"))]),
            row(&[("id", num(3.0)), ("a", text("z"))]),
        ];
        let new = vec![
            row(&[("id", num(2.0)), ("a", text("changed"))]),
            row(&[("id", num(4.0)), ("a", text("w"))]),
        ];
        let diff = compute_result_diff(&old, &new, &cols(&["id", "a"]));

        assert_eq!(diff.added + diff.unchanged + diff.modified, new.len());
        assert_eq!(
            diff.removed + diff.unchanged + diff.modified,
            old.len()
        );
        assert_eq!(diff.rows.len(), diff.added + diff.removed + diff.modified + diff.unchanged);
    }

    #[test]
    fn snapshot_captures_rows_as_objects() {
        let result = QueryResult {
            columns: vec!["id".into()],
            rows: vec![vec![num(1.0)]],
            ..QueryResult::empty()
        };
        let snapshot = ResultSnapshot::capture("select id from t", &result);
        assert_eq!(snapshot.query, "select id from t");
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.data[0]["id"], num(1.0));
    }
}
