use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::grid::diff::{DiffResult, ResultSnapshot, compute_result_diff};
use crate::services::api_error::ApiErrorDetails;
use crate::services::database::{
    CellValue, QueryResult, RowDelete, RowObject, RowUpdate,
};
use crate::services::export::{InsertStatementParams, to_insert_statements};

/// Rows mounted eagerly before the user has to opt into rendering everything.
pub const DEFAULT_RENDER_LIMIT: usize = 5_000;
/// Above this row count, rendering everything or exporting requires an
/// explicit confirmation.
pub const LARGE_OPERATION_THRESHOLD: usize = 10_000;
pub const DEFAULT_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum GridPhase {
    Idle,
    Loading,
    Loaded,
    Errored(ApiErrorDetails),
}

/// Local validation failures raised before any backend call is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridValidationError {
    #[error("could not resolve a single table for the involved columns")]
    MissingTableContext,
    #[error("no primary key columns in the result metadata")]
    MissingPrimaryKey,
    #[error("row {0} is out of range")]
    RowOutOfRange(usize),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("column is not editable: {0}")]
    ColumnNotEditable(String),
    #[error("no rows to operate on")]
    EmptyRowSet,
    #[error("no result loaded")]
    NoResult,
    #[error("no snapshot saved")]
    NoSnapshot,
}

/// Single-table target resolved from column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TableContext {
    pub schema: Option<String>,
    pub table: String,
}

/// A `limit`/`offset` window the caller should re-issue the query with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u64,
    pub offset: u64,
}

/// Scope-resolved, overlay-merged rows handed to the export utilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// The grid's entire interactive state, mutated through named operations so
/// the logic stays testable away from any UI toolkit.
///
/// Loading a new result resets pending edits, the selection and the
/// render-all escape hatch; the snapshot survives, since comparing across
/// results is its purpose.
pub struct GridController {
    phase: GridPhase,
    query: String,
    result: Option<QueryResult>,
    /// Row index -> column name -> replacement value. Never touches the
    /// source rows.
    pending_edits: BTreeMap<usize, BTreeMap<String, CellValue>>,
    selection: BTreeSet<usize>,
    render_all: bool,
    render_limit: usize,
    snapshot: Option<ResultSnapshot>,
    page_size: u64,
}

impl Default for GridController {
    fn default() -> Self {
        Self::new()
    }
}

impl GridController {
    pub fn new() -> Self {
        Self {
            phase: GridPhase::Idle,
            query: String::new(),
            result: None,
            pending_edits: BTreeMap::new(),
            selection: BTreeSet::new(),
            render_all: false,
            render_limit: DEFAULT_RENDER_LIMIT,
            snapshot: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_render_limit(mut self, limit: usize) -> Self {
        self.render_limit = limit.max(1);
        self
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn phase(&self) -> &GridPhase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == GridPhase::Loading
    }

    pub fn begin_loading(&mut self) {
        self.phase = GridPhase::Loading;
    }

    pub fn load_result(&mut self, query: &str, result: QueryResult) -> anyhow::Result<()> {
        result.check_shape()?;
        self.query = query.to_string();
        if let Some(limit) = result.limit {
            self.page_size = limit.max(1);
        }
        self.result = Some(result);
        self.phase = GridPhase::Loaded;
        self.pending_edits.clear();
        self.selection.clear();
        self.render_all = false;
        Ok(())
    }

    pub fn set_error(&mut self, details: ApiErrorDetails) {
        self.phase = GridPhase::Errored(details);
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    fn require_result(&self) -> Result<&QueryResult, GridValidationError> {
        self.result.as_ref().ok_or(GridValidationError::NoResult)
    }

    /// Header line for the grid: affected rows for mutations, row count for
    /// SELECT-like results.
    pub fn summary(&self) -> String {
        let Some(result) = &self.result else {
            return String::new();
        };
        let mut summary = if result.affected_rows > 0 {
            format!("Affected rows: {}", result.affected_rows)
        } else {
            format!("{} rows returned", result.rows.len())
        };
        if let Some(ms) = result.execution_time_ms {
            summary.push_str(&format!(" in {ms} ms"));
        }
        summary
    }

    // ------------------------------------------------------------------
    // Virtualization window
    // ------------------------------------------------------------------

    pub fn rendered_row_count(&self) -> usize {
        let total = self.result.as_ref().map(|r| r.rows.len()).unwrap_or(0);
        if self.render_all {
            total
        } else {
            total.min(self.render_limit)
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| self.rendered_row_count() < r.rows.len())
    }

    /// Rendering everything needs a confirmation once the result is large
    /// enough to freeze the UI.
    pub fn render_all_needs_confirmation(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.rows.len() > LARGE_OPERATION_THRESHOLD)
    }

    pub fn set_render_all(&mut self, render_all: bool) {
        self.render_all = render_all;
    }

    pub fn render_all(&self) -> bool {
        self.render_all
    }

    // ------------------------------------------------------------------
    // Pending edit overlay
    // ------------------------------------------------------------------

    pub fn has_pending_edits(&self) -> bool {
        !self.pending_edits.is_empty()
    }

    pub fn edited_row_count(&self) -> usize {
        self.pending_edits.len()
    }

    /// Stage a cell edit. The overlay takes precedence when rendering, but
    /// the loaded rows are never mutated.
    pub fn apply_edit(
        &mut self,
        row_index: usize,
        column: &str,
        value: CellValue,
    ) -> Result<(), GridValidationError> {
        let result = self.require_result()?;
        if row_index >= result.rows.len() {
            return Err(GridValidationError::RowOutOfRange(row_index));
        }
        if result.column_index(column).is_none() {
            return Err(GridValidationError::UnknownColumn(column.to_string()));
        }
        if !result.is_column_editable(column) {
            return Err(GridValidationError::ColumnNotEditable(column.to_string()));
        }
        self.pending_edits
            .entry(row_index)
            .or_default()
            .insert(column.to_string(), value);
        Ok(())
    }

    pub fn discard_edits(&mut self) {
        self.pending_edits.clear();
    }

    pub(crate) fn clear_row_edits(&mut self, row_index: usize) {
        self.pending_edits.remove(&row_index);
    }

    /// Overlay-merged view of one cell.
    pub fn cell_value(&self, row_index: usize, column: &str) -> Option<&CellValue> {
        if let Some(edited) = self
            .pending_edits
            .get(&row_index)
            .and_then(|edits| edits.get(column))
        {
            return Some(edited);
        }
        let result = self.result.as_ref()?;
        let col = result.column_index(column)?;
        result.rows.get(row_index)?.get(col)
    }

    /// Overlay-merged row object.
    pub fn merged_row(&self, row_index: usize) -> Option<RowObject> {
        let result = self.result.as_ref()?;
        let mut row = result.row_object(row_index)?;
        if let Some(edits) = self.pending_edits.get(&row_index) {
            for (column, value) in edits {
                row.insert(column.clone(), value.clone());
            }
        }
        Some(row)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn is_selected(&self, row_index: usize) -> bool {
        self.selection.contains(&row_index)
    }

    pub fn selected_rows(&self) -> Vec<usize> {
        self.selection.iter().copied().collect()
    }

    pub fn toggle_select(&mut self, row_index: usize) {
        if row_index >= self.rendered_row_count() {
            return;
        }
        if !self.selection.remove(&row_index) {
            self.selection.insert(row_index);
        }
    }

    /// Toggle every row in the current render window; rows beyond the window
    /// are never selected implicitly.
    pub fn select_all(&mut self) {
        let rendered = self.rendered_row_count();
        if self.selection.len() == rendered && rendered > 0 {
            self.selection.clear();
        } else {
            self.selection = (0..rendered).collect();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ------------------------------------------------------------------
    // Export scope
    // ------------------------------------------------------------------

    /// Rows an export or copy applies to: the selection when present,
    /// otherwise everything currently rendered.
    pub fn export_scope(&self) -> Vec<usize> {
        if self.selection.is_empty() {
            (0..self.rendered_row_count()).collect()
        } else {
            self.selected_rows()
        }
    }

    pub fn export_needs_confirmation(&self) -> bool {
        self.export_scope().len() > LARGE_OPERATION_THRESHOLD
    }

    /// Scope-resolved rows with overlay edits applied, positionally aligned
    /// to the result's columns.
    pub fn export_rows(&self) -> Result<ExportRows, GridValidationError> {
        let result = self.require_result()?;
        let rows = self
            .export_scope()
            .into_iter()
            .filter_map(|row_index| {
                let row = result.rows.get(row_index)?;
                let merged = result
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(col, name)| {
                        self.pending_edits
                            .get(&row_index)
                            .and_then(|edits| edits.get(name))
                            .cloned()
                            .unwrap_or_else(|| row[col].clone())
                    })
                    .collect();
                Some(merged)
            })
            .collect();
        Ok(ExportRows {
            columns: result.columns.clone(),
            rows,
        })
    }

    // ------------------------------------------------------------------
    // Persistence payloads
    // ------------------------------------------------------------------

    /// Resolve the one table every listed column belongs to.
    pub fn table_context<'a, I>(&self, columns: I) -> Result<TableContext, GridValidationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let result = self.require_result()?;
        let mut context: Option<TableContext> = None;
        let mut any = false;
        for column in columns {
            any = true;
            let metadata = result
                .metadata_for(column)
                .ok_or(GridValidationError::MissingTableContext)?;
            let Some(table) = metadata.table_name.clone() else {
                return Err(GridValidationError::MissingTableContext);
            };
            let candidate = TableContext {
                schema: metadata.schema_name.clone(),
                table,
            };
            match &context {
                None => context = Some(candidate),
                Some(existing) if *existing == candidate => {}
                Some(_) => return Err(GridValidationError::MissingTableContext),
            }
        }
        if !any {
            return Err(GridValidationError::MissingTableContext);
        }
        context.ok_or(GridValidationError::MissingTableContext)
    }

    /// Primary-key projection for one row, always taken from the original
    /// values. Edits to key columns are not part of the save path.
    pub fn primary_key_projection(
        &self,
        row_index: usize,
    ) -> Result<RowObject, GridValidationError> {
        let result = self.require_result()?;
        let key_columns = result.primary_key_columns();
        if key_columns.is_empty() {
            return Err(GridValidationError::MissingPrimaryKey);
        }
        let row = result
            .row_object(row_index)
            .ok_or(GridValidationError::RowOutOfRange(row_index))?;
        Ok(key_columns
            .into_iter()
            .filter_map(|meta| {
                row.get(&meta.column_name)
                    .map(|value| (meta.column_name.clone(), value.clone()))
            })
            .collect())
    }

    /// Map the overlay into one update request per edited row.
    pub fn build_row_updates(&self) -> Result<Vec<(usize, RowUpdate)>, GridValidationError> {
        if self.pending_edits.is_empty() {
            return Ok(vec![]);
        }
        let edited_columns: BTreeSet<&str> = self
            .pending_edits
            .values()
            .flat_map(|edits| edits.keys().map(String::as_str))
            .collect();
        let context = self.table_context(edited_columns)?;

        let mut updates = Vec::with_capacity(self.pending_edits.len());
        for (&row_index, edits) in &self.pending_edits {
            let primary_key = self.primary_key_projection(row_index)?;
            updates.push((
                row_index,
                RowUpdate {
                    schema: context.schema.clone(),
                    table: context.table.clone(),
                    primary_key,
                    updates: edits
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                },
            ));
        }
        Ok(updates)
    }

    pub fn build_row_delete(&self, row_index: usize) -> Result<RowDelete, GridValidationError> {
        let result = self.require_result()?;
        let key_columns = result.primary_key_columns();
        if key_columns.is_empty() {
            return Err(GridValidationError::MissingPrimaryKey);
        }
        let key_names: Vec<String> = key_columns
            .iter()
            .map(|meta| meta.column_name.clone())
            .collect();
        let context = self.table_context(key_names.iter().map(String::as_str))?;
        let primary_key = self.primary_key_projection(row_index)?;
        Ok(RowDelete {
            schema: context.schema,
            table: context.table,
            primary_key,
        })
    }

    /// INSERT statements for the given rows using overlay-merged values,
    /// excluding primary-key columns so the target can generate fresh keys.
    /// The output is meant for the clipboard, never executed directly.
    pub fn build_clone_statements(
        &self,
        rows: &[usize],
        is_couchbase: bool,
    ) -> Result<String, GridValidationError> {
        if rows.is_empty() {
            return Err(GridValidationError::EmptyRowSet);
        }
        let result = self.require_result()?;
        let columns: Vec<String> = result
            .columns
            .iter()
            .filter(|name| {
                !result
                    .metadata_for(name)
                    .is_some_and(|meta| meta.is_primary_key)
            })
            .cloned()
            .collect();
        if columns.is_empty() {
            return Err(GridValidationError::EmptyRowSet);
        }
        let context = self.table_context(columns.iter().map(String::as_str))?;

        let mut values: Vec<Vec<CellValue>> = Vec::with_capacity(rows.len());
        for &row_index in rows {
            let merged = self
                .merged_row(row_index)
                .ok_or(GridValidationError::RowOutOfRange(row_index))?;
            values.push(
                columns
                    .iter()
                    .map(|name| merged.get(name).cloned().unwrap_or(CellValue::Null))
                    .collect(),
            );
        }

        Ok(to_insert_statements(&InsertStatementParams {
            schema: context.schema.as_deref(),
            table: &context.table,
            columns: &columns,
            rows: &values,
            is_couchbase,
        }))
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    pub fn is_paginated(&self) -> bool {
        self.result.as_ref().is_some_and(QueryResult::is_paginated)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn current_page(&self) -> u64 {
        let Some(result) = &self.result else { return 0 };
        let limit = result.limit.unwrap_or(self.page_size).max(1);
        result.offset.unwrap_or(0) / limit
    }

    pub fn total_pages(&self) -> Option<u64> {
        let result = self.result.as_ref()?;
        let limit = result.limit?.max(1);
        let total = result.total_count?;
        Some(total.div_ceil(limit).max(1))
    }

    pub fn next_page_request(&self) -> Option<PageRequest> {
        if !self.is_paginated() {
            return None;
        }
        let result = self.result.as_ref()?;
        let has_next = match self.total_pages() {
            Some(pages) => self.current_page() + 1 < pages,
            None => result.has_more == Some(true),
        };
        has_next.then(|| PageRequest {
            limit: self.page_size,
            offset: (self.current_page() + 1) * self.page_size,
        })
    }

    pub fn prev_page_request(&self) -> Option<PageRequest> {
        if !self.is_paginated() || self.current_page() == 0 {
            return None;
        }
        Some(PageRequest {
            limit: self.page_size,
            offset: (self.current_page() - 1) * self.page_size,
        })
    }

    pub fn page_request(&self, page: u64) -> Option<PageRequest> {
        if !self.is_paginated() {
            return None;
        }
        let page = match self.total_pages() {
            Some(pages) => page.min(pages.saturating_sub(1)),
            None => page,
        };
        Some(PageRequest {
            limit: self.page_size,
            offset: page * self.page_size,
        })
    }

    /// Change the page size; the next request starts back at the first page.
    pub fn set_page_size(&mut self, size: u64) -> Option<PageRequest> {
        self.page_size = size.max(1);
        self.is_paginated().then_some(PageRequest {
            limit: self.page_size,
            offset: 0,
        })
    }

    // ------------------------------------------------------------------
    // Snapshot / diff
    // ------------------------------------------------------------------

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&ResultSnapshot> {
        self.snapshot.as_ref()
    }

    /// Capture the current result, replacing any previous snapshot.
    pub fn save_snapshot(&mut self) -> Result<&ResultSnapshot, GridValidationError> {
        let result = self.result.as_ref().ok_or(GridValidationError::NoResult)?;
        let snapshot = ResultSnapshot::capture(&self.query, result);
        Ok(self.snapshot.insert(snapshot))
    }

    pub fn clear_snapshot(&mut self) {
        self.snapshot = None;
    }

    /// Diff the stored snapshot (old side) against the current result (new
    /// side).
    pub fn compare_with_snapshot(&self) -> Result<DiffResult, GridValidationError> {
        let result = self.require_result()?;
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(GridValidationError::NoSnapshot)?;
        Ok(compute_result_diff(
            &snapshot.data,
            &result.row_objects(),
            &result.columns,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::ColumnMetadata;

    fn metadata(
        column: &str,
        table: Option<&str>,
        pk: bool,
        editable: bool,
    ) -> ColumnMetadata {
        ColumnMetadata {
            schema_name: table.map(|_| "public".to_string()),
            table_name: table.map(str::to_string),
            column_name: column.to_string(),
            is_primary_key: pk,
            is_editable: editable,
        }
    }

    fn editable_result() -> QueryResult {
        QueryResult {
            columns: vec!["id".into(), "name".into(), "age".into()],
            rows: vec![
                vec![
                    CellValue::Number(1.0),
                    CellValue::Text("ada".into()),
                    CellValue::Number(36.0),
                ],
                vec![
                    CellValue::Number(2.0),
                    CellValue::Text("grace".into()),
                    CellValue::Number(85.0),
                ],
            ],
            column_metadata: Some(vec![
                metadata("id", Some("people"), true, false),
                metadata("name", Some("people"), false, true),
                metadata("age", Some("people"), false, true),
            ]),
            ..QueryResult::empty()
        }
    }

    fn loaded() -> GridController {
        let mut grid = GridController::new();
        grid.load_result("select * from people", editable_result())
            .unwrap();
        grid
    }

    #[test]
    fn editing_never_mutates_source_rows() {
        let mut grid = loaded();
        let before = grid.result().unwrap().rows.clone();

        grid.apply_edit(0, "name", CellValue::Text("lovelace".into()))
            .unwrap();

        assert_eq!(grid.result().unwrap().rows, before);
        assert_eq!(
            grid.cell_value(0, "name"),
            Some(&CellValue::Text("lovelace".into()))
        );
        // Untouched cells read through to the source.
        assert_eq!(grid.cell_value(0, "age"), Some(&CellValue::Number(36.0)));
    }

    #[test]
    fn export_includes_overlay_edits() {
        let mut grid = loaded();
        grid.apply_edit(1, "age", CellValue::Number(86.0)).unwrap();

        let export = grid.export_rows().unwrap();
        assert_eq!(export.rows.len(), 2);
        assert_eq!(export.rows[1][2], CellValue::Number(86.0));
        assert_eq!(export.rows[1][1], CellValue::Text("grace".into()));
    }

    #[test]
    fn selection_scopes_export() {
        let mut grid = loaded();
        grid.toggle_select(1);
        let export = grid.export_rows().unwrap();
        assert_eq!(export.rows.len(), 1);
        assert_eq!(export.rows[0][0], CellValue::Number(2.0));

        grid.clear_selection();
        assert_eq!(grid.export_rows().unwrap().rows.len(), 2);
    }

    #[test]
    fn non_editable_columns_reject_edits() {
        let mut grid = loaded();
        assert_eq!(
            grid.apply_edit(0, "id", CellValue::Number(9.0)),
            Err(GridValidationError::ColumnNotEditable("id".into()))
        );
        assert_eq!(
            grid.apply_edit(0, "nope", CellValue::Null),
            Err(GridValidationError::UnknownColumn("nope".into()))
        );
        assert_eq!(
            grid.apply_edit(7, "name", CellValue::Null),
            Err(GridValidationError::RowOutOfRange(7))
        );
    }

    #[test]
    fn row_updates_use_original_primary_key() {
        let mut grid = loaded();
        grid.apply_edit(0, "name", CellValue::Text("lovelace".into()))
            .unwrap();
        grid.apply_edit(0, "age", CellValue::Number(37.0)).unwrap();

        let updates = grid.build_row_updates().unwrap();
        assert_eq!(updates.len(), 1);
        let (row, update) = &updates[0];
        assert_eq!(*row, 0);
        assert_eq!(update.table, "people");
        assert_eq!(update.schema.as_deref(), Some("public"));
        assert_eq!(update.primary_key["id"], CellValue::Number(1.0));
        assert_eq!(update.updates.len(), 2);
        assert_eq!(update.updates["name"], CellValue::Text("lovelace".into()));
    }

    #[test]
    fn updates_without_primary_key_fail() {
        let mut result = editable_result();
        for meta in result.column_metadata.as_mut().unwrap() {
            meta.is_primary_key = false;
        }
        let mut grid = GridController::new();
        grid.load_result("select * from people", result).unwrap();
        grid.apply_edit(0, "name", CellValue::Text("x".into()))
            .unwrap();

        assert_eq!(
            grid.build_row_updates(),
            Err(GridValidationError::MissingPrimaryKey)
        );
    }

    #[test]
    fn updates_without_table_metadata_fail() {
        let mut result = editable_result();
        for meta in result.column_metadata.as_mut().unwrap() {
            meta.table_name = None;
            meta.is_editable = true;
        }
        let mut grid = GridController::new();
        grid.load_result("select * from people", result).unwrap();
        grid.apply_edit(0, "name", CellValue::Text("x".into()))
            .unwrap();

        assert_eq!(
            grid.build_row_updates(),
            Err(GridValidationError::MissingTableContext)
        );
    }

    #[test]
    fn clone_statements_exclude_primary_keys_and_merge_edits() {
        let mut grid = loaded();
        grid.apply_edit(0, "name", CellValue::Text("ada l".into()))
            .unwrap();

        let sql = grid.build_clone_statements(&[0], false).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"people\" (\"name\", \"age\") VALUES ('ada l', 36);"
        );
    }

    #[test]
    fn delete_request_carries_primary_key() {
        let grid = loaded();
        let delete = grid.build_row_delete(1).unwrap();
        assert_eq!(delete.table, "people");
        assert_eq!(delete.primary_key["id"], CellValue::Number(2.0));
    }

    #[test]
    fn loading_resets_edits_and_selection_but_keeps_snapshot() {
        let mut grid = loaded();
        grid.apply_edit(0, "name", CellValue::Text("x".into()))
            .unwrap();
        grid.toggle_select(0);
        grid.set_render_all(true);
        grid.save_snapshot().unwrap();

        grid.load_result("select * from people", editable_result())
            .unwrap();

        assert!(!grid.has_pending_edits());
        assert!(!grid.has_selection());
        assert!(!grid.render_all());
        assert!(grid.has_snapshot());
    }

    #[test]
    fn compare_with_snapshot_diffs_old_to_new() {
        let mut grid = loaded();
        grid.save_snapshot().unwrap();

        let mut changed = editable_result();
        changed.rows[0][1] = CellValue::Text("ada l".into());
        grid.load_result("select * from people", changed).unwrap();

        let diff = grid.compare_with_snapshot().unwrap();
        assert_eq!(diff.modified, 1);
        assert_eq!(diff.unchanged, 1);

        grid.clear_snapshot();
        assert!(grid.compare_with_snapshot().is_err());
    }

    #[test]
    fn render_window_caps_rows_until_escape_hatch() {
        let mut result = editable_result();
        result.rows = (0..20)
            .map(|i| {
                vec![
                    CellValue::Number(i as f64),
                    CellValue::Text(format!("row{i}")),
                    CellValue::Number(1.0),
                ]
            })
            .collect();
        let mut grid = GridController::new().with_render_limit(10);
        grid.load_result("select * from people", result).unwrap();

        assert_eq!(grid.rendered_row_count(), 10);
        assert!(grid.is_truncated());
        // Selection and select-all stay within the window.
        grid.toggle_select(15);
        assert!(!grid.has_selection());
        grid.select_all();
        assert_eq!(grid.selected_rows().len(), 10);

        grid.set_render_all(true);
        assert_eq!(grid.rendered_row_count(), 20);
        assert!(!grid.is_truncated());
    }

    #[test]
    fn select_all_toggles_off_when_everything_is_selected() {
        let mut grid = loaded();
        grid.select_all();
        assert_eq!(grid.selected_rows().len(), 2);
        grid.select_all();
        assert!(!grid.has_selection());
    }

    #[test]
    fn pagination_requests_follow_window() {
        let mut result = editable_result();
        result.total_count = Some(45);
        result.limit = Some(10);
        result.offset = Some(10);
        let mut grid = GridController::new();
        grid.load_result("select * from people", result).unwrap();

        assert!(grid.is_paginated());
        assert_eq!(grid.current_page(), 1);
        assert_eq!(grid.total_pages(), Some(5));
        assert_eq!(
            grid.next_page_request(),
            Some(PageRequest {
                limit: 10,
                offset: 20
            })
        );
        assert_eq!(
            grid.prev_page_request(),
            Some(PageRequest {
                limit: 10,
                offset: 0
            })
        );
        assert_eq!(
            grid.page_request(99),
            Some(PageRequest {
                limit: 10,
                offset: 40
            })
        );
        assert_eq!(
            grid.set_page_size(25),
            Some(PageRequest {
                limit: 25,
                offset: 0
            })
        );
    }

    #[test]
    fn unpaginated_results_hide_pagination() {
        let mut grid = loaded();
        assert!(!grid.is_paginated());
        assert!(grid.next_page_request().is_none());
        assert!(grid.set_page_size(50).is_none());
    }

    #[test]
    fn summary_reports_mutations_and_row_counts() {
        let mut grid = GridController::new();
        let mut result = editable_result();
        result.execution_time_ms = Some(3);
        grid.load_result("select * from people", result).unwrap();
        assert_eq!(grid.summary(), "2 rows returned in 3 ms");

        let mutated = QueryResult {
            affected_rows: 7,
            ..QueryResult::empty()
        };
        grid.load_result("update people set age = 1", mutated)
            .unwrap();
        assert_eq!(grid.summary(), "Affected rows: 7");
    }
}
