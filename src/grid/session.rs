use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_channel::{Receiver, Sender, unbounded};
use async_lock::{Mutex, MutexGuard};
use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use crate::grid::diff::DiffResult;
use crate::grid::state::{GridController, GridValidationError, PageRequest};
use crate::services::api_error::{ApiErrorDetails, extract_api_error_details};
use crate::services::database::{
    DatabaseClient, QueryOptions, QueryResult, is_select_query,
};
use crate::services::deduplicator::RequestDeduplicator;
use crate::services::export::{
    DelimitedTextOptions, ExportFormat, InsertStatementParams, to_delimited_text,
    to_excel_html_table, to_insert_statements, to_json_objects, to_json_rows, write_text_file,
};
use crate::services::query_cache::QueryCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmVariant {
    Info,
    Warning,
    Danger,
}

/// Blocking confirmation dialog. The returned future resolves once the user
/// answered; nothing else proceeds until then.
#[async_trait]
pub trait ConfirmDialog: Send + Sync {
    async fn confirm(&self, title: &str, message: &str, variant: ConfirmVariant) -> bool;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn set_text(&self, text: &str) -> Result<()>;
}

/// Fire-and-forget notifications surfaced to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    Info(String),
    Error {
        message: String,
        details: Option<ApiErrorDetails>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    NothingToSave,
    Saved { rows: usize },
    /// Some per-row updates failed; the failed rows keep their edits.
    PartialFailure { saved: usize, failed: usize },
    Aborted,
}

/// Binds a [`GridController`] to the backend: query execution with caching,
/// deduplication and cancellation by query id, batched edit persistence,
/// confirmed deletes, clone-to-clipboard and exports.
///
/// Every failure path ends in a [`GridEvent`] on the event stream; none of
/// the public operations propagate backend errors as panics or crashes.
pub struct GridSession {
    connection_id: String,
    client: Arc<dyn DatabaseClient>,
    cache: Arc<QueryCache>,
    dedup: Arc<RequestDeduplicator<QueryResult>>,
    confirm: Arc<dyn ConfirmDialog>,
    clipboard: Arc<dyn Clipboard>,
    controller: Mutex<GridController>,
    active_query: Mutex<Option<Uuid>>,
    events: Sender<GridEvent>,
    event_receiver: Receiver<GridEvent>,
}

impl GridSession {
    pub fn new(
        connection_id: impl Into<String>,
        client: Arc<dyn DatabaseClient>,
        cache: Arc<QueryCache>,
        dedup: Arc<RequestDeduplicator<QueryResult>>,
        confirm: Arc<dyn ConfirmDialog>,
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        let (events, event_receiver) = unbounded();
        Self {
            connection_id: connection_id.into(),
            client,
            cache,
            dedup,
            confirm,
            clipboard,
            controller: Mutex::new(GridController::new()),
            active_query: Mutex::new(None),
            events,
            event_receiver,
        }
    }

    pub fn events(&self) -> Receiver<GridEvent> {
        self.event_receiver.clone()
    }

    pub async fn controller(&self) -> MutexGuard<'_, GridController> {
        self.controller.lock().await
    }

    async fn emit_info(&self, message: impl Into<String>) {
        let _ = self.events.send(GridEvent::Info(message.into())).await;
    }

    async fn emit_error(&self, message: impl Into<String>, details: Option<ApiErrorDetails>) {
        let message = message.into();
        tracing::error!(%message, "grid error");
        let _ = self
            .events
            .send(GridEvent::Error { message, details })
            .await;
    }

    // ------------------------------------------------------------------
    // Query execution
    // ------------------------------------------------------------------

    pub async fn run_query(&self, sql: &str) -> Result<()> {
        self.run_query_with(sql, None).await
    }

    async fn run_query_with(&self, sql: &str, page: Option<PageRequest>) -> Result<()> {
        self.controller.lock().await.begin_loading();

        let query_id = Uuid::new_v4();
        let superseded = self.active_query.lock().await.replace(query_id);
        if let Some(prev) = superseded {
            // Best effort; the backend may have finished it already.
            if let Err(e) = self.client.cancel_query(prev).await {
                tracing::debug!(query_id = %prev, error = %e, "cancel of superseded query failed");
            }
        }

        let cache_eligible = is_select_query(sql) && page.is_none();
        if cache_eligible {
            if let Some(cached) = self.cache.get(&self.connection_id, sql) {
                return self.finish_load(query_id, sql, cached).await;
            }
        }

        let dedup_key = match &page {
            Some(p) => format!(
                "query:{}:{}:{}:{}",
                self.connection_id, sql, p.limit, p.offset
            ),
            None => format!("query:{}:{}", self.connection_id, sql),
        };
        let client = Arc::clone(&self.client);
        let connection_id = self.connection_id.clone();
        let sql_owned = sql.to_string();
        let options = QueryOptions {
            limit: page.map(|p| p.limit),
            offset: page.map(|p| p.offset),
            include_total_count: page.is_some(),
            query_id: Some(query_id),
        };

        let outcome = self
            .dedup
            .execute(&dedup_key, move || async move {
                client
                    .execute_query(&connection_id, &sql_owned, options)
                    .await
            })
            .await;

        match outcome {
            Ok(result) => {
                if cache_eligible && result.affected_rows == 0 {
                    self.cache.set(&self.connection_id, sql, result.clone());
                }
                if !is_select_query(sql) {
                    // Any mutating statement may have changed what cached
                    // reads would return.
                    self.cache.invalidate(&self.connection_id);
                }
                self.finish_load(query_id, sql, result).await
            }
            Err(details) => {
                if *self.active_query.lock().await != Some(query_id) {
                    tracing::debug!(%query_id, "discarding error for superseded query");
                    return Ok(());
                }
                self.controller.lock().await.set_error(details.clone());
                let message = details.message.clone();
                self.emit_error(message, Some(details)).await;
                Ok(())
            }
        }
    }

    async fn finish_load(&self, query_id: Uuid, sql: &str, result: QueryResult) -> Result<()> {
        if *self.active_query.lock().await != Some(query_id) {
            tracing::debug!(%query_id, "discarding result for superseded query");
            return Ok(());
        }
        let load = self.controller.lock().await.load_result(sql, result);
        if let Err(e) = load {
            let details = extract_api_error_details(&e);
            self.controller.lock().await.set_error(details.clone());
            self.emit_error(format!("Malformed result: {}", details.message), Some(details))
                .await;
        }
        Ok(())
    }

    /// Re-issue the current query with its current window.
    pub async fn refresh(&self) -> Result<()> {
        let (query, page) = {
            let controller = self.controller.lock().await;
            let page = controller.is_paginated().then(|| PageRequest {
                limit: controller.page_size(),
                offset: controller
                    .result()
                    .and_then(|r| r.offset)
                    .unwrap_or(0),
            });
            (controller.query().to_string(), page)
        };
        if query.is_empty() {
            return Ok(());
        }
        self.run_query_with(&query, page).await
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    pub async fn next_page(&self) -> Result<()> {
        let (query, request) = {
            let controller = self.controller.lock().await;
            (controller.query().to_string(), controller.next_page_request())
        };
        match request {
            Some(request) => self.run_query_with(&query, Some(request)).await,
            None => Ok(()),
        }
    }

    pub async fn prev_page(&self) -> Result<()> {
        let (query, request) = {
            let controller = self.controller.lock().await;
            (controller.query().to_string(), controller.prev_page_request())
        };
        match request {
            Some(request) => self.run_query_with(&query, Some(request)).await,
            None => Ok(()),
        }
    }

    pub async fn go_to_page(&self, page: u64) -> Result<()> {
        let (query, request) = {
            let controller = self.controller.lock().await;
            (controller.query().to_string(), controller.page_request(page))
        };
        match request {
            Some(request) => self.run_query_with(&query, Some(request)).await,
            None => Ok(()),
        }
    }

    pub async fn set_page_size(&self, size: u64) -> Result<()> {
        let (query, request) = {
            let mut controller = self.controller.lock().await;
            (controller.query().to_string(), controller.set_page_size(size))
        };
        match request {
            Some(request) => self.run_query_with(&query, Some(request)).await,
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Persist the pending edit overlay, one update request per edited row,
    /// all in flight concurrently.
    ///
    /// Rows settle individually: edits of rows that saved are cleared, rows
    /// that failed stay dirty, and the grid only refreshes after a fully
    /// successful batch.
    pub async fn save_pending_edits(&self) -> Result<SaveOutcome> {
        let built = self.controller.lock().await.build_row_updates();
        let updates = match built {
            Ok(updates) if updates.is_empty() => return Ok(SaveOutcome::NothingToSave),
            Ok(updates) => updates,
            Err(GridValidationError::MissingTableContext) => {
                // Local validation failure; intentionally not surfaced as a
                // toast because there is no actionable user input.
                tracing::error!("cannot save edits: no table metadata for the edited columns");
                return Ok(SaveOutcome::Aborted);
            }
            Err(err) => {
                self.emit_error(err.to_string(), None).await;
                return Ok(SaveOutcome::Aborted);
            }
        };

        let results = join_all(updates.iter().map(|(row_index, update)| {
            let client = Arc::clone(&self.client);
            let connection_id = self.connection_id.clone();
            async move { (*row_index, client.update_row(&connection_id, update).await) }
        }))
        .await;

        let mut saved = 0usize;
        let mut failed = 0usize;
        let mut first_error: Option<ApiErrorDetails> = None;
        {
            let mut controller = self.controller.lock().await;
            for (row_index, outcome) in results {
                match outcome {
                    Ok(()) => {
                        controller.clear_row_edits(row_index);
                        saved += 1;
                    }
                    Err(e) => {
                        failed += 1;
                        let details = extract_api_error_details(&e);
                        tracing::error!(row_index, error = %details.message, "row update failed");
                        first_error.get_or_insert(details);
                    }
                }
            }
        }

        if saved > 0 {
            self.cache.invalidate(&self.connection_id);
        }

        if failed > 0 {
            self.emit_error(
                format!("Failed to save {failed} of {} edited rows", saved + failed),
                first_error,
            )
            .await;
            return Ok(SaveOutcome::PartialFailure { saved, failed });
        }

        self.emit_info(format!(
            "Saved {saved} row{}",
            if saved == 1 { "" } else { "s" }
        ))
        .await;
        self.refresh().await?;
        Ok(SaveOutcome::Saved { rows: saved })
    }

    pub async fn discard_edits(&self) {
        self.controller.lock().await.discard_edits();
    }

    // ------------------------------------------------------------------
    // Row delete / clone
    // ------------------------------------------------------------------

    pub async fn delete_row(&self, row_index: usize) -> Result<bool> {
        let delete = match self.controller.lock().await.build_row_delete(row_index) {
            Ok(delete) => delete,
            Err(GridValidationError::MissingPrimaryKey) => {
                self.emit_error(
                    "Cannot delete: the result has no primary key columns",
                    None,
                )
                .await;
                return Ok(false);
            }
            Err(GridValidationError::MissingTableContext) => {
                tracing::error!("cannot delete: no table metadata for the key columns");
                return Ok(false);
            }
            Err(err) => {
                self.emit_error(err.to_string(), None).await;
                return Ok(false);
            }
        };

        let confirmed = self
            .confirm
            .confirm(
                "Delete row",
                &format!(
                    "Delete this row from {}? This cannot be undone.",
                    delete.table
                ),
                ConfirmVariant::Danger,
            )
            .await;
        if !confirmed {
            return Ok(false);
        }

        match self.client.delete_row(&self.connection_id, &delete).await {
            Ok(()) => {
                self.cache.invalidate(&self.connection_id);
                self.emit_info("Row deleted").await;
                self.refresh().await?;
                Ok(true)
            }
            Err(e) => {
                let details = extract_api_error_details(&e);
                self.emit_error(details.message.clone(), Some(details)).await;
                Ok(false)
            }
        }
    }

    /// Copy INSERT statements for one row, or for the selection when no row
    /// is given. Cloning never talks to the backend.
    pub async fn copy_clone_statements(
        &self,
        row_index: Option<usize>,
        is_couchbase: bool,
    ) -> Result<bool> {
        let statements = {
            let controller = self.controller.lock().await;
            let rows = match row_index {
                Some(index) => vec![index],
                None => controller.selected_rows(),
            };
            controller.build_clone_statements(&rows, is_couchbase)
        };
        match statements {
            Ok(statements) => {
                let count = statements.lines().count();
                self.clipboard.set_text(&statements).await?;
                self.emit_info(format!(
                    "Copied {count} INSERT statement{}",
                    if count == 1 { "" } else { "s" }
                ))
                .await;
                Ok(true)
            }
            Err(err) => {
                self.emit_error(err.to_string(), None).await;
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Virtualization escape hatch
    // ------------------------------------------------------------------

    pub async fn render_all_rows(&self) -> Result<bool> {
        let needs_confirmation = self
            .controller
            .lock()
            .await
            .render_all_needs_confirmation();
        if needs_confirmation {
            let confirmed = self
                .confirm
                .confirm(
                    "Render all rows",
                    "Rendering more than 10,000 rows may freeze the UI. Continue?",
                    ConfirmVariant::Warning,
                )
                .await;
            if !confirmed {
                return Ok(false);
            }
        }
        self.controller.lock().await.set_render_all(true);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub async fn export_to_file(&self, format: ExportFormat, path: &Path) -> Result<bool> {
        if !self.confirm_large_export().await {
            return Ok(false);
        }
        let Some(text) = self.render_export(format).await? else {
            return Ok(false);
        };
        write_text_file(path, &text).await?;
        self.emit_info(format!("Exported to {}", path.display())).await;
        Ok(true)
    }

    pub async fn copy_export(&self, format: ExportFormat) -> Result<bool> {
        if !self.confirm_large_export().await {
            return Ok(false);
        }
        let Some(text) = self.render_export(format).await? else {
            return Ok(false);
        };
        self.clipboard.set_text(&text).await?;
        self.emit_info("Copied to clipboard").await;
        Ok(true)
    }

    async fn confirm_large_export(&self) -> bool {
        let needs_confirmation = self.controller.lock().await.export_needs_confirmation();
        if !needs_confirmation {
            return true;
        }
        self.confirm
            .confirm(
                "Large export",
                "This export covers more than 10,000 rows and may take a while. Continue?",
                ConfirmVariant::Warning,
            )
            .await
    }

    async fn render_export(&self, format: ExportFormat) -> Result<Option<String>> {
        let controller = self.controller.lock().await;
        let export = match controller.export_rows() {
            Ok(export) => export,
            Err(err) => {
                drop(controller);
                self.emit_error(err.to_string(), None).await;
                return Ok(None);
            }
        };
        let context = controller
            .table_context(export.columns.iter().map(String::as_str))
            .ok();
        drop(controller);

        let text = match format {
            ExportFormat::Csv => {
                to_delimited_text(&export.columns, &export.rows, &DelimitedTextOptions::default())?
            }
            ExportFormat::Tsv => {
                to_delimited_text(&export.columns, &export.rows, &DelimitedTextOptions::tsv())?
            }
            ExportFormat::Json => to_json_objects(&export.columns, &export.rows, true)?,
            ExportFormat::JsonRows => to_json_rows(&export.columns, &export.rows, true)?,
            ExportFormat::Sql => {
                let Some(context) = context else {
                    self.emit_error(
                        "Cannot build INSERT statements: no table metadata for this result",
                        None,
                    )
                    .await;
                    return Ok(None);
                };
                to_insert_statements(&InsertStatementParams {
                    schema: context.schema.as_deref(),
                    table: &context.table,
                    columns: &export.columns,
                    rows: &export.rows,
                    is_couchbase: false,
                })
            }
            ExportFormat::Xls => to_excel_html_table(&export.columns, &export.rows, "Results"),
        };
        Ok(Some(text))
    }

    // ------------------------------------------------------------------
    // Snapshot / diff
    // ------------------------------------------------------------------

    pub async fn save_snapshot(&self) -> Result<bool> {
        match self.controller.lock().await.save_snapshot() {
            Ok(_) => {}
            Err(err) => {
                self.emit_error(err.to_string(), None).await;
                return Ok(false);
            }
        }
        self.emit_info("Snapshot saved").await;
        Ok(true)
    }

    pub async fn compare_with_snapshot(&self) -> Result<Option<DiffResult>> {
        match self.controller.lock().await.compare_with_snapshot() {
            Ok(diff) => Ok(Some(diff)),
            Err(err) => {
                self.emit_error(err.to_string(), None).await;
                Ok(None)
            }
        }
    }

    pub async fn clear_snapshot(&self) {
        self.controller.lock().await.clear_snapshot();
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Best-effort cancellation of the in-flight query, for component
    /// teardown. Failures are swallowed and logged.
    pub async fn teardown(&self) {
        if let Some(query_id) = self.active_query.lock().await.take() {
            if let Err(e) = self.client.cancel_query(query_id).await {
                tracing::debug!(query_id = %query_id, error = %e, "cancel during teardown failed");
            }
        }
    }
}
