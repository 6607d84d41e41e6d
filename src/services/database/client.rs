use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::types::{QueryResult, RowDelete, RowUpdate};

/// Windowing and tagging options for a query execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub include_total_count: bool,
    /// Caller-generated tag used for best-effort cancellation.
    pub query_id: Option<Uuid>,
}

/// The opaque backend this subsystem talks to. The transport (HTTP, IPC, RPC)
/// is the implementor's business; failures should carry a
/// [`BackendError`](crate::services::api_error::BackendError) where the
/// transport has structured diagnostics to offer.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn execute_query(
        &self,
        connection_id: &str,
        sql: &str,
        options: QueryOptions,
    ) -> Result<QueryResult>;

    async fn update_row(&self, connection_id: &str, update: &RowUpdate) -> Result<()>;

    async fn delete_row(&self, connection_id: &str, delete: &RowDelete) -> Result<()>;

    /// Fire-and-forget; callers ignore failures.
    async fn cancel_query(&self, query_id: Uuid) -> Result<()>;
}

/// Read-only statements are the only cache-eligible ones. CTE-prefixed
/// statements count as SELECT-like.
pub fn is_select_query(sql: &str) -> bool {
    let lower = sql.to_lowercase();
    let trimmed = lower.trim_start();
    trimmed.starts_with("select") || trimmed.starts_with("with")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_detection() {
        assert!(is_select_query("SELECT * FROM t"));
        assert!(is_select_query("  \n select 1"));
        assert!(is_select_query("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_select_query("UPDATE t SET a = 1"));
        assert!(!is_select_query("delete from t"));
        assert!(!is_select_query("INSERT INTO t VALUES (1)"));
    }
}
