use crate::model::{ExecutionOutcome, QueryResult};
use async_trait::async_trait;

pub mod bigquery;
pub mod fake;

/// The data warehouse the generated SQL runs against.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Cost-only trial run that never materializes results.
    ///
    /// Any failure, including transport errors, comes back as an unsuccessful
    /// outcome whose diagnostic can be shown to the repair session.
    async fn dry_run(&self, sql: &str) -> ExecutionOutcome;

    async fn query(&self, sql: &str) -> anyhow::Result<QueryResult>;

    fn name(&self) -> &'static str;
}
