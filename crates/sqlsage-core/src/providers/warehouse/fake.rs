use super::Warehouse;
use crate::model::{ExecutionOutcome, QueryResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

enum Answer {
    Rows(QueryResult),
    Fail(String),
}

#[derive(Default)]
struct FakeWarehouseState {
    dry_runs: VecDeque<ExecutionOutcome>,
    rules: Vec<(String, Answer)>,
    dry_run_sql: Vec<String>,
    queried_sql: Vec<String>,
}

/// In-memory warehouse for tests.
///
/// Dry runs pop scripted outcomes and succeed once the script is empty.
/// Queries answer with the first rule whose needle occurs in the SQL, or an
/// empty result.
#[derive(Default)]
pub struct FakeWarehouse {
    state: Mutex<FakeWarehouseState>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dry_runs<I: IntoIterator<Item = ExecutionOutcome>>(self, outcomes: I) -> Self {
        self.lock().dry_runs.extend(outcomes);
        self
    }

    pub fn with_result_for(self, needle: &str, result: QueryResult) -> Self {
        self.lock()
            .rules
            .push((needle.to_string(), Answer::Rows(result)));
        self
    }

    pub fn with_failure_for(self, needle: &str, message: &str) -> Self {
        self.lock()
            .rules
            .push((needle.to_string(), Answer::Fail(message.to_string())));
        self
    }

    pub fn dry_run_sql(&self) -> Vec<String> {
        self.lock().dry_run_sql.clone()
    }

    pub fn queried_sql(&self) -> Vec<String> {
        self.lock().queried_sql.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeWarehouseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn dry_run(&self, sql: &str) -> ExecutionOutcome {
        let mut st = self.lock();
        st.dry_run_sql.push(sql.to_string());
        st.dry_runs
            .pop_front()
            .unwrap_or_else(|| ExecutionOutcome::success(0))
    }

    async fn query(&self, sql: &str) -> anyhow::Result<QueryResult> {
        let mut st = self.lock();
        st.queried_sql.push(sql.to_string());
        match st.rules.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((_, Answer::Rows(r))) => Ok(r.clone()),
            Some((_, Answer::Fail(msg))) => anyhow::bail!("fake warehouse error: {}", msg),
            None => Ok(QueryResult::default()),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
