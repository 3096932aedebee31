use super::validator::SqlValidator;
use crate::audit::AuditTrail;
use crate::errors::{Stage, StageError};
use crate::model::Verdict;
use crate::providers::llm::{ChatSession, LlmClient};
use crate::providers::warehouse::Warehouse;
use crate::providers::with_timeout;
use crate::sql::normalize_sql;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DEBUGGING_ROUNDS: u32 = 2;

pub const ENTERING_DEBUGGER: &str = "Entering the debugging steps!";
pub const EXHAUSTED_NOTE: &str = "Exceeded the number of iterations for correction!";
pub const DONE_NOTE: &str = "Done: the SQL passed validation and the dry run.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairPolicy {
    /// Rewrites allowed after the first draft. `N` permits `N + 1` attempts.
    pub max_rounds: u32,
    pub llm_validation: bool,
    pub call_timeout: Option<Duration>,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_DEBUGGING_ROUNDS,
            llm_validation: true,
            call_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Generated,
    Validating,
    Executing,
    Rewriting,
    Done,
    Exhausted,
}

impl RepairState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepairState::Done | RepairState::Exhausted)
    }
}

impl fmt::Display for RepairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepairState::Generated => "generated",
            RepairState::Validating => "validating",
            RepairState::Executing => "executing",
            RepairState::Rewriting => "rewriting",
            RepairState::Done => "done",
            RepairState::Exhausted => "exhausted",
        })
    }
}

/// Schema and example text shared by every prompt of one run.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub question: &'a str,
    pub table_schema: &'a str,
    pub column_schema: &'a str,
    pub examples: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub sql: String,
    /// True only when the round budget ran out.
    pub invalid: bool,
    /// Rewrites performed.
    pub rounds: u32,
    /// Validation/dry-run attempts made.
    pub iterations: u32,
    pub state: RepairState,
}

/// Validate, dry-run and rewrite a draft until it runs or the budget is spent.
pub struct SqlDebugger {
    client: Arc<dyn LlmClient>,
    warehouse: Arc<dyn Warehouse>,
    policy: RepairPolicy,
}

impl SqlDebugger {
    pub fn new(client: Arc<dyn LlmClient>, warehouse: Arc<dyn Warehouse>, policy: RepairPolicy) -> Self {
        Self {
            client,
            warehouse,
            policy,
        }
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    pub fn context_prompt(table_schema: &str, column_schema: &str, examples: &str) -> String {
        format!(
            "You are a BigQuery SQL guru. This session is troubleshooting a BigQuery SQL query. As the user provides versions of the query and the errors returned by BigQuery,\n\
             return a new alternative SQL query that fixes the errors.\n\
             \n\
             Guidelines:\n\
             - Join as few tables as possible.\n\
             - Ensure all join columns are the same data type.\n\
             - Use SAFE_CAST.\n\
             - Generate the SQL in a single line.\n\
             - Use fully qualified names with ticks (`project_id.owner.table_name`).\n\
             - Table names are case-sensitive.\n\
             - Refer to the examples provided: {examples}\n\
             \n\
             Parameters:\n\
             - Table metadata: {table_schema}\n\
             - Column metadata: {column_schema}\n\
             - SQL example: {examples}\n"
        )
    }

    pub fn rewrite_prompt(sql: &str, error: &str) -> String {
        format!(
            "What is an alternative SQL statement to address the error mentioned below?\n\
             \n\
             Original SQL:\n\
             {sql}\n\
             \n\
             Error:\n\
             {error}\n"
        )
    }

    /// Opens the one session a repair run talks to.
    pub async fn init_chat(&self, ctx: &RepairContext<'_>) -> anyhow::Result<Box<dyn ChatSession>> {
        let context = Self::context_prompt(ctx.table_schema, ctx.column_schema, ctx.examples);
        with_timeout(self.policy.call_timeout, "start_chat", self.client.start_chat(&context)).await
    }

    /// Asks the session for a replacement of `sql` that avoids `error`.
    pub async fn rewrite_sql_chat(
        &self,
        session: &mut dyn ChatSession,
        sql: &str,
        error: &str,
    ) -> anyhow::Result<String> {
        let prompt = Self::rewrite_prompt(sql, error);
        let reply = with_timeout(self.policy.call_timeout, "chat", session.send(&prompt)).await?;
        Ok(normalize_sql(&reply))
    }

    /// Runs the repair loop on `draft`.
    ///
    /// Every attempt appends one entry to `audit` and the termination appends
    /// one more. Validator, session and timeout failures end the run with a
    /// [`StageError`] carrying the draft that was current; `audit` keeps what
    /// was recorded until then.
    pub async fn start_debugger(
        &self,
        draft: &str,
        ctx: &RepairContext<'_>,
        validator: &SqlValidator,
        audit: &mut AuditTrail,
    ) -> Result<RepairOutcome, StageError> {
        let mut sql = normalize_sql(draft);
        let mut session = self.init_chat(ctx).await.map_err(|e| repair_failed(e, &sql))?;

        let mut state = RepairState::Generated;
        let mut round: u32 = 0;
        let mut iterations: u32 = 0;

        loop {
            if round > self.policy.max_rounds {
                transition(&mut state, RepairState::Exhausted, round);
                audit.push(EXHAUSTED_NOTE);
                tracing::warn!(
                    event = "repair_exhausted",
                    rounds = round,
                    max_rounds = self.policy.max_rounds
                );
                return Ok(RepairOutcome {
                    sql,
                    invalid: true,
                    rounds: round,
                    iterations,
                    state,
                });
            }
            iterations += 1;

            transition(&mut state, RepairState::Validating, round);
            let verdict = if self.policy.llm_validation {
                with_timeout(
                    self.policy.call_timeout,
                    "validate",
                    validator.check(ctx.question, ctx.table_schema, ctx.column_schema, &sql),
                )
                .await
                .map_err(|e| repair_failed(e, &sql))?
            } else {
                Verdict::bypassed()
            };

            let error = if verdict.valid {
                transition(&mut state, RepairState::Executing, round);
                let outcome = with_timeout(self.policy.call_timeout, "dry_run", async {
                    Ok(self.warehouse.dry_run(&sql).await)
                })
                .await
                .map_err(|e| repair_failed(e, &sql))?;

                if outcome.succeeded {
                    audit.push(format!("Generated SQL passed the dry run! {}", outcome.diagnostic));
                    transition(&mut state, RepairState::Done, round);
                    audit.push(DONE_NOTE);
                    tracing::info!(event = "repair_done", rounds = round, iterations = iterations);
                    return Ok(RepairOutcome {
                        sql,
                        invalid: false,
                        rounds: round,
                        iterations,
                        state,
                    });
                }
                audit.push(format!("Generated SQL failed on execution! {}", outcome.diagnostic));
                outcome.diagnostic
            } else {
                let detail = verdict.error_detail();
                audit.push(format!("Generated SQL failed validation! {}", detail));
                detail
            };

            transition(&mut state, RepairState::Rewriting, round);
            sql = self
                .rewrite_sql_chat(session.as_mut(), &sql, &error)
                .await
                .map_err(|e| repair_failed(e, &sql))?;
            round += 1;
            tracing::info!(event = "sql_rewritten", round = round, turns = session.turns());
        }
    }
}

fn transition(state: &mut RepairState, next: RepairState, round: u32) {
    tracing::debug!(event = "repair_state", from = %state, to = %next, round = round);
    *state = next;
}

fn repair_failed(e: anyhow::Error, sql: &str) -> StageError {
    StageError::new(Stage::Repair, e).with_sql(sql)
}
