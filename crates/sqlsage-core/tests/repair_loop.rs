use sqlsage_core::agents::debugger::{DONE_NOTE, EXHAUSTED_NOTE};
use sqlsage_core::agents::{RepairContext, RepairPolicy, RepairState, SqlDebugger, SqlValidator};
use sqlsage_core::audit::AuditTrail;
use sqlsage_core::errors::{malformed_response, Stage};
use sqlsage_core::model::ExecutionOutcome;
use sqlsage_core::providers::llm::fake::FakeClient;
use sqlsage_core::providers::warehouse::fake::FakeWarehouse;
use std::sync::Arc;

const CTX: RepairContext<'static> = RepairContext {
    question: "who had the most revenue?",
    table_schema: "t: one row per sale",
    column_schema: "t.customer STRING, t.amount FLOAT64",
    examples: "-No examples provided..-",
};

const ALWAYS_INVALID: &str = r#"```json
{"valid": false, "errors": "column revenue does not exist in t"}
```"#;

fn debugger(chat: &Arc<FakeClient>, wh: &Arc<FakeWarehouse>, max_rounds: u32, llm_validation: bool) -> SqlDebugger {
    SqlDebugger::new(
        chat.clone(),
        wh.clone(),
        RepairPolicy {
            max_rounds,
            llm_validation,
            call_timeout: None,
        },
    )
}

#[tokio::test]
async fn budget_bounds_attempts_for_every_n() -> anyhow::Result<()> {
    for n in 0..=4u32 {
        let checker = Arc::new(FakeClient::new("gemini-1.0-pro").with_fallback(ALWAYS_INVALID));
        let chat = Arc::new(FakeClient::new("gemini-1.0-pro").with_fallback("```sql\nSELECT customer FROM t\n```"));
        let wh = Arc::new(FakeWarehouse::new());
        let validator = SqlValidator::new(checker.clone());

        let mut audit = AuditTrail::new();
        let out = debugger(&chat, &wh, n, true)
            .start_debugger("SELECT revenue FROM t", &CTX, &validator, &mut audit)
            .await?;

        assert_eq!(out.state, RepairState::Exhausted, "budget {}", n);
        assert!(out.invalid);
        assert_eq!(out.iterations, n + 1);
        assert_eq!(checker.prompts().len() as u32, n + 1, "validator calls for budget {}", n);
        assert_eq!(chat.prompts().len() as u32, n + 1, "rewrites for budget {}", n);
        assert!(wh.dry_run_sql().is_empty());
        assert_eq!(audit.len() as u32, out.iterations + 1);
        assert_eq!(audit.last(), Some(EXHAUSTED_NOTE));
    }
    Ok(())
}

#[tokio::test]
async fn always_invalid_with_budget_two_rewrites_three_times() -> anyhow::Result<()> {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro").with_fallback(ALWAYS_INVALID));
    let chat = Arc::new(FakeClient::new("codechat-bison-32k").with_responses([
        "SELECT a FROM t",
        "SELECT b FROM t",
        "SELECT c FROM t",
    ]));
    let wh = Arc::new(FakeWarehouse::new());
    let validator = SqlValidator::new(checker);

    let mut audit = AuditTrail::new();
    let out = debugger(&chat, &wh, 2, true)
        .start_debugger("SELECT revenue FROM t", &CTX, &validator, &mut audit)
        .await?;

    assert_eq!(chat.prompts().len(), 3);
    assert_eq!(out.rounds, 3);
    assert!(out.invalid);
    assert_eq!(out.state, RepairState::Exhausted);
    // Whatever the last rewrite produced is handed back.
    assert_eq!(out.sql, "SELECT c FROM t");
    assert_eq!(chat.sessions_started(), 1);
    assert!(chat.prompts()[0].contains("column revenue does not exist in t"));
    Ok(())
}

#[tokio::test]
async fn bypassed_validation_and_clean_probe_finish_in_one_iteration() -> anyhow::Result<()> {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro"));
    let chat = Arc::new(FakeClient::new("gemini-1.0-pro"));
    let wh = Arc::new(FakeWarehouse::new());
    let validator = SqlValidator::new(checker.clone());

    let mut audit = AuditTrail::new();
    let out = debugger(&chat, &wh, 2, false)
        .start_debugger("SELECT 1", &CTX, &validator, &mut audit)
        .await?;

    assert_eq!(out.state, RepairState::Done);
    assert!(!out.invalid);
    assert_eq!(out.iterations, 1);
    assert_eq!(out.rounds, 0);
    assert!(checker.prompts().is_empty());
    assert!(chat.prompts().is_empty());
    assert_eq!(wh.dry_run_sql(), vec!["SELECT 1"]);
    assert_eq!(audit.len(), 2);
    Ok(())
}

#[tokio::test]
async fn revenue_question_is_done_after_one_attempt() -> anyhow::Result<()> {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro").with_responses([r#"{"valid": true}"#]));
    let chat = Arc::new(FakeClient::new("gemini-1.0-pro"));
    let wh = Arc::new(FakeWarehouse::new().with_dry_runs([ExecutionOutcome::success(500)]));
    let validator = SqlValidator::new(checker);

    let mut audit = AuditTrail::new();
    let out = debugger(&chat, &wh, 2, true)
        .start_debugger("SELECT * FROM t", &CTX, &validator, &mut audit)
        .await?;

    assert_eq!(out.state, RepairState::Done);
    assert_eq!(out.sql, "SELECT * FROM t");
    assert!(!out.invalid);
    assert_eq!(out.iterations, 1);
    assert_eq!(
        audit.entries(),
        [
            "Generated SQL passed the dry run! This query will process 500 bytes.",
            DONE_NOTE
        ]
    );
    Ok(())
}

#[tokio::test]
async fn probe_failing_twice_then_passing_keeps_last_rewrite() -> anyhow::Result<()> {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro").with_fallback(r#"{"valid": true, "errors": []}"#));
    let chat = Arc::new(
        FakeClient::new("gemini-1.0-pro").with_responses(["```sql\nSELECT r1 FROM t\n```", "SELECT r2 FROM t"]),
    );
    let wh = Arc::new(FakeWarehouse::new().with_dry_runs([
        ExecutionOutcome::failure("Unrecognized name: revenue at [1:8]"),
        ExecutionOutcome::failure("Syntax error: Unexpected end of script"),
        ExecutionOutcome::success(1024),
    ]));
    let validator = SqlValidator::new(checker);

    let mut audit = AuditTrail::new();
    let out = debugger(&chat, &wh, 2, true)
        .start_debugger("SELECT revenue FROM t", &CTX, &validator, &mut audit)
        .await?;

    assert_eq!(out.state, RepairState::Done);
    assert!(!out.invalid);
    assert_eq!(out.iterations, 3);
    assert_eq!(out.rounds, 2);
    assert_eq!(out.sql, "SELECT r2 FROM t");
    assert_eq!(
        wh.dry_run_sql(),
        vec!["SELECT revenue FROM t", "SELECT r1 FROM t", "SELECT r2 FROM t"]
    );
    assert_eq!(audit.len() as u32, out.iterations + 1);
    assert!(audit.entries()[0].starts_with("Generated SQL failed on execution!"));

    let prompts = chat.prompts();
    assert!(prompts[0].contains("Unrecognized name: revenue at [1:8]"));
    assert!(prompts[1].contains("Original SQL:\nSELECT r1 FROM t"));
    Ok(())
}

#[tokio::test]
async fn rewrites_are_normalized_before_the_next_probe() -> anyhow::Result<()> {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro"));
    let chat = Arc::new(FakeClient::new("gemini-1.0-pro").with_responses(["```sql\nEXPLAIN ANALYZE SELECT 2\n```"]));
    let wh = Arc::new(FakeWarehouse::new().with_dry_runs([ExecutionOutcome::failure("boom")]));
    let validator = SqlValidator::new(checker);

    let mut audit = AuditTrail::new();
    let out = debugger(&chat, &wh, 2, false)
        .start_debugger("```sql\nSELECT 1\n```", &CTX, &validator, &mut audit)
        .await?;

    assert_eq!(wh.dry_run_sql(), vec!["SELECT 1", "SELECT 2"]);
    assert_eq!(out.sql, "SELECT 2");
    Ok(())
}

#[tokio::test]
async fn malformed_verdict_is_an_error_not_a_guess() {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro").with_responses(["Looks valid to me!"]));
    let chat = Arc::new(FakeClient::new("gemini-1.0-pro"));
    let wh = Arc::new(FakeWarehouse::new());
    let validator = SqlValidator::new(checker);

    let mut audit = AuditTrail::new();
    let err = debugger(&chat, &wh, 2, true)
        .start_debugger("SELECT * FROM t", &CTX, &validator, &mut audit)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Repair);
    assert_eq!(err.last_sql.as_deref(), Some("SELECT * FROM t"));
    assert!(malformed_response(&err.source).is_some());
    assert!(wh.dry_run_sql().is_empty());
    assert!(audit.is_empty());
}

#[tokio::test]
async fn concurrent_runs_own_their_sessions() -> anyhow::Result<()> {
    let checker = Arc::new(FakeClient::new("gemini-1.0-pro"));
    let chat = Arc::new(FakeClient::new("gemini-1.0-pro").with_fallback("SELECT fixed"));
    let wh = Arc::new(FakeWarehouse::new().with_dry_runs([
        ExecutionOutcome::failure("first"),
        ExecutionOutcome::failure("second"),
    ]));
    let validator = SqlValidator::new(checker);
    let dbg = debugger(&chat, &wh, 2, false);

    let mut a = AuditTrail::new();
    let mut b = AuditTrail::new();
    let (ra, rb) = tokio::join!(
        dbg.start_debugger("SELECT a", &CTX, &validator, &mut a),
        dbg.start_debugger("SELECT b", &CTX, &validator, &mut b),
    );
    let (ra, rb) = (ra?, rb?);

    assert_eq!(chat.sessions_started(), 2);
    assert!(!ra.invalid && !rb.invalid);
    assert_eq!(a.len() as u32, ra.iterations + 1);
    assert_eq!(b.len() as u32, rb.iterations + 1);
    Ok(())
}
