use crate::errors::PipelineFailure;
use crate::model::{AnswerSource, PipelineOutput, QueryResult};

const MAX_TABLE_ROWS: usize = 20;

pub fn render_output(out: &PipelineOutput) -> String {
    let mut s = String::new();
    let icon = if out.invalid { "⚠️ " } else { "✅" };
    s.push_str(&format!("{} {}\n", icon, out.question));

    let source = match out.source {
        AnswerSource::ExactMatch => "stored example",
        AnswerSource::Generated => "generated",
    };
    s.push_str(&format!("    SQL ({}, {} rewrite(s)): {}\n", source, out.rounds, out.sql));

    if out.invalid {
        s.push_str("    Status: INVALID after repair; not executed\n");
    }
    if let Some(result) = &out.result {
        s.push_str(&render_table(result));
    }
    if let Some(resp) = &out.response {
        s.push_str(&format!("    Response: {}\n", resp));
    }
    if !out.audit.is_empty() {
        s.push_str("    Audit:\n");
        for line in out.audit.lines() {
            s.push_str(&format!("      {}\n", line));
        }
    }
    s
}

pub fn render_failure(question: &str, f: &PipelineFailure) -> String {
    let mut s = format!("❌ {}\n    Error: {}\n", question, f.error);
    if let Some(sql) = &f.error.last_sql {
        s.push_str(&format!("    Last SQL: {}\n", sql));
    }
    if !f.audit.is_empty() {
        s.push_str("    Audit:\n");
        for line in f.audit.entries() {
            s.push_str(&format!("      {}\n", line));
        }
    }
    s
}

fn render_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "    Result: (no rows)\n".to_string();
    }
    let mut s = format!("    Result ({} row(s)):\n", result.rows.len());
    s.push_str(&format!("      {}\n", result.columns.join(" | ")));
    for row in result.rows.iter().take(MAX_TABLE_ROWS) {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|c| match row.get(c) {
                Some(serde_json::Value::String(v)) => v.clone(),
                Some(serde_json::Value::Null) | None => "NULL".to_string(),
                Some(v) => v.to_string(),
            })
            .collect();
        s.push_str(&format!("      {}\n", cells.join(" | ")));
    }
    if result.rows.len() > MAX_TABLE_ROWS {
        s.push_str(&format!("      ... {} more\n", result.rows.len() - MAX_TABLE_ROWS));
    }
    s
}
