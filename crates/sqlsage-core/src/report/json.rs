use crate::errors::PipelineFailure;
use crate::model::PipelineOutput;
use serde_json::{json, Value};

pub fn output_json(out: &PipelineOutput) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(out)?)
}

pub fn failure_json(question: &str, f: &PipelineFailure) -> Value {
    json!({
        "question": question,
        "error": {
            "stage": f.error.stage.to_string(),
            "message": format!("{:#}", f.error.source),
            "last_sql": f.error.last_sql,
            "config_error": f.is_config_error(),
        },
        "audit": f.audit.entries(),
    })
}
