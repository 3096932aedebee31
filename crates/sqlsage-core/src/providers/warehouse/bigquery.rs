use super::Warehouse;
use crate::model::{ExecutionOutcome, QueryResult, SqlRow};
use crate::providers::{google_error_message, GcpSettings};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";

const POLL_TIMEOUT_MS: u64 = 10_000;
const MAX_POLLS: u32 = 30;
const MAX_ROWS: usize = 1_000;

pub struct BigQueryWarehouse {
    gcp: GcpSettings,
    base_url: String,
    client: reqwest::Client,
}

impl BigQueryWarehouse {
    pub fn new(gcp: GcpSettings) -> Self {
        Self {
            gcp,
            base_url: BIGQUERY_API.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.base_url, self.gcp.project_id)
    }

    async fn post_query(&self, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.queries_url())
            .bearer_auth(&self.gcp.access_token)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn get_results(&self, job_id: &str, page_token: Option<&str>) -> anyhow::Result<Value> {
        let url = format!("{}/{}", self.queries_url(), job_id);
        let timeout = POLL_TIMEOUT_MS.to_string();
        let mut params = vec![
            ("location", self.gcp.region.as_str()),
            ("timeoutMs", timeout.as_str()),
        ];
        if let Some(tok) = page_token {
            params.push(("pageToken", tok));
        }
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.gcp.access_token)
            .query(&params)
            .send()
            .await?;
        read_json(resp).await
    }
}

async fn read_json(resp: reqwest::Response) -> anyhow::Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let error_text = resp.text().await.unwrap_or_default();
        anyhow::bail!("BigQuery error ({}): {}", status, google_error_message(&error_text));
    }
    Ok(resp.json().await?)
}

/// First error reported inside an otherwise successful response.
fn job_error(v: &Value) -> Option<String> {
    v.pointer("/errors/0/message")
        .and_then(|m| m.as_str())
        .map(String::from)
}

fn job_id(v: &Value) -> anyhow::Result<String> {
    v.pointer("/jobReference/jobId")
        .and_then(|j| j.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("BigQuery response missing jobReference.jobId"))
}

fn field_names(schema: &Value) -> Vec<(String, String)> {
    schema
        .get("fields")
        .and_then(|f| f.as_array())
        .map(|fields| {
            fields
                .iter()
                .map(|f| {
                    let name = f.get("name").and_then(|n| n.as_str()).unwrap_or("").to_string();
                    let ty = f.get("type").and_then(|t| t.as_str()).unwrap_or("STRING").to_string();
                    (name, ty)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// BigQuery sends every scalar as a string; turn the common types back into JSON.
fn typed_cell(raw: &Value, ty: &str) -> Value {
    let Some(s) = raw.as_str() else {
        return raw.clone();
    };
    match ty {
        "INTEGER" | "INT64" => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| json!(s)),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => s
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or_else(|| json!(s)),
        "BOOLEAN" | "BOOL" => match s {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => json!(s),
        },
        _ => json!(s),
    }
}

pub(crate) fn decode_rows(fields: &[(String, String)], rows: &Value) -> Vec<SqlRow> {
    let Some(rows) = rows.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let cells = row.get("f").and_then(|f| f.as_array());
            let mut out = SqlRow::new();
            for (i, (name, ty)) in fields.iter().enumerate() {
                let raw = cells
                    .and_then(|c| c.get(i))
                    .and_then(|c| c.get("v"))
                    .cloned()
                    .unwrap_or(Value::Null);
                out.insert(name.clone(), typed_cell(&raw, ty));
            }
            out
        })
        .collect()
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn dry_run(&self, sql: &str) -> ExecutionOutcome {
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "dryRun": true,
            "useQueryCache": false,
            "location": self.gcp.region,
        });

        let v = match self.post_query(&body).await {
            Ok(v) => v,
            Err(e) => return ExecutionOutcome::failure(e.to_string()),
        };
        if let Some(err) = job_error(&v) {
            return ExecutionOutcome::failure(err);
        }

        let bytes = v
            .get("totalBytesProcessed")
            .and_then(|b| b.as_str())
            .and_then(|b| b.parse::<u64>().ok())
            .unwrap_or(0);
        tracing::info!(event = "dry_run_ok", bytes_processed = bytes);
        ExecutionOutcome::success(bytes)
    }

    async fn query(&self, sql: &str) -> anyhow::Result<QueryResult> {
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "location": self.gcp.region,
            "timeoutMs": POLL_TIMEOUT_MS,
        });

        let mut v = self.post_query(&body).await?;
        let mut polls = 0;
        while !v.get("jobComplete").and_then(|c| c.as_bool()).unwrap_or(false) {
            polls += 1;
            if polls > MAX_POLLS {
                anyhow::bail!("BigQuery job did not complete after {} polls", MAX_POLLS);
            }
            let id = job_id(&v)?;
            v = self.get_results(&id, None).await?;
        }
        if let Some(err) = job_error(&v) {
            anyhow::bail!("BigQuery job failed: {}", err);
        }

        let fields = v.get("schema").map(field_names).unwrap_or_default();
        let mut rows = decode_rows(&fields, v.get("rows").unwrap_or(&Value::Null));

        let mut page_token = v.get("pageToken").and_then(|t| t.as_str()).map(String::from);
        while let Some(tok) = page_token {
            if rows.len() >= MAX_ROWS {
                tracing::warn!(event = "rows_truncated", max_rows = MAX_ROWS);
                break;
            }
            let id = job_id(&v)?;
            let page = self.get_results(&id, Some(&tok)).await?;
            rows.extend(decode_rows(&fields, page.get("rows").unwrap_or(&Value::Null)));
            page_token = page.get("pageToken").and_then(|t| t.as_str()).map(String::from);
        }
        rows.truncate(MAX_ROWS);

        Ok(QueryResult {
            columns: fields.into_iter().map(|(n, _)| n).collect(),
            rows,
        })
    }

    fn name(&self) -> &'static str {
        "bigquery"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_typed_rows() {
        let resp = json!({
            "schema": { "fields": [
                { "name": "customer", "type": "STRING" },
                { "name": "revenue", "type": "FLOAT" },
                { "name": "orders", "type": "INTEGER" },
                { "name": "active", "type": "BOOLEAN" }
            ]},
            "rows": [
                { "f": [ { "v": "Acme" }, { "v": "1250.5" }, { "v": "12" }, { "v": "true" } ] },
                { "f": [ { "v": "Globex" }, { "v": null }, { "v": "3" }, { "v": "false" } ] }
            ],
            "jobComplete": true
        });
        let fields = field_names(&resp["schema"]);
        let rows = decode_rows(&fields, &resp["rows"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["customer"], "Acme");
        assert_eq!(rows[0]["revenue"], 1250.5);
        assert_eq!(rows[0]["orders"], 12);
        assert_eq!(rows[0]["active"], true);
        assert_eq!(rows[1]["revenue"], Value::Null);
    }

    #[test]
    fn missing_rows_decode_to_empty() {
        let fields = vec![("content".to_string(), "STRING".to_string())];
        assert!(decode_rows(&fields, &Value::Null).is_empty());
    }

    #[test]
    fn job_error_reads_first_message() {
        let v = json!({ "errors": [ { "message": "Syntax error: Unexpected keyword FROM at [1:8]" } ] });
        assert_eq!(
            job_error(&v).as_deref(),
            Some("Syntax error: Unexpected keyword FROM at [1:8]")
        );
        assert!(job_error(&json!({})).is_none());
    }
}
