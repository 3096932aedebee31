//! Normalization applied wherever model output turns into SQL or JSON input.

const SQL_FENCE: &str = "```sql";
const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";
const EXPLAIN_ANALYZE: &str = "EXPLAIN ANALYZE ";

/// Strips every code-fence marker and any leading `EXPLAIN ANALYZE `, then trims.
/// Text inside the statement, string literals included, is left alone.
///
/// Idempotent: applying it to its own output changes nothing.
pub fn normalize_sql(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        // Removing one marker can splice together another one.
        let unfenced = current.replace(SQL_FENCE, "").replace(FENCE, "");
        let mut next = unfenced.trim();
        while let Some(rest) = next.strip_prefix(EXPLAIN_ANALYZE) {
            next = rest.trim_start();
        }
        if next == current {
            return current;
        }
        current = next.to_string();
    }
}

/// Strips JSON code fences so the remainder can be handed to `serde_json`.
pub fn strip_json_fences(raw: &str) -> String {
    raw.replace(JSON_FENCE, "").replace(FENCE, "").trim().to_string()
}
