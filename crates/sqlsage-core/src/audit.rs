use serde::Serialize;

/// Append-only, human-readable log of one pipeline run.
///
/// There is intentionally no way to remove or rewrite an entry; stages only
/// `push`. The trail is handed back to the caller for display on both the
/// success and the failure path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditTrail {
    entries: Vec<String>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!(event = "audit", entry = %entry);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    pub fn render(&self) -> String {
        self.entries.join("\n")
    }
}

impl std::fmt::Display for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_entries_in_order() {
        let mut audit = AuditTrail::new();
        assert!(audit.is_empty());
        audit.push("Generated SQL: SELECT 1");
        audit.push("Entering the debugging steps!");
        assert_eq!(audit.len(), 2);
        assert_eq!(audit.last(), Some("Entering the debugging steps!"));
        assert_eq!(
            audit.render(),
            "Generated SQL: SELECT 1\nEntering the debugging steps!"
        );
    }
}
