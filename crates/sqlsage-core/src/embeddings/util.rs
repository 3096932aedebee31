use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

pub fn embed_cache_key(model_id: &str, text: &str) -> String {
    format!("emb|{}|{}", model_id, sha256_hex(text))
}

/// Renders a vector as a BigQuery `ARRAY<FLOAT64>` literal.
pub fn vector_literal(v: &[f32]) -> anyhow::Result<String> {
    if v.is_empty() {
        anyhow::bail!("cannot search with an empty embedding");
    }
    let mut out = String::with_capacity(v.len() * 12 + 2);
    out.push('[');
    for (i, x) in v.iter().enumerate() {
        if !x.is_finite() {
            anyhow::bail!("embedding contains a non-finite value at index {}", i);
        }
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&x.to_string());
    }
    out.push(']');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_depends_on_model_and_text() {
        let a = embed_cache_key("textembedding-gecko@002", "who had the most revenue?");
        let b = embed_cache_key("textembedding-gecko@003", "who had the most revenue?");
        let c = embed_cache_key("textembedding-gecko@002", "who had the least revenue?");
        assert!(a.starts_with("emb|textembedding-gecko@002|"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn vector_literal_formats_array() -> anyhow::Result<()> {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25])?, "[0.5, -1, 2.25]");
        Ok(())
    }

    #[test]
    fn vector_literal_rejects_bad_input() {
        assert!(vector_literal(&[]).is_err());
        assert!(vector_literal(&[1.0, f32::NAN]).is_err());
    }
}
