use crate::crypto::EncryptedArtifact;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_LABEL_LEN: usize = 50;

/// Best-effort artifact store: one JSON document per saved report, keyed by
/// label and timestamp. Callers log persistence failures and carry on; a
/// sink error never fails the request that produced the report.
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `{plain, encrypted?}` as pretty JSON and returns the path.
    pub fn save(
        &self,
        label: &str,
        timestamp: DateTime<Utc>,
        plaintext: &Value,
        encrypted: Option<&EncryptedArtifact>,
    ) -> Result<PathBuf> {
        let stamp = timestamp.format("%Y%m%d_%H%M%S");
        let path = self
            .output_dir
            .join(format!("{}_{stamp}.json", sanitize_label(label)));

        let mut document = json!({ "plain": plaintext });
        if let Some(artifact) = encrypted {
            document["encrypted"] = serde_json::to_value(artifact)?;
        }

        fs::write(&path, serde_json::to_vec_pretty(&document)?)?;
        tracing::info!(path = %path.display(), "report persisted");
        Ok(path)
    }
}

/// Keeps labels filesystem-safe: alphanumerics pass through, everything
/// else becomes an underscore, capped at 50 characters.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .take(MAX_LABEL_LEN)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn labels_are_sanitized() {
        assert_eq!(sanitize_label("github.com results!"), "github_com_results_");
        let long = "a".repeat(80);
        assert_eq!(sanitize_label(&long).len(), 50);
    }

    #[test]
    fn save_writes_well_formed_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        let timestamp = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();

        let plain = json!({"query": "github.com", "analysis": []});
        let path = sink.save("search github.com", timestamp, &plain, None).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "search_github_com_20260823_120000.json"
        );
        let written: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["plain"]["query"], "github.com");
        assert!(written.get("encrypted").is_none());
    }

    #[test]
    fn save_includes_encrypted_section_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        let artifact = EncryptedArtifact {
            encrypted_data: vec!["YWJj".to_string()],
            sha256_hash: "00".repeat(32),
            public_key_reference: "public_key.pem".to_string(),
        };

        let path = sink
            .save("query_ipapi", Utc::now(), &json!({"ok": true}), Some(&artifact))
            .unwrap();
        let written: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["encrypted"]["public_key_reference"], "public_key.pem");
        assert_eq!(written["encrypted"]["encrypted_data"][0], "YWJj");
    }
}
