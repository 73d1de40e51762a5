//! Local file source loader.
//!
//! Reads a declared file from disk and extracts its text. Any failure
//! (missing path, unreadable bytes, failed extraction, whitespace-only
//! content) is terminal for the current rebuild attempt.

use chrono::Utc;
use std::path::Path;
use uuid::Uuid;

use crate::error::{HarnessError, Result};
use crate::extract;
use crate::models::Document;

/// Load the file at `path` into a single [`Document`] for `source_name`.
pub fn fetch_local(source_name: &str, path: &Path) -> Result<Vec<Document>> {
    if !path.exists() {
        return Err(HarnessError::unavailable(
            source_name,
            format!("file not found: {}", path.display()),
        ));
    }

    let bytes = std::fs::read(path)
        .map_err(|e| HarnessError::unavailable(source_name, format!("read failed: {}", e)))?;

    let content_type = extract::content_type_for_path(path);
    let body = extract::extract_text(&bytes, content_type)
        .map_err(|e| HarnessError::unavailable(source_name, e.to_string()))?;

    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    let metadata_json = serde_json::json!({
        "path": path.display().to_string(),
        "bytes": bytes.len(),
    })
    .to_string();

    Ok(vec![Document {
        id: Uuid::new_v4().to_string(),
        source: source_name.to_string(),
        source_id: path.display().to_string(),
        title,
        content_type: content_type.to_string(),
        fetched_at: Utc::now(),
        body,
        metadata_json,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = fetch_local("resume", Path::new("/nonexistent/resume.pdf")).unwrap_err();
        match err {
            HarnessError::SourceUnavailable { source_name: source, reason } => {
                assert_eq!(source, "resume");
                assert!(reason.contains("not found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn text_file_becomes_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, "Software Engineer, Acme Corp, 2019-2021").unwrap();

        let docs = fetch_local("resume", &path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "resume");
        assert_eq!(docs[0].title.as_deref(), Some("resume"));
        assert_eq!(docs[0].content_type, "text/plain");
        assert!(docs[0].body.contains("Acme Corp"));
    }

    #[test]
    fn empty_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, "   \n  ").unwrap();

        let err = fetch_local("resume", &path).unwrap_err();
        assert!(matches!(err, HarnessError::SourceUnavailable { .. }));
    }
}
