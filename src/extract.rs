//! Text extraction for loaded source bytes.
//!
//! Loaders supply raw bytes plus a content type; this module returns plain
//! UTF-8 text. PDF goes through `pdf-extract`; markdown and plain text are
//! validated as UTF-8 and passed through.

/// Supported content types.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PLAIN: &str = "text/plain";

/// Extraction error. No panic; the loader maps this into a
/// source-unavailable failure.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Utf8(String),
    /// Extraction succeeded but produced no visible text.
    EmptyText,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Utf8(e) => write!(f, "invalid UTF-8: {}", e),
            ExtractError::EmptyText => write!(f, "extraction produced no text"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from source bytes. Whitespace-only output is an
/// error: an index built from it would answer nothing.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let text = match content_type {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_MARKDOWN | MIME_PLAIN => String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractError::Utf8(e.to_string()))?,
        _ => {
            return Err(ExtractError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractError::EmptyText);
    }

    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Content type inferred from a file extension. Extensionless files are
/// assumed to be plain text; unknown extensions are rejected by
/// [`extract_text`] rather than decoded as garbage.
pub fn content_type_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("md") | Some("markdown") => MIME_MARKDOWN,
        Some("txt") | Some("text") | None => MIME_PLAIN,
        _ => "application/octet-stream",
    }
}
