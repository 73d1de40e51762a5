//! Remote HTTP source loader.
//!
//! Fetches a declared URL with an explicit timeout and normalizes the
//! response to plain text. HTML responses are flattened (script and style
//! content dropped); JSON and plain text pass through. Connection errors,
//! non-2xx statuses, and empty bodies are terminal for the current rebuild
//! attempt; there are no retries at this layer.

use chrono::Utc;
use scraper::{ElementRef, Html};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{HarnessError, Result};
use crate::models::Document;

/// Fetch `url` into a single [`Document`] for `source_name`.
pub async fn fetch_remote(
    source_name: &str,
    url: &str,
    timeout_secs: u64,
) -> Result<Vec<Document>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HarnessError::unavailable(source_name, format!("client setup: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| HarnessError::unavailable(source_name, format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarnessError::unavailable(
            source_name,
            format!("HTTP {} from {}", status.as_u16(), url),
        ));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .split(';')
        .next()
        .unwrap_or("text/plain")
        .trim()
        .to_string();

    let raw = response
        .text()
        .await
        .map_err(|e| HarnessError::unavailable(source_name, format!("body read: {}", e)))?;

    let body = if content_type == "text/html" {
        flatten_html(&raw)
    } else {
        raw
    };

    if body.trim().is_empty() {
        return Err(HarnessError::unavailable(
            source_name,
            format!("empty body from {}", url),
        ));
    }

    let metadata_json = serde_json::json!({
        "url": url,
        "content_type": content_type,
    })
    .to_string();

    Ok(vec![Document {
        id: Uuid::new_v4().to_string(),
        source: source_name.to_string(),
        source_id: url.to_string(),
        title: Some(url.to_string()),
        content_type,
        fetched_at: Utc::now(),
        body,
        metadata_json,
    }])
}

/// Flatten an HTML page to plain text.
///
/// Walks the DOM, skipping `script`, `style`, and `noscript` subtrees,
/// and collapses runs of whitespace to single spaces.
pub fn flatten_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();
    collect_text(doc.root_element(), &mut out);

    let collapsed: Vec<&str> = out.split_whitespace().collect();
    collapsed.join(" ")
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            match el.value().name() {
                "script" | "style" | "noscript" => continue,
                _ => collect_text(el, out),
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}
