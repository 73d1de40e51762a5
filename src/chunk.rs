//! Paragraph-boundary text chunker.
//!
//! Splits a document body into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! so each chunk stays semantically coherent; oversized paragraphs are
//! hard-split at word boundaries.
//!
//! Each chunk carries a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio used to convert the token budget
/// into a character budget.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0. Always returns
/// at least one chunk.
pub fn chunk_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut next_index: i64 = 0;

    let mut flush = |buf: &mut String, next_index: &mut i64, chunks: &mut Vec<Chunk>| {
        if !buf.is_empty() {
            chunks.push(make_chunk(document_id, *next_index, buf));
            *next_index += 1;
            buf.clear();
        }
    };

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let joined_len = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if joined_len > max_chars {
            flush(&mut buf, &mut next_index, &mut chunks);
        }

        if para.len() > max_chars {
            // Paragraph alone exceeds the budget; hard-split it at word
            // boundaries where possible.
            for piece in hard_split(para, max_chars) {
                chunks.push(make_chunk(document_id, next_index, piece.trim()));
                next_index += 1;
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }
    }

    flush(&mut buf, &mut next_index, &mut chunks);

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text.trim()));
    }

    chunks
}

fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            pieces.push(remaining);
            break;
        }
        // Prefer a newline or space boundary inside the window
        let window = floor_char_boundary(remaining, max_chars);
        let cut = remaining[..window]
            .rfind('\n')
            .or_else(|| remaining[..window].rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(window);
        pieces.push(&remaining[..cut]);
        remaining = &remaining[cut..];
    }
    pieces
}

fn floor_char_boundary(s: &str, mut at: usize) -> usize {
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at.max(1)
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_yields_single_chunk() {
        let chunks = chunk_text("doc1", "Software Engineer, Acme Corp, 2019-2021", 256);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Software Engineer, Acme Corp, 2019-2021");
    }

    #[test]
    fn empty_text_yields_one_empty_chunk() {
        let chunks = chunk_text("doc1", "", 256);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].text.is_empty());
    }

    #[test]
    fn paragraphs_under_budget_are_packed_together() {
        let text = "First role.\n\nSecond role.\n\nThird role.";
        let chunks = chunk_text("doc1", text, 256);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First role."));
        assert!(chunks[0].text.contains("Third role."));
    }

    #[test]
    fn paragraphs_over_budget_split_with_contiguous_indices() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("doc1", text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "word ".repeat(100);
        let chunks = chunk_text("doc1", &text, 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 21, "piece too long: {}", c.text.len());
        }
    }

    #[test]
    fn chunking_is_deterministic_in_text_and_hash() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunk_text("doc1", text, 5);
        let b = chunk_text("doc1", text, 5);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }
}
