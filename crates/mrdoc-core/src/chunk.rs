//! Paragraph-boundary text chunker with tail overlap.
//!
//! Splits document text into [`Chunk`]s that respect a `max_tokens` limit.
//! Splitting happens on paragraph boundaries (`\n\n`) so that a hunk of a
//! diff, or a section of a documentation page, stays together when it fits.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` and `overlap_tokens` to characters at 4 chars/token.
//! 2. Split text on `\n\n` and accumulate paragraphs into a buffer.
//! 3. When the next paragraph would overflow, flush the buffer as a chunk and
//!    seed the next buffer with the last `overlap` characters of the flushed
//!    chunk (snapped forward to a whitespace boundary).
//! 4. A paragraph larger than `max_chars` is hard-split at the nearest
//!    newline or space, without overlap.
//! 5. At least one chunk is always returned.
//!
//! # Example
//!
//! ```rust
//! use mrdoc_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", 1024, 20);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries.
///
/// Chunk indices are contiguous from 0. Overlap is capped at half the chunk
/// size so every chunk carries new text.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 2);

    if text.is_empty() {
        return vec![make_chunk(document_id, 0, text)];
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    // Bytes at the front of `buf` carried over from the previous chunk.
    let mut carried = 0usize;
    let mut chunk_index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        if joined_len(&buf, trimmed) > max_chars && buf.len() > carried {
            chunks.push(make_chunk(document_id, chunk_index, &buf));
            chunk_index += 1;
            let tail = overlap_tail(&buf, overlap_chars).to_string();
            buf = tail;
            carried = buf.len();
        }

        // Overlap alone cannot make room for this paragraph.
        if joined_len(&buf, trimmed) > max_chars && buf.len() == carried {
            buf.clear();
            carried = 0;
        }

        if trimmed.len() > max_chars {
            if buf.len() > carried {
                chunks.push(make_chunk(document_id, chunk_index, &buf));
                chunk_index += 1;
            }
            buf.clear();
            carried = 0;

            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = hard_split_point(remaining, max_chars);
                let piece = remaining[..split_at].trim();
                if !piece.is_empty() {
                    chunks.push(make_chunk(document_id, chunk_index, piece));
                    chunk_index += 1;
                }
                remaining = &remaining[split_at..];
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if buf.len() > carried {
        chunks.push(make_chunk(document_id, chunk_index, &buf));
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text.trim()));
    }

    chunks
}

fn joined_len(buf: &str, next: &str) -> usize {
    if buf.is_empty() {
        next.len()
    } else {
        buf.len() + 2 + next.len()
    }
}

/// Byte offset at which to cut `s` so the head is at most `max_chars`,
/// preferring a newline or space. Always makes progress.
fn hard_split_point(s: &str, max_chars: usize) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let limit = snap_to_char_boundary(s, max_chars);
    let split = s[..limit]
        .rfind('\n')
        .or_else(|| s[..limit].rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(limit);
    if split == 0 {
        s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
    } else {
        split
    }
}

/// The last `n` bytes of `s`, moved forward to a char and word boundary.
fn overlap_tail(s: &str, n: usize) -> &str {
    if n == 0 || s.is_empty() {
        return "";
    }
    let mut start = s.len().saturating_sub(n);
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    let tail = &s[start..];
    if start == 0 {
        return tail.trim_start();
    }
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => tail,
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
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
