//! Fixed-size text chunker.
//!
//! Splits document text into segments of at most `chunk_size` characters,
//! merges undersized non-final segments into their successor, and records
//! character-offset metadata on every chunk.
//!
//! Splitting is character-level (Unicode scalar values), not token- or
//! sentence-aware. Every character of the input lands in exactly one
//! chunk, and chunk indices are contiguous starting at 0.
//!
//! # Algorithm
//!
//! 1. Split the text into contiguous segments of at most `chunk_size`
//!    characters, covering the input exactly once.
//! 2. Merge pass: a non-final segment shorter than `chunk_size - 100`
//!    is concatenated into the segment that follows it, repeated until
//!    no segment (except possibly the last) is under the threshold.
//! 3. Offset pass: assign indices from 0 and track a running start
//!    offset; `end_char = start_char + chars(text)`.
//! 4. Attach caller metadata plus `chunk_index`, `start_char`,
//!    `end_char` to each chunk.

use serde_json::json;

use crate::error::{Error, Result};
use crate::models::{Chunk, Metadata};

/// Slack below `chunk_size` a non-final segment may shrink to before the
/// merge pass folds it into its successor.
const MERGE_SLACK: usize = 100;

/// Split `document_text` into ordered chunks of at most `chunk_size`
/// characters, carrying `metadata` onto every chunk.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `chunk_size` is zero or
/// `chunk_overlap` is not smaller than `chunk_size` (the offset
/// bookkeeping would walk the running start backwards). Empty input
/// produces an empty `Vec`, not an error.
pub fn chunk(
    document_text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    metadata: &Metadata,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(Error::InvalidArgument(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(Error::InvalidArgument(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    if document_text.is_empty() {
        return Ok(Vec::new());
    }

    let segments = merge_undersized(split_fixed(document_text, chunk_size), chunk_size);

    let mut chunks = Vec::with_capacity(segments.len());
    let mut start: i64 = 0;

    for (idx, text) in segments.into_iter().enumerate() {
        let char_len = text.chars().count() as i64;
        let end = start + char_len;

        let mut meta = metadata.clone();
        meta.insert("chunk_index".to_string(), json!(idx as i64));
        meta.insert("start_char".to_string(), json!(start));
        meta.insert("end_char".to_string(), json!(end));

        chunks.push(Chunk {
            text,
            index: idx as i64,
            start_char: start,
            end_char: end,
            metadata: meta,
        });

        // With overlap, the next start follows the historical
        // `end - overlap + 1` bookkeeping. Once segments have been
        // merged this no longer equals the true substring position;
        // it is carried as an approximation.
        start = if chunk_overlap > 0 {
            end - chunk_overlap as i64 + 1
        } else {
            end
        };
    }

    Ok(chunks)
}

/// Split text into contiguous segments of at most `chunk_size` characters.
fn split_fixed(text: &str, chunk_size: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        buf.push(ch);
        count += 1;
        if count == chunk_size {
            segments.push(std::mem::take(&mut buf));
            count = 0;
        }
    }
    if !buf.is_empty() {
        segments.push(buf);
    }

    segments
}

/// Fold non-final segments shorter than `chunk_size - MERGE_SLACK` into
/// the segment that follows them.
fn merge_undersized(mut segments: Vec<String>, chunk_size: usize) -> Vec<String> {
    let threshold = chunk_size.saturating_sub(MERGE_SLACK);
    let mut i = 0;
    while i + 1 < segments.len() {
        if segments[i].chars().count() < threshold {
            let next = segments.remove(i + 1);
            segments[i].push_str(&next);
        } else {
            i += 1;
        }
    }
    segments
}
