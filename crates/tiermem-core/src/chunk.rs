//! Fixed-stride overlapping text chunker.
//!
//! Splits a document into passages of at most `chunk_size` characters,
//! consecutive passages overlapping by `overlap` characters. Lengths and
//! offsets are counted in `char`s, not bytes.
//!
//! # Algorithm
//!
//! 1. If the text fits in one chunk, return it unchanged.
//! 2. Otherwise open a window `[start, min(start + chunk_size, len))`.
//! 3. If the window does not reach the end of the text, pull its end back
//!    to just after the last sentence or paragraph break (`". "`, `"! "`,
//!    `"? "`, `"\n\n"`) lying strictly after `start`.
//! 4. Emit the trimmed window unless it is blank.
//! 5. Advance `start` by the stride `chunk_size - overlap`.
//!
//! Step 3 only shortens the emitted passage. It never feeds back into
//! step 5, so the number of windows is always `ceil(len / stride)` and the
//! loop terminates for every input.
//!
//! # Example
//!
//! ```rust
//! use tiermem_core::chunk::split_text;
//!
//! let text = "x".repeat(821);
//! let chunks = split_text(&text, 150, 30).unwrap();
//! assert_eq!(chunks.len(), 7);
//! ```

use crate::error::MemoryError;

/// Break markers searched for when trimming a window's end.
const BOUNDARIES: [&str; 4] = [". ", "! ", "? ", "\n\n"];

/// A chunk together with the window it was cut from.
///
/// `start` and `end` are char offsets into the source text; `end` reflects
/// any boundary trim, `text` is the window with surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split `text` into overlapping chunks.
///
/// # Errors
///
/// Returns [`MemoryError::InvalidInput`] unless `chunk_size > overlap`.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, MemoryError> {
    Ok(chunk_spans(text, chunk_size, overlap)?
        .into_iter()
        .map(|span| span.text)
        .collect())
}

/// Like [`split_text`], but keeps each chunk's window offsets.
pub fn chunk_spans(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkSpan>, MemoryError> {
    validate_params(chunk_size, overlap)?;

    // Byte offset of every char, plus the end of the text.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = offsets.len() - 1;

    if len <= chunk_size {
        return Ok(vec![ChunkSpan {
            start: 0,
            end: len,
            text: text.to_string(),
        }]);
    }

    let stride = chunk_size - overlap;
    let mut spans = Vec::with_capacity(len / stride + 1);
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            let window = &text[offsets[start]..offsets[end]];
            if let Some(pos) = last_boundary(window) {
                // Keep the punctuation mark, drop what follows it.
                let boundary = start + window[..pos].chars().count();
                if boundary > start {
                    end = boundary + 1;
                }
            }
        }

        let piece = text[offsets[start]..offsets[end]].trim();
        if !piece.is_empty() {
            spans.push(ChunkSpan {
                start,
                end,
                text: piece.to_string(),
            });
        }

        start += stride;
    }

    Ok(spans)
}

/// Check chunking parameters without splitting anything.
pub fn validate_params(chunk_size: usize, overlap: usize) -> Result<(), MemoryError> {
    if chunk_size == 0 {
        return Err(MemoryError::InvalidInput(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(MemoryError::InvalidInput(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Byte position of the last break marker in `window`.
fn last_boundary(window: &str) -> Option<usize> {
    BOUNDARIES.iter().filter_map(|b| window.rfind(b)).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let text = "This is a short text.";
        let chunks = split_text(text, 1000, 200).unwrap();
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let text = "a".repeat(150);
        let chunks = split_text(&text, 150, 30).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_short_text_is_not_trimmed() {
        let text = "  padded  ";
        let chunks = split_text(text, 100, 10).unwrap();
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_stride_regression_821_chars() {
        // A boundary search that moved `start` produced 16+ chunks here.
        let text = "x".repeat(821);
        let chunks = split_text(&text, 150, 30).unwrap();
        assert_eq!(chunks.len(), 7);
    }

    #[test]
    fn test_chunk_counts_for_various_sizes() {
        let cases = [
            (821, 150, 30, 7),
            (500, 100, 20, 7),
            (1000, 200, 50, 7),
            (300, 150, 30, 3),
        ];
        for (len, size, overlap, expected) in cases {
            let text = "x".repeat(len);
            let chunks = split_text(&text, size, overlap).unwrap();
            assert_eq!(
                chunks.len(),
                expected,
                "len={} size={} overlap={}",
                len,
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_starts_advance_by_stride() {
        let text = "Sentence one. Sentence two! Sentence three? ".repeat(40);
        let spans = chunk_spans(&text, 200, 50).unwrap();
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            assert_eq!(pair[1].start - pair[0].start, 150);
        }
    }

    #[test]
    fn test_boundary_trim_shortens_chunk() {
        let text = "First sentence here. Second sentence follows and keeps going on.";
        let spans = chunk_spans(text, 30, 5).unwrap();
        // Window [0, 30) contains ". " at char 19, so the first chunk ends there.
        assert_eq!(spans[0].text, "First sentence here.");
        assert_eq!(spans[0].end, 20);
        // The next window still starts at the fixed stride.
        assert_eq!(spans[1].start, 25);
    }

    #[test]
    fn test_boundary_at_window_start_is_ignored() {
        // The only break sits at position 0 of the second window.
        let text = format!("{}. {}", "a".repeat(9), "b".repeat(30));
        let spans = chunk_spans(&text, 20, 11).unwrap();
        assert_eq!(spans[1].start, 9);
        assert_eq!(spans[1].end, 29);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = "Sentence one. Sentence two. Sentence three. ".repeat(50);
        for chunk in split_text(&text, 200, 50).unwrap() {
            assert!(chunk.chars().count() <= 200);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text: String = (0..400).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_text(&text, 100, 30).unwrap();
        let tail: String = chunks[0].chars().skip(70).collect();
        assert!(chunks[1].starts_with(&tail));
    }

    #[test]
    fn test_blank_windows_dropped() {
        let text = format!("{}{}", "word ".repeat(30), " ".repeat(300));
        let chunks = split_text(&text, 100, 20).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "héllo wörld ünïcode ".repeat(20);
        let spans = chunk_spans(&text, 50, 10).unwrap();
        for pair in spans.windows(2) {
            assert_eq!(pair[1].start - pair[0].start, 40);
        }
        for span in &spans {
            assert!(span.text.chars().count() <= 50);
        }
    }

    #[test]
    fn test_invalid_params() {
        assert!(split_text("abc", 0, 0).is_err());
        assert!(split_text("abc", 10, 10).is_err());
        assert!(split_text("abc", 10, 20).is_err());
        assert!(split_text("abc", 10, 0).is_ok());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha. Beta. Gamma.\n\nDelta! Epsilon? ".repeat(30);
        let a = split_text(&text, 120, 40).unwrap();
        let b = split_text(&text, 120, 40).unwrap();
        assert_eq!(a, b);
    }
}
