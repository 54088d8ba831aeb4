//! Fixed-size chunking of error entries.
//!
//! The job engine sends error entries to the analysis client one chunk at
//! a time. Chunks preserve entry order, every chunk except the last holds
//! exactly `chunk_size` entries, and chunk numbers are 1-based so they
//! line up with `current_chunk` / `failed_chunk` on the job record.
//!
//! # Example
//!
//! ```rust
//! use autolog_core::chunk::chunk_entries;
//! use autolog_core::models::{Level, LogEntry};
//!
//! let entries: Vec<LogEntry> = (0..60)
//!     .map(|i| LogEntry::new("f1", Level::Error, format!("failure {}", i)))
//!     .collect();
//! let chunks = chunk_entries(&entries, 25);
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[2].number, 3);
//! assert_eq!(chunks[2].entries.len(), 10);
//! ```

use crate::models::LogEntry;

/// Default entries per chunk, sized for a single model call.
pub const DEFAULT_CHUNK_SIZE: usize = 25;

/// An ordered slice of error entries sent in one analysis call.
#[derive(Debug, Clone, Copy)]
pub struct EntryChunk<'a> {
    /// 1-based position of this chunk.
    pub number: usize,
    pub entries: &'a [LogEntry],
}

/// Keep only `ERROR` and `FATAL` entries, in order.
pub fn error_entries(entries: &[LogEntry]) -> Vec<LogEntry> {
    entries
        .iter()
        .filter(|e| e.level.is_error())
        .cloned()
        .collect()
}

/// Number of chunks [`chunk_entries`] will produce.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Partition entries into ordered chunks of at most `chunk_size`.
///
/// A `chunk_size` of zero is treated as one. An empty input yields no
/// chunks.
pub fn chunk_entries(entries: &[LogEntry], chunk_size: usize) -> Vec<EntryChunk<'_>> {
    entries
        .chunks(chunk_size.max(1))
        .enumerate()
        .map(|(i, slice)| EntryChunk {
            number: i + 1,
            entries: slice,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    fn entries(n: usize) -> Vec<LogEntry> {
        (0..n)
            .map(|i| LogEntry::new("f1", Level::Error, format!("e{}", i)))
            .collect()
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        assert!(chunk_entries(&[], 25).is_empty());
        assert_eq!(chunk_count(0, 25), 0);
    }

    #[test]
    fn test_exact_multiple() {
        let e = entries(50);
        let chunks = chunk_entries(&e, 25);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.entries.len() == 25));
    }

    #[test]
    fn test_order_and_numbering_preserved() {
        let e = entries(7);
        let chunks = chunk_entries(&e, 3);
        assert_eq!(chunks.len(), chunk_count(7, 3));
        let numbers: Vec<usize> = chunks.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let flattened: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.entries.iter().map(|e| e.message.as_str()))
            .collect();
        let expected: Vec<String> = (0..7).map(|i| format!("e{}", i)).collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn test_zero_chunk_size_treated_as_one() {
        let e = entries(3);
        assert_eq!(chunk_entries(&e, 0).len(), 3);
        assert_eq!(chunk_count(3, 0), 3);
    }

    #[test]
    fn test_error_filter() {
        let all = vec![
            LogEntry::new("f1", Level::Info, "starting"),
            LogEntry::new("f1", Level::Error, "db down"),
            LogEntry::new("f1", Level::Warn, "slow"),
            LogEntry::new("f1", Level::Fatal, "crash"),
        ];
        let errors = error_entries(&all);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "db down");
        assert_eq!(errors[1].message, "crash");
    }
}
