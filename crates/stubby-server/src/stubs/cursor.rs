//! Sequence cursor for lifecycles with multiple responses.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free cursor over a response sequence.
///
/// Each call to [`advance`](Self::advance) returns the position to serve and
/// moves forward by one, stopping at the last element. Once the sequence is
/// consumed the last response repeats indefinitely.
#[derive(Default)]
pub struct SequenceCursor(AtomicUsize);

impl SequenceCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Position to serve for this match, for a sequence of `len` responses.
    #[must_use]
    pub fn advance(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let last = len - 1;
        match self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pos| {
                (pos < last).then_some(pos + 1)
            }) {
            Ok(previous) => previous,
            Err(current) => current.min(last),
        }
    }

    /// Position the next call to `advance` would serve, without moving.
    #[must_use]
    pub fn position(&self, len: usize) -> usize {
        self.0.load(Ordering::Relaxed).min(len.saturating_sub(1))
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("SequenceCursor")
            .field(&self.0.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_advance_saturates_at_last() {
        let cursor = SequenceCursor::new();
        let served: Vec<usize> = (0..6).map(|_| cursor.advance(3)).collect();
        assert_eq!(served, vec![0, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_single_element_always_zero() {
        let cursor = SequenceCursor::new();
        for _ in 0..4 {
            assert_eq!(cursor.advance(1), 0);
        }
    }

    #[test]
    fn test_empty_sequence() {
        let cursor = SequenceCursor::new();
        assert_eq!(cursor.advance(0), 0);
        assert_eq!(cursor.position(0), 0);
    }

    #[test]
    fn test_position_and_reset() {
        let cursor = SequenceCursor::new();
        let _ = cursor.advance(3);
        assert_eq!(cursor.position(3), 1);

        cursor.reset();
        assert_eq!(cursor.position(3), 0);
        assert_eq!(cursor.advance(3), 0);
    }

    #[test]
    fn test_concurrent_advance_hands_out_each_position_once() {
        let cursor = Arc::new(SequenceCursor::new());
        let len = 50;
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cursor = Arc::clone(&cursor);
                std::thread::spawn(move || (0..10).map(|_| cursor.advance(len)).collect::<Vec<_>>())
            })
            .collect();

        let mut served: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        served.sort_unstable();

        let expected: Vec<usize> = (0..len - 1)
            .chain(std::iter::repeat(len - 1).take(100 - (len - 1)))
            .collect();
        assert_eq!(served, expected);
    }
}
