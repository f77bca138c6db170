//! Selection cursor
//!
//! Round-robin position shared by the selector and the synchronizer. Updates
//! are a plain load then store, so two concurrent round-robin selections may
//! pick the same index or skip one. Only boundedness is guaranteed.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SelectionCursor {
    current: AtomicUsize,
}

impl SelectionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn set(&self, index: usize) {
        self.current.store(index, Ordering::Relaxed);
    }

    /// Step to the next index in `[0, len)` and return it
    pub fn advance(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let next = (self.current.load(Ordering::Relaxed) + 1) % len;
        self.current.store(next, Ordering::Relaxed);
        next
    }

    /// Reduce the cursor into `[0, len)` after the server set changed size
    pub fn clamp(&self, len: usize) {
        let current = self.current.load(Ordering::Relaxed);
        self.current
            .store(if len == 0 { 0 } else { current % len }, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps() {
        let cursor = SelectionCursor::new();
        let seen: Vec<usize> = (0..6).map(|_| cursor.advance(3)).collect();
        assert_eq!(seen, vec![1, 2, 0, 1, 2, 0]);
        assert_eq!(cursor.advance(0), 0);
    }

    #[test]
    fn test_clamp_into_range() {
        let cursor = SelectionCursor::new();
        cursor.set(7);
        cursor.clamp(5);
        assert_eq!(cursor.current(), 2);
        cursor.clamp(0);
        assert_eq!(cursor.current(), 0);
    }

    #[test]
    fn test_advance_bounded_under_concurrency() {
        let cursor = std::sync::Arc::new(SelectionCursor::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cursor = cursor.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        assert!(cursor.advance(7) < 7);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cursor.current() < 7);
    }
}
