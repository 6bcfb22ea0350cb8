//! Snapshot history: immutable states with a cursor to the current one.

/// Log of immutable snapshots. Recording after an undo discards the states
/// that could have been redone.
#[derive(Debug, Clone)]
pub struct History<T> {
    snapshots: Vec<T>,
    cursor: usize,
    limit: Option<usize>,
}

impl<T> History<T> {
    pub fn new(initial: T) -> Self {
        History {
            snapshots: vec![initial],
            cursor: 0,
            limit: None,
        }
    }

    /// Keep at most `limit` snapshots (at least one); the oldest are dropped.
    pub fn with_limit(initial: T, limit: usize) -> Self {
        History {
            limit: Some(limit.max(1)),
            ..History::new(initial)
        }
    }

    pub fn current(&self) -> &T {
        &self.snapshots[self.cursor]
    }

    /// Append `state` after the current one and make it current.
    pub fn record(&mut self, state: T) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(state);
        if let Some(limit) = self.limit {
            let excess = self.snapshots.len().saturating_sub(limit);
            self.snapshots.drain(..excess);
        }
        self.cursor = self.snapshots.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&T> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<&T> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.snapshots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_redo_walks_the_log() {
        let mut h = History::new(1);
        h.record(2);
        h.record(3);
        assert_eq!(h.undo(), Some(&2));
        assert_eq!(h.undo(), Some(&1));
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), Some(&2));
        assert_eq!(*h.current(), 2);
    }

    #[test]
    fn record_after_undo_drops_redo_tail() {
        let mut h = History::new("a");
        h.record("b");
        h.record("c");
        h.undo();
        h.record("d");
        assert!(!h.can_redo());
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec!["a", "b", "d"]);
    }

    #[test]
    fn limit_drops_oldest() {
        let mut h = History::with_limit(0, 3);
        for i in 1..=5 {
            h.record(i);
        }
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(*h.current(), 5);
        assert!(h.can_undo());
    }
}
