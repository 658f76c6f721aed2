//! Lazy iteration across journal partitions.

use crate::error::CoreResult;
use crate::table::TableCursor;
use crate::types::Versioned;
use std::collections::VecDeque;

/// Deferred opening of one partition's cursor.
///
/// Yields `None` if the partition no longer exists (it was dropped after
/// the query was planned).
pub type CursorProvider = Box<dyn FnOnce() -> CoreResult<Option<TableCursor>> + Send>;

/// Concatenates per-partition cursors, opening each only when reached.
///
/// # Design
///
/// - Providers are consumed front to back; a provider is called only once
///   the previous cursor is exhausted
/// - An exhausted cursor is dropped before the next one is opened, so at
///   most one cursor is open at a time
/// - Empty or vanished partitions are skipped transparently
/// - [`close`](Self::close) drops the open cursor and every pending
///   provider and may be called at any point
pub struct ConcatCursor {
    providers: VecDeque<CursorProvider>,
    current: Option<TableCursor>,
    opened: usize,
    finished: bool,
}

impl ConcatCursor {
    /// Creates a cursor over `providers`, in order.
    pub fn new(providers: Vec<CursorProvider>) -> Self {
        Self {
            providers: providers.into(),
            current: None,
            opened: 0,
            finished: false,
        }
    }

    /// Number of partition cursors opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened
    }

    /// Number of partitions planned but not yet reached.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.providers.len()
    }

    /// Releases the open cursor and discards the rest of the plan.
    pub fn close(&mut self) {
        self.current = None;
        self.providers.clear();
        self.finished = true;
    }
}

impl Iterator for ConcatCursor {
    type Item = CoreResult<(Vec<u8>, Versioned)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(cursor) = self.current.as_mut() {
                match cursor.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }

            let Some(provider) = self.providers.pop_front() else {
                self.finished = true;
                return None;
            };
            match provider() {
                Ok(Some(cursor)) => {
                    self.opened += 1;
                    self.current = Some(cursor);
                }
                Ok(None) => {}
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::fmt::Debug for ConcatCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcatCursor")
            .field("opened", &self.opened)
            .field("pending", &self.providers.len())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::table::{ScanOptions, Table};
    use recordb_storage::InMemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn table(rows: &[&[u8]]) -> Arc<Table> {
        let table = Arc::new(Table::open("t", Box::new(InMemoryBackend::new()), false).unwrap());
        for row in rows {
            table.put(row, b"v").unwrap();
        }
        table
    }

    fn provider(table: Arc<Table>, calls: Arc<AtomicUsize>) -> CursorProvider {
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(table.scan(ScanOptions::default())))
        })
    }

    fn vanished() -> CursorProvider {
        Box::new(|| Ok(None))
    }

    fn failing() -> CursorProvider {
        Box::new(|| Err(CoreError::illegal_state("gone")))
    }

    #[test]
    fn stitches_partitions_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cursor = ConcatCursor::new(vec![
            provider(table(&[b"a", b"b"]), Arc::clone(&calls)),
            provider(table(&[]), Arc::clone(&calls)),
            vanished(),
            provider(table(&[b"c"]), Arc::clone(&calls)),
        ]);
        let keys: Vec<Vec<u8>> = cursor.map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn opens_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cursor = ConcatCursor::new(vec![
            provider(table(&[b"a"]), Arc::clone(&calls)),
            provider(table(&[b"b"]), Arc::clone(&calls)),
            provider(table(&[b"c"]), Arc::clone(&calls)),
        ]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cursor.next().unwrap().unwrap();
        assert_eq!(cursor.opened(), 1);
        assert_eq!(cursor.pending(), 2);

        cursor.close();
        assert!(cursor.next().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn provider_error_ends_iteration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cursor = ConcatCursor::new(vec![
            failing(),
            provider(table(&[b"a"]), Arc::clone(&calls)),
        ]);
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
