//! A single stored file.

use parking_lot::RwLock;

/// One named payload guarded by its own read/write lock.
///
/// The payload is `None` once the record has been retired. Retirement is
/// terminal: every later [`read`](Self::read) or [`modify`](Self::modify)
/// through any outstanding reference returns `None`, which the store reports
/// as not-found.
#[derive(Debug)]
pub struct FileRecord {
    name: String,
    payload: RwLock<Option<Vec<u8>>>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            payload: RwLock::new(Some(data)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current payload, or `None` if retired.
    pub fn read(&self) -> Option<Vec<u8>> {
        self.payload.read().clone()
    }

    /// Replace the payload.
    ///
    /// Returns `Some(true)` if the bytes changed, `Some(false)` for an
    /// identical write, `None` if the record is retired.
    pub fn modify(&self, data: Vec<u8>) -> Option<bool> {
        let mut payload = self.payload.write();
        let current = payload.as_mut()?;
        if *current == data {
            return Some(false);
        }
        *current = data;
        Some(true)
    }

    /// Retire the record and hand back its last payload.
    ///
    /// Returns `None` if it was already retired.
    pub fn retire(&self) -> Option<Vec<u8>> {
        self.payload.write().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_read_returns_payload() {
        let record = FileRecord::new("a.txt", b"hello".to_vec());
        assert_eq!(record.name(), "a.txt");
        assert_eq!(record.read().unwrap(), b"hello");
    }

    #[test]
    fn test_modify_reports_change() {
        let record = FileRecord::new("a.txt", b"v1".to_vec());
        assert_eq!(record.modify(b"v2".to_vec()), Some(true));
        assert_eq!(record.modify(b"v2".to_vec()), Some(false));
        assert_eq!(record.read().unwrap(), b"v2");
    }

    #[test]
    fn test_retired_record_rejects_access() {
        let record = FileRecord::new("a.txt", b"v1".to_vec());
        assert_eq!(record.retire().unwrap(), b"v1");
        assert!(record.read().is_none());
        assert!(record.modify(b"v2".to_vec()).is_none());
        assert!(record.retire().is_none());
    }

    #[test]
    fn test_concurrent_readers() {
        let record = Arc::new(FileRecord::new("a.txt", vec![7; 1024]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let record = record.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(record.read().unwrap().len(), 1024);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
