//! ScriptContext buffers the writes a running script makes.
//!
//! Writes go to an in-memory overlay and an ordered operation log. Reads
//! consult the overlay first, so a script sees its own writes. The log is
//! applied to the keyspace only when the script finishes successfully;
//! dropping the context discards it, which is how a failed script is rolled
//! back.

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WriteOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

/// Overlay entry for read-your-writes.
#[derive(Debug, Clone)]
enum CachedValue {
    Put(Bytes),
    Delete,
}

/// Buffered view of the keyspace for the duration of one script run.
pub struct ScriptContext {
    keyspace: Arc<SkipMap<Bytes, Bytes>>,
    ops: Vec<WriteOp>,
    overlay: HashMap<Bytes, CachedValue>,
}

impl ScriptContext {
    /// Creates an empty context over `keyspace`.
    pub fn new(keyspace: Arc<SkipMap<Bytes, Bytes>>) -> Self {
        Self { keyspace, ops: Vec::new(), overlay: HashMap::new() }
    }

    /// Reads a key, seeing this script's own uncommitted writes.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        match self.overlay.get(key) {
            Some(CachedValue::Put(value)) => Some(value.clone()),
            Some(CachedValue::Delete) => None,
            None => self.keyspace.get(key).map(|e| e.value().clone()),
        }
    }

    /// Buffers a write.
    pub fn put(&mut self, key: Bytes, value: Bytes) {
        self.overlay.insert(key.clone(), CachedValue::Put(value.clone()));
        self.ops.push(WriteOp::Put { key, value });
    }

    /// Buffers a delete. Returns true if the key was visible before.
    pub fn delete(&mut self, key: Bytes) -> bool {
        let existed = self.get(&key).is_some();
        self.overlay.insert(key.clone(), CachedValue::Delete);
        self.ops.push(WriteOp::Delete { key });
        existed
    }

    /// Number of buffered write operations.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Moves the buffered writes into a new context, leaving this one empty.
    pub(crate) fn take(&mut self) -> Self {
        Self {
            keyspace: Arc::clone(&self.keyspace),
            ops: std::mem::take(&mut self.ops),
            overlay: std::mem::take(&mut self.overlay),
        }
    }

    /// Applies every buffered write, in order.
    ///
    /// The caller must hold the server's execution lock so no other command
    /// observes a partially applied script.
    pub fn commit(self) {
        for op in self.ops {
            match op {
                WriteOp::Put { key, value } => {
                    self.keyspace.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    self.keyspace.remove(&key);
                }
            }
        }
    }

    /// Discards every buffered write.
    pub fn rollback(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyspace() -> Arc<SkipMap<Bytes, Bytes>> {
        let map = SkipMap::new();
        map.insert(Bytes::from_static(b"existing"), Bytes::from_static(b"v0"));
        Arc::new(map)
    }

    #[test]
    fn test_context_reads_keyspace() {
        let ctx = ScriptContext::new(keyspace());
        assert_eq!(ctx.get(b"existing"), Some(Bytes::from_static(b"v0")));
        assert_eq!(ctx.get(b"missing"), None);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_context_read_your_writes() {
        let ks = keyspace();
        let mut ctx = ScriptContext::new(Arc::clone(&ks));

        ctx.put(Bytes::from_static(b"k"), Bytes::from_static(b"v1"));
        assert_eq!(ctx.get(b"k"), Some(Bytes::from_static(b"v1")));
        assert!(ctx.delete(Bytes::from_static(b"existing")));
        assert_eq!(ctx.get(b"existing"), None);

        // Nothing reaches the keyspace before commit.
        assert!(ks.get(b"k".as_slice()).is_none());
        assert!(ks.get(b"existing".as_slice()).is_some());
        assert_eq!(ctx.operation_count(), 2);
    }

    #[test]
    fn test_context_commit() {
        let ks = keyspace();
        let mut ctx = ScriptContext::new(Arc::clone(&ks));
        ctx.put(Bytes::from_static(b"k"), Bytes::from_static(b"v1"));
        ctx.put(Bytes::from_static(b"k"), Bytes::from_static(b"v2"));
        ctx.delete(Bytes::from_static(b"existing"));
        ctx.commit();

        assert_eq!(ks.get(b"k".as_slice()).unwrap().value(), &Bytes::from_static(b"v2"));
        assert!(ks.get(b"existing".as_slice()).is_none());
    }

    #[test]
    fn test_context_rollback() {
        let ks = keyspace();
        let mut ctx = ScriptContext::new(Arc::clone(&ks));
        ctx.put(Bytes::from_static(b"k"), Bytes::from_static(b"v1"));
        assert!(!ctx.delete(Bytes::from_static(b"never")));
        ctx.rollback();

        assert!(ks.get(b"k".as_slice()).is_none());
        assert_eq!(ks.len(), 1);
    }
}
