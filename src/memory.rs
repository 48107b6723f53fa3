//! In-memory backend: an ordered map published through `Arc` snapshots.
//!
//! Readers clone the current snapshot pointer and never block writers. Writers
//! buffer their changes in an overlay and publish a new snapshot on commit;
//! the database facade serializes writers.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use crate::error::{Result, TriplexError};
use crate::store::{Entry, Store, Transaction, seek_start};

type Snapshot = Arc<BTreeMap<Vec<u8>, Vec<u8>>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    current: Arc<RwLock<Snapshot>>,
    max_writes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    /// A store whose write transactions refuse more than `max_writes`
    /// distinct keys with [`TriplexError::TransactionTooLarge`].
    pub fn with_write_limit(max_writes: usize) -> Self {
        Self {
            current: Arc::default(),
            max_writes: Some(max_writes.max(1)),
        }
    }
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_empty())
    }
    fn snapshot(&self) -> Result<Snapshot> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|e| TriplexError::Lock(e.to_string()))
    }
}

impl Store for MemoryStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            snapshot: self.snapshot()?,
            pending: BTreeMap::new(),
            writable,
            max_writes: self.max_writes,
            target: Arc::clone(&self.current),
        }))
    }
}

pub struct MemoryTransaction {
    snapshot: Snapshot,
    /// `None` marks a deletion.
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    writable: bool,
    max_writes: Option<usize>,
    target: Arc<RwLock<Snapshot>>,
}

impl MemoryTransaction {
    fn stage(&mut self, key: &[u8], value: Option<Vec<u8>>) -> Result<()> {
        if !self.writable {
            return Err(TriplexError::ReadOnly);
        }
        if let Some(max) = self.max_writes {
            if self.pending.len() >= max && !self.pending.contains_key(key) {
                return Err(TriplexError::TransactionTooLarge);
            }
        }
        self.pending.insert(key.to_vec(), value);
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn writable(&self) -> bool {
        self.writable
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.snapshot.get(key).cloned()),
        }
    }

    fn seek(&self, prefix: &[u8], from: &[u8], fetch_values: bool) -> Result<Option<Entry>> {
        let entry = |key: &Vec<u8>, value: &Vec<u8>| Entry {
            key: key.clone(),
            value: fetch_values.then(|| value.clone()),
        };
        let mut cursor = seek_start(prefix, from).to_vec();
        loop {
            let range = (Bound::Included(&cursor[..]), Bound::Unbounded);
            let committed = self
                .snapshot
                .range::<[u8], _>(range)
                .next()
                .filter(|(key, _)| key.starts_with(prefix));
            let staged = self
                .pending
                .range::<[u8], _>(range)
                .next()
                .filter(|(key, _)| key.starts_with(prefix));
            let deleted = match (committed, staged) {
                (None, None) => return Ok(None),
                (Some((key, value)), None) => return Ok(Some(entry(key, value))),
                (Some((ckey, cvalue)), Some((skey, _))) if ckey < skey => {
                    return Ok(Some(entry(ckey, cvalue)));
                }
                // the staged write shadows any committed entry with the same key
                (_, Some((skey, svalue))) => match svalue {
                    Some(value) => return Ok(Some(entry(skey, value))),
                    None => skey,
                },
            };
            let mut after = deleted.clone();
            after.push(0);
            cursor = after;
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.stage(key, Some(value.to_vec()))
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.stage(key, None)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if !this.writable || this.pending.is_empty() {
            return Ok(());
        }
        let mut current = this
            .target
            .write()
            .map_err(|e| TriplexError::Lock(e.to_string()))?;
        let map = Arc::make_mut(&mut *current);
        for (key, value) in this.pending {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}
