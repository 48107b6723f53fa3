//! The ordered key-value store the index lives in.
//!
//! A [`Store`] hands out snapshot-isolated [`Transaction`]s. Transactions offer
//! point reads, ordered prefix seeks and buffered writes; a [`RangeCursor`]
//! walks one prefix with `seek`/`next` on top of them. Two backends exist: the
//! [`crate::memory::MemoryStore`] and the SQLite backed
//! [`crate::persist::SqliteStore`].

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use seahash::SeaHasher;
use tracing::{error, warn};

use crate::error::{Result, TriplexError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

pub trait Transaction {
    fn writable(&self) -> bool;
    /// Point read; `None` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// The first entry under `prefix` whose key is greater than or equal to `from`.
    fn seek(&self, prefix: &[u8], from: &[u8], fetch_values: bool) -> Result<Option<Entry>>;
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&mut self, key: &[u8]) -> Result<()>;
    fn commit(self: Box<Self>) -> Result<()>;
    fn discard(self: Box<Self>);
}

pub trait Store: Send + Sync {
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction>>;
}

// ------------- RangeCursor -------------
/// Position within the keys sharing one prefix.
#[derive(Debug, Clone)]
pub struct RangeCursor {
    prefix: Vec<u8>,
    fetch_values: bool,
    item: Option<Entry>,
}

impl RangeCursor {
    pub fn new(prefix: Vec<u8>, fetch_values: bool) -> Self {
        Self {
            prefix,
            fetch_values,
            item: None,
        }
    }
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }
    /// Moves to the first key greater than or equal to `key`.
    pub fn seek(&mut self, txn: &dyn Transaction, key: &[u8]) -> Result<()> {
        self.item = txn.seek(&self.prefix, key, self.fetch_values)?;
        Ok(())
    }
    /// Moves strictly past the current key. An invalid cursor stays invalid.
    pub fn next(&mut self, txn: &dyn Transaction) -> Result<()> {
        if let Some(item) = self.item.take() {
            let mut after = item.key;
            after.push(0);
            self.item = txn.seek(&self.prefix, &after, self.fetch_values)?;
        }
        Ok(())
    }
    pub fn valid(&self) -> bool {
        self.item.is_some()
    }
    pub fn item(&self) -> Option<&Entry> {
        self.item.as_ref()
    }
    pub fn close(&mut self) {
        self.item = None;
    }
}

// ------------- ChunkedWriter -------------
/// A write transaction that transparently splits itself when the store
/// refuses a write for being too large: the current transaction is committed,
/// a new one begun, and the same write retried once.
///
/// The prior value of every key it touches is journaled, so that
/// [`ChunkedWriter::abort`] can roll back chunks that were already committed.
pub struct ChunkedWriter<'s> {
    store: &'s dyn Store,
    txn: Option<Box<dyn Transaction>>,
    splits: usize,
    journal: HashMap<Vec<u8>, Option<Vec<u8>>, BuildHasherDefault<SeaHasher>>,
}

impl<'s> ChunkedWriter<'s> {
    pub fn new(store: &'s dyn Store) -> Result<Self> {
        Ok(Self {
            store,
            txn: Some(store.begin(true)?),
            splits: 0,
            journal: HashMap::default(),
        })
    }
    /// Number of intermediate commits so far.
    pub fn splits(&self) -> usize {
        self.splits
    }
    fn current(&self) -> Result<&dyn Transaction> {
        self.txn.as_deref().ok_or(TriplexError::Closed)
    }
    fn current_mut(&mut self) -> Result<&mut Box<dyn Transaction>> {
        self.txn.as_mut().ok_or(TriplexError::Closed)
    }
    fn split(&mut self) -> Result<()> {
        if let Some(txn) = self.txn.take() {
            txn.commit()?;
        }
        self.splits += 1;
        warn!(splits = self.splits, "transaction too large, committed and reopened");
        self.txn = Some(self.store.begin(true)?);
        Ok(())
    }
    fn remember(&mut self, key: &[u8]) -> Result<()> {
        if !self.journal.contains_key(key) {
            let prior = self.current()?.get(key)?;
            self.journal.insert(key.to_vec(), prior);
        }
        Ok(())
    }
    fn write<F>(&mut self, mut op: F) -> Result<()>
    where
        F: FnMut(&mut dyn Transaction) -> Result<()>,
    {
        match op(self.current_mut()?.as_mut()) {
            Err(TriplexError::TransactionTooLarge) => {
                self.split()?;
                op(self.current_mut()?.as_mut())
            }
            other => other,
        }
    }
    fn commit_current(&mut self) -> Result<()> {
        match self.txn.take() {
            Some(txn) => txn.commit(),
            None => Ok(()),
        }
    }
    /// Commits the open chunk; a failure rolls back the earlier ones too.
    pub fn finish(mut self) -> Result<()> {
        match self.commit_current() {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(rollback) = self.abort() {
                    error!(%rollback, "could not roll back a split write");
                }
                Err(e)
            }
        }
    }
    /// Discards the open chunk and, when earlier chunks were committed,
    /// restores every key they touched to its value before the first write.
    pub fn abort(mut self) -> Result<()> {
        if let Some(txn) = self.txn.take() {
            txn.discard();
        }
        if self.splits == 0 {
            return Ok(());
        }
        let splits = self.splits;
        let journal = std::mem::take(&mut self.journal);
        self.txn = Some(self.store.begin(true)?);
        for (key, prior) in &journal {
            match prior {
                Some(value) => self.write(|txn| txn.set(key, value))?,
                None => self.write(|txn| txn.delete(key))?,
            }
        }
        self.commit_current()?;
        warn!(splits, keys = journal.len(), "rolled back a split write");
        Ok(())
    }
}

impl Transaction for ChunkedWriter<'_> {
    fn writable(&self) -> bool {
        true
    }
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.current()?.get(key)
    }
    fn seek(&self, prefix: &[u8], from: &[u8], fetch_values: bool) -> Result<Option<Entry>> {
        self.current()?.seek(prefix, from, fetch_values)
    }
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.remember(key)?;
        self.write(|txn| txn.set(key, value))
    }
    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.remember(key)?;
        self.write(|txn| txn.delete(key))
    }
    fn commit(self: Box<Self>) -> Result<()> {
        (*self).finish()
    }
    fn discard(self: Box<Self>) {
        if let Err(e) = (*self).abort() {
            error!(%e, "could not roll back a split write");
        }
    }
}

/// Inclusive lower bound of a seek under `prefix`.
pub(crate) fn seek_start<'a>(prefix: &'a [u8], from: &'a [u8]) -> &'a [u8] {
    if from < prefix { prefix } else { from }
}
