//! Transaction-scoped aggregate counters.
//!
//! The binary counter of `(permutation, leading, trailing)` is the number of
//! ternary postings under that pair. The unary counter of `(permutation,
//! leading)` is the number of binary counters under the leading id, which is
//! the number of entries a scan of `binary_prefix(permutation, leading)` yields.
//! Both caches read through to the store once per key, buffer every change in
//! memory and write only the touched keys on commit.

use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;

use seahash::SeaHasher;
use tracing::warn;

use crate::error::{Result, TriplexError};
use crate::key::{Id, Permutation, binary_key, decode_u32, encode_u32, unary_key};
use crate::store::Transaction;

type SeaBuild = BuildHasherDefault<SeaHasher>;

// ------------- Unary -------------
#[derive(Debug, Default)]
pub struct UnaryCache {
    counts: HashMap<Id, [u32; 6], SeaBuild>,
    touched: HashSet<Id, SeaBuild>,
}

impl UnaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, id: Id, txn: &dyn Transaction) -> Result<&mut [u32; 6]> {
        if !self.counts.contains_key(&id) {
            let counts = match txn.get(&unary_key(id))? {
                Some(bytes) => decode_unary(&bytes)?,
                None => [0; 6],
            };
            self.counts.insert(id, counts);
        }
        self.counts
            .get_mut(&id)
            .ok_or_else(|| TriplexError::corruption("unary counter vanished from cache"))
    }

    pub fn get(&mut self, permutation: Permutation, id: Id, txn: &dyn Transaction) -> Result<u32> {
        Ok(self.load(id, txn)?[permutation.index()])
    }

    pub fn increment(&mut self, permutation: Permutation, id: Id, txn: &dyn Transaction) -> Result<()> {
        let counts = self.load(id, txn)?;
        counts[permutation.index()] += 1;
        self.touched.insert(id);
        Ok(())
    }

    pub fn decrement(&mut self, permutation: Permutation, id: Id, txn: &dyn Transaction) -> Result<()> {
        let counts = self.load(id, txn)?;
        let count = &mut counts[permutation.index()];
        if *count == 0 {
            warn!(?permutation, %id, "unary counter already at zero");
            return Ok(());
        }
        *count -= 1;
        self.touched.insert(id);
        Ok(())
    }

    /// Writes every touched counter; all-zero entries are deleted.
    pub fn commit(self, txn: &mut dyn Transaction) -> Result<()> {
        for id in self.touched {
            let counts = self.counts.get(&id).copied().unwrap_or_default();
            let key = unary_key(id);
            if counts.iter().all(|&count| count == 0) {
                txn.delete(&key)?;
            } else {
                txn.set(&key, &encode_unary(&counts))?;
            }
        }
        Ok(())
    }
}

fn encode_unary(counts: &[u32; 6]) -> Vec<u8> {
    counts.iter().flat_map(|count| encode_u32(*count)).collect()
}

fn decode_unary(bytes: &[u8]) -> Result<[u32; 6]> {
    if bytes.len() != 24 {
        return Err(TriplexError::corruption(format!(
            "unary counter of {} bytes",
            bytes.len()
        )));
    }
    let mut counts = [0; 6];
    for (count, chunk) in counts.iter_mut().zip(bytes.chunks_exact(4)) {
        *count = decode_u32(chunk)?;
    }
    Ok(counts)
}

// ------------- Binary -------------
type BinaryKey = (Permutation, Id, Id);

#[derive(Debug, Default)]
pub struct BinaryCache {
    counts: HashMap<BinaryKey, u32, SeaBuild>,
    touched: HashSet<BinaryKey, SeaBuild>,
}

impl BinaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, key: BinaryKey, txn: &dyn Transaction) -> Result<&mut u32> {
        if !self.counts.contains_key(&key) {
            let (permutation, leading, trailing) = key;
            let count = match txn.get(&binary_key(permutation, leading, trailing))? {
                Some(bytes) => decode_u32(&bytes)?,
                None => 0,
            };
            self.counts.insert(key, count);
        }
        self.counts
            .get_mut(&key)
            .ok_or_else(|| TriplexError::corruption("binary counter vanished from cache"))
    }

    pub fn get(
        &mut self,
        permutation: Permutation,
        leading: Id,
        trailing: Id,
        txn: &dyn Transaction,
    ) -> Result<u32> {
        Ok(*self.load((permutation, leading, trailing), txn)?)
    }

    pub fn increment(
        &mut self,
        permutation: Permutation,
        leading: Id,
        trailing: Id,
        unary: &mut UnaryCache,
        txn: &dyn Transaction,
    ) -> Result<()> {
        let key = (permutation, leading, trailing);
        let count = self.load(key, txn)?;
        *count += 1;
        let first = *count == 1;
        self.touched.insert(key);
        if first {
            unary.increment(permutation, leading, txn)?;
        }
        Ok(())
    }

    /// Never goes below zero; dropping to zero releases the unary reference.
    pub fn decrement(
        &mut self,
        permutation: Permutation,
        leading: Id,
        trailing: Id,
        unary: &mut UnaryCache,
        txn: &dyn Transaction,
    ) -> Result<()> {
        let key = (permutation, leading, trailing);
        let count = self.load(key, txn)?;
        if *count == 0 {
            warn!(?permutation, %leading, %trailing, "binary counter already at zero");
            return Ok(());
        }
        *count -= 1;
        let last = *count == 0;
        self.touched.insert(key);
        if last {
            unary.decrement(permutation, leading, txn)?;
        }
        Ok(())
    }

    pub fn commit(self, txn: &mut dyn Transaction) -> Result<()> {
        for key in self.touched {
            let count = self.counts.get(&key).copied().unwrap_or_default();
            let (permutation, leading, trailing) = key;
            let stored = binary_key(permutation, leading, trailing);
            if count == 0 {
                txn.delete(&stored)?;
            } else {
                txn.set(&stored, &encode_u32(count))?;
            }
        }
        Ok(())
    }
}
