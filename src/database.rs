//! The entry point tying the store, the dictionary, ingestion and queries
//! together.

use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::dictionary::{Dictionary, TagScheme};
use crate::error::{Result, TriplexError};
use crate::ingest::{self, Datasets};
use crate::key::Id;
use crate::persist::PersistenceMode;
use crate::query::{ConstraintGraph, compile};
use crate::settings::Settings;
use crate::store::{ChunkedWriter, Store, Transaction};
use crate::term::{Quad, Term, Triple};

pub struct Database {
    store: Box<dyn Store>,
    tags: Arc<dyn TagScheme>,
    // writers mint ids from a shared sequence, so they take turns
    writer: Mutex<()>,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        Self::open(&Settings::for_mode(&mode))
    }

    pub fn open(settings: &Settings) -> Result<Self> {
        let mode = settings.persistence()?;
        let store = mode.open(settings.max_transaction_writes)?;
        info!(?mode, tag_prefix = ?settings.tag_prefix, "opened database");
        Ok(Self::with_store(store, settings.tag_scheme()))
    }

    pub fn with_store(store: Box<dyn Store>, tags: Arc<dyn TagScheme>) -> Self {
        Self {
            store,
            tags,
            writer: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn tags(&self) -> &Arc<dyn TagScheme> {
        &self.tags
    }

    fn write<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Dictionary, &mut dyn Transaction) -> Result<T>,
    {
        let _guard = self
            .writer
            .lock()
            .map_err(|e| TriplexError::Lock(e.to_string()))?;
        let mut writer = ChunkedWriter::new(self.store.as_ref())?;
        let mut dictionary = Dictionary::open(Arc::clone(&self.tags), true);
        let result = op(&mut dictionary, &mut writer).and_then(|value| {
            dictionary.commit(&mut writer)?;
            Ok(value)
        });
        match result {
            Ok(value) => {
                writer.finish()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = writer.abort() {
                    error!(%rollback, "could not roll back a failed write");
                }
                Err(e)
            }
        }
    }

    /// Stores the dataset `quads` under `origin`, replacing the origin's
    /// previous dataset. Returns the number of triples new to the index.
    pub fn set(&self, origin: &Term, quads: &[Quad]) -> Result<usize> {
        self.write(|dictionary, txn| ingest::insert(origin, quads, dictionary, txn))
    }

    /// Removes the dataset stored under `origin`.
    pub fn delete(&self, origin: &Term) -> Result<usize> {
        self.write(|dictionary, txn| ingest::delete(origin, dictionary, txn))
    }

    /// The dataset stored under `origin`, terms relative to the origin.
    pub fn get(&self, origin: &Term) -> Result<Vec<Quad>> {
        let txn = self.store.begin(false)?;
        let mut dictionary = Dictionary::open(Arc::clone(&self.tags), false);
        let quads = ingest::read(origin, &mut dictionary, txn.as_ref());
        txn.discard();
        quads
    }

    /// Iterates the origins holding a dataset, starting at `from` when given.
    pub fn list(&self, from: Option<&Term>) -> Result<Datasets> {
        let txn = self.store.begin(false)?;
        let dictionary = Dictionary::open(Arc::clone(&self.tags), false);
        Datasets::open(from, dictionary, txn)
    }

    /// Compiles `pattern` against a fresh read transaction.
    pub fn query(&self, pattern: &[Triple], domain: &[Term], index: &[Term]) -> Result<ConstraintGraph> {
        let txn = self.store.begin(false)?;
        let dictionary = Dictionary::open(Arc::clone(&self.tags), false);
        compile(pattern, domain, index, dictionary, txn)
    }

    /// Resolves a constant to its id, for callers comparing raw assignments.
    pub fn id_of(&self, term: &Term) -> Result<Id> {
        let txn = self.store.begin(false)?;
        let mut dictionary = Dictionary::open(Arc::clone(&self.tags), false);
        let id = dictionary.get_id(term, None, txn.as_ref());
        txn.discard();
        id
    }
}
