// used for persistence
use rusqlite::{Connection, OptionalExtension, params};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, TriplexError};
use crate::memory::MemoryStore;
use crate::store::{Entry, Store, Transaction, seek_start};

/// Storage backend selection for a [`crate::database::Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

impl PersistenceMode {
    pub fn open(&self, max_writes: Option<usize>) -> Result<Box<dyn Store>> {
        Ok(match self {
            PersistenceMode::InMemory => match max_writes {
                Some(max) => Box::new(MemoryStore::with_write_limit(max)),
                None => Box::new(MemoryStore::new()),
            },
            PersistenceMode::File(path) => Box::new(SqliteStore::open(path)?),
        })
    }
}

// ------------- Persistence -------------
/// Every key and value of the index lives in a single table; SQLite's blob
/// comparison is bytewise, which is exactly the order prefix scans need.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: String,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let connection = Self::connect(path)?;
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.pragma_update_and_check(None, "journal_mode", "wal", |row| {
            row.get::<_, String>(0)
        })?;
        connection.execute_batch(
            "
            create table if not exists Entry (
                Entry_Key blob not null,
                Entry_Value blob null,
                constraint unique_and_ordered_Entry_Key primary key (
                    Entry_Key
                )
            ) without rowid;-- STRICT;
            ",
        )?;
        info!(path, "opened sqlite store");
        Ok(Self {
            path: path.to_string(),
        })
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    fn connect(path: &str) -> Result<Connection> {
        let connection = Connection::open(path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Ok(connection)
    }
}

impl Store for SqliteStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction>> {
        let connection = Self::connect(&self.path)?;
        if writable {
            connection.execute_batch("begin immediate")?;
        } else {
            connection.execute_batch("begin deferred")?;
            // the first read pins the snapshot
            connection.query_row(
                "select count(*) from Entry where Entry_Key < x'00'",
                [],
                |row| row.get::<_, i64>(0),
            )?;
        }
        debug!(writable, "began sqlite transaction");
        Ok(Box::new(SqliteTransaction {
            connection,
            writable,
            finished: false,
        }))
    }
}

pub struct SqliteTransaction {
    connection: Connection,
    writable: bool,
    finished: bool,
}

impl SqliteTransaction {
    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(TriplexError::ReadOnly)
        }
    }
}

impl Transaction for SqliteTransaction {
    fn writable(&self) -> bool {
        self.writable
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut get_entry = self.connection.prepare_cached(
            "
            select Entry_Value
                from Entry
                where Entry_Key = ?
            ",
        )?;
        let value = get_entry
            .query_row(params![key], |row| row.get::<_, Option<Vec<u8>>>(0))
            .optional()?;
        Ok(value.map(Option::unwrap_or_default))
    }

    fn seek(&self, prefix: &[u8], from: &[u8], fetch_values: bool) -> Result<Option<Entry>> {
        let mut seek_entry = self.connection.prepare_cached(
            "
            select Entry_Key, Entry_Value
                from Entry
                where Entry_Key >= ?
                order by Entry_Key
                limit 1
            ",
        )?;
        let found = seek_entry
            .query_row(params![seek_start(prefix, from)], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, Option<Vec<u8>>>(1)?,
                ))
            })
            .optional()?;
        Ok(found
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| Entry {
                key,
                value: fetch_values.then(|| value.unwrap_or_default()),
            }))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let mut add_entry = self.connection.prepare_cached(
            "
            insert into Entry (
                Entry_Key,
                Entry_Value
            ) values (?, ?)
            on conflict (Entry_Key) do update set Entry_Value = excluded.Entry_Value
            ",
        )?;
        add_entry.execute(params![key, value])?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let mut remove_entry = self.connection.prepare_cached(
            "
            delete from Entry
                where Entry_Key = ?
            ",
        )?;
        remove_entry.execute(params![key])?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.connection.execute_batch("commit")?;
        Ok(())
    }

    fn discard(mut self: Box<Self>) {
        self.finished = true;
        if let Err(e) = self.connection.execute_batch("rollback") {
            warn!(%e, "rollback of a discarded transaction failed");
        }
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.connection.execute_batch("rollback") {
                warn!(%e, "rollback of an abandoned transaction failed");
            }
        }
    }
}
