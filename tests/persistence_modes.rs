use std::io::Write;
use std::sync::{Arc, Mutex};

use triplex::dictionary::NoTags;
use triplex::memory::MemoryStore;
use triplex::store::{ChunkedWriter, Entry, Store, Transaction};
use triplex::{Database, PersistenceMode, Result, Settings, Term, TriplexError, parse};

const PAIRS: &str = "
<http://e/a> <http://e/p> <http://e/b> .
<http://e/b> <http://e/p> <http://e/c> .
";

fn count(db: &Database, pattern: &str, domain: &[Term]) -> usize {
    let pattern = parse::pattern(pattern).unwrap();
    let mut graph = db.query(&pattern, domain, &[]).unwrap();
    let mut rows = 0;
    while graph.next(None).unwrap().is_some() {
        rows += 1;
    }
    rows
}

#[test]
fn in_memory_mode_allows_basic_operations() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let quads = parse::dataset(PAIRS).unwrap();
    assert_eq!(db.set(&Term::iri("http://e/data"), &quads).unwrap(), 2);
    let domain = [Term::variable("x"), Term::variable("y")];
    assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 2);
}

#[test]
fn file_mode_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("triplex.db").to_string_lossy().to_string();
    let domain = [Term::variable("x"), Term::variable("y")];
    {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        let quads = parse::dataset(PAIRS).unwrap();
        db.set(&Term::iri("http://e/data"), &quads).unwrap();
        assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 2);
    }
    let db = Database::new(PersistenceMode::File(path.clone())).expect("reopened db");
    assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 2);
    // ids minted after the reopen must not collide with stored ones
    let more = parse::dataset("<http://e/c> <http://e/p> <http://e/d> .").unwrap();
    assert_eq!(db.set(&Term::iri("http://e/more"), &more).unwrap(), 1);
    assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 3);
    assert_eq!(
        count(
            &db,
            "?x <http://e/p> ?y . ?y <http://e/p> ?z .",
            &[Term::variable("x"), Term::variable("z")]
        ),
        2
    );
    db.delete(&Term::iri("http://e/data")).unwrap();
    assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 1);
}

#[test]
fn file_mode_readers_see_a_snapshot() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("snapshot.db").to_string_lossy().to_string();
    let db = Database::new(PersistenceMode::File(path)).expect("db");
    db.set(&Term::iri("http://e/data"), &parse::dataset(PAIRS).unwrap())
        .unwrap();
    let pattern = parse::pattern("?x <http://e/p> ?y .").unwrap();
    let domain = [Term::variable("x"), Term::variable("y")];
    let mut graph = db.query(&pattern, &domain, &[]).unwrap();
    assert!(graph.next(None).unwrap().is_some());
    let later = parse::dataset("<http://e/x> <http://e/p> <http://e/y> .").unwrap();
    db.set(&Term::iri("http://e/later"), &later).unwrap();
    let mut seen = 1;
    while graph.next(None).unwrap().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 2);
    graph.close();
    assert_eq!(count(&db, "?s <http://e/p> ?o .", &domain), 3);
}

#[test]
fn chunked_writer_splits_oversized_transactions() {
    let store = MemoryStore::with_write_limit(3);
    let mut writer = ChunkedWriter::new(&store).unwrap();
    for i in 0u8..10 {
        writer.set(&[b'x', i], &[i]).unwrap();
    }
    assert!(writer.splits() >= 3);
    // reads see earlier chunks
    assert_eq!(writer.get(&[b'x', 0]).unwrap(), Some(vec![0]));
    writer.finish().unwrap();
    assert_eq!(store.len().unwrap(), 10);
}

#[test]
fn aborting_a_chunked_writer_restores_committed_chunks() {
    let store = MemoryStore::with_write_limit(3);
    let mut seed = store.begin(true).unwrap();
    seed.set(b"x0", b"old").unwrap();
    seed.set(b"y", b"kept").unwrap();
    seed.commit().unwrap();

    let mut writer = ChunkedWriter::new(&store).unwrap();
    writer.set(b"x0", b"new").unwrap();
    writer.delete(b"y").unwrap();
    for i in 1u8..10 {
        writer.set(&[b'x', b'0' + i], &[i]).unwrap();
    }
    assert!(writer.splits() >= 3);
    writer.abort().unwrap();

    assert_eq!(
        dump(&store),
        vec![
            (b"x0".to_vec(), Some(b"old".to_vec())),
            (b"y".to_vec(), Some(b"kept".to_vec())),
        ]
    );
}

/// A memory store whose writes fail once after a set number of them.
struct FailingStore {
    inner: Arc<MemoryStore>,
    fail_after: Arc<Mutex<Option<usize>>>,
}

struct FailingTransaction {
    inner: Box<dyn Transaction>,
    fail_after: Arc<Mutex<Option<usize>>>,
}

impl FailingTransaction {
    fn tick(&self) -> Result<()> {
        let mut fail_after = self.fail_after.lock().unwrap();
        match *fail_after {
            Some(0) => {
                *fail_after = None;
                Err(TriplexError::Persistence("disk full".to_string()))
            }
            Some(n) => {
                *fail_after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Store for FailingStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin(writable)?,
            fail_after: Arc::clone(&self.fail_after),
        }))
    }
}

impl Transaction for FailingTransaction {
    fn writable(&self) -> bool {
        self.inner.writable()
    }
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }
    fn seek(&self, prefix: &[u8], from: &[u8], fetch_values: bool) -> Result<Option<Entry>> {
        self.inner.seek(prefix, from, fetch_values)
    }
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tick()?;
        self.inner.set(key, value)
    }
    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.tick()?;
        self.inner.delete(key)
    }
    fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit()
    }
    fn discard(self: Box<Self>) {
        self.inner.discard()
    }
}

fn dump(store: &dyn Store) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
    let txn = store.begin(false).unwrap();
    let mut entries = Vec::new();
    let mut from = Vec::new();
    while let Some(entry) = txn.seek(&[], &from, true).unwrap() {
        from = entry.key.clone();
        from.push(0);
        entries.push((entry.key, entry.value));
    }
    entries
}

fn chain(origin: &str, length: usize) -> Vec<triplex::Quad> {
    let text: String = (0..length)
        .map(|i| format!("<http://e/{0}{1}> <http://e/p> <http://e/{0}{2}> .\n", origin, i, i + 1))
        .collect();
    parse::dataset(&text).unwrap()
}

#[test]
fn a_write_failing_after_a_split_is_rolled_back() {
    let inner = Arc::new(MemoryStore::with_write_limit(8));
    let fail_after = Arc::new(Mutex::new(None));
    let db = Database::with_store(
        Box::new(FailingStore {
            inner: Arc::clone(&inner),
            fail_after: Arc::clone(&fail_after),
        }),
        Arc::new(NoTags),
    );
    db.set(&Term::iri("http://e/keep"), &chain("k", 3)).unwrap();
    let before = dump(inner.as_ref());

    // several chunks are committed before the write fails
    *fail_after.lock().unwrap() = Some(30);
    assert!(matches!(
        db.set(&Term::iri("http://e/broken"), &chain("b", 20)),
        Err(TriplexError::Persistence(_))
    ));
    assert_eq!(dump(inner.as_ref()), before);
    assert!(matches!(
        db.get(&Term::iri("http://e/broken")),
        Err(TriplexError::NotFound(_))
    ));

    // later writers mint fresh ids and stay queryable
    let later = parse::dataset("<http://e/zzz1> <http://e/q> <http://e/zzz2> .").unwrap();
    db.set(&Term::iri("http://e/later"), &later).unwrap();
    let domain = [Term::variable("s"), Term::variable("o")];
    let mut graph = db
        .query(&parse::pattern("?s <http://e/q> ?o .").unwrap(), &domain, &[])
        .unwrap();
    assert_eq!(
        graph.next(None).unwrap(),
        Some(vec![Term::iri("http://e/zzz1"), Term::iri("http://e/zzz2")])
    );
    graph.close();
    assert_eq!(count(&db, "?s <http://e/p> ?o .", &domain), 3);
    assert_eq!(db.get(&Term::iri("http://e/keep")).unwrap(), chain("k", 3));
}

#[test]
fn a_rejected_dataset_writes_nothing() {
    let settings = Settings {
        max_transaction_writes: Some(8),
        ..Settings::default()
    };
    let db = Database::open(&settings).expect("db");
    let mut quads = chain("a", 3);
    quads.extend(parse::dataset("?bad <http://e/p> <http://e/a0> .").unwrap());
    assert!(matches!(
        db.set(&Term::iri("http://e/one"), &quads),
        Err(TriplexError::InvalidTerm(_))
    ));
    assert!(dump(db.store()).is_empty());

    let later = parse::dataset("<http://e/zzz1> <http://e/q> <http://e/zzz2> .").unwrap();
    db.set(&Term::iri("http://e/two"), &later).unwrap();
    let domain = [Term::variable("s"), Term::variable("o")];
    assert_eq!(count(&db, "?s <http://e/q> ?o .", &domain), 1);
    assert_eq!(count(&db, "?s <http://e/p> ?o .", &domain), 0);
}

#[test]
fn write_limits_come_from_settings() {
    let settings = Settings {
        max_transaction_writes: Some(8),
        ..Settings::default()
    };
    let db = Database::open(&settings).expect("db");
    let quads: String = (0..20)
        .map(|i| format!("<http://e/n{}> <http://e/p> <http://e/n{}> .\n", i, i + 1))
        .collect();
    let quads = parse::dataset(&quads).unwrap();
    assert_eq!(db.set(&Term::iri("http://e/chain"), &quads).unwrap(), 20);
    let domain = [Term::variable("x"), Term::variable("y")];
    assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 20);
    assert_eq!(db.delete(&Term::iri("http://e/chain")).unwrap(), 20);
    assert_eq!(count(&db, "?x <http://e/p> ?y .", &domain), 0);
}

#[test]
fn settings_load_from_a_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("triplex.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "mode = \"memory\"").unwrap();
    writeln!(file, "tag_prefix = \"http://e/\"").unwrap();
    writeln!(file, "max_transaction_writes = 16").unwrap();
    drop(file);

    let settings = Settings::load(Some(&path.to_string_lossy())).expect("settings");
    assert_eq!(settings.persistence().unwrap(), PersistenceMode::InMemory);
    assert_eq!(settings.tag_prefix.as_deref(), Some("http://e/"));
    assert_eq!(settings.max_transaction_writes, Some(16));
    assert_eq!(settings.log_filter, "info");

    let db = Database::open(&settings).expect("db");
    let quads = parse::dataset("<http://e/doc#a> <http://e/p> <http://e/doc#b> .").unwrap();
    db.set(&Term::iri("http://e/doc"), &quads).unwrap();
    let mut graph = db
        .query(
            &parse::pattern("?x <http://e/p> ?y .").unwrap(),
            &[Term::variable("x"), Term::variable("y")],
            &[],
        )
        .unwrap();
    assert_eq!(
        graph.next(None).unwrap(),
        Some(vec![Term::iri("http://e/doc#a"), Term::iri("http://e/doc#b")])
    );
}

#[test]
fn file_mode_needs_a_path() {
    let settings = Settings {
        mode: "file".to_string(),
        ..Settings::default()
    };
    assert!(matches!(
        Database::open(&settings),
        Err(triplex::TriplexError::Config(_))
    ));
}

#[test]
fn file_mode_discarded_writes_leave_nothing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("discard.db").to_string_lossy().to_string();
    let store = triplex::persist::SqliteStore::open(&path).expect("store");
    let mut txn = store.begin(true).unwrap();
    txn.set(b"k1", b"v").unwrap();
    txn.discard();
    // dropping an unfinished transaction rolls it back as well
    {
        let mut txn = store.begin(true).unwrap();
        txn.set(b"k2", b"v").unwrap();
    }
    assert!(dump(&store).is_empty());
    let mut txn = store.begin(true).unwrap();
    txn.set(b"k3", b"v").unwrap();
    txn.commit().unwrap();
    assert_eq!(dump(&store), vec![(b"k3".to_vec(), Some(b"v".to_vec()))]);
}
