use std::sync::Arc;

use triplex::dictionary::{Dictionary, INITIAL_ID, NoTags, PrefixTags, SEQUENCE_BANDWIDTH};
use triplex::key::{ID_TO_VALUE_TAG, SEQUENCE_TAG, assemble_key};
use triplex::memory::MemoryStore;
use triplex::store::{Store, Transaction};
use triplex::{Quad, Term, TriplexError, parse};

#[test]
fn terms_round_trip_through_the_dictionary() {
    let store = MemoryStore::new();
    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(NoTags), true);
    let terms = [
        Term::iri("http://e/a"),
        Term::literal("plain"),
        Term::literal("with \"quotes\"\nand a newline"),
        Term::tagged("bonjour", "fr"),
        Term::typed("42", "http://www.w3.org/2001/XMLSchema#integer"),
        Term::blank("b0"),
        Term::variable("x"),
        Term::DefaultGraph,
    ];
    let mut ids = Vec::new();
    for term in &terms {
        let id = dictionary.get_or_insert_id(term, None, txn.as_mut()).unwrap();
        // a second lookup reuses the id
        assert_eq!(dictionary.get_or_insert_id(term, None, txn.as_mut()).unwrap(), id);
        ids.push(id);
    }
    dictionary.commit(txn.as_mut()).unwrap();
    txn.commit().unwrap();

    let txn = store.begin(false).unwrap();
    let mut reader = Dictionary::open(Arc::new(NoTags), false);
    for (term, id) in terms.iter().zip(&ids) {
        assert_eq!(&reader.get_term(*id, None, txn.as_ref()).unwrap(), term);
        assert_eq!(reader.get_id(term, None, txn.as_ref()).unwrap(), *id);
    }
}

#[test]
fn ids_continue_after_a_new_session() {
    let store = MemoryStore::new();
    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(NoTags), true);
    let first = dictionary
        .get_or_insert_id(&Term::iri("http://e/a"), None, txn.as_mut())
        .unwrap();
    dictionary.commit(txn.as_mut()).unwrap();
    txn.commit().unwrap();

    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(NoTags), true);
    let second = dictionary
        .get_or_insert_id(&Term::iri("http://e/b"), None, txn.as_mut())
        .unwrap();
    assert!(second > first);
}

#[test]
fn ids_are_leased_before_they_are_written() {
    let store = MemoryStore::new();
    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(NoTags), true);
    let sequence = |txn: &dyn Transaction| {
        let bytes = txn.get(&[SEQUENCE_TAG]).unwrap().expect("sequence stored");
        u64::from_be_bytes(bytes.try_into().unwrap())
    };
    let id = dictionary
        .get_or_insert_id(&Term::iri("http://e/a"), None, txn.as_mut())
        .unwrap();
    assert_eq!(id.value(), INITIAL_ID);
    assert_eq!(sequence(txn.as_ref()), INITIAL_ID + SEQUENCE_BANDWIDTH);
    dictionary
        .get_or_insert_id(&Term::iri("http://e/b"), None, txn.as_mut())
        .unwrap();
    // the unused part of the lease is returned on commit
    dictionary.commit(txn.as_mut()).unwrap();
    assert_eq!(sequence(txn.as_ref()), INITIAL_ID + 2);
}

#[test]
fn tagged_iris_are_stored_compressed() {
    let store = MemoryStore::new();
    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(PrefixTags::new("http://e/")), true);
    let term = Term::iri("http://e/doc#section");
    let id = dictionary.get_or_insert_id(&term, None, txn.as_mut()).unwrap();
    let stored = txn
        .get(&assemble_key(ID_TO_VALUE_TAG, &[&id.to_bytes()]))
        .unwrap()
        .expect("value stored");
    assert!(stored.starts_with(b"~"));
    assert!(stored.ends_with(b"#section"));
    assert_eq!(dictionary.get_term(id, None, txn.as_ref()).unwrap(), term);
    // the tag itself is a regular IRI
    let tag = dictionary.get_id(&Term::iri("http://e/doc"), None, txn.as_ref()).unwrap();
    assert!(tag < id);
    // IRIs outside the prefix stay uncompressed
    let other = Term::iri("http://elsewhere/doc#x");
    let id = dictionary.get_or_insert_id(&other, None, txn.as_mut()).unwrap();
    assert_eq!(dictionary.get_term(id, None, txn.as_ref()).unwrap(), other);
}

#[test]
fn origin_relative_terms_resolve_per_origin() {
    let store = MemoryStore::new();
    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(NoTags), true);
    let origin = "http://e/doc";
    let blank = Term::blank("b");
    let in_doc = dictionary.get_or_insert_id(&blank, Some(origin), txn.as_mut()).unwrap();
    let elsewhere = dictionary
        .get_or_insert_id(&blank, Some("http://e/other"), txn.as_mut())
        .unwrap();
    assert_ne!(in_doc, elsewhere);
    assert_eq!(dictionary.get_term(in_doc, Some(origin), txn.as_ref()).unwrap(), blank);
    // seen from outside its origin the blank node reads as an IRI
    assert_eq!(
        dictionary.get_term(in_doc, None, txn.as_ref()).unwrap(),
        Term::iri("http://e/doc#b")
    );
    let graph = dictionary
        .get_or_insert_id(&Term::DefaultGraph, Some(origin), txn.as_mut())
        .unwrap();
    assert_eq!(
        dictionary.get_term(graph, Some(origin), txn.as_ref()).unwrap(),
        Term::DefaultGraph
    );
}

#[test]
fn read_only_dictionaries_do_not_mint() {
    let store = MemoryStore::new();
    let mut txn = store.begin(true).unwrap();
    let mut dictionary = Dictionary::open(Arc::new(NoTags), false);
    assert!(matches!(
        dictionary.get_id(&Term::iri("http://e/a"), None, txn.as_ref()),
        Err(TriplexError::NotFound(_))
    ));
    assert!(matches!(
        dictionary.get_or_insert_id(&Term::iri("http://e/a"), None, txn.as_mut()),
        Err(TriplexError::ReadOnly)
    ));
    assert!(matches!(
        dictionary.get_id(&Term::iri(""), None, txn.as_ref()),
        Err(TriplexError::InvalidTerm(_))
    ));
}

#[test]
fn datasets_parse_with_comments_and_graphs() {
    let quads = parse::dataset(
        r#"
        # people
        <http://e/a> <http://e/name> "Ann"@en .
        <http://e/a> <http://e/age> "41"^^<http://www.w3.org/2001/XMLSchema#integer> <http://e/g> .
        _:x <http://e/says> "say \"hi\"" .
        "#,
    )
    .unwrap();
    assert_eq!(
        quads,
        vec![
            Quad::new(
                Term::iri("http://e/a"),
                Term::iri("http://e/name"),
                Term::tagged("Ann", "en"),
                Term::DefaultGraph,
            ),
            Quad::new(
                Term::iri("http://e/a"),
                Term::iri("http://e/age"),
                Term::typed("41", "http://www.w3.org/2001/XMLSchema#integer"),
                Term::iri("http://e/g"),
            ),
            Quad::new(
                Term::blank("x"),
                Term::iri("http://e/says"),
                Term::literal("say \"hi\""),
                Term::DefaultGraph,
            ),
        ]
    );
}

#[test]
fn patterns_reject_graph_terms() {
    assert!(parse::pattern("?x <http://e/p> ?y .").is_ok());
    assert!(matches!(
        parse::pattern("?x <http://e/p> ?y <http://e/g> ."),
        Err(TriplexError::Parse { .. })
    ));
}

#[test]
fn parse_errors_carry_a_position() {
    match parse::dataset("<http://e/a> <http://e/p> .\n<http://e/a> oops") {
        Err(TriplexError::Parse { line, .. }) => assert!(line.is_some()),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn single_terms_parse() {
    assert_eq!(parse::term("?x").unwrap(), Term::variable("x"));
    assert_eq!(parse::term(" <http://e/a> ").unwrap(), Term::iri("http://e/a"));
    assert_eq!(parse::term("\"v\"@de").unwrap(), Term::tagged("v", "de"));
    assert!(parse::term("?x ?y").is_err());
}

#[test]
fn terms_serialize_with_their_type() {
    let json = serde_json::to_value(Term::tagged("hi", "en")).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "termType": "Literal", "value": "hi", "language": "en" })
    );
    let back: Term = serde_json::from_value(serde_json::json!({
        "termType": "NamedNode",
        "value": "http://e/a"
    }))
    .unwrap();
    assert_eq!(back, Term::iri("http://e/a"));
}
