use std::collections::BTreeSet;

use triplex::key::Id;
use triplex::{Database, PersistenceMode, Term, parse};

const NODES: usize = 30;

fn node(i: usize) -> Term {
    Term::iri(format!("http://e/n{}", i))
}

fn edges() -> BTreeSet<(usize, usize)> {
    (0..NODES)
        .flat_map(|i| [(i, (i * 7 + 3) % NODES), (i, (i * 11 + 5) % NODES)])
        .collect()
}

fn setup() -> Database {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    // shuffle the insertion order so ids do not follow node numbers
    let text: String = edges()
        .into_iter()
        .rev()
        .map(|(a, b)| format!("{} <http://e/p> {} .\n", node(a), node(b)))
        .collect();
    db.set(&Term::iri("http://e/graph"), &parse::dataset(&text).unwrap())
        .unwrap();
    db
}

/// Every `(x, z, y)` with `x -> y -> z`, as ids.
fn brute_force(db: &Database) -> Vec<Vec<Id>> {
    let id = |i: usize| db.id_of(&node(i)).expect("known node");
    let edges = edges();
    let mut expected = BTreeSet::new();
    for &(a, b) in &edges {
        for &(c, d) in &edges {
            if b == c {
                expected.insert(vec![id(a), id(d), id(b)]);
            }
        }
    }
    expected.into_iter().collect()
}

fn drain(graph: &mut triplex::ConstraintGraph) -> Vec<Vec<Id>> {
    let mut found = Vec::new();
    while graph.next_position(None).unwrap().is_some() {
        found.push(graph.ids().expect("assignment"));
    }
    found
}

#[test]
fn results_match_brute_force_in_lexicographic_order() {
    let db = setup();
    let pattern = parse::pattern("?x <http://e/p> ?y . ?y <http://e/p> ?z .").unwrap();
    let mut graph = db
        .query(&pattern, &[Term::variable("x"), Term::variable("z")], &[])
        .unwrap();
    let found = drain(&mut graph);
    assert!(found.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(found, brute_force(&db));
}

#[test]
fn resuming_anywhere_continues_the_same_sequence() {
    let db = setup();
    let pattern = parse::pattern("?x <http://e/p> ?y . ?y <http://e/p> ?z .").unwrap();
    let domain = [Term::variable("x"), Term::variable("z")];
    let mut graph = db.query(&pattern, &domain, &[]).unwrap();
    let all = drain(&mut graph);
    assert!(all.len() >= 3);
    for k in [0, 1, all.len() / 2, all.len() - 1] {
        let mut first = db.query(&pattern, &domain, &[]).unwrap();
        for _ in 0..=k {
            first.next_position(None).unwrap();
        }
        let index = first.index().unwrap().expect("assignment");
        let mut exact = db.query(&pattern, &domain, &index).unwrap();
        assert_eq!(drain(&mut exact), all[k..].to_vec());
        let mut resumed = db.query(&pattern, &domain, &index[..2]).unwrap();
        let rest = drain(&mut resumed);
        // the exposed prefix of result k may be shared by earlier results
        let start = all
            .iter()
            .position(|ids| ids[..2] == all[k][..2])
            .expect("prefix present");
        assert_eq!(rest, all[start..].to_vec());
    }
}

#[test]
fn advancing_an_exposed_variable_skips_its_block() {
    let db = setup();
    let pattern = parse::pattern("?x <http://e/p> ?y . ?y <http://e/p> ?z .").unwrap();
    let mut graph = db
        .query(&pattern, &[Term::variable("x"), Term::variable("z")], &[])
        .unwrap();
    let all = brute_force(&db);
    let mut firsts: Vec<Id> = all.iter().map(|ids| ids[0]).collect();
    firsts.dedup();
    let mut seen = Vec::new();
    assert!(graph.next_position(None).unwrap().is_some());
    loop {
        seen.push(graph.ids().expect("assignment")[0]);
        if graph.next_position(Some(&Term::variable("x"))).unwrap().is_none() {
            break;
        }
    }
    assert_eq!(seen, firsts);
}
