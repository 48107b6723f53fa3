use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use triplex::{Database, PersistenceMode, Term, parse};

fn generated(nodes: usize) -> String {
    let mut text = String::new();
    for i in 0..nodes {
        for step in [1, 7, 13] {
            text.push_str(&format!(
                "<http://e/n{}> <http://e/link> <http://e/n{}> .\n",
                i,
                (i * step + 3) % nodes
            ));
        }
        text.push_str(&format!("<http://e/n{}> <http://e/color> \"{}\" .\n", i, i % 5));
    }
    text
}

fn two_hop_join(c: &mut Criterion) {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let quads = parse::dataset(&generated(500)).expect("dataset");
    db.set(&Term::iri("http://e/graph"), &quads).expect("stored");
    let pattern = parse::pattern(
        "?x <http://e/link> ?y .
         ?y <http://e/link> ?z .
         ?z <http://e/color> \"2\" .",
    )
    .expect("pattern");
    let domain = [Term::variable("x"), Term::variable("z")];

    c.bench_function("compile and drain a two hop join", |b| {
        b.iter(|| {
            let mut graph = db.query(&pattern, &domain, &[]).expect("compiles");
            let mut rows = 0;
            while graph.next_position(None).expect("next").is_some() {
                rows += 1;
            }
            black_box(rows)
        })
    });
}

fn ingest(c: &mut Criterion) {
    let quads = parse::dataset(&generated(200)).expect("dataset");
    c.bench_function("ingest 800 quads", |b| {
        b.iter(|| {
            let db = Database::new(PersistenceMode::InMemory).expect("db");
            black_box(db.set(&Term::iri("http://e/graph"), &quads).expect("stored"))
        })
    });
}

criterion_group!(benches, two_hop_join, ingest);
criterion_main!(benches);
