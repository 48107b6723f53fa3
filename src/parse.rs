//! Text syntax for datasets, query patterns and single terms.
//!
//! Statements look like N-Quads with variables added:
//!
//! ```text
//! <http://example.com/a> <http://example.com/knows> _:b .
//! ?x <http://example.com/likes> "pizza"@en <http://example.com/graph> .
//! ```

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{Result, TriplexError};
use crate::term::{Quad, Term, Triple, unescape};

#[derive(Parser)]
#[grammar = "triplex.pest"]
pub struct StatementParser;

fn inner_str(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn build_term(pair: Pair<'_, Rule>) -> Result<Term> {
    match pair.as_rule() {
        Rule::iri => Ok(Term::iri(inner_str(pair))),
        Rule::blank => Ok(Term::blank(inner_str(pair))),
        Rule::variable => Ok(Term::variable(inner_str(pair))),
        Rule::literal => {
            let mut parts = pair.into_inner();
            let value = parts
                .next()
                .and_then(|string| string.into_inner().next())
                .map(|body| unescape(body.as_str()))
                .unwrap_or_default();
            let (mut datatype, mut language) = (None, None);
            if let Some(annotation) = parts.next() {
                match annotation.as_rule() {
                    Rule::language => language = Some(inner_str(annotation)),
                    _ => datatype = Some(inner_str(annotation)),
                }
            }
            Ok(Term::Literal {
                value,
                datatype,
                language,
            })
        }
        rule => Err(TriplexError::Parse {
            message: format!("unexpected {:?} in {}", rule, pair.as_str()),
            line: None,
            col: None,
        }),
    }
}

fn statements(input: &str) -> Result<Vec<Vec<Term>>> {
    let mut document = StatementParser::parse(Rule::document, input)?;
    let Some(document) = document.next() else {
        return Ok(Vec::new());
    };
    document
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::statement)
        .map(|statement| statement.into_inner().map(build_term).collect())
        .collect()
}

/// Parses quads; a statement without a fourth term belongs to the default graph.
pub fn dataset(input: &str) -> Result<Vec<Quad>> {
    statements(input)?
        .into_iter()
        .map(|terms| {
            let mut terms = terms.into_iter();
            match (terms.next(), terms.next(), terms.next(), terms.next()) {
                (Some(s), Some(p), Some(o), graph) => {
                    Ok(Quad::new(s, p, o, graph.unwrap_or(Term::DefaultGraph)))
                }
                _ => Err(TriplexError::Parse {
                    message: "statement needs three terms".to_string(),
                    line: None,
                    col: None,
                }),
            }
        })
        .collect()
}

/// Parses query triples; graph terms are not allowed in patterns.
pub fn pattern(input: &str) -> Result<Vec<Triple>> {
    dataset(input)?
        .into_iter()
        .map(|quad| match quad.graph {
            Term::DefaultGraph => Ok(Triple::new(quad.subject, quad.predicate, quad.object)),
            graph => Err(TriplexError::Parse {
                message: format!("pattern triple with graph {}", graph),
                line: None,
                col: None,
            }),
        })
        .collect()
}

pub fn term(input: &str) -> Result<Term> {
    let mut single = StatementParser::parse(Rule::single, input.trim())?;
    let pair = single
        .next()
        .and_then(|single| single.into_inner().find(|p| p.as_rule() != Rule::EOI))
        .ok_or_else(|| TriplexError::Parse {
            message: format!("no term in {:?}", input),
            line: None,
            col: None,
        })?;
    build_term(pair)
}
