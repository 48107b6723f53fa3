//! Compiles a query pattern into a [`ConstraintGraph`].

use std::collections::{BTreeMap, HashMap, HashSet};

use roaring::RoaringBitmap;
use tracing::debug;

use crate::dictionary::Dictionary;
use crate::error::{Result, TriplexError};
use crate::key::Place;
use crate::query::constraint::{Constraint, Kind};
use crate::query::graph::{ConstraintGraph, Slot};
use crate::query::solver::Solver;
use crate::query::variable::Variable;
use crate::store::Transaction;
use crate::term::{Term, Triple};

// ------------- Relabeling -------------
/// The domain order chosen at compile time, as a permutation of the order in
/// which variables were discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relabeling {
    /// `order[new] = old`
    order: Vec<usize>,
    /// `position[old] = new`
    position: Vec<usize>,
}

impl Relabeling {
    /// Keeps the first `pivot` positions and stable-sorts the rest by
    /// ascending score.
    pub fn by_score(scores: &[f64], pivot: usize) -> Self {
        let pivot = pivot.min(scores.len());
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order[pivot..].sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
        let mut position = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            position[old] = new;
        }
        Self { order, position }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn position(&self, old: usize) -> usize {
        self.position[old]
    }

    /// Reorders `items` from discovery order into domain order.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        self.order
            .iter()
            .filter_map(|&old| slots.get_mut(old).and_then(Option::take))
            .collect()
    }
}

fn validate_domain(domain: &[Term]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut blanks = false;
    for term in domain {
        match term {
            Term::Variable { .. } if blanks => {
                return Err(TriplexError::InvalidDomain(format!(
                    "variable {} after a blank node",
                    term
                )));
            }
            Term::Variable { .. } => {}
            Term::Blank { .. } => blanks = true,
            other => {
                return Err(TriplexError::InvalidDomain(format!(
                    "{} is not a variable",
                    other
                )));
            }
        }
        if !seen.insert(term) {
            return Err(TriplexError::InvalidDomain(format!("{} appears twice", term)));
        }
    }
    Ok(())
}

/// Transitive closure of the forward edges. Edges only point to higher
/// positions, so a single pass in position order completes every set.
fn dependencies(variables: &[Variable]) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let n = variables.len();
    let mut closure = vec![RoaringBitmap::new(); n];
    for (i, variable) in variables.iter().enumerate() {
        let upstream = closure[i].clone();
        for &dependent in variable.edges.keys() {
            closure[dependent].insert(i as u32);
            closure[dependent] |= &upstream;
        }
    }
    let inbound: Vec<Vec<usize>> = closure
        .iter()
        .map(|set| set.iter().map(|i| i as usize).collect())
        .collect();
    let mut outbound = vec![Vec::new(); n];
    for (dependent, upstream) in inbound.iter().enumerate() {
        for &i in upstream {
            outbound[i].push(dependent);
        }
    }
    (inbound, outbound)
}

/// Builds the graph for `pattern`. `domain` lists the exposed variables in
/// output order; `index` optionally positions the graph at a previous
/// assignment (or a prefix of one).
pub fn compile(
    pattern: &[Triple],
    domain: &[Term],
    index: &[Term],
    mut dictionary: Dictionary,
    txn: Box<dyn Transaction>,
) -> Result<ConstraintGraph> {
    validate_domain(domain)?;
    if index.len() > domain.len() {
        return Err(TriplexError::InvalidIndex(format!(
            "index of {} terms for a domain of {}",
            index.len(),
            domain.len()
        )));
    }

    let mut variables: Vec<Variable> = domain.iter().cloned().map(Variable::new).collect();
    let mut positions: HashMap<Term, usize> = domain
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, term)| (term, i))
        .collect();
    let mut constraints: Vec<Constraint> = Vec::new();
    let mut slots: Vec<[Slot; 3]> = Vec::with_capacity(pattern.len());
    let mut satisfiable = true;

    for (t, triple) in pattern.iter().enumerate() {
        let mut ids = [None; 3];
        let mut slot = [Slot::Constant(None); 3];
        let mut occupied: Vec<(Place, usize)> = Vec::with_capacity(3);
        for (place, term) in Place::ALL.into_iter().zip(triple.terms()) {
            if term.is_slot() {
                let next = variables.len();
                let v = *positions.entry(term.clone()).or_insert(next);
                if v == next {
                    variables.push(Variable::new(term.clone()));
                }
                occupied.push((place, v));
                slot[place.index()] = Slot::Variable(v);
                continue;
            }
            match dictionary.get_id(term, None, txn.as_ref()) {
                Ok(id) => {
                    ids[place.index()] = Some(id);
                    slot[place.index()] = Slot::Constant(Some(id));
                }
                Err(TriplexError::NotFound(_)) => satisfiable = false,
                Err(e) => return Err(e),
            }
        }
        slots.push(slot);
        match occupied[..] {
            [] => {}
            [(place, v)] => {
                variables[v].constraints.push(constraints.len());
                constraints.push(Constraint::new(t, place, Kind::Single, ids));
            }
            [(place, v), (other, w)] if v == w => {
                variables[v].constraints.push(constraints.len());
                constraints.push(Constraint::new(t, place, Kind::SelfJoin { other }, ids));
            }
            [(place, v), (other, w)] => {
                let (a, b) = (constraints.len(), constraints.len() + 1);
                let mut first = Constraint::new(t, place, Kind::Pair { partner: other }, ids);
                let mut second = Constraint::new(t, other, Kind::Pair { partner: place }, ids);
                first.dual = Some(b);
                second.dual = Some(a);
                constraints.push(first);
                constraints.push(second);
                variables[v].constraints.push(a);
                variables[w].constraints.push(b);
                variables[v].edges.entry(w).or_default().push(a);
                variables[w].edges.entry(v).or_default().push(b);
            }
            _ => return Err(TriplexError::AllVariableTriple(t)),
        }
    }

    if let Some(missing) = variables[..domain.len()]
        .iter()
        .find(|variable| variable.constraints.is_empty())
    {
        return Err(TriplexError::InvalidDomain(format!(
            "{} does not occur in the pattern",
            missing.label
        )));
    }

    let pivot = domain.len();
    let labels: Vec<Term> = variables.iter().map(|v| v.label.clone()).collect();
    if !satisfiable || variables.is_empty() {
        debug!(satisfiable, variables = variables.len(), "pattern cannot match");
        return Ok(ConstraintGraph::empty(labels, pivot, slots, dictionary, txn));
    }

    let mut solver = Solver {
        constraints,
        ..Solver::default()
    };
    for constraint in &mut solver.constraints {
        if constraint.initialize(&mut solver.unary, &mut solver.binary, txn.as_ref())? == 0 {
            debug!(triple = constraint.index, "constraint has no postings");
            return Ok(ConstraintGraph::empty(labels, pivot, slots, dictionary, txn));
        }
    }
    for variable in &mut variables {
        if variable.rank(&mut solver.constraints, txn.as_ref())?.is_none() {
            debug!(variable = %variable.label, "constraints do not intersect");
            return Ok(ConstraintGraph::empty(labels, pivot, slots, dictionary, txn));
        }
    }

    let scores: Vec<f64> = variables.iter().map(Variable::score).collect();
    let relabeling = Relabeling::by_score(&scores, pivot);
    let mut variables = relabeling.apply(variables);
    for variable in &mut variables {
        let edges = std::mem::take(&mut variable.edges);
        variable.edges = edges
            .into_iter()
            .map(|(other, crossing)| (relabeling.position(other), crossing))
            .collect::<BTreeMap<_, _>>();
    }
    for slot in slots.iter_mut().flatten() {
        if let Slot::Variable(v) = slot {
            *v = relabeling.position(*v);
        }
    }

    // An edge to an earlier position needs no propagation of its own: the
    // earlier variable binds first and sets this side through its dual.
    for (i, variable) in variables.iter_mut().enumerate() {
        let backward: Vec<usize> = variable.edges.range(..i).flat_map(|(_, c)| c.clone()).collect();
        for c in backward {
            solver.constraints[c].dual = None;
        }
        variable.edges.retain(|&other, _| other > i);
    }

    let (inbound, outbound) = dependencies(&variables);
    debug!(
        variables = variables.len(),
        constraints = solver.constraints.len(),
        pivot,
        order = ?relabeling.order(),
        "compiled pattern"
    );
    solver.variables = variables;
    solver.inbound = inbound;
    solver.outbound = outbound;

    let mut graph = ConstraintGraph::new(solver, pivot, slots, dictionary, txn);
    if !index.is_empty() {
        graph.seek(index)?;
    }
    Ok(graph)
}
