use hashbrown::HashMap;

use crate::middle::{
    dataflow::{DataflowOperator, DataflowResult, run_forward_analysis},
    mir,
};

/// Copy facts `destination -> source` that hold on every path to a point.
pub type CopyMap = HashMap<String, String>;

pub struct AvailableCopiesOperator;

impl DataflowOperator<mir::Statement> for AvailableCopiesOperator {
    type Edge = CopyMap;

    fn initial_edge(&self, _: usize) -> CopyMap {
        CopyMap::new()
    }

    /// Keeps the copies every predecessor agrees on. A destination whose
    /// source differs between predecessors is dropped.
    fn join(&self, edges: &[&CopyMap]) -> CopyMap {
        let Some((first, rest)) = edges.split_first() else {
            return CopyMap::new();
        };

        first
            .iter()
            .filter(|(destination, source)| {
                rest.iter()
                    .all(|edge| edge.get(*destination) == Some(*source))
            })
            .map(|(destination, source)| (destination.clone(), source.clone()))
            .collect()
    }

    fn transfer(&self, edge: &CopyMap, _: usize, statement: &mir::Statement) -> CopyMap {
        let Some(defined) = statement.defined_temporary() else {
            return edge.clone();
        };

        let mut copies = edge
            .iter()
            .filter(|(destination, source)| *destination != defined && *source != defined)
            .map(|(destination, source)| (destination.clone(), source.clone()))
            .collect::<CopyMap>();

        if let mir::Statement::MoveTemporary {
            destination,
            source: mir::Expression::Temporary(source),
        } = statement
        {
            if destination != source {
                copies.insert(destination.clone(), source.clone());
            }
        }

        copies
    }

    fn edges_equal(&self, left: &CopyMap, right: &CopyMap) -> bool {
        left == right
    }
}

pub fn compute_available_copies(statements: &[mir::Statement]) -> DataflowResult<CopyMap> {
    run_forward_analysis(statements, &AvailableCopiesOperator)
}

/// Follows the copy chain starting at `temporary` to its root source.
pub fn resolve_copy<'a>(copies: &'a CopyMap, temporary: &'a str) -> &'a str {
    let mut current = temporary;

    // A chain can never be longer than the number of facts.
    for _ in 0..=copies.len() {
        match copies.get(current) {
            Some(source) if source != temporary => current = source.as_str(),
            _ => break,
        }
    }

    current
}
