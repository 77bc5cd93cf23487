use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::middle::{
    dataflow::{DataflowOperator, DataflowResult, run_forward_analysis},
    mir,
};

/// Maps every available compound expression to the ids of the statements
/// where it was first computed on some path.
pub type AvailableExpressions = HashMap<mir::Expression, BTreeSet<usize>>;

pub struct AvailableExpressionsOperator;

impl DataflowOperator<mir::Statement> for AvailableExpressionsOperator {
    type Edge = AvailableExpressions;

    fn initial_edge(&self, _: usize) -> AvailableExpressions {
        AvailableExpressions::new()
    }

    /// Keeps the expressions available from every predecessor, unioning the
    /// places they appeared at.
    fn join(&self, edges: &[&AvailableExpressions]) -> AvailableExpressions {
        let Some((first, rest)) = edges.split_first() else {
            return AvailableExpressions::new();
        };

        first
            .iter()
            .filter(|(expression, _)| rest.iter().all(|edge| edge.contains_key(*expression)))
            .map(|(expression, appearances)| {
                let mut appearances = appearances.clone();
                for edge in rest {
                    appearances.extend(&edge[expression]);
                }
                (expression.clone(), appearances)
            })
            .collect()
    }

    fn transfer(
        &self,
        edge: &AvailableExpressions,
        node_id: usize,
        statement: &mir::Statement,
    ) -> AvailableExpressions {
        let mut available = edge.clone();

        for expression in statement.compound_subexpressions() {
            available
                .entry(expression.clone())
                .or_insert_with(|| BTreeSet::from([node_id]));
        }

        if let Some(defined) = statement.defined_temporary() {
            available.retain(|expression, _| !expression.contains_temporary(defined));
        }

        if statement.writes_memory() {
            available.retain(|expression, _| !expression.contains_memory());
        }

        available
    }

    fn edges_equal(&self, left: &AvailableExpressions, right: &AvailableExpressions) -> bool {
        left == right
    }
}

pub fn compute_available_expressions(
    statements: &[mir::Statement],
) -> DataflowResult<AvailableExpressions> {
    run_forward_analysis(statements, &AvailableExpressionsOperator)
}
