use hashbrown::HashSet;

use crate::middle::{
    dataflow::{DataflowOperator, DataflowResult, run_backward_analysis},
    mir,
};

pub type LiveSet = HashSet<String>;

pub struct LiveTemporariesOperator;

impl DataflowOperator<mir::Statement> for LiveTemporariesOperator {
    type Edge = LiveSet;

    fn initial_edge(&self, _: usize) -> LiveSet {
        LiveSet::new()
    }

    fn join(&self, edges: &[&LiveSet]) -> LiveSet {
        edges
            .iter()
            .flat_map(|edge| edge.iter().cloned())
            .collect()
    }

    fn transfer(&self, edge: &LiveSet, _: usize, statement: &mir::Statement) -> LiveSet {
        let mut live = edge.clone();

        if let Some(defined) = statement.defined_temporary() {
            live.remove(defined);
        }

        live.extend(statement.used_temporaries().into_iter().map(str::to_owned));
        live
    }

    fn edges_equal(&self, left: &LiveSet, right: &LiveSet) -> bool {
        left == right
    }
}

pub fn compute_live_temporaries(statements: &[mir::Statement]) -> DataflowResult<LiveSet> {
    run_backward_analysis(statements, &LiveTemporariesOperator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Statement};

    fn set(names: &[&str]) -> LiveSet {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn computes_liveness_around_a_loop() {
        let statements = vec![
            Statement::move_temporary("i", Expression::Constant(0)),
            Statement::label("LOOP"),
            Statement::call(Expression::name("f"), vec![Expression::temporary("i")], Some("r")),
            Statement::move_temporary(
                "i",
                Expression::binary(BinaryOperator::Add, Expression::temporary("i"), Expression::temporary("r")),
            ),
            Statement::conditional_jump(Expression::temporary("n"), "LOOP"),
            Statement::Return(Some(Expression::temporary("i"))),
        ];

        let result = compute_live_temporaries(&statements);

        assert_eq!(result.in_edges[0], set(&["n"]));
        assert_eq!(result.out_edges[2], set(&["i", "r", "n"]));
        assert_eq!(result.in_edges[2], set(&["i", "n"]));
        assert_eq!(result.out_edges[5], set(&[]));
    }
}
