use hashbrown::HashMap;

use crate::middle::{
    dataflow::{DataflowOperator, DataflowResult, run_forward_analysis},
    mir,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantStatus {
    Unknown,
    Known(i64),
}

impl ConstantStatus {
    fn meet(self, other: Self) -> Self {
        match (self, other) {
            (Self::Known(left), Self::Known(right)) if left == right => self,
            _ => Self::Unknown,
        }
    }
}

/// A temporary missing from the map has not been assigned on any path
/// seen so far.
pub type ConstantMap = HashMap<String, ConstantStatus>;

pub struct ConstantPropagationOperator<'a> {
    parameters: &'a [String],
}

impl<'a> ConstantPropagationOperator<'a> {
    pub fn new(parameters: &'a [String]) -> Self {
        Self { parameters }
    }
}

impl DataflowOperator<mir::Statement> for ConstantPropagationOperator<'_> {
    type Edge = ConstantMap;

    fn initial_edge(&self, node_id: usize) -> ConstantMap {
        if node_id != 0 {
            return ConstantMap::new();
        }

        self.parameters
            .iter()
            .map(|parameter| (parameter.clone(), ConstantStatus::Unknown))
            .collect()
    }

    fn join(&self, edges: &[&ConstantMap]) -> ConstantMap {
        let mut joined = ConstantMap::new();

        for edge in edges {
            for (temporary, status) in edge.iter() {
                joined
                    .entry(temporary.clone())
                    .and_modify(|existing| *existing = existing.meet(*status))
                    .or_insert(*status);
            }
        }

        joined
    }

    fn transfer(&self, edge: &ConstantMap, _: usize, statement: &mir::Statement) -> ConstantMap {
        match statement {
            mir::Statement::MoveTemporary {
                destination,
                source,
            } => {
                let mut constants = edge.clone();
                let status = evaluate(source, edge);
                constants.insert(destination.clone(), status);
                constants
            }
            mir::Statement::Call {
                collector: Some(collector),
                ..
            } => {
                let mut constants = edge.clone();
                constants.insert(collector.clone(), ConstantStatus::Unknown);
                constants
            }
            _ => edge.clone(),
        }
    }

    fn edges_equal(&self, left: &ConstantMap, right: &ConstantMap) -> bool {
        left == right
    }
}

/// Evaluates `expression` under the known constants. Division or modulo by
/// a known zero stays `Unknown` so that it still traps at runtime.
pub fn evaluate(expression: &mir::Expression, constants: &ConstantMap) -> ConstantStatus {
    match expression {
        mir::Expression::Constant(value) => ConstantStatus::Known(*value),
        mir::Expression::Name(_) | mir::Expression::Memory(_) => ConstantStatus::Unknown,
        mir::Expression::Temporary(name) => constants
            .get(name)
            .copied()
            .unwrap_or(ConstantStatus::Unknown),
        mir::Expression::Binary {
            operator,
            left,
            right,
        } => match (evaluate(left, constants), evaluate(right, constants)) {
            (ConstantStatus::Known(left), ConstantStatus::Known(right)) => operator
                .evaluate(left, right)
                .map_or(ConstantStatus::Unknown, ConstantStatus::Known),
            _ => ConstantStatus::Unknown,
        },
    }
}

pub fn compute_constants(function: &mir::Function) -> DataflowResult<ConstantMap> {
    run_forward_analysis(
        &function.body,
        &ConstantPropagationOperator::new(&function.parameters),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Function, Statement};

    fn function(parameters: &[&str], body: Vec<Statement>) -> Function {
        Function {
            name: "test".to_owned(),
            parameters: parameters.iter().map(|name| name.to_string()).collect(),
            body,
            has_return: true,
        }
    }

    #[test]
    fn propagates_through_branches() {
        let body = vec![
            Statement::move_temporary(
                "x",
                Expression::binary(BinaryOperator::Xor, Expression::Constant(0), Expression::Constant(1)),
            ),
            Statement::conditional_jump(
                Expression::binary(
                    BinaryOperator::LessThan,
                    Expression::temporary("x"),
                    Expression::Constant(2),
                ),
                "TRUE",
            ),
            Statement::Return(Some(Expression::Constant(0))),
            Statement::label("TRUE"),
            Statement::move_temporary(
                "y",
                Expression::binary(
                    BinaryOperator::Subtract,
                    Expression::Constant(3),
                    Expression::temporary("x"),
                ),
            ),
            Statement::Return(Some(Expression::temporary("y"))),
        ];

        let result = compute_constants(&function(&[], body));

        assert_eq!(result.out_edges[4]["y"], ConstantStatus::Known(2));
    }

    #[test]
    fn never_folds_division_by_zero() {
        let body = vec![
            Statement::move_temporary(
                "a",
                Expression::binary(BinaryOperator::Divide, Expression::Constant(1), Expression::Constant(0)),
            ),
            Statement::move_temporary(
                "b",
                Expression::binary(BinaryOperator::Modulo, Expression::Constant(1), Expression::Constant(0)),
            ),
            Statement::Return(None),
        ];

        let result = compute_constants(&function(&[], body));

        assert_eq!(result.out_edges[1]["a"], ConstantStatus::Unknown);
        assert_eq!(result.out_edges[1]["b"], ConstantStatus::Unknown);
    }

    #[test]
    fn loop_carried_values_become_unknown() {
        let body = vec![
            Statement::move_temporary("i", Expression::Constant(0)),
            Statement::move_temporary("k", Expression::Constant(7)),
            Statement::label("LOOP"),
            Statement::move_temporary(
                "i",
                Expression::binary(BinaryOperator::Add, Expression::temporary("i"), Expression::Constant(1)),
            ),
            Statement::conditional_jump(Expression::temporary("i"), "LOOP"),
            Statement::Return(Some(Expression::temporary("k"))),
        ];

        let result = compute_constants(&function(&[], body));

        assert_eq!(result.in_edges[5]["i"], ConstantStatus::Unknown);
        assert_eq!(result.in_edges[5]["k"], ConstantStatus::Known(7));
    }

    #[test]
    fn parameters_and_collectors_are_unknown() {
        let body = vec![
            Statement::conditional_jump(Expression::temporary("c"), "JOIN"),
            Statement::move_temporary("n", Expression::Constant(5)),
            Statement::label("JOIN"),
            Statement::call(Expression::name("f"), vec![], Some("r")),
            Statement::Return(Some(Expression::temporary("n"))),
        ];

        let result = compute_constants(&function(&["c", "n"], body));

        assert_eq!(result.in_edges[3]["n"], ConstantStatus::Unknown);
        assert_eq!(result.out_edges[3]["r"], ConstantStatus::Unknown);
    }
}
