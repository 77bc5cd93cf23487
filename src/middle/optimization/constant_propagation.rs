use crate::middle::{
    analysis::constant_propagation::{ConstantStatus, compute_constants},
    mir,
    optimization::constant_folding::optimize_with_constant_folding,
};

/// Replaces every read of a temporary that holds a known constant on entry
/// to the statement, then folds the result.
pub fn optimize_with_constant_propagation(function: &mir::Function) -> Vec<mir::Statement> {
    let constants = compute_constants(function);

    let propagated = function
        .body
        .iter()
        .zip(&constants.in_edges)
        .map(|(statement, constants)| {
            statement.map_expressions(|expression| {
                expression.substitute_temporaries(&|temporary| match constants.get(temporary) {
                    Some(ConstantStatus::Known(value)) => Some(mir::Expression::Constant(*value)),
                    _ => None,
                })
            })
        })
        .collect::<Vec<_>>();

    optimize_with_constant_folding(&propagated)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use itertools::Itertools;

    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Function, Statement};

    #[test]
    fn propagates_and_folds_branches() {
        let function = Function {
            name: "main".to_owned(),
            parameters: vec!["p".to_owned()],
            body: vec![
                Statement::move_temporary(
                    "x",
                    Expression::binary(BinaryOperator::Xor, Expression::Constant(0), Expression::Constant(1)),
                ),
                Statement::conditional_jump(
                    Expression::binary(BinaryOperator::LessThan, Expression::temporary("x"), Expression::Constant(2)),
                    "TRUE",
                ),
                Statement::Return(Some(Expression::temporary("p"))),
                Statement::label("TRUE"),
                Statement::move_temporary(
                    "y",
                    Expression::binary(BinaryOperator::Subtract, Expression::Constant(3), Expression::temporary("x")),
                ),
                Statement::move_temporary(
                    "z",
                    Expression::binary(BinaryOperator::Divide, Expression::temporary("y"), Expression::Constant(0)),
                ),
                Statement::Return(Some(Expression::temporary("z"))),
            ],
            has_return: true,
        };

        let optimized = optimize_with_constant_propagation(&function);

        assert_eq!(
            optimized.iter().map(|statement| format!("{statement}\n")).join(""),
            indoc! {"
                x = 1;
                goto TRUE;
                return p;
                TRUE:
                y = 2;
                z = (2 / 0);
                return z;
            "}
        );
    }
}
