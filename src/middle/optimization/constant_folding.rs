use crate::middle::mir;

/// Folds every binary operation whose operands are both literal constants.
/// A division or modulo by a literal zero is left alone so it still traps.
pub fn fold_expression(expression: &mir::Expression) -> mir::Expression {
    expression.rewrite_bottom_up(&mut |expression| {
        let folded = match &expression {
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => match (left.as_constant(), right.as_constant()) {
                (Some(left), Some(right)) => operator.evaluate(left, right),
                _ => None,
            },
            _ => None,
        };

        folded.map_or(expression, mir::Expression::Constant)
    })
}

/// Returns `None` when the statement disappears, which happens to a
/// conditional jump whose condition folds to zero.
pub fn fold_statement(statement: &mir::Statement) -> Option<mir::Statement> {
    let folded = statement.map_expressions(fold_expression);

    match folded {
        mir::Statement::ConditionalJumpFallThrough {
            condition: mir::Expression::Constant(0),
            ..
        } => None,
        mir::Statement::ConditionalJumpFallThrough {
            condition: mir::Expression::Constant(_),
            label,
        } => Some(mir::Statement::Jump(label)),
        folded => Some(folded),
    }
}

pub fn optimize_with_constant_folding(statements: &[mir::Statement]) -> Vec<mir::Statement> {
    statements.iter().filter_map(fold_statement).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Statement};

    fn arbitrary_expression() -> impl Strategy<Value = Expression> {
        let leaf = prop_oneof![
            (-20i64..20).prop_map(Expression::Constant),
            prop::sample::select(vec!["a", "b"]).prop_map(Expression::temporary),
        ];

        leaf.prop_recursive(4, 32, 2, |inner| {
            (
                prop::sample::select(BinaryOperator::iter().collect::<Vec<_>>()),
                inner.clone(),
                inner,
            )
                .prop_map(|(operator, left, right)| Expression::binary(operator, left, right))
        })
    }

    /// `None` means that evaluation traps.
    fn evaluate(expression: &Expression, a: i64, b: i64) -> Option<i64> {
        match expression {
            Expression::Constant(value) => Some(*value),
            Expression::Temporary(name) if name == "a" => Some(a),
            Expression::Temporary(_) => Some(b),
            Expression::Binary {
                operator,
                left,
                right,
            } => operator.evaluate(evaluate(left, a, b)?, evaluate(right, a, b)?),
            Expression::Name(_) | Expression::Memory(_) => unreachable!(),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn folding_is_idempotent(expression in arbitrary_expression()) {
            let folded = fold_expression(&expression);
            prop_assert_eq!(fold_expression(&folded), folded);
        }

        #[test]
        fn folding_preserves_values(
            expression in arbitrary_expression(),
            a in -5i64..5,
            b in -5i64..5
        ) {
            prop_assert_eq!(
                evaluate(&fold_expression(&expression), a, b),
                evaluate(&expression, a, b)
            );
        }
    }

    #[test]
    fn folds_nested_constants_but_not_division_by_zero() {
        let expression = Expression::binary(
            BinaryOperator::Add,
            Expression::binary(BinaryOperator::Multiply, Expression::Constant(6), Expression::Constant(7)),
            Expression::binary(BinaryOperator::Divide, Expression::Constant(1), Expression::Constant(0)),
        );

        assert_eq!(fold_expression(&expression).to_string(), "(42 + (1 / 0))");
        assert_eq!(
            fold_expression(&Expression::binary(
                BinaryOperator::Modulo,
                Expression::Constant(1),
                Expression::Constant(0)
            ))
            .to_string(),
            "(1 % 0)"
        );
    }

    #[test]
    fn folds_conditional_jumps() {
        let statements = vec![
            Statement::conditional_jump(
                Expression::binary(BinaryOperator::LessThan, Expression::Constant(1), Expression::Constant(2)),
                "TAKEN",
            ),
            Statement::conditional_jump(
                Expression::binary(BinaryOperator::Equal, Expression::Constant(1), Expression::Constant(2)),
                "NEVER",
            ),
            Statement::conditional_jump(Expression::temporary("c"), "MAYBE"),
        ];

        assert_eq!(
            optimize_with_constant_folding(&statements),
            vec![
                Statement::jump("TAKEN"),
                Statement::conditional_jump(Expression::temporary("c"), "MAYBE"),
            ]
        );
    }
}
