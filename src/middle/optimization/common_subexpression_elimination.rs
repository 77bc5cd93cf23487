//! Common subexpression elimination by hoisting.
//!
//! For every compound expression we collect the statements that use it and
//! the statements where the value reaching each use was first computed. When
//! an expression is used more often than it is computed, each computing
//! statement gets a hoisted `temp = expression` right before it and every use
//! reads `temp` instead.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::middle::{
    analysis::available_expressions::compute_available_expressions,
    mir,
    optimization::allocator::OptimizationResourceAllocator,
};

#[derive(Debug, Default)]
struct ExpressionOccurrences {
    appearances: BTreeSet<usize>,
    usages: BTreeSet<usize>,
}

/// Expressions that are as cheap to recompute as to keep in a temporary.
fn is_simple(expression: &mir::Expression) -> bool {
    match expression {
        mir::Expression::Binary {
            operator: mir::BinaryOperator::Add | mir::BinaryOperator::Subtract | mir::BinaryOperator::Xor,
            left,
            right,
        } => left.is_primitive() && right.is_primitive(),
        expression => expression.is_primitive(),
    }
}

pub fn optimize_with_common_subexpression_elimination(
    statements: &[mir::Statement],
    allocator: &mut OptimizationResourceAllocator,
) -> Vec<mir::Statement> {
    let available = compute_available_expressions(statements);

    let mut order = Vec::new();
    let mut occurrences = HashMap::<mir::Expression, ExpressionOccurrences>::new();

    for (id, statement) in statements.iter().enumerate() {
        for expression in statement.compound_subexpressions() {
            if is_simple(expression) {
                continue;
            }

            let entry = occurrences.entry(expression.clone()).or_insert_with(|| {
                order.push(expression.clone());
                ExpressionOccurrences::default()
            });

            match available.in_edges[id].get(expression) {
                Some(appearances) => entry.appearances.extend(appearances),
                None => {
                    entry.appearances.insert(id);
                }
            }
            entry.usages.insert(id);
        }
    }

    let mut hoists = HashMap::<usize, Vec<(mir::Expression, String)>>::new();
    let mut replacements = HashMap::<usize, HashMap<mir::Expression, String>>::new();

    for expression in order {
        let occurrence = &occurrences[&expression];
        if occurrence.appearances.len() >= occurrence.usages.len() {
            continue;
        }

        let temporary = allocator.allocate_cse_hoisting_temporary();

        for appearance in &occurrence.appearances {
            let hoisted = hoists.entry(*appearance).or_default();
            // Keep expressions after the hoists they contain.
            let position = hoisted
                .iter()
                .position(|(existing, _)| existing.contains(&expression))
                .unwrap_or(hoisted.len());
            hoisted.insert(position, (expression.clone(), temporary.clone()));
        }

        for usage in &occurrence.usages {
            replacements
                .entry(*usage)
                .or_default()
                .insert(expression.clone(), temporary.clone());
        }
    }

    let no_replacements = HashMap::new();
    let mut optimized = Vec::with_capacity(statements.len());

    for (id, statement) in statements.iter().enumerate() {
        let replacements = replacements.get(&id).unwrap_or(&no_replacements);
        let replace = |expression: &mir::Expression, keep: Option<&mir::Expression>| {
            expression.rewrite_top_down(&mut |subexpression| {
                if Some(subexpression) == keep {
                    return None;
                }
                replacements
                    .get(subexpression)
                    .map(|temporary| mir::Expression::temporary(temporary.as_str()))
            })
        };

        for (expression, temporary) in hoists.get(&id).into_iter().flatten() {
            optimized.push(mir::Statement::move_temporary(
                temporary.as_str(),
                replace(expression, Some(expression)),
            ));
        }

        optimized.push(statement.map_expressions(|expression| replace(expression, None)));
    }

    optimized
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use itertools::Itertools;

    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Statement};

    fn render(statements: &[Statement]) -> String {
        statements.iter().map(|statement| format!("{statement}\n")).join("")
    }

    fn product() -> Expression {
        Expression::binary(
            BinaryOperator::Multiply,
            Expression::temporary("a"),
            Expression::temporary("b"),
        )
    }

    #[test]
    fn hoists_expressions_computed_on_both_branches() {
        let statements = vec![
            Statement::conditional_jump(Expression::temporary("first"), "ELSE"),
            Statement::move_temporary("t", product()),
            Statement::jump("END"),
            Statement::label("ELSE"),
            Statement::move_temporary("t", product()),
            Statement::label("END"),
            Statement::call(Expression::name("check"), vec![product()], None),
        ];

        let mut allocator = OptimizationResourceAllocator::new();

        assert_eq!(
            render(&optimize_with_common_subexpression_elimination(&statements, &mut allocator)),
            indoc! {"
                if (first) goto ELSE;
                _CSE_HOISTING_0_ = (a * b);
                t = _CSE_HOISTING_0_;
                goto END;
                ELSE:
                _CSE_HOISTING_0_ = (a * b);
                t = _CSE_HOISTING_0_;
                END:
                check(_CSE_HOISTING_0_);
            "}
        );
    }

    #[test]
    fn orders_nested_hoists_by_containment() {
        let quotient = Expression::binary(
            BinaryOperator::Divide,
            Expression::temporary("m"),
            Expression::Constant(1000),
        );
        let nested = Expression::binary(BinaryOperator::Divide, quotient.clone(), Expression::Constant(1000));
        let statements = vec![
            Statement::move_temporary("x", nested.clone()),
            Statement::move_temporary("y", quotient.clone()),
            Statement::move_temporary("z", nested),
            Statement::Return(Some(quotient)),
        ];

        let mut allocator = OptimizationResourceAllocator::new();

        assert_eq!(
            render(&optimize_with_common_subexpression_elimination(&statements, &mut allocator)),
            indoc! {"
                _CSE_HOISTING_0_ = (m / 1000);
                _CSE_HOISTING_1_ = (_CSE_HOISTING_0_ / 1000);
                x = _CSE_HOISTING_1_;
                y = _CSE_HOISTING_0_;
                z = _CSE_HOISTING_1_;
                return _CSE_HOISTING_0_;
            "}
        );
    }

    #[test]
    fn leaves_single_use_and_simple_expressions_alone() {
        let sum = Expression::binary(
            BinaryOperator::Add,
            Expression::temporary("a"),
            Expression::temporary("b"),
        );
        let statements = vec![
            Statement::move_temporary("x", sum.clone()),
            Statement::move_temporary("y", sum),
            Statement::move_temporary("z", product()),
            Statement::Return(Some(Expression::temporary("z"))),
        ];

        let mut allocator = OptimizationResourceAllocator::new();

        assert_eq!(
            optimize_with_common_subexpression_elimination(&statements, &mut allocator),
            statements
        );
    }
}
