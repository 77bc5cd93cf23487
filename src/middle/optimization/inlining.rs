//! Cost-bounded function inlining.
//!
//! Every function body gets a cost estimate. Calls to cheap functions are
//! replaced by a renamed copy of the callee body, and this is repeated for a
//! bounded number of rounds so that inlining can cascade through small
//! helpers.

use hashbrown::{HashMap, HashSet};

use crate::middle::{
    mir,
    optimization::{
        allocator::OptimizationResourceAllocator, simple::optimize_with_simple_optimization,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InliningConfiguration {
    /// Functions at most this expensive are copied into their callers.
    pub inlinable_cost_threshold: usize,
    /// Functions more expensive than this never get calls inlined into them.
    pub performer_cost_threshold: usize,
    pub maximum_rounds: usize,
}

impl Default for InliningConfiguration {
    fn default() -> Self {
        Self {
            inlinable_cost_threshold: 25,
            performer_cost_threshold: 1000,
            maximum_rounds: 5,
        }
    }
}

fn expression_cost(expression: &mir::Expression) -> usize {
    match expression {
        mir::Expression::Constant(_) | mir::Expression::Name(_) | mir::Expression::Temporary(_) => 0,
        mir::Expression::Memory(address) => 1 + expression_cost(address),
        mir::Expression::Binary { left, right, .. } => {
            1 + expression_cost(left) + expression_cost(right)
        }
    }
}

fn statement_cost(statement: &mir::Statement) -> usize {
    match statement {
        mir::Statement::MoveTemporary { source, .. } => expression_cost(source),
        mir::Statement::MoveMemory { address, source } => {
            1 + expression_cost(address) + expression_cost(source)
        }
        mir::Statement::Call {
            callee, arguments, ..
        } => {
            10 + expression_cost(callee)
                + arguments
                    .iter()
                    .map(|argument| 1 + expression_cost(argument))
                    .sum::<usize>()
        }
        mir::Statement::Jump(_) | mir::Statement::Label(_) => 1,
        mir::Statement::ConditionalJumpFallThrough { condition, .. } => {
            1 + expression_cost(condition)
        }
        mir::Statement::Return(value) => 1 + value.as_ref().map_or(0, expression_cost),
    }
}

pub fn estimate_function_cost(function: &mir::Function) -> usize {
    function.body.iter().map(statement_cost).sum()
}

struct InliningRewriter<'a> {
    label_prefix: &'a str,
    temporary_prefix: &'a str,
    collector: Option<&'a str>,
    end_label: String,
}

impl InliningRewriter<'_> {
    fn rename_temporary(&self, temporary: &str) -> String {
        format!("{}{temporary}", self.temporary_prefix)
    }

    fn rename_label(&self, label: &str) -> String {
        format!("{}{label}", self.label_prefix)
    }

    fn rewrite_expression(&self, expression: &mir::Expression) -> mir::Expression {
        expression.substitute_temporaries(&|temporary| {
            Some(mir::Expression::Temporary(self.rename_temporary(temporary)))
        })
    }

    fn rewrite_statement(&self, statement: &mir::Statement, output: &mut Vec<mir::Statement>) {
        let rewritten = match statement {
            mir::Statement::MoveTemporary {
                destination,
                source,
            } => mir::Statement::MoveTemporary {
                destination: self.rename_temporary(destination),
                source: self.rewrite_expression(source),
            },
            mir::Statement::MoveMemory { address, source } => mir::Statement::MoveMemory {
                address: self.rewrite_expression(address),
                source: self.rewrite_expression(source),
            },
            mir::Statement::Jump(label) => mir::Statement::Jump(self.rename_label(label)),
            mir::Statement::Label(label) => mir::Statement::Label(self.rename_label(label)),
            mir::Statement::Call {
                callee,
                arguments,
                collector,
            } => mir::Statement::Call {
                callee: self.rewrite_expression(callee),
                arguments: arguments
                    .iter()
                    .map(|argument| self.rewrite_expression(argument))
                    .collect(),
                collector: collector
                    .as_ref()
                    .map(|collector| self.rename_temporary(collector)),
            },
            mir::Statement::Return(value) => {
                if let (Some(value), Some(collector)) = (value, self.collector) {
                    output.push(mir::Statement::move_temporary(
                        collector,
                        self.rewrite_expression(value),
                    ));
                }
                mir::Statement::Jump(self.end_label.clone())
            }
            mir::Statement::ConditionalJumpFallThrough { condition, label } => {
                mir::Statement::ConditionalJumpFallThrough {
                    condition: self.rewrite_expression(condition),
                    label: self.rename_label(label),
                }
            }
        };

        output.push(rewritten);
    }
}

fn inline_into_function(
    function: &mir::Function,
    inlinable: &HashMap<&str, &mir::Function>,
    allocator: &mut OptimizationResourceAllocator,
) -> mir::Function {
    let mut body = Vec::with_capacity(function.body.len());

    for statement in &function.body {
        let mir::Statement::Call {
            callee: mir::Expression::Name(callee_name),
            arguments,
            collector,
        } = statement
        else {
            body.push(statement.clone());
            continue;
        };

        let Some(callee) = inlinable.get(callee_name.as_str()) else {
            body.push(statement.clone());
            continue;
        };

        if callee.parameters.len() != arguments.len() {
            internal_error!(
                "'{}' calls '{}' with {} arguments, but it takes {}",
                function.name,
                callee.name,
                arguments.len(),
                callee.parameters.len()
            );
        }

        let (label_prefix, temporary_prefix) = allocator.allocate_inlining_prefixes();
        let rewriter = InliningRewriter {
            label_prefix: &label_prefix,
            temporary_prefix: &temporary_prefix,
            collector: collector.as_deref(),
            end_label: format!("{label_prefix}__INLINING_END"),
        };

        for (parameter, argument) in callee.parameters.iter().zip(arguments) {
            body.push(mir::Statement::move_temporary(
                rewriter.rename_temporary(parameter),
                argument.clone(),
            ));
        }

        for callee_statement in &callee.body {
            rewriter.rewrite_statement(callee_statement, &mut body);
        }

        body.push(mir::Statement::Label(rewriter.end_label));
    }

    function.with_body(optimize_with_simple_optimization(&body))
}

pub fn optimize_with_inlining(
    unit: &mir::CompilationUnit,
    allocator: &mut OptimizationResourceAllocator,
    configuration: &InliningConfiguration,
) -> mir::CompilationUnit {
    let mut unit = unit.clone();

    for _ in 0..configuration.maximum_rounds {
        // The cost tables borrow names from `unit`, so they are dropped
        // before the next round replaces it.
        let functions = {
            let costs = unit
                .functions
                .iter()
                .map(|function| (function.name.as_str(), estimate_function_cost(function)))
                .collect::<HashMap<_, _>>();

            let inlinable = unit
                .functions
                .iter()
                .filter(|function| costs[function.name.as_str()] <= configuration.inlinable_cost_threshold)
                .map(|function| (function.name.as_str(), function))
                .collect::<HashMap<_, _>>();

            if inlinable.is_empty() {
                break;
            }

            let performers = costs
                .iter()
                .filter(|(_, cost)| **cost <= configuration.performer_cost_threshold)
                .map(|(name, _)| *name)
                .collect::<HashSet<_>>();

            unit.functions
                .iter()
                .map(|function| {
                    if performers.contains(function.name.as_str()) {
                        inline_into_function(function, &inlinable, allocator)
                    } else {
                        function.clone()
                    }
                })
                .collect::<Vec<_>>()
        };

        unit = mir::CompilationUnit {
            global_variables: unit.global_variables.clone(),
            functions,
        };
    }

    unit
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Function, Statement};

    fn function(name: &str, parameters: &[&str], body: Vec<Statement>) -> Function {
        Function {
            name: name.to_owned(),
            parameters: parameters.iter().map(|name| name.to_string()).collect(),
            body,
            has_return: true,
        }
    }

    #[test]
    fn estimates_costs() {
        let function = function(
            "f",
            &["a"],
            vec![
                Statement::move_temporary(
                    "x",
                    Expression::binary(
                        BinaryOperator::Add,
                        Expression::memory(Expression::temporary("a")),
                        Expression::Constant(1),
                    ),
                ),
                Statement::call(
                    Expression::name("g"),
                    vec![Expression::temporary("x"), Expression::memory(Expression::temporary("x"))],
                    Some("y"),
                ),
                Statement::move_memory(Expression::temporary("y"), Expression::Constant(0)),
                Statement::conditional_jump(Expression::temporary("y"), "L"),
                Statement::label("L"),
                Statement::Return(Some(Expression::temporary("y"))),
            ],
        );

        // 2 + (10 + 1 + 2) + 1 + 1 + 1 + 1
        assert_eq!(estimate_function_cost(&function), 19);
    }

    #[test]
    fn inlines_small_functions_at_call_sites() {
        let unit = mir::CompilationUnit {
            global_variables: vec![],
            functions: vec![
                function(
                    "add_one",
                    &["n"],
                    vec![Statement::Return(Some(Expression::binary(
                        BinaryOperator::Add,
                        Expression::temporary("n"),
                        Expression::Constant(1),
                    )))],
                ),
                function(
                    "main",
                    &[],
                    vec![
                        Statement::call(Expression::name("add_one"), vec![Expression::Constant(41)], Some("r")),
                        Statement::Return(Some(Expression::temporary("r"))),
                    ],
                ),
            ],
        };

        let mut allocator = OptimizationResourceAllocator::new();
        let configuration = InliningConfiguration {
            maximum_rounds: 1,
            ..Default::default()
        };
        let inlined = optimize_with_inlining(&unit, &mut allocator, &configuration);

        assert_eq!(
            inlined.function("main").map(ToString::to_string).unwrap(),
            indoc! {"
                function main {
                  _INLINING_0_TEMP_n = 41;
                  r = (_INLINING_0_TEMP_n + 1);
                  return r;
                }
            "}
        );
    }

    #[test]
    fn cascades_through_helpers_over_several_rounds() {
        let unit = mir::CompilationUnit {
            global_variables: vec![],
            functions: vec![
                function(
                    "inner",
                    &["n"],
                    vec![Statement::Return(Some(Expression::binary(
                        BinaryOperator::Multiply,
                        Expression::temporary("n"),
                        Expression::Constant(2),
                    )))],
                ),
                function(
                    "outer",
                    &["m"],
                    vec![
                        Statement::call(Expression::name("inner"), vec![Expression::temporary("m")], Some("x")),
                        Statement::Return(Some(Expression::temporary("x"))),
                    ],
                ),
                function(
                    "main",
                    &[],
                    vec![
                        Statement::call(Expression::name("outer"), vec![Expression::Constant(21)], Some("r")),
                        Statement::Return(Some(Expression::temporary("r"))),
                    ],
                ),
            ],
        };

        let mut allocator = OptimizationResourceAllocator::new();
        let inlined = optimize_with_inlining(&unit, &mut allocator, &InliningConfiguration::default());

        let Some(main) = inlined.function("main") else {
            panic!("main disappeared");
        };
        assert!(main.body.iter().all(|statement| !matches!(statement, Statement::Call { .. })));
    }

    #[test]
    fn stops_when_nothing_is_cheap_enough() {
        let unit = mir::CompilationUnit {
            global_variables: vec![],
            functions: vec![function(
                "main",
                &[],
                vec![Statement::call(Expression::name("main"), vec![], None)],
            )],
        };

        let mut allocator = OptimizationResourceAllocator::new();
        let configuration = InliningConfiguration {
            inlinable_cost_threshold: 5,
            ..Default::default()
        };

        assert_eq!(optimize_with_inlining(&unit, &mut allocator, &configuration), unit);
    }
}
