//! Turns self-calls in tail position into jumps back to the function start.

use crate::middle::{mir, optimization::simple::optimize_with_simple_optimization};

fn start_label(function_name: &str) -> String {
    format!("LABEL_TAIL_REC_OPTIMIZATION_FOR_{function_name}")
}

fn argument_temporary(index: usize) -> String {
    format!("_OPT_TAIL_REC_ARG_TEMP_{index}")
}

/// Whether the value collected by a call at `after - 1` reaches a `return`
/// unchanged. Only labels and moves that forward the value from one
/// temporary to the next may sit in between.
fn returns_call_result(body: &[mir::Statement], after: usize, collector: Option<&str>) -> bool {
    let mut current = collector;

    for statement in &body[after..] {
        match statement {
            mir::Statement::Label(_) => {}
            mir::Statement::MoveTemporary {
                destination,
                source: mir::Expression::Temporary(source),
            } if current == Some(source.as_str()) => current = Some(destination.as_str()),
            mir::Statement::Return(None) => return true,
            mir::Statement::Return(Some(mir::Expression::Temporary(returned))) => {
                return current == Some(returned.as_str());
            }
            _ => return false,
        }
    }

    false
}

pub fn optimize_with_tail_recursion(function: &mir::Function) -> mir::Function {
    let label = start_label(&function.name);
    let mut body = vec![mir::Statement::Label(label.clone())];
    let mut rewritten = false;

    for (id, statement) in function.body.iter().enumerate() {
        let tail_call_arguments = match statement {
            mir::Statement::Call {
                callee: mir::Expression::Name(callee),
                arguments,
                collector,
            } if *callee == function.name
                && arguments.len() == function.parameters.len()
                && returns_call_result(&function.body, id + 1, collector.as_deref()) =>
            {
                Some(arguments)
            }
            _ => None,
        };

        let Some(arguments) = tail_call_arguments else {
            body.push(statement.clone());
            continue;
        };

        // Arguments may read parameters, so evaluate all of them before
        // overwriting any parameter.
        for (index, argument) in arguments.iter().enumerate() {
            body.push(mir::Statement::move_temporary(argument_temporary(index), argument.clone()));
        }
        for (index, parameter) in function.parameters.iter().enumerate() {
            body.push(mir::Statement::move_temporary(
                parameter.as_str(),
                mir::Expression::Temporary(argument_temporary(index)),
            ));
        }
        body.push(mir::Statement::Jump(label.clone()));
        rewritten = true;
    }

    if !rewritten {
        return function.clone();
    }

    function.with_body(optimize_with_simple_optimization(&body))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Function, Statement};

    fn factorial(name: &str, tail: Vec<Statement>) -> Function {
        let mut body = vec![
            Statement::conditional_jump(
                Expression::binary(BinaryOperator::Equal, Expression::temporary("n"), Expression::Constant(0)),
                "LABEL_RETURN_ACC",
            ),
            Statement::call(
                Expression::name(name),
                vec![
                    Expression::binary(BinaryOperator::Subtract, Expression::temporary("n"), Expression::Constant(1)),
                    Expression::binary(BinaryOperator::Multiply, Expression::temporary("acc"), Expression::temporary("n")),
                ],
                Some("dummy"),
            ),
        ];
        body.extend(tail);
        body.push(Statement::label("LABEL_RETURN_ACC"));
        body.push(Statement::Return(Some(Expression::temporary("acc"))));

        Function {
            name: name.to_owned(),
            parameters: vec!["n".to_owned(), "acc".to_owned()],
            body,
            has_return: true,
        }
    }

    const REWRITTEN_FACTORIAL: &str = indoc! {"
        function f {
          let n = _ARG0;
          let acc = _ARG1;

          LABEL_TAIL_REC_OPTIMIZATION_FOR_f:
          if ((n == 0)) goto LABEL_RETURN_ACC;
          _OPT_TAIL_REC_ARG_TEMP_0 = (n - 1);
          _OPT_TAIL_REC_ARG_TEMP_1 = (acc * n);
          n = _OPT_TAIL_REC_ARG_TEMP_0;
          acc = _OPT_TAIL_REC_ARG_TEMP_1;
          goto LABEL_TAIL_REC_OPTIMIZATION_FOR_f;
          LABEL_RETURN_ACC:
          return acc;
        }
    "};

    #[test]
    fn rewrites_direct_tail_call() {
        let function = factorial("f", vec![Statement::Return(Some(Expression::temporary("dummy")))]);

        assert_eq!(optimize_with_tail_recursion(&function).to_string(), REWRITTEN_FACTORIAL);
    }

    #[test]
    fn rewrites_tail_call_followed_by_empty_return() {
        let function = factorial("f", vec![Statement::Return(None)]);

        assert_eq!(optimize_with_tail_recursion(&function).to_string(), REWRITTEN_FACTORIAL);
    }

    #[test]
    fn follows_forwarding_moves() {
        let function = factorial(
            "f",
            vec![
                Statement::move_temporary("a", Expression::temporary("dummy")),
                Statement::move_temporary("b", Expression::temporary("a")),
                Statement::label("SKIPPED"),
                Statement::move_temporary("c", Expression::temporary("b")),
                Statement::Return(Some(Expression::temporary("c"))),
            ],
        );

        assert_eq!(optimize_with_tail_recursion(&function).to_string(), REWRITTEN_FACTORIAL);
    }

    #[test]
    fn leaves_non_tail_calls_alone() {
        let cases = vec![
            vec![
                Statement::move_temporary("dummy", Expression::temporary("garbage")),
                Statement::Return(Some(Expression::temporary("dummy"))),
            ],
            vec![Statement::Return(Some(Expression::temporary("garbage")))],
            vec![Statement::Return(Some(Expression::Constant(0)))],
            vec![Statement::jump("LABEL_RETURN_ACC")],
        ];

        for tail in cases {
            let function = factorial("f", tail);
            assert_eq!(optimize_with_tail_recursion(&function), function);
        }
    }

    #[test]
    fn leaves_calls_to_other_functions_alone() {
        let function = factorial("f", vec![Statement::Return(Some(Expression::temporary("dummy")))]);
        let function = Function {
            name: "g".to_owned(),
            ..function
        };

        assert_eq!(optimize_with_tail_recursion(&function), function);
    }

    #[test]
    fn turns_endless_recursion_into_loop() {
        let function = Function {
            name: "forever".to_owned(),
            parameters: vec![],
            body: vec![
                Statement::call(Expression::name("forever"), vec![], None),
                Statement::label("unused"),
                Statement::Return(None),
            ],
            has_return: false,
        };

        assert_eq!(
            optimize_with_tail_recursion(&function).to_string(),
            indoc! {"
                function forever {
                  LABEL_TAIL_REC_OPTIMIZATION_FOR_forever:
                  goto LABEL_TAIL_REC_OPTIMIZATION_FOR_forever;
                }
            "}
        );
    }
}
