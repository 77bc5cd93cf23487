//! Reference semantics for MidIR. Every optimization is checked against the
//! output this interpreter produces.

use std::str::FromStr;

use hashbrown::HashMap;

use crate::middle::{
    mir,
    runtime::{DEFAULT_INSTRUCTION_LIMIT, InterpretationError, Runtime},
};

struct MirInterpreter<'a> {
    functions: HashMap<&'a str, &'a mir::Function>,
    runtime: Runtime,
}

impl<'a> MirInterpreter<'a> {
    fn evaluate(
        &self,
        temporaries: &HashMap<&'a str, i64>,
        expression: &mir::Expression,
    ) -> Result<i64, InterpretationError> {
        match expression {
            mir::Expression::Constant(value) => Ok(*value),
            mir::Expression::Name(name) => Ok(self.runtime.address_of(name)),
            mir::Expression::Temporary(name) => {
                Ok(temporaries.get(name.as_str()).copied().unwrap_or(0))
            }
            mir::Expression::Memory(address) => {
                Ok(self.runtime.read(self.evaluate(temporaries, address)?))
            }
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(temporaries, left)?;
                let right = self.evaluate(temporaries, right)?;

                operator.evaluate(left, right).ok_or_else(|| {
                    InterpretationError::Panic(match operator {
                        mir::BinaryOperator::Modulo => "Mod by zero!".to_owned(),
                        _ => "Division by zero!".to_owned(),
                    })
                })
            }
        }
    }

    fn call(
        &mut self,
        callee: &mir::Expression,
        arguments: Vec<i64>,
        temporaries: &HashMap<&'a str, i64>,
    ) -> Result<i64, InterpretationError> {
        let function_name = match callee {
            mir::Expression::Name(name) => {
                if let Ok(builtin) = mir::Builtin::from_str(name) {
                    return self.runtime.call_builtin(builtin, &arguments);
                }
                name.clone()
            }
            callee => {
                let address = self.evaluate(temporaries, callee)?;
                self.runtime.function_at(address).to_owned()
            }
        };

        let Some(function) = self.functions.get(function_name.as_str()).copied() else {
            internal_error!("call to undefined function '{function_name}'");
        };

        self.run_function(function, arguments)
    }

    fn run_function(
        &mut self,
        function: &'a mir::Function,
        arguments: Vec<i64>,
    ) -> Result<i64, InterpretationError> {
        if arguments.len() != function.parameters.len() {
            internal_error!(
                "'{}' takes {} arguments, but got {}",
                function.name,
                function.parameters.len(),
                arguments.len()
            );
        }

        let labels = function
            .body
            .iter()
            .enumerate()
            .filter_map(|(id, statement)| match statement {
                mir::Statement::Label(label) => Some((label.as_str(), id)),
                _ => None,
            })
            .collect::<HashMap<_, _>>();
        let jump_target = |label: &str| match labels.get(label) {
            Some(id) => *id,
            None => internal_error!("jump to unresolved label '{label}' in '{}'", function.name),
        };

        let mut temporaries = function
            .parameters
            .iter()
            .map(String::as_str)
            .zip(arguments)
            .collect::<HashMap<_, _>>();
        let mut program_counter = 0;

        while let Some(statement) = function.body.get(program_counter) {
            self.runtime.tick()?;
            program_counter += 1;

            match statement {
                mir::Statement::MoveTemporary {
                    destination,
                    source,
                } => {
                    let value = self.evaluate(&temporaries, source)?;
                    temporaries.insert(destination, value);
                }
                mir::Statement::MoveMemory { address, source } => {
                    let address = self.evaluate(&temporaries, address)?;
                    let value = self.evaluate(&temporaries, source)?;
                    self.runtime.write(address, value);
                }
                mir::Statement::Jump(label) => program_counter = jump_target(label.as_str()),
                mir::Statement::Label(_) => {}
                mir::Statement::Call {
                    callee,
                    arguments,
                    collector,
                } => {
                    let arguments = arguments
                        .iter()
                        .map(|argument| self.evaluate(&temporaries, argument))
                        .collect::<Result<Vec<_>, _>>()?;
                    let result = self.call(callee, arguments, &temporaries)?;

                    if let Some(collector) = collector {
                        temporaries.insert(collector, result);
                    }
                }
                mir::Statement::Return(value) => {
                    return match value {
                        Some(value) => self.evaluate(&temporaries, value),
                        None => Ok(0),
                    };
                }
                mir::Statement::ConditionalJumpFallThrough { condition, label } => {
                    if self.evaluate(&temporaries, condition)? != 0 {
                        program_counter = jump_target(label.as_str());
                    }
                }
            }
        }

        Ok(0)
    }
}

/// Runs the program from its main function and returns everything it
/// printed.
pub fn interpret_compilation_unit_with_limit(
    unit: &mir::CompilationUnit,
    instruction_limit: usize,
) -> Result<String, InterpretationError> {
    let functions = unit
        .functions
        .iter()
        .map(|function| (function.name.as_str(), function))
        .collect::<HashMap<_, _>>();
    let main = *functions
        .get(mir::MAIN_FUNCTION_NAME)
        .ok_or(InterpretationError::MissingMain)?;

    let mut interpreter = MirInterpreter {
        runtime: Runtime::new(
            &unit.global_variables,
            unit.functions.iter().map(|function| function.name.as_str()),
            instruction_limit,
        ),
        functions,
    };

    interpreter.run_function(main, vec![])?;
    Ok(interpreter.runtime.into_output())
}

pub fn interpret_compilation_unit(unit: &mir::CompilationUnit) -> Result<String, InterpretationError> {
    interpret_compilation_unit_with_limit(unit, DEFAULT_INSTRUCTION_LIMIT)
}
