//! Instruction selection. Every MidIR expression and statement is tiled by
//! trying the patterns that apply to it and keeping the tiling with the
//! fewest instructions. Results are memoized per function, keyed by the
//! structural MidIR node, so repeated sub-expressions are tiled once.
//!
//! Re-emitting a memoized tiling writes the same abstract registers again.
//! This is sound because expressions have no side effects: the second copy
//! recomputes the same value from the same inputs.

use hashbrown::HashMap;

use crate::{
    backend::asm::{
        ARGUMENT_REGISTERS, ArithmeticOperator, Argument, AssemblyFunction,
        AssemblyResourceAllocator, ConditionCode, Displacement, Instruction, Memory,
        PhysicalRegister, Register, epilogue_label,
    },
    middle::mir::{self, BinaryOperator},
};

const WORD_SIZE: i32 = 8;

#[derive(Debug, Clone)]
struct ExpressionTiling {
    instructions: Vec<Instruction>,
    register: Register,
}

#[derive(Debug, Clone)]
struct OperandTiling {
    instructions: Vec<Instruction>,
    argument: Argument,
}

#[derive(Debug, Clone)]
struct AddressTiling {
    instructions: Vec<Instruction>,
    memory: Memory,
}

fn cost(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .filter(|instruction| !matches!(instruction, Instruction::Comment(_)))
        .count()
}

fn concat(parts: impl IntoIterator<Item = Vec<Instruction>>) -> Vec<Instruction> {
    parts.into_iter().flatten().collect()
}

fn as_immediate(expression: &mir::Expression) -> Option<i32> {
    expression
        .as_constant()
        .and_then(|value| i32::try_from(value).ok())
}

/// Matches `x * s` or `s * x` where `s` is a valid index scale.
fn scaled_index(expression: &mir::Expression) -> Option<(&mir::Expression, u8)> {
    let mir::Expression::Binary {
        operator: BinaryOperator::Multiply,
        left,
        right,
    } = expression
    else {
        return None;
    };

    [(left, right), (right, left)]
        .into_iter()
        .find_map(|(index, scale)| match scale.as_constant() {
            Some(scale @ (1 | 2 | 4 | 8)) => Some((&**index, scale as u8)),
            _ => None,
        })
}

fn condition_code(operator: BinaryOperator) -> Option<ConditionCode> {
    match operator {
        BinaryOperator::LessThan => Some(ConditionCode::L),
        BinaryOperator::LessThanOrEqualTo => Some(ConditionCode::Le),
        BinaryOperator::GreaterThan => Some(ConditionCode::G),
        BinaryOperator::GreaterThanOrEqualTo => Some(ConditionCode::Ge),
        BinaryOperator::Equal => Some(ConditionCode::E),
        BinaryOperator::NotEqual => Some(ConditionCode::Ne),
        _ => None,
    }
}

/// The condition that holds for `right ? left` exactly when `condition`
/// holds for `left ? right`.
fn swapped(condition: ConditionCode) -> ConditionCode {
    match condition {
        ConditionCode::L => ConditionCode::G,
        ConditionCode::Le => ConditionCode::Ge,
        ConditionCode::G => ConditionCode::L,
        ConditionCode::Ge => ConditionCode::Le,
        ConditionCode::E => ConditionCode::E,
        ConditionCode::Ne => ConditionCode::Ne,
    }
}

fn arithmetic_operator(operator: BinaryOperator) -> Option<ArithmeticOperator> {
    match operator {
        BinaryOperator::Add => Some(ArithmeticOperator::Add),
        BinaryOperator::Subtract => Some(ArithmeticOperator::Sub),
        BinaryOperator::Xor => Some(ArithmeticOperator::Xor),
        _ => None,
    }
}

struct FunctionTiler<'a> {
    function_name: &'a str,
    allocator: &'a mut AssemblyResourceAllocator,
    expression_cache: HashMap<mir::Expression, ExpressionTiling>,
    statement_cache: HashMap<mir::Statement, Vec<Instruction>>,
}

impl<'a> FunctionTiler<'a> {
    fn new(function_name: &'a str, allocator: &'a mut AssemblyResourceAllocator) -> Self {
        Self {
            function_name,
            allocator,
            expression_cache: HashMap::new(),
            statement_cache: HashMap::new(),
        }
    }

    /// Labels are only unique within one MidIR function, so they are
    /// qualified with the function name.
    fn label(&self, label: &str) -> String {
        format!("{}_{label}", self.function_name)
    }

    fn cheapest<T>(candidates: Vec<T>, instructions: impl Fn(&T) -> &[Instruction]) -> T {
        match candidates
            .into_iter()
            .min_by_key(|candidate| cost(instructions(candidate)))
        {
            Some(candidate) => candidate,
            None => internal_error!("no tiling candidates"),
        }
    }

    fn tile_expression(&mut self, expression: &mir::Expression) -> ExpressionTiling {
        if let Some(tiling) = self.expression_cache.get(expression) {
            return tiling.clone();
        }

        let tiling = match expression {
            mir::Expression::Temporary(name) => ExpressionTiling {
                instructions: vec![],
                register: Register::abstract_named(name),
            },
            mir::Expression::Constant(value) => {
                let register = self.allocator.allocate_register();
                let instruction = match i32::try_from(*value) {
                    Ok(value) => Instruction::mov(register.clone(), Argument::Constant(value)),
                    Err(_) => Instruction::MoveLong {
                        destination: register.clone(),
                        value: *value,
                    },
                };

                ExpressionTiling {
                    instructions: vec![instruction],
                    register,
                }
            }
            mir::Expression::Name(name) => {
                let register = self.allocator.allocate_register();

                ExpressionTiling {
                    instructions: vec![Instruction::LoadEffectiveAddress {
                        destination: register.clone(),
                        address: Memory::rip_relative(name),
                    }],
                    register,
                }
            }
            mir::Expression::Memory(address) => {
                let address = self.tile_address(address);
                let register = self.allocator.allocate_register();

                ExpressionTiling {
                    instructions: concat([
                        address.instructions,
                        vec![Instruction::mov(register.clone(), address.memory)],
                    ]),
                    register,
                }
            }
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => self.tile_binary(expression, *operator, left, right),
        };

        self.expression_cache
            .insert(expression.clone(), tiling.clone());
        tiling
    }

    /// Tiles an expression into anything an instruction accepts as its source
    /// operand: a 32-bit immediate, a register or a memory operand.
    fn tile_operand(&mut self, expression: &mir::Expression) -> OperandTiling {
        if let Some(value) = as_immediate(expression) {
            return OperandTiling {
                instructions: vec![],
                argument: Argument::Constant(value),
            };
        }

        if let mir::Expression::Memory(address) = expression {
            let address = self.tile_address(address);
            return OperandTiling {
                instructions: address.instructions,
                argument: Argument::Memory(address.memory),
            };
        }

        let tiling = self.tile_expression(expression);
        OperandTiling {
            instructions: tiling.instructions,
            argument: Argument::Register(tiling.register),
        }
    }

    /// Like [`Self::tile_operand`], but never a memory operand.
    fn tile_register_or_immediate(&mut self, expression: &mir::Expression) -> OperandTiling {
        match expression {
            mir::Expression::Memory(_) => {
                let tiling = self.tile_expression(expression);
                OperandTiling {
                    instructions: tiling.instructions,
                    argument: Argument::Register(tiling.register),
                }
            }
            _ => self.tile_operand(expression),
        }
    }

    /// Like [`Self::tile_operand`], but never an immediate.
    fn tile_register_or_memory(&mut self, expression: &mir::Expression) -> OperandTiling {
        let operand = self.tile_operand(expression);
        match operand.argument {
            Argument::Constant(value) => {
                let register = self.allocator.allocate_register();
                OperandTiling {
                    instructions: vec![Instruction::mov(register.clone(), Argument::Constant(value))],
                    argument: Argument::Register(register),
                }
            }
            _ => operand,
        }
    }

    fn tile_address(&mut self, expression: &mir::Expression) -> AddressTiling {
        let mut candidates = self.address_patterns(expression);

        let base = self.tile_expression(expression);
        candidates.push(AddressTiling {
            instructions: base.instructions,
            memory: Memory::base(base.register),
        });

        Self::cheapest(candidates, |candidate| &candidate.instructions)
    }

    /// Addressing modes beyond a plain base register.
    fn address_patterns(&mut self, expression: &mir::Expression) -> Vec<AddressTiling> {
        let mut candidates = Vec::new();

        let mir::Expression::Binary {
            operator,
            left,
            right,
        } = expression
        else {
            return candidates;
        };

        match operator {
            BinaryOperator::Add => {
                for (base, offset) in [(left, right), (right, left)] {
                    if let Some(offset) = as_immediate(offset) {
                        let base = self.tile_expression(base);
                        candidates.push(AddressTiling {
                            instructions: base.instructions,
                            memory: Memory::base_offset(base.register, offset),
                        });
                    }
                }

                for (base, scaled) in [(left, right), (right, left)] {
                    if let Some(tiling) = self.base_and_index(base, scaled, None) {
                        candidates.push(tiling);
                    }
                }

                if as_immediate(left).is_none() && as_immediate(right).is_none() {
                    let base = self.tile_expression(left);
                    let index = self.tile_expression(right);
                    candidates.push(AddressTiling {
                        instructions: concat([base.instructions, index.instructions]),
                        memory: Memory {
                            base: Some(base.register),
                            index: Some((index.register, 1)),
                            displacement: None,
                        },
                    });
                }

                for (inner, offset) in [(left, right), (right, left)] {
                    let Some(offset) = as_immediate(offset) else {
                        continue;
                    };

                    if let Some((index, scale)) = scaled_index(inner) {
                        let index = self.tile_expression(index);
                        candidates.push(AddressTiling {
                            instructions: index.instructions,
                            memory: Memory {
                                base: None,
                                index: Some((index.register, scale)),
                                displacement: Some(Displacement::Constant(offset)),
                            },
                        });
                    }

                    if let mir::Expression::Binary {
                        operator: BinaryOperator::Add,
                        left: inner_left,
                        right: inner_right,
                    } = &**inner
                    {
                        for (base, scaled) in [(inner_left, inner_right), (inner_right, inner_left)] {
                            if let Some(tiling) = self.base_and_index(base, scaled, Some(offset)) {
                                candidates.push(tiling);
                            }
                        }
                    }
                }
            }
            BinaryOperator::Subtract => {
                let offset = right
                    .as_constant()
                    .and_then(i64::checked_neg)
                    .and_then(|offset| i32::try_from(offset).ok());

                if let Some(offset) = offset {
                    let base = self.tile_expression(left);
                    candidates.push(AddressTiling {
                        instructions: base.instructions,
                        memory: Memory::base_offset(base.register, offset),
                    });
                }
            }
            _ => {}
        }

        candidates
    }

    fn base_and_index(
        &mut self,
        base: &mir::Expression,
        scaled: &mir::Expression,
        offset: Option<i32>,
    ) -> Option<AddressTiling> {
        let (index, scale) = scaled_index(scaled)?;
        let base = self.tile_expression(base);
        let index = self.tile_expression(index);

        Some(AddressTiling {
            instructions: concat([base.instructions, index.instructions]),
            memory: Memory {
                base: Some(base.register),
                index: Some((index.register, scale)),
                displacement: offset.map(Displacement::Constant),
            },
        })
    }

    fn tile_binary(
        &mut self,
        expression: &mir::Expression,
        operator: BinaryOperator,
        left: &mir::Expression,
        right: &mir::Expression,
    ) -> ExpressionTiling {
        let mut candidates = Vec::new();

        if let Some(arithmetic) = arithmetic_operator(operator) {
            candidates.push(self.tile_arithmetic(arithmetic, left, right));
            if operator.is_commutative() {
                candidates.push(self.tile_arithmetic(arithmetic, right, left));
            }

            for address in self.address_patterns(expression) {
                let register = self.allocator.allocate_register();
                candidates.push(ExpressionTiling {
                    instructions: concat([
                        address.instructions,
                        vec![Instruction::LoadEffectiveAddress {
                            destination: register.clone(),
                            address: address.memory,
                        }],
                    ]),
                    register,
                });
            }
        }

        if operator == BinaryOperator::Multiply {
            candidates.push(self.tile_multiply(left, right));
            candidates.push(self.tile_multiply(right, left));

            for (value, factor) in [(left, right), (right, left)] {
                if let Some(tiling) = self.tile_shift(value, factor) {
                    candidates.push(tiling);
                }
            }
        }

        if operator.is_division() {
            candidates.push(self.tile_division(operator, left, right));
        }

        if let Some(condition) = condition_code(operator) {
            candidates.push(self.tile_comparison(condition, left, right));
            candidates.push(self.tile_comparison(swapped(condition), right, left));
        }

        Self::cheapest(candidates, |candidate| &candidate.instructions)
    }

    fn tile_arithmetic(
        &mut self,
        operator: ArithmeticOperator,
        left: &mir::Expression,
        right: &mir::Expression,
    ) -> ExpressionTiling {
        let left = self.tile_expression(left);
        let right = self.tile_operand(right);
        let register = self.allocator.allocate_register();

        ExpressionTiling {
            instructions: concat([
                left.instructions,
                right.instructions,
                vec![
                    Instruction::mov(register.clone(), left.register),
                    Instruction::Arithmetic {
                        operator,
                        destination: register.clone().into(),
                        source: right.argument,
                    },
                ],
            ]),
            register,
        }
    }

    fn tile_multiply(&mut self, left: &mir::Expression, right: &mir::Expression) -> ExpressionTiling {
        let left = self.tile_expression(left);
        let register = self.allocator.allocate_register();

        if let Some(immediate) = as_immediate(right) {
            return ExpressionTiling {
                instructions: concat([
                    left.instructions,
                    vec![Instruction::Multiply {
                        destination: register.clone(),
                        source: left.register.into(),
                        immediate: Some(immediate),
                    }],
                ]),
                register,
            };
        }

        let right = self.tile_register_or_memory(right);

        ExpressionTiling {
            instructions: concat([
                left.instructions,
                right.instructions,
                vec![
                    Instruction::mov(register.clone(), left.register),
                    Instruction::Multiply {
                        destination: register.clone(),
                        source: right.argument,
                        immediate: None,
                    },
                ],
            ]),
            register,
        }
    }

    fn tile_shift(&mut self, value: &mir::Expression, factor: &mir::Expression) -> Option<ExpressionTiling> {
        let factor = factor.as_constant()?;
        if factor <= 1 || factor.count_ones() != 1 {
            return None;
        }

        let value = self.tile_expression(value);
        let register = self.allocator.allocate_register();

        Some(ExpressionTiling {
            instructions: concat([
                value.instructions,
                vec![
                    Instruction::mov(register.clone(), value.register),
                    Instruction::ShiftLeft {
                        destination: register.clone(),
                        count: factor.trailing_zeros() as u8,
                    },
                ],
            ]),
            register,
        })
    }

    fn tile_division(
        &mut self,
        operator: BinaryOperator,
        left: &mir::Expression,
        right: &mir::Expression,
    ) -> ExpressionTiling {
        let left = self.tile_expression(left);
        let divisor = self.tile_register_or_memory(right);
        let register = self.allocator.allocate_register();
        let result = match operator {
            BinaryOperator::Modulo => PhysicalRegister::Rdx,
            _ => PhysicalRegister::Rax,
        };

        ExpressionTiling {
            instructions: concat([
                left.instructions,
                divisor.instructions,
                vec![
                    Instruction::mov(PhysicalRegister::Rax, left.register),
                    Instruction::Cqo,
                    Instruction::Divide(divisor.argument),
                    Instruction::mov(register.clone(), result),
                ],
            ]),
            register,
        }
    }

    fn tile_comparison(
        &mut self,
        condition: ConditionCode,
        left: &mir::Expression,
        right: &mir::Expression,
    ) -> ExpressionTiling {
        let mut instructions = self.tile_compare(left, right);
        let register = self.allocator.allocate_register();
        instructions.push(Instruction::SetOnCondition {
            condition,
            destination: register.clone(),
        });

        ExpressionTiling {
            instructions,
            register,
        }
    }

    fn tile_compare(&mut self, left: &mir::Expression, right: &mir::Expression) -> Vec<Instruction> {
        let left = self.tile_expression(left);
        let right = self.tile_operand(right);

        concat([
            left.instructions,
            right.instructions,
            vec![Instruction::Compare {
                left: left.register.into(),
                right: right.argument,
            }],
        ])
    }

    fn tile_statement(&mut self, statement: &mir::Statement) -> Vec<Instruction> {
        if let Some(instructions) = self.statement_cache.get(statement) {
            return instructions.clone();
        }

        let mut instructions = match statement {
            mir::Statement::Label(_) => vec![],
            _ => vec![Instruction::comment(statement.to_string())],
        };

        instructions.extend(match statement {
            mir::Statement::MoveTemporary {
                destination,
                source,
            } => self.tile_move_temporary(destination, source),
            mir::Statement::MoveMemory { address, source } => {
                let address = self.tile_address(address);
                let source = self.tile_register_or_immediate(source);

                concat([
                    address.instructions,
                    source.instructions,
                    vec![Instruction::MoveToMemory {
                        destination: address.memory,
                        source: source.argument,
                    }],
                ])
            }
            mir::Statement::Jump(label) => vec![Instruction::jump(self.label(label))],
            mir::Statement::Label(label) => vec![Instruction::label(self.label(label))],
            mir::Statement::ConditionalJumpFallThrough { condition, label } => {
                self.tile_conditional_jump(condition, label)
            }
            mir::Statement::Return(value) => {
                let mut instructions = match value {
                    Some(value) => {
                        let value = self.tile_operand(value);
                        concat([
                            value.instructions,
                            vec![Instruction::mov(PhysicalRegister::Rax, value.argument)],
                        ])
                    }
                    None => vec![],
                };
                instructions.push(Instruction::jump(epilogue_label(self.function_name)));
                instructions
            }
            mir::Statement::Call {
                callee,
                arguments,
                collector,
            } => self.tile_call(callee, arguments, collector.as_deref()),
        });

        self.statement_cache
            .insert(statement.clone(), instructions.clone());
        instructions
    }

    fn tile_move_temporary(&mut self, destination: &str, source: &mir::Expression) -> Vec<Instruction> {
        let register = Register::abstract_named(destination);
        let mut candidates = Vec::new();

        let operand = self.tile_operand(source);
        let mut instructions = operand.instructions;
        if operand.argument != Argument::Register(register.clone()) {
            instructions.push(Instruction::mov(register.clone(), operand.argument));
        }
        candidates.push(instructions);

        // `x = x op e` updates `x` in place
        if let mir::Expression::Binary {
            operator,
            left,
            right,
        } = source
        {
            let mut pairs = vec![(left, right)];
            if operator.is_commutative() {
                pairs.push((right, left));
            }

            for (target, value) in pairs {
                let Some(arithmetic) = arithmetic_operator(*operator) else {
                    break;
                };
                if !matches!(&**target, mir::Expression::Temporary(name) if name == destination) {
                    continue;
                }

                let value = self.tile_operand(value);
                candidates.push(concat([
                    value.instructions,
                    vec![Instruction::Arithmetic {
                        operator: arithmetic,
                        destination: register.clone().into(),
                        source: value.argument,
                    }],
                ]));
            }
        }

        Self::cheapest(candidates, |candidate| candidate)
    }

    fn tile_conditional_jump(&mut self, condition: &mir::Expression, label: &str) -> Vec<Instruction> {
        let label = self.label(label);

        let comparison = match condition {
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => condition_code(*operator).map(|code| (code, left, right)),
            _ => None,
        };

        if let Some((code, left, right)) = comparison {
            let candidates = vec![
                (self.tile_compare(left, right), code),
                (self.tile_compare(right, left), swapped(code)),
            ];
            let (mut instructions, code) =
                Self::cheapest(candidates, |(instructions, _)| instructions);
            instructions.push(Instruction::Jump {
                condition: Some(code),
                label,
            });
            return instructions;
        }

        let value = self.tile_expression(condition);
        concat([
            value.instructions,
            vec![
                Instruction::Compare {
                    left: value.register.into(),
                    right: Argument::Constant(0),
                },
                Instruction::Jump {
                    condition: Some(ConditionCode::Ne),
                    label,
                },
            ],
        ])
    }

    fn tile_call(
        &mut self,
        callee: &mir::Expression,
        arguments: &[mir::Expression],
        collector: Option<&str>,
    ) -> Vec<Instruction> {
        let target = match callee {
            mir::Expression::Name(name) => OperandTiling {
                instructions: vec![],
                argument: Argument::Name(name.clone()),
            },
            callee => self.tile_register_or_memory(callee),
        };

        // Every argument is evaluated before any argument register is
        // written, since division clobbers rax and rdx.
        let arguments = arguments
            .iter()
            .map(|argument| self.tile_operand(argument))
            .collect::<Vec<_>>();

        let mut instructions = target.instructions;
        for argument in &arguments {
            instructions.extend(argument.instructions.iter().cloned());
        }

        for (register, argument) in ARGUMENT_REGISTERS.iter().zip(&arguments) {
            instructions.push(Instruction::mov(*register, argument.argument.clone()));
        }

        let stack_arguments = arguments.get(ARGUMENT_REGISTERS.len()..).unwrap_or_default();
        let padding = stack_arguments.len() % 2;

        if padding != 0 {
            instructions.push(Instruction::Arithmetic {
                operator: ArithmeticOperator::Sub,
                destination: PhysicalRegister::Rsp.into(),
                source: Argument::Constant(WORD_SIZE),
            });
        }

        for argument in stack_arguments.iter().rev() {
            instructions.push(Instruction::Push(argument.argument.clone()));
        }

        instructions.push(Instruction::Call {
            target: target.argument,
            argument_count: arguments.len(),
        });

        if !stack_arguments.is_empty() {
            instructions.push(Instruction::Arithmetic {
                operator: ArithmeticOperator::Add,
                destination: PhysicalRegister::Rsp.into(),
                source: Argument::Constant(WORD_SIZE * (stack_arguments.len() + padding) as i32),
            });
        }

        if let Some(collector) = collector {
            instructions.push(Instruction::mov(
                Register::abstract_named(collector),
                PhysicalRegister::Rax,
            ));
        }

        instructions
    }
}

/// Tiles one function into abstract assembly. The body starts by moving the
/// parameters out of their calling convention locations and ends with the
/// epilogue label that every return jumps to.
pub fn tile_function(
    function: &mir::Function,
    allocator: &mut AssemblyResourceAllocator,
) -> AssemblyFunction {
    let mut tiler = FunctionTiler::new(&function.name, allocator);
    let mut instructions = Vec::new();

    for (index, parameter) in function.parameters.iter().enumerate() {
        let source = match ARGUMENT_REGISTERS.get(index) {
            Some(register) => Argument::from(*register),
            None => Argument::Memory(Memory::base_offset(
                PhysicalRegister::Rbp,
                2 * WORD_SIZE + WORD_SIZE * (index - ARGUMENT_REGISTERS.len()) as i32,
            )),
        };

        instructions.push(Instruction::mov(Register::abstract_named(parameter), source));
    }

    for statement in &function.body {
        instructions.extend(tiler.tile_statement(statement));
    }

    instructions.push(Instruction::label(epilogue_label(&function.name)));

    AssemblyFunction {
        name: function.name.clone(),
        instructions,
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::mir::{Expression, Function, Statement};

    fn function(parameters: &[&str], body: Vec<Statement>) -> Function {
        Function {
            name: "f".to_owned(),
            parameters: parameters.iter().map(|parameter| parameter.to_string()).collect(),
            body,
            has_return: true,
        }
    }

    fn tile(function: &Function) -> String {
        tile_function(function, &mut AssemblyResourceAllocator::new()).to_string()
    }

    #[test]
    fn tiles_parameters_and_returns() {
        let function = function(
            &["a", "b"],
            vec![Statement::Return(Some(Expression::binary(
                BinaryOperator::Add,
                Expression::temporary("a"),
                Expression::temporary("b"),
            )))],
        );

        assert_eq!(
            tile(&function),
            indoc! {"
                  mov a, rdi
                  mov b, rsi
                  ## return (a + b);
                  lea _ABSTRACT_REG_2, [a + b]
                  mov rax, _ABSTRACT_REG_2
                  jmp LABEL_FUNCTION_CALL_EPILOGUE_FOR_f
                LABEL_FUNCTION_CALL_EPILOGUE_FOR_f:
            "}
        );
    }

    #[test]
    fn updates_temporaries_in_place() {
        let function = function(
            &["x"],
            vec![
                Statement::move_temporary(
                    "x",
                    Expression::binary(BinaryOperator::Subtract, Expression::temporary("x"), Expression::Constant(3)),
                ),
                Statement::Return(Some(Expression::temporary("x"))),
            ],
        );

        assert_eq!(
            tile(&function),
            indoc! {"
                  mov x, rdi
                  ## x = (x - 3);
                  sub x, 3
                  ## return x;
                  mov rax, x
                  jmp LABEL_FUNCTION_CALL_EPILOGUE_FOR_f
                LABEL_FUNCTION_CALL_EPILOGUE_FOR_f:
            "}
        );
    }

    #[test]
    fn folds_addresses_into_memory_operands() {
        let address = Expression::binary(
            BinaryOperator::Add,
            Expression::binary(
                BinaryOperator::Add,
                Expression::temporary("base"),
                Expression::binary(BinaryOperator::Multiply, Expression::temporary("i"), Expression::Constant(8)),
            ),
            Expression::Constant(16),
        );
        let function = function(
            &["base", "i"],
            vec![Statement::move_memory(address, Expression::Constant(7))],
        );

        assert!(tile(&function).contains("mov qword ptr [base + i*8 + 16], 7\n"));
    }

    #[test]
    fn tiles_division_through_rax() {
        let function = function(
            &["a", "b"],
            vec![Statement::Return(Some(Expression::binary(
                BinaryOperator::Modulo,
                Expression::temporary("a"),
                Expression::temporary("b"),
            )))],
        );

        assert!(
            tile(&function).contains("  mov rax, a\n  cqo\n  idiv b\n  mov _ABSTRACT_REG_0, rdx\n")
        );
    }

    #[test]
    fn tiles_multiplication_by_powers_of_two_as_shifts() {
        let multiplied = function(
            &["a"],
            vec![Statement::Return(Some(Expression::binary(
                BinaryOperator::Multiply,
                Expression::temporary("a"),
                Expression::Constant(100),
            )))],
        );
        let shifted = function(
            &["a"],
            vec![Statement::Return(Some(Expression::binary(
                BinaryOperator::Multiply,
                Expression::Constant(1 << 40),
                Expression::binary(BinaryOperator::Xor, Expression::temporary("a"), Expression::Constant(1)),
            )))],
        );

        assert!(tile(&multiplied).contains("imul _ABSTRACT_REG_0, a, 100\n"));

        let shifted = tile(&shifted);
        assert!(shifted.contains("shl "));
        assert!(shifted.contains(", 40\n"));
        assert!(!shifted.contains("imul"));
    }

    #[test]
    fn tiles_comparisons_in_conditional_jumps() {
        let function = function(
            &["n"],
            vec![
                Statement::conditional_jump(
                    Expression::binary(BinaryOperator::LessThan, Expression::Constant(5), Expression::temporary("n")),
                    "BIG",
                ),
                Statement::Return(Some(Expression::Constant(0))),
                Statement::label("BIG"),
                Statement::Return(Some(Expression::Constant(1))),
            ],
        );

        assert_eq!(
            tile(&function),
            indoc! {"
                  mov n, rdi
                  ## if ((5 < n)) goto BIG;
                  cmp n, 5
                  jg f_BIG
                  ## return 0;
                  mov rax, 0
                  jmp LABEL_FUNCTION_CALL_EPILOGUE_FOR_f
                f_BIG:
                  ## return 1;
                  mov rax, 1
                  jmp LABEL_FUNCTION_CALL_EPILOGUE_FOR_f
                LABEL_FUNCTION_CALL_EPILOGUE_FOR_f:
            "}
        );
    }

    #[test]
    fn passes_extra_arguments_on_an_aligned_stack() {
        let arguments = (0..7).map(Expression::Constant).collect::<Vec<_>>();
        let function = function(
            &[],
            vec![Statement::call(Expression::name("g"), arguments, Some("r"))],
        );

        assert!(tile(&function).contains(
            "  mov r9, 5\n  sub rsp, 8\n  push 6\n  call g\n  add rsp, 16\n  mov r, rax\n"
        ));
    }
}
