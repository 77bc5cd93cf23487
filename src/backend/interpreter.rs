//! Executes finalized assembly programs over the same runtime model as the
//! MidIR interpreter, so both can be compared on the same program.

use std::str::FromStr;

use hashbrown::HashMap;

use crate::{
    backend::asm::{
        Argument, AssemblyProgram, CALLER_SAVED_REGISTERS, ConditionCode, Displacement,
        Instruction, Memory, PhysicalRegister, Register,
    },
    middle::{
        mir,
        runtime::{DEFAULT_INSTRUCTION_LIMIT, InterpretationError, Runtime},
    },
};

const STACK_TOP: i64 = 0x7800_0000;
const WORD_SIZE: i64 = 8;
/// Return address of the outermost frame. Returning to it ends the program.
const RETURN_SENTINEL: i64 = -1;
/// Written to the caller-saved registers a builtin does not return in.
const CLOBBERED_VALUE: i64 = 0x5ca1_ab1e;

struct AssemblyInterpreter<'a> {
    instructions: Vec<&'a Instruction>,
    labels: HashMap<&'a str, usize>,
    registers: HashMap<Register, i64>,
    /// Operands of the last `cmp`.
    flags: Option<(i64, i64)>,
    runtime: Runtime,
}

impl<'a> AssemblyInterpreter<'a> {
    fn new(program: &'a AssemblyProgram, instruction_limit: usize) -> Self {
        let instructions = program
            .functions
            .iter()
            .flat_map(|function| function.instructions.iter())
            .collect::<Vec<_>>();

        let mut labels = HashMap::new();
        for (id, instruction) in instructions.iter().copied().enumerate() {
            if let Instruction::Label(label) = instruction {
                if labels.insert(label.as_str(), id).is_some() {
                    internal_error!("label '{label}' is defined more than once");
                }
            }
        }

        Self {
            instructions,
            labels,
            registers: HashMap::new(),
            flags: None,
            runtime: Runtime::new(
                &program.global_variables,
                program.functions.iter().map(|function| function.name.as_str()),
                instruction_limit,
            ),
        }
    }

    fn label(&self, label: &str) -> usize {
        match self.labels.get(label) {
            Some(id) => *id,
            None => internal_error!("jump to unresolved label '{label}'"),
        }
    }

    fn register(&self, register: impl Into<Register>) -> i64 {
        let register = register.into();
        self.registers.get(&register).copied().unwrap_or(0)
    }

    fn set_register(&mut self, register: impl Into<Register>, value: i64) {
        self.registers.insert(register.into(), value);
    }

    fn address(&self, memory: &Memory) -> i64 {
        let base = match &memory.base {
            Some(Register::Physical(PhysicalRegister::Rip)) | None => 0,
            Some(base) => self.register(base.clone()),
        };
        let index = memory.index.as_ref().map_or(0, |(index, scale)| {
            self.register(index.clone()).wrapping_mul(i64::from(*scale))
        });
        let displacement = match &memory.displacement {
            Some(Displacement::Constant(offset)) => i64::from(*offset),
            Some(Displacement::Name(name)) => self.runtime.address_of(name),
            None => 0,
        };

        base.wrapping_add(index).wrapping_add(displacement)
    }

    fn value(&self, argument: &Argument) -> i64 {
        match argument {
            Argument::Constant(value) => i64::from(*value),
            Argument::Name(name) => self.runtime.address_of(name),
            Argument::Register(register) => self.register(register.clone()),
            Argument::Memory(memory) => self.runtime.read(self.address(memory)),
        }
    }

    fn store(&mut self, argument: &Argument, value: i64) {
        match argument {
            Argument::Register(register) => self.set_register(register.clone(), value),
            Argument::Memory(memory) => {
                let address = self.address(memory);
                self.runtime.write(address, value);
            }
            Argument::Constant(_) | Argument::Name(_) => {
                internal_error!("cannot write to '{argument}'")
            }
        }
    }

    fn push(&mut self, value: i64) {
        let stack_pointer = self.register(PhysicalRegister::Rsp) - WORD_SIZE;
        self.set_register(PhysicalRegister::Rsp, stack_pointer);
        self.runtime.write(stack_pointer, value);
    }

    fn pop(&mut self) -> i64 {
        let stack_pointer = self.register(PhysicalRegister::Rsp);
        self.set_register(PhysicalRegister::Rsp, stack_pointer + WORD_SIZE);
        self.runtime.read(stack_pointer)
    }

    fn condition_holds(&self, condition: ConditionCode) -> bool {
        match self.flags {
            Some((left, right)) => condition.holds(left, right),
            None => internal_error!("'{condition}' condition tested before any comparison"),
        }
    }

    /// Returns the instruction to continue at.
    fn call(&mut self, target: &Argument, return_address: usize) -> Result<usize, InterpretationError> {
        if self.register(PhysicalRegister::Rsp) % 16 != 0 {
            internal_error!("call with a misaligned stack");
        }

        let name = match target {
            Argument::Name(name) => name.clone(),
            target => {
                let address = self.value(target);
                self.runtime.function_at(address).to_owned()
            }
        };

        if let Ok(builtin) = mir::Builtin::from_str(&name) {
            let arguments = match builtin {
                mir::Builtin::StringConcat => vec![
                    self.register(PhysicalRegister::Rdi),
                    self.register(PhysicalRegister::Rsi),
                ],
                _ => vec![self.register(PhysicalRegister::Rdi)],
            };
            let result = self.runtime.call_builtin(builtin, &arguments)?;
            for register in CALLER_SAVED_REGISTERS {
                self.set_register(register, CLOBBERED_VALUE);
            }
            self.set_register(PhysicalRegister::Rax, result);
            return Ok(return_address);
        }

        self.push(return_address as i64);
        Ok(self.label(&name))
    }

    fn run(&mut self) -> Result<(), InterpretationError> {
        let mut program_counter = *self
            .labels
            .get(mir::MAIN_FUNCTION_NAME)
            .ok_or(InterpretationError::MissingMain)?;

        self.set_register(PhysicalRegister::Rsp, STACK_TOP);
        self.push(RETURN_SENTINEL);

        loop {
            let Some(instruction) = self.instructions.get(program_counter).copied() else {
                internal_error!("execution ran past the last instruction");
            };

            self.runtime.tick()?;
            program_counter += 1;

            match instruction {
                Instruction::MoveLong { destination, value } => {
                    self.set_register(destination.clone(), *value)
                }
                Instruction::MoveToRegister {
                    destination,
                    source,
                } => {
                    let value = self.value(source);
                    self.set_register(destination.clone(), value);
                }
                Instruction::MoveToMemory {
                    destination,
                    source,
                } => {
                    let address = self.address(destination);
                    let value = self.value(source);
                    self.runtime.write(address, value);
                }
                Instruction::LoadEffectiveAddress {
                    destination,
                    address,
                } => {
                    let address = self.address(address);
                    self.set_register(destination.clone(), address);
                }
                Instruction::Compare { left, right } => {
                    self.flags = Some((self.value(left), self.value(right)))
                }
                Instruction::SetOnCondition {
                    condition,
                    destination,
                } => {
                    let value = self.condition_holds(*condition) as i64;
                    self.set_register(destination.clone(), value);
                }
                Instruction::Jump {
                    condition: None,
                    label,
                } => program_counter = self.label(label),
                Instruction::Jump {
                    condition: Some(condition),
                    label,
                } => {
                    if self.condition_holds(*condition) {
                        program_counter = self.label(label);
                    }
                }
                Instruction::Call { target, .. } => {
                    program_counter = self.call(target, program_counter)?
                }
                Instruction::Return => {
                    let return_address = self.pop();
                    if return_address == RETURN_SENTINEL {
                        return Ok(());
                    }
                    program_counter = return_address as usize;
                }
                Instruction::Arithmetic {
                    operator,
                    destination,
                    source,
                } => {
                    let value = operator.apply(self.value(destination), self.value(source));
                    self.store(destination, value);
                }
                Instruction::Multiply {
                    destination,
                    source,
                    immediate,
                } => {
                    let value = match immediate {
                        Some(immediate) => self.value(source).wrapping_mul(i64::from(*immediate)),
                        None => self
                            .register(destination.clone())
                            .wrapping_mul(self.value(source)),
                    };
                    self.set_register(destination.clone(), value);
                }
                Instruction::ShiftLeft { destination, count } => {
                    let value = self
                        .register(destination.clone())
                        .wrapping_shl(u32::from(*count));
                    self.set_register(destination.clone(), value);
                }
                Instruction::Cqo => {
                    let sign = if self.register(PhysicalRegister::Rax) < 0 { -1 } else { 0 };
                    self.set_register(PhysicalRegister::Rdx, sign);
                }
                Instruction::Divide(divisor) => {
                    let divisor = self.value(divisor);
                    if divisor == 0 {
                        return Err(InterpretationError::Panic("Division by zero!".to_owned()));
                    }

                    let dividend = self.register(PhysicalRegister::Rax);
                    self.set_register(PhysicalRegister::Rax, dividend.wrapping_div(divisor));
                    self.set_register(PhysicalRegister::Rdx, dividend.wrapping_rem(divisor));
                }
                Instruction::Push(argument) => {
                    let value = self.value(argument);
                    self.push(value);
                }
                Instruction::Pop(register) => {
                    let value = self.pop();
                    self.set_register(register.clone(), value);
                }
                Instruction::Label(_) | Instruction::Comment(_) => {}
            }
        }
    }
}

/// Runs a finalized program from its main function and returns everything it
/// printed.
pub fn interpret_assembly_program_with_limit(
    program: &AssemblyProgram,
    instruction_limit: usize,
) -> Result<String, InterpretationError> {
    let mut interpreter = AssemblyInterpreter::new(program, instruction_limit);
    interpreter.run()?;
    Ok(interpreter.runtime.into_output())
}

pub fn interpret_assembly_program(program: &AssemblyProgram) -> Result<String, InterpretationError> {
    interpret_assembly_program_with_limit(program, DEFAULT_INSTRUCTION_LIMIT)
}
