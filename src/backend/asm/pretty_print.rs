use colored::Colorize;
use itertools::Itertools;

use crate::{
    backend::asm::{
        Argument, AssemblyFunction, AssemblyProgram, Displacement, Instruction, Memory, Register,
    },
    middle::mir::pretty_print::escape_string,
};

/// Prints the program to stdout with terminal colors.
pub fn pretty_print_assembly(program: &AssemblyProgram) {
    print!("{}", colorize_assembly(program));
}

pub fn colorize_assembly(program: &AssemblyProgram) -> String {
    let mut output = String::new();

    for function in &program.functions {
        for instruction in &function.instructions {
            match instruction {
                Instruction::Label(label) => {
                    output.push_str(&format!("{}\n", format!("{label}:").bright_red()))
                }
                Instruction::Comment(_) => {
                    output.push_str(&format!("  {}\n", instruction.to_string().bright_black()))
                }
                Instruction::Jump { label, .. } => {
                    let text = instruction.to_string();
                    let mnemonic = text.split_whitespace().next().unwrap_or_default();
                    output.push_str(&format!("  {} {}\n", mnemonic.cyan(), label.bright_red()))
                }
                _ => {
                    let text = instruction.to_string();
                    match text.split_once(' ') {
                        Some((mnemonic, operands)) => {
                            output.push_str(&format!("  {} {operands}\n", mnemonic.cyan()))
                        }
                        None => output.push_str(&format!("  {}\n", text.cyan())),
                    }
                }
            }
        }

        output.push('\n');
    }

    if !program.global_variables.is_empty() {
        output.push_str(&format!("{}\n", "## data".bright_black()));
    }

    for global in &program.global_variables {
        output.push_str(&format!(
            "{}{} {}\n",
            global.name.blue(),
            ":".white(),
            escape_string(&global.content).green()
        ));
    }

    output
}

impl core::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Register::Physical(register) => write!(f, "{register}"),
            Register::Abstract(name) => f.write_str(name),
        }
    }
}

impl Memory {
    /// The bracketed address alone, as `lea` takes it.
    pub fn address_text(&self) -> String {
        let mut parts = Vec::new();

        if let Some(base) = &self.base {
            parts.push(base.to_string());
        }

        match &self.index {
            Some((index, 1)) => parts.push(index.to_string()),
            Some((index, scale)) => parts.push(format!("{index}*{scale}")),
            None => {}
        }

        let mut text = parts.join(" + ");

        match &self.displacement {
            Some(Displacement::Constant(offset)) if text.is_empty() => text = offset.to_string(),
            Some(Displacement::Constant(offset)) if *offset < 0 => {
                text.push_str(&format!(" - {}", -i64::from(*offset)))
            }
            Some(Displacement::Constant(offset)) => text.push_str(&format!(" + {offset}")),
            Some(Displacement::Name(name)) if text.is_empty() => text = name.clone(),
            Some(Displacement::Name(name)) => text.push_str(&format!(" + {name}")),
            None => {}
        }

        format!("[{text}]")
    }
}

impl core::fmt::Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "qword ptr {}", self.address_text())
    }
}

impl core::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Argument::Constant(value) => write!(f, "{value}"),
            Argument::Name(name) => f.write_str(name),
            Argument::Register(register) => write!(f, "{register}"),
            Argument::Memory(memory) => write!(f, "{memory}"),
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::MoveLong { destination, value } => {
                write!(f, "movabs {destination}, {value}")
            }
            Instruction::MoveToRegister {
                destination,
                source,
            } => write!(f, "mov {destination}, {source}"),
            Instruction::MoveToMemory {
                destination,
                source,
            } => write!(f, "mov {destination}, {source}"),
            Instruction::LoadEffectiveAddress {
                destination,
                address,
            } => write!(f, "lea {destination}, {}", address.address_text()),
            Instruction::Compare { left, right } => write!(f, "cmp {left}, {right}"),
            Instruction::SetOnCondition {
                condition,
                destination,
            } => write!(f, "set{condition} {destination}"),
            Instruction::Jump {
                condition: None,
                label,
            } => write!(f, "jmp {label}"),
            Instruction::Jump {
                condition: Some(condition),
                label,
            } => write!(f, "j{condition} {label}"),
            Instruction::Call { target, .. } => write!(f, "call {target}"),
            Instruction::Return => f.write_str("ret"),
            Instruction::Arithmetic {
                operator,
                destination,
                source,
            } => write!(f, "{operator} {destination}, {source}"),
            Instruction::Multiply {
                destination,
                source,
                immediate: None,
            } => write!(f, "imul {destination}, {source}"),
            Instruction::Multiply {
                destination,
                source,
                immediate: Some(immediate),
            } => write!(f, "imul {destination}, {source}, {immediate}"),
            Instruction::ShiftLeft { destination, count } => {
                write!(f, "shl {destination}, {count}")
            }
            Instruction::Cqo => f.write_str("cqo"),
            Instruction::Divide(divisor) => write!(f, "idiv {divisor}"),
            Instruction::Push(argument) => write!(f, "push {argument}"),
            Instruction::Pop(register) => write!(f, "pop {register}"),
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Comment(comment) => write!(f, "## {comment}"),
        }
    }
}

impl core::fmt::Display for AssemblyFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for instruction in &self.instructions {
            match instruction {
                Instruction::Label(_) => writeln!(f, "{instruction}")?,
                _ => writeln!(f, "  {instruction}")?,
            }
        }

        Ok(())
    }
}

impl core::fmt::Display for AssemblyProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.functions.iter().join("\n"))?;

        if !self.global_variables.is_empty() {
            writeln!(f, "\n## data")?;
        }

        for global in &self.global_variables {
            writeln!(f, "{}: {}", global.name, escape_string(&global.content))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::asm::{ArithmeticOperator, ConditionCode, PhysicalRegister};

    #[test]
    fn prints_operands_in_intel_syntax() {
        let address = Memory {
            base: Some(PhysicalRegister::Rbp.into()),
            index: Some((Register::abstract_named("i"), 8)),
            displacement: Some(Displacement::Constant(-16)),
        };

        assert_eq!(
            Instruction::MoveToMemory {
                destination: address.clone(),
                source: Argument::Constant(3),
            }
            .to_string(),
            "mov qword ptr [rbp + i*8 - 16], 3"
        );
        assert_eq!(
            Instruction::LoadEffectiveAddress {
                destination: PhysicalRegister::Rax.into(),
                address: Memory::rip_relative("GLOBAL"),
            }
            .to_string(),
            "lea rax, [rip + GLOBAL]"
        );
        assert_eq!(
            Instruction::Arithmetic {
                operator: ArithmeticOperator::Xor,
                destination: Register::abstract_named("x").into(),
                source: Argument::Memory(address),
            }
            .to_string(),
            "xor x, qword ptr [rbp + i*8 - 16]"
        );
        assert_eq!(
            Instruction::Jump {
                condition: Some(ConditionCode::Le),
                label: "L".to_owned(),
            }
            .to_string(),
            "jle L"
        );
        assert_eq!(
            Instruction::SetOnCondition {
                condition: ConditionCode::Ne,
                destination: PhysicalRegister::R10.into(),
            }
            .to_string(),
            "setne r10"
        );
    }
}
