use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::{
    backend::{
        asm::{
            Argument, AssemblyFunction, AssemblyProgram, Displacement, Instruction, Memory,
            PhysicalRegister, Register,
        },
        target::CodeGenerator,
    },
    middle::mir::{Builtin, MAIN_FUNCTION_NAME},
};

pub struct CodeGeneratorX86_64LinuxGnu;

impl CodeGenerator for CodeGeneratorX86_64LinuxGnu {
    fn translate_to_asm(&self, program: &AssemblyProgram) -> String {
        let externs = Builtin::iter()
            .map(|builtin| format!("extern {builtin}"))
            .join("\n");

        let function_bodies = program.functions.iter().map(codegen_function).join("\n");

        let static_strings = program
            .global_variables
            .iter()
            .map(|global| format!("{}: db {}", global.name, format_nasm_string(&global.content)))
            .join("\n");

        format!(
            indoc::indoc! {r#"
            bits 64
            section .text

            global {0}

            ; runtime
            {1}

            ; user code
            {2}
            ; static data
            section .data

            {3}
            "#
            },
            MAIN_FUNCTION_NAME, externs, function_bodies, static_strings
        )
    }
}

/// Splits the string into quoted runs of printable characters and hex bytes
/// for everything NASM would not take inside quotes, ending in a zero byte.
fn format_nasm_string(string: &str) -> String {
    let mut parts = Vec::new();
    let mut run = String::new();

    for character in string.chars() {
        if (character.is_ascii_graphic() && character != '"') || character == ' ' {
            run.push(character);
            continue;
        }

        if !run.is_empty() {
            parts.push(format!("\"{run}\""));
            run.clear();
        }

        let mut buffer = [0; 4];
        for b in character.encode_utf8(&mut buffer).bytes() {
            parts.push(format!("0x{b:X}"));
        }
    }

    if !run.is_empty() {
        parts.push(format!("\"{run}\""));
    }
    parts.push("0".to_owned());

    parts.join(", ")
}

fn codegen_register(register: &Register) -> String {
    match register {
        Register::Physical(register) => register.to_string(),
        Register::Abstract(name) => {
            internal_error!("abstract register '{name}' reached code generation")
        }
    }
}

fn codegen_address(memory: &Memory) -> String {
    if let (Some(Register::Physical(PhysicalRegister::Rip)), None, Some(Displacement::Name(name))) =
        (&memory.base, &memory.index, &memory.displacement)
    {
        return format!("[rel {name}]");
    }

    let mut text = [
        memory.base.as_ref().map(codegen_register),
        memory.index.as_ref().map(|(index, scale)| match *scale {
            1 => codegen_register(index),
            scale => format!("{}*{scale}", codegen_register(index)),
        }),
    ]
    .into_iter()
    .flatten()
    .join(" + ");

    match &memory.displacement {
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

fn codegen_argument(argument: &Argument) -> String {
    match argument {
        Argument::Constant(value) => value.to_string(),
        Argument::Name(name) => name.clone(),
        Argument::Register(register) => codegen_register(register),
        Argument::Memory(memory) => format!("qword {}", codegen_address(memory)),
    }
}

fn codegen_instruction(instruction: &Instruction) -> Vec<String> {
    let line = match instruction {
        Instruction::MoveLong { destination, value } => {
            format!("mov {}, {value}", codegen_register(destination))
        }
        Instruction::MoveToRegister {
            destination,
            source,
        } => format!("mov {}, {}", codegen_register(destination), codegen_argument(source)),
        Instruction::MoveToMemory {
            destination,
            source,
        } => format!(
            "mov qword {}, {}",
            codegen_address(destination),
            codegen_argument(source)
        ),
        Instruction::LoadEffectiveAddress {
            destination,
            address,
        } => format!("lea {}, {}", codegen_register(destination), codegen_address(address)),
        Instruction::Compare { left, right } => {
            format!("cmp {}, {}", codegen_argument(left), codegen_argument(right))
        }
        // setcc only writes the low byte
        Instruction::SetOnCondition {
            condition,
            destination,
        } => {
            let Register::Physical(register) = destination else {
                internal_error!("abstract register '{destination}' reached code generation");
            };
            let byte = register.as_8_bit();

            return vec![
                format!("set{condition} {byte}"),
                format!("movzx {register}, {byte}"),
            ];
        }
        Instruction::Jump {
            condition: None,
            label,
        } => format!("jmp {label}"),
        Instruction::Jump {
            condition: Some(condition),
            label,
        } => format!("j{condition} {label}"),
        Instruction::Call { target, .. } => format!("call {}", codegen_argument(target)),
        Instruction::Return => "ret".to_owned(),
        Instruction::Arithmetic {
            operator,
            destination,
            source,
        } => format!(
            "{operator} {}, {}",
            codegen_argument(destination),
            codegen_argument(source)
        ),
        Instruction::Multiply {
            destination,
            source,
            immediate: None,
        } => format!("imul {}, {}", codegen_register(destination), codegen_argument(source)),
        Instruction::Multiply {
            destination,
            source,
            immediate: Some(immediate),
        } => format!(
            "imul {}, {}, {immediate}",
            codegen_register(destination),
            codegen_argument(source)
        ),
        Instruction::ShiftLeft { destination, count } => {
            format!("shl {}, {count}", codegen_register(destination))
        }
        Instruction::Cqo => "cqo".to_owned(),
        Instruction::Divide(divisor) => format!("idiv {}", codegen_argument(divisor)),
        Instruction::Push(argument) => format!("push {}", codegen_argument(argument)),
        Instruction::Pop(register) => format!("pop {}", codegen_register(register)),
        Instruction::Label(label) => format!("{label}:"),
        Instruction::Comment(comment) => format!("; {comment}"),
    };

    vec![line]
}

fn codegen_function(function: &AssemblyFunction) -> String {
    let mut output = String::new();

    for instruction in &function.instructions {
        for line in codegen_instruction(instruction) {
            match instruction {
                Instruction::Label(_) => output.push_str(&line),
                _ => {
                    output.push_str("    ");
                    output.push_str(&line);
                }
            }
            output.push('\n');
        }
    }

    output
}
