//! Wraps allocated function bodies in their prologue and epilogue.

use crate::backend::{
    asm::{
        ArithmeticOperator, Argument, AssemblyFunction, CALLEE_SAVED_REGISTERS, Instruction,
        PhysicalRegister, Register, epilogue_label,
    },
    register_allocation::AllocatedFunction,
};

const WORD_SIZE: usize = 8;

/// Frame layout from `rbp` downwards: the spill slots, then the saved
/// callee-saved registers.
///
/// On entry `rsp` is 8 bytes past a 16-byte boundary, and pushing `rbp`
/// realigns it. Functions that call out therefore keep the slots and the
/// saved registers at an even number of words.
pub fn finalize_function(function: &AllocatedFunction) -> AssemblyFunction {
    let epilogue = epilogue_label(&function.name);
    let body = function
        .instructions
        .iter()
        .filter(|instruction| !matches!(instruction, Instruction::Label(label) if *label == epilogue))
        .cloned()
        .collect::<Vec<_>>();

    let is_leaf = !body
        .iter()
        .any(|instruction| matches!(instruction, Instruction::Call { .. }));
    let references_frame = body
        .iter()
        .any(|instruction| instruction.mentions_register(&PhysicalRegister::Rbp.into()));
    let saved = CALLEE_SAVED_REGISTERS
        .iter()
        .copied()
        .filter(|register| {
            let register = Register::Physical(*register);
            body.iter()
                .any(|instruction| instruction.mentions_register(&register))
        })
        .collect::<Vec<_>>();

    let mut slots = function.stack_slots;
    if !is_leaf && (slots + saved.len()) % 2 == 1 {
        slots += 1;
    }

    let needs_frame = !is_leaf || slots > 0 || references_frame;
    let mut instructions = vec![Instruction::label(function.name.clone())];

    if needs_frame {
        instructions.push(Instruction::Push(PhysicalRegister::Rbp.into()));
        instructions.push(Instruction::mov(PhysicalRegister::Rbp, PhysicalRegister::Rsp));
    }

    if slots > 0 {
        instructions.push(Instruction::Arithmetic {
            operator: ArithmeticOperator::Sub,
            destination: PhysicalRegister::Rsp.into(),
            source: Argument::Constant((slots * WORD_SIZE) as i32),
        });
    }

    for register in &saved {
        instructions.push(Instruction::Push((*register).into()));
    }

    instructions.extend(body);
    instructions.push(Instruction::label(epilogue));

    for register in saved.iter().rev() {
        instructions.push(Instruction::Pop((*register).into()));
    }

    if needs_frame {
        instructions.push(Instruction::mov(PhysicalRegister::Rsp, PhysicalRegister::Rbp));
        instructions.push(Instruction::Pop(PhysicalRegister::Rbp.into()));
    }

    instructions.push(Instruction::Return);

    AssemblyFunction {
        name: function.name.clone(),
        instructions,
    }
}
