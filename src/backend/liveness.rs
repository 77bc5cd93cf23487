use hashbrown::HashSet;

use crate::{
    backend::asm::{Instruction, PhysicalRegister, Register},
    middle::dataflow::{DataflowOperator, DataflowResult, run_backward_analysis},
};

pub type RegisterSet = HashSet<Register>;

/// Whether the register takes part in allocation. The stack pointer, the
/// frame pointer and `rip` are never live values.
pub fn is_tracked(register: &Register) -> bool {
    match register {
        Register::Physical(register) => register.is_allocatable(),
        Register::Abstract(_) => true,
    }
}

pub fn tracked_uses(instruction: &Instruction) -> impl Iterator<Item = Register> {
    instruction.used_registers().into_iter().filter(is_tracked)
}

pub fn tracked_definitions(instruction: &Instruction) -> impl Iterator<Item = Register> {
    instruction
        .defined_registers()
        .into_iter()
        .filter(is_tracked)
}

pub struct LiveRegistersOperator {
    last_id: usize,
    /// Live at the end of the function: the return value, if there is one.
    exit: RegisterSet,
}

impl DataflowOperator<Instruction> for LiveRegistersOperator {
    type Edge = RegisterSet;

    fn initial_edge(&self, node_id: usize) -> RegisterSet {
        if node_id == self.last_id {
            self.exit.clone()
        } else {
            RegisterSet::new()
        }
    }

    fn join(&self, edges: &[&RegisterSet]) -> RegisterSet {
        edges
            .iter()
            .flat_map(|edge| edge.iter().cloned())
            .collect()
    }

    fn transfer(&self, edge: &RegisterSet, _: usize, instruction: &Instruction) -> RegisterSet {
        let mut live = edge.clone();

        for defined in tracked_definitions(instruction) {
            live.remove(&defined);
        }

        live.extend(tracked_uses(instruction));
        live
    }

    fn edges_equal(&self, left: &RegisterSet, right: &RegisterSet) -> bool {
        left == right
    }
}

pub fn compute_live_registers(
    instructions: &[Instruction],
    has_return: bool,
) -> DataflowResult<RegisterSet> {
    let operator = LiveRegistersOperator {
        last_id: instructions.len().saturating_sub(1),
        exit: if has_return {
            RegisterSet::from_iter([Register::Physical(PhysicalRegister::Rax)])
        } else {
            RegisterSet::new()
        },
    };

    run_backward_analysis(instructions, &operator)
}
