use hashbrown::HashMap;

use crate::backend::asm::{
    AssemblyResourceAllocator, Instruction, Memory, PhysicalRegister, Register,
};

/// Assigns stack slots below the frame pointer to spilled registers. Slot
/// numbers keep growing across allocation rounds of one function.
#[derive(Debug, Default)]
pub struct StackSlots {
    slots: HashMap<Register, usize>,
}

impl StackSlots {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn slot_of(&mut self, register: &Register) -> Memory {
        let next = self.slots.len() + 1;
        let slot = *self.slots.entry(register.clone()).or_insert(next);

        Memory::base_offset(PhysicalRegister::Rbp, -8 * slot as i32)
    }
}

/// Rewrites every instruction that mentions a spilled register to work on a
/// fresh short-lived register instead, loading it from the register's stack
/// slot before a read and storing it back after a write.
pub fn rewrite_spilled_registers(
    instructions: &[Instruction],
    spilled: &[Register],
    slots: &mut StackSlots,
    allocator: &mut AssemblyResourceAllocator,
) -> Vec<Instruction> {
    if let Some(register) = spilled.iter().find(|register| !register.is_abstract()) {
        internal_error!("cannot spill pre-colored register '{register}'");
    }

    let mut rewritten = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        let used = instruction.used_registers();
        let defined = instruction.defined_registers();

        let mut loads = Vec::new();
        let mut stores = Vec::new();
        let mut replacements = HashMap::new();

        for register in spilled {
            let is_used = used.contains(register);
            let is_defined = defined.contains(register);
            if !is_used && !is_defined {
                continue;
            }

            let slot = slots.slot_of(register);
            let temporary = allocator.allocate_spill_register();

            if is_used {
                loads.push(Instruction::mov(temporary.clone(), slot.clone()));
            }
            if is_defined {
                stores.push(Instruction::MoveToMemory {
                    destination: slot,
                    source: temporary.clone().into(),
                });
            }

            replacements.insert(register.clone(), temporary);
        }

        if replacements.is_empty() {
            rewritten.push(instruction.clone());
            continue;
        }

        rewritten.extend(loads);
        rewritten.push(instruction.map_registers(|register| {
            replacements
                .get(register)
                .cloned()
                .unwrap_or_else(|| register.clone())
        }));
        rewritten.extend(stores);
    }

    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::asm::{ArithmeticOperator, Argument};

    #[test]
    fn loads_before_uses_and_stores_after_definitions() {
        let x = Register::abstract_named("x");
        let instructions = vec![
            Instruction::mov(x.clone(), Argument::Constant(1)),
            Instruction::Arithmetic {
                operator: ArithmeticOperator::Add,
                destination: x.clone().into(),
                source: Argument::Constant(2),
            },
            Instruction::mov(PhysicalRegister::Rax, x.clone()),
        ];

        let mut slots = StackSlots::default();
        let rewritten = rewrite_spilled_registers(
            &instructions,
            &[x],
            &mut slots,
            &mut AssemblyResourceAllocator::new(),
        );

        assert_eq!(
            rewritten.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "mov _SPILL_0, 1",
                "mov qword ptr [rbp - 8], _SPILL_0",
                "mov _SPILL_1, qword ptr [rbp - 8]",
                "add _SPILL_1, 2",
                "mov qword ptr [rbp - 8], _SPILL_1",
                "mov _SPILL_2, qword ptr [rbp - 8]",
                "mov rax, _SPILL_2",
            ]
        );
        assert_eq!(slots.len(), 1);
    }
}
