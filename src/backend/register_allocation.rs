//! Chaitin-style graph coloring over the interference graph built from
//! register liveness.
//!
//! Abstract registers are simplified off the graph while some node has fewer
//! neighbours than there are colors. When none does, the node with the
//! lowest uses-per-degree ratio is pushed optimistically as a spill
//! candidate. Popping the stack assigns colors, and candidates that end up
//! without a free color are spilled to the stack before the next round.
//! Physical registers are pre-colored nodes and never leave the graph.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};

use crate::{
    backend::{
        asm::{
            Argument, AssemblyResourceAllocator, Instruction, PhysicalRegister, Register,
            is_spill_register,
        },
        liveness::{compute_live_registers, is_tracked, tracked_definitions},
        spilling::{StackSlots, rewrite_spilled_registers},
    },
    middle::{dataflow::DataflowResult, optimization::simple::simplify},
};

/// The allocation colors, caller-saved registers first so that small
/// functions rarely need to save anything.
pub const COLORS: [PhysicalRegister; 14] = [
    PhysicalRegister::Rax,
    PhysicalRegister::Rcx,
    PhysicalRegister::Rdx,
    PhysicalRegister::Rsi,
    PhysicalRegister::Rdi,
    PhysicalRegister::R8,
    PhysicalRegister::R9,
    PhysicalRegister::R10,
    PhysicalRegister::R11,
    PhysicalRegister::Rbx,
    PhysicalRegister::R12,
    PhysicalRegister::R13,
    PhysicalRegister::R14,
    PhysicalRegister::R15,
];

#[derive(Debug, Default)]
pub struct InterferenceGraph {
    neighbours: HashMap<Register, HashSet<Register>>,
}

impl InterferenceGraph {
    pub fn add_node(&mut self, register: Register) {
        self.neighbours.entry(register).or_default();
    }

    /// Physical registers always interfere with each other, so edges between
    /// two of them are not recorded.
    pub fn add_edge(&mut self, left: &Register, right: &Register) {
        if left == right || (!left.is_abstract() && !right.is_abstract()) {
            return;
        }

        self.neighbours
            .entry(left.clone())
            .or_default()
            .insert(right.clone());
        self.neighbours
            .entry(right.clone())
            .or_default()
            .insert(left.clone());
    }

    #[cfg(test)]
    pub fn interferes(&self, left: &Register, right: &Register) -> bool {
        self.neighbours
            .get(left)
            .is_some_and(|neighbours| neighbours.contains(right))
    }

    pub fn neighbours(&self, register: &Register) -> impl Iterator<Item = &Register> {
        self.neighbours.get(register).into_iter().flatten()
    }

    pub fn degree(&self, register: &Register) -> usize {
        self.neighbours.get(register).map_or(0, HashSet::len)
    }

    pub fn abstract_registers(&self) -> BTreeSet<&Register> {
        self.neighbours
            .keys()
            .filter(|register| register.is_abstract())
            .collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&Register, &Register)> {
        self.neighbours
            .iter()
            .flat_map(|(node, neighbours)| neighbours.iter().map(move |neighbour| (node, neighbour)))
    }
}

/// A register defined by an instruction interferes with everything live
/// after it, except for the source of a register-to-register move.
pub fn build_interference_graph(
    instructions: &[Instruction],
    liveness: &DataflowResult<HashSet<Register>>,
) -> InterferenceGraph {
    let mut graph = InterferenceGraph::default();

    for (id, instruction) in instructions.iter().enumerate() {
        let mut registers = instruction.used_registers();
        registers.extend(instruction.defined_registers());
        for register in registers.into_iter().filter(is_tracked) {
            graph.add_node(register);
        }

        let move_source = match instruction {
            Instruction::MoveToRegister {
                source: Argument::Register(source),
                ..
            } => Some(source),
            _ => None,
        };

        for defined in tracked_definitions(instruction) {
            for live in &liveness.out_edges[id] {
                if Some(live) != move_source {
                    graph.add_edge(&defined, live);
                }
            }
        }
    }

    graph
}

fn count_uses(instructions: &[Instruction]) -> HashMap<Register, usize> {
    let mut uses = HashMap::new();

    for instruction in instructions {
        for register in instruction
            .used_registers()
            .into_iter()
            .chain(instruction.defined_registers())
        {
            *uses.entry(register).or_insert(0) += 1;
        }
    }

    uses
}

fn color_of(coloring: &HashMap<Register, PhysicalRegister>, register: &Register) -> Option<PhysicalRegister> {
    match register {
        Register::Physical(register) => Some(*register),
        Register::Abstract(_) => coloring.get(register).copied(),
    }
}

/// Returns the coloring of every abstract register, or the registers that
/// have to be spilled before coloring can succeed.
fn color_graph(
    graph: &InterferenceGraph,
    uses: &HashMap<Register, usize>,
) -> Result<HashMap<Register, PhysicalRegister>, Vec<Register>> {
    let mut remaining = graph.abstract_registers();
    let mut degrees = remaining
        .iter()
        .map(|register| (*register, graph.degree(register)))
        .collect::<HashMap<_, _>>();
    let mut stack = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let simplifiable = remaining
            .iter()
            .find(|register| degrees[*register] < COLORS.len())
            .copied();

        // Spill temporaries are as short-lived as registers get, so they are
        // only ever chosen when nothing else is left.
        let chosen = simplifiable.or_else(|| {
            remaining.iter().copied().min_by(|left, right| {
                let cost = |register: &Register| {
                    let uses = uses.get(register).copied().unwrap_or(0);
                    (is_spill_register(register), uses, degrees[register].max(1))
                };
                let (left_pinned, left_uses, left_degree) = cost(*left);
                let (right_pinned, right_uses, right_degree) = cost(*right);

                left_pinned
                    .cmp(&right_pinned)
                    .then((left_uses * right_degree).cmp(&(right_uses * left_degree)))
                    .then(left.cmp(right))
            })
        });

        let Some(chosen) = chosen else {
            break;
        };

        remaining.remove(chosen);
        stack.push(chosen);

        for neighbour in graph.neighbours(chosen) {
            if let Some(degree) = degrees.get_mut(neighbour) {
                *degree = degree.saturating_sub(1);
            }
        }
    }

    let mut coloring = HashMap::new();
    let mut spilled = Vec::new();

    while let Some(register) = stack.pop() {
        let taken = graph
            .neighbours(register)
            .filter_map(|neighbour| color_of(&coloring, neighbour))
            .collect::<HashSet<_>>();

        match COLORS.iter().find(|color| !taken.contains(*color)) {
            Some(color) => {
                coloring.insert(register.clone(), *color);
            }
            None => spilled.push(register.clone()),
        }
    }

    if spilled.is_empty() {
        Ok(coloring)
    } else {
        spilled.sort();
        Err(spilled)
    }
}

fn check_coloring(graph: &InterferenceGraph, coloring: &HashMap<Register, PhysicalRegister>) {
    for (left, right) in graph.edges() {
        let (Some(left_color), Some(right_color)) = (color_of(coloring, left), color_of(coloring, right)) else {
            internal_error!("'{left}' or '{right}' was left uncolored");
        };

        if left_color == right_color {
            internal_error!("interfering registers '{left}' and '{right}' were both assigned '{left_color}'");
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedFunction {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub stack_slots: usize,
}

/// Colors every abstract register of one tiled function with a physical
/// register, spilling to stack slots until coloring succeeds.
pub fn allocate_registers(
    name: &str,
    instructions: &[Instruction],
    has_return: bool,
    allocator: &mut AssemblyResourceAllocator,
    check_invariants: bool,
) -> AllocatedFunction {
    let mut instructions = instructions.to_vec();
    let mut slots = StackSlots::default();

    loop {
        let liveness = compute_live_registers(&instructions, has_return);
        let graph = build_interference_graph(&instructions, &liveness);

        let coloring = match color_graph(&graph, &count_uses(&instructions)) {
            Ok(coloring) => coloring,
            Err(spilled) => {
                instructions = simplify(&rewrite_spilled_registers(
                    &instructions,
                    &spilled,
                    &mut slots,
                    allocator,
                ));
                continue;
            }
        };

        if check_invariants {
            check_coloring(&graph, &coloring);
        }

        let instructions = instructions
            .iter()
            .map(|instruction| {
                instruction.map_registers(|register| match color_of(&coloring, register) {
                    Some(color) => Register::Physical(color),
                    None => internal_error!("abstract register '{register}' survived allocation in '{name}'"),
                })
            })
            .collect::<Vec<_>>();

        return AllocatedFunction {
            name: name.to_owned(),
            instructions: simplify(&instructions),
            stack_slots: slots.len(),
        };
    }
}
