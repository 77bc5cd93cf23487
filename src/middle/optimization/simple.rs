//! Local clean-ups that keep instruction lists compact after every
//! structural rewrite: label coalescing, jump threading, unreachable code
//! removal and dead label removal.
//!
//! The pipeline is shared between MidIR statements and assembly
//! instructions through [`SimplifiableInstruction`].

use hashbrown::{HashMap, HashSet};

use crate::middle::{
    cfg::{ControlFlowAdapter, ControlFlowGraph},
    mir,
};

pub trait SimplifiableInstruction: ControlFlowAdapter + Clone {
    /// Returns a copy of this jump or conditional jump targeting `label`.
    fn retarget(&self, label: &str) -> Self;

    /// Whether the instruction has no effect and can be dropped, e.g. a move
    /// from a location to itself.
    fn is_no_op(&self) -> bool;

    /// Whether a jump to the immediately following label can be deleted.
    /// Conditional jumps whose condition may trap must be kept.
    fn is_removable_jump(&self) -> bool {
        true
    }
}

impl SimplifiableInstruction for mir::Statement {
    fn retarget(&self, label: &str) -> Self {
        match self {
            mir::Statement::Jump(_) => mir::Statement::jump(label),
            mir::Statement::ConditionalJumpFallThrough { condition, .. } => {
                mir::Statement::conditional_jump(condition.clone(), label)
            }
            _ => self.clone(),
        }
    }

    fn is_no_op(&self) -> bool {
        matches!(
            self,
            mir::Statement::MoveTemporary {
                destination,
                source: mir::Expression::Temporary(source),
            } if destination == source
        )
    }

    fn is_removable_jump(&self) -> bool {
        match self {
            mir::Statement::ConditionalJumpFallThrough { condition, .. } => !condition.may_trap(),
            _ => true,
        }
    }
}

pub fn optimize_with_simple_optimization(statements: &[mir::Statement]) -> Vec<mir::Statement> {
    simplify(statements)
}

pub fn simplify<I: SimplifiableInstruction>(instructions: &[I]) -> Vec<I> {
    let instructions = coalesce_consecutive_labels(instructions);
    let instructions = instructions
        .into_iter()
        .filter(|instruction| !instruction.is_no_op())
        .collect::<Vec<_>>();
    let instructions = thread_jumps(&instructions);
    let instructions = remove_unreachable_code(&instructions);
    let instructions = thread_jumps(&instructions);
    let instructions = remove_jumps_to_next_instruction(&instructions);

    remove_unused_labels(&instructions)
}

fn jump_target<I: ControlFlowAdapter>(instruction: &I) -> Option<&str> {
    instruction
        .jump_target()
        .or_else(|| instruction.conditional_jump_target())
}

fn rewrite_targets<I: SimplifiableInstruction>(
    instructions: Vec<I>,
    renames: &HashMap<String, String>,
) -> Vec<I> {
    instructions
        .into_iter()
        .map(|instruction| match jump_target(&instruction).and_then(|target| renames.get(target)) {
            Some(target) => instruction.retarget(target),
            None => instruction,
        })
        .collect()
}

/// Merges runs of labels into the first label of each run.
fn coalesce_consecutive_labels<I: SimplifiableInstruction>(instructions: &[I]) -> Vec<I> {
    let mut renames = HashMap::new();
    let mut kept = Vec::with_capacity(instructions.len());
    let mut current_run_label: Option<String> = None;

    for instruction in instructions {
        let Some(label) = instruction.label() else {
            current_run_label = None;
            kept.push(instruction.clone());
            continue;
        };

        match current_run_label.clone() {
            Some(run_label) => {
                renames.insert(label.to_owned(), run_label);
            }
            None => {
                current_run_label = Some(label.to_owned());
                kept.push(instruction.clone());
            }
        }
    }

    rewrite_targets(kept, &renames)
}

/// Redirects jumps whose target label is immediately followed by another
/// unconditional jump.
fn thread_jumps<I: SimplifiableInstruction>(instructions: &[I]) -> Vec<I> {
    let mut forwards = HashMap::new();
    for window in instructions.windows(2) {
        if let (Some(label), Some(target)) = (window[0].label(), window[1].jump_target()) {
            forwards.insert(label, target);
        }
    }

    let mut renames = HashMap::new();
    for start in forwards.keys() {
        let mut visited: HashSet<&str> = [*start].into_iter().collect();
        let mut current = *start;

        while let Some(next) = forwards.get(current) {
            if !visited.insert(*next) {
                // The chain loops back on itself, leave it alone.
                current = *start;
                break;
            }
            current = *next;
        }

        if current != *start {
            renames.insert(start.to_string(), current.to_string());
        }
    }

    rewrite_targets(instructions.to_vec(), &renames)
}

fn remove_unreachable_code<I: SimplifiableInstruction>(instructions: &[I]) -> Vec<I> {
    let graph = ControlFlowGraph::from_instructions(instructions);
    let reachable = graph.reachable_ids();

    instructions
        .iter()
        .enumerate()
        .filter(|(id, _)| reachable.contains(id))
        .map(|(_, instruction)| instruction.clone())
        .collect()
}

fn remove_jumps_to_next_instruction<I: SimplifiableInstruction>(instructions: &[I]) -> Vec<I> {
    instructions
        .iter()
        .enumerate()
        .filter(|(id, instruction)| {
            let Some(target) = jump_target(*instruction) else {
                return true;
            };
            let next_label = instructions.get(id + 1).and_then(|next| next.label());

            next_label != Some(target) || !instruction.is_removable_jump()
        })
        .map(|(_, instruction)| instruction.clone())
        .collect()
}

fn remove_unused_labels<I: SimplifiableInstruction>(instructions: &[I]) -> Vec<I> {
    let used = instructions
        .iter()
        .filter_map(jump_target)
        .collect::<HashSet<_>>();

    instructions
        .iter()
        .filter(|instruction| instruction.label().is_none_or(|label| used.contains(label)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use itertools::Itertools;

    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Statement};

    fn render(statements: &[Statement]) -> String {
        statements.iter().map(|statement| format!("{statement}\n")).join("")
    }

    #[test]
    fn threads_jumps_and_drops_dead_code() {
        let statements = vec![
            Statement::conditional_jump(Expression::temporary("c"), "A"),
            Statement::jump("B"),
            Statement::move_temporary("dead", Expression::Constant(1)),
            Statement::label("A"),
            Statement::label("A2"),
            Statement::jump("C"),
            Statement::label("B"),
            Statement::move_temporary("x", Expression::temporary("x")),
            Statement::move_temporary("y", Expression::Constant(2)),
            Statement::label("C"),
            Statement::Return(Some(Expression::temporary("y"))),
        ];

        assert_eq!(
            render(&optimize_with_simple_optimization(&statements)),
            indoc! {"
                if (c) goto C;
                y = 2;
                C:
                return y;
            "}
        );
    }

    #[test]
    fn follows_chains_of_forwarding_labels() {
        let statements = vec![
            Statement::conditional_jump(Expression::temporary("c"), "A"),
            Statement::Return(Some(Expression::Constant(1))),
            Statement::label("A"),
            Statement::jump("B"),
            Statement::label("B"),
            Statement::jump("C"),
            Statement::label("C"),
            Statement::Return(Some(Expression::Constant(2))),
        ];

        assert_eq!(
            render(&optimize_with_simple_optimization(&statements)),
            indoc! {"
                if (c) goto C;
                return 1;
                C:
                return 2;
            "}
        );
    }

    #[test]
    fn keeps_self_loops() {
        let statements = vec![
            Statement::label("LOOP"),
            Statement::jump("LOOP"),
        ];

        assert_eq!(optimize_with_simple_optimization(&statements), statements);
    }

    #[test]
    fn keeps_trapping_conditions_of_jumps_to_next_label() {
        let trapping = Statement::conditional_jump(
            Expression::binary(BinaryOperator::Divide, Expression::Constant(1), Expression::temporary("z")),
            "L",
        );
        let statements = vec![
            trapping.clone(),
            Statement::label("L"),
            Statement::Return(None),
        ];

        assert_eq!(
            optimize_with_simple_optimization(&statements),
            vec![trapping, Statement::label("L"), Statement::Return(None)]
        );
    }

    #[test]
    fn is_idempotent() {
        let statements = vec![
            Statement::conditional_jump(Expression::temporary("c"), "A"),
            Statement::move_temporary("x", Expression::Constant(1)),
            Statement::jump("B"),
            Statement::label("A"),
            Statement::move_temporary("x", Expression::Constant(2)),
            Statement::label("B"),
            Statement::Return(Some(Expression::temporary("x"))),
        ];

        let once = optimize_with_simple_optimization(&statements);
        assert_eq!(once, statements);
        assert_eq!(optimize_with_simple_optimization(&once), once);
    }
}
