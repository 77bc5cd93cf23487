//! A node-per-instruction control flow graph over a linear instruction list.
//!
//! The graph is generic over the instruction type through
//! [`ControlFlowAdapter`], which is implemented by both MidIR statements and
//! assembly instructions. Node ids are instruction indices, so id 0 is the
//! entry of the function.

use hashbrown::{HashMap, HashSet};

use crate::middle::mir;

/// Describes how an instruction transfers control.
pub trait ControlFlowAdapter {
    /// The label defined by this instruction.
    fn label(&self) -> Option<&str>;
    /// The target of an unconditional jump.
    fn jump_target(&self) -> Option<&str>;
    /// The target of a conditional jump that otherwise falls through.
    fn conditional_jump_target(&self) -> Option<&str>;
    fn is_return(&self) -> bool;
}

impl ControlFlowAdapter for mir::Statement {
    fn label(&self) -> Option<&str> {
        match self {
            mir::Statement::Label(label) => Some(label),
            _ => None,
        }
    }

    fn jump_target(&self) -> Option<&str> {
        match self {
            mir::Statement::Jump(label) => Some(label),
            _ => None,
        }
    }

    fn conditional_jump_target(&self) -> Option<&str> {
        match self {
            mir::Statement::ConditionalJumpFallThrough { label, .. } => Some(label),
            _ => None,
        }
    }

    fn is_return(&self) -> bool {
        matches!(self, mir::Statement::Return(_))
    }
}

#[derive(Debug)]
pub struct ControlFlowGraph<'a, I> {
    instructions: &'a [I],
    children: Vec<Vec<usize>>,
    parents: Vec<Vec<usize>>,
}

impl<'a, I: ControlFlowAdapter> ControlFlowGraph<'a, I> {
    pub fn from_instructions(instructions: &'a [I]) -> Self {
        let label_ids = instructions
            .iter()
            .enumerate()
            .filter_map(|(id, instruction)| instruction.label().map(|label| (label, id)))
            .collect::<HashMap<_, _>>();

        let resolve = |label: &str| -> usize {
            match label_ids.get(label) {
                Some(id) => *id,
                None => internal_error!("jump to unresolved label '{label}'"),
            }
        };

        let last_id = instructions.len().saturating_sub(1);
        let mut children = Vec::with_capacity(instructions.len());

        for (id, instruction) in instructions.iter().enumerate() {
            let mut node_children = Vec::with_capacity(2);

            if let Some(target) = instruction.jump_target() {
                node_children.push(resolve(target));
            } else if let Some(target) = instruction.conditional_jump_target() {
                node_children.push(resolve(target));
                if id != last_id && !node_children.contains(&(id + 1)) {
                    node_children.push(id + 1);
                }
            } else if !instruction.is_return() && id != last_id {
                node_children.push(id + 1);
            }

            children.push(node_children);
        }

        let mut parents = vec![Vec::new(); instructions.len()];
        for (id, node_children) in children.iter().enumerate() {
            for child in node_children {
                parents[*child].push(id);
            }
        }

        Self {
            instructions,
            children,
            parents,
        }
    }
}

impl<'a, I> ControlFlowGraph<'a, I> {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, id: usize) -> &'a I {
        &self.instructions[id]
    }

    pub fn children_ids(&self, id: usize) -> &[usize] {
        &self.children[id]
    }

    pub fn parent_ids(&self, id: usize) -> &[usize] {
        &self.parents[id]
    }

    /// Visits every node reachable from the entry exactly once.
    pub fn dfs(&self, mut visitor: impl FnMut(usize, &'a I)) {
        if self.is_empty() {
            return;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![0];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }

            visitor(id, &self.instructions[id]);

            for child in self.children[id].iter().rev() {
                if !visited.contains(child) {
                    stack.push(*child);
                }
            }
        }
    }

    pub fn reachable_ids(&self) -> HashSet<usize> {
        let mut reachable = HashSet::new();
        self.dfs(|id, _| {
            reachable.insert(id);
        });
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::mir::{Expression, Statement};

    fn sample_program() -> Vec<Statement> {
        vec![
            Statement::label("A"),
            Statement::move_temporary("x", Expression::Constant(1)),
            Statement::conditional_jump(Expression::temporary("x"), "B"),
            Statement::Return(None),
            Statement::label("B"),
            Statement::jump("A"),
            Statement::move_temporary("dead", Expression::Constant(2)),
            Statement::Return(None),
        ]
    }

    #[test]
    fn builds_children_and_parents() {
        let statements = sample_program();
        let graph = ControlFlowGraph::from_instructions(&statements);

        assert_eq!(graph.len(), statements.len());
        assert_eq!(graph.children_ids(0), &[1]);
        assert_eq!(graph.children_ids(2), &[4, 3]);
        assert!(graph.children_ids(3).is_empty());
        assert_eq!(graph.children_ids(5), &[0]);
        assert!(graph.children_ids(7).is_empty());
        assert_eq!(graph.parent_ids(0), &[5]);
        assert_eq!(graph.parent_ids(4), &[2]);
        assert!(graph.parent_ids(6).is_empty());
    }

    #[test]
    fn dfs_visits_reachable_nodes_once() {
        let statements = sample_program();
        let graph = ControlFlowGraph::from_instructions(&statements);

        let mut visited = Vec::new();
        graph.dfs(|id, _| visited.push(id));
        visited.sort_unstable();

        assert_eq!(visited, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn conditional_jump_to_next_instruction_has_one_child() {
        let statements = vec![
            Statement::conditional_jump(Expression::temporary("c"), "L"),
            Statement::label("L"),
            Statement::Return(None),
        ];
        let graph = ControlFlowGraph::from_instructions(&statements);

        assert_eq!(graph.children_ids(0), &[1]);
        assert_eq!(graph.parent_ids(1), &[0]);
    }

    #[test]
    fn final_conditional_jump_has_no_fall_through() {
        let statements = vec![
            Statement::label("L"),
            Statement::conditional_jump(Expression::temporary("c"), "L"),
        ];
        let graph = ControlFlowGraph::from_instructions(&statements);

        assert_eq!(graph.children_ids(1), &[0]);
        assert_eq!(graph.parent_ids(0), &[1]);
    }

    #[test]
    #[should_panic(expected = "unresolved label 'nowhere'")]
    fn unresolved_labels_are_fatal() {
        let statements = vec![Statement::jump("nowhere")];
        ControlFlowGraph::from_instructions(&statements);
    }
}
