//! A generic worklist solver for dataflow analyses.
//!
//! An analysis supplies a [`DataflowOperator`] describing its lattice and
//! transfer function. The solver computes `in`/`out` values for every node
//! of the control flow graph until nothing changes.
//!
//! The entry node of a forward analysis always joins over the value given by
//! `initial_edge(0)` in addition to its real predecessors, since control can
//! reach it from outside the function even when it is also a loop target.
//! Symmetrically, nodes without successors in a backward analysis join over
//! their own `initial_edge`.

use crate::middle::cfg::{ControlFlowAdapter, ControlFlowGraph};

pub trait DataflowOperator<I: ControlFlowAdapter> {
    type Edge: Clone;

    fn build_graph<'a>(&self, instructions: &'a [I]) -> ControlFlowGraph<'a, I> {
        ControlFlowGraph::from_instructions(instructions)
    }

    fn initial_edge(&self, node_id: usize) -> Self::Edge;

    /// Combines the values flowing in from neighbouring nodes. `edges` may be
    /// empty for nodes that nothing flows into.
    fn join(&self, edges: &[&Self::Edge]) -> Self::Edge;

    fn transfer(&self, edge: &Self::Edge, node_id: usize, instruction: &I) -> Self::Edge;

    fn edges_equal(&self, left: &Self::Edge, right: &Self::Edge) -> bool;
}

#[derive(Debug, Clone)]
pub struct DataflowResult<E> {
    pub in_edges: Vec<E>,
    pub out_edges: Vec<E>,
}

pub fn run_forward_analysis<I, O>(instructions: &[I], operator: &O) -> DataflowResult<O::Edge>
where
    I: ControlFlowAdapter,
    O: DataflowOperator<I>,
{
    let graph = operator.build_graph(instructions);
    let initial = (0..graph.len())
        .map(|id| operator.initial_edge(id))
        .collect::<Vec<_>>();

    let mut in_edges = initial.clone();
    let mut out_edges = initial.clone();
    let mut worklist = (0..graph.len()).rev().collect::<Vec<_>>();

    while let Some(id) = worklist.pop() {
        let mut incoming = graph
            .parent_ids(id)
            .iter()
            .map(|parent| &out_edges[*parent])
            .collect::<Vec<_>>();
        if id == 0 {
            incoming.push(&initial[0]);
        }

        in_edges[id] = operator.join(&incoming);

        let new_out = operator.transfer(&in_edges[id], id, graph.instruction(id));
        if !operator.edges_equal(&new_out, &out_edges[id]) {
            out_edges[id] = new_out;
            worklist.extend(graph.children_ids(id));
        }
    }

    DataflowResult {
        in_edges,
        out_edges,
    }
}

pub fn run_backward_analysis<I, O>(instructions: &[I], operator: &O) -> DataflowResult<O::Edge>
where
    I: ControlFlowAdapter,
    O: DataflowOperator<I>,
{
    let graph = operator.build_graph(instructions);
    let initial = (0..graph.len())
        .map(|id| operator.initial_edge(id))
        .collect::<Vec<_>>();

    let mut in_edges = initial.clone();
    let mut out_edges = initial.clone();
    let mut worklist = (0..graph.len()).collect::<Vec<_>>();

    while let Some(id) = worklist.pop() {
        let mut outgoing = graph
            .children_ids(id)
            .iter()
            .map(|child| &in_edges[*child])
            .collect::<Vec<_>>();
        if outgoing.is_empty() {
            outgoing.push(&initial[id]);
        }

        out_edges[id] = operator.join(&outgoing);

        let new_in = operator.transfer(&out_edges[id], id, graph.instruction(id));
        if !operator.edges_equal(&new_in, &in_edges[id]) {
            in_edges[id] = new_in;
            worklist.extend(graph.parent_ids(id));
        }
    }

    DataflowResult {
        in_edges,
        out_edges,
    }
}
