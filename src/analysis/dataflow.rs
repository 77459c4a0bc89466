//! Generic worklist dataflow solver.
//!
//! Liveness and stack-buffer lifetimes are both phrased as dataflow problems
//! over the block graph; `solve_forward` and `solve_backward` share one
//! worklist loop parameterized by direction.

pub trait DataflowGraph {
    type Node: Copy + Eq;

    fn num_nodes(&self) -> usize;
    fn index(&self, node: Self::Node) -> usize;
    fn node_at(&self, idx: usize) -> Self::Node;
    fn preds(&self, node: Self::Node) -> &[Self::Node];
    fn succs(&self, node: Self::Node) -> &[Self::Node];
}

#[derive(Debug, Clone)]
pub struct DataflowResult<T> {
    pub in_map: Vec<T>,
    pub out_map: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Solves a forward problem. `entry_state` seeds `entry_node`; nodes without
/// predecessors start from `bottom`.
pub fn solve_forward<T, G, FMeet, FTransfer>(
    graph: &G,
    entry_node: G::Node,
    entry_state: T,
    bottom: T,
    meet: FMeet,
    transfer: FTransfer,
) -> DataflowResult<T>
where
    T: Clone + PartialEq,
    G: DataflowGraph,
    FMeet: Fn(&[T]) -> T,
    FTransfer: Fn(G::Node, &T) -> T,
{
    solve(
        graph,
        Direction::Forward,
        Some(entry_node),
        entry_state,
        bottom,
        meet,
        transfer,
    )
}

/// Solves a backward problem. `exit_state` seeds every node without
/// successors.
pub fn solve_backward<T, G, FMeet, FTransfer>(
    graph: &G,
    exit_state: T,
    bottom: T,
    meet: FMeet,
    transfer: FTransfer,
) -> DataflowResult<T>
where
    T: Clone + PartialEq,
    G: DataflowGraph,
    FMeet: Fn(&[T]) -> T,
    FTransfer: Fn(G::Node, &T) -> T,
{
    solve(
        graph,
        Direction::Backward,
        None,
        exit_state,
        bottom,
        meet,
        transfer,
    )
}

fn solve<T, G, FMeet, FTransfer>(
    graph: &G,
    direction: Direction,
    seed_node: Option<G::Node>,
    seed_state: T,
    bottom: T,
    meet: FMeet,
    transfer: FTransfer,
) -> DataflowResult<T>
where
    T: Clone + PartialEq,
    G: DataflowGraph,
    FMeet: Fn(&[T]) -> T,
    FTransfer: Fn(G::Node, &T) -> T,
{
    let num_nodes = graph.num_nodes();
    // `before` is the state flowing into the transfer function, `after` the
    // state it produces. Forward: before = in, after = out.
    let mut before = vec![bottom.clone(); num_nodes];
    let mut after = vec![bottom.clone(); num_nodes];
    let mut queued = vec![true; num_nodes];
    let mut worklist: Vec<G::Node> = (0..num_nodes).map(|idx| graph.node_at(idx)).collect();
    if direction == Direction::Forward {
        // Pop in program order so the first sweep mostly follows the edges.
        worklist.reverse();
    }

    while let Some(node) = worklist.pop() {
        let idx = graph.index(node);
        queued[idx] = false;

        let (upstream, downstream) = match direction {
            Direction::Forward => (graph.preds(node), graph.succs(node)),
            Direction::Backward => (graph.succs(node), graph.preds(node)),
        };

        let state_before = if Some(node) == seed_node {
            seed_state.clone()
        } else if upstream.is_empty() {
            match direction {
                Direction::Forward => bottom.clone(),
                Direction::Backward => seed_state.clone(),
            }
        } else {
            let states: Vec<T> = upstream
                .iter()
                .map(|&other| after[graph.index(other)].clone())
                .collect();
            meet(&states)
        };

        let state_after = transfer(node, &state_before);

        let mut changed = false;
        if state_before != before[idx] {
            before[idx] = state_before;
            changed = true;
        }
        if state_after != after[idx] {
            after[idx] = state_after;
            changed = true;
        }

        if changed {
            for &next in downstream {
                let next_idx = graph.index(next);
                if !queued[next_idx] {
                    queued[next_idx] = true;
                    worklist.push(next);
                }
            }
        }
    }

    match direction {
        Direction::Forward => DataflowResult {
            in_map: before,
            out_map: after,
        },
        Direction::Backward => DataflowResult {
            in_map: after,
            out_map: before,
        },
    }
}

#[cfg(test)]
#[path = "../tests/analysis/t_dataflow.rs"]
mod tests;
