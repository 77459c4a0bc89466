use std::collections::BTreeSet;

use crate::analysis::dataflow::{DataflowGraph, solve_backward, solve_forward};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ToyNode(usize);

struct ToyGraph {
    preds: Vec<Vec<ToyNode>>,
    succs: Vec<Vec<ToyNode>>,
}

impl ToyGraph {
    fn from_edges(len: usize, edges: &[(usize, usize)]) -> Self {
        let mut preds = vec![vec![]; len];
        let mut succs = vec![vec![]; len];
        for &(from, to) in edges {
            succs[from].push(ToyNode(to));
            preds[to].push(ToyNode(from));
        }
        Self { preds, succs }
    }

    fn new_linear(len: usize) -> Self {
        let edges: Vec<(usize, usize)> = (1..len).map(|idx| (idx - 1, idx)).collect();
        Self::from_edges(len, &edges)
    }
}

impl DataflowGraph for ToyGraph {
    type Node = ToyNode;

    fn num_nodes(&self) -> usize {
        self.preds.len()
    }

    fn index(&self, node: Self::Node) -> usize {
        node.0
    }

    fn node_at(&self, idx: usize) -> Self::Node {
        ToyNode(idx)
    }

    fn preds(&self, node: Self::Node) -> &[Self::Node] {
        &self.preds[node.0]
    }

    fn succs(&self, node: Self::Node) -> &[Self::Node] {
        &self.succs[node.0]
    }
}

#[test]
fn test_solve_forward_chain() {
    let graph = ToyGraph::new_linear(3);

    let result = solve_forward(
        &graph,
        ToyNode(0),
        0i32,
        -1i32,
        |states| states.iter().cloned().max().unwrap_or(-1),
        |_, in_state| in_state + 1,
    );

    assert_eq!(result.in_map, vec![0, 1, 2]);
    assert_eq!(result.out_map, vec![1, 2, 3]);
}

#[test]
fn test_solve_backward_chain() {
    let graph = ToyGraph::new_linear(3);

    let result = solve_backward(
        &graph,
        0i32,
        -1i32,
        |states| states.iter().cloned().max().unwrap_or(-1),
        |_, out_state| out_state + 1,
    );

    assert_eq!(result.out_map, vec![2, 1, 0]);
    assert_eq!(result.in_map, vec![3, 2, 1]);
}

#[test]
fn test_solve_forward_diamond_takes_longest_path() {
    //   0
    //  / \
    // 1   2
    //  \ /
    //   3
    let graph = ToyGraph::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);

    let result = solve_forward(
        &graph,
        ToyNode(0),
        0i32,
        -1i32,
        |states| states.iter().cloned().max().unwrap_or(-1),
        |node, in_state| if node.0 == 1 { in_state + 5 } else { in_state + 1 },
    );

    assert_eq!(result.in_map[3], 6);
    assert_eq!(result.out_map[3], 7);
}

#[test]
fn test_solve_forward_self_loop_reaches_fixpoint() {
    let graph = ToyGraph::from_edges(3, &[(0, 1), (1, 1), (1, 2)]);

    let result = solve_forward(
        &graph,
        ToyNode(0),
        BTreeSet::new(),
        BTreeSet::new(),
        |states| states.iter().flatten().copied().collect::<BTreeSet<usize>>(),
        |node, in_state| {
            let mut out = in_state.clone();
            out.insert(node.0);
            out
        },
    );

    assert_eq!(result.in_map[1], BTreeSet::from([0, 1]));
    assert_eq!(result.out_map[2], BTreeSet::from([0, 1, 2]));
}
