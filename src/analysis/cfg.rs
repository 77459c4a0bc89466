//! Control-flow graph utilities.

use crate::analysis::dataflow::DataflowGraph;
use crate::ir::{BlockId, Function};

/// Control-flow graph for a single function. Successor lists are
/// deduplicated, so a `cbr` with both arms on one block is a single edge.
#[derive(Debug, Clone)]
pub struct Cfg {
    entry: BlockId,
    blocks: Vec<BlockId>,
    preds: Vec<Vec<BlockId>>,
    succs: Vec<Vec<BlockId>>,
}

impl Cfg {
    pub fn new(func: &Function) -> Self {
        let blocks: Vec<BlockId> = func.blocks.iter().map(|block| block.id).collect();
        let mut preds = vec![Vec::new(); blocks.len()];
        let mut succs = vec![Vec::new(); blocks.len()];

        for block in &func.blocks {
            let mut block_succs = Vec::new();
            for succ in block.term.successors() {
                push_unique(&mut block_succs, succ);
            }
            for succ in &block_succs {
                push_unique(&mut preds[succ.index()], block.id);
            }
            succs[block.id.index()] = block_succs;
        }

        Self {
            entry: func.entry(),
            blocks,
            preds,
            succs,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block.index()]
    }

    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.succs[block.index()]
    }

    /// Returns reverse postorder for the reachable portion of the CFG.
    pub fn rpo(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Returns postorder for the reachable portion of the CFG.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        // Explicit stack of (block, next successor index).
        let mut stack = vec![(self.entry, 0usize)];
        visited[self.entry.index()] = true;

        while let Some((block, next)) = stack.last_mut() {
            let succs = &self.succs[block.index()];
            if let Some(&succ) = succs.get(*next) {
                *next += 1;
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(*block);
                stack.pop();
            }
        }
        order
    }

    /// Blocks reachable from `start` (inclusive) along paths that never enter
    /// `avoid`. `start` itself is visited even when it equals `avoid`, but its
    /// successors are only followed in that case.
    pub fn reachable_avoiding(&self, start: BlockId, avoid: Option<BlockId>) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack = vec![start];
        seen[start.index()] = true;
        while let Some(block) = stack.pop() {
            for &succ in self.succs(block) {
                if Some(succ) == avoid || seen[succ.index()] {
                    continue;
                }
                seen[succ.index()] = true;
                stack.push(succ);
            }
        }
        seen
    }
}

impl DataflowGraph for Cfg {
    type Node = BlockId;

    fn num_nodes(&self) -> usize {
        self.blocks.len()
    }

    fn index(&self, node: Self::Node) -> usize {
        node.index()
    }

    fn node_at(&self, idx: usize) -> Self::Node {
        self.blocks[idx]
    }

    fn preds(&self, node: Self::Node) -> &[Self::Node] {
        self.preds(node)
    }

    fn succs(&self, node: Self::Node) -> &[Self::Node] {
        self.succs(node)
    }
}

fn push_unique(list: &mut Vec<BlockId>, block: BlockId) {
    if !list.contains(&block) {
        list.push(block);
    }
}

#[cfg(test)]
#[path = "../tests/analysis/t_cfg.rs"]
mod tests;
