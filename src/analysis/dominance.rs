//! Dominator tree (Cooper, Harvey, Kennedy: "A Simple, Fast Dominance
//! Algorithm").

use crate::analysis::cfg::Cfg;
use crate::ir::BlockId;

#[derive(Debug, Clone)]
pub struct DomTree {
    /// Immediate dominator per block; the entry maps to itself, unreachable
    /// blocks to `None`.
    idom: Vec<Option<BlockId>>,
    /// Position of each block in reverse postorder.
    rpo_index: Vec<Option<usize>>,
    children: Vec<Vec<BlockId>>,
    entry: BlockId,
}

impl DomTree {
    pub fn new(cfg: &Cfg) -> Self {
        let n = cfg.blocks().len();
        let rpo = cfg.rpo();
        let mut rpo_index = vec![None; n];
        for (pos, block) in rpo.iter().enumerate() {
            rpo_index[block.index()] = Some(pos);
        }

        let entry = cfg.entry();
        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        idom[entry.index()] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &pred in cfg.preds(block) {
                    if idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_index, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block.index()] != new_idom {
                    idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children = vec![Vec::new(); n];
        for &block in &rpo {
            if block != entry
                && let Some(parent) = idom[block.index()]
            {
                children[parent.index()].push(block);
            }
        }

        Self {
            idom,
            rpo_index,
            children,
            entry,
        }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom
            .get(block.index())
            .is_some_and(|idom| idom.is_some())
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            return None;
        }
        self.idom.get(block.index()).copied().flatten()
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        &self.children[block.index()]
    }

    /// Reflexive dominance. Unreachable blocks dominate nothing and are
    /// dominated by nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Position in reverse postorder, for deterministic dominance-respecting
    /// iteration.
    pub fn rpo_index(&self, block: BlockId) -> Option<usize> {
        self.rpo_index.get(block.index()).copied().flatten()
    }
}

fn intersect(
    idom: &[Option<BlockId>],
    rpo_index: &[Option<usize>],
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    let order = |block: BlockId| rpo_index[block.index()].unwrap_or(usize::MAX);
    while a != b {
        while order(a) > order(b) {
            a = idom[a.index()].unwrap_or(a);
        }
        while order(b) > order(a) {
            b = idom[b.index()].unwrap_or(b);
        }
    }
    a
}

#[cfg(test)]
#[path = "../tests/analysis/t_dominance.rs"]
mod tests;
