//! Natural-loop nest.

use crate::analysis::cfg::Cfg;
use crate::analysis::dominance::DomTree;
use crate::ir::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

impl LoopId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    /// Membership by block index.
    pub body: Vec<bool>,
    pub parent: Option<LoopId>,
    pub depth: u32,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.get(block.index()).copied().unwrap_or(false)
    }

    fn size(&self) -> usize {
        self.body.iter().filter(|member| **member).count()
    }
}

/// Loops keyed by header; back edges sharing a header form one loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    innermost: Vec<Option<LoopId>>,
}

impl LoopInfo {
    pub fn new(cfg: &Cfg, dom: &DomTree) -> Self {
        let n = cfg.blocks().len();
        let mut loops: Vec<Loop> = Vec::new();

        for &header in &cfg.rpo() {
            let tails: Vec<BlockId> = cfg
                .preds(header)
                .iter()
                .copied()
                .filter(|&pred| dom.dominates(header, pred))
                .collect();
            if tails.is_empty() {
                continue;
            }

            let mut body = vec![false; n];
            body[header.index()] = true;
            let mut stack = tails;
            while let Some(block) = stack.pop() {
                if body[block.index()] || !dom.is_reachable(block) {
                    continue;
                }
                body[block.index()] = true;
                stack.extend(cfg.preds(block).iter().copied());
            }

            loops.push(Loop {
                header,
                body,
                parent: None,
                depth: 1,
            });
        }

        // The parent is the smallest other loop containing the header.
        let sizes: Vec<usize> = loops.iter().map(Loop::size).collect();
        for idx in 0..loops.len() {
            let header = loops[idx].header;
            let parent = (0..loops.len())
                .filter(|&other| other != idx && loops[other].contains(header))
                .min_by_key(|&other| sizes[other]);
            loops[idx].parent = parent.map(|p| LoopId(p as u32));
        }
        for idx in 0..loops.len() {
            let mut depth = 1;
            let mut current = loops[idx].parent;
            while let Some(parent) = current {
                depth += 1;
                current = loops[parent.index()].parent;
            }
            loops[idx].depth = depth;
        }

        let mut innermost: Vec<Option<LoopId>> = vec![None; n];
        for (block, slot) in innermost.iter_mut().enumerate() {
            *slot = (0..loops.len())
                .filter(|&idx| loops[idx].body[block])
                .min_by_key(|&idx| sizes[idx])
                .map(|idx| LoopId(idx as u32));
        }

        Self { loops, innermost }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    /// Innermost loop containing `block`.
    pub fn loop_for(&self, block: BlockId) -> Option<LoopId> {
        self.innermost.get(block.index()).copied().flatten()
    }

    pub fn contains(&self, id: LoopId, block: BlockId) -> bool {
        self.get(id).contains(block)
    }

    /// Outermost loop around `block` that does not contain `def_block`.
    pub fn outermost_excluding(&self, block: BlockId, def_block: BlockId) -> Option<LoopId> {
        let mut found = None;
        let mut current = self.loop_for(block);
        while let Some(id) = current {
            if self.contains(id, def_block) {
                break;
            }
            found = Some(id);
            current = self.get(id).parent;
        }
        found
    }

    /// The unique predecessor of the header outside the loop, provided its
    /// only successor is the header.
    pub fn preheader(&self, cfg: &Cfg, id: LoopId) -> Option<BlockId> {
        let lp = self.get(id);
        let mut outside = cfg
            .preds(lp.header)
            .iter()
            .copied()
            .filter(|&pred| !lp.contains(pred));
        let candidate = outside.next()?;
        if outside.next().is_some() {
            return None;
        }
        (cfg.succs(candidate) == [lp.header]).then_some(candidate)
    }
}

#[cfg(test)]
#[path = "../tests/analysis/t_loops.rs"]
mod tests;
