//! Which values and stack buffers are live across each suspend point.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::analysis::cfg::Cfg;
use crate::analysis::dominance::DomTree;
use crate::analysis::liveness;
use crate::ir::{
    BlockId, DefTable, Function, InstKind, Instruction, PointerUse, SuspendPoint, UseSite,
    ValueId, classify_pointer_use, pointer_aliases, uses_of,
};

/// A stack allocation whose contents must survive a suspend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocaCandidate {
    pub alloca: ValueId,
    /// The allocation and every pointer derived from it.
    pub aliases: Vec<ValueId>,
}

/// Everything that must be kept in the frame across one suspend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendCandidates {
    /// Crossing values in program order, each with its uses after the resume.
    pub values: IndexMap<ValueId, Vec<UseSite>>,
    /// Crossing stack allocations in program order.
    pub allocas: Vec<AllocaCandidate>,
}

/// Decides whether a definition is cheap enough to recompute after a resume
/// instead of keeping it in the frame.
pub trait Materializable {
    fn is_materializable(&self, inst: &Instruction) -> bool;
}

/// Constants are recomputed; everything else is stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstMaterializable;

impl Materializable for ConstMaterializable {
    fn is_materializable(&self, inst: &Instruction) -> bool {
        matches!(inst.kind, InstKind::Const { .. })
    }
}

/// Liveness oracle consumed by the frame builder. Values recomputed after
/// the resume are expected to be gone from the function by the time it runs.
pub trait CrossingOracle {
    /// One entry per suspend, in the order of `suspends`.
    fn candidates(&self, func: &Function, suspends: &[SuspendPoint]) -> Vec<SuspendCandidates>;
}

/// Crossing sets derived from SSA liveness at each resume block.
#[derive(Debug, Clone, Copy, Default)]
pub struct LivenessCrossing;

impl CrossingOracle for LivenessCrossing {
    fn candidates(&self, func: &Function, suspends: &[SuspendPoint]) -> Vec<SuspendCandidates> {
        let cfg = Cfg::new(func);
        let dom = DomTree::new(&cfg);
        let live = liveness::analyze(func, &cfg);
        let defs = DefTable::build(func);
        let order = program_order(func);

        suspends
            .iter()
            .map(|suspend| {
                let mut crossing: Vec<ValueId> = live[suspend.resume.index()]
                    .live_in
                    .iter()
                    .copied()
                    .filter(|value| defs.get(*value).is_some_and(|info| info.alloca.is_none()))
                    .collect();
                crossing.sort_by_key(|value| order.get(value).copied().unwrap_or(usize::MAX));

                let mut values = IndexMap::new();
                for value in crossing {
                    let Some(def_block) = defs.block_of(value) else {
                        continue;
                    };
                    let uses = uses_reachable_from(func, &cfg, value, def_block, suspend.resume);
                    values.insert(value, uses);
                }

                let allocas = crossing_allocas(func, &cfg, &dom, suspend);
                SuspendCandidates { values, allocas }
            })
            .collect()
    }
}

/// Uses of `value` in blocks reachable from `start` without passing through
/// `def_block` again.
pub fn uses_reachable_from(
    func: &Function,
    cfg: &Cfg,
    value: ValueId,
    def_block: BlockId,
    start: BlockId,
) -> Vec<UseSite> {
    let reach = cfg.reachable_avoiding(start, Some(def_block));
    uses_of(func, value)
        .into_iter()
        .filter(|site| reach[site.block.index()] && site.block != def_block)
        .collect()
}

fn crossing_allocas(
    func: &Function,
    cfg: &Cfg,
    dom: &DomTree,
    suspend: &SuspendPoint,
) -> Vec<AllocaCandidate> {
    let mut found = Vec::new();
    for block in &func.blocks {
        for inst in &block.insts {
            let (InstKind::Alloca { .. }, Some(alloca)) = (&inst.kind, inst.result_id()) else {
                continue;
            };
            if !dom.dominates(block.id, suspend.block) {
                continue;
            }

            let aliases = pointer_aliases(func, alloca);
            let reach = cfg.reachable_avoiding(suspend.resume, Some(block.id));
            let mut escapes = false;
            let mut used_after = false;
            for &alias in &aliases {
                for site in uses_of(func, alias) {
                    let Some(category) = classify_pointer_use(func, site, alias) else {
                        continue;
                    };
                    escapes |= category.escapes();
                    used_after |= reach[site.block.index()]
                        && site.block != block.id
                        && category != PointerUse::Lifetime;
                }
            }
            if escapes || used_after {
                found.push(AllocaCandidate { alloca, aliases });
            }
        }
    }
    found
}

/// Definition position of every value, blocks in layout order.
fn program_order(func: &Function) -> HashMap<ValueId, usize> {
    let mut order = HashMap::new();
    for block in &func.blocks {
        for value in block.param_ids() {
            let next = order.len();
            order.insert(value, next);
        }
        for inst in &block.insts {
            if let Some(value) = inst.result_id() {
                let next = order.len();
                order.insert(value, next);
            }
        }
    }
    order
}

#[cfg(test)]
#[path = "../tests/analysis/t_crossing.rs"]
mod tests;
