//! Rematerialization of cheap values at their uses after a resume.

use indexmap::IndexSet;

use crate::analysis::crossing::uses_reachable_from;
use crate::analysis::{Cfg, Materializable, liveness};
use crate::ir::{
    BlockId, DefSite, DefTable, Function, IdAllocator, Instruction, SuspendPoint, ValueDef,
    ValueId, for_each_inst_use, replace_value_in_inst, replace_value_in_term,
};

/// Recomputes operand-free materializable values that live across a suspend
/// in every block that uses them after the resume, so they never need a frame
/// slot. Returns the number of clones inserted.
pub fn rematerialize(
    func: &mut Function,
    ids: &mut IdAllocator,
    suspends: &[SuspendPoint],
    materializable: &dyn Materializable,
) -> usize {
    let cfg = Cfg::new(func);
    let live = liveness::analyze(func, &cfg);
    let defs = DefTable::build(func);

    // (value, use block) pairs in discovery order.
    let mut sites: IndexSet<(ValueId, BlockId)> = IndexSet::new();
    for suspend in suspends {
        let mut crossing: Vec<ValueId> = live[suspend.resume.index()]
            .live_in
            .iter()
            .copied()
            .collect();
        crossing.sort();
        for value in crossing {
            let Some(DefSite::Inst { block, inst }) = defs.get(value).map(|info| info.site) else {
                continue;
            };
            let Some(def) = func.inst(inst) else {
                continue;
            };
            if !materializable.is_materializable(def) || has_operands(def) {
                continue;
            }
            for site in uses_reachable_from(func, &cfg, value, block, suspend.resume) {
                sites.insert((value, site.block));
            }
        }
    }

    for &(value, block) in &sites {
        let Some(info) = defs.get(value) else {
            continue;
        };
        let DefSite::Inst { inst, .. } = info.site else {
            continue;
        };
        let Some(def) = func.inst(inst) else {
            continue;
        };

        let ty = info.ty;
        let clone_id = ids.value();
        let clone = Instruction::new(
            ids.inst(),
            Some(ValueDef { id: clone_id, ty }),
            def.kind.clone(),
        );

        let target = func.block_mut(block);
        for inst in &mut target.insts {
            replace_value_in_inst(&mut inst.kind, value, clone_id);
        }
        replace_value_in_term(&mut target.term, value, clone_id);
        let at = target.first_insertion_point();
        target.insts.insert(at, clone);

        log::trace!(
            "rematerialized %v{} as %v{} in bb{}",
            value.0,
            clone_id.0,
            block.0
        );
    }

    sites.len()
}

fn has_operands(inst: &Instruction) -> bool {
    let mut any = false;
    for_each_inst_use(&inst.kind, |_| any = true);
    any
}

#[cfg(test)]
#[path = "../tests/transform/t_remat.rs"]
mod tests;
