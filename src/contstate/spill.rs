//! Spill and reload insertion.
//!
//! Spills store a row's definition into the frame, reloads load it back. Both
//! address the frame through a single placeholder value until the frame is
//! materialized, so insertion can run before offsets are turned into
//! addresses. Reloads go in first: spill placement on suspend must not move
//! above a pending reload.

use super::config::{BuilderMode, ReloadTiming, SpillTiming};
use super::error::FrameBuildError;
use super::layout::FrameLayout;
use super::row::{FrameRow, RowId};
use crate::analysis::{Cfg, DomTree, LoopInfo};
use crate::ir::{
    Block, BlockId, Callee, DefSite, DefTable, Function, IdAllocator, InstKind, Instruction,
    ValueDef, ValueId,
};

/// Calls that must stay below every spill in their block.
const PINNED_CALL_PREFIXES: [&str; 2] = ["continuation.", "coro."];

pub struct SpillContext<'a> {
    pub cfg: &'a Cfg,
    pub dom: &'a DomTree,
    pub loops: &'a LoopInfo,
    pub defs: &'a DefTable,
    pub mode: BuilderMode,
    pub placeholder: ValueId,
}

impl SpillContext<'_> {
    pub fn spills_on_suspend(&self, row: &FrameRow) -> bool {
        self.mode.spill_timing() == SpillTiming::OnSuspend || row.force_spill_on_suspend
    }

    pub fn reloads_on_resume(&self, row: &FrameRow) -> bool {
        self.mode.reload_timing() == ReloadTiming::OnResume || row.force_reload_on_resume
    }
}

/// Inserts reloads for every plain row at the suspends it crosses: one at the
/// top of the resume block, or one at the top of each block with a crossing
/// use. Returns the number of reloads inserted.
pub fn insert_reloads(
    func: &mut Function,
    layout: &mut FrameLayout,
    ids: &mut IdAllocator,
    cx: &SpillContext<'_>,
) -> usize {
    let mut inserted = 0;
    for st in &layout.structs {
        // Reverse field order leaves the reloads of a block sorted by offset.
        for field in st.fields.iter().rev() {
            let row = layout.rows.get_mut(field.row);
            if row.is_stack_alloc {
                continue;
            }
            // Resident but not crossing: nothing to restore here.
            let Some(uses) = st.candidates.values.get(&row.def) else {
                continue;
            };

            if cx.reloads_on_resume(row) {
                if row.reloaded_in.insert(st.resume_block) {
                    insert_reload(func, ids, row, st.resume_block, cx.placeholder);
                    inserted += 1;
                }
                continue;
            }
            for site in uses {
                if row.reloaded_in.insert(site.block) {
                    insert_reload(func, ids, row, site.block, cx.placeholder);
                    inserted += 1;
                }
            }
        }
    }
    inserted
}

fn insert_reload(
    func: &mut Function,
    ids: &mut IdAllocator,
    row: &mut FrameRow,
    block: BlockId,
    placeholder: ValueId,
) {
    let value = ids.value();
    let reload = Instruction::new(
        ids.inst(),
        Some(ValueDef { id: value, ty: row.ty }),
        InstKind::Load { ptr: placeholder },
    );
    let target = func.block_mut(block);
    let at = target.first_insertion_point();
    target.insts.insert(at, reload);
    row.reloads.push(value);
    log::trace!("reload {} of {} in {}", value, row.def, block);
}

/// Inserts spills for every plain row, then drops spills dominated by another
/// spill of the same row. Returns the number of spills left.
pub fn insert_spills(
    func: &mut Function,
    layout: &mut FrameLayout,
    ids: &mut IdAllocator,
    cx: &SpillContext<'_>,
) -> Result<usize, FrameBuildError> {
    for (_, row) in layout.rows.iter() {
        if !row.is_stack_alloc && cx.spills_on_suspend(row) && !cx.reloads_on_resume(row) {
            return Err(layout.invariant(format!(
                "{} spills on suspend but is not reloaded on resume",
                row.def
            )));
        }
    }

    for idx in 0..layout.structs.len() {
        let fields: Vec<RowId> = layout.structs[idx]
            .fields
            .iter()
            .rev()
            .map(|field| field.row)
            .collect();

        for row_id in fields {
            let row = layout.rows.get(row_id);
            let st = &layout.structs[idx];
            if row.is_stack_alloc || !st.candidates.values.contains_key(&row.def) {
                continue;
            }

            let on_suspend = cx.spills_on_suspend(row);
            let (block, at) = if on_suspend {
                // Already stored before an earlier suspend on every path here.
                let spilled_earlier = layout.structs.iter().any(|other| {
                    other.suspend != st.suspend
                        && row.resides_in.contains(&other.suspend)
                        && cx.dom.strictly_dominates(other.suspend_block, st.suspend_block)
                });
                if spilled_earlier {
                    continue;
                }
                let def_block = cx
                    .defs
                    .block_of(row.def)
                    .ok_or_else(|| layout.invariant(format!("{} has no definition", row.def)))?;
                let block = spill_block(st.suspend_block, def_block, cx)?;
                (block, earliest_spill_point(func.block(block), row.def, cx.placeholder))
            } else if !row.spilled_on_def {
                spill_after_def(func, row.def, cx)
                    .ok_or_else(|| layout.invariant(format!("{} has no definition", row.def)))?
            } else {
                continue;
            };

            let row = layout.rows.get_mut(row_id);
            row.spilled_on_def |= !on_suspend;
            if !row.spilled_in.insert(block) {
                continue;
            }

            let inst = ids.inst();
            func.block_mut(block).insts.insert(
                at,
                Instruction::new(
                    inst,
                    None,
                    InstKind::Store {
                        ptr: cx.placeholder,
                        value: row.def,
                    },
                ),
            );
            row.spills.push(inst);
            log::trace!("spill of {} in {}", row.def, block);
        }
    }

    let mut count = 0;
    for id in layout.rows.ids().collect::<Vec<_>>() {
        let row = layout.rows.get_mut(id);
        remove_dominated_spills(func, row, cx.dom);
        count += row.spills.len();
    }
    Ok(count)
}

/// The suspend block, or the pre-header of the outermost loop around it that
/// does not contain the definition.
fn spill_block(
    suspend_block: BlockId,
    def_block: BlockId,
    cx: &SpillContext<'_>,
) -> Result<BlockId, FrameBuildError> {
    let Some(lp) = cx.loops.outermost_excluding(suspend_block, def_block) else {
        return Ok(suspend_block);
    };
    cx.loops
        .preheader(cx.cfg, lp)
        .ok_or(FrameBuildError::MissingPreheader {
            header: cx.loops.get(lp).header,
        })
}

/// Walks up from the end of `block` and returns the highest index a spill
/// can take without passing the definition, a pending reload or a pinned
/// call.
fn earliest_spill_point(block: &Block, def: ValueId, placeholder: ValueId) -> usize {
    let first = block.first_insertion_point();
    let mut at = block.insts.len();
    while at > first {
        let inst = &block.insts[at - 1];
        if inst.result_id() == Some(def) {
            break;
        }
        match &inst.kind {
            InstKind::Load { ptr } if *ptr == placeholder => break,
            InstKind::Call {
                callee: Callee::Named(name),
                ..
            } if PINNED_CALL_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix)) =>
            {
                break;
            }
            _ => {}
        }
        at -= 1;
    }
    at
}

/// Right after the defining instruction, or at the top of the block for
/// block parameters.
fn spill_after_def(func: &Function, def: ValueId, cx: &SpillContext<'_>) -> Option<(BlockId, usize)> {
    match cx.defs.get(def)?.site {
        DefSite::Param { block, .. } => Some((block, func.block(block).first_insertion_point())),
        DefSite::Inst { block, inst } => Some((block, func.block(block).inst_index(inst)? + 1)),
    }
}

fn remove_dominated_spills(func: &mut Function, row: &mut FrameRow, dom: &DomTree) {
    let sites: Vec<_> = row
        .spills
        .iter()
        .filter_map(|&inst| func.find_inst(inst).map(|(block, _)| (inst, block)))
        .collect();

    for &(inst, block) in &sites {
        let dominated = sites
            .iter()
            .any(|&(other, other_block)| other != inst && dom.strictly_dominates(other_block, block));
        if !dominated {
            continue;
        }
        func.remove_inst(inst);
        row.spills.retain(|&spill| spill != inst);
        row.spilled_in.remove(&block);
        log::trace!("dropped dominated spill of {} in {}", row.def, block);
    }
}

#[cfg(test)]
#[path = "../tests/contstate/t_spill.rs"]
mod tests;
