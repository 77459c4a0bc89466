//! Turns the finished layout into IR: the frame type and allocation, frame
//! addresses for every spill, reload and stack buffer, and removal of what
//! the frame made dead.

use indexmap::IndexMap;

use super::error::FrameBuildError;
use super::layout::FrameLayout;
use super::row::FrameRow;
use crate::ir::{
    BlockId, Function, IdAllocator, InstId, InstKind, Instruction, IrStructField, IrTypeCache,
    IrTypeId, IrTypeKind, PointerUse, ValueDef, ValueId, classify_pointer_use, for_each_inst_use,
    for_each_term_use, replace_value_in_func, replace_value_in_inst, uses_of,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializedFrame {
    /// Result of the `frame_alloc` at the top of the entry block.
    pub frame: ValueId,
    pub frame_ty: IrTypeId,
    pub removed_reloads: usize,
    pub removed_allocas: usize,
}

/// `<function>.Frame`: `max_size` bytes aligned to `max_align`.
pub fn frame_type(types: &mut IrTypeCache, func_name: &str, size: u64, align: u64) -> IrTypeId {
    let byte = types.intern(IrTypeKind::Int {
        signed: false,
        bits: 8,
    });
    let bytes = types.intern(IrTypeKind::Array {
        elem: byte,
        len: size,
    });
    let align = types.intern(IrTypeKind::Blob { size: 0, align });
    types.add_named(
        IrTypeKind::Struct {
            fields: vec![
                IrStructField {
                    name: "align".to_string(),
                    ty: align,
                },
                IrStructField {
                    name: "bytes".to_string(),
                    ty: bytes,
                },
            ],
        },
        format!("{func_name}.Frame"),
    )
}

/// Materializes the frame. Returns `None` and leaves the function untouched
/// when no row needs storage.
pub fn materialize(
    func: &mut Function,
    types: &mut IrTypeCache,
    layout: &mut FrameLayout,
    ids: &mut IdAllocator,
    placeholder: ValueId,
) -> Result<Option<MaterializedFrame>, FrameBuildError> {
    if layout.rows.is_empty() {
        check_no_placeholder(func, placeholder)?;
        return Ok(None);
    }

    let frame_ty = frame_type(types, &func.name, layout.max_size, layout.max_align);
    let frame_ptr_ty = types.intern(IrTypeKind::Ptr { elem: frame_ty });
    let byte = types.intern(IrTypeKind::Int {
        signed: false,
        bits: 8,
    });
    let byte_ptr_ty = types.intern(IrTypeKind::Ptr { elem: byte });

    let frame = ids.value();
    let entry = func.entry();
    func.block_mut(entry).insts.insert(
        0,
        Instruction::new(
            ids.inst(),
            Some(ValueDef {
                id: frame,
                ty: frame_ptr_ty,
            }),
            InstKind::FrameAlloc { ty: frame_ty },
        ),
    );

    let mut dead_allocas = Vec::new();
    let row_ids: Vec<_> = layout.rows.ids().collect();
    for &id in &row_ids {
        let row = layout.rows.get_mut(id);
        let Some(offset) = row.offset() else {
            continue;
        };
        let mut addrs = FrameAddrs {
            frame,
            offset,
            ty: byte_ptr_ty,
        };

        if row.is_stack_alloc {
            let Some((block, index)) = func.find_def(row.def) else {
                continue;
            };
            let alloca = &func.block(block).insts[index];
            let alloca_id = alloca.id;
            addrs.ty = alloca.result.as_ref().map_or(byte_ptr_ty, |result| result.ty);

            log_buffer_uses(func, row.def);
            let addr = addrs.in_block(func, ids, row, entry);
            replace_value_in_func(func, row.def, addr, None);
            dead_allocas.push(alloca_id);
            continue;
        }

        for inst in row.spills.clone() {
            let Some((block, _)) = func.find_inst(inst) else {
                continue;
            };
            let addr = addrs.in_block(func, ids, row, block);
            patch_address(func, block, inst, placeholder, addr);
        }
        for reload in row.reloads.clone() {
            let Some((block, index)) = func.find_def(reload) else {
                continue;
            };
            let inst = func.block(block).insts[index].id;
            let addr = addrs.in_block(func, ids, row, block);
            patch_address(func, block, inst, placeholder, addr);
        }
    }

    let mut removed_reloads = 0;
    for &id in &row_ids {
        let row = layout.rows.get_mut(id);
        removed_reloads += remove_unused_reloads(func, row);
        remove_unused_addrs(func, row);
    }

    for &alloca in &dead_allocas {
        func.remove_inst(alloca);
    }

    check_no_placeholder(func, placeholder)?;

    log::debug!(
        "materialized {}: {} bytes, {} unused reloads removed, {} buffers moved",
        func.name,
        layout.max_size,
        removed_reloads,
        dead_allocas.len()
    );
    Ok(Some(MaterializedFrame {
        frame,
        frame_ty,
        removed_reloads,
        removed_allocas: dead_allocas.len(),
    }))
}

/// Frame addresses of one row, one per block.
struct FrameAddrs {
    frame: ValueId,
    offset: u64,
    ty: IrTypeId,
}

impl FrameAddrs {
    fn in_block(
        &self,
        func: &mut Function,
        ids: &mut IdAllocator,
        row: &mut FrameRow,
        block: BlockId,
    ) -> ValueId {
        if let Some(&addr) = row.addr_in.get(&block) {
            return addr;
        }
        let addr = ids.value();
        let target = func.block_mut(block);
        let at = target.first_insertion_point();
        target.insts.insert(
            at,
            Instruction::new(
                ids.inst(),
                Some(ValueDef {
                    id: addr,
                    ty: self.ty,
                }),
                InstKind::FrameAddr {
                    frame: self.frame,
                    offset: self.offset,
                },
            ),
        );
        row.addr_in.insert(block, addr);
        addr
    }
}

fn patch_address(func: &mut Function, block: BlockId, inst: InstId, placeholder: ValueId, addr: ValueId) {
    if let Some(inst) = func
        .block_mut(block)
        .insts
        .iter_mut()
        .find(|candidate| candidate.id == inst)
    {
        replace_value_in_inst(&mut inst.kind, placeholder, addr);
    }
}

fn remove_unused_reloads(func: &mut Function, row: &mut FrameRow) -> usize {
    let before = row.reloads.len();
    row.reloads.retain(|&reload| {
        if !uses_of(func, reload).is_empty() {
            return true;
        }
        if let Some((block, index)) = func.find_def(reload) {
            func.block_mut(block).insts.remove(index);
        }
        log::trace!("removed unused reload {} of {}", reload, row.def);
        false
    });
    before - row.reloads.len()
}

fn remove_unused_addrs(func: &mut Function, row: &mut FrameRow) {
    row.addr_in.retain(|_, addr| {
        if !uses_of(func, *addr).is_empty() {
            return true;
        }
        if let Some((block, index)) = func.find_def(*addr) {
            func.block_mut(block).insts.remove(index);
        }
        false
    });
}

fn log_buffer_uses(func: &Function, alloca: ValueId) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    let mut counts: IndexMap<PointerUse, usize> = IndexMap::new();
    for site in uses_of(func, alloca) {
        if let Some(category) = classify_pointer_use(func, site, alloca) {
            *counts.entry(category).or_default() += 1;
        }
    }
    log::trace!("buffer {} moved to the frame, uses: {:?}", alloca, counts);
}

fn check_no_placeholder(func: &Function, placeholder: ValueId) -> Result<(), FrameBuildError> {
    for block in &func.blocks {
        let mut found = false;
        for inst in &block.insts {
            for_each_inst_use(&inst.kind, |value| found |= value == placeholder);
        }
        for_each_term_use(&block.term, |value| found |= value == placeholder);
        if found {
            return Err(FrameBuildError::UnresolvedFrameAddress { block: block.id });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/contstate/t_materialize.rs"]
mod tests;
