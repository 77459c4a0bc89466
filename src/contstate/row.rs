//! Frame rows: one per value or stack allocation kept in the continuation
//! state, deduplicated by definition.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use super::error::FrameBuildError;
use crate::ir::{
    AllocaLen, BlockId, DefTable, InstId, IrTypeCache, IrTypeId, IrTypeKind, SuspendId, ValueId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u32);

impl RowId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub def: ValueId,
    pub is_stack_alloc: bool,
    /// Value type, or allocated type for stack allocations.
    pub ty: IrTypeId,
    pub size: u64,
    pub align: u64,
    pub resides_in: BTreeSet<SuspendId>,
    offset: Option<u64>,

    pub force_spill_on_suspend: bool,
    pub force_reload_on_resume: bool,

    pub spilled_on_def: bool,
    pub spilled_in: BTreeSet<BlockId>,
    pub reloaded_in: BTreeSet<BlockId>,
    /// Frame address materialized per block.
    pub addr_in: IndexMap<BlockId, ValueId>,
    pub spills: Vec<InstId>,
    pub reloads: Vec<ValueId>,
}

impl FrameRow {
    fn new(def: ValueId, is_stack_alloc: bool, ty: IrTypeId, size: u64, align: u64) -> Self {
        Self {
            def,
            is_stack_alloc,
            ty,
            size,
            align,
            resides_in: BTreeSet::new(),
            offset: None,
            force_spill_on_suspend: false,
            force_reload_on_resume: false,
            spilled_on_def: false,
            spilled_in: BTreeSet::new(),
            reloaded_in: BTreeSet::new(),
            addr_in: IndexMap::new(),
            spills: Vec::new(),
            reloads: Vec::new(),
        }
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_flexible(&self) -> bool {
        self.offset.is_none()
    }

    /// Fixes the offset. Returns false if the row was already placed.
    pub(crate) fn place(&mut self, offset: u64) -> bool {
        if self.offset.is_some() {
            return false;
        }
        self.offset = Some(offset);
        true
    }

    pub fn end(&self) -> Option<u64> {
        self.offset.map(|offset| offset + self.size)
    }

    /// The placed row intersects `[offset, offset + size)`.
    pub fn overlaps_range(&self, offset: u64, size: u64) -> bool {
        match self.offset {
            Some(start) => start < offset + size && offset < start + self.size,
            None => false,
        }
    }

    pub fn overlaps(&self, other: &FrameRow) -> bool {
        other
            .offset
            .is_some_and(|offset| self.overlaps_range(offset, other.size))
    }

    pub fn shares_suspend(&self, other: &FrameRow) -> bool {
        !self.resides_in.is_disjoint(&other.resides_in)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RowTable {
    rows: Vec<FrameRow>,
    by_def: IndexMap<ValueId, RowId>,
}

impl RowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: RowId) -> &FrameRow {
        &self.rows[id.index()]
    }

    pub fn get_mut(&mut self, id: RowId) -> &mut FrameRow {
        &mut self.rows[id.index()]
    }

    pub fn row_for(&self, def: ValueId) -> Option<RowId> {
        self.by_def.get(&def).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = RowId> + '_ {
        (0..self.rows.len()).map(|idx| RowId(idx as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &FrameRow)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (RowId(idx as u32), row))
    }

    /// Returns the row of `def`, creating it on first sight. Size and
    /// alignment are computed only on creation.
    pub fn get_or_create_row(
        &mut self,
        defs: &DefTable,
        types: &mut IrTypeCache,
        def: ValueId,
    ) -> Result<RowId, FrameBuildError> {
        if let Some(id) = self.row_for(def) {
            return Ok(id);
        }

        let info = defs.get(def).ok_or_else(|| FrameBuildError::UnsupportedType {
            value: def,
            reason: "value has no definition".to_string(),
        })?;

        let row = match &info.alloca {
            Some(alloca) => {
                let count = match alloca.len {
                    AllocaLen::Static(count) => count,
                    AllocaLen::Dynamic(_) => {
                        return Err(FrameBuildError::DynamicAlloca { value: def });
                    }
                };
                let elem = types
                    .layout(alloca.ty)
                    .map_err(|e| unsupported(def, e.to_string()))?;
                let ty = if count == 1 {
                    alloca.ty
                } else {
                    types.intern(IrTypeKind::Array {
                        elem: alloca.ty,
                        len: count,
                    })
                };
                let size = elem
                    .stride()
                    .checked_mul(count)
                    .ok_or_else(|| unsupported(def, "allocation size overflows".to_string()))?;
                let align = alloca.align.unwrap_or(elem.align());
                FrameRow::new(def, true, ty, size, align)
            }
            None => {
                let layout = types
                    .layout(info.ty)
                    .map_err(|e| unsupported(def, e.to_string()))?;
                FrameRow::new(def, false, info.ty, layout.size(), layout.align())
            }
        };

        if row.size == 0 {
            return Err(unsupported(def, "zero-sized type".to_string()));
        }
        if !row.align.is_power_of_two() {
            return Err(unsupported(
                def,
                format!("alignment {} is not a power of two", row.align),
            ));
        }

        log::trace!(
            "new frame row for {}: size {} align {}{}",
            def,
            row.size,
            row.align,
            if row.is_stack_alloc { " (stack)" } else { "" }
        );

        let id = RowId(self.rows.len() as u32);
        self.rows.push(row);
        self.by_def.insert(def, id);
        Ok(id)
    }

    /// Records that `row` lives in the frame of `suspend`. Monotonic.
    pub fn mark_resides_in(&mut self, row: RowId, suspend: SuspendId) {
        self.get_mut(row).resides_in.insert(suspend);
    }
}

fn unsupported(value: ValueId, reason: String) -> FrameBuildError {
    FrameBuildError::UnsupportedType { value, reason }
}

#[cfg(test)]
#[path = "../tests/contstate/t_row.rs"]
mod tests;
