use std::collections::HashMap;

use thiserror::Error;

use super::types::{IrTypeId, IrTypeInfo, IrTypeKind};

/// Layout information for an IR type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrLayout {
    size: u64,
    align: u64,
    field_offsets: Vec<u64>,
    stride: u64,
}

impl IrLayout {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn align(&self) -> u64 {
        self.align
    }

    pub fn field_offsets(&self) -> &[u64] {
        &self.field_offsets
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown type {0:?}")]
    UnknownType(IrTypeId),

    #[error("type {ty:?} has invalid alignment {align}")]
    BadAlign { ty: IrTypeId, align: u64 },

    #[error("type {0:?} has a size that overflows u64")]
    Overflow(IrTypeId),
}

pub fn align_to(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Caches computed layouts for IR types.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IrLayoutCache {
    layouts: HashMap<IrTypeId, IrLayout>,
}

impl IrLayoutCache {
    pub fn new() -> Self {
        Self {
            layouts: HashMap::new(),
        }
    }

    /// Returns the cached layout or computes it on demand.
    pub fn layout(&mut self, types: &[IrTypeInfo], ty: IrTypeId) -> Result<IrLayout, LayoutError> {
        if let Some(layout) = self.layouts.get(&ty) {
            return Ok(layout.clone());
        }

        let layout = self.compute_layout(types, ty)?;
        self.layouts.insert(ty, layout.clone());
        Ok(layout)
    }

    fn compute_layout(
        &mut self,
        types: &[IrTypeInfo],
        ty: IrTypeId,
    ) -> Result<IrLayout, LayoutError> {
        let info = types.get(ty.index()).ok_or(LayoutError::UnknownType(ty))?;
        let layout = match &info.kind {
            IrTypeKind::Unit => scalar(0, 1),
            IrTypeKind::Bool => scalar(1, 1),
            IrTypeKind::Int { bits, .. } | IrTypeKind::Float { bits } => {
                let size = (*bits as u64).div_ceil(8);
                scalar(size, size.max(1).next_power_of_two())
            }
            IrTypeKind::Ptr { .. } => scalar(8, 8),
            IrTypeKind::Vector { elem, lanes } => {
                let elem_layout = self.layout(types, *elem)?;
                let size = elem_layout
                    .size
                    .checked_mul(*lanes as u64)
                    .ok_or(LayoutError::Overflow(ty))?;
                // Vectors are aligned to their (power of two rounded) size.
                let align = size.max(1).next_power_of_two();
                IrLayout {
                    size: align_to(size, elem_layout.align),
                    align,
                    field_offsets: Vec::new(),
                    stride: align_to(size, align),
                }
            }
            IrTypeKind::Array { elem, len } => {
                let elem_layout = self.layout(types, *elem)?;
                let stride = align_to(elem_layout.size, elem_layout.align);
                IrLayout {
                    size: stride.checked_mul(*len).ok_or(LayoutError::Overflow(ty))?,
                    align: elem_layout.align,
                    field_offsets: Vec::new(),
                    stride,
                }
            }
            IrTypeKind::Struct { fields } => {
                self.layout_fields(types, fields.iter().map(|field| field.ty))?
            }
            IrTypeKind::Blob { size, align } => {
                if !align.is_power_of_two() {
                    return Err(LayoutError::BadAlign { ty, align: *align });
                }
                IrLayout {
                    size: *size,
                    align: *align,
                    field_offsets: Vec::new(),
                    stride: align_to(*size, *align),
                }
            }
        };
        Ok(layout)
    }

    fn layout_fields(
        &mut self,
        types: &[IrTypeInfo],
        fields: impl Iterator<Item = IrTypeId>,
    ) -> Result<IrLayout, LayoutError> {
        let mut offsets = Vec::new();
        let mut offset = 0u64;
        let mut max_align = 1u64;

        for field_ty in fields {
            let field_layout = self.layout(types, field_ty)?;
            offset = align_to(offset, field_layout.align);
            offsets.push(offset);
            offset += field_layout.size;
            max_align = max_align.max(field_layout.align);
        }

        let size = align_to(offset, max_align);
        Ok(IrLayout {
            size,
            align: max_align,
            field_offsets: offsets,
            stride: size,
        })
    }
}

fn scalar(size: u64, align: u64) -> IrLayout {
    IrLayout {
        size,
        align,
        field_offsets: Vec::new(),
        stride: size,
    }
}

#[cfg(test)]
#[path = "../tests/ir/t_layout.rs"]
mod tests;
