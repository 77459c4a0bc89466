use super::layout::{IrLayout, IrLayoutCache, LayoutError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrTypeId(pub u32);

impl IrTypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrTypeKind {
    Unit,
    Bool,
    Int {
        signed: bool,
        bits: u8,
    },
    Float {
        bits: u8,
    },
    Ptr {
        elem: IrTypeId,
    },
    Vector {
        elem: IrTypeId,
        lanes: u32,
    },
    Array {
        elem: IrTypeId,
        len: u64,
    },
    Struct {
        fields: Vec<IrStructField>,
    },
    Blob {
        size: u64,
        align: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrStructField {
    pub name: String,
    pub ty: IrTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrTypeInfo {
    pub kind: IrTypeKind,
    pub name: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IrTypeCache {
    types: Vec<IrTypeInfo>,
    layout_cache: IrLayoutCache,
}

impl IrTypeCache {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            layout_cache: IrLayoutCache::new(),
        }
    }

    /// Adds an anonymous type definition to the table.
    pub fn add(&mut self, kind: IrTypeKind) -> IrTypeId {
        let id = IrTypeId(self.types.len() as u32);
        self.types.push(IrTypeInfo { kind, name: None });
        id
    }

    /// Adds a named type definition to the table.
    pub fn add_named(&mut self, kind: IrTypeKind, name: String) -> IrTypeId {
        let id = IrTypeId(self.types.len() as u32);
        self.types.push(IrTypeInfo {
            kind,
            name: Some(name),
        });
        id
    }

    /// Returns an existing anonymous type with the same shape, or adds one.
    pub fn intern(&mut self, kind: IrTypeKind) -> IrTypeId {
        if let Some(idx) = self
            .types
            .iter()
            .position(|info| info.name.is_none() && info.kind == kind)
        {
            return IrTypeId(idx as u32);
        }
        self.add(kind)
    }

    pub fn get(&self, id: IrTypeId) -> &IrTypeInfo {
        &self.types[id.index()]
    }

    pub fn kind(&self, id: IrTypeId) -> &IrTypeKind {
        &self.get(id).kind
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns layout information for a type, computing it on demand.
    pub fn layout(&mut self, id: IrTypeId) -> Result<IrLayout, LayoutError> {
        self.layout_cache.layout(&self.types, id)
    }

    pub fn is_ptr(&self, id: IrTypeId) -> bool {
        matches!(self.kind(id), IrTypeKind::Ptr { .. })
    }
}
