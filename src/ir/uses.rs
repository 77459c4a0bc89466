//! Def/use queries over a function.

use std::collections::HashMap;

use super::model::*;
use super::types::IrTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum User {
    Inst(InstId),
    Term,
}

/// One user of a value. An instruction using a value twice is one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseSite {
    pub block: BlockId,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefSite {
    Param { block: BlockId, index: usize },
    Inst { block: BlockId, inst: InstId },
}

impl DefSite {
    pub fn block(self) -> BlockId {
        match self {
            DefSite::Param { block, .. } | DefSite::Inst { block, .. } => block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocaDef {
    pub ty: IrTypeId,
    pub len: AllocaLen,
    pub align: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDefInfo {
    pub site: DefSite,
    pub ty: IrTypeId,
    pub alloca: Option<AllocaDef>,
}

/// Definition site of every value in a function.
#[derive(Debug, Clone, Default)]
pub struct DefTable {
    defs: HashMap<ValueId, ValueDefInfo>,
}

impl DefTable {
    pub fn build(func: &Function) -> Self {
        let mut defs = HashMap::new();
        for block in &func.blocks {
            for (index, param) in block.params.iter().enumerate() {
                defs.insert(
                    param.value.id,
                    ValueDefInfo {
                        site: DefSite::Param {
                            block: block.id,
                            index,
                        },
                        ty: param.value.ty,
                        alloca: None,
                    },
                );
            }
            for inst in &block.insts {
                let Some(result) = &inst.result else {
                    continue;
                };
                let alloca = match &inst.kind {
                    InstKind::Alloca { ty, len, align } => Some(AllocaDef {
                        ty: *ty,
                        len: len.clone(),
                        align: *align,
                    }),
                    _ => None,
                };
                defs.insert(
                    result.id,
                    ValueDefInfo {
                        site: DefSite::Inst {
                            block: block.id,
                            inst: inst.id,
                        },
                        ty: result.ty,
                        alloca,
                    },
                );
            }
        }
        Self { defs }
    }

    pub fn get(&self, value: ValueId) -> Option<&ValueDefInfo> {
        self.defs.get(&value)
    }

    pub fn block_of(&self, value: ValueId) -> Option<BlockId> {
        self.get(value).map(|info| info.site.block())
    }

    pub fn is_alloca(&self, value: ValueId) -> bool {
        self.get(value).is_some_and(|info| info.alloca.is_some())
    }
}

/// All use sites of `value`, in block then instruction order.
pub fn uses_of(func: &Function, value: ValueId) -> Vec<UseSite> {
    let mut sites = Vec::new();
    for block in &func.blocks {
        for inst in &block.insts {
            let mut used = false;
            for_each_inst_use(&inst.kind, |v| used |= v == value);
            if used {
                sites.push(UseSite {
                    block: block.id,
                    user: User::Inst(inst.id),
                });
            }
        }
        let mut used = false;
        for_each_term_use(&block.term, |v| used |= v == value);
        if used {
            sites.push(UseSite {
                block: block.id,
                user: User::Term,
            });
        }
    }
    sites
}

/// How a pointer value is consumed by one of its users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerUse {
    Load,
    StoreAddress,
    StoredValue,
    AddressCompute,
    Cast,
    Select,
    CallArgument,
    Lifetime,
    Compare,
    Arith,
    FrameBase,
    BranchArgument,
    Return,
}

impl PointerUse {
    /// The pointer leaves the reach of def/use tracking.
    pub fn escapes(self) -> bool {
        matches!(
            self,
            PointerUse::StoredValue
                | PointerUse::CallArgument
                | PointerUse::BranchArgument
                | PointerUse::Return
        )
    }

    /// The user produces a pointer derived from the operand.
    pub fn derives(self) -> bool {
        matches!(
            self,
            PointerUse::AddressCompute | PointerUse::Cast | PointerUse::Select
        )
    }
}

/// Classifies how `user` consumes `ptr`. A store that writes the pointer
/// through itself counts as a stored value.
pub fn classify_pointer_use(func: &Function, site: UseSite, ptr: ValueId) -> Option<PointerUse> {
    let block = func.block(site.block);
    let kind = match site.user {
        User::Term => {
            return match &block.term {
                Terminator::Return { .. } => Some(PointerUse::Return),
                Terminator::CondBr { cond, .. } if *cond == ptr => Some(PointerUse::Compare),
                Terminator::Switch { value, .. } if *value == ptr => Some(PointerUse::Compare),
                Terminator::Br { .. } | Terminator::CondBr { .. } | Terminator::Switch { .. } => {
                    Some(PointerUse::BranchArgument)
                }
                Terminator::Suspend { .. } | Terminator::Unreachable => None,
            };
        }
        User::Inst(id) => &block.insts[block.inst_index(id)?].kind,
    };

    let category = match kind {
        InstKind::Load { .. } => PointerUse::Load,
        InstKind::Store { value, .. } if *value == ptr => PointerUse::StoredValue,
        InstKind::Store { .. } => PointerUse::StoreAddress,
        InstKind::FieldAddr { .. } | InstKind::IndexAddr { .. } => PointerUse::AddressCompute,
        InstKind::Cast { .. } => PointerUse::Cast,
        InstKind::Select { cond, .. } if *cond == ptr => PointerUse::Compare,
        InstKind::Select { .. } => PointerUse::Select,
        InstKind::Call { .. } => PointerUse::CallArgument,
        InstKind::LifetimeStart { .. } | InstKind::LifetimeEnd { .. } => PointerUse::Lifetime,
        InstKind::Cmp { .. } => PointerUse::Compare,
        InstKind::BinOp { .. } | InstKind::UnOp { .. } | InstKind::Alloca { .. } => {
            PointerUse::Arith
        }
        InstKind::FrameAddr { .. } => PointerUse::FrameBase,
        InstKind::Const { .. } | InstKind::FrameAlloc { .. } => return None,
    };
    Some(category)
}

/// The result of `user` if it derives a new pointer from its operand.
pub fn derived_pointer(func: &Function, site: UseSite) -> Option<ValueId> {
    let User::Inst(id) = site.user else {
        return None;
    };
    let block = func.block(site.block);
    block.insts[block.inst_index(id)?].result_id()
}

/// `ptr` together with every pointer derived from it through address
/// computation, casts and selects, in discovery order.
pub fn pointer_aliases(func: &Function, ptr: ValueId) -> Vec<ValueId> {
    let mut aliases = vec![ptr];
    let mut next = 0;
    while next < aliases.len() {
        let current = aliases[next];
        next += 1;
        for site in uses_of(func, current) {
            let Some(category) = classify_pointer_use(func, site, current) else {
                continue;
            };
            if category.derives()
                && let Some(derived) = derived_pointer(func, site)
                && !aliases.contains(&derived)
            {
                aliases.push(derived);
            }
        }
    }
    aliases
}
