//! Minimal SSA function builder.
//!
//! Provides a small API for creating SSA functions for tests without exposing
//! the raw ID allocation details.

use super::model::*;
use super::types::IrTypeId;

/// Constructs SSA functions while managing ID allocation.
pub struct FunctionBuilder {
    func: Function,
    next_value: u32,
    next_inst: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, sig: FunctionSig) -> Self {
        Self {
            func: Function {
                name: name.into(),
                sig,
                blocks: Vec::new(),
            },
            next_value: 0,
            next_inst: 0,
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        self.func.push_block(Vec::new())
    }

    pub fn add_block_param(&mut self, block: BlockId, ty: IrTypeId) -> ValueId {
        let value = self.alloc_value();
        let block = self.block_mut(block);
        block.params.push(BlockParam {
            value: ValueDef { id: value, ty },
        });
        value
    }

    pub fn const_int(
        &mut self,
        block: BlockId,
        value: i128,
        signed: bool,
        bits: u8,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(
            block,
            ty,
            InstKind::Const {
                value: ConstValue::Int {
                    value,
                    signed,
                    bits,
                },
            },
        )
    }

    pub fn const_bool(&mut self, block: BlockId, value: bool, ty: IrTypeId) -> ValueId {
        self.push_value(
            block,
            ty,
            InstKind::Const {
                value: ConstValue::Bool(value),
            },
        )
    }

    pub fn binop(
        &mut self,
        block: BlockId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(block, ty, InstKind::BinOp { op, lhs, rhs })
    }

    pub fn cmp(
        &mut self,
        block: BlockId,
        op: CmpOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(block, ty, InstKind::Cmp { op, lhs, rhs })
    }

    pub fn unop(&mut self, block: BlockId, op: UnOp, value: ValueId, ty: IrTypeId) -> ValueId {
        self.push_value(block, ty, InstKind::UnOp { op, value })
    }

    pub fn cast(
        &mut self,
        block: BlockId,
        kind: CastKind,
        value: ValueId,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(block, ty, InstKind::Cast { kind, value, ty })
    }

    pub fn select(
        &mut self,
        block: BlockId,
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(
            block,
            ty,
            InstKind::Select {
                cond,
                then_value,
                else_value,
            },
        )
    }

    /// Stack buffer of `len` elements of `elem`; `ptr_ty` is the result type.
    pub fn alloca(
        &mut self,
        block: BlockId,
        elem: IrTypeId,
        len: AllocaLen,
        align: Option<u64>,
        ptr_ty: IrTypeId,
    ) -> ValueId {
        self.push_value(
            block,
            ptr_ty,
            InstKind::Alloca {
                ty: elem,
                len,
                align,
            },
        )
    }

    pub fn lifetime_start(&mut self, block: BlockId, ptr: ValueId) {
        self.push_effect(block, InstKind::LifetimeStart { ptr });
    }

    pub fn lifetime_end(&mut self, block: BlockId, ptr: ValueId) {
        self.push_effect(block, InstKind::LifetimeEnd { ptr });
    }

    pub fn field_addr(
        &mut self,
        block: BlockId,
        base: ValueId,
        index: usize,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(block, ty, InstKind::FieldAddr { base, index })
    }

    pub fn index_addr(
        &mut self,
        block: BlockId,
        base: ValueId,
        index: ValueId,
        ty: IrTypeId,
    ) -> ValueId {
        self.push_value(block, ty, InstKind::IndexAddr { base, index })
    }

    pub fn load(&mut self, block: BlockId, ptr: ValueId, ty: IrTypeId) -> ValueId {
        self.push_value(block, ty, InstKind::Load { ptr })
    }

    pub fn store(&mut self, block: BlockId, ptr: ValueId, value: ValueId) {
        self.push_effect(block, InstKind::Store { ptr, value });
    }

    pub fn call(
        &mut self,
        block: BlockId,
        callee: &str,
        args: Vec<ValueId>,
        ret: Option<IrTypeId>,
    ) -> Option<ValueId> {
        let kind = InstKind::Call {
            callee: Callee::Named(callee.to_string()),
            args,
        };
        match ret {
            Some(ty) => Some(self.push_value(block, ty, kind)),
            None => {
                self.push_effect(block, kind);
                None
            }
        }
    }

    pub fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        let block = self.block_mut(block);
        block.term = term;
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn push_value(&mut self, block: BlockId, ty: IrTypeId, kind: InstKind) -> ValueId {
        let result = self.alloc_value();
        let id = self.alloc_inst();
        let block = self.block_mut(block);
        block.insts.push(Instruction::new(
            id,
            Some(ValueDef { id: result, ty }),
            kind,
        ));
        result
    }

    fn push_effect(&mut self, block: BlockId, kind: InstKind) {
        let id = self.alloc_inst();
        let block = self.block_mut(block);
        block.insts.push(Instruction::new(id, None, kind));
    }

    fn alloc_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn alloc_inst(&mut self) -> InstId {
        let id = InstId(self.next_inst);
        self.next_inst += 1;
        id
    }

    fn block_mut(&mut self, block: BlockId) -> &mut Block {
        let index = block.index();
        self.func
            .blocks
            .get_mut(index)
            .unwrap_or_else(|| panic!("invalid block id {:?}", block))
    }
}
