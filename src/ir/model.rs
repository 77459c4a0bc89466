//! SSA + explicit-memory IR data model.
//!
//! Functions are lists of blocks with block parameters standing in for phis.
//! Every instruction carries a stable `InstId` so passes can refer to it across
//! insertions; a block whose terminator is `suspend` ends a coroutine suspend
//! point and names the block that runs on resumption.

use std::fmt;

use super::types::IrTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl InstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a suspend point in block order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuspendId(pub u32);

impl SuspendId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDef {
    pub id: ValueId,
    pub ty: IrTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockParam {
    pub value: ValueDef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub params: Vec<BlockParam>,
    pub insts: Vec<Instruction>,
    pub term: Terminator,
}

/// A function body. `blocks[i].id == BlockId(i)` always holds; block 0 is the
/// entry and its parameters are the function arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub sig: FunctionSig,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<IrTypeId>,
    pub ret: IrTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    Unit,
    Bool(bool),
    Int { value: i128, signed: bool, bits: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastKind {
    IntTrunc,
    IntExtend { signed: bool },
    PtrToInt,
    IntToPtr,
    PtrToPtr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Named(String),
    Value(ValueId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocaLen {
    Static(u64),
    Dynamic(ValueId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub id: InstId,
    pub result: Option<ValueDef>,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Const {
        value: ConstValue,
    },
    BinOp {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    UnOp {
        op: UnOp,
        value: ValueId,
    },
    Cmp {
        op: CmpOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cast {
        kind: CastKind,
        value: ValueId,
        ty: IrTypeId,
    },
    Select {
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
    },
    /// Stack buffer of `len` elements of `ty`.
    Alloca {
        ty: IrTypeId,
        len: AllocaLen,
        align: Option<u64>,
    },
    LifetimeStart {
        ptr: ValueId,
    },
    LifetimeEnd {
        ptr: ValueId,
    },
    FieldAddr {
        base: ValueId,
        index: usize,
    },
    IndexAddr {
        base: ValueId,
        index: ValueId,
    },
    Load {
        ptr: ValueId,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
    },
    Call {
        callee: Callee,
        args: Vec<ValueId>,
    },
    /// The continuation-state frame of the enclosing function.
    FrameAlloc {
        ty: IrTypeId,
    },
    /// Address of the byte at `offset` inside a frame.
    FrameAddr {
        frame: ValueId,
        offset: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    pub value: ConstValue,
    pub target: BlockId,
    pub args: Vec<ValueId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br {
        target: BlockId,
        args: Vec<ValueId>,
    },
    CondBr {
        cond: ValueId,
        then_bb: BlockId,
        then_args: Vec<ValueId>,
        else_bb: BlockId,
        else_args: Vec<ValueId>,
    },
    Switch {
        value: ValueId,
        cases: Vec<SwitchCase>,
        default: BlockId,
        default_args: Vec<ValueId>,
    },
    /// Coroutine suspend; execution continues in `resume` once resumed.
    Suspend {
        resume: BlockId,
    },
    Return {
        value: Option<ValueId>,
    },
    Unreachable,
}

impl Instruction {
    pub fn new(id: InstId, result: Option<ValueDef>, kind: InstKind) -> Self {
        Self { id, result, kind }
    }

    pub fn result_id(&self) -> Option<ValueId> {
        self.result.as_ref().map(|result| result.id)
    }
}

impl Block {
    pub fn param_ids(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.params.iter().map(|param| param.value.id)
    }

    pub fn inst_index(&self, id: InstId) -> Option<usize> {
        self.insts.iter().position(|inst| inst.id == id)
    }

    /// Index of the first instruction a pass may insert before. Frame
    /// allocations stay pinned at the top of the block.
    pub fn first_insertion_point(&self) -> usize {
        self.insts
            .iter()
            .take_while(|inst| matches!(inst.kind, InstKind::FrameAlloc { .. }))
            .count()
    }
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br { target, .. } => vec![*target],
            Terminator::CondBr {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
            Terminator::Switch { cases, default, .. } => {
                let mut succs: Vec<BlockId> = cases.iter().map(|case| case.target).collect();
                succs.push(*default);
                succs
            }
            Terminator::Suspend { resume } => vec![*resume],
            Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Argument lists of every edge that leaves towards `target`.
    pub fn edge_args(&self, target: BlockId) -> Vec<&[ValueId]> {
        match self {
            Terminator::Br { target: t, args } if *t == target => vec![args.as_slice()],
            Terminator::Br { .. } => Vec::new(),
            Terminator::CondBr {
                then_bb,
                then_args,
                else_bb,
                else_args,
                ..
            } => {
                let mut edges = Vec::new();
                if *then_bb == target {
                    edges.push(then_args.as_slice());
                }
                if *else_bb == target {
                    edges.push(else_args.as_slice());
                }
                edges
            }
            Terminator::Switch {
                cases,
                default,
                default_args,
                ..
            } => {
                let mut edges: Vec<&[ValueId]> = cases
                    .iter()
                    .filter(|case| case.target == target)
                    .map(|case| case.args.as_slice())
                    .collect();
                if *default == target {
                    edges.push(default_args.as_slice());
                }
                edges
            }
            Terminator::Suspend { .. } | Terminator::Return { .. } | Terminator::Unreachable => {
                Vec::new()
            }
        }
    }

    /// Mutable argument lists of every edge that leaves towards `target`.
    pub fn edge_args_mut(&mut self, target: BlockId) -> Vec<&mut Vec<ValueId>> {
        let mut edges = Vec::new();
        match self {
            Terminator::Br { target: t, args } => {
                if *t == target {
                    edges.push(args);
                }
            }
            Terminator::CondBr {
                then_bb,
                then_args,
                else_bb,
                else_args,
                ..
            } => {
                if *then_bb == target {
                    edges.push(then_args);
                }
                if *else_bb == target {
                    edges.push(else_args);
                }
            }
            Terminator::Switch {
                cases,
                default,
                default_args,
                ..
            } => {
                for case in cases {
                    if case.target == target {
                        edges.push(&mut case.args);
                    }
                }
                if *default == target {
                    edges.push(default_args);
                }
            }
            Terminator::Suspend { .. } | Terminator::Return { .. } | Terminator::Unreachable => {}
        }
        edges
    }

    /// Redirects every edge towards `from` to `to`, keeping the arguments.
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        let swap = |block: &mut BlockId| {
            if *block == from {
                *block = to;
            }
        };
        match self {
            Terminator::Br { target, .. } => swap(target),
            Terminator::CondBr {
                then_bb, else_bb, ..
            } => {
                swap(then_bb);
                swap(else_bb);
            }
            Terminator::Switch { cases, default, .. } => {
                for case in cases {
                    swap(&mut case.target);
                }
                swap(default);
            }
            Terminator::Suspend { resume } => swap(resume),
            Terminator::Return { .. } | Terminator::Unreachable => {}
        }
    }
}

/// A suspend point in normalized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendPoint {
    pub id: SuspendId,
    pub block: BlockId,
    pub resume: BlockId,
}

impl Function {
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// Appends an empty block that ends in `unreachable`.
    pub fn push_block(&mut self, params: Vec<BlockParam>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            params,
            insts: Vec::new(),
            term: Terminator::Unreachable,
        });
        id
    }

    /// Suspend points in block order.
    pub fn suspends(&self) -> Vec<SuspendPoint> {
        self.blocks
            .iter()
            .filter_map(|block| match block.term {
                Terminator::Suspend { resume } => Some((block.id, resume)),
                _ => None,
            })
            .enumerate()
            .map(|(idx, (block, resume))| SuspendPoint {
                id: SuspendId(idx as u32),
                block,
                resume,
            })
            .collect()
    }

    /// Finds an instruction by id, returning its block and index.
    pub fn find_inst(&self, id: InstId) -> Option<(BlockId, usize)> {
        self.blocks.iter().find_map(|block| {
            block
                .inst_index(id)
                .map(|index| (block.id, index))
        })
    }

    /// Finds the instruction defining `value`, returning its block and index.
    pub fn find_def(&self, value: ValueId) -> Option<(BlockId, usize)> {
        self.blocks.iter().find_map(|block| {
            block
                .insts
                .iter()
                .position(|inst| inst.result_id() == Some(value))
                .map(|index| (block.id, index))
        })
    }

    pub fn inst(&self, id: InstId) -> Option<&Instruction> {
        let (block, index) = self.find_inst(id)?;
        self.block(block).insts.get(index)
    }

    /// Removes an instruction by id. Returns it if present.
    pub fn remove_inst(&mut self, id: InstId) -> Option<Instruction> {
        let (block, index) = self.find_inst(id)?;
        Some(self.block_mut(block).insts.remove(index))
    }
}

/// Hands out fresh value and instruction ids for a function under rewrite.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next_value: u32,
    next_inst: u32,
}

impl IdAllocator {
    /// Starts above every id defined or referenced in `func`.
    pub fn for_function(func: &Function) -> Self {
        let mut next_value = 0u32;
        let mut next_inst = 0u32;
        let mut bump = |value: ValueId| next_value = next_value.max(value.0 + 1);

        for block in &func.blocks {
            for param in &block.params {
                bump(param.value.id);
            }
            for inst in &block.insts {
                next_inst = next_inst.max(inst.id.0 + 1);
                if let Some(result) = &inst.result {
                    bump(result.id);
                }
                for_each_inst_use(&inst.kind, &mut bump);
            }
            for_each_term_use(&block.term, &mut bump);
        }

        Self {
            next_value,
            next_inst,
        }
    }

    pub fn value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn inst(&mut self) -> InstId {
        let id = InstId(self.next_inst);
        self.next_inst += 1;
        id
    }
}

/// Visits each SSA value used by an instruction.
pub fn for_each_inst_use(kind: &InstKind, mut f: impl FnMut(ValueId)) {
    match kind {
        InstKind::Const { .. } | InstKind::FrameAlloc { .. } => {}
        InstKind::BinOp { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
            f(*lhs);
            f(*rhs);
        }
        InstKind::UnOp { value, .. }
        | InstKind::Cast { value, .. }
        | InstKind::FieldAddr { base: value, .. }
        | InstKind::Load { ptr: value }
        | InstKind::LifetimeStart { ptr: value }
        | InstKind::LifetimeEnd { ptr: value }
        | InstKind::FrameAddr { frame: value, .. } => f(*value),
        InstKind::Select {
            cond,
            then_value,
            else_value,
        } => {
            f(*cond);
            f(*then_value);
            f(*else_value);
        }
        InstKind::Alloca { len, .. } => {
            if let AllocaLen::Dynamic(len) = len {
                f(*len);
            }
        }
        InstKind::IndexAddr { base, index } => {
            f(*base);
            f(*index);
        }
        InstKind::Store { ptr, value } => {
            f(*ptr);
            f(*value);
        }
        InstKind::Call { callee, args } => {
            if let Callee::Value(value) = callee {
                f(*value);
            }
            for arg in args {
                f(*arg);
            }
        }
    }
}

/// Visits each SSA operand slot of an instruction mutably.
pub fn for_each_inst_use_mut(kind: &mut InstKind, mut f: impl FnMut(&mut ValueId)) {
    match kind {
        InstKind::Const { .. } | InstKind::FrameAlloc { .. } => {}
        InstKind::BinOp { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        InstKind::UnOp { value, .. }
        | InstKind::Cast { value, .. }
        | InstKind::FieldAddr { base: value, .. }
        | InstKind::Load { ptr: value }
        | InstKind::LifetimeStart { ptr: value }
        | InstKind::LifetimeEnd { ptr: value }
        | InstKind::FrameAddr { frame: value, .. } => f(value),
        InstKind::Select {
            cond,
            then_value,
            else_value,
        } => {
            f(cond);
            f(then_value);
            f(else_value);
        }
        InstKind::Alloca { len, .. } => {
            if let AllocaLen::Dynamic(len) = len {
                f(len);
            }
        }
        InstKind::IndexAddr { base, index } => {
            f(base);
            f(index);
        }
        InstKind::Store { ptr, value } => {
            f(ptr);
            f(value);
        }
        InstKind::Call { callee, args } => {
            if let Callee::Value(value) = callee {
                f(value);
            }
            for arg in args {
                f(arg);
            }
        }
    }
}

/// Visits each SSA value used by a terminator, including block arguments.
pub fn for_each_term_use(term: &Terminator, mut f: impl FnMut(ValueId)) {
    match term {
        Terminator::Br { args, .. } => args.iter().copied().for_each(f),
        Terminator::CondBr {
            cond,
            then_args,
            else_args,
            ..
        } => {
            f(*cond);
            then_args.iter().chain(else_args).copied().for_each(f);
        }
        Terminator::Switch {
            value,
            cases,
            default_args,
            ..
        } => {
            f(*value);
            for case in cases {
                case.args.iter().copied().for_each(&mut f);
            }
            default_args.iter().copied().for_each(f);
        }
        Terminator::Return { value } => {
            if let Some(value) = value {
                f(*value);
            }
        }
        Terminator::Suspend { .. } | Terminator::Unreachable => {}
    }
}

pub fn for_each_term_use_mut(term: &mut Terminator, mut f: impl FnMut(&mut ValueId)) {
    match term {
        Terminator::Br { args, .. } => args.iter_mut().for_each(f),
        Terminator::CondBr {
            cond,
            then_args,
            else_args,
            ..
        } => {
            f(cond);
            then_args.iter_mut().chain(else_args).for_each(f);
        }
        Terminator::Switch {
            value,
            cases,
            default_args,
            ..
        } => {
            f(value);
            for case in cases {
                case.args.iter_mut().for_each(&mut f);
            }
            default_args.iter_mut().for_each(f);
        }
        Terminator::Return { value } => {
            if let Some(value) = value {
                f(value);
            }
        }
        Terminator::Suspend { .. } | Terminator::Unreachable => {}
    }
}

/// Replaces all uses of `from` with `to` in an instruction.
pub fn replace_value_in_inst(kind: &mut InstKind, from: ValueId, to: ValueId) {
    for_each_inst_use_mut(kind, |value| {
        if *value == from {
            *value = to;
        }
    });
}

/// Replaces all uses of `from` with `to` in a terminator.
pub fn replace_value_in_term(term: &mut Terminator, from: ValueId, to: ValueId) {
    for_each_term_use_mut(term, |value| {
        if *value == from {
            *value = to;
        }
    });
}

/// Replaces `from` with `to` throughout a function, optionally skipping one instruction.
pub fn replace_value_in_func(
    func: &mut Function,
    from: ValueId,
    to: ValueId,
    ignore: Option<InstId>,
) {
    for block in &mut func.blocks {
        for inst in &mut block.insts {
            if Some(inst.id) == ignore {
                continue;
            }
            replace_value_in_inst(&mut inst.kind, from, to);
        }
        replace_value_in_term(&mut block.term, from, to);
    }
}
