use std::collections::HashMap;

use thiserror::Error;

use crate::analysis::{Cfg, DomTree};
use crate::ir::{
    Block, BlockId, Callee, Function, InstKind, IrTypeCache, IrTypeId, IrTypeKind, Terminator,
    ValueId, for_each_inst_use, for_each_term_use,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct VerifyIrError {
    message: String,
}

impl VerifyIrError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Where a value is defined: block plus position (`None` for parameters,
/// which precede every instruction).
type DefPos = (BlockId, Option<usize>);

/// Checks block numbering, unique definitions, operand references, block
/// argument arity and types, and that every use in a reachable block is
/// dominated by its definition.
pub fn verify_function(func: &Function, types: &IrTypeCache) -> Result<(), VerifyIrError> {
    let name = func.name.as_str();
    if func.blocks.is_empty() {
        return Err(err(name, None, "function has no blocks"));
    }
    for (index, block) in func.blocks.iter().enumerate() {
        if block.id.index() != index {
            return Err(err(
                name,
                Some(block.id),
                format!("block stored at index {}", index),
            ));
        }
    }

    let mut value_types: HashMap<ValueId, IrTypeId> = HashMap::new();
    let mut def_pos: HashMap<ValueId, DefPos> = HashMap::new();
    for block in &func.blocks {
        for param in &block.params {
            if value_types.insert(param.value.id, param.value.ty).is_some() {
                return Err(err(
                    name,
                    Some(block.id),
                    format!("duplicate value {:?}", param.value.id),
                ));
            }
            def_pos.insert(param.value.id, (block.id, None));
        }
        for (index, inst) in block.insts.iter().enumerate() {
            if let Some(result) = &inst.result {
                if value_types.insert(result.id, result.ty).is_some() {
                    return Err(err(
                        name,
                        Some(block.id),
                        format!("duplicate value {:?}", result.id),
                    ));
                }
                def_pos.insert(result.id, (block.id, Some(index)));
            }
        }
    }

    let cfg = Cfg::new(func);
    let dom = DomTree::new(&cfg);

    for block in &func.blocks {
        for (index, inst) in block.insts.iter().enumerate() {
            let mut use_error = None;
            for_each_inst_use(&inst.kind, |value| {
                if use_error.is_none() {
                    use_error =
                        check_use(name, &dom, &def_pos, value, block.id, Some(index)).err();
                }
            });
            if let Some(error) = use_error {
                return Err(error);
            }
            verify_inst_types(name, block.id, &inst.kind, &value_types, types)?;
        }

        let mut use_error = None;
        for_each_term_use(&block.term, |value| {
            if use_error.is_none() {
                use_error = check_use(name, &dom, &def_pos, value, block.id, None).err();
            }
        });
        if let Some(error) = use_error {
            return Err(error);
        }
        verify_terminator(name, block, &func.blocks, &value_types, types)?;
    }

    Ok(())
}

/// `at` is the instruction index of the user, `None` for the terminator.
fn check_use(
    func_name: &str,
    dom: &DomTree,
    def_pos: &HashMap<ValueId, DefPos>,
    value: ValueId,
    block: BlockId,
    at: Option<usize>,
) -> Result<(), VerifyIrError> {
    let &(def_block, def_index) = def_pos.get(&value).ok_or_else(|| {
        err(
            func_name,
            Some(block),
            format!("use of undefined value {:?}", value),
        )
    })?;

    if !dom.is_reachable(block) {
        return Ok(());
    }
    let dominated = if def_block == block {
        match (def_index, at) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(def), Some(user)) => def < user,
        }
    } else {
        dom.dominates(def_block, block)
    };
    if !dominated {
        return Err(err(
            func_name,
            Some(block),
            format!("use of {:?} is not dominated by its definition", value),
        ));
    }
    Ok(())
}

fn verify_inst_types(
    func_name: &str,
    block_id: BlockId,
    kind: &InstKind,
    value_types: &HashMap<ValueId, IrTypeId>,
    types: &IrTypeCache,
) -> Result<(), VerifyIrError> {
    match kind {
        InstKind::FieldAddr { base, .. }
        | InstKind::IndexAddr { base, .. }
        | InstKind::Load { ptr: base }
        | InstKind::Store { ptr: base, .. }
        | InstKind::LifetimeStart { ptr: base }
        | InstKind::LifetimeEnd { ptr: base }
        | InstKind::FrameAddr { frame: base, .. } => {
            require_ptr(func_name, block_id, *base, value_types, types)?;
        }
        InstKind::Select { cond, .. } => {
            require_bool(func_name, block_id, *cond, value_types, types)?;
        }
        InstKind::Call { callee, .. } => {
            if let Callee::Value(value) = callee {
                require_ptr(func_name, block_id, *value, value_types, types)?;
            }
        }
        InstKind::Const { .. }
        | InstKind::BinOp { .. }
        | InstKind::UnOp { .. }
        | InstKind::Cmp { .. }
        | InstKind::Cast { .. }
        | InstKind::Alloca { .. }
        | InstKind::FrameAlloc { .. } => {}
    }

    Ok(())
}

fn verify_terminator(
    func_name: &str,
    block: &Block,
    blocks: &[Block],
    value_types: &HashMap<ValueId, IrTypeId>,
    types: &IrTypeCache,
) -> Result<(), VerifyIrError> {
    match &block.term {
        Terminator::Br { target, args } => {
            check_block_args(func_name, block.id, *target, args, blocks, value_types)?;
        }
        Terminator::CondBr {
            cond,
            then_bb,
            then_args,
            else_bb,
            else_args,
        } => {
            require_bool(func_name, block.id, *cond, value_types, types)?;
            check_block_args(func_name, block.id, *then_bb, then_args, blocks, value_types)?;
            check_block_args(func_name, block.id, *else_bb, else_args, blocks, value_types)?;
        }
        Terminator::Switch {
            cases,
            default,
            default_args,
            ..
        } => {
            for case in cases {
                check_block_args(
                    func_name,
                    block.id,
                    case.target,
                    &case.args,
                    blocks,
                    value_types,
                )?;
            }
            check_block_args(func_name, block.id, *default, default_args, blocks, value_types)?;
        }
        Terminator::Suspend { resume } => {
            check_block_args(func_name, block.id, *resume, &[], blocks, value_types)?;
        }
        Terminator::Return { .. } | Terminator::Unreachable => {}
    }

    Ok(())
}

fn check_block_args(
    func_name: &str,
    from_block: BlockId,
    target: BlockId,
    args: &[ValueId],
    blocks: &[Block],
    value_types: &HashMap<ValueId, IrTypeId>,
) -> Result<(), VerifyIrError> {
    let target_block = blocks.get(target.index()).ok_or_else(|| {
        err(
            func_name,
            Some(from_block),
            format!("branch to missing block {:?}", target),
        )
    })?;

    if args.len() != target_block.params.len() {
        return Err(err(
            func_name,
            Some(from_block),
            format!(
                "block {:?} expects {} args, got {}",
                target,
                target_block.params.len(),
                args.len()
            ),
        ));
    }

    for (idx, (arg, param)) in args.iter().zip(&target_block.params).enumerate() {
        let arg_ty = value_ty(func_name, from_block, *arg, value_types)?;
        if arg_ty != param.value.ty {
            return Err(err(
                func_name,
                Some(from_block),
                format!("arg {} to block {:?} has wrong type", idx, target),
            ));
        }
    }

    Ok(())
}

fn value_ty(
    func_name: &str,
    block_id: BlockId,
    value: ValueId,
    value_types: &HashMap<ValueId, IrTypeId>,
) -> Result<IrTypeId, VerifyIrError> {
    value_types.get(&value).copied().ok_or_else(|| {
        err(
            func_name,
            Some(block_id),
            format!("use of undefined value {:?}", value),
        )
    })
}

fn require_ptr(
    func_name: &str,
    block_id: BlockId,
    value: ValueId,
    value_types: &HashMap<ValueId, IrTypeId>,
    types: &IrTypeCache,
) -> Result<(), VerifyIrError> {
    let ty = value_ty(func_name, block_id, value, value_types)?;
    if !matches!(types.kind(ty), IrTypeKind::Ptr { .. }) {
        return Err(err(
            func_name,
            Some(block_id),
            format!("expected pointer value, got {:?}", types.kind(ty)),
        ));
    }
    Ok(())
}

fn require_bool(
    func_name: &str,
    block_id: BlockId,
    value: ValueId,
    value_types: &HashMap<ValueId, IrTypeId>,
    types: &IrTypeCache,
) -> Result<(), VerifyIrError> {
    let ty = value_ty(func_name, block_id, value, value_types)?;
    if !matches!(types.kind(ty), IrTypeKind::Bool) {
        return Err(err(func_name, Some(block_id), "condition expects bool"));
    }
    Ok(())
}

fn err(func_name: &str, block_id: Option<BlockId>, message: impl Into<String>) -> VerifyIrError {
    let message = match block_id {
        Some(block_id) => format!("ir verify: {func_name} {:?}: {}", block_id, message.into()),
        None => format!("ir verify: {func_name}: {}", message.into()),
    };
    VerifyIrError::new(message)
}

#[cfg(test)]
#[path = "../tests/ir/t_verify.rs"]
mod tests;
