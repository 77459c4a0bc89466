use crate::analysis::{Cfg, DomTree};
use crate::ir::{
    BlockId, Function, FunctionBuilder, IdAllocator, IrTypeCache, Terminator, ValueId, format_func,
};
use crate::transform::SsaUpdater;
use indoc::indoc;

include!("../ir_test_utils.rs");

// bb0(%v0: bool, %v1: u32) branches to bb1, which defines %v2, and bb2; both
// join in bb3.
fn diamond(types: &mut IrTypeCache) -> Function {
    let bool_ty = bool_ty(types);
    let u32_ty = u32_ty(types);
    let unit = unit_ty(types);

    let mut builder = FunctionBuilder::new("diamond", sig(vec![bool_ty, u32_ty], unit));
    let entry = builder.add_block();
    let left = builder.add_block();
    let right = builder.add_block();
    let join = builder.add_block();
    let cond = builder.add_block_param(entry, bool_ty);
    builder.add_block_param(entry, u32_ty);
    builder.set_terminator(
        entry,
        Terminator::CondBr {
            cond,
            then_bb: left,
            then_args: vec![],
            else_bb: right,
            else_args: vec![],
        },
    );
    builder.const_int(left, 5, false, 32, u32_ty);
    builder.set_terminator(left, br(join));
    builder.set_terminator(right, br(join));
    builder.set_terminator(join, ret());
    builder.finish()
}

#[test]
fn test_merge_gets_block_param() {
    let mut types = IrTypeCache::new();
    let mut func = diamond(&mut types);
    let u32_ty = u32_ty(&mut types);
    let cfg = Cfg::new(&func);
    let dom = DomTree::new(&cfg);
    let mut ids = IdAllocator::for_function(&func);

    let mut updater = SsaUpdater::new(u32_ty);
    updater.add_available_value(BlockId(0), ValueId(1));
    updater.add_available_value(BlockId(1), ValueId(2));
    let merged = updater.value_at_end_of_block(&mut func, &cfg, &dom, &mut ids, BlockId(3));

    assert_eq!(merged, Some(ValueId(3)));
    assert_eq!(updater.created_params(), &[(BlockId(3), ValueId(3))]);
    assert_eq!(updater.simplify(&mut func, &cfg), 0);
    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn diamond(bool, u32) -> () {
              bb0(%v0: bool, %v1: u32):
                cbr %v0, bb1, bb2

              bb1():
                %v2: u32 = const 5

                br bb3(%v2)

              bb2():
                br bb3(%v1)

              bb3(%v3: u32):
                ret
            }
        "},
    );
}

#[test]
fn test_trivial_param_is_removed() {
    let mut types = IrTypeCache::new();
    let mut func = diamond(&mut types);
    let before = func.clone();
    let u32_ty = u32_ty(&mut types);
    let cfg = Cfg::new(&func);
    let dom = DomTree::new(&cfg);
    let mut ids = IdAllocator::for_function(&func);

    let mut updater = SsaUpdater::new(u32_ty);
    updater.add_available_value(BlockId(0), ValueId(1));
    let merged = updater.value_at_end_of_block(&mut func, &cfg, &dom, &mut ids, BlockId(3));
    assert_eq!(merged, Some(ValueId(3)));

    assert_eq!(updater.simplify(&mut func, &cfg), 1);
    assert!(updater.created_params().is_empty());
    assert_eq!(func, before);
}

#[test]
fn test_single_predecessor_chain_reuses_value() {
    let mut types = IrTypeCache::new();
    let mut func = diamond(&mut types);
    let u32_ty = u32_ty(&mut types);
    let cfg = Cfg::new(&func);
    let dom = DomTree::new(&cfg);
    let mut ids = IdAllocator::for_function(&func);

    let mut updater = SsaUpdater::new(u32_ty);
    updater.add_available_value(BlockId(0), ValueId(1));
    let value = updater.value_at_end_of_block(&mut func, &cfg, &dom, &mut ids, BlockId(2));

    assert_eq!(value, Some(ValueId(1)));
    assert!(updater.created_params().is_empty());
}

#[test]
fn test_no_reaching_definition() {
    let mut types = IrTypeCache::new();
    let mut func = diamond(&mut types);
    let u32_ty = u32_ty(&mut types);
    let cfg = Cfg::new(&func);
    let dom = DomTree::new(&cfg);
    let mut ids = IdAllocator::for_function(&func);

    let mut updater = SsaUpdater::new(u32_ty);
    updater.add_available_value(BlockId(1), ValueId(2));

    assert_eq!(
        updater.value_at_end_of_block(&mut func, &cfg, &dom, &mut ids, BlockId(2)),
        None
    );
}
