use std::collections::HashSet;

use crate::analysis::{Cfg, liveness};
use crate::ir::{BinOp, FunctionBuilder, IrTypeCache, Terminator};

include!("../ir_test_utils.rs");

#[test]
fn test_liveness_across_suspend() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("live", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let arg = builder.add_block_param(entry, u32_ty);
    let doubled = builder.binop(entry, BinOp::Add, arg, arg, u32_ty);
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![doubled], None);
    builder.set_terminator(resume, ret());
    let func = builder.finish();

    let cfg = Cfg::new(&func);
    let live = liveness::analyze(&func, &cfg);

    assert!(live[0].live_in.is_empty());
    assert_eq!(live[0].live_out, HashSet::from([doubled]));
    assert_eq!(live[1].live_in, HashSet::from([doubled]));
    assert!(live[1].live_out.is_empty());
}

#[test]
fn test_liveness_block_args_end_at_edge() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);

    let mut builder = FunctionBuilder::new("args", sig(vec![u32_ty], u32_ty));
    let entry = builder.add_block();
    let next = builder.add_block();
    let arg = builder.add_block_param(entry, u32_ty);
    let sum = builder.binop(entry, BinOp::Add, arg, arg, u32_ty);
    builder.set_terminator(
        entry,
        Terminator::Br {
            target: next,
            args: vec![sum],
        },
    );
    let param = builder.add_block_param(next, u32_ty);
    builder.set_terminator(next, Terminator::Return { value: Some(param) });
    let func = builder.finish();

    let cfg = Cfg::new(&func);
    let live = liveness::analyze(&func, &cfg);

    assert!(live[0].live_out.contains(&sum));
    assert!(!live[1].live_in.contains(&sum));
    assert!(!live[1].live_in.contains(&param));
}

#[test]
fn test_liveness_through_loop() {
    let mut types = IrTypeCache::new();
    let bool_ty = bool_ty(&mut types);
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("loop", sig(vec![bool_ty, u32_ty], unit));
    let entry = builder.add_block();
    let header = builder.add_block();
    let exit = builder.add_block();
    let cond = builder.add_block_param(entry, bool_ty);
    let value = builder.add_block_param(entry, u32_ty);
    builder.set_terminator(entry, br(header));
    builder.set_terminator(
        header,
        Terminator::CondBr {
            cond,
            then_bb: header,
            then_args: vec![],
            else_bb: exit,
            else_args: vec![],
        },
    );
    builder.call(exit, "use", vec![value], None);
    builder.set_terminator(exit, ret());
    let func = builder.finish();

    let cfg = Cfg::new(&func);
    let live = liveness::analyze(&func, &cfg);

    assert_eq!(live[1].live_in, HashSet::from([cond, value]));
    assert_eq!(live[1].live_out, HashSet::from([cond, value]));
    assert_eq!(live[2].live_in, HashSet::from([value]));
}
