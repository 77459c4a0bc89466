use crate::analysis::crossing::uses_reachable_from;
use crate::analysis::{Cfg, CrossingOracle, LivenessCrossing};
use crate::ir::{AllocaLen, BinOp, FunctionBuilder, IrTypeCache, User};

include!("../ir_test_utils.rs");

#[test]
fn test_crossing_values_in_program_order() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let u64_ty = u64_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("cross", sig(vec![u32_ty, u64_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let a = builder.add_block_param(entry, u32_ty);
    let b = builder.add_block_param(entry, u64_ty);
    let k = builder.const_int(entry, 3, false, 32, u32_ty);
    let sum = builder.binop(entry, BinOp::Add, a, k, u32_ty);
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![b, sum, k], None);
    builder.set_terminator(resume, ret());
    let func = builder.finish();

    let suspends = func.suspends();
    let candidates = LivenessCrossing.candidates(&func, &suspends);

    assert_eq!(candidates.len(), 1);
    let crossing: Vec<_> = candidates[0].values.keys().copied().collect();
    // `a` dies in the entry block. The constant is still live until
    // rematerialization runs.
    assert_eq!(crossing, vec![b, k, sum]);
    let uses = &candidates[0].values[&sum];
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].block, resume);
    assert!(matches!(uses[0].user, User::Inst(_)));
    assert!(candidates[0].allocas.is_empty());
}

#[test]
fn test_crossing_allocas() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);
    let ptr_u32 = ptr_ty(&mut types, u32_ty);

    let mut builder = FunctionBuilder::new("bufs", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let value = builder.add_block_param(entry, u32_ty);
    let kept = builder.alloca(entry, u32_ty, AllocaLen::Static(4), None, ptr_u32);
    let local = builder.alloca(entry, u32_ty, AllocaLen::Static(1), None, ptr_u32);
    let escaped = builder.alloca(entry, u32_ty, AllocaLen::Static(1), None, ptr_u32);
    builder.store(entry, kept, value);
    builder.store(entry, local, value);
    builder.call(entry, "publish", vec![escaped], None);
    builder.set_terminator(entry, suspend(resume));
    let elem = builder.field_addr(resume, kept, 0, ptr_u32);
    builder.load(resume, elem, u32_ty);
    builder.set_terminator(resume, ret());
    let func = builder.finish();

    let suspends = func.suspends();
    let candidates = LivenessCrossing.candidates(&func, &suspends);

    let allocas: Vec<_> = candidates[0].allocas.iter().map(|a| a.alloca).collect();
    assert_eq!(allocas, vec![kept, escaped]);
    assert_eq!(candidates[0].allocas[0].aliases, vec![kept, elem]);
    // Buffers are never reported as plain values.
    assert!(!candidates[0].values.contains_key(&kept));
    assert!(!candidates[0].values.contains_key(&elem));
}

#[test]
fn test_uses_reachable_from_resume() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("reach", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let tail = builder.add_block();
    let value = builder.add_block_param(entry, u32_ty);
    builder.call(entry, "before", vec![value], None);
    builder.set_terminator(entry, suspend(resume));
    builder.set_terminator(resume, br(tail));
    builder.call(tail, "after", vec![value], None);
    builder.set_terminator(tail, ret());
    let func = builder.finish();
    let cfg = Cfg::new(&func);

    let uses = uses_reachable_from(&func, &cfg, value, entry, resume);

    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].block, tail);
}
