//! Text formatter for SSA IR.

use std::fmt::Write as _;

use super::model::*;
use super::types::{IrTypeCache, IrTypeId, IrTypeKind};

pub fn format_func(func: &Function, types: &IrTypeCache) -> String {
    let mut formatter = Formatter::new(types);
    formatter.write_function(func);
    formatter.finish()
}

pub fn format_type(ty: IrTypeId, types: &IrTypeCache) -> String {
    let mut formatter = Formatter::new(types);
    formatter.write_type(ty);
    formatter.finish()
}

struct Formatter<'a> {
    types: &'a IrTypeCache,
    out: String,
}

impl<'a> Formatter<'a> {
    fn new(types: &'a IrTypeCache) -> Self {
        Self {
            types,
            out: String::new(),
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn write_function(&mut self, func: &Function) {
        let _ = write!(&mut self.out, "fn {}(", func.name);
        for (i, param) in func.sig.params.iter().enumerate() {
            if i > 0 {
                let _ = write!(&mut self.out, ", ");
            }
            self.write_type(*param);
        }
        let _ = write!(&mut self.out, ") -> ");
        self.write_type(func.sig.ret);
        let _ = writeln!(&mut self.out, " {{");

        for (index, block) in func.blocks.iter().enumerate() {
            if index > 0 {
                let _ = writeln!(&mut self.out);
            }
            self.write_block(block);
        }

        let _ = writeln!(&mut self.out, "}}");
    }

    fn write_block(&mut self, block: &Block) {
        let _ = write!(&mut self.out, "  bb{}(", block.id.0);
        for (i, param) in block.params.iter().enumerate() {
            if i > 0 {
                let _ = write!(&mut self.out, ", ");
            }
            let _ = write!(&mut self.out, "%v{}: ", param.value.id.0);
            self.write_type(param.value.ty);
        }
        let _ = writeln!(&mut self.out, "):");

        for inst in &block.insts {
            self.write_instruction(inst);
        }
        if !block.insts.is_empty() {
            let _ = writeln!(&mut self.out);
        }
        self.write_terminator(&block.term);
    }

    fn write_instruction(&mut self, inst: &Instruction) {
        let _ = write!(&mut self.out, "    ");
        if let Some(result) = &inst.result {
            let _ = write!(&mut self.out, "%v{}: ", result.id.0);
            self.write_type(result.ty);
            let _ = write!(&mut self.out, " = ");
        }
        self.write_inst_kind(&inst.kind);
        let _ = writeln!(&mut self.out);
    }

    fn write_inst_kind(&mut self, kind: &InstKind) {
        match kind {
            InstKind::Const { value } => {
                let _ = write!(&mut self.out, "const ");
                self.write_const(value);
            }
            InstKind::BinOp { op, lhs, rhs } => {
                let _ = write!(&mut self.out, "{} %v{}, %v{}", op_name(op), lhs.0, rhs.0);
            }
            InstKind::UnOp { op, value } => {
                let _ = write!(&mut self.out, "{} %v{}", unop_name(op), value.0);
            }
            InstKind::Cmp { op, lhs, rhs } => {
                let _ = write!(
                    &mut self.out,
                    "cmp.{} %v{}, %v{}",
                    cmp_name(op),
                    lhs.0,
                    rhs.0
                );
            }
            InstKind::Cast { kind, value, ty } => {
                let kind = match kind {
                    CastKind::IntTrunc => "trunc",
                    CastKind::IntExtend { signed: true } => "sext",
                    CastKind::IntExtend { signed: false } => "zext",
                    CastKind::PtrToInt => "ptr_to_int",
                    CastKind::IntToPtr => "int_to_ptr",
                    CastKind::PtrToPtr => "ptr",
                };
                let _ = write!(&mut self.out, "cast.{} %v{} to ", kind, value.0);
                self.write_type(*ty);
            }
            InstKind::Select {
                cond,
                then_value,
                else_value,
            } => {
                let _ = write!(
                    &mut self.out,
                    "select %v{}, %v{}, %v{}",
                    cond.0, then_value.0, else_value.0
                );
            }
            InstKind::Alloca { ty, len, align } => {
                let _ = write!(&mut self.out, "alloca ");
                self.write_type(*ty);
                match len {
                    AllocaLen::Static(1) => {}
                    AllocaLen::Static(n) => {
                        let _ = write!(&mut self.out, ", {}", n);
                    }
                    AllocaLen::Dynamic(len) => {
                        let _ = write!(&mut self.out, ", %v{}", len.0);
                    }
                }
                if let Some(align) = align {
                    let _ = write!(&mut self.out, ", align {}", align);
                }
            }
            InstKind::LifetimeStart { ptr } => {
                let _ = write!(&mut self.out, "lifetime.start %v{}", ptr.0);
            }
            InstKind::LifetimeEnd { ptr } => {
                let _ = write!(&mut self.out, "lifetime.end %v{}", ptr.0);
            }
            InstKind::FieldAddr { base, index } => {
                let _ = write!(&mut self.out, "field_addr %v{}, {}", base.0, index);
            }
            InstKind::IndexAddr { base, index } => {
                let _ = write!(&mut self.out, "index_addr %v{}, %v{}", base.0, index.0);
            }
            InstKind::Load { ptr } => {
                let _ = write!(&mut self.out, "load %v{}", ptr.0);
            }
            InstKind::Store { ptr, value } => {
                let _ = write!(&mut self.out, "store %v{}, %v{}", ptr.0, value.0);
            }
            InstKind::Call { callee, args } => {
                let _ = write!(&mut self.out, "call ");
                match callee {
                    Callee::Named(name) => {
                        let _ = write!(&mut self.out, "@{}", name);
                    }
                    Callee::Value(value) => {
                        let _ = write!(&mut self.out, "%v{}", value.0);
                    }
                }
                let _ = write!(&mut self.out, "(");
                self.write_value_list(args);
                let _ = write!(&mut self.out, ")");
            }
            InstKind::FrameAlloc { ty } => {
                let _ = write!(&mut self.out, "frame_alloc ");
                self.write_type(*ty);
            }
            InstKind::FrameAddr { frame, offset } => {
                let _ = write!(&mut self.out, "frame_addr %v{}, {}", frame.0, offset);
            }
        }
    }

    fn write_terminator(&mut self, term: &Terminator) {
        let _ = write!(&mut self.out, "    ");
        match term {
            Terminator::Br { target, args } => {
                let _ = write!(&mut self.out, "br bb{}", target.0);
                self.write_block_args(args);
            }
            Terminator::CondBr {
                cond,
                then_bb,
                then_args,
                else_bb,
                else_args,
            } => {
                let _ = write!(&mut self.out, "cbr %v{}, bb{}", cond.0, then_bb.0);
                self.write_block_args(then_args);
                let _ = write!(&mut self.out, ", bb{}", else_bb.0);
                self.write_block_args(else_args);
            }
            Terminator::Switch {
                value,
                cases,
                default,
                default_args,
            } => {
                let _ = writeln!(&mut self.out, "switch %v{} {{", value.0);
                for case in cases {
                    let _ = write!(&mut self.out, "      case ");
                    self.write_const(&case.value);
                    let _ = write!(&mut self.out, " -> bb{}", case.target.0);
                    self.write_block_args(&case.args);
                    let _ = writeln!(&mut self.out);
                }
                let _ = write!(&mut self.out, "      default -> bb{}", default.0);
                self.write_block_args(default_args);
                let _ = writeln!(&mut self.out);
                let _ = writeln!(&mut self.out, "    }}");
                return;
            }
            Terminator::Suspend { resume } => {
                let _ = write!(&mut self.out, "suspend bb{}", resume.0);
            }
            Terminator::Return { value } => {
                let _ = write!(&mut self.out, "ret");
                if let Some(value) = value {
                    let _ = write!(&mut self.out, " %v{}", value.0);
                }
            }
            Terminator::Unreachable => {
                let _ = write!(&mut self.out, "unreachable");
            }
        }
        let _ = writeln!(&mut self.out);
    }

    fn write_block_args(&mut self, args: &[ValueId]) {
        if args.is_empty() {
            return;
        }
        let _ = write!(&mut self.out, "(");
        self.write_value_list(args);
        let _ = write!(&mut self.out, ")");
    }

    fn write_value_list(&mut self, values: &[ValueId]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                let _ = write!(&mut self.out, ", ");
            }
            let _ = write!(&mut self.out, "%v{}", value.0);
        }
    }

    fn write_const(&mut self, value: &ConstValue) {
        match value {
            ConstValue::Unit => {
                let _ = write!(&mut self.out, "()");
            }
            ConstValue::Bool(value) => {
                let _ = write!(&mut self.out, "{}", value);
            }
            ConstValue::Int { value, .. } => {
                let _ = write!(&mut self.out, "{}", value);
            }
        }
    }

    fn write_type(&mut self, ty: IrTypeId) {
        let info = self.types.get(ty);
        if let Some(name) = &info.name {
            let _ = write!(&mut self.out, "{}", name);
            return;
        }
        match &info.kind {
            IrTypeKind::Unit => {
                let _ = write!(&mut self.out, "()");
            }
            IrTypeKind::Bool => {
                let _ = write!(&mut self.out, "bool");
            }
            IrTypeKind::Int { signed, bits } => {
                let prefix = if *signed { "i" } else { "u" };
                let _ = write!(&mut self.out, "{}{}", prefix, bits);
            }
            IrTypeKind::Float { bits } => {
                let _ = write!(&mut self.out, "f{}", bits);
            }
            IrTypeKind::Ptr { elem } => {
                let _ = write!(&mut self.out, "ptr<");
                self.write_type(*elem);
                let _ = write!(&mut self.out, ">");
            }
            IrTypeKind::Vector { elem, lanes } => {
                let _ = write!(&mut self.out, "<{} x ", lanes);
                self.write_type(*elem);
                let _ = write!(&mut self.out, ">");
            }
            IrTypeKind::Array { elem, len } => {
                self.write_type(*elem);
                let _ = write!(&mut self.out, "[{}]", len);
            }
            IrTypeKind::Struct { fields } => {
                let _ = write!(&mut self.out, "struct {{ ");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(&mut self.out, ", ");
                    }
                    let _ = write!(&mut self.out, "{}: ", field.name);
                    self.write_type(field.ty);
                }
                let _ = write!(&mut self.out, " }}");
            }
            IrTypeKind::Blob { size, align } => {
                let _ = write!(&mut self.out, "blob<{}, align={}>", size, align);
            }
        }
    }
}

fn op_name(op: &BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
    }
}

fn cmp_name(op: &CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "eq",
        CmpOp::Ne => "ne",
        CmpOp::Lt => "lt",
        CmpOp::Le => "le",
        CmpOp::Gt => "gt",
        CmpOp::Ge => "ge",
    }
}

fn unop_name(op: &UnOp) -> &'static str {
    match op {
        UnOp::Neg => "neg",
        UnOp::Not => "not",
        UnOp::BitNot => "bitnot",
    }
}

#[cfg(test)]
#[path = "../tests/ir/t_format.rs"]
mod tests;
