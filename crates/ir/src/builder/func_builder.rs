use crate::{Argument, Function, Instruction, Literal, Opcode, Operation, Type};

/// Appends instructions to a function in program order.
///
/// ```
/// use tacit_ir::{builder::FunctionBuilder, Opcode, Type};
///
/// let mut builder = FunctionBuilder::new("inc");
/// builder.append_parameter("n", Type::Int);
/// builder.constant("one", Type::Int, 1);
/// builder.binary(Opcode::Add, "m", Type::Int, "n", "one");
/// builder.ret(Some("m"));
/// let func = builder.finish();
/// assert_eq!(func.instrs.len(), 3);
/// ```
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            func: Function::new(name),
        }
    }

    pub fn append_parameter(&mut self, name: &str, ty: Type) -> &mut Self {
        self.func.args.push(Argument::new(name, ty));
        self
    }

    pub fn set_ret_ty(&mut self, ty: Type) -> &mut Self {
        self.func.ret_ty = Some(ty);
        self
    }

    pub fn label(&mut self, name: &str) -> &mut Self {
        self.func.instrs.push(Instruction::label(name));
        self
    }

    pub fn inst(&mut self, op: Operation) -> &mut Self {
        self.func.instrs.push(op.into());
        self
    }

    pub fn constant(&mut self, dest: &str, ty: Type, value: impl Into<Literal>) -> &mut Self {
        self.inst(
            Operation::new(Opcode::Const)
                .with_dest(dest, ty)
                .with_value(value),
        )
    }

    pub fn id(&mut self, dest: &str, ty: Type, src: &str) -> &mut Self {
        self.inst(Operation::new(Opcode::Id).with_dest(dest, ty).with_args([src]))
    }

    pub fn unary(&mut self, code: Opcode, dest: &str, ty: Type, arg: &str) -> &mut Self {
        self.inst(Operation::new(code).with_dest(dest, ty).with_args([arg]))
    }

    pub fn binary(&mut self, code: Opcode, dest: &str, ty: Type, lhs: &str, rhs: &str) -> &mut Self {
        self.inst(Operation::new(code).with_dest(dest, ty).with_args([lhs, rhs]))
    }

    pub fn add(&mut self, dest: &str, lhs: &str, rhs: &str) -> &mut Self {
        self.binary(Opcode::Add, dest, Type::Int, lhs, rhs)
    }

    pub fn jmp(&mut self, dest: &str) -> &mut Self {
        self.inst(Operation::new(Opcode::Jmp).with_labels([dest]))
    }

    /// Conditional branch. Control goes to `else_label` when `cond` is false and to
    /// `then_label` otherwise.
    pub fn br(&mut self, cond: &str, else_label: &str, then_label: &str) -> &mut Self {
        self.inst(
            Operation::new(Opcode::Br)
                .with_args([cond])
                .with_labels([else_label, then_label]),
        )
    }

    pub fn ret(&mut self, arg: Option<&str>) -> &mut Self {
        self.inst(Operation::new(Opcode::Ret).with_args(arg))
    }

    pub fn print<'a>(&mut self, args: impl IntoIterator<Item = &'a str>) -> &mut Self {
        self.inst(Operation::new(Opcode::Print).with_args(args))
    }

    pub fn call<'a>(
        &mut self,
        dest: Option<(&str, Type)>,
        callee: &str,
        args: impl IntoIterator<Item = &'a str>,
    ) -> &mut Self {
        let mut op = Operation::new(Opcode::Call)
            .with_args(args)
            .with_funcs([callee]);
        if let Some((dest, ty)) = dest {
            op = op.with_dest(dest, ty);
        }
        self.inst(op)
    }

    pub fn finish(self) -> Function {
        self.func
    }
}
