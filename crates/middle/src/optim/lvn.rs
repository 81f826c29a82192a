//! Local value numbering.
//!
//! Each basic block is scanned once with a fresh value table. Every computed value
//! gets a number; the variable currently holding it is its home. A recomputation of
//! a known value becomes an `id` of the home, uses are redirected to the home, and
//! operations whose operands are all known constants are folded.
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tacit_ir::{Function, Instruction, Literal, LiteralKey, Opcode, Operation, Type};

use super::constant_folding::{fold_constant, fold_self_cmp};

type ValueNum = usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Const(LiteralKey),
    Expr(Opcode, SmallVec<[ValueNum; 2]>),
}

#[derive(Debug)]
struct Value {
    /// The variable holding the value. `None` once that variable is overwritten.
    home: Option<String>,
    constant: Option<Literal>,
    ty: Option<Type>,
}

#[derive(Debug, Default)]
pub struct LvnSolver {
    values: Vec<Value>,
    var_nums: FxHashMap<String, ValueNum>,
    key_nums: FxHashMap<ValueKey, ValueNum>,
}

impl LvnSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.var_nums.clear();
        self.key_nums.clear();
    }

    /// Returns `true` if any instruction of `func` was rewritten.
    #[tracing::instrument(level = "debug", skip_all, fields(func = %func.name))]
    pub fn run(&mut self, func: &mut Function) -> bool {
        self.clear();

        let mut changed = false;
        for inst in &mut func.instrs {
            match inst {
                Instruction::Label { .. } => self.clear(),
                Instruction::Operation(op) => changed |= self.visit(op),
            }
        }

        tracing::debug!(changed, "lvn finished");
        changed
    }

    fn visit(&mut self, op: &mut Operation) -> bool {
        let before = op.clone();

        // Phi arguments are values of the predecessors, not of this block.
        if op.is_phi() {
            if let Some(dest) = op.dest.clone() {
                let num = self.push_value(None, op.ty.clone());
                self.bind(&dest, num);
            }
            return false;
        }

        let nums: SmallVec<[ValueNum; 2]> = op.args.iter().map(|arg| self.num_of(arg)).collect();
        for (arg, &num) in op.args.iter_mut().zip(&nums) {
            if let Some(home) = &self.values[num].home {
                if home.as_str() != arg.as_str() {
                    *arg = home.clone();
                }
            }
        }

        if let Some(dest) = op.dest.clone() {
            let num = if op.op.is_pure() {
                self.number_pure(op, &dest, &nums)
            } else {
                self.push_value(None, op.ty.clone())
            };
            self.bind(&dest, num);
        }

        *op != before
    }

    /// Numbers the value computed by a pure operation, rewriting `op` if the value is
    /// a constant or is already held by another variable.
    fn number_pure(&mut self, op: &mut Operation, dest: &str, nums: &[ValueNum]) -> ValueNum {
        match (op.op, nums) {
            (Opcode::Id, &[num]) => {
                if let Some(constant) = self.values[num].constant {
                    make_const(op, constant);
                }
                return num;
            }
            (Opcode::Id, _) => return self.push_value(None, op.ty.clone()),
            (Opcode::Const, _) if op.value.is_none() => return self.push_value(None, op.ty.clone()),
            _ => {}
        }

        let folded = match op.op {
            Opcode::Const => op.value,
            code => {
                let constants: SmallVec<[Option<Literal>; 2]> =
                    nums.iter().map(|&num| self.values[num].constant).collect();
                fold_constant(code, &constants).or_else(|| self.fold_same_operands(code, nums))
            }
        };

        if let Some(constant) = folded {
            make_const(op, constant);
            let key = ValueKey::Const(constant.key());
            if let Some(&num) = self.key_nums.get(&key) {
                return num;
            }
            let num = self.push_value(Some(constant), op.ty.clone());
            self.key_nums.insert(key, num);
            return num;
        }

        let mut operands: SmallVec<[ValueNum; 2]> = nums.iter().copied().collect();
        if op.op.is_commutative() {
            operands.sort_unstable();
        }
        let key = ValueKey::Expr(op.op, operands);

        if let Some(&num) = self.key_nums.get(&key) {
            if let Some(home) = &self.values[num].home {
                if home.as_str() != dest {
                    let ty = op.ty.take();
                    *op = Operation::new(Opcode::Id).with_args([home.as_str()]);
                    op.dest = Some(dest.to_string());
                    op.ty = ty;
                }
                return num;
            }
        }

        let num = self.push_value(None, op.ty.clone());
        self.key_nums.insert(key, num);
        num
    }

    /// `x == x` and friends, for integer and boolean operands.
    fn fold_same_operands(&self, code: Opcode, nums: &[ValueNum]) -> Option<Literal> {
        match nums {
            [lhs, rhs] if lhs == rhs && code.is_cmp() => match self.values[*lhs].ty {
                Some(Type::Int | Type::Bool) => fold_self_cmp(code),
                _ => None,
            },
            _ => None,
        }
    }

    fn num_of(&mut self, var: &str) -> ValueNum {
        if let Some(&num) = self.var_nums.get(var) {
            return num;
        }

        // Live on entry to the block.
        let num = self.push_value(None, None);
        self.bind(var, num);
        num
    }

    fn push_value(&mut self, constant: Option<Literal>, ty: Option<Type>) -> ValueNum {
        self.values.push(Value {
            home: None,
            constant,
            ty,
        });
        self.values.len() - 1
    }

    /// Makes `var` hold `num`. The value `var` held before loses its home.
    fn bind(&mut self, var: &str, num: ValueNum) {
        if let Some(&old) = self.var_nums.get(var) {
            if self.values[old].home.as_deref() == Some(var) {
                self.values[old].home = None;
            }
        }

        self.var_nums.insert(var.to_string(), num);
        let value = &mut self.values[num];
        if value.home.is_none() {
            value.home = Some(var.to_string());
        }
    }
}

fn make_const(op: &mut Operation, constant: Literal) {
    op.op = Opcode::Const;
    op.args.clear();
    op.funcs.clear();
    op.labels.clear();
    op.value = Some(constant);
}

#[cfg(test)]
mod tests {
    use super::*;

    use tacit_ir::{builder::FunctionBuilder, ir_writer::FuncWriter};

    fn run(func: &mut Function) -> bool {
        LvnSolver::new().run(func)
    }

    fn dump(func: &Function) -> String {
        FuncWriter::new(func).dump_string()
    }

    #[test]
    fn folds_constants() {
        let mut builder = FunctionBuilder::new("main");
        builder.constant("a", Type::Int, 4);
        builder.constant("b", Type::Int, 2);
        builder.add("sum1", "a", "b");
        builder.add("sum2", "b", "a");
        builder.binary(Opcode::Mul, "prod", Type::Int, "sum1", "sum2");
        builder.print(["prod"]);
        let mut func = builder.finish();

        assert!(run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @main {
          a: int = const 4;
          b: int = const 2;
          sum1: int = const 6;
          sum2: int = const 6;
          prod: int = const 36;
          print prod;
        }
        ");
        assert!(!run(&mut func));
    }

    #[test]
    fn eliminates_common_subexpressions() {
        let mut builder = FunctionBuilder::new("f");
        builder.append_parameter("x", Type::Int);
        builder.append_parameter("y", Type::Int);
        builder.add("a", "x", "y");
        builder.add("b", "y", "x");
        builder.id("c", Type::Int, "b");
        builder.print(["c"]);
        let mut func = builder.finish();

        assert!(run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @f(x: int, y: int) {
          a: int = add x y;
          b: int = id a;
          c: int = id a;
          print a;
        }
        ");
    }

    #[test]
    fn overwritten_home_is_not_reused() {
        let mut builder = FunctionBuilder::new("g");
        builder.append_parameter("x", Type::Int);
        builder.append_parameter("y", Type::Int);
        builder.add("a", "x", "y");
        builder.id("c", Type::Int, "x");
        builder.constant("a", Type::Int, 5);
        builder.add("b", "x", "y");
        builder.constant("x", Type::Int, 0);
        builder.print(["a", "b", "c"]);
        let mut func = builder.finish();
        let before = func.clone();

        assert!(!run(&mut func));
        assert_eq!(func, before);
    }

    #[test]
    fn logic_folding_and_block_boundaries() {
        let mut builder = FunctionBuilder::new("h");
        builder.append_parameter("u", Type::Bool);
        builder.label("entry");
        builder.constant("f", Type::Bool, false);
        builder.binary(Opcode::And, "r", Type::Bool, "u", "f");
        builder.constant("t", Type::Bool, true);
        builder.binary(Opcode::Or, "s", Type::Bool, "t", "u");
        builder.jmp("next");
        builder.label("next");
        builder.binary(Opcode::And, "q", Type::Bool, "u", "f");
        builder.print(["r", "s", "q"]);
        let mut func = builder.finish();

        assert!(run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @h(u: bool) {
        .entry:
          f: bool = const false;
          r: bool = const false;
          t: bool = const true;
          s: bool = const true;
          jmp .next;
        .next:
          q: bool = and u f;
          print r s q;
        }
        ");
    }

    #[test]
    fn division_by_zero_and_self_comparison() {
        let mut builder = FunctionBuilder::new("d");
        builder.append_parameter("x", Type::Int);
        builder.constant("one", Type::Int, 1);
        builder.constant("zero", Type::Int, 0);
        builder.binary(Opcode::Div, "q", Type::Int, "one", "zero");
        builder.add("k", "x", "x");
        builder.binary(Opcode::Le, "e", Type::Bool, "k", "k");
        builder.print(["q", "e"]);
        let mut func = builder.finish();

        assert!(run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @d(x: int) {
          one: int = const 1;
          zero: int = const 0;
          q: int = div one zero;
          k: int = add x x;
          e: bool = const true;
          print q e;
        }
        ");
    }

    #[test]
    fn phi_arguments_are_left_alone() {
        let mut builder = FunctionBuilder::new("p");
        builder.label("entry");
        builder.constant("a", Type::Int, 1);
        builder.id("b", Type::Int, "a");
        builder.label("join");
        builder.inst(
            Operation::new(Opcode::Phi)
                .with_dest("v", Type::Int)
                .with_args(["b"])
                .with_labels(["entry"]),
        );
        builder.id("w", Type::Int, "v");
        let mut func = builder.finish();

        run(&mut func);
        let phi = func.operations().find(|op| op.is_phi()).unwrap();
        assert_eq!(phi.args, ["b"]);
        let w = func.operations().last().unwrap();
        assert_eq!(w.op, Opcode::Id);
        assert_eq!(w.args, ["v"]);
    }
}
