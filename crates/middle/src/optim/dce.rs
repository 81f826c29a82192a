//! Trivial dead code elimination over the flat instruction list.
//!
//! Three kinds of instructions are removed:
//! - instructions that follow a terminator in the same block, which can never run,
//! - pure instructions whose destination is never used anywhere in the function,
//! - pure definitions that are overwritten later in the same block before any use.
use rustc_hash::{FxHashMap, FxHashSet};
use tacit_ir::{Function, Instruction};

#[derive(Debug, Default)]
pub struct DceSolver {
    dead: FxHashSet<usize>,
}

impl DceSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.dead.clear();
    }

    /// Removes dead instructions until none is left. Returns `true` if anything was removed.
    #[tracing::instrument(level = "debug", skip_all, fields(func = %func.name))]
    pub fn run(&mut self, func: &mut Function) -> bool {
        let mut changed = false;
        while self.run_dce(func) {
            changed = true;
        }
        changed
    }

    fn run_dce(&mut self, func: &mut Function) -> bool {
        self.clear();

        self.mark_after_terminator(func);
        self.mark_unused(func);
        self.mark_overwritten(func);

        if self.dead.is_empty() {
            return false;
        }

        tracing::debug!(removed = self.dead.len(), "remove dead instructions");
        let mut idx = 0;
        func.instrs.retain(|_| {
            let keep = !self.dead.contains(&idx);
            idx += 1;
            keep
        });
        true
    }

    fn mark_after_terminator(&mut self, func: &Function) {
        let mut terminated = false;
        for (idx, inst) in func.instrs.iter().enumerate() {
            match inst {
                Instruction::Label { .. } => terminated = false,
                Instruction::Operation(op) => {
                    if terminated {
                        self.dead.insert(idx);
                    } else if op.is_terminator() {
                        terminated = true;
                    }
                }
            }
        }
    }

    fn mark_unused(&mut self, func: &Function) {
        let used: FxHashSet<&str> = func
            .operations()
            .flat_map(|op| op.args.iter().map(String::as_str))
            .collect();

        for (idx, inst) in func.instrs.iter().enumerate() {
            let Some(op) = inst.as_operation() else {
                continue;
            };
            match &op.dest {
                Some(dest) if op.op.is_pure() && !used.contains(dest.as_str()) => {
                    self.dead.insert(idx);
                }
                _ => {}
            }
        }
    }

    fn mark_overwritten(&mut self, func: &Function) {
        // Pure definitions in the current block that have not been used yet.
        let mut unused_defs: FxHashMap<&str, usize> = FxHashMap::default();

        for (idx, inst) in func.instrs.iter().enumerate() {
            let op = match inst {
                Instruction::Label { .. } => {
                    unused_defs.clear();
                    continue;
                }
                Instruction::Operation(op) => op,
            };

            for arg in &op.args {
                unused_defs.remove(arg.as_str());
            }

            if let Some(dest) = &op.dest {
                if let Some(prev) = unused_defs.remove(dest.as_str()) {
                    self.dead.insert(prev);
                }
                if op.op.is_pure() {
                    unused_defs.insert(dest.as_str(), idx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tacit_ir::{builder::FunctionBuilder, ir_writer::FuncWriter, Type};

    fn dump(func: &Function) -> String {
        FuncWriter::new(func).dump_string()
    }

    #[test]
    fn removes_unused_definitions_transitively() {
        let mut builder = FunctionBuilder::new("main");
        builder.constant("a", Type::Int, 4);
        builder.constant("b", Type::Int, 2);
        builder.add("c", "a", "b");
        builder.add("d", "c", "c");
        builder.call(Some(("e", Type::Int)), "side_effect", ["b"]);
        builder.print(["b"]);
        let mut func = builder.finish();

        assert!(DceSolver::new().run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @main {
          b: int = const 2;
          e: int = call @side_effect b;
          print b;
        }
        ");
        assert!(!DceSolver::new().run(&mut func));
    }

    #[test]
    fn removes_overwritten_stores() {
        let mut builder = FunctionBuilder::new("store");
        builder.label("entry");
        builder.constant("a", Type::Int, 100);
        builder.constant("a", Type::Int, 42);
        builder.jmp("next");
        builder.label("next");
        builder.constant("b", Type::Int, 1);
        builder.print(["a"]);
        builder.constant("b", Type::Int, 2);
        builder.print(["b"]);
        let mut func = builder.finish();

        assert!(DceSolver::new().run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @store {
        .entry:
          a: int = const 42;
          jmp .next;
        .next:
          print a;
          b: int = const 2;
          print b;
        }
        ");
    }

    #[test]
    fn redefinition_in_another_block_is_kept() {
        let mut builder = FunctionBuilder::new("blocks");
        builder.label("entry");
        builder.constant("a", Type::Int, 1);
        builder.label("next");
        builder.print(["a"]);
        builder.constant("a", Type::Int, 2);
        builder.print(["a"]);
        let mut func = builder.finish();
        let before = func.clone();

        assert!(!DceSolver::new().run(&mut func));
        assert_eq!(func, before);
    }

    #[test]
    fn removes_code_after_terminator() {
        let mut builder = FunctionBuilder::new("term");
        builder.label("entry");
        builder.constant("a", Type::Int, 1);
        builder.ret(Some("a"));
        builder.print(["a"]);
        builder.jmp("exit");
        builder.label("exit");
        builder.ret(None);
        let mut func = builder.finish();

        assert!(DceSolver::new().run(&mut func));
        insta::assert_snapshot!(dump(&func), @r"
        @term {
        .entry:
          a: int = const 1;
          ret a;
        .exit:
          ret;
        }
        ");
    }
}
