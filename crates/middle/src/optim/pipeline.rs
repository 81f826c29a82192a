//! Pipeline for composing and running passes over a whole program.
//!
//! [`Step`] represents one unit of work in the pipeline. [`Pipeline`] holds an
//! ordered sequence of steps and executes them against a [`Program`]. Functions are
//! independent of each other, so every function runs the whole sequence in parallel.
//!
//! # Analysis lifecycle
//!
//! Passes that need a CFG or dominance information compute them from the current
//! instruction list. Nothing is cached across a pass that rewrites the function.
use rayon::prelude::*;
use tacit_ir::{Function, Program};

use super::{dce::DceSolver, lvn::LvnSolver};
use crate::{
    error::Result,
    ssa::{convert_to_ssa, SsaConfig},
};

/// A peripheral pass over the flat instruction list of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Local value numbering with constant folding and copy propagation.
    Lvn,
    /// Trivial dead code elimination.
    Dce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Convert every function to SSA form.
    Ssa,
    /// Run the passes once, in order.
    FuncPasses(Vec<Pass>),
    /// Repeat the passes until none of them changes the function, at most
    /// [`PipelineConfig::max_iterations`] times.
    FixedPoint(Vec<Pass>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_iterations: usize,
    pub ssa: SsaConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            ssa: SsaConfig::default(),
        }
    }
}

/// An ordered sequence of steps.
///
/// Use [`Pipeline::default_pipeline`] for the peripheral optimizations, or build a
/// custom sequence with [`Pipeline::new`] and [`Pipeline::add_step`].
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
    pub config: PipelineConfig,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// `lvn` and `dce` iterated to a fixed point.
    pub fn default_pipeline() -> Self {
        let mut p = Self::new();
        p.add_step(Step::FixedPoint(vec![Pass::Lvn, Pass::Dce]));
        p
    }

    /// Append a step to the pipeline. Returns `&mut Self` for chaining.
    pub fn add_step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Runs the pipeline on every function of `program`. Returns `true` if any
    /// function changed.
    ///
    /// Functions are processed on copies; `program` is left untouched if any of them fails.
    #[tracing::instrument(level = "debug", skip_all, fields(functions = program.functions.len()))]
    pub fn run(&self, program: &mut Program) -> Result<bool> {
        let mut functions = program.functions.clone();
        let changed = functions
            .par_iter_mut()
            .map(|func| self.run_func(func))
            .collect::<Result<Vec<bool>>>()?;

        program.functions = functions;
        Ok(changed.into_iter().any(|changed| changed))
    }

    /// Runs the pipeline on a single function.
    pub fn run_func(&self, func: &mut Function) -> Result<bool> {
        let mut changed = false;
        for step in &self.steps {
            changed |= match step {
                Step::Ssa => {
                    convert_to_ssa(func, &self.config.ssa)?;
                    true
                }
                Step::FuncPasses(passes) => run_func_passes(passes, func),
                Step::FixedPoint(passes) => {
                    let mut any = false;
                    for iteration in 0..self.config.max_iterations {
                        if !run_func_passes(passes, func) {
                            tracing::debug!(func = %func.name, iteration, "fixed point reached");
                            break;
                        }
                        any = true;
                    }
                    any
                }
            };
        }
        Ok(changed)
    }
}

/// Run a sequence of peripheral passes on a single function. Returns `true` if any
/// of them changed the function.
pub fn run_func_passes(passes: &[Pass], func: &mut Function) -> bool {
    let mut changed = false;
    for &pass in passes {
        changed |= run_pass(pass, func);
    }
    changed
}

fn run_pass(pass: Pass, func: &mut Function) -> bool {
    match pass {
        Pass::Lvn => LvnSolver::new().run(func),
        Pass::Dce => DceSolver::new().run(func),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacit_ir::{
        builder::test_util::{dump_func, parse_program},
        ErrorKind, Instruction, Opcode, Operation,
    };

    const PROGRAM: &str = r#"{
      "functions": [
        {
          "name": "main",
          "instrs": [
            {"op": "const", "dest": "a", "type": "int", "value": 4},
            {"op": "const", "dest": "b", "type": "int", "value": 2},
            {"op": "add", "dest": "sum1", "type": "int", "args": ["a", "b"]},
            {"op": "add", "dest": "sum2", "type": "int", "args": ["a", "b"]},
            {"op": "mul", "dest": "prod", "type": "int", "args": ["sum1", "sum2"]},
            {"op": "print", "args": ["prod"]}
          ]
        },
        {
          "name": "loop",
          "args": [{"name": "n", "type": "int"}],
          "instrs": [
            {"op": "const", "dest": "i", "type": "int", "value": 0},
            {"label": "head"},
            {"op": "lt", "dest": "c", "type": "bool", "args": ["i", "n"]},
            {"op": "br", "args": ["c"], "labels": ["exit", "body"]},
            {"label": "body"},
            {"op": "const", "dest": "one", "type": "int", "value": 1},
            {"op": "add", "dest": "i", "type": "int", "args": ["i", "one"]},
            {"op": "jmp", "labels": ["head"]},
            {"label": "exit"},
            {"op": "print", "args": ["i"]}
          ]
        }
      ]
    }"#;

    #[test]
    fn default_pipeline_reaches_fixed_point() {
        let mut program = parse_program(PROGRAM);
        let pipeline = Pipeline::default_pipeline();

        assert!(pipeline.run(&mut program).unwrap());
        insta::assert_snapshot!(dump_func(&program.functions[0]), @r"
        @main {
          prod: int = const 36;
          print prod;
        }
        ");

        assert!(!pipeline.run(&mut program).unwrap());
    }

    #[test]
    fn ssa_then_cleanup() {
        let mut program = parse_program(PROGRAM);
        let mut pipeline = Pipeline::new();
        pipeline
            .add_step(Step::Ssa)
            .add_step(Step::FixedPoint(vec![Pass::Lvn, Pass::Dce]));

        assert!(pipeline.run(&mut program).unwrap());
        insta::assert_snapshot!(dump_func(&program.functions[1]), @r"
        @loop(n.0: int) {
        .entry:
          i.0: int = const 0;
        .head:
          i.1: int = phi i.0 i.2 .entry .body;
          c: bool = lt i.1 n.0;
          br c .exit .body;
        .body:
          one: int = const 1;
          i.2: int = add i.1 one;
          jmp .head;
        .exit:
          print i.1;
        }
        ");
    }

    #[test]
    fn failure_leaves_program_untouched() {
        let mut program = parse_program(PROGRAM);
        let func = &mut program.functions[1];
        func.instrs.push(Operation::new(Opcode::Ret).into());
        func.instrs.push(Instruction::label("dead"));
        let before = program.clone();

        let mut pipeline = Pipeline::default_pipeline();
        pipeline.add_step(Step::Ssa);
        let err = pipeline.run(&mut program).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreachableBlock);
        assert_eq!(program, before);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let mut program = parse_program(PROGRAM);
        let before = program.clone();
        assert!(!Pipeline::new().run(&mut program).unwrap());
        assert_eq!(program, before);
    }
}
