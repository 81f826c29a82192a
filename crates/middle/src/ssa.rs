//! Conversion to static single assignment form.
//!
//! Phis are placed with the classic algorithm of Cytron et al.: every block in the
//! iterated dominance frontier of a variable's definitions gets a phi for it. Only
//! "global" variables, those that are live on entry to some block, are considered.
//! Variables are then renamed in a preorder walk of the dominator tree with one
//! version stack per variable.
//!
//! Conversion works on copies of the block bodies. The function is only rewritten
//! once every step has succeeded.
use std::iter;

use cranelift_entity::SecondaryMap;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use tacit_ir::{
    Argument, BlockId, CfgConfig, ControlFlowGraph, Function, Opcode, Operation, Type,
};

use crate::{
    block_set::BlockSet,
    domtree::{DFSet, DomTree, DominatorTreeTraversable},
    error::{AnalysisError, Result},
};

/// The argument given to a phi slot when no definition reaches the incoming edge.
pub const UNDEF_NAME: &str = "__undefined";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaConfig {
    /// Rename every defined variable, not only the globals.
    pub rename_locals: bool,
    /// Phi argument used for edges along which a variable is undefined.
    pub undef_name: String,
}

impl Default for SsaConfig {
    fn default() -> Self {
        Self {
            rename_locals: false,
            undef_name: UNDEF_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsaSummary {
    /// Global variables in order of first use.
    pub globals: Vec<String>,
    pub phis: usize,
}

/// Converts `func` to SSA form.
///
/// Fails without touching `func` if it already contains phis, has a block that is
/// unreachable from the entry, or uses a variable no definition reaches.
#[tracing::instrument(level = "debug", skip_all, fields(func = %func.name))]
pub fn convert_to_ssa(func: &mut Function, config: &SsaConfig) -> Result<SsaSummary> {
    if func.has_phi() {
        return Err(AnalysisError::AlreadyInSsa {
            func: func.name.clone(),
        });
    }

    let cfg = ControlFlowGraph::compute(func, &CfgConfig::default())?;
    let mut domtree = DomTree::new();
    domtree.compute(&cfg);
    let df = domtree.compute_df(&cfg);
    let mut tree = DominatorTreeTraversable::default();
    tree.compute(&domtree);

    let globals = Globals::compute(&cfg, &func.args);

    let mut bodies = SecondaryMap::new();
    for (block, data) in cfg.blocks() {
        bodies[block] = data.insts.clone();
    }
    let mut renamer = Renamer {
        cfg: &cfg,
        tree: &tree,
        globals: &globals,
        config,
        bodies,
        phi_vars: SecondaryMap::new(),
    };
    let phis = renamer.insert_phis(&df);
    tracing::debug!(globals = globals.len(), phis, "phis inserted");

    let mut state = RenameState::new();
    let args = renamer.rename(&func.args, &mut state)?;

    let Renamer { mut bodies, .. } = renamer;
    func.instrs = cfg.assemble(|block| std::mem::take(&mut bodies[block]));
    func.args = args;

    Ok(SsaSummary {
        globals: globals.iter().map(str::to_string).collect(),
        phis,
    })
}

/// Variables that are live on entry to at least one block, with the blocks
/// that define them.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    names: IndexSet<String, FxBuildHasher>,
    def_blocks: IndexMap<String, BlockSet, FxBuildHasher>,
    types: FxHashMap<String, Type>,
}

impl Globals {
    /// Parameters count as definitions in the entry block.
    pub fn compute(cfg: &ControlFlowGraph, params: &[Argument]) -> Self {
        let mut globals = Self::default();
        for param in params {
            globals.add_def(&param.name, cfg.entry(), Some(&param.ty));
        }

        for (block, data) in cfg.blocks() {
            let mut killed = FxHashSet::default();
            for inst in &data.insts {
                for arg in &inst.args {
                    if !killed.contains(arg.as_str()) {
                        globals.names.insert(arg.clone());
                    }
                }
                if let Some(dest) = &inst.dest {
                    killed.insert(dest.as_str());
                    globals.add_def(dest, block, inst.ty.as_ref());
                }
            }
        }

        globals
    }

    pub fn is_global(&self, var: &str) -> bool {
        self.names.contains(var)
    }

    pub fn is_defined(&self, var: &str) -> bool {
        self.def_blocks.contains_key(var)
    }

    pub fn def_blocks(&self, var: &str) -> Option<&BlockSet> {
        self.def_blocks.get(var)
    }

    pub fn ty_of(&self, var: &str) -> Option<&Type> {
        self.types.get(var)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn add_def(&mut self, var: &str, block: BlockId, ty: Option<&Type>) {
        self.def_blocks.entry(var.to_string()).or_default().insert(block);
        if let Some(ty) = ty {
            self.types.entry(var.to_string()).or_insert_with(|| ty.clone());
        }
    }
}

/// Version counters and version stacks of the variables being renamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameState {
    counters: FxHashMap<String, usize>,
    stacks: FxHashMap<String, Vec<String>>,
}

impl RenameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the next version of `var` and makes it current.
    pub fn fresh(&mut self, var: &str) -> String {
        let counter = self.counters.entry(var.to_string()).or_default();
        let name = format!("{var}.{counter}");
        *counter += 1;
        self.stacks
            .entry(var.to_string())
            .or_default()
            .push(name.clone());
        name
    }

    pub fn current(&self, var: &str) -> Option<&str> {
        self.stacks
            .get(var)
            .and_then(|stack| stack.last())
            .map(String::as_str)
    }

    pub fn pop(&mut self, var: &str) {
        if let Some(stack) = self.stacks.get_mut(var) {
            stack.pop();
        }
    }

    /// Number of versions created for `var` so far.
    pub fn version_num(&self, var: &str) -> usize {
        self.counters.get(var).copied().unwrap_or_default()
    }

    /// Returns `true` if no version is current for any variable.
    pub fn is_balanced(&self) -> bool {
        self.stacks.values().all(Vec::is_empty)
    }
}

enum Visit {
    Enter(BlockId),
    Leave(Vec<String>),
}

struct Renamer<'a> {
    cfg: &'a ControlFlowGraph,
    tree: &'a DominatorTreeTraversable,
    globals: &'a Globals,
    config: &'a SsaConfig,
    bodies: SecondaryMap<BlockId, Vec<Operation>>,
    /// The variable of each phi, in the order the phis appear at the top of the block.
    phi_vars: SecondaryMap<BlockId, Vec<String>>,
}

impl Renamer<'_> {
    fn insert_phis(&mut self, df: &DFSet) -> usize {
        let mut inserted = 0;

        for var in self.globals.iter() {
            let Some(def_blocks) = self.globals.def_blocks(var) else {
                continue;
            };

            let mut has_phi = BlockSet::new();
            let mut queued = def_blocks.clone();
            let mut worklist: Vec<BlockId> = def_blocks.iter().collect();

            while let Some(block) = worklist.pop() {
                for &frontier in df.frontiers(block) {
                    if !has_phi.insert(frontier) {
                        continue;
                    }

                    let preds: Vec<&str> = self
                        .cfg
                        .preds_of(frontier)
                        .map(|&pred| self.cfg.label_of(pred))
                        .collect();
                    let mut phi = Operation::new(Opcode::Phi)
                        .with_args(iter::repeat(var).take(preds.len()))
                        .with_labels(preds);
                    phi.dest = Some(var.to_string());
                    phi.ty = self.globals.ty_of(var).cloned();

                    let at = self.phi_vars[frontier].len();
                    self.bodies[frontier].insert(at, phi);
                    self.phi_vars[frontier].push(var.to_string());
                    inserted += 1;
                    tracing::trace!(var, block = self.cfg.label_of(frontier), "insert phi");

                    if queued.insert(frontier) {
                        worklist.push(frontier);
                    }
                }
            }
        }

        inserted
    }

    /// Renames the whole function, returning the renamed parameters.
    fn rename(&mut self, params: &[Argument], state: &mut RenameState) -> Result<Vec<Argument>> {
        let mut args = params.to_vec();
        let mut param_versions = Vec::new();
        for arg in &mut args {
            if self.is_renamed(&arg.name) {
                param_versions.push(arg.name.clone());
                arg.name = state.fresh(&arg.name);
            }
        }

        let mut stack = vec![Visit::Enter(self.cfg.entry())];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(block) => {
                    let pushed = self.rename_block(block, state)?;
                    stack.push(Visit::Leave(pushed));
                    for &child in self.tree.children_of(block).iter().rev() {
                        stack.push(Visit::Enter(child));
                    }
                }
                Visit::Leave(pushed) => {
                    for var in &pushed {
                        state.pop(var);
                    }
                }
            }
        }

        for var in &param_versions {
            state.pop(var);
        }
        Ok(args)
    }

    /// Renames the definitions and uses of `block` and fills the phi slots of its
    /// outgoing edges. Returns the variables whose stacks were pushed.
    fn rename_block(&mut self, block: BlockId, state: &mut RenameState) -> Result<Vec<String>> {
        let mut pushed = Vec::new();
        let phi_num = self.phi_vars[block].len();
        let mut body = std::mem::take(&mut self.bodies[block]);

        for (phi, var) in body.iter_mut().zip(&self.phi_vars[block]) {
            phi.dest = Some(state.fresh(var));
            pushed.push(var.clone());
        }

        for inst in &mut body[phi_num..] {
            for arg in &mut inst.args {
                if !self.is_renamed(arg) {
                    continue;
                }
                let Some(version) = state.current(arg) else {
                    return Err(AnalysisError::UndefinedVariable {
                        func: self.cfg.func_name().to_string(),
                        block: self.cfg.label_of(block).to_string(),
                        var: arg.clone(),
                    });
                };
                *arg = version.to_string();
            }

            if let Some(dest) = &mut inst.dest {
                if self.is_renamed(dest) {
                    pushed.push(dest.clone());
                    *dest = state.fresh(dest);
                }
            }
        }
        self.bodies[block] = body;

        for &succ in self.cfg.succs_of(block) {
            let Some(slot) = self.cfg.pred_index(succ, block) else {
                continue;
            };
            for (phi, var) in self.bodies[succ].iter_mut().zip(&self.phi_vars[succ]) {
                phi.args[slot] = match state.current(var) {
                    Some(version) => version.to_string(),
                    None => self.config.undef_name.clone(),
                };
            }
        }

        Ok(pushed)
    }

    fn is_renamed(&self, var: &str) -> bool {
        self.globals.is_global(var) || (self.config.rename_locals && self.globals.is_defined(var))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tacit_ir::{builder::FunctionBuilder, ir_writer::FuncWriter, ErrorKind};

    fn convert(func: &mut Function) -> SsaSummary {
        convert_to_ssa(func, &SsaConfig::default()).unwrap()
    }

    fn dump(func: &Function) -> String {
        FuncWriter::new(func).dump_string()
    }

    fn diamond() -> Function {
        let mut builder = FunctionBuilder::new("diamond");
        builder.label("entry");
        builder.constant("x", Type::Int, 1);
        builder.constant("cond", Type::Bool, true);
        builder.br("cond", "c", "b");
        builder.label("b");
        builder.constant("x", Type::Int, 2);
        builder.jmp("d");
        builder.label("c");
        builder.jmp("d");
        builder.label("d");
        builder.print(["x"]);
        builder.ret(None);
        builder.finish()
    }

    #[test]
    fn diamond_gets_phi_at_join() {
        let mut func = diamond();
        let summary = convert(&mut func);
        assert_eq!(summary.globals, ["x"]);
        assert_eq!(summary.phis, 1);

        insta::assert_snapshot!(dump(&func), @r"
        @diamond {
        .entry:
          x.0: int = const 1;
          cond: bool = const true;
          br cond .c .b;
        .b:
          x.1: int = const 2;
          jmp .d;
        .c:
          jmp .d;
        .d:
          x.2: int = phi x.1 x.0 .b .c;
          print x.2;
          ret;
        }
        ");
    }

    #[test]
    fn linear_chain_has_no_phis() {
        let mut builder = FunctionBuilder::new("chain");
        builder.label("entry");
        builder.constant("x", Type::Int, 1);
        builder.label("b2");
        builder.add("x", "x", "x");
        builder.label("b3");
        builder.print(["x"]);
        let mut func = builder.finish();

        let summary = convert(&mut func);
        assert_eq!(summary.phis, 0);
        assert!(!func.has_phi());

        insta::assert_snapshot!(dump(&func), @r"
        @chain {
        .entry:
          x.0: int = const 1;
        .b2:
          x.1: int = add x.0 x.0;
        .b3:
          print x.1;
        }
        ");
    }

    #[test]
    fn self_loop_phi_names_itself() {
        let mut builder = FunctionBuilder::new("count");
        builder.label("entry");
        builder.constant("i", Type::Int, 0);
        builder.constant("one", Type::Int, 1);
        builder.label("loop");
        builder.add("i", "i", "one");
        builder.binary(Opcode::Lt, "c", Type::Bool, "i", "one");
        builder.br("c", "exit", "loop");
        builder.label("exit");
        builder.print(["i"]);
        builder.ret(None);
        let mut func = builder.finish();

        let summary = convert(&mut func);
        assert_eq!(summary.globals, ["i", "one"]);

        insta::assert_snapshot!(dump(&func), @r"
        @count {
        .entry:
          i.0: int = const 0;
          one.0: int = const 1;
        .loop:
          i.1: int = phi i.0 i.2 .entry .loop;
          i.2: int = add i.1 one.0;
          c: bool = lt i.2 one.0;
          br c .exit .loop;
        .exit:
          print i.2;
          ret;
        }
        ");
    }

    #[test]
    fn params_are_renamed_in_signature() {
        let mut builder = FunctionBuilder::new("inc");
        builder.append_parameter("n", Type::Int);
        builder.set_ret_ty(Type::Int);
        builder.constant("one", Type::Int, 1);
        builder.add("n", "n", "one");
        builder.ret(Some("n"));
        let func = builder.finish();

        let mut globals_only = func.clone();
        convert(&mut globals_only);
        insta::assert_snapshot!(dump(&globals_only), @r"
        @inc(n.0: int): int {
        .entry:
          one: int = const 1;
          n.1: int = add n.0 one;
          ret n.1;
        }
        ");

        let mut all = func;
        let config = SsaConfig {
            rename_locals: true,
            ..SsaConfig::default()
        };
        convert_to_ssa(&mut all, &config).unwrap();
        insta::assert_snapshot!(dump(&all), @r"
        @inc(n.0: int): int {
        .entry:
          one.0: int = const 1;
          n.1: int = add n.0 one.0;
          ret n.1;
        }
        ");
    }

    #[test]
    fn undefined_edge_gets_marker() {
        let mut builder = FunctionBuilder::new("partial");
        builder.label("entry");
        builder.constant("cond", Type::Bool, true);
        builder.br("cond", "c", "b");
        builder.label("b");
        builder.constant("x", Type::Int, 2);
        builder.jmp("d");
        builder.label("c");
        builder.jmp("d");
        builder.label("d");
        builder.print(["x"]);
        let func = builder.finish();

        let mut converted = func.clone();
        convert(&mut converted);
        let phi = converted.operations().find(|op| op.is_phi()).unwrap();
        assert_eq!(phi.args, ["x.0", UNDEF_NAME]);
        assert_eq!(phi.labels, ["b", "c"]);

        let mut converted = func;
        let config = SsaConfig {
            undef_name: "undef".to_string(),
            ..SsaConfig::default()
        };
        convert_to_ssa(&mut converted, &config).unwrap();
        let phi = converted.operations().find(|op| op.is_phi()).unwrap();
        assert_eq!(phi.args, ["x.0", "undef"]);
    }

    #[test]
    fn failures_leave_function_unchanged() {
        let mut builder = FunctionBuilder::new("undefined");
        builder.label("entry");
        builder.constant("x", Type::Int, 1);
        builder.print(["x", "y"]);
        let mut func = builder.finish();
        let before = func.clone();
        let err = convert_to_ssa(&mut func, &SsaConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::UndefinedVariable { ref var, .. } if var == "y"));
        assert_eq!(err.kind(), ErrorKind::MalformedProgram);
        assert_eq!(func, before);

        let mut builder = FunctionBuilder::new("dead");
        builder.label("entry");
        builder.ret(None);
        builder.label("dead");
        builder.ret(None);
        let mut func = builder.finish();
        let before = func.clone();
        let err = convert_to_ssa(&mut func, &SsaConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreachableBlock);
        assert_eq!(func, before);

        // `a` and `b` feed each other and the join, but nothing reaches them.
        let mut builder = FunctionBuilder::new("island_loop");
        builder.label("entry");
        builder.constant("x", Type::Int, 1);
        builder.constant("c", Type::Bool, true);
        builder.br("c", "join", "left");
        builder.label("left");
        builder.constant("x", Type::Int, 3);
        builder.jmp("join");
        builder.label("a");
        builder.constant("x", Type::Int, 2);
        builder.jmp("b");
        builder.label("b");
        builder.br("c", "a", "join");
        builder.label("join");
        builder.print(["x"]);
        let mut func = builder.finish();
        let before = func.clone();
        let err = convert_to_ssa(&mut func, &SsaConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreachableBlock);
        assert_eq!(func, before);

        let mut func = diamond();
        convert(&mut func);
        let converted = func.clone();
        let err = convert_to_ssa(&mut func, &SsaConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::AlreadyInSsa { .. }));
        assert_eq!(func, converted);
    }

    #[test]
    fn global_detection() {
        let mut builder = FunctionBuilder::new("globals");
        builder.append_parameter("p", Type::Int);
        builder.label("entry");
        builder.constant("t", Type::Int, 1);
        builder.add("t", "t", "p");
        builder.label("next");
        builder.add("u", "t", "t");
        builder.print(["u"]);
        let func = builder.finish();
        let cfg = ControlFlowGraph::compute(&func, &CfgConfig::default()).unwrap();

        let globals = Globals::compute(&cfg, &func.args);
        assert_eq!(globals.iter().collect::<Vec<_>>(), ["p", "t"]);
        assert!(!globals.is_global("u"));
        assert!(globals.is_defined("u"));
        assert_eq!(
            globals.def_blocks("p"),
            Some(&BlockSet::from([cfg.entry()]))
        );
        assert_eq!(globals.ty_of("t"), Some(&Type::Int));
    }

    #[test]
    fn rename_state_versions() {
        let mut state = RenameState::new();
        assert_eq!(state.current("x"), None);
        assert_eq!(state.fresh("x"), "x.0");
        assert_eq!(state.fresh("x"), "x.1");
        assert_eq!(state.current("x"), Some("x.1"));
        state.pop("x");
        assert_eq!(state.current("x"), Some("x.0"));
        state.pop("x");
        assert!(state.is_balanced());
        assert_eq!(state.fresh("x"), "x.2");
        assert_eq!(state.version_num("x"), 3);
    }
}
