use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tacit_ir::{
    ir_writer::DisplayOperation, BasicBlock, BlockId, CfgConfig, ControlFlowGraph, ErrorKind,
    Function, Operation, Program, Type,
};
use tacit_middle::DomTree;

use crate::{
    diagnostic::{Diagnostic, DiagnosticCode, Location},
    report::VerificationReport,
    VerifierConfig,
};

/// Verifies every function of `program`. Functions are checked in parallel and the
/// diagnostics are reported in program order.
#[tracing::instrument(level = "debug", skip_all, fields(functions = program.functions.len()))]
pub fn verify_program(program: &Program, config: &VerifierConfig) -> VerificationReport {
    let func_reports: Vec<_> = program
        .functions
        .par_iter()
        .map(|func| verify_function(func, config))
        .collect();

    let mut report = VerificationReport::default();
    for func_report in func_reports {
        report.merge(func_report, config.max_diagnostics);
        if report.is_full(config.max_diagnostics) {
            break;
        }
    }
    report
}

/// Checks that `func` is in SSA form: every variable has a single definition, every
/// use is dominated by its definition and every phi is consistent with the
/// predecessors of its block.
pub fn verify_function(func: &Function, config: &VerifierConfig) -> VerificationReport {
    let mut report = VerificationReport::default();

    let cfg_config = CfgConfig {
        allow_unreachable_blocks: config.allow_unreachable_blocks,
    };
    let cfg = match ControlFlowGraph::compute(func, &cfg_config) {
        Ok(cfg) => cfg,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::UnreachableBlock => DiagnosticCode::UnreachableBlock,
                _ => DiagnosticCode::MalformedFunction,
            };
            report.push(
                Diagnostic::error(code, err.to_string(), Location::Function(func.name.clone())),
                config.max_diagnostics,
            );
            return report;
        }
    };

    let mut domtree = DomTree::new();
    domtree.compute(&cfg);

    let mut verifier = FunctionVerifier::new(func, &cfg, &domtree, config);
    verifier.run();
    tracing::debug!(
        func = %func.name,
        diagnostics = verifier.report.diagnostics.len(),
        "function verified"
    );
    verifier.report
}

#[derive(Debug, Clone, Copy)]
enum DefSite {
    Param,
    Inst { block: BlockId, index: usize },
}

#[derive(Debug, Clone, Copy)]
struct Def<'a> {
    site: DefSite,
    ty: Option<&'a Type>,
}

struct FunctionVerifier<'a> {
    func: &'a Function,
    cfg: &'a ControlFlowGraph,
    domtree: &'a DomTree,
    config: &'a VerifierConfig,
    defs: FxHashMap<&'a str, Def<'a>>,
    report: VerificationReport,
}

impl<'a> FunctionVerifier<'a> {
    fn new(
        func: &'a Function,
        cfg: &'a ControlFlowGraph,
        domtree: &'a DomTree,
        config: &'a VerifierConfig,
    ) -> Self {
        Self {
            func,
            cfg,
            domtree,
            config,
            defs: FxHashMap::default(),
            report: VerificationReport::default(),
        }
    }

    fn run(&mut self) {
        self.collect_definitions();

        let cfg = self.cfg;
        for (block, bb) in cfg.blocks() {
            if !self.domtree.is_reachable(block) {
                self.emit(Diagnostic::warning(
                    DiagnosticCode::UnreachableBlock,
                    "block is not reachable from the entry, dominance is not checked",
                    self.block_loc(block),
                ));
            }

            self.check_phis(block, bb);
            self.check_uses(block, bb);
        }
    }

    fn collect_definitions(&mut self) {
        let func = self.func;
        for arg in &func.args {
            if self.defs.contains_key(arg.name.as_str()) {
                self.emit(
                    Diagnostic::error(
                        DiagnosticCode::MultipleDefinition,
                        format!("parameter `{}` is declared more than once", arg.name),
                        Location::Function(func.name.clone()),
                    ),
                );
                continue;
            }
            self.defs.insert(
                &arg.name,
                Def {
                    site: DefSite::Param,
                    ty: Some(&arg.ty),
                },
            );
        }

        let cfg = self.cfg;
        for (block, bb) in cfg.blocks() {
            for (index, op) in bb.insts.iter().enumerate() {
                let Some(dest) = &op.dest else {
                    continue;
                };

                if let Some(first) = self.defs.get(dest.as_str()).copied() {
                    let note = format!("first defined at {}", self.def_loc(first.site));
                    self.emit(
                        Diagnostic::error(
                            DiagnosticCode::MultipleDefinition,
                            format!("`{dest}` is assigned more than once"),
                            self.inst_loc(block, index),
                        )
                        .with_inst_text(DisplayOperation(op).to_string())
                        .with_note(note),
                    );
                    continue;
                }

                self.defs.insert(
                    dest,
                    Def {
                        site: DefSite::Inst { block, index },
                        ty: op.ty.as_ref(),
                    },
                );
            }
        }
    }

    fn check_phis(&mut self, block: BlockId, bb: &'a BasicBlock) {
        let mut seen_non_phi = false;
        for (index, op) in bb.insts.iter().enumerate() {
            if !op.is_phi() {
                seen_non_phi = true;
                continue;
            }

            if seen_non_phi {
                self.emit_inst(
                    DiagnosticCode::PhiNotAtBlockTop,
                    "phi follows a non-phi instruction",
                    block,
                    index,
                    op,
                );
            }

            if block == self.cfg.entry() {
                self.emit_inst(
                    DiagnosticCode::PhiInEntryBlock,
                    "entry block has no predecessors to select from",
                    block,
                    index,
                    op,
                );
                continue;
            }

            let pred_num = self.cfg.pred_num_of(block);
            if op.args.len() != op.labels.len() || op.labels.len() != pred_num {
                let diag = self
                    .inst_diag(
                        DiagnosticCode::PhiArgCountMismatchPreds,
                        "phi slots don't match the predecessors of its block",
                        block,
                        index,
                        op,
                    )
                    .with_note(format!(
                        "{} argument(s), {} label(s), {} predecessor(s)",
                        op.args.len(),
                        op.labels.len(),
                        pred_num
                    ));
                self.emit(diag);
            }

            self.check_phi_incomings(block, index, op);
        }
    }

    fn check_phi_incomings(&mut self, block: BlockId, index: usize, op: &'a Operation) {
        let mut seen_labels = FxHashSet::default();
        for (arg, label) in op.phi_incomings() {
            if !seen_labels.insert(label) {
                let diag = self
                    .inst_diag(
                        DiagnosticCode::PhiDuplicateIncomingBlock,
                        "phi has more than one slot for the same edge",
                        block,
                        index,
                        op,
                    )
                    .with_note(format!("`.{label}` is listed twice"));
                self.emit(diag);
                continue;
            }

            let pred = self
                .cfg
                .block_of(label)
                .filter(|pred| self.cfg.preds_of(block).any(|p| p == pred));
            let Some(pred) = pred else {
                let diag = self
                    .inst_diag(
                        DiagnosticCode::PhiHasNonPredIncoming,
                        "phi incoming label is not a predecessor of its block",
                        block,
                        index,
                        op,
                    )
                    .with_note(format!("`.{label}` has no edge to this block"));
                self.emit(diag);
                continue;
            };

            if arg == self.config.undef_name {
                continue;
            }

            let Some(def) = self.defs.get(arg).copied() else {
                let diag = self
                    .inst_diag(
                        DiagnosticCode::UndefinedVariable,
                        format!("`{arg}` has no definition"),
                        block,
                        index,
                        op,
                    )
                    .with_note(format!("incoming from `.{label}`"));
                self.emit(diag);
                continue;
            };

            if let (Some(phi_ty), Some(def_ty)) = (&op.ty, def.ty) {
                if phi_ty != def_ty {
                    let diag = self
                        .inst_diag(
                            DiagnosticCode::PhiIncomingTypeMismatch,
                            format!("`{arg}` has type {def_ty}, phi expects {phi_ty}"),
                            block,
                            index,
                            op,
                        )
                        .with_note(format!("incoming from `.{label}`"));
                    self.emit(diag);
                }
            }

            if self.config.should_check_dominance()
                && self.domtree.is_reachable(pred)
                && !self.is_available_at_end(def.site, pred)
            {
                let diag = self
                    .inst_diag(
                        DiagnosticCode::PhiIncomingNotAvailableOnEdge,
                        format!("`{arg}` is not available at the end of `.{label}`"),
                        block,
                        index,
                        op,
                    )
                    .with_note(format!("`{arg}` is defined at {}", self.def_loc(def.site)));
                self.emit(diag);
            }
        }
    }

    fn check_uses(&mut self, block: BlockId, bb: &'a BasicBlock) {
        let check_dominance =
            self.config.should_check_dominance() && self.domtree.is_reachable(block);

        for (index, op) in bb.insts.iter().enumerate() {
            if op.is_phi() {
                continue;
            }

            for arg in &op.args {
                let Some(def) = self.defs.get(arg.as_str()).copied() else {
                    self.emit_inst(
                        DiagnosticCode::UndefinedVariable,
                        format!("`{arg}` has no definition"),
                        block,
                        index,
                        op,
                    );
                    continue;
                };

                if !check_dominance {
                    continue;
                }

                match def.site {
                    DefSite::Param => {}
                    DefSite::Inst {
                        block: def_block,
                        index: def_index,
                    } if def_block == block => {
                        if def_index >= index {
                            let diag = self
                                .inst_diag(
                                    DiagnosticCode::UseBeforeDefInBlock,
                                    format!("`{arg}` is used before its definition"),
                                    block,
                                    index,
                                    op,
                                )
                                .with_note(format!("defined at index {def_index}, used at {index}"));
                            self.emit(diag);
                        }
                    }
                    DefSite::Inst {
                        block: def_block, ..
                    } => {
                        if !self.domtree.strictly_dominates(def_block, block) {
                            let diag = self
                                .inst_diag(
                                    DiagnosticCode::DefDoesNotDominateUse,
                                    format!("definition of `{arg}` does not dominate its use"),
                                    block,
                                    index,
                                    op,
                                )
                                .with_note(format!(
                                    "`{arg}` is defined at {}",
                                    self.def_loc(def.site)
                                ));
                            self.emit(diag);
                        }
                    }
                }
            }
        }
    }

    /// A definition is available at the end of `pred` if it dominates `pred`.
    fn is_available_at_end(&self, site: DefSite, pred: BlockId) -> bool {
        match site {
            DefSite::Param => true,
            DefSite::Inst { block, .. } => self.domtree.dominates(block, pred),
        }
    }

    fn def_loc(&self, site: DefSite) -> String {
        match site {
            DefSite::Param => "a parameter".to_string(),
            DefSite::Inst { block, index } => self.inst_loc(block, index).to_string(),
        }
    }

    fn block_loc(&self, block: BlockId) -> Location {
        Location::Block {
            func: self.func.name.clone(),
            block: self.cfg.label_of(block).to_string(),
        }
    }

    fn inst_loc(&self, block: BlockId, index: usize) -> Location {
        Location::Inst {
            func: self.func.name.clone(),
            block: self.cfg.label_of(block).to_string(),
            index,
        }
    }

    fn inst_diag(
        &self,
        code: DiagnosticCode,
        message: impl Into<String>,
        block: BlockId,
        index: usize,
        op: &Operation,
    ) -> Diagnostic {
        Diagnostic::error(code, message, self.inst_loc(block, index))
            .with_inst_text(DisplayOperation(op).to_string())
    }

    fn emit_inst(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        block: BlockId,
        index: usize,
        op: &Operation,
    ) {
        let diag = self.inst_diag(code, message, block, index, op);
        self.emit(diag);
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        self.report.push(diagnostic, self.config.max_diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerificationLevel;
    use tacit_ir::builder::FunctionBuilder;

    #[test]
    fn location_display() {
        let mut builder = FunctionBuilder::new("f");
        builder.label("start");
        builder.constant("x", Type::Int, 1);
        builder.constant("x", Type::Int, 2);
        builder.ret(None);
        let func = builder.finish();

        let report = verify_function(&func, &VerifierConfig::default());
        assert_eq!(report.diagnostics.len(), 1);
        let diag = &report.diagnostics[0];
        assert_eq!(diag.code, DiagnosticCode::MultipleDefinition);
        assert_eq!(diag.primary.to_string(), "@f:.start:1");
        assert_eq!(diag.notes[0].message, "first defined at @f:.start:0");
    }

    #[test]
    fn fast_level_skips_dominance() {
        let mut builder = FunctionBuilder::new("g");
        builder.label("start");
        builder.print(["x"]);
        builder.constant("x", Type::Int, 1);
        builder.ret(None);
        let func = builder.finish();

        let full = verify_function(&func, &VerifierConfig::default());
        assert!(full.has_code(DiagnosticCode::UseBeforeDefInBlock));

        let fast = verify_function(&func, &VerifierConfig::for_level(VerificationLevel::Fast));
        assert!(fast.is_ok());
    }
}
