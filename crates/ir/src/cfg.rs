//! Control flow graph construction.
//!
//! A function's flat instruction list is split into basic blocks at every label.
//! Blocks live in an arena indexed by [`BlockId`] in layout order, and edges are
//! stored as insertion-ordered index sets, so the `i`-th predecessor of a block is
//! stable and can be matched against the `i`-th incoming slot of a phi.
//!
//! Edges come from terminators only, plus one implicit rule: a block whose last
//! instruction is not a terminator falls through to the next block in layout order.
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

use crate::{error::IrError, Function, Instruction, Opcode, Operation};

/// An opaque reference to a [`BasicBlock`] of a [`ControlFlowGraph`].
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

pub type BlockSet = IndexSet<BlockId, FxBuildHasher>;

/// Label given to the synthetic entry block when a function needs one.
pub const ENTRY_LABEL: &str = "entry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CfgConfig {
    /// Accept blocks that cannot be reached from the entry instead of rejecting them.
    pub allow_unreachable_blocks: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    /// Operations of the block. The label marker itself is not stored.
    pub insts: Vec<Operation>,
    preds: BlockSet,
    succs: BlockSet,
}

impl BasicBlock {
    fn new(label: String) -> Self {
        Self {
            label,
            insts: Vec::new(),
            preds: BlockSet::default(),
            succs: BlockSet::default(),
        }
    }

    pub fn preds(&self) -> &BlockSet {
        &self.preds
    }

    pub fn succs(&self) -> &BlockSet {
        &self.succs
    }

    pub fn terminator(&self) -> Option<&Operation> {
        self.insts.last().filter(|inst| inst.is_terminator())
    }

    pub fn phis(&self) -> impl Iterator<Item = &Operation> {
        self.insts.iter().take_while(|inst| inst.is_phi())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlFlowGraph {
    func: String,
    blocks: PrimaryMap<BlockId, BasicBlock>,
    label_map: FxHashMap<String, BlockId>,
    synthetic_entry: bool,
}

impl ControlFlowGraph {
    /// Splits `func` into basic blocks and derives the edges between them.
    ///
    /// If the first instruction is not a label, or the first label is a branch target,
    /// a synthetic entry block is prepended so that the entry is unique and has no
    /// predecessors. `func` itself is left untouched; see [`split_function`].
    #[tracing::instrument(level = "debug", skip_all, fields(func = %func.name))]
    pub fn compute(func: &Function, config: &CfgConfig) -> Result<Self, IrError> {
        if func.instrs.is_empty() {
            return Err(IrError::EmptyFunction {
                func: func.name.clone(),
            });
        }

        let mut cfg = Self {
            func: func.name.clone(),
            blocks: PrimaryMap::new(),
            label_map: FxHashMap::default(),
            synthetic_entry: false,
        };

        let (mut current, rest) = match func.instrs.split_first() {
            Some((Instruction::Label { label }, rest)) if !needs_synthetic_entry(func) => {
                (cfg.push_block(label.clone())?, rest)
            }
            _ => {
                let label = fresh_entry_label(func);
                tracing::trace!(%label, "prepend synthetic entry block");
                cfg.synthetic_entry = true;
                (cfg.push_block(label)?, func.instrs.as_slice())
            }
        };

        for inst in rest {
            match inst {
                Instruction::Label { label } => {
                    current = cfg.push_block(label.clone())?;
                }
                Instruction::Operation(op) => {
                    let block = &mut cfg.blocks[current];
                    if block.terminator().is_some() {
                        return Err(IrError::TerminatorBeforeEnd {
                            func: func.name.clone(),
                            block: block.label.clone(),
                        });
                    }
                    block.insts.push(op.clone());
                }
            }
        }

        cfg.compute_edges()?;

        if !config.allow_unreachable_blocks {
            let reachable: FxHashSet<BlockId> = cfg.post_order().collect();
            if let Some(block) = cfg
                .iter_block()
                .find(|block| !reachable.contains(block))
            {
                return Err(IrError::UnreachableBlock {
                    func: cfg.func.clone(),
                    block: cfg.label_of(block).to_string(),
                });
            }
        }

        tracing::debug!(blocks = cfg.block_num(), "cfg computed");
        Ok(cfg)
    }

    pub fn func_name(&self) -> &str {
        &self.func
    }

    /// The entry block. Always the first block in layout order.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn has_synthetic_entry(&self) -> bool {
        self.synthetic_entry
    }

    pub fn block_num(&self) -> usize {
        self.blocks.len()
    }

    /// Iterates over blocks in layout order.
    pub fn iter_block(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter()
    }

    pub fn block(&self, block: BlockId) -> &BasicBlock {
        &self.blocks[block]
    }

    pub fn label_of(&self, block: BlockId) -> &str {
        &self.blocks[block].label
    }

    pub fn block_of(&self, label: &str) -> Option<BlockId> {
        self.label_map.get(label).copied()
    }

    pub fn preds_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].preds.iter()
    }

    pub fn succs_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].succs.iter()
    }

    pub fn pred_num_of(&self, block: BlockId) -> usize {
        self.blocks[block].preds.len()
    }

    pub fn succ_num_of(&self, block: BlockId) -> usize {
        self.blocks[block].succs.len()
    }

    /// Returns the position of the edge `pred -> block` among the predecessors of `block`.
    pub fn pred_index(&self, block: BlockId, pred: BlockId) -> Option<usize> {
        self.blocks[block].preds.get_index_of(&pred)
    }

    pub fn post_order(&self) -> CfgPostOrder<'_> {
        CfgPostOrder::new(self)
    }

    /// Blocks reachable from the entry in reverse post order.
    pub fn rpo(&self) -> Vec<BlockId> {
        let mut rpo: Vec<_> = self.post_order().collect();
        rpo.reverse();
        rpo
    }

    /// Reassembles a flat instruction list, taking the body of each block from `body_of`.
    pub fn assemble(&self, mut body_of: impl FnMut(BlockId) -> Vec<Operation>) -> Vec<Instruction> {
        let mut instrs = Vec::new();
        for block in self.iter_block() {
            instrs.push(Instruction::label(self.label_of(block)));
            instrs.extend(body_of(block).into_iter().map(Instruction::Operation));
        }
        instrs
    }

    /// Reassembles the flat instruction list this graph describes.
    pub fn to_instrs(&self) -> Vec<Instruction> {
        self.assemble(|block| self.blocks[block].insts.clone())
    }

    fn push_block(&mut self, label: String) -> Result<BlockId, IrError> {
        if self.label_map.contains_key(&label) {
            return Err(IrError::DuplicateLabel {
                func: self.func.clone(),
                label,
            });
        }
        let block = self.blocks.push(BasicBlock::new(label.clone()));
        self.label_map.insert(label, block);
        Ok(block)
    }

    fn compute_edges(&mut self) -> Result<(), IrError> {
        let block_num = self.block_num();
        for idx in 0..block_num {
            let block = BlockId(idx as u32);
            let dests = match self.blocks[block].insts.last() {
                Some(last) if last.op == Opcode::Jmp => self.resolve_dests(block, last, 1)?,
                Some(last) if last.op == Opcode::Br => self.resolve_dests(block, last, 2)?,
                Some(last) if last.op == Opcode::Ret => Vec::new(),
                // Fallthrough to the next block in layout order.
                _ if idx + 1 < block_num => vec![BlockId(idx as u32 + 1)],
                _ => Vec::new(),
            };

            for dest in dests {
                self.add_edge(block, dest);
            }
        }

        Ok(())
    }

    fn resolve_dests(
        &self,
        block: BlockId,
        inst: &Operation,
        expected: usize,
    ) -> Result<Vec<BlockId>, IrError> {
        if inst.labels.len() != expected {
            return Err(IrError::BranchArity {
                func: self.func.clone(),
                block: self.label_of(block).to_string(),
                op: inst.op.as_str(),
                expected,
                found: inst.labels.len(),
            });
        }

        inst.labels
            .iter()
            .map(|target| {
                self.block_of(target)
                    .ok_or_else(|| IrError::UndeclaredLabel {
                        func: self.func.clone(),
                        block: self.label_of(block).to_string(),
                        target: target.clone(),
                    })
            })
            .collect()
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to].preds.insert(from);
        self.blocks[from].succs.insert(to);
    }
}

/// Builds the control flow graph of `func` and materializes the synthetic entry label
/// into its instruction list, if one was needed. `func` is unchanged on error.
pub fn split_function(func: &mut Function, config: &CfgConfig) -> Result<ControlFlowGraph, IrError> {
    let cfg = ControlFlowGraph::compute(func, config)?;
    if cfg.has_synthetic_entry() {
        let label = cfg.label_of(cfg.entry()).to_string();
        func.instrs.insert(0, Instruction::label(label));
    }
    Ok(cfg)
}

fn needs_synthetic_entry(func: &Function) -> bool {
    let Some(first) = func.instrs.first().and_then(Instruction::as_label) else {
        return true;
    };

    func.operations()
        .flat_map(|op| op.branch_dests())
        .any(|dest| dest == first)
}

fn fresh_entry_label(func: &Function) -> String {
    let used: FxHashSet<&str> = func.labels().collect();
    if !used.contains(ENTRY_LABEL) {
        return ENTRY_LABEL.to_string();
    }

    (1..)
        .map(|n| format!("{ENTRY_LABEL}.{n}"))
        .find(|label| !used.contains(label.as_str()))
        .unwrap_or_default()
}

pub struct CfgPostOrder<'a> {
    cfg: &'a ControlFlowGraph,
    node_state: SecondaryMap<BlockId, NodeState>,
    stack: Vec<BlockId>,
}

impl<'a> CfgPostOrder<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        let stack = if cfg.block_num() == 0 {
            Vec::new()
        } else {
            vec![cfg.entry()]
        };

        Self {
            cfg,
            node_state: SecondaryMap::default(),
            stack,
        }
    }
}

impl Iterator for CfgPostOrder<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        while let Some(&block) = self.stack.last() {
            if self.node_state[block].is_unvisited() {
                self.node_state[block].set_visited();
                // Push in reverse so that the first successor is explored first.
                for &succ in self.cfg.block(block).succs().iter().rev() {
                    if self.node_state[succ].is_unvisited() {
                        self.stack.push(succ);
                    }
                }
            } else {
                self.stack.pop();
                if !self.node_state[block].has_finished() {
                    self.node_state[block].set_finished();
                    return Some(block);
                }
            }
        }

        None
    }
}

#[derive(Default, Debug, Clone, Copy)]
struct NodeState(u8);

impl NodeState {
    fn is_unvisited(self) -> bool {
        self.0 == 0
    }

    fn has_finished(self) -> bool {
        self.0 == 2
    }

    fn set_visited(&mut self) {
        self.0 = 1;
    }

    fn set_finished(&mut self) {
        self.0 = 2;
    }
}
