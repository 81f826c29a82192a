//! A generic worklist solver for dataflow problems over a [`ControlFlowGraph`].
//!
//! An analysis describes its lattice through [`DataflowAnalysis`]: a bottom
//! value, a `merge` that combines the values flowing in from neighbouring
//! blocks, and a per-block `transfer`. The solver iterates until no block output
//! changes. Forward analyses read from predecessors, backward analyses from
//! successors.
//!
//! Reaching definitions and live variables are provided as instances.
use std::{collections::BTreeSet, collections::VecDeque, fmt};

use cranelift_entity::SecondaryMap;
use tacit_ir::{Argument, BasicBlock, BlockId, ControlFlowGraph};

use crate::{
    block_set::BlockSet,
    error::{AnalysisError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataflowConfig {
    /// The solver gives up after `max_visits_per_block * #blocks` block visits.
    pub max_visits_per_block: usize,
}

impl Default for DataflowConfig {
    fn default() -> Self {
        Self {
            max_visits_per_block: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

pub trait DataflowAnalysis {
    type Domain: Clone + PartialEq;

    fn direction(&self) -> Direction;

    /// The initial value of every block input and output.
    fn bottom(&self) -> Self::Domain;

    /// The value flowing into the entry block (forward) or out of the exit blocks (backward).
    fn boundary(&self) -> Self::Domain {
        self.bottom()
    }

    /// Combines the values of all neighbouring blocks. `inputs` is empty for a block
    /// without neighbours.
    fn merge(&self, inputs: &[&Self::Domain]) -> Self::Domain;

    fn transfer(&self, cfg: &ControlFlowGraph, block: BlockId, input: &Self::Domain) -> Self::Domain;
}

/// Block inputs and outputs at the fixed point.
///
/// `in_of` and `out_of` always refer to the top and the bottom of a block in program
/// order, whatever the direction of the analysis.
#[derive(Debug, Clone)]
pub struct DataflowResults<D: Clone> {
    ins: SecondaryMap<BlockId, D>,
    outs: SecondaryMap<BlockId, D>,
    visits: usize,
}

impl<D: Clone> DataflowResults<D> {
    pub fn in_of(&self, block: BlockId) -> &D {
        &self.ins[block]
    }

    pub fn out_of(&self, block: BlockId) -> &D {
        &self.outs[block]
    }

    /// Number of block visits the solver needed.
    pub fn visits(&self) -> usize {
        self.visits
    }
}

impl<D: Clone + PartialEq> DataflowResults<D> {
    /// Returns `true` if one more round of `analysis` over every block would change nothing.
    pub fn is_fixed_point<A>(&self, analysis: &A, cfg: &ControlFlowGraph) -> bool
    where
        A: DataflowAnalysis<Domain = D>,
    {
        let boundary = analysis.boundary();
        cfg.iter_block().all(|block| {
            let input = block_input(analysis, cfg, self, &boundary, block);
            let output = analysis.transfer(cfg, block, &input);
            match analysis.direction() {
                Direction::Forward => self.ins[block] == input && self.outs[block] == output,
                Direction::Backward => self.outs[block] == input && self.ins[block] == output,
            }
        })
    }
}

/// Runs `analysis` over `cfg` until it reaches a fixed point.
#[tracing::instrument(level = "debug", skip_all, fields(func = %cfg.func_name()))]
pub fn solve<A>(
    analysis: &A,
    cfg: &ControlFlowGraph,
    config: &DataflowConfig,
) -> Result<DataflowResults<A::Domain>>
where
    A: DataflowAnalysis,
{
    let direction = analysis.direction();
    let bottom = analysis.bottom();
    let boundary = analysis.boundary();
    let mut results = DataflowResults {
        ins: SecondaryMap::with_default(bottom.clone()),
        outs: SecondaryMap::with_default(bottom),
        visits: 0,
    };

    let mut order = cfg.rpo();
    let reachable: BlockSet = order.iter().copied().collect();
    order.extend(cfg.iter_block().filter(|&block| !reachable.contains(block)));
    if direction == Direction::Backward {
        order.reverse();
    }

    let mut worklist = Worklist::new(order);
    let max_visits = config
        .max_visits_per_block
        .saturating_mul(cfg.block_num());

    while let Some(block) = worklist.pop() {
        results.visits += 1;
        if results.visits > max_visits {
            return Err(AnalysisError::NonMonotoneAnalysis {
                func: cfg.func_name().to_string(),
                block: cfg.label_of(block).to_string(),
                visits: max_visits,
            });
        }

        let input = block_input(analysis, cfg, &results, &boundary, block);
        let output = analysis.transfer(cfg, block, &input);

        let (inputs, outputs) = match direction {
            Direction::Forward => (&mut results.ins, &mut results.outs),
            Direction::Backward => (&mut results.outs, &mut results.ins),
        };
        inputs[block] = input;
        if outputs[block] == output {
            continue;
        }
        outputs[block] = output;

        let dependents = match direction {
            Direction::Forward => cfg.block(block).succs(),
            Direction::Backward => cfg.block(block).preds(),
        };
        for &dependent in dependents {
            worklist.push(dependent);
        }
    }

    tracing::debug!(visits = results.visits, "dataflow converged");
    Ok(results)
}

fn block_input<A>(
    analysis: &A,
    cfg: &ControlFlowGraph,
    results: &DataflowResults<A::Domain>,
    boundary: &A::Domain,
    block: BlockId,
) -> A::Domain
where
    A: DataflowAnalysis,
{
    let mut inputs: Vec<&A::Domain> = match analysis.direction() {
        Direction::Forward => cfg.preds_of(block).map(|&pred| &results.outs[pred]).collect(),
        Direction::Backward => cfg.succs_of(block).map(|&succ| &results.ins[succ]).collect(),
    };

    let on_boundary = match analysis.direction() {
        Direction::Forward => block == cfg.entry(),
        Direction::Backward => cfg.succ_num_of(block) == 0,
    };
    if on_boundary {
        inputs.push(boundary);
    }

    analysis.merge(&inputs)
}

/// FIFO queue of blocks that holds each block at most once.
struct Worklist {
    queue: VecDeque<BlockId>,
    pending: BlockSet,
}

impl Worklist {
    fn new(blocks: Vec<BlockId>) -> Self {
        let pending = blocks.iter().copied().collect();
        Self {
            queue: blocks.into(),
            pending,
        }
    }

    fn push(&mut self, block: BlockId) {
        if self.pending.insert(block) {
            self.queue.push_back(block);
        }
    }

    fn pop(&mut self) -> Option<BlockId> {
        let block = self.queue.pop_front()?;
        self.pending.remove(block);
        Some(block)
    }
}

/// Adapts closures to [`DataflowAnalysis`].
pub struct FnAnalysis<D, M, T> {
    direction: Direction,
    bottom: D,
    boundary: D,
    merge: M,
    transfer: T,
}

impl<D, M, T> FnAnalysis<D, M, T>
where
    D: Clone + PartialEq,
    M: Fn(&[&D]) -> D,
    T: Fn(BlockId, &BasicBlock, &D) -> D,
{
    pub fn forward(bottom: D, merge: M, transfer: T) -> Self {
        Self::new(Direction::Forward, bottom, merge, transfer)
    }

    pub fn backward(bottom: D, merge: M, transfer: T) -> Self {
        Self::new(Direction::Backward, bottom, merge, transfer)
    }

    pub fn with_boundary(mut self, boundary: D) -> Self {
        self.boundary = boundary;
        self
    }

    fn new(direction: Direction, bottom: D, merge: M, transfer: T) -> Self {
        Self {
            direction,
            boundary: bottom.clone(),
            bottom,
            merge,
            transfer,
        }
    }
}

impl<D, M, T> DataflowAnalysis for FnAnalysis<D, M, T>
where
    D: Clone + PartialEq,
    M: Fn(&[&D]) -> D,
    T: Fn(BlockId, &BasicBlock, &D) -> D,
{
    type Domain = D;

    fn direction(&self) -> Direction {
        self.direction
    }

    fn bottom(&self) -> D {
        self.bottom.clone()
    }

    fn boundary(&self) -> D {
        self.boundary.clone()
    }

    fn merge(&self, inputs: &[&D]) -> D {
        (self.merge)(inputs)
    }

    fn transfer(&self, cfg: &ControlFlowGraph, block: BlockId, input: &D) -> D {
        (self.transfer)(block, cfg.block(block), input)
    }
}

/// Where a variable gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefSite {
    /// A function parameter. Parameters reach the entry block.
    Param,
    /// The `index`-th operation of `block`.
    Inst { block: BlockId, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Definition {
    pub var: String,
    pub site: DefSite,
}

impl Definition {
    pub fn new(var: impl Into<String>, site: DefSite) -> Self {
        Self {
            var: var.into(),
            site,
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.site {
            DefSite::Param => write!(f, "{}@param", self.var),
            DefSite::Inst { block, index } => write!(f, "{}@{block}:{index}", self.var),
        }
    }
}

pub type DefSet = BTreeSet<Definition>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReachingDefsMode {
    /// `OUT = IN ∪ defs(block)`. Earlier definitions are never killed.
    #[default]
    KillFree,
    /// A definition is killed by any later definition of the same variable.
    Kill,
}

#[derive(Debug, Clone)]
pub struct ReachingDefinitions {
    mode: ReachingDefsMode,
    params: Vec<String>,
}

impl ReachingDefinitions {
    pub fn new(params: &[Argument], mode: ReachingDefsMode) -> Self {
        Self {
            mode,
            params: params.iter().map(|arg| arg.name.clone()).collect(),
        }
    }
}

impl DataflowAnalysis for ReachingDefinitions {
    type Domain = DefSet;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn bottom(&self) -> DefSet {
        DefSet::new()
    }

    fn boundary(&self) -> DefSet {
        self.params
            .iter()
            .map(|param| Definition::new(param, DefSite::Param))
            .collect()
    }

    fn merge(&self, inputs: &[&DefSet]) -> DefSet {
        inputs.iter().flat_map(|set| set.iter().cloned()).collect()
    }

    fn transfer(&self, cfg: &ControlFlowGraph, block: BlockId, input: &DefSet) -> DefSet {
        let mut out = input.clone();
        for (index, inst) in cfg.block(block).insts.iter().enumerate() {
            let Some(dest) = &inst.dest else {
                continue;
            };
            if self.mode == ReachingDefsMode::Kill {
                out.retain(|def| &def.var != dest);
            }
            out.insert(Definition::new(dest, DefSite::Inst { block, index }));
        }
        out
    }
}

/// Variables live at the top and the bottom of each block.
///
/// Phi arguments are used at the end of their incoming block, not in the block
/// holding the phi.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveVariables;

impl DataflowAnalysis for LiveVariables {
    type Domain = BTreeSet<String>;

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn bottom(&self) -> Self::Domain {
        BTreeSet::new()
    }

    fn merge(&self, inputs: &[&Self::Domain]) -> Self::Domain {
        inputs.iter().flat_map(|set| set.iter().cloned()).collect()
    }

    fn transfer(&self, cfg: &ControlFlowGraph, block: BlockId, output: &Self::Domain) -> Self::Domain {
        let mut live = output.clone();
        let label = cfg.label_of(block);
        for &succ in cfg.succs_of(block) {
            for phi in cfg.block(succ).phis() {
                live.extend(
                    phi.phi_incomings()
                        .filter(|(_, from)| *from == label)
                        .map(|(arg, _)| arg.to_string()),
                );
            }
        }

        for inst in cfg.block(block).insts.iter().rev() {
            if let Some(dest) = &inst.dest {
                live.remove(dest);
            }
            if !inst.is_phi() {
                live.extend(inst.args.iter().cloned());
            }
        }
        live
    }
}
