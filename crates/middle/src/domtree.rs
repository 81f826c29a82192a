//! This module contains dominator related structs.
//!
//! Dominator sets are computed as a forward dataflow problem:
//! `Dom(entry) = {entry}` and `Dom(n) = {n} ∪ ⋂ Dom(p)` over the predecessors `p` of `n`.
//! Sets start out full and only shrink, so iterating in reverse post order converges.
//! Immediate dominators, the dominator tree and dominance frontiers are derived from
//! the sets.
//!
//! The frontier computation follows Keith D. Cooper., Timothy J. Harvey., and Ken Kennedy.:
//! A Simple, Fast Dominance Algorithm: <https://www.cs.rice.edu/~keith/EMBED/dom.pdf>

use std::collections::BTreeSet;

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};
use tacit_ir::{BlockId, ControlFlowGraph};

use crate::{block_set::BlockSet, error::AnalysisError};

#[derive(Default, Debug)]
pub struct DomTree {
    func: String,
    labels: SecondaryMap<BlockId, String>,
    doms: SecondaryMap<BlockId, BlockSet>,
    idoms: SecondaryMap<BlockId, PackedOption<BlockId>>,
    reachable: BlockSet,
    rpo: Vec<BlockId>,
}

impl DomTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.func.clear();
        self.labels.clear();
        self.doms.clear();
        self.idoms.clear();
        self.reachable.clear();
        self.rpo.clear();
    }

    #[tracing::instrument(level = "debug", skip_all, fields(func = %cfg.func_name()))]
    pub fn compute(&mut self, cfg: &ControlFlowGraph) {
        self.clear();

        self.func = cfg.func_name().to_string();
        for block in cfg.iter_block() {
            self.labels[block] = cfg.label_of(block).to_string();
        }

        self.rpo = cfg.rpo();
        let Some(&entry) = self.rpo.first() else {
            return;
        };
        self.reachable = self.rpo.iter().copied().collect();

        for &block in self.rpo.iter().skip(1) {
            self.doms[block] = self.reachable.clone();
        }
        self.doms[entry] = BlockSet::from([entry]);

        let mut rounds = 0;
        let mut changed = true;
        while changed {
            changed = false;
            rounds += 1;

            for &block in self.rpo.iter().skip(1) {
                let mut new_doms: Option<BlockSet> = None;
                for &pred in cfg.preds_of(block) {
                    if !self.reachable.contains(pred) {
                        continue;
                    }
                    match &mut new_doms {
                        Some(doms) => doms.intersect_with(&self.doms[pred]),
                        None => new_doms = Some(self.doms[pred].clone()),
                    }
                }

                let mut new_doms = new_doms.unwrap_or_default();
                new_doms.insert(block);
                if new_doms != self.doms[block] {
                    self.doms[block] = new_doms;
                    changed = true;
                }
            }
        }

        for &block in self.rpo.iter().skip(1) {
            self.idoms[block] = self.closest_strict_dominator(block).into();
        }

        tracing::debug!(rounds, reachable = self.rpo.len(), "dominators computed");
    }

    /// Returns the immediate dominator of the `block`.
    /// Returns None if the `block` is unreachable from the entry block, or the `block` is the entry block itself.
    pub fn idom_of(&self, block: BlockId) -> Option<BlockId> {
        self.idoms[block].expand()
    }

    /// Returns `true` if block1 strictly dominates block2.
    pub fn strictly_dominates(&self, block1: BlockId, block2: BlockId) -> bool {
        block1 != block2 && self.dominates(block1, block2)
    }

    /// Returns `true` if block1 dominates block2.
    pub fn dominates(&self, block1: BlockId, block2: BlockId) -> bool {
        self.is_reachable(block2) && self.doms[block2].contains(block1)
    }

    /// Returns `true` if block is reachable from the entry block.
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.reachable.contains(block)
    }

    /// Returns reachable blocks in RPO.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Returns the set of blocks dominating `block`, `block` itself included.
    pub fn dominators(&self, block: BlockId) -> Result<&BlockSet, AnalysisError> {
        if self.is_reachable(block) {
            Ok(&self.doms[block])
        } else {
            Err(self.undefined(block))
        }
    }

    /// Like [`Self::idom_of`], but distinguishes the entry block (`Ok(None)`) from
    /// unreachable blocks (an error).
    pub fn immediate_dominator(&self, block: BlockId) -> Result<Option<BlockId>, AnalysisError> {
        if self.is_reachable(block) {
            Ok(self.idom_of(block))
        } else {
            Err(self.undefined(block))
        }
    }

    /// Compute dominance frontiers of each blocks.
    pub fn compute_df(&self, cfg: &ControlFlowGraph) -> DFSet {
        let mut df = DFSet::default();

        for &block in &self.rpo {
            if cfg.pred_num_of(block) < 2 {
                continue;
            }

            let idom = self.idom_of(block);
            for &pred in cfg.preds_of(block) {
                if !self.is_reachable(pred) {
                    continue;
                }

                let mut runner = Some(pred);
                while let Some(current) = runner {
                    if Some(current) == idom {
                        break;
                    }
                    df.0[current].insert(block);
                    runner = self.idom_of(current);
                }
            }
        }

        df
    }

    /// The strict dominator of `block` that every other strict dominator dominates.
    fn closest_strict_dominator(&self, block: BlockId) -> Option<BlockId> {
        let mut strict = self.doms[block].clone();
        strict.remove(block);
        let idom = strict
            .iter()
            .find(|&candidate| strict.is_subset(&self.doms[candidate]));
        idom
    }

    fn undefined(&self, block: BlockId) -> AnalysisError {
        AnalysisError::DominanceUndefined {
            func: self.func.clone(),
            block: self.labels[block].clone(),
        }
    }
}

/// Dominance frontiers of each blocks.
#[derive(Default, Debug)]
pub struct DFSet(SecondaryMap<BlockId, BTreeSet<BlockId>>);

impl DFSet {
    pub fn frontiers(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.0[block].iter()
    }

    pub fn in_frontier_of(&self, block: BlockId, of: BlockId) -> bool {
        self.0[of].contains(&block)
    }

    pub fn frontier_num_of(&self, of: BlockId) -> usize {
        self.0[of].len()
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }
}

/// Children lists of the dominator tree, in layout order.
#[derive(Default, Debug)]
pub struct DominatorTreeTraversable {
    children: SecondaryMap<BlockId, Vec<BlockId>>,
}

impl DominatorTreeTraversable {
    pub fn compute(&mut self, domtree: &DomTree) {
        self.clear();

        let mut blocks = domtree.rpo().to_vec();
        blocks.sort_unstable();
        for block in blocks {
            if let Some(idom) = domtree.idom_of(block) {
                self.children[idom].push(block)
            }
        }
    }

    pub fn children_of(&self, block: BlockId) -> &[BlockId] {
        &self.children[block]
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }
}
