//! Printable results of the analysis commands.
use std::fmt;

use serde::Serialize;
use tacit_ir::{BlockId, ControlFlowGraph};
use tacit_middle::{DFSet, DataflowResults, DefSite, Definition, DomTree, DominatorTreeTraversable};

#[derive(Debug, Serialize)]
pub struct Report<B> {
    pub functions: Vec<FuncReport<B>>,
}

#[derive(Debug, Serialize)]
pub struct FuncReport<B> {
    pub name: String,
    pub blocks: Vec<B>,
}

/// Dataflow facts at the top and the bottom of a block.
#[derive(Debug, Serialize)]
pub struct BlockFlow {
    pub label: String,
    #[serde(rename = "in")]
    pub ins: Vec<String>,
    #[serde(rename = "out")]
    pub outs: Vec<String>,
}

impl BlockFlow {
    pub fn collect<D: Clone>(
        cfg: &ControlFlowGraph,
        results: &DataflowResults<D>,
        mut render: impl FnMut(&D) -> Vec<String>,
    ) -> Vec<Self> {
        cfg.iter_block()
            .map(|block| Self {
                label: cfg.label_of(block).to_string(),
                ins: render(results.in_of(block)),
                outs: render(results.out_of(block)),
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct BlockDominance {
    pub label: String,
    pub reachable: bool,
    pub idom: Option<String>,
    pub dominators: Vec<String>,
    pub children: Vec<String>,
    pub frontier: Vec<String>,
}

impl BlockDominance {
    pub fn collect(
        cfg: &ControlFlowGraph,
        domtree: &DomTree,
        tree: &DominatorTreeTraversable,
        df: &DFSet,
    ) -> Vec<Self> {
        cfg.iter_block()
            .map(|block| Self {
                label: cfg.label_of(block).to_string(),
                reachable: domtree.is_reachable(block),
                idom: domtree
                    .idom_of(block)
                    .map(|idom| cfg.label_of(idom).to_string()),
                dominators: domtree
                    .dominators(block)
                    .map(|doms| labels(cfg, doms.iter()))
                    .unwrap_or_default(),
                children: labels(cfg, tree.children_of(block).iter().copied()),
                frontier: labels(cfg, df.frontiers(block).copied()),
            })
            .collect()
    }
}

fn labels(cfg: &ControlFlowGraph, blocks: impl IntoIterator<Item = BlockId>) -> Vec<String> {
    blocks
        .into_iter()
        .map(|block| cfg.label_of(block).to_string())
        .collect()
}

/// Names a definition by the label of its block, e.g. `x@.loop:2`.
pub fn def_name(cfg: &ControlFlowGraph, def: &Definition) -> String {
    match def.site {
        DefSite::Param => format!("{}@param", def.var),
        DefSite::Inst { block, index } => format!("{}@.{}:{index}", def.var, cfg.label_of(block)),
    }
}

impl<B: fmt::Display> fmt::Display for Report<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

impl<B: fmt::Display> fmt::Display for FuncReport<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@{}", self.name)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BlockFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  .{}:", self.label)?;
        writeln!(f, "    in:  {}", self.ins.join(" "))?;
        writeln!(f, "    out: {}", self.outs.join(" "))
    }
}

impl fmt::Display for BlockDominance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.reachable {
            return writeln!(f, "  .{}: unreachable", self.label);
        }

        let idom = self.idom.as_deref().unwrap_or("-");
        writeln!(
            f,
            "  .{}: idom {idom}, dominators [{}], children [{}], frontier [{}]",
            self.label,
            self.dominators.join(" "),
            self.children.join(" "),
            self.frontier.join(" ")
        )
    }
}
