pub mod block_set;
pub mod dataflow;
pub mod domtree;
pub mod error;
pub mod optim;
pub mod ssa;

pub use dataflow::{
    solve, DataflowAnalysis, DataflowConfig, DataflowResults, DefSet, DefSite, Definition,
    Direction, FnAnalysis, LiveVariables, ReachingDefinitions, ReachingDefsMode,
};
pub use domtree::{DFSet, DomTree, DominatorTreeTraversable};
pub use error::{AnalysisError, Result};
pub use ssa::{convert_to_ssa, Globals, RenameState, SsaConfig, SsaSummary, UNDEF_NAME};
