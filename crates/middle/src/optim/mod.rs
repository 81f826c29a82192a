mod constant_folding;
pub mod dce;
pub mod lvn;
pub mod pipeline;

pub use dce::DceSolver;
pub use lvn::LvnSolver;
pub use pipeline::{run_func_passes, Pass, Pipeline, PipelineConfig, Step};
