use tacit_ir::{ErrorKind, IrError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("function `{func}`: dominance is undefined for block `{block}`, which is unreachable from entry")]
    DominanceUndefined { func: String, block: String },

    #[error("function `{func}`: dataflow did not reach a fixed point within {visits} block visits (last visited `{block}`); merge/transfer is not monotone")]
    NonMonotoneAnalysis {
        func: String,
        block: String,
        visits: usize,
    },

    #[error("function `{func}`: `{var}` is used in block `{block}` but no definition reaches it")]
    UndefinedVariable {
        func: String,
        block: String,
        var: String,
    },

    #[error("function `{func}` already contains phi instructions")]
    AlreadyInSsa { func: String },
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ir(err) => err.kind(),
            Self::DominanceUndefined { .. } => ErrorKind::DominanceUndefined,
            Self::NonMonotoneAnalysis { .. } => ErrorKind::NonMonotoneAnalysis,
            Self::UndefinedVariable { .. } | Self::AlreadyInSsa { .. } => {
                ErrorKind::MalformedProgram
            }
        }
    }
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
