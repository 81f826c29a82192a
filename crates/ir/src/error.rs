use std::fmt;

use thiserror::Error;

/// The taxonomy of failures shared by every pass of the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedProgram,
    UnreachableBlock,
    DominanceUndefined,
    NonMonotoneAnalysis,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MalformedProgram => "malformed program",
            Self::UnreachableBlock => "unreachable block",
            Self::DominanceUndefined => "dominance undefined",
            Self::NonMonotoneAnalysis => "non-monotone analysis",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum IrError {
    #[error("malformed program: {0}")]
    Json(#[source] serde_json::Error),

    #[error("function `{func}` has no instructions")]
    EmptyFunction { func: String },

    #[error("function `{func}`: label `{label}` is declared more than once")]
    DuplicateLabel { func: String, label: String },

    #[error("function `{func}`: block `{block}` branches to undeclared label `{target}`")]
    UndeclaredLabel {
        func: String,
        block: String,
        target: String,
    },

    #[error("function `{func}`: `{op}` in block `{block}` expects {expected} target label(s), found {found}")]
    BranchArity {
        func: String,
        block: String,
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("function `{func}`: terminator in block `{block}` is followed by more instructions")]
    TerminatorBeforeEnd { func: String, block: String },

    #[error("function `{func}`: block `{block}` is not reachable from any terminator or fallthrough")]
    UnreachableBlock { func: String, block: String },
}

impl IrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnreachableBlock { .. } => ErrorKind::UnreachableBlock,
            Self::Json(_)
            | Self::EmptyFunction { .. }
            | Self::DuplicateLabel { .. }
            | Self::UndeclaredLabel { .. }
            | Self::BranchArity { .. }
            | Self::TerminatorBeforeEnd { .. } => ErrorKind::MalformedProgram,
        }
    }

    /// Name of the function the error was found in, if any.
    pub fn func(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::EmptyFunction { func }
            | Self::DuplicateLabel { func, .. }
            | Self::UndeclaredLabel { func, .. }
            | Self::BranchArity { func, .. }
            | Self::TerminatorBeforeEnd { func, .. }
            | Self::UnreachableBlock { func, .. } => Some(func),
        }
    }
}
