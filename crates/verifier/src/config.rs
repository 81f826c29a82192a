use tacit_middle::UNDEF_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationLevel {
    /// Definitions and phi shape only.
    Fast,
    /// Also checks that every definition dominates its uses.
    Full,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub level: VerificationLevel,
    /// Stop collecting diagnostics past this count. `0` means unlimited.
    pub max_diagnostics: usize,
    /// Report blocks without predecessors as warnings instead of rejecting the function.
    pub allow_unreachable_blocks: bool,
    pub check_dominance: bool,
    /// Phi argument standing for "no definition on this edge".
    pub undef_name: String,
}

impl VerifierConfig {
    pub fn for_level(level: VerificationLevel) -> Self {
        match level {
            VerificationLevel::Fast => Self {
                level,
                max_diagnostics: 200,
                allow_unreachable_blocks: false,
                check_dominance: false,
                undef_name: UNDEF_NAME.to_string(),
            },
            VerificationLevel::Full => Self {
                level,
                max_diagnostics: 500,
                allow_unreachable_blocks: false,
                check_dominance: true,
                undef_name: UNDEF_NAME.to_string(),
            },
        }
    }

    pub fn should_check_dominance(&self) -> bool {
        self.check_dominance || matches!(self.level, VerificationLevel::Full)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::for_level(VerificationLevel::Full)
    }
}
