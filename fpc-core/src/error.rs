use thiserror::Error;

/// Errors surfaced by the builder. Builder preconditions (a rule with no
/// suitable fast pattern, a disabled rule, a builtin rule) are not
/// represented here — per the error model, they are silent and the rule
/// either lands in a no-fast-pattern list or is skipped.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("failed to create mpse for pattern-match type {pm_type:?}: {reason}")]
    MpseCreate { pm_type: crate::rule::PmType, reason: String },

    #[error("compiled mpse count mismatch: expected {expected}, compiled {actual}")]
    CompileCountMismatch { expected: usize, actual: usize },

    #[error("service '{service}' has no registered protocol ordinal")]
    MissingServiceOrdinal { service: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompileError>;
