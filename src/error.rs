use thiserror::Error;

/// Errors produced while configuring or running the planner.
#[derive(Debug, Error)]
pub enum SvpError {
    /// Planner or model configuration rejected before any iteration runs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Argument to a pure numeric operator is out of its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Observed coordinate falls outside the requested matrix shape.
    #[error("entry ({row}, {col}) lies outside a {rows}x{cols} matrix")]
    ShapeMismatch {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// The model returned an invalid transition or reward for a pair.
    #[error("model contract violated at state {state}, action {action}: {reason}")]
    ModelContract {
        state: usize,
        action: usize,
        reason: String,
    },

    /// The SVD backend could not recompose the truncated factorization.
    #[error("singular value decomposition failed: {0}")]
    Decomposition(&'static str),

    /// A persisted Q-matrix could not be parsed.
    #[error("malformed Q-matrix at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SvpError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SvpError::InvalidConfig(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        SvpError::InvalidParameter(msg.into())
    }

    pub fn model_contract(state: usize, action: usize, reason: impl Into<String>) -> Self {
        SvpError::ModelContract {
            state,
            action,
            reason: reason.into(),
        }
    }
}

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, SvpError>;
