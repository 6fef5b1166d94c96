//! Error taxonomy for the integrity gate.

use uuid::Uuid;

use crate::domain::{RunState, Transition};

/// Errors produced by the gate and its configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid transition: cannot {attempted} run {run_id} from state {current}")]
    InvalidTransition {
        run_id: Uuid,
        current: RunState,
        attempted: Transition,
    },

    #[error("stale transition: run {run_id} was already decided (now {current}); {attempted} not applied")]
    StaleTransition {
        run_id: Uuid,
        current: RunState,
        attempted: Transition,
    },

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("invalid rule configuration: {0}")]
    Config(String),

    #[error("rule configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Stable label for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::StaleTransition { .. } => "stale_transition",
            Self::RunNotFound(_) => "run_not_found",
            Self::Config(_) | Self::ConfigParse(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
        }
    }

    /// State of the run at the time of the failure, when known.
    pub fn current_state(&self) -> Option<RunState> {
        match self {
            Self::InvalidTransition { current, .. } | Self::StaleTransition { current, .. } => {
                Some(*current)
            }
            _ => None,
        }
    }

    /// The transition that was refused, when applicable.
    pub fn attempted(&self) -> Option<Transition> {
        match self {
            Self::InvalidTransition { attempted, .. }
            | Self::StaleTransition { attempted, .. } => Some(*attempted),
            _ => None,
        }
    }
}

/// Result type for gate operations.
pub type GateResult<T> = std::result::Result<T, GateError>;
