use thiserror::Error;

use crate::Action;

/// Errors reported by domain construction, automaton construction and the
/// search drivers.
///
/// Invariant violations (an automaton lookup failing after a transition the
/// automaton itself certified) are not represented here: they panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// No yield-legal state is reachable from the initial state within the
    /// complexity budget.
    #[error("type search space is empty for complexity {complexity}")]
    EmptySearchSpace { complexity: usize },

    /// The domain does not accept any target type.
    #[error("domain has no accepted target type")]
    NoTargetType,

    /// Only unary and binary functions are supported.
    #[error("function `{function}` has unsupported arity {arity}")]
    UnsupportedArity { function: String, arity: usize },

    #[error("unknown type: {0}")]
    UnknownType(String),

    /// An action was requested that is not available in the current state.
    #[error("action {action:?} is not available at step {step}")]
    IllegalAction { step: usize, action: Action },

    /// The sampler drew only illegal actions. Recoverable: the caller may
    /// request another candidate.
    #[error("sampling failed after {attempts} attempts")]
    SamplingFailed { attempts: usize },

    #[error("invalid config: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
