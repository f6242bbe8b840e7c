use thiserror::Error;

use crate::{command::CommandKind, modal::DialogKind, validation::ValidationErrors};

/// Every failure the dashboard core can surface. None of them are fatal; the
/// caller is expected to show the message and let the user retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("{kind} is already in flight for '{key}'")]
    CommandInFlight { kind: CommandKind, key: String },
    #[error("{message}")]
    DuplicateTitle { message: String },
    #[error("no attributable owner: {reason}")]
    Attribution { reason: String },
    #[error("{message}")]
    NetworkOrService { status: Option<u16>, message: String },
    #[error("malformed {entity} record: {reason}")]
    MalformedEntity { entity: &'static str, reason: String },
    #[error("{dialog} dialog cannot {action} while {state}")]
    InvalidTransition {
        dialog: DialogKind,
        action: &'static str,
        state: &'static str,
    },
}

impl CoreError {
    /// Errors produced before anything was sent to the course service.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::CommandInFlight { .. }
                | CoreError::Attribution { .. }
                | CoreError::InvalidTransition { .. }
        )
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            CoreError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for CoreError {
    fn from(value: ValidationErrors) -> Self {
        CoreError::Validation(value)
    }
}
