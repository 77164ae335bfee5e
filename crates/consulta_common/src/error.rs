//! Error types for Consulta.

use thiserror::Error;
use uuid::Uuid;

/// Broad classification of an error, used by callers that map errors to
/// transport-level responses without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input rejected before any state change
    Validation,
    /// Operation not legal in the current session state
    State,
    /// Referenced entity does not exist
    NotFound,
    /// Unexpected failure during scoring or persistence
    Resolution,
}

#[derive(Error, Debug)]
pub enum ConsultaError {
    #[error("Unknown symptom code: {0}")]
    UnknownSymptom(String),

    #[error("Invalid answer value: {0}")]
    InvalidAnswer(String),

    #[error("Bulk selection contains no symptom codes")]
    EmptySelection,

    #[error("Symptom {code} was already submitted in session {session}")]
    DuplicateSymptom { session: Uuid, code: String },

    #[error("Session {id} is {status}, not in_progress")]
    SessionNotActive { id: Uuid, status: String },

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Disorder not found: {0}")]
    DisorderNotFound(String),

    #[error("Invalid knowledge base: {0}")]
    InvalidKnowledge(String),

    #[error("Invalid decision tree: {0}")]
    InvalidTree(String),

    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConsultaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsultaError::UnknownSymptom(_)
            | ConsultaError::InvalidAnswer(_)
            | ConsultaError::EmptySelection
            | ConsultaError::InvalidKnowledge(_)
            | ConsultaError::InvalidTree(_)
            | ConsultaError::Toml(_) => ErrorKind::Validation,
            ConsultaError::DuplicateSymptom { .. } | ConsultaError::SessionNotActive { .. } => {
                ErrorKind::State
            }
            ConsultaError::SessionNotFound(_)
            | ConsultaError::RuleNotFound(_)
            | ConsultaError::DisorderNotFound(_) => ErrorKind::NotFound,
            ConsultaError::Resolution(_) | ConsultaError::Io(_) | ConsultaError::Json(_) => {
                ErrorKind::Resolution
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsultaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ConsultaError::UnknownSymptom("G99".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ConsultaError::DuplicateSymptom {
                session: Uuid::nil(),
                code: "G01".into()
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(
            ConsultaError::SessionNotFound(Uuid::nil()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ConsultaError::Resolution("store write failed".into()).kind(),
            ErrorKind::Resolution
        );
    }
}
