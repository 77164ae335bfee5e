//! Consultation flow steps.
//!
//! A session's flow is an append-only log of these records; projections over
//! the flow match exhaustively on [`StepKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AnswerValue;

/// Payload of one flow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// One question asked and answered.
    SymptomQuestion {
        code: String,
        answer: AnswerValue,
        question_text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<u32>,
    },
    /// Subject ticked several symptoms at once; each counts as a moderate report.
    BulkSelection { codes: Vec<String> },
    /// Caller ended the interview early.
    ForceComplete { reason: String },
}

impl StepKind {
    /// Symptom codes this step touches, in step order.
    pub fn codes(&self) -> Vec<&str> {
        match self {
            StepKind::SymptomQuestion { code, .. } => vec![code.as_str()],
            StepKind::BulkSelection { codes } => codes.iter().map(|c| c.as_str()).collect(),
            StepKind::ForceComplete { .. } => Vec::new(),
        }
    }

    pub fn is_question(&self) -> bool {
        matches!(self, StepKind::SymptomQuestion { .. })
    }
}

/// One immutable record in a session's flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub kind: StepKind,
    pub recorded_at: DateTime<Utc>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            recorded_at: Utc::now(),
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    /// Completed and abandoned are terminal; no further steps or transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
