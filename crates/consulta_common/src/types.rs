//! Core reference types: symptoms, disorders, rules, severity values.
//!
//! These are the read-only shapes the knowledge base hands to the engine.
//! Evidence is built incrementally during a consultation; a code absent from
//! the evidence map means "not yet asked", not "denied".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConsultaError, Result};

/// Reported intensity of a symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Parse from a wire string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "mild" => Ok(Severity::Mild),
            "moderate" => Ok(Severity::Moderate),
            "severe" => Ok(Severity::Severe),
            other => Err(ConsultaError::InvalidAnswer(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }

    /// Whether the symptom counts as reported.
    pub fn is_present(&self) -> bool {
        !matches!(self, Severity::None)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Answer to a symptom question.
///
/// Older clients send plain booleans; `true` counts as a moderate report,
/// `false` as an explicit denial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Graded(Severity),
}

impl AnswerValue {
    pub fn severity(&self) -> Severity {
        match self {
            AnswerValue::Flag(true) => Severity::Moderate,
            AnswerValue::Flag(false) => Severity::None,
            AnswerValue::Graded(s) => *s,
        }
    }
}

impl From<Severity> for AnswerValue {
    fn from(s: Severity) -> Self {
        AnswerValue::Graded(s)
    }
}

/// A symptom the knowledge base knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symptom {
    /// Unique code (e.g. "G01")
    pub code: String,
    /// Question text shown to the subject
    pub description: String,
}

/// A disorder a rule can conclude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disorder {
    /// Unique code (e.g. "D01")
    pub code: String,
    pub name: String,
    pub description: String,
    /// Recommendation text copied into persisted diagnosis records
    pub recommendation: String,
}

/// A production rule: the disorder holds when its required symptoms are
/// sufficiently supported by evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique code (e.g. "R01")
    pub code: String,
    /// Disorder this rule concludes
    pub disorder: String,
    /// Required symptom codes (non-empty)
    pub symptoms: Vec<String>,
}

impl Rule {
    /// Symptom codes present in the evidence map, in rule order.
    pub fn matched<'a>(&'a self, evidence: &Evidence) -> Vec<&'a str> {
        self.symptoms
            .iter()
            .filter(|s| evidence.contains_key(s.as_str()))
            .map(|s| s.as_str())
            .collect()
    }

    /// Required symptom codes not yet in the evidence map.
    pub fn missing<'a>(&'a self, evidence: &Evidence) -> Vec<&'a str> {
        self.symptoms
            .iter()
            .filter(|s| !evidence.contains_key(s.as_str()))
            .map(|s| s.as_str())
            .collect()
    }
}

/// Evidence gathered so far: symptom code -> reported severity.
///
/// Ordered map so scoring passes iterate deterministically.
pub type Evidence = BTreeMap<String, Severity>;
