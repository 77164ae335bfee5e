//! Engine configuration: scoring weights, thresholds, completion budgets.
//!
//! Every magic number in the inference path lives here as a validated struct
//! with defaults matching the shipped behavior. Configs are plain serde types
//! so deployments can override them from TOML next to the knowledge base.

use serde::{Deserialize, Serialize};

use crate::error::{ConsultaError, Result};
use crate::types::Severity;

/// Per-severity evidence weights used by the confidence scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub none: f64,
    pub mild: f64,
    pub moderate: f64,
    pub severe: f64,
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::None => self.none,
            Severity::Mild => self.mild,
            Severity::Moderate => self.moderate,
            Severity::Severe => self.severe,
        }
    }

    /// The weight a fully-supported symptom contributes; severity scores are
    /// normalized against this.
    pub fn max(&self) -> f64 {
        self.severe
    }

    pub fn validate(&self) -> Result<()> {
        if self.none != 0.0 {
            return Err(ConsultaError::InvalidKnowledge(
                "severity weight for none must be 0".into(),
            ));
        }
        let ordered = self.none <= self.mild && self.mild <= self.moderate && self.moderate <= self.severe;
        if !ordered || self.severe <= 0.0 {
            return Err(ConsultaError::InvalidKnowledge(
                "severity weights must be non-decreasing with a positive maximum".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            none: 0.0,
            mild: 0.8,
            moderate: 1.6,
            severe: 2.5,
        }
    }
}

/// Flat bonuses per match-quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBonuses {
    pub perfect: f64,
    pub high: f64,
    pub moderate: f64,
    pub low: f64,
    pub minimal: f64,
}

impl Default for TierBonuses {
    fn default() -> Self {
        Self {
            perfect: 25.0,
            high: 18.0,
            moderate: 12.0,
            low: 8.0,
            minimal: 5.0,
        }
    }
}

/// Confidence scorer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SeverityWeights,
    /// Share of the base score coming from coverage of the required set
    pub match_weight: f64,
    /// Share of the base score coming from reported severities
    pub severity_weight: f64,
    pub tier_bonuses: TierBonuses,
    /// Bonus when every required symptom is in evidence
    pub full_match_bonus: f64,
    /// Per-matched-symptom bonus and its cap
    pub per_match_bonus: f64,
    pub per_match_cap: f64,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if (self.match_weight + self.severity_weight - 1.0).abs() > 1e-9 {
            return Err(ConsultaError::InvalidKnowledge(
                "match_weight and severity_weight must sum to 1.0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            match_weight: 0.6,
            severity_weight: 0.4,
            tier_bonuses: TierBonuses::default(),
            full_match_bonus: 15.0,
            per_match_bonus: 3.0,
            per_match_cap: 12.0,
        }
    }
}

/// Diagnosis resolver thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidates below this never survive the primary pass
    pub absolute_min: f64,
    /// Minimum best confidence before a diagnosis record is persisted
    pub persist_min: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            absolute_min: 15.0,
            persist_min: 35.0,
        }
    }
}

/// Question selector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// When some rule is fully covered at or above this confidence, the
    /// selector stops proposing questions. Deliberately distinct from the
    /// completion evaluator's perfect-match threshold.
    pub settled_confidence: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            settled_confidence: 75.0,
        }
    }
}

/// Completion heuristic budgets and thresholds, one field per ladder branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// (a) early stop once best confidence reaches this
    pub early_confidence: f64,
    /// Minimum questions before any confidence-based stop
    pub min_questions: u32,
    /// (b) fully-covered rule at or above this confidence
    pub perfect_match_confidence: f64,
    /// (c) hard cap on questions
    pub max_questions: u32,
    /// (d) enough confidence to diagnose
    pub diagnosis_confidence: f64,
    /// (e) fair confidence after the minimum question count
    pub fair_confidence: f64,
    /// (f) question count after which two distinct reports suffice
    pub breadth_questions: u32,
    /// (h) stop with any evidence at all after this many questions
    pub evidence_budget: u32,
    /// (i) give up on an empty interview after this many questions...
    pub dead_end_questions: u32,
    /// ...when best confidence is still below this
    pub low_signal_confidence: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            early_confidence: 80.0,
            min_questions: 6,
            perfect_match_confidence: 70.0,
            max_questions: 12,
            diagnosis_confidence: 35.0,
            fair_confidence: 20.0,
            breadth_questions: 8,
            evidence_budget: 10,
            dead_end_questions: 5,
            low_signal_confidence: 15.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub resolver: ResolverConfig,
    pub selector: SelectorConfig,
    pub completion: CompletionConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        if self.session.expected_max_steps == 0 {
            return Err(ConsultaError::InvalidKnowledge(
                "expected_max_steps must be positive".into(),
            ));
        }
        if self.completion.min_questions > self.completion.max_questions {
            return Err(ConsultaError::InvalidKnowledge(
                "min_questions cannot exceed max_questions".into(),
            ));
        }
        Ok(())
    }
}

/// Session bookkeeping configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Step count treated as a full interview when reporting progress
    pub expected_max_steps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expected_max_steps: 10,
        }
    }
}
