//! Diagnosis resolver: turns accumulated evidence into a ranked diagnosis.
//!
//! Scoring is a ladder of pure passes tried in order — primary (full scorer),
//! relaxed, minimal, default — stopping at the first pass that yields any
//! candidate. An emergency candidate is synthesized only when the knowledge
//! base has no rules at all. `diagnose` never returns an empty outcome for
//! non-empty evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use consulta_common::{
    ConsultaError, Evidence, KnowledgeBase, ResolverConfig, Result, Rule, ScoringConfig,
    GENERAL_DISORDER_CODE,
};

use crate::scoring::{round2, score_rule, MatchQuality, RuleScore};

/// Which pass produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePath {
    /// Full scorer above the absolute minimum
    Primary,
    /// Relaxed coverage-only scoring
    Secondary,
    /// Minimal overlap, default, or emergency synthesis
    Exploratory,
}

/// One ranked diagnosis candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Owning rule, absent only for emergency candidates
    pub rule_code: Option<String>,
    pub disorder: String,
    pub confidence: f64,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub quality: MatchQuality,
    pub path: CandidatePath,
}

impl Candidate {
    fn from_score(score: RuleScore, path: CandidatePath) -> Self {
        Self {
            rule_code: Some(score.rule_code),
            disorder: score.disorder,
            confidence: score.confidence,
            matched: score.matched,
            missing: score.missing,
            quality: score.quality,
            path,
        }
    }
}

/// Outcome classification for a resolved diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    NoSymptoms,
    HighConfidence,
    MediumConfidence,
    LowConfidence,
    Exploratory,
    Minimal,
}

impl DiagnosisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisStatus::NoSymptoms => "no_symptoms",
            DiagnosisStatus::HighConfidence => "high_confidence",
            DiagnosisStatus::MediumConfidence => "medium_confidence",
            DiagnosisStatus::LowConfidence => "low_confidence",
            DiagnosisStatus::Exploratory => "exploratory",
            DiagnosisStatus::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for DiagnosisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a diagnosis resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub status: DiagnosisStatus,
    /// False only when evidence was completely empty
    pub has_output: bool,
    pub best: Option<Candidate>,
    /// All surviving candidates, best first
    pub candidates: Vec<Candidate>,
    /// Human-readable confidence note
    pub note: String,
    /// Persisted record id, when persistence conditions held
    pub record_id: Option<Uuid>,
}

/// Persisted diagnosis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: Uuid,
    pub subject_id: i64,
    pub reported_symptoms: Vec<String>,
    pub disorder: String,
    /// 0-100, 2 decimal places
    pub confidence: f64,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
}

/// Sink for diagnosis records.
pub trait DiagnosisStore: Send {
    fn insert(&mut self, record: &DiagnosisRecord) -> Result<()>;
    fn records_for_subject(&self, subject_id: i64) -> Result<Vec<DiagnosisRecord>>;
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDiagnosisStore {
    records: Vec<DiagnosisRecord>,
}

impl MemoryDiagnosisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DiagnosisStore for MemoryDiagnosisStore {
    fn insert(&mut self, record: &DiagnosisRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn records_for_subject(&self, subject_id: i64) -> Result<Vec<DiagnosisRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
            .collect())
    }
}

/// File-backed store: one JSON document per record under a directory.
#[derive(Debug)]
pub struct JsonDiagnosisStore {
    dir: PathBuf,
}

impl JsonDiagnosisStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl DiagnosisStore for JsonDiagnosisStore {
    fn insert(&mut self, record: &DiagnosisRecord) -> Result<()> {
        let path = self.dir.join(format!("{}.json", record.id));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "wrote diagnosis record");
        Ok(())
    }

    fn records_for_subject(&self, subject_id: i64) -> Result<Vec<DiagnosisRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let record: DiagnosisRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if record.subject_id == subject_id {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

type ScoringPass = fn(&ScoringConfig, &ResolverConfig, &[Rule], &Evidence) -> Vec<Candidate>;

/// Primary pass: full scorer, keep candidates above the absolute minimum.
fn primary_pass(
    scoring: &ScoringConfig,
    resolver: &ResolverConfig,
    rules: &[Rule],
    evidence: &Evidence,
) -> Vec<Candidate> {
    rules
        .iter()
        .map(|r| score_rule(scoring, r, evidence))
        .filter(|s| s.confidence >= resolver.absolute_min)
        .map(|s| Candidate::from_score(s, CandidatePath::Primary))
        .collect()
}

/// Relaxed pass: coverage-only scoring for rules with any overlap.
fn relaxed_pass(
    scoring: &ScoringConfig,
    _resolver: &ResolverConfig,
    rules: &[Rule],
    evidence: &Evidence,
) -> Vec<Candidate> {
    rules
        .iter()
        .filter_map(|rule| {
            let score = score_rule(scoring, rule, evidence);
            let matched = score.matched.len() as f64;
            if matched == 0.0 {
                return None;
            }
            let required = rule.symptoms.len() as f64;
            let confidence = round2(matched / required * 25.0 + (matched * 4.0).min(15.0));
            Some(Candidate {
                confidence,
                path: CandidatePath::Secondary,
                ..Candidate::from_score(score, CandidatePath::Secondary)
            })
        })
        .collect()
}

/// Minimal pass: any rule sharing at least one symptom.
fn minimal_pass(
    scoring: &ScoringConfig,
    _resolver: &ResolverConfig,
    rules: &[Rule],
    evidence: &Evidence,
) -> Vec<Candidate> {
    rules
        .iter()
        .filter_map(|rule| {
            let score = score_rule(scoring, rule, evidence);
            let matched = score.matched.len() as f64;
            if matched == 0.0 {
                return None;
            }
            let confidence = round2((10.0 + 5.0 * matched).min(30.0));
            Some(Candidate {
                confidence,
                path: CandidatePath::Exploratory,
                ..Candidate::from_score(score, CandidatePath::Exploratory)
            })
        })
        .collect()
}

/// Default pass: fabricate one candidate from an arbitrary rule. Runs only
/// when the earlier passes were all empty and evidence is non-empty.
fn default_pass(
    scoring: &ScoringConfig,
    resolver: &ResolverConfig,
    rules: &[Rule],
    evidence: &Evidence,
) -> Vec<Candidate> {
    let Some(rule) = rules.iter().min_by(|a, b| a.code.cmp(&b.code)) else {
        return Vec::new();
    };
    let score = score_rule(scoring, rule, evidence);
    vec![Candidate {
        confidence: resolver.absolute_min,
        quality: MatchQuality::MinimalMatch,
        path: CandidatePath::Exploratory,
        ..Candidate::from_score(score, CandidatePath::Exploratory)
    }]
}

/// Ordered fallback ladder, first non-empty pass wins.
const SCORING_PASSES: &[(&str, ScoringPass)] = &[
    ("primary", primary_pass),
    ("relaxed", relaxed_pass),
    ("minimal", minimal_pass),
    ("default", default_pass),
];

/// Resolves a diagnosis from accumulated evidence.
pub struct DiagnosisResolver {
    scoring: ScoringConfig,
    config: ResolverConfig,
}

impl DiagnosisResolver {
    pub fn new(scoring: ScoringConfig, config: ResolverConfig) -> Self {
        Self { scoring, config }
    }

    /// Resolve and, when the persistence conditions hold, write a record.
    ///
    /// Persistence requires best confidence at or above `persist_min` and a
    /// positive subject id. Store failures propagate as-is so the caller can
    /// roll back the triggering step.
    pub fn diagnose(
        &self,
        kb: &KnowledgeBase,
        evidence: &Evidence,
        subject_id: i64,
        store: &mut dyn DiagnosisStore,
    ) -> Result<DiagnosisResult> {
        if evidence.is_empty() {
            return Ok(DiagnosisResult {
                status: DiagnosisStatus::NoSymptoms,
                has_output: false,
                best: None,
                candidates: Vec::new(),
                note: "No symptoms reported yet; nothing to diagnose.".into(),
                record_id: None,
            });
        }

        let mut candidates = self.run_passes(&kb.rules, evidence);
        if candidates.is_empty() {
            // Knowledge base has no rules at all; synthesize an emergency
            // candidate against the general disorder.
            let disorder = kb
                .general_disorder()
                .map(|d| d.code.clone())
                .unwrap_or_else(|| GENERAL_DISORDER_CODE.to_string());
            debug!(disorder = %disorder, "no rules available, emergency candidate");
            candidates.push(Candidate {
                rule_code: None,
                disorder,
                confidence: 10.0,
                matched: evidence.keys().cloned().collect(),
                missing: Vec::new(),
                quality: MatchQuality::MinimalMatch,
                path: CandidatePath::Exploratory,
            });
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.rule_code.cmp(&b.rule_code))
        });
        let best = candidates[0].clone();

        let mut record_id = None;
        let status = if best.confidence >= self.config.persist_min && subject_id > 0 {
            let record = self.build_record(kb, evidence, subject_id, &best)?;
            store.insert(&record)?;
            info!(
                subject = subject_id,
                disorder = %record.disorder,
                confidence = record.confidence,
                "persisted diagnosis record"
            );
            record_id = Some(record.id);
            DiagnosisStatus::HighConfidence
        } else {
            Self::classify(best.confidence)
        };

        let note = Self::confidence_note(status, &best);
        Ok(DiagnosisResult {
            status,
            has_output: true,
            best: Some(best),
            candidates,
            note,
            record_id,
        })
    }

    fn run_passes(&self, rules: &[Rule], evidence: &Evidence) -> Vec<Candidate> {
        for (name, pass) in SCORING_PASSES {
            let candidates = pass(&self.scoring, &self.config, rules, evidence);
            if !candidates.is_empty() {
                debug!(pass = name, count = candidates.len(), "scoring pass produced candidates");
                return candidates;
            }
        }
        Vec::new()
    }

    fn build_record(
        &self,
        kb: &KnowledgeBase,
        evidence: &Evidence,
        subject_id: i64,
        best: &Candidate,
    ) -> Result<DiagnosisRecord> {
        let disorder = kb
            .disorder(&best.disorder)
            .ok_or_else(|| ConsultaError::DisorderNotFound(best.disorder.clone()))?;
        Ok(DiagnosisRecord {
            id: Uuid::new_v4(),
            subject_id,
            reported_symptoms: evidence
                .iter()
                .filter(|(_, sev)| sev.is_present())
                .map(|(code, _)| code.clone())
                .collect(),
            disorder: disorder.code.clone(),
            confidence: round2(best.confidence),
            recommendation: disorder.recommendation.clone(),
            created_at: Utc::now(),
        })
    }

    /// Threshold ladder for non-persisted outcomes.
    fn classify(confidence: f64) -> DiagnosisStatus {
        if confidence >= 70.0 {
            DiagnosisStatus::HighConfidence
        } else if confidence >= 50.0 {
            DiagnosisStatus::MediumConfidence
        } else if confidence >= 30.0 {
            DiagnosisStatus::LowConfidence
        } else if confidence >= 15.0 {
            DiagnosisStatus::Exploratory
        } else {
            DiagnosisStatus::Minimal
        }
    }

    fn confidence_note(status: DiagnosisStatus, best: &Candidate) -> String {
        match status {
            DiagnosisStatus::NoSymptoms => "No symptoms reported yet.".into(),
            DiagnosisStatus::HighConfidence => format!(
                "Strong correspondence between reported symptoms and {} ({:.2}%).",
                best.disorder, best.confidence
            ),
            DiagnosisStatus::MediumConfidence => format!(
                "Reported symptoms moderately support {} ({:.2}%); follow-up recommended.",
                best.disorder, best.confidence
            ),
            DiagnosisStatus::LowConfidence => format!(
                "Weak support for {} ({:.2}%); treat as a lead, not a conclusion.",
                best.disorder, best.confidence
            ),
            DiagnosisStatus::Exploratory => format!(
                "Exploratory match only ({:.2}%); more evidence is needed.",
                best.confidence
            ),
            DiagnosisStatus::Minimal => format!(
                "Minimal signal ({:.2}%); the interview gathered little usable evidence.",
                best.confidence
            ),
        }
    }
}
