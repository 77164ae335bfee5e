//! Consultation session: append-only interview log plus derived projections.
//!
//! Steps are never edited or removed. Every view of the interview (reported
//! symptoms, evidence map, question counts, progress) is recomputed from the
//! flow, matching exhaustively on the step kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use consulta_common::{
    ConsultaError, Evidence, Result, SessionStatus, Severity, Step, StepKind,
};

/// One subject interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationSession {
    pub id: Uuid,
    pub subject_id: i64,
    /// Append-only step log
    pub flow: Vec<Step>,
    pub status: SessionStatus,
    /// Disorder concluded when the session completed with a diagnosis
    pub final_disorder: Option<String>,
    /// Persisted diagnosis record, when one was written
    pub diagnosis_record_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ConsultationSession {
    pub fn new(subject_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            flow: Vec::new(),
            status: SessionStatus::InProgress,
            final_disorder: None,
            diagnosis_record_id: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ConsultaError::SessionNotActive {
                id: self.id,
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Append a step. Rejects terminal sessions and any symptom code already
    /// present in the flow; resubmission never overwrites prior evidence.
    pub fn append(&mut self, step: Step) -> Result<()> {
        self.ensure_active()?;
        let asked = self.asked_symptoms();
        for code in step.kind.codes() {
            if asked.contains(code) {
                return Err(ConsultaError::DuplicateSymptom {
                    session: self.id,
                    code: code.to_string(),
                });
            }
        }
        // A bulk step may not repeat a code within itself either
        let mut in_step = BTreeSet::new();
        for code in step.kind.codes() {
            if !in_step.insert(code) {
                return Err(ConsultaError::DuplicateSymptom {
                    session: self.id,
                    code: code.to_string(),
                });
            }
        }
        self.flow.push(step);
        Ok(())
    }

    /// `in_progress -> completed`. Terminal states reject the transition.
    pub fn complete(
        &mut self,
        final_disorder: Option<String>,
        diagnosis_record_id: Option<Uuid>,
    ) -> Result<()> {
        self.ensure_active()?;
        self.status = SessionStatus::Completed;
        self.final_disorder = final_disorder;
        self.diagnosis_record_id = diagnosis_record_id;
        self.ended_at = Some(Utc::now());
        debug!(session = %self.id, "session completed");
        Ok(())
    }

    /// `in_progress -> abandoned`.
    pub fn abandon(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = SessionStatus::Abandoned;
        self.ended_at = Some(Utc::now());
        debug!(session = %self.id, "session abandoned");
        Ok(())
    }

    /// Distinct codes reported at a severity other than none. Legacy boolean
    /// `true` answers count as moderate; bulk-selected codes as moderate.
    pub fn reported_symptoms(&self) -> Vec<String> {
        self.reported_symptoms_with_severity()
            .into_iter()
            .filter(|(_, sev)| sev.is_present())
            .map(|(code, _)| code)
            .collect()
    }

    /// Last-write-wins map of every answered code to its severity, including
    /// explicit denials. This is the evidence map the scorer consumes.
    pub fn reported_symptoms_with_severity(&self) -> Evidence {
        let mut evidence = Evidence::new();
        for step in &self.flow {
            match &step.kind {
                StepKind::SymptomQuestion { code, answer, .. } => {
                    evidence.insert(code.clone(), answer.severity());
                }
                StepKind::BulkSelection { codes } => {
                    for code in codes {
                        evidence.insert(code.clone(), Severity::Moderate);
                    }
                }
                StepKind::ForceComplete { .. } => {}
            }
        }
        evidence
    }

    /// Every code that appears in any step, regardless of severity.
    pub fn asked_symptoms(&self) -> BTreeSet<String> {
        self.flow
            .iter()
            .flat_map(|step| step.kind.codes())
            .map(|c| c.to_string())
            .collect()
    }

    /// Count of symptom-question steps (bulk selections count as one step
    /// but zero questions).
    pub fn total_questions_asked(&self) -> u32 {
        self.flow.iter().filter(|s| s.kind.is_question()).count() as u32
    }

    /// Interview progress against the expected step budget, capped at 100.
    pub fn progress_percentage(&self, expected_max_steps: u32) -> f64 {
        let expected = expected_max_steps.max(1) as f64;
        (self.flow.len() as f64 / expected * 100.0).min(100.0)
    }
}

/// Aggregate numbers derived from one session, for status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub steps: usize,
    pub questions_asked: u32,
    pub symptoms_asked: usize,
    pub symptoms_reported: usize,
}

impl SessionStatistics {
    pub fn for_session(session: &ConsultationSession) -> Self {
        Self {
            steps: session.flow.len(),
            questions_asked: session.total_questions_asked(),
            symptoms_asked: session.asked_symptoms().len(),
            symptoms_reported: session.reported_symptoms().len(),
        }
    }
}
