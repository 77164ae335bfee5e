//! Consultation engine façade.
//!
//! Owns the knowledge source, the session table, and the diagnosis store.
//! Each submit is one atomic unit: validation, append, completion check,
//! optional diagnosis persistence, and the status transition all happen on a
//! working copy of the session; the stored session is replaced only after
//! every fallible stage succeeded, so a resolver or store failure leaves the
//! interview resumable with no partially-applied step.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use consulta_common::{
    ConsultaError, DecisionTree, EngineConfig, Evidence, KnowledgeSource, Result, Step, StepKind,
};

use crate::completion::CompletionEvaluator;
use crate::resolver::{DiagnosisResolver, DiagnosisResult, DiagnosisStore};
use crate::selector::{Question, QuestionSelector};
use crate::session::{ConsultationSession, SessionStatistics};

/// Whether the interview continues after a submitted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Continuing,
    Completed,
}

/// Response to a submitted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: FlowStatus,
    /// Next question to ask, present while continuing
    pub next_question: Option<Question>,
    /// Resolved diagnosis, present once completed
    pub diagnosis: Option<DiagnosisResult>,
    /// Why the interview ended, once completed
    pub completion_reason: Option<String>,
    /// Interview progress, 0-100
    pub progress: f64,
}

/// Full session view for status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub subject_id: i64,
    pub flow: Vec<Step>,
    pub status: consulta_common::SessionStatus,
    pub progress: f64,
    pub statistics: SessionStatistics,
    pub final_disorder: Option<String>,
    pub diagnosis_record_id: Option<Uuid>,
}

/// The consultation engine.
pub struct ConsultationEngine {
    knowledge: Box<dyn KnowledgeSource>,
    config: EngineConfig,
    resolver: DiagnosisResolver,
    selector: QuestionSelector,
    completion: CompletionEvaluator,
    sessions: Mutex<HashMap<Uuid, ConsultationSession>>,
    store: Mutex<Box<dyn DiagnosisStore>>,
}

impl ConsultationEngine {
    /// Build an engine. Validates the config and the tree against a
    /// knowledge snapshot before accepting either.
    pub fn new(
        knowledge: Box<dyn KnowledgeSource>,
        tree: DecisionTree,
        config: EngineConfig,
        store: Box<dyn DiagnosisStore>,
    ) -> Result<Self> {
        config.validate()?;
        let kb = knowledge.snapshot()?;
        tree.validate(&kb)?;
        Ok(Self {
            knowledge,
            resolver: DiagnosisResolver::new(config.scoring, config.resolver),
            selector: QuestionSelector::new(tree, config.scoring, config.selector),
            completion: CompletionEvaluator::new(config.scoring, config.completion),
            config,
            sessions: Mutex::new(HashMap::new()),
            store: Mutex::new(store),
        })
    }

    /// Start a session for a subject, atomically abandoning the subject's
    /// previous in-progress session if one exists. At most one exists by
    /// construction, so exactly one is abandoned when any is.
    pub fn start_session(&self, subject_id: i64) -> Result<Uuid> {
        let mut sessions = self.lock_sessions()?;
        let stale: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.subject_id == subject_id && !s.status.is_terminal())
            .map(|s| s.id)
            .collect();
        for id in stale {
            if let Some(previous) = sessions.get_mut(&id) {
                previous.abandon()?;
                warn!(subject = subject_id, session = %id, "abandoned stale session");
            }
        }
        let session = ConsultationSession::new(subject_id);
        let id = session.id;
        sessions.insert(id, session);
        info!(subject = subject_id, session = %id, "started consultation session");
        Ok(id)
    }

    /// Explicitly abandon a session.
    pub fn abandon_session(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.lock_sessions()?;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(ConsultaError::SessionNotFound(session_id))?;
        session.abandon()
    }

    /// Submit one step: append, check completion, and either propose the
    /// next question or resolve and record a diagnosis.
    pub fn submit_step(&self, session_id: Uuid, kind: StepKind) -> Result<StepOutcome> {
        let kb = self.knowledge.snapshot()?;

        // Validate the payload before touching any session state.
        if let StepKind::BulkSelection { codes } = &kind {
            if codes.is_empty() {
                return Err(ConsultaError::EmptySelection);
            }
        }
        for code in kind.codes() {
            if kb.symptom(code).is_none() {
                return Err(ConsultaError::UnknownSymptom(code.to_string()));
            }
        }

        let mut sessions = self.lock_sessions()?;
        let session = sessions
            .get(&session_id)
            .ok_or(ConsultaError::SessionNotFound(session_id))?;

        // All fallible work happens on a working copy; the stored session is
        // replaced only on full success.
        let mut working = session.clone();
        let forced_reason = match &kind {
            StepKind::ForceComplete { reason } => Some(reason.clone()),
            _ => None,
        };
        working.append(Step::new(kind))?;

        let evidence = working.reported_symptoms_with_severity();
        let asked = working.asked_symptoms();
        let questions_asked = working.total_questions_asked();
        let progress = working.progress_percentage(self.config.session.expected_max_steps);

        let completion_reason = if let Some(reason) = forced_reason {
            Some(format!("Forced completion: {}", reason))
        } else {
            let decision = self.completion.should_complete(
                &kb,
                &evidence,
                questions_asked,
                &asked,
                Some(&working),
                &self.selector,
            )?;
            decision.stop.then_some(decision.reason)
        };

        if let Some(reason) = completion_reason {
            let diagnosis = {
                let mut store = self.lock_store()?;
                self.resolver
                    .diagnose(&kb, &evidence, working.subject_id, store.as_mut())?
            };
            working.complete(
                diagnosis.best.as_ref().map(|b| b.disorder.clone()),
                diagnosis.record_id,
            )?;
            info!(session = %session_id, reason = %reason, "consultation completed");
            sessions.insert(session_id, working);
            return Ok(StepOutcome {
                status: FlowStatus::Completed,
                next_question: None,
                diagnosis: Some(diagnosis),
                completion_reason: Some(reason),
                progress,
            });
        }

        let next_question = self
            .selector
            .next_question(&kb, &evidence, &asked, Some(&working))?;

        if next_question.is_none() {
            // Selector exhausted; resolve with what we have.
            let reason = "No further questions available".to_string();
            let diagnosis = {
                let mut store = self.lock_store()?;
                self.resolver
                    .diagnose(&kb, &evidence, working.subject_id, store.as_mut())?
            };
            working.complete(
                diagnosis.best.as_ref().map(|b| b.disorder.clone()),
                diagnosis.record_id,
            )?;
            info!(session = %session_id, reason = %reason, "consultation completed");
            sessions.insert(session_id, working);
            return Ok(StepOutcome {
                status: FlowStatus::Completed,
                next_question: None,
                diagnosis: Some(diagnosis),
                completion_reason: Some(reason),
                progress,
            });
        }

        sessions.insert(session_id, working);
        Ok(StepOutcome {
            status: FlowStatus::Continuing,
            next_question,
            diagnosis: None,
            completion_reason: None,
            progress,
        })
    }

    /// Next question for an arbitrary evidence/asked pair, outside any
    /// session (no branch walk without a flow; tree order still applies).
    pub fn next_question(
        &self,
        evidence: &Evidence,
        asked: &BTreeSet<String>,
    ) -> Result<Option<Question>> {
        let kb = self.knowledge.snapshot()?;
        self.selector.next_question(&kb, evidence, asked, None)
    }

    /// Resolve a diagnosis for raw evidence, persisting when warranted.
    pub fn diagnose(&self, evidence: &Evidence, subject_id: i64) -> Result<DiagnosisResult> {
        let kb = self.knowledge.snapshot()?;
        let mut store = self.lock_store()?;
        self.resolver
            .diagnose(&kb, evidence, subject_id, store.as_mut())
    }

    /// Current state of a session.
    pub fn session_state(&self, session_id: Uuid) -> Result<SessionView> {
        let sessions = self.lock_sessions()?;
        let session = sessions
            .get(&session_id)
            .ok_or(ConsultaError::SessionNotFound(session_id))?;
        Ok(SessionView {
            id: session.id,
            subject_id: session.subject_id,
            flow: session.flow.clone(),
            status: session.status,
            progress: session.progress_percentage(self.config.session.expected_max_steps),
            statistics: SessionStatistics::for_session(session),
            final_disorder: session.final_disorder.clone(),
            diagnosis_record_id: session.diagnosis_record_id,
        })
    }

    fn lock_sessions(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, ConsultationSession>>> {
        self.sessions
            .lock()
            .map_err(|_| ConsultaError::Resolution("session table lock poisoned".into()))
    }

    fn lock_store(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn DiagnosisStore>>> {
        self.store
            .lock()
            .map_err(|_| ConsultaError::Resolution("diagnosis store lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryDiagnosisStore;
    use consulta_common::{
        default_knowledge, default_tree, AnswerValue, SessionStatus, Severity, StaticKnowledge,
    };

    fn engine() -> ConsultationEngine {
        ConsultationEngine::new(
            Box::new(StaticKnowledge::new(default_knowledge()).unwrap()),
            default_tree(),
            EngineConfig::default(),
            Box::new(MemoryDiagnosisStore::new()),
        )
        .unwrap()
    }

    fn answer(code: &str, severity: Severity) -> StepKind {
        StepKind::SymptomQuestion {
            code: code.into(),
            answer: AnswerValue::Graded(severity),
            question_text: String::new(),
            rule_code: None,
            priority: None,
        }
    }

    #[test]
    fn test_start_session_abandons_previous() {
        let engine = engine();
        let first = engine.start_session(9).unwrap();
        let second = engine.start_session(9).unwrap();
        assert_ne!(first, second);
        assert_eq!(
            engine.session_state(first).unwrap().status,
            SessionStatus::Abandoned
        );
        assert_eq!(
            engine.session_state(second).unwrap().status,
            SessionStatus::InProgress
        );

        // A third start abandons only the second; the first stays abandoned.
        let third = engine.start_session(9).unwrap();
        assert_eq!(
            engine.session_state(second).unwrap().status,
            SessionStatus::Abandoned
        );
        assert_eq!(
            engine.session_state(third).unwrap().status,
            SessionStatus::InProgress
        );
    }

    #[test]
    fn test_unknown_symptom_rejected_without_append() {
        let engine = engine();
        let id = engine.start_session(1).unwrap();
        let err = engine
            .submit_step(id, answer("G99", Severity::Severe))
            .unwrap_err();
        assert!(matches!(err, ConsultaError::UnknownSymptom(_)));
        assert!(engine.session_state(id).unwrap().flow.is_empty());
    }

    #[test]
    fn test_empty_bulk_selection_rejected() {
        let engine = engine();
        let id = engine.start_session(1).unwrap();
        let err = engine
            .submit_step(id, StepKind::BulkSelection { codes: vec![] })
            .unwrap_err();
        assert!(matches!(err, ConsultaError::EmptySelection));
    }

    #[test]
    fn test_duplicate_submission_rejected() {
        let engine = engine();
        let id = engine.start_session(1).unwrap();
        engine.submit_step(id, answer("G01", Severity::Mild)).unwrap();
        let err = engine
            .submit_step(id, answer("G01", Severity::Severe))
            .unwrap_err();
        assert!(matches!(err, ConsultaError::DuplicateSymptom { .. }));
        assert_eq!(engine.session_state(id).unwrap().flow.len(), 1);
    }

    #[test]
    fn test_continuing_outcome_carries_next_question() {
        let engine = engine();
        let id = engine.start_session(1).unwrap();
        let outcome = engine.submit_step(id, answer("G01", Severity::Mild)).unwrap();
        assert_eq!(outcome.status, FlowStatus::Continuing);
        let q = outcome.next_question.unwrap();
        assert_eq!(q.code, "G02"); // yes-branch of the root
        assert!(outcome.diagnosis.is_none());
        assert!(outcome.progress > 0.0);
    }

    #[test]
    fn test_force_complete_resolves_immediately() {
        let engine = engine();
        let id = engine.start_session(5).unwrap();
        engine.submit_step(id, answer("G07", Severity::Severe)).unwrap();
        let outcome = engine
            .submit_step(
                id,
                StepKind::ForceComplete {
                    reason: "subject left".into(),
                },
            )
            .unwrap();
        assert_eq!(outcome.status, FlowStatus::Completed);
        let diagnosis = outcome.diagnosis.unwrap();
        assert!(diagnosis.has_output);
        assert_eq!(
            outcome.completion_reason.as_deref(),
            Some("Forced completion: subject left")
        );
        assert_eq!(
            engine.session_state(id).unwrap().status,
            SessionStatus::Completed
        );
    }

    #[test]
    fn test_submit_to_completed_session_rejected() {
        let engine = engine();
        let id = engine.start_session(1).unwrap();
        engine
            .submit_step(id, StepKind::ForceComplete { reason: "x".into() })
            .unwrap();
        let err = engine
            .submit_step(id, answer("G01", Severity::Mild))
            .unwrap_err();
        assert!(matches!(err, ConsultaError::SessionNotActive { .. }));
    }

    #[test]
    fn test_unknown_session() {
        let engine = engine();
        let err = engine
            .submit_step(Uuid::new_v4(), answer("G01", Severity::Mild))
            .unwrap_err();
        assert!(matches!(err, ConsultaError::SessionNotFound(_)));
    }

    #[test]
    fn test_full_interview_reaches_diagnosis() {
        let engine = engine();
        let id = engine.start_session(11).unwrap();
        // Panic-track answers: G01 no -> G05 no -> G07 yes -> probe R03
        let script = [
            ("G01", Severity::None),
            ("G05", Severity::None),
            ("G07", Severity::Severe),
        ];
        let mut outcome = None;
        for (code, sev) in script {
            outcome = Some(engine.submit_step(id, answer(code, sev)).unwrap());
        }
        let mut outcome = outcome.unwrap();
        // Follow the selector until completion.
        let mut guard = 0;
        while outcome.status == FlowStatus::Continuing {
            let q = outcome.next_question.clone().expect("question while continuing");
            outcome = engine
                .submit_step(id, answer(&q.code, Severity::Severe))
                .unwrap();
            guard += 1;
            assert!(guard < 20, "interview did not converge");
        }
        let diagnosis = outcome.diagnosis.unwrap();
        assert!(diagnosis.has_output);
        assert!(diagnosis.best.is_some());
        let view = engine.session_state(id).unwrap();
        assert_eq!(view.status, SessionStatus::Completed);
        assert_eq!(view.final_disorder, diagnosis.best.map(|b| b.disorder));
    }
}
