//! Consulta Engine - diagnostic inference for symptom consultations.
//!
//! Backward-chaining-style confidence scoring over a static rule set, an
//! adaptive question selector walking a decision tree, a completion
//! heuristic deciding when enough evidence exists, and the session state
//! machine recording the interview. Reference types and configuration live
//! in `consulta_common`.

pub mod completion;
pub mod engine;
pub mod resolver;
pub mod scoring;
pub mod selector;
pub mod session;

pub use completion::{CompletionDecision, CompletionEvaluator};
pub use engine::{ConsultationEngine, FlowStatus, SessionView, StepOutcome};
pub use resolver::{
    Candidate, CandidatePath, DiagnosisRecord, DiagnosisResolver, DiagnosisResult,
    DiagnosisStatus, DiagnosisStore, JsonDiagnosisStore, MemoryDiagnosisStore,
};
pub use scoring::{best_confidence, fully_covered_rule, score_rule, MatchQuality, RuleScore};
pub use selector::{Question, QuestionCategory, QuestionSelector, DECISION_TREE_RULE};
pub use session::{ConsultationSession, SessionStatistics};
