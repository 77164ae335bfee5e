//! Completion heuristic: when has the interview gathered enough evidence?
//!
//! An ordered ladder of checks, first match wins. Each stopping branch has
//! its own reason string so logs and transcripts show why an interview
//! ended. The perfect-match check here (>= 70) is deliberately independent
//! of the selector's settled check (>= 75); they guarantee different things.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use consulta_common::{CompletionConfig, Evidence, KnowledgeBase, Result, ScoringConfig};

use crate::scoring::{best_confidence, fully_covered_rule};
use crate::selector::QuestionSelector;
use crate::session::ConsultationSession;

/// Verdict of one completion check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionDecision {
    pub stop: bool,
    pub reason: String,
}

impl CompletionDecision {
    fn stop(reason: &str) -> Self {
        Self {
            stop: true,
            reason: reason.to_string(),
        }
    }

    fn go_on() -> Self {
        Self {
            stop: false,
            reason: "More evidence needed".to_string(),
        }
    }
}

/// Decides whether to stop asking questions.
pub struct CompletionEvaluator {
    scoring: ScoringConfig,
    config: CompletionConfig,
}

impl CompletionEvaluator {
    pub fn new(scoring: ScoringConfig, config: CompletionConfig) -> Self {
        Self { scoring, config }
    }

    /// Run the ladder. `questions_asked` counts symptom-question steps only.
    pub fn should_complete(
        &self,
        kb: &KnowledgeBase,
        evidence: &Evidence,
        questions_asked: u32,
        asked: &BTreeSet<String>,
        session: Option<&ConsultationSession>,
        selector: &QuestionSelector,
    ) -> Result<CompletionDecision> {
        let cfg = &self.config;
        let best = best_confidence(&self.scoring, &kb.rules, evidence);
        let reported = evidence.values().filter(|s| s.is_present()).count();

        let decision = if best >= cfg.early_confidence && questions_asked >= cfg.min_questions {
            CompletionDecision::stop("Early completion: high confidence reached")
        } else if fully_covered_rule(
            &self.scoring,
            &kb.rules,
            evidence,
            cfg.perfect_match_confidence,
        )
        .is_some()
        {
            CompletionDecision::stop("Perfect rule match found")
        } else if questions_asked >= cfg.max_questions {
            CompletionDecision::stop("Maximum questions limit reached")
        } else if best >= cfg.diagnosis_confidence && questions_asked >= cfg.min_questions {
            CompletionDecision::stop("Sufficient confidence for diagnosis")
        } else if questions_asked >= cfg.min_questions && best >= cfg.fair_confidence {
            CompletionDecision::stop("Fair confidence after minimum questions")
        } else if questions_asked >= cfg.breadth_questions && reported >= 2 {
            CompletionDecision::stop("Broad symptom coverage gathered")
        } else if questions_asked >= cfg.min_questions
            && selector.next_question(kb, evidence, asked, session)?.is_none()
        {
            CompletionDecision::stop("No further discriminating questions available")
        } else if !evidence.is_empty() && questions_asked >= cfg.evidence_budget {
            CompletionDecision::stop("Question budget exhausted with evidence gathered")
        } else if questions_asked >= cfg.dead_end_questions
            && best < cfg.low_signal_confidence
            && evidence.is_empty()
        {
            CompletionDecision::stop("No meaningful evidence after repeated questions")
        } else {
            CompletionDecision::go_on()
        };

        if decision.stop {
            debug!(
                questions_asked,
                best_confidence = best,
                reason = %decision.reason,
                "interview complete"
            );
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consulta_common::{
        default_knowledge, default_tree, SelectorConfig, Severity,
    };

    fn evaluator() -> CompletionEvaluator {
        CompletionEvaluator::new(ScoringConfig::default(), CompletionConfig::default())
    }

    fn selector() -> QuestionSelector {
        QuestionSelector::new(
            default_tree(),
            ScoringConfig::default(),
            SelectorConfig::default(),
        )
    }

    fn evidence(pairs: &[(&str, Severity)]) -> Evidence {
        pairs
            .iter()
            .map(|(code, sev)| (code.to_string(), *sev))
            .collect()
    }

    fn asked_from(evidence: &Evidence) -> BTreeSet<String> {
        evidence.keys().cloned().collect()
    }

    #[test]
    fn test_continues_early_with_no_evidence() {
        let kb = default_knowledge();
        let e = Evidence::new();
        let d = evaluator()
            .should_complete(&kb, &e, 1, &BTreeSet::new(), None, &selector())
            .unwrap();
        assert!(!d.stop);
    }

    #[test]
    fn test_max_questions_limit() {
        let kb = default_knowledge();
        // A single mild report keeps best confidence below every earlier
        // confidence branch; 12 questions trips the hard cap.
        let e = evidence(&[("G09", Severity::Mild)]);
        let d = evaluator()
            .should_complete(&kb, &e, 12, &asked_from(&e), None, &selector())
            .unwrap();
        assert!(d.stop);
        assert_eq!(d.reason, "Maximum questions limit reached");
    }

    #[test]
    fn test_perfect_match_stops_before_min_questions() {
        let kb = default_knowledge();
        let e = evidence(&[
            ("G07", Severity::Severe),
            ("G08", Severity::Severe),
            ("G09", Severity::Severe),
        ]);
        let d = evaluator()
            .should_complete(&kb, &e, 3, &asked_from(&e), None, &selector())
            .unwrap();
        assert!(d.stop);
        assert_eq!(d.reason, "Perfect rule match found");
    }

    #[test]
    fn test_early_completion_outranks_perfect_match() {
        let kb = default_knowledge();
        let e = evidence(&[
            ("G07", Severity::Severe),
            ("G08", Severity::Severe),
            ("G09", Severity::Severe),
        ]);
        let d = evaluator()
            .should_complete(&kb, &e, 6, &asked_from(&e), None, &selector())
            .unwrap();
        assert!(d.stop);
        assert_eq!(d.reason, "Early completion: high confidence reached");
    }

    #[test]
    fn test_sufficient_confidence_after_min_questions() {
        let kb = default_knowledge();
        // One moderate report against R03 lands around 39.5: above the
        // diagnosis threshold, below early completion.
        let e = evidence(&[("G07", Severity::Moderate)]);
        let d = evaluator()
            .should_complete(&kb, &e, 6, &asked_from(&e), None, &selector())
            .unwrap();
        assert!(d.stop);
        assert_eq!(d.reason, "Sufficient confidence for diagnosis");
    }

    #[test]
    fn test_dead_end_interview_stops() {
        let kb = default_knowledge();
        let d = evaluator()
            .should_complete(&kb, &Evidence::new(), 5, &BTreeSet::new(), None, &selector())
            .unwrap();
        assert!(d.stop);
        assert_eq!(d.reason, "No meaningful evidence after repeated questions");
    }

    #[test]
    fn test_breadth_branch() {
        let kb = default_knowledge();
        // Two reported symptoms that barely score: mild answers on a large
        // rule keep best confidence below the fair threshold.
        let mut cfg = CompletionConfig::default();
        cfg.fair_confidence = 60.0;
        cfg.diagnosis_confidence = 60.0;
        let eval = CompletionEvaluator::new(ScoringConfig::default(), cfg);
        let e = evidence(&[("G01", Severity::Mild), ("G05", Severity::Mild)]);
        let d = eval
            .should_complete(&kb, &e, 8, &asked_from(&e), None, &selector())
            .unwrap();
        assert!(d.stop);
        assert_eq!(d.reason, "Broad symptom coverage gathered");
    }
}
