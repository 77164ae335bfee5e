//! Adaptive question selector.
//!
//! Walks the static decision tree: open at the root, follow yes/no branches
//! from the most recent answer, probe the remaining requirements of a rule
//! when a terminal node points at a disorder, and fall back to global
//! priority order when the walk dead-ends. Stops proposing questions once
//! some rule is fully covered at high confidence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use consulta_common::{
    DecisionTree, Evidence, KnowledgeBase, NodeEdge, Result, SelectorConfig, ScoringConfig,
    Severity, StepKind,
};

use crate::scoring::{fully_covered_rule, score_rule};
use crate::session::ConsultationSession;

/// Sentinel rule code for questions driven by the tree itself rather than a
/// specific rule's requirements.
pub const DECISION_TREE_RULE: &str = "decision_tree";

/// How the selector arrived at a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    /// The tree root, asked before any evidence exists
    Opening,
    /// Filling in the remaining requirements of a promising rule
    TargetedProbe,
    /// Following a yes/no branch from the latest answer
    BranchFollowUp,
    /// Global priority order when the walk has nowhere to go
    PriorityFallback,
}

/// A proposed next question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub code: String,
    pub description: String,
    pub priority: u32,
    /// Disorder this question is diagnostic for, when one is known
    pub disorder: Option<String>,
    /// Owning rule, or [`DECISION_TREE_RULE`] for tree-driven questions
    pub rule_code: String,
    /// Confidence the owning rule would reach if this were answered moderate
    pub projected_confidence: f64,
    pub category: QuestionCategory,
}

/// Chooses the next most informative question.
pub struct QuestionSelector {
    tree: DecisionTree,
    scoring: ScoringConfig,
    config: SelectorConfig,
}

impl QuestionSelector {
    pub fn new(tree: DecisionTree, scoring: ScoringConfig, config: SelectorConfig) -> Self {
        Self {
            tree,
            scoring,
            config,
        }
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    /// Pick the next question, or `None` when the interview has nothing left
    /// to discriminate. Never returns a code in `asked` or in the evidence.
    pub fn next_question(
        &self,
        kb: &KnowledgeBase,
        evidence: &Evidence,
        asked: &BTreeSet<String>,
        session: Option<&ConsultationSession>,
    ) -> Result<Option<Question>> {
        // Settled: some rule is fully covered with high confidence, so no
        // further question would change the outcome.
        if let Some((rule, score)) =
            fully_covered_rule(&self.scoring, &kb.rules, evidence, self.config.settled_confidence)
        {
            debug!(rule = %rule.code, confidence = score.confidence, "selector settled");
            return Ok(None);
        }

        let is_open = |code: &str| !asked.contains(code) && !evidence.contains_key(code);

        // Opening question
        if evidence.is_empty() && is_open(&self.tree.root) {
            let root = self.tree.root.clone();
            return Ok(self.build_question(kb, evidence, &root, QuestionCategory::Opening));
        }

        if let Some((last_code, last_severity)) = Self::last_answered(session) {
            if let Some(node) = self.tree.node(&last_code) {
                match &node.edge {
                    NodeEdge::LeadsTo { leads_to } if last_severity.is_present() => {
                        // Probe the unasked requirements of the target
                        // disorder's rules.
                        for rule in kb.rules_for_disorder(leads_to) {
                            if let Some(code) =
                                rule.symptoms.iter().find(|s| is_open(s)).cloned()
                            {
                                return Ok(self.build_probe(kb, evidence, &code, rule.code.clone()));
                            }
                        }
                    }
                    NodeEdge::Branches { yes, no } => {
                        let branch = if last_severity.is_present() { yes } else { no };
                        if let Some(code) = branch.iter().find(|s| is_open(s)).cloned() {
                            return Ok(self.build_question(
                                kb,
                                evidence,
                                &code,
                                QuestionCategory::BranchFollowUp,
                            ));
                        }
                    }
                    NodeEdge::LeadsTo { .. } => {}
                }
            }
        }

        // Global fallback: highest-priority unasked node.
        for code in self.tree.nodes_by_priority() {
            if is_open(code) {
                let code = code.to_string();
                return Ok(self.build_question(
                    kb,
                    evidence,
                    &code,
                    QuestionCategory::PriorityFallback,
                ));
            }
        }

        Ok(None)
    }

    /// Most recently answered symptom and its severity, from the session flow.
    fn last_answered(session: Option<&ConsultationSession>) -> Option<(String, Severity)> {
        let session = session?;
        session.flow.iter().rev().find_map(|step| match &step.kind {
            StepKind::SymptomQuestion { code, answer, .. } => {
                Some((code.clone(), answer.severity()))
            }
            StepKind::BulkSelection { codes } => codes
                .last()
                .map(|code| (code.clone(), Severity::Moderate)),
            StepKind::ForceComplete { .. } => None,
        })
    }

    fn build_question(
        &self,
        kb: &KnowledgeBase,
        evidence: &Evidence,
        code: &str,
        category: QuestionCategory,
    ) -> Option<Question> {
        let symptom = kb.symptom(code)?;
        let priority = self.tree.node(code).map(|n| n.priority).unwrap_or(0);
        let owning_rule = kb.rule_requiring(code);
        let disorder = match self.tree.node(code).map(|n| &n.edge) {
            Some(NodeEdge::LeadsTo { leads_to }) => Some(leads_to.clone()),
            _ => owning_rule.map(|r| r.disorder.clone()),
        };
        let projected_confidence = owning_rule
            .map(|rule| {
                let mut hypothetical = evidence.clone();
                hypothetical.insert(code.to_string(), Severity::Moderate);
                score_rule(&self.scoring, rule, &hypothetical).confidence
            })
            .unwrap_or(0.0);
        Some(Question {
            code: code.to_string(),
            description: symptom.description.clone(),
            priority,
            disorder,
            rule_code: DECISION_TREE_RULE.to_string(),
            projected_confidence,
            category,
        })
    }

    /// Like [`Self::build_question`] but owned by a specific rule.
    fn build_probe(
        &self,
        kb: &KnowledgeBase,
        evidence: &Evidence,
        code: &str,
        rule_code: String,
    ) -> Option<Question> {
        let symptom = kb.symptom(code)?;
        let rule = kb.rule(&rule_code)?;
        let mut hypothetical = evidence.clone();
        hypothetical.insert(code.to_string(), Severity::Moderate);
        let projected = score_rule(&self.scoring, rule, &hypothetical).confidence;
        Some(Question {
            code: code.to_string(),
            description: symptom.description.clone(),
            priority: self.tree.node(code).map(|n| n.priority).unwrap_or(0),
            disorder: Some(rule.disorder.clone()),
            rule_code,
            projected_confidence: projected,
            category: QuestionCategory::TargetedProbe,
        })
    }
}
