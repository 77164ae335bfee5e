//! Scoring invariants checked over exhaustive small evidence grids.
//!
//! Plain-loop property checks (no fuzzing harness): every combination of
//! severities over small rule sizes must keep confidence in range, respect
//! monotonicity, and honor the documented floor for full moderate coverage.

use consulta_common::{Evidence, Rule, ScoringConfig, Severity};
use consulta_engine::{score_rule, MatchQuality};

const SEVERITIES: [Severity; 4] = [
    Severity::None,
    Severity::Mild,
    Severity::Moderate,
    Severity::Severe,
];

fn rule_of(n: usize) -> Rule {
    Rule {
        code: format!("R{}", n),
        disorder: "D01".into(),
        symptoms: (0..n).map(|i| format!("G{}", i)).collect(),
    }
}

/// All severity assignments for the first `k` of `n` required symptoms.
fn assignments(n: usize, k: usize) -> Vec<Evidence> {
    let mut out = vec![Evidence::new()];
    for i in 0..k.min(n) {
        let mut next = Vec::new();
        for partial in &out {
            for sev in SEVERITIES {
                let mut e = partial.clone();
                e.insert(format!("G{}", i), sev);
                next.push(e);
            }
        }
        out = next;
    }
    out
}

#[test]
fn test_confidence_always_within_bounds() {
    let cfg = ScoringConfig::default();
    for n in 1..=4 {
        let rule = rule_of(n);
        for evidence in assignments(n, n) {
            let score = score_rule(&cfg, &rule, &evidence);
            assert!(
                (0.0..=100.0).contains(&score.confidence),
                "rule size {} evidence {:?} gave {}",
                n,
                evidence,
                score.confidence
            );
        }
    }
}

#[test]
fn test_full_coverage_at_moderate_or_better_scores_at_least_75() {
    let cfg = ScoringConfig::default();
    for n in 1..=4 {
        let rule = rule_of(n);
        for evidence in assignments(n, n) {
            let full = evidence.len() == n
                && evidence.values().all(|s| *s >= Severity::Moderate);
            if !full {
                continue;
            }
            let score = score_rule(&cfg, &rule, &evidence);
            assert!(
                score.confidence >= 75.0,
                "full moderate coverage of {} symptoms gave {}",
                n,
                score.confidence
            );
            assert_eq!(score.quality, MatchQuality::PerfectMatch);
        }
    }
}

#[test]
fn test_adding_a_matched_symptom_never_lowers_confidence() {
    let cfg = ScoringConfig::default();
    for n in 2..=4 {
        let rule = rule_of(n);
        for sev in SEVERITIES {
            let mut evidence = Evidence::new();
            let mut prev = score_rule(&cfg, &rule, &evidence).confidence;
            for i in 0..n {
                evidence.insert(format!("G{}", i), sev);
                let next = score_rule(&cfg, &rule, &evidence).confidence;
                assert!(
                    next >= prev,
                    "rule size {} severity {:?}: {} -> {}",
                    n,
                    sev,
                    prev,
                    next
                );
                prev = next;
            }
        }
    }
}

#[test]
fn test_raising_severity_never_lowers_confidence() {
    let cfg = ScoringConfig::default();
    let rule = rule_of(3);
    for base in assignments(3, 2) {
        let mut prev = -1.0;
        for sev in SEVERITIES {
            let mut e = base.clone();
            e.insert("G2".to_string(), sev);
            let c = score_rule(&cfg, &rule, &e).confidence;
            assert!(c >= prev, "severity {:?} dropped {} -> {}", sev, prev, c);
            prev = c;
        }
    }
}

#[test]
fn test_unrelated_evidence_does_not_change_the_score() {
    let cfg = ScoringConfig::default();
    let rule = rule_of(2);
    let mut evidence = Evidence::new();
    evidence.insert("G0".to_string(), Severity::Moderate);
    let before = score_rule(&cfg, &rule, &evidence).confidence;
    evidence.insert("X1".to_string(), Severity::Severe);
    evidence.insert("X2".to_string(), Severity::Severe);
    let after = score_rule(&cfg, &rule, &evidence).confidence;
    assert_eq!(before, after);
}
