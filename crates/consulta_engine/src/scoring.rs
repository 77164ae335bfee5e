//! Confidence scorer: how well one rule is supported by current evidence.
//!
//! Pure and deterministic; safe to call concurrently for different rules.
//! The score blends coverage of the rule's required set with the reported
//! severities, then adds discrete bonuses by match-quality tier.

use serde::{Deserialize, Serialize};

use consulta_common::{Evidence, Rule, ScoringConfig};

/// Discrete bucket derived from the fraction of required symptoms in evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    PerfectMatch,
    HighMatch,
    ModerateMatch,
    LowMatch,
    MinimalMatch,
}

impl MatchQuality {
    /// Tier for a match ratio in [0, 1].
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.9 {
            MatchQuality::PerfectMatch
        } else if ratio >= 0.7 {
            MatchQuality::HighMatch
        } else if ratio >= 0.4 {
            MatchQuality::ModerateMatch
        } else if ratio > 0.0 {
            MatchQuality::LowMatch
        } else {
            MatchQuality::MinimalMatch
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchQuality::PerfectMatch => "perfect_match",
            MatchQuality::HighMatch => "high_match",
            MatchQuality::ModerateMatch => "moderate_match",
            MatchQuality::LowMatch => "low_match",
            MatchQuality::MinimalMatch => "minimal_match",
        }
    }
}

impl std::fmt::Display for MatchQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scored support for one rule against one evidence snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleScore {
    pub rule_code: String,
    pub disorder: String,
    /// 0-100, rounded to 2 decimal places
    pub confidence: f64,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub quality: MatchQuality,
}

/// Round to 2 decimal places, the precision persisted records carry.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score one rule against the evidence gathered so far.
///
/// A symptom answered "none" still counts toward coverage (the question was
/// asked and answered) but contributes zero severity weight.
pub fn score_rule(config: &ScoringConfig, rule: &Rule, evidence: &Evidence) -> RuleScore {
    let required = rule.symptoms.len().max(1) as f64;
    let matched: Vec<String> = rule
        .matched(evidence)
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let missing: Vec<String> = rule
        .missing(evidence)
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let matched_count = matched.len() as f64;

    let match_percentage = matched_count / required * 100.0;
    let weight_sum: f64 = matched
        .iter()
        .filter_map(|code| evidence.get(code))
        .map(|sev| config.weights.weight(*sev))
        .sum();
    let severity_score = weight_sum / (required * config.weights.max()) * 100.0;

    let base = config.match_weight * match_percentage + config.severity_weight * severity_score;

    let ratio = matched_count / required;
    let quality = MatchQuality::from_ratio(ratio);
    let tier_bonus = match quality {
        MatchQuality::PerfectMatch => config.tier_bonuses.perfect,
        MatchQuality::HighMatch => config.tier_bonuses.high,
        MatchQuality::ModerateMatch => config.tier_bonuses.moderate,
        MatchQuality::LowMatch => config.tier_bonuses.low,
        MatchQuality::MinimalMatch => config.tier_bonuses.minimal,
    };
    let full_bonus = if matched.len() == rule.symptoms.len() {
        config.full_match_bonus
    } else {
        0.0
    };
    let partial_bonus = if matched_count > 0.0 {
        (config.per_match_bonus * matched_count).min(config.per_match_cap)
    } else {
        0.0
    };

    let confidence = round2((base + tier_bonus + full_bonus + partial_bonus).clamp(0.0, 100.0));

    RuleScore {
        rule_code: rule.code.clone(),
        disorder: rule.disorder.clone(),
        confidence,
        matched,
        missing,
        quality,
    }
}

/// Highest confidence any rule reaches against the evidence. Zero when the
/// rule set is empty.
pub fn best_confidence(config: &ScoringConfig, rules: &[Rule], evidence: &Evidence) -> f64 {
    rules
        .iter()
        .map(|r| score_rule(config, r, evidence).confidence)
        .fold(0.0, f64::max)
}

/// Whether some rule's required set is fully covered by evidence at or above
/// the given confidence.
pub fn fully_covered_rule<'a>(
    config: &ScoringConfig,
    rules: &'a [Rule],
    evidence: &Evidence,
    min_confidence: f64,
) -> Option<(&'a Rule, RuleScore)> {
    rules.iter().find_map(|rule| {
        if !rule.symptoms.iter().all(|s| evidence.contains_key(s)) {
            return None;
        }
        let score = score_rule(config, rule, evidence);
        (score.confidence >= min_confidence).then_some((rule, score))
    })
}
