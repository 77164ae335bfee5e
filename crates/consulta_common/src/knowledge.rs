//! Knowledge base: the read-only symptom/disorder/rule catalog.
//!
//! The engine never mutates knowledge. Each resolver or selector invocation
//! works against a single [`KnowledgeBase`] snapshot so a scoring pass never
//! sees a torn view. Knowledge is loadable from TOML, with a compiled-in
//! default screening catalog used when no config is provided.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{ConsultaError, Result};
use crate::types::{Disorder, Rule, Symptom};

/// Disorder code the resolver falls back to when no rule exists at all.
pub const GENERAL_DISORDER_CODE: &str = "GEN";

/// Immutable snapshot of the knowledge catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Schema version
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symptoms: Vec<Symptom>,
    pub disorders: Vec<Disorder>,
    pub rules: Vec<Rule>,
}

fn default_schema_version() -> u32 {
    1
}

impl KnowledgeBase {
    /// Parse from TOML and validate.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let kb: KnowledgeBase = toml::from_str(toml_str)?;
        kb.validate()?;
        Ok(kb)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let toml_str = fs::read_to_string(path)?;
        let kb = Self::from_toml_str(&toml_str)?;
        tracing::debug!(
            path = %path.display(),
            symptoms = kb.symptoms.len(),
            disorders = kb.disorders.len(),
            rules = kb.rules.len(),
            "loaded knowledge base"
        );
        Ok(kb)
    }

    pub fn symptom(&self, code: &str) -> Option<&Symptom> {
        self.symptoms.iter().find(|s| s.code == code)
    }

    pub fn disorder(&self, code: &str) -> Option<&Disorder> {
        self.disorders.iter().find(|d| d.code == code)
    }

    pub fn rule(&self, code: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.code == code)
    }

    /// Rules concluding the given disorder.
    pub fn rules_for_disorder(&self, disorder: &str) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.disorder == disorder).collect()
    }

    /// First rule whose required set contains the symptom, if any.
    pub fn rule_requiring(&self, symptom: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|r| r.symptoms.iter().any(|s| s == symptom))
    }

    /// The fallback disorder for emergency candidates. Prefers [`GENERAL_DISORDER_CODE`],
    /// otherwise the first disorder in the catalog.
    pub fn general_disorder(&self) -> Option<&Disorder> {
        self.disorder(GENERAL_DISORDER_CODE)
            .or_else(|| self.disorders.first())
    }

    /// Check referential integrity. Called on every load path.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for s in &self.symptoms {
            if seen.insert(s.code.as_str(), "symptom").is_some() {
                return Err(ConsultaError::InvalidKnowledge(format!(
                    "duplicate symptom code {}",
                    s.code
                )));
            }
        }
        let mut disorder_codes: HashMap<&str, ()> = HashMap::new();
        for d in &self.disorders {
            if disorder_codes.insert(d.code.as_str(), ()).is_some() {
                return Err(ConsultaError::InvalidKnowledge(format!(
                    "duplicate disorder code {}",
                    d.code
                )));
            }
        }
        let mut rule_codes: HashMap<&str, ()> = HashMap::new();
        for r in &self.rules {
            if rule_codes.insert(r.code.as_str(), ()).is_some() {
                return Err(ConsultaError::InvalidKnowledge(format!(
                    "duplicate rule code {}",
                    r.code
                )));
            }
            if r.symptoms.is_empty() {
                return Err(ConsultaError::InvalidKnowledge(format!(
                    "rule {} has no required symptoms",
                    r.code
                )));
            }
            if !disorder_codes.contains_key(r.disorder.as_str()) {
                return Err(ConsultaError::InvalidKnowledge(format!(
                    "rule {} references unknown disorder {}",
                    r.code, r.disorder
                )));
            }
            for sym in &r.symptoms {
                if !seen.contains_key(sym.as_str()) {
                    return Err(ConsultaError::InvalidKnowledge(format!(
                        "rule {} requires unknown symptom {}",
                        r.code, sym
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        default_knowledge()
    }
}

/// Source of knowledge snapshots.
///
/// The engine asks for one snapshot per request; implementations backed by
/// mutable storage must return an internally consistent view.
pub trait KnowledgeSource: Send + Sync {
    fn list_symptoms(&self) -> Vec<Symptom>;
    fn list_disorders(&self) -> Vec<Disorder>;
    fn list_rules(&self) -> Vec<Rule>;

    /// Assemble a validated snapshot from the three lists.
    fn snapshot(&self) -> Result<KnowledgeBase> {
        let kb = KnowledgeBase {
            schema_version: 1,
            symptoms: self.list_symptoms(),
            disorders: self.list_disorders(),
            rules: self.list_rules(),
        };
        kb.validate()?;
        Ok(kb)
    }
}

/// Knowledge source wrapping a fixed snapshot.
#[derive(Debug, Clone)]
pub struct StaticKnowledge {
    kb: KnowledgeBase,
}

impl StaticKnowledge {
    pub fn new(kb: KnowledgeBase) -> Result<Self> {
        kb.validate()?;
        Ok(Self { kb })
    }
}

impl KnowledgeSource for StaticKnowledge {
    fn list_symptoms(&self) -> Vec<Symptom> {
        self.kb.symptoms.clone()
    }

    fn list_disorders(&self) -> Vec<Disorder> {
        self.kb.disorders.clone()
    }

    fn list_rules(&self) -> Vec<Rule> {
        self.kb.rules.clone()
    }

    fn snapshot(&self) -> Result<KnowledgeBase> {
        Ok(self.kb.clone())
    }
}

fn symptom(code: &str, description: &str) -> Symptom {
    Symptom {
        code: code.to_string(),
        description: description.to_string(),
    }
}

fn rule(code: &str, disorder: &str, symptoms: &[&str]) -> Rule {
    Rule {
        code: code.to_string(),
        disorder: disorder.to_string(),
        symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
    }
}

/// Compiled-in screening catalog, used when no TOML config is supplied.
pub fn default_knowledge() -> KnowledgeBase {
    KnowledgeBase {
        schema_version: 1,
        symptoms: vec![
            symptom("G01", "Do you feel persistently sad or empty?"),
            symptom("G02", "Have you lost interest in activities you used to enjoy?"),
            symptom("G03", "Do you have trouble sleeping or sleep far more than usual?"),
            symptom("G04", "Do you feel tired or low on energy most days?"),
            symptom("G05", "Do you feel excessive worry that is hard to control?"),
            symptom("G06", "Do you feel restless, keyed up, or on edge?"),
            symptom("G07", "Do you experience sudden episodes of intense fear?"),
            symptom("G08", "Do you have a racing heart or shortness of breath during these episodes?"),
            symptom("G09", "Do you avoid places or situations for fear of an episode?"),
            symptom("G10", "Do you have difficulty concentrating?"),
            symptom("G11", "Have your appetite or weight changed noticeably?"),
            symptom("G12", "Do you feel irritable or have frequent mood swings?"),
        ],
        disorders: vec![
            Disorder {
                code: "D01".into(),
                name: "Major depressive episode".into(),
                description: "Persistent low mood with loss of interest and vegetative changes.".into(),
                recommendation: "Schedule a full clinical assessment; consider structured mood monitoring.".into(),
            },
            Disorder {
                code: "D02".into(),
                name: "Generalized anxiety".into(),
                description: "Excessive, hard-to-control worry with physical tension.".into(),
                recommendation: "Discuss relaxation techniques and a follow-up anxiety screening.".into(),
            },
            Disorder {
                code: "D03".into(),
                name: "Panic disorder".into(),
                description: "Recurrent unexpected panic episodes with anticipatory avoidance.".into(),
                recommendation: "Refer for panic-focused evaluation; review avoidance patterns.".into(),
            },
            Disorder {
                code: GENERAL_DISORDER_CODE.into(),
                name: "General distress".into(),
                description: "Non-specific distress not matching a specific screening rule.".into(),
                recommendation: "Monitor symptoms and repeat the screening after two weeks.".into(),
            },
        ],
        rules: vec![
            rule("R01", "D01", &["G01", "G02", "G03", "G04", "G11"]),
            rule("R02", "D02", &["G05", "G06", "G10", "G12"]),
            rule("R03", "D03", &["G07", "G08", "G09"]),
            rule("R04", "D01", &["G01", "G02", "G10"]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_knowledge_is_valid() {
        let kb = default_knowledge();
        assert!(kb.validate().is_ok());
        assert!(kb.general_disorder().is_some());
        assert_eq!(kb.general_disorder().unwrap().code, GENERAL_DISORDER_CODE);
    }

    #[test]
    fn test_lookups() {
        let kb = default_knowledge();
        assert!(kb.symptom("G01").is_some());
        assert!(kb.symptom("G99").is_none());
        assert_eq!(kb.rules_for_disorder("D01").len(), 2);
        assert_eq!(kb.rule_requiring("G07").unwrap().code, "R03");
    }

    #[test]
    fn test_validate_rejects_unknown_symptom_ref() {
        let mut kb = default_knowledge();
        kb.rules.push(rule("R99", "D01", &["G77"]));
        assert!(matches!(
            kb.validate(),
            Err(ConsultaError::InvalidKnowledge(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_required_set() {
        let mut kb = default_knowledge();
        kb.rules.push(Rule {
            code: "R98".into(),
            disorder: "D01".into(),
            symptoms: vec![],
        });
        assert!(kb.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let kb = default_knowledge();
        let toml_str = toml::to_string_pretty(&kb).unwrap();
        let parsed = KnowledgeBase::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.symptoms.len(), kb.symptoms.len());
        assert_eq!(parsed.rules.len(), kb.rules.len());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("knowledge.toml");
        std::fs::write(&path, toml::to_string_pretty(&default_knowledge()).unwrap()).unwrap();
        let kb = KnowledgeBase::load(&path).unwrap();
        assert_eq!(kb.disorders.len(), 4);
    }

    #[test]
    fn test_snapshot_via_source() {
        let source = StaticKnowledge::new(default_knowledge()).unwrap();
        let snap = source.snapshot().unwrap();
        assert_eq!(snap.symptoms.len(), 12);
    }
}
