//! Static decision tree driving question selection.
//!
//! The tree is immutable configuration injected at construction: one node per
//! symptom code, each carrying a priority and either yes/no branch lists or a
//! terminal `leads_to` disorder. Loadable from TOML alongside the knowledge
//! base and validated against it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ConsultaError, Result};
use crate::knowledge::KnowledgeBase;

/// Outgoing edges of a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeEdge {
    /// Follow-up questions depending on whether the symptom was reported.
    Branches {
        yes: Vec<String>,
        no: Vec<String>,
    },
    /// Terminal node pointing at the disorder it is diagnostic for.
    LeadsTo { leads_to: String },
}

/// One node in the decision tree, keyed by symptom code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Selection priority (higher = asked earlier in the fallback order)
    pub priority: u32,
    #[serde(flatten)]
    pub edge: NodeEdge,
}

/// The full question-selection tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Symptom code of the opening question
    pub root: String,
    /// Nodes keyed by symptom code
    pub nodes: BTreeMap<String, TreeNode>,
}

impl DecisionTree {
    /// Parse from TOML. Call [`DecisionTree::validate`] against the knowledge
    /// base before handing the tree to the selector.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let tree: DecisionTree = toml::from_str(toml_str)?;
        Ok(tree)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let toml_str = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_str)
    }

    pub fn node(&self, code: &str) -> Option<&TreeNode> {
        self.nodes.get(code)
    }

    /// All node codes sorted by priority descending, ties broken by code so
    /// the fallback order is stable.
    pub fn nodes_by_priority(&self) -> Vec<&str> {
        let mut codes: Vec<(&str, u32)> = self
            .nodes
            .iter()
            .map(|(code, node)| (code.as_str(), node.priority))
            .collect();
        codes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        codes.into_iter().map(|(code, _)| code).collect()
    }

    /// Check the tree against a knowledge snapshot: the root and every node
    /// and branch target must be a known symptom, every `leads_to` a known
    /// disorder.
    pub fn validate(&self, kb: &KnowledgeBase) -> Result<()> {
        if !self.nodes.contains_key(&self.root) {
            return Err(ConsultaError::InvalidTree(format!(
                "root {} has no node",
                self.root
            )));
        }
        for (code, node) in &self.nodes {
            if kb.symptom(code).is_none() {
                return Err(ConsultaError::InvalidTree(format!(
                    "node {} is not a known symptom",
                    code
                )));
            }
            match &node.edge {
                NodeEdge::Branches { yes, no } => {
                    for target in yes.iter().chain(no.iter()) {
                        if kb.symptom(target).is_none() {
                            return Err(ConsultaError::InvalidTree(format!(
                                "node {} branches to unknown symptom {}",
                                code, target
                            )));
                        }
                    }
                }
                NodeEdge::LeadsTo { leads_to } => {
                    if kb.disorder(leads_to).is_none() {
                        return Err(ConsultaError::InvalidTree(format!(
                            "node {} leads to unknown disorder {}",
                            code, leads_to
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        default_tree()
    }
}

fn branches(priority: u32, yes: &[&str], no: &[&str]) -> TreeNode {
    TreeNode {
        priority,
        edge: NodeEdge::Branches {
            yes: yes.iter().map(|s| s.to_string()).collect(),
            no: no.iter().map(|s| s.to_string()).collect(),
        },
    }
}

fn leads_to(priority: u32, disorder: &str) -> TreeNode {
    TreeNode {
        priority,
        edge: NodeEdge::LeadsTo {
            leads_to: disorder.to_string(),
        },
    }
}

/// Compiled-in tree matching [`crate::knowledge::default_knowledge`].
pub fn default_tree() -> DecisionTree {
    let mut nodes = BTreeMap::new();
    nodes.insert("G01".to_string(), branches(100, &["G02", "G03"], &["G05", "G07"]));
    nodes.insert("G02".to_string(), branches(90, &["G03", "G04"], &["G10"]));
    nodes.insert("G03".to_string(), branches(80, &["G04", "G11"], &["G05"]));
    nodes.insert("G04".to_string(), leads_to(75, "D01"));
    nodes.insert("G05".to_string(), branches(70, &["G06", "G10"], &["G07"]));
    nodes.insert("G06".to_string(), branches(65, &["G12", "G10"], &["G07"]));
    nodes.insert("G07".to_string(), branches(60, &["G08", "G09"], &["G01"]));
    nodes.insert("G08".to_string(), leads_to(55, "D03"));
    nodes.insert("G09".to_string(), leads_to(50, "D03"));
    nodes.insert("G10".to_string(), branches(45, &["G12"], &["G11"]));
    nodes.insert("G11".to_string(), leads_to(40, "D01"));
    nodes.insert("G12".to_string(), leads_to(35, "D02"));
    DecisionTree {
        root: "G01".to_string(),
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::default_knowledge;

    #[test]
    fn test_default_tree_is_valid() {
        let kb = default_knowledge();
        let tree = default_tree();
        assert!(tree.validate(&kb).is_ok());
    }

    #[test]
    fn test_priority_order_is_stable() {
        let tree = default_tree();
        let order = tree.nodes_by_priority();
        assert_eq!(order[0], "G01");
        assert_eq!(order[1], "G02");
        assert_eq!(order.len(), tree.nodes.len());
    }

    #[test]
    fn test_validate_rejects_unknown_branch_target() {
        let kb = default_knowledge();
        let mut tree = default_tree();
        tree.nodes
            .insert("G05".to_string(), branches(70, &["G77"], &[]));
        assert!(matches!(
            tree.validate(&kb),
            Err(ConsultaError::InvalidTree(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let kb = default_knowledge();
        let mut tree = default_tree();
        tree.root = "G99".to_string();
        assert!(tree.validate(&kb).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let tree = default_tree();
        let toml_str = toml::to_string_pretty(&tree).unwrap();
        let parsed = DecisionTree::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, tree);
    }
}
