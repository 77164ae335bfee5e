//! Consulta Common - Shared types and schemas for the consultation engine.
//!
//! Reference data (symptoms, disorders, rules), the static decision tree,
//! flow step records, engine configuration, and error types. No inference
//! logic lives here; see the `consulta_engine` crate.

pub mod config;
pub mod decision_tree;
pub mod error;
pub mod knowledge;
pub mod step;
pub mod types;

pub use config::*;
pub use decision_tree::*;
pub use error::*;
pub use knowledge::*;
pub use step::*;
pub use types::*;
