//! Deal Analysis Orchestrator
//!
//! Runs a comprehensive investment analysis for one deal:
//! - Assembles subject context and the fund's scoring strategy
//! - Fans out to five category engines plus research, in parallel
//! - Aggregates a weighted score and classifies it into a RAG band
//! - Writes the executive narrative, risks and next steps
//! - Persists the versioned result and pushes an anonymized insight
//! - Serves a migration adapter for the retired per-action API
//!
//! PIPELINE:
//! CONTEXT → FAN-OUT → AGGREGATE → CLASSIFY → NARRATE → PUBLISH → AUDIT

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod context;
pub mod engines;
pub mod error;
pub mod gemini;
pub mod legacy;
pub mod memory;
pub mod models;
pub mod narrative;
pub mod policy;
pub mod publish;
pub mod scoring;
pub mod state;

pub use error::Result;

// Re-export common types
pub use agent::{Orchestrator, RunReport};
pub use classifier::RagClassifier;
pub use models::*;
