//! Outreach orchestration engine.
//!
//! Finds people at companies a job seeker has applied to, drafts LinkedIn
//! outreach for them, and routes every draft through human approval.

pub mod approval;
pub mod config;
pub mod discovery;
pub mod error;
pub mod generator;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod store;
