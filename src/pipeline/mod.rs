//! Outreach orchestration: the Hunter and Farmer pipelines.
//!
//! Both pipelines share the same shape: record contacts for in-progress
//! jobs, draft a message per contact, then put every draft in front of a
//! human. Nothing is final until a reviewer approves it.
//!
//! - Hunter: remote search → connection note (300 characters max)
//! - Farmer: connections export → warm DM (no limit)

mod approval;
mod engine;
mod farmer;
mod hunter;
pub mod rules;
pub mod types;

pub use engine::OutreachEngine;
pub use types::{CycleReport, DecisionEffect, ItemOutcome, ItemReport, Stage, StageReport};
