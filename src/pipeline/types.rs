//! Per-item reports returned by the engine's batch operations.

use std::fmt;

use serde::Serialize;

use crate::model::{ContactStatus, MessageDraft};

/// Batch operation a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    HunterDiscover,
    HunterDraft,
    FarmerAnalyze,
    FarmerDraft,
    Approval,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HunterDiscover => "hunter_discover",
            Self::HunterDraft => "hunter_draft",
            Self::FarmerAnalyze => "farmer_analyze",
            Self::FarmerDraft => "farmer_draft",
            Self::Approval => "approval",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one job or contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Contacts recorded for a job. `existing` counts deduplicated results.
    ContactsRecorded { created: usize, existing: usize },
    /// A draft was persisted after `attempts` generator calls.
    Drafted { chars: usize, attempts: u32 },
    Approved,
    Skipped,
    /// No reply in time; the contact stays pending.
    TimedOut,
    /// Not attempted; picked up again on a later run.
    Deferred { reason: String },
    /// Refused before any side effect.
    Rejected { reason: String },
    /// Attempted and failed; state left as it was.
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    /// Job id or contact id.
    pub subject: String,
    pub outcome: ItemOutcome,
}

impl ItemReport {
    pub fn new(subject: impl ToString, outcome: ItemOutcome) -> Self {
        Self {
            subject: subject.to_string(),
            outcome,
        }
    }

    pub fn failed(subject: impl ToString, reason: impl fmt::Display) -> Self {
        Self::new(
            subject,
            ItemOutcome::Failed {
                reason: reason.to_string(),
            },
        )
    }

    pub fn deferred(subject: impl ToString, reason: impl fmt::Display) -> Self {
        Self::new(
            subject,
            ItemOutcome::Deferred {
                reason: reason.to_string(),
            },
        )
    }

    pub fn rejected(subject: impl ToString, reason: impl fmt::Display) -> Self {
        Self::new(
            subject,
            ItemOutcome::Rejected {
                reason: reason.to_string(),
            },
        )
    }
}

/// Best-effort result of a batch: one entry per item, never all-or-nothing.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub items: Vec<ItemReport>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            items: Vec::new(),
        }
    }

    pub fn with_items(stage: Stage, items: Vec<ItemReport>) -> Self {
        Self { stage, items }
    }

    pub fn push(&mut self, item: ItemReport) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, subject: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|i| i.subject == subject)
            .map(|i| &i.outcome)
    }

    pub fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| predicate(&i.outcome)).count()
    }

    pub fn failures(&self) -> usize {
        self.count(ItemOutcome::is_failure)
    }

    pub fn deferred(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Deferred { .. }))
    }

    /// Emit one summary line for the stage.
    pub fn log_summary(&self) {
        tracing::info!(
            stage = %self.stage,
            items = self.items.len(),
            failures = self.failures(),
            deferred = self.deferred(),
            "Stage complete"
        );
    }
}

/// Reports from one scheduled discover/draft cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub hunter_discover: StageReport,
    pub hunter_draft: StageReport,
    pub farmer_draft: StageReport,
}

/// Effect of applying one reviewer decision to a contact.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionEffect {
    Approved { final_message: String },
    Skipped,
    /// The draft was regenerated and saved; the contact stays pending.
    Revised(MessageDraft),
    /// Nothing changed: the contact had already left `PendingApproval`.
    AlreadyResolved(ContactStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_by_outcome() {
        let report = StageReport::with_items(
            Stage::HunterDiscover,
            vec![
                ItemReport::new(
                    "rec1",
                    ItemOutcome::ContactsRecorded {
                        created: 3,
                        existing: 0,
                    },
                ),
                ItemReport::deferred("rec2", "rate limited"),
                ItemReport::failed("rec3", "timeout"),
                ItemReport::rejected("rec4", "not in progress"),
            ],
        );
        assert_eq!(report.failures(), 2);
        assert_eq!(report.deferred(), 1);
        assert!(matches!(
            report.get("rec2"),
            Some(ItemOutcome::Deferred { .. })
        ));
        assert_eq!(report.get("missing"), None);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ItemOutcome::Drafted {
            chars: 280,
            attempts: 2,
        })
        .unwrap();
        assert_eq!(json["outcome"], "drafted");
        assert_eq!(json["chars"], 280);
    }
}
