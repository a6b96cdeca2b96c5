//! Approval sessions and human decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::draft::MessageDraft;
use crate::error::OutreachError;

/// Instruction used when a reviewer sends a bare `edit`.
const DEFAULT_EDIT_INSTRUCTION: &str = "make it better";

/// Conversation thread identifier on an approval channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Terminal outcome of one approval round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Skipped,
    /// No reply in time. The contact stays pending for a later re-prompt.
    TimedOut,
}

/// A reviewer's decision on a pending draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Skip,
    /// Free-text instruction, passed through to the generator untouched.
    Edit(String),
}

impl Decision {
    /// Parse a reply from the approval thread.
    pub fn parse(reply: &str) -> Result<Self, OutreachError> {
        let trimmed = reply.trim();
        let lowered = trimmed.to_lowercase();

        match lowered.as_str() {
            "approve" | "approved" | "yes" | "y" | "lgtm" | "send" => return Ok(Self::Approve),
            "skip" | "no" | "pass" | "next" => return Ok(Self::Skip),
            _ => {}
        }

        let is_edit = lowered
            .strip_prefix("edit")
            .is_some_and(|rest| {
                rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with(':')
            });
        if is_edit {
            // Keep the reviewer's original casing in the instruction.
            let instruction = trimmed.get(4..).unwrap_or_default().trim_start_matches(':').trim();
            let instruction = if instruction.is_empty() {
                DEFAULT_EDIT_INSTRUCTION.to_string()
            } else {
                instruction.to_string()
            };
            return Ok(Self::Edit(instruction));
        }

        Err(OutreachError::UnrecognizedDecision {
            reply: trimmed.to_string(),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Skip => "skip",
            Self::Edit(_) => "edit",
        }
    }
}

/// Live correlation between a contact's pending draft and its thread.
///
/// Held in memory only; the contact's status is the durable record.
#[derive(Debug, Clone)]
pub struct ApprovalSession {
    pub thread_id: ThreadId,
    pub contact_id: Uuid,
    pub draft: MessageDraft,
    /// Drafts superseded during this session, oldest first.
    pub history: Vec<MessageDraft>,
    pub opened_at: DateTime<Utc>,
    pub outcome: Option<ApprovalOutcome>,
}

impl ApprovalSession {
    pub fn open(thread_id: ThreadId, contact_id: Uuid, draft: MessageDraft) -> Self {
        Self {
            thread_id,
            contact_id,
            draft,
            history: Vec::new(),
            opened_at: Utc::now(),
            outcome: None,
        }
    }

    /// Replace the current draft, keeping the old one in the history.
    pub fn supersede(&mut self, draft: MessageDraft) {
        let previous = std::mem::replace(&mut self.draft, draft);
        self.history.push(previous);
    }
}
