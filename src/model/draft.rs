//! Message drafts and the context that shapes them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery channel a draft is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    /// Note attached to a connection request. Bounded length.
    ConnectionNote,
    /// Direct message to an existing connection. Unbounded.
    WarmDm,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionNote => "connection_note",
            Self::WarmDm => "warm_dm",
        }
    }

    /// Pipeline label shown on review cards.
    pub fn pipeline(&self) -> &'static str {
        match self {
            Self::ConnectionNote => "hunter",
            Self::WarmDm => "farmer",
        }
    }
}

impl FromStr for MessageChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection_note" => Ok(Self::ConnectionNote),
            "warm_dm" => Ok(Self::WarmDm),
            other => Err(format!("unknown message channel: {other}")),
        }
    }
}

/// Generated text for a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub text: String,
    pub channel: MessageChannel,
    /// Length in characters (not bytes).
    pub char_count: usize,
    /// 1 for the first draft, incremented on every accepted revision.
    pub revision: u32,
    pub created_at: DateTime<Utc>,
}

impl MessageDraft {
    pub fn new(text: impl Into<String>, channel: MessageChannel) -> Self {
        let text = text.into();
        let char_count = text.chars().count();
        Self {
            text,
            channel,
            char_count,
            revision: 1,
            created_at: Utc::now(),
        }
    }

    /// A revision that supersedes `self`.
    pub fn revised(&self, text: impl Into<String>) -> Self {
        let mut next = Self::new(text, self.channel);
        next.revision = self.revision + 1;
        next
    }
}

/// Whether a job posting asks for a credential the applicant does or
/// doesn't already hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationSignal {
    NoSignal,
    RequirementWithoutSkill,
    RequirementWithSkill,
}

impl CertificationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSignal => "no_signal",
            Self::RequirementWithoutSkill => "requirement_without_skill",
            Self::RequirementWithSkill => "requirement_with_skill",
        }
    }
}

impl FromStr for CertificationSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_signal" => Ok(Self::NoSignal),
            "requirement_without_skill" => Ok(Self::RequirementWithoutSkill),
            "requirement_with_skill" => Ok(Self::RequirementWithSkill),
            other => Err(format!("unknown certification signal: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_count_counts_characters_not_bytes() {
        let draft = MessageDraft::new("héllo — ✓", MessageChannel::ConnectionNote);
        assert_eq!(draft.char_count, 9);
        assert!(draft.text.len() > draft.char_count);
    }

    #[test]
    fn revision_keeps_channel_and_bumps_number() {
        let first = MessageDraft::new("hi", MessageChannel::WarmDm);
        let second = first.revised("hello");
        assert_eq!(second.channel, MessageChannel::WarmDm);
        assert_eq!(second.revision, 2);
        assert_eq!(second.char_count, 5);
    }
}
