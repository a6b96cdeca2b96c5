//! Review cards, wire messages, and the text every channel posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReviewRequest;
use crate::model::{ApprovalOutcome, ContactSource, MessageChannel, MessageDraft, ThreadId};
use crate::pipeline::rules::length_limit;

const REPLY_FOOTER: &str = "Reply: approve / skip / edit [instructions]";

/// Status of a review thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Skipped,
    /// Round timed out. The thread still accepts replies.
    TimedOut,
}

impl From<ApprovalOutcome> for ReviewStatus {
    fn from(outcome: ApprovalOutcome) -> Self {
        match outcome {
            ApprovalOutcome::Approved => Self::Approved,
            ApprovalOutcome::Skipped => Self::Skipped,
            ApprovalOutcome::TimedOut => Self::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    Engine,
    Reviewer,
}

/// One message in a review thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub author: Author,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ThreadMessage {
    pub fn engine(text: impl Into<String>) -> Self {
        Self {
            author: Author::Engine,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn reviewer(text: impl Into<String>) -> Self {
        Self {
            author: Author::Reviewer,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

/// A review thread as shown to web clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCard {
    pub thread_id: ThreadId,
    pub request: ReviewRequest,
    pub status: ReviewStatus,
    pub messages: Vec<ThreadMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewCard {
    pub fn new(thread_id: ThreadId, request: ReviewRequest) -> Self {
        let now = Utc::now();
        let opening = ThreadMessage::engine(render_review_card(&request));
        Self {
            thread_id,
            request,
            status: ReviewStatus::Pending,
            messages: vec![opening],
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the thread still accepts replies.
    pub fn is_open(&self) -> bool {
        matches!(self.status, ReviewStatus::Pending | ReviewStatus::TimedOut)
    }
}

/// Messages a web client can send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Free-text reply on a thread, parsed by the engine.
    Reply { thread_id: ThreadId, text: String },
}

/// Messages sent over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A review thread was opened or re-prompted.
    NewReview { card: ReviewCard },
    /// A message was added to a thread.
    ThreadUpdate {
        thread_id: ThreadId,
        message: ThreadMessage,
    },
    /// A round ended.
    ReviewResolved {
        thread_id: ThreadId,
        status: ReviewStatus,
    },
    /// Every open thread (sent on connect and after lag).
    ReviewsSync { cards: Vec<ReviewCard> },
}

fn card_title(channel: MessageChannel, contact_name: &str) -> String {
    match channel {
        MessageChannel::ConnectionNote => format!("👔 Cold Connect: {contact_name}"),
        MessageChannel::WarmDm => format!("💬 Warm DM: {contact_name}"),
    }
}

fn source_label(source: ContactSource) -> &'static str {
    match source {
        ContactSource::DiscoveryProvider => "Profile search",
        ContactSource::OverlapImport => "LinkedIn connections export",
    }
}

/// `(N chars) ✅`, or `⚠️` when a limited draft is over its limit.
fn length_marker(draft: &MessageDraft) -> String {
    let within = length_limit(draft.channel).is_none_or(|limit| draft.char_count <= limit);
    let limit = length_limit(draft.channel)
        .map(|l| format!("/{l}"))
        .unwrap_or_default();
    format!(
        "({}{limit} chars) {}",
        draft.char_count,
        if within { "✅" } else { "⚠️" }
    )
}

/// Opening card for a review thread.
pub fn render_review_card(request: &ReviewRequest) -> String {
    let contact_type = match &request.contact_title {
        Some(title) => format!("{} ({title})", request.contact_role.display_name()),
        None => request.contact_role.display_name().to_string(),
    };
    format!(
        "{title}\n\
         Company: {company}\n\
         Role Applied For: {role}\n\
         Contact Type: {contact_type}\n\
         Connection: {degree} Degree\n\
         Source: {source}\n\
         \n\
         📝 Draft {marker}:\n\
         {text}\n\
         \n\
         🔗 {profile}\n\
         \n\
         {REPLY_FOOTER}",
        title = card_title(request.draft.channel, &request.contact_name),
        company = request.company,
        role = request.role_title,
        degree = request.degree,
        source = source_label(request.source),
        marker = length_marker(&request.draft),
        text = request.draft.text,
        profile = request.profile_url.as_deref().unwrap_or("Profile not available"),
    )
}

/// A draft revised after an edit request.
pub fn render_revised_draft(draft: &MessageDraft) -> String {
    format!(
        "Revised {}:\n{}\n\n{REPLY_FOOTER}",
        length_marker(draft),
        draft.text
    )
}

/// Confirmation with copy-paste instructions for the approved message.
pub fn render_approved(request: &ReviewRequest, final_message: &str) -> String {
    let step = match request.draft.channel {
        MessageChannel::ConnectionNote => "Click \"Connect\" → \"Add a note\" → Paste:",
        MessageChannel::WarmDm => "Click \"Message\" → Paste:",
    };
    format!(
        "✅ Approved!\n📋 Message ready to send\n\n🔗 Open: {}\n→ {step}\n\n{final_message}",
        request.profile_url.as_deref().unwrap_or("(no profile link)")
    )
}

pub fn render_skipped(request: &ReviewRequest) -> String {
    format!("⏭️ Skipped {}. Moving to next contact.", request.contact_name)
}

/// Re-prompt after a reply that is not a decision.
pub fn render_unrecognized(reply: &str) -> String {
    format!("🤔 Didn't understand {reply:?}.\n{REPLY_FOOTER}")
}

pub fn render_timed_out(request: &ReviewRequest) -> String {
    format!(
        "⏰ No decision yet for {}. The draft stays pending and will be offered again.",
        request.contact_name
    )
}

/// Notice that the job closed while its draft was under review.
pub fn render_job_ineligible(request: &ReviewRequest) -> String {
    format!(
        "🚫 The {} application at {} is no longer in progress. This draft can't be approved or edited.\nReply: skip",
        request.role_title, request.company
    )
}

/// Notice that an edit could not produce a valid draft.
pub fn render_edit_failed(reason: &str) -> String {
    format!("⚠️ Couldn't revise the draft ({reason}). The previous draft is unchanged.\n{REPLY_FOOTER}")
}
