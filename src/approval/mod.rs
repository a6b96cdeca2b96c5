//! Approval channels: where drafts go for a human decision.
//!
//! A channel posts a review card, opens a thread for it, and hands the
//! engine each human reply on that thread. The engine owns the session
//! state machine; channels only move text.

pub mod card;
mod inbox;
pub mod queue;
pub mod routes;
pub mod telegram;

pub use inbox::ThreadInboxes;
pub use queue::ReviewQueue;
pub use routes::review_routes;
pub use telegram::TelegramApprovalChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::model::{
    ApprovalOutcome, ConnectionDegree, Contact, ContactRole, ContactSource, Job, MessageDraft,
    ThreadId,
};

/// Everything a reviewer needs to judge one draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub contact_id: Uuid,
    pub job_id: String,
    pub contact_name: String,
    pub contact_title: Option<String>,
    pub contact_role: ContactRole,
    pub company: String,
    /// The role the job seeker applied for.
    pub role_title: String,
    pub source: ContactSource,
    pub degree: ConnectionDegree,
    pub draft: MessageDraft,
    pub profile_url: Option<String>,
    /// Thread of an earlier round that timed out. Re-prompts reuse it.
    pub existing_thread: Option<ThreadId>,
}

impl ReviewRequest {
    pub fn new(contact: &Contact, job: &Job, draft: MessageDraft) -> Self {
        Self {
            contact_id: contact.id,
            job_id: job.id.clone(),
            contact_name: contact.name.clone(),
            contact_title: contact.title.clone(),
            contact_role: contact.role,
            company: contact.company.clone(),
            role_title: job.role_title.clone(),
            source: contact.source,
            degree: contact.degree,
            draft,
            profile_url: contact.profile_url.clone(),
            existing_thread: contact.thread_id.clone().map(ThreadId::from),
        }
    }
}

/// Transport for the human-approval conversation.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Post a review card and return the thread replies will arrive on.
    ///
    /// When `request.existing_thread` is set the card is re-posted on that
    /// thread instead of opening a new one.
    async fn post_approval_request(&self, request: &ReviewRequest)
    -> Result<ThreadId, ChannelError>;

    /// Wait for the next reply on a thread. `None` once the thread is closed.
    ///
    /// Replies that arrive while nobody is waiting are buffered in order.
    async fn await_reply(&self, thread_id: &ThreadId) -> Option<String>;

    /// Post a follow-up message on an existing thread.
    async fn post_thread_update(&self, thread_id: &ThreadId, text: &str)
    -> Result<(), ChannelError>;

    /// Record the end of an approval round.
    ///
    /// `Approved` and `Skipped` close the thread. `TimedOut` keeps it open so
    /// late replies are buffered for the next re-prompt.
    async fn resolve(&self, thread_id: &ThreadId, outcome: ApprovalOutcome)
    -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContactStatus, JobStatus, MessageChannel};
    use chrono::Utc;

    #[test]
    fn request_carries_recorded_thread() {
        let job = Job::new("rec1", JobStatus::InProgress, "Acme", "Data Eng");
        let contact = Contact {
            id: Uuid::new_v4(),
            seq: 1,
            job_id: "rec1".into(),
            name: "Jane Roe".into(),
            company: "Acme".into(),
            title: Some("Director of Analytics".into()),
            role: ContactRole::HiringManager,
            source: ContactSource::DiscoveryProvider,
            degree: ConnectionDegree::Second,
            connected_on: None,
            status: ContactStatus::PendingApproval,
            certification: None,
            draft: None,
            final_message: None,
            profile_url: Some("https://www.linkedin.com/in/janeroe".into()),
            thread_id: Some("web-7".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let request = ReviewRequest::new(
            &contact,
            &job,
            MessageDraft::new("hi", MessageChannel::ConnectionNote),
        );
        assert_eq!(request.role_title, "Data Eng");
        assert_eq!(request.existing_thread, Some(ThreadId::from("web-7")));
    }
}
