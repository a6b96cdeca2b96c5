//! `Database` trait: the single async interface for persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    CertificationSignal, Contact, ContactStatus, Job, JobStatus, MessageChannel, MessageDraft,
    NewContact,
};

/// Result of an idempotent contact insert.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Contact),
    /// A contact with the same job, name, company and source already exists.
    Existing(Contact),
}

impl CreateOutcome {
    pub fn contact(&self) -> &Contact {
        match self {
            Self::Created(c) | Self::Existing(c) => c,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// One generated draft for a contact, kept for the review history.
#[derive(Debug, Clone, Serialize)]
pub struct DraftRevision {
    pub contact_id: Uuid,
    pub revision: u32,
    pub channel: MessageChannel,
    pub text: String,
    pub char_count: usize,
    /// Reviewer instruction that produced this revision.
    pub instruction: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence for jobs, contacts and drafts.
///
/// Every mutating contact call is a single conditional statement and
/// returns whether the transition happened.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Jobs ────────────────────────────────────────────────────────

    /// Insert or replace a job record as mirrored from the external store.
    async fn upsert_job(&self, job: &Job) -> Result<(), DatabaseError>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError>;

    async fn list_jobs_by_status(&self, status: &JobStatus) -> Result<Vec<Job>, DatabaseError>;

    /// Jobs in `status` that have no contacts at all.
    async fn list_eligible_jobs_without_contacts(
        &self,
        status: &JobStatus,
    ) -> Result<Vec<Job>, DatabaseError>;

    // ── Contacts ────────────────────────────────────────────────────

    /// Insert a contact unless one with the same dedupe key exists.
    async fn create_contact(&self, contact: &NewContact) -> Result<CreateOutcome, DatabaseError>;

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>, DatabaseError>;

    /// Contacts of a job in discovery order.
    async fn list_contacts_for_job(&self, job_id: &str) -> Result<Vec<Contact>, DatabaseError>;

    /// Contacts in `status` in discovery order.
    async fn list_contacts_by_status(
        &self,
        status: ContactStatus,
    ) -> Result<Vec<Contact>, DatabaseError>;

    /// Record the certification signal, only if none is recorded yet.
    async fn set_certification_signal(
        &self,
        id: Uuid,
        signal: CertificationSignal,
    ) -> Result<bool, DatabaseError>;

    /// Replace the current draft and move to `new_status`, if the contact
    /// is in one of `expected`. Appends a revision row on success.
    async fn save_draft(
        &self,
        id: Uuid,
        draft: &MessageDraft,
        instruction: Option<&str>,
        expected: &[ContactStatus],
        new_status: ContactStatus,
    ) -> Result<bool, DatabaseError>;

    /// `Drafted | PendingApproval → PendingApproval`, recording the thread.
    async fn mark_pending_approval(&self, id: Uuid, thread_id: &str)
    -> Result<bool, DatabaseError>;

    /// `from → to`, only if the contact is currently in `from`.
    async fn update_contact_status(
        &self,
        id: Uuid,
        from: ContactStatus,
        to: ContactStatus,
    ) -> Result<bool, DatabaseError>;

    /// `PendingApproval → Approved`, storing the final message. Applies only
    /// while `revision` is still the contact's current draft.
    async fn mark_contact_approved(
        &self,
        id: Uuid,
        final_message: &str,
        revision: u32,
    ) -> Result<bool, DatabaseError>;

    /// Draft history of a contact, oldest first.
    async fn list_draft_revisions(&self, id: Uuid) -> Result<Vec<DraftRevision>, DatabaseError>;
}
