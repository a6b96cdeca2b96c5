//! Eligibility and message rules shared by both pipelines.
//!
//! Pure functions only. The engine calls these at each stage boundary:
//! - `is_outreach_eligible` gates every job before discovery or drafting
//! - `classify_channel` picks the message channel from the contact's source
//! - `enforce_length` rejects over-long connection notes (never truncates)
//! - `evaluate_certification_signal` runs once per contact, before drafting
//! - `prioritize` orders contacts for approval

use crate::error::OutreachError;
use crate::model::{
    CertificationSignal, Contact, ContactSource, Job, JobStatus, MessageChannel, MessageDraft,
};

/// Maximum length of a connection-request note, in characters.
pub const CONNECTION_NOTE_LIMIT: usize = 300;

/// Only jobs already applied to get outreach.
pub fn is_outreach_eligible(job: &Job) -> bool {
    job.status == JobStatus::InProgress
}

/// `is_outreach_eligible` as a guard, for use before any side effect.
pub fn ensure_eligible(job: &Job) -> Result<(), OutreachError> {
    if is_outreach_eligible(job) {
        Ok(())
    } else {
        Err(OutreachError::IneligibleJob {
            job_id: job.id.clone(),
            status: job.status.to_string(),
        })
    }
}

pub fn classify_channel(source: ContactSource) -> MessageChannel {
    match source {
        ContactSource::DiscoveryProvider => MessageChannel::ConnectionNote,
        ContactSource::OverlapImport => MessageChannel::WarmDm,
    }
}

/// Character limit for a channel, if it has one.
pub fn length_limit(channel: MessageChannel) -> Option<usize> {
    match channel {
        MessageChannel::ConnectionNote => Some(CONNECTION_NOTE_LIMIT),
        MessageChannel::WarmDm => None,
    }
}

pub fn enforce_length(draft: &MessageDraft) -> Result<(), OutreachError> {
    match length_limit(draft.channel) {
        Some(limit) if draft.char_count > limit => Err(OutreachError::LengthViolation {
            length: draft.char_count,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Case-insensitive keyword presence in the job description and resume.
pub fn evaluate_certification_signal(
    job_description: &str,
    resume_summary: &str,
    keyword: &str,
) -> CertificationSignal {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() || !job_description.to_lowercase().contains(&keyword) {
        return CertificationSignal::NoSignal;
    }
    if resume_summary.to_lowercase().contains(&keyword) {
        CertificationSignal::RequirementWithSkill
    } else {
        CertificationSignal::RequirementWithoutSkill
    }
}

/// Stable order for approval: role category first, then discovery order.
pub fn prioritize(contacts: &mut [Contact]) {
    contacts.sort_by_key(|c| (c.role, c.seq));
}
