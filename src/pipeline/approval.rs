//! Shared approval sub-protocol for both pipelines.
//!
//! `Drafted → PendingApproval → Approved | Skipped`, with edits looping
//! inside `PendingApproval` on the same thread.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::OutreachEngine;
use super::rules::{enforce_length, ensure_eligible, prioritize};
use super::types::{DecisionEffect, ItemOutcome, ItemReport, Stage, StageReport};
use crate::approval::ReviewRequest;
use crate::approval::card::{
    render_approved, render_edit_failed, render_job_ineligible, render_revised_draft,
    render_skipped, render_timed_out, render_unrecognized,
};
use crate::error::{Error, OutreachError};
use crate::generator::GenerationRequest;
use crate::model::{
    ApprovalOutcome, ApprovalSession, Contact, ContactStatus, Decision, Job, ThreadId,
};

impl OutreachEngine {
    /// Offer every drafted contact for review in priority order, then wait
    /// on all the opened sessions at once.
    ///
    /// Pending contacts without a live session (earlier rounds that timed
    /// out, or a restart) are offered again on their recorded thread.
    pub async fn run_approvals(&self) -> Result<StageReport, Error> {
        let mut report = StageReport::new(Stage::Approval);
        let mut opened = Vec::new();
        {
            let _offering = self.offering.lock().await;

            let mut candidates = self
                .store
                .list_contacts_by_status(ContactStatus::Drafted)
                .await?;
            let live: Vec<Uuid> = self
                .sessions
                .read()
                .await
                .values()
                .map(|s| s.contact_id)
                .collect();
            candidates.extend(
                self.store
                    .list_contacts_by_status(ContactStatus::PendingApproval)
                    .await?
                    .into_iter()
                    .filter(|c| !live.contains(&c.id)),
            );
            prioritize(&mut candidates);

            for contact in candidates {
                let contact_id = contact.id;
                match self.open_session(contact).await {
                    Ok(Some(session)) => opened.push(session),
                    Ok(None) => {}
                    Err(e @ Error::Outreach(OutreachError::IneligibleJob { .. })) => {
                        info!(contact_id = %contact_id, error = %e, "Not offering contact");
                        report.push(ItemReport::rejected(contact_id, e));
                    }
                    Err(e) => {
                        warn!(contact_id = %contact_id, error = %e, "Failed to open approval session");
                        report.push(ItemReport::failed(contact_id, e));
                    }
                }
            }
        }

        if !opened.is_empty() {
            info!(sessions = opened.len(), "Awaiting approval decisions");
        }
        let results = futures::future::join_all(
            opened
                .into_iter()
                .map(|(thread_id, request)| self.drive_session(thread_id, request)),
        )
        .await;
        for item in results {
            report.push(item);
        }
        Ok(report)
    }

    /// Apply one reviewer decision to a contact.
    ///
    /// Re-reads the contact first. Approve and skip only act on a pending
    /// contact, so a duplicate decision changes nothing. Approve and edit
    /// also require the job to still be in progress; skip is always allowed.
    pub async fn apply_decision(
        &self,
        contact_id: Uuid,
        decision: Decision,
    ) -> Result<DecisionEffect, Error> {
        let contact = self.fetch_contact(contact_id).await?;
        if contact.status != ContactStatus::PendingApproval {
            debug!(contact_id = %contact_id, status = %contact.status, decision = decision.label(), "Decision on non-pending contact ignored");
            return Ok(DecisionEffect::AlreadyResolved(contact.status));
        }
        let draft = contact
            .draft
            .clone()
            .ok_or(OutreachError::MissingDraft { contact_id })?;
        if decision != Decision::Skip {
            ensure_eligible(&self.fetch_job(&contact.job_id).await?)?;
        }

        match decision {
            Decision::Approve => {
                enforce_length(&draft)?;
                if self
                    .store
                    .mark_contact_approved(contact_id, &draft.text, draft.revision)
                    .await?
                {
                    info!(contact_id = %contact_id, "Contact approved");
                    Ok(DecisionEffect::Approved {
                        final_message: draft.text,
                    })
                } else {
                    let current = self.fetch_contact(contact_id).await?;
                    match current.draft {
                        // An edit landed between the read and the update: show
                        // the newer draft instead of approving the old one.
                        Some(newer)
                            if current.status == ContactStatus::PendingApproval
                                && newer.revision != draft.revision =>
                        {
                            debug!(contact_id = %contact_id, stale = draft.revision, current = newer.revision, "Approve of superseded draft refused");
                            Ok(DecisionEffect::Revised(newer))
                        }
                        _ => Ok(DecisionEffect::AlreadyResolved(current.status)),
                    }
                }
            }
            Decision::Skip => {
                if self
                    .store
                    .update_contact_status(
                        contact_id,
                        ContactStatus::PendingApproval,
                        ContactStatus::Skipped,
                    )
                    .await?
                {
                    info!(contact_id = %contact_id, "Contact skipped");
                    Ok(DecisionEffect::Skipped)
                } else {
                    self.already_resolved(contact_id).await
                }
            }
            Decision::Edit(instruction) => {
                let request = GenerationRequest::revision(draft.channel, &draft.text, &instruction);
                let (revised, attempts) = self
                    .generate_within_limit(contact_id, request, |text| draft.revised(text))
                    .await?;
                if self
                    .store
                    .save_draft(
                        contact_id,
                        &revised,
                        Some(&instruction),
                        &[ContactStatus::PendingApproval],
                        ContactStatus::PendingApproval,
                    )
                    .await?
                {
                    info!(
                        contact_id = %contact_id,
                        revision = revised.revision,
                        chars = revised.char_count,
                        attempts,
                        "Draft revised"
                    );
                    Ok(DecisionEffect::Revised(revised))
                } else {
                    self.already_resolved(contact_id).await
                }
            }
        }
    }

    async fn fetch_contact(&self, contact_id: Uuid) -> Result<Contact, Error> {
        Ok(self
            .store
            .get_contact(contact_id)
            .await?
            .ok_or(OutreachError::ContactNotFound(contact_id))?)
    }

    async fn fetch_job(&self, job_id: &str) -> Result<Job, Error> {
        Ok(self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| OutreachError::JobNotFound(job_id.to_string()))?)
    }

    async fn already_resolved(&self, contact_id: Uuid) -> Result<DecisionEffect, Error> {
        let contact = self.fetch_contact(contact_id).await?;
        Ok(DecisionEffect::AlreadyResolved(contact.status))
    }

    /// Post the review card and record the session. `None` when the contact
    /// left review in the meantime.
    ///
    /// The job is re-read first: nothing is posted for a job that is no
    /// longer in progress.
    async fn open_session(
        &self,
        contact: Contact,
    ) -> Result<Option<(ThreadId, ReviewRequest)>, Error> {
        let job = self.fetch_job(&contact.job_id).await?;
        ensure_eligible(&job)?;
        let draft = contact
            .draft
            .clone()
            .ok_or(OutreachError::MissingDraft {
                contact_id: contact.id,
            })?;

        let request = ReviewRequest::new(&contact, &job, draft.clone());
        let thread_id = self.approvals.post_approval_request(&request).await?;

        if !self
            .store
            .mark_pending_approval(contact.id, thread_id.as_str())
            .await?
        {
            // Resolved elsewhere between listing and posting.
            debug!(contact_id = %contact.id, "Contact left review before its card was posted");
            self.approvals
                .resolve(&thread_id, ApprovalOutcome::Skipped)
                .await?;
            return Ok(None);
        }

        info!(
            contact_id = %contact.id,
            thread_id = %thread_id,
            role = contact.role.as_str(),
            channel = draft.channel.as_str(),
            "Approval session opened"
        );
        self.sessions.write().await.insert(
            thread_id.clone(),
            ApprovalSession::open(thread_id.clone(), contact.id, draft),
        );
        Ok(Some((thread_id, request)))
    }

    /// Wait for decisions on one thread until the round ends.
    async fn drive_session(&self, thread_id: ThreadId, mut request: ReviewRequest) -> ItemReport {
        let contact_id = request.contact_id;
        loop {
            let reply = match tokio::time::timeout(
                self.config.approval_timeout,
                self.approvals.await_reply(&thread_id),
            )
            .await
            {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    debug!(thread_id = %thread_id, "Approval thread closed");
                    self.finish_session(&thread_id, None).await;
                    return ItemReport::deferred(contact_id, "approval thread closed");
                }
                Err(_) => {
                    let err = OutreachError::ApprovalTimeout {
                        thread_id: thread_id.to_string(),
                        waited: self.config.approval_timeout,
                    };
                    info!(contact_id = %contact_id, "{err}");
                    self.post(&thread_id, &render_timed_out(&request)).await;
                    self.finish_session(&thread_id, Some(ApprovalOutcome::TimedOut))
                        .await;
                    return ItemReport::new(contact_id, ItemOutcome::TimedOut);
                }
            };

            let decision = match Decision::parse(&reply) {
                Ok(decision) => decision,
                Err(e) => {
                    debug!(thread_id = %thread_id, error = %e, "Re-prompting");
                    self.post(&thread_id, &render_unrecognized(reply.trim()))
                        .await;
                    continue;
                }
            };

            match self.apply_decision(contact_id, decision).await {
                Ok(DecisionEffect::Approved { final_message }) => {
                    self.post(&thread_id, &render_approved(&request, &final_message))
                        .await;
                    self.finish_session(&thread_id, Some(ApprovalOutcome::Approved))
                        .await;
                    return ItemReport::new(contact_id, ItemOutcome::Approved);
                }
                Ok(DecisionEffect::Skipped) => {
                    self.post(&thread_id, &render_skipped(&request)).await;
                    self.finish_session(&thread_id, Some(ApprovalOutcome::Skipped))
                        .await;
                    return ItemReport::new(contact_id, ItemOutcome::Skipped);
                }
                Ok(DecisionEffect::Revised(draft)) => {
                    if let Some(session) = self.sessions.write().await.get_mut(&thread_id) {
                        session.supersede(draft.clone());
                    }
                    self.post(&thread_id, &render_revised_draft(&draft)).await;
                    request.draft = draft;
                }
                Ok(DecisionEffect::AlreadyResolved(status)) => {
                    let (outcome, item) = match status {
                        ContactStatus::Approved => {
                            (Some(ApprovalOutcome::Approved), ItemOutcome::Approved)
                        }
                        ContactStatus::Skipped => {
                            (Some(ApprovalOutcome::Skipped), ItemOutcome::Skipped)
                        }
                        other => (
                            None,
                            ItemOutcome::Deferred {
                                reason: format!("contact moved to {other} during review"),
                            },
                        ),
                    };
                    self.finish_session(&thread_id, outcome).await;
                    return ItemReport::new(contact_id, item);
                }
                Err(e @ Error::Outreach(OutreachError::IneligibleJob { .. })) => {
                    info!(contact_id = %contact_id, error = %e, "Job left progress during review");
                    self.post(&thread_id, &render_job_ineligible(&request)).await;
                }
                Err(e @ Error::Outreach(OutreachError::DraftGenerationFailure { .. })) => {
                    warn!(contact_id = %contact_id, error = %e, "Edit failed, keeping previous draft");
                    self.post(&thread_id, &render_edit_failed(&e.to_string()))
                        .await;
                }
                Err(e) => {
                    warn!(contact_id = %contact_id, error = %e, "Decision failed, leaving contact pending");
                    self.finish_session(&thread_id, Some(ApprovalOutcome::TimedOut))
                        .await;
                    return ItemReport::failed(contact_id, e);
                }
            }
        }
    }

    async fn post(&self, thread_id: &ThreadId, text: &str) {
        if let Err(e) = self.approvals.post_thread_update(thread_id, text).await {
            warn!(thread_id = %thread_id, error = %e, "Failed to post thread update");
        }
    }

    /// Drop the live session and tell the channel how the round ended.
    async fn finish_session(&self, thread_id: &ThreadId, outcome: Option<ApprovalOutcome>) {
        if let Some(mut session) = self.sessions.write().await.remove(thread_id) {
            session.outcome = outcome;
            debug!(
                thread_id = %thread_id,
                contact_id = %session.contact_id,
                revisions = session.history.len(),
                outcome = ?outcome,
                "Approval session finished"
            );
        }
        if let Some(outcome) = outcome {
            if let Err(e) = self.approvals.resolve(thread_id, outcome).await {
                warn!(thread_id = %thread_id, error = %e, "Failed to resolve thread");
            }
        }
    }
}
