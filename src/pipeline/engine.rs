//! Outreach orchestration engine: collaborators, shared drafting, cycle.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::rules::{
    classify_channel, enforce_length, evaluate_certification_signal, is_outreach_eligible,
};
use super::types::{CycleReport, ItemOutcome, ItemReport, Stage, StageReport};
use crate::approval::ApprovalChannel;
use crate::config::OutreachConfig;
use crate::discovery::{ContactSearch, OverlapMatcher};
use crate::error::{Error, LlmError, OutreachError};
use crate::generator::{ConnectionNoteContext, GenerationRequest, MessageGenerator, WarmDmContext};
use crate::model::{
    ApprovalSession, CertificationSignal, Contact, ContactSource, ContactStatus, Job,
    MessageChannel, MessageDraft, ThreadId,
};
use crate::store::Database;

/// Drives jobs and contacts through the Hunter and Farmer pipelines.
///
/// The store is the source of truth. The only in-memory state is the map
/// of live approval sessions.
pub struct OutreachEngine {
    pub(super) store: Arc<dyn Database>,
    pub(super) search: Arc<dyn ContactSearch>,
    pub(super) overlap: Arc<dyn OverlapMatcher>,
    pub(super) generator: Arc<dyn MessageGenerator>,
    pub(super) approvals: Arc<dyn ApprovalChannel>,
    pub(super) config: OutreachConfig,
    pub(super) sessions: RwLock<HashMap<ThreadId, ApprovalSession>>,
    /// Held while approval requests are being offered, so a contact is
    /// never posted twice by overlapping runs.
    pub(super) offering: Mutex<()>,
}

impl OutreachEngine {
    pub fn new(
        store: Arc<dyn Database>,
        search: Arc<dyn ContactSearch>,
        overlap: Arc<dyn OverlapMatcher>,
        generator: Arc<dyn MessageGenerator>,
        approvals: Arc<dyn ApprovalChannel>,
        config: OutreachConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            search,
            overlap,
            generator,
            approvals,
            config,
            sessions: RwLock::new(HashMap::new()),
            offering: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &OutreachConfig {
        &self.config
    }

    /// Live approval sessions, oldest first.
    pub async fn sessions(&self) -> Vec<ApprovalSession> {
        let mut sessions: Vec<ApprovalSession> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.opened_at);
        sessions
    }

    /// One scheduled cycle: discover, then draft for both pipelines.
    ///
    /// Approvals are driven separately by `run_approvals` so that waiting on
    /// a reviewer never holds up discovery or drafting.
    pub async fn run_cycle(&self) -> Result<CycleReport, Error> {
        info!("Outreach cycle starting");
        let hunter_discover = self.hunter_discover().await?;
        hunter_discover.log_summary();
        let hunter_draft = self.hunter_draft().await?;
        hunter_draft.log_summary();
        let farmer_draft = self.farmer_draft().await?;
        farmer_draft.log_summary();
        Ok(CycleReport {
            hunter_discover,
            hunter_draft,
            farmer_draft,
        })
    }

    /// Draft every `Ready` contact from one source, concurrently.
    pub(super) async fn draft_ready(
        &self,
        stage: Stage,
        source: ContactSource,
    ) -> Result<StageReport, Error> {
        let ready: Vec<Contact> = self
            .store
            .list_contacts_by_status(ContactStatus::Ready)
            .await?
            .into_iter()
            .filter(|c| c.source == source)
            .collect();

        debug!(stage = %stage, contacts = ready.len(), "Drafting ready contacts");

        let items = futures::stream::iter(ready)
            .map(|contact| self.draft_contact(contact))
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(StageReport::with_items(stage, items))
    }

    /// Draft one contact: `Ready → Drafted`, or unchanged on any failure.
    async fn draft_contact(&self, contact: Contact) -> ItemReport {
        let job = match self.store.get_job(&contact.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return ItemReport::failed(contact.id, OutreachError::JobNotFound(contact.job_id));
            }
            Err(e) => return ItemReport::failed(contact.id, e),
        };
        if !is_outreach_eligible(&job) {
            return ItemReport::rejected(
                contact.id,
                OutreachError::IneligibleJob {
                    job_id: job.id,
                    status: job.status.to_string(),
                },
            );
        }

        let channel = classify_channel(contact.source);
        let request = match channel {
            MessageChannel::ConnectionNote => {
                let certification = match self.certification_for(&contact, &job).await {
                    Ok(signal) => signal,
                    Err(e) => return ItemReport::failed(contact.id, e),
                };
                GenerationRequest::connection_note(ConnectionNoteContext {
                    contact_name: contact.name.clone(),
                    contact_title: contact.title.clone(),
                    contact_role: contact.role,
                    company: contact.company.clone(),
                    role_title: job.role_title.clone(),
                    job_description: job.job_description.clone(),
                    resume_summary: job.resume_summary.clone(),
                    certification,
                    certification_keyword: self.config.certification_keyword.clone(),
                })
            }
            MessageChannel::WarmDm => GenerationRequest::warm_dm(WarmDmContext {
                contact_name: contact.name.clone(),
                contact_title: contact.title.clone(),
                contact_role: contact.role,
                company: contact.company.clone(),
                target_role: job.role_title.clone(),
                connected_on: contact.connected_on,
                resume_summary: job.resume_summary.clone(),
            }),
        };

        let (draft, attempts) = match self
            .generate_within_limit(contact.id, request, |text| MessageDraft::new(text, channel))
            .await
        {
            Ok(generated) => generated,
            Err(e) => {
                warn!(contact_id = %contact.id, error = %e, "Draft generation failed");
                return ItemReport::failed(contact.id, e);
            }
        };

        match self
            .store
            .save_draft(
                contact.id,
                &draft,
                None,
                &[ContactStatus::Ready],
                ContactStatus::Drafted,
            )
            .await
        {
            Ok(true) => {
                info!(
                    contact_id = %contact.id,
                    channel = channel.as_str(),
                    chars = draft.char_count,
                    attempts,
                    "Draft saved"
                );
                ItemReport::new(
                    contact.id,
                    ItemOutcome::Drafted {
                        chars: draft.char_count,
                        attempts,
                    },
                )
            }
            Ok(false) => ItemReport::deferred(contact.id, "contact is no longer ready"),
            Err(e) => ItemReport::failed(contact.id, e),
        }
    }

    /// The contact's certification signal, computed and stored on first use.
    async fn certification_for(
        &self,
        contact: &Contact,
        job: &Job,
    ) -> Result<CertificationSignal, Error> {
        if let Some(signal) = contact.certification {
            return Ok(signal);
        }
        let signal = evaluate_certification_signal(
            &job.job_description,
            &job.resume_summary,
            &self.config.certification_keyword,
        );
        if self.store.set_certification_signal(contact.id, signal).await? {
            return Ok(signal);
        }
        // Someone else stored it first; theirs wins.
        let stored = self
            .store
            .get_contact(contact.id)
            .await?
            .and_then(|c| c.certification);
        Ok(stored.unwrap_or(signal))
    }

    /// Call the generator until the draft fits its channel.
    ///
    /// Over-length notes are regenerated with a shortening directive, up to
    /// `max_draft_retries` extra attempts. Never truncates.
    pub(super) async fn generate_within_limit(
        &self,
        contact_id: Uuid,
        request: GenerationRequest,
        build: impl Fn(String) -> MessageDraft,
    ) -> Result<(MessageDraft, u32), OutreachError> {
        let max_attempts = self.config.max_draft_retries + 1;
        let mut request = request;
        let mut last_violation = None;

        for attempt in 1..=max_attempts {
            let text = self
                .generator
                .generate(&request)
                .await
                .map_err(|e| generation_failure(contact_id, &e))?;
            let draft = build(text);

            match enforce_length(&draft) {
                Ok(()) => return Ok((draft, attempt)),
                Err(violation) => {
                    debug!(
                        contact_id = %contact_id,
                        attempt,
                        chars = draft.char_count,
                        "Draft over limit, regenerating shorter"
                    );
                    request = request.shortened(draft.char_count);
                    last_violation = Some(violation);
                }
            }
        }

        Err(OutreachError::DraftGenerationFailure {
            contact_id,
            reason: match last_violation {
                Some(violation) => format!("{violation} after {max_attempts} attempts"),
                None => format!("no valid draft after {max_attempts} attempts"),
            },
        })
    }
}

fn generation_failure(contact_id: Uuid, err: &LlmError) -> OutreachError {
    OutreachError::DraftGenerationFailure {
        contact_id,
        reason: err.to_string(),
    }
}
