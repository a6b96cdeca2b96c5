//! Hunter pipeline: cold outreach to strangers found by remote search.
//!
//! `Discover → ContactFound → Drafted`, then the shared approval rounds.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tracing::{info, warn};

use super::engine::OutreachEngine;
use super::rules::ensure_eligible;
use super::types::{ItemOutcome, ItemReport, Stage, StageReport};
use crate::error::{DiscoveryError, Error, OutreachError};
use crate::model::{ContactSource, Job, JobStatus, NewContact};

impl OutreachEngine {
    /// Discover contacts for every eligible job that has none yet.
    ///
    /// A rate-limited search defers the rest of the batch instead of
    /// failing it.
    pub async fn hunter_discover(&self) -> Result<StageReport, Error> {
        let jobs = self
            .store
            .list_eligible_jobs_without_contacts(&JobStatus::InProgress)
            .await?;
        info!(jobs = jobs.len(), provider = self.search.name(), "Hunter discovery starting");

        let rate_limited = AtomicBool::new(false);
        let items = futures::stream::iter(jobs)
            .map(|job| self.discover_job(job, &rate_limited))
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(StageReport::with_items(Stage::HunterDiscover, items))
    }

    /// Discover contacts for one job, whether or not it already has some.
    ///
    /// Rejects a job that is not in progress before touching anything.
    pub async fn discover_for_job(&self, job_id: &str) -> Result<ItemReport, Error> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| OutreachError::JobNotFound(job_id.to_string()))?;
        ensure_eligible(&job)?;
        Ok(self.discover_job(job, &AtomicBool::new(false)).await)
    }

    /// Draft connection notes for every `Ready` searched contact.
    pub async fn hunter_draft(&self) -> Result<StageReport, Error> {
        self.draft_ready(Stage::HunterDraft, ContactSource::DiscoveryProvider)
            .await
    }

    async fn discover_job(&self, job: Job, rate_limited: &AtomicBool) -> ItemReport {
        if let Err(e) = ensure_eligible(&job) {
            return ItemReport::rejected(&job.id, e);
        }
        if rate_limited.load(Ordering::Acquire) {
            return ItemReport::deferred(
                &job.id,
                OutreachError::DiscoveryProviderRateLimited {
                    provider: self.search.name().to_string(),
                },
            );
        }

        let found = match self
            .search
            .discover_contacts(&job.company, &job.role_title)
            .await
        {
            Ok(found) => found,
            Err(DiscoveryError::RateLimited { provider, .. }) => {
                warn!(job_id = %job.id, provider = %provider, "Discovery rate limited, deferring remaining jobs");
                rate_limited.store(true, Ordering::Release);
                return ItemReport::deferred(
                    &job.id,
                    OutreachError::DiscoveryProviderRateLimited { provider },
                );
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Discovery failed");
                return ItemReport::failed(&job.id, e);
            }
        };

        let mut created = 0;
        let mut existing = 0;
        for contact in &found {
            match self
                .store
                .create_contact(&NewContact::from_discovery(&job, contact))
                .await
            {
                Ok(outcome) if outcome.is_created() => created += 1,
                Ok(_) => existing += 1,
                Err(e) => {
                    warn!(job_id = %job.id, name = %contact.name, error = %e, created, existing, "Failed to record contact");
                    return partial_discovery(&job.id, created, existing, e);
                }
            }
        }

        info!(
            job_id = %job.id,
            company = %job.company,
            created,
            existing,
            "Hunter contacts recorded"
        );
        ItemReport::new(&job.id, ItemOutcome::ContactsRecorded { created, existing })
    }
}

/// Failure partway through a job's results. The job already has contacts, so
/// batch discovery skips it from now on; only `discover_for_job` fills the gap.
fn partial_discovery(
    job_id: &str,
    created: usize,
    existing: usize,
    error: impl std::fmt::Display,
) -> ItemReport {
    if created + existing == 0 {
        return ItemReport::failed(job_id, error);
    }
    ItemReport::failed(
        job_id,
        format!(
            "{error} after recording {created} new and {existing} existing contacts; \
             run discover_for_job({job_id}) to record the rest"
        ),
    )
}
