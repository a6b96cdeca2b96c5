//! Farmer pipeline: warm outreach to existing connections.
//!
//! `Analyze → Matched → Drafted`, then the shared approval rounds.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::engine::OutreachEngine;
use super::rules::is_outreach_eligible;
use super::types::{ItemOutcome, ItemReport, Stage, StageReport};
use crate::discovery::{ConnectionsExport, OverlapMatch};
use crate::error::{Error, OutreachError};
use crate::model::{ContactSource, JobStatus, NewContact};

impl OutreachEngine {
    /// Match a connections export against in-progress jobs and record one
    /// contact per (connection, job).
    ///
    /// A connection at a company with two open applications gets a contact
    /// for each job.
    pub async fn farmer_analyze(&self, export: &ConnectionsExport) -> Result<StageReport, Error> {
        let jobs: Vec<_> = self
            .store
            .list_jobs_by_status(&JobStatus::InProgress)
            .await?
            .into_iter()
            .filter(is_outreach_eligible)
            .collect();
        if jobs.is_empty() {
            info!("No in-progress jobs, skipping overlap analysis");
            return Ok(StageReport::new(Stage::FarmerAnalyze));
        }

        let matches = self.overlap.match_overlap(export, &jobs).await?;
        info!(jobs = jobs.len(), matches = matches.len(), "Overlap analysis complete");

        let mut by_job: BTreeMap<String, Vec<OverlapMatch>> = BTreeMap::new();
        for found in matches {
            by_job.entry(found.job_id.clone()).or_default().push(found);
        }

        let mut report = StageReport::new(Stage::FarmerAnalyze);
        for (job_id, found) in by_job {
            // Only jobs handed to the matcher may receive contacts.
            if !jobs.iter().any(|j| j.id == job_id) {
                report.push(ItemReport::rejected(
                    &job_id,
                    OutreachError::IneligibleJob {
                        job_id: job_id.clone(),
                        status: "not offered for matching".into(),
                    },
                ));
                continue;
            }

            let mut created = 0;
            let mut existing = 0;
            let mut failure = None;
            for m in &found {
                match self.store.create_contact(&NewContact::from_overlap(m)).await {
                    Ok(outcome) if outcome.is_created() => created += 1,
                    Ok(_) => existing += 1,
                    Err(e) => {
                        warn!(job_id = %job_id, name = %m.name, error = %e, "Failed to record connection");
                        failure = Some(e);
                        break;
                    }
                }
            }

            report.push(match failure {
                Some(e) => ItemReport::failed(&job_id, e),
                None => {
                    info!(job_id = %job_id, created, existing, "Farmer contacts recorded");
                    ItemReport::new(&job_id, ItemOutcome::ContactsRecorded { created, existing })
                }
            });
        }
        Ok(report)
    }

    /// Draft warm DMs for every `Ready` imported connection.
    pub async fn farmer_draft(&self) -> Result<StageReport, Error> {
        self.draft_ready(Stage::FarmerDraft, ContactSource::OverlapImport)
            .await
    }
}
