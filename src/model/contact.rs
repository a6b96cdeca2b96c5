//! Contacts discovered for a job, and their outreach lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::draft::{CertificationSignal, MessageDraft};
use super::job::Job;
use crate::discovery::{DiscoveredContact, OverlapMatch};

/// Role category. Declaration order is approval priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    HiringManager,
    Recruiter,
    TeamMember,
}

impl ContactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HiringManager => "hiring_manager",
            Self::Recruiter => "recruiter",
            Self::TeamMember => "team_member",
        }
    }

    /// Human-readable label for review cards and prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HiringManager => "Hiring Manager",
            Self::Recruiter => "Recruiter",
            Self::TeamMember => "Team Member / Peer",
        }
    }
}

impl FromStr for ContactRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hiring_manager" => Ok(Self::HiringManager),
            "recruiter" => Ok(Self::Recruiter),
            "team_member" => Ok(Self::TeamMember),
            other => Err(format!("unknown contact role: {other}")),
        }
    }
}

/// Where a contact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    /// Remote search for strangers (Hunter pipeline).
    DiscoveryProvider,
    /// Existing connection from an uploaded export (Farmer pipeline).
    OverlapImport,
}

impl ContactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscoveryProvider => "discovery_provider",
            Self::OverlapImport => "overlap_import",
        }
    }
}

impl FromStr for ContactSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery_provider" => Ok(Self::DiscoveryProvider),
            "overlap_import" => Ok(Self::OverlapImport),
            other => Err(format!("unknown contact source: {other}")),
        }
    }
}

/// Network distance between the job seeker and the contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionDegree {
    #[serde(rename = "1st")]
    First,
    #[serde(rename = "2nd")]
    Second,
    #[serde(rename = "3rd")]
    Third,
}

impl ConnectionDegree {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "1st",
            Self::Second => "2nd",
            Self::Third => "3rd",
        }
    }
}

impl FromStr for ConnectionDegree {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1st" | "1" => Ok(Self::First),
            "2nd" | "2" => Ok(Self::Second),
            "3rd" | "3" | "3rd+" => Ok(Self::Third),
            other => Err(format!("unknown connection degree: {other}")),
        }
    }
}

impl fmt::Display for ConnectionDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outreach lifecycle of a contact.
///
/// `Ready → Drafted → PendingApproval → Approved | Skipped`. Edits loop
/// inside `PendingApproval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Ready,
    Drafted,
    PendingApproval,
    Approved,
    Skipped,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Drafted => "drafted",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Skipped)
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "drafted" => Ok(Self::Drafted),
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown contact status: {other}")),
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    /// Insertion order; ties in approval priority fall back to this.
    pub seq: i64,
    pub job_id: String,
    pub name: String,
    pub company: String,
    /// The contact's own job title, when known.
    pub title: Option<String>,
    pub role: ContactRole,
    pub source: ContactSource,
    pub degree: ConnectionDegree,
    pub connected_on: Option<NaiveDate>,
    pub status: ContactStatus,
    pub certification: Option<CertificationSignal>,
    /// Current draft. Superseded on every edit.
    pub draft: Option<MessageDraft>,
    pub final_message: Option<String>,
    pub profile_url: Option<String>,
    /// Approval thread, once one has been opened.
    pub thread_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("there")
    }
}

/// A contact about to be created.
///
/// Only constructible through the pipeline-specific constructors, which
/// pin `source` and `degree` together.
#[derive(Debug, Clone)]
pub struct NewContact {
    job_id: String,
    name: String,
    company: String,
    title: Option<String>,
    role: ContactRole,
    source: ContactSource,
    degree: ConnectionDegree,
    connected_on: Option<NaiveDate>,
    profile_url: Option<String>,
}

impl NewContact {
    /// A stranger found by the remote search provider.
    ///
    /// A provider claiming a first-degree connection is recorded as second
    /// degree: first-degree contacts only come from the overlap import.
    pub fn from_discovery(job: &Job, found: &DiscoveredContact) -> Self {
        let degree = match found.connection_degree {
            ConnectionDegree::Third => ConnectionDegree::Third,
            ConnectionDegree::Second => ConnectionDegree::Second,
            ConnectionDegree::First => {
                tracing::debug!(
                    name = %found.name,
                    "Provider reported 1st degree for a searched contact; recording as 2nd"
                );
                ConnectionDegree::Second
            }
        };
        Self {
            job_id: job.id.clone(),
            name: found.name.trim().to_string(),
            company: job.company.trim().to_string(),
            title: found.title.clone().filter(|t| !t.trim().is_empty()),
            role: found.role,
            source: ContactSource::DiscoveryProvider,
            degree,
            connected_on: None,
            profile_url: found.profile_url.clone(),
        }
    }

    /// An existing connection matched from the connections export.
    pub fn from_overlap(found: &OverlapMatch) -> Self {
        Self {
            job_id: found.job_id.clone(),
            name: found.name.trim().to_string(),
            company: found.company.trim().to_string(),
            title: found.position.clone().filter(|t| !t.trim().is_empty()),
            role: found.role,
            source: ContactSource::OverlapImport,
            degree: ConnectionDegree::First,
            connected_on: found.connected_on,
            profile_url: found.profile_url.clone(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn role(&self) -> ContactRole {
        self.role
    }

    pub fn source(&self) -> ContactSource {
        self.source
    }

    pub fn degree(&self) -> ConnectionDegree {
        self.degree
    }

    pub fn connected_on(&self) -> Option<NaiveDate> {
        self.connected_on
    }

    pub fn profile_url(&self) -> Option<&str> {
        self.profile_url.as_deref()
    }

    /// Normalised name used for idempotent creation.
    pub fn name_key(&self) -> String {
        dedupe_key(&self.name)
    }

    /// Normalised company used for idempotent creation.
    pub fn company_key(&self) -> String {
        dedupe_key(&self.company)
    }
}

/// Lower-cased, whitespace-collapsed key.
pub fn dedupe_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
