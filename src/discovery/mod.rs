//! Contact discovery: remote search for strangers and overlap matching
//! against an exported connections list.

pub mod overlap;
pub mod search;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::model::{ConnectionDegree, ContactRole, Job};

pub use overlap::{ConnectionsCsvMatcher, ConnectionsExport, NetworkStats};
pub use search::{DisabledSearch, XRaySearch};

/// A person returned by the remote search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredContact {
    pub name: String,
    /// The person's own headline title, when the provider returns one.
    pub title: Option<String>,
    pub role: ContactRole,
    pub profile_url: Option<String>,
    pub connection_degree: ConnectionDegree,
}

/// An existing connection who works at the company of an eligible job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapMatch {
    pub name: String,
    pub position: Option<String>,
    pub role: ContactRole,
    /// Company as written in the export.
    pub company: String,
    pub connected_on: Option<NaiveDate>,
    pub job_id: String,
    pub profile_url: Option<String>,
}

/// Remote contact search (Hunter pipeline).
#[async_trait]
pub trait ContactSearch: Send + Sync {
    /// Provider name, used in logs and rate-limit reports.
    fn name(&self) -> &str;

    /// Find people at `company` who could hire for, recruit for, or work
    /// alongside `role_title`.
    async fn discover_contacts(
        &self,
        company: &str,
        role_title: &str,
    ) -> Result<Vec<DiscoveredContact>, DiscoveryError>;
}

/// Matches an uploaded connections export against eligible jobs (Farmer
/// pipeline).
#[async_trait]
pub trait OverlapMatcher: Send + Sync {
    async fn match_overlap(
        &self,
        export: &ConnectionsExport,
        eligible_jobs: &[Job],
    ) -> Result<Vec<OverlapMatch>, DiscoveryError>;
}
