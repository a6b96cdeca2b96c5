//! Job application records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application status as kept by the external record store.
///
/// Unknown labels are preserved verbatim in `Other` so that a round trip
/// through the store never rewrites a status the engine does not own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    ToDo,
    InProgress,
    Closed,
    Other(String),
}

impl JobStatus {
    /// Canonical label, matching the record store's spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ToDo => "To Do",
            Self::InProgress => "In progress",
            Self::Closed => "Closed",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "todo" => Self::ToDo,
            "inprogress" => Self::InProgress,
            "closed" => Self::Closed,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job application. Created and mutated only by the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub company: String,
    pub role_title: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub resume_summary: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        status: JobStatus,
        company: impl Into<String>,
        role_title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            company: company.into(),
            role_title: role_title.into(),
            job_description: String::new(),
            resume_summary: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.job_description = description.into();
        self
    }

    pub fn with_resume_summary(mut self, summary: impl Into<String>) -> Self {
        self.resume_summary = summary.into();
        self
    }
}
