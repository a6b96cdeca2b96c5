//! Overlap matching against a LinkedIn `Connections.csv` export.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::{OverlapMatch, OverlapMatcher};
use crate::error::DiscoveryError;
use crate::model::{ContactRole, Job};
use crate::pipeline::rules::is_outreach_eligible;

const COMPANY_SUFFIXES: &[&str] = &[
    " inc",
    " inc.",
    " llc",
    " corp",
    " corporation",
    " systems",
    " health",
    " healthcare",
];

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y"];

const TOP_COMPANIES: usize = 10;

/// Raw contents of an uploaded connections export.
#[derive(Debug, Clone)]
pub struct ConnectionsExport {
    contents: String,
}

impl ConnectionsExport {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, DiscoveryError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            DiscoveryError::InvalidExport(format!("{}: {e}", path.display()))
        })?;
        Ok(Self::new(contents))
    }

    /// Parse every connection row.
    pub fn connections(&self) -> Result<Vec<Connection>, DiscoveryError> {
        let rows = parse_csv(&self.contents)?;

        // Exports start with a free-text "Notes:" preamble before the header.
        let header_idx = rows
            .iter()
            .position(|r| r.iter().any(|c| c.trim() == "First Name"))
            .ok_or_else(|| DiscoveryError::InvalidExport("missing header row".into()))?;
        let header = &rows[header_idx];

        let column = |name: &str| header.iter().position(|c| c.trim() == name);
        let require = |name: &str| {
            column(name)
                .ok_or_else(|| DiscoveryError::InvalidExport(format!("missing column: {name}")))
        };
        let first = require("First Name")?;
        let last = require("Last Name")?;
        let company = require("Company")?;
        let position = column("Position");
        let connected_on = column("Connected On");
        let url = column("URL");

        let cell = |row: &[String], idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Ok(rows[header_idx + 1..]
            .iter()
            .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
            .map(|row| {
                let name = format!(
                    "{} {}",
                    cell(row, Some(first)).unwrap_or_default(),
                    cell(row, Some(last)).unwrap_or_default()
                )
                .trim()
                .to_string();
                Connection {
                    name,
                    company: cell(row, Some(company)).unwrap_or_default(),
                    position: cell(row, position),
                    connected_on: cell(row, connected_on).and_then(|d| parse_connected_on(&d)),
                    profile_url: cell(row, url),
                }
            })
            .filter(|c| !c.name.is_empty())
            .collect())
    }
}

/// One row of the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub company: String,
    pub position: Option<String>,
    pub connected_on: Option<NaiveDate>,
    pub profile_url: Option<String>,
}

/// Summary of the whole network, reported after a Farmer import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub total_connections: usize,
    /// Most common employers, most frequent first.
    pub top_companies: Vec<(String, usize)>,
    pub oldest_connection: Option<NaiveDate>,
    pub newest_connection: Option<NaiveDate>,
}

/// Matches export rows to jobs by fuzzy company name.
#[derive(Debug, Default, Clone)]
pub struct ConnectionsCsvMatcher;

impl ConnectionsCsvMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn network_stats(&self, export: &ConnectionsExport) -> Result<NetworkStats, DiscoveryError> {
        let connections = export.connections()?;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for c in connections.iter().filter(|c| !c.company.is_empty()) {
            *counts.entry(c.company.as_str()).or_default() += 1;
        }
        let mut top_companies: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(company, n)| (company.to_string(), n))
            .collect();
        top_companies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_companies.truncate(TOP_COMPANIES);

        let dates = connections.iter().filter_map(|c| c.connected_on);
        Ok(NetworkStats {
            total_connections: connections.len(),
            top_companies,
            oldest_connection: dates.clone().min(),
            newest_connection: dates.max(),
        })
    }
}

#[async_trait]
impl OverlapMatcher for ConnectionsCsvMatcher {
    async fn match_overlap(
        &self,
        export: &ConnectionsExport,
        eligible_jobs: &[Job],
    ) -> Result<Vec<OverlapMatch>, DiscoveryError> {
        let connections = export.connections()?;
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for job in eligible_jobs.iter().filter(|j| is_outreach_eligible(j)) {
            let target = job.company.trim().to_lowercase();
            if target.is_empty() {
                continue;
            }
            let variations = company_variations(&target);

            for conn in &connections {
                let company = conn.company.to_lowercase();
                if company.is_empty() || !variations.iter().any(|v| company.contains(v.as_str())) {
                    continue;
                }
                // Same person may match several jobs, but only once per job.
                if !seen.insert((conn.name.to_lowercase(), job.id.clone())) {
                    debug!(name = %conn.name, job_id = %job.id, "Duplicate export row");
                    continue;
                }
                matches.push(OverlapMatch {
                    name: conn.name.clone(),
                    position: conn.position.clone(),
                    role: classify_position(conn.position.as_deref().unwrap_or_default()),
                    company: conn.company.clone(),
                    connected_on: conn.connected_on,
                    job_id: job.id.clone(),
                    profile_url: conn.profile_url.clone(),
                });
            }
        }

        info!(
            connections = connections.len(),
            jobs = eligible_jobs.len(),
            matches = matches.len(),
            "Network overlap analyzed"
        );
        Ok(matches)
    }
}

/// Lower-case name variations used for substring matching.
///
/// `"epic systems"` yields `epic systems`, `epic`, `epicsystems`.
pub(crate) fn company_variations(company: &str) -> Vec<String> {
    let mut variations = vec![company.to_string()];

    let mut clean = company.to_string();
    for suffix in COMPANY_SUFFIXES {
        if let Some(stripped) = clean.strip_suffix(suffix) {
            clean = stripped.trim().to_string();
            variations.push(clean.clone());
        }
    }

    let no_spaces = company.replace(' ', "");
    if no_spaces != company {
        variations.push(no_spaces);
    }

    if company.contains(' ') {
        if let Some(first) = company.split_whitespace().next().filter(|w| w.len() > 3) {
            variations.push(first.to_string());
        }
    }

    variations.retain(|v| !v.is_empty());
    variations.sort();
    variations.dedup();
    variations
}

pub(crate) fn parse_connected_on(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Role category from a free-text position.
pub(crate) fn classify_position(position: &str) -> ContactRole {
    let p = position.to_lowercase();
    if ["recruit", "talent", "sourcer", "people partner"]
        .iter()
        .any(|k| p.contains(k))
    {
        ContactRole::Recruiter
    } else if ["manager", "director", "head of", "vp", "vice president", "chief"]
        .iter()
        .any(|k| p.contains(k))
    {
        ContactRole::HiringManager
    } else {
        ContactRole::TeamMember
    }
}

/// Every record of the export, header and preamble included. Rows may
/// differ in length.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, DiscoveryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());
    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| DiscoveryError::InvalidExport(format!("malformed row: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    const EXPORT: &str = "Notes:\n\
\"When exporting your connection data, you may notice that some of the email addresses are missing.\"\n\
\n\
First Name,Last Name,URL,Email Address,Company,Position,Connected On\n\
Jane,Roe,https://www.linkedin.com/in/janeroe,,Epic Systems,\"Director, Analytics\",15 May 2023\n\
John,Doe,https://www.linkedin.com/in/johndoe,,Epic,Technical Recruiter,\"May 20, 2021\"\n\
Ann,Lee,,,Globex Corp,Data Analyst,2019-01-02\n\
Jane,Roe,https://www.linkedin.com/in/janeroe,,Epic Systems,Director,15 May 2023\n";

    fn job(id: &str, company: &str, status: JobStatus) -> Job {
        Job::new(id, status, company, "Data Eng")
    }

    #[test]
    fn parses_rows_after_preamble() {
        let rows = ConnectionsExport::new(EXPORT).connections().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].name, "Jane Roe");
        assert_eq!(rows[0].position.as_deref(), Some("Director, Analytics"));
        assert_eq!(rows[0].connected_on, NaiveDate::from_ymd_opt(2023, 5, 15));
        assert_eq!(rows[1].connected_on, NaiveDate::from_ymd_opt(2021, 5, 20));
        assert_eq!(rows[2].profile_url, None);
    }

    #[test]
    fn stray_quote_inside_a_field_is_literal() {
        let export = "First Name,Last Name,Company,Position,Connected On\n\
Jo\"e,Smith,Acme,Engineer,15 May 2023\n\
Ann,Lee,Acme,Analyst,2019-01-02\n\
Raj,Patel,Globex,Recruiter,2020-03-04\n";
        let rows = ConnectionsExport::new(export).connections().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Jo\"e Smith");
        assert_eq!(rows[0].company, "Acme");
        assert_eq!(rows[1].name, "Ann Lee");
        assert_eq!(rows[2].company, "Globex");
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let err = ConnectionsExport::new("First Name,Last Name\nA,B\n")
            .connections()
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidExport(_)));
    }

    #[test]
    fn variations_strip_suffixes() {
        let v = company_variations("epic systems");
        assert!(v.contains(&"epic".to_string()));
        assert!(v.contains(&"epicsystems".to_string()));
        assert!(v.contains(&"epic systems".to_string()));
    }

    #[test]
    fn dates_in_all_export_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 5, 15);
        for s in ["15 May 2023", "May 15, 2023", "2023-05-15", "05/15/2023"] {
            assert_eq!(parse_connected_on(s), expected, "{s}");
        }
        assert_eq!(parse_connected_on("sometime"), None);
    }

    #[test]
    fn positions_are_classified() {
        assert_eq!(classify_position("Technical Recruiter"), ContactRole::Recruiter);
        assert_eq!(classify_position("Director, Analytics"), ContactRole::HiringManager);
        assert_eq!(classify_position("Data Analyst"), ContactRole::TeamMember);
    }

    #[tokio::test]
    async fn matches_only_eligible_jobs_and_dedupes_per_job() {
        let jobs = vec![
            job("rec1", "Epic Systems", JobStatus::InProgress),
            job("rec2", "Epic", JobStatus::InProgress),
            job("rec3", "Globex", JobStatus::ToDo),
        ];
        let matches = ConnectionsCsvMatcher::new()
            .match_overlap(&ConnectionsExport::new(EXPORT), &jobs)
            .await
            .unwrap();

        // Jane and John both match each Epic job; nobody matches the To Do job.
        assert_eq!(matches.len(), 4);
        assert!(matches.iter().all(|m| m.job_id != "rec3"));
        assert_eq!(matches.iter().filter(|m| m.job_id == "rec1").count(), 2);
        assert_eq!(matches.iter().filter(|m| m.job_id == "rec2").count(), 2);
    }

    #[test]
    fn network_stats_summarise_export() {
        let stats = ConnectionsCsvMatcher::new()
            .network_stats(&ConnectionsExport::new(EXPORT))
            .unwrap();
        assert_eq!(stats.total_connections, 4);
        assert_eq!(stats.top_companies[0], ("Epic Systems".to_string(), 2));
        assert_eq!(stats.oldest_connection, NaiveDate::from_ymd_opt(2019, 1, 2));
        assert_eq!(stats.newest_connection, NaiveDate::from_ymd_opt(2023, 5, 15));
    }
}
