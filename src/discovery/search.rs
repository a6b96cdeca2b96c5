//! LinkedIn X-Ray search through the Apify google-search-scraper actor.
//!
//! One `site:linkedin.com/in/` query is issued per role category. Organic
//! results are parsed from their `"Name - Title | LinkedIn"` titles and
//! deduplicated by profile URL across categories.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ContactSearch, DiscoveredContact};
use crate::config::SearchConfig;
use crate::error::DiscoveryError;
use crate::model::{ConnectionDegree, ContactRole};

const PROVIDER: &str = "apify";
const ACTOR: &str = "apify~google-search-scraper";

static PROFILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)linkedin\.com/in/([a-z0-9\-_]+)").expect("profile url regex")
});
static LINKEDIN_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\|\s*LinkedIn\s*$").expect("suffix regex"));

const RECRUITER_TITLES: &[&str] = &["Technical Recruiter", "Talent Acquisition", "Recruiter"];

const SENIORITY_PREFIXES: &[&str] = &[
    "senior ",
    "junior ",
    "lead ",
    "staff ",
    "principal ",
    "associate ",
    "intern ",
];

const FUNCTION_WORDS: &[&str] = &[
    "analyst",
    "engineer",
    "developer",
    "manager",
    "consultant",
    "specialist",
    "coordinator",
    "director",
    "architect",
    "designer",
    "scientist",
    "informaticist",
];

/// Remote search provider backed by Google X-Ray queries.
pub struct XRaySearch {
    client: reqwest::Client,
    config: SearchConfig,
    /// Results kept per role category.
    limit: usize,
}

impl XRaySearch {
    pub fn new(config: SearchConfig, limit: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            limit: limit.max(1),
        }
    }

    fn run_url(&self) -> String {
        format!(
            "{}/v2/acts/{ACTOR}/run-sync-get-dataset-items",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Run one X-Ray query and return its organic results, capped at the
    /// per-category limit.
    async fn xray(
        &self,
        company: &str,
        titles: &[String],
    ) -> Result<Vec<OrganicResult>, DiscoveryError> {
        let query = build_query(company, titles);
        debug!(%query, "X-Ray search");

        let body = serde_json::json!({
            "queries": query,
            "maxPagesPerQuery": 1,
            "resultsPerPage": (self.limit * 2).max(10),
            "mobileResults": false,
            "languageCode": "en",
            "countryCode": "us",
            "saveHtml": false,
            "saveHtmlToKeyValueStore": false,
        });

        let response = self
            .client
            .post(self.run_url())
            .bearer_auth(self.config.api_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| DiscoveryError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::PAYMENT_REQUIRED
        {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(DiscoveryError::RateLimited {
                provider: PROVIDER.into(),
                retry_after,
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let pages: Vec<SearchPage> =
            response
                .json()
                .await
                .map_err(|e| DiscoveryError::InvalidResponse {
                    provider: PROVIDER.into(),
                    reason: e.to_string(),
                })?;

        Ok(pages
            .into_iter()
            .flat_map(|p| p.organic_results)
            .take(self.limit)
            .collect())
    }
}

#[async_trait]
impl ContactSearch for XRaySearch {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn discover_contacts(
        &self,
        company: &str,
        role_title: &str,
    ) -> Result<Vec<DiscoveredContact>, DiscoveryError> {
        let searches = [
            (ContactRole::HiringManager, hiring_manager_titles(role_title)),
            (
                ContactRole::Recruiter,
                RECRUITER_TITLES.iter().map(|t| t.to_string()).collect(),
            ),
            (ContactRole::TeamMember, vec![peer_title(role_title)]),
        ];

        let mut seen = HashSet::new();
        let mut contacts = Vec::new();
        let mut last_error = None;

        for (role, titles) in searches {
            let results = match self.xray(company, &titles).await {
                Ok(results) => results,
                // Quota is shared across categories; stop here.
                Err(e @ DiscoveryError::RateLimited { .. }) => return Err(e),
                Err(e) => {
                    warn!(company, role = role.as_str(), error = %e, "X-Ray search failed");
                    last_error = Some(e);
                    continue;
                }
            };

            for result in results {
                let Some(contact) = parse_result(&result, role) else {
                    continue;
                };
                let key = contact
                    .profile_url
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase();
                if seen.insert(key) {
                    contacts.push(contact);
                } else {
                    debug!(name = %contact.name, "Duplicate profile across categories");
                }
            }
        }

        match last_error {
            Some(e) if contacts.is_empty() => Err(e),
            _ => Ok(contacts),
        }
    }
}

/// Stand-in when no search token is configured. Finds nobody.
pub struct DisabledSearch;

#[async_trait]
impl ContactSearch for DisabledSearch {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn discover_contacts(
        &self,
        company: &str,
        _role_title: &str,
    ) -> Result<Vec<DiscoveredContact>, DiscoveryError> {
        debug!(company, "Contact search disabled, no contacts discovered");
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(rename = "organicResults", default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
}

fn build_query(company: &str, titles: &[String]) -> String {
    let titles = titles
        .iter()
        .take(5)
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("site:linkedin.com/in/ \"{company}\" ({titles})")
}

fn strip_seniority(role_title: &str) -> String {
    let mut core = role_title.to_lowercase();
    for prefix in SENIORITY_PREFIXES {
        core = core.replace(prefix, "");
    }
    core.trim().to_string()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Likely titles of the person one or two levels above `role_title`.
pub(crate) fn hiring_manager_titles(role_title: &str) -> Vec<String> {
    let core = strip_seniority(role_title);

    if let Some(word) = FUNCTION_WORDS.iter().find(|w| core.contains(*w)) {
        let base = title_case(word);
        return vec![
            format!("Director of {base}s"),
            format!("Head of {base}s"),
            format!("VP of {base}s"),
            format!("{base} Manager"),
        ];
    }

    let core_title = title_case(core.split(',').next().unwrap_or_default().trim());
    vec![
        format!("Director of {core_title}"),
        format!("Head of {core_title}"),
        "Hiring Manager".to_string(),
    ]
}

fn peer_title(role_title: &str) -> String {
    title_case(&strip_seniority(role_title))
}

/// Normalise a profile link to `https://www.linkedin.com/in/<slug>/`.
pub(crate) fn clean_profile_url(url: &str) -> Option<String> {
    PROFILE_URL
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|slug| format!("https://www.linkedin.com/in/{}/", slug.as_str()))
}

/// Split a result title into the person's name and headline.
pub(crate) fn parse_result_title(title: &str) -> Option<(String, Option<String>)> {
    let title = LINKEDIN_SUFFIX.replace(title, "");
    let mut parts = title.split(" - ").map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty())?.to_string();
    let headline = parts.next().filter(|h| !h.is_empty()).map(str::to_string);
    Some((name, headline))
}

fn parse_result(result: &OrganicResult, role: ContactRole) -> Option<DiscoveredContact> {
    let profile_url = clean_profile_url(&result.url)?;
    let (name, title) = parse_result_title(&result.title)?;
    Some(DiscoveredContact {
        name,
        title,
        role,
        profile_url: Some(profile_url),
        // Search results never include the viewer's own connections.
        connection_degree: ConnectionDegree::Second,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search(server: &MockServer) -> XRaySearch {
        XRaySearch::new(
            SearchConfig {
                api_token: SecretString::from("test-token"),
                base_url: server.uri(),
                timeout_secs: 5,
            },
            5,
        )
    }

    #[test]
    fn hiring_manager_titles_from_function_word() {
        assert_eq!(
            hiring_manager_titles("Senior Data Engineer"),
            vec![
                "Director of Engineers",
                "Head of Engineers",
                "VP of Engineers",
                "Engineer Manager"
            ]
        );
    }

    #[test]
    fn hiring_manager_titles_fallback() {
        assert_eq!(
            hiring_manager_titles("Clinical Informatics Lead, Payment Model"),
            vec![
                "Director of Clinical Informatics Lead",
                "Head of Clinical Informatics Lead",
                "Hiring Manager"
            ]
        );
    }

    #[test]
    fn peer_title_drops_seniority() {
        assert_eq!(peer_title("Senior Data Engineer"), "Data Engineer");
    }

    #[test]
    fn profile_urls_are_normalised() {
        assert_eq!(
            clean_profile_url("https://uk.linkedin.com/in/jane-roe-42?trk=abc").as_deref(),
            Some("https://www.linkedin.com/in/jane-roe-42/")
        );
        assert!(clean_profile_url("https://www.linkedin.com/company/acme").is_none());
    }

    #[test]
    fn result_titles_split_name_and_headline() {
        assert_eq!(
            parse_result_title("Jane Roe - Engineering Manager - Acme | LinkedIn"),
            Some(("Jane Roe".into(), Some("Engineering Manager".into())))
        );
        assert_eq!(
            parse_result_title("Jane Roe | LinkedIn"),
            Some(("Jane Roe".into(), None))
        );
        assert_eq!(parse_result_title(" | LinkedIn"), None);
    }

    #[test]
    fn query_quotes_company_and_titles() {
        let q = build_query("Acme", &["Recruiter".into(), "Talent Acquisition".into()]);
        assert_eq!(
            q,
            "site:linkedin.com/in/ \"Acme\" (\"Recruiter\" OR \"Talent Acquisition\")"
        );
    }

    #[tokio::test]
    async fn discover_dedupes_by_profile_url() {
        let server = MockServer::start().await;
        let body = serde_json::json!([{
            "organicResults": [
                {"url": "https://www.linkedin.com/in/janeroe", "title": "Jane Roe - Eng Manager | LinkedIn"},
                {"url": "https://www.linkedin.com/in/johndoe/", "title": "John Doe - Recruiter | LinkedIn"},
                {"url": "https://acme.com/team", "title": "Team - Acme"}
            ]
        }]);
        Mock::given(method("POST"))
            .and(path("/v2/acts/apify~google-search-scraper/run-sync-get-dataset-items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(3)
            .mount(&server)
            .await;

        let contacts = search(&server)
            .discover_contacts("Acme", "Data Engineer")
            .await
            .unwrap();

        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].name, "Jane Roe");
        assert_eq!(contacts[0].role, ContactRole::HiringManager);
        assert_eq!(
            contacts[0].profile_url.as_deref(),
            Some("https://www.linkedin.com/in/janeroe/")
        );
        assert!(contacts
            .iter()
            .all(|c| c.connection_degree != ConnectionDegree::First));
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
            .mount(&server)
            .await;

        let err = search(&server)
            .discover_contacts("Acme", "Data Engineer")
            .await
            .unwrap_err();

        match err {
            DiscoveryError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_in_every_category_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = search(&server)
            .discover_contacts("Acme", "Data Engineer")
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::RequestFailed { .. }));
    }
}
