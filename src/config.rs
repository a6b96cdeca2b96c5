//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Engine constants.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Regeneration attempts after a connection note comes back too long.
    pub max_draft_retries: u32,
    /// How long an approval session waits for a reply before timing out.
    pub approval_timeout: Duration,
    /// Credential keyword looked for in job descriptions and resumes.
    pub certification_keyword: String,
    /// Search results kept per role category.
    pub discovery_limit: usize,
    /// Jobs or contacts processed at once within a stage.
    pub concurrency: usize,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            max_draft_retries: 3,
            approval_timeout: Duration::from_secs(3600), // 1 hour
            certification_keyword: "epic".to_string(),
            discovery_limit: 5,
            concurrency: 4,
        }
    }
}

impl OutreachConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_draft_retries: parse_or(&lookup, "OUTREACH_MAX_DRAFT_RETRIES", defaults.max_draft_retries)?,
            approval_timeout: Duration::from_secs(parse_or(
                &lookup,
                "OUTREACH_APPROVAL_TIMEOUT_SECS",
                defaults.approval_timeout.as_secs(),
            )?),
            certification_keyword: lookup("OUTREACH_CERT_KEYWORD")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.certification_keyword),
            discovery_limit: parse_or(&lookup, "OUTREACH_DISCOVERY_LIMIT", defaults.discovery_limit)?,
            concurrency: parse_or(&lookup, "OUTREACH_CONCURRENCY", defaults.concurrency)?.max(1),
        })
    }
}

/// Process-level settings for the service binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub web_port: u16,
    /// Cron expression for the discover/draft cycle.
    pub schedule: String,
    /// JSON array of jobs imported on startup.
    pub jobs_file: Option<PathBuf>,
    /// Connections export analyzed on startup.
    pub connections_csv: Option<PathBuf>,
    /// Directory for daily-rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = |key: &str| lookup(key).filter(|s| !s.is_empty()).map(PathBuf::from);
        Ok(Self {
            db_path: path("OUTREACH_DB_PATH").unwrap_or_else(|| PathBuf::from("./data/outreach.db")),
            web_port: parse_or(&lookup, "OUTREACH_WEB_PORT", 8080)?,
            // sec min hour day-of-month month day-of-week
            schedule: lookup("OUTREACH_SCHEDULE").unwrap_or_else(|| "0 */30 * * * *".to_string()),
            jobs_file: path("OUTREACH_JOBS_FILE"),
            connections_csv: path("OUTREACH_CONNECTIONS_CSV"),
            log_dir: path("OUTREACH_LOG_DIR"),
        })
    }
}

/// Remote contact search credentials.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_token: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl SearchConfig {
    /// `None` when no token is configured.
    pub fn from_env() -> Option<Self> {
        let api_token = std::env::var("APIFY_API_TOKEN").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            api_token: SecretString::from(api_token),
            base_url: std::env::var("APIFY_BASE_URL")
                .unwrap_or_else(|_| "https://api.apify.com".to_string()),
            timeout_secs: std::env::var("APIFY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
        })
    }
}

/// Telegram approval channel settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    /// `None` when the bot token is unset; an error when the token is set
    /// but the chat is not.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(bot_token) = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty())
        else {
            return Ok(None);
        };
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_CHAT_ID".into()))?;
        let allowed_users = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Some(Self {
            bot_token: SecretString::from(bot_token),
            chat_id,
            allowed_users,
        }))
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
