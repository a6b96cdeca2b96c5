//! Error types for the outreach engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Outreach error: {0}")]
    Outreach(#[from] OutreachError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Approval channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Unknown thread {thread_id} on channel {name}")]
    UnknownThread { name: String, thread_id: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contact discovery errors (remote search and connections export).
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Invalid connections export: {0}")]
    InvalidExport(String),
}

/// Business-rule errors raised by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error("Job {job_id} is not eligible for outreach (status: {status})")]
    IneligibleJob { job_id: String, status: String },

    #[error("Connection note is {length} characters, limit is {limit}")]
    LengthViolation { length: usize, limit: usize },

    #[error("Draft generation failed for contact {contact_id}: {reason}")]
    DraftGenerationFailure { contact_id: Uuid, reason: String },

    #[error("Unrecognized approval reply: {reply:?}")]
    UnrecognizedDecision { reply: String },

    #[error("No approval reply on thread {thread_id} after {waited:?}")]
    ApprovalTimeout { thread_id: String, waited: Duration },

    #[error("Discovery provider {provider} rate limited")]
    DiscoveryProviderRateLimited { provider: String },

    #[error("Contact {contact_id} has no current draft")]
    MissingDraft { contact_id: Uuid },

    #[error("Contact {0} not found")]
    ContactNotFound(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(String),
}
