//! Message generation: structured context in, draft text out.

mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::model::{CertificationSignal, ContactRole, MessageChannel};
use crate::pipeline::rules::length_limit;

/// Context for a first connection-request note.
#[derive(Debug, Clone)]
pub struct ConnectionNoteContext {
    pub contact_name: String,
    pub contact_title: Option<String>,
    pub contact_role: ContactRole,
    pub company: String,
    pub role_title: String,
    pub job_description: String,
    pub resume_summary: String,
    /// Precomputed once per contact so that retries and edits agree.
    pub certification: CertificationSignal,
    pub certification_keyword: String,
}

/// Context for a first direct message to an existing connection.
#[derive(Debug, Clone)]
pub struct WarmDmContext {
    pub contact_name: String,
    pub contact_title: Option<String>,
    pub contact_role: ContactRole,
    pub company: String,
    pub target_role: String,
    pub connected_on: Option<NaiveDate>,
    pub resume_summary: String,
}

/// Context for revising a draft after a reviewer's edit request.
#[derive(Debug, Clone)]
pub struct RevisionContext {
    pub current_draft: String,
    /// Passed through verbatim; never parsed.
    pub instruction: String,
}

#[derive(Debug, Clone)]
pub enum DraftContext {
    ConnectionNote(ConnectionNoteContext),
    WarmDm(WarmDmContext),
    Revision(RevisionContext),
}

/// Input to a `MessageGenerator`.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub channel: MessageChannel,
    pub context: DraftContext,
    /// Hard character limit, when the channel has one.
    pub max_chars: Option<usize>,
    /// Length of the previous attempt that overran `max_chars`.
    pub shorten_from: Option<usize>,
}

impl GenerationRequest {
    pub fn connection_note(context: ConnectionNoteContext) -> Self {
        Self::new(MessageChannel::ConnectionNote, DraftContext::ConnectionNote(context))
    }

    pub fn warm_dm(context: WarmDmContext) -> Self {
        Self::new(MessageChannel::WarmDm, DraftContext::WarmDm(context))
    }

    /// Revision keeps the channel's limit.
    pub fn revision(channel: MessageChannel, current_draft: &str, instruction: &str) -> Self {
        Self::new(
            channel,
            DraftContext::Revision(RevisionContext {
                current_draft: current_draft.to_string(),
                instruction: instruction.to_string(),
            }),
        )
    }

    fn new(channel: MessageChannel, context: DraftContext) -> Self {
        Self {
            channel,
            context,
            max_chars: length_limit(channel),
            shorten_from: None,
        }
    }

    /// Same request, asking for a shorter result than `previous_length`.
    pub fn shortened(&self, previous_length: usize) -> Self {
        Self {
            shorten_from: Some(previous_length),
            ..self.clone()
        }
    }
}

/// Opaque text generation.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// `MessageGenerator` backed by an LLM, using the hook/value/ask prompts.
pub struct LlmMessageGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl LlmMessageGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl MessageGenerator for LlmMessageGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let prompt = prompts::build(request);
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(prompt.system),
            ChatMessage::user(prompt.user),
        ])
        .with_temperature(prompt.temperature)
        .with_max_tokens(prompt.max_tokens);

        let response = self.llm.complete(completion).await?;
        let text = clean_output(&response.content);
        if text.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty message".into(),
            });
        }

        debug!(
            channel = request.channel.as_str(),
            chars = text.chars().count(),
            shorten_from = ?request.shorten_from,
            "Draft generated"
        );
        Ok(text)
    }
}

/// Trim and drop quotes the model wraps around the message.
fn clean_output(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
