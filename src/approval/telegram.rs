//! Telegram approval channel: review cards in a chat, replies via long-polling.
//!
//! A thread is the card's message. Every bot message posted for a thread is
//! remembered, so a reviewer can reply to any of them. A message that is not
//! a reply goes to the open thread when exactly one exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::card::render_review_card;
use super::{ApprovalChannel, ReviewRequest, ThreadInboxes};
use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::model::{ApprovalOutcome, ThreadId};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const CHANNEL_NAME: &str = "telegram";
const POLL_TIMEOUT_SECS: u64 = 30;
const THREAD_PREFIX: &str = "tg-";

const AMBIGUOUS_REPLY_HINT: &str =
    "Several reviews are open. Reply to the review card so I know which contact you mean.";

pub struct TelegramApprovalChannel {
    bot_token: SecretString,
    chat_id: String,
    allowed_users: Vec<String>,
    api_base: String,
    client: reqwest::Client,
    inboxes: ThreadInboxes,
    /// Bot message id → thread it belongs to.
    message_threads: RwLock<HashMap<i64, ThreadId>>,
}

impl TelegramApprovalChannel {
    pub fn new(config: &TelegramConfig) -> Arc<Self> {
        Arc::new(Self::build(config, DEFAULT_API_BASE))
    }

    fn build(config: &TelegramConfig, api_base: &str) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            allowed_users: config.allowed_users.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            inboxes: ThreadInboxes::new(),
            message_threads: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn with_api_base(config: &TelegramConfig, api_base: &str) -> Arc<Self> {
        Arc::new(Self::build(config, api_base))
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: reason.into(),
        }
    }

    /// Send a text message, split to fit Telegram's limit. Returns the ids
    /// of the posted messages.
    async fn send_message(
        &self,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<Vec<i64>, ChannelError> {
        let mut ids = Vec::new();
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            ids.push(self.send_message_chunk(&chunk, reply_to).await?);
        }
        Ok(ids)
    }

    async fn send_message_chunk(
        &self,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if let Some(message_id) = reply_to {
            body["reply_parameters"] = serde_json::json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!("sendMessage returned {status}: {err}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
        data.pointer("/result/message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::InvalidMessage("sendMessage result has no message_id".into()))
    }

    async fn remember(&self, thread_id: &ThreadId, message_ids: &[i64]) {
        let mut map = self.message_threads.write().await;
        for id in message_ids {
            map.insert(*id, thread_id.clone());
        }
    }

    /// Verify the bot token with `getMe`.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Spawn the long-poll loop that routes replies to thread inboxes.
    pub fn spawn_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            let mut offset: i64 = 0;
            info!("Telegram approval channel listening for replies...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match channel
                    .client
                    .post(channel.api_url("getUpdates"))
                    .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Telegram poll error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Telegram parse error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(Value::as_array) {
                    for update in results {
                        if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                            offset = uid + 1;
                        }
                        channel.route_update(update).await;
                    }
                }
            }
        })
    }

    /// Deliver one `getUpdates` entry to the thread it belongs to.
    async fn route_update(&self, update: &Value) {
        let Some(message) = update.get("message") else {
            return;
        };
        let Some(text) = message.get("text").and_then(Value::as_str) else {
            return;
        };

        let chat_id = message
            .pointer("/chat/id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default();
        if chat_id != self.chat_id {
            debug!(chat_id = %chat_id, "Ignoring message from another chat");
            return;
        }

        let username = message
            .pointer("/from/username")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let user_id = message
            .pointer("/from/id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string());
        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }
        if !check_user_allowed(&self.allowed_users, identities.iter().copied()) {
            warn!(
                "Telegram: ignoring reply from unauthorized user: username={username}, user_id={}",
                user_id.as_deref().unwrap_or("unknown")
            );
            return;
        }

        let replied_to = message
            .pointer("/reply_to_message/message_id")
            .and_then(Value::as_i64);
        let thread = match replied_to {
            Some(id) => self.message_threads.read().await.get(&id).cloned(),
            None => {
                let open = self.inboxes.open_threads().await;
                match open.as_slice() {
                    [only] => Some(only.clone()),
                    [] => None,
                    _ => {
                        if let Err(e) = self.send_message(AMBIGUOUS_REPLY_HINT, None).await {
                            warn!(error = %e, "Failed to send reply hint");
                        }
                        return;
                    }
                }
            }
        };

        match thread {
            Some(thread_id) => {
                if self.inboxes.deliver(&thread_id, text).await {
                    debug!(thread_id = %thread_id, "Telegram reply routed");
                }
            }
            None => debug!("Telegram message matches no open review"),
        }
    }
}

fn thread_for(message_id: i64) -> ThreadId {
    ThreadId::new(format!("{THREAD_PREFIX}{message_id}"))
}

fn root_message(thread_id: &ThreadId) -> Result<i64, ChannelError> {
    thread_id
        .as_str()
        .strip_prefix(THREAD_PREFIX)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ChannelError::UnknownThread {
            name: CHANNEL_NAME.into(),
            thread_id: thread_id.to_string(),
        })
}

#[async_trait]
impl ApprovalChannel for TelegramApprovalChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn post_approval_request(
        &self,
        request: &ReviewRequest,
    ) -> Result<ThreadId, ChannelError> {
        let card = render_review_card(request);

        // A recorded thread from another channel is not ours; open a new one.
        let existing = request
            .existing_thread
            .as_ref()
            .and_then(|t| root_message(t).ok());

        let ids = self.send_message(&card, existing).await?;
        let thread_id = match existing {
            Some(root) => thread_for(root),
            None => {
                let first = *ids
                    .first()
                    .ok_or_else(|| Self::send_failed("card produced no message"))?;
                thread_for(first)
            }
        };
        if let Ok(root) = root_message(&thread_id) {
            self.remember(&thread_id, &[root]).await;
        }
        self.remember(&thread_id, &ids).await;
        self.inboxes.open(&thread_id).await;

        info!(
            thread_id = %thread_id,
            contact_id = %request.contact_id,
            company = %request.company,
            "Review posted to Telegram"
        );
        Ok(thread_id)
    }

    async fn await_reply(&self, thread_id: &ThreadId) -> Option<String> {
        self.inboxes.next(thread_id).await
    }

    async fn post_thread_update(
        &self,
        thread_id: &ThreadId,
        text: &str,
    ) -> Result<(), ChannelError> {
        let root = root_message(thread_id)?;
        let ids = self.send_message(text, Some(root)).await?;
        self.remember(thread_id, &ids).await;
        Ok(())
    }

    async fn resolve(
        &self,
        thread_id: &ThreadId,
        outcome: ApprovalOutcome,
    ) -> Result<(), ChannelError> {
        if outcome != ApprovalOutcome::TimedOut {
            self.inboxes.close(thread_id).await;
            self.message_threads
                .write()
                .await
                .retain(|_, thread| thread != thread_id);
        }
        debug!(thread_id = %thread_id, outcome = ?outcome, "Telegram review resolved");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks of at most `max_chars` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((cut, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ConnectionDegree, ContactRole, ContactSource, MessageChannel, MessageDraft,
    };
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHAT: &str = "1001";

    fn config(allowed: &[&str]) -> TelegramConfig {
        TelegramConfig {
            bot_token: SecretString::from("123:abc"),
            chat_id: CHAT.into(),
            allowed_users: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn request() -> ReviewRequest {
        ReviewRequest {
            contact_id: Uuid::new_v4(),
            job_id: "rec1".into(),
            contact_name: "Jane Roe".into(),
            contact_title: None,
            contact_role: ContactRole::Recruiter,
            company: "Acme".into(),
            role_title: "Data Eng".into(),
            source: ContactSource::DiscoveryProvider,
            degree: ConnectionDegree::Second,
            draft: MessageDraft::new("hi", MessageChannel::ConnectionNote),
            profile_url: None,
            existing_thread: None,
        }
    }

    fn update(text: &str, reply_to: Option<i64>, username: &str) -> Value {
        let mut message = serde_json::json!({
            "message_id": 900,
            "chat": {"id": CHAT.parse::<i64>().unwrap()},
            "from": {"id": 77, "username": username},
            "text": text,
        });
        if let Some(id) = reply_to {
            message["reply_to_message"] = serde_json::json!({"message_id": id});
        }
        serde_json::json!({"update_id": 1, "message": message})
    }

    async fn server_replying_with(message_id: i64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": message_id}
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn card_message_becomes_thread() {
        let server = server_replying_with(42).await;
        let channel = TelegramApprovalChannel::with_api_base(&config(&["*"]), &server.uri());

        let thread = channel.post_approval_request(&request()).await.unwrap();
        assert_eq!(thread.as_str(), "tg-42");

        channel.route_update(&update("approve", Some(42), "jane")).await;
        assert_eq!(channel.await_reply(&thread).await.as_deref(), Some("approve"));
    }

    #[tokio::test]
    async fn updates_are_posted_as_replies_to_the_card() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "reply_parameters": {"message_id": 42}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 43}
            })))
            .expect(1)
            .mount(&server)
            .await;
        let channel = TelegramApprovalChannel::with_api_base(&config(&["*"]), &server.uri());
        let thread = ThreadId::from("tg-42");
        channel.inboxes.open(&thread).await;

        channel.post_thread_update(&thread, "Revised").await.unwrap();

        // A reply to the follow-up lands on the same thread.
        channel.route_update(&update("skip", Some(43), "jane")).await;
        assert_eq!(channel.await_reply(&thread).await.as_deref(), Some("skip"));
    }

    #[tokio::test]
    async fn plain_message_goes_to_single_open_thread() {
        let server = server_replying_with(50).await;
        let channel = TelegramApprovalChannel::with_api_base(&config(&["*"]), &server.uri());
        let thread = channel.post_approval_request(&request()).await.unwrap();

        channel.route_update(&update("edit shorter", None, "jane")).await;
        assert_eq!(
            channel.await_reply(&thread).await.as_deref(),
            Some("edit shorter")
        );
    }

    #[tokio::test]
    async fn unauthorized_user_is_ignored() {
        let server = server_replying_with(60).await;
        let channel = TelegramApprovalChannel::with_api_base(&config(&["alice"]), &server.uri());
        let thread = channel.post_approval_request(&request()).await.unwrap();

        channel.route_update(&update("approve", Some(60), "mallory")).await;
        channel.route_update(&update("skip", Some(60), "alice")).await;
        assert_eq!(channel.await_reply(&thread).await.as_deref(), Some("skip"));
    }

    #[tokio::test]
    async fn resolved_thread_drops_replies() {
        let server = server_replying_with(70).await;
        let channel = TelegramApprovalChannel::with_api_base(&config(&["*"]), &server.uri());
        let thread = channel.post_approval_request(&request()).await.unwrap();
        channel
            .resolve(&thread, ApprovalOutcome::Skipped)
            .await
            .unwrap();

        channel.route_update(&update("approve", Some(70), "jane")).await;
        assert_eq!(channel.await_reply(&thread).await, None);
    }

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(check_user_allowed(&["*".to_string()], ["anyone"]));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        assert!(check_user_allowed(&["77".to_string()], ["unknown", "77"]));
        assert!(!check_user_allowed(&["alice".to_string()], ["alicex", "77"]));
        assert!(!check_user_allowed(&[], ["alice"]));
    }

    #[test]
    fn thread_ids_round_trip_message_ids() {
        assert_eq!(root_message(&thread_for(42)).unwrap(), 42);
        assert!(root_message(&ThreadId::from("web-1")).is_err());
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let chunks = split_message("line one\nline two", 12);
        assert_eq!(chunks, vec!["line one", "line two"]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn split_message_respects_multibyte_chars() {
        let text = "✅".repeat(5);
        let chunks = split_message(&text, 2);
        assert_eq!(chunks, vec!["✅✅", "✅✅", "✅"]);
    }
}
