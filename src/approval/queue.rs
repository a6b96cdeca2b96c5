//! In-process review queue with broadcast to WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use super::card::{ReviewCard, ReviewStatus, ThreadMessage, WsMessage, render_review_card};
use super::{ApprovalChannel, ReviewRequest, ThreadInboxes};
use crate::error::ChannelError;
use crate::model::{ApprovalOutcome, ThreadId};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

const CHANNEL_NAME: &str = "web";

/// How long approved and skipped cards stay visible after resolution.
const DEFAULT_RESOLVED_RETENTION_SECS: i64 = 3600;

/// Review threads kept in memory and fanned out to WebSocket clients.
pub struct ReviewQueue {
    cards: RwLock<HashMap<ThreadId, ReviewCard>>,
    inboxes: ThreadInboxes,
    tx: broadcast::Sender<WsMessage>,
    resolved_retention: Duration,
}

impl ReviewQueue {
    pub fn new() -> Arc<Self> {
        Self::with_retention(Duration::seconds(DEFAULT_RESOLVED_RETENTION_SECS))
    }

    /// Queue that forgets approved and skipped cards once they have been
    /// resolved for longer than `resolved_retention`. Timed-out cards are
    /// kept: their contacts are offered again on the same thread.
    pub fn with_retention(resolved_retention: Duration) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            cards: RwLock::new(HashMap::new()),
            inboxes: ThreadInboxes::new(),
            tx,
            resolved_retention,
        })
    }

    /// Subscribe to real-time review events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    /// Open threads, oldest first.
    pub async fn open_reviews(&self) -> Vec<ReviewCard> {
        let cards = self.cards.read().await;
        let mut open: Vec<ReviewCard> = cards.values().filter(|c| c.is_open()).cloned().collect();
        open.sort_by_key(|c| c.created_at);
        open
    }

    pub async fn get(&self, thread_id: &ThreadId) -> Option<ReviewCard> {
        self.cards.read().await.get(thread_id).cloned()
    }

    /// Accept a reviewer reply. Returns `false` for unknown or closed threads.
    pub async fn submit_reply(&self, thread_id: &ThreadId, text: &str) -> bool {
        let message = ThreadMessage::reviewer(text);
        {
            let mut cards = self.cards.write().await;
            let Some(card) = cards.get_mut(thread_id).filter(|c| c.is_open()) else {
                debug!(thread_id = %thread_id, "Reply for unknown or closed thread");
                return false;
            };
            card.messages.push(message.clone());
            card.updated_at = Utc::now();
        }

        if !self.inboxes.deliver(thread_id, text).await {
            return false;
        }
        let _ = self.tx.send(WsMessage::ThreadUpdate {
            thread_id: thread_id.clone(),
            message,
        });
        true
    }

    /// Drop approved and skipped cards past the retention window.
    fn evict_resolved(&self, cards: &mut HashMap<ThreadId, ReviewCard>) {
        let cutoff = Utc::now() - self.resolved_retention;
        let before = cards.len();
        cards.retain(|_, card| {
            !matches!(card.status, ReviewStatus::Approved | ReviewStatus::Skipped)
                || card.updated_at > cutoff
        });
        let evicted = before - cards.len();
        if evicted > 0 {
            debug!(evicted, "Evicted resolved review cards");
        }
    }

    /// Thread ids survive restarts on the contact, so they must not repeat.
    fn allocate_thread() -> ThreadId {
        ThreadId::new(format!("web-{}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl ApprovalChannel for ReviewQueue {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn post_approval_request(
        &self,
        request: &ReviewRequest,
    ) -> Result<ThreadId, ChannelError> {
        let thread_id = request
            .existing_thread
            .clone()
            .unwrap_or_else(Self::allocate_thread);

        let card = {
            let mut cards = self.cards.write().await;
            self.evict_resolved(&mut cards);
            match cards.get_mut(&thread_id) {
                // Re-prompt: keep the conversation, show the current draft again.
                Some(card) => {
                    card.request = request.clone();
                    card.status = ReviewStatus::Pending;
                    card.messages
                        .push(ThreadMessage::engine(render_review_card(request)));
                    card.updated_at = Utc::now();
                    card.clone()
                }
                None => {
                    let card = ReviewCard::new(thread_id.clone(), request.clone());
                    cards.insert(thread_id.clone(), card.clone());
                    card
                }
            }
        };
        self.inboxes.open(&thread_id).await;

        info!(
            thread_id = %thread_id,
            contact_id = %request.contact_id,
            company = %request.company,
            "Review posted"
        );
        let _ = self.tx.send(WsMessage::NewReview { card });
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
        let message = ThreadMessage::engine(text);
        {
            let mut cards = self.cards.write().await;
            let card = cards
                .get_mut(thread_id)
                .ok_or_else(|| ChannelError::UnknownThread {
                    name: CHANNEL_NAME.into(),
                    thread_id: thread_id.to_string(),
                })?;
            card.messages.push(message.clone());
            card.updated_at = Utc::now();
        }
        let _ = self.tx.send(WsMessage::ThreadUpdate {
            thread_id: thread_id.clone(),
            message,
        });
        Ok(())
    }

    async fn resolve(
        &self,
        thread_id: &ThreadId,
        outcome: ApprovalOutcome,
    ) -> Result<(), ChannelError> {
        let status = ReviewStatus::from(outcome);
        {
            let mut cards = self.cards.write().await;
            let card = cards
                .get_mut(thread_id)
                .ok_or_else(|| ChannelError::UnknownThread {
                    name: CHANNEL_NAME.into(),
                    thread_id: thread_id.to_string(),
                })?;
            card.status = status;
            card.updated_at = Utc::now();
        }
        if outcome != ApprovalOutcome::TimedOut {
            self.inboxes.close(thread_id).await;
        }

        info!(thread_id = %thread_id, outcome = ?outcome, "Review resolved");
        let _ = self.tx.send(WsMessage::ReviewResolved {
            thread_id: thread_id.clone(),
            status,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectionDegree, ContactRole, ContactSource, MessageChannel, MessageDraft};

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

    #[tokio::test]
    async fn post_broadcasts_and_lists() {
        let queue = ReviewQueue::new();
        let mut rx = queue.subscribe();

        let thread = queue.post_approval_request(&request()).await.unwrap();
        assert!(thread.as_str().starts_with("web-"));

        match rx.recv().await.unwrap() {
            WsMessage::NewReview { card } => assert_eq!(card.thread_id, thread),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(queue.open_reviews().await.len(), 1);
    }

    #[tokio::test]
    async fn reply_reaches_waiter() {
        let queue = ReviewQueue::new();
        let thread = queue.post_approval_request(&request()).await.unwrap();

        assert!(queue.submit_reply(&thread, "approve").await);
        assert_eq!(queue.await_reply(&thread).await.as_deref(), Some("approve"));
    }

    #[tokio::test]
    async fn resolved_thread_rejects_replies() {
        let queue = ReviewQueue::new();
        let thread = queue.post_approval_request(&request()).await.unwrap();
        queue
            .resolve(&thread, ApprovalOutcome::Approved)
            .await
            .unwrap();

        assert!(!queue.submit_reply(&thread, "approve").await);
        assert!(queue.open_reviews().await.is_empty());
        assert_eq!(queue.await_reply(&thread).await, None);
    }

    #[tokio::test]
    async fn timed_out_thread_is_reused_on_reprompt() {
        let queue = ReviewQueue::new();
        let thread = queue.post_approval_request(&request()).await.unwrap();
        queue
            .resolve(&thread, ApprovalOutcome::TimedOut)
            .await
            .unwrap();

        // A late reply is still buffered.
        assert!(queue.submit_reply(&thread, "skip").await);

        let mut again = request();
        again.existing_thread = Some(thread.clone());
        let reused = queue.post_approval_request(&again).await.unwrap();
        assert_eq!(reused, thread);
        assert_eq!(queue.await_reply(&thread).await.as_deref(), Some("skip"));

        let card = queue.get(&thread).await.unwrap();
        assert_eq!(card.status, ReviewStatus::Pending);
        assert_eq!(card.messages.len(), 3);
    }

    #[tokio::test]
    async fn resolved_cards_are_evicted_after_retention() {
        let queue = ReviewQueue::with_retention(Duration::zero());
        let approved = queue.post_approval_request(&request()).await.unwrap();
        let skipped = queue.post_approval_request(&request()).await.unwrap();
        let timed_out = queue.post_approval_request(&request()).await.unwrap();
        queue.resolve(&approved, ApprovalOutcome::Approved).await.unwrap();
        queue.resolve(&skipped, ApprovalOutcome::Skipped).await.unwrap();
        queue.resolve(&timed_out, ApprovalOutcome::TimedOut).await.unwrap();

        // Eviction runs when the next card is posted.
        let fresh = queue.post_approval_request(&request()).await.unwrap();

        assert!(queue.get(&approved).await.is_none());
        assert!(queue.get(&skipped).await.is_none());
        assert_eq!(
            queue.get(&timed_out).await.unwrap().status,
            ReviewStatus::TimedOut
        );
        assert!(queue.get(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn resolved_cards_stay_within_retention() {
        let queue = ReviewQueue::new();
        let approved = queue.post_approval_request(&request()).await.unwrap();
        queue.resolve(&approved, ApprovalOutcome::Approved).await.unwrap();
        queue.post_approval_request(&request()).await.unwrap();

        assert_eq!(
            queue.get(&approved).await.unwrap().status,
            ReviewStatus::Approved
        );
    }

    #[tokio::test]
    async fn update_on_unknown_thread_fails() {
        let queue = ReviewQueue::new();
        let err = queue
            .post_thread_update(&ThreadId::from("web-99"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownThread { .. }));
    }
}
