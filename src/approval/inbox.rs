//! Per-thread reply mailboxes shared by the channel implementations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::debug;

use crate::model::ThreadId;

struct Inbox {
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Inbox {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// Buffers human replies per thread until the engine asks for them.
#[derive(Default)]
pub struct ThreadInboxes {
    inboxes: RwLock<HashMap<ThreadId, Inbox>>,
}

impl ThreadInboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a mailbox for the thread. Keeps buffered replies if already open.
    pub async fn open(&self, thread_id: &ThreadId) {
        let mut inboxes = self.inboxes.write().await;
        inboxes.entry(thread_id.clone()).or_insert_with(Inbox::new);
    }

    /// Queue a reply. Returns `false` when the thread is not open.
    pub async fn deliver(&self, thread_id: &ThreadId, reply: impl Into<String>) -> bool {
        let inboxes = self.inboxes.read().await;
        match inboxes.get(thread_id) {
            Some(inbox) => inbox.tx.send(reply.into()).is_ok(),
            None => {
                debug!(thread_id = %thread_id, "Dropping reply for closed thread");
                false
            }
        }
    }

    /// Next reply on the thread, waiting if none is buffered.
    ///
    /// Returns `None` when the thread is closed, including while waiting.
    pub async fn next(&self, thread_id: &ThreadId) -> Option<String> {
        let rx = {
            let inboxes = self.inboxes.read().await;
            inboxes.get(thread_id)?.rx.clone()
        };
        let mut rx = rx.lock().await;
        rx.recv().await
    }

    /// Close the thread. A pending `next` wakes with `None`.
    pub async fn close(&self, thread_id: &ThreadId) {
        self.inboxes.write().await.remove(thread_id);
    }

    pub async fn is_open(&self, thread_id: &ThreadId) -> bool {
        self.inboxes.read().await.contains_key(thread_id)
    }

    pub async fn open_threads(&self) -> Vec<ThreadId> {
        let mut threads: Vec<ThreadId> = self.inboxes.read().await.keys().cloned().collect();
        threads.sort();
        threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn replies_are_buffered_in_order() {
        let inboxes = ThreadInboxes::new();
        let thread = ThreadId::from("t1");
        inboxes.open(&thread).await;

        assert!(inboxes.deliver(&thread, "edit shorter").await);
        assert!(inboxes.deliver(&thread, "approve").await);

        assert_eq!(inboxes.next(&thread).await.as_deref(), Some("edit shorter"));
        assert_eq!(inboxes.next(&thread).await.as_deref(), Some("approve"));
    }

    #[tokio::test]
    async fn closed_thread_drops_replies() {
        let inboxes = ThreadInboxes::new();
        let thread = ThreadId::from("t1");
        assert!(!inboxes.deliver(&thread, "approve").await);
        assert_eq!(inboxes.next(&thread).await, None);
    }

    #[tokio::test]
    async fn reopening_keeps_buffered_replies() {
        let inboxes = ThreadInboxes::new();
        let thread = ThreadId::from("t1");
        inboxes.open(&thread).await;
        inboxes.deliver(&thread, "skip").await;
        inboxes.open(&thread).await;
        assert_eq!(inboxes.next(&thread).await.as_deref(), Some("skip"));
    }

    #[tokio::test]
    async fn close_wakes_waiter() {
        let inboxes = Arc::new(ThreadInboxes::new());
        let thread = ThreadId::from("t1");
        inboxes.open(&thread).await;

        let waiter = {
            let inboxes = inboxes.clone();
            let thread = thread.clone();
            tokio::spawn(async move { inboxes.next(&thread).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        inboxes.close(&thread).await;

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
        assert!(!inboxes.is_open(&thread).await);
    }
}
