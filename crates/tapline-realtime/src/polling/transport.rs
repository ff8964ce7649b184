//! Fixed-interval polling of conversation tails.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use tapline_core::config::PollingConfig;
use tapline_core::result::AppResult;
use tapline_core::traits::{LastSeenStore, MessageApi};
use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::MessageStatus;

use crate::event::{ConversationSummary, EventBus, EventKind, ListenerId, TransportEvent};
use crate::metrics::TransportMetrics;
use crate::transport::{Transport, TransportKind};

struct PollInner {
    interval: Duration,
    api: Arc<dyn MessageApi>,
    store: Arc<dyn LastSeenStore>,
    bus: EventBus,
    metrics: Arc<TransportMetrics>,
    /// One timer per polled conversation.
    timers: DashMap<ConversationId, CancellationToken>,
    /// Serializes ticks of the same conversation.
    gates: DashMap<ConversationId, Arc<AsyncMutex<()>>>,
    /// Newest ids the UI received elsewhere, not yet written to the store.
    announced: DashMap<ConversationId, MessageId>,
}

/// Pull-based fallback that emulates realtime events.
///
/// Each tick fetches the conversation, compares its newest message with the
/// persisted last-seen id and, when they differ, emits
/// [`TransportEvent::NewMessage`] then [`TransportEvent::ConversationUpdated`].
/// Only the newest message is surfaced per tick.
#[derive(Clone)]
pub struct PollingTransport {
    inner: Arc<PollInner>,
}

impl fmt::Debug for PollingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingTransport")
            .field("interval", &self.inner.interval)
            .field("conversations", &self.inner.timers.len())
            .finish()
    }
}

impl PollingTransport {
    /// Create a polling transport.
    pub fn new(
        config: &PollingConfig,
        api: Arc<dyn MessageApi>,
        store: Arc<dyn LastSeenStore>,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(PollInner {
                interval: config.interval(),
                api,
                store,
                bus: EventBus::new("polling", Arc::clone(&metrics)),
                metrics,
                timers: DashMap::new(),
                gates: DashMap::new(),
                announced: DashMap::new(),
            }),
        }
    }

    /// Start the timer for a conversation. The first tick fires one
    /// interval from now.
    ///
    /// Returns `false` if the conversation is already polled.
    pub fn start_polling(&self, conversation_id: &ConversationId) -> bool {
        match self.inner.timers.entry(conversation_id.clone()) {
            Entry::Occupied(_) => {
                debug!(conversation_id = %conversation_id, "Already polling");
                false
            }
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(cancel.clone());
                tokio::spawn(run_timer(
                    Arc::clone(&self.inner),
                    conversation_id.clone(),
                    cancel,
                ));
                info!(
                    conversation_id = %conversation_id,
                    interval_secs = self.inner.interval.as_secs(),
                    "Polling started"
                );
                true
            }
        }
    }

    /// Stop the timer for a conversation. A tick already in flight emits
    /// nothing.
    ///
    /// Returns `false` if the conversation was not polled.
    pub fn stop_polling(&self, conversation_id: &ConversationId) -> bool {
        let Some((_, cancel)) = self.inner.timers.remove(conversation_id) else {
            return false;
        };
        cancel.cancel();
        self.inner.gates.remove(conversation_id);
        info!(conversation_id = %conversation_id, "Polling stopped");
        true
    }

    /// Stop every timer. Returns how many were running.
    pub fn stop_all_polling(&self) -> usize {
        let ids: Vec<ConversationId> = self
            .inner
            .timers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter().filter(|id| self.stop_polling(id)).count()
    }

    /// Record a message the UI already received through another transport.
    ///
    /// The id becomes the conversation's last-seen id before the next tick
    /// compares against it, so a handover never announces it again.
    pub fn mark_seen(&self, conversation_id: &ConversationId, message_id: &MessageId) {
        self.inner
            .announced
            .insert(conversation_id.clone(), message_id.clone());

        let inner = Arc::clone(&self.inner);
        let conversation_id = conversation_id.clone();
        tokio::spawn(async move {
            let gate = inner.gate(&conversation_id);
            let _guard = gate.lock().await;
            if let Err(e) = inner.flush_announced(&conversation_id).await {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to persist last-seen message"
                );
            }
        });
    }

    /// Run one tick now.
    ///
    /// Returns whether a new message was announced.
    pub async fn poll_once(&self, conversation_id: &ConversationId) -> AppResult<bool> {
        self.inner
            .tick(conversation_id, &CancellationToken::new())
            .await
    }

    /// Whether a conversation has a running timer.
    pub fn is_polling(&self, conversation_id: &ConversationId) -> bool {
        self.inner.timers.contains_key(conversation_id)
    }

    /// Conversations with a running timer, sorted.
    pub fn polled_conversations(&self) -> Vec<ConversationId> {
        let mut ids: Vec<ConversationId> = self
            .inner
            .timers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Interval between ticks.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// The transport's event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Register a listener for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, listener)
    }

    /// Register a listener for every event.
    pub fn subscribe_all<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe_all(listener)
    }

    /// Remove a listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.bus.unsubscribe(id)
    }
}

impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    fn watch(&self, conversation_id: &ConversationId) -> bool {
        self.start_polling(conversation_id)
    }

    fn unwatch(&self, conversation_id: &ConversationId) -> bool {
        self.stop_polling(conversation_id)
    }

    fn send_typing(&self, conversation_id: &ConversationId, _is_typing: bool) -> bool {
        debug!(conversation_id = %conversation_id, "Polling cannot push typing indicators");
        false
    }

    fn send_message_status(&self, message_id: &MessageId, _status: MessageStatus) -> bool {
        debug!(message_id = %message_id, "Polling cannot push status changes");
        false
    }

    fn shutdown(&self) {
        self.stop_all_polling();
    }
}

async fn run_timer(inner: Arc<PollInner>, conversation_id: ConversationId, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + inner.interval, inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match inner.tick(&conversation_id, &cancel).await {
                    Ok(_) => {}
                    Err(e) if e.is_transient() => warn!(
                        conversation_id = %conversation_id,
                        error = %e,
                        "Polling tick failed"
                    ),
                    Err(e) => error!(
                        conversation_id = %conversation_id,
                        error = %e,
                        "Polling tick failed, will keep trying"
                    ),
                }
            }
        }
    }

    trace!(conversation_id = %conversation_id, "Polling timer exited");
}

impl PollInner {
    fn gate(&self, conversation_id: &ConversationId) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.gates
                .entry(conversation_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .value(),
        )
    }

    /// Write a pending [`PollingTransport::mark_seen`] id to the store.
    /// Callers hold the conversation's gate.
    async fn flush_announced(&self, conversation_id: &ConversationId) -> AppResult<()> {
        let Some((_, message_id)) = self.announced.remove(conversation_id) else {
            return Ok(());
        };
        if let Err(e) = self.store.set(conversation_id, &message_id).await {
            self.announced
                .entry(conversation_id.clone())
                .or_insert(message_id);
            return Err(e);
        }
        Ok(())
    }

    async fn tick(&self, conversation_id: &ConversationId, cancel: &CancellationToken) -> AppResult<bool> {
        let gate = self.gate(conversation_id);
        let _guard = gate.lock().await;
        TransportMetrics::incr(&self.metrics.polls);

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            fetched = self.api.fetch_messages(conversation_id) => fetched,
        };
        let records = fetched.inspect_err(|_| TransportMetrics::incr(&self.metrics.poll_failures))?;

        let Some(newest) = records.into_iter().last() else {
            trace!(conversation_id = %conversation_id, "Conversation is empty");
            return Ok(false);
        };

        self.flush_announced(conversation_id).await?;
        let last_seen = self.store.get(conversation_id).await?;
        if last_seen.as_ref().is_some_and(|seen| seen.as_str() == newest.id) {
            return Ok(false);
        }

        if cancel.is_cancelled() {
            return Ok(false);
        }

        let newest_id = MessageId::new(newest.id.clone());
        self.store.set(conversation_id, &newest_id).await?;
        if cancel.is_cancelled() {
            return Ok(false);
        }

        match newest.into_message(conversation_id) {
            Ok(message) => {
                debug!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    "Polling found a new message"
                );
                let summary = ConversationSummary::from_message(&message);
                self.bus.emit(&TransportEvent::NewMessage(message));
                self.bus.emit(&TransportEvent::ConversationUpdated(summary));
                Ok(true)
            }
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    message_id = %newest_id,
                    error = %e,
                    "Skipping malformed message record"
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use tapline_cache::memory::store::MemoryLastSeenStore;
    use tapline_core::error::AppError;
    use tapline_core::types::message::{MessageRecord, SendMessageRequest};

    use super::*;

    #[derive(Debug, Default)]
    struct FakeApi {
        page: Mutex<Vec<MessageRecord>>,
        fail: AtomicBool,
        fetches: AtomicUsize,
        latency: Mutex<Duration>,
    }

    #[async_trait]
    impl MessageApi for FakeApi {
        async fn fetch_messages(&self, _id: &ConversationId) -> AppResult<Vec<MessageRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::external_service("503"));
            }
            Ok(self.page.lock().unwrap().clone())
        }

        async fn send_message(&self, _request: &SendMessageRequest) -> AppResult<MessageRecord> {
            Err(AppError::internal("unused"))
        }

        async fn mark_read(&self, _ids: &[MessageId]) -> AppResult<()> {
            Ok(())
        }
    }

    fn record(id: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            conversation_id: None,
            sender_id: "u2".to_string(),
            sender_role: "farmer".to_string(),
            content: format!("message {id}"),
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()),
            status: Some("sent".to_string()),
            reply_to: None,
        }
    }

    struct Fixture {
        api: Arc<FakeApi>,
        store: Arc<MemoryLastSeenStore>,
        polling: PollingTransport,
        seen: Arc<Mutex<Vec<TransportEvent>>>,
    }

    fn fixture() -> Fixture {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemoryLastSeenStore::new());
        let polling = PollingTransport::new(
            &PollingConfig::default(),
            api.clone(),
            store.clone(),
            Arc::new(TransportMetrics::new()),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        polling.subscribe_all(move |e| sink.lock().unwrap().push(e.clone()));
        Fixture {
            api,
            store,
            polling,
            seen,
        }
    }

    #[tokio::test]
    async fn test_newest_message_announced_once() {
        let f = fixture();
        let c1 = ConversationId::new("C1");
        *f.api.page.lock().unwrap() = vec![record("m1"), record("m2")];

        assert!(f.polling.poll_once(&c1).await.unwrap());
        {
            let seen = f.seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            match &seen[0] {
                TransportEvent::NewMessage(message) => {
                    assert_eq!(message.id.as_str(), "m2");
                    assert_eq!(message.conversation_id, c1);
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert_eq!(seen[1].kind(), EventKind::ConversationUpdated);
        }
        assert_eq!(
            f.store.get(&c1).await.unwrap(),
            Some(MessageId::new("m2"))
        );

        assert!(!f.polling.poll_once(&c1).await.unwrap());
        assert_eq!(f.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_conversation_is_quiet() {
        let f = fixture();
        let c1 = ConversationId::new("C1");
        assert!(!f.polling.poll_once(&c1).await.unwrap());
        assert!(f.seen.lock().unwrap().is_empty());
        assert_eq!(f.store.get(&c1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_newest_advances_last_seen() {
        let f = fixture();
        let c1 = ConversationId::new("C1");
        let mut bad = record("m9");
        bad.sender_role = "auctioneer".to_string();
        *f.api.page.lock().unwrap() = vec![bad];

        assert!(!f.polling.poll_once(&c1).await.unwrap());
        assert!(f.seen.lock().unwrap().is_empty());
        assert_eq!(f.store.get(&c1).await.unwrap(), Some(MessageId::new("m9")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polling_is_idempotent() {
        let f = fixture();
        let c1 = ConversationId::new("C1");

        assert!(f.polling.start_polling(&c1));
        assert!(!f.polling.start_polling(&c1));
        assert_eq!(f.polling.polled_conversations(), vec![c1.clone()]);

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 1);

        assert!(f.polling.stop_polling(&c1));
        assert!(!f.polling.stop_polling(&c1));
        assert!(!f.polling.is_polling(&c1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_timer_running() {
        let f = fixture();
        let c1 = ConversationId::new("C1");
        f.api.fail.store(true, Ordering::SeqCst);
        *f.api.page.lock().unwrap() = vec![record("m1")];

        f.polling.start_polling(&c1);
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(f.seen.lock().unwrap().is_empty());
        assert_eq!(f.polling.inner.metrics.snapshot().poll_failures, 1);

        f.api.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.seen.lock().unwrap().len(), 2);
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_in_flight_after_stop_emits_nothing() {
        let f = fixture();
        let c1 = ConversationId::new("C1");
        *f.api.page.lock().unwrap() = vec![record("m1")];
        *f.api.latency.lock().unwrap() = Duration::from_secs(2);

        f.polling.start_polling(&c1);
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 1);

        f.polling.stop_polling(&c1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(f.seen.lock().unwrap().is_empty());
        assert_eq!(f.store.get(&c1).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_polling() {
        let f = fixture();
        assert_eq!(f.polling.stop_all_polling(), 0);
        f.polling.start_polling(&ConversationId::new("C1"));
        f.polling.start_polling(&ConversationId::new("C2"));
        assert_eq!(f.polling.stop_all_polling(), 2);
        assert!(f.polling.polled_conversations().is_empty());
    }

    #[tokio::test]
    async fn test_mark_seen_suppresses_handover_repeat() {
        let f = fixture();
        let c1 = ConversationId::new("C1");
        *f.api.page.lock().unwrap() = vec![record("m1"), record("m2")];

        f.polling.mark_seen(&c1, &MessageId::new("m2"));
        assert!(!f.polling.poll_once(&c1).await.unwrap());
        assert!(f.seen.lock().unwrap().is_empty());
        assert_eq!(f.store.get(&c1).await.unwrap(), Some(MessageId::new("m2")));

        f.api.page.lock().unwrap().push(record("m3"));
        assert!(f.polling.poll_once(&c1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_seen_persists_without_a_tick() {
        let f = fixture();
        let c1 = ConversationId::new("C1");

        f.polling.mark_seen(&c1, &MessageId::new("m4"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.store.get(&c1).await.unwrap(), Some(MessageId::new("m4")));
        assert!(f.polling.inner.announced.is_empty());
    }

    #[derive(Debug, Default)]
    struct SlowStore {
        inner: MemoryLastSeenStore,
    }

    #[async_trait]
    impl LastSeenStore for SlowStore {
        async fn get(&self, conversation_id: &ConversationId) -> AppResult<Option<MessageId>> {
            self.inner.get(conversation_id).await
        }

        async fn set(&self, conversation_id: &ConversationId, message_id: &MessageId) -> AppResult<()> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            self.inner.set(conversation_id, message_id).await
        }

        async fn remove(&self, conversation_id: &ConversationId) -> AppResult<()> {
            self.inner.remove(conversation_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_store_write_emits_nothing() {
        let api = Arc::new(FakeApi::default());
        *api.page.lock().unwrap() = vec![record("m1")];
        let store = Arc::new(SlowStore::default());
        let polling = PollingTransport::new(
            &PollingConfig::default(),
            api.clone(),
            store.clone(),
            Arc::new(TransportMetrics::new()),
        );
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        polling.subscribe_all(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        let c1 = ConversationId::new("C1");
        polling.start_polling(&c1);
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        polling.stop_polling(&c1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(&c1).await.unwrap(), Some(MessageId::new("m1")));
    }
}
