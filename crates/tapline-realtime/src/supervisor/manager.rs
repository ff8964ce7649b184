//! Transport supervisor: realtime first, polling when realtime gives up.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tapline_core::config::{AppConfig, SupervisorConfig};
use tapline_core::error::AppError;
use tapline_core::result::AppResult;
use tapline_core::traits::{LastSeenStore, MessageApi};
use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::{Message, MessageStatus, SendMessageRequest};

use crate::connection::{Connector, RealtimeTransport};
use crate::event::{EventBus, EventKind, ListenerId, TransportEvent};
use crate::metrics::{MetricsSnapshot, TransportMetrics};
use crate::polling::PollingTransport;
use crate::transport::{Transport, TransportKind};

use super::ledger::MessageLedger;
use super::status::ConnectionStatus;

#[derive(Debug)]
struct SupervisorState {
    status: ConnectionStatus,
    started: bool,
    /// Conversations the UI has open.
    open: BTreeSet<ConversationId>,
    /// Set when polling takes over; cleared by retry and stop.
    polling_active: bool,
    /// Bumped by start, stop and retry; a stale watchdog stands down.
    generation: u64,
    watchdog: Option<CancellationToken>,
    leaf_listeners: Vec<(TransportKind, ListenerId)>,
}

struct SupervisorInner {
    watchdog: Duration,
    realtime: RealtimeTransport,
    polling: PollingTransport,
    api: Arc<dyn MessageApi>,
    bus: EventBus,
    metrics: Arc<TransportMetrics>,
    ledger: Option<MessageLedger>,
    state: Mutex<SupervisorState>,
}

/// Single entry point for the UI.
///
/// Starts on the realtime transport. When realtime exhausts its attempts,
/// reports itself unsupported or misses the watchdog window, the supervisor
/// suspends it and polls every open conversation instead until `retry()`.
/// Events of whichever transport is authoritative are re-emitted on the
/// supervisor's own bus together with [`TransportEvent::StatusChanged`].
#[derive(Clone)]
pub struct TransportSupervisor {
    inner: Arc<SupervisorInner>,
}

impl fmt::Debug for TransportSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("TransportSupervisor")
            .field("status", &state.status)
            .field("open", &state.open.len())
            .field("polling_active", &state.polling_active)
            .finish()
    }
}

impl TransportSupervisor {
    /// Supervisor over already constructed transports.
    ///
    /// `metrics` should be the instance the transports were built with.
    pub fn new(
        config: &SupervisorConfig,
        realtime: RealtimeTransport,
        polling: PollingTransport,
        api: Arc<dyn MessageApi>,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        let ledger = config
            .dedup_enabled
            .then(|| MessageLedger::new(config.dedup_capacity));

        Self {
            inner: Arc::new(SupervisorInner {
                watchdog: config.watchdog(),
                realtime,
                polling,
                api,
                bus: EventBus::new("supervisor", Arc::clone(&metrics)),
                metrics,
                ledger,
                state: Mutex::new(SupervisorState {
                    status: ConnectionStatus::Disconnected,
                    started: false,
                    open: BTreeSet::new(),
                    polling_active: false,
                    generation: 0,
                    watchdog: None,
                    leaf_listeners: Vec::new(),
                }),
            }),
        }
    }

    /// Build both transports and the supervisor from configuration.
    pub fn from_config(
        config: &AppConfig,
        connector: Arc<dyn Connector>,
        api: Arc<dyn MessageApi>,
        store: Arc<dyn LastSeenStore>,
    ) -> Self {
        let metrics = Arc::new(TransportMetrics::new());
        let realtime = RealtimeTransport::new(
            &config.realtime,
            config.session.token.clone(),
            connector,
            Arc::clone(&metrics),
        );
        let polling = PollingTransport::new(
            &config.polling,
            Arc::clone(&api),
            store,
            Arc::clone(&metrics),
        );
        Self::new(&config.supervisor, realtime, polling, api, metrics)
    }

    /// Start on the realtime transport and arm the watchdog.
    pub fn start(&self) {
        let open: Vec<ConversationId> = {
            let mut state = self.inner.lock();
            if state.started {
                debug!("Transport supervisor already started");
                return;
            }
            state.started = true;
            state.generation += 1;
            state.open.iter().cloned().collect()
        };

        self.inner.attach();
        for conversation_id in &open {
            self.inner.realtime.join_conversation(conversation_id);
        }

        info!(conversations = open.len(), "Transport supervisor started");
        self.inner.set_status(ConnectionStatus::Connecting);
        self.inner.arm_watchdog();
        self.inner.realtime.connect();
    }

    /// Stop everything: watchdog, polling and realtime.
    ///
    /// Listeners on the supervisor itself are kept.
    pub fn stop(&self) {
        let leaf_listeners = {
            let mut state = self.inner.lock();
            if !state.started {
                return;
            }
            state.started = false;
            state.generation += 1;
            state.polling_active = false;
            if let Some(watchdog) = state.watchdog.take() {
                watchdog.cancel();
            }
            std::mem::take(&mut state.leaf_listeners)
        };

        for (kind, id) in leaf_listeners {
            match kind {
                TransportKind::Realtime => self.inner.realtime.unsubscribe(id),
                TransportKind::Polling => self.inner.polling.unsubscribe(id),
            };
        }

        let stopped = self.inner.polling.polled_conversations().len();
        Transport::shutdown(&self.inner.polling);
        self.inner.realtime.disconnect();
        if let Some(ledger) = &self.inner.ledger {
            ledger.clear();
        }
        self.inner.set_status(ConnectionStatus::Disconnected);
        info!(polling_stopped = stopped, "Transport supervisor stopped");
    }

    /// Leave polling and try realtime again with a fresh attempt budget.
    ///
    /// Only allowed from `Failed` or `Disconnected`. Returns whether a retry
    /// started.
    pub fn retry(&self) -> bool {
        {
            let mut state = self.inner.lock();
            if !state.started {
                debug!("Retry ignored, supervisor not started");
                return false;
            }
            if !state.status.can_retry() {
                debug!(status = %state.status, "Retry ignored");
                return false;
            }
            state.generation += 1;
            state.polling_active = false;
        }

        let stopped = self.inner.polling.stop_all_polling();
        info!(polling_stopped = stopped, "Retrying realtime transport");
        self.inner.set_status(ConnectionStatus::Connecting);
        self.inner.arm_watchdog();
        self.inner.realtime.retry_connection();
        true
    }

    /// The UI opened a conversation.
    ///
    /// Returns `false` if it was already open.
    pub fn open_conversation(&self, conversation_id: &ConversationId) -> bool {
        let (started, polling_active) = {
            let mut state = self.inner.lock();
            if !state.open.insert(conversation_id.clone()) {
                return false;
            }
            (state.started, state.polling_active)
        };

        if started {
            self.inner.realtime.watch(conversation_id);
            if polling_active {
                self.inner.polling.watch(conversation_id);
            }
        }
        info!(conversation_id = %conversation_id, "Conversation opened");
        true
    }

    /// The UI closed a conversation.
    ///
    /// Returns `false` if it was not open.
    pub fn close_conversation(&self, conversation_id: &ConversationId) -> bool {
        if !self.inner.lock().open.remove(conversation_id) {
            return false;
        }
        self.inner.realtime.unwatch(conversation_id);
        self.inner.polling.unwatch(conversation_id);
        info!(conversation_id = %conversation_id, "Conversation closed");
        true
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    /// Current status as user-facing text.
    pub fn describe_status(&self) -> String {
        self.status().describe(self.inner.polling.interval())
    }

    /// Conversations currently open, sorted.
    pub fn open_conversations(&self) -> Vec<ConversationId> {
        self.inner.lock().open.iter().cloned().collect()
    }

    /// Whether polling is the authoritative transport.
    pub fn is_polling_active(&self) -> bool {
        self.inner.lock().polling_active
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

    /// Forward a typing indicator over realtime. `false` means dropped.
    pub fn send_typing(&self, conversation_id: &ConversationId, is_typing: bool) -> bool {
        self.inner.realtime.send_typing(conversation_id, is_typing)
    }

    /// Forward a status change over realtime. `false` means dropped.
    ///
    /// A change that would move a known message backwards is not sent.
    pub fn send_message_status(&self, message_id: &MessageId, status: MessageStatus) -> bool {
        if let Some(current) = self
            .inner
            .ledger
            .as_ref()
            .and_then(|ledger| ledger.status_of(message_id))
            && !current.can_advance_to(status)
        {
            debug!(
                message_id = %message_id,
                current = %current,
                status = %status,
                "Status change does not advance, not sent"
            );
            return false;
        }
        self.inner.realtime.send_message_status(message_id, status)
    }

    /// Send a message over REST and return it as the backend stored it.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> AppResult<Message> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(AppError::validation("Message content is empty"));
        }

        let request = SendMessageRequest {
            conversation_id: conversation_id.clone(),
            content,
            reply_to,
        };
        let message = self
            .inner
            .api
            .send_message(&request)
            .await?
            .into_message(conversation_id)?;

        if let Some(ledger) = &self.inner.ledger {
            ledger.remember(&message.id, message.status);
        }
        debug!(conversation_id = %conversation_id, message_id = %message.id, "Message sent");
        Ok(message)
    }

    /// Mark messages as read over REST.
    pub async fn mark_as_read(&self, message_ids: &[MessageId]) -> AppResult<()> {
        self.inner.api.mark_read(message_ids).await
    }

    /// Counters of both transports and the supervisor.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The realtime transport.
    pub fn realtime(&self) -> &RealtimeTransport {
        &self.inner.realtime
    }

    /// The polling transport.
    pub fn polling(&self) -> &PollingTransport {
        &self.inner.polling
    }
}

impl SupervisorInner {
    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to both leaf transports.
    fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let realtime_id = self.realtime.subscribe_all(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_realtime(event);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        let polling_id = self.polling.subscribe_all(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_polling(event);
            }
        });

        self.lock().leaf_listeners = vec![
            (TransportKind::Realtime, realtime_id),
            (TransportKind::Polling, polling_id),
        ];
    }

    fn on_realtime(self: &Arc<Self>, event: &TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.cancel_watchdog();
                let mut state = self.lock();
                if state.polling_active {
                    debug!("Late realtime connect ignored, polling is authoritative");
                    return;
                }
                let from = std::mem::replace(&mut state.status, ConnectionStatus::Connected);
                drop(state);
                self.announce_status(from, ConnectionStatus::Connected);
            }
            TransportEvent::NewMessage(message) => {
                self.polling.mark_seen(&message.conversation_id, &message.id);
            }
            TransportEvent::Disconnected { .. } => {
                if self.lock().status == ConnectionStatus::Connected {
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
            TransportEvent::MaxAttemptsReached => self.fail("realtime attempts exhausted", None),
            TransportEvent::WebsocketNotSupported => self.fail("realtime not supported", None),
            TransportEvent::NoToken => {
                self.cancel_watchdog();
                self.set_status(ConnectionStatus::Disconnected);
            }
            _ => {}
        }
        self.forward(event);
    }

    fn on_polling(&self, event: &TransportEvent) {
        if self.lock().polling_active {
            self.forward(event);
        } else {
            debug!(kind = %event.kind(), "Dropping polling event, realtime is authoritative");
        }
    }

    fn forward(&self, event: &TransportEvent) {
        if let Some(ledger) = &self.ledger
            && !ledger.admit(event)
        {
            TransportMetrics::incr(&self.metrics.duplicates_suppressed);
            return;
        }
        if matches!(event, TransportEvent::NewMessage(_)) {
            TransportMetrics::incr(&self.metrics.messages_emitted);
        }
        self.bus.emit(event);
    }

    fn set_status(&self, to: ConnectionStatus) {
        let from = std::mem::replace(&mut self.lock().status, to);
        self.announce_status(from, to);
    }

    fn announce_status(&self, from: ConnectionStatus, to: ConnectionStatus) {
        if from == to {
            return;
        }
        info!(from = %from, to = %to, "Connection status changed");
        self.bus.emit(&TransportEvent::StatusChanged { from, to });
    }

    /// Hand over to polling. Runs at most once per start or retry.
    ///
    /// With `stalled_generation` set, only fails while that generation is
    /// still `Connecting`.
    fn fail(self: &Arc<Self>, reason: &str, stalled_generation: Option<u64>) {
        let (from, conversations): (ConnectionStatus, Vec<ConversationId>) = {
            let mut state = self.lock();
            if !state.started || state.polling_active {
                return;
            }
            if let Some(generation) = stalled_generation
                && (state.generation != generation || state.status != ConnectionStatus::Connecting)
            {
                debug!(status = %state.status, "Watchdog stood down");
                return;
            }
            state.polling_active = true;
            if let Some(watchdog) = state.watchdog.take() {
                watchdog.cancel();
            }
            let from = std::mem::replace(&mut state.status, ConnectionStatus::Failed);
            (from, state.open.iter().cloned().collect())
        };

        warn!(
            reason,
            conversations = conversations.len(),
            "Realtime unavailable, falling back to polling"
        );
        Transport::shutdown(&self.realtime);
        for conversation_id in &conversations {
            self.polling.watch(conversation_id);
        }
        self.announce_status(from, ConnectionStatus::Failed);
    }

    fn arm_watchdog(self: &Arc<Self>) {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.lock();
            if let Some(previous) = state.watchdog.replace(token.clone()) {
                previous.cancel();
            }
            state.generation
        };

        let weak = Arc::downgrade(self);
        let window = self.watchdog;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }

            let Some(inner) = weak.upgrade() else {
                return;
            };
            if token.is_cancelled() {
                return;
            }
            debug!(watchdog_secs = window.as_secs(), "Watchdog elapsed");
            inner.fail("realtime did not connect in time", Some(generation));
        });
    }

    fn cancel_watchdog(&self) {
        if let Some(watchdog) = self.lock().watchdog.take() {
            watchdog.cancel();
        }
    }
}
