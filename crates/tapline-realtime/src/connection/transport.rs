//! Realtime transport: one authenticated link with bounded reconnection.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tapline_core::config::RealtimeConfig;
use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::MessageStatus;

use crate::event::{EventBus, EventKind, ListenerId, TransportEvent};
use crate::message::ClientFrame;
use crate::message::serializer::{deserialize_server, serialize_client};
use crate::message::validator::validate_inbound;
use crate::metrics::TransportMetrics;
use crate::transport::{Transport, TransportKind};

use super::connector::{ConnectError, Connector, LinkEvent, RealtimeLink};
use super::retry::RetryPolicy;

/// State of the realtime link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// No link and no attempt scheduled.
    Disconnected,
    /// An attempt is in flight or waiting out the retry delay.
    Connecting,
    /// The link is open.
    Connected,
}

#[derive(Debug)]
struct LinkSlot {
    state: LinkState,
    /// Consecutive failed attempts since the last successful open.
    attempts: u32,
    /// Bumped on every teardown; tasks of an older generation stand down.
    generation: u64,
    /// Set once the budget is spent (or the link was suspended).
    exhausted: bool,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
    joined: BTreeSet<ConversationId>,
}

enum NextStep {
    Wait(CancellationToken),
    GiveUp { announce: bool },
}

struct Inner {
    policy: RetryPolicy,
    max_frame_bytes: usize,
    token: Option<String>,
    connector: Arc<dyn Connector>,
    bus: EventBus,
    metrics: Arc<TransportMetrics>,
    slot: Mutex<LinkSlot>,
}

/// Persistent server-push connection to the messaging backend.
///
/// Inbound frames are translated into [`TransportEvent`]s on this
/// transport's bus. Failures are reported as events, never returned.
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct RealtimeTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for RealtimeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.lock();
        f.debug_struct("RealtimeTransport")
            .field("state", &slot.state)
            .field("attempts", &slot.attempts)
            .field("joined", &slot.joined.len())
            .field("has_credential", &self.inner.token.is_some())
            .finish()
    }
}

impl RealtimeTransport {
    /// Create a transport. The credential is read once, here; an empty
    /// credential counts as none.
    pub fn new(
        config: &RealtimeConfig,
        token: Option<String>,
        connector: Arc<dyn Connector>,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy: RetryPolicy::from_config(config),
                max_frame_bytes: config.max_frame_bytes,
                token: token.filter(|t| !t.trim().is_empty()),
                connector,
                bus: EventBus::new("realtime", Arc::clone(&metrics)),
                metrics,
                slot: Mutex::new(LinkSlot {
                    state: LinkState::Disconnected,
                    attempts: 0,
                    generation: 0,
                    exhausted: false,
                    outbound: None,
                    cancel: CancellationToken::new(),
                    joined: BTreeSet::new(),
                }),
            }),
        }
    }

    /// Start connecting.
    ///
    /// No-op while connected or while an attempt is pending, and after the
    /// attempt budget is spent (use [`Self::retry_connection`]). Without a
    /// credential, emits [`TransportEvent::NoToken`] before returning and
    /// attempts nothing.
    pub fn connect(&self) {
        if self.inner.token.is_none() {
            warn!("No credential available, realtime connection not attempted");
            self.inner.bus.emit(&TransportEvent::NoToken);
            return;
        }

        let (generation, cancel) = {
            let mut slot = self.inner.lock();
            if slot.state != LinkState::Disconnected {
                debug!(state = ?slot.state, "Realtime connect ignored");
                return;
            }
            if slot.exhausted {
                debug!("Realtime attempts exhausted, waiting for a manual retry");
                return;
            }
            slot.state = LinkState::Connecting;
            (slot.generation, slot.cancel.clone())
        };

        self.inner.spawn_attempt(generation, cancel, Duration::ZERO);
    }

    /// Tear the connection down, cancel pending attempts and drop every
    /// listener. The transport can connect again afterwards.
    pub fn disconnect(&self) {
        let previous = self.inner.teardown(false, true);
        self.inner.bus.clear();
        info!(previous = ?previous, "Realtime transport disconnected");
    }

    /// Close the link and stop attempting, keeping listeners.
    ///
    /// Emits nothing. Only [`Self::retry_connection`] resumes.
    pub fn suspend(&self) {
        let previous = self.inner.teardown(true, false);
        info!(previous = ?previous, "Realtime transport suspended");
    }

    /// Reset the attempt counter and start over.
    pub fn retry_connection(&self) {
        self.inner.teardown(false, false);
        info!("Retrying realtime connection");
        self.connect();
    }

    /// Tell the peer the local user started or stopped typing.
    ///
    /// Returns `false` when the frame was dropped (not connected).
    pub fn send_typing(&self, conversation_id: &ConversationId, is_typing: bool) -> bool {
        self.inner.send(&ClientFrame::Typing {
            conversation_id: conversation_id.clone(),
            is_typing,
        })
    }

    /// Report a delivery status change for a message.
    ///
    /// Returns `false` when the frame was dropped (not connected).
    pub fn send_message_status(&self, message_id: &MessageId, status: MessageStatus) -> bool {
        self.inner.send(&ClientFrame::MessageStatus {
            message_id: message_id.clone(),
            status,
        })
    }

    /// Join a conversation's channel. The conversation is re-joined after
    /// every reconnect.
    ///
    /// Returns whether the join frame went out now.
    pub fn join_conversation(&self, conversation_id: &ConversationId) -> bool {
        self.inner.lock().joined.insert(conversation_id.clone());
        self.inner.send(&ClientFrame::JoinConversation {
            conversation_id: conversation_id.clone(),
        })
    }

    /// Leave a conversation's channel.
    ///
    /// Returns whether the leave frame went out now.
    pub fn leave_conversation(&self, conversation_id: &ConversationId) -> bool {
        let was_joined = self.inner.lock().joined.remove(conversation_id);
        was_joined
            && self.inner.send(&ClientFrame::LeaveConversation {
                conversation_id: conversation_id.clone(),
            })
    }

    /// Current link state.
    pub fn status(&self) -> LinkState {
        self.inner.lock().state
    }

    /// Consecutive failed attempts since the last open or retry.
    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Whether the link is open.
    pub fn is_connected(&self) -> bool {
        self.status() == LinkState::Connected
    }

    /// Whether a credential was supplied.
    pub fn has_credential(&self) -> bool {
        self.inner.token.is_some()
    }

    /// Conversations re-joined on every reconnect.
    pub fn joined_conversations(&self) -> Vec<ConversationId> {
        self.inner.lock().joined.iter().cloned().collect()
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

impl Transport for RealtimeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Realtime
    }

    fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    fn watch(&self, conversation_id: &ConversationId) -> bool {
        self.join_conversation(conversation_id)
    }

    fn unwatch(&self, conversation_id: &ConversationId) -> bool {
        self.leave_conversation(conversation_id)
    }

    fn send_typing(&self, conversation_id: &ConversationId, is_typing: bool) -> bool {
        RealtimeTransport::send_typing(self, conversation_id, is_typing)
    }

    fn send_message_status(&self, message_id: &MessageId, status: MessageStatus) -> bool {
        RealtimeTransport::send_message_status(self, message_id, status)
    }

    fn shutdown(&self) {
        self.suspend();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LinkSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Invalidate every task of the current generation.
    ///
    /// A suspended (`exhausted`) link keeps its attempt count for reporting.
    fn teardown(&self, exhausted: bool, forget_joined: bool) -> LinkState {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.cancel.cancel();
        slot.cancel = CancellationToken::new();
        slot.outbound = None;
        if !exhausted {
            slot.attempts = 0;
        }
        slot.exhausted = exhausted;
        if forget_joined {
            slot.joined.clear();
        }
        std::mem::replace(&mut slot.state, LinkState::Disconnected)
    }

    fn spawn_attempt(self: &Arc<Self>, generation: u64, cancel: CancellationToken, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            inner.attempt(generation, cancel).await;
        });
    }

    async fn attempt(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        let Some(token) = self.token.clone() else {
            return;
        };

        let attempt = {
            let mut slot = self.lock();
            if slot.generation != generation || cancel.is_cancelled() {
                return;
            }
            slot.attempts += 1;
            slot.state = LinkState::Connecting;
            slot.attempts
        };

        TransportMetrics::incr(&self.metrics.connect_attempts);
        info!(
            attempt,
            max_attempts = self.policy.max_attempts,
            "Opening realtime connection"
        );

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::time::timeout(self.policy.connect_timeout, self.connector.open(&token)) => {
                result.unwrap_or(Err(ConnectError::Timeout))
            }
        };

        match opened {
            Ok(link) => self.run_link(generation, cancel, link).await,
            Err(ConnectError::Unsupported(reason)) => {
                {
                    let mut slot = self.lock();
                    if slot.generation != generation {
                        return;
                    }
                    slot.state = LinkState::Disconnected;
                    slot.exhausted = true;
                }
                warn!(reason = %reason, "Realtime transport not supported");
                self.bus.emit(&TransportEvent::WebsocketNotSupported);
            }
            Err(err) => {
                if !self.is_current(generation) {
                    return;
                }
                warn!(attempt, error = %err, "Realtime connection attempt failed");
                self.bus.emit(&TransportEvent::ConnectionError {
                    message: err.to_string(),
                });
                self.schedule_retry(generation);
            }
        }
    }

    async fn run_link(self: Arc<Self>, generation: u64, cancel: CancellationToken, link: RealtimeLink) {
        let RealtimeLink {
            outbound,
            mut inbound,
        } = link;

        let rejoin: Vec<ConversationId> = {
            let mut slot = self.lock();
            if slot.generation != generation || cancel.is_cancelled() {
                return;
            }
            slot.state = LinkState::Connected;
            slot.attempts = 0;
            slot.exhausted = false;
            slot.outbound = Some(outbound.clone());
            slot.joined.iter().cloned().collect()
        };

        for conversation_id in rejoin {
            self.write(&outbound, &ClientFrame::JoinConversation { conversation_id });
        }
        drop(outbound);

        TransportMetrics::incr(&self.metrics.connections_opened);
        info!("Realtime connection established");
        self.bus.emit(&TransportEvent::Connected);

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = inbound.recv() => match event {
                    Some(LinkEvent::Frame(text)) => self.handle_frame(generation, &text),
                    Some(LinkEvent::Closed { reason }) => break reason,
                    None => break "link closed".to_string(),
                },
            }
        };

        {
            let mut slot = self.lock();
            if slot.generation != generation {
                return;
            }
            slot.state = LinkState::Disconnected;
            slot.outbound = None;
        }

        warn!(reason = %reason, "Realtime connection dropped");
        self.bus.emit(&TransportEvent::Disconnected { reason });
        self.schedule_retry(generation);
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }
        TransportMetrics::incr(&self.metrics.frames_received);

        if let Err(e) = validate_inbound(text, self.max_frame_bytes) {
            TransportMetrics::incr(&self.metrics.frames_dropped);
            warn!(error = %e, "Rejected realtime frame");
            return;
        }

        let frame = match deserialize_server(text) {
            Ok(frame) => frame,
            Err(e) => {
                TransportMetrics::incr(&self.metrics.frames_dropped);
                debug!(error = %e, "Skipping undecodable realtime frame");
                return;
            }
        };

        let sole_joined = {
            let slot = self.lock();
            match slot.joined.len() {
                1 => slot.joined.iter().next().cloned(),
                _ => None,
            }
        };

        match frame.into_event(sole_joined.as_ref()) {
            Ok(event) => {
                self.bus.emit(&event);
            }
            Err(e) => {
                TransportMetrics::incr(&self.metrics.frames_dropped);
                warn!(error = %e, "Dropping malformed realtime frame");
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, generation: u64) {
        let next = {
            let mut slot = self.lock();
            if slot.generation != generation {
                return;
            }
            if self.policy.is_exhausted(slot.attempts) {
                slot.state = LinkState::Disconnected;
                let announce = !slot.exhausted;
                slot.exhausted = true;
                NextStep::GiveUp { announce }
            } else {
                slot.state = LinkState::Connecting;
                NextStep::Wait(slot.cancel.clone())
            }
        };

        match next {
            NextStep::Wait(cancel) => {
                debug!(delay_ms = self.policy.delay.as_millis() as u64, "Scheduling realtime reconnect");
                self.spawn_attempt(generation, cancel, self.policy.delay);
            }
            NextStep::GiveUp { announce: true } => {
                warn!(
                    max_attempts = self.policy.max_attempts,
                    "Realtime attempts exhausted"
                );
                self.bus.emit(&TransportEvent::MaxAttemptsReached);
            }
            NextStep::GiveUp { announce: false } => {}
        }
    }

    fn send(&self, frame: &ClientFrame) -> bool {
        let sender = {
            let slot = self.lock();
            match (&slot.state, &slot.outbound) {
                (LinkState::Connected, Some(sender)) => sender.clone(),
                _ => {
                    debug!(frame = frame.name(), "Realtime not connected, frame dropped");
                    return false;
                }
            }
        };
        self.write(&sender, frame)
    }

    fn write(&self, sender: &mpsc::UnboundedSender<String>, frame: &ClientFrame) -> bool {
        let text = match serialize_client(frame) {
            Ok(text) => text,
            Err(e) => {
                error!(frame = frame.name(), error = %e, "Failed to serialize realtime frame");
                return false;
            }
        };

        if sender.send(text).is_err() {
            debug!(frame = frame.name(), "Realtime link closed, frame dropped");
            return false;
        }
        TransportMetrics::incr(&self.metrics.frames_sent);
        true
    }
}
