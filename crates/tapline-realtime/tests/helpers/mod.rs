//! Shared fakes for the transport integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use tapline_cache::memory::store::MemoryLastSeenStore;
use tapline_core::config::AppConfig;
use tapline_core::error::AppError;
use tapline_core::result::AppResult;
use tapline_core::traits::MessageApi;
use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::{MessageRecord, SendMessageRequest};
use tapline_realtime::connection::{ConnectError, Connector, LinkEvent, RealtimeLink};
use tapline_realtime::event::{EventKind, TransportEvent};
use tapline_realtime::supervisor::{ConnectionStatus, TransportSupervisor};

/// What the next `open` does.
#[derive(Debug, Clone)]
pub enum Outcome {
    Open,
    Fail(ConnectError),
    /// Never completes; the attempt ends on its timeout.
    Hang,
    /// Opens after the given delay.
    Delayed(Duration),
}

/// Server side of an open fake link.
#[derive(Debug)]
pub struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<LinkEvent>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

/// Connector that plays back a script, then repeats `fallback`.
#[derive(Debug)]
pub struct FakeConnector {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    opens: AtomicUsize,
    servers: Mutex<Vec<ServerEnd>>,
}

impl FakeConnector {
    pub fn new(script: Vec<Outcome>, fallback: Outcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            opens: AtomicUsize::new(0),
            servers: Mutex::new(Vec::new()),
        })
    }

    pub fn always(outcome: Outcome) -> Arc<Self> {
        Self::new(Vec::new(), outcome)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Push a raw frame to the most recently opened link.
    pub fn push_frame(&self, frame: &str) {
        let servers = self.servers.lock().unwrap();
        let server = servers.last().expect("no open link");
        server
            .to_client
            .send(LinkEvent::Frame(frame.to_string()))
            .unwrap();
    }

    /// Close the most recently opened link from the server side.
    pub fn close(&self, reason: &str) {
        let servers = self.servers.lock().unwrap();
        let server = servers.last().expect("no open link");
        server
            .to_client
            .send(LinkEvent::Closed {
                reason: reason.to_string(),
            })
            .unwrap();
    }

    /// Frames the client sent on the most recently opened link.
    pub fn drain_sent(&self) -> Vec<String> {
        let mut servers = self.servers.lock().unwrap();
        let mut sent = Vec::new();
        if let Some(server) = servers.last_mut() {
            while let Ok(frame) = server.from_client.try_recv() {
                sent.push(frame);
            }
        }
        sent
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, _token: &str) -> Result<RealtimeLink, ConnectError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if let Outcome::Delayed(delay) = outcome {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            Outcome::Open | Outcome::Delayed(_) => {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                self.servers.lock().unwrap().push(ServerEnd {
                    to_client: in_tx,
                    from_client: out_rx,
                });
                Ok(RealtimeLink {
                    outbound: out_tx,
                    inbound: in_rx,
                })
            }
            Outcome::Fail(err) => Err(err),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

/// In-memory messaging API.
#[derive(Debug, Default)]
pub struct FakeApi {
    pages: Mutex<HashMap<ConversationId, Vec<MessageRecord>>>,
    pub fetches: AtomicUsize,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub read: Mutex<Vec<MessageId>>,
}

impl FakeApi {
    pub fn set_page(&self, conversation_id: &str, ids: &[&str]) {
        self.pages.lock().unwrap().insert(
            ConversationId::new(conversation_id),
            ids.iter().map(|id| record(id, None)).collect(),
        );
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> AppResult<Vec<MessageRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, request: &SendMessageRequest) -> AppResult<MessageRecord> {
        if request.content.len() > 1000 {
            return Err(AppError::validation("too long"));
        }
        self.sent.lock().unwrap().push(request.clone());
        let mut stored = record("srv-1", Some(request.conversation_id.as_str()));
        stored.content = request.content.clone();
        stored.sender_role = "broker".to_string();
        stored.reply_to = request.reply_to.as_ref().map(|id| id.as_str().to_string());
        Ok(stored)
    }

    async fn mark_read(&self, message_ids: &[MessageId]) -> AppResult<()> {
        self.read.lock().unwrap().extend_from_slice(message_ids);
        Ok(())
    }
}

/// A backend record written by the farmer.
pub fn record(id: &str, conversation_id: Option<&str>) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        conversation_id: conversation_id.map(str::to_string),
        sender_id: "farmer-1".to_string(),
        sender_role: "farmer".to_string(),
        content: format!("about lot 14, message {id}"),
        created_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()),
        status: Some("sent".to_string()),
        reply_to: None,
    }
}

/// `new_message` frame as the backend pushes it.
pub fn new_message_frame(id: &str, conversation_id: &str) -> String {
    serde_json::json!({
        "event": "new_message",
        "data": record(id, Some(conversation_id)),
    })
    .to_string()
}

/// Events seen by a supervisor listener.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<TransportEvent>>>);

impl EventLog {
    pub fn attach(supervisor: &TransportSupervisor) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.0);
        supervisor.subscribe_all(move |event| sink.lock().unwrap().push(event.clone()));
        log
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.0.lock().unwrap().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn transitions(&self) -> Vec<(ConnectionStatus, ConnectionStatus)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TransportEvent::StatusChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn new_message_ids(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TransportEvent::NewMessage(m) => Some(m.id.as_str().to_string()),
                _ => None,
            })
            .collect()
    }
}

pub struct Harness {
    pub supervisor: TransportSupervisor,
    pub connector: Arc<FakeConnector>,
    pub api: Arc<FakeApi>,
    pub store: Arc<MemoryLastSeenStore>,
    pub log: EventLog,
}

impl Harness {
    pub fn new(connector: Arc<FakeConnector>, token: Option<&str>) -> Self {
        let mut config = AppConfig::default();
        config.session.token = token.map(str::to_string);
        Self::with_config(connector, &config)
    }

    pub fn with_config(connector: Arc<FakeConnector>, config: &AppConfig) -> Self {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemoryLastSeenStore::new());
        let supervisor = TransportSupervisor::from_config(
            config,
            connector.clone(),
            api.clone(),
            store.clone(),
        );
        let log = EventLog::attach(&supervisor);

        Self {
            supervisor,
            connector,
            api,
            store,
            log,
        }
    }

    pub fn open(&self, ids: &[&str]) {
        for id in ids {
            self.supervisor.open_conversation(&ConversationId::new(*id));
        }
    }
}

/// Let spawned tasks run without moving the paused clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn conversation_ids(ids: &[&str]) -> Vec<ConversationId> {
    ids.iter().map(|id| ConversationId::new(*id)).collect()
}
