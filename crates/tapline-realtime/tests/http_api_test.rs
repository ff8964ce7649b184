//! Integration tests for the REST client against a mock backend.

mod helpers;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tapline_cache::memory::store::MemoryLastSeenStore;
use tapline_core::config::{ApiConfig, PollingConfig};
use tapline_core::error::ErrorKind;
use tapline_core::traits::{LastSeenStore, MessageApi};
use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::SendMessageRequest;
use tapline_realtime::event::{EventKind, TransportEvent};
use tapline_realtime::metrics::TransportMetrics;
use tapline_realtime::polling::{HttpMessageApi, PollingTransport};

use helpers::record;

fn client(server: &MockServer) -> HttpMessageApi {
    let config = ApiConfig {
        base_url: format!("{}/api", server.uri()),
        ..Default::default()
    };
    HttpMessageApi::new(&config, Some("jwt".to_string())).unwrap()
}

#[tokio::test]
async fn test_fetch_messages_accepts_wrapped_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C1/messages"))
        .and(header("authorization", "Bearer jwt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "messages": [record("m1", None), record("m2", None)] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let records = client(&server)
        .fetch_messages(&ConversationId::new("C1"))
        .await
        .unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[tokio::test]
async fn test_fetch_messages_accepts_bare_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record("m1", None)])))
        .mount(&server)
        .await;

    let records = client(&server)
        .fetch_messages(&ConversationId::new("C1"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_send_message_posts_camel_case_body() {
    let server = MockServer::start().await;
    let mut stored = record("srv-9", Some("C1"));
    stored.content = "40 bags at 1200".to_string();
    Mock::given(method("POST"))
        .and(path("/api/messages"))
        .and(header("authorization", "Bearer jwt"))
        .and(body_json(json!({ "conversationId": "C1", "content": "40 bags at 1200" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "message": stored })))
        .expect(1)
        .mount(&server)
        .await;

    let request = SendMessageRequest {
        conversation_id: ConversationId::new("C1"),
        content: "40 bags at 1200".to_string(),
        reply_to: None,
    };
    let created = client(&server).send_message(&request).await.unwrap();
    assert_eq!(created.id, "srv-9");
}

#[tokio::test]
async fn test_mark_read_posts_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/read"))
        .and(body_json(json!({ "messageIds": ["m1", "m2"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .mark_read(&[MessageId::new("m1"), MessageId::new("m2")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C2/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = client(&server);
    let auth = api
        .fetch_messages(&ConversationId::new("C1"))
        .await
        .unwrap_err();
    assert_eq!(auth.kind, ErrorKind::Authentication);
    assert!(auth.message.contains("token expired"));

    let unavailable = api
        .fetch_messages(&ConversationId::new("C2"))
        .await
        .unwrap_err();
    assert_eq!(unavailable.kind, ErrorKind::ExternalService);
}

#[tokio::test]
async fn test_polling_over_http_announces_newest_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([record("m1", None), record("m2", None)])),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryLastSeenStore::new());
    let polling = PollingTransport::new(
        &PollingConfig::default(),
        Arc::new(client(&server)),
        store.clone(),
        Arc::new(TransportMetrics::new()),
    );
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    polling.subscribe_all(move |e| sink.lock().unwrap().push(e.clone()));

    let c1 = ConversationId::new("C1");
    assert!(polling.poll_once(&c1).await.unwrap());
    assert!(!polling.poll_once(&c1).await.unwrap());

    let events = seen.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], TransportEvent::NewMessage(m) if m.id.as_str() == "m2"));
    assert_eq!(store.get(&c1).await.unwrap(), Some(MessageId::new("m2")));
}

fn polling_over(server: &MockServer, store: Arc<MemoryLastSeenStore>) -> PollingTransport {
    PollingTransport::new(
        &PollingConfig::default(),
        Arc::new(client(server)),
        store,
        Arc::new(TransportMetrics::new()),
    )
}

#[tokio::test]
async fn test_incomplete_older_record_does_not_block_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "m1", "content": "imported from the old board" },
            record("m2", None),
        ])))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryLastSeenStore::new());
    let polling = polling_over(&server, store.clone());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    polling.subscribe(EventKind::NewMessage, move |e| sink.lock().unwrap().push(e.clone()));

    let c1 = ConversationId::new("C1");
    assert!(polling.poll_once(&c1).await.unwrap());
    let events = seen.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], TransportEvent::NewMessage(m) if m.id.as_str() == "m2"));
    assert_eq!(store.get(&c1).await.unwrap(), Some(MessageId::new("m2")));
}

#[tokio::test]
async fn test_undecodable_newest_record_still_advances_last_seen() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/C1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [
            record("m1", None),
            { "id": "m2", "senderId": "u1", "senderRole": "broker", "createdAt": 1714644000 },
        ]})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryLastSeenStore::new());
    let polling = polling_over(&server, store.clone());
    let c1 = ConversationId::new("C1");

    assert!(!polling.poll_once(&c1).await.unwrap());
    assert_eq!(store.get(&c1).await.unwrap(), Some(MessageId::new("m2")));
    assert!(!polling.poll_once(&c1).await.unwrap());
}

