//! REST client for the messaging backend.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use tapline_core::config::ApiConfig;
use tapline_core::error::{AppError, ErrorKind};
use tapline_core::result::AppResult;
use tapline_core::traits::MessageApi;
use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::{MessageRecord, SendMessageRequest};

/// Longest response body excerpt carried in an error message.
const ERROR_BODY_CHARS: usize = 200;

/// `GET /conversations/{id}/messages` returns either a bare list or a
/// wrapper object. Records are decoded one by one, see [`decode_page`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessagesBody {
    List(Vec<Value>),
    Wrapped { messages: Vec<Value> },
}

/// Decode a page record by record.
///
/// A record that cannot be decoded keeps its place as an id-only record when
/// its id is readable, so it still counts as the conversation's newest
/// message. Records without a readable id are dropped.
fn decode_page(conversation_id: &ConversationId, values: Vec<Value>) -> Vec<MessageRecord> {
    values
        .into_iter()
        .filter_map(|value| match MessageRecord::deserialize(&value) {
            Ok(record) if !record.id.trim().is_empty() => Some(record),
            Ok(_) => {
                warn!(conversation_id = %conversation_id, "Dropping message record without id");
                None
            }
            Err(e) => {
                let id = MessageRecord::raw_id(&value).map(str::to_string);
                warn!(
                    conversation_id = %conversation_id,
                    message_id = id.as_deref().unwrap_or("?"),
                    error = %e,
                    "Undecodable message record"
                );
                id.map(MessageRecord::unreadable)
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageBody {
    Wrapped { message: MessageRecord },
    Bare(MessageRecord),
}

/// [`MessageApi`] over HTTP with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpMessageApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpMessageApi {
    /// Build a client for `config.base_url`.
    pub fn new(config: &ApiConfig, token: Option<String>) -> AppResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::configuration(format!("Invalid api.base_url '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::configuration(format!(
                "api.base_url '{}' cannot be used as a base",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// `base_url` extended with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(ERROR_BODY_CHARS).collect();
        let message = format!("Messaging API returned {status}: {excerpt}");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(AppError::authentication(message))
        } else {
            Err(AppError::external_service(message))
        }
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> AppResult<Vec<MessageRecord>> {
        let url = self.endpoint(&["conversations", conversation_id.as_str(), "messages"]);
        debug!(conversation_id = %conversation_id, "Fetching conversation messages");

        let response = self.authorize(self.client.get(url)).send().await?;
        let body: MessagesBody = Self::check(response).await?.json().await?;

        let values = match body {
            MessagesBody::List(values) => values,
            MessagesBody::Wrapped { messages } => messages,
        };
        Ok(decode_page(conversation_id, values))
    }

    async fn send_message(&self, request: &SendMessageRequest) -> AppResult<MessageRecord> {
        let url = self.endpoint(&["messages"]);
        debug!(conversation_id = %request.conversation_id, "Sending message");

        let response = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await?;
        let body: MessageBody = Self::check(response).await?.json().await?;

        Ok(match body {
            MessageBody::Wrapped { message } => message,
            MessageBody::Bare(record) => record,
        })
    }

    async fn mark_read(&self, message_ids: &[MessageId]) -> AppResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let url = self.endpoint(&["messages", "read"]);
        debug!(count = message_ids.len(), "Marking messages as read");

        let response = self
            .authorize(
                self.client
                    .post(url)
                    .json(&serde_json::json!({ "messageIds": message_ids })),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base_url: &str) -> HttpMessageApi {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        HttpMessageApi::new(&config, Some("jwt".into())).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let api = api("http://localhost:5000/api/");
        assert_eq!(
            api.endpoint(&["conversations", "lot 7", "messages"]).as_str(),
            "http://localhost:5000/api/conversations/lot%207/messages"
        );
        assert_eq!(
            api.endpoint(&["messages", "read"]).as_str(),
            "http://localhost:5000/api/messages/read"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        let err = HttpMessageApi::new(&config, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_wrapped_and_bare_bodies() {
        let wrapped: MessagesBody = serde_json::from_str(r#"{"messages":[]}"#).unwrap();
        assert!(matches!(wrapped, MessagesBody::Wrapped { .. }));

        let bare: MessageBody = serde_json::from_str(
            r#"{"id":"m1","senderId":"u1","senderRole":"broker","createdAt":"2024-05-02T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(bare, MessageBody::Bare(_)));
    }

    #[test]
    fn test_decode_page_keeps_unreadable_records_in_place() {
        let page = vec![
            serde_json::json!({"id": "m1", "senderRole": "farmer"}),
            serde_json::json!({"_id": "m2", "createdAt": "last tuesday"}),
            serde_json::json!({"content": "no id"}),
            serde_json::json!(42),
            serde_json::json!({"id": "m3", "senderId": "u1", "senderRole": "broker",
                               "createdAt": "2024-05-02T10:00:00Z"}),
        ];
        let records = decode_page(&ConversationId::new("C1"), page);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(records[1], MessageRecord::unreadable("m2"));
    }
}
