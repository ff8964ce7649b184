//! Websocket connector built on `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::debug;

use super::connector::{ConnectError, Connector, LinkEvent, RealtimeLink};

/// Opens websocket links to the realtime endpoint.
///
/// The bearer credential travels as the `token` query parameter.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for the endpoint at `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Endpoint URL with the credential attached.
    pub fn endpoint(&self, token: &str) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ConnectError::Unsupported(format!("invalid realtime url: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectError::Unsupported(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, token: &str) -> Result<RealtimeLink, ConnectError> {
        let url = self.endpoint(token)?;
        let (stream, _response) = connect_async(url.as_str()).await.map_err(map_ws_error)?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::text(text)).await {
                    debug!(error = %e, "Websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        if in_tx.send(LinkEvent::Frame(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "connection closed".to_string(),
                }
            };
            let _ = in_tx.send(LinkEvent::Closed { reason });
        });

        Ok(RealtimeLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

fn map_ws_error(err: WsError) -> ConnectError {
    match err {
        WsError::Url(e) => ConnectError::Unsupported(e.to_string()),
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                ConnectError::Rejected(format!("handshake refused with HTTP {status}"))
            } else {
                ConnectError::Network(format!("handshake failed with HTTP {status}"))
            }
        }
        other => ConnectError::Network(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_in_query() {
        let connector = WsConnector::new("wss://chat.example.com/realtime?v=2");
        let url = connector.endpoint("abc.def+ghi").unwrap();
        assert_eq!(url.scheme(), "wss");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("v".to_string(), "2".to_string())));
        assert!(pairs.contains(&("token".to_string(), "abc.def+ghi".to_string())));
    }

    #[test]
    fn test_http_scheme_unsupported() {
        let connector = WsConnector::new("https://chat.example.com/realtime");
        assert!(matches!(
            connector.endpoint("t"),
            Err(ConnectError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_port_is_network_error() {
        let connector = WsConnector::new("ws://127.0.0.1:9/realtime");
        let err = connector.open("t").await.unwrap_err();
        assert!(matches!(err, ConnectError::Network(_)));
    }
}
