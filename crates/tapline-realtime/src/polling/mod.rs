//! Polling fallback transport and its REST client.

pub mod http;
pub mod transport;

pub use http::HttpMessageApi;
pub use transport::PollingTransport;
