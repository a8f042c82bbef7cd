//! Web-service transport seam.
//!
//! The enforcement side calls the decision point's authorization service and
//! the decision side calls each enforcement point's cache clear service. Both
//! exchange opaque signed documents over a [`Transport`].

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;

/// Sends a signed document to an endpoint and returns the signed reply.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post `document` to `endpoint` and return the response body.
    ///
    /// Timeouts are the transport's responsibility.
    async fn send(&self, endpoint: &str, document: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// HTTP transport that POSTs documents as `text/xml`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::connect("", format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Create a transport around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, document: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        tracing::debug!(endpoint, bytes = document.len(), "Sending protocol document");

        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(document)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    TransportError::connect(endpoint, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| TransportError::Body {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        Ok(body.to_vec())
    }
}
