//! HTTP webhook transport
//!
//! POSTs outbound messages as JSON to a configured webhook endpoint. The
//! receiving side (a chat gateway, typically) is responsible for rendering
//! and delivering the message to the subscriber's chat.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{Transport, TransportError};
use crate::SubscriberId;

/// Message texts for the three outbound kinds
#[derive(Debug, Clone)]
pub struct MessageTexts {
    pub prompt: String,
    pub reminder: String,
    pub ack: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMessage<'a> {
    chat_id: SubscriberId,
    kind: &'a str,
    text: &'a str,
}

/// Webhook-backed [`Transport`]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    texts: MessageTexts,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint`
    pub fn new(endpoint: Url, texts: MessageTexts) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            texts,
        })
    }

    async fn post(&self, id: SubscriberId, kind: &str, text: &str) -> Result<(), TransportError> {
        let message = OutboundMessage {
            chat_id: id,
            kind,
            text,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&message)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_prompt(&self, id: SubscriberId) -> Result<(), TransportError> {
        self.post(id, "prompt", &self.texts.prompt).await
    }

    async fn send_reminder(&self, id: SubscriberId) -> Result<(), TransportError> {
        self.post(id, "reminder", &self.texts.reminder).await
    }

    async fn send_ack(&self, id: SubscriberId) -> Result<(), TransportError> {
        self.post(id, "ack", &self.texts.ack).await
    }
}
