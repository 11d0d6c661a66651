//! Outbound message transport
//!
//! Delivery of first prompts, follow-up reminders, and acknowledgment
//! replies. Sends are fire-and-forget at the campaign layer; delivery-level
//! retry is not this crate's concern. Inbound confirmations arrive through
//! the web control plane, not here.

mod http;

pub use http::{HttpTransport, MessageTexts};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::SubscriberId;

/// Transport-related errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Outbound delivery interface consumed by the campaign controller
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver the cycle's first prompt
    async fn send_prompt(&self, id: SubscriberId) -> Result<(), TransportError>;

    /// Deliver a follow-up reminder
    async fn send_reminder(&self, id: SubscriberId) -> Result<(), TransportError>;

    /// Deliver the acknowledgment confirmation
    async fn send_ack(&self, id: SubscriberId) -> Result<(), TransportError>;
}

/// Transport that only logs deliveries.
///
/// Used when no webhook URL is configured, so the daemon can run dry.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send_prompt(&self, id: SubscriberId) -> Result<(), TransportError> {
        info!("[Transport] (dry-run) first prompt -> subscriber {}", id);
        Ok(())
    }

    async fn send_reminder(&self, id: SubscriberId) -> Result<(), TransportError> {
        info!("[Transport] (dry-run) reminder -> subscriber {}", id);
        Ok(())
    }

    async fn send_ack(&self, id: SubscriberId) -> Result<(), TransportError> {
        info!("[Transport] (dry-run) ack confirmation -> subscriber {}", id);
        Ok(())
    }
}
