use async_trait::async_trait;

use crate::Result;
use crate::delivery::EndpointConfig;
use crate::events::models::DeliveryBatch;

/// An accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: u16,
    pub event_count: usize,
    /// First 500 characters of the response body.
    pub response_excerpt: String,
}

/// Destination for built batches.
///
/// Implementations return `Error::Delivery` for any response other than 200, 201 or 202 and
/// do not retry.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(
        &self,
        batch: &DeliveryBatch,
        endpoint: &EndpointConfig,
    ) -> Result<DeliveryOutcome>;
}
