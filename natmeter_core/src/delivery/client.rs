use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;

use crate::delivery::EndpointConfig;
use crate::delivery::traits::{DeliveryOutcome, EventSink};
use crate::events::models::{DeliveryBatch, EventRecord};
use crate::{Error, Result};

const RESPONSE_EXCERPT_CHARS: usize = 500;

#[derive(Serialize)]
struct EventsPayload<'a> {
    events: &'a [EventRecord],
}

/// Posts batches to the metering API over HTTPS.
#[derive(Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl DeliveryClient {
    #[tracing::instrument(level = "debug")]
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("natmeter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::backend_reqwest)?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl EventSink for DeliveryClient {
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(provider = %batch.provider, url = %endpoint.api_url)
    )]
    async fn deliver(
        &self,
        batch: &DeliveryBatch,
        endpoint: &EndpointConfig,
    ) -> Result<DeliveryOutcome> {
        let body = serde_json::to_vec(&EventsPayload {
            events: &batch.events,
        })
        .map_err(|e| Error::backend("serialize events payload", e))?;
        tracing::info!(
            events = batch.events.len(),
            payload_bytes = body.len(),
            "sending events"
        );

        let resp = self
            .client
            .post(&endpoint.api_url)
            .query(&[("customerContext", endpoint.customer_context.as_str())])
            .timeout(self.timeout)
            .bearer_auth(&endpoint.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(Error::backend_reqwest)?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(Error::backend_reqwest)?;
        let response_excerpt: String = text.chars().take(RESPONSE_EXCERPT_CHARS).collect();
        tracing::info!(status, response = %response_excerpt, "metering API responded");

        if !matches!(status, 200 | 201 | 202) {
            return Err(Error::Delivery { status, body: text });
        }
        Ok(DeliveryOutcome {
            status,
            event_count: batch.events.len(),
            response_excerpt,
        })
    }
}
