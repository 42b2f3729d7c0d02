//! Invocation boundary: one run in, one status-coded response out.

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::orchestrator::{Orchestrator, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON document, serialized.
    pub body: String,
}

impl InvocationResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    fn success(summary: &RunSummary) -> Self {
        let body = serde_json::json!({
            "message": "NAT gateway usage delivered to the metering API",
            "date": summary.date,
            "variants": summary.variants,
            "batches": summary.batches,
        });
        Self {
            status_code: 200,
            body: body.to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            status_code: 500,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }
}

/// Runs once for the configured date. The invocation event carries nothing the run uses.
#[tracing::instrument(level = "info", name = "natmeter.invoke", skip_all)]
pub async fn invoke(
    orchestrator: &Orchestrator,
    cfg: &RunConfig,
    event: Option<serde_json::Value>,
) -> InvocationResponse {
    if let Some(event) = &event {
        tracing::debug!(%event, "ignoring invocation event");
    }

    let date = cfg.run_date.resolve();
    match orchestrator.run(cfg, &date).await {
        Ok(summary) => InvocationResponse::success(&summary),
        Err(err) => InvocationResponse::failure(err.to_string()),
    }
}
