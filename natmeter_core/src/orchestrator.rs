//! One metering run: credentials, every declared query variant in order, then every delivery
//! batch in order. The first failure ends the run; nothing is delivered after it.

use std::sync::Arc;

use serde::Serialize;

use crate::config::RunConfig;
use crate::credentials::CredentialSource;
use crate::delivery::{EndpointConfig, EventSink};
use crate::events::EventBatcher;
use crate::models::{ExecutionStatus, QueryVariant, RunDate, VariantResult};
use crate::query::{CompletionPoller, QueryEngine, QueryExecutor, ResultFetcher};
use crate::{Error, Result};

/// Run states, logged on every transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunStage {
    Init,
    CredentialsLoaded,
    Submitted,
    Polling,
    Fetched,
    Mapped,
    Batched,
    Delivered,
    Done,
    Error,
}

impl RunStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::CredentialsLoaded => "CREDENTIALS_LOADED",
            Self::Submitted => "SUBMITTED",
            Self::Polling => "POLLING",
            Self::Fetched => "FETCHED",
            Self::Mapped => "MAPPED",
            Self::Batched => "BATCHED",
            Self::Delivered => "DELIVERED",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSummary {
    pub variant: String,
    pub title: String,
    pub row_count: usize,
    pub query_execution_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub provider: String,
    pub variants: Vec<String>,
    pub event_count: usize,
    pub skipped_rows: usize,
}

/// Built only when every variant ran and every batch was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub date: String,
    pub variants: Vec<VariantSummary>,
    pub batches: Vec<BatchSummary>,
}

/// Drives a run against injected collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn QueryEngine>,
    credentials: Arc<dyn CredentialSource>,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        credentials: Arc<dyn CredentialSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            engine,
            credentials,
            sink,
        }
    }

    #[tracing::instrument(level = "info", name = "natmeter.run", skip_all, fields(date = %date))]
    pub async fn run(&self, cfg: &RunConfig, date: &RunDate) -> Result<RunSummary> {
        stage(RunStage::Init, None);
        match self.run_stages(cfg, date).await {
            Ok(summary) => {
                stage(RunStage::Done, None);
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(stage = RunStage::Error.as_str(), error = %err, "run failed");
                Err(err)
            }
        }
    }

    async fn run_stages(&self, cfg: &RunConfig, date: &RunDate) -> Result<RunSummary> {
        let endpoint = self.load_endpoint(cfg).await?;
        stage(RunStage::CredentialsLoaded, None);

        let executor = QueryExecutor::new(self.engine.clone(), cfg.target.clone());
        let poller = CompletionPoller::new(self.engine.clone(), cfg.poll);
        let fetcher = ResultFetcher::new(self.engine.clone(), cfg.page_size);

        let mut results = Vec::with_capacity(cfg.plan.variants.len());
        for variant in &cfg.plan.variants {
            let result = run_variant(&executor, &poller, &fetcher, variant, date).await?;
            results.push(result);
        }

        let batcher = EventBatcher::from_settings(&cfg.delivery);
        let mut batches = Vec::with_capacity(cfg.plan.batches.len());
        for spec in &cfg.plan.batches {
            let members = spec
                .variants
                .iter()
                .map(|id| {
                    results.iter().find(|r| &r.variant == id).ok_or_else(|| {
                        Error::configuration(format!(
                            "batch '{}' references unknown variant '{id}'",
                            spec.provider
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let batch = batcher.build_batch(&members, &spec.provider, spec.metrics, date)?;
            stage(RunStage::Mapped, Some(&spec.provider));
            stage(RunStage::Batched, Some(&spec.provider));

            let outcome = self.sink.deliver(&batch, &endpoint).await?;
            tracing::info!(
                stage = RunStage::Delivered.as_str(),
                provider = %batch.provider,
                status = outcome.status,
                events = outcome.event_count,
                "batch delivered"
            );

            batches.push(BatchSummary {
                provider: batch.provider,
                variants: batch.variants,
                event_count: outcome.event_count,
                skipped_rows: batch.skipped_rows,
            });
        }

        Ok(RunSummary {
            date: date.label(),
            variants: results
                .into_iter()
                .map(|r| VariantSummary {
                    row_count: r.result.row_count(),
                    query_execution_id: r.execution.0,
                    variant: r.variant,
                    title: r.title,
                })
                .collect(),
            batches,
        })
    }

    async fn load_endpoint(&self, cfg: &RunConfig) -> Result<EndpointConfig> {
        let secret_name = cfg
            .secret_name
            .as_deref()
            .ok_or_else(|| Error::configuration("credential secret name is not configured"))?;
        let secret = self.credentials.fetch(secret_name).await?;
        EndpointConfig::from_secret(&secret)
    }
}

#[tracing::instrument(level = "info", skip_all, fields(variant = %variant.id))]
async fn run_variant(
    executor: &QueryExecutor,
    poller: &CompletionPoller,
    fetcher: &ResultFetcher,
    variant: &QueryVariant,
    date: &RunDate,
) -> Result<VariantResult> {
    tracing::info!(title = %variant.title, date = %date, "running query");

    let handle = executor.submit(&variant.query, date).await?;
    stage(RunStage::Submitted, Some(&variant.id));

    stage(RunStage::Polling, Some(&variant.id));
    let status = poller.await_completion(&handle).await?;
    if status != ExecutionStatus::Succeeded {
        return Err(Error::QueryFailed {
            execution_id: handle.to_string(),
            status,
        });
    }

    let result = fetcher.fetch_all(&handle).await?;
    stage(RunStage::Fetched, Some(&variant.id));
    tracing::info!(
        title = %variant.title,
        execution_id = %handle,
        rows = result.row_count(),
        "query results fetched"
    );

    Ok(VariantResult {
        variant: variant.id.clone(),
        title: variant.title.clone(),
        execution: handle,
        result,
    })
}

fn stage(stage: RunStage, subject: Option<&str>) {
    match subject {
        Some(subject) => tracing::debug!(stage = stage.as_str(), subject, "run stage"),
        None => tracing::info!(stage = stage.as_str(), "run stage"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{DeliverySettings, PollSettings, QueryTarget, RunDateMode};
    use crate::credentials::StaticCredentialSource;
    use crate::events::MetricsShape;
    use crate::plan::{BatchSpec, DeliveryPlan};
    use crate::test_support::{RecordingSink, ScriptedQuery, ScriptedQueryEngine};

    const HEADER: &[&str] = &[
        "account_id",
        "srcaddr",
        "flow_direction",
        "nat_gateway_id",
        "availability_zone",
        "usage_gb",
        "cost_usd",
    ];

    fn rows(data: Vec<Vec<&'static str>>) -> Vec<Vec<&'static str>> {
        let mut all = vec![HEADER.to_vec()];
        all.extend(data);
        all
    }

    fn plan(batches: Vec<(&str, Vec<&str>)>) -> DeliveryPlan {
        let lookup = |k: &str| match k {
            "PUBLIC_IP_QUERY" => Some("SELECT public".to_string()),
            "PRIVATE_IP_QUERY" => Some("SELECT private".to_string()),
            _ => None,
        };
        let mut plan = DeliveryPlan::builtin(&lookup, None);
        plan.batches = batches
            .into_iter()
            .map(|(provider, variants)| BatchSpec {
                provider: provider.to_string(),
                variants: variants.into_iter().map(str::to_string).collect(),
                metrics: MetricsShape::Flat,
            })
            .collect();
        plan
    }

    fn config(plan: DeliveryPlan) -> RunConfig {
        RunConfig {
            secret_name: Some("metering/api".to_string()),
            target: QueryTarget {
                results_bucket: Some("flow-results".to_string()),
                results_prefix: "query-results/".to_string(),
                workgroup: Some("metering".to_string()),
                database: Some("vpc_flow_logs".to_string()),
            },
            poll: PollSettings {
                max_attempts: 5,
                interval: Duration::ZERO,
            },
            page_size: 1000,
            delivery: DeliverySettings::default(),
            run_date: RunDateMode::Pinned(RunDate::new("2026", "2", "1")),
            plan,
        }
    }

    fn credentials() -> Arc<StaticCredentialSource> {
        Arc::new(StaticCredentialSource::new(serde_json::json!({
            "api_url": "https://metering.example.com/v1/events",
            "api_key": "k",
            "customer_context": "acme"
        })))
    }

    fn engine() -> ScriptedQueryEngine {
        ScriptedQueryEngine::new()
            .with_script(
                "SELECT public",
                ScriptedQuery::succeeding(rows(vec![vec![
                    "111111111111",
                    "10.0.0.5",
                    "INGRESS",
                    "nat-abc",
                    "us-east-1a",
                    "2.5",
                    "0.10",
                ]])),
            )
            .with_script(
                "SELECT private",
                ScriptedQuery::succeeding(rows(vec![
                    vec!["111111111111", "10.1.0.1", "EGRESS", "nat-abc", "us-east-1a", "1", "0.05"],
                    vec!["111111111111", "10.1.0.2", "EGRESS", "nat-abc", "us-east-1a"],
                ])),
            )
    }

    fn date() -> RunDate {
        RunDate::new("2026", "2", "1")
    }

    #[tokio::test]
    async fn runs_variants_in_order_and_delivers_one_merged_batch() {
        let engine = Arc::new(engine());
        let sink = Arc::new(RecordingSink::accepting());
        let orch = Orchestrator::new(engine.clone(), credentials(), sink.clone());

        let cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        let summary = orch.run(&cfg, &date()).await.unwrap();

        let started = engine.started();
        assert_eq!(started.len(), 2);
        assert_eq!(started[0].query, "SELECT public");
        assert_eq!(started[0].parameters, vec!["2026", "2", "1"]);
        assert_eq!(started[0].output_location, "s3://flow-results/query-results/");
        assert_eq!(started[1].query, "SELECT private");

        assert_eq!(summary.date, "2026-2-1");
        assert_eq!(summary.variants[0].variant, "public");
        assert_eq!(summary.variants[0].row_count, 1);
        assert_eq!(summary.variants[0].query_execution_id, "exec-1");
        assert_eq!(summary.variants[1].row_count, 2);
        assert_eq!(summary.variants[1].query_execution_id, "exec-2");
        assert_eq!(
            summary.batches,
            vec![BatchSummary {
                provider: "NAT Gateway usage".to_string(),
                variants: vec!["public".to_string(), "private".to_string()],
                event_count: 3,
                skipped_rows: 0,
            }]
        );

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].events[0].dimension("source_ip"), Some("10.0.0.5"));
        assert_eq!(delivered[0].events[2].dimension("source_ip"), Some("10.1.0.2"));
    }

    #[tokio::test]
    async fn rejected_delivery_stops_before_next_batch() {
        let sink = Arc::new(RecordingSink::answering(vec![403]));
        let orch = Orchestrator::new(Arc::new(engine()), credentials(), sink.clone());

        let cfg = config(plan(vec![
            ("NAT Gateway public", vec!["public"]),
            ("NAT Gateway private", vec!["private"]),
        ]));
        let err = orch.run(&cfg, &date()).await.unwrap_err();

        assert!(matches!(err, Error::Delivery { status: 403, .. }), "{err}");
        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].provider, "NAT Gateway public");
    }

    #[tokio::test]
    async fn poll_timeout_aborts_before_delivery() {
        let engine = engine().with_script(
            "SELECT private",
            ScriptedQuery {
                statuses: vec![ExecutionStatus::Running],
                pages: vec![],
            },
        );
        let engine = Arc::new(engine);
        let sink = Arc::new(RecordingSink::accepting());
        let orch = Orchestrator::new(engine.clone(), credentials(), sink.clone());

        let cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        let err = orch.run(&cfg, &date()).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { attempts: 5, .. }), "{err}");
        assert_eq!(engine.status_polls("exec-2"), 5);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn failed_query_aborts_the_run() {
        let engine = engine().with_script(
            "SELECT public",
            ScriptedQuery {
                statuses: vec![ExecutionStatus::Running, ExecutionStatus::Failed],
                pages: vec![],
            },
        );
        let engine = Arc::new(engine);
        let sink = Arc::new(RecordingSink::accepting());
        let orch = Orchestrator::new(engine.clone(), credentials(), sink.clone());

        let cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        let err = orch.run(&cfg, &date()).await.unwrap_err();

        match err {
            Error::QueryFailed { execution_id, status } => {
                assert_eq!(execution_id, "exec-1");
                assert_eq!(status, ExecutionStatus::Failed);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(engine.started().len(), 1);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_aborts_the_run() {
        let engine = engine().with_script(
            "SELECT private",
            ScriptedQuery {
                statuses: vec![ExecutionStatus::Succeeded],
                pages: vec![
                    Ok(crate::test_support::owned(rows(vec![]))),
                    Err("throttled".to_string()),
                ],
            },
        );
        let sink = Arc::new(RecordingSink::accepting());
        let orch = Orchestrator::new(Arc::new(engine), credentials(), sink.clone());

        let cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        let err = orch.run(&cfg, &date()).await.unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }), "{err}");
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn divergent_headers_in_one_batch_abort_the_run() {
        let engine = engine().with_script(
            "SELECT private",
            ScriptedQuery::succeeding(vec![vec!["account_id", "dstaddr"], vec!["1", "52.0.0.1"]]),
        );
        let sink = Arc::new(RecordingSink::accepting());
        let orch = Orchestrator::new(Arc::new(engine), credentials(), sink.clone());

        let cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        let err = orch.run(&cfg, &date()).await.unwrap_err();

        assert!(matches!(err, Error::HeaderMismatch { ref variant, .. } if variant == "private"), "{err}");
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn credentials_are_checked_before_any_query() {
        let engine = Arc::new(engine());
        let sink = Arc::new(RecordingSink::accepting());

        let mut cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        cfg.secret_name = None;
        let orch = Orchestrator::new(engine.clone(), credentials(), sink.clone());
        assert!(orch.run(&cfg, &date()).await.unwrap_err().is_configuration());

        let cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        let incomplete = Arc::new(StaticCredentialSource::new(serde_json::json!({
            "api_url": "https://metering.example.com/v1/events",
            "api_key": "k"
        })));
        let orch = Orchestrator::new(engine.clone(), incomplete, sink.clone());
        let err = orch.run(&cfg, &date()).await.unwrap_err();
        assert!(err.to_string().contains("customer_context"), "{err}");

        assert!(engine.started().is_empty());
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn missing_query_target_is_a_configuration_error() {
        let engine = Arc::new(engine());
        let orch = Orchestrator::new(
            engine.clone(),
            credentials(),
            Arc::new(RecordingSink::accepting()),
        );
        let mut cfg = config(plan(vec![("NAT Gateway usage", vec!["public", "private"])]));
        cfg.target.workgroup = None;

        let err = orch.run(&cfg, &date()).await.unwrap_err();
        assert!(err.is_configuration(), "{err}");
        assert!(engine.started().is_empty());
    }
}
