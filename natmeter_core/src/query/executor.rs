use std::sync::Arc;

use crate::config::QueryTarget;
use crate::models::{ExecutionHandle, RunDate};
use crate::query::traits::{QueryEngine, StartQueryRequest};
use crate::{Error, Result};

/// Submits parameterized queries to the engine.
#[derive(Clone)]
pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
    target: QueryTarget,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn QueryEngine>, target: QueryTarget) -> Self {
        Self { engine, target }
    }

    /// Starts one execution of `query` for `date` and returns its handle without waiting.
    ///
    /// Fails with [`Error::Configuration`] before contacting the engine when the results
    /// bucket, workgroup or database is not configured.
    #[tracing::instrument(level = "info", skip(self, query))]
    pub async fn submit(&self, query: &str, date: &RunDate) -> Result<ExecutionHandle> {
        let request = StartQueryRequest {
            query: query.to_string(),
            database: required(self.target.database.as_deref(), "database")?,
            output_location: self.target.output_location()?,
            workgroup: required(self.target.workgroup.as_deref(), "workgroup")?,
            parameters: date.parameters(),
        };
        let handle = self.engine.start_query(request).await?;
        tracing::info!(execution_id = %handle, "query submitted");
        Ok(handle)
    }
}

fn required(value: Option<&str>, name: &str) -> Result<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::configuration(format!("query {name} is not configured")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedQuery, ScriptedQueryEngine};

    fn target() -> QueryTarget {
        QueryTarget {
            results_bucket: Some("flow-results".to_string()),
            results_prefix: "query-results/".to_string(),
            workgroup: Some("metering".to_string()),
            database: Some("vpc_flow_logs".to_string()),
        }
    }

    #[tokio::test]
    async fn submit_passes_location_workgroup_database_and_date_parameters() {
        let engine = Arc::new(
            ScriptedQueryEngine::new()
                .with_script("SELECT 1", ScriptedQuery::succeeding(vec![vec!["c"]])),
        );
        let executor = QueryExecutor::new(engine.clone(), target());

        let handle = executor
            .submit("SELECT 1", &RunDate::new("2026", "2", "1"))
            .await
            .unwrap();

        assert_eq!(handle.as_str(), "exec-1");
        let started = engine.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].database, "vpc_flow_logs");
        assert_eq!(started[0].workgroup, "metering");
        assert_eq!(started[0].output_location, "s3://flow-results/query-results/");
        assert_eq!(started[0].parameters, vec!["2026", "2", "1"]);
    }

    #[tokio::test]
    async fn missing_identifiers_fail_before_the_engine_is_called() {
        let engine = Arc::new(ScriptedQueryEngine::new());
        for strip in ["bucket", "workgroup", "database"] {
            let mut t = target();
            match strip {
                "bucket" => t.results_bucket = None,
                "workgroup" => t.workgroup = Some("  ".to_string()),
                _ => t.database = None,
            }
            let executor = QueryExecutor::new(engine.clone(), t);
            let err = executor
                .submit("SELECT 1", &RunDate::new("2026", "02", "01"))
                .await
                .unwrap_err();
            assert!(err.is_configuration(), "{strip}: {err}");
        }
        assert!(engine.started().is_empty());
    }
}
