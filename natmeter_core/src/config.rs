use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::models::RunDate;
use crate::plan::DeliveryPlan;
use crate::query::fetcher::MAX_PAGE_SIZE;
use crate::{Error, Result};

/// Where and how queries run. The identifiers stay optional here: their absence is reported
/// when a query is submitted, not when configuration loads.
#[derive(Debug, Clone, Serialize)]
pub struct QueryTarget {
    pub results_bucket: Option<String>,
    pub results_prefix: String,
    pub workgroup: Option<String>,
    pub database: Option<String>,
}

impl QueryTarget {
    /// `s3://{bucket}/{prefix}`
    pub fn output_location(&self) -> Result<String> {
        let bucket = self
            .results_bucket
            .as_deref()
            .map(|b| b.trim().trim_matches('/'))
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::configuration("query results bucket is not configured"))?;
        let prefix = self.results_prefix.trim().trim_start_matches('/');
        Ok(format!("s3://{bucket}/{prefix}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
        }
    }
}

/// Which timestamp events carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTimeMode {
    /// Wall-clock time when the batch is built.
    Now,
    /// Midnight UTC of the run date.
    RunDate,
}

impl EventTimeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "now" => Some(Self::Now),
            "run_date" | "rundate" | "date" => Some(Self::RunDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliverySettings {
    pub timeout: Duration,
    /// Case-insensitive substring of a provider label that marks a "top" class batch.
    pub top_marker: String,
    pub event_time: EventTimeMode,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            top_marker: "top".to_string(),
            event_time: EventTimeMode::Now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunDateMode {
    /// Current UTC date, zero-padded.
    Today,
    Pinned(RunDate),
}

impl RunDateMode {
    pub fn resolve(&self) -> RunDate {
        match self {
            Self::Today => RunDate::today(),
            Self::Pinned(d) => d.clone(),
        }
    }
}

/// Everything one invocation needs, loaded from the environment.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    /// Name of the secret holding the metering API credentials.
    pub secret_name: Option<String>,
    pub target: QueryTarget,
    pub poll: PollSettings,
    pub page_size: i32,
    pub delivery: DeliverySettings,
    pub run_date: RunDateMode,
    pub plan: DeliveryPlan,
}

impl RunConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let parse_u64 = |key: &str| -> Result<Option<u64>> {
            get(&[key])
                .map(|v| {
                    v.parse::<u64>()
                        .map_err(|_| Error::configuration(format!("{key} must be an integer, got '{v}'")))
                })
                .transpose()
        };

        let mut poll = PollSettings::default();
        if let Some(n) = parse_u64("NATMETER_POLL_MAX_ATTEMPTS")? {
            poll.max_attempts = u32::try_from(n)
                .map_err(|_| Error::configuration("NATMETER_POLL_MAX_ATTEMPTS is too large"))?;
        }
        if let Some(ms) = parse_u64("NATMETER_POLL_INTERVAL_MS")? {
            poll.interval = Duration::from_millis(ms);
        }

        let page_size = match parse_u64("NATMETER_PAGE_SIZE")? {
            Some(n) => i32::try_from(n)
                .map_err(|_| Error::configuration("NATMETER_PAGE_SIZE is too large"))?,
            None => MAX_PAGE_SIZE,
        };

        let mut delivery = DeliverySettings::default();
        if let Some(ms) = parse_u64("NATMETER_DELIVERY_TIMEOUT_MS")? {
            delivery.timeout = Duration::from_millis(ms);
        }
        if let Some(marker) = get(&["NATMETER_TOP_MARKER"]) {
            delivery.top_marker = marker;
        }
        if let Some(mode) = get(&["NATMETER_EVENT_TIME"]) {
            delivery.event_time = EventTimeMode::parse(&mode).ok_or_else(|| {
                Error::configuration(format!(
                    "NATMETER_EVENT_TIME must be 'now' or 'run_date', got '{mode}'"
                ))
            })?;
        }

        let run_date = match (
            get(&["NATMETER_RUN_YEAR"]),
            get(&["NATMETER_RUN_MONTH"]),
            get(&["NATMETER_RUN_DAY"]),
        ) {
            (None, None, None) => RunDateMode::Today,
            (Some(y), Some(m), Some(d)) => RunDateMode::Pinned(RunDate::new(y, m, d)),
            _ => {
                return Err(Error::configuration(
                    "NATMETER_RUN_YEAR, NATMETER_RUN_MONTH and NATMETER_RUN_DAY must be set together",
                ));
            }
        };

        let plan = match get(&["NATMETER_PLAN_PATH"]) {
            Some(path) => DeliveryPlan::from_path(&PathBuf::from(path), &lookup)?,
            None => DeliveryPlan::builtin(
                &lookup,
                get(&["NATMETER_PROVIDER_LABEL"]).as_deref(),
            ),
        };

        let cfg = Self {
            secret_name: get(&["NATMETER_SECRET_NAME", "DATAHUB_SECRET_NAME"]),
            target: QueryTarget {
                results_bucket: get(&["NATMETER_RESULTS_BUCKET", "ATHENA_RESULTS_BUCKET"]),
                results_prefix: get(&["NATMETER_RESULTS_PREFIX"])
                    .unwrap_or_else(|| "query-results/".to_string()),
                workgroup: get(&["NATMETER_WORKGROUP", "ATHENA_WORKGROUP"]),
                database: get(&["NATMETER_DATABASE", "ATHENA_DATABASE"]),
            },
            poll,
            page_size,
            delivery,
            run_date,
            plan,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate(&self) -> Result<()> {
        if self.poll.max_attempts == 0 {
            return Err(Error::configuration("poll.max_attempts must be > 0"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::configuration(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.delivery.timeout.is_zero() {
            return Err(Error::configuration("delivery.timeout must be > 0"));
        }
        if self.delivery.top_marker.trim().is_empty() {
            return Err(Error::configuration("delivery.top_marker is empty"));
        }
        if let RunDateMode::Pinned(date) = &self.run_date {
            date.start_of_day()?;
        }
        self.plan.validate()
    }
}
