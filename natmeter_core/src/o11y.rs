use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{Error, Result};

/// Output layout of the log formatter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Reads `NATMETER_LOG_FORMAT` (`json` or `pretty`); filtering follows `RUST_LOG`.
pub fn init_global_from_env() -> Result<()> {
    let format = match std::env::var("NATMETER_LOG_FORMAT") {
        Ok(v) if !v.trim().is_empty() => LogFormat::parse(&v).ok_or_else(|| {
            Error::configuration(format!(
                "NATMETER_LOG_FORMAT must be 'json' or 'pretty', got '{v}'"
            ))
        })?,
        _ => LogFormat::default(),
    };
    init_global(format)
}

pub fn init_global(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .try_init()
        .map_err(|e| Error::BackendMessage(format!("tracing already initialized: {e}")))
}
