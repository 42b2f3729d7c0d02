use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use natmeter_core::{Error, RunConfig};

#[derive(Debug, Parser)]
#[command(name = "natmeter", version, about = "NAT gateway flow usage metering")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run every configured query and deliver the batches (default if no subcommand given).
    Run(RunArgs),

    /// Print the resolved configuration (query text redacted).
    Config,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Delivery plan file (YAML/JSON); overrides NATMETER_PLAN_PATH.
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Pin the run date; year, month and day must be given together.
    #[arg(long, requires_all = ["month", "day"])]
    pub year: Option<String>,
    #[arg(long, requires_all = ["year", "day"])]
    pub month: Option<String>,
    #[arg(long, requires_all = ["year", "month"])]
    pub day: Option<String>,

    /// Invocation event as JSON. Accepted and ignored by the run.
    #[arg(long)]
    pub event: Option<String>,

    /// Read credentials from a local JSON file instead of Secrets Manager.
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// AWS region override.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,
}

impl RunArgs {
    /// Loads the run config with command-line values taking precedence over `lookup`.
    pub fn load_config<F>(&self, lookup: F) -> natmeter_core::Result<RunConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let date_given = self.year.is_some() || self.month.is_some() || self.day.is_some();
        RunConfig::from_lookup(|key| match key {
            "NATMETER_PLAN_PATH" => self
                .plan
                .as_ref()
                .map(|p| p.display().to_string())
                .or_else(|| lookup(key)),
            "NATMETER_RUN_YEAR" if date_given => self.year.clone(),
            "NATMETER_RUN_MONTH" if date_given => self.month.clone(),
            "NATMETER_RUN_DAY" if date_given => self.day.clone(),
            _ => lookup(key),
        })
    }

    pub fn event(&self) -> natmeter_core::Result<Option<serde_json::Value>> {
        self.event
            .as_deref()
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| Error::configuration(format!("--event is not valid JSON: {e}")))
            })
            .transpose()
    }
}

/// Config as JSON with every query text replaced by `<set>` or `<unset>`.
pub fn redacted_config(cfg: &RunConfig) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(cfg)?;
    if let Some(variants) = value
        .pointer_mut("/plan/variants")
        .and_then(|v| v.as_array_mut())
    {
        for variant in variants {
            if let Some(query) = variant.get_mut("query") {
                let set = query.as_str().is_some_and(|q| !q.is_empty());
                *query = serde_json::Value::from(if set { "<set>" } else { "<unset>" });
            }
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use natmeter_core::{RunDate, RunDateMode};

    fn env() -> HashMap<&'static str, &'static str> {
        [
            ("PUBLIC_IP_QUERY", "SELECT secret_columns FROM public"),
            ("PRIVATE_IP_QUERY", "SELECT secret_columns FROM private"),
            ("NATMETER_RUN_YEAR", "2025"),
            ("NATMETER_RUN_MONTH", "12"),
            ("NATMETER_RUN_DAY", "31"),
        ]
        .into_iter()
        .collect()
    }

    fn load(args: &RunArgs) -> natmeter_core::Result<RunConfig> {
        let vars = env();
        args.load_config(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn cli_parses_run_with_pinned_date() {
        let cli = Cli::try_parse_from([
            "natmeter", "run", "--year", "2026", "--month", "2", "--day", "1", "--event", "{}",
        ])
        .unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        let cfg = load(&args).unwrap();
        assert_eq!(
            cfg.run_date,
            RunDateMode::Pinned(RunDate::new("2026", "2", "1"))
        );
        assert_eq!(args.event().unwrap(), Some(serde_json::json!({})));
    }

    #[test]
    fn environment_date_applies_without_flags() {
        let cfg = load(&RunArgs::default()).unwrap();
        assert_eq!(
            cfg.run_date,
            RunDateMode::Pinned(RunDate::new("2025", "12", "31"))
        );
    }

    #[test]
    fn partial_date_is_rejected() {
        assert!(Cli::try_parse_from(["natmeter", "run", "--year", "2026"]).is_err());

        let args = RunArgs {
            year: Some("2026".to_string()),
            ..RunArgs::default()
        };
        assert!(load(&args).unwrap_err().is_configuration());
    }

    #[test]
    fn missing_plan_file_is_a_configuration_error() {
        let args = RunArgs {
            plan: Some(PathBuf::from("/nonexistent/natmeter-plan.yaml")),
            ..RunArgs::default()
        };
        let err = load(&args).unwrap_err();
        assert!(err.to_string().contains("natmeter-plan.yaml"), "{err}");
    }

    #[test]
    fn bad_event_json_is_a_configuration_error() {
        let args = RunArgs {
            event: Some("not json".to_string()),
            ..RunArgs::default()
        };
        assert!(args.event().unwrap_err().is_configuration());
    }

    #[test]
    fn config_output_hides_query_text() {
        let cfg = load(&RunArgs::default()).unwrap();
        let out = redacted_config(&cfg).unwrap();
        let text = out.to_string();
        assert!(!text.contains("secret_columns"), "{text}");
        assert_eq!(out["plan"]["variants"][0]["query"], "<set>");
        assert_eq!(out["plan"]["variants"][0]["id"], "public");
    }
}
