use std::sync::Arc;

use clap::Parser;
use natmeter_cli::cli::{Cli, Commands, RunArgs, redacted_config};
use natmeter_core::{
    CredentialSource, DeliveryClient, InvocationResponse, Orchestrator, RunConfig,
    StaticCredentialSource,
};
use natmeter_integrations::{AthenaQueryEngine, SecretsManagerCredentialSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    natmeter_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let resp = match run(&args).await {
                Ok(resp) => resp,
                Err(err) => InvocationResponse::failure(err.to_string()),
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
            if !resp.is_success() {
                tracing::error!(status = resp.status_code, "invocation failed");
                std::process::exit(1);
            }
        }
        Commands::Config => {
            let cfg = RunConfig::from_env()?;
            println!("{}", serde_json::to_string_pretty(&redacted_config(&cfg)?)?);
        }
    }
    Ok(())
}

/// Errors returned here happen before the run starts; run failures come back as a response.
async fn run(args: &RunArgs) -> natmeter_core::Result<InvocationResponse> {
    let cfg = args.load_config(|key| std::env::var(key).ok())?;
    let event = args.event()?;

    let shared = natmeter_integrations::load_aws_config(args.region.clone()).await;
    let engine = Arc::new(AthenaQueryEngine::from_config(&shared));
    let credentials: Arc<dyn CredentialSource> = match &args.credentials_file {
        Some(path) => Arc::new(StaticCredentialSource::from_file(path)?),
        None => Arc::new(SecretsManagerCredentialSource::from_config(&shared)),
    };
    let sink = Arc::new(DeliveryClient::new(cfg.delivery.timeout)?);

    let orchestrator = Orchestrator::new(engine, credentials, sink);
    Ok(natmeter_core::invoke(&orchestrator, &cfg, event).await)
}
