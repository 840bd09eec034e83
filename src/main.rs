use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workload_orchestrator::{
    config::Config,
    executor::ProcessExecutor,
    job_scheduling::{InMemorySubstrate, JobRunner, JobState, OrchestrationApi, WorkloadJobHandler},
    models::{WorkloadExecutionRequest, WorkloadParameters, WorkloadType},
    pipeline::{PipelineCompiler, loader},
};

#[derive(Parser)]
#[command(name = "workload-orchestrator")]
#[command(version)]
#[command(about = "Runs workload executables immediately, on cron schedules, or as pipelines")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $CONFIG_FILE, then orchestrator.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Directory holding the workload executables (overrides config file)
    #[arg(long, value_name = "DIR", global = true)]
    executables_dir: Option<PathBuf>,

    /// Per-run timeout such as "90s" or "2h" (overrides config file)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration, global = true)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one workload in the foreground and print its result
    Run {
        /// Workload type, e.g. DataExport
        workload: String,

        /// Parameter as KEY=VALUE; VALUE is parsed as JSON when possible
        #[arg(
            short = 'p',
            long = "param",
            value_name = "KEY=VALUE",
            value_parser = parse_parameter
        )]
        params: Vec<(String, Value)>,
    },
    /// Run a pipeline file (TOML or JSON) to completion
    Pipeline { file: PathBuf },
    /// Print the jobs a pipeline file compiles into without running anything
    Plan { file: PathBuf },
    /// List workload types and whether their executables are present
    List,
    /// Run recurring jobs from the configuration until Ctrl-C
    Serve,
}

fn parse_parameter(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name missing in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_logging(log_level: &str, format: LogFormat) {
    let log_filter = format!("workload_orchestrator={log_level}");
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()),
    );

    // stdout is reserved for command output
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    if let Some(dir) = &cli.executables_dir {
        config.executor.executables_dir = dir.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.executor.timeout = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    info!("Starting workload orchestrator v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config(&cli)?;
    let executor = ProcessExecutor::from_config(&config.executor);
    info!(
        "Executables directory: {}, timeout: {}",
        executor.executables_dir().display(),
        humantime::format_duration(executor.timeout())
    );

    match cli.command {
        Commands::Run { workload, params } => run_workload(&executor, &workload, params).await,
        Commands::Pipeline { file } => run_pipeline(&config, executor, &file).await,
        Commands::Plan { file } => plan_pipeline(&config, &file).await,
        Commands::List => list_workloads(&executor),
        Commands::Serve => serve(&config, executor).await,
    }
}

async fn run_workload(
    executor: &ProcessExecutor,
    workload: &str,
    params: Vec<(String, Value)>,
) -> Result<()> {
    let parameters: WorkloadParameters = params.into_iter().collect();
    let parameters = (!parameters.is_empty()).then_some(parameters);

    match executor.execute_by_name(workload, parameters.as_ref()).await {
        Ok(result) => print_json(&result),
        Err(e) => {
            if let Some(result) = e.result() {
                print_json(result)?;
            }
            Err(e.into())
        }
    }
}

async fn run_pipeline(config: &Config, executor: ProcessExecutor, file: &Path) -> Result<()> {
    let request = loader::load_request(file).await?;
    let substrate = Arc::new(InMemorySubstrate::new());
    let api = OrchestrationApi::new(substrate.clone(), config.pipeline.continue_on_error);

    let receipt = api.submit_pipeline(&request).await?;
    info!(
        "Pipeline '{}' ({}) submitted, entry job {}",
        receipt.pipeline_name, receipt.pipeline_id, receipt.entry_job_id
    );

    let handler = Arc::new(WorkloadJobHandler::new(executor));
    let runner = JobRunner::new(substrate.clone(), handler, config.runner.clone());
    runner.run_until_idle().await;

    let mut jobs = Vec::new();
    let mut failed = 0;
    for job_id in substrate.job_ids().await {
        let status = api.status(&job_id).await;
        if status.status != JobState::Succeeded.as_ref() {
            failed += 1;
        }
        let callback = substrate
            .callback(&job_id)
            .await
            .map(|callback| callback.to_string());
        jobs.push(json!({
            "job": callback,
            "status": status,
        }));
    }
    print_json(&json!({ "pipeline": receipt, "jobs": jobs }))?;

    if failed > 0 {
        bail!(
            "pipeline '{}' did not complete: {} of {} jobs did not succeed",
            receipt.pipeline_name,
            failed,
            jobs.len()
        );
    }
    Ok(())
}

async fn plan_pipeline(config: &Config, file: &Path) -> Result<()> {
    let request = loader::load_request(file).await?;
    let compiler = PipelineCompiler::new(
        Arc::new(InMemorySubstrate::new()),
        config.pipeline.continue_on_error,
    );
    let plan = compiler
        .plan(&request)
        .with_context(|| format!("cannot plan {}", file.display()))?;
    print_json(&plan)
}

fn list_workloads(executor: &ProcessExecutor) -> Result<()> {
    println!("{:<24} {:<10} PATH", "WORKLOAD", "AVAILABLE");
    for workload in WorkloadType::iter() {
        let path = executor.resolve_path(workload)?;
        println!(
            "{:<24} {:<10} {}",
            workload.as_ref(),
            if executor.is_available(workload) { "yes" } else { "no" },
            path.display()
        );
    }
    Ok(())
}

async fn serve(config: &Config, executor: ProcessExecutor) -> Result<()> {
    let substrate = Arc::new(InMemorySubstrate::new());
    let api = OrchestrationApi::new(substrate.clone(), config.pipeline.continue_on_error);

    for recurring in &config.recurring {
        let mut request = WorkloadExecutionRequest::recurring(
            recurring.workload_type,
            recurring.id.clone(),
            recurring.cron_expression.clone(),
        );
        request.parameters = recurring.parameters.clone();
        let receipt = api.submit(&request).await?;
        info!(
            "Recurring job '{}' ({}) next runs at {:?}",
            recurring.id, recurring.workload_type, receipt.scheduled_at
        );
    }
    if config.recurring.is_empty() {
        info!("No recurring jobs configured; runner will stay idle");
    }

    let handler = Arc::new(WorkloadJobHandler::new(executor));
    let runner = Arc::new(JobRunner::new(
        substrate.clone(),
        handler,
        config.runner.clone(),
    ));
    let cancellation_token = CancellationToken::new();

    let runner_task = {
        let runner = runner.clone();
        let token = cancellation_token.clone();
        tokio::spawn(async move { runner.run(token).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");
    cancellation_token.cancel();

    match runner_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Job runner stopped with error: {}", e),
        Err(e) => error!("Job runner task panicked: {}", e),
    }

    let stats = substrate.stats().await;
    info!(
        "Final job counts: succeeded={}, failed={}, deleted={}, still pending={}",
        stats.succeeded,
        stats.failed,
        stats.deleted,
        stats.enqueued + stats.scheduled + stats.awaiting + stats.processing
    );
    Ok(())
}
