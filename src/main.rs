mod cli;

use clap::Parser;
use cli::{BatchArgs, CheckArgs, Cli, Commands, RunArgs};
use pagefetch::batch::{self, Batch, BatchReport, BatchRunner, BatchStatus};
use pagefetch::config::Config;
use pagefetch::model::ChapterManifest;
use pagefetch::observability::Metrics;
use pagefetch::worker::FetchTranscodeUnit;
use pagefetch::worker::http::HttpClient;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<ExitCode, AnyError> {
    // stdout is reserved for the report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Check(args) => check(args).await,
    }
}

fn load_config(args: &BatchArgs) -> Result<Config, AnyError> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    Ok(config)
}

async fn run(args: RunArgs) -> Result<ExitCode, AnyError> {
    let mut config = load_config(&args.batch)?;
    args.apply(&mut config);
    config.validate()?;

    let manifest = ChapterManifest::load(&args.batch.manifest)?;
    let batch = Batch::from_manifest(&manifest, &args.batch.out, config.output.clone());

    let metrics = Arc::new(Metrics::new());
    let http = HttpClient::new(&config.http.to_http_config())?;
    let unit = Arc::new(FetchTranscodeUnit::new(http, Arc::clone(&metrics)));
    let runner = BatchRunner::new(unit, config.scheduler.to_scheduler_config(), metrics);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let report = runner.run(batch, &cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(match report.status {
        _ if report.is_success() => ExitCode::SUCCESS,
        BatchStatus::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

async fn check(args: CheckArgs) -> Result<ExitCode, AnyError> {
    let config = load_config(&args.batch)?;
    let manifest = ChapterManifest::load(&args.batch.manifest)?;
    let batch = Batch::from_manifest(&manifest, &args.batch.out, config.output);

    let (existing, expected) = batch::completion_status(&batch).await?;
    let complete = existing == expected;
    println!(
        "{}: {existing}/{expected} files present ({})",
        args.batch.out.display(),
        if complete { "complete" } else { "incomplete" }
    );

    Ok(if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(report: &BatchReport) {
    let chapter = report.chapter.as_deref().unwrap_or("chapter");
    println!(
        "{chapter}: {:?} ({} ok, {} failed, {} cancelled, {} excluded) -> {}",
        report.status,
        report.succeeded.len(),
        report.failed.len(),
        report.cancelled.len(),
        report.excluded.len(),
        report.destination.display()
    );
    for failure in &report.failed {
        println!(
            "  {} [{}] after {} attempts: {}",
            failure.reference.url,
            failure.stage,
            failure.attempts(),
            failure.error
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, cancelling batch");
}
