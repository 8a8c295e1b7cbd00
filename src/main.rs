use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dynoboot::config::{Cli, LogFormat, Settings};
use dynoboot::{Bootstrap, DynamoStore, RunStatus, schema};

/// Exit code for a bad schema or bad configuration.
const EXIT_INVALID_INPUT: u8 = 2;
const EXIT_INTERNAL: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("bootstrap: {}", e);
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    };

    init_tracing(settings.log_format);

    // Schema problems are caught before touching the network.
    let desired = match schema::load(&settings.schema) {
        Ok(desired) => desired,
        Err(e) => {
            error!(error = %e, "schema rejected");
            eprintln!("bootstrap: {}", e);
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    };

    match run(settings, desired).await {
        Ok(status) => ExitCode::from(status.exit_code() as u8),
        Err(e) => {
            error!("bootstrap aborted: {:#}", e);
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(settings: Settings, desired: schema::Descriptor) -> anyhow::Result<RunStatus> {
    let store = DynamoStore::connect(&settings.client).await;
    let bootstrap = Bootstrap::new(Arc::new(store), settings.endpoint.clone(), settings.bootstrap.clone());

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("shutdown signal received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let report = bootstrap.run(&desired, &cancel).await;
    watcher.abort();

    let mut stdout = std::io::stdout().lock();
    report
        .render(settings.format, &mut stdout)
        .context("writing report to stdout")?;
    stdout.flush().context("flushing stdout")?;

    let status = report.status();
    info!(%status, exit_code = status.exit_code(), "exiting");
    Ok(status)
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("BOOTSTRAP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info,dynoboot=info,aws_config=warn,aws_smithy_runtime=warn"));

    let registry = tracing_subscriber::registry().with(filter);
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

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
