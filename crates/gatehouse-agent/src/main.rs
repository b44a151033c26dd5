//! The browser automation engine, one process per job.
//!
//! Invoked by the gatehouse task executor with a payload file, a report
//! path and the job id; console endpoint and credentials arrive through
//! the environment. Exit code 0 means the run succeeded; the report
//! document carries the failing stage and message otherwise.

mod cancel;
mod error;
mod locator;
mod overlay;
mod session;
mod stages;
mod task;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::prelude::*;

use gatehouse::exec::{RunReport, TaskSpec};

use crate::cancel::CancelToken;
use crate::session::{AgentEnv, ConsoleSession};
use crate::stages::Stage;

#[derive(Parser, Debug)]
#[command(name = "gatehouse-agent", about = "Drives the visitor console for one job")]
struct Args {
    /// Path to the task payload JSON written by the executor.
    #[arg(long)]
    payload: PathBuf,

    /// Where to write the structured run report.
    #[arg(long)]
    report: PathBuf,

    /// Job id, for logging and the report.
    #[arg(long = "job-id")]
    job_id: String,
}

fn init_tracing() {
    tracing_log::LogTracer::init().ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let started_at = chrono::Utc::now().to_rfc3339();

    let report = run(&args, started_at.clone()).await;
    let success = report.success;

    if let Err(e) = report.write(&args.report) {
        tracing::error!("Failed to write run report: {}", e);
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(args: &Args, started_at: String) -> RunReport {
    let spec = match TaskSpec::load(&args.payload) {
        Ok(spec) => spec,
        Err(e) => {
            tracing::error!("Unreadable payload {}: {}", args.payload.display(), e);
            return RunReport::failure(
                &args.job_id,
                Stage::Init.name(),
                &format!("unreadable payload: {}", e),
                started_at,
            );
        }
    };

    let env = match AgentEnv::from_env() {
        Ok(env) => env,
        Err(e) => {
            tracing::error!("Bad environment: {}", e);
            return RunReport::failure(&args.job_id, Stage::Init.name(), &e, started_at);
        }
    };

    let cancel = CancelToken::for_payload(&args.payload);

    let span = tracing::info_span!("automation", job_id = %spec.job_id, action = %spec.action);
    let _span = span.entered();
    tracing::info!("Starting {} run for '{}'", spec.action, spec.name);

    let session = match ConsoleSession::launch(&env, &spec.job_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Browser session failed to start: {}", e);
            return RunReport::failure(
                &args.job_id,
                Stage::Init.name(),
                &format!("browser session failed to start: {}", e),
                started_at,
            );
        }
    };

    let outcome = task::run_for_action(&session.driver, &env, &spec, &cancel).await;

    // The session is released on every exit route, success or not.
    session.close().await;

    match outcome {
        Ok(feedback) => {
            tracing::info!(
                "Run finished (explicit feedback: {})",
                feedback.explicit_success
            );
            RunReport::success(&args.job_id, !feedback.explicit_success, started_at)
        }
        Err(failure) => {
            tracing::error!("Run failed at {}: {}", failure.stage, failure.error);
            RunReport::failure(
                &args.job_id,
                failure.stage.name(),
                &failure.error.to_string(),
                started_at,
            )
        }
    }
}
