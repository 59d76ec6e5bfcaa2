//! # Bulkflow Report Simulator
//!
//! Runs a batch of simulated report-generation jobs through a session,
//! printing progress as it goes, then retries the failed jobs and reruns.
//! Every `--fail-every`-th job fails on its first attempt, so a single retry
//! round normally clears all failures.

use anyhow::Context;
use async_trait::async_trait;
use bulkflow_core::orchestration::{FatalProcessingError, ItemOutcome, ItemProcessor, ProcessResult};
use bulkflow_core::{
    init_structured_logging, ConfigManager, ProgressSnapshot, SessionManager, WorkItem,
};
use clap::Parser;
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bulkflow-sim")]
#[command(about = "Simulate a bulk report generation run")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Number of report jobs to generate
    #[arg(short, long, default_value_t = 20)]
    jobs: u32,

    /// Every k-th job fails on its first attempt (0 disables failures)
    #[arg(short, long, default_value_t = 5)]
    fail_every: u32,

    /// Job number at which the renderer goes offline, aborting the session
    #[arg(long)]
    fatal_at: Option<u32>,

    /// Concurrent jobs (overrides session.concurrency from configuration)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Simulated render time per page in milliseconds
    #[arg(long, default_value_t = 5)]
    page_ms: u64,

    /// Retry-and-rerun rounds after the first run
    #[arg(long, default_value_t = 1)]
    retry_rounds: u32,

    /// Configuration directory (default: ./config)
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct ReportJob {
    number: u32,
    title: String,
    pages: u32,
}

struct ReportRenderer {
    fail_every: u32,
    fatal_at: Option<u32>,
    page_time: Duration,
    attempts: DashMap<u32, u32>,
}

#[async_trait]
impl ItemProcessor<ReportJob> for ReportRenderer {
    async fn process(&self, job: &ReportJob) -> ProcessResult {
        let attempt = {
            let mut entry = self.attempts.entry(job.number).or_insert(0);
            *entry += 1;
            *entry
        };

        if self.fatal_at == Some(job.number) {
            return Err(FatalProcessingError::new("report renderer went offline"));
        }

        tokio::time::sleep(self.page_time * job.pages).await;

        if self.fail_every > 0 && job.number % self.fail_every == 0 && attempt == 1 {
            return Ok(ItemOutcome::failure(format!(
                "template error rendering '{}'",
                job.title
            )));
        }

        Ok(ItemOutcome::success_with(serde_json::json!({
            "location": format!("reports/{:04}.pdf", job.number),
            "pages": job.pages,
        })))
    }

    fn name(&self) -> &str {
        "report_renderer"
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    println!(
        "[{:>5.1}%] pending={} processing={} completed={} error={}",
        snapshot.percent_complete,
        snapshot.pending,
        snapshot.processing,
        snapshot.completed,
        snapshot.error
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::load_from_directory(cli.config_dir.clone())
        .context("failed to load configuration")?;
    init_structured_logging(&manager.config().logging);

    let mut session_config = manager.config().session.clone();
    if let Some(concurrency) = cli.concurrency {
        session_config = session_config.with_concurrency(concurrency);
    }

    let renderer = Arc::new(ReportRenderer {
        fail_every: cli.fail_every,
        fatal_at: cli.fatal_at,
        page_time: Duration::from_millis(cli.page_ms),
        attempts: DashMap::new(),
    });
    let sessions = SessionManager::with_config(renderer, manager.config());

    let jobs = (1..=cli.jobs)
        .map(|number| {
            WorkItem::new(ReportJob {
                number,
                title: format!("Monthly report #{number}"),
                pages: 1 + number % 4,
            })
        })
        .collect();
    let session_id = sessions.create_session(jobs, session_config.clone())?;
    sessions.subscribe(
        session_id,
        Arc::new(|snapshot: &ProgressSnapshot| {
            if snapshot.processing == 0 || snapshot.done() % 5 == 0 {
                print_snapshot(snapshot);
            }
        }),
    )?;

    info!(
        environment = manager.environment(),
        session_id = %session_id,
        jobs = cli.jobs,
        concurrency = session_config.concurrency,
        "Starting report generation"
    );

    let mut round = 0;
    loop {
        if let Err(e) = sessions.start(session_id).await {
            warn!(error = %e, "Run ended with a fatal error");
            break;
        }

        let summary = sessions.summary(session_id)?;
        print_snapshot(&summary.progress);
        if !summary.has_failures() || round >= cli.retry_rounds {
            break;
        }

        round += 1;
        for failure in &summary.failures {
            println!("  retrying {} ({})", failure.item_id, failure.error_detail);
        }
        sessions.retry_failed(session_id)?;
    }

    let summary = sessions.summary(session_id)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.has_failures() {
        anyhow::bail!("{} report jobs failed", summary.failures.len());
    }
    Ok(())
}
