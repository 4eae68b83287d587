//! # Delegate Sync Process
//!
//! Runs one delegate balance sync outside the server, e.g. from cron or by hand.
//!
//! ## Steps
//! 1. Load configuration; a missing `REDIS_URL` stops here, before any connection
//! 2. Connect to Redis and the delegate subgraph
//! 3. Count stored delegates to size the progress bar
//! 4. Run the sync, ticking once per delegate
//! 5. Print the summary, including every failed delegate and why
use std::sync::Arc;

use anyhow::Result;
use governance::{
    client::GraphClient,
    config::Config,
    database::{DelegateStore, RedisDelegateStore},
    sync::{SyncJob, SyncOutcome, SyncSummary},
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

pub struct Overrides {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
}

pub async fn sync_delegates(overrides: Overrides) -> Result<SyncSummary> {
    let config = Config::load()?;

    let store = Arc::new(RedisDelegateStore::connect(&config.redis_url).await?);
    let graph = Arc::new(GraphClient::new(&config.delegate_graph_url)?);

    let total = store.count().await?;
    info!("Loaded Delegates: {total}");

    let mut job = SyncJob::from_config(&config, graph, store);
    if let Some(batch_size) = overrides.batch_size {
        job = job.with_batch_size(batch_size);
    }
    if let Some(concurrency) = overrides.concurrency {
        job = job.with_concurrency(concurrency);
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let summary = job
        .run_with_progress(|outcome| {
            if let SyncOutcome::Failed { delegate, .. } = outcome {
                pb.set_message(format!("failed {delegate}"));
            }
            pb.inc(1);
        })
        .await?;

    pb.finish_with_message("Done");
    report(&summary);

    Ok(summary)
}

fn report(summary: &SyncSummary) {
    println!("Scanned: {}", summary.scanned);
    println!("Updated: {}", summary.updated);
    println!("Unchanged: {}", summary.unchanged);
    println!("No Record: {}", summary.missing);
    println!("Failed: {}\n", summary.failed.len());

    for failure in &summary.failed {
        println!("{}: {}", failure.delegate, failure.reason);
    }
}
