use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Delegates read from the store per page
    #[arg(long)]
    batch_size: Option<usize>,

    /// Subgraph lookups in flight at once
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let summary = process::sync_delegates(process::Overrides {
        batch_size: args.batch_size,
        concurrency: args.concurrency,
    })
    .await?;

    if !summary.failed.is_empty() {
        anyhow::bail!("{} delegates failed to sync", summary.failed.len());
    }

    Ok(())
}
