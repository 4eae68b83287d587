//! # Delegate Balance Sync
//!
//! Copies each delegate's latest voting balance from the delegate subgraph into
//! the local store.
//!
//! ## Run
//! 1. Page through the local store, `batch_size` delegates at a time
//! 2. For each delegate, ask the subgraph for the single newest balance change at
//!    or before the cutoff timestamp
//! 3. Upsert the balance under the stored address
//! 4. Stop after a short or empty page
//!
//! ## Rules
//! - The cutoff is fixed: balances are a snapshot "as of" that block time
//! - No record found: the stored balance is left as is
//! - Stored balance already equal: no write, so a re-run changes nothing
//! - A failed lookup or write is recorded and the run moves on; only a failed
//!   store page read aborts the run
//! - Lookups within a page run concurrently, bounded by `concurrency`; pages
//!   themselves are read one after another
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    client::QueryClient,
    config::Config,
    database::{DelegateDoc, DelegateStore},
    error::{GovernanceError, Result},
    queries::{BalanceChange, DELEGATE_BALANCE_FIELD, DELEGATE_BALANCE_QUERY},
    utils::normalize_address,
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated { delegate: String },
    Unchanged { delegate: String },
    NoRecord { delegate: String },
    Failed { delegate: String, reason: String },
}

impl SyncOutcome {
    pub fn delegate(&self) -> &str {
        match self {
            SyncOutcome::Updated { delegate }
            | SyncOutcome::Unchanged { delegate }
            | SyncOutcome::NoRecord { delegate }
            | SyncOutcome::Failed { delegate, .. } => delegate,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SyncFailure {
    pub delegate: String,
    pub reason: String,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub scanned: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub failed: Vec<SyncFailure>,
}

impl SyncSummary {
    fn record(&mut self, outcome: SyncOutcome) {
        self.scanned += 1;

        match outcome {
            SyncOutcome::Updated { .. } => self.updated += 1,
            SyncOutcome::Unchanged { .. } => self.unchanged += 1,
            SyncOutcome::NoRecord { .. } => self.missing += 1,
            SyncOutcome::Failed { delegate, reason } => {
                self.failed.push(SyncFailure { delegate, reason })
            }
        }
    }
}

pub struct SyncJob {
    graph: Arc<dyn QueryClient>,
    store: Arc<dyn DelegateStore>,
    cutoff: u64,
    batch_size: usize,
    concurrency: usize,
}

impl SyncJob {
    pub fn new(graph: Arc<dyn QueryClient>, store: Arc<dyn DelegateStore>, cutoff: u64) -> Self {
        Self {
            graph,
            store,
            cutoff,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn from_config(
        config: &Config,
        graph: Arc<dyn QueryClient>,
        store: Arc<dyn DelegateStore>,
    ) -> Self {
        Self::new(graph, store, config.balance_cutoff)
            .with_batch_size(config.sync_batch_size)
            .with_concurrency(config.sync_concurrency)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self) -> Result<SyncSummary> {
        self.run_with_progress(|_| {}).await
    }

    /// Runs the sync, calling `progress` once per delegate as each finishes.
    pub async fn run_with_progress<F>(&self, mut progress: F) -> Result<SyncSummary>
    where
        F: FnMut(&SyncOutcome) + Send,
    {
        if self.batch_size == 0 {
            return Err(GovernanceError::InvalidConfiguration {
                key: "batch_size".to_string(),
                cause: "must be greater than zero".to_string(),
            });
        }

        info!("Starting delegate sync as of {}", self.cutoff);

        let mut summary = SyncSummary::default();
        let mut offset = 0;

        loop {
            let page = self.store.page(offset, self.batch_size).await?;
            let fetched = page.len();
            if fetched == 0 {
                break;
            }

            let mut outcomes = stream::iter(page)
                .map(|doc| self.sync_one(doc))
                .buffer_unordered(self.concurrency);

            while let Some(outcome) = outcomes.next().await {
                if let SyncOutcome::Failed { delegate, reason } = &outcome {
                    warn!("Sync failed for {delegate}: {reason}");
                }

                progress(&outcome);
                summary.record(outcome);
            }

            offset += fetched;
            if fetched < self.batch_size {
                break;
            }
        }

        info!(
            "Delegate sync done: {} scanned, {} updated, {} unchanged, {} without record, {} failed",
            summary.scanned,
            summary.updated,
            summary.unchanged,
            summary.missing,
            summary.failed.len()
        );

        Ok(summary)
    }

    async fn sync_one(&self, doc: DelegateDoc) -> SyncOutcome {
        let DelegateDoc {
            to_delegate: delegate,
            new_balance: stored,
        } = doc;

        let Some(address) = normalize_address(&delegate) else {
            return SyncOutcome::Failed {
                delegate,
                reason: "not a valid address".to_string(),
            };
        };

        let latest = match latest_balance(self.graph.as_ref(), &address, self.cutoff).await {
            Ok(Some(change)) => change.new_balance,
            Ok(None) => return SyncOutcome::NoRecord { delegate },
            Err(e) => {
                return SyncOutcome::Failed {
                    delegate,
                    reason: e.to_string(),
                };
            }
        };

        if stored.as_deref() == Some(latest.as_str()) {
            return SyncOutcome::Unchanged { delegate };
        }

        match self.store.upsert_balance(&delegate, &latest).await {
            Ok(()) => SyncOutcome::Updated { delegate },
            Err(e) => SyncOutcome::Failed {
                delegate,
                reason: e.to_string(),
            },
        }
    }
}

/// Newest balance change for `delegate` at or before `cutoff`, if any.
pub async fn latest_balance(
    client: &dyn QueryClient,
    delegate: &str,
    cutoff: u64,
) -> Result<Option<BalanceChange>> {
    let mut data = client
        .query(
            DELEGATE_BALANCE_QUERY,
            json!({
                "delegate": delegate,
                "cutoff": cutoff.to_string(),
            }),
        )
        .await?;

    let changes: Vec<BalanceChange> = match data.get_mut(DELEGATE_BALANCE_FIELD).map(serde_json::Value::take) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value(raw).map_err(GovernanceError::fetch)?,
    };

    Ok(changes.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::MemoryDelegateStore, memory::MemoryGraph};

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";
    const BOB: &str = "0x00000000000000000000000000000000000000b0";

    fn change(delegate: &str, balance: &str, timestamp: u64) -> serde_json::Value {
        json!({
            "delegate": delegate,
            "newBalance": balance,
            "blockTimestamp": timestamp.to_string(),
        })
    }

    #[tokio::test]
    async fn latest_balance_respects_cutoff() {
        let graph = MemoryGraph::new();
        graph.insert_many(
            DELEGATE_BALANCE_FIELD,
            [
                change(ALICE, "10", 100),
                change(ALICE, "30", 300),
                change(ALICE, "20", 200),
                change(BOB, "99", 150),
            ],
        );

        let at_250 = latest_balance(&graph, ALICE, 250).await.unwrap();
        let at_50 = latest_balance(&graph, ALICE, 50).await.unwrap();

        assert_eq!(at_250.unwrap().new_balance, "20");
        assert_eq!(at_50, None);
    }

    #[tokio::test]
    async fn missing_records_leave_balance_untouched() {
        let graph = Arc::new(MemoryGraph::new());
        let store = Arc::new(MemoryDelegateStore::new());
        store.upsert_balance(ALICE, "7").await.unwrap();

        let summary = SyncJob::new(graph, store.clone(), 1000).run().await.unwrap();

        assert_eq!(summary.missing, 1);
        assert_eq!(store.balance(ALICE).await.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn checksummed_keys_are_queried_lowercase_and_stored_as_is() {
        let checksummed = "0x00000000000000000000000000000000000000A1";
        let graph = Arc::new(MemoryGraph::new());
        graph.insert(DELEGATE_BALANCE_FIELD, change(ALICE, "42", 10));
        let store = Arc::new(MemoryDelegateStore::new());
        store.register(checksummed).await;

        let summary = SyncJob::new(graph, store.clone(), 1000).run().await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(store.balance(checksummed).await.as_deref(), Some("42"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failures_are_collected_and_the_run_continues() {
        let graph = Arc::new(MemoryGraph::new());
        graph.insert(DELEGATE_BALANCE_FIELD, change(BOB, "5", 10));
        graph.fail_for_delegate(ALICE);
        let store = Arc::new(MemoryDelegateStore::new());
        store.register(ALICE).await;
        store.register(BOB).await;
        store.register("not-an-address").await;

        let mut seen = Vec::new();
        let summary = SyncJob::new(graph, store.clone(), 1000)
            .with_batch_size(1)
            .run_with_progress(|outcome| seen.push(outcome.delegate().to_string()))
            .await
            .unwrap();

        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.failed.iter().any(|f| f.delegate == ALICE));
        assert!(summary.failed.iter().any(|f| f.delegate == "not-an-address"));
        assert_eq!(seen.len(), 3);
        assert_eq!(store.balance(BOB).await.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn zero_batch_is_rejected() {
        let job = SyncJob::new(
            Arc::new(MemoryGraph::new()),
            Arc::new(MemoryDelegateStore::new()),
            1000,
        )
        .with_batch_size(0);

        assert!(matches!(
            job.run().await,
            Err(GovernanceError::InvalidConfiguration { .. })
        ));
    }
}
