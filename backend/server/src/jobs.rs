//! # Background Sync
//!
//! `POST /sync` only starts a run; the run itself lives in a tokio task so a
//! slow subgraph never holds a request open.
//!
//! - At most one run at a time, a second start is rejected
//! - The last outcome stays readable through `GET /sync` until the next run
use std::sync::Arc;

use chrono::{DateTime, Utc};
use governance::sync::{SyncJob, SyncSummary};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Running {
        started_at: DateTime<Utc>,
    },
    Finished {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        summary: SyncSummary,
    },
    Failed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: String,
    },
}

pub struct SyncRunner {
    job: Arc<SyncJob>,
    status: Arc<Mutex<SyncStatus>>,
}

impl SyncRunner {
    pub fn new(job: SyncJob) -> Self {
        Self {
            job: Arc::new(job),
            status: Arc::new(Mutex::new(SyncStatus::Idle)),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.lock().await.clone()
    }

    pub async fn start(&self) -> Result<JoinHandle<()>, AppError> {
        let started_at = {
            let mut status = self.status.lock().await;
            if matches!(*status, SyncStatus::Running { .. }) {
                return Err(AppError::SyncInProgress);
            }

            let started_at = Utc::now();
            *status = SyncStatus::Running { started_at };
            started_at
        };

        info!("Delegate sync started");

        let job = self.job.clone();
        let status = self.status.clone();

        Ok(tokio::spawn(async move {
            let result = job.run().await;
            let finished_at = Utc::now();

            *status.lock().await = match result {
                Ok(summary) => SyncStatus::Finished {
                    started_at,
                    finished_at,
                    summary,
                },
                Err(e) => {
                    warn!("Delegate sync aborted: {e}");

                    SyncStatus::Failed {
                        started_at,
                        finished_at,
                        error: e.to_string(),
                    }
                }
            };
        }))
    }
}
