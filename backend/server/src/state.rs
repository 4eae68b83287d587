use std::sync::Arc;

use governance::{
    client::{GraphClient, QueryClient},
    config::Config,
    database::{DelegateStore, RedisDelegateStore},
    error::Result,
    sync::SyncJob,
};
use tracing::info;

use super::{board::Boards, jobs::SyncRunner};

pub struct State {
    pub config: Config,
    pub governance: Arc<dyn QueryClient>,
    pub sync: SyncRunner,
    pub boards: Boards,
}

impl State {
    /// Loads configuration before touching the network, so a missing store
    /// connection string fails startup immediately.
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load()?;

        info!("Connecting to Redis...");
        let store = Arc::new(RedisDelegateStore::connect(&config.redis_url).await?);

        let governance = Arc::new(GraphClient::new(&config.governance_graph_url)?);
        let delegates = Arc::new(GraphClient::new(&config.delegate_graph_url)?);

        Ok(Self::from_parts(config, governance, delegates, store))
    }

    pub fn from_parts(
        config: Config,
        governance: Arc<dyn QueryClient>,
        delegates: Arc<dyn QueryClient>,
        store: Arc<dyn DelegateStore>,
    ) -> Arc<Self> {
        let sync = SyncRunner::new(SyncJob::from_config(&config, delegates, store));

        Arc::new(Self {
            config,
            governance,
            sync,
            boards: Boards::new(),
        })
    }
}
