use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

use crate::error::{GovernanceError, Result};

pub const GOVERNANCE_GRAPH_URL: &str =
    "https://api.studio.thegraph.com/query/68573/v6_proxy/version/latest";
pub const DELEGATE_GRAPH_URL: &str = "https://api.goldsky.com/api/public/project_clx4gqdt1qtw801u4gaxz1xh8/subgraphs/pooltogether/1.0.0/gn";

/// Balances are synced "as of" this block timestamp, not as of now.
pub const BALANCE_CUTOFF: &str = "1721214200";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub governance_graph_url: String,
    pub delegate_graph_url: String,
    pub balance_cutoff: u64,
    pub sync_batch_size: usize,
    pub sync_concurrency: usize,
    pub vote_batch_size: usize,
    pub proposal_batch_size: usize,
    pub canceled_batch_size: usize,
    pub reveal_page_size: usize,
}

impl Config {
    /// Reads the process environment, falling back to `/run/secrets` for the
    /// store connection string.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok().or_else(|| read_secret(key)))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let redis_url = lookup("REDIS_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| GovernanceError::MissingConfiguration("REDIS_URL".to_string()))?;

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", "1111")?,
            redis_url,
            governance_graph_url: try_load(&lookup, "GOVERNANCE_GRAPH_URL", GOVERNANCE_GRAPH_URL)?,
            delegate_graph_url: try_load(&lookup, "DELEGATE_GRAPH_URL", DELEGATE_GRAPH_URL)?,
            balance_cutoff: try_load(&lookup, "BALANCE_CUTOFF", BALANCE_CUTOFF)?,
            sync_batch_size: positive(try_load(&lookup, "SYNC_BATCH_SIZE", "1000")?, "SYNC_BATCH_SIZE")?,
            sync_concurrency: positive(try_load(&lookup, "SYNC_CONCURRENCY", "8")?, "SYNC_CONCURRENCY")?,
            vote_batch_size: positive(try_load(&lookup, "VOTE_BATCH_SIZE", "1000")?, "VOTE_BATCH_SIZE")?,
            proposal_batch_size: positive(
                try_load(&lookup, "PROPOSAL_BATCH_SIZE", "1000")?,
                "PROPOSAL_BATCH_SIZE",
            )?,
            canceled_batch_size: positive(
                try_load(&lookup, "CANCELED_BATCH_SIZE", "10")?,
                "CANCELED_BATCH_SIZE",
            )?,
            reveal_page_size: positive(try_load(&lookup, "REVEAL_PAGE_SIZE", "5")?, "REVEAL_PAGE_SIZE")?,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");

            GovernanceError::InvalidConfiguration {
                key: key.to_string(),
                cause: e.to_string(),
            }
        })
}

fn positive(value: usize, key: &str) -> Result<usize> {
    if value == 0 {
        return Err(GovernanceError::InvalidConfiguration {
            key: key.to_string(),
            cause: "must be greater than zero".to_string(),
        });
    }

    Ok(value)
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path).map(|s| s.trim().to_string()).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_redis_url_fails_fast() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();

        assert!(matches!(err, GovernanceError::MissingConfiguration(key) if key == "REDIS_URL"));
    }

    #[test]
    fn blank_redis_url_is_missing() {
        let err = Config::from_lookup(lookup(&[("REDIS_URL", "   ")])).unwrap_err();

        assert!(matches!(err, GovernanceError::MissingConfiguration(_)));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("REDIS_URL", "redis://localhost:6379")])).unwrap();

        assert_eq!(config.port, 1111);
        assert_eq!(config.balance_cutoff, 1_721_214_200);
        assert_eq!(config.sync_batch_size, 1000);
        assert_eq!(config.canceled_batch_size, 10);
        assert_eq!(config.reveal_page_size, 5);
        assert_eq!(config.delegate_graph_url, DELEGATE_GRAPH_URL);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("REDIS_URL", "redis://localhost:6379"),
            ("SYNC_BATCH_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidConfiguration { key, .. } if key == "SYNC_BATCH_SIZE"));

        let err = Config::from_lookup(lookup(&[
            ("REDIS_URL", "redis://localhost:6379"),
            ("REVEAL_PAGE_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidConfiguration { key, .. } if key == "REVEAL_PAGE_SIZE"));
    }
}
