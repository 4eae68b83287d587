//! # Redis
//!
//! Local store for delegate documents.
//!
//! ## Requirements
//!
//! - Stable offset paging so the sync job can scan every delegate in batches
//! - Single-field upsert keyed by the delegate address
//! - Every upsert is its own atomic unit, no cross-delegate locking
//!
//! ## Implementation
//!
//! - Sorted set `delegates:index`: every address with score 0, so ranks follow
//!   lexicographic order and offsets stay stable while balances change
//! - Hash `delegate:{address}`: the document, with field `newBalance`
//! - Upsert is one `MULTI` pipeline: `ZADD NX` registers the address if absent,
//!   `HSET` overwrites only `newBalance`
use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::Result;

pub const DELEGATE_INDEX: &str = "delegates:index";
pub const BALANCE_FIELD: &str = "newBalance";

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DelegateDoc {
    pub to_delegate: String,
    pub new_balance: Option<String>,
}

#[async_trait]
pub trait DelegateStore: Send + Sync {
    /// Up to `limit` documents starting at `offset`, in stable key order.
    async fn page(&self, offset: usize, limit: usize) -> Result<Vec<DelegateDoc>>;

    /// Inserts the document if absent, otherwise overwrites only its balance.
    async fn upsert_balance(&self, to_delegate: &str, new_balance: &str) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

fn document_key(to_delegate: &str) -> String {
    format!("delegate:{to_delegate}")
}

#[derive(Clone)]
pub struct RedisDelegateStore {
    connection: ConnectionManager,
}

impl RedisDelegateStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl DelegateStore for RedisDelegateStore {
    async fn page(&self, offset: usize, limit: usize) -> Result<Vec<DelegateDoc>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let stop = offset + limit - 1;

        let keys: Vec<String> = connection
            .zrange(DELEGATE_INDEX, offset as isize, stop as isize)
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hget(document_key(key), BALANCE_FIELD);
        }
        let balances: Vec<Option<String>> = pipe.query_async(&mut connection).await?;

        Ok(keys
            .into_iter()
            .zip(balances)
            .map(|(to_delegate, new_balance)| DelegateDoc {
                to_delegate,
                new_balance,
            })
            .collect())
    }

    async fn upsert_balance(&self, to_delegate: &str, new_balance: &str) -> Result<()> {
        let mut connection = self.connection.clone();

        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(DELEGATE_INDEX)
            .arg("NX")
            .arg(0)
            .arg(to_delegate)
            .ignore()
            .hset(document_key(to_delegate), BALANCE_FIELD, new_balance)
            .ignore()
            .query_async::<()>(&mut connection)
            .await?;

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut connection = self.connection.clone();

        Ok(connection.zcard(DELEGATE_INDEX).await?)
    }
}

/// Same ordering and upsert rules as [`RedisDelegateStore`], held in memory.
#[derive(Default)]
pub struct MemoryDelegateStore {
    documents: RwLock<BTreeMap<String, Option<String>>>,
}

impl MemoryDelegateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a delegate with no known balance.
    pub async fn register(&self, to_delegate: &str) {
        self.documents
            .write()
            .await
            .entry(to_delegate.to_string())
            .or_insert(None);
    }

    pub async fn balance(&self, to_delegate: &str) -> Option<String> {
        self.documents.read().await.get(to_delegate).cloned().flatten()
    }

    pub async fn snapshot(&self) -> Vec<DelegateDoc> {
        self.documents
            .read()
            .await
            .iter()
            .map(|(to_delegate, new_balance)| DelegateDoc {
                to_delegate: to_delegate.clone(),
                new_balance: new_balance.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl DelegateStore for MemoryDelegateStore {
    async fn page(&self, offset: usize, limit: usize) -> Result<Vec<DelegateDoc>> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(to_delegate, new_balance)| DelegateDoc {
                to_delegate: to_delegate.clone(),
                new_balance: new_balance.clone(),
            })
            .collect())
    }

    async fn upsert_balance(&self, to_delegate: &str, new_balance: &str) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(to_delegate.to_string(), Some(new_balance.to_string()));

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_follow_key_order() {
        let store = MemoryDelegateStore::new();
        for key in ["0xc", "0xa", "0xd", "0xb"] {
            store.register(key).await;
        }

        let first = store.page(0, 3).await.unwrap();
        let second = store.page(3, 3).await.unwrap();

        let keys: Vec<&str> = first.iter().chain(&second).map(|d| d.to_delegate.as_str()).collect();
        assert_eq!(keys, ["0xa", "0xb", "0xc", "0xd"]);
        assert!(store.page(4, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_inserts_then_overwrites() {
        let store = MemoryDelegateStore::new();

        store.upsert_balance("0xa", "10").await.unwrap();
        store.upsert_balance("0xa", "20").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.balance("0xa").await.as_deref(), Some("20"));
    }

    #[test]
    fn document_keys_are_namespaced() {
        assert_eq!(document_key("0xabc"), "delegate:0xabc");
    }
}
