//! In-process subgraph for local runs and tests.
//!
//! Serves the documents built by [`page_document`](crate::queries::page_document)
//! and the delegate balance lookup with the same ordering, paging and filtering
//! rules as the hosted subgraphs.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        LazyLock, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    client::QueryClient,
    error::{GovernanceError, Result},
    queries::DELEGATE_BALANCE_FIELD,
};

static SELECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(feed(\d+)): (\w+)\(first: \$first, skip: \$skip\d+, orderBy: blockTimestamp, orderDirection: desc(?:, where: \{ (\w+): \$filter \})?\)")
        .expect("selection pattern")
});

#[derive(Default)]
pub struct MemoryGraph {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    requests: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
    failing_delegates: Mutex<HashSet<String>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, record: Value) {
        self.insert_many(collection, [record]);
    }

    pub fn insert_many(&self, collection: &str, records: impl IntoIterator<Item = Value>) {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());

        collections
            .entry(collection.to_string())
            .or_default()
            .extend(records);
    }

    /// Requests received so far, failed ones included.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Every request after the first `successes` fails.
    pub fn fail_after(&self, successes: usize) {
        *self.fail_after.lock().unwrap_or_else(|e| e.into_inner()) = Some(successes);
    }

    pub fn fail_for_delegate(&self, delegate: &str) {
        self.failing_delegates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(delegate.to_string());
    }

    fn sorted(&self, collection: &str) -> Vec<Value> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = collections.get(collection).cloned().unwrap_or_default();

        records.sort_by_key(|record| std::cmp::Reverse(timestamp(record)));
        records
    }

    fn page(&self, document: &str, variables: &Value) -> Result<Value> {
        let first = usize_var(variables, "first")?;
        let mut data = Map::new();

        for captures in SELECTION.captures_iter(document) {
            let alias = &captures[1];
            let skip = usize_var(variables, &format!("skip{}", &captures[2]))?;
            let filter = captures
                .get(4)
                .map(|field| (field.as_str(), variables.get("filter")));

            let page: Vec<Value> = self
                .sorted(&captures[3])
                .into_iter()
                .filter(|record| match filter {
                    Some((field, expected)) => record.get(field) == expected,
                    None => true,
                })
                .skip(skip)
                .take(first)
                .collect();

            data.insert(alias.to_string(), Value::Array(page));
        }

        Ok(Value::Object(data))
    }

    fn latest_balance(&self, variables: &Value) -> Result<Value> {
        let delegate = variables
            .get("delegate")
            .and_then(Value::as_str)
            .ok_or_else(|| GovernanceError::fetch("missing $delegate"))?;
        let cutoff = variables
            .get("cutoff")
            .and_then(as_u64)
            .ok_or_else(|| GovernanceError::fetch("missing $cutoff"))?;

        if self
            .failing_delegates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(delegate)
        {
            return Err(GovernanceError::fetch(format!("lookup failed for {delegate}")));
        }

        let latest: Vec<Value> = self
            .sorted(DELEGATE_BALANCE_FIELD)
            .into_iter()
            .filter(|record| record.get("delegate").and_then(Value::as_str) == Some(delegate))
            .filter(|record| timestamp(record) <= cutoff)
            .take(1)
            .collect();

        let mut data = Map::new();
        data.insert(DELEGATE_BALANCE_FIELD.to_string(), Value::Array(latest));

        Ok(Value::Object(data))
    }
}

#[async_trait]
impl QueryClient for MemoryGraph {
    async fn query(&self, document: &str, variables: Value) -> Result<Value> {
        let previous = self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(successes) = *self.fail_after.lock().unwrap_or_else(|e| e.into_inner()) {
            if previous >= successes {
                return Err(GovernanceError::fetch("subgraph unavailable"));
            }
        }

        if document.contains(DELEGATE_BALANCE_FIELD) {
            return self.latest_balance(&variables);
        }

        self.page(document, &variables)
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        other => other.as_u64(),
    }
}

fn timestamp(record: &Value) -> u64 {
    record.get("blockTimestamp").and_then(as_u64).unwrap_or(0)
}

fn usize_var(variables: &Value, key: &str) -> Result<usize> {
    variables
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| GovernanceError::fetch(format!("missing ${key}")))
}
