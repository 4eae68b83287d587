use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::Error};

/// One paginated collection in a subgraph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feed {
    pub collection: &'static str,
    pub selection: &'static str,
    pub filter_field: Option<&'static str>,
}

const PROPOSAL_SELECTION: &str = "proposalId blockTimestamp proposer";
const VOTE_SELECTION: &str = "voter weight support";

/// The governor emitted four different proposal-creation events over its upgrades.
pub const PROPOSAL_FEEDS: [Feed; 4] = [
    Feed {
        collection: "proposalCreated1S",
        selection: "proposalId blockTimestamp proposer description",
        filter_field: None,
    },
    Feed {
        collection: "proposalCreated2S",
        selection: PROPOSAL_SELECTION,
        filter_field: None,
    },
    Feed {
        collection: "proposalCreated3S",
        selection: PROPOSAL_SELECTION,
        filter_field: None,
    },
    Feed {
        collection: "proposalCreateds",
        selection: PROPOSAL_SELECTION,
        filter_field: None,
    },
];

pub const VOTE_FEEDS: [Feed; 2] = [
    Feed {
        collection: "voteCastWithParams_collection",
        selection: VOTE_SELECTION,
        filter_field: Some("proposalId"),
    },
    Feed {
        collection: "voteCasts",
        selection: VOTE_SELECTION,
        filter_field: Some("proposalId"),
    },
];

pub const CANCELED_FEED: Feed = Feed {
    collection: "proposalCanceleds",
    selection: "proposalId blockTimestamp",
    filter_field: None,
};

pub const DELEGATE_BALANCE_QUERY: &str = r#"
    query latestBalance($delegate: String!, $cutoff: BigInt!) {
        delegateVotesChangeds(
            where: { delegate: $delegate, blockTimestamp_lte: $cutoff }
            orderBy: blockTimestamp
            orderDirection: desc
            first: 1
        ) {
            newBalance
        }
    }
"#;

pub const DELEGATE_BALANCE_FIELD: &str = "delegateVotesChangeds";

/// Alias under which feed `index` appears in a page response.
pub fn feed_alias(index: usize) -> String {
    format!("feed{index}")
}

/// Builds one document paging every feed at once, newest first.
///
/// Each feed gets its own `$skip{i}` so cursors advance independently, while
/// `$first` and `$filter` are shared.
pub fn page_document(feeds: &[Feed]) -> String {
    let mut variables = String::from("$first: Int!");
    for index in 0..feeds.len() {
        variables.push_str(&format!(", $skip{index}: Int!"));
    }
    if feeds.iter().any(|feed| feed.filter_field.is_some()) {
        variables.push_str(", $filter: String!");
    }

    let selections: Vec<String> = feeds
        .iter()
        .enumerate()
        .map(|(index, feed)| {
            let filter = feed
                .filter_field
                .map(|field| format!(", where: {{ {field}: $filter }}"))
                .unwrap_or_default();

            format!(
                "{alias}: {collection}(first: $first, skip: $skip{index}, orderBy: blockTimestamp, orderDirection: desc{filter}) {{ {selection} }}",
                alias = feed_alias(index),
                collection = feed.collection,
                selection = feed.selection,
            )
        })
        .collect();

    format!("query page({variables}) {{ {} }}", selections.join(" "))
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub proposal_id: String,

    #[serde(deserialize_with = "timestamp")]
    pub block_timestamp: u64,

    #[serde(default)]
    pub description: Option<String>,

    pub proposer: String,
}

impl Proposal {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.block_timestamp)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter: String,

    /// Fixed-point integer string, 18 decimals.
    pub weight: String,

    pub support: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CanceledProposal {
    pub proposal_id: String,

    #[serde(deserialize_with = "timestamp")]
    pub block_timestamp: u64,
}

impl CanceledProposal {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.block_timestamp)
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub new_balance: String,
}

fn to_datetime(timestamp: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(timestamp).ok()?, 0)
}

/// Subgraphs serialize `BigInt` as strings, but some deployments return numbers.
fn timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}
