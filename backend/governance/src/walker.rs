//! # Page Cursor Walker
//!
//! Drains skip/first paginated subgraph collections until an empty page.
//!
//! ## Cursors
//! - One cursor per feed, advanced by the number of records **that feed** returned,
//!   never by the batch size, so short pages stay correct
//! - Feeds sharing one walk are fetched in the same request each round
//! - The walk ends only when every feed returns an empty page in the same round
//! - An exhausted feed keeps being asked at its final offset until the walk ends
//!
//! ## Notes
//! - Pages are fetched strictly one after another, no prefetching
//! - A source that never returns an empty page never terminates; the subgraph
//!   caps `skip`, so in practice a runaway walk ends in a fetch error
use std::marker::PhantomData;

use futures_util::{Stream, TryStreamExt, stream};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    client::QueryClient,
    error::{GovernanceError, Result},
    queries::{Feed, feed_alias, page_document},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Pending { offset: usize },
    Exhausted { offset: usize },
}

impl CursorState {
    pub fn offset(self) -> usize {
        match self {
            CursorState::Pending { offset } | CursorState::Exhausted { offset } => offset,
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, CursorState::Exhausted { .. })
    }

    fn advance(self, returned: usize) -> Self {
        let offset = self.offset() + returned;

        if returned == 0 {
            CursorState::Exhausted { offset }
        } else {
            CursorState::Pending { offset }
        }
    }
}

#[derive(Debug)]
struct FeedCursor {
    feed: Feed,
    state: CursorState,
}

pub struct CursorWalker<'a, R> {
    client: &'a dyn QueryClient,
    document: String,
    cursors: Vec<FeedCursor>,
    filter: Option<String>,
    batch_size: usize,
    fetches: usize,
    finished: bool,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R> CursorWalker<'a, R>
where
    R: DeserializeOwned,
{
    pub fn new(
        client: &'a dyn QueryClient,
        feeds: &[Feed],
        filter: Option<&str>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(GovernanceError::InvalidConfiguration {
                key: "batch_size".to_string(),
                cause: "must be greater than zero".to_string(),
            });
        }
        if feeds.is_empty() {
            return Err(GovernanceError::InvalidConfiguration {
                key: "feeds".to_string(),
                cause: "a walk needs at least one feed".to_string(),
            });
        }

        Ok(Self {
            client,
            document: page_document(feeds),
            cursors: feeds
                .iter()
                .map(|&feed| FeedCursor {
                    feed,
                    state: CursorState::Pending { offset: 0 },
                })
                .collect(),
            filter: filter.map(str::to_string),
            batch_size,
            fetches: 0,
            finished: false,
            _record: PhantomData,
        })
    }

    /// Requests issued so far, including the empty terminator.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn cursors(&self) -> Vec<CursorState> {
        self.cursors.iter().map(|cursor| cursor.state).collect()
    }

    /// Fetches the next round. `Ok(None)` once every feed came back empty.
    pub async fn next_page(&mut self) -> Result<Option<Vec<R>>> {
        if self.finished {
            return Ok(None);
        }

        let mut variables = Map::new();
        variables.insert("first".to_string(), json!(self.batch_size));
        for (index, cursor) in self.cursors.iter().enumerate() {
            variables.insert(format!("skip{index}"), json!(cursor.state.offset()));
        }
        if let Some(filter) = &self.filter {
            variables.insert("filter".to_string(), json!(filter));
        }

        self.fetches += 1;
        let mut data = self
            .client
            .query(&self.document, Value::Object(variables))
            .await?;

        let mut records = Vec::new();
        for (index, cursor) in self.cursors.iter_mut().enumerate() {
            let page: Vec<R> = match data.get_mut(feed_alias(index).as_str()).map(Value::take) {
                None | Some(Value::Null) => Vec::new(),
                Some(raw) => serde_json::from_value(raw).map_err(|e| {
                    GovernanceError::fetch(format!("malformed {} page: {e}", cursor.feed.collection))
                })?,
            };

            debug!(
                "{} offset {} returned {}",
                cursor.feed.collection,
                cursor.state.offset(),
                page.len()
            );

            cursor.state = cursor.state.advance(page.len());
            records.extend(page);
        }

        if self.cursors.iter().all(|cursor| cursor.state.is_exhausted()) {
            self.finished = true;
            return Ok(None);
        }

        Ok(Some(records))
    }

    pub async fn collect_all(&mut self) -> Result<Vec<R>> {
        let mut records = Vec::new();

        while let Some(page) = self.next_page().await? {
            records.extend(page);
        }

        Ok(records)
    }

    /// Lazy record stream; pages are only requested as the stream is polled.
    pub fn into_stream(self) -> impl Stream<Item = Result<R>> + 'a
    where
        R: 'a,
    {
        stream::try_unfold(self, |mut walker| async move {
            let page = walker.next_page().await?;

            Ok::<_, GovernanceError>(page.map(|records| {
                let records = records.into_iter().map(Ok::<R, GovernanceError>);
                (stream::iter(records), walker)
            }))
        })
        .try_flatten()
    }
}

pub async fn walk<R>(
    client: &dyn QueryClient,
    feed: Feed,
    filter: Option<&str>,
    batch_size: usize,
) -> Result<Vec<R>>
where
    R: DeserializeOwned,
{
    walk_merged(client, &[feed], filter, batch_size).await
}

pub async fn walk_merged<R>(
    client: &dyn QueryClient,
    feeds: &[Feed],
    filter: Option<&str>,
    batch_size: usize,
) -> Result<Vec<R>>
where
    R: DeserializeOwned,
{
    CursorWalker::new(client, feeds, filter, batch_size)?
        .collect_all()
        .await
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use serde_json::json;

    use super::*;
    use crate::{
        memory::MemoryGraph,
        queries::{CANCELED_FEED, CanceledProposal, VOTE_FEEDS, Vote},
    };

    fn canceled(count: usize) -> MemoryGraph {
        let graph = MemoryGraph::new();
        graph.insert_many(
            CANCELED_FEED.collection,
            (0..count).map(|i| json!({"proposalId": i.to_string(), "blockTimestamp": (1000 + i).to_string()})),
        );
        graph
    }

    fn vote(proposal: &str, voter: usize, timestamp: u64) -> Value {
        json!({
            "proposalId": proposal,
            "voter": format!("0x{voter:040x}"),
            "weight": "1000000000000000000",
            "support": 1,
            "blockTimestamp": timestamp.to_string(),
        })
    }

    #[tokio::test]
    async fn fetch_count_is_pages_plus_terminator() {
        for (total, batch) in [(12usize, 5usize), (10, 5), (1, 5), (7, 1), (0, 3)] {
            let graph = canceled(total);
            let mut walker =
                CursorWalker::<CanceledProposal>::new(&graph, &[CANCELED_FEED], None, batch).unwrap();

            let records = walker.collect_all().await.unwrap();

            assert_eq!(records.len(), total);
            assert_eq!(walker.fetches(), total.div_ceil(batch) + 1);
            assert_eq!(graph.requests(), walker.fetches());
        }
    }

    #[tokio::test]
    async fn records_arrive_newest_first_in_delivery_order() {
        let graph = canceled(6);

        let records: Vec<CanceledProposal> = walk(&graph, CANCELED_FEED, None, 4).await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.proposal_id.as_str()).collect();
        assert_eq!(ids, ["5", "4", "3", "2", "1", "0"]);
    }

    #[tokio::test]
    async fn empty_upstream_takes_one_fetch() {
        let graph = MemoryGraph::new();

        let records: Vec<CanceledProposal> = walk(&graph, CANCELED_FEED, None, 10).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(graph.requests(), 1);
    }

    #[tokio::test]
    async fn merged_feeds_advance_independently() {
        let graph = MemoryGraph::new();
        graph.insert_many(VOTE_FEEDS[0].collection, (0..3).map(|i| vote("9", i, 10 + i as u64)));
        graph.insert_many(VOTE_FEEDS[1].collection, (0..7).map(|i| vote("9", 100 + i, 20 + i as u64)));
        graph.insert(VOTE_FEEDS[1].collection, vote("other", 999, 50));

        let mut walker = CursorWalker::<Vote>::new(&graph, &VOTE_FEEDS, Some("9"), 2).unwrap();
        let records = walker.collect_all().await.unwrap();

        assert_eq!(records.len(), 10);
        // Longest feed needs 4 pages, plus the all-empty round.
        assert_eq!(walker.fetches(), 5);
        assert_eq!(
            walker.cursors(),
            [
                CursorState::Exhausted { offset: 3 },
                CursorState::Exhausted { offset: 7 },
            ]
        );
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let graph = canceled(9);
        let walker = CursorWalker::<CanceledProposal>::new(&graph, &[CANCELED_FEED], None, 3).unwrap();

        let stream = walker.into_stream();
        futures_util::pin_mut!(stream);

        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.proposal_id, "8");
        assert_eq!(graph.requests(), 1);

        let rest: Vec<CanceledProposal> = stream.try_collect().await.unwrap();
        assert_eq!(rest.len(), 8);
        assert_eq!(graph.requests(), 4);
    }

    #[tokio::test]
    async fn errors_abort_the_walk() {
        let graph = canceled(4);
        graph.fail_after(1);

        let err = walk::<CanceledProposal>(&graph, CANCELED_FEED, None, 2)
            .await
            .unwrap_err();

        assert!(matches!(err, GovernanceError::FetchFailed { .. }));
        assert_eq!(graph.requests(), 2);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let graph = MemoryGraph::new();

        let result = CursorWalker::<CanceledProposal>::new(&graph, &[CANCELED_FEED], None, 0);

        assert!(matches!(result, Err(GovernanceError::InvalidConfiguration { .. })));
    }
}
