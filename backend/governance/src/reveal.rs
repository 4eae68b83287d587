//! # Reveal Window
//!
//! A fully fetched, newest-first list exposed in fixed-size increments.
//!
//! ## Flow
//! - Everything is fetched once and sorted before the first window is shown
//! - `advance` grows the visible prefix by one page, clamped to the list
//! - Advancing past the end is a no-op
//! - `enrich` only touches visible items its predicate says still need work,
//!   so each item is enriched at most once
use std::future::Future;

use futures_util::future::try_join_all;

pub struct RevealWindow<T> {
    items: Vec<T>,
    page_size: usize,
    pages: usize,
}

impl<T> RevealWindow<T> {
    /// Sorts `items` descending by `key` and exposes the first page.
    ///
    /// A `page_size` of zero is treated as one.
    pub fn initialize<K, F>(mut items: Vec<T>, page_size: usize, key: F) -> Self
    where
        K: Ord,
        F: FnMut(&T) -> K,
    {
        items.sort_by_cached_key(key);
        items.reverse();

        Self {
            items,
            page_size: page_size.max(1),
            pages: 1,
        }
    }

    pub fn displayed(&self) -> &[T] {
        &self.items[..self.visible()]
    }

    /// Exposes one more page and returns the whole visible prefix.
    pub fn advance(&mut self) -> &[T] {
        if self.has_more() {
            self.pages += 1;
        }

        self.displayed()
    }

    pub fn has_more(&self) -> bool {
        self.visible() < self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn visible(&self) -> usize {
        self.pages.saturating_mul(self.page_size).min(self.items.len())
    }

    /// Runs `enrich` concurrently for every visible item `needs_enrichment`
    /// accepts, storing the results in place. Returns how many were enriched.
    ///
    /// On error nothing is written back.
    pub async fn enrich<P, F, Fut, E>(&mut self, needs_enrichment: P, enrich: F) -> Result<usize, E>
    where
        P: Fn(&T) -> bool,
        F: Fn(&T) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let visible = self.visible();
        let pending: Vec<usize> = (0..visible)
            .filter(|&index| needs_enrichment(&self.items[index]))
            .collect();

        let enriched = try_join_all(pending.iter().map(|&index| enrich(&self.items[index]))).await?;

        for (index, item) in pending.iter().zip(enriched) {
            self.items[*index] = item;
        }

        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        timestamp: u64,
        enriched: bool,
    }

    fn items(count: u64) -> Vec<Item> {
        (0..count)
            .map(|timestamp| Item {
                timestamp,
                enriched: false,
            })
            .collect()
    }

    #[test]
    fn windows_grow_by_page_and_clamp() {
        let mut window = RevealWindow::initialize(items(12), 5, |item| item.timestamp);

        assert_eq!(window.displayed().len(), 5);
        assert_eq!(window.advance().len(), 10);
        assert_eq!(window.advance().len(), 12);
        assert!(!window.has_more());
        assert_eq!(window.advance().len(), 12);
    }

    #[test]
    fn newest_first() {
        let window = RevealWindow::initialize(items(4), 2, |item| item.timestamp);

        let shown: Vec<u64> = window.displayed().iter().map(|item| item.timestamp).collect();
        assert_eq!(shown, [3, 2]);
    }

    #[test]
    fn empty_set() {
        let mut window = RevealWindow::initialize(Vec::<Item>::new(), 5, |item| item.timestamp);

        assert!(window.displayed().is_empty());
        assert!(window.advance().is_empty());
        assert!(window.is_empty());
    }

    #[tokio::test]
    async fn enrichment_only_touches_new_items() {
        let calls = AtomicUsize::new(0);
        let mut window = RevealWindow::initialize(items(7), 3, |item| item.timestamp);

        let enrich = |item: &Item| {
            calls.fetch_add(1, Ordering::SeqCst);
            let item = Item {
                enriched: true,
                ..item.clone()
            };
            async move { Ok::<_, String>(item) }
        };

        assert_eq!(window.enrich(|item| !item.enriched, &enrich).await.unwrap(), 3);
        assert_eq!(window.enrich(|item| !item.enriched, &enrich).await.unwrap(), 0);

        window.advance();
        assert_eq!(window.enrich(|item| !item.enriched, &enrich).await.unwrap(), 3);

        window.advance();
        assert_eq!(window.enrich(|item| !item.enriched, &enrich).await.unwrap(), 1);

        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert!(window.displayed().iter().all(|item| item.enriched));
    }

    #[tokio::test]
    async fn failed_enrichment_writes_nothing() {
        let mut window = RevealWindow::initialize(items(3), 3, |item| item.timestamp);

        let result = window
            .enrich(
                |item| !item.enriched,
                |item: &Item| {
                    let timestamp = item.timestamp;
                    async move {
                        if timestamp == 1 {
                            Err("subgraph down")
                        } else {
                            Ok(Item {
                                timestamp,
                                enriched: true,
                            })
                        }
                    }
                },
            )
            .await;

        assert_eq!(result, Err("subgraph down"));
        assert!(window.displayed().iter().all(|item| !item.enriched));
    }
}
