//! Bounded-concurrency execution of per-item async work.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::debug;

/// Limits how many calls to an external service are in flight at once.
///
/// Every method returns results in input order.
#[derive(Debug, Clone, Copy)]
pub struct BoundedPool {
    max_in_flight: usize,
}

impl BoundedPool {
    /// A pool allowing `max_in_flight` concurrent calls (at least one).
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Run `f` over every item, starting a new call as soon as one finishes.
    pub async fn map<I, F, Fut>(&self, items: I, f: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        stream::iter(items)
            .map(f)
            .buffered(self.max_in_flight)
            .collect()
            .await
    }

    /// Run `f` in fixed windows of `max_in_flight` items. A window starts
    /// only after the previous one has fully completed.
    pub async fn map_windowed<I, F, Fut>(&self, items: I, mut f: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        let mut items = items.into_iter().peekable();
        let mut results = Vec::new();
        let mut window_index = 0usize;

        while items.peek().is_some() {
            let window: Vec<_> = items.by_ref().take(self.max_in_flight).collect();
            debug!(window = window_index, size = window.len(), "Processing window");
            results.extend(join_all(window.into_iter().map(&mut f)).await);
            window_index += 1;
        }
        results
    }

    /// Run `f` one item at a time, sleeping `delay` between calls.
    pub async fn map_sequential<I, F, Fut>(&self, items: I, delay: Duration, mut f: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        let mut results = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            results.push(f(item).await);
        }
        results
    }
}

impl Default for BoundedPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AI_CONCURRENCY)
    }
}
