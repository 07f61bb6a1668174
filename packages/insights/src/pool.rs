//! Bounded-concurrency execution of a worker over a list of items.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Run `f(item, index)` over every item with at most `limit` calls in flight.
///
/// A new call starts as soon as a slot frees up. The returned vector is
/// aligned with the input order regardless of completion order. Workers
/// report failure through their output type, so one failing item never
/// stops the others.
///
/// An empty input or a `limit` of zero returns an empty vector without
/// invoking `f`.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, mut f: F) -> Vec<R>
where
    F: FnMut(T, usize) -> Fut,
    Fut: Future<Output = R>,
{
    let n = items.len();
    if n == 0 || limit == 0 {
        return Vec::new();
    }
    let limit = limit.min(n);

    let mut completed: Vec<(usize, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = f(item, index);
            async move { (index, fut.await) }
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    completed.sort_unstable_by_key(|(index, _)| *index);
    completed.into_iter().map(|(_, result)| result).collect()
}
