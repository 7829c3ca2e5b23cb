//! Bounded parallel fan-out used by every orchestrator phase.

use std::future::Future;
use std::sync::Arc;

use snafu::ResultExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{JoinSnafu, Result};

/// Concurrency limit for `count` items given a configured maximum, where
/// `0` means unlimited. Never exceeds `count`.
#[must_use]
pub fn worker_limit(max_workers: usize, count: usize) -> usize {
    if max_workers == 0 || max_workers > count {
        count
    } else {
        max_workers
    }
}

/// Run `f` over `items` on separate tasks with at most `limit` in flight,
/// returning once every task has finished. Results come back in completion
/// order.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let total = items.len();

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let work = f(item);
        set.spawn(async move {
            // the semaphore is never closed, so acquiring cannot fail
            let _permit = semaphore.acquire_owned().await;
            work.await
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        results.push(joined.context(JoinSnafu)?);
    }
    Ok(results)
}
