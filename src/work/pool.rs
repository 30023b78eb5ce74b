//! Fixed-width worker pool with a zero-slack hand-off.
//!
//! Each idle worker offers a one-shot slot on the ready channel; the producer
//! fills exactly one slot per item. An item therefore leaves the producer only
//! when a worker is free to run it, and at most `width` items are in flight.
//! Dropping the ready receiver signals end of work; joining every worker is
//! the barrier.
//!
//! Every item runs in its own task, so a panic is confined to that item and
//! its worker moves on to the next one.

use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// A worker's offer to take one item.
type Slot<T> = oneshot::Sender<(usize, T)>;

/// Runs `work` on every item with at most `width` calls in flight.
///
/// Returns one entry per item, in input order. An item whose work panicked
/// yields the [`JoinError`] instead of an output.
pub async fn dispatch<T, O, F, Fut>(width: usize, items: Vec<T>, work: F) -> Vec<Result<O, JoinError>>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let total = items.len();
    let width = width.clamp(1, total);
    let (ready_tx, mut ready_rx) = mpsc::channel::<Slot<T>>(width);

    let mut workers = JoinSet::new();
    for worker in 0..width {
        let ready_tx = ready_tx.clone();
        let work = work.clone();
        workers.spawn(async move {
            let mut done = Vec::new();
            loop {
                let (slot, item) = oneshot::channel();
                if ready_tx.send(slot).await.is_err() {
                    break;
                }
                let Ok((index, item)) = item.await else {
                    break;
                };
                let work = work.clone();
                let outcome = tokio::spawn(async move { work(item).await }).await;
                if let Err(e) = &outcome {
                    warn!(worker, index, "Work item failed: {e}");
                }
                done.push((index, outcome));
            }
            debug!(worker, processed = done.len(), "Worker finished");
            done
        });
    }
    drop(ready_tx);

    let mut pending = items.into_iter().enumerate();
    let mut next = pending.next();
    while let Some(entry) = next.take() {
        let Some(slot) = ready_rx.recv().await else {
            error!("All workers stopped before the queue was drained");
            break;
        };
        match slot.send(entry) {
            Ok(()) => next = pending.next(),
            // The worker went away while offering; hand the item to the next one.
            Err(entry) => next = Some(entry),
        }
    }
    drop(ready_rx);

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(done) => results.extend(done),
            Err(e) => error!("Worker stopped: {e}"),
        }
    }

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, outcome)| outcome).collect()
}
