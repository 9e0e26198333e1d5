//! The Input Queue: a single FIFO shared by every event producer (chain
//! observer, network relay, API server, delay timer), consumed by exactly
//! one node-loop thread. Sequence ids are assigned atomically at `enqueue`
//! time so the dequeue order is the protocol's linearization point.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is shutting down, item not enqueued")]
    ShuttingDown,
}

/// An item tagged with the monotonic sequence id it was assigned at
/// enqueue time.
#[derive(Clone, Debug)]
pub struct Sequenced<T> {
    pub id: u64,
    pub item: T,
}

struct Shared {
    next_id: AtomicU64,
    shutting_down: AtomicBool,
}

/// The producer handle. Cheaply cloned and shared across every enqueuing
/// thread/task.
#[derive(Clone)]
pub struct QueueHandle<T> {
    tx: mpsc::UnboundedSender<Sequenced<T>>,
    shared: Arc<Shared>,
}

impl<T> QueueHandle<T> {
    /// Assigns the next sequence id and pushes `item` onto the queue.
    /// Returns the assigned id, or an error once shutdown has been
    /// initiated (the queue never silently drops an item while open).
    pub fn enqueue(&self, item: T) -> Result<u64, QueueError> {
        if self.shared.shutting_down.load(Ordering::Acquire) {
            return Err(QueueError::ShuttingDown);
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(Sequenced { id, item }).is_err() {
            return Err(QueueError::ShuttingDown);
        }
        Ok(id)
    }

    pub fn initiate_shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::Release);
    }
}

/// The single-consumer half, held only by the Node Runtime (C5).
pub struct QueueConsumer<T> {
    rx: mpsc::UnboundedReceiver<Sequenced<T>>,
}

impl<T> QueueConsumer<T> {
    /// Blocks (asynchronously) until an item is available, or returns
    /// `None` once every producer handle has been dropped and the channel
    /// has drained (the terminal shutdown signal).
    pub async fn dequeue(&mut self) -> Option<Sequenced<T>> {
        self.rx.recv().await
    }
}

/// Constructs a fresh queue and its matching producer/consumer halves.
/// Sequence ids start at 1.
pub fn channel<T>() -> (QueueHandle<T>, QueueConsumer<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        next_id: AtomicU64::new(1),
        shutting_down: AtomicBool::new(false),
    });
    (QueueHandle { tx, shared }, QueueConsumer { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_ids_are_monotonic_and_gap_free() {
        let (handle, mut consumer) = channel::<&'static str>();
        let a = handle.enqueue("a").unwrap();
        let b = handle.enqueue("b").unwrap();
        let c = handle.enqueue("c").unwrap();
        assert_eq!((a, b, c), (1, 2, 3));

        assert_eq!(consumer.dequeue().await.unwrap().id, 1);
        assert_eq!(consumer.dequeue().await.unwrap().id, 2);
        assert_eq!(consumer.dequeue().await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn dropping_every_producer_closes_the_consumer() {
        let (handle, mut consumer) = channel::<u32>();
        handle.enqueue(1).unwrap();
        drop(handle);
        assert_eq!(consumer.dequeue().await.unwrap().item, 1);
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_rejects_further_enqueues() {
        let (handle, _consumer) = channel::<u32>();
        handle.initiate_shutdown();
        assert!(matches!(handle.enqueue(1), Err(QueueError::ShuttingDown)));
    }
}
