//! Chain Observer Adapter: wraps whatever on-chain client the deployment
//! actually uses, and turns its observations into `ChainInput`s on the
//! input queue. The underlying client is an external collaborator this
//! crate doesn't implement (see [`ChainClient`]); tests use a stub.

use std::sync::Mutex;

use async_trait::async_trait;
use hydra_consensus::{ChainInput, ChainState, Input, PostChainTx};
use hydra_ledger::Ledger;
use hydra_queue::QueueHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainAdapterError {
    #[error("input queue is shutting down")]
    QueueShuttingDown,
}

impl From<hydra_queue::QueueError> for ChainAdapterError {
    fn from(_: hydra_queue::QueueError) -> Self {
        ChainAdapterError::QueueShuttingDown
    }
}

/// The actual chain submission the adapter delegates to. A production
/// deployment implements this against whatever chain client it runs; this
/// crate only defines the shape and the retry-free posting discipline (the
/// core never auto-retries a chain post).
#[async_trait]
pub trait ChainClient<L: Ledger>: Send + Sync {
    async fn submit(&self, tx: PostChainTx<L>) -> Result<(), String>;
}

/// Wraps a [`ChainClient`] plus the mutex-guarded chain-state view that
/// observation callbacks read and update before an event reaches the queue.
pub struct ChainObserverAdapter<L: Ledger, C: ChainClient<L>> {
    state: Mutex<ChainState>,
    queue: QueueHandle<Input<L>>,
    client: C,
}

impl<L: Ledger, C: ChainClient<L>> ChainObserverAdapter<L, C> {
    pub fn new(initial: ChainState, queue: QueueHandle<Input<L>>, client: C) -> Self {
        Self {
            state: Mutex::new(initial),
            queue,
            client,
        }
    }

    /// Invokes `callback` with the current chain-state view under the
    /// adapter's lock. If it returns `Some((new_state, event))`, the view is
    /// advanced and the event is enqueued as an `Observation` before the
    /// lock is released, so two events observed within one block callback
    /// chain-update the state seen by the next one.
    pub fn observe<F>(&self, callback: F) -> Result<(), ChainAdapterError>
    where
        F: FnOnce(&ChainState) -> Option<(ChainState, hydra_consensus::ChainEvent<L>)>,
    {
        let mut guard = self.state.lock().expect("chain state mutex poisoned");
        let Some((new_state, event)) = callback(&guard) else {
            return Ok(());
        };
        *guard = new_state.clone();
        self.queue.enqueue(Input::Chain(ChainInput::Observation {
            event,
            new_chain_state: new_state,
        }))?;
        Ok(())
    }

    /// Reverts the accumulated chain-state view to `to` and enqueues a
    /// `Rollback` input, e.g. on a detected reorg.
    pub fn rollback(&self, to: ChainState) -> Result<(), ChainAdapterError> {
        let mut guard = self.state.lock().expect("chain state mutex poisoned");
        *guard = to.clone();
        self.queue
            .enqueue(Input::Chain(ChainInput::Rollback { to_chain_state: to }))?;
        Ok(())
    }

    /// Submits `tx` via the wrapped client. On failure, enqueues
    /// `PostTxFailed` rather than retrying (posting is not auto-retried).
    pub async fn post(&self, tx: PostChainTx<L>) -> Result<(), ChainAdapterError> {
        if let Err(reason) = self.client.submit(tx).await {
            tracing::warn!(reason = %reason, "chain transaction post failed");
            self.queue
                .enqueue(Input::Chain(ChainInput::PostTxFailed { reason }))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hydra_consensus::state::ChainPoint;
    use hydra_consensus::ChainEvent;
    use hydra_primitives::buf::Buf32;
    use hydra_primitives::party::{ContestationPeriod, HeadId, HeadParameters, Party};
    use hydra_test_utils::{toy_party, ToyLedger};

    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl ChainClient<ToyLedger> for AlwaysFails {
        async fn submit(&self, _tx: PostChainTx<ToyLedger>) -> Result<(), String> {
            Err("no chain connection".into())
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl ChainClient<ToyLedger> for AlwaysSucceeds {
        async fn submit(&self, _tx: PostChainTx<ToyLedger>) -> Result<(), String> {
            Ok(())
        }
    }

    fn chain_state(height: u64) -> ChainState {
        ChainState {
            point: ChainPoint {
                height,
                block_hash: Buf32::zero(),
            },
        }
    }

    #[tokio::test]
    async fn observe_enqueues_event_and_advances_state() {
        let (handle, mut consumer) = hydra_queue::channel::<Input<ToyLedger>>();
        let adapter = ChainObserverAdapter::new(chain_state(0), handle, AlwaysSucceeds);

        let party = toy_party(1);
        let head_id = HeadId(Buf32::from([7u8; 32]));
        let params = HeadParameters::new(
            vec![party],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(10)),
        );

        adapter
            .observe(|_current| {
                Some((
                    chain_state(1),
                    ChainEvent::ObservedInit {
                        head_id,
                        params: params.clone(),
                        seed_tx_in: Buf32::zero(),
                    },
                ))
            })
            .unwrap();

        let received = consumer.dequeue().await;
        assert!(matches!(
            received,
            Some(hydra_queue::Sequenced {
                item: Input::Chain(ChainInput::Observation { .. }),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn observe_callback_returning_none_enqueues_nothing() {
        let (handle, consumer) = hydra_queue::channel::<Input<ToyLedger>>();
        let adapter = ChainObserverAdapter::new(chain_state(0), handle.clone(), AlwaysSucceeds);

        adapter.observe(|_| None).unwrap();
        drop(handle);
        let mut consumer = consumer;
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn failed_post_enqueues_post_tx_failed() {
        let (handle, mut consumer) = hydra_queue::channel::<Input<ToyLedger>>();
        let adapter = ChainObserverAdapter::new(chain_state(0), handle, AlwaysFails);

        adapter.post(PostChainTx::CollectComTx).await.unwrap();

        let received = consumer.dequeue().await;
        assert!(matches!(
            received,
            Some(hydra_queue::Sequenced {
                item: Input::Chain(ChainInput::PostTxFailed { .. }),
                ..
            })
        ));
    }
}
