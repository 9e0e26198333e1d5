//! Implementation-level errors: corrupted local state or programmer bugs,
//! never protocol-level rejections (those are `ServerOutput`/`Effect`
//! values).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rollback target older than the checkpoint ring can recall (height {0})")]
    RollbackTooDeep(u64),

    #[error("tick arrived with no pending delayed event for head {0:?}")]
    UnexpectedTick(hydra_primitives::party::HeadId),
}
