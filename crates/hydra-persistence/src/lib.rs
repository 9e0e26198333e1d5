//! Persistence log for `EngineState`: a single Borsh-encoded file per head,
//! written with write-temp-then-rename plus an explicit fsync so a crash
//! between the two never leaves a half-written file where the prior good
//! state used to be.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_consensus::EngineState;
use hydra_ledger::Ledger;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("state file is corrupt: {0}")]
    Corrupt(io::Error),
    #[error("{0}")]
    Other(String),
}

/// Durable store for a single head's `EngineState`, rooted at one directory.
///
/// Layout is intentionally flat: `<root>/state.borsh` is the live file,
/// `<root>/state.borsh.tmp` is the staging file used during `save`.
pub struct PersistenceLog {
    root: PathBuf,
}

impl PersistenceLog {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("state.borsh")
    }

    fn tmp_path(&self) -> PathBuf {
        self.root.join("state.borsh.tmp")
    }

    /// Loads the last persisted state, or `None` if nothing has been saved
    /// yet (a fresh head starts from `Idle` instead).
    pub fn load<L: Ledger>(&self) -> Result<Option<EngineState<L>>, PersistenceError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let state = EngineState::<L>::try_from_slice(&bytes).map_err(PersistenceError::Corrupt)?;
        Ok(Some(state))
    }

    /// Persists `state`, replacing whatever was previously saved.
    ///
    /// Writes to a temp file in the same directory, fsyncs it, renames it
    /// over the live file (atomic on the same filesystem), then fsyncs the
    /// directory so the rename itself survives a crash.
    pub fn save<L: Ledger>(&self, state: &EngineState<L>) -> Result<(), PersistenceError> {
        let tmp = self.tmp_path();
        let mut buf = Vec::new();
        state
            .serialize(&mut buf)
            .expect("borsh serialization to an in-memory buffer cannot fail");

        let file = File::create(&tmp)?;
        {
            use std::io::Write;
            let mut file = &file;
            file.write_all(&buf)?;
        }
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, self.state_path())?;
        sync_dir(&self.root)?;
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use hydra_consensus::state::ChainPoint;
    use hydra_consensus::{ChainState, HeadState};
    use hydra_primitives::buf::Buf32;
    use hydra_test_utils::ToyLedger;

    use super::*;

    fn idle_state() -> EngineState<ToyLedger> {
        let chain_state = ChainState {
            point: ChainPoint {
                height: 0,
                block_hash: Buf32::zero(),
            },
        };
        EngineState::new(HeadState::idle(chain_state), 100)
    }

    #[test]
    fn fresh_log_has_nothing_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistenceLog::open(dir.path()).unwrap();
        let loaded = log.load::<ToyLedger>().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistenceLog::open(dir.path()).unwrap();
        let state = idle_state();
        log.save(&state).unwrap();

        let loaded = log.load::<ToyLedger>().unwrap().expect("state was saved");
        assert_eq!(loaded.head.head_id(), state.head.head_id());
    }

    #[test]
    fn save_overwrites_prior_state_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistenceLog::open(dir.path()).unwrap();
        log.save(&idle_state()).unwrap();
        log.save(&idle_state()).unwrap();

        assert!(!log.tmp_path().exists());
        assert!(log.state_path().exists());
    }

    #[test]
    fn corrupt_file_is_reported_as_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistenceLog::open(dir.path()).unwrap();
        fs::write(log.state_path(), b"not borsh at all").unwrap();

        let err = log.load::<ToyLedger>().unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }
}
