//! Party identity and fixed head parameters.

use std::time::Duration;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// A participant in a head, identified by the raw bytes of its verification key.
///
/// Ordering is the canonical party ordering used for leader rotation and
/// signature-set canonicalization; it must be identical across all honest
/// parties, which is guaranteed here since it derives from the key bytes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Party(pub Buf32);

impl Party {
    pub fn from_verification_key_bytes(bytes: [u8; 32]) -> Self {
        Self(Buf32::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl BorshSerialize for Party {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl BorshDeserialize for Party {
    fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self(Buf32::deserialize_reader(reader)?))
    }
}

/// Opaque identifier minted by the chain at head initialization.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct HeadId(pub Buf32);

impl BorshSerialize for HeadId {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl BorshDeserialize for HeadId {
    fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self(Buf32::deserialize_reader(reader)?))
    }
}

/// Duration of the on-chain contestation window, serializable as milliseconds.
#[derive(Copy, Clone, Eq, PartialEq, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ContestationPeriod {
    millis: u64,
}

impl ContestationPeriod {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            millis: d.as_millis() as u64,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

/// Immutable parameters fixed for the lifetime of a head.
///
/// `parties` must be non-empty and is kept in the canonical (sorted) order
/// used throughout the protocol; [`HeadParameters::new`] enforces this.
#[derive(Clone, Eq, PartialEq, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct HeadParameters {
    parties: Vec<Party>,
    contestation_period: ContestationPeriod,
}

impl HeadParameters {
    pub fn new(mut parties: Vec<Party>, contestation_period: ContestationPeriod) -> Self {
        parties.sort();
        parties.dedup();
        Self {
            parties,
            contestation_period,
        }
    }

    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    pub fn contestation_period(&self) -> ContestationPeriod {
        self.contestation_period
    }

    pub fn contains(&self, party: &Party) -> bool {
        self.parties.binary_search(party).is_ok()
    }

    /// Deterministic snapshot-leader selection: `parties[n mod |parties|]`.
    pub fn leader_for(&self, snapshot_number: u64) -> Party {
        let idx = (snapshot_number as usize) % self.parties.len();
        self.parties[idx]
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(b: u8) -> Party {
        Party::from_verification_key_bytes([b; 32])
    }

    #[test]
    fn leader_rotates_over_canonical_order() {
        let params = HeadParameters::new(
            vec![party(2), party(1)],
            ContestationPeriod::from_duration(Duration::from_secs(10)),
        );
        // canonical order is sorted: [party(1), party(2)]
        assert_eq!(params.parties()[0], party(1));
        assert_eq!(params.leader_for(0), party(1));
        assert_eq!(params.leader_for(1), party(2));
        assert_eq!(params.leader_for(2), party(1));
    }

    #[test]
    fn contains_checks_membership() {
        let params = HeadParameters::new(
            vec![party(1), party(2)],
            ContestationPeriod::from_duration(Duration::from_secs(10)),
        );
        assert!(params.contains(&party(1)));
        assert!(!params.contains(&party(3)));
    }
}
