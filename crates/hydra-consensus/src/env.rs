//! The local environment `step` is parameterized over: identity, timing
//! policy, and protocol constants fixed for this node (built once at
//! startup by `RunOptions`/`initEnvironment`).

use std::time::Duration;

use hydra_crypto::sign::SigningKey;
use hydra_primitives::party::Party;

/// Local party identity and policy, built once at startup by the CLI/runtime
/// (`initEnvironment`) and threaded through every `step` call.
pub struct Env {
    pub party: Party,
    /// The rest of the head's counterparties, as configured at startup
    /// (`RunOptions.peers`); combined with `party` to form `HeadParameters`
    /// when this node originates `Init`.
    pub other_parties: Vec<Party>,
    pub signing_key: SigningKey,
    /// Initial TTL assigned to a `ReqTx` we originate or decide to relay.
    /// Decided in DESIGN.md; must be positive.
    pub req_tx_initial_ttl: u32,
    /// How much to extend a contestation deadline on each observed
    /// `Contest`; decided in DESIGN.md as a full contestation period added
    /// to the deadline's current value.
    pub contestation_period: Duration,
    /// Depth of the rollback checkpoint ring.
    pub checkpoint_depth: usize,
}

impl Env {
    pub fn new(party: Party, signing_key: SigningKey, contestation_period: Duration) -> Self {
        Self {
            party,
            other_parties: Vec::new(),
            signing_key,
            req_tx_initial_ttl: 5,
            contestation_period,
            checkpoint_depth: 100,
        }
    }

    pub fn with_other_parties(mut self, other_parties: Vec<Party>) -> Self {
        self.other_parties = other_parties;
        self
    }

    /// All parties in the head, local party included, in the canonical
    /// order `HeadParameters` enforces.
    pub fn all_parties(&self) -> Vec<Party> {
        let mut parties = self.other_parties.clone();
        parties.push(self.party);
        parties
    }
}
