//! The head-logic state machine's transition logic, split by input source:
//! client commands, network protocol messages, chain observations, and time.

mod chain;
mod client;
mod network;
mod tick;

use hydra_ledger::Ledger;

use crate::env::Env;
use crate::messages::{Input, Outcome};
use crate::state::EngineState;

/// The single entry point into the core: a pure function from `(env, state,
/// input)` to `(new_state, effects)`. Never performs I/O.
pub fn step<L: Ledger>(env: &Env, engine: EngineState<L>, input: Input<L>) -> Outcome<L> {
    match input {
        Input::Client(cmd) => client::handle_client(env, engine, cmd),
        Input::Network(input) => network::handle_network(env, engine, input),
        Input::Chain(input) => chain::handle_chain(env, engine, input),
        Input::Tick { now } => tick::handle_tick(env, engine, now),
    }
}
