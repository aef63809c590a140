//! Crashpad execution layer.
//!
//! This crate contains the crash table state machine ([`CrashTable`]), the escrow [`Ledger`] it
//! settles through, and the provably fair randomness behind every round.
//!
//! ## Single writer
//! - Balances, the treasury, config, round logs, table escrow and the audit trail are only
//!   written by [`Ledger`]; tables and the admin console call into it.
//! - The ledger persists through [`State`] before updating memory, so a failed write never leaves
//!   a half-applied change behind.
//! - Nothing here spawns tasks or locks; callers serialize access (the service holds everything
//!   behind one mutex).
//!
//! ## Time
//! Wall-clock time only enters through [`Clock`]. Tests drive it with
//! [`mocks::ManualClock`].
//!
//! ## Driving a table (example)
//! ```rust,ignore
//! use crashpad_execution::{CrashTable, HashChain, Ledger, PhaseConfig, RoundSeeder, TableMode};
//!
//! let mut ledger = Ledger::open(state, clock.clone())?;
//! ledger.recover_table("real")?;
//! let seeder = RoundSeeder::new(HashChain::random(&mut OsRng), "crashpad", ledger.next_nonce("real"));
//! let mut table = CrashTable::new(TableMode::Real, PhaseConfig::default(), seeder, clock);
//!
//! table.place_bet(&mut ledger, "0712345678", 0, 100, None)?;
//! loop {
//!     table.tick(&mut ledger);
//!     for event in table.drain_events() {
//!         // broadcast
//!     }
//! }
//! ```

pub mod admin;
pub mod bets;
pub mod crowd;
pub mod engine;
pub mod ledger;
pub mod rng_pipeline;
pub mod round_scheduler;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod state;

#[cfg(test)]
mod ledger_tests;
#[cfg(test)]
mod round_lifecycle_tests;

pub use admin::{AdminConsole, AdminError};
pub use bets::{settle_payout, Bet, BetBook, CashOut, Exposure, RoundTally};
pub use crowd::{Crowd, SimulatedPlayer};
pub use engine::{CrashTable, RoomEntry, RoundEvent, TableError, TableMode, TableSnapshot};
pub use ledger::{Backup, Delta, Ledger, LedgerError, Mutation, Recovery, SYSTEM_ACTOR};
pub use rng_pipeline::{
    compute_commitment, crash_point, verify_log, verify_round, FairnessError, HashChain,
    RoundSeeder, SeedPair,
};
pub use round_scheduler::{Clock, PhaseConfig, SystemClock};
pub use state::{State, Status};

#[cfg(any(test, feature = "mocks"))]
pub use state::Memory;
