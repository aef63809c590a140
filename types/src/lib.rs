//! Common types shared by the crashpad execution layer and services.
//!
//! [`casino`] holds the domain model (accounts, transactions, rounds, treasury, configuration and
//! audit entries). [`execution`] holds the storage keyspace used to persist it.

pub mod casino;
pub mod execution;

pub use casino::{
    Account, AuditEntry, CommitmentSource, ConfigPatch, GameConfig, HouseSnapshot, HouseTreasury,
    Multiplier, Role, Room, RoomId, RoundLog, RoundPhase, SecurityConfig, SecurityPatch,
    Severity, TableRecord, Transaction, TransactionKind, Wallet,
};
pub use execution::{Key, Value};
