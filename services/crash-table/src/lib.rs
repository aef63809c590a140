//! Crash table service.
//!
//! Hosts a real-money table and an optional demo table behind a WebSocket endpoint. The ledger
//! is persisted in SQLite through [`persistence::SqliteState`]; the `crashpad-admin` binary
//! works on the same database while the service is stopped.

pub mod config;
pub mod floor;
pub mod persistence;
pub mod protocol;
pub mod session;
