//! JSON wire protocol.
//!
//! Clients send [`Inbound`] messages tagged by `"type"` and get exactly one [`Response`] per
//! message, correlated by `requestId`. Table activity is pushed to every connection as
//! [`Broadcast`] messages. Account and admin commands act for the identity bound to the
//! connection by `register` or `identify` (see [`crate::session`]).

use crashpad_execution::{
    AdminError, LedgerError, RoundEvent, SimulatedPlayer, TableError, TableMode,
};
use crashpad_types::casino::{ConfigPatch, RoomId, Wallet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Player commands act on the account bound to the connection, never on an id in the message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Inbound {
    /// Creates a player account and binds the connection to it.
    Register {
        request_id: String,
        account_id: String,
    },
    /// Binds the connection to an existing account. The admin token is only needed for admin
    /// commands.
    Identify {
        request_id: String,
        account_id: String,
        #[serde(default)]
        access_key: Option<String>,
        #[serde(default)]
        admin_token: Option<String>,
    },
    Deposit {
        request_id: String,
        amount: u64,
    },
    Withdraw {
        request_id: String,
        amount: u64,
    },
    Balance {
        request_id: String,
    },
    PlaceBet {
        request_id: String,
        table: TableMode,
        slot: u8,
        stake: u64,
        #[serde(default)]
        auto_cash_out: Option<f64>,
    },
    CancelBet {
        request_id: String,
        table: TableMode,
        slot: u8,
    },
    CashOut {
        request_id: String,
        table: TableMode,
        slot: u8,
    },
    SetAutoCashOut {
        request_id: String,
        table: TableMode,
        slot: u8,
        #[serde(default)]
        target: Option<f64>,
    },
    SetClientSeed {
        request_id: String,
        table: TableMode,
        client_seed: String,
    },
    Snapshot {
        request_id: String,
        table: TableMode,
    },
    Admin {
        request_id: String,
        command: AdminCommand,
    },
}

impl Inbound {
    pub fn request_id(&self) -> &str {
        match self {
            Inbound::Register { request_id, .. }
            | Inbound::Identify { request_id, .. }
            | Inbound::Deposit { request_id, .. }
            | Inbound::Withdraw { request_id, .. }
            | Inbound::Balance { request_id, .. }
            | Inbound::PlaceBet { request_id, .. }
            | Inbound::CancelBet { request_id, .. }
            | Inbound::CashOut { request_id, .. }
            | Inbound::SetAutoCashOut { request_id, .. }
            | Inbound::SetClientSeed { request_id, .. }
            | Inbound::Snapshot { request_id, .. }
            | Inbound::Admin { request_id, .. } => request_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AdminCommand {
    ForceCrash {
        table: TableMode,
    },
    SetNextCrash {
        table: TableMode,
        multiplier: f64,
    },
    SwitchRoom {
        table: TableMode,
        room: RoomId,
        /// Join a round already in flight at this multiplier instead of counting down.
        #[serde(default)]
        join_at: Option<f64>,
    },
    SetBalance {
        account_id: String,
        wallet: Wallet,
        balance: u64,
    },
    SetFrozen {
        account_id: String,
        frozen: bool,
    },
    SetBanned {
        account_id: String,
        banned: bool,
    },
    DeleteAccount {
        account_id: String,
    },
    HouseDeposit {
        amount: u64,
    },
    HouseWithdraw {
        amount: u64,
    },
    UpdateConfig {
        patch: ConfigPatch,
    },
    ExportBackup,
    ImportBackup {
        backup: String,
    },
    RoundHistory {
        #[serde(default = "default_history_limit")]
        limit: usize,
    },
    AuditLog {
        #[serde(default = "default_history_limit")]
        limit: usize,
    },
    LiveExposure {
        table: TableMode,
    },
}

fn default_history_limit() -> usize {
    50
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Response {
    Ack {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Error {
        request_id: String,
        code: &'static str,
        message: String,
    },
}

impl Response {
    pub fn error(request_id: impl Into<String>, err: &FloorError) -> Self {
        Response::Error {
            request_id: request_id.into(),
            code: err.code(),
            message: err.public_message(),
        }
    }
}

/// Display-only crowd state, pushed when it changes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename = "crowd_updated", rename_all = "camelCase")]
pub struct CrowdUpdate {
    pub table: &'static str,
    pub online: usize,
    pub cashed_out: usize,
    pub players: Vec<SimulatedPlayer>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Broadcast {
    Round(RoundEvent),
    Crowd(CrowdUpdate),
}

#[derive(Debug, Error)]
pub enum FloorError {
    #[error("the {0} table is not running")]
    TableDisabled(&'static str),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("identify or register first")]
    NotIdentified,
    #[error("connection already speaks for {0}")]
    AlreadyIdentified(String),
    #[error("invalid credentials")]
    BadCredentials,
    #[error("admin commands need an admin session")]
    AdminSessionRequired,
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Admin(#[from] AdminError),
}

impl FloorError {
    /// Stable wire code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            FloorError::TableDisabled(_) => "TABLE_DISABLED",
            FloorError::Malformed(_) => "INVALID_MESSAGE",
            FloorError::NotIdentified => "NOT_IDENTIFIED",
            FloorError::AlreadyIdentified(_) => "ALREADY_IDENTIFIED",
            FloorError::BadCredentials | FloorError::AdminSessionRequired => "UNAUTHORIZED",
            FloorError::Table(err) => table_code(err),
            FloorError::Ledger(err) => ledger_code(err),
            FloorError::Admin(AdminError::Unauthorized(_)) => "UNAUTHORIZED",
            FloorError::Admin(AdminError::Table(err)) => table_code(err),
            FloorError::Admin(AdminError::Ledger(err)) => ledger_code(err),
        }
    }

    /// Message sent to clients. Storage failures are not described on the wire.
    pub fn public_message(&self) -> String {
        if self.code() == "INTERNAL" {
            return "internal error".to_string();
        }
        self.to_string()
    }
}

fn table_code(err: &TableError) -> &'static str {
    match err {
        TableError::InvalidSlot(_) => "INVALID_SLOT",
        TableError::BetOutOfRange { .. } => "BET_OUT_OF_RANGE",
        TableError::Maintenance => "MAINTENANCE",
        TableError::DemoDisabled => "DEMO_DISABLED",
        TableError::WrongPhase(_) => "WRONG_PHASE",
        TableError::SlotOccupied(_) => "SLOT_OCCUPIED",
        TableError::NoBet => "NO_BET",
        TableError::AlreadyCashedOut => "ALREADY_CASHED_OUT",
        TableError::BetsLive => "BETS_LIVE",
        TableError::InvalidMultiplier => "INVALID_MULTIPLIER",
        TableError::InvalidClientSeed => "INVALID_CLIENT_SEED",
        TableError::Ledger(err) => ledger_code(err),
    }
}

fn ledger_code(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
        LedgerError::AccountExists(_) => "ACCOUNT_EXISTS",
        LedgerError::InvalidAccountId => "INVALID_ACCOUNT_ID",
        LedgerError::Frozen(_) => "ACCOUNT_FROZEN",
        LedgerError::Banned(_) => "ACCOUNT_BANNED",
        LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
        LedgerError::InsufficientHouseFunds { .. } => "INSUFFICIENT_HOUSE_FUNDS",
        LedgerError::ProtectedAccount(_) => "PROTECTED_ACCOUNT",
        LedgerError::InvalidAmount => "INVALID_AMOUNT",
        LedgerError::InvalidConfig(_) => "INVALID_CONFIG",
        LedgerError::InvalidBackup(_) => "INVALID_BACKUP",
        LedgerError::Persistence(_) => "INTERNAL",
    }
}
