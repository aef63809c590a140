use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};

use super::{
    opt_string_encode_size, read_opt_string, read_string, string_encode_size, write_opt_string,
    write_string, Multiplier, RoomId, MAX_ACCOUNT_ID_LENGTH, MAX_HISTORY, MAX_NOTE_LENGTH,
    STARTING_DEMO_BALANCE,
};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player = 0,
    Admin = 1,
}

impl TryFrom<u8> for Role {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Player),
            1 => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl Write for Role {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Role {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        Role::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for Role {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Which of an account's two isolated balances an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wallet {
    Real,
    Demo,
}

impl Wallet {
    pub fn is_demo(&self) -> bool {
        matches!(self, Wallet::Demo)
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Bet = 0,
    Win = 1,
    Deposit = 2,
    Withdraw = 3,
    AdminAdjust = 4,
    HouseWithdraw = 5,
    HouseDeposit = 6,
    Refund = 7,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Bet => "bet",
            TransactionKind::Win => "win",
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::AdminAdjust => "admin_adjust",
            TransactionKind::HouseWithdraw => "house_withdraw",
            TransactionKind::HouseDeposit => "house_deposit",
            TransactionKind::Refund => "refund",
        }
    }
}

impl TryFrom<u8> for TransactionKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransactionKind::Bet),
            1 => Ok(TransactionKind::Win),
            2 => Ok(TransactionKind::Deposit),
            3 => Ok(TransactionKind::Withdraw),
            4 => Ok(TransactionKind::AdminAdjust),
            5 => Ok(TransactionKind::HouseWithdraw),
            6 => Ok(TransactionKind::HouseDeposit),
            7 => Ok(TransactionKind::Refund),
            _ => Err(()),
        }
    }
}

impl Write for TransactionKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for TransactionKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        TransactionKind::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for TransactionKind {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Immutable record of a single balance change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub amount: i64,
    pub multiplier: Option<Multiplier>,
    pub timestamp_ms: u64,
    /// Balance of the affected wallet after the change.
    pub balance_after: u64,
    pub room: Option<RoomId>,
    pub note: Option<String>,
    pub demo: bool,
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.kind.write(writer);
        self.amount.write(writer);
        self.multiplier.write(writer);
        self.timestamp_ms.write(writer);
        self.balance_after.write(writer);
        self.room.write(writer);
        write_opt_string(self.note.as_deref(), writer);
        self.demo.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            kind: TransactionKind::read(reader)?,
            amount: i64::read(reader)?,
            multiplier: Option::<Multiplier>::read(reader)?,
            timestamp_ms: u64::read(reader)?,
            balance_after: u64::read(reader)?,
            room: Option::<RoomId>::read(reader)?,
            note: read_opt_string(reader, MAX_NOTE_LENGTH)?,
            demo: bool::read(reader)?,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.kind.encode_size()
            + self.amount.encode_size()
            + self.multiplier.encode_size()
            + self.timestamp_ms.encode_size()
            + self.balance_after.encode_size()
            + self.room.encode_size()
            + opt_string_encode_size(self.note.as_deref())
            + self.demo.encode_size()
    }
}

/// A player or admin account with isolated real and demo wallets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub role: Role,
    pub balance: u64,
    pub demo_balance: u64,
    pub frozen: bool,
    pub banned: bool,
    pub created_at_ms: u64,
    pub total_deposited: u64,
    pub total_withdrawn: u64,
    /// Most recent transactions, oldest first.
    pub history: Vec<Transaction>,
}

impl Account {
    pub fn new(id: impl Into<String>, role: Role, created_at_ms: u64) -> Self {
        Self {
            id: id.into(),
            role,
            balance: 0,
            demo_balance: STARTING_DEMO_BALANCE,
            frozen: false,
            banned: false,
            created_at_ms,
            total_deposited: 0,
            total_withdrawn: 0,
            history: Vec::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn wallet_balance(&self, wallet: Wallet) -> u64 {
        match wallet {
            Wallet::Real => self.balance,
            Wallet::Demo => self.demo_balance,
        }
    }

    pub fn wallet_balance_mut(&mut self, wallet: Wallet) -> &mut u64 {
        match wallet {
            Wallet::Real => &mut self.balance,
            Wallet::Demo => &mut self.demo_balance,
        }
    }

    /// Appends a transaction, dropping the oldest entries past [`MAX_HISTORY`].
    pub fn push_transaction(&mut self, tx: Transaction) {
        self.history.push(tx);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.id, writer);
        self.role.write(writer);
        self.balance.write(writer);
        self.demo_balance.write(writer);
        self.frozen.write(writer);
        self.banned.write(writer);
        self.created_at_ms.write(writer);
        self.total_deposited.write(writer);
        self.total_withdrawn.write(writer);
        self.history.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let id = read_string(reader, MAX_ACCOUNT_ID_LENGTH)?;
        if id.is_empty() {
            return Err(Error::Invalid("Account", "empty id"));
        }
        Ok(Self {
            id,
            role: Role::read(reader)?,
            balance: u64::read(reader)?,
            demo_balance: u64::read(reader)?,
            frozen: bool::read(reader)?,
            banned: bool::read(reader)?,
            created_at_ms: u64::read(reader)?,
            total_deposited: u64::read(reader)?,
            total_withdrawn: u64::read(reader)?,
            history: Vec::<Transaction>::read_range(reader, 0..=MAX_HISTORY)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.id)
            + self.role.encode_size()
            + self.balance.encode_size()
            + self.demo_balance.encode_size()
            + self.frozen.encode_size()
            + self.banned.encode_size()
            + self.created_at_ms.encode_size()
            + self.total_deposited.encode_size()
            + self.total_withdrawn.encode_size()
            + self.history.encode_size()
    }
}
