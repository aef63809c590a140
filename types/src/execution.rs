//! Storage keyspace for persisted ledger state.
//!
//! Every record the ledger persists is a `(Key, Value)` pair. Both sides are tagged with a leading
//! byte so new record kinds can be added without disturbing existing ones.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};

use crate::casino::{
    read_string, string_encode_size, write_string, Account, AuditEntry, GameConfig,
    HouseTreasury, RoundLog, TableRecord, MAX_ACCOUNT_ID_LENGTH,
};

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Account by id (tag 0)
    Account(String),

    // Singletons (tags 1-2)
    House,
    Config,

    // Append-only logs keyed by sequence (tags 3-4)
    Round(u64),
    Audit(u64),

    /// Nonce high-water mark and escrowed bets by table label (tag 5)
    Table(String),
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(id) => {
                0u8.write(writer);
                write_string(id, writer);
            }
            Self::House => 1u8.write(writer),
            Self::Config => 2u8.write(writer),
            Self::Round(seq) => {
                3u8.write(writer);
                seq.write(writer);
            }
            Self::Audit(seq) => {
                4u8.write(writer);
                seq.write(writer);
            }
            Self::Table(label) => {
                5u8.write(writer);
                write_string(label, writer);
            }
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(read_string(reader, MAX_ACCOUNT_ID_LENGTH)?),
            1 => Self::House,
            2 => Self::Config,
            3 => Self::Round(u64::read(reader)?),
            4 => Self::Audit(u64::read(reader)?),
            5 => Self::Table(read_string(reader, MAX_ACCOUNT_ID_LENGTH)?),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(id) | Self::Table(id) => string_encode_size(id),
                Self::House | Self::Config => 0,
                Self::Round(_) | Self::Audit(_) => u64::SIZE,
            }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Value {
    Account(Account),
    House(HouseTreasury),
    Config(GameConfig),
    Round(RoundLog),
    Audit(AuditEntry),
    Table(TableRecord),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::House(house) => {
                1u8.write(writer);
                house.write(writer);
            }
            Self::Config(config) => {
                2u8.write(writer);
                config.write(writer);
            }
            Self::Round(round) => {
                3u8.write(writer);
                round.write(writer);
            }
            Self::Audit(entry) => {
                4u8.write(writer);
                entry.write(writer);
            }
            Self::Table(record) => {
                5u8.write(writer);
                record.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::House(HouseTreasury::read(reader)?),
            2 => Self::Config(GameConfig::read(reader)?),
            3 => Self::Round(RoundLog::read(reader)?),
            4 => Self::Audit(AuditEntry::read(reader)?),
            5 => Self::Table(TableRecord::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::House(house) => house.encode_size(),
                Self::Config(config) => config.encode_size(),
                Self::Round(round) => round.encode_size(),
                Self::Audit(entry) => entry.encode_size(),
                Self::Table(record) => record.encode_size(),
            }
    }
}
