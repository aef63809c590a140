use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::{
    read_string, string_encode_size, write_string, RoomId, MAX_CLIENT_SEED_LENGTH,
    MAX_CRASH_X100, MAX_NOTE_LENGTH, MIN_CRASH_X100,
};

const MAX_COMMITMENT_LEN: usize = 32;
const MAX_SERVER_SEED_LEN: usize = 32;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Idle = 0,
    Flying = 1,
    Crashed = 2,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::Idle => "idle",
            RoundPhase::Flying => "flying",
            RoundPhase::Crashed => "crashed",
        }
    }
}

impl TryFrom<u8> for RoundPhase {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoundPhase::Idle),
            1 => Ok(RoundPhase::Flying),
            2 => Ok(RoundPhase::Crashed),
            _ => Err(()),
        }
    }
}

impl Write for RoundPhase {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for RoundPhase {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        RoundPhase::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for RoundPhase {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Fixed-point multiplier in hundredths (`192` is `1.92x`).
///
/// Crash points are truncated to two decimals, so hundredths represent every value the game can
/// produce exactly and keep payout arithmetic in integers. JSON carries the decimal form (`1.92`)
/// in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u64);

impl Multiplier {
    pub const ONE: Self = Self(MIN_CRASH_X100);
    pub const MAX: Self = Self(MAX_CRASH_X100);

    pub const fn from_hundredths(x100: u64) -> Self {
        Self(x100)
    }

    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Truncates a curve sample to hundredths. Non-finite samples saturate at [`Multiplier::MAX`].
    pub fn floor_f64(value: f64) -> Self {
        if !value.is_finite() {
            return Self::MAX;
        }
        let x100 = (value * 100.0).floor();
        if x100 <= MIN_CRASH_X100 as f64 {
            Self::ONE
        } else if x100 >= MAX_CRASH_X100 as f64 {
            Self::MAX
        } else {
            Self(x100 as u64)
        }
    }

    /// Parses a player or admin supplied value (e.g. `2.5`), rounding to the nearest hundredth.
    /// Returns `None` outside `[1.00, 200000.00]`.
    pub fn parse_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let x100 = (value * 100.0).round();
        if x100 < MIN_CRASH_X100 as f64 || x100 > MAX_CRASH_X100 as f64 {
            return None;
        }
        Some(Self(x100 as u64))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Multiplier::parse_f64(value).ok_or_else(|| {
            de::Error::invalid_value(
                de::Unexpected::Float(value),
                &"a multiplier between 1.00 and 200000.00",
            )
        })
    }
}

impl Write for Multiplier {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for Multiplier {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(u64::read(reader)?))
    }
}

impl EncodeSize for Multiplier {
    fn encode_size(&self) -> usize {
        u64::SIZE
    }
}

/// Whether a round's crash point came from the fairness pipeline or from an admin override.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentSource {
    Organic = 0,
    AdminOverride = 1,
}

impl TryFrom<u8> for CommitmentSource {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommitmentSource::Organic),
            1 => Ok(CommitmentSource::AdminOverride),
            _ => Err(()),
        }
    }
}

impl Write for CommitmentSource {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for CommitmentSource {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        CommitmentSource::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for CommitmentSource {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Archived outcome of a settled round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLog {
    pub seq: u64,
    /// Label of the table that ran the round (nonces are per table).
    pub table: String,
    pub nonce: u64,
    /// Realized crash point (the forced value when an admin crashed the round early).
    pub crash_point: Multiplier,
    /// Crash point fixed at round start.
    pub target: Multiplier,
    /// House edge the round was drawn with.
    pub edge_bps: u16,
    /// SHA-256 of the server seed, published at round start.
    pub commitment: Vec<u8>,
    /// Server seed, revealed once the round crashed.
    pub server_seed: Vec<u8>,
    pub client_seed: String,
    pub source: CommitmentSource,
    pub forced: bool,
    pub demo: bool,
    pub room: RoomId,
    /// Treasury change applied for this round (zero for demo rounds).
    pub house_net: i64,
    pub timestamp_ms: u64,
}

impl Write for RoundLog {
    fn write(&self, writer: &mut impl BufMut) {
        self.seq.write(writer);
        write_string(&self.table, writer);
        self.nonce.write(writer);
        self.crash_point.write(writer);
        self.target.write(writer);
        self.edge_bps.write(writer);
        self.commitment.write(writer);
        self.server_seed.write(writer);
        write_string(&self.client_seed, writer);
        self.source.write(writer);
        self.forced.write(writer);
        self.demo.write(writer);
        self.room.write(writer);
        self.house_net.write(writer);
        self.timestamp_ms.write(writer);
    }
}

impl Read for RoundLog {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            seq: u64::read(reader)?,
            table: read_string(reader, MAX_NOTE_LENGTH)?,
            nonce: u64::read(reader)?,
            crash_point: Multiplier::read(reader)?,
            target: Multiplier::read(reader)?,
            edge_bps: u16::read(reader)?,
            commitment: Vec::<u8>::read_range(reader, 0..=MAX_COMMITMENT_LEN)?,
            server_seed: Vec::<u8>::read_range(reader, 0..=MAX_SERVER_SEED_LEN)?,
            client_seed: read_string(reader, MAX_CLIENT_SEED_LENGTH)?,
            source: CommitmentSource::read(reader)?,
            forced: bool::read(reader)?,
            demo: bool::read(reader)?,
            room: RoomId::read(reader)?,
            house_net: i64::read(reader)?,
            timestamp_ms: u64::read(reader)?,
        })
    }
}

impl EncodeSize for RoundLog {
    fn encode_size(&self) -> usize {
        self.seq.encode_size()
            + string_encode_size(&self.table)
            + self.nonce.encode_size()
            + self.crash_point.encode_size()
            + self.target.encode_size()
            + self.edge_bps.encode_size()
            + self.commitment.encode_size()
            + self.server_seed.encode_size()
            + string_encode_size(&self.client_seed)
            + self.source.encode_size()
            + self.forced.encode_size()
            + self.demo.encode_size()
            + self.room.encode_size()
            + self.house_net.encode_size()
            + self.timestamp_ms.encode_size()
    }
}
