use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};

use super::{HOUSE_INITIAL_CAPITAL, MAX_HOUSE_SNAPSHOTS};

/// Treasury balance at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseSnapshot {
    pub timestamp_ms: u64,
    pub balance: i64,
}

impl Write for HouseSnapshot {
    fn write(&self, writer: &mut impl BufMut) {
        self.timestamp_ms.write(writer);
        self.balance.write(writer);
    }
}

impl Read for HouseSnapshot {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            timestamp_ms: u64::read(reader)?,
            balance: i64::read(reader)?,
        })
    }
}

impl FixedSize for HouseSnapshot {
    const SIZE: usize = u64::SIZE + i64::SIZE;
}

/// House treasury.
///
/// Round settlement may push `balance` below zero (the house always pays out); explicit admin
/// withdrawals may not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseTreasury {
    pub balance: i64,
    /// Sum of positive round results.
    pub total_profit: u64,
    /// Sum of negative round results (absolute value).
    pub total_payouts: u64,
    /// Bounded balance series, oldest first.
    pub history: Vec<HouseSnapshot>,
}

impl HouseTreasury {
    pub fn new(now_ms: u64) -> Self {
        Self {
            balance: HOUSE_INITIAL_CAPITAL,
            total_profit: 0,
            total_payouts: 0,
            history: vec![HouseSnapshot {
                timestamp_ms: now_ms,
                balance: HOUSE_INITIAL_CAPITAL,
            }],
        }
    }

    /// Applies one round's net result (`losses - wins`) and records a snapshot.
    pub fn apply_round(&mut self, net_change: i64, now_ms: u64) {
        self.balance = self.balance.saturating_add(net_change);
        if net_change > 0 {
            self.total_profit = self.total_profit.saturating_add(net_change.unsigned_abs());
        } else if net_change < 0 {
            self.total_payouts = self.total_payouts.saturating_add(net_change.unsigned_abs());
        }
        self.snapshot(now_ms);
    }

    pub fn snapshot(&mut self, now_ms: u64) {
        self.history.push(HouseSnapshot {
            timestamp_ms: now_ms,
            balance: self.balance,
        });
        if self.history.len() > MAX_HOUSE_SNAPSHOTS {
            let excess = self.history.len() - MAX_HOUSE_SNAPSHOTS;
            self.history.drain(..excess);
        }
    }
}

impl Write for HouseTreasury {
    fn write(&self, writer: &mut impl BufMut) {
        self.balance.write(writer);
        self.total_profit.write(writer);
        self.total_payouts.write(writer);
        self.history.write(writer);
    }
}

impl Read for HouseTreasury {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            balance: i64::read(reader)?,
            total_profit: u64::read(reader)?,
            total_payouts: u64::read(reader)?,
            history: Vec::<HouseSnapshot>::read_range(reader, 0..=MAX_HOUSE_SNAPSHOTS)?,
        })
    }
}

impl EncodeSize for HouseTreasury {
    fn encode_size(&self) -> usize {
        self.balance.encode_size()
            + self.total_profit.encode_size()
            + self.total_payouts.encode_size()
            + self.history.encode_size()
    }
}
