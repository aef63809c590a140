use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};

use super::{
    read_string, string_encode_size, write_string, RoomId, Wallet, MAX_ACCOUNT_ID_LENGTH,
    MAX_OPEN_BETS,
};

/// A stake held in escrow by a table until the bet is refunded or its round closes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBet {
    pub id: u64,
    pub account: String,
    pub slot: u8,
    pub stake: u64,
    pub wallet: Wallet,
    pub room: RoomId,
    /// Amount already credited by a cash-out in the round still open.
    pub paid: Option<u64>,
}

impl OpenBet {
    /// Winnings above stake the treasury owes for this bet.
    pub fn profit_paid(&self) -> u64 {
        self.paid.map_or(0, |paid| paid.saturating_sub(self.stake))
    }
}

impl Write for OpenBet {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        write_string(&self.account, writer);
        self.slot.write(writer);
        self.stake.write(writer);
        self.wallet.is_demo().write(writer);
        self.room.write(writer);
        self.paid.write(writer);
    }
}

impl Read for OpenBet {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: u64::read(reader)?,
            account: read_string(reader, MAX_ACCOUNT_ID_LENGTH)?,
            slot: u8::read(reader)?,
            stake: u64::read(reader)?,
            wallet: match bool::read(reader)? {
                true => Wallet::Demo,
                false => Wallet::Real,
            },
            room: RoomId::read(reader)?,
            paid: Option::<u64>::read(reader)?,
        })
    }
}

impl EncodeSize for OpenBet {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + string_encode_size(&self.account)
            + self.slot.encode_size()
            + self.stake.encode_size()
            + self.wallet.is_demo().encode_size()
            + self.room.encode_size()
            + self.paid.encode_size()
    }
}

/// Durable state of one table, written before the table acts on it.
///
/// `next_nonce` only moves forward, so a restarted table never redraws a round whose commitment
/// was already published. `live_nonce` is set while a round is in flight and cleared once its
/// outcome is archived.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub next_nonce: u64,
    pub next_bet_id: u64,
    pub live_nonce: Option<u64>,
    pub open_bets: Vec<OpenBet>,
}

impl TableRecord {
    pub fn is_clear(&self) -> bool {
        self.live_nonce.is_none() && self.open_bets.is_empty()
    }
}

impl Write for TableRecord {
    fn write(&self, writer: &mut impl BufMut) {
        self.next_nonce.write(writer);
        self.next_bet_id.write(writer);
        self.live_nonce.write(writer);
        self.open_bets.write(writer);
    }
}

impl Read for TableRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            next_nonce: u64::read(reader)?,
            next_bet_id: u64::read(reader)?,
            live_nonce: Option::<u64>::read(reader)?,
            open_bets: Vec::<OpenBet>::read_range(reader, 0..=MAX_OPEN_BETS)?,
        })
    }
}

impl EncodeSize for TableRecord {
    fn encode_size(&self) -> usize {
        self.next_nonce.encode_size()
            + self.next_bet_id.encode_size()
            + self.live_nonce.encode_size()
            + self.open_bets.encode_size()
    }
}
