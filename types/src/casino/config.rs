use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};

use super::{
    BPS_DENOMINATOR, DEFAULT_EDGE_BPS, DEFAULT_MAX_BET, DEFAULT_MAX_PROFIT_PER_ROUND,
    DEFAULT_MIN_BET, DEFAULT_RTP_BPS,
};

/// Security toggles. They are stored and audited but enforced outside the game loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub require_2fa: bool,
    pub ip_whitelist: bool,
    pub anti_fraud: bool,
}

impl Write for SecurityConfig {
    fn write(&self, writer: &mut impl BufMut) {
        self.require_2fa.write(writer);
        self.ip_whitelist.write(writer);
        self.anti_fraud.write(writer);
    }
}

impl Read for SecurityConfig {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            require_2fa: bool::read(reader)?,
            ip_whitelist: bool::read(reader)?,
            anti_fraud: bool::read(reader)?,
        })
    }
}

impl FixedSize for SecurityConfig {
    const SIZE: usize = 3 * bool::SIZE;
}

/// Process-wide game configuration, owned by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub maintenance_mode: bool,
    /// Return to player in basis points (`9600` is 96%).
    pub rtp_bps: u16,
    pub min_bet: u64,
    pub max_bet: u64,
    pub max_profit_per_round: u64,
    /// When false the crash formula runs with a zero edge.
    pub house_edge_enabled: bool,
    pub enable_chat: bool,
    pub enable_demo: bool,
    pub security: SecurityConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            maintenance_mode: false,
            rtp_bps: DEFAULT_RTP_BPS,
            min_bet: DEFAULT_MIN_BET,
            max_bet: DEFAULT_MAX_BET,
            max_profit_per_round: DEFAULT_MAX_PROFIT_PER_ROUND,
            house_edge_enabled: true,
            enable_chat: true,
            enable_demo: true,
            security: SecurityConfig::default(),
        }
    }
}

impl GameConfig {
    /// House edge in basis points derived from the RTP.
    ///
    /// A zero or out-of-range RTP falls back to [`DEFAULT_EDGE_BPS`] so a bad config never stalls
    /// the table.
    pub fn edge_bps(&self) -> u16 {
        if !self.house_edge_enabled {
            return 0;
        }
        if self.rtp_bps == 0 || u64::from(self.rtp_bps) > BPS_DENOMINATOR {
            return DEFAULT_EDGE_BPS;
        }
        (BPS_DENOMINATOR as u16) - self.rtp_bps
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_bet == 0 {
            return Err("min_bet must be > 0");
        }
        if self.min_bet > self.max_bet {
            return Err("min_bet must be <= max_bet");
        }
        if self.max_profit_per_round == 0 {
            return Err("max_profit_per_round must be > 0");
        }
        if u64::from(self.rtp_bps) > BPS_DENOMINATOR {
            return Err("rtp_bps must be <= 10000");
        }
        Ok(())
    }
}

impl Write for GameConfig {
    fn write(&self, writer: &mut impl BufMut) {
        self.maintenance_mode.write(writer);
        self.rtp_bps.write(writer);
        self.min_bet.write(writer);
        self.max_bet.write(writer);
        self.max_profit_per_round.write(writer);
        self.house_edge_enabled.write(writer);
        self.enable_chat.write(writer);
        self.enable_demo.write(writer);
        self.security.write(writer);
    }
}

impl Read for GameConfig {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            maintenance_mode: bool::read(reader)?,
            rtp_bps: u16::read(reader)?,
            min_bet: u64::read(reader)?,
            max_bet: u64::read(reader)?,
            max_profit_per_round: u64::read(reader)?,
            house_edge_enabled: bool::read(reader)?,
            enable_chat: bool::read(reader)?,
            enable_demo: bool::read(reader)?,
            security: SecurityConfig::read(reader)?,
        })
    }
}

impl EncodeSize for GameConfig {
    fn encode_size(&self) -> usize {
        self.maintenance_mode.encode_size()
            + self.rtp_bps.encode_size()
            + self.min_bet.encode_size()
            + self.max_bet.encode_size()
            + self.max_profit_per_round.encode_size()
            + self.house_edge_enabled.encode_size()
            + self.enable_chat.encode_size()
            + self.enable_demo.encode_size()
            + SecurityConfig::SIZE
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPatch {
    pub require_2fa: Option<bool>,
    pub ip_whitelist: Option<bool>,
    pub anti_fraud: Option<bool>,
}

/// Partial update for [`GameConfig`]. Unset fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub maintenance_mode: Option<bool>,
    pub rtp_bps: Option<u16>,
    pub min_bet: Option<u64>,
    pub max_bet: Option<u64>,
    pub max_profit_per_round: Option<u64>,
    pub house_edge_enabled: Option<bool>,
    pub enable_chat: Option<bool>,
    pub enable_demo: Option<bool>,
    pub security: Option<SecurityPatch>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self == &ConfigPatch::default()
    }

    /// Returns `config` with the patch merged in.
    pub fn apply(&self, config: &GameConfig) -> GameConfig {
        let mut next = config.clone();
        if let Some(v) = self.maintenance_mode {
            next.maintenance_mode = v;
        }
        if let Some(v) = self.rtp_bps {
            next.rtp_bps = v;
        }
        if let Some(v) = self.min_bet {
            next.min_bet = v;
        }
        if let Some(v) = self.max_bet {
            next.max_bet = v;
        }
        if let Some(v) = self.max_profit_per_round {
            next.max_profit_per_round = v;
        }
        if let Some(v) = self.house_edge_enabled {
            next.house_edge_enabled = v;
        }
        if let Some(v) = self.enable_chat {
            next.enable_chat = v;
        }
        if let Some(v) = self.enable_demo {
            next.enable_demo = v;
        }
        if let Some(security) = &self.security {
            if let Some(v) = security.require_2fa {
                next.security.require_2fa = v;
            }
            if let Some(v) = security.ip_whitelist {
                next.security.ip_whitelist = v;
            }
            if let Some(v) = security.anti_fraud {
                next.security.anti_fraud = v;
            }
        }
        next
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomId {
    #[default]
    Standard = 0,
    Vip = 1,
    Turbo = 2,
}

impl RoomId {
    pub const ALL: [RoomId; 3] = [RoomId::Standard, RoomId::Vip, RoomId::Turbo];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomId::Standard => "standard",
            RoomId::Vip => "vip",
            RoomId::Turbo => "turbo",
        }
    }

    pub fn room(&self) -> Room {
        match self {
            RoomId::Standard => Room {
                id: *self,
                name: "Standard Room",
                min_bet: 10,
                edge_bps: None,
            },
            RoomId::Vip => Room {
                id: *self,
                name: "VIP High Roller",
                min_bet: 500,
                edge_bps: Some(200),
            },
            RoomId::Turbo => Room {
                id: *self,
                name: "Turbo Crash",
                min_bet: 100,
                edge_bps: Some(500),
            },
        }
    }
}

impl std::str::FromStr for RoomId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(RoomId::Standard),
            "vip" => Ok(RoomId::Vip),
            "turbo" => Ok(RoomId::Turbo),
            _ => Err(()),
        }
    }
}

impl TryFrom<u8> for RoomId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoomId::Standard),
            1 => Ok(RoomId::Vip),
            2 => Ok(RoomId::Turbo),
            _ => Err(()),
        }
    }
}

impl Write for RoomId {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for RoomId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        RoomId::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl FixedSize for RoomId {
    const SIZE: usize = u8::SIZE;
}

/// Static parameters of a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub name: &'static str,
    pub min_bet: u64,
    /// Edge override; `None` uses the configured RTP.
    pub edge_bps: Option<u16>,
}

impl Room {
    pub fn effective_min_bet(&self, config: &GameConfig) -> u64 {
        self.min_bet.max(config.min_bet)
    }

    pub fn edge_bps(&self, config: &GameConfig) -> u16 {
        if !config.house_edge_enabled {
            return 0;
        }
        self.edge_bps.unwrap_or_else(|| config.edge_bps())
    }
}
