//! Display-only simulated players.
//!
//! The crowd only reads a [`CrashTable`] through a shared reference and never holds a ledger
//! handle, so nothing it does can move money.

use crate::engine::CrashTable;
use crashpad_types::casino::{Multiplier, RoomId, RoundPhase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

pub const FAKE_PLAYERS: [&str; 35] = [
    "Brian", "Kevin", "Dennis", "Wanjiku", "Njoroge", "Kamau", "Odhiambo", "Mercy", "Faith",
    "Otieno", "Ochieng", "Kibet", "Juma", "Mwangi", "Maina", "Karanja", "Muthoni", "Njeri",
    "Akinyi", "Adhiambo", "Omondi", "Owino", "Kimani", "Chebet", "Koech", "Simba", "Mfalme",
    "Rashid", "Zainab", "Wafula", "Nyambura", "Githae", "Kiplagat", "Rotich", "Baraza",
];

const MIN_PLAYERS: usize = 99;
const MAX_PLAYERS: usize = 145;

/// Simulated players only cash out once the multiplier passes this.
const CASH_OUT_FLOOR: Multiplier = Multiplier::from_hundredths(105);

/// Per-tick probability that a simulated player cashes out.
const CASH_OUT_CHANCE: f64 = 0.02;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimulatedPlayer {
    pub id: String,
    pub name: String,
    pub bet: u64,
    pub cashed_out_at: Option<Multiplier>,
}

pub struct Crowd {
    rng: StdRng,
    players: Vec<SimulatedPlayer>,
    online: usize,
    room: Option<RoomId>,
    nonce: Option<u64>,
}

/// Draws a simulated stake: mostly small, sometimes medium, rarely large. Rounded up to tens.
pub fn weighted_bet<R: Rng>(rng: &mut R, min_bet: u64) -> u64 {
    let roll: f64 = rng.gen();
    let (floor, ceiling) = if roll < 0.7 {
        (20, 100)
    } else if roll < 0.9 {
        (100, 1_000)
    } else {
        (1_000, 5_000)
    };
    let low = min_bet.max(floor);
    let high = low.max(ceiling);
    let bet = rng.gen_range(low..=high);
    bet.div_ceil(10) * 10
}

impl Crowd {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            players: Vec::new(),
            online: 0,
            room: None,
            nonce: None,
        }
    }

    pub fn players(&self) -> &[SimulatedPlayer] {
        &self.players
    }

    /// Displayed "online" count; always above the number of simulated bettors.
    pub fn online(&self) -> usize {
        self.online
    }

    pub fn cashed_out(&self) -> usize {
        self.players
            .iter()
            .filter(|player| player.cashed_out_at.is_some())
            .count()
    }

    /// Follows the table: repopulates on a room change, rebets on a new round and rolls
    /// cash-outs while the round flies.
    pub fn observe(&mut self, table: &CrashTable) {
        let room = table.room();
        let min_bet = room.room().min_bet;
        if self.room != Some(room) {
            self.populate(room, min_bet);
        }
        if table.phase() != RoundPhase::Flying {
            return;
        }
        if table.current_nonce() != self.nonce {
            self.start_round(table.current_nonce(), min_bet);
        }
        let multiplier = table.multiplier();
        if multiplier <= CASH_OUT_FLOOR {
            return;
        }
        for player in self
            .players
            .iter_mut()
            .filter(|player| player.cashed_out_at.is_none())
        {
            if self.rng.gen_bool(CASH_OUT_CHANCE) {
                player.cashed_out_at = Some(multiplier);
            }
        }
    }

    fn populate(&mut self, room: RoomId, min_bet: u64) {
        let count = self.rng.gen_range(MIN_PLAYERS..=MAX_PLAYERS);
        let mut players = Vec::with_capacity(count);
        for i in 0..count {
            let base = FAKE_PLAYERS[i % FAKE_PLAYERS.len()];
            let name = if i >= FAKE_PLAYERS.len() {
                format!("{base} {}", self.rng.gen_range(0..999))
            } else {
                base.to_string()
            };
            players.push(SimulatedPlayer {
                id: format!("bot-{i}"),
                name,
                bet: weighted_bet(&mut self.rng, min_bet),
                cashed_out_at: None,
            });
        }
        self.players = players;
        let scale = self.rng.gen_range(1.2..1.4);
        self.online = (count as f64 * scale) as usize;
        self.room = Some(room);
        self.nonce = None;
    }

    fn start_round(&mut self, nonce: Option<u64>, min_bet: u64) {
        for player in &mut self.players {
            player.bet = weighted_bet(&mut self.rng, min_bet);
            player.cashed_out_at = None;
        }
        let variance: i64 = self.rng.gen_range(-5..5);
        let online = (self.online as i64 + variance).max(0) as usize;
        self.online = online.max(self.players.len() + 5);
        self.nonce = nonce;
    }
}
