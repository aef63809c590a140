//! Per-round bet book and settlement arithmetic.
//!
//! Bets are keyed by `(account, slot)`. The book holds the bets of the current round plus a
//! separate queue of bets placed while a round was in flight; the queue is promoted when the
//! table returns to idle. Ordered maps keep iteration (and therefore settlement order)
//! deterministic.

use crashpad_types::casino::{Multiplier, Wallet, BPS_DENOMINATOR, TAX_RATE_BPS};
use serde::Serialize;
use std::collections::BTreeMap;

pub type BetKey = (String, u8);

/// Realized cash-out of a bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CashOut {
    pub multiplier: Multiplier,
    pub gross: u64,
    /// Profit after the account's per-round cap, before tax.
    pub profit: u64,
    pub tax: u64,
    /// Amount credited back (stake + profit - tax).
    pub net: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bet {
    /// Escrow id assigned by the ledger.
    pub id: u64,
    pub account: String,
    pub slot: u8,
    pub stake: u64,
    pub wallet: Wallet,
    pub auto_cash_out: Option<Multiplier>,
    pub cash_out: Option<CashOut>,
}

impl Bet {
    pub fn key(&self) -> BetKey {
        (self.account.clone(), self.slot)
    }

    pub fn is_settled(&self) -> bool {
        self.cash_out.is_some()
    }
}

/// Payout of `stake` cashed out at `multiplier`. `max_profit` is what is left of the account's
/// per-round profit cap.
///
/// ```text
/// gross  = floor(stake * m)
/// profit = min(gross - stake, max_profit)
/// tax    = profit > 0 && !demo ? floor(profit * TAX_RATE) : 0
/// net    = stake + profit - tax
/// ```
pub fn settle_payout(stake: u64, multiplier: Multiplier, max_profit: u64, demo: bool) -> CashOut {
    let gross = (u128::from(stake) * u128::from(multiplier.hundredths()) / 100)
        .min(u128::from(u64::MAX)) as u64;
    let profit = gross.saturating_sub(stake).min(max_profit);
    let tax = if profit > 0 && !demo {
        (u128::from(profit) * u128::from(TAX_RATE_BPS) / u128::from(BPS_DENOMINATOR)) as u64
    } else {
        0
    };
    CashOut {
        multiplier,
        gross,
        profit,
        tax,
        net: stake.saturating_add(profit - tax),
    }
}

/// House-side totals of a round, taken from the book at crash time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundTally {
    /// Stakes of bets that never cashed out.
    pub losses: u64,
    /// Player winnings above stake (`net - stake`) of bets that cashed out.
    pub wins: u64,
    pub lost_bets: usize,
    pub won_bets: usize,
}

impl RoundTally {
    /// `losses - wins`, the treasury change for the round.
    pub fn net_change(&self) -> i64 {
        let losses = i64::try_from(self.losses).unwrap_or(i64::MAX);
        let wins = i64::try_from(self.wins).unwrap_or(i64::MAX);
        losses.saturating_sub(wins)
    }
}

/// Money at risk in the current round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Exposure {
    pub open_bets: usize,
    pub staked: u64,
    /// Gross payout if every open bet cashed out at the given multiplier.
    pub potential_payout: u64,
}

#[derive(Clone, Debug, Default)]
pub struct BetBook {
    current: BTreeMap<BetKey, Bet>,
    queued: BTreeMap<BetKey, Bet>,
}

impl BetBook {
    pub fn current(&self, key: &BetKey) -> Option<&Bet> {
        self.current.get(key)
    }

    pub fn current_mut(&mut self, key: &BetKey) -> Option<&mut Bet> {
        self.current.get_mut(key)
    }

    pub fn queued(&self, key: &BetKey) -> Option<&Bet> {
        self.queued.get(key)
    }

    pub fn queued_mut(&mut self, key: &BetKey) -> Option<&mut Bet> {
        self.queued.get_mut(key)
    }

    pub fn current_bets(&self) -> impl Iterator<Item = &Bet> {
        self.current.values()
    }

    pub fn queued_bets(&self) -> impl Iterator<Item = &Bet> {
        self.queued.values()
    }

    pub fn insert_current(&mut self, bet: Bet) {
        self.current.insert(bet.key(), bet);
    }

    pub fn insert_queued(&mut self, bet: Bet) {
        self.queued.insert(bet.key(), bet);
    }

    pub fn remove_current(&mut self, key: &BetKey) -> Option<Bet> {
        self.current.remove(key)
    }

    pub fn remove_queued(&mut self, key: &BetKey) -> Option<Bet> {
        self.queued.remove(key)
    }

    /// Capped profit already paid to `account` in the current round, across all its slots.
    pub fn profit_paid(&self, account: &str) -> u64 {
        self.current
            .values()
            .filter(|bet| bet.account == account)
            .filter_map(|bet| bet.cash_out.as_ref())
            .fold(0, |total, cash_out| total.saturating_add(cash_out.profit))
    }

    pub fn has_unsettled(&self) -> bool {
        self.current.values().any(|bet| !bet.is_settled())
    }

    /// Unsettled bets whose auto cash-out is met at `multiplier`.
    pub fn auto_cash_out_due(&self, multiplier: Multiplier) -> Vec<BetKey> {
        self.current
            .values()
            .filter(|bet| !bet.is_settled())
            .filter(|bet| matches!(bet.auto_cash_out, Some(target) if target <= multiplier))
            .map(Bet::key)
            .collect()
    }

    /// Records a settlement.
    ///
    /// # Panics
    ///
    /// Panics if the bet is missing or already settled; either means the settlement guard was
    /// bypassed.
    pub fn record_cash_out(&mut self, key: &BetKey, cash_out: CashOut) {
        let Some(bet) = self.current.get_mut(key) else {
            panic!("settling bet {key:?} that is not in the current round");
        };
        assert!(
            bet.cash_out.is_none(),
            "bet {key:?} settled twice in the same round"
        );
        bet.cash_out = Some(cash_out);
    }

    pub fn tally(&self) -> RoundTally {
        let mut tally = RoundTally::default();
        for bet in self.current.values() {
            match &bet.cash_out {
                Some(cash_out) => {
                    tally.wins = tally
                        .wins
                        .saturating_add(cash_out.net.saturating_sub(bet.stake));
                    tally.won_bets += 1;
                }
                None => {
                    tally.losses = tally.losses.saturating_add(bet.stake);
                    tally.lost_bets += 1;
                }
            }
        }
        tally
    }

    pub fn exposure(&self, multiplier: Multiplier) -> Exposure {
        let mut exposure = Exposure::default();
        for bet in self.current.values().filter(|bet| !bet.is_settled()) {
            exposure.open_bets += 1;
            exposure.staked = exposure.staked.saturating_add(bet.stake);
            let gross = u128::from(bet.stake) * u128::from(multiplier.hundredths()) / 100;
            exposure.potential_payout = exposure
                .potential_payout
                .saturating_add(gross.min(u128::from(u64::MAX)) as u64);
        }
        exposure
    }

    /// Clears the finished round and promotes queued bets. Returns how many were promoted.
    pub fn start_next_round(&mut self) -> usize {
        self.current = std::mem::take(&mut self.queued);
        self.current.len()
    }

    /// Bets still eligible for a refund: current bets if `include_current`, then all queued bets.
    /// Each entry carries whether it came from the queue.
    pub fn refundable(&self, include_current: bool) -> Vec<(Bet, bool)> {
        let current = self
            .current
            .values()
            .filter(|_| include_current)
            .map(|bet| (bet.clone(), false));
        let queued = self.queued.values().map(|bet| (bet.clone(), true));
        current.chain(queued).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.queued.is_empty()
    }
}
