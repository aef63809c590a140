//! Round state machine for a single crash table.
//!
//! [`CrashTable`] owns the phase, the transition timer, the active round's fairness material and
//! the bet book. It never touches balances itself: every debit and credit goes through the
//! [`Ledger`] handle passed into each operation.
//!
//! The table is driven by [`CrashTable::tick`]. Each tick recomputes the multiplier from the
//! injected [`Clock`], settles auto cash-outs against that single sample and only then checks for
//! the crash, so a threshold met in the crashing tick wins.
//!
//! A round's nonce is reserved in the ledger before its commitment is published, and its seed is
//! revealed only after the ledger archived the outcome. When either write fails the table holds
//! its phase and retries on the next tick.

use crate::bets::{settle_payout, Bet, BetBook, BetKey, CashOut, Exposure, RoundTally};
use crate::ledger::{Ledger, LedgerError};
use crate::rng_pipeline::{PendingOverride, RoundSeeder, SeedPair};
use crate::round_scheduler::{Clock, PhaseConfig, ScheduledTransition, Transition};
use crate::state::State;
use crashpad_types::casino::{
    CommitmentSource, Multiplier, RoomId, RoundLog, RoundPhase, Wallet, MAX_BET_SLOTS,
    MAX_CLIENT_SEED_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid bet slot {0}")]
    InvalidSlot(u8),
    #[error("stake must be between {min} and {max}")]
    BetOutOfRange { min: u64, max: u64 },
    #[error("table is in maintenance")]
    Maintenance,
    #[error("demo play is disabled")]
    DemoDisabled,
    #[error("not allowed while {}", .0.as_str())]
    WrongPhase(RoundPhase),
    #[error("slot {0} already has a bet")]
    SlotOccupied(u8),
    #[error("no bet in that slot")]
    NoBet,
    #[error("bet already cashed out")]
    AlreadyCashedOut,
    #[error("bets are live in the current round")]
    BetsLive,
    #[error("multiplier out of range")]
    InvalidMultiplier,
    #[error("invalid client seed")]
    InvalidClientSeed,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Which wallet a table plays against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    Real,
    Demo,
}

impl TableMode {
    pub fn wallet(&self) -> Wallet {
        match self {
            TableMode::Real => Wallet::Real,
            TableMode::Demo => Wallet::Demo,
        }
    }

    /// Label stored in round logs; nonces are tracked per label.
    pub fn label(&self) -> &'static str {
        match self {
            TableMode::Real => "real",
            TableMode::Demo => "demo",
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, TableMode::Demo)
    }
}

/// How a table resumes after a room switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomEntry {
    /// Wait `ms` before the next round.
    Countdown(u64),
    /// Start a round immediately as if it had already reached the given multiplier.
    JoinInProgress(Multiplier),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundScheduled {
        table: &'static str,
        room: RoomId,
        starts_at_ms: u64,
    },
    RoundStarted {
        table: &'static str,
        room: RoomId,
        nonce: u64,
        commitment: String,
        client_seed: String,
        started_at_ms: u64,
    },
    MultiplierUpdated {
        table: &'static str,
        multiplier: Multiplier,
    },
    BetPlaced {
        table: &'static str,
        account: String,
        slot: u8,
        stake: u64,
        queued: bool,
    },
    BetCancelled {
        table: &'static str,
        account: String,
        slot: u8,
        stake: u64,
    },
    CashedOut {
        table: &'static str,
        account: String,
        slot: u8,
        auto: bool,
        cash_out: CashOut,
    },
    RoundCrashed {
        table: &'static str,
        nonce: u64,
        crash_point: Multiplier,
        server_seed: String,
        commitment: String,
        client_seed: String,
        source: CommitmentSource,
        forced: bool,
        tally: RoundTally,
    },
    RoomChanged {
        table: &'static str,
        room: RoomId,
    },
}

#[derive(Clone, Debug)]
struct ActiveRound {
    nonce: u64,
    target: Multiplier,
    forced_at: Option<Multiplier>,
    edge_bps: u16,
    seeds: SeedPair,
    client_seed: String,
    source: CommitmentSource,
    started_at_ms: u64,
}

impl ActiveRound {
    fn effective_crash(&self) -> Multiplier {
        self.forced_at.unwrap_or(self.target)
    }
}

/// Point-in-time view of a table for clients.
#[derive(Clone, Debug, Serialize)]
pub struct TableSnapshot {
    pub table: &'static str,
    pub room: RoomId,
    pub phase: RoundPhase,
    pub multiplier: Multiplier,
    pub nonce: Option<u64>,
    pub commitment: Option<String>,
    pub next_transition_at_ms: Option<u64>,
    pub client_seed: String,
    pub bets: Vec<Bet>,
    pub queued: Vec<Bet>,
}

fn in_range(multiplier: Multiplier) -> bool {
    multiplier >= Multiplier::ONE && multiplier <= Multiplier::MAX
}

pub struct CrashTable {
    mode: TableMode,
    timing: PhaseConfig,
    clock: Arc<dyn Clock>,
    room: RoomId,
    phase: RoundPhase,
    seeder: RoundSeeder,
    pending_override: PendingOverride,
    timer: ScheduledTransition,
    round: Option<ActiveRound>,
    /// Set when a round takes off, cleared exactly once by the crash.
    round_active: bool,
    /// The round reached its crash point but archiving it failed; no further settlement.
    crash_pending: bool,
    multiplier: Multiplier,
    book: BetBook,
    events: Vec<RoundEvent>,
}

impl CrashTable {
    /// Creates an idle table whose first round starts after the idle countdown.
    pub fn new(
        mode: TableMode,
        timing: PhaseConfig,
        seeder: RoundSeeder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut table = Self {
            mode,
            timing,
            clock,
            room: RoomId::default(),
            phase: RoundPhase::Idle,
            seeder,
            pending_override: PendingOverride::default(),
            timer: ScheduledTransition::default(),
            round: None,
            round_active: false,
            crash_pending: false,
            multiplier: Multiplier::ONE,
            book: BetBook::default(),
            events: Vec::new(),
        };
        let now = table.clock.now_ms();
        table.schedule_round(now.saturating_add(table.timing.idle_ms));
        table
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub fn timing(&self) -> &PhaseConfig {
        &self.timing
    }

    /// Nonce of the round in flight (or just crashed).
    pub fn current_nonce(&self) -> Option<u64> {
        self.round.as_ref().map(|round| round.nonce)
    }

    pub fn next_nonce(&self) -> u64 {
        self.seeder.next_nonce()
    }

    pub fn client_seed(&self) -> &str {
        self.seeder.client_seed()
    }

    pub fn pending_override(&self) -> Option<Multiplier> {
        self.pending_override.peek()
    }

    pub fn next_transition(&self) -> Option<(Transition, u64)> {
        self.timer.peek()
    }

    pub fn bet(&self, account: &str, slot: u8) -> Option<&Bet> {
        self.book.current(&(account.to_string(), slot))
    }

    pub fn queued_bet(&self, account: &str, slot: u8) -> Option<&Bet> {
        self.book.queued(&(account.to_string(), slot))
    }

    pub fn bets(&self) -> impl Iterator<Item = &Bet> {
        self.book.current_bets()
    }

    /// Takes the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn live_exposure(&self) -> Exposure {
        self.book.exposure(self.multiplier)
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            table: self.mode.label(),
            room: self.room,
            phase: self.phase,
            multiplier: self.multiplier,
            nonce: self.current_nonce(),
            commitment: self
                .round
                .as_ref()
                .map(|round| hex::encode(round.seeds.commitment)),
            next_transition_at_ms: self.timer.peek().map(|(_, at)| at),
            client_seed: self.seeder.client_seed().to_string(),
            bets: self.book.current_bets().cloned().collect(),
            queued: self.book.queued_bets().cloned().collect(),
        }
    }

    /// Advances the table to the clock's current time.
    pub fn tick<S: State>(&mut self, ledger: &mut Ledger<S>) {
        let now = self.clock.now_ms();
        match (self.phase, self.timer.due(now)) {
            (RoundPhase::Idle, Some(Transition::StartRound)) => {
                match self.start_round(ledger, now) {
                    Ok(()) => self.advance_flight(ledger, now),
                    Err(err) => {
                        error!(table = self.mode.label(), ?err, "failed to reserve nonce; retrying");
                        self.timer.schedule(Transition::StartRound, now);
                    }
                }
            }
            (RoundPhase::Crashed, Some(Transition::ReturnToIdle)) => self.return_to_idle(now),
            (RoundPhase::Flying, stale) => {
                if let Some(transition) = stale {
                    warn!(table = self.mode.label(), ?transition, "dropping stale transition");
                }
                self.advance_flight(ledger, now);
            }
            (phase, Some(transition)) => {
                warn!(table = self.mode.label(), ?phase, ?transition, "dropping stale transition");
            }
            (_, None) => {}
        }
    }

    fn schedule_round(&mut self, at_ms: u64) {
        self.timer.schedule(Transition::StartRound, at_ms);
        self.events.push(RoundEvent::RoundScheduled {
            table: self.mode.label(),
            room: self.room,
            starts_at_ms: at_ms,
        });
    }

    fn start_round<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
        started_at_ms: u64,
    ) -> Result<(), LedgerError> {
        ledger.begin_round(self.mode.label(), self.seeder.next_nonce())?;
        let edge_bps = self.room.room().edge_bps(ledger.config());
        let draw = self
            .seeder
            .draw(edge_bps, self.mode.is_demo(), self.pending_override.take());
        self.timer.cancel();
        self.phase = RoundPhase::Flying;
        self.round_active = true;
        self.crash_pending = false;
        self.multiplier = Multiplier::ONE;

        let commitment = hex::encode(draw.seeds.commitment);
        info!(
            table = self.mode.label(),
            room = self.room.as_str(),
            nonce = draw.nonce,
            edge_bps,
            source = ?draw.source,
            bets = self.book.current_bets().count(),
            %commitment,
            "round started"
        );
        self.events.push(RoundEvent::RoundStarted {
            table: self.mode.label(),
            room: self.room,
            nonce: draw.nonce,
            commitment,
            client_seed: draw.client_seed.clone(),
            started_at_ms,
        });
        self.round = Some(ActiveRound {
            nonce: draw.nonce,
            target: draw.crash,
            forced_at: None,
            edge_bps: draw.edge_bps,
            seeds: draw.seeds,
            client_seed: draw.client_seed,
            source: draw.source,
            started_at_ms,
        });
        Ok(())
    }

    fn advance_flight<S: State>(&mut self, ledger: &mut Ledger<S>, now: u64) {
        let Some(round) = self.round.as_ref() else {
            return;
        };
        let crash = round.effective_crash();
        let raw = self
            .timing
            .multiplier_at(now.saturating_sub(round.started_at_ms));
        let sample = raw.min(crash);
        if self.crash_pending {
            self.retry_crash(ledger, now);
            return;
        }

        for key in self.book.auto_cash_out_due(sample) {
            if let Err(err) = self.settle(ledger, &key, sample, true) {
                error!(
                    table = self.mode.label(),
                    account = key.0.as_str(),
                    slot = key.1,
                    ?err,
                    "auto cash-out failed"
                );
            }
        }

        if raw >= crash {
            self.crash_pending = true;
            self.retry_crash(ledger, now);
        } else if sample != self.multiplier {
            self.multiplier = sample;
            self.events.push(RoundEvent::MultiplierUpdated {
                table: self.mode.label(),
                multiplier: sample,
            });
        }
    }

    fn retry_crash<S: State>(&mut self, ledger: &mut Ledger<S>, now: u64) {
        if let Err(err) = self.crash(ledger, now) {
            error!(
                table = self.mode.label(),
                nonce = self.current_nonce(),
                ?err,
                "failed to archive round; retrying"
            );
        }
    }

    fn settle<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
        key: &BetKey,
        multiplier: Multiplier,
        auto: bool,
    ) -> Result<CashOut, TableError> {
        let bet = self.book.current(key).ok_or(TableError::NoBet)?;
        if bet.is_settled() {
            return Err(TableError::AlreadyCashedOut);
        }
        let cap = ledger
            .config()
            .max_profit_per_round
            .saturating_sub(self.book.profit_paid(&bet.account));
        let cash_out = settle_payout(bet.stake, multiplier, cap, self.mode.is_demo());
        ledger.pay_bet(
            self.mode.label(),
            bet.id,
            cash_out.net,
            multiplier,
            self.room,
        )?;
        self.book.record_cash_out(key, cash_out);

        info!(
            table = self.mode.label(),
            account = key.0.as_str(),
            slot = key.1,
            multiplier = %multiplier,
            net = cash_out.net,
            tax = cash_out.tax,
            auto,
            "cashed out"
        );
        self.events.push(RoundEvent::CashedOut {
            table: self.mode.label(),
            account: key.0.clone(),
            slot: key.1,
            auto,
            cash_out,
        });
        Ok(cash_out)
    }

    /// Archives the round and reveals its seed. Nothing changes unless the ledger accepted the
    /// archive, so a failed attempt can simply be repeated.
    fn crash<S: State>(&mut self, ledger: &mut Ledger<S>, now: u64) -> Result<(), LedgerError> {
        if !self.round_active {
            return Ok(());
        }
        let Some(round) = self.round.clone() else {
            return Ok(());
        };
        let crash_point = round.effective_crash();
        let tally = self.book.tally();
        let demo = self.mode.is_demo();
        let house_net = if demo { 0 } else { tally.net_change() };
        let log = RoundLog {
            seq: 0,
            table: self.mode.label().to_string(),
            nonce: round.nonce,
            crash_point,
            target: round.target,
            edge_bps: round.edge_bps,
            commitment: round.seeds.commitment.to_vec(),
            server_seed: round.seeds.server_seed.to_vec(),
            client_seed: round.client_seed.clone(),
            source: round.source,
            forced: round.forced_at.is_some(),
            demo,
            room: self.room,
            house_net,
            timestamp_ms: now,
        };
        let settled: Vec<u64> = self.book.current_bets().map(|bet| bet.id).collect();
        ledger.close_round(self.mode.label(), &settled, log)?;

        self.round_active = false;
        self.crash_pending = false;
        self.multiplier = crash_point;
        self.phase = RoundPhase::Crashed;
        info!(
            table = self.mode.label(),
            nonce = round.nonce,
            crash = %crash_point,
            forced = round.forced_at.is_some(),
            losses = tally.losses,
            wins = tally.wins,
            house_net,
            "round crashed"
        );
        self.events.push(RoundEvent::RoundCrashed {
            table: self.mode.label(),
            nonce: round.nonce,
            crash_point,
            server_seed: hex::encode(round.seeds.server_seed),
            commitment: hex::encode(round.seeds.commitment),
            client_seed: round.client_seed,
            source: round.source,
            forced: round.forced_at.is_some(),
            tally,
        });
        self.timer.schedule(
            Transition::ReturnToIdle,
            now.saturating_add(self.timing.crash_display_ms),
        );
        Ok(())
    }

    /// Clears the finished round and promotes queued bets, without scheduling.
    fn reset_to_idle(&mut self) {
        self.phase = RoundPhase::Idle;
        self.round = None;
        self.crash_pending = false;
        self.multiplier = Multiplier::ONE;
        self.timer.cancel();
        let promoted = self.book.start_next_round();
        debug!(table = self.mode.label(), promoted, "table idle");
    }

    fn return_to_idle(&mut self, now: u64) {
        self.reset_to_idle();
        self.schedule_round(now.saturating_add(self.timing.idle_ms));
    }

    /// Places a bet, debiting the stake immediately. Outside `Idle` the bet is queued for the
    /// next round.
    pub fn place_bet<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
        account: &str,
        slot: u8,
        stake: u64,
        auto_cash_out: Option<Multiplier>,
    ) -> Result<Bet, TableError> {
        if slot >= MAX_BET_SLOTS {
            return Err(TableError::InvalidSlot(slot));
        }
        let config = ledger.config();
        if config.maintenance_mode {
            return Err(TableError::Maintenance);
        }
        if self.mode.is_demo() && !config.enable_demo {
            return Err(TableError::DemoDisabled);
        }
        let min = self.room.room().effective_min_bet(config);
        let max = config.max_bet;
        if stake < min || stake > max {
            return Err(TableError::BetOutOfRange { min, max });
        }
        if let Some(target) = auto_cash_out {
            if target <= Multiplier::ONE || target > Multiplier::MAX {
                return Err(TableError::InvalidMultiplier);
            }
        }

        let queued = self.phase != RoundPhase::Idle;
        let key = (account.to_string(), slot);
        let occupied = if queued {
            self.book.queued(&key).is_some()
        } else {
            self.book.current(&key).is_some()
        };
        if occupied {
            return Err(TableError::SlotOccupied(slot));
        }

        let wallet = self.mode.wallet();
        let (id, _) = ledger.stake(self.mode.label(), account, slot, wallet, stake, self.room)?;
        let bet = Bet {
            id,
            account: account.to_string(),
            slot,
            stake,
            wallet,
            auto_cash_out,
            cash_out: None,
        };
        if queued {
            self.book.insert_queued(bet.clone());
        } else {
            self.book.insert_current(bet.clone());
        }
        debug!(table = self.mode.label(), account, slot, stake, queued, "bet placed");
        self.events.push(RoundEvent::BetPlaced {
            table: self.mode.label(),
            account: account.to_string(),
            slot,
            stake,
            queued,
        });
        Ok(bet)
    }

    /// Cancels a queued bet at any time, or a current bet while idle, refunding the stake.
    pub fn cancel_bet<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
        account: &str,
        slot: u8,
    ) -> Result<u64, TableError> {
        let key = (account.to_string(), slot);
        let (bet, queued) = if let Some(bet) = self.book.queued(&key) {
            (bet.clone(), true)
        } else if let Some(bet) = self.book.current(&key) {
            if self.phase != RoundPhase::Idle {
                return Err(TableError::WrongPhase(self.phase));
            }
            (bet.clone(), false)
        } else {
            return Err(TableError::NoBet);
        };

        ledger.refund_bet(self.mode.label(), bet.id, self.room)?;
        if queued {
            self.book.remove_queued(&key);
        } else {
            self.book.remove_current(&key);
        }
        debug!(table = self.mode.label(), account, slot, stake = bet.stake, "bet cancelled");
        self.events.push(RoundEvent::BetCancelled {
            table: self.mode.label(),
            account: account.to_string(),
            slot,
            stake: bet.stake,
        });
        Ok(bet.stake)
    }

    /// Cashes out at the live multiplier, after first bringing the table up to date.
    pub fn cash_out<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
        account: &str,
        slot: u8,
    ) -> Result<CashOut, TableError> {
        self.tick(ledger);
        if self.crash_pending {
            return Err(TableError::WrongPhase(RoundPhase::Crashed));
        }
        if self.phase != RoundPhase::Flying {
            return Err(TableError::WrongPhase(self.phase));
        }
        let key = (account.to_string(), slot);
        let multiplier = self.multiplier;
        self.settle(ledger, &key, multiplier, false)
    }

    /// Sets or clears the auto cash-out of the caller's open bet in `slot`. The current round's
    /// bet takes precedence over a queued one.
    pub fn set_auto_cash_out(
        &mut self,
        account: &str,
        slot: u8,
        target: Option<Multiplier>,
    ) -> Result<(), TableError> {
        if let Some(target) = target {
            if target <= Multiplier::ONE || target > Multiplier::MAX {
                return Err(TableError::InvalidMultiplier);
            }
        }
        let key = (account.to_string(), slot);
        let current_settled = self.book.current(&key).map(Bet::is_settled);
        if current_settled == Some(false) {
            if let Some(bet) = self.book.current_mut(&key) {
                bet.auto_cash_out = target;
                return Ok(());
            }
        }
        if let Some(bet) = self.book.queued_mut(&key) {
            bet.auto_cash_out = target;
            return Ok(());
        }
        match current_settled {
            Some(true) => Err(TableError::AlreadyCashedOut),
            _ => Err(TableError::NoBet),
        }
    }

    /// Replaces the client seed used from the next round on.
    pub fn set_client_seed(&mut self, client_seed: &str) -> Result<(), TableError> {
        if client_seed.is_empty()
            || client_seed.len() > MAX_CLIENT_SEED_LENGTH
            || !client_seed.chars().all(|c| c.is_ascii_graphic())
        {
            return Err(TableError::InvalidClientSeed);
        }
        self.seeder.set_client_seed(client_seed);
        Ok(())
    }

    /// Pins the crash point to the current multiplier; the next tick crashes the round.
    pub fn force_crash_now<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
    ) -> Result<Multiplier, TableError> {
        self.tick(ledger);
        if self.crash_pending {
            return Err(TableError::WrongPhase(RoundPhase::Crashed));
        }
        if self.phase != RoundPhase::Flying {
            return Err(TableError::WrongPhase(self.phase));
        }
        let multiplier = self.multiplier;
        if let Some(round) = self.round.as_mut() {
            round.forced_at = Some(multiplier);
        }
        self.timer.cancel();
        warn!(table = self.mode.label(), at = %multiplier, "crash forced");
        Ok(multiplier)
    }

    /// Stages the crash point of the next round, returning any value it replaced.
    pub fn set_next_crash_override(
        &mut self,
        value: Multiplier,
    ) -> Result<Option<Multiplier>, TableError> {
        if !in_range(value) {
            return Err(TableError::InvalidMultiplier);
        }
        warn!(table = self.mode.label(), value = %value, "next crash overridden");
        Ok(self.pending_override.stage(value))
    }

    /// Moves the table to another room.
    ///
    /// Rejected while a flying round still has unsettled bets. Idle and queued bets are
    /// refunded; a flying round whose bets have all cashed out ends at the current multiplier.
    pub fn switch_room<S: State>(
        &mut self,
        ledger: &mut Ledger<S>,
        room: RoomId,
        entry: RoomEntry,
    ) -> Result<(), TableError> {
        if let RoomEntry::JoinInProgress(start) = entry {
            if !in_range(start) {
                return Err(TableError::InvalidMultiplier);
            }
        }
        self.tick(ledger);
        if self.phase == RoundPhase::Flying && self.book.has_unsettled() {
            return Err(TableError::BetsLive);
        }

        let include_current = self.phase == RoundPhase::Idle;
        for (bet, queued) in self.book.refundable(include_current) {
            ledger.refund_bet(self.mode.label(), bet.id, self.room)?;
            let key = bet.key();
            if queued {
                self.book.remove_queued(&key);
            } else {
                self.book.remove_current(&key);
            }
            self.events.push(RoundEvent::BetCancelled {
                table: self.mode.label(),
                account: bet.account,
                slot: bet.slot,
                stake: bet.stake,
            });
        }

        let now = self.clock.now_ms();
        if self.phase == RoundPhase::Flying {
            let multiplier = self.multiplier;
            if let Some(round) = self.round.as_mut() {
                round.forced_at.get_or_insert(multiplier);
            }
            self.crash_pending = true;
            self.crash(ledger, now)?;
        }
        self.reset_to_idle();

        let previous = std::mem::replace(&mut self.room, room);
        info!(table = self.mode.label(), from = previous.as_str(), to = room.as_str(), "room changed");
        self.events.push(RoundEvent::RoomChanged {
            table: self.mode.label(),
            room,
        });

        match entry {
            RoomEntry::Countdown(ms) => self.schedule_round(now.saturating_add(ms)),
            RoomEntry::JoinInProgress(start) => {
                let elapsed = self.timing.elapsed_for(start);
                if let Err(err) = self.start_round(ledger, now.saturating_sub(elapsed)) {
                    self.schedule_round(now);
                    return Err(err.into());
                }
                self.advance_flight(ledger, now);
            }
        }
        Ok(())
    }
}
