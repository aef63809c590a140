//! End-to-end round tests.
//!
//! A table is driven through full rounds with a manual clock, covering settlement, the
//! treasury, round logs, fairness verification, queued bets, room switches, admin overrides, and
//! recovery from a restart or a failed write.

#[cfg(test)]
mod tests {
    use crate::admin::AdminConsole;
    use crate::bets::settle_payout;
    use crate::engine::{CrashTable, RoomEntry, RoundEvent, TableError, TableMode};
    use crate::ledger::{Ledger, LedgerError, Recovery, SYSTEM_ACTOR};
    use crate::mocks::{ledger_with_player, FailingState, ManualClock};
    use crate::rng_pipeline::{verify_log, verify_round, FairnessError, HashChain, RoundSeeder};
    use crate::round_scheduler::{Clock, PhaseConfig, Transition};
    use crate::state::Memory;
    use crashpad_types::casino::{
        CommitmentSource, ConfigPatch, Multiplier, Role, RoomId, RoundPhase, Severity,
        TransactionKind, HOUSE_INITIAL_CAPITAL, ROOT_ACCOUNT, STARTING_DEMO_BALANCE,
    };
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const FAR_FUTURE_MS: u64 = 10 * 60 * 1_000;

    fn x(x100: u64) -> Multiplier {
        Multiplier::from_hundredths(x100)
    }

    struct Harness {
        clock: ManualClock,
        ledger: Ledger<Memory>,
        table: CrashTable,
        player: String,
        started_at: u64,
    }

    fn harness(mode: TableMode, balance: u64) -> Harness {
        let clock = ManualClock::new(1_000);
        let (ledger, player) = ledger_with_player(&clock, balance);
        let seeder = RoundSeeder::new(HashChain::from_secret([42u8; 32]), "client", 0);
        let table = CrashTable::new(mode, PhaseConfig::default(), seeder, Arc::new(clock.clone()));
        Harness {
            clock,
            ledger,
            table,
            player,
            started_at: 0,
        }
    }

    impl Harness {
        fn second_player(&mut self, balance: u64) -> String {
            let id = "0722000000".to_string();
            self.ledger.register(&id, Role::Player).unwrap();
            self.ledger.deposit(&id, balance).unwrap();
            id
        }

        /// Fires the idle countdown, optionally pinning the crash point.
        fn start_round(&mut self, crash: Option<u64>) {
            if let Some(x100) = crash {
                self.table.set_next_crash_override(x(x100)).unwrap();
            }
            let (transition, at) = self.table.next_transition().unwrap();
            assert_eq!(transition, Transition::StartRound);
            self.clock.set(at);
            self.started_at = at;
            self.table.tick(&mut self.ledger);
        }

        /// Moves the clock to the moment the curve reaches `x100` and ticks.
        fn fly_to(&mut self, x100: u64) {
            let elapsed = self.table.timing().elapsed_for(x(x100));
            self.clock.set(self.started_at + elapsed);
            self.table.tick(&mut self.ledger);
        }

        /// Jumps far past any crash point. A round that crashed on take-off is left as is.
        fn crash(&mut self) {
            if self.table.phase() == RoundPhase::Crashed {
                return;
            }
            self.clock.set(self.started_at + FAR_FUTURE_MS);
            self.table.tick(&mut self.ledger);
            assert_eq!(self.table.phase(), RoundPhase::Crashed);
        }

        fn return_to_idle(&mut self) {
            let (transition, at) = self.table.next_transition().unwrap();
            assert_eq!(transition, Transition::ReturnToIdle);
            self.clock.set(at);
            self.table.tick(&mut self.ledger);
            assert_eq!(self.table.phase(), RoundPhase::Idle);
        }

        fn balance(&self, account: &str) -> u64 {
            self.ledger.account(account).unwrap().balance
        }
    }

    #[test]
    fn test_two_losing_bets_credit_house() {
        let mut h = harness(TableMode::Real, 1_000);
        let other = h.second_player(1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.table.place_bet(&mut h.ledger, &other, 0, 200, None).unwrap();

        h.start_round(Some(150));
        h.crash();
        assert_eq!(h.table.multiplier(), x(150));
        assert!(h.table.bets().all(|bet| bet.cash_out.is_none()));

        assert_eq!(h.balance(&player), 900);
        assert_eq!(h.balance(&other), 800);
        assert_eq!(h.ledger.house().balance, HOUSE_INITIAL_CAPITAL + 300);
        assert_eq!(h.ledger.house().total_profit, 300);
        // Lost stakes left escrow with the archived round.
        let record = h.ledger.table("real").unwrap();
        assert!(record.is_clear());
        assert_eq!(record.next_nonce, 1);

        let log = h.ledger.rounds().next().unwrap();
        assert_eq!(log.crash_point, x(150));
        assert_eq!(log.house_net, 300);
        assert_eq!(log.source, CommitmentSource::AdminOverride);
        assert!(matches!(verify_log(log), Err(FairnessError::AdminOverride)));

        let crashed = h
            .table
            .drain_events()
            .into_iter()
            .find_map(|event| match event {
                RoundEvent::RoundCrashed { tally, .. } => Some(tally),
                _ => None,
            })
            .unwrap();
        assert_eq!(crashed.losses, 300);
        assert_eq!(crashed.lost_bets, 2);
    }

    #[test]
    fn test_auto_cash_out_wins_in_crash_tick() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table
            .place_bet(&mut h.ledger, &player, 0, 100, Some(x(200)))
            .unwrap();

        // One tick jumps far past the crash point; the threshold equals the crash.
        h.start_round(Some(200));
        h.crash();

        let cash_out = h.table.bet(&player, 0).unwrap().cash_out.unwrap();
        assert_eq!(cash_out.multiplier, x(200));
        assert_eq!(cash_out.gross, 200);
        assert_eq!(cash_out.tax, 20);
        assert_eq!(cash_out.net, 180);
        assert_eq!(h.balance(&player), 1_080);
        assert_eq!(h.ledger.house().balance, HOUSE_INITIAL_CAPITAL - 80);
        assert_eq!(h.ledger.house().total_payouts, 80);
    }

    #[test]
    fn test_same_threshold_settles_at_same_sample() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table
            .place_bet(&mut h.ledger, &player, 0, 100, Some(x(150)))
            .unwrap();
        h.table
            .place_bet(&mut h.ledger, &player, 1, 200, Some(x(150)))
            .unwrap();

        h.start_round(Some(500));
        h.fly_to(300);
        let first = h.table.bet(&player, 0).unwrap().cash_out.unwrap();
        let second = h.table.bet(&player, 1).unwrap().cash_out.unwrap();
        // Settled at the live sample, not at the threshold.
        assert_eq!(first.multiplier, second.multiplier);
        assert!(first.multiplier >= x(300));
        assert!(first.multiplier < x(500));
        assert_eq!(h.table.phase(), RoundPhase::Flying);
    }

    #[test]
    fn test_manual_cash_out_once() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 1_000, None).unwrap();
        assert!(matches!(
            h.table.cash_out(&mut h.ledger, &player, 0),
            Err(TableError::WrongPhase(RoundPhase::Idle))
        ));

        h.start_round(Some(1_000));
        h.fly_to(300);
        let cash_out = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        let expected = settle_payout(1_000, cash_out.multiplier, 1_000_000, false);
        assert_eq!(cash_out, expected);
        assert_eq!(h.balance(&player), expected.net);

        assert!(matches!(
            h.table.cash_out(&mut h.ledger, &player, 0),
            Err(TableError::AlreadyCashedOut)
        ));
        assert!(matches!(
            h.table.cash_out(&mut h.ledger, &player, 1),
            Err(TableError::NoBet)
        ));
        assert_eq!(h.balance(&player), expected.net);
        let wins = h
            .ledger
            .account(&player)
            .unwrap()
            .history
            .iter()
            .filter(|tx| tx.kind == TransactionKind::Win)
            .count();
        assert_eq!(wins, 1);

        h.crash();
        assert_eq!(
            h.ledger.house().balance,
            HOUSE_INITIAL_CAPITAL - (expected.net as i64 - 1_000)
        );
    }

    #[test]
    fn test_override_consumed_once_then_organic() {
        let mut h = harness(TableMode::Real, 0);
        h.start_round(Some(100));
        // A 1.00x override crashes on take-off.
        assert_eq!(h.table.phase(), RoundPhase::Crashed);
        assert_eq!(h.table.pending_override(), None);
        h.return_to_idle();

        h.start_round(None);
        h.crash();
        let logs: Vec<_> = h.ledger.rounds().cloned().collect();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].source, CommitmentSource::AdminOverride);
        assert_eq!(logs[1].crash_point, x(100));
        assert_eq!(logs[0].source, CommitmentSource::Organic);
        assert_eq!(logs[0].nonce, 1);
        assert_eq!(verify_log(&logs[0]).unwrap(), logs[0].crash_point);
        assert_eq!(
            verify_round(
                &logs[0].server_seed,
                &logs[0].client_seed,
                logs[0].nonce,
                logs[0].edge_bps,
                &logs[0].commitment,
            )
            .unwrap(),
            logs[0].crash_point
        );
    }

    #[test]
    fn test_fairness_events_match_log() {
        let mut h = harness(TableMode::Real, 0);
        h.table.set_client_seed("my-seed").unwrap();
        h.start_round(None);
        h.crash();
        let events = h.table.drain_events();
        let started = events.iter().find_map(|event| match event {
            RoundEvent::RoundStarted {
                commitment,
                client_seed,
                nonce,
                ..
            } => Some((commitment.clone(), client_seed.clone(), *nonce)),
            _ => None,
        });
        let revealed = events.iter().find_map(|event| match event {
            RoundEvent::RoundCrashed {
                server_seed,
                crash_point,
                ..
            } => Some((server_seed.clone(), *crash_point)),
            _ => None,
        });
        let (commitment, client_seed, nonce) = started.unwrap();
        let (server_seed, crash_point) = revealed.unwrap();
        let log = h.ledger.rounds().next().unwrap();
        assert_eq!(client_seed, "my-seed");
        assert_eq!(hex::encode(&log.commitment), commitment);
        assert_eq!(hex::encode(&log.server_seed), server_seed);
        assert_eq!(log.edge_bps, 400);

        let server_seed = hex::decode(server_seed).unwrap();
        let commitment = hex::decode(commitment).unwrap();
        assert_eq!(
            verify_round(&server_seed, &client_seed, nonce, 400, &commitment).unwrap(),
            crash_point
        );
    }

    #[test]
    fn test_force_crash_keeps_settled_bets() {
        let mut h = harness(TableMode::Real, 1_000);
        let other = h.second_player(1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.table.place_bet(&mut h.ledger, &other, 0, 200, None).unwrap();

        h.start_round(Some(1_000));
        h.fly_to(150);
        let early = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        h.fly_to(200);

        let at = AdminConsole::new(&mut h.ledger, ROOT_ACCOUNT)
            .force_crash_now(&mut h.table)
            .unwrap();
        assert!(at >= x(200));
        assert_eq!(h.table.phase(), RoundPhase::Flying);
        h.table.tick(&mut h.ledger);
        assert_eq!(h.table.phase(), RoundPhase::Crashed);
        assert_eq!(h.table.multiplier(), at);

        assert_eq!(h.table.bet(&player, 0).unwrap().cash_out, Some(early));
        let log = h.ledger.rounds().next().unwrap();
        assert!(log.forced);
        assert_eq!(log.crash_point, at);
        assert_eq!(log.target, x(1_000));
        assert_eq!(log.house_net, 200 - (early.net as i64 - 100));

        let audit = h.ledger.audit_log().next().unwrap();
        assert_eq!(audit.action, "force_crash");
        assert_eq!(audit.severity, Severity::Critical);

        let mut console = AdminConsole::new(&mut h.ledger, ROOT_ACCOUNT);
        assert!(console.force_crash_now(&mut h.table).is_err());
    }

    #[test]
    fn test_queued_bets_join_next_round() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.start_round(Some(300));

        let bet = h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        assert_eq!(bet.stake, 100);
        assert!(h.table.bet(&player, 0).is_none());
        assert!(h.table.queued_bet(&player, 0).is_some());
        assert_eq!(h.balance(&player), 900);

        // Queued bets can be cancelled while the round flies.
        assert_eq!(h.table.cancel_bet(&mut h.ledger, &player, 0).unwrap(), 100);
        assert_eq!(h.balance(&player), 1_000);

        h.table.place_bet(&mut h.ledger, &player, 0, 150, Some(x(120))).unwrap();
        h.crash();
        // Queued bets are not part of the crashed round.
        assert_eq!(h.ledger.house().balance, HOUSE_INITIAL_CAPITAL);
        h.return_to_idle();

        let promoted = h.table.bet(&player, 0).unwrap();
        assert_eq!(promoted.stake, 150);
        assert_eq!(promoted.auto_cash_out, Some(x(120)));
        assert!(h.table.queued_bet(&player, 0).is_none());

        h.start_round(Some(400));
        assert!(matches!(
            h.table.cancel_bet(&mut h.ledger, &player, 0),
            Err(TableError::WrongPhase(RoundPhase::Flying))
        ));
        h.fly_to(130);
        assert!(h.table.bet(&player, 0).unwrap().is_settled());
    }

    #[test]
    fn test_cancel_idle_bet_refunds() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 1, 300, None).unwrap();
        assert_eq!(h.table.cancel_bet(&mut h.ledger, &player, 1).unwrap(), 300);
        assert!(matches!(
            h.table.cancel_bet(&mut h.ledger, &player, 1),
            Err(TableError::NoBet)
        ));
        let account = h.ledger.account(&player).unwrap();
        assert_eq!(account.balance, 1_000);
        let refund = account.history.last().unwrap();
        assert_eq!(refund.kind, TransactionKind::Refund);
        assert_eq!(refund.amount, 300);
    }

    #[test]
    fn test_demo_round_is_untaxed_and_skips_treasury() {
        let mut h = harness(TableMode::Demo, 1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.table.place_bet(&mut h.ledger, &player, 1, 100, None).unwrap();
        assert_eq!(
            h.ledger.account(&player).unwrap().demo_balance,
            STARTING_DEMO_BALANCE - 200
        );

        h.start_round(Some(500));
        h.fly_to(192);
        let cash_out = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        assert_eq!(cash_out.tax, 0);
        assert_eq!(cash_out.net, cash_out.gross);
        h.crash();

        let account = h.ledger.account(&player).unwrap();
        assert_eq!(account.balance, 1_000);
        assert_eq!(
            account.demo_balance,
            STARTING_DEMO_BALANCE - 200 + cash_out.net
        );
        assert!(account.history.iter().rev().take(3).all(|tx| tx.demo));
        assert_eq!(h.ledger.house().balance, HOUSE_INITIAL_CAPITAL);
        assert_eq!(h.ledger.house().history.len(), 1);

        let log = h.ledger.rounds().next().unwrap();
        assert!(log.demo);
        assert_eq!(log.table, "demo");
        assert_eq!(log.house_net, 0);
    }

    #[test]
    fn test_frozen_account_still_collects_win() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.start_round(Some(500));

        AdminConsole::new(&mut h.ledger, ROOT_ACCOUNT)
            .set_frozen(&player, true)
            .unwrap();
        assert!(matches!(
            h.table.place_bet(&mut h.ledger, &player, 1, 100, None),
            Err(TableError::Ledger(LedgerError::Frozen(_)))
        ));

        h.fly_to(200);
        let cash_out = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        assert_eq!(h.balance(&player), 900 + cash_out.net);
    }

    #[test]
    fn test_switch_room_rules() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();

        // Idle bets are refunded and the countdown restarts.
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        let now = h.clock.now_ms();
        h.table
            .switch_room(&mut h.ledger, RoomId::Turbo, RoomEntry::Countdown(2_000))
            .unwrap();
        assert_eq!(h.table.room(), RoomId::Turbo);
        assert_eq!(h.balance(&player), 1_000);
        assert!(h.table.bet(&player, 0).is_none());
        assert_eq!(
            h.table.next_transition(),
            Some((Transition::StartRound, now + 2_000))
        );

        // Live unsettled bets block a switch. Turbo needs at least 200.
        h.table.place_bet(&mut h.ledger, &player, 0, 200, None).unwrap();
        h.start_round(Some(1_000));
        assert_eq!(h.ledger.rounds().count(), 0);
        h.fly_to(150);
        assert!(matches!(
            h.table
                .switch_room(&mut h.ledger, RoomId::Standard, RoomEntry::Countdown(1_000)),
            Err(TableError::BetsLive)
        ));

        // Once every bet is settled the round ends where it is.
        let cash_out = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        h.table.place_bet(&mut h.ledger, &player, 1, 200, None).unwrap();
        h.table
            .switch_room(&mut h.ledger, RoomId::Standard, RoomEntry::Countdown(1_000))
            .unwrap();
        assert_eq!(h.table.phase(), RoundPhase::Idle);
        assert_eq!(h.table.room(), RoomId::Standard);
        // The queued bet was refunded.
        assert!(h.table.queued_bet(&player, 1).is_none());
        assert_eq!(h.balance(&player), 800 + cash_out.net);

        let log = h.ledger.rounds().next().unwrap();
        assert!(log.forced);
        assert_eq!(log.room, RoomId::Turbo);
        assert_eq!(log.crash_point, cash_out.multiplier);
    }

    #[test]
    fn test_join_in_progress() {
        let mut h = harness(TableMode::Real, 0);
        h.table.set_next_crash_override(x(1_000)).unwrap();
        h.table
            .switch_room(&mut h.ledger, RoomId::Vip, RoomEntry::JoinInProgress(x(250)))
            .unwrap();
        assert_eq!(h.table.phase(), RoundPhase::Flying);
        assert!(h.table.multiplier() >= x(250));
        assert!(h.table.multiplier() < x(260));

        let mut h = harness(TableMode::Real, 0);
        h.table.set_next_crash_override(x(150)).unwrap();
        h.table
            .switch_room(&mut h.ledger, RoomId::Vip, RoomEntry::JoinInProgress(x(300)))
            .unwrap();
        assert_eq!(h.table.phase(), RoundPhase::Crashed);
        assert_eq!(h.table.multiplier(), x(150));
        assert!(!h.ledger.rounds().next().unwrap().forced);

        assert!(matches!(
            h.table
                .switch_room(&mut h.ledger, RoomId::Vip, RoomEntry::JoinInProgress(x(50))),
            Err(TableError::InvalidMultiplier)
        ));
    }

    #[test]
    fn test_crash_settles_once() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.start_round(Some(150));
        h.crash();
        for _ in 0..5 {
            h.table.tick(&mut h.ledger);
        }
        assert_eq!(h.ledger.rounds().count(), 1);
        assert_eq!(h.ledger.house().balance, HOUSE_INITIAL_CAPITAL + 100);
        assert_eq!(h.ledger.house().history.len(), 2);
    }

    #[test]
    fn test_nonce_continues_across_restart() {
        let mut h = harness(TableMode::Real, 0);
        for _ in 0..3 {
            h.start_round(Some(120));
            h.crash();
            h.return_to_idle();
        }
        assert_eq!(h.ledger.next_nonce("real"), 3);

        let ledger = Ledger::open(h.ledger.state().clone(), Arc::new(h.clock.clone())).unwrap();
        let next = ledger.next_nonce(TableMode::Real.label());
        let seeder = RoundSeeder::new(HashChain::from_secret([42u8; 32]), "client", next);
        let mut h2 = Harness {
            table: CrashTable::new(
                TableMode::Real,
                PhaseConfig::default(),
                seeder,
                Arc::new(h.clock.clone()),
            ),
            clock: h.clock.clone(),
            ledger,
            player: h.player.clone(),
            started_at: 0,
        };
        h2.start_round(None);
        assert_eq!(h2.table.current_nonce(), Some(3));
    }

    #[test]
    fn test_persistence_failure_rejects_bet() {
        let clock = ManualClock::new(0);
        let mut ledger = Ledger::open(FailingState::default(), Arc::new(clock.clone())).unwrap();
        ledger.register("alice", Role::Player).unwrap();
        ledger.deposit("alice", 500).unwrap();
        let seeder = RoundSeeder::new(HashChain::from_secret([1u8; 32]), "client", 0);
        let mut table =
            CrashTable::new(TableMode::Real, PhaseConfig::default(), seeder, Arc::new(clock));

        let failing = ledger.state().switch();
        failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            table.place_bet(&mut ledger, "alice", 0, 100, None),
            Err(TableError::Ledger(LedgerError::Persistence(_)))
        ));
        assert!(table.bet("alice", 0).is_none());
        assert_eq!(ledger.account("alice").unwrap().balance, 500);

        failing.store(false, Ordering::SeqCst);
        table.place_bet(&mut ledger, "alice", 0, 100, None).unwrap();
        assert_eq!(ledger.account("alice").unwrap().balance, 400);
    }

    #[test]
    fn test_live_exposure() {
        let mut h = harness(TableMode::Real, 1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.table.place_bet(&mut h.ledger, &player, 1, 200, None).unwrap();
        h.start_round(Some(1_000));
        h.fly_to(200);
        let mut console = AdminConsole::new(&mut h.ledger, ROOT_ACCOUNT);
        let exposure = console.live_exposure(&h.table).unwrap();
        assert_eq!(exposure.open_bets, 2);
        assert_eq!(exposure.staked, 300);
        assert!(exposure.potential_payout >= 600);

        let mut refused = AdminConsole::new(&mut h.ledger, &player);
        assert!(refused.live_exposure(&h.table).is_err());
    }

    #[test]
    fn test_profit_cap_spans_account_slots() {
        let mut h = harness(TableMode::Real, 2_000);
        let other = h.second_player(1_000);
        let player = h.player.clone();
        h.ledger
            .update_config(&ConfigPatch {
                max_profit_per_round: Some(500),
                ..Default::default()
            })
            .unwrap();
        h.table.place_bet(&mut h.ledger, &player, 0, 1_000, None).unwrap();
        h.table.place_bet(&mut h.ledger, &player, 1, 1_000, None).unwrap();
        h.table.place_bet(&mut h.ledger, &other, 0, 1_000, None).unwrap();

        h.start_round(Some(1_000));
        h.fly_to(300);
        let first = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        let second = h.table.cash_out(&mut h.ledger, &player, 1).unwrap();
        let third = h.table.cash_out(&mut h.ledger, &other, 0).unwrap();

        assert_eq!(first.profit, 500);
        assert_eq!(first.tax, 100);
        // The first slot used up the whole cap for this round.
        assert_eq!(second.profit, 0);
        assert_eq!(second.net, 1_000);
        // Other accounts have their own cap.
        assert_eq!(third.profit, 500);
        assert_eq!(h.balance(&player), 1_400 + 1_000);

        h.crash();
        h.return_to_idle();
        h.table.place_bet(&mut h.ledger, &player, 0, 1_000, None).unwrap();
        h.start_round(Some(1_000));
        h.fly_to(300);
        // A new round starts a new cap.
        let next = h.table.cash_out(&mut h.ledger, &player, 0).unwrap();
        assert_eq!(next.profit, 500);
    }

    #[test]
    fn test_restart_mid_flight_refunds_and_voids_round() {
        let mut h = harness(TableMode::Real, 1_000);
        let other = h.second_player(1_000);
        let player = h.player.clone();
        h.table.place_bet(&mut h.ledger, &player, 0, 100, None).unwrap();
        h.table.place_bet(&mut h.ledger, &other, 0, 200, None).unwrap();

        h.start_round(Some(1_000));
        let first_commitment = h
            .table
            .drain_events()
            .into_iter()
            .find_map(|event| match event {
                RoundEvent::RoundStarted { commitment, nonce, .. } => Some((nonce, commitment)),
                _ => None,
            })
            .unwrap();
        assert_eq!(first_commitment.0, 0);

        h.fly_to(200);
        let cashed = h.table.cash_out(&mut h.ledger, &other, 0).unwrap();
        h.table.place_bet(&mut h.ledger, &player, 1, 100, None).unwrap();
        assert_eq!(h.balance(&player), 800);
        assert_eq!(h.table.phase(), RoundPhase::Flying);

        // The process dies here: the table and its bet book are gone.
        let state = h.ledger.state().clone();
        let clock = h.clock.clone();
        drop(h);

        let mut ledger = Ledger::open(state, Arc::new(clock.clone())).unwrap();
        assert_eq!(ledger.table("real").unwrap().open_bets.len(), 3);
        let recovery = ledger.recover_table("real").unwrap().unwrap();
        let paid_profit = cashed.net as i64 - 200;
        assert_eq!(
            recovery,
            Recovery {
                voided_nonce: Some(0),
                refunded_bets: 2,
                refunded_stake: 200,
                house_net: -paid_profit,
            }
        );

        // Stakes are back, the paid cash-out stands and the treasury paid for it.
        assert_eq!(ledger.account(&player).unwrap().balance, 1_000);
        assert_eq!(ledger.account(&other).unwrap().balance, 800 + cashed.net);
        assert_eq!(ledger.house().balance, HOUSE_INITIAL_CAPITAL - paid_profit);
        let refund = ledger.account(&player).unwrap().history.last().unwrap().clone();
        assert_eq!(refund.kind, TransactionKind::Refund);
        assert_eq!(refund.note.as_deref(), Some("Refund: round interrupted"));
        let audit = ledger.audit_log().next().unwrap();
        assert_eq!(audit.actor, SYSTEM_ACTOR);
        assert_eq!(audit.action, "recover_table");
        assert_eq!(audit.severity, Severity::Warning);
        assert!(ledger.table("real").unwrap().is_clear());
        assert_eq!(ledger.recover_table("real").unwrap(), None);

        // The interrupted round is never redrawn.
        assert_eq!(ledger.next_nonce("real"), 1);
        let seeder = RoundSeeder::new(HashChain::from_secret([42u8; 32]), "client", 1);
        let mut h2 = Harness {
            table: CrashTable::new(
                TableMode::Real,
                PhaseConfig::default(),
                seeder,
                Arc::new(clock.clone()),
            ),
            clock,
            ledger,
            player,
            started_at: 0,
        };
        assert!(h2.table.bet(&h2.player, 0).is_none());
        h2.start_round(None);
        let replayed = h2
            .table
            .drain_events()
            .into_iter()
            .find_map(|event| match event {
                RoundEvent::RoundStarted { commitment, nonce, .. } => Some((nonce, commitment)),
                _ => None,
            })
            .unwrap();
        assert_eq!(replayed.0, 1);
        assert_ne!(replayed.1, first_commitment.1);
    }

    #[test]
    fn test_seed_revealed_only_after_round_is_archived() {
        let clock = ManualClock::new(0);
        let mut ledger = Ledger::open(FailingState::default(), Arc::new(clock.clone())).unwrap();
        ledger.register("alice", Role::Player).unwrap();
        ledger.deposit("alice", 500).unwrap();
        let seeder = RoundSeeder::new(HashChain::from_secret([1u8; 32]), "client", 0);
        let mut table = CrashTable::new(
            TableMode::Real,
            PhaseConfig::default(),
            seeder,
            Arc::new(clock.clone()),
        );
        table.set_next_crash_override(x(150)).unwrap();
        table.place_bet(&mut ledger, "alice", 0, 100, None).unwrap();
        let failing = ledger.state().switch();

        // Take-off waits until the nonce is reserved.
        let (_, at) = table.next_transition().unwrap();
        clock.set(at);
        failing.store(true, Ordering::SeqCst);
        table.drain_events();
        table.tick(&mut ledger);
        assert_eq!(table.phase(), RoundPhase::Idle);
        assert!(table.drain_events().is_empty());
        assert_eq!(table.next_transition(), Some((Transition::StartRound, at)));

        failing.store(false, Ordering::SeqCst);
        table.tick(&mut ledger);
        assert_eq!(table.phase(), RoundPhase::Flying);
        assert_eq!(ledger.table("real").unwrap().live_nonce, Some(0));

        // The crash cannot be archived: no reveal, no settlement, no cash-outs.
        failing.store(true, Ordering::SeqCst);
        table.drain_events();
        clock.set(at + FAR_FUTURE_MS);
        table.tick(&mut ledger);
        assert_eq!(table.phase(), RoundPhase::Flying);
        assert!(!table
            .drain_events()
            .iter()
            .any(|event| matches!(event, RoundEvent::RoundCrashed { .. })));
        assert_eq!(ledger.house().balance, HOUSE_INITIAL_CAPITAL);
        assert_eq!(ledger.rounds().count(), 0);
        assert!(matches!(
            table.cash_out(&mut ledger, "alice", 0),
            Err(TableError::WrongPhase(RoundPhase::Crashed))
        ));
        assert_eq!(ledger.account("alice").unwrap().balance, 400);

        // The next tick after the store recovers finishes the round exactly once.
        failing.store(false, Ordering::SeqCst);
        table.tick(&mut ledger);
        assert_eq!(table.phase(), RoundPhase::Crashed);
        let crashed: Vec<_> = table
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, RoundEvent::RoundCrashed { .. }))
            .collect();
        assert_eq!(crashed.len(), 1);
        table.tick(&mut ledger);
        assert_eq!(ledger.rounds().count(), 1);
        assert_eq!(ledger.house().balance, HOUSE_INITIAL_CAPITAL + 100);
        assert!(ledger.table("real").unwrap().is_clear());
        assert_eq!(ledger.next_nonce("real"), 1);
    }
}
