//! Ledger store tests.
//!
//! These cover the single mutation entrypoint (funds, frozen and banned checks), write-through
//! persistence, table escrow, the admin-only paths (balance overrides, protected root account,
//! treasury), the bounded round and audit logs, and backup export/import.

#[cfg(test)]
mod tests {
    use crate::ledger::{Delta, Ledger, LedgerError, Mutation};
    use crate::mocks::{ledger_with_player, FailingState, ManualClock};
    use crate::state::{Memory, State};
    use crashpad_types::casino::{
        CommitmentSource, ConfigPatch, Multiplier, Role, RoomId, RoundLog, Severity,
        TransactionKind, Wallet, HOUSE_INITIAL_CAPITAL, MAX_AUDIT_ENTRIES, MAX_NOTE_LENGTH,
        MAX_ROUND_LOGS, ROOT_ACCOUNT, STARTING_DEMO_BALANCE,
    };
    use crashpad_types::execution::{Key, Value};
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn round_log(table: &str, nonce: u64) -> RoundLog {
        RoundLog {
            seq: 0,
            table: table.to_string(),
            nonce,
            crash_point: Multiplier::from_hundredths(150),
            target: Multiplier::from_hundredths(150),
            edge_bps: 400,
            commitment: vec![1u8; 32],
            server_seed: vec![2u8; 32],
            client_seed: "client".to_string(),
            source: CommitmentSource::Organic,
            forced: false,
            demo: false,
            room: RoomId::Standard,
            house_net: 0,
            timestamp_ms: nonce,
        }
    }

    #[test]
    fn test_open_bootstraps_and_persists() {
        let clock = ManualClock::new(5);
        let ledger = Ledger::open(Memory::default(), Arc::new(clock.clone())).unwrap();
        let root = ledger.account(ROOT_ACCOUNT).unwrap();
        assert_eq!(root.role, Role::Admin);
        assert_eq!(root.demo_balance, 0);
        assert_eq!(ledger.house().balance, HOUSE_INITIAL_CAPITAL);
        assert_eq!(ledger.config().rtp_bps, 9_600);

        // Root, treasury and config are all written on first open.
        let state = ledger.state();
        assert_eq!(state.len(), 3);
        assert!(matches!(
            state.get(&Key::Account(ROOT_ACCOUNT.to_string())).unwrap(),
            Some(Value::Account(_))
        ));
    }

    #[test]
    fn test_reopen_restores_everything() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 700);
        ledger
            .update_config(&ConfigPatch {
                max_bet: Some(9_000),
                ..Default::default()
            })
            .unwrap();
        ledger
            .close_round(
                "real",
                &[],
                RoundLog {
                    house_net: 250,
                    ..round_log("real", 4)
                },
            )
            .unwrap();
        ledger
            .record_audit(ROOT_ACCOUNT, "set_balance", "x", Severity::Warning)
            .unwrap();

        let reopened = Ledger::open(ledger.state().clone(), Arc::new(clock.clone())).unwrap();
        assert_eq!(reopened.account(&player), ledger.account(&player));
        assert_eq!(reopened.house(), ledger.house());
        assert_eq!(reopened.house().balance, HOUSE_INITIAL_CAPITAL + 250);
        assert_eq!(reopened.table("real"), ledger.table("real"));
        assert_eq!(reopened.config().max_bet, 9_000);
        assert_eq!(reopened.next_nonce("real"), 5);
        assert_eq!(reopened.next_nonce("demo"), 0);
        assert_eq!(reopened.audit_log().count(), 1);
    }

    #[test]
    fn test_register_validation() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 0);
        assert!(matches!(
            ledger.register(&player, Role::Player),
            Err(LedgerError::AccountExists(_))
        ));
        assert!(matches!(
            ledger.register("", Role::Player),
            Err(LedgerError::InvalidAccountId)
        ));
        assert!(matches!(
            ledger.register(&"9".repeat(33), Role::Player),
            Err(LedgerError::InvalidAccountId)
        ));
        let account = ledger.register("0799999999", Role::Player).unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.demo_balance, STARTING_DEMO_BALANCE);
    }

    #[test]
    fn test_debit_checks() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 100);

        assert!(matches!(
            ledger.apply("nobody", Mutation::deposit(10)),
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            ledger.apply(&player, Mutation::deposit(0)),
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            ledger.apply(&player, Mutation::bet(Wallet::Real, 101, RoomId::Standard)),
            Err(LedgerError::InsufficientFunds {
                needed: 101,
                available: 100
            })
        ));

        let tx = ledger
            .apply(&player, Mutation::bet(Wallet::Real, 100, RoomId::Standard))
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::Bet);
        assert_eq!(tx.amount, -100);
        assert_eq!(tx.balance_after, 0);
        assert_eq!(tx.room, Some(RoomId::Standard));
        assert!(!tx.demo);
    }

    #[test]
    fn test_frozen_blocks_real_debits_only() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 500);
        ledger.set_frozen(&player, true).unwrap();

        assert!(matches!(
            ledger.apply(&player, Mutation::bet(Wallet::Real, 100, RoomId::Standard)),
            Err(LedgerError::Frozen(_))
        ));
        assert!(matches!(
            ledger.withdraw(&player, 100),
            Err(LedgerError::Frozen(_))
        ));
        // Both refusals are on the audit trail, newest first.
        let refusals: Vec<_> = ledger
            .audit_log()
            .map(|entry| (entry.actor.clone(), entry.action.clone(), entry.severity))
            .collect();
        assert_eq!(
            refusals,
            vec![
                (player.clone(), "withdraw".to_string(), Severity::Warning),
                (player.clone(), "bet".to_string(), Severity::Warning),
            ]
        );
        assert!(ledger.audit_log().all(|entry| entry.details.contains("frozen")));
        // Credits still land, and the demo wallet keeps working.
        ledger
            .apply(
                &player,
                Mutation::win(Wallet::Real, 180, Multiplier::from_hundredths(200), RoomId::Standard),
            )
            .unwrap();
        ledger
            .apply(&player, Mutation::bet(Wallet::Demo, 100, RoomId::Standard))
            .unwrap();
        let account = ledger.account(&player).unwrap();
        assert_eq!(account.balance, 680);
        assert_eq!(account.demo_balance, STARTING_DEMO_BALANCE - 100);
        assert_eq!(ledger.audit_log().count(), 2);
    }

    #[test]
    fn test_banned_blocks_all_debits() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 500);
        ledger.set_banned(&player, true).unwrap();
        assert!(matches!(
            ledger.apply(&player, Mutation::bet(Wallet::Demo, 10, RoomId::Standard)),
            Err(LedgerError::Banned(_))
        ));
        assert!(matches!(
            ledger.stake("demo", &player, 0, Wallet::Demo, 10, RoomId::Standard),
            Err(LedgerError::Banned(_))
        ));
        let entries: Vec<_> = ledger.audit_log().cloned().collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.actor == player
            && entry.action == "bet"
            && entry.severity == Severity::Warning
            && entry.details.contains("banned")));
        assert!(ledger.table("demo").is_none());
        ledger
            .apply(&player, Mutation::refund(Wallet::Real, 10, RoomId::Standard))
            .unwrap();
        assert_eq!(ledger.account(&player).unwrap().balance, 510);
    }

    #[test]
    fn test_persistence_failure_leaves_memory_untouched() {
        let clock = ManualClock::new(0);
        let mut ledger = Ledger::open(FailingState::default(), Arc::new(clock.clone())).unwrap();
        ledger.register("alice", Role::Player).unwrap();
        ledger.deposit("alice", 1_000).unwrap();
        let before = ledger.account("alice").unwrap().clone();
        let house = ledger.house().clone();

        let failing = ledger.state().switch();
        failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            ledger.apply("alice", Mutation::bet(Wallet::Real, 100, RoomId::Standard)),
            Err(LedgerError::Persistence(_))
        ));
        assert!(ledger
            .close_round(
                "real",
                &[],
                RoundLog {
                    house_net: 500,
                    ..round_log("real", 0)
                },
            )
            .is_err());
        assert_eq!(ledger.rounds().count(), 0);
        assert!(ledger.table("real").is_none());
        assert!(ledger.register("bob", Role::Player).is_err());
        assert_eq!(ledger.account("alice").unwrap(), &before);
        assert_eq!(ledger.house(), &house);
        assert!(ledger.account("bob").is_none());

        failing.store(false, Ordering::SeqCst);
        ledger
            .apply("alice", Mutation::bet(Wallet::Real, 100, RoomId::Standard))
            .unwrap();
        assert_eq!(ledger.account("alice").unwrap().balance, 900);
    }

    #[test]
    fn test_stakes_move_through_table_escrow() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 1_000);

        let (first, tx) = ledger
            .stake("real", &player, 0, Wallet::Real, 100, RoomId::Standard)
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::Bet);
        let (second, _) = ledger
            .stake("real", &player, 1, Wallet::Real, 200, RoomId::Standard)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(ledger.account(&player).unwrap().balance, 700);
        // Debit and escrow land in the same write.
        assert!(matches!(
            ledger.state().get(&Key::Table("real".to_string())).unwrap(),
            Some(Value::Table(record)) if record.open_bets.len() == 2
        ));

        assert!(matches!(
            ledger.delete_account(&player),
            Err(LedgerError::EscrowHeld(_))
        ));

        ledger.refund_bet("real", first, RoomId::Standard).unwrap();
        assert!(matches!(
            ledger.refund_bet("real", first, RoomId::Standard),
            Err(LedgerError::UnknownBet(_, _))
        ));
        let tx = ledger
            .pay_bet("real", second, 360, Multiplier::from_hundredths(200), RoomId::Standard)
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::Win);
        // A paid bet cannot be paid or refunded again, but stays escrowed until its round closes.
        assert!(ledger.refund_bet("real", second, RoomId::Standard).is_err());
        let record = ledger.table("real").unwrap();
        assert_eq!(record.open_bets.len(), 1);
        assert_eq!(record.open_bets[0].paid, Some(360));
        assert_eq!(record.open_bets[0].profit_paid(), 160);

        ledger.begin_round("real", 7).unwrap();
        assert_eq!(ledger.next_nonce("real"), 8);
        ledger
            .close_round(
                "real",
                &[second],
                RoundLog {
                    house_net: -160,
                    ..round_log("real", 7)
                },
            )
            .unwrap();
        assert!(ledger.table("real").unwrap().is_clear());
        assert_eq!(ledger.house().balance, HOUSE_INITIAL_CAPITAL - 160);
        assert_eq!(ledger.account(&player).unwrap().balance, 1_160);
        ledger.delete_account(&player).unwrap();
    }

    #[test]
    fn test_reserved_nonce_outlives_unlogged_round() {
        let clock = ManualClock::new(0);
        let (mut ledger, _) = ledger_with_player(&clock, 0);
        ledger.begin_round("demo", 0).unwrap();
        assert_eq!(ledger.next_nonce("demo"), 1);
        assert_eq!(ledger.next_nonce("real"), 0);

        let mut reopened = Ledger::open(ledger.state().clone(), Arc::new(clock.clone())).unwrap();
        assert_eq!(reopened.next_nonce("demo"), 1);
        let recovery = reopened.recover_table("demo").unwrap().unwrap();
        assert_eq!(recovery.voided_nonce, Some(0));
        assert_eq!(recovery.refunded_bets, 0);
        assert_eq!(reopened.next_nonce("demo"), 1);
        assert_eq!(reopened.house().balance, HOUSE_INITIAL_CAPITAL);
    }

    #[test]
    fn test_deposit_and_withdraw_track_totals() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 1_000);
        ledger.withdraw(&player, 300).unwrap();
        ledger.deposit(&player, 50).unwrap();
        let account = ledger.account(&player).unwrap();
        assert_eq!(account.balance, 750);
        assert_eq!(account.total_deposited, 1_050);
        assert_eq!(account.total_withdrawn, 300);
        let kinds: Vec<_> = account.history.iter().map(|tx| tx.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::Deposit,
                TransactionKind::Withdraw,
                TransactionKind::Deposit
            ]
        );
    }

    #[test]
    fn test_set_balance_logs_observed_delta() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 100);
        ledger.set_frozen(&player, true).unwrap();

        let tx = ledger.set_balance(&player, Wallet::Real, 40).unwrap();
        assert_eq!(tx.kind, TransactionKind::AdminAdjust);
        assert_eq!(tx.amount, -60);
        assert_eq!(tx.balance_after, 40);

        let tx = ledger.set_balance(&player, Wallet::Demo, 0).unwrap();
        assert_eq!(tx.amount, -(STARTING_DEMO_BALANCE as i64));
        assert!(tx.demo);
        assert_eq!(ledger.account(&player).unwrap().demo_balance, 0);
    }

    #[test]
    fn test_root_is_protected() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 0);
        assert!(matches!(
            ledger.delete_account(ROOT_ACCOUNT),
            Err(LedgerError::ProtectedAccount(_))
        ));
        assert!(matches!(
            ledger.set_banned(ROOT_ACCOUNT, true),
            Err(LedgerError::ProtectedAccount(_))
        ));
        assert!(matches!(
            ledger.set_frozen(ROOT_ACCOUNT, true),
            Err(LedgerError::ProtectedAccount(_))
        ));

        ledger.delete_account(&player).unwrap();
        assert!(ledger.account(&player).is_none());
        assert_eq!(
            ledger.state().get(&Key::Account(player.clone())).unwrap(),
            None
        );
    }

    #[test]
    fn test_house_deposit_and_withdraw() {
        let clock = ManualClock::new(0);
        let (mut ledger, _) = ledger_with_player(&clock, 0);
        assert_eq!(ledger.house_deposit(1_000).unwrap(), HOUSE_INITIAL_CAPITAL + 1_000);
        assert!(matches!(
            ledger.house_withdraw(HOUSE_INITIAL_CAPITAL as u64 + 1_001),
            Err(LedgerError::InsufficientHouseFunds { .. })
        ));
        assert_eq!(ledger.house_withdraw(1_000).unwrap(), HOUSE_INITIAL_CAPITAL);
        assert!(matches!(
            ledger.house_withdraw(0),
            Err(LedgerError::InvalidAmount)
        ));
        assert_eq!(ledger.house().history.len(), 3);
    }

    #[test]
    fn test_update_config_validates() {
        let clock = ManualClock::new(0);
        let (mut ledger, _) = ledger_with_player(&clock, 0);
        assert!(matches!(
            ledger.update_config(&ConfigPatch {
                min_bet: Some(10_000),
                ..Default::default()
            }),
            Err(LedgerError::InvalidConfig(_))
        ));
        assert_eq!(ledger.config().min_bet, 10);
        let next = ledger
            .update_config(&ConfigPatch {
                rtp_bps: Some(9_800),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(next.edge_bps(), 200);
        assert!(matches!(
            ledger.state().get(&Key::Config).unwrap(),
            Some(Value::Config(config)) if config.rtp_bps == 9_800
        ));
    }

    #[test]
    fn test_round_log_retention() {
        let clock = ManualClock::new(0);
        let (mut ledger, _) = ledger_with_player(&clock, 0);
        for nonce in 0..(MAX_ROUND_LOGS as u64 + 10) {
            let seq = ledger.close_round("real", &[], round_log("real", nonce)).unwrap();
            assert_eq!(seq, nonce);
        }
        assert_eq!(ledger.rounds().count(), MAX_ROUND_LOGS);
        assert_eq!(ledger.rounds().next().unwrap().nonce, MAX_ROUND_LOGS as u64 + 9);
        assert_eq!(ledger.recent_rounds(3).len(), 3);
        // Trimmed rounds are deleted from storage too.
        assert_eq!(ledger.state().get(&Key::Round(9)).unwrap(), None);
        assert!(ledger.state().get(&Key::Round(10)).unwrap().is_some());
        assert_eq!(ledger.last_nonce("real"), Some(MAX_ROUND_LOGS as u64 + 9));
        assert_eq!(ledger.last_nonce("demo"), None);
    }

    #[test]
    fn test_audit_retention_and_truncation() {
        let clock = ManualClock::new(0);
        let (mut ledger, _) = ledger_with_player(&clock, 0);
        let entry = ledger
            .record_audit(ROOT_ACCOUNT, "update_config", &"é".repeat(200), Severity::Info)
            .unwrap();
        assert!(entry.details.len() <= MAX_NOTE_LENGTH);
        for i in 0..MAX_AUDIT_ENTRIES {
            ledger
                .record_audit(ROOT_ACCOUNT, "set_balance", &i.to_string(), Severity::Warning)
                .unwrap();
        }
        assert_eq!(ledger.audit_log().count(), MAX_AUDIT_ENTRIES);
        assert_eq!(
            ledger.audit_log().next().unwrap().details,
            (MAX_AUDIT_ENTRIES - 1).to_string()
        );
        assert_eq!(ledger.state().get(&Key::Audit(0)).unwrap(), None);
    }

    #[test]
    fn test_backup_roundtrip() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 1_234);
        ledger
            .close_round(
                "real",
                &[],
                RoundLog {
                    house_net: -50,
                    ..round_log("real", 0)
                },
            )
            .unwrap();
        let json = ledger.export_backup().unwrap();

        let (mut other, _) = ledger_with_player(&ManualClock::new(0), 0);
        other.register("stale", Role::Player).unwrap();
        other.import_backup(&json).unwrap();

        assert!(other.account("stale").is_none());
        assert_eq!(other.state().get(&Key::Account("stale".to_string())).unwrap(), None);
        assert_eq!(other.account(&player).unwrap().balance, 1_234);
        assert_eq!(other.house(), ledger.house());
        assert_eq!(other.next_nonce("real"), 1);
        assert_eq!(other.backup(), ledger.backup());
    }

    #[test]
    fn test_import_keeps_table_escrow() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 500);
        let json = ledger.export_backup().unwrap();
        ledger
            .stake("real", &player, 0, Wallet::Real, 100, RoomId::Standard)
            .unwrap();
        ledger.begin_round("real", 3).unwrap();

        ledger.import_backup(&json).unwrap();
        assert_eq!(ledger.account(&player).unwrap().balance, 500);
        assert_eq!(ledger.table("real").unwrap().open_bets.len(), 1);
        assert!(ledger
            .state()
            .get(&Key::Table("real".to_string()))
            .unwrap()
            .is_some());
        assert_eq!(ledger.next_nonce("real"), 4);
    }

    #[test]
    fn test_import_rejects_malformed_backups() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 10);
        assert!(matches!(
            ledger.import_backup("not json"),
            Err(LedgerError::InvalidBackup(_))
        ));
        assert!(matches!(
            ledger.import_backup(r#"{"accounts": []}"#),
            Err(LedgerError::InvalidBackup(_))
        ));

        let mut backup = ledger.backup();
        backup.accounts[0].id = String::new();
        let json = serde_json::to_string(&backup).unwrap();
        assert!(matches!(
            ledger.import_backup(&json),
            Err(LedgerError::InvalidBackup(_))
        ));

        let mut backup = ledger.backup();
        backup.rounds.push(RoundLog {
            client_seed: "x".repeat(500),
            ..round_log("real", 0)
        });
        let json = serde_json::to_string(&backup).unwrap();
        assert!(matches!(
            ledger.import_backup(&json),
            Err(LedgerError::InvalidBackup(_))
        ));
        assert_eq!(ledger.account(&player).unwrap().balance, 10);
    }

    #[test]
    fn test_import_recreates_root() {
        let clock = ManualClock::new(0);
        let (mut ledger, player) = ledger_with_player(&clock, 10);
        let mut backup = ledger.backup();
        backup.accounts.retain(|account| account.id != ROOT_ACCOUNT);
        ledger
            .import_backup(&serde_json::to_string(&backup).unwrap())
            .unwrap();
        assert!(ledger.account(ROOT_ACCOUNT).unwrap().is_admin());
        assert!(ledger.account(&player).is_some());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Deposit(u64),
        Withdraw(u64),
        Bet(u64),
        Refund(u64),
        Win(u64),
        Adjust(u64),
        Freeze(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..2_000).prop_map(Op::Deposit),
            (1u64..2_000).prop_map(Op::Withdraw),
            (1u64..2_000).prop_map(Op::Bet),
            (1u64..2_000).prop_map(Op::Refund),
            (1u64..2_000).prop_map(Op::Win),
            (0u64..5_000).prop_map(Op::Adjust),
            any::<bool>().prop_map(Op::Freeze),
        ]
    }

    proptest! {
        #[test]
        fn test_ledger_conservation(ops in prop::collection::vec(op(), 1..80)) {
            let clock = ManualClock::new(0);
            let (mut ledger, player) = ledger_with_player(&clock, 1_000);
            let mut expected: i128 = 1_000;
            let mut applied: i128 = 1_000;

            for op in ops {
                let result = match op {
                    Op::Deposit(amount) => ledger.deposit(&player, amount),
                    Op::Withdraw(amount) => ledger.withdraw(&player, amount),
                    Op::Bet(amount) => {
                        ledger.apply(&player, Mutation::bet(Wallet::Real, amount, RoomId::Standard))
                    }
                    Op::Refund(amount) => {
                        ledger.apply(&player, Mutation::refund(Wallet::Real, amount, RoomId::Standard))
                    }
                    Op::Win(amount) => ledger.apply(
                        &player,
                        Mutation::win(Wallet::Real, amount, Multiplier::from_hundredths(150), RoomId::Standard),
                    ),
                    Op::Adjust(balance) => ledger.set_balance(&player, Wallet::Real, balance),
                    Op::Freeze(frozen) => {
                        ledger.set_frozen(&player, frozen).unwrap();
                        continue;
                    }
                };
                let balance = ledger.account(&player).unwrap().balance;
                match result {
                    Ok(tx) => {
                        expected += i128::from(tx.amount);
                        prop_assert_eq!(tx.balance_after, balance);
                        applied = i128::from(balance);
                    }
                    Err(LedgerError::Frozen(_)) | Err(LedgerError::InsufficientFunds { .. }) => {
                        prop_assert_eq!(i128::from(balance), applied);
                    }
                    Err(err) => prop_assert!(false, "unexpected error {err}"),
                }
                prop_assert_eq!(i128::from(balance), expected);
            }

            // Every unit of the balance is accounted for by a recorded transaction.
            let account = ledger.account(&player).unwrap();
            let recorded: i128 = account
                .history
                .iter()
                .filter(|tx| !tx.demo)
                .map(|tx| i128::from(tx.amount))
                .sum();
            prop_assert_eq!(recorded, i128::from(account.balance));
        }
    }

    #[test]
    fn test_mutation_constructors() {
        let refund = Mutation::refund(Wallet::Demo, 20, RoomId::Vip);
        assert_eq!(refund.kind, TransactionKind::Refund);
        assert_eq!(refund.delta, Delta::Credit(20));
        assert_eq!(refund.note.as_deref(), Some("Refund"));
        let withdraw = Mutation::withdraw(5).with_note("M-PESA");
        assert_eq!(withdraw.delta, Delta::Debit(5));
        assert_eq!(withdraw.wallet, Wallet::Real);
        assert_eq!(withdraw.note.as_deref(), Some("M-PESA"));
    }
}
