//! Escrow ledger.
//!
//! The ledger is the only writer of balances, the house treasury, the game configuration, round
//! logs, table escrow records and the audit trail. Every change is written through
//! [`State::apply`] first and committed to memory only once the store accepted it, so a failed
//! write leaves the ledger untouched.
//!
//! Stakes move into a table's [`TableRecord`] in the same write that debits them and leave it in
//! the same write that refunds them or archives their round. Whatever a crash leaves behind in a
//! record is returned by [`Ledger::recover_table`].

use crate::round_scheduler::Clock;
use crate::state::{State, Status};
use commonware_codec::{DecodeExt, Encode};
use crashpad_types::casino::{
    Account, AuditEntry, ConfigPatch, GameConfig, HouseTreasury, Multiplier, OpenBet, Role,
    RoomId, RoundLog, Severity, TableRecord, Transaction, TransactionKind, Wallet,
    MAX_ACCOUNT_ID_LENGTH, MAX_AUDIT_ENTRIES, MAX_HISTORY, MAX_HOUSE_SNAPSHOTS, MAX_NOTE_LENGTH,
    MAX_OPEN_BETS, MAX_ROUND_LOGS, ROOT_ACCOUNT,
};
use crashpad_types::execution::{Key, Value};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Actor recorded for audit entries the ledger writes on its own.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account already exists: {0}")]
    AccountExists(String),
    #[error("invalid account id")]
    InvalidAccountId,
    #[error("account {0} is frozen")]
    Frozen(String),
    #[error("account {0} is banned")]
    Banned(String),
    #[error("insufficient funds (needed={needed}, available={available})")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("insufficient house funds (needed={needed}, available={available})")]
    InsufficientHouseFunds { needed: u64, available: i64 },
    #[error("account {0} is protected")]
    ProtectedAccount(String),
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid backup: {0}")]
    InvalidBackup(String),
    #[error("table {0} holds too many open bets")]
    TableFull(String),
    #[error("no open bet {1} on table {0}")]
    UnknownBet(String, u64),
    #[error("account {0} has stakes in escrow")]
    EscrowHeld(String),
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

/// Direction and size of a balance change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delta {
    Credit(u64),
    Debit(u64),
}

/// A single balance change submitted to [`Ledger::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub kind: TransactionKind,
    pub wallet: Wallet,
    pub delta: Delta,
    pub multiplier: Option<Multiplier>,
    pub room: Option<RoomId>,
    pub note: Option<String>,
}

impl Mutation {
    pub fn bet(wallet: Wallet, stake: u64, room: RoomId) -> Self {
        Self {
            kind: TransactionKind::Bet,
            wallet,
            delta: Delta::Debit(stake),
            multiplier: None,
            room: Some(room),
            note: None,
        }
    }

    pub fn win(wallet: Wallet, net: u64, multiplier: Multiplier, room: RoomId) -> Self {
        Self {
            kind: TransactionKind::Win,
            wallet,
            delta: Delta::Credit(net),
            multiplier: Some(multiplier),
            room: Some(room),
            note: None,
        }
    }

    pub fn refund(wallet: Wallet, stake: u64, room: RoomId) -> Self {
        Self {
            kind: TransactionKind::Refund,
            wallet,
            delta: Delta::Credit(stake),
            multiplier: None,
            room: Some(room),
            note: Some("Refund".to_string()),
        }
    }

    pub fn deposit(amount: u64) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            wallet: Wallet::Real,
            delta: Delta::Credit(amount),
            multiplier: None,
            room: None,
            note: None,
        }
    }

    pub fn withdraw(amount: u64) -> Self {
        Self {
            kind: TransactionKind::Withdraw,
            wallet: Wallet::Real,
            delta: Delta::Debit(amount),
            multiplier: None,
            room: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Full ledger contents as exported to JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub accounts: Vec<Account>,
    pub house: HouseTreasury,
    #[serde(default)]
    pub config: GameConfig,
    #[serde(default)]
    pub rounds: Vec<RoundLog>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

/// What [`Ledger::recover_table`] did with an interrupted table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Round that was in flight and will never be replayed.
    pub voided_nonce: Option<u64>,
    pub refunded_bets: usize,
    pub refunded_stake: u64,
    /// Treasury change for cash-outs already paid in the voided round.
    pub house_net: i64,
}

pub struct Ledger<S: State> {
    state: S,
    clock: Arc<dyn Clock>,
    accounts: BTreeMap<String, Account>,
    house: HouseTreasury,
    config: GameConfig,
    tables: BTreeMap<String, TableRecord>,
    /// Oldest first.
    rounds: VecDeque<RoundLog>,
    /// Oldest first.
    audit: VecDeque<AuditEntry>,
    next_round_seq: u64,
    next_audit_seq: u64,
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn signed(amount: u64) -> Result<i64, LedgerError> {
    i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount)
}

fn valid_account_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ACCOUNT_ID_LENGTH && id.trim() == id
}

fn account_change(account: &Account) -> (Key, Status) {
    (
        Key::Account(account.id.clone()),
        Status::Update(Value::Account(account.clone())),
    )
}

fn table_change(label: &str, record: &TableRecord) -> (Key, Status) {
    (
        Key::Table(label.to_string()),
        Status::Update(Value::Table(record.clone())),
    )
}

fn root_account(now_ms: u64) -> Account {
    let mut root = Account::new(ROOT_ACCOUNT, Role::Admin, now_ms);
    root.demo_balance = 0;
    root
}

impl<S: State> Ledger<S> {
    /// Loads the ledger from `state`, creating the treasury, default config and root account on
    /// first start.
    pub fn open(mut state: S, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        let now = clock.now_ms();
        let mut accounts = BTreeMap::new();
        let mut house = None;
        let mut config = None;
        let mut rounds = BTreeMap::new();
        let mut audit = BTreeMap::new();
        let mut tables = BTreeMap::new();
        for (key, value) in state.load()? {
            match (key, value) {
                (Key::Account(id), Value::Account(account)) => {
                    accounts.insert(id, account);
                }
                (Key::House, Value::House(value)) => house = Some(value),
                (Key::Config, Value::Config(value)) => config = Some(value),
                (Key::Round(seq), Value::Round(log)) => {
                    rounds.insert(seq, log);
                }
                (Key::Audit(seq), Value::Audit(entry)) => {
                    audit.insert(seq, entry);
                }
                (Key::Table(label), Value::Table(record)) => {
                    tables.insert(label, record);
                }
                (key, _) => warn!(?key, "ignoring record stored under mismatched key"),
            }
        }

        let mut bootstrap = Vec::new();
        let house = house.unwrap_or_else(|| {
            let house = HouseTreasury::new(now);
            bootstrap.push((Key::House, Status::Update(Value::House(house.clone()))));
            house
        });
        let config = config.unwrap_or_else(|| {
            let config = GameConfig::default();
            bootstrap.push((Key::Config, Status::Update(Value::Config(config.clone()))));
            config
        });
        if !accounts.contains_key(ROOT_ACCOUNT) {
            let root = root_account(now);
            bootstrap.push((
                Key::Account(root.id.clone()),
                Status::Update(Value::Account(root.clone())),
            ));
            accounts.insert(root.id.clone(), root);
        }
        if !bootstrap.is_empty() {
            info!(records = bootstrap.len(), "bootstrapping ledger");
            state.apply(bootstrap)?;
        }

        let next_round_seq = rounds.keys().next_back().map_or(0, |seq| seq + 1);
        let next_audit_seq = audit.keys().next_back().map_or(0, |seq| seq + 1);
        info!(
            accounts = accounts.len(),
            rounds = rounds.len(),
            tables = tables.len(),
            house = house.balance,
            "ledger opened"
        );
        Ok(Self {
            state,
            clock,
            accounts,
            house,
            config,
            tables,
            rounds: rounds.into_values().collect(),
            audit: audit.into_values().collect(),
            next_round_seq,
            next_audit_seq,
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    fn existing(&self, id: &str) -> Result<&Account, LedgerError> {
        self.accounts
            .get(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    fn persist_account(&mut self, account: Account) -> Result<(), LedgerError> {
        self.state.apply(vec![account_change(&account)])?;
        self.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn persist_house(&mut self, house: HouseTreasury) -> Result<(), LedgerError> {
        self.state
            .apply(vec![(Key::House, Status::Update(Value::House(house.clone())))])?;
        self.house = house;
        Ok(())
    }

    pub fn register(&mut self, id: &str, role: Role) -> Result<Account, LedgerError> {
        if !valid_account_id(id) {
            return Err(LedgerError::InvalidAccountId);
        }
        if self.accounts.contains_key(id) {
            return Err(LedgerError::AccountExists(id.to_string()));
        }
        let account = Account::new(id, role, self.clock.now_ms());
        self.persist_account(account.clone())?;
        info!(account = id, ?role, "account registered");
        Ok(account)
    }

    /// Applies `mutation` to a working copy of an account without persisting it.
    fn stage(&self, account: &mut Account, mutation: Mutation) -> Result<Transaction, LedgerError> {
        let wallet = mutation.wallet;
        let balance = account.wallet_balance(wallet);
        let (new_balance, amount) = match mutation.delta {
            Delta::Credit(0) | Delta::Debit(0) => return Err(LedgerError::InvalidAmount),
            Delta::Credit(value) => {
                let new_balance = balance
                    .checked_add(value)
                    .ok_or(LedgerError::InvalidAmount)?;
                (new_balance, signed(value)?)
            }
            Delta::Debit(value) => {
                if account.banned {
                    return Err(LedgerError::Banned(account.id.clone()));
                }
                if account.frozen && wallet == Wallet::Real {
                    return Err(LedgerError::Frozen(account.id.clone()));
                }
                if value > balance {
                    return Err(LedgerError::InsufficientFunds {
                        needed: value,
                        available: balance,
                    });
                }
                (balance - value, -signed(value)?)
            }
        };

        *account.wallet_balance_mut(wallet) = new_balance;
        match mutation.kind {
            TransactionKind::Deposit => {
                account.total_deposited = account.total_deposited.saturating_add(amount.unsigned_abs());
            }
            TransactionKind::Withdraw => {
                account.total_withdrawn = account.total_withdrawn.saturating_add(amount.unsigned_abs());
            }
            _ => {}
        }
        let tx = Transaction {
            kind: mutation.kind,
            amount,
            multiplier: mutation.multiplier,
            timestamp_ms: self.clock.now_ms(),
            balance_after: new_balance,
            room: mutation.room,
            note: mutation.note.map(|note| truncate(&note, MAX_NOTE_LENGTH)),
            demo: wallet.is_demo(),
        };
        account.push_transaction(tx.clone());
        Ok(tx)
    }

    /// Stages `mutation` on account `id`, auditing debits refused by a freeze or ban.
    fn staged(&mut self, id: &str, mutation: Mutation) -> Result<(Account, Transaction), LedgerError> {
        let mut account = self.existing(id)?.clone();
        let kind = mutation.kind;
        match self.stage(&mut account, mutation) {
            Ok(tx) => Ok((account, tx)),
            Err(err @ (LedgerError::Frozen(_) | LedgerError::Banned(_))) => {
                warn!(account = id, kind = kind.as_str(), %err, "debit refused");
                let details = format!("refused: {err}");
                if let Err(audit_err) =
                    self.record_audit(id, kind.as_str(), &details, Severity::Warning)
                {
                    error!(account = id, ?audit_err, "failed to audit refused debit");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Applies a balance change.
    ///
    /// Debits are rejected for banned accounts, for frozen accounts on the real wallet, and when
    /// they exceed the wallet balance. Freeze and ban refusals are written to the audit trail.
    /// Credits are always accepted.
    pub fn apply(&mut self, id: &str, mutation: Mutation) -> Result<Transaction, LedgerError> {
        let (account, tx) = self.staged(id, mutation)?;
        self.persist_account(account)?;
        debug!(
            account = id,
            kind = tx.kind.as_str(),
            amount = tx.amount,
            balance = tx.balance_after,
            demo = tx.demo,
            "balance updated"
        );
        Ok(tx)
    }

    /// Simulated payment-provider deposit into the real wallet.
    pub fn deposit(&mut self, id: &str, amount: u64) -> Result<Transaction, LedgerError> {
        self.apply(id, Mutation::deposit(amount))
    }

    /// Simulated payment-provider withdrawal from the real wallet.
    pub fn withdraw(&mut self, id: &str, amount: u64) -> Result<Transaction, LedgerError> {
        self.apply(id, Mutation::withdraw(amount))
    }

    /// Overwrites a wallet balance, recording the observed difference as an admin adjustment.
    ///
    /// Frozen and banned flags do not apply.
    pub fn set_balance(
        &mut self,
        id: &str,
        wallet: Wallet,
        new_balance: u64,
    ) -> Result<Transaction, LedgerError> {
        let mut account = self.existing(id)?.clone();
        let old_balance = account.wallet_balance(wallet);
        let diff = i128::from(new_balance) - i128::from(old_balance);
        let amount = i64::try_from(diff).map_err(|_| LedgerError::InvalidAmount)?;
        *account.wallet_balance_mut(wallet) = new_balance;
        let tx = Transaction {
            kind: TransactionKind::AdminAdjust,
            amount,
            multiplier: None,
            timestamp_ms: self.clock.now_ms(),
            balance_after: new_balance,
            room: None,
            note: Some("Admin adjustment".to_string()),
            demo: wallet.is_demo(),
        };
        account.push_transaction(tx.clone());
        self.persist_account(account)?;
        warn!(account = id, ?wallet, old_balance, new_balance, "balance overwritten");
        Ok(tx)
    }

    pub fn set_frozen(&mut self, id: &str, frozen: bool) -> Result<(), LedgerError> {
        if frozen && id == ROOT_ACCOUNT {
            return Err(LedgerError::ProtectedAccount(id.to_string()));
        }
        let mut account = self.existing(id)?.clone();
        account.frozen = frozen;
        self.persist_account(account)
    }

    pub fn set_banned(&mut self, id: &str, banned: bool) -> Result<(), LedgerError> {
        if banned && id == ROOT_ACCOUNT {
            return Err(LedgerError::ProtectedAccount(id.to_string()));
        }
        let mut account = self.existing(id)?.clone();
        account.banned = banned;
        self.persist_account(account)
    }

    pub fn delete_account(&mut self, id: &str) -> Result<Account, LedgerError> {
        if id == ROOT_ACCOUNT {
            return Err(LedgerError::ProtectedAccount(id.to_string()));
        }
        self.existing(id)?;
        let escrowed = self
            .tables
            .values()
            .flat_map(|record| &record.open_bets)
            .any(|bet| bet.account == id);
        if escrowed {
            return Err(LedgerError::EscrowHeld(id.to_string()));
        }
        self.state
            .apply(vec![(Key::Account(id.to_string()), Status::Delete)])?;
        let account = self
            .accounts
            .remove(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        warn!(account = id, "account deleted");
        Ok(account)
    }

    pub fn house(&self) -> &HouseTreasury {
        &self.house
    }

    pub fn house_deposit(&mut self, amount: u64) -> Result<i64, LedgerError> {
        let value = signed(amount)?;
        if value == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut house = self.house.clone();
        house.balance = house
            .balance
            .checked_add(value)
            .ok_or(LedgerError::InvalidAmount)?;
        house.snapshot(self.clock.now_ms());
        self.persist_house(house)?;
        Ok(self.house.balance)
    }

    /// Withdraws from the treasury; rejected when the treasury cannot cover it.
    pub fn house_withdraw(&mut self, amount: u64) -> Result<i64, LedgerError> {
        let value = signed(amount)?;
        if value == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.house.balance < value {
            return Err(LedgerError::InsufficientHouseFunds {
                needed: amount,
                available: self.house.balance,
            });
        }
        let mut house = self.house.clone();
        house.balance -= value;
        house.snapshot(self.clock.now_ms());
        self.persist_house(house)?;
        Ok(self.house.balance)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn update_config(&mut self, patch: &ConfigPatch) -> Result<GameConfig, LedgerError> {
        let next = patch.apply(&self.config);
        next.validate().map_err(LedgerError::InvalidConfig)?;
        self.state
            .apply(vec![(Key::Config, Status::Update(Value::Config(next.clone())))])?;
        self.config = next.clone();
        Ok(next)
    }

    /// Round logs, newest first.
    pub fn rounds(&self) -> impl Iterator<Item = &RoundLog> {
        self.rounds.iter().rev()
    }

    pub fn recent_rounds(&self, limit: usize) -> Vec<RoundLog> {
        self.rounds().take(limit).cloned().collect()
    }

    /// Nonce of the most recent round logged by `table`.
    pub fn last_nonce(&self, table: &str) -> Option<u64> {
        self.rounds().find(|log| log.table == table).map(|log| log.nonce)
    }

    /// First nonce a table may use without reusing a published commitment.
    pub fn next_nonce(&self, table: &str) -> u64 {
        let logged = self
            .last_nonce(table)
            .map_or(0, |nonce| nonce.saturating_add(1));
        let reserved = self.tables.get(table).map_or(0, |record| record.next_nonce);
        logged.max(reserved)
    }

    pub fn table(&self, label: &str) -> Option<&TableRecord> {
        self.tables.get(label)
    }

    fn table_record(&self, label: &str) -> TableRecord {
        self.tables.get(label).cloned().unwrap_or_default()
    }

    /// Debits a stake and escrows it on `table` in one write. Returns the bet id.
    pub fn stake(
        &mut self,
        table: &str,
        id: &str,
        slot: u8,
        wallet: Wallet,
        stake: u64,
        room: RoomId,
    ) -> Result<(u64, Transaction), LedgerError> {
        let mut record = self.table_record(table);
        if record.open_bets.len() >= MAX_OPEN_BETS {
            return Err(LedgerError::TableFull(table.to_string()));
        }
        let (account, tx) = self.staged(id, Mutation::bet(wallet, stake, room))?;
        let bet_id = record.next_bet_id;
        record.next_bet_id += 1;
        record.open_bets.push(OpenBet {
            id: bet_id,
            account: id.to_string(),
            slot,
            stake,
            wallet,
            room,
            paid: None,
        });
        self.state
            .apply(vec![account_change(&account), table_change(table, &record)])?;
        self.accounts.insert(account.id.clone(), account);
        self.tables.insert(table.to_string(), record);
        debug!(table, account = id, slot, stake, bet_id, "stake escrowed");
        Ok((bet_id, tx))
    }

    /// Returns an escrowed stake to its owner and drops the bet from the table.
    pub fn refund_bet(
        &mut self,
        table: &str,
        bet_id: u64,
        room: RoomId,
    ) -> Result<Transaction, LedgerError> {
        self.credit_bet(table, bet_id, room, None)
    }

    /// Credits a cash-out. The bet stays escrowed, marked paid, until its round is archived.
    pub fn pay_bet(
        &mut self,
        table: &str,
        bet_id: u64,
        net: u64,
        multiplier: Multiplier,
        room: RoomId,
    ) -> Result<Transaction, LedgerError> {
        self.credit_bet(table, bet_id, room, Some((net, multiplier)))
    }

    fn credit_bet(
        &mut self,
        table: &str,
        bet_id: u64,
        room: RoomId,
        win: Option<(u64, Multiplier)>,
    ) -> Result<Transaction, LedgerError> {
        let mut record = self.table_record(table);
        let position = record
            .open_bets
            .iter()
            .position(|bet| bet.id == bet_id && bet.paid.is_none())
            .ok_or_else(|| LedgerError::UnknownBet(table.to_string(), bet_id))?;
        let bet = &mut record.open_bets[position];
        let mutation = match win {
            Some((net, multiplier)) => {
                bet.paid = Some(net);
                Mutation::win(bet.wallet, net, multiplier, room)
            }
            None => Mutation::refund(bet.wallet, bet.stake, room),
        };
        let owner = bet.account.clone();
        if win.is_none() {
            record.open_bets.remove(position);
        }
        let (account, tx) = self.staged(&owner, mutation)?;
        self.state
            .apply(vec![account_change(&account), table_change(table, &record)])?;
        self.accounts.insert(account.id.clone(), account);
        self.tables.insert(table.to_string(), record);
        Ok(tx)
    }

    /// Reserves `nonce` for a round about to take off. Must succeed before the round's commitment
    /// is published.
    pub fn begin_round(&mut self, table: &str, nonce: u64) -> Result<(), LedgerError> {
        let mut record = self.table_record(table);
        record.live_nonce = Some(nonce);
        record.next_nonce = record.next_nonce.max(nonce.saturating_add(1));
        self.state.apply(vec![table_change(table, &record)])?;
        self.tables.insert(table.to_string(), record);
        Ok(())
    }

    /// Archives a crashed round in one write: the treasury takes `log.house_net` (real rounds
    /// only), the log gets its sequence number, and the round's bets `settled` leave escrow.
    pub fn close_round(
        &mut self,
        table: &str,
        settled: &[u64],
        mut log: RoundLog,
    ) -> Result<u64, LedgerError> {
        let seq = self.next_round_seq;
        log.seq = seq;
        let mut changes = Vec::new();

        let house = if log.demo {
            None
        } else {
            let mut house = self.house.clone();
            house.apply_round(log.house_net, self.clock.now_ms());
            changes.push((Key::House, Status::Update(Value::House(house.clone()))));
            Some(house)
        };

        let mut record = self.table_record(table);
        record.open_bets.retain(|bet| !settled.contains(&bet.id));
        record.live_nonce = None;
        record.next_nonce = record.next_nonce.max(log.nonce.saturating_add(1));
        changes.push(table_change(table, &record));

        changes.push((Key::Round(seq), Status::Update(Value::Round(log.clone()))));
        let excess = (self.rounds.len() + 1).saturating_sub(MAX_ROUND_LOGS);
        for old in self.rounds.iter().take(excess) {
            changes.push((Key::Round(old.seq), Status::Delete));
        }

        self.state.apply(changes)?;
        if let Some(house) = house {
            self.house = house;
        }
        self.tables.insert(table.to_string(), record);
        self.rounds.drain(..excess);
        self.rounds.push_back(log);
        self.next_round_seq += 1;
        Ok(seq)
    }

    /// Settles whatever an interrupted process left escrowed on `table`, in one write.
    ///
    /// Unpaid bets are refunded. Cash-outs already paid in the interrupted round stay with their
    /// owners and the treasury is charged their winnings. The interrupted round is voided: its
    /// nonce stays reserved so it is never redrawn. Escrow of deleted accounts is dropped.
    pub fn recover_table(&mut self, table: &str) -> Result<Option<Recovery>, LedgerError> {
        let Some(record) = self.tables.get(table) else {
            return Ok(None);
        };
        if record.is_clear() {
            return Ok(None);
        }
        let mut record = record.clone();
        let mut recovery = Recovery {
            voided_nonce: record.live_nonce.take(),
            ..Recovery::default()
        };

        let mut touched: BTreeMap<String, Account> = BTreeMap::new();
        for bet in std::mem::take(&mut record.open_bets) {
            if bet.paid.is_some() {
                if !bet.wallet.is_demo() {
                    recovery.house_net = recovery
                        .house_net
                        .saturating_sub(signed(bet.profit_paid())?);
                }
                continue;
            }
            let account = match touched.entry(bet.account.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match self.accounts.get(&bet.account) {
                    Some(account) => entry.insert(account.clone()),
                    None => {
                        warn!(
                            table,
                            account = bet.account.as_str(),
                            stake = bet.stake,
                            "dropping escrow of deleted account"
                        );
                        continue;
                    }
                },
            };
            let refund = Mutation::refund(bet.wallet, bet.stake, bet.room)
                .with_note("Refund: round interrupted");
            self.stage(account, refund)?;
            recovery.refunded_bets += 1;
            recovery.refunded_stake = recovery.refunded_stake.saturating_add(bet.stake);
        }

        let mut changes: Vec<(Key, Status)> = touched.values().map(account_change).collect();
        changes.push(table_change(table, &record));
        let house = if recovery.house_net != 0 {
            let mut house = self.house.clone();
            house.apply_round(recovery.house_net, self.clock.now_ms());
            changes.push((Key::House, Status::Update(Value::House(house.clone()))));
            Some(house)
        } else {
            None
        };
        let details = format!(
            "table {table}: voided nonce {:?}, refunded {} bets ({}), house {:+}",
            recovery.voided_nonce, recovery.refunded_bets, recovery.refunded_stake, recovery.house_net
        );
        let (entry, audit_changes, excess) =
            self.stage_audit(SYSTEM_ACTOR, "recover_table", &details, Severity::Warning);
        changes.extend(audit_changes);

        self.state.apply(changes)?;
        self.accounts.extend(touched);
        self.tables.insert(table.to_string(), record);
        if let Some(house) = house {
            self.house = house;
        }
        self.commit_audit(entry, excess);
        warn!(
            table,
            voided = ?recovery.voided_nonce,
            refunded = recovery.refunded_bets,
            stake = recovery.refunded_stake,
            house_net = recovery.house_net,
            "recovered interrupted table"
        );
        Ok(Some(recovery))
    }

    fn stage_audit(
        &self,
        actor: &str,
        action: &str,
        details: &str,
        severity: Severity,
    ) -> (AuditEntry, Vec<(Key, Status)>, usize) {
        let entry = AuditEntry {
            seq: self.next_audit_seq,
            timestamp_ms: self.clock.now_ms(),
            actor: truncate(actor, MAX_ACCOUNT_ID_LENGTH),
            action: truncate(action, MAX_NOTE_LENGTH),
            details: truncate(details, MAX_NOTE_LENGTH),
            severity,
        };
        let mut changes = vec![(
            Key::Audit(entry.seq),
            Status::Update(Value::Audit(entry.clone())),
        )];
        let excess = (self.audit.len() + 1).saturating_sub(MAX_AUDIT_ENTRIES);
        for old in self.audit.iter().take(excess) {
            changes.push((Key::Audit(old.seq), Status::Delete));
        }
        (entry, changes, excess)
    }

    fn commit_audit(&mut self, entry: AuditEntry, excess: usize) {
        self.audit.drain(..excess);
        self.audit.push_back(entry);
        self.next_audit_seq += 1;
    }

    pub fn record_audit(
        &mut self,
        actor: &str,
        action: &str,
        details: &str,
        severity: Severity,
    ) -> Result<AuditEntry, LedgerError> {
        let (entry, changes, excess) = self.stage_audit(actor, action, details, severity);
        self.state.apply(changes)?;
        self.commit_audit(entry.clone(), excess);
        Ok(entry)
    }

    /// Audit entries, newest first.
    pub fn audit_log(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit.iter().rev()
    }

    pub fn backup(&self) -> Backup {
        Backup {
            accounts: self.accounts.values().cloned().collect(),
            house: self.house.clone(),
            config: self.config.clone(),
            rounds: self.rounds.iter().cloned().collect(),
            audit: self.audit.iter().cloned().collect(),
        }
    }

    pub fn export_backup(&self) -> Result<String, LedgerError> {
        serde_json::to_string_pretty(&self.backup()).map_err(|e| LedgerError::Persistence(e.into()))
    }

    /// Replaces the entire ledger with the contents of a JSON backup.
    ///
    /// Oversized histories are trimmed to the retention caps; the root account is recreated if
    /// the backup lacks one. Table escrow records are live state and survive the import. Nothing
    /// changes unless the whole backup is valid and stored.
    pub fn import_backup(&mut self, json: &str) -> Result<(), LedgerError> {
        let mut backup: Backup =
            serde_json::from_str(json).map_err(|e| LedgerError::InvalidBackup(e.to_string()))?;
        backup
            .config
            .validate()
            .map_err(|e| LedgerError::InvalidBackup(e.to_string()))?;

        let mut accounts = BTreeMap::new();
        for mut account in backup.accounts {
            if !valid_account_id(&account.id) {
                return Err(LedgerError::InvalidBackup(format!(
                    "invalid account id {:?}",
                    account.id
                )));
            }
            let excess = account.history.len().saturating_sub(MAX_HISTORY);
            account.history.drain(..excess);
            if accounts.insert(account.id.clone(), account).is_some() {
                return Err(LedgerError::InvalidBackup("duplicate account".to_string()));
            }
        }
        if !accounts.contains_key(ROOT_ACCOUNT) {
            let root = root_account(self.clock.now_ms());
            accounts.insert(root.id.clone(), root);
        }
        let excess = backup.house.history.len().saturating_sub(MAX_HOUSE_SNAPSHOTS);
        backup.house.history.drain(..excess);

        let rounds: BTreeMap<u64, RoundLog> =
            backup.rounds.into_iter().map(|log| (log.seq, log)).collect();
        let rounds: VecDeque<RoundLog> = rounds
            .into_values()
            .rev()
            .take(MAX_ROUND_LOGS)
            .rev()
            .collect();
        let audit: BTreeMap<u64, AuditEntry> = backup
            .audit
            .into_iter()
            .map(|entry| (entry.seq, entry))
            .collect();
        let audit: VecDeque<AuditEntry> = audit
            .into_values()
            .rev()
            .take(MAX_AUDIT_ENTRIES)
            .rev()
            .collect();

        let mut records: BTreeMap<Key, Value> = BTreeMap::new();
        for account in accounts.values() {
            records.insert(
                Key::Account(account.id.clone()),
                Value::Account(account.clone()),
            );
        }
        records.insert(Key::House, Value::House(backup.house.clone()));
        records.insert(Key::Config, Value::Config(backup.config.clone()));
        for log in &rounds {
            records.insert(Key::Round(log.seq), Value::Round(log.clone()));
        }
        for entry in &audit {
            records.insert(Key::Audit(entry.seq), Value::Audit(entry.clone()));
        }
        for (key, value) in &records {
            let encoded = value.encode();
            if Value::decode(encoded.as_ref()).is_err() {
                return Err(LedgerError::InvalidBackup(format!(
                    "record {key:?} exceeds storage limits"
                )));
            }
        }

        let mut changes: Vec<(Key, Status)> = self
            .state
            .load()?
            .into_iter()
            .filter(|(key, _)| !matches!(key, Key::Table(_)) && !records.contains_key(key))
            .map(|(key, _)| (key, Status::Delete))
            .collect();
        changes.extend(
            records
                .into_iter()
                .map(|(key, value)| (key, Status::Update(value))),
        );
        self.state.apply(changes)?;

        self.next_round_seq = rounds.back().map_or(0, |log| log.seq + 1);
        self.next_audit_seq = audit.back().map_or(0, |entry| entry.seq + 1);
        self.accounts = accounts;
        self.house = backup.house;
        self.config = backup.config;
        self.rounds = rounds;
        self.audit = audit;
        warn!(accounts = self.accounts.len(), "ledger replaced from backup");
        Ok(())
    }

    /// Sum of every real and demo balance (for conservation checks).
    pub fn total_balances(&self) -> (u128, u128) {
        self.accounts.values().fold((0, 0), |(real, demo), account| {
            (
                real + u128::from(account.balance),
                demo + u128::from(account.demo_balance),
            )
        })
    }

    #[cfg(any(test, feature = "mocks"))]
    pub fn state(&self) -> &S {
        &self.state
    }

    #[cfg(any(test, feature = "mocks"))]
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }
}
