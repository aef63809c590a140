//! Role-gated admin operations.
//!
//! Every entrypoint checks that the actor is an admin account that is not banned. Refusals are
//! written to the audit trail at `Warning`; successful actions are audited with a severity that
//! reflects how much they can move money.

use crate::bets::Exposure;
use crate::engine::{CrashTable, RoomEntry, TableError};
use crate::ledger::{Ledger, LedgerError};
use crate::state::State;
use crashpad_types::casino::{
    Account, AuditEntry, ConfigPatch, GameConfig, Multiplier, RoomId, RoundLog, Severity,
    Transaction, Wallet,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0} is not authorized")]
    Unauthorized(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Admin actions performed on behalf of `actor`.
pub struct AdminConsole<'a, S: State> {
    ledger: &'a mut Ledger<S>,
    actor: &'a str,
}

impl<'a, S: State> AdminConsole<'a, S> {
    pub fn new(ledger: &'a mut Ledger<S>, actor: &'a str) -> Self {
        Self { ledger, actor }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        self.ledger
    }

    fn authorize(&mut self, action: &str) -> Result<(), AdminError> {
        let allowed = self
            .ledger
            .account(self.actor)
            .is_some_and(|account| account.is_admin() && !account.banned);
        if allowed {
            return Ok(());
        }
        warn!(actor = self.actor, action, "refused admin action");
        if let Err(err) =
            self.ledger
                .record_audit(self.actor, action, "refused: not an admin", Severity::Warning)
        {
            error!(actor = self.actor, action, ?err, "failed to audit refusal");
        }
        Err(AdminError::Unauthorized(self.actor.to_string()))
    }

    /// Records a completed action. The action already happened, so a failed write is only logged.
    fn audit(&mut self, action: &str, details: &str, severity: Severity) {
        if let Err(err) = self
            .ledger
            .record_audit(self.actor, action, details, severity)
        {
            error!(actor = self.actor, action, ?err, "failed to audit admin action");
        }
    }

    pub fn force_crash_now(&mut self, table: &mut CrashTable) -> Result<Multiplier, AdminError> {
        self.authorize("force_crash")?;
        let at = table.force_crash_now(self.ledger)?;
        self.audit(
            "force_crash",
            &format!("{} table crashed at {at}", table.mode().label()),
            Severity::Critical,
        );
        Ok(at)
    }

    pub fn set_next_crash_override(
        &mut self,
        table: &mut CrashTable,
        value: Multiplier,
    ) -> Result<Option<Multiplier>, AdminError> {
        self.authorize("set_crash_override")?;
        let replaced = table.set_next_crash_override(value)?;
        self.audit(
            "set_crash_override",
            &format!("{} table next crash {value}", table.mode().label()),
            Severity::Critical,
        );
        Ok(replaced)
    }

    /// Moves the table to another room, either through a countdown or straight into a round
    /// already in flight.
    pub fn switch_room(
        &mut self,
        table: &mut CrashTable,
        room: RoomId,
        entry: RoomEntry,
    ) -> Result<(), AdminError> {
        self.authorize("switch_room")?;
        table.switch_room(self.ledger, room, entry)?;
        let how = match entry {
            RoomEntry::Countdown(ms) => format!("countdown {ms}ms"),
            RoomEntry::JoinInProgress(at) => format!("joined at {at}"),
        };
        self.audit(
            "switch_room",
            &format!("{} table moved to {} ({how})", table.mode().label(), room.as_str()),
            Severity::Warning,
        );
        Ok(())
    }

    pub fn set_balance(
        &mut self,
        account: &str,
        wallet: Wallet,
        balance: u64,
    ) -> Result<Transaction, AdminError> {
        self.authorize("set_balance")?;
        let tx = self.ledger.set_balance(account, wallet, balance)?;
        self.audit(
            "set_balance",
            &format!("{account} {wallet:?} balance set to {balance} ({:+})", tx.amount),
            Severity::Warning,
        );
        Ok(tx)
    }

    pub fn set_frozen(&mut self, account: &str, frozen: bool) -> Result<(), AdminError> {
        self.authorize("set_frozen")?;
        self.ledger.set_frozen(account, frozen)?;
        let action = if frozen { "frozen" } else { "unfrozen" };
        self.audit("set_frozen", &format!("{account} {action}"), Severity::Warning);
        Ok(())
    }

    pub fn set_banned(&mut self, account: &str, banned: bool) -> Result<(), AdminError> {
        self.authorize("set_banned")?;
        self.ledger.set_banned(account, banned)?;
        let action = if banned { "banned" } else { "unbanned" };
        self.audit("set_banned", &format!("{account} {action}"), Severity::Warning);
        Ok(())
    }

    pub fn delete_account(&mut self, account: &str) -> Result<Account, AdminError> {
        self.authorize("delete_account")?;
        let removed = self.ledger.delete_account(account)?;
        self.audit(
            "delete_account",
            &format!(
                "{account} deleted (balance {}, demo {})",
                removed.balance, removed.demo_balance
            ),
            Severity::Critical,
        );
        Ok(removed)
    }

    pub fn house_deposit(&mut self, amount: u64) -> Result<i64, AdminError> {
        self.authorize("house_deposit")?;
        let balance = self.ledger.house_deposit(amount)?;
        self.audit(
            "house_deposit",
            &format!("deposited {amount}, treasury {balance}"),
            Severity::Info,
        );
        Ok(balance)
    }

    pub fn house_withdraw(&mut self, amount: u64) -> Result<i64, AdminError> {
        self.authorize("house_withdraw")?;
        let balance = self.ledger.house_withdraw(amount)?;
        self.audit(
            "house_withdraw",
            &format!("withdrew {amount}, treasury {balance}"),
            Severity::Warning,
        );
        Ok(balance)
    }

    pub fn update_config(&mut self, patch: &ConfigPatch) -> Result<GameConfig, AdminError> {
        self.authorize("update_config")?;
        let config = self.ledger.update_config(patch)?;
        let details = serde_json::to_string(patch).unwrap_or_else(|_| "config patch".to_string());
        self.audit("update_config", &details, Severity::Warning);
        Ok(config)
    }

    pub fn export_backup(&mut self) -> Result<String, AdminError> {
        self.authorize("export_backup")?;
        let json = self.ledger.export_backup()?;
        self.audit("export_backup", "ledger exported", Severity::Info);
        Ok(json)
    }

    pub fn import_backup(&mut self, json: &str) -> Result<(), AdminError> {
        self.authorize("import_backup")?;
        self.ledger.import_backup(json)?;
        let accounts = self.ledger.accounts().count();
        self.audit(
            "import_backup",
            &format!("ledger replaced ({accounts} accounts)"),
            Severity::Critical,
        );
        Ok(())
    }

    pub fn round_history(&mut self, limit: usize) -> Result<Vec<RoundLog>, AdminError> {
        self.authorize("round_history")?;
        Ok(self.ledger.recent_rounds(limit))
    }

    pub fn audit_log(&mut self, limit: usize) -> Result<Vec<AuditEntry>, AdminError> {
        self.authorize("audit_log")?;
        Ok(self.ledger.audit_log().take(limit).cloned().collect())
    }

    pub fn live_exposure(&mut self, table: &CrashTable) -> Result<Exposure, AdminError> {
        self.authorize("live_exposure")?;
        Ok(table.live_exposure())
    }
}
