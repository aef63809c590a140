//! Everything one service process hosts: the ledger, the real-money table, the optional demo
//! table and a simulated crowd per table.
//!
//! The service keeps a [`Floor`] behind one mutex. The tick loop and every request lock it for a
//! single call, so the ledger only ever sees one writer.

use crate::config::ValidatedConfig;
use crate::protocol::{AdminCommand, Broadcast, CrowdUpdate, FloorError, Inbound, Response};
use crate::session::{Access, Session};
use crashpad_execution::{
    AdminConsole, Clock, CrashTable, Crowd, HashChain, Ledger, LedgerError, RoomEntry,
    RoundSeeder, State, TableError, TableMode,
};
use crashpad_types::casino::{Multiplier, Role, RoomId, Severity};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct Seat {
    table: CrashTable,
    crowd: Crowd,
    /// (room, nonce, online, cashed out) of the last published crowd update.
    published: Option<(RoomId, Option<u64>, usize, usize)>,
}

impl Seat {
    fn new(table: CrashTable, crowd_seed: u64) -> Self {
        Self {
            table,
            crowd: Crowd::new(crowd_seed),
            published: None,
        }
    }

    fn drain(&mut self, out: &mut Vec<Broadcast>) {
        self.crowd.observe(&self.table);
        out.extend(self.table.drain_events().into_iter().map(Broadcast::Round));

        let key = (
            self.table.room(),
            self.table.current_nonce(),
            self.crowd.online(),
            self.crowd.cashed_out(),
        );
        if self.published != Some(key) {
            self.published = Some(key);
            out.push(Broadcast::Crowd(CrowdUpdate {
                table: self.table.mode().label(),
                online: self.crowd.online(),
                cashed_out: self.crowd.cashed_out(),
                players: self.crowd.players().to_vec(),
            }));
        }
    }
}

pub struct Floor<S: State> {
    ledger: Ledger<S>,
    real: Seat,
    demo: Option<Seat>,
    access: Access,
}

fn seat_mut<'a>(
    real: &'a mut Seat,
    demo: &'a mut Option<Seat>,
    mode: TableMode,
) -> Result<&'a mut Seat, FloorError> {
    match mode {
        TableMode::Real => Ok(real),
        TableMode::Demo => demo
            .as_mut()
            .ok_or(FloorError::TableDisabled(TableMode::Demo.label())),
    }
}

fn multiplier(value: f64) -> Result<Multiplier, FloorError> {
    Multiplier::parse_f64(value).ok_or(FloorError::Table(TableError::InvalidMultiplier))
}

fn identified(session: &Session) -> Result<&str, FloorError> {
    session.account().ok_or(FloorError::NotIdentified)
}

impl<S: State> Floor<S> {
    pub fn new(
        ledger: Ledger<S>,
        real: CrashTable,
        demo: Option<CrashTable>,
        crowd_seed: u64,
        access: Access,
    ) -> Self {
        Self {
            ledger,
            real: Seat::new(real, crowd_seed),
            demo: demo.map(|table| Seat::new(table, crowd_seed.wrapping_add(1))),
            access,
        }
    }

    /// Opens the configured tables. A round interrupted by a restart is voided and its stakes
    /// refunded first; each table then gets its own seed chain and resumes its nonce sequence
    /// past every nonce already used.
    pub fn open(
        mut ledger: Ledger<S>,
        config: &ValidatedConfig,
        chain: &HashChain,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        ledger.recover_table(TableMode::Real.label())?;
        if config.demo_table {
            ledger.recover_table(TableMode::Demo.label())?;
        }

        let table = |mode: TableMode| {
            let seeder = RoundSeeder::new(
                chain.for_table(mode.label()),
                config.client_seed.clone(),
                ledger.next_nonce(mode.label()),
            );
            CrashTable::new(mode, config.timing, seeder, clock.clone())
        };
        let real = table(TableMode::Real);
        let demo = config.demo_table.then(|| table(TableMode::Demo));
        let crowd_seed = config.crowd_seed.unwrap_or_else(rand::random);
        let access = Access::new(chain, config.admin_token.clone());
        Ok(Self::new(ledger, real, demo, crowd_seed, access))
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn table(&self, mode: TableMode) -> Result<&CrashTable, FloorError> {
        match mode {
            TableMode::Real => Ok(&self.real.table),
            TableMode::Demo => self
                .demo
                .as_ref()
                .map(|seat| &seat.table)
                .ok_or(FloorError::TableDisabled(TableMode::Demo.label())),
        }
    }

    /// Advances every table to the current time and returns what happened.
    pub fn tick(&mut self) -> Vec<Broadcast> {
        self.real.table.tick(&mut self.ledger);
        if let Some(demo) = self.demo.as_mut() {
            demo.table.tick(&mut self.ledger);
        }
        self.drain()
    }

    fn drain(&mut self) -> Vec<Broadcast> {
        let mut out = Vec::new();
        self.real.drain(&mut out);
        if let Some(demo) = self.demo.as_mut() {
            demo.drain(&mut out);
        }
        out
    }

    /// Handles one message from the connection owning `session`. Returns the reply for the
    /// sender and the table activity it caused, for everyone.
    pub fn handle(&mut self, session: &mut Session, inbound: Inbound) -> (Response, Vec<Broadcast>) {
        let request_id = inbound.request_id().to_string();
        let response = match self.dispatch(session, inbound) {
            Ok(data) => Response::Ack { request_id, data },
            Err(err) => {
                if err.code() == "INTERNAL" {
                    error!(%request_id, ?err, "request failed");
                } else {
                    debug!(%request_id, code = err.code(), "request rejected");
                }
                Response::error(request_id, &err)
            }
        };
        (response, self.drain())
    }

    fn identify(
        &mut self,
        session: &mut Session,
        account_id: &str,
        access_key: Option<&str>,
        admin_token: Option<&str>,
    ) -> Result<Option<Value>, FloorError> {
        if let Some(bound) = session.account() {
            if bound != account_id {
                return Err(FloorError::AlreadyIdentified(bound.to_string()));
            }
        }
        let account = self
            .ledger
            .account(account_id)
            .ok_or(FloorError::BadCredentials)?;
        let role = account.role;
        let admin = match (access_key, admin_token) {
            (_, Some(token)) => {
                if !self.access.verify_admin_token(token) {
                    warn!(account = account_id, "admin token rejected");
                    if let Err(err) = self.ledger.record_audit(
                        account_id,
                        "identify",
                        "refused: bad admin token",
                        Severity::Warning,
                    ) {
                        error!(account = account_id, ?err, "failed to audit refusal");
                    }
                    return Err(FloorError::BadCredentials);
                }
                true
            }
            (Some(key), None) if self.access.verify_access_key(account_id, key) => false,
            _ => return Err(FloorError::BadCredentials),
        };
        session.bind(account_id, admin);
        info!(account = account_id, admin, "connection identified");
        Ok(Some(json!({ "accountId": account_id, "role": role, "admin": admin })))
    }

    fn dispatch(
        &mut self,
        session: &mut Session,
        inbound: Inbound,
    ) -> Result<Option<Value>, FloorError> {
        match inbound {
            Inbound::Register { account_id, .. } => {
                if let Some(bound) = session.account() {
                    return Err(FloorError::AlreadyIdentified(bound.to_string()));
                }
                let account = self.ledger.register(&account_id, Role::Player)?;
                session.bind(&account_id, false);
                Ok(Some(json!({
                    "account": account,
                    "accessKey": self.access.access_key(&account_id),
                })))
            }
            Inbound::Identify {
                account_id,
                access_key,
                admin_token,
                ..
            } => self.identify(
                session,
                &account_id,
                access_key.as_deref(),
                admin_token.as_deref(),
            ),
            Inbound::Snapshot { table, .. } => {
                let seat = seat_mut(&mut self.real, &mut self.demo, table)?;
                Ok(Some(json!({
                    "table": seat.table.snapshot(),
                    "online": seat.crowd.online(),
                    "crowd": seat.crowd.players(),
                })))
            }
            Inbound::Admin { command, .. } => {
                let actor = identified(session)?;
                if !session.is_admin() {
                    return Err(FloorError::AdminSessionRequired);
                }
                self.admin(actor, command)
            }
            player => {
                let account = identified(session)?;
                self.play(account, player)
            }
        }
    }

    /// Account and table commands on behalf of the bound `account`.
    fn play(&mut self, account: &str, inbound: Inbound) -> Result<Option<Value>, FloorError> {
        let Floor {
            ledger, real, demo, ..
        } = self;
        match inbound {
            Inbound::Deposit { amount, .. } => {
                let tx = ledger.deposit(account, amount)?;
                Ok(Some(json!({ "balance": tx.balance_after })))
            }
            Inbound::Withdraw { amount, .. } => {
                let tx = ledger.withdraw(account, amount)?;
                Ok(Some(json!({ "balance": tx.balance_after })))
            }
            Inbound::Balance { .. } => {
                let account = ledger
                    .account(account)
                    .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))?;
                Ok(Some(json!({
                    "balance": account.balance,
                    "demoBalance": account.demo_balance,
                    "frozen": account.frozen,
                })))
            }
            Inbound::PlaceBet {
                table,
                slot,
                stake,
                auto_cash_out,
                ..
            } => {
                let auto_cash_out = auto_cash_out.map(multiplier).transpose()?;
                let seat = seat_mut(real, demo, table)?;
                let bet = seat
                    .table
                    .place_bet(ledger, account, slot, stake, auto_cash_out)?;
                Ok(Some(json!(bet)))
            }
            Inbound::CancelBet { table, slot, .. } => {
                let seat = seat_mut(real, demo, table)?;
                let refunded = seat.table.cancel_bet(ledger, account, slot)?;
                Ok(Some(json!({ "refunded": refunded })))
            }
            Inbound::CashOut { table, slot, .. } => {
                let seat = seat_mut(real, demo, table)?;
                let cash_out = seat.table.cash_out(ledger, account, slot)?;
                Ok(Some(json!(cash_out)))
            }
            Inbound::SetAutoCashOut {
                table,
                slot,
                target,
                ..
            } => {
                let target = target.map(multiplier).transpose()?;
                let seat = seat_mut(real, demo, table)?;
                seat.table.set_auto_cash_out(account, slot, target)?;
                Ok(None)
            }
            Inbound::SetClientSeed {
                table, client_seed, ..
            } => {
                let seat = seat_mut(real, demo, table)?;
                seat.table.set_client_seed(&client_seed)?;
                info!(account, table = table.label(), "client seed changed");
                Ok(None)
            }
            Inbound::Register { .. }
            | Inbound::Identify { .. }
            | Inbound::Snapshot { .. }
            | Inbound::Admin { .. } => Err(FloorError::Malformed(
                "not an account command".to_string(),
            )),
        }
    }

    fn admin(&mut self, actor: &str, command: AdminCommand) -> Result<Option<Value>, FloorError> {
        let Floor {
            ledger, real, demo, ..
        } = self;
        let mut console = AdminConsole::new(ledger, actor);
        match command {
            AdminCommand::ForceCrash { table } => {
                let seat = seat_mut(real, demo, table)?;
                let at = console.force_crash_now(&mut seat.table)?;
                Ok(Some(json!({ "crashAt": at })))
            }
            AdminCommand::SetNextCrash { table, multiplier: value } => {
                let value = multiplier(value)?;
                let seat = seat_mut(real, demo, table)?;
                let replaced = console.set_next_crash_override(&mut seat.table, value)?;
                Ok(Some(json!({ "replaced": replaced })))
            }
            AdminCommand::SwitchRoom {
                table,
                room,
                join_at,
            } => {
                let seat = seat_mut(real, demo, table)?;
                let entry = match join_at {
                    Some(value) => RoomEntry::JoinInProgress(multiplier(value)?),
                    None => RoomEntry::Countdown(seat.table.timing().idle_ms),
                };
                console.switch_room(&mut seat.table, room, entry)?;
                Ok(Some(json!(seat.table.snapshot())))
            }
            AdminCommand::SetBalance {
                account_id,
                wallet,
                balance,
            } => {
                let tx = console.set_balance(&account_id, wallet, balance)?;
                Ok(Some(json!(tx)))
            }
            AdminCommand::SetFrozen { account_id, frozen } => {
                console.set_frozen(&account_id, frozen)?;
                Ok(None)
            }
            AdminCommand::SetBanned { account_id, banned } => {
                console.set_banned(&account_id, banned)?;
                Ok(None)
            }
            AdminCommand::DeleteAccount { account_id } => {
                let removed = console.delete_account(&account_id)?;
                Ok(Some(json!({
                    "balance": removed.balance,
                    "demoBalance": removed.demo_balance,
                })))
            }
            AdminCommand::HouseDeposit { amount } => {
                let balance = console.house_deposit(amount)?;
                Ok(Some(json!({ "house": balance })))
            }
            AdminCommand::HouseWithdraw { amount } => {
                let balance = console.house_withdraw(amount)?;
                Ok(Some(json!({ "house": balance })))
            }
            AdminCommand::UpdateConfig { patch } => {
                let config = console.update_config(&patch)?;
                Ok(Some(json!(config)))
            }
            AdminCommand::ExportBackup => {
                let backup = console.export_backup()?;
                Ok(Some(Value::String(backup)))
            }
            AdminCommand::ImportBackup { backup } => {
                console.import_backup(&backup)?;
                Ok(None)
            }
            AdminCommand::RoundHistory { limit } => Ok(Some(json!(console.round_history(limit)?))),
            AdminCommand::AuditLog { limit } => Ok(Some(json!(console.audit_log(limit)?))),
            AdminCommand::LiveExposure { table } => {
                let seat = seat_mut(real, demo, table)?;
                Ok(Some(json!(console.live_exposure(&seat.table)?)))
            }
        }
    }
}
