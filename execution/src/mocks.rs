use crate::ledger::Ledger;
use crate::round_scheduler::Clock;
use crate::state::{Memory, State, Status};
use anyhow::{anyhow, Result};
use crashpad_types::casino::Role;
use crashpad_types::execution::{Key, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Clock advanced by hand. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// In-memory state whose writes can be made to fail.
#[derive(Default)]
pub struct FailingState {
    inner: Memory,
    failing: Arc<AtomicBool>,
}

impl FailingState {
    /// Returns the switch that toggles write failures.
    pub fn switch(&self) -> Arc<AtomicBool> {
        self.failing.clone()
    }
}

impl State for FailingState {
    fn load(&self) -> Result<Vec<(Key, Value)>> {
        self.inner.load()
    }

    fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.inner.get(key)
    }

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.inner.apply(changes)
    }
}

/// Opens a ledger over fresh memory and registers `player` with a real balance.
pub fn ledger_with_player(clock: &ManualClock, balance: u64) -> (Ledger<Memory>, String) {
    let mut ledger = Ledger::open(Memory::default(), Arc::new(clock.clone()))
        .expect("memory ledger opens");
    let player = "0712345678".to_string();
    ledger
        .register(&player, Role::Player)
        .expect("fresh player registers");
    if balance > 0 {
        ledger.deposit(&player, balance).expect("deposit succeeds");
    }
    (ledger, player)
}
