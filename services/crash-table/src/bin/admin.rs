//! Offline ledger administration.
//!
//! Works directly on the service's SQLite database, so stop the service first. Every command
//! runs through the same role-checked admin console the service uses and is audited the same
//! way.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crashpad_execution::{verify_log, AdminConsole, FairnessError, Ledger, State, SystemClock};
use crashpad_table::persistence::SqliteState;
use crashpad_types::casino::{ConfigPatch, RoundLog, Wallet, ROOT_ACCOUNT};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "Crashpad ledger administration", long_about = None)]
struct Args {
    /// SQLite database of the crash table service.
    #[arg(long, default_value = "crashpad.db")]
    db: PathBuf,

    /// Admin account performing the action.
    #[arg(long, default_value = ROOT_ACCOUNT)]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a JSON backup of the whole ledger (stdout when no file is given).
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the whole ledger with a JSON backup.
    Import { input: PathBuf },
    /// Set an account's balance.
    SetBalance {
        account: String,
        balance: u64,
        /// Adjust the demo wallet instead of the real one.
        #[arg(long)]
        demo: bool,
    },
    Freeze {
        account: String,
        #[arg(long)]
        undo: bool,
    },
    Ban {
        account: String,
        #[arg(long)]
        undo: bool,
    },
    /// Print the game config, or apply a partial update given as JSON.
    Config { patch: Option<String> },
    /// Recent rounds with their fairness check.
    Rounds {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    Audit {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let state = SqliteState::open(&args.db)?;
    let mut ledger = Ledger::open(state, Arc::new(SystemClock)).context("open ledger")?;
    let mut stdout = std::io::stdout().lock();
    run(&mut ledger, &args.actor, args.command, &mut stdout)
}

fn fairness(log: &RoundLog) -> String {
    match verify_log(log) {
        Ok(_) => "verified".to_string(),
        Err(FairnessError::AdminOverride) => "override".to_string(),
        Err(err) => format!("FAILED: {err}"),
    }
}

fn run<S: State>(
    ledger: &mut Ledger<S>,
    actor: &str,
    command: Command,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    if let Command::Config { patch: None } = &command {
        writeln!(out, "{}", serde_json::to_string_pretty(ledger.config())?)?;
        return Ok(());
    }

    let mut console = AdminConsole::new(ledger, actor);
    match command {
        Command::Export { output } => {
            let backup = console.export_backup()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, backup)
                        .with_context(|| format!("write backup to {}", path.display()))?;
                    writeln!(out, "exported to {}", path.display())?;
                }
                None => writeln!(out, "{backup}")?,
            }
        }
        Command::Import { input } => {
            let backup = std::fs::read_to_string(&input)
                .with_context(|| format!("read backup {}", input.display()))?;
            console.import_backup(&backup)?;
            let accounts = console.ledger().accounts().count();
            writeln!(out, "imported {accounts} accounts")?;
        }
        Command::SetBalance {
            account,
            balance,
            demo,
        } => {
            let wallet = if demo { Wallet::Demo } else { Wallet::Real };
            let tx = console.set_balance(&account, wallet, balance)?;
            writeln!(out, "{account}: {balance} ({:+})", tx.amount)?;
        }
        Command::Freeze { account, undo } => {
            console.set_frozen(&account, !undo)?;
            let state = if undo { "unfrozen" } else { "frozen" };
            writeln!(out, "{account} {state}")?;
        }
        Command::Ban { account, undo } => {
            console.set_banned(&account, !undo)?;
            let state = if undo { "unbanned" } else { "banned" };
            writeln!(out, "{account} {state}")?;
        }
        Command::Config { patch } => {
            let patch = patch.unwrap_or_default();
            let patch: ConfigPatch =
                serde_json::from_str(&patch).context("config patch must be a JSON object")?;
            let config = console.update_config(&patch)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
        }
        Command::Rounds { limit } => {
            for log in console.round_history(limit)? {
                writeln!(
                    out,
                    "#{} {} nonce={} crash={} room={} house={:+} {}{}",
                    log.seq,
                    log.table,
                    log.nonce,
                    log.crash_point,
                    log.room.as_str(),
                    log.house_net,
                    fairness(&log),
                    if log.forced { " forced" } else { "" },
                )?;
            }
        }
        Command::Audit { limit } => {
            for entry in console.audit_log(limit)? {
                writeln!(
                    out,
                    "#{} {} {:?} {} {}: {}",
                    entry.seq,
                    entry.timestamp_ms,
                    entry.severity,
                    entry.actor,
                    entry.action,
                    entry.details
                )?;
            }
        }
    }
    Ok(())
}
