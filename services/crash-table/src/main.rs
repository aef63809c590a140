use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State as AxumState};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use crashpad_execution::{Clock, HashChain, Ledger, SystemClock};
use crashpad_table::config::{ServiceConfig, ValidatedConfig};
use crashpad_table::floor::Floor;
use crashpad_table::persistence::SqliteState;
use crashpad_table::protocol::{Broadcast, FloorError, Inbound, Response};
use crashpad_table::session::Session;
use crashpad_types::casino::{RoundLog, MAX_ROUND_LOGS};
use futures_util::{SinkExt, StreamExt};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML service config. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Host interface to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Validate the config, print a report and exit.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Clone)]
struct AppState {
    floor: Arc<Mutex<Floor<SqliteState>>>,
    broadcaster: broadcast::Sender<Broadcast>,
}

impl AppState {
    fn floor(&self) -> MutexGuard<'_, Floor<SqliteState>> {
        // A poisoned lock means a settlement panicked midway; nothing after that can be trusted.
        self.floor.lock().expect("floor lock poisoned")
    }

    fn publish(&self, broadcasts: Vec<Broadcast>) {
        for message in broadcasts {
            // No subscribers is fine.
            let _ = self.broadcaster.send(message);
        }
    }
}

fn init_tracing(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn print_dry_run_report(config: &ValidatedConfig) {
    println!("dry-run report");
    println!("  listen: {}", config.listen_addr());
    println!("  database: {}", config.database.display());
    println!("  log level: {}", config.log_level);
    println!("  tick: {}ms", config.tick.as_millis());
    println!(
        "  timing: idle {}ms, crash display {}ms, growth {}/s",
        config.timing.idle_ms, config.timing.crash_display_ms, config.timing.growth_per_sec
    );
    println!("  client seed: {}", config.client_seed);
    println!(
        "  master secret: {}",
        if config.master_secret.is_some() {
            "configured"
        } else {
            "random per process"
        }
    );
    println!(
        "  admin commands: {}",
        if config.admin_token.is_some() {
            "enabled (token configured)"
        } else {
            "disabled"
        }
    );
    println!("  demo table: {}", config.demo_table);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(db) = args.db {
        config.database = db;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let config = config.validate().context("invalid service config")?;
    if args.dry_run {
        print_dry_run_report(&config);
        return Ok(());
    }
    init_tracing(config.log_level);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = SqliteState::open(&config.database)?;
    let ledger = Ledger::open(state, clock.clone()).context("open ledger")?;
    let chain = match config.master_secret {
        Some(secret) => HashChain::from_secret(secret),
        None => {
            warn!("no master_secret configured, generated one for this process");
            HashChain::random(&mut OsRng)
        }
    };
    let floor = Floor::open(ledger, &config, &chain, clock).context("open tables")?;
    let (broadcaster, _) = broadcast::channel::<Broadcast>(config.broadcast_capacity);
    let state = AppState {
        floor: Arc::new(Mutex::new(floor)),
        broadcaster,
    };

    // Tick loop
    let ticker = state.clone();
    let tick = config.tick;
    tokio::spawn(async move {
        let mut interval = time::interval(tick);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let broadcasts = ticker.floor().tick();
            ticker.publish(broadcasts);
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/rounds", get(rounds))
        .with_state(state);

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .context("invalid listen addr")?;
    info!(%addr, "crash table service listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct RoundsQuery {
    #[serde(default = "default_rounds_limit")]
    limit: usize,
}

fn default_rounds_limit() -> usize {
    50
}

async fn rounds(
    AxumState(state): AxumState<AppState>,
    Query(query): Query<RoundsQuery>,
) -> Json<Vec<RoundLog>> {
    let limit = query.limit.min(MAX_ROUND_LOGS);
    let rounds = state.floor().ledger().recent_rounds(limit);
    Json(rounds)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    AxumState(state): AxumState<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut broadcast_rx = state.broadcaster.subscribe();

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let broadcast_task = {
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(message) => send_json(&tx, &message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client lagging, dropped table events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let mut session = Session::default();
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let response = match serde_json::from_str::<Inbound>(&text) {
                    Ok(inbound) => {
                        let (response, broadcasts) = state.floor().handle(&mut session, inbound);
                        state.publish(broadcasts);
                        response
                    }
                    Err(err) => {
                        warn!(?err, "invalid inbound message");
                        Response::error(
                            request_id_of(&text),
                            &FloorError::Malformed(err.to_string()),
                        )
                    }
                };
                send_json(&tx, &response);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    write_task.abort();
    broadcast_task.abort();
}

/// Best-effort `requestId` of a message that failed to parse.
fn request_id_of(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("requestId")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn send_json<T: Serialize>(tx: &mpsc::UnboundedSender<Message>, message: &T) {
    if let Ok(payload) = serde_json::to_string(message) {
        let _ = tx.send(Message::Text(payload));
    }
}
