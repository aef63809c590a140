/// Maximum account identifier length (phone number or username).
pub const MAX_ACCOUNT_ID_LENGTH: usize = 32;

/// Maximum length of free-text notes, room tags and audit details.
pub const MAX_NOTE_LENGTH: usize = 256;

/// Maximum client seed length.
pub const MAX_CLIENT_SEED_LENGTH: usize = 64;

/// Identifier of the built-in administrator account.
pub const ROOT_ACCOUNT: &str = "root";

/// Demo wallet granted to every new account.
pub const STARTING_DEMO_BALANCE: u64 = 50_000;

/// Initial house capital.
pub const HOUSE_INITIAL_CAPITAL: i64 = 500_000;

/// Concurrent bet slots per account and round.
pub const MAX_BET_SLOTS: u8 = 2;

/// Transactions retained per account (oldest dropped first).
pub const MAX_HISTORY: usize = 100;

/// Treasury balance snapshots retained for reporting.
pub const MAX_HOUSE_SNAPSHOTS: usize = 50;

/// Round logs retained by the ledger.
pub const MAX_ROUND_LOGS: usize = 500;

/// Audit entries retained by the ledger.
pub const MAX_AUDIT_ENTRIES: usize = 200;

/// Tax on real-money winnings (basis points of profit).
pub const TAX_RATE_BPS: u64 = 2_000;

/// Edge used when the configured RTP is missing or malformed (4%).
pub const DEFAULT_EDGE_BPS: u16 = 400;

/// Default return-to-player (96%).
pub const DEFAULT_RTP_BPS: u16 = 9_600;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Lowest possible crash point (1.00x).
pub const MIN_CRASH_X100: u64 = 100;

/// Ceiling on crash points (200,000x) so `r -> 1` cannot blow up.
pub const MAX_CRASH_X100: u64 = 20_000_000;

/// Defaults mirrored by [`crate::GameConfig::default`].
pub const DEFAULT_MIN_BET: u64 = 10;
pub const DEFAULT_MAX_BET: u64 = 5_000;
pub const DEFAULT_MAX_PROFIT_PER_ROUND: u64 = 1_000_000;

/// Escrowed bets a table record may hold (current round plus queue).
pub const MAX_OPEN_BETS: usize = 4_096;
