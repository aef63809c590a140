//! Provably fair crash points.
//!
//! Every round draws its crash point from a server seed the house commits to before the round
//! starts, a player-visible client seed and a per-table nonce.
//!
//! ## Commit-Reveal Flow
//!
//! 1. **Commit** - `commitment = SHA256(server_seed)` is published when the round starts
//! 2. **Reveal** - the server seed is disclosed once the round has crashed
//! 3. **Verify** - anyone can check the commitment and recompute the crash point
//!
//! ## Hash Chain
//!
//! Server seeds are derived from a per-table master secret:
//! ```text
//! server_seed[n] = SHA256(master_secret || n)
//! commitment[n]  = SHA256(server_seed[n])
//! ```
//!
//! ## Crash Derivation
//!
//! ```text
//! digest = HMAC_SHA256(key = server_seed, msg = "{client_seed}:{nonce}")
//! h      = first 52 bits of digest           (r = h / 2^52)
//! crash  = floor((1 - edge) / (1 - r) * 100) / 100, clamped to [1.00, 200000.00]
//! ```
//!
//! The division is carried out on integers so every verifier gets the same two-decimal result.

use commonware_cryptography::sha256::Sha256;
use commonware_cryptography::Hasher;
use crashpad_types::casino::{
    CommitmentSource, Multiplier, RoundLog, BPS_DENOMINATOR, MAX_CRASH_X100, MIN_CRASH_X100,
};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

type HmacSha256 = Hmac<sha2::Sha256>;

/// Length of server seeds and commitments in bytes.
pub const SEED_LEN: usize = 32;

/// Bits of the digest used as the uniform draw.
const DRAW_BITS: u32 = 52;
const DRAW_SPACE: u64 = 1 << DRAW_BITS;

/// A server seed and its published commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedPair {
    pub commitment: [u8; SEED_LEN],
    pub server_seed: [u8; SEED_LEN],
}

impl SeedPair {
    pub fn verify(&self) -> bool {
        verify_commitment(&self.commitment, &self.server_seed)
    }
}

/// `commitment = SHA256(server_seed)`
pub fn compute_commitment(server_seed: &[u8; SEED_LEN]) -> [u8; SEED_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(server_seed);
    hasher.finalize().0
}

pub fn verify_commitment(commitment: &[u8; SEED_LEN], server_seed: &[u8; SEED_LEN]) -> bool {
    commitment == &compute_commitment(server_seed)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FairnessError {
    #[error("invalid commitment length: {0} (expected 32)")]
    InvalidCommitmentLength(usize),
    #[error("invalid server seed length: {0} (expected 32)")]
    InvalidSeedLength(usize),
    #[error("server seed does not match commitment")]
    CommitmentMismatch,
    #[error("round used an admin override")]
    AdminOverride,
    #[error("crash point mismatch (expected={expected}, recorded={recorded})")]
    CrashMismatch {
        expected: Multiplier,
        recorded: Multiplier,
    },
}

/// Per-table hash chain of server seeds.
#[derive(Clone)]
pub struct HashChain {
    master_secret: [u8; SEED_LEN],
}

impl HashChain {
    /// Creates a chain from a fresh random master secret.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut master_secret = [0u8; SEED_LEN];
        rng.fill_bytes(&mut master_secret);
        Self { master_secret }
    }

    pub fn from_secret(master_secret: [u8; SEED_LEN]) -> Self {
        Self { master_secret }
    }

    pub fn secret(&self) -> &[u8; SEED_LEN] {
        &self.master_secret
    }

    /// Independent chain for one table: `SHA256(master_secret || label)`. Tables sharing a master
    /// secret must never share seeds, or revealing one table's round would expose the other's.
    pub fn for_table(&self, label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&self.master_secret);
        hasher.update(label.as_bytes());
        Self {
            master_secret: hasher.finalize().0,
        }
    }

    pub fn generate(&self, nonce: u64) -> SeedPair {
        let server_seed = self.derive_server_seed(nonce);
        let commitment = compute_commitment(&server_seed);
        SeedPair {
            commitment,
            server_seed,
        }
    }

    pub fn derive_server_seed(&self, nonce: u64) -> [u8; SEED_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.master_secret);
        hasher.update(&nonce.to_be_bytes());
        hasher.finalize().0
    }

    /// Commitments for `count` rounds starting at `start`, for publishing a schedule ahead of time.
    pub fn precompute_commitments(&self, start: u64, count: u64) -> Vec<(u64, [u8; SEED_LEN])> {
        let end = start.saturating_add(count);
        (start..end)
            .map(|nonce| (nonce, self.generate(nonce).commitment))
            .collect()
    }
}

/// `HMAC_SHA256(server_seed, "{client_seed}:{nonce}")`
pub fn round_digest(server_seed: &[u8], client_seed: &str, nonce: u64) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(server_seed).expect("HMAC can take a key of any size");
    mac.update(client_seed.as_bytes());
    mac.update(b":");
    mac.update(nonce.to_string().as_bytes());
    mac.finalize().into_bytes().into()
}

fn word(digest: &[u8; 32], index: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[index * 8..index * 8 + 8]);
    u64::from_be_bytes(bytes)
}

/// The uniform draw `h` (`r = h / 2^52`).
pub fn draw_bits(digest: &[u8; 32]) -> u64 {
    word(digest, 0) >> (64 - DRAW_BITS)
}

/// Edge-adjusted inverse-uniform transform.
pub fn crash_from_draw(h: u64, edge_bps: u16) -> Multiplier {
    let h = h.min(DRAW_SPACE - 1);
    let keep = u128::from(BPS_DENOMINATOR.saturating_sub(u64::from(edge_bps)));
    let numerator = keep * 100 * u128::from(DRAW_SPACE);
    let denominator = u128::from(DRAW_SPACE - h) * u128::from(BPS_DENOMINATOR);
    let x100 = (numerator / denominator)
        .clamp(u128::from(MIN_CRASH_X100), u128::from(MAX_CRASH_X100));
    Multiplier::from_hundredths(x100 as u64)
}

pub fn crash_point(server_seed: &[u8], client_seed: &str, nonce: u64, edge_bps: u16) -> Multiplier {
    crash_from_draw(draw_bits(&round_digest(server_seed, client_seed, nonce)), edge_bps)
}

/// Crash point for demo tables.
///
/// Half of all rounds land between 1.50x and 5.00x; of the rest, 5% are "hype" rounds between
/// 10.00x and 100.00x. Everything else follows the normal formula. The remaining digest words
/// provide the extra randomness, so demo rounds stay reproducible from the revealed seed.
pub fn demo_crash_point(
    server_seed: &[u8],
    client_seed: &str,
    nonce: u64,
    edge_bps: u16,
) -> Multiplier {
    let digest = round_digest(server_seed, client_seed, nonce);
    let h = draw_bits(&digest);
    if h < DRAW_SPACE / 2 {
        return Multiplier::from_hundredths(150 + word(&digest, 1) % 351);
    }
    if word(&digest, 2) % 10_000 < 500 {
        return Multiplier::from_hundredths(1_000 + word(&digest, 3) % 9_001);
    }
    crash_from_draw(h, edge_bps)
}

fn to_seed(
    bytes: &[u8],
    err: fn(usize) -> FairnessError,
) -> Result<[u8; SEED_LEN], FairnessError> {
    bytes.try_into().map_err(|_| err(bytes.len()))
}

/// Recomputes a round from its revealed inputs.
///
/// Checks the commitment and returns the crash point the inputs produce.
pub fn verify_round(
    server_seed: &[u8],
    client_seed: &str,
    nonce: u64,
    edge_bps: u16,
    commitment: &[u8],
) -> Result<Multiplier, FairnessError> {
    let seed = to_seed(server_seed, FairnessError::InvalidSeedLength)?;
    let commitment = to_seed(commitment, FairnessError::InvalidCommitmentLength)?;
    if !verify_commitment(&commitment, &seed) {
        return Err(FairnessError::CommitmentMismatch);
    }
    Ok(crash_point(&seed, client_seed, nonce, edge_bps))
}

/// Verifies an archived round end to end.
pub fn verify_log(log: &RoundLog) -> Result<Multiplier, FairnessError> {
    if log.source == CommitmentSource::AdminOverride {
        return Err(FairnessError::AdminOverride);
    }
    let expected = if log.demo {
        let seed = to_seed(&log.server_seed, FairnessError::InvalidSeedLength)?;
        let commitment = to_seed(&log.commitment, FairnessError::InvalidCommitmentLength)?;
        if !verify_commitment(&commitment, &seed) {
            return Err(FairnessError::CommitmentMismatch);
        }
        demo_crash_point(&seed, &log.client_seed, log.nonce, log.edge_bps)
    } else {
        verify_round(
            &log.server_seed,
            &log.client_seed,
            log.nonce,
            log.edge_bps,
            &log.commitment,
        )?
    };
    if expected != log.target {
        return Err(FairnessError::CrashMismatch {
            expected,
            recorded: log.target,
        });
    }
    Ok(expected)
}

/// Single-slot admin override for the next round's crash point.
#[derive(Clone, Debug, Default)]
pub struct PendingOverride {
    slot: Option<Multiplier>,
}

impl PendingOverride {
    /// Stages a value, returning the one it replaced.
    pub fn stage(&mut self, value: Multiplier) -> Option<Multiplier> {
        self.slot.replace(value)
    }

    /// Returns and clears the staged value.
    pub fn take(&mut self) -> Option<Multiplier> {
        self.slot.take()
    }

    pub fn peek(&self) -> Option<Multiplier> {
        self.slot
    }
}

/// Outcome of drawing a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrashDraw {
    pub nonce: u64,
    pub crash: Multiplier,
    pub edge_bps: u16,
    pub seeds: SeedPair,
    pub client_seed: String,
    pub source: CommitmentSource,
}

/// Draws successive rounds for one table.
#[derive(Clone)]
pub struct RoundSeeder {
    chain: HashChain,
    client_seed: String,
    next_nonce: u64,
}

impl RoundSeeder {
    pub fn new(chain: HashChain, client_seed: impl Into<String>, next_nonce: u64) -> Self {
        Self {
            chain,
            client_seed: client_seed.into(),
            next_nonce,
        }
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    /// Takes effect from the next draw.
    pub fn set_client_seed(&mut self, client_seed: impl Into<String>) {
        self.client_seed = client_seed.into();
    }

    /// Draws the next round. An override replaces the crash point but still consumes a nonce, so
    /// the chain never reuses a seed.
    pub fn draw(
        &mut self,
        edge_bps: u16,
        demo: bool,
        override_crash: Option<Multiplier>,
    ) -> CrashDraw {
        let nonce = self.next_nonce;
        self.next_nonce = self.next_nonce.saturating_add(1);
        let seeds = self.chain.generate(nonce);
        let (crash, source) = match override_crash {
            Some(value) => (value, CommitmentSource::AdminOverride),
            None if demo => (
                demo_crash_point(&seeds.server_seed, &self.client_seed, nonce, edge_bps),
                CommitmentSource::Organic,
            ),
            None => (
                crash_point(&seeds.server_seed, &self.client_seed, nonce, edge_bps),
                CommitmentSource::Organic,
            ),
        };
        CrashDraw {
            nonce,
            crash,
            edge_bps,
            seeds,
            client_seed: self.client_seed.clone(),
            source,
        }
    }
}
