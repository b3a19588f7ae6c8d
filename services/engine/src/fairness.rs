//! Provably-fair crash point generation (commit-reveal)
//!
//! Per round:
//! 1. a fresh 256-bit server seed is drawn from the OS RNG
//! 2. `commit_hash = sha256(seed)` is published before bets are accepted
//! 3. `derived_hash = sha256(seed || round_id)` binds the seed to one round
//! 4. `u = max(1, floor(derived_hash * 10^18 / 2^256))`, an 18-decimal fixed-point draw in (0, 1]
//! 5. `crash_point = clamp((1 - edge) / u, min, max)`
//!
//! After the crash the seed is revealed and anyone can replay steps 2-5.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::constants::{BPS_DENOMINATOR, CRASH_POINT_DISPLAY_DECIMALS, UNIFORM_SCALE};
use shared::types::RoundId;

use crate::config::GrowthConfig;
use crate::errors::{EngineError, Result};

/// Secret per-round seed; its `Debug` output never contains the bytes
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSeed([u8; 32]);

impl ServerSeed {
    /// Draw a fresh seed from the operating system RNG
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EngineError::configuration("server_seed", e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| EngineError::configuration("server_seed", format!("invalid hex: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::configuration("server_seed", "seed must be 32 bytes"))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerSeed(<redacted>)")
    }
}

/// `sha256(seed)`, hex-encoded
pub fn commit(seed: &ServerSeed) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// `sha256(seed || round_id)` using the hyphenated round id
pub fn derive_round_hash(seed: &ServerSeed, round_id: &RoundId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(round_id.to_string().as_bytes());
    hasher.finalize().into()
}

/// Map a 256-bit big-endian hash to `u` in (0, 1], scaled by 10^18
///
/// `floor(H * 10^18 / 2^256)` is the carry out of the top limb of `H * 10^18`,
/// so the product is accumulated limb by limb without a bignum type.
pub fn hash_to_uniform(hash: &[u8; 32]) -> u64 {
    let mut carry: u128 = 0;
    for chunk in hash.rchunks(8) {
        let mut limb = [0u8; 8];
        limb.copy_from_slice(chunk);
        let product = u64::from_be_bytes(limb) as u128 * UNIFORM_SCALE as u128 + carry;
        carry = product >> 64;
    }
    (carry as u64).max(1)
}

/// `clamp((1 - house_edge) / u, min, max)` with `u` scaled by 10^18
pub fn compute_crash_point(u: u64, house_edge_bps: i64, growth: &GrowthConfig) -> Result<f64> {
    if house_edge_bps < 0 {
        return Err(EngineError::configuration(
            "house_edge_bps",
            format!("must not be negative, got {}", house_edge_bps),
        ));
    }
    let edge_factor = (BPS_DENOMINATOR - house_edge_bps) as f64 / BPS_DENOMINATOR as f64;
    let uniform = u.max(1) as f64 / UNIFORM_SCALE as f64;
    Ok(growth.clamp(edge_factor / uniform))
}

/// Crash point rounded for display
pub fn display_crash_point(crash_point: f64) -> f64 {
    let factor = 10f64.powi(CRASH_POINT_DISPLAY_DECIMALS);
    (crash_point * factor).round() / factor
}

/// Everything the engine needs to know about one round's outcome
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub seed: ServerSeed,
    pub commit_hash: String,
    pub derived_hash: String,
    pub u: u64,
    pub crash_point: f64,
    pub crash_point_display: f64,
}

/// Verification payload published with the crash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairnessProof {
    pub round_id: RoundId,
    pub commit_hash: String,
    pub server_seed: String,
    pub derived_hash: String,
    pub u: u64,
    pub crash_point: f64,
    pub house_edge_bps: i64,
}

/// Result of independently replaying a proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub commit_matches: bool,
    pub derived_hash_matches: bool,
    pub uniform_matches: bool,
    pub crash_point_matches: bool,
    pub recomputed_crash_point: f64,
    pub valid: bool,
}

/// Commit-reveal outcome generator for one table
#[derive(Debug, Clone)]
pub struct FairnessGenerator {
    house_edge_bps: i64,
    growth: GrowthConfig,
}

impl FairnessGenerator {
    pub fn new(house_edge_bps: i64, growth: GrowthConfig) -> Result<Self> {
        if house_edge_bps < 0 {
            return Err(EngineError::configuration(
                "house_edge_bps",
                format!("must not be negative, got {}", house_edge_bps),
            ));
        }
        growth.validate()?;
        Ok(Self {
            house_edge_bps,
            growth,
        })
    }

    pub fn house_edge_bps(&self) -> i64 {
        self.house_edge_bps
    }

    /// Fresh seed, commitment and crash point for `round_id`
    pub fn draw(&self, round_id: &RoundId) -> Result<RoundOutcome> {
        let seed = ServerSeed::generate()?;
        self.outcome_for(seed, round_id)
    }

    /// Deterministic outcome of a known seed
    pub fn outcome_for(&self, seed: ServerSeed, round_id: &RoundId) -> Result<RoundOutcome> {
        let commit_hash = commit(&seed);
        let derived = derive_round_hash(&seed, round_id);
        let u = hash_to_uniform(&derived);
        let crash_point = compute_crash_point(u, self.house_edge_bps, &self.growth)?;

        Ok(RoundOutcome {
            seed,
            commit_hash,
            derived_hash: hex::encode(derived),
            u,
            crash_point,
            crash_point_display: display_crash_point(crash_point),
        })
    }

    /// Replay a revealed proof; every published value must be reproduced exactly
    pub fn verify(&self, proof: &FairnessProof) -> VerificationReport {
        let seed = match ServerSeed::from_hex(&proof.server_seed) {
            Ok(seed) => seed,
            Err(_) => {
                return VerificationReport {
                    commit_matches: false,
                    derived_hash_matches: false,
                    uniform_matches: false,
                    crash_point_matches: false,
                    recomputed_crash_point: 0.0,
                    valid: false,
                }
            }
        };

        let commit_matches = commit(&seed).eq_ignore_ascii_case(&proof.commit_hash);
        let derived = derive_round_hash(&seed, &proof.round_id);
        let derived_hash_matches = hex::encode(derived).eq_ignore_ascii_case(&proof.derived_hash);
        let u = hash_to_uniform(&derived);
        let uniform_matches = u == proof.u;
        let recomputed_crash_point =
            compute_crash_point(u, proof.house_edge_bps, &self.growth).unwrap_or(0.0);
        let crash_point_matches = recomputed_crash_point == proof.crash_point;

        VerificationReport {
            commit_matches,
            derived_hash_matches,
            uniform_matches,
            crash_point_matches,
            recomputed_crash_point,
            valid: commit_matches && derived_hash_matches && uniform_matches && crash_point_matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> FairnessGenerator {
        FairnessGenerator::new(200, GrowthConfig::default()).unwrap()
    }

    #[test]
    fn test_crash_point_always_within_bounds() {
        let generator = generator();
        for _ in 0..2_000 {
            let outcome = generator.draw(&RoundId::new()).unwrap();
            assert!(
                (0.5..=50.0).contains(&outcome.crash_point),
                "crash point {} out of range",
                outcome.crash_point
            );
            assert!(outcome.u >= 1 && outcome.u <= UNIFORM_SCALE);
        }
    }

    #[test]
    fn test_half_draw_with_two_percent_edge() {
        let crash = compute_crash_point(UNIFORM_SCALE / 2, 200, &GrowthConfig::default()).unwrap();
        assert!((crash - 1.96).abs() < 1e-12);
        assert_eq!(display_crash_point(crash), 1.96);
    }

    #[test]
    fn test_tiny_draw_clamps_to_max() {
        let crash = compute_crash_point(1, 200, &GrowthConfig::default()).unwrap();
        assert_eq!(crash, 50.0);
    }

    #[test]
    fn test_full_draw_approaches_edge_factor() {
        let crash = compute_crash_point(UNIFORM_SCALE, 200, &GrowthConfig::default()).unwrap();
        assert!((crash - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_negative_house_edge_is_configuration_error() {
        assert!(matches!(
            compute_crash_point(UNIFORM_SCALE / 2, -5, &GrowthConfig::default()),
            Err(EngineError::Configuration { .. })
        ));
        assert!(FairnessGenerator::new(-1, GrowthConfig::default()).is_err());
    }

    #[test]
    fn test_uniform_extremes() {
        assert_eq!(hash_to_uniform(&[0u8; 32]), 1);
        assert_eq!(hash_to_uniform(&[0xff; 32]), UNIFORM_SCALE - 1);

        // H = 2^255 -> exactly one half
        let mut half = [0u8; 32];
        half[0] = 0x80;
        assert_eq!(hash_to_uniform(&half), UNIFORM_SCALE / 2);
    }

    #[test]
    fn test_round_trip_verification() {
        let generator = generator();
        let round_id = RoundId::new();
        let outcome = generator.draw(&round_id).unwrap();

        // Third party recomputes from the revealed seed
        let seed = ServerSeed::from_hex(&outcome.seed.to_hex()).unwrap();
        assert_eq!(commit(&seed), outcome.commit_hash);
        assert_eq!(hex::encode(derive_round_hash(&seed, &round_id)), outcome.derived_hash);

        let proof = FairnessProof {
            round_id,
            commit_hash: outcome.commit_hash.clone(),
            server_seed: outcome.seed.to_hex(),
            derived_hash: outcome.derived_hash.clone(),
            u: outcome.u,
            crash_point: outcome.crash_point,
            house_edge_bps: 200,
        };
        let report = generator.verify(&proof);
        assert!(report.valid, "{report:?}");
        assert_eq!(report.recomputed_crash_point, outcome.crash_point);
    }

    #[test]
    fn test_seed_is_bound_to_round() {
        let generator = generator();
        let seed = ServerSeed::from_bytes([7u8; 32]);
        let a = generator.outcome_for(seed.clone(), &RoundId::new()).unwrap();
        let b = generator.outcome_for(seed, &RoundId::new()).unwrap();

        assert_eq!(a.commit_hash, b.commit_hash);
        assert_ne!(a.derived_hash, b.derived_hash);
    }

    #[test]
    fn test_tampered_proof_fails() {
        let generator = generator();
        let round_id = RoundId::new();
        let outcome = generator.draw(&round_id).unwrap();
        let proof = FairnessProof {
            round_id: RoundId::new(),
            commit_hash: outcome.commit_hash,
            server_seed: outcome.seed.to_hex(),
            derived_hash: outcome.derived_hash,
            u: outcome.u,
            crash_point: outcome.crash_point,
            house_edge_bps: 200,
        };

        let report = generator.verify(&proof);
        assert!(report.commit_matches);
        assert!(!report.derived_hash_matches);
        assert!(!report.valid);
    }

    #[test]
    fn test_seed_debug_is_redacted() {
        let seed = ServerSeed::from_bytes([0xab; 32]);
        assert!(!format!("{seed:?}").contains("ab"));
    }
}
