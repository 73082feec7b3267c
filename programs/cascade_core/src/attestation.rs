// programs/cascade_core/src/attestation.rs
//
// Reserve attestation interface. An external attestor verifies off-chain
// collateral and posts proofs here; vaults read the account and gate
// deposits on `is_healthy`.

use anchor_lang::prelude::*;

use crate::constants::BPS_DENOMINATOR;

/// A single proof-of-reserve observation
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct ReserveProof {
    pub timestamp: i64,
    pub total_reserves: u64,
    pub total_liabilities: u64,
    pub verified: bool,
}

impl ReserveProof {
    /// reserves / liabilities in basis points. No liabilities is fully covered.
    pub fn reserve_ratio_bps(&self) -> u64 {
        if self.total_liabilities == 0 {
            return u64::MAX;
        }
        let ratio = (self.total_reserves as u128) * (BPS_DENOMINATOR as u128)
            / (self.total_liabilities as u128);
        ratio.min(u64::MAX as u128) as u64
    }
}

/// Attestation log written by the attestor
/// PDA seeds: ["reserve_attestation", attestor]
#[account]
#[derive(InitSpace)]
pub struct ReserveAttestation {
    /// Authority that can reconfigure thresholds
    pub authority: Pubkey,

    /// Only key allowed to post proofs
    pub attestor: Pubkey,

    /// Minimum reserves/liabilities ratio considered healthy
    pub min_ratio_bps: u16,

    /// Proofs older than this are stale
    pub max_staleness: i64,

    /// Proofs posted all-time
    pub proof_count: u64,

    /// Most recent proof
    pub latest: ReserveProof,

    /// Ring buffer of recent proofs, oldest overwritten first
    #[max_len(16)]
    pub history: Vec<ReserveProof>,

    pub bump: u8,
}

impl ReserveAttestation {
    pub const SEED_PREFIX: &'static [u8] = b"reserve_attestation";
    pub const HISTORY_LEN: usize = 16;
    pub const DEFAULT_MIN_RATIO_BPS: u16 = 10_000; // 100%
    pub const DEFAULT_MAX_STALENESS: i64 = 24 * 60 * 60; // 1 day

    pub fn latest_proof(&self) -> ReserveProof {
        self.latest
    }

    pub fn proof_count(&self) -> u64 {
        self.proof_count
    }

    pub fn reserve_ratio_bps(&self) -> u64 {
        self.latest.reserve_ratio_bps()
    }

    /// Healthy = latest proof verified, fresh, and at or above the minimum ratio
    pub fn is_healthy(&self, now: i64) -> bool {
        if self.proof_count == 0 || !self.latest.verified {
            return false;
        }
        if now.saturating_sub(self.latest.timestamp) > self.max_staleness {
            return false;
        }
        self.latest.reserve_ratio_bps() >= self.min_ratio_bps as u64
    }

    pub fn record(&mut self, proof: ReserveProof) {
        let slot = (self.proof_count % Self::HISTORY_LEN as u64) as usize;
        if self.history.len() < Self::HISTORY_LEN {
            self.history.push(proof);
        } else {
            self.history[slot] = proof;
        }
        self.latest = proof;
        self.proof_count = self.proof_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_attestation() -> ReserveAttestation {
        ReserveAttestation {
            authority: Pubkey::default(),
            attestor: Pubkey::default(),
            min_ratio_bps: ReserveAttestation::DEFAULT_MIN_RATIO_BPS,
            max_staleness: ReserveAttestation::DEFAULT_MAX_STALENESS,
            proof_count: 0,
            latest: ReserveProof::default(),
            history: vec![],
            bump: 255,
        }
    }

    fn proof(timestamp: i64, reserves: u64, liabilities: u64) -> ReserveProof {
        ReserveProof {
            timestamp,
            total_reserves: reserves,
            total_liabilities: liabilities,
            verified: true,
        }
    }

    #[test]
    fn test_no_proofs_is_unhealthy() {
        assert!(!test_attestation().is_healthy(0));
    }

    #[test]
    fn test_healthy_fully_collateralized() {
        let mut att = test_attestation();
        att.record(proof(1_000, 1_050, 1_000));
        assert!(att.is_healthy(1_000));
        assert_eq!(att.reserve_ratio_bps(), 10_500);
        assert_eq!(att.proof_count(), 1);
    }

    #[test]
    fn test_undercollateralized_is_unhealthy() {
        let mut att = test_attestation();
        att.record(proof(1_000, 990, 1_000));
        assert!(!att.is_healthy(1_000));
    }

    #[test]
    fn test_stale_proof_is_unhealthy() {
        let mut att = test_attestation();
        att.record(proof(1_000, 2_000, 1_000));
        assert!(att.is_healthy(1_000 + ReserveAttestation::DEFAULT_MAX_STALENESS));
        assert!(!att.is_healthy(1_001 + ReserveAttestation::DEFAULT_MAX_STALENESS));
    }

    #[test]
    fn test_unverified_proof_is_unhealthy() {
        let mut att = test_attestation();
        let mut p = proof(1_000, 2_000, 1_000);
        p.verified = false;
        att.record(p);
        assert!(!att.is_healthy(1_000));
    }

    #[test]
    fn test_zero_liabilities_ratio() {
        assert_eq!(proof(0, 0, 0).reserve_ratio_bps(), u64::MAX);
    }

    #[test]
    fn test_history_wraps() {
        let mut att = test_attestation();
        for i in 0..(ReserveAttestation::HISTORY_LEN as i64 + 3) {
            att.record(proof(i, 1, 1));
        }
        assert_eq!(att.history.len(), ReserveAttestation::HISTORY_LEN);
        assert_eq!(att.proof_count(), ReserveAttestation::HISTORY_LEN as u64 + 3);
        // Slot 2 was overwritten by the 19th proof (timestamp 18)
        assert_eq!(att.history[2].timestamp, 18);
        assert_eq!(att.latest_proof().timestamp, 18);
    }
}
