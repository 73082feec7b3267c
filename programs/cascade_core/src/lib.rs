// programs/cascade_core/src/lib.rs
//
// Cascade Core - Shared Constants, Math and Reserve Attestation
// =============================================================
//
// This module provides:
// - Basis-point and time constants shared by every Cascade program
// - u128 mul-div helpers with explicit rounding direction
// - The reserve attestation account written by an external attestor

use anchor_lang::prelude::*;

declare_id!("CSCc1kQm4uGvE8yq9Pz2rW7f3TnJ5aXhLd6Bs2VgYoRe");

// =============================================================================
// SUBMODULES
// =============================================================================

pub mod attestation;
pub mod math;

pub use attestation::{ReserveAttestation, ReserveProof};
pub use math::{bps_of, mul_div, prorate_annual_bps, Rounding};

// =============================================================================
// PROTOCOL CONSTANTS
// =============================================================================

pub mod constants {
    /// 10_000 bps = 100%
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// 365-day year, used for management fees and senior APR accrual
    pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

    /// Minimum gap between scheduling and applying a privileged config change
    pub const CONFIG_TIMELOCK_SECONDS: i64 = 24 * 60 * 60;

    /// Price-per-share scale (1.0 == 1_000_000_000)
    pub const PPS_SCALE: u64 = 1_000_000_000;
}

// =============================================================================
// ERRORS
// =============================================================================

#[error_code]
pub enum CoreError {
    #[msg("Unauthorized")]
    Unauthorized,

    #[msg("Invalid basis points value (must be <= 10000)")]
    InvalidBasisPoints,

    #[msg("Staleness window must be positive")]
    InvalidStaleness,
}

// =============================================================================
// EVENTS
// =============================================================================

#[event]
pub struct AttestationInitialized {
    pub attestation: Pubkey,
    pub attestor: Pubkey,
    pub min_ratio_bps: u16,
    pub max_staleness: i64,
    pub timestamp: i64,
}

#[event]
pub struct ReserveProofPosted {
    pub attestation: Pubkey,
    pub total_reserves: u64,
    pub total_liabilities: u64,
    pub reserve_ratio_bps: u64,
    pub verified: bool,
    pub proof_count: u64,
    pub timestamp: i64,
}

// =============================================================================
// PROGRAM ENTRYPOINT (minimal - mostly a library)
// =============================================================================

#[program]
pub mod cascade_core {
    use super::*;

    /// Create the attestation log for an attestor
    pub fn initialize_attestation(
        ctx: Context<InitializeAttestation>,
        params: InitializeAttestationParams,
    ) -> Result<()> {
        let clock = Clock::get()?;
        let min_ratio_bps = params
            .min_ratio_bps
            .unwrap_or(ReserveAttestation::DEFAULT_MIN_RATIO_BPS);
        let max_staleness = params
            .max_staleness
            .unwrap_or(ReserveAttestation::DEFAULT_MAX_STALENESS);
        require!(max_staleness > 0, CoreError::InvalidStaleness);

        let attestation = &mut ctx.accounts.attestation;
        attestation.authority = ctx.accounts.authority.key();
        attestation.attestor = params.attestor;
        attestation.min_ratio_bps = min_ratio_bps;
        attestation.max_staleness = max_staleness;
        attestation.proof_count = 0;
        attestation.latest = ReserveProof::default();
        attestation.history = vec![];
        attestation.bump = ctx.bumps.attestation;

        emit!(AttestationInitialized {
            attestation: attestation.key(),
            attestor: params.attestor,
            min_ratio_bps,
            max_staleness,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    /// Append a proof to the log (attestor only)
    pub fn post_reserve_proof(
        ctx: Context<PostReserveProof>,
        total_reserves: u64,
        total_liabilities: u64,
        verified: bool,
    ) -> Result<()> {
        let clock = Clock::get()?;
        let proof = ReserveProof {
            timestamp: clock.unix_timestamp,
            total_reserves,
            total_liabilities,
            verified,
        };

        let attestation = &mut ctx.accounts.attestation;
        attestation.record(proof);

        emit!(ReserveProofPosted {
            attestation: attestation.key(),
            total_reserves,
            total_liabilities,
            reserve_ratio_bps: proof.reserve_ratio_bps(),
            verified,
            proof_count: attestation.proof_count,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }
}

// =============================================================================
// INSTRUCTION ACCOUNTS
// =============================================================================

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct InitializeAttestationParams {
    pub attestor: Pubkey,
    pub min_ratio_bps: Option<u16>,
    pub max_staleness: Option<i64>,
}

#[derive(Accounts)]
#[instruction(params: InitializeAttestationParams)]
pub struct InitializeAttestation<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + ReserveAttestation::INIT_SPACE,
        seeds = [ReserveAttestation::SEED_PREFIX, params.attestor.as_ref()],
        bump
    )]
    pub attestation: Account<'info, ReserveAttestation>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct PostReserveProof<'info> {
    #[account(
        mut,
        seeds = [ReserveAttestation::SEED_PREFIX, attestor.key().as_ref()],
        bump = attestation.bump,
        has_one = attestor @ CoreError::Unauthorized
    )]
    pub attestation: Account<'info, ReserveAttestation>,

    pub attestor: Signer<'info>,
}
