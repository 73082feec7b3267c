// programs/cascade_vault/src/instructions/initialize.rs

use crate::errors::VaultError;
use crate::events::VaultInitialized;
use crate::state::{FeeState, HarvestPolicy, Vault};
use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

#[derive(Accounts)]
pub struct InitializeVault<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + Vault::INIT_SPACE,
        seeds = [Vault::SEED_PREFIX, asset_mint.key().as_ref()],
        bump
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Idle and pending capital
    #[account(
        init,
        payer = authority,
        token::mint = asset_mint,
        token::authority = vault,
        seeds = [Vault::CUSTODY_SEED, vault.key().as_ref()],
        bump
    )]
    pub custody: Box<Account<'info, TokenAccount>>,

    pub asset_mint: Account<'info, Mint>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct InitializeVaultParams {
    pub operator: Pubkey,
    pub fee_recipient: Pubkey,
    pub deposit_limit: Option<u64>,
    pub management_fee_bps: u16,
    pub performance_fee_bps: u16,
    pub harvest_policy: Option<HarvestPolicy>,
    /// Deposits are gated on this attestation being healthy when set
    pub reserve_attestation: Option<Pubkey>,
}

pub fn handler(ctx: Context<InitializeVault>, params: InitializeVaultParams) -> Result<()> {
    let clock = Clock::get()?;

    require!(
        params.management_fee_bps <= Vault::MAX_MANAGEMENT_FEE_BPS,
        VaultError::FeeTooHigh
    );
    require!(
        params.performance_fee_bps <= Vault::MAX_PERFORMANCE_FEE_BPS,
        VaultError::FeeTooHigh
    );
    let harvest_policy = params.harvest_policy.unwrap_or_default();
    harvest_policy.validate()?;
    let deposit_limit = params.deposit_limit.unwrap_or(u64::MAX);

    let vault = &mut ctx.accounts.vault;
    vault.authority = ctx.accounts.authority.key();
    vault.operator = params.operator;
    vault.fee_recipient = params.fee_recipient;
    vault.asset_mint = ctx.accounts.asset_mint.key();
    vault.custody = ctx.accounts.custody.key();
    vault.reserve_attestation = params.reserve_attestation;
    vault.total_shares = 0;
    vault.idle_assets = 0;
    vault.deposit_limit = deposit_limit;
    vault.emergency_shutdown = false;
    vault.strategies = vec![];
    vault.next_harvest_index = 0;
    vault.harvest_policy = harvest_policy;
    vault.fees = FeeState {
        management_fee_bps: params.management_fee_bps,
        performance_fee_bps: params.performance_fee_bps,
        last_fee_collection_time: clock.unix_timestamp,
        accumulated_management_fee: 0,
        accumulated_performance_fee: 0,
    };
    vault.pending_change = None;
    vault.bump = ctx.bumps.vault;

    emit!(VaultInitialized {
        vault: vault.key(),
        authority: vault.authority,
        operator: vault.operator,
        asset_mint: vault.asset_mint,
        deposit_limit,
        timestamp: clock.unix_timestamp,
    });

    msg!(
        "Vault initialized: mgmt fee {} bps, perf fee {} bps",
        params.management_fee_bps,
        params.performance_fee_bps
    );

    Ok(())
}
