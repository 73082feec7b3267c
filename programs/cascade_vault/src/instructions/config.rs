// programs/cascade_vault/src/instructions/config.rs
//
// Authority controls: timelocked parameter changes, deposit limit,
// emergency shutdown, forced harvests and fee collection.

use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};

use super::funding::{drain_reserves, transfer, VaultSigner};
use super::ledger::emit_snapshot;
use crate::errors::VaultError;
use crate::events::{
    ConfigChangeApplied, ConfigChangeCancelled, ConfigChangeScheduled, DepositLimitUpdated,
    EmergencyShutdownUpdated, EmergencyWithdrawal, FeesClaimed,
};
use crate::state::{ConfigChange, Vault};

#[derive(Accounts)]
pub struct VaultAdmin<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = authority @ VaultError::Unauthorized,
    )]
    pub vault: Box<Account<'info, Vault>>,

    pub authority: Signer<'info>,
}

/// Applying a change that has cleared its timelock is permissionless
#[derive(Accounts)]
pub struct ApplyConfigChange<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Box<Account<'info, Vault>>,
}

/// Remaining accounts: reserve token accounts of the sync strategies
#[derive(Accounts)]
pub struct EmergencyWithdrawAll<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = authority @ VaultError::Unauthorized,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(mut, address = vault.custody)]
    pub custody: Box<Account<'info, TokenAccount>>,

    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct ClaimFees<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = fee_recipient @ VaultError::Unauthorized,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(mut, address = vault.custody)]
    pub custody: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        constraint = recipient_token.mint == vault.asset_mint @ VaultError::InvalidMint
    )]
    pub recipient_token: Box<Account<'info, TokenAccount>>,

    pub fee_recipient: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

// ==================== TIMELOCK ====================

pub fn schedule_config_change(ctx: Context<VaultAdmin>, change: ConfigChange) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault = &mut ctx.accounts.vault;
    let eta = vault.schedule_config_change(change, now)?;

    emit!(ConfigChangeScheduled {
        vault: vault.key(),
        change,
        eta,
        timestamp: now,
    });
    msg!("Config change scheduled, eta {}", eta);

    Ok(())
}

pub fn set_management_fee(ctx: Context<VaultAdmin>, bps: u16) -> Result<()> {
    schedule_config_change(ctx, ConfigChange::ManagementFee { bps })
}

pub fn set_performance_fee(ctx: Context<VaultAdmin>, bps: u16) -> Result<()> {
    schedule_config_change(ctx, ConfigChange::PerformanceFee { bps })
}

pub fn apply_config_change(ctx: Context<ApplyConfigChange>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault = &mut ctx.accounts.vault;
    let change = vault.apply_config_change(now)?;

    emit!(ConfigChangeApplied {
        vault: vault.key(),
        change,
        timestamp: now,
    });

    Ok(())
}

pub fn cancel_config_change(ctx: Context<VaultAdmin>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault = &mut ctx.accounts.vault;
    let change = vault.cancel_config_change()?;

    emit!(ConfigChangeCancelled {
        vault: vault.key(),
        change,
        timestamp: now,
    });

    Ok(())
}

// ==================== IMMEDIATE CONTROLS ====================

pub fn set_deposit_limit(ctx: Context<VaultAdmin>, limit: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault = &mut ctx.accounts.vault;
    let old_limit = vault.set_deposit_limit(limit);

    emit!(DepositLimitUpdated {
        vault: vault.key(),
        old_limit,
        new_limit: limit,
        timestamp: now,
    });

    Ok(())
}

pub fn set_emergency_shutdown(ctx: Context<VaultAdmin>, active: bool) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault = &mut ctx.accounts.vault;
    vault.set_emergency_shutdown(active);

    emit!(EmergencyShutdownUpdated {
        vault: vault.key(),
        active,
        timestamp: now,
    });
    if active {
        msg!("Emergency shutdown: deposits halted");
    }

    Ok(())
}

/// Flag a strategy so the next `harvest_next` reaching it reports regardless of timing
pub fn force_harvest(ctx: Context<VaultAdmin>, strategy_id: u16) -> Result<()> {
    ctx.accounts.vault.set_force_harvest(strategy_id)
}

/// Release every pending reservation and sweep sync reserves back to custody.
/// Shutdown stays on until the authority clears it.
pub fn emergency_withdraw_all<'info>(
    ctx: Context<'_, '_, 'info, 'info, EmergencyWithdrawAll<'info>>,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let plan = ctx.accounts.vault.emergency_recall(now)?;

    drain_reserves(
        &ctx.accounts.vault,
        ctx.accounts.custody.to_account_info(),
        &ctx.accounts.token_program,
        &plan.from_sync,
        ctx.remaining_accounts,
    )?;

    let vault_key = ctx.accounts.vault.key();
    emit!(EmergencyShutdownUpdated {
        vault: vault_key,
        active: true,
        timestamp: now,
    });
    emit!(EmergencyWithdrawal {
        vault: vault_key,
        released_pending: plan.pending_total(),
        recalled_from_strategies: plan.sync_total(),
        idle_assets: ctx.accounts.vault.idle_assets,
        timestamp: now,
    });
    emit_snapshot(vault_key, &ctx.accounts.vault, now);

    Ok(())
}

// ==================== FEES ====================

pub fn claim_fees(ctx: Context<ClaimFees>) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let claim = ctx.accounts.vault.claim_fees(now)?;

    let signer = VaultSigner::new(&ctx.accounts.vault);
    let seeds = signer.seeds();
    transfer(
        &ctx.accounts.token_program,
        ctx.accounts.custody.to_account_info(),
        ctx.accounts.recipient_token.to_account_info(),
        ctx.accounts.vault.to_account_info(),
        &[&seeds[..]],
        claim.total(),
    )?;

    let vault_key = ctx.accounts.vault.key();
    emit!(FeesClaimed {
        vault: vault_key,
        fee_recipient: ctx.accounts.fee_recipient.key(),
        management_fee: claim.management_fee,
        performance_fee: claim.performance_fee,
        timestamp: now,
    });
    emit_snapshot(vault_key, &ctx.accounts.vault, now);

    Ok(claim.total())
}
