// programs/cascade_vault/src/instructions/ledger.rs

use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};
use cascade_core::ReserveAttestation;

use super::funding::{fund_sync_allocations, pay_out, transfer};
use crate::errors::VaultError;
use crate::events::{Deposit, StrategyAllocated, VaultSnapshot, Withdraw};
use crate::state::{HolderPosition, Vault, WithdrawOutcome};

/// Deposit assets and mint shares to `receiver`.
/// Remaining accounts: reserve token accounts of the sync strategies.
#[derive(Accounts)]
#[instruction(assets: u64, receiver: Pubkey)]
pub struct DepositAssets<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(mut, address = vault.custody)]
    pub custody: Box<Account<'info, TokenAccount>>,

    #[account(
        init_if_needed,
        payer = depositor,
        space = 8 + HolderPosition::INIT_SPACE,
        seeds = [HolderPosition::SEED_PREFIX, vault.key().as_ref(), receiver.as_ref()],
        bump
    )]
    pub position: Box<Account<'info, HolderPosition>>,

    #[account(
        mut,
        constraint = depositor_token.mint == vault.asset_mint @ VaultError::InvalidMint
    )]
    pub depositor_token: Box<Account<'info, TokenAccount>>,

    /// Required when the vault is gated on reserves
    pub reserve_attestation: Option<Account<'info, ReserveAttestation>>,

    #[account(mut)]
    pub depositor: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

/// Burn shares for assets paid to `receiver_token`.
/// Remaining accounts: reserve token accounts of the sync strategies.
#[derive(Accounts)]
pub struct WithdrawAssets<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(mut, address = vault.custody)]
    pub custody: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [HolderPosition::SEED_PREFIX, vault.key().as_ref(), owner.key().as_ref()],
        bump = position.bump,
        has_one = owner @ VaultError::NotPositionOwner,
    )]
    pub position: Box<Account<'info, HolderPosition>>,

    #[account(
        mut,
        constraint = receiver_token.mint == vault.asset_mint @ VaultError::InvalidMint
    )]
    pub receiver_token: Box<Account<'info, TokenAccount>>,

    pub owner: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct TakeSnapshot<'info> {
    #[account(
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Account<'info, Vault>,
}

/// Deposits are refused unless the configured attestation is present and healthy
pub(crate) fn check_reserve_gate(
    vault: &Vault,
    attestation: Option<&Account<ReserveAttestation>>,
    now: i64,
) -> Result<()> {
    let Some(expected) = vault.reserve_attestation else {
        return Ok(());
    };
    let attestation = attestation.ok_or(VaultError::ReservesUnhealthy)?;
    require_keys_eq!(attestation.key(), expected, VaultError::ReservesUnhealthy);
    if !attestation.is_healthy(now) {
        msg!(
            "Reserve ratio {} bps below {} bps or proof stale",
            attestation.reserve_ratio_bps(),
            attestation.min_ratio_bps
        );
        return err!(VaultError::ReservesUnhealthy);
    }
    Ok(())
}

pub(crate) fn emit_snapshot(vault_key: Pubkey, vault: &Vault, timestamp: i64) {
    emit!(VaultSnapshot {
        vault: vault_key,
        total_assets: vault.total_assets(),
        idle_assets: vault.idle_assets,
        pending_assets: vault.total_pending(),
        deployed_assets: vault.total_deployed(),
        total_shares: vault.total_shares,
        price_per_share: vault.price_per_share(),
        timestamp,
    });
}

pub fn deposit<'info>(
    ctx: Context<'_, '_, 'info, 'info, DepositAssets<'info>>,
    assets: u64,
    receiver: Pubkey,
    min_shares_out: u64,
) -> Result<u64> {
    let clock = Clock::get()?;
    let now = clock.unix_timestamp;

    check_reserve_gate(
        &ctx.accounts.vault,
        ctx.accounts.reserve_attestation.as_ref(),
        now,
    )?;

    let position = &mut ctx.accounts.position;
    if position.owner == Pubkey::default() {
        position.vault = ctx.accounts.vault.key();
        position.owner = receiver;
        position.bump = ctx.bumps.position;
    }

    let outcome = ctx
        .accounts
        .vault
        .deposit(position, assets, min_shares_out, now)?;

    transfer(
        &ctx.accounts.token_program,
        ctx.accounts.depositor_token.to_account_info(),
        ctx.accounts.custody.to_account_info(),
        ctx.accounts.depositor.to_account_info(),
        &[],
        assets,
    )?;
    fund_sync_allocations(
        &ctx.accounts.vault,
        ctx.accounts.custody.to_account_info(),
        &ctx.accounts.token_program,
        &outcome.allocations,
        ctx.remaining_accounts,
    )?;

    let vault_key = ctx.accounts.vault.key();
    for allocation in &outcome.allocations {
        emit!(StrategyAllocated {
            vault: vault_key,
            strategy_id: allocation.strategy_id,
            kind: allocation.kind,
            amount: allocation.amount,
            timestamp: now,
        });
    }
    emit!(Deposit {
        vault: vault_key,
        depositor: ctx.accounts.depositor.key(),
        receiver,
        assets,
        shares: outcome.shares,
        timestamp: now,
    });
    emit_snapshot(vault_key, &ctx.accounts.vault, now);

    Ok(outcome.shares)
}

/// Pay out exactly `assets`; returns the shares burned
pub fn withdraw<'info>(
    ctx: Context<'_, '_, 'info, 'info, WithdrawAssets<'info>>,
    assets: u64,
) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let outcome = accounts.vault.withdraw(&mut accounts.position, assets, now)?;
    settle_withdrawal(accounts, ctx.remaining_accounts, &outcome, now)?;
    Ok(outcome.shares)
}

/// Burn exactly `shares`; returns the assets paid
pub fn redeem<'info>(
    ctx: Context<'_, '_, 'info, 'info, WithdrawAssets<'info>>,
    shares: u64,
    min_assets_out: u64,
) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let outcome = accounts
        .vault
        .redeem(&mut accounts.position, shares, min_assets_out, now)?;
    settle_withdrawal(accounts, ctx.remaining_accounts, &outcome, now)?;
    Ok(outcome.assets)
}

fn settle_withdrawal<'info>(
    accounts: &WithdrawAssets<'info>,
    remaining: &[AccountInfo<'info>],
    outcome: &WithdrawOutcome,
    now: i64,
) -> Result<()> {
    pay_out(
        &accounts.vault,
        accounts.custody.to_account_info(),
        accounts.receiver_token.to_account_info(),
        &accounts.token_program,
        &outcome.plan,
        remaining,
    )?;

    let vault_key = accounts.vault.key();
    emit!(Withdraw {
        vault: vault_key,
        owner: accounts.owner.key(),
        receiver: accounts.receiver_token.key(),
        assets: outcome.assets,
        shares: outcome.shares,
        from_idle: outcome.plan.from_idle,
        from_pending: outcome.plan.pending_total(),
        from_strategies: outcome.plan.sync_total(),
        timestamp: now,
    });
    emit_snapshot(vault_key, &accounts.vault, now);

    Ok(())
}

pub fn take_snapshot(ctx: Context<TakeSnapshot>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    emit_snapshot(ctx.accounts.vault.key(), &ctx.accounts.vault, now);
    Ok(())
}
