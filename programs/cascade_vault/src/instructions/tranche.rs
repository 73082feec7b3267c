// programs/cascade_vault/src/instructions/tranche.rs
//
// Senior/junior pool. The pool holds one vault position and issues a claim
// token per tranche; deposits and withdrawals go through the vault ledger.

use anchor_lang::prelude::*;
use anchor_spl::token::{self, Burn, Mint, MintTo, Token, TokenAccount};
use cascade_core::constants::BPS_DENOMINATOR;
use cascade_core::ReserveAttestation;

use super::funding::{fund_sync_allocations, pay_out, transfer};
use super::ledger::{check_reserve_gate, emit_snapshot};
use crate::errors::VaultError;
use crate::events::{TrancheDeposit, TranchePoolInitialized, TrancheWithdrawal, WaterfallExecuted};
use crate::state::{HolderPosition, Tranche, TranchePool, Vault, WaterfallOutcome};

#[derive(Accounts)]
pub struct InitializeTranchePool<'info> {
    #[account(
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = authority @ VaultError::Unauthorized,
        has_one = asset_mint @ VaultError::InvalidMint,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(
        init,
        payer = authority,
        space = 8 + TranchePool::INIT_SPACE,
        seeds = [TranchePool::SEED_PREFIX, vault.key().as_ref()],
        bump
    )]
    pub tranche_pool: Box<Account<'info, TranchePool>>,

    #[account(
        init,
        payer = authority,
        mint::decimals = asset_mint.decimals,
        mint::authority = tranche_pool,
        seeds = [TranchePool::SENIOR_MINT_SEED, tranche_pool.key().as_ref()],
        bump
    )]
    pub senior_mint: Box<Account<'info, Mint>>,

    #[account(
        init,
        payer = authority,
        mint::decimals = asset_mint.decimals,
        mint::authority = tranche_pool,
        seeds = [TranchePool::JUNIOR_MINT_SEED, tranche_pool.key().as_ref()],
        bump
    )]
    pub junior_mint: Box<Account<'info, Mint>>,

    /// Vault shares held on behalf of both tranches
    #[account(
        init,
        payer = authority,
        space = 8 + HolderPosition::INIT_SPACE,
        seeds = [HolderPosition::SEED_PREFIX, vault.key().as_ref(), tranche_pool.key().as_ref()],
        bump
    )]
    pub pool_position: Box<Account<'info, HolderPosition>>,

    pub asset_mint: Box<Account<'info, Mint>>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

/// Shared by both tranches; the handler checks `claim_mint` against the tranche.
/// Remaining accounts: reserve token accounts of the sync strategies
#[derive(Accounts)]
pub struct DepositTranche<'info> {
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
        seeds = [TranchePool::SEED_PREFIX, vault.key().as_ref()],
        bump = tranche_pool.bump,
        has_one = vault,
    )]
    pub tranche_pool: Box<Account<'info, TranchePool>>,

    #[account(
        mut,
        seeds = [HolderPosition::SEED_PREFIX, vault.key().as_ref(), tranche_pool.key().as_ref()],
        bump = pool_position.bump,
    )]
    pub pool_position: Box<Account<'info, HolderPosition>>,

    #[account(mut)]
    pub claim_mint: Box<Account<'info, Mint>>,

    /// Receives the claim tokens
    #[account(mut, token::mint = claim_mint)]
    pub receiver_claim: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        constraint = depositor_token.mint == vault.asset_mint @ VaultError::InvalidMint
    )]
    pub depositor_token: Box<Account<'info, TokenAccount>>,

    pub reserve_attestation: Option<Account<'info, ReserveAttestation>>,

    pub depositor: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

/// Remaining accounts: reserve token accounts of the sync strategies
#[derive(Accounts)]
#[instruction(tranche: Tranche)]
pub struct WithdrawTranche<'info> {
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
        seeds = [TranchePool::SEED_PREFIX, vault.key().as_ref()],
        bump = tranche_pool.bump,
        has_one = vault,
    )]
    pub tranche_pool: Box<Account<'info, TranchePool>>,

    #[account(
        mut,
        seeds = [HolderPosition::SEED_PREFIX, vault.key().as_ref(), tranche_pool.key().as_ref()],
        bump = pool_position.bump,
    )]
    pub pool_position: Box<Account<'info, HolderPosition>>,

    #[account(mut, address = tranche_pool.claim_mint(tranche) @ VaultError::InvalidMint)]
    pub claim_mint: Box<Account<'info, Mint>>,

    #[account(mut, token::mint = claim_mint, token::authority = owner)]
    pub owner_claim: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        constraint = receiver_token.mint == vault.asset_mint @ VaultError::InvalidMint
    )]
    pub receiver_token: Box<Account<'info, TokenAccount>>,

    pub owner: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct ExecuteWaterfall<'info> {
    #[account(
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(
        mut,
        seeds = [TranchePool::SEED_PREFIX, vault.key().as_ref()],
        bump = tranche_pool.bump,
        has_one = vault,
    )]
    pub tranche_pool: Box<Account<'info, TranchePool>>,

    #[account(
        seeds = [HolderPosition::SEED_PREFIX, vault.key().as_ref(), tranche_pool.key().as_ref()],
        bump = pool_position.bump,
    )]
    pub pool_position: Box<Account<'info, HolderPosition>>,
}

pub fn initialize_tranche_pool(
    ctx: Context<InitializeTranchePool>,
    senior_target_apr_bps: u16,
) -> Result<()> {
    require!(
        senior_target_apr_bps as u64 <= BPS_DENOMINATOR,
        VaultError::InvalidBasisPoints
    );
    let now = Clock::get()?.unix_timestamp;
    let vault_key = ctx.accounts.vault.key();
    let pool_key = ctx.accounts.tranche_pool.key();

    let pool = &mut ctx.accounts.tranche_pool;
    pool.vault = vault_key;
    pool.authority = ctx.accounts.authority.key();
    pool.senior_mint = ctx.accounts.senior_mint.key();
    pool.junior_mint = ctx.accounts.junior_mint.key();
    pool.senior_deposits = 0;
    pool.junior_deposits = 0;
    pool.senior_total_assets = 0;
    pool.junior_total_assets = 0;
    pool.senior_target_apr_bps = senior_target_apr_bps;
    pool.last_waterfall_time = now;
    pool.waterfall_count = 0;
    pool.bump = ctx.bumps.tranche_pool;

    let position = &mut ctx.accounts.pool_position;
    position.vault = vault_key;
    position.owner = pool_key;
    position.shares = 0;
    position.bump = ctx.bumps.pool_position;

    emit!(TranchePoolInitialized {
        pool: pool_key,
        vault: vault_key,
        senior_mint: pool.senior_mint,
        junior_mint: pool.junior_mint,
        senior_target_apr_bps,
        timestamp: now,
    });

    Ok(())
}

fn emit_waterfall(pool: Pubkey, pool_value: u64, outcome: &WaterfallOutcome, timestamp: i64) {
    emit!(WaterfallExecuted {
        pool,
        elapsed: outcome.elapsed,
        pool_value,
        gain: outcome.gain,
        loss: outcome.loss,
        senior_priority_return: outcome.senior_priority_return,
        senior_before: outcome.senior_before,
        junior_before: outcome.junior_before,
        senior_after: outcome.senior_after,
        junior_after: outcome.junior_after,
        timestamp,
    });
}

/// Route `amount` through the vault for `tranche`; returns claim tokens minted
pub fn deposit_tranche<'info>(
    ctx: Context<'_, '_, 'info, 'info, DepositTranche<'info>>,
    tranche: Tranche,
    amount: u64,
) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    require_keys_eq!(
        ctx.accounts.claim_mint.key(),
        ctx.accounts.tranche_pool.claim_mint(tranche),
        VaultError::InvalidMint
    );
    check_reserve_gate(
        &ctx.accounts.vault,
        ctx.accounts.reserve_attestation.as_ref(),
        now,
    )?;

    let accounts = &mut *ctx.accounts;
    let pool_key = accounts.tranche_pool.key();
    let (pool_value, waterfall) = accounts.tranche_pool.mark_to_vault(
        &accounts.vault,
        &accounts.pool_position,
        now,
    )?;
    emit_waterfall(pool_key, pool_value, &waterfall, now);

    let outcome = accounts
        .vault
        .deposit(&mut accounts.pool_position, amount, 0, now)?;
    let tokens = accounts.tranche_pool.record_deposit(tranche, amount)?;

    transfer(
        &accounts.token_program,
        accounts.depositor_token.to_account_info(),
        accounts.custody.to_account_info(),
        accounts.depositor.to_account_info(),
        &[],
        amount,
    )?;
    fund_sync_allocations(
        &accounts.vault,
        accounts.custody.to_account_info(),
        &accounts.token_program,
        &outcome.allocations,
        ctx.remaining_accounts,
    )?;

    let vault_key = accounts.vault.key();
    let pool_bump = [accounts.tranche_pool.bump];
    let pool_seeds: [&[u8]; 3] = [TranchePool::SEED_PREFIX, vault_key.as_ref(), &pool_bump];
    token::mint_to(
        CpiContext::new_with_signer(
            accounts.token_program.to_account_info(),
            MintTo {
                mint: accounts.claim_mint.to_account_info(),
                to: accounts.receiver_claim.to_account_info(),
                authority: accounts.tranche_pool.to_account_info(),
            },
            &[&pool_seeds[..]],
        ),
        tokens,
    )?;

    emit!(TrancheDeposit {
        pool: pool_key,
        tranche,
        depositor: accounts.depositor.key(),
        amount,
        tokens_minted: tokens,
        vault_shares: outcome.shares,
        timestamp: now,
    });
    emit_snapshot(vault_key, &accounts.vault, now);

    Ok(tokens)
}

/// Burn claim tokens for their pro-rata share of the tranche; returns assets paid
pub fn withdraw_tranche<'info>(
    ctx: Context<'_, '_, 'info, 'info, WithdrawTranche<'info>>,
    tranche: Tranche,
    tokens: u64,
) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let pool_key = accounts.tranche_pool.key();
    let (pool_value, waterfall) = accounts.tranche_pool.mark_to_vault(
        &accounts.vault,
        &accounts.pool_position,
        now,
    )?;
    emit_waterfall(pool_key, pool_value, &waterfall, now);

    let assets = accounts.tranche_pool.redemption_value(tranche, tokens)?;
    let outcome = accounts
        .vault
        .withdraw(&mut accounts.pool_position, assets, now)?;
    accounts
        .tranche_pool
        .record_withdrawal(tranche, tokens, assets)?;

    token::burn(
        CpiContext::new(
            accounts.token_program.to_account_info(),
            Burn {
                mint: accounts.claim_mint.to_account_info(),
                from: accounts.owner_claim.to_account_info(),
                authority: accounts.owner.to_account_info(),
            },
        ),
        tokens,
    )?;
    pay_out(
        &accounts.vault,
        accounts.custody.to_account_info(),
        accounts.receiver_token.to_account_info(),
        &accounts.token_program,
        &outcome.plan,
        ctx.remaining_accounts,
    )?;

    emit!(TrancheWithdrawal {
        pool: pool_key,
        tranche,
        owner: accounts.owner.key(),
        tokens_burned: tokens,
        assets,
        vault_shares: outcome.shares,
        timestamp: now,
    });
    emit_snapshot(accounts.vault.key(), &accounts.vault, now);

    Ok(assets)
}

/// Mark the pool position to the vault and split the change between tranches
pub fn execute_waterfall(ctx: Context<ExecuteWaterfall>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let pool_key = ctx.accounts.tranche_pool.key();
    let (pool_value, outcome) = ctx.accounts.tranche_pool.mark_to_vault(
        &ctx.accounts.vault,
        &ctx.accounts.pool_position,
        now,
    )?;

    emit_waterfall(pool_key, pool_value, &outcome, now);
    msg!(
        "Waterfall: senior {} -> {}, junior {} -> {}",
        outcome.senior_before,
        outcome.senior_after,
        outcome.junior_before,
        outcome.junior_after
    );

    Ok(())
}
