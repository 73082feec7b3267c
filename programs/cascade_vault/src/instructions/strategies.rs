// programs/cascade_vault/src/instructions/strategies.rs

use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

use super::funding::{
    fund_sync_allocations, reserve_account, token_balance, transfer, VaultSigner,
};
use super::harvest::emit_report;
use super::ledger::emit_snapshot;
use crate::errors::VaultError;
use crate::events::{
    DepositRequested, PendingInvestmentExecuted, RedeemRequested, StrategyAdded,
    StrategyAllocated, StrategyRemoved,
};
use crate::state::{
    AsyncRequest, AsyncStrategy, StrategyKind, StrategyRecord, StrategyValuation, Vault,
};

#[derive(Accounts)]
#[instruction(strategy_id: u16)]
pub struct AddSyncStrategy<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = authority @ VaultError::Unauthorized,
        has_one = asset_mint @ VaultError::InvalidMint,
    )]
    pub vault: Box<Account<'info, Vault>>,

    /// Liquid strategy capital, owned by the vault
    #[account(
        init,
        payer = authority,
        token::mint = asset_mint,
        token::authority = vault,
        seeds = [StrategyRecord::RESERVE_SEED, vault.key().as_ref(), &strategy_id.to_le_bytes()],
        bump
    )]
    pub reserve: Box<Account<'info, TokenAccount>>,

    pub asset_mint: Account<'info, Mint>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
#[instruction(strategy_id: u16)]
pub struct AddAsyncStrategy<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = authority @ VaultError::Unauthorized,
        has_one = asset_mint @ VaultError::InvalidMint,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(
        init,
        payer = authority,
        space = 8 + AsyncStrategy::INIT_SPACE,
        seeds = [AsyncStrategy::SEED_PREFIX, vault.key().as_ref(), &strategy_id.to_le_bytes()],
        bump
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(
        init,
        payer = authority,
        token::mint = asset_mint,
        token::authority = async_strategy,
        seeds = [AsyncStrategy::CUSTODY_SEED, async_strategy.key().as_ref()],
        bump
    )]
    pub strategy_custody: Box<Account<'info, TokenAccount>>,

    /// The vault's own settlement counters in this strategy
    #[account(
        init,
        payer = authority,
        space = 8 + AsyncRequest::INIT_SPACE,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), vault.key().as_ref()],
        bump
    )]
    pub vault_request: Box<Account<'info, AsyncRequest>>,

    pub asset_mint: Account<'info, Mint>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

/// Shared by remove / allocate.
/// Remaining accounts: the strategy's reserve when it is sync.
#[derive(Accounts)]
pub struct ManageStrategy<'info> {
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
#[instruction(strategy_id: u16)]
pub struct ExecutePendingInvestment<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        constraint = vault.operator == operator.key() @ VaultError::NotOperator,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(mut, address = vault.custody)]
    pub custody: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [AsyncStrategy::SEED_PREFIX, vault.key().as_ref(), &strategy_id.to_le_bytes()],
        bump = async_strategy.bump,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(mut, address = async_strategy.custody)]
    pub strategy_custody: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), vault.key().as_ref()],
        bump = vault_request.bump,
    )]
    pub vault_request: Box<Account<'info, AsyncRequest>>,

    pub operator: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
#[instruction(strategy_id: u16)]
pub struct RequestStrategyRedeem<'info> {
    #[account(
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
        has_one = authority @ VaultError::Unauthorized,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(
        mut,
        seeds = [AsyncStrategy::SEED_PREFIX, vault.key().as_ref(), &strategy_id.to_le_bytes()],
        bump = async_strategy.bump,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(
        mut,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), vault.key().as_ref()],
        bump = vault_request.bump,
    )]
    pub vault_request: Box<Account<'info, AsyncRequest>>,

    pub authority: Signer<'info>,
}

pub fn add_sync_strategy(
    ctx: Context<AddSyncStrategy>,
    strategy_id: u16,
    debt_ratio_bps: u16,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let source = ctx.accounts.reserve.key();

    let vault = &mut ctx.accounts.vault;
    vault.add_strategy(strategy_id, debt_ratio_bps, StrategyKind::Sync, source, now)?;

    emit!(StrategyAdded {
        vault: vault.key(),
        strategy_id,
        kind: StrategyKind::Sync,
        debt_ratio_bps,
        source,
        timestamp: now,
    });

    Ok(())
}

pub fn add_async_strategy(
    ctx: Context<AddAsyncStrategy>,
    strategy_id: u16,
    debt_ratio_bps: u16,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault_key = ctx.accounts.vault.key();
    let source = ctx.accounts.async_strategy.key();

    let vault = &mut ctx.accounts.vault;
    vault.add_strategy(strategy_id, debt_ratio_bps, StrategyKind::Async, source, now)?;

    let strategy = &mut ctx.accounts.async_strategy;
    strategy.vault = vault_key;
    strategy.strategy_id = strategy_id;
    strategy.operator = vault.operator;
    strategy.asset_mint = vault.asset_mint;
    strategy.custody = ctx.accounts.strategy_custody.key();
    strategy.total_shares = 0;
    strategy.idle_assets = 0;
    strategy.off_chain_assets = 0;
    strategy.total_pending_deposits = 0;
    strategy.pending_in_custody = 0;
    strategy.total_pending_redeems = 0;
    strategy.total_claimable_shares = 0;
    strategy.total_claimable_assets = 0;
    strategy.last_nav = 0;
    strategy.last_nav_time = now;
    strategy.nav_report_count = 0;
    strategy.bump = ctx.bumps.async_strategy;

    let request = &mut ctx.accounts.vault_request;
    request.strategy = source;
    request.holder = vault_key;
    request.bump = ctx.bumps.vault_request;

    emit!(StrategyAdded {
        vault: vault_key,
        strategy_id,
        kind: StrategyKind::Async,
        debt_ratio_bps,
        source,
        timestamp: now,
    });

    Ok(())
}

/// Sweep a strategy's capital back to idle and drop it from the registry
pub fn remove_strategy<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageStrategy<'info>>,
    strategy_id: u16,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let vault_key = ctx.accounts.vault.key();
    let kind = ctx
        .accounts
        .vault
        .strategy(strategy_id)
        .ok_or(VaultError::StrategyNotFound)?
        .kind;

    // Sync capital is marked to the reserve balance before it is swept
    let reserve = match kind {
        StrategyKind::Sync => {
            let reserve = reserve_account(&ctx.accounts.vault, strategy_id, ctx.remaining_accounts)?;
            let balance = token_balance(&reserve)?;
            let report = ctx.accounts.vault.report_strategy(
                strategy_id,
                StrategyValuation {
                    value: balance,
                    repaid: 0,
                },
                now,
            )?;
            emit_report(vault_key, &report, now);
            Some((reserve, balance))
        }
        StrategyKind::Async => None,
    };

    let removed = ctx.accounts.vault.remove_strategy(strategy_id)?;

    if let Some((reserve, balance)) = reserve {
        let signer = VaultSigner::new(&ctx.accounts.vault);
        let seeds = signer.seeds();
        transfer(
            &ctx.accounts.token_program,
            reserve,
            ctx.accounts.custody.to_account_info(),
            ctx.accounts.vault.to_account_info(),
            &[&seeds[..]],
            balance,
        )?;
    }

    emit!(StrategyRemoved {
        vault: vault_key,
        strategy_id,
        recovered: removed.total_debt(),
        timestamp: now,
    });
    emit_snapshot(vault_key, &ctx.accounts.vault, now);

    Ok(())
}

pub fn allocate_to_strategy<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageStrategy<'info>>,
    strategy_id: u16,
    amount: u64,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let allocation = ctx
        .accounts
        .vault
        .allocate_to_strategy(strategy_id, amount)?;

    fund_sync_allocations(
        &ctx.accounts.vault,
        ctx.accounts.custody.to_account_info(),
        &ctx.accounts.token_program,
        &[allocation],
        ctx.remaining_accounts,
    )?;

    let vault_key = ctx.accounts.vault.key();
    emit!(StrategyAllocated {
        vault: vault_key,
        strategy_id,
        kind: allocation.kind,
        amount,
        timestamp: now,
    });
    emit_snapshot(vault_key, &ctx.accounts.vault, now);

    Ok(())
}

/// Hand reserved capital to an async strategy as a deposit request from the vault
pub fn execute_pending_investment(
    ctx: Context<ExecutePendingInvestment>,
    strategy_id: u16,
    amount: u64,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;

    accounts.vault.execute_pending_investment(strategy_id, amount)?;
    // Shares from an earlier fulfillment must be claimed before re-requesting
    accounts
        .async_strategy
        .claim_shares(&mut accounts.vault_request, None)?;
    accounts
        .async_strategy
        .request_deposit(&mut accounts.vault_request, amount)?;

    let signer = VaultSigner::new(&accounts.vault);
    let seeds = signer.seeds();
    transfer(
        &accounts.token_program,
        accounts.custody.to_account_info(),
        accounts.strategy_custody.to_account_info(),
        accounts.vault.to_account_info(),
        &[&seeds[..]],
        amount,
    )?;

    let record = accounts
        .vault
        .strategy(strategy_id)
        .ok_or(VaultError::StrategyNotFound)?;
    emit!(PendingInvestmentExecuted {
        vault: accounts.vault.key(),
        strategy_id,
        amount,
        remaining_pending: record.pending,
        deployed: record.deployed,
        timestamp: now,
    });
    emit!(DepositRequested {
        strategy: accounts.async_strategy.key(),
        holder: accounts.vault.key(),
        assets: amount,
        total_pending_deposits: accounts.async_strategy.total_pending_deposits,
        timestamp: now,
    });

    Ok(())
}

/// Queue a redemption of the vault's shares in an async strategy
pub fn request_strategy_redeem(
    ctx: Context<RequestStrategyRedeem>,
    _strategy_id: u16,
    shares: u64,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;

    accounts
        .async_strategy
        .request_redeem(&mut accounts.vault_request, shares)?;

    emit!(RedeemRequested {
        strategy: accounts.async_strategy.key(),
        holder: accounts.vault.key(),
        shares,
        total_pending_redeems: accounts.async_strategy.total_pending_redeems,
        timestamp: now,
    });

    Ok(())
}
