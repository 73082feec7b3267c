// programs/cascade_vault/src/instructions/settlement.rs
//
// Holder and operator entry points of an asynchronous strategy.

use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};

use super::funding::{transfer, StrategySigner};
use crate::errors::VaultError;
use crate::events::{
    AssetsReturned, AssetsWithdrawnToOperator, AsyncAssetsClaimed, AsyncSharesClaimed,
    DepositFulfilled, DepositRequested, NavReported, RedeemFulfilled, RedeemRequested,
    YieldInjected,
};
use crate::state::{AsyncRequest, AsyncStrategy};

#[derive(Accounts)]
pub struct RequestAsyncDeposit<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(mut, address = async_strategy.custody)]
    pub strategy_custody: Box<Account<'info, TokenAccount>>,

    #[account(
        init_if_needed,
        payer = holder,
        space = 8 + AsyncRequest::INIT_SPACE,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), holder.key().as_ref()],
        bump
    )]
    pub request: Box<Account<'info, AsyncRequest>>,

    #[account(
        mut,
        constraint = holder_token.mint == async_strategy.asset_mint @ VaultError::InvalidMint
    )]
    pub holder_token: Box<Account<'info, TokenAccount>>,

    #[account(mut)]
    pub holder: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct RequestAsyncRedeem<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(
        mut,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), holder.key().as_ref()],
        bump = request.bump,
        has_one = holder @ VaultError::NotPositionOwner,
    )]
    pub request: Box<Account<'info, AsyncRequest>>,

    pub holder: Signer<'info>,
}

/// Token movement between strategy custody and the operator
#[derive(Accounts)]
pub struct OperatorTransfer<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
        has_one = operator @ VaultError::NotOperator,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(mut, address = async_strategy.custody)]
    pub strategy_custody: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        constraint = operator_token.mint == async_strategy.asset_mint @ VaultError::InvalidMint
    )]
    pub operator_token: Box<Account<'info, TokenAccount>>,

    pub operator: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct ReportNav<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
        has_one = operator @ VaultError::NotOperator,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(address = async_strategy.custody)]
    pub strategy_custody: Box<Account<'info, TokenAccount>>,

    pub operator: Signer<'info>,
}

#[derive(Accounts)]
#[instruction(holder: Pubkey)]
pub struct FulfillRequest<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
        has_one = operator @ VaultError::NotOperator,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(
        mut,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), holder.as_ref()],
        bump = request.bump,
    )]
    pub request: Box<Account<'info, AsyncRequest>>,

    pub operator: Signer<'info>,
}

#[derive(Accounts)]
pub struct ClaimAsyncShares<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(
        mut,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), holder.key().as_ref()],
        bump = request.bump,
        has_one = holder @ VaultError::NotPositionOwner,
    )]
    pub request: Box<Account<'info, AsyncRequest>>,

    /// Another holder's request in the same strategy; shares go to the holder when absent
    #[account(
        mut,
        constraint = receiver_request.strategy == async_strategy.key()
            @ VaultError::InvalidStrategyAccount,
        constraint = receiver_request.key() != request.key()
            @ VaultError::InvalidStrategyAccount,
    )]
    pub receiver_request: Option<Box<Account<'info, AsyncRequest>>>,

    pub holder: Signer<'info>,
}

#[derive(Accounts)]
pub struct ClaimAsyncAssets<'info> {
    #[account(
        mut,
        seeds = [
            AsyncStrategy::SEED_PREFIX,
            async_strategy.vault.as_ref(),
            &async_strategy.strategy_id.to_le_bytes(),
        ],
        bump = async_strategy.bump,
    )]
    pub async_strategy: Box<Account<'info, AsyncStrategy>>,

    #[account(mut, address = async_strategy.custody)]
    pub strategy_custody: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [AsyncRequest::SEED_PREFIX, async_strategy.key().as_ref(), holder.key().as_ref()],
        bump = request.bump,
        has_one = holder @ VaultError::NotPositionOwner,
    )]
    pub request: Box<Account<'info, AsyncRequest>>,

    #[account(
        mut,
        constraint = receiver_token.mint == async_strategy.asset_mint @ VaultError::InvalidMint
    )]
    pub receiver_token: Box<Account<'info, TokenAccount>>,

    pub holder: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

// ==================== HOLDER ====================

pub fn request_deposit(ctx: Context<RequestAsyncDeposit>, assets: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let strategy_key = ctx.accounts.async_strategy.key();
    let holder = ctx.accounts.holder.key();

    let request = &mut ctx.accounts.request;
    if request.holder == Pubkey::default() {
        request.strategy = strategy_key;
        request.holder = holder;
        request.bump = ctx.bumps.request;
    }
    ctx.accounts
        .async_strategy
        .request_deposit(&mut ctx.accounts.request, assets)?;

    transfer(
        &ctx.accounts.token_program,
        ctx.accounts.holder_token.to_account_info(),
        ctx.accounts.strategy_custody.to_account_info(),
        ctx.accounts.holder.to_account_info(),
        &[],
        assets,
    )?;

    emit!(DepositRequested {
        strategy: strategy_key,
        holder,
        assets,
        total_pending_deposits: ctx.accounts.async_strategy.total_pending_deposits,
        timestamp: now,
    });

    Ok(())
}

pub fn request_redeem(ctx: Context<RequestAsyncRedeem>, shares: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    accounts
        .async_strategy
        .request_redeem(&mut accounts.request, shares)?;

    emit!(RedeemRequested {
        strategy: accounts.async_strategy.key(),
        holder: accounts.holder.key(),
        shares,
        total_pending_redeems: accounts.async_strategy.total_pending_redeems,
        timestamp: now,
    });

    Ok(())
}

pub fn claim_shares(ctx: Context<ClaimAsyncShares>) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let receiver = accounts
        .receiver_request
        .as_ref()
        .map_or(accounts.holder.key(), |r| r.holder);

    let shares = accounts.async_strategy.claim_shares(
        &mut accounts.request,
        accounts.receiver_request.as_deref_mut().map(|r| &mut **r),
    )?;

    if shares > 0 {
        emit!(AsyncSharesClaimed {
            strategy: accounts.async_strategy.key(),
            holder: accounts.holder.key(),
            receiver,
            shares,
            timestamp: now,
        });
    }

    Ok(shares)
}

pub fn claim_assets(ctx: Context<ClaimAsyncAssets>) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let assets = accounts.async_strategy.claim_assets(&mut accounts.request)?;

    let signer = StrategySigner::new(&accounts.async_strategy);
    let seeds = signer.seeds();
    transfer(
        &accounts.token_program,
        accounts.strategy_custody.to_account_info(),
        accounts.receiver_token.to_account_info(),
        accounts.async_strategy.to_account_info(),
        &[&seeds[..]],
        assets,
    )?;

    if assets > 0 {
        emit!(AsyncAssetsClaimed {
            strategy: accounts.async_strategy.key(),
            holder: accounts.holder.key(),
            receiver: accounts.receiver_token.key(),
            assets,
            timestamp: now,
        });
    }

    Ok(assets)
}

// ==================== OPERATOR ====================

/// Move capital off-chain, pending deposits first; returns the amount moved
pub fn withdraw_to_operator(ctx: Context<OperatorTransfer>, amount: u64) -> Result<u64> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let moved = accounts.async_strategy.withdraw_to_operator(amount)?;

    let signer = StrategySigner::new(&accounts.async_strategy);
    let seeds = signer.seeds();
    transfer(
        &accounts.token_program,
        accounts.strategy_custody.to_account_info(),
        accounts.operator_token.to_account_info(),
        accounts.async_strategy.to_account_info(),
        &[&seeds[..]],
        moved,
    )?;

    emit!(AssetsWithdrawnToOperator {
        strategy: accounts.async_strategy.key(),
        operator: accounts.operator.key(),
        amount: moved,
        off_chain_assets: accounts.async_strategy.off_chain_assets,
        timestamp: now,
    });

    Ok(moved)
}

pub fn return_assets(ctx: Context<OperatorTransfer>, amount: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    accounts.async_strategy.return_assets(amount)?;

    transfer(
        &accounts.token_program,
        accounts.operator_token.to_account_info(),
        accounts.strategy_custody.to_account_info(),
        accounts.operator.to_account_info(),
        &[],
        amount,
    )?;

    emit!(AssetsReturned {
        strategy: accounts.async_strategy.key(),
        operator: accounts.operator.key(),
        amount,
        off_chain_assets: accounts.async_strategy.off_chain_assets,
        timestamp: now,
    });

    Ok(())
}

pub fn inject_yield(ctx: Context<OperatorTransfer>, amount: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    accounts.async_strategy.inject_yield(amount)?;

    transfer(
        &accounts.token_program,
        accounts.operator_token.to_account_info(),
        accounts.strategy_custody.to_account_info(),
        accounts.operator.to_account_info(),
        &[],
        amount,
    )?;

    emit!(YieldInjected {
        strategy: accounts.async_strategy.key(),
        amount,
        total_assets: accounts.async_strategy.total_assets(),
        timestamp: now,
    });

    Ok(())
}

/// Mark off-chain holdings. Custody must cover every on-chain liability first.
pub fn report_nav(ctx: Context<ReportNav>, value: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let custody_balance = ctx.accounts.strategy_custody.amount;
    let strategy = &mut ctx.accounts.async_strategy;

    let liabilities = strategy.custody_liabilities();
    if custody_balance < liabilities {
        msg!(
            "Custody holds {} but owes {}",
            custody_balance,
            liabilities
        );
        return err!(VaultError::CustodyMismatch);
    }

    let old_nav = strategy.report_nav(value, now)?;

    emit!(NavReported {
        strategy: strategy.key(),
        old_nav,
        new_nav: value,
        total_assets: strategy.total_assets(),
        total_shares: strategy.total_shares,
        timestamp: now,
    });

    Ok(())
}

pub fn fulfill_deposit(ctx: Context<FulfillRequest>, holder: Pubkey, shares: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let assets = accounts
        .async_strategy
        .fulfill_deposit(&mut accounts.request, shares)?;

    emit!(DepositFulfilled {
        strategy: accounts.async_strategy.key(),
        depositor: holder,
        assets,
        shares,
        timestamp: now,
    });

    Ok(())
}

pub fn fulfill_redeem(ctx: Context<FulfillRequest>, holder: Pubkey, assets: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let accounts = &mut *ctx.accounts;
    let shares = accounts
        .async_strategy
        .fulfill_redeem(&mut accounts.request, assets)?;

    emit!(RedeemFulfilled {
        strategy: accounts.async_strategy.key(),
        redeemer: holder,
        shares,
        assets,
        timestamp: now,
    });

    Ok(())
}
