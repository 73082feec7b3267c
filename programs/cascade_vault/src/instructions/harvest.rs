// programs/cascade_vault/src/instructions/harvest.rs
//
// Keeper entry points. Strategy accounts are passed as remaining accounts,
// laid out per strategy in registry order:
//   sync:  [reserve]
//   async: [async_strategy, vault_request, strategy_custody]
// `harvest_strategy` and `harvest_next` take only the target's accounts.

use anchor_lang::prelude::*;
use anchor_lang::Owner;
use anchor_spl::token::{Token, TokenAccount};

use super::funding::{token_balance, transfer, StrategySigner};
use super::ledger::emit_snapshot;
use crate::errors::VaultError;
use crate::events::StrategyReported;
use crate::state::{
    AsyncRequest, AsyncStrategy, StrategyKind, StrategyRecord, StrategyReport,
    StrategyValuation, UpkeepStatus, Vault,
};

#[derive(Accounts)]
pub struct Harvest<'info> {
    #[account(
        mut,
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Box<Account<'info, Vault>>,

    #[account(mut, address = vault.custody)]
    pub custody: Box<Account<'info, TokenAccount>>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct CheckUpkeep<'info> {
    #[account(
        seeds = [Vault::SEED_PREFIX, vault.asset_mint.as_ref()],
        bump = vault.bump,
    )]
    pub vault: Box<Account<'info, Vault>>,
}

fn account_span(kind: StrategyKind) -> usize {
    match kind {
        StrategyKind::Sync => 1,
        StrategyKind::Async => 3,
    }
}

/// Split the remaining accounts into one slice per registered strategy
fn strategy_slices<'a, T>(vault: &Vault, accounts: &'a [T]) -> Result<Vec<&'a [T]>> {
    let mut slices = Vec::with_capacity(vault.strategies.len());
    let mut offset = 0;
    for record in &vault.strategies {
        let end = offset + account_span(record.kind);
        require_gte!(accounts.len(), end, VaultError::InvalidStrategyAccount);
        slices.push(&accounts[offset..end]);
        offset = end;
    }
    Ok(slices)
}

fn read_account<T: AccountDeserialize + Owner>(info: &AccountInfo) -> Result<T> {
    require_keys_eq!(*info.owner, T::owner(), VaultError::InvalidStrategyAccount);
    let data = info.try_borrow_data()?;
    T::try_deserialize(&mut &data[..])
}

/// Check the async accounts belong to `record` and the vault's own request
fn check_async_accounts(
    vault_key: &Pubkey,
    record: &StrategyRecord,
    strategy_key: &Pubkey,
    strategy: &AsyncStrategy,
    request: &AsyncRequest,
    custody_key: &Pubkey,
) -> Result<()> {
    require_keys_eq!(*strategy_key, record.source, VaultError::InvalidStrategyAccount);
    require_keys_eq!(request.strategy, *strategy_key, VaultError::InvalidStrategyAccount);
    require_keys_eq!(request.holder, *vault_key, VaultError::InvalidStrategyAccount);
    require_keys_eq!(*custody_key, strategy.custody, VaultError::InvalidStrategyAccount);
    Ok(())
}

/// Current value of a strategy, read without side effects
fn strategy_value(vault_key: &Pubkey, record: &StrategyRecord, accounts: &[AccountInfo]) -> Result<u64> {
    require_gte!(
        accounts.len(),
        account_span(record.kind),
        VaultError::InvalidStrategyAccount
    );
    match record.kind {
        StrategyKind::Sync => {
            require_keys_eq!(*accounts[0].key, record.source, VaultError::InvalidStrategyAccount);
            token_balance(&accounts[0])
        }
        StrategyKind::Async => {
            let strategy: AsyncStrategy = read_account(&accounts[0])?;
            let request: AsyncRequest = read_account(&accounts[1])?;
            check_async_accounts(
                vault_key,
                record,
                accounts[0].key,
                &strategy,
                &request,
                accounts[2].key,
            )?;
            strategy.holder_value(&request)
        }
    }
}

/// Claim whatever the strategy owes the vault, then value what is left
fn settle_async<'info>(
    vault_key: &Pubkey,
    record: &StrategyRecord,
    custody: AccountInfo<'info>,
    token_program: &Program<'info, Token>,
    accounts: &'info [AccountInfo<'info>],
) -> Result<StrategyValuation> {
    require_gte!(accounts.len(), 3, VaultError::InvalidStrategyAccount);
    let mut strategy = Account::<AsyncStrategy>::try_from(&accounts[0])?;
    let mut request = Account::<AsyncRequest>::try_from(&accounts[1])?;
    check_async_accounts(
        vault_key,
        record,
        accounts[0].key,
        &strategy,
        &request,
        accounts[2].key,
    )?;

    strategy.claim_shares(&mut request, None)?;
    let repaid = strategy.claim_assets(&mut request)?;
    let value = strategy.holder_value(&request)?;

    let signer = StrategySigner::new(&strategy);
    let seeds = signer.seeds();
    transfer(
        token_program,
        accounts[2].clone(),
        custody,
        accounts[0].clone(),
        &[&seeds[..]],
        repaid,
    )?;

    strategy.exit(&crate::ID)?;
    request.exit(&crate::ID)?;
    Ok(StrategyValuation { value, repaid })
}

pub(crate) fn emit_report(vault: Pubkey, report: &StrategyReport, timestamp: i64) {
    emit!(StrategyReported {
        vault,
        strategy_id: report.strategy_id,
        gain: report.gain,
        loss: report.loss,
        repaid: report.repaid,
        performance_fee: report.performance_fee,
        total_debt: report.total_debt,
        total_gain: report.total_gain,
        total_loss: report.total_loss,
        timestamp,
    });
}

fn harvest_at<'info>(
    accounts: &mut Harvest<'info>,
    index: usize,
    strategy_accounts: &'info [AccountInfo<'info>],
    now: i64,
) -> Result<StrategyReport> {
    let vault_key = accounts.vault.key();
    let record = accounts
        .vault
        .strategies
        .get(index)
        .copied()
        .ok_or(VaultError::StrategyNotFound)?;

    let valuation = match record.kind {
        StrategyKind::Sync => StrategyValuation {
            value: strategy_value(&vault_key, &record, strategy_accounts)?,
            repaid: 0,
        },
        StrategyKind::Async => settle_async(
            &vault_key,
            &record,
            accounts.custody.to_account_info(),
            &accounts.token_program,
            strategy_accounts,
        )?,
    };

    let report = accounts.vault.report_strategy(record.id, valuation, now)?;
    emit_report(vault_key, &report, now);
    Ok(report)
}

/// Realize one strategy's gain or loss
pub fn harvest_strategy<'info>(
    ctx: Context<'_, '_, 'info, 'info, Harvest<'info>>,
    strategy_id: u16,
) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let index = ctx.accounts.vault.strategy_index(strategy_id)?;

    harvest_at(ctx.accounts, index, ctx.remaining_accounts, now)?;
    emit_snapshot(ctx.accounts.vault.key(), &ctx.accounts.vault, now);

    Ok(())
}

/// Harvest every strategy regardless of trigger
pub fn harvest_all<'info>(ctx: Context<'_, '_, 'info, 'info, Harvest<'info>>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let slices = strategy_slices(&ctx.accounts.vault, ctx.remaining_accounts)?;

    for (index, strategy_accounts) in slices.into_iter().enumerate() {
        harvest_at(ctx.accounts, index, strategy_accounts, now)?;
    }
    emit_snapshot(ctx.accounts.vault.key(), &ctx.accounts.vault, now);

    Ok(())
}

/// Harvest the strategy under the round-robin pointer if it is due.
/// The pointer only moves past a strategy once it has been harvested.
pub fn harvest_next<'info>(ctx: Context<'_, '_, 'info, 'info, Harvest<'info>>) -> Result<bool> {
    let now = Clock::get()?.unix_timestamp;
    let vault_key = ctx.accounts.vault.key();
    let index = ctx.accounts.vault.next_harvest_index as usize;
    let Some(record) = ctx.accounts.vault.strategies.get(index).copied() else {
        msg!("No strategies registered");
        return Ok(false);
    };

    let value = strategy_value(&vault_key, &record, ctx.remaining_accounts)?;
    let Some(index) = ctx.accounts.vault.take_harvest_turn(value, now) else {
        msg!("Strategy {} not due", record.id);
        return Ok(false);
    };
    harvest_at(ctx.accounts, index, ctx.remaining_accounts, now)?;
    emit_snapshot(vault_key, &ctx.accounts.vault, now);

    Ok(true)
}

/// Probe for automation: is any strategy due, and which one comes first
pub fn check_upkeep<'info>(
    ctx: Context<'_, '_, 'info, 'info, CheckUpkeep<'info>>,
) -> Result<UpkeepStatus> {
    let now = Clock::get()?.unix_timestamp;
    let vault = &ctx.accounts.vault;
    let vault_key = vault.key();
    let slices = strategy_slices(vault, ctx.remaining_accounts)?;

    let values = vault
        .strategies
        .iter()
        .zip(slices)
        .map(|(record, accounts)| strategy_value(&vault_key, record, accounts))
        .collect::<Result<Vec<u64>>>()?;

    Ok(vault.check_upkeep(&values, now))
}
