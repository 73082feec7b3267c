// programs/cascade_vault/src/instructions/funding.rs
//
// Token movements shared by the ledger, strategy and tranche instructions.
// Callers update the ledger first and move tokens afterwards.

use anchor_lang::prelude::*;
use anchor_spl::token::{self, Token, TokenAccount};

use crate::errors::VaultError;
use crate::state::{Allocation, AsyncStrategy, FundingPlan, StrategyKind, Vault};

/// Owned copy of the vault PDA seeds, so the vault account can stay borrowed mutably
pub struct VaultSigner {
    asset_mint: Pubkey,
    bump: [u8; 1],
}

impl VaultSigner {
    pub fn new(vault: &Vault) -> Self {
        Self {
            asset_mint: vault.asset_mint,
            bump: [vault.bump],
        }
    }

    pub fn seeds(&self) -> [&[u8]; 3] {
        [Vault::SEED_PREFIX, self.asset_mint.as_ref(), &self.bump]
    }
}

/// Signer seeds of an async strategy, which owns its custody account
pub struct StrategySigner {
    vault: Pubkey,
    strategy_id: [u8; 2],
    bump: [u8; 1],
}

impl StrategySigner {
    pub fn new(strategy: &AsyncStrategy) -> Self {
        Self {
            vault: strategy.vault,
            strategy_id: strategy.strategy_id.to_le_bytes(),
            bump: [strategy.bump],
        }
    }

    pub fn seeds(&self) -> [&[u8]; 4] {
        [
            AsyncStrategy::SEED_PREFIX,
            self.vault.as_ref(),
            &self.strategy_id,
            &self.bump,
        ]
    }
}

pub fn transfer<'info>(
    token_program: &Program<'info, Token>,
    from: AccountInfo<'info>,
    to: AccountInfo<'info>,
    authority: AccountInfo<'info>,
    signer_seeds: &[&[&[u8]]],
    amount: u64,
) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    token::transfer(
        CpiContext::new_with_signer(
            token_program.to_account_info(),
            token::Transfer {
                from,
                to,
                authority,
            },
            signer_seeds,
        ),
        amount,
    )
}

pub fn token_balance(info: &AccountInfo) -> Result<u64> {
    let data = info.try_borrow_data()?;
    let account = TokenAccount::try_deserialize(&mut &data[..])?;
    Ok(account.amount)
}

/// The reserve token account of sync strategy `strategy_id`, looked up among `accounts`
pub fn reserve_account<'info>(
    vault: &Vault,
    strategy_id: u16,
    accounts: &[AccountInfo<'info>],
) -> Result<AccountInfo<'info>> {
    let record = vault
        .strategy(strategy_id)
        .ok_or(VaultError::StrategyNotFound)?;
    require!(
        record.kind == StrategyKind::Sync,
        VaultError::StrategyNotSync
    );
    accounts
        .iter()
        .find(|info| *info.key == record.source)
        .cloned()
        .ok_or_else(|| error!(VaultError::InvalidStrategyAccount))
}

/// Move the sync share of new capital from custody into strategy reserves
pub fn fund_sync_allocations<'info>(
    vault: &Account<'info, Vault>,
    custody: AccountInfo<'info>,
    token_program: &Program<'info, Token>,
    allocations: &[Allocation],
    accounts: &[AccountInfo<'info>],
) -> Result<()> {
    let signer = VaultSigner::new(vault);
    let seeds = signer.seeds();
    for allocation in allocations
        .iter()
        .filter(|a| a.kind == StrategyKind::Sync)
    {
        let reserve = reserve_account(vault, allocation.strategy_id, accounts)?;
        transfer(
            token_program,
            custody.clone(),
            reserve,
            vault.to_account_info(),
            &[&seeds[..]],
            allocation.amount,
        )?;
    }
    Ok(())
}

/// Pull `(strategy id, amount)` pairs out of sync reserves into `destination`
pub fn drain_reserves<'info>(
    vault: &Account<'info, Vault>,
    destination: AccountInfo<'info>,
    token_program: &Program<'info, Token>,
    from_sync: &[(u16, u64)],
    accounts: &[AccountInfo<'info>],
) -> Result<()> {
    let signer = VaultSigner::new(vault);
    let seeds = signer.seeds();
    for (strategy_id, amount) in from_sync {
        let reserve = reserve_account(vault, *strategy_id, accounts)?;
        transfer(
            token_program,
            reserve,
            destination.clone(),
            vault.to_account_info(),
            &[&seeds[..]],
            *amount,
        )?;
    }
    Ok(())
}

/// Pay a funding plan to `receiver`: custody first, then sync reserves
pub fn pay_out<'info>(
    vault: &Account<'info, Vault>,
    custody: AccountInfo<'info>,
    receiver: AccountInfo<'info>,
    token_program: &Program<'info, Token>,
    plan: &FundingPlan,
    accounts: &[AccountInfo<'info>],
) -> Result<()> {
    let signer = VaultSigner::new(vault);
    let seeds = signer.seeds();
    transfer(
        token_program,
        custody,
        receiver.clone(),
        vault.to_account_info(),
        &[&seeds[..]],
        plan.from_custody(),
    )?;
    drain_reserves(vault, receiver, token_program, &plan.from_sync, accounts)
}
