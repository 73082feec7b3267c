// programs/cascade_vault/src/state/settlement.rs
//
// Two-phase settlement for strategies whose capital lives off-chain.
// Holders request, the operator fulfills against attested NAV, holders claim.

use anchor_lang::prelude::*;
use cascade_core::{mul_div, Rounding};

use crate::errors::VaultError;

/// Sub-ledger of an asynchronous strategy
/// PDA seeds: ["async_strategy", vault, strategy_id (le bytes)]
#[account]
#[derive(InitSpace)]
pub struct AsyncStrategy {
    pub vault: Pubkey,

    pub strategy_id: u16,

    /// Role allowed to fulfill, report NAV and move capital off-chain
    pub operator: Pubkey,

    pub asset_mint: Pubkey,

    /// Token account holding pending deposits, idle capital and claimable assets
    pub custody: Pubkey,

    /// Strategy shares outstanding, including claimable and escrowed-for-redeem
    pub total_shares: u64,

    /// On-chain capital backing shares
    pub idle_assets: u64,

    /// Capital the operator holds off-chain, marked by NAV reports
    pub off_chain_assets: u64,

    /// Unfulfilled deposit requests
    pub total_pending_deposits: u64,

    /// Portion of `total_pending_deposits` still sitting in custody
    pub pending_in_custody: u64,

    /// Shares escrowed by unfulfilled redeem requests
    pub total_pending_redeems: u64,

    pub total_claimable_shares: u64,

    /// Assets set aside in custody for fulfilled redemptions
    pub total_claimable_assets: u64,

    pub last_nav: u64,

    pub last_nav_time: i64,

    pub nav_report_count: u64,

    pub bump: u8,
}

/// Per-(holder, strategy) settlement counters
/// PDA seeds: ["async_request", strategy, holder]
#[account]
#[derive(InitSpace, Default)]
pub struct AsyncRequest {
    pub strategy: Pubkey,
    pub holder: Pubkey,
    /// Claimed strategy shares
    pub shares: u64,
    pub pending_deposit: u64,
    pub claimable_shares: u64,
    /// Shares escrowed for redemption
    pub pending_redeem: u64,
    pub claimable_assets: u64,
    pub bump: u8,
}

/// Position of one settlement leg (deposit or redeem)
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementPhase {
    NoPosition,
    Pending,
    Claimable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementStep {
    RequestDeposit { assets: u64 },
    FulfillDeposit { shares: u64 },
    ClaimShares,
    RequestRedeem { shares: u64 },
    FulfillRedeem { assets: u64 },
    ClaimAssets,
}

impl AsyncRequest {
    pub const SEED_PREFIX: &'static [u8] = b"async_request";

    pub fn deposit_phase(&self) -> SettlementPhase {
        if self.pending_deposit > 0 {
            SettlementPhase::Pending
        } else if self.claimable_shares > 0 {
            SettlementPhase::Claimable
        } else {
            SettlementPhase::NoPosition
        }
    }

    pub fn redeem_phase(&self) -> SettlementPhase {
        if self.pending_redeem > 0 {
            SettlementPhase::Pending
        } else if self.claimable_assets > 0 {
            SettlementPhase::Claimable
        } else {
            SettlementPhase::NoPosition
        }
    }

    /// Single transition function for both legs.
    ///
    /// Returns the amount the step moved out of its source counter:
    /// - `RequestDeposit` / `RequestRedeem`: the amount queued
    /// - `FulfillDeposit`: assets consumed from the pending deposit
    /// - `FulfillRedeem`: shares burned from escrow
    /// - `ClaimShares` / `ClaimAssets`: amount released (0 when nothing is claimable)
    pub fn apply(&mut self, step: SettlementStep) -> Result<u64> {
        match step {
            SettlementStep::RequestDeposit { assets } => {
                require!(assets > 0, VaultError::ZeroAmount);
                require!(
                    self.deposit_phase() != SettlementPhase::Claimable,
                    VaultError::InvalidSettlementTransition
                );
                self.pending_deposit = self
                    .pending_deposit
                    .checked_add(assets)
                    .ok_or(VaultError::MathOverflow)?;
                Ok(assets)
            }
            SettlementStep::FulfillDeposit { shares } => {
                require!(shares > 0, VaultError::ZeroShares);
                require!(
                    self.deposit_phase() == SettlementPhase::Pending,
                    VaultError::InvalidSettlementTransition
                );
                let assets = std::mem::take(&mut self.pending_deposit);
                self.claimable_shares = shares;
                Ok(assets)
            }
            SettlementStep::ClaimShares => Ok(std::mem::take(&mut self.claimable_shares)),
            SettlementStep::RequestRedeem { shares } => {
                require!(shares > 0, VaultError::ZeroShares);
                require!(
                    self.redeem_phase() != SettlementPhase::Claimable,
                    VaultError::InvalidSettlementTransition
                );
                require_gte!(self.shares, shares, VaultError::InsufficientShares);
                self.shares -= shares;
                self.pending_redeem += shares;
                Ok(shares)
            }
            SettlementStep::FulfillRedeem { assets } => {
                require!(assets > 0, VaultError::ZeroAmount);
                require!(
                    self.redeem_phase() == SettlementPhase::Pending,
                    VaultError::InvalidSettlementTransition
                );
                let shares = std::mem::take(&mut self.pending_redeem);
                self.claimable_assets = assets;
                Ok(shares)
            }
            SettlementStep::ClaimAssets => Ok(std::mem::take(&mut self.claimable_assets)),
        }
    }
}

impl AsyncStrategy {
    pub const SEED_PREFIX: &'static [u8] = b"async_strategy";
    pub const CUSTODY_SEED: &'static [u8] = b"async_custody";

    // ==================== VALUATION ====================

    /// Pending deposits the operator has already taken off-chain
    pub fn pending_off_chain(&self) -> u64 {
        self.total_pending_deposits
            .saturating_sub(self.pending_in_custody)
    }

    /// Assets backing outstanding shares
    pub fn total_assets(&self) -> u64 {
        self.idle_assets
            .saturating_add(self.off_chain_assets)
            .saturating_sub(self.pending_off_chain())
    }

    /// Balance the custody account must hold
    pub fn custody_liabilities(&self) -> u64 {
        self.idle_assets
            .saturating_add(self.pending_in_custody)
            .saturating_add(self.total_claimable_assets)
    }

    /// Capital the operator may take off-chain
    pub fn deployable_assets(&self) -> u64 {
        self.pending_in_custody.saturating_add(self.idle_assets)
    }

    pub fn convert_to_shares(&self, assets: u64) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        let total_assets = self.total_assets();
        require!(total_assets > 0, VaultError::ZeroTotalAssets);
        mul_div(assets, self.total_shares, total_assets, Rounding::Down)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    pub fn convert_to_assets(&self, shares: u64) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        mul_div(shares, self.total_assets(), self.total_shares, Rounding::Down)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    /// Everything a holder is owed by the strategy, at current NAV
    pub fn holder_value(&self, request: &AsyncRequest) -> Result<u64> {
        let shares = request
            .shares
            .saturating_add(request.claimable_shares)
            .saturating_add(request.pending_redeem);
        self.convert_to_assets(shares)?
            .checked_add(request.pending_deposit)
            .and_then(|v| v.checked_add(request.claimable_assets))
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    // ==================== HOLDER ====================

    pub fn request_deposit(&mut self, request: &mut AsyncRequest, assets: u64) -> Result<()> {
        let total_pending_deposits = self
            .total_pending_deposits
            .checked_add(assets)
            .ok_or(VaultError::MathOverflow)?;
        let pending_in_custody = self
            .pending_in_custody
            .checked_add(assets)
            .ok_or(VaultError::MathOverflow)?;
        request.apply(SettlementStep::RequestDeposit { assets })?;

        self.total_pending_deposits = total_pending_deposits;
        self.pending_in_custody = pending_in_custody;
        Ok(())
    }

    pub fn request_redeem(&mut self, request: &mut AsyncRequest, shares: u64) -> Result<()> {
        let total_pending_redeems = self
            .total_pending_redeems
            .checked_add(shares)
            .ok_or(VaultError::MathOverflow)?;
        request.apply(SettlementStep::RequestRedeem { shares })?;

        self.total_pending_redeems = total_pending_redeems;
        Ok(())
    }

    /// Release claimable shares into `receiver` (the holder itself when `None`)
    pub fn claim_shares(
        &mut self,
        request: &mut AsyncRequest,
        receiver: Option<&mut AsyncRequest>,
    ) -> Result<u64> {
        if request.claimable_shares == 0 {
            msg!("Nothing to claim for {}", request.holder);
            return Ok(0);
        }
        let target_shares = match &receiver {
            Some(r) => r.shares,
            None => request.shares,
        };
        target_shares
            .checked_add(request.claimable_shares)
            .ok_or(VaultError::MathOverflow)?;

        let shares = request.apply(SettlementStep::ClaimShares)?;
        match receiver {
            Some(r) => r.shares += shares,
            None => request.shares += shares,
        }
        self.total_claimable_shares -= shares;
        Ok(shares)
    }

    /// Release claimable assets; the caller pays them out of custody
    pub fn claim_assets(&mut self, request: &mut AsyncRequest) -> Result<u64> {
        if request.claimable_assets == 0 {
            msg!("Nothing to claim for {}", request.holder);
            return Ok(0);
        }
        let assets = request.apply(SettlementStep::ClaimAssets)?;
        self.total_claimable_assets -= assets;
        Ok(assets)
    }

    // ==================== OPERATOR ====================

    /// Take capital off-chain, pending deposits first
    pub fn withdraw_to_operator(&mut self, amount: u64) -> Result<u64> {
        require!(amount > 0, VaultError::ZeroAmount);
        require_gte!(
            self.deployable_assets(),
            amount,
            VaultError::InsufficientLiquidity
        );
        let off_chain_assets = self
            .off_chain_assets
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;

        let from_pending = amount.min(self.pending_in_custody);
        self.pending_in_custody -= from_pending;
        self.idle_assets -= amount - from_pending;
        self.off_chain_assets = off_chain_assets;
        Ok(amount)
    }

    pub fn return_assets(&mut self, amount: u64) -> Result<()> {
        require!(amount > 0, VaultError::ZeroAmount);
        require!(
            amount <= self.off_chain_assets,
            VaultError::ReturnExceedsOffChain
        );
        let idle_assets = self
            .idle_assets
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;

        self.off_chain_assets -= amount;
        self.idle_assets = idle_assets;
        Ok(())
    }

    /// Mark off-chain holdings; returns the previous mark
    pub fn report_nav(&mut self, value: u64, now: i64) -> Result<u64> {
        let nav_report_count = self
            .nav_report_count
            .checked_add(1)
            .ok_or(VaultError::MathOverflow)?;
        let old = std::mem::replace(&mut self.off_chain_assets, value);
        self.last_nav = value;
        self.last_nav_time = now;
        self.nav_report_count = nav_report_count;
        Ok(old)
    }

    /// Credit yield delivered into custody
    pub fn inject_yield(&mut self, amount: u64) -> Result<()> {
        require!(amount > 0, VaultError::ZeroAmount);
        self.idle_assets = self
            .idle_assets
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;
        Ok(())
    }

    /// Settle a holder's pending deposit with `shares` at current NAV
    pub fn fulfill_deposit(&mut self, request: &mut AsyncRequest, shares: u64) -> Result<u64> {
        require!(shares > 0, VaultError::ZeroShares);
        let fair_shares = self.convert_to_shares(request.pending_deposit)?;
        if shares > fair_shares {
            msg!(
                "Fulfillment of {} shares exceeds NAV-implied {}",
                shares,
                fair_shares
            );
        }
        require_gte!(fair_shares, shares, VaultError::FulfillmentExceedsNav);
        let total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(VaultError::MathOverflow)?;
        let total_claimable_shares = self
            .total_claimable_shares
            .checked_add(shares)
            .ok_or(VaultError::MathOverflow)?;

        let assets = request.apply(SettlementStep::FulfillDeposit { shares })?;
        // Whatever is still in custody becomes share-backing idle capital
        let off_chain_portion = assets.min(self.pending_off_chain());
        let custody_portion = assets - off_chain_portion;
        self.pending_in_custody -= custody_portion;
        self.idle_assets += custody_portion;
        self.total_pending_deposits -= assets;
        self.total_shares = total_shares;
        self.total_claimable_shares = total_claimable_shares;
        Ok(assets)
    }

    /// Settle a holder's escrowed shares for `assets` paid from on-chain capital
    pub fn fulfill_redeem(&mut self, request: &mut AsyncRequest, assets: u64) -> Result<u64> {
        require!(assets > 0, VaultError::ZeroAmount);
        let fair_assets = self.convert_to_assets(request.pending_redeem)?;
        require_gte!(fair_assets, assets, VaultError::FulfillmentExceedsNav);
        require_gte!(self.idle_assets, assets, VaultError::InsufficientLiquidity);
        let total_claimable_assets = self
            .total_claimable_assets
            .checked_add(assets)
            .ok_or(VaultError::MathOverflow)?;

        let shares = request.apply(SettlementStep::FulfillRedeem { assets })?;
        self.total_shares -= shares;
        self.total_pending_redeems -= shares;
        self.idle_assets -= assets;
        self.total_claimable_assets = total_claimable_assets;
        Ok(shares)
    }
}

#[cfg(test)]
pub(crate) fn test_async_strategy() -> AsyncStrategy {
    AsyncStrategy {
        vault: Pubkey::new_unique(),
        strategy_id: 1,
        operator: Pubkey::new_unique(),
        asset_mint: Pubkey::new_unique(),
        custody: Pubkey::new_unique(),
        total_shares: 0,
        idle_assets: 0,
        off_chain_assets: 0,
        total_pending_deposits: 0,
        pending_in_custody: 0,
        total_pending_redeems: 0,
        total_claimable_shares: 0,
        total_claimable_assets: 0,
        last_nav: 0,
        last_nav_time: 0,
        nav_report_count: 0,
        bump: 255,
    }
}
