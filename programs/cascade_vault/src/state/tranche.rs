// programs/cascade_vault/src/state/tranche.rs

use anchor_lang::prelude::*;
use cascade_core::{mul_div, prorate_annual_bps, Rounding};

use super::vault::{HolderPosition, Vault};
use crate::errors::VaultError;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum Tranche {
    /// Priority claim on gains up to the target APR, last to absorb losses
    Senior,
    /// Residual claim: keeps gains above the senior return, absorbs losses first
    Junior,
}

/// Senior/junior split of one vault position
/// PDA seeds: ["tranche_pool", vault]
#[account]
#[derive(InitSpace)]
pub struct TranchePool {
    pub vault: Pubkey,

    pub authority: Pubkey,

    /// Claim token mints; mint authority is this pool
    pub senior_mint: Pubkey,
    pub junior_mint: Pubkey,

    /// Claim tokens outstanding per tranche
    pub senior_deposits: u64,
    pub junior_deposits: u64,

    /// Assets attributed to each tranche as of the last waterfall
    pub senior_total_assets: u64,
    pub junior_total_assets: u64,

    pub senior_target_apr_bps: u16,

    pub last_waterfall_time: i64,

    pub waterfall_count: u64,

    pub bump: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaterfallOutcome {
    pub elapsed: i64,
    pub gain: u64,
    pub loss: u64,
    pub senior_priority_return: u64,
    pub senior_before: u64,
    pub junior_before: u64,
    pub senior_after: u64,
    pub junior_after: u64,
}

impl TranchePool {
    pub const SEED_PREFIX: &'static [u8] = b"tranche_pool";
    pub const SENIOR_MINT_SEED: &'static [u8] = b"senior_mint";
    pub const JUNIOR_MINT_SEED: &'static [u8] = b"junior_mint";

    pub fn total_managed_assets(&self) -> u64 {
        self.senior_total_assets
            .saturating_add(self.junior_total_assets)
    }

    pub fn tranche_assets(&self, tranche: Tranche) -> u64 {
        match tranche {
            Tranche::Senior => self.senior_total_assets,
            Tranche::Junior => self.junior_total_assets,
        }
    }

    pub fn tranche_deposits(&self, tranche: Tranche) -> u64 {
        match tranche {
            Tranche::Senior => self.senior_deposits,
            Tranche::Junior => self.junior_deposits,
        }
    }

    pub fn claim_mint(&self, tranche: Tranche) -> Pubkey {
        match tranche {
            Tranche::Senior => self.senior_mint,
            Tranche::Junior => self.junior_mint,
        }
    }

    fn counters_mut(&mut self, tranche: Tranche) -> (&mut u64, &mut u64) {
        match tranche {
            Tranche::Senior => (&mut self.senior_deposits, &mut self.senior_total_assets),
            Tranche::Junior => (&mut self.junior_deposits, &mut self.junior_total_assets),
        }
    }

    /// Book a deposit at the tranche's current assets per token, rounded down.
    /// An empty tranche mints 1:1. Returns the claim tokens to mint.
    pub fn record_deposit(&mut self, tranche: Tranche, amount: u64) -> Result<u64> {
        require!(amount > 0, VaultError::ZeroAmount);
        let (deposits, assets) = self.counters_mut(tranche);
        let tokens = if *deposits == 0 {
            amount
        } else {
            require!(*assets > 0, VaultError::TrancheDepleted);
            mul_div(amount, *deposits, *assets, Rounding::Down).ok_or(VaultError::MathOverflow)?
        };
        require!(tokens > 0, VaultError::ZeroShares);

        let new_deposits = deposits
            .checked_add(tokens)
            .ok_or(VaultError::MathOverflow)?;
        let new_assets = assets.checked_add(amount).ok_or(VaultError::MathOverflow)?;
        *deposits = new_deposits;
        *assets = new_assets;
        Ok(tokens)
    }

    /// Assets owed for `tokens` of a tranche, rounded down
    pub fn redemption_value(&self, tranche: Tranche, tokens: u64) -> Result<u64> {
        require!(tokens > 0, VaultError::ZeroAmount);
        let deposits = self.tranche_deposits(tranche);
        require_gte!(deposits, tokens, VaultError::InsufficientShares);
        mul_div(tokens, self.tranche_assets(tranche), deposits, Rounding::Down)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    pub fn record_withdrawal(&mut self, tranche: Tranche, tokens: u64, amount: u64) -> Result<()> {
        let (deposits, assets) = self.counters_mut(tranche);
        require_gte!(*deposits, tokens, VaultError::InsufficientShares);
        require_gte!(*assets, amount, VaultError::InsufficientLiquidity);
        *deposits -= tokens;
        *assets -= amount;
        Ok(())
    }

    /// Senior's accrued priority return over `elapsed` seconds
    pub fn senior_priority_return(&self, elapsed: i64) -> Result<u64> {
        prorate_annual_bps(self.senior_total_assets, self.senior_target_apr_bps, elapsed)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    /// Value of the pool's vault position, rounded down
    pub fn position_value(vault: &Vault, position: &HolderPosition) -> Result<u64> {
        vault.convert_to_assets(position.shares, Rounding::Down)
    }

    /// Run the waterfall against the current value of the pool's vault position,
    /// so tranche balances are current before tokens are priced.
    pub fn mark_to_vault(
        &mut self,
        vault: &Vault,
        position: &HolderPosition,
        now: i64,
    ) -> Result<(u64, WaterfallOutcome)> {
        let pool_value = Self::position_value(vault, position)?;
        let outcome = self.execute_waterfall(pool_value, now)?;
        Ok((pool_value, outcome))
    }

    /// Reallocate the change in pool value between tranches.
    /// Gains fill senior's priority return first; losses hit junior first.
    pub fn execute_waterfall(&mut self, pool_value: u64, now: i64) -> Result<WaterfallOutcome> {
        let elapsed = now.saturating_sub(self.last_waterfall_time).max(0);
        let managed = self.total_managed_assets();
        let priority = self.senior_priority_return(elapsed)?;
        let waterfall_count = self
            .waterfall_count
            .checked_add(1)
            .ok_or(VaultError::MathOverflow)?;

        let mut outcome = WaterfallOutcome {
            elapsed,
            senior_priority_return: priority,
            senior_before: self.senior_total_assets,
            junior_before: self.junior_total_assets,
            ..WaterfallOutcome::default()
        };

        if pool_value >= managed {
            let gain = pool_value - managed;
            let to_senior = gain.min(priority);
            outcome.gain = gain;
            outcome.senior_after = self
                .senior_total_assets
                .checked_add(to_senior)
                .ok_or(VaultError::MathOverflow)?;
            outcome.junior_after = self
                .junior_total_assets
                .checked_add(gain - to_senior)
                .ok_or(VaultError::MathOverflow)?;
        } else {
            let loss = managed - pool_value;
            let to_junior = loss.min(self.junior_total_assets);
            outcome.loss = loss;
            outcome.junior_after = self.junior_total_assets - to_junior;
            outcome.senior_after = self.senior_total_assets - (loss - to_junior);
        }

        self.senior_total_assets = outcome.senior_after;
        self.junior_total_assets = outcome.junior_after;
        self.last_waterfall_time = now;
        self.waterfall_count = waterfall_count;
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) fn test_pool(apr_bps: u16, now: i64) -> TranchePool {
    TranchePool {
        vault: Pubkey::new_unique(),
        authority: Pubkey::new_unique(),
        senior_mint: Pubkey::new_unique(),
        junior_mint: Pubkey::new_unique(),
        senior_deposits: 0,
        junior_deposits: 0,
        senior_total_assets: 0,
        junior_total_assets: 0,
        senior_target_apr_bps: apr_bps,
        last_waterfall_time: now,
        waterfall_count: 0,
        bump: 255,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::assert_vault_error;

    const DAY: i64 = 86_400;
    const T0: i64 = 1_700_000_000;
    const USDC: u64 = 1_000_000;

    fn pool(apr_bps: u16) -> TranchePool {
        test_pool(apr_bps, T0)
    }

    fn funded_pool() -> TranchePool {
        let mut pool = pool(300);
        pool.record_deposit(Tranche::Senior, 10_000 * USDC).unwrap();
        pool.record_deposit(Tranche::Junior, 10_000 * USDC).unwrap();
        pool
    }

    #[test]
    fn test_deposits_mint_one_to_one() {
        let pool = funded_pool();
        assert_eq!(pool.senior_deposits, 10_000 * USDC);
        assert_eq!(pool.junior_total_assets, 10_000 * USDC);
        assert_eq!(pool.total_managed_assets(), 20_000 * USDC);
    }

    #[test]
    fn test_waterfall_gain_fills_senior_priority_first() {
        let mut pool = funded_pool();
        let pool_value = 20_000 * USDC + 200 * USDC;

        let outcome = pool.execute_waterfall(pool_value, T0 + 30 * DAY).unwrap();

        // 10,000 * 3% * 30/365 = 24.657534
        assert_eq!(outcome.senior_priority_return, 24_657_534);
        assert_eq!(outcome.gain, 200 * USDC);
        assert_eq!(pool.senior_total_assets, 10_000 * USDC + 24_657_534);
        assert_eq!(pool.junior_total_assets, 10_000 * USDC + 175_342_466);
        assert_eq!(pool.total_managed_assets(), pool_value);
        assert_eq!(pool.last_waterfall_time, T0 + 30 * DAY);
    }

    #[test]
    fn test_waterfall_loss_hits_junior_first() {
        let mut pool = funded_pool();

        let outcome = pool
            .execute_waterfall(20_000 * USDC - 50 * USDC, T0 + 30 * DAY)
            .unwrap();

        assert_eq!(outcome.loss, 50 * USDC);
        assert_eq!(pool.junior_total_assets, 10_000 * USDC - 50 * USDC);
        assert_eq!(pool.senior_total_assets, 10_000 * USDC);
        assert_eq!(outcome.senior_before, outcome.senior_after);
    }

    #[test]
    fn test_gain_below_priority_goes_to_senior() {
        let mut pool = funded_pool();
        let outcome = pool
            .execute_waterfall(20_000 * USDC + 10 * USDC, T0 + 30 * DAY)
            .unwrap();

        assert_eq!(outcome.senior_after, 10_000 * USDC + 10 * USDC);
        assert_eq!(outcome.junior_after, 10_000 * USDC);
    }

    #[test]
    fn test_loss_beyond_junior_reaches_senior() {
        let mut pool = funded_pool();
        pool.execute_waterfall(8_000 * USDC, T0 + DAY).unwrap();

        assert_eq!(pool.junior_total_assets, 0);
        assert_eq!(pool.senior_total_assets, 8_000 * USDC);
    }

    #[test]
    fn test_waterfall_with_no_elapsed_time() {
        let mut pool = funded_pool();
        let outcome = pool.execute_waterfall(20_000 * USDC + 7, T0).unwrap();

        assert_eq!(outcome.elapsed, 0);
        assert_eq!(outcome.senior_priority_return, 0);
        assert_eq!(pool.junior_total_assets, 10_000 * USDC + 7);
        assert_eq!(pool.waterfall_count, 1);
    }

    #[test]
    fn test_deposit_after_loss_mints_at_current_rate() {
        let mut pool = funded_pool();
        pool.execute_waterfall(20_000 * USDC - 2_000 * USDC, T0 + DAY)
            .unwrap();
        assert_eq!(pool.junior_total_assets, 8_000 * USDC);

        // 0.8 assets per junior token
        let tokens = pool.record_deposit(Tranche::Junior, 800 * USDC).unwrap();
        assert_eq!(tokens, 1_000 * USDC);
        assert_eq!(pool.junior_deposits, 11_000 * USDC);
        assert_eq!(
            pool.redemption_value(Tranche::Junior, 10_000 * USDC).unwrap(),
            8_000 * USDC
        );

        // Senior untouched, still 1:1
        assert_eq!(pool.record_deposit(Tranche::Senior, 5 * USDC).unwrap(), 5 * USDC);
    }

    #[test]
    fn test_deposit_into_wiped_out_tranche_fails() {
        let mut pool = funded_pool();
        pool.execute_waterfall(9_000 * USDC, T0 + DAY).unwrap();
        assert_eq!(pool.junior_total_assets, 0);

        assert_vault_error(
            pool.record_deposit(Tranche::Junior, 100 * USDC),
            VaultError::TrancheDepleted,
        );
        assert_eq!(pool.junior_deposits, 10_000 * USDC);
    }

    #[test]
    fn test_redemption_is_pro_rata() {
        let mut pool = funded_pool();
        pool.execute_waterfall(20_000 * USDC - 2_000 * USDC, T0 + DAY)
            .unwrap();

        // Junior lost 20%
        let value = pool.redemption_value(Tranche::Junior, 1_000 * USDC).unwrap();
        assert_eq!(value, 800 * USDC);
        pool.record_withdrawal(Tranche::Junior, 1_000 * USDC, value)
            .unwrap();
        assert_eq!(pool.junior_deposits, 9_000 * USDC);
        assert_eq!(pool.junior_total_assets, 7_200 * USDC);

        assert_vault_error(
            pool.redemption_value(Tranche::Senior, 10_001 * USDC),
            VaultError::InsufficientShares,
        );
    }
}
