// programs/cascade_vault/src/state/vault.rs

use anchor_lang::prelude::*;
use cascade_core::constants::{BPS_DENOMINATOR, CONFIG_TIMELOCK_SECONDS, PPS_SCALE};
use cascade_core::{mul_div, prorate_annual_bps, Rounding};

use super::strategy::{StrategyKind, StrategyRecord};
use crate::errors::VaultError;

/// Harvest scheduling thresholds
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct HarvestPolicy {
    /// Minimum seconds between two reports of the same strategy
    pub min_report_interval: i64,

    /// After this many seconds a strategy is due regardless of yield
    pub max_report_interval: i64,

    /// Minimum unrealized yield, in bps of strategy debt, that makes a strategy due
    pub min_harvest_bps: u16,
}

impl HarvestPolicy {
    pub const DEFAULT_MIN_REPORT_INTERVAL: i64 = 6 * 60 * 60; // 6 hours
    pub const DEFAULT_MAX_REPORT_INTERVAL: i64 = 7 * 24 * 60 * 60; // 7 days
    pub const DEFAULT_MIN_HARVEST_BPS: u16 = 10; // 0.1%

    pub fn validate(&self) -> Result<()> {
        require!(self.min_report_interval >= 0, VaultError::InvalidHarvestPolicy);
        require!(
            self.max_report_interval >= self.min_report_interval,
            VaultError::InvalidHarvestPolicy
        );
        require!(
            self.min_harvest_bps as u64 <= BPS_DENOMINATOR,
            VaultError::InvalidBasisPoints
        );
        Ok(())
    }
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self {
            min_report_interval: Self::DEFAULT_MIN_REPORT_INTERVAL,
            max_report_interval: Self::DEFAULT_MAX_REPORT_INTERVAL,
            min_harvest_bps: Self::DEFAULT_MIN_HARVEST_BPS,
        }
    }
}

/// Fee accrual state. Counters only grow between claims.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct FeeState {
    /// Annual management fee on total assets
    pub management_fee_bps: u16,

    /// Fee on realized strategy gains
    pub performance_fee_bps: u16,

    pub last_fee_collection_time: i64,

    pub accumulated_management_fee: u64,

    pub accumulated_performance_fee: u64,
}

impl FeeState {
    pub fn total_accrued(&self) -> u64 {
        self.accumulated_management_fee
            .saturating_add(self.accumulated_performance_fee)
    }

    /// Management fee for the period since the last collection, not yet booked
    pub fn management_fee_due(&self, total_assets: u64, now: i64) -> Result<u64> {
        let elapsed = now.saturating_sub(self.last_fee_collection_time);
        prorate_annual_bps(total_assets, self.management_fee_bps, elapsed)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }
}

/// Privileged configuration changes that go through the timelock
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum ConfigChange {
    ManagementFee { bps: u16 },
    PerformanceFee { bps: u16 },
    FeeRecipient { recipient: Pubkey },
    Operator { operator: Pubkey },
    Harvest { policy: HarvestPolicy },
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct PendingConfigChange {
    pub change: ConfigChange,
    pub scheduled_at: i64,
    pub eta: i64,
}

/// The share ledger and its capital buckets
/// PDA seeds: ["vault", asset_mint]
#[account]
#[derive(InitSpace)]
pub struct Vault {
    /// Administrator
    pub authority: Pubkey,

    /// Settlement operator for async strategies
    pub operator: Pubkey,

    /// Owner of the token account fees are paid to
    pub fee_recipient: Pubkey,

    /// Underlying asset
    pub asset_mint: Pubkey,

    /// Token account holding idle and pending capital
    pub custody: Pubkey,

    /// Optional proof-of-reserve gate on deposits
    pub reserve_attestation: Option<Pubkey>,

    /// Sum of every holder position
    pub total_shares: u64,

    /// Unallocated capital held in custody
    pub idle_assets: u64,

    pub deposit_limit: u64,

    /// Halts deposits and allocations, never withdrawals
    pub emergency_shutdown: bool,

    /// Strategy arena, addressed by stable id
    #[max_len(8)]
    pub strategies: Vec<StrategyRecord>,

    /// Round-robin harvest pointer into `strategies`
    pub next_harvest_index: u8,

    pub harvest_policy: HarvestPolicy,

    pub fees: FeeState,

    pub pending_change: Option<PendingConfigChange>,

    pub bump: u8,
}

/// A holder's claim on the vault
/// PDA seeds: ["position", vault, owner]
#[account]
#[derive(InitSpace)]
pub struct HolderPosition {
    pub vault: Pubkey,
    pub owner: Pubkey,
    pub shares: u64,
    pub bump: u8,
}

impl HolderPosition {
    pub const SEED_PREFIX: &'static [u8] = b"position";
}

/// Capital moved from idle into a strategy bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub strategy_id: u16,
    pub kind: StrategyKind,
    pub amount: u64,
}

/// Where the assets for a payout come from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FundingPlan {
    pub from_idle: u64,
    /// (strategy id, amount) of pending reservations released
    pub released_pending: Vec<(u16, u64)>,
    /// (strategy id, amount) pulled from sync strategy reserves
    pub from_sync: Vec<(u16, u64)>,
}

impl FundingPlan {
    pub fn pending_total(&self) -> u64 {
        self.released_pending
            .iter()
            .fold(0u64, |acc, (_, amount)| acc.saturating_add(*amount))
    }

    pub fn sync_total(&self) -> u64 {
        self.from_sync
            .iter()
            .fold(0u64, |acc, (_, amount)| acc.saturating_add(*amount))
    }

    /// Paid directly out of the custody account
    pub fn from_custody(&self) -> u64 {
        self.from_idle.saturating_add(self.pending_total())
    }

    pub fn total(&self) -> u64 {
        self.from_custody().saturating_add(self.sync_total())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositOutcome {
    pub shares: u64,
    pub allocations: Vec<Allocation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub assets: u64,
    pub shares: u64,
    pub plan: FundingPlan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeClaim {
    pub management_fee: u64,
    pub performance_fee: u64,
}

impl FeeClaim {
    pub fn total(&self) -> u64 {
        self.management_fee.saturating_add(self.performance_fee)
    }
}

impl Vault {
    pub const SEED_PREFIX: &'static [u8] = b"vault";
    pub const CUSTODY_SEED: &'static [u8] = b"custody";
    pub const MAX_STRATEGIES: usize = 8;
    pub const MAX_MANAGEMENT_FEE_BPS: u16 = 500; // 5% per year
    pub const MAX_PERFORMANCE_FEE_BPS: u16 = 5_000; // 50% of realized gain

    // ==================== BUCKETS ====================

    pub fn total_pending(&self) -> u64 {
        self.strategies
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.pending))
    }

    pub fn total_deployed(&self) -> u64 {
        self.strategies
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.deployed))
    }

    /// idle + Σ pending + Σ deployed, recomputed on every call
    pub fn total_assets(&self) -> u64 {
        self.idle_assets
            .saturating_add(self.total_pending())
            .saturating_add(self.total_deployed())
    }

    /// Balance the custody token account is expected to hold
    pub fn custody_assets(&self) -> u64 {
        self.idle_assets.saturating_add(self.total_pending())
    }

    /// Assets per share scaled by `PPS_SCALE`; 1.0 when empty
    pub fn price_per_share(&self) -> u64 {
        if self.total_shares == 0 {
            return PPS_SCALE;
        }
        mul_div(self.total_assets(), PPS_SCALE, self.total_shares, Rounding::Down)
            .unwrap_or(u64::MAX)
    }

    pub fn convert_to_shares(&self, assets: u64, rounding: Rounding) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        let total_assets = self.total_assets();
        require!(total_assets > 0, VaultError::ZeroTotalAssets);
        mul_div(assets, self.total_shares, total_assets, rounding)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    pub fn convert_to_assets(&self, shares: u64, rounding: Rounding) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        mul_div(shares, self.total_assets(), self.total_shares, rounding)
            .ok_or_else(|| error!(VaultError::MathOverflow))
    }

    // ==================== FEES ====================

    /// Book the management fee owed since the last collection
    pub fn accrue_management_fee(&mut self, now: i64) -> Result<u64> {
        if now <= self.fees.last_fee_collection_time {
            return Ok(0);
        }
        let fee = self.fees.management_fee_due(self.total_assets(), now)?;
        self.fees.accumulated_management_fee = self
            .fees
            .accumulated_management_fee
            .checked_add(fee)
            .ok_or(VaultError::MathOverflow)?;
        self.fees.last_fee_collection_time = now;
        Ok(fee)
    }

    /// Pay out every accrued fee from idle capital and reset the counters
    pub fn claim_fees(&mut self, now: i64) -> Result<FeeClaim> {
        let due = if now > self.fees.last_fee_collection_time {
            self.fees.management_fee_due(self.total_assets(), now)?
        } else {
            0
        };
        let claim = FeeClaim {
            management_fee: self
                .fees
                .accumulated_management_fee
                .checked_add(due)
                .ok_or(VaultError::MathOverflow)?,
            performance_fee: self.fees.accumulated_performance_fee,
        };
        require_gte!(
            self.idle_assets,
            claim.total(),
            VaultError::InsufficientLiquidity
        );

        self.accrue_management_fee(now)?;
        self.idle_assets -= claim.total();
        self.fees.accumulated_management_fee = 0;
        self.fees.accumulated_performance_fee = 0;
        Ok(claim)
    }

    // ==================== DEPOSIT / WITHDRAW ====================

    /// Mint shares for `assets` and split the new capital across strategies
    pub fn deposit(
        &mut self,
        position: &mut HolderPosition,
        assets: u64,
        min_shares_out: u64,
        now: i64,
    ) -> Result<DepositOutcome> {
        require!(!self.emergency_shutdown, VaultError::EmergencyShutdownActive);
        require!(assets > 0, VaultError::ZeroAmount);
        let total_after = self
            .total_assets()
            .checked_add(assets)
            .ok_or(VaultError::MathOverflow)?;
        require!(
            total_after <= self.deposit_limit,
            VaultError::DepositLimitExceeded
        );

        let shares = self.convert_to_shares(assets, Rounding::Down)?;
        require!(shares > 0, VaultError::ZeroShares);
        require!(shares >= min_shares_out, VaultError::SlippageExceeded);
        let total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(VaultError::MathOverflow)?;
        let allocations = self.allocation_split(assets)?;

        self.accrue_management_fee(now)?;
        self.total_shares = total_shares;
        position.shares = position.shares.saturating_add(shares);
        self.idle_assets = self.idle_assets.saturating_add(assets);
        for allocation in &allocations {
            self.apply_allocation(allocation)?;
        }

        Ok(DepositOutcome {
            shares,
            allocations,
        })
    }

    /// Burn enough shares (rounded up) to pay out exactly `assets`
    pub fn withdraw(
        &mut self,
        position: &mut HolderPosition,
        assets: u64,
        now: i64,
    ) -> Result<WithdrawOutcome> {
        require!(assets > 0, VaultError::ZeroAmount);
        require!(self.total_shares > 0, VaultError::InsufficientShares);
        let shares = self.convert_to_shares(assets, Rounding::Up)?;
        require_gte!(position.shares, shares, VaultError::InsufficientShares);
        let plan = self.plan_funding(assets)?;

        self.accrue_management_fee(now)?;
        self.apply_funding(&plan);
        self.burn_shares(position, shares);

        Ok(WithdrawOutcome {
            assets,
            shares,
            plan,
        })
    }

    /// Burn `shares` and pay out their value (rounded down)
    pub fn redeem(
        &mut self,
        position: &mut HolderPosition,
        shares: u64,
        min_assets_out: u64,
        now: i64,
    ) -> Result<WithdrawOutcome> {
        require!(shares > 0, VaultError::ZeroShares);
        require_gte!(position.shares, shares, VaultError::InsufficientShares);
        let assets = self.convert_to_assets(shares, Rounding::Down)?;
        require!(assets >= min_assets_out, VaultError::SlippageExceeded);
        let plan = self.plan_funding(assets)?;

        self.accrue_management_fee(now)?;
        self.apply_funding(&plan);
        self.burn_shares(position, shares);

        Ok(WithdrawOutcome {
            assets,
            shares,
            plan,
        })
    }

    /// Funding order: idle, then pending reservations (still in
    /// custody), then sync strategy reserves. Async deployed capital is
    /// off-chain and never touched.
    pub fn plan_funding(&self, assets: u64) -> Result<FundingPlan> {
        let mut remaining = assets;
        let mut plan = FundingPlan {
            from_idle: remaining.min(self.idle_assets),
            ..FundingPlan::default()
        };
        remaining -= plan.from_idle;

        for strategy in self.strategies.iter().filter(|s| s.is_async()) {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(strategy.pending);
            if take > 0 {
                plan.released_pending.push((strategy.id, take));
                remaining -= take;
            }
        }

        for strategy in self.strategies.iter().filter(|s| !s.is_async()) {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(strategy.deployed);
            if take > 0 {
                plan.from_sync.push((strategy.id, take));
                remaining -= take;
            }
        }

        if remaining > 0 {
            msg!(
                "Funding shortfall: requested {} available {}",
                assets,
                assets - remaining
            );
        }
        require_gte!(
            assets - remaining,
            assets,
            VaultError::InsufficientLiquidity
        );
        Ok(plan)
    }

    fn apply_funding(&mut self, plan: &FundingPlan) {
        self.idle_assets -= plan.from_idle;
        for (id, amount) in &plan.released_pending {
            if let Some(strategy) = self.strategies.iter_mut().find(|s| s.id == *id) {
                strategy.pending -= amount;
            }
        }
        for (id, amount) in &plan.from_sync {
            if let Some(strategy) = self.strategies.iter_mut().find(|s| s.id == *id) {
                strategy.deployed -= amount;
            }
        }
    }

    fn burn_shares(&mut self, position: &mut HolderPosition, shares: u64) {
        position.shares -= shares;
        self.total_shares -= shares;
    }

    // ==================== ADMIN ====================

    pub fn set_deposit_limit(&mut self, limit: u64) -> u64 {
        std::mem::replace(&mut self.deposit_limit, limit)
    }

    pub fn set_emergency_shutdown(&mut self, active: bool) {
        self.emergency_shutdown = active;
    }

    /// Pull every liquid bucket back to idle and halt new deposits.
    /// Async deployed capital is off-chain and stays where it is.
    pub fn emergency_recall(&mut self, now: i64) -> Result<FundingPlan> {
        let mut plan = FundingPlan::default();
        for strategy in &self.strategies {
            if strategy.pending > 0 {
                plan.released_pending.push((strategy.id, strategy.pending));
            }
            if !strategy.is_async() && strategy.deployed > 0 {
                plan.from_sync.push((strategy.id, strategy.deployed));
            }
        }
        let recalled = plan.total();

        self.accrue_management_fee(now)?;
        self.apply_funding(&plan);
        self.idle_assets = self
            .idle_assets
            .checked_add(recalled)
            .ok_or(VaultError::MathOverflow)?;
        self.emergency_shutdown = true;
        Ok(plan)
    }

    // ==================== TIMELOCKED CONFIG ====================

    pub fn validate_change(change: &ConfigChange) -> Result<()> {
        match change {
            ConfigChange::ManagementFee { bps } => {
                require!(*bps <= Self::MAX_MANAGEMENT_FEE_BPS, VaultError::FeeTooHigh)
            }
            ConfigChange::PerformanceFee { bps } => {
                require!(*bps <= Self::MAX_PERFORMANCE_FEE_BPS, VaultError::FeeTooHigh)
            }
            ConfigChange::Harvest { policy } => policy.validate()?,
            ConfigChange::FeeRecipient { .. } | ConfigChange::Operator { .. } => {}
        }
        Ok(())
    }

    /// Record a change that may be applied once the timelock elapses
    pub fn schedule_config_change(&mut self, change: ConfigChange, now: i64) -> Result<i64> {
        require!(
            self.pending_change.is_none(),
            VaultError::ChangeAlreadyPending
        );
        Self::validate_change(&change)?;
        let eta = now
            .checked_add(CONFIG_TIMELOCK_SECONDS)
            .ok_or(VaultError::MathOverflow)?;
        self.pending_change = Some(PendingConfigChange {
            change,
            scheduled_at: now,
            eta,
        });
        Ok(eta)
    }

    pub fn apply_config_change(&mut self, now: i64) -> Result<ConfigChange> {
        let pending = self.pending_change.ok_or(VaultError::NoPendingChange)?;
        require!(now >= pending.eta, VaultError::TimelockNotElapsed);

        match pending.change {
            ConfigChange::ManagementFee { bps } => {
                // Close the period at the old rate
                self.accrue_management_fee(now)?;
                self.fees.management_fee_bps = bps;
            }
            ConfigChange::PerformanceFee { bps } => self.fees.performance_fee_bps = bps,
            ConfigChange::FeeRecipient { recipient } => self.fee_recipient = recipient,
            ConfigChange::Operator { operator } => self.operator = operator,
            ConfigChange::Harvest { policy } => self.harvest_policy = policy,
        }
        self.pending_change = None;
        Ok(pending.change)
    }

    pub fn cancel_config_change(&mut self) -> Result<ConfigChange> {
        let pending = self.pending_change.ok_or(VaultError::NoPendingChange)?;
        self.pending_change = None;
        Ok(pending.change)
    }
}

#[cfg(test)]
pub(crate) const T0: i64 = 1_700_000_000;

#[cfg(test)]
pub(crate) fn test_vault() -> Vault {
    Vault {
        authority: Pubkey::new_unique(),
        operator: Pubkey::new_unique(),
        fee_recipient: Pubkey::new_unique(),
        asset_mint: Pubkey::new_unique(),
        custody: Pubkey::new_unique(),
        reserve_attestation: None,
        total_shares: 0,
        idle_assets: 0,
        deposit_limit: u64::MAX,
        emergency_shutdown: false,
        strategies: vec![],
        next_harvest_index: 0,
        harvest_policy: HarvestPolicy::default(),
        fees: FeeState {
            last_fee_collection_time: T0,
            ..FeeState::default()
        },
        pending_change: None,
        bump: 255,
    }
}

#[cfg(test)]
pub(crate) fn test_position(owner: Pubkey) -> HolderPosition {
    HolderPosition {
        vault: Pubkey::default(),
        owner,
        shares: 0,
        bump: 255,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::assert_vault_error;
    use crate::state::StrategyValuation;
    use cascade_core::constants::SECONDS_PER_YEAR;

    const ASYNC_ID: u16 = 1;
    const SYNC_ID: u16 = 2;

    /// One async strategy at 60% and one sync strategy at 40%
    fn split_vault() -> Vault {
        let mut vault = test_vault();
        vault
            .add_strategy(ASYNC_ID, 6_000, StrategyKind::Async, Pubkey::new_unique(), T0)
            .unwrap();
        vault
            .add_strategy(SYNC_ID, 4_000, StrategyKind::Sync, Pubkey::new_unique(), T0)
            .unwrap();
        vault
    }

    fn assert_buckets_conserved(vault: &Vault) {
        let sum = vault.idle_assets
            + vault.strategies.iter().map(|s| s.pending).sum::<u64>()
            + vault.strategies.iter().map(|s| s.deployed).sum::<u64>();
        assert_eq!(vault.total_assets(), sum);
    }

    // ==================== SCENARIOS ====================

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());

        let outcome = vault.deposit(&mut alice, 10_000, 0, T0).unwrap();

        assert_eq!(outcome.shares, 10_000);
        assert_eq!(alice.shares, 10_000);
        assert_eq!(vault.total_shares, 10_000);
        assert_eq!(vault.idle_assets, 10_000);
        assert_eq!(vault.price_per_share(), PPS_SCALE);
    }

    #[test]
    fn test_deposit_splits_by_debt_ratio() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());

        let outcome = vault.deposit(&mut alice, 10_000, 0, T0).unwrap();

        assert_eq!(vault.strategy(ASYNC_ID).unwrap().pending, 6_000);
        assert_eq!(vault.strategy(ASYNC_ID).unwrap().deployed, 0);
        assert_eq!(vault.strategy(SYNC_ID).unwrap().deployed, 4_000);
        assert_eq!(vault.idle_assets, 0);
        assert_eq!(vault.total_assets(), 10_000);
        assert_eq!(
            outcome.allocations,
            vec![
                Allocation {
                    strategy_id: ASYNC_ID,
                    kind: StrategyKind::Async,
                    amount: 6_000
                },
                Allocation {
                    strategy_id: SYNC_ID,
                    kind: StrategyKind::Sync,
                    amount: 4_000
                },
            ]
        );
        assert_buckets_conserved(&vault);
    }

    #[test]
    fn test_withdraw_releases_pending_before_strategies() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();

        let outcome = vault.withdraw(&mut alice, 5_000, T0).unwrap();

        assert_eq!(outcome.shares, 5_000);
        assert_eq!(outcome.plan.from_idle, 0);
        assert_eq!(outcome.plan.released_pending, vec![(ASYNC_ID, 5_000)]);
        assert!(outcome.plan.from_sync.is_empty());
        assert_eq!(vault.strategy(ASYNC_ID).unwrap().pending, 1_000);
        assert_eq!(vault.strategy(SYNC_ID).unwrap().deployed, 4_000);
        assert_eq!(vault.custody_assets(), 1_000);
        assert_eq!(alice.shares, 5_000);
        assert_buckets_conserved(&vault);
    }

    #[test]
    fn test_withdraw_falls_through_to_sync_strategy() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();

        let outcome = vault.withdraw(&mut alice, 7_000, T0).unwrap();

        assert_eq!(outcome.plan.released_pending, vec![(ASYNC_ID, 6_000)]);
        assert_eq!(outcome.plan.from_sync, vec![(SYNC_ID, 1_000)]);
        assert_eq!(outcome.plan.total(), 7_000);
        assert_eq!(vault.strategy(SYNC_ID).unwrap().deployed, 3_000);
        assert_buckets_conserved(&vault);
    }

    #[test]
    fn test_withdraw_never_touches_async_deployed() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();
        vault.execute_pending_investment(ASYNC_ID, 6_000).unwrap();

        let before_idle = vault.idle_assets;
        let before_strategies = vault.strategies.clone();
        let before_shares = alice.shares;

        let result = vault.withdraw(&mut alice, 5_000, T0);

        assert_vault_error(result, VaultError::InsufficientLiquidity);
        assert_eq!(vault.idle_assets, before_idle);
        assert_eq!(vault.strategies, before_strategies);
        assert_eq!(alice.shares, before_shares);
    }

    #[test]
    fn test_deposit_then_redeem_never_favors_depositor() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        let mut bob = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();
        // Sync strategy earns 7, making the share price non-integral
        vault
            .report_strategy(
                SYNC_ID,
                StrategyValuation {
                    value: 4_007,
                    repaid: 0,
                },
                T0,
            )
            .unwrap();

        let minted = vault.deposit(&mut bob, 3_333, 0, T0).unwrap().shares;
        let returned = vault.redeem(&mut bob, minted, 0, T0).unwrap().assets;

        assert!(returned <= 3_333);
        assert_eq!(bob.shares, 0);
        assert_buckets_conserved(&vault);
    }

    #[test]
    fn test_withdraw_rounds_shares_up() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 3, 0, T0).unwrap();
        // 3 shares backed by 4 assets
        vault.idle_assets = 4;

        let outcome = vault.withdraw(&mut alice, 1, T0).unwrap();

        // 1 * 3 / 4 = 0.75 rounds up to 1
        assert_eq!(outcome.shares, 1);
    }

    // ==================== GUARDS ====================

    #[test]
    fn test_deposit_limit() {
        let mut vault = test_vault();
        vault.set_deposit_limit(15_000);
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();

        assert_vault_error(
            vault.deposit(&mut alice, 5_001, 0, T0),
            VaultError::DepositLimitExceeded,
        );
        assert!(vault.deposit(&mut alice, 5_000, 0, T0).is_ok());
    }

    #[test]
    fn test_shutdown_blocks_deposits_not_withdrawals() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();
        vault.set_emergency_shutdown(true);

        assert_vault_error(
            vault.deposit(&mut alice, 1, 0, T0),
            VaultError::EmergencyShutdownActive,
        );
        let outcome = vault.redeem(&mut alice, 10_000, 0, T0).unwrap();
        assert_eq!(outcome.assets, 10_000);
        assert_eq!(vault.total_shares, 0);
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        assert_vault_error(vault.deposit(&mut alice, 0, 0, T0), VaultError::ZeroAmount);
        assert_vault_error(vault.redeem(&mut alice, 0, 0, T0), VaultError::ZeroShares);
    }

    #[test]
    fn test_redeem_more_than_owned() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        let mut bob = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 1_000, 0, T0).unwrap();
        vault.deposit(&mut bob, 1_000, 0, T0).unwrap();

        assert_vault_error(
            vault.redeem(&mut alice, 1_001, 0, T0),
            VaultError::InsufficientShares,
        );
        assert_vault_error(
            vault.withdraw(&mut alice, 1_001, T0),
            VaultError::InsufficientShares,
        );
    }

    #[test]
    fn test_slippage_guards() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        assert_vault_error(
            vault.deposit(&mut alice, 1_000, 1_001, T0),
            VaultError::SlippageExceeded,
        );
        vault.deposit(&mut alice, 1_000, 1_000, T0).unwrap();
        assert_vault_error(
            vault.redeem(&mut alice, 1_000, 1_001, T0),
            VaultError::SlippageExceeded,
        );
    }

    #[test]
    fn test_total_loss_blocks_new_deposits() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 1_000, 0, T0).unwrap();
        vault.idle_assets = 0;

        assert_vault_error(
            vault.deposit(&mut alice, 1_000, 0, T0),
            VaultError::ZeroTotalAssets,
        );
    }

    #[test]
    fn test_total_shares_matches_positions() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        let mut bob = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 7_000, 0, T0).unwrap();
        vault.deposit(&mut bob, 3_000, 0, T0).unwrap();
        vault.withdraw(&mut alice, 2_500, T0).unwrap();
        vault.redeem(&mut bob, 1_000, 0, T0).unwrap();

        assert_eq!(vault.total_shares, alice.shares + bob.shares);
    }

    // ==================== FEES ====================

    #[test]
    fn test_management_fee_accrues_over_a_year() {
        let mut vault = test_vault();
        vault.fees.management_fee_bps = 200;
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 1_000_000, 0, T0).unwrap();

        let fee = vault.accrue_management_fee(T0 + SECONDS_PER_YEAR).unwrap();

        assert_eq!(fee, 20_000);
        assert_eq!(vault.fees.accumulated_management_fee, 20_000);
        assert_eq!(vault.fees.last_fee_collection_time, T0 + SECONDS_PER_YEAR);
        // Same timestamp accrues nothing
        assert_eq!(vault.accrue_management_fee(T0 + SECONDS_PER_YEAR).unwrap(), 0);
    }

    #[test]
    fn test_claim_fees_pays_from_idle_and_resets() {
        let mut vault = test_vault();
        vault.fees.management_fee_bps = 200;
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 1_000_000, 0, T0).unwrap();
        vault.fees.accumulated_performance_fee = 500;

        let claim = vault.claim_fees(T0 + SECONDS_PER_YEAR).unwrap();

        assert_eq!(claim.management_fee, 20_000);
        assert_eq!(claim.performance_fee, 500);
        assert_eq!(vault.idle_assets, 1_000_000 - 20_500);
        assert_eq!(vault.fees.total_accrued(), 0);
    }

    #[test]
    fn test_claim_fees_requires_idle_liquidity() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();
        vault.fees.accumulated_performance_fee = 10;

        assert_vault_error(vault.claim_fees(T0), VaultError::InsufficientLiquidity);
        assert_eq!(vault.fees.accumulated_performance_fee, 10);
    }

    // ==================== TIMELOCK ====================

    #[test]
    fn test_config_change_respects_timelock() {
        let mut vault = test_vault();
        let eta = vault
            .schedule_config_change(ConfigChange::PerformanceFee { bps: 1_000 }, T0)
            .unwrap();
        assert_eq!(eta, T0 + CONFIG_TIMELOCK_SECONDS);

        assert_vault_error(
            vault.apply_config_change(eta - 1),
            VaultError::TimelockNotElapsed,
        );
        assert_vault_error(
            vault.schedule_config_change(ConfigChange::PerformanceFee { bps: 1 }, T0),
            VaultError::ChangeAlreadyPending,
        );

        let applied = vault.apply_config_change(eta).unwrap();
        assert_eq!(applied, ConfigChange::PerformanceFee { bps: 1_000 });
        assert_eq!(vault.fees.performance_fee_bps, 1_000);
        assert!(vault.pending_change.is_none());
    }

    #[test]
    fn test_management_fee_change_closes_old_period() {
        let mut vault = test_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 1_000_000, 0, T0).unwrap();
        vault.fees.management_fee_bps = 100;

        let eta = vault
            .schedule_config_change(ConfigChange::ManagementFee { bps: 300 }, T0)
            .unwrap();
        vault.apply_config_change(eta).unwrap();

        // One day at 1%
        let expected = 1_000_000u64 * 100 * 86_400 / (10_000 * SECONDS_PER_YEAR as u64);
        assert_eq!(vault.fees.accumulated_management_fee, expected);
        assert_eq!(vault.fees.management_fee_bps, 300);
    }

    #[test]
    fn test_fee_bounds() {
        let mut vault = test_vault();
        assert_vault_error(
            vault.schedule_config_change(ConfigChange::ManagementFee { bps: 501 }, T0),
            VaultError::FeeTooHigh,
        );
        assert_vault_error(
            vault.schedule_config_change(ConfigChange::PerformanceFee { bps: 5_001 }, T0),
            VaultError::FeeTooHigh,
        );
        assert!(vault.pending_change.is_none());
    }

    #[test]
    fn test_cancel_config_change() {
        let mut vault = test_vault();
        let operator = Pubkey::new_unique();
        vault
            .schedule_config_change(ConfigChange::Operator { operator }, T0)
            .unwrap();
        assert_eq!(
            vault.cancel_config_change().unwrap(),
            ConfigChange::Operator { operator }
        );
        assert_vault_error(vault.cancel_config_change(), VaultError::NoPendingChange);
    }

    // ==================== EMERGENCY ====================

    #[test]
    fn test_emergency_recall() {
        let mut vault = split_vault();
        let mut alice = test_position(Pubkey::new_unique());
        vault.deposit(&mut alice, 10_000, 0, T0).unwrap();
        vault.execute_pending_investment(ASYNC_ID, 2_000).unwrap();

        let plan = vault.emergency_recall(T0).unwrap();

        assert_eq!(plan.released_pending, vec![(ASYNC_ID, 4_000)]);
        assert_eq!(plan.from_sync, vec![(SYNC_ID, 4_000)]);
        assert_eq!(vault.idle_assets, 8_000);
        assert_eq!(vault.strategy(ASYNC_ID).unwrap().deployed, 2_000);
        assert_eq!(vault.total_assets(), 10_000);
        assert!(vault.emergency_shutdown);
    }
}
