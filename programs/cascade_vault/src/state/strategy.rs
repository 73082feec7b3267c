// programs/cascade_vault/src/state/strategy.rs

use anchor_lang::prelude::*;
use cascade_core::constants::BPS_DENOMINATOR;
use cascade_core::bps_of;

use super::vault::{Allocation, Vault};
use crate::errors::VaultError;

/// How a strategy settles capital
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum StrategyKind {
    /// Liquid: capital sits in a vault-owned reserve account and can be pulled at any time
    Sync,
    /// Request/fulfill/claim cycle against an off-chain operator
    Async,
}

/// Registry entry for one strategy
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct StrategyRecord {
    /// Stable id, unique within the vault
    pub id: u16,

    pub kind: StrategyKind,

    /// Target share of each deposit routed to this strategy
    pub debt_ratio_bps: u16,

    /// Sync: reserve token account. Async: the AsyncStrategy account.
    pub source: Pubkey,

    /// Reserved for the strategy but still in vault custody (async only)
    pub pending: u64,

    /// Confirmed held by the strategy, as of the last report
    pub deployed: u64,

    pub total_gain: u64,

    pub total_loss: u64,

    pub activation_time: i64,

    pub last_report_time: i64,

    /// Makes the strategy due at the next eligible harvest
    pub force_harvest: bool,
}

impl StrategyRecord {
    /// PDA seed for a sync strategy's reserve token account: ["strategy_reserve", vault, id]
    pub const RESERVE_SEED: &'static [u8] = b"strategy_reserve";

    pub fn is_async(&self) -> bool {
        self.kind == StrategyKind::Async
    }

    pub fn total_debt(&self) -> u64 {
        self.pending.saturating_add(self.deployed)
    }
}

/// What a strategy reports it is worth at harvest time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StrategyValuation {
    /// Value still held by the strategy
    pub value: u64,
    /// Assets moved back into vault custody as part of this harvest
    pub repaid: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyReport {
    pub strategy_id: u16,
    pub gain: u64,
    pub loss: u64,
    pub repaid: u64,
    pub performance_fee: u64,
    pub total_debt: u64,
    pub total_gain: u64,
    pub total_loss: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpkeepStatus {
    pub needed: bool,
    /// Strategy id to harvest when `needed`
    pub target: Option<u16>,
}

impl Vault {
    // ==================== REGISTRY ====================

    pub fn strategy(&self, id: u16) -> Option<&StrategyRecord> {
        self.strategies.iter().find(|s| s.id == id)
    }

    pub fn strategy_index(&self, id: u16) -> Result<usize> {
        self.strategies
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| error!(VaultError::StrategyNotFound))
    }

    pub fn total_debt_ratio(&self) -> u64 {
        self.strategies
            .iter()
            .map(|s| s.debt_ratio_bps as u64)
            .sum()
    }

    pub fn add_strategy(
        &mut self,
        id: u16,
        debt_ratio_bps: u16,
        kind: StrategyKind,
        source: Pubkey,
        now: i64,
    ) -> Result<()> {
        require!(
            self.strategies.len() < Self::MAX_STRATEGIES,
            VaultError::TooManyStrategies
        );
        require!(
            debt_ratio_bps as u64 <= BPS_DENOMINATOR,
            VaultError::InvalidBasisPoints
        );
        require!(self.strategy(id).is_none(), VaultError::DuplicateStrategy);
        require_gte!(
            BPS_DENOMINATOR,
            self.total_debt_ratio() + debt_ratio_bps as u64,
            VaultError::DebtRatioOverflow
        );

        self.strategies.push(StrategyRecord {
            id,
            kind,
            debt_ratio_bps,
            source,
            pending: 0,
            deployed: 0,
            total_gain: 0,
            total_loss: 0,
            activation_time: now,
            last_report_time: now,
            force_harvest: false,
        });
        Ok(())
    }

    /// Drop a strategy whose capital is back in custody. Sync strategies must
    /// be reported first so `deployed` matches the reserve being swept.
    /// Returns the removed record; its pending and sync deployed balances
    /// become idle.
    pub fn remove_strategy(&mut self, id: u16) -> Result<StrategyRecord> {
        let index = self.strategy_index(id)?;
        let record = self.strategies[index];
        if record.is_async() {
            require!(record.deployed == 0, VaultError::StrategyHasDebt);
        }
        let recovered = record.total_debt();
        let idle_assets = self
            .idle_assets
            .checked_add(recovered)
            .ok_or(VaultError::MathOverflow)?;

        self.strategies.remove(index);
        self.idle_assets = idle_assets;
        let index = index as u8;
        if self.next_harvest_index > index {
            self.next_harvest_index -= 1;
        }
        if self.next_harvest_index as usize >= self.strategies.len() {
            self.next_harvest_index = 0;
        }
        Ok(record)
    }

    /// Move idle capital into a strategy bucket
    pub fn allocate_to_strategy(&mut self, id: u16, amount: u64) -> Result<Allocation> {
        require!(!self.emergency_shutdown, VaultError::EmergencyShutdownActive);
        require!(amount > 0, VaultError::ZeroAmount);
        let index = self.strategy_index(id)?;
        require_gte!(
            self.idle_assets,
            amount,
            VaultError::InsufficientIdle
        );

        let allocation = Allocation {
            strategy_id: id,
            kind: self.strategies[index].kind,
            amount,
        };
        self.apply_allocation(&allocation)?;
        Ok(allocation)
    }

    /// Confirm that part of an async reservation has been handed to the strategy
    pub fn execute_pending_investment(&mut self, id: u16, amount: u64) -> Result<()> {
        require!(amount > 0, VaultError::ZeroAmount);
        let index = self.strategy_index(id)?;
        let strategy = &mut self.strategies[index];
        require!(strategy.is_async(), VaultError::StrategyNotAsync);
        require_gte!(strategy.pending, amount, VaultError::InsufficientPending);

        let deployed = strategy
            .deployed
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;
        strategy.pending -= amount;
        strategy.deployed = deployed;
        Ok(())
    }

    /// Per-strategy share of newly deposited capital
    pub fn allocation_split(&self, assets: u64) -> Result<Vec<Allocation>> {
        let mut allocations = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let amount =
                bps_of(assets, strategy.debt_ratio_bps).ok_or(VaultError::MathOverflow)?;
            if amount > 0 {
                allocations.push(Allocation {
                    strategy_id: strategy.id,
                    kind: strategy.kind,
                    amount,
                });
            }
        }
        Ok(allocations)
    }

    pub(crate) fn apply_allocation(&mut self, allocation: &Allocation) -> Result<()> {
        require_gte!(
            self.idle_assets,
            allocation.amount,
            VaultError::InsufficientIdle
        );
        let index = self.strategy_index(allocation.strategy_id)?;
        let strategy = &mut self.strategies[index];
        let bucket = match strategy.kind {
            StrategyKind::Sync => &mut strategy.deployed,
            StrategyKind::Async => &mut strategy.pending,
        };
        *bucket = bucket
            .checked_add(allocation.amount)
            .ok_or(VaultError::MathOverflow)?;
        self.idle_assets -= allocation.amount;
        Ok(())
    }

    pub fn set_force_harvest(&mut self, id: u16) -> Result<()> {
        let index = self.strategy_index(id)?;
        self.strategies[index].force_harvest = true;
        Ok(())
    }

    // ==================== HARVEST ====================

    /// Whether the strategy at `index`, currently worth `value`, is due for a report
    pub fn harvest_trigger(&self, index: usize, value: u64, now: i64) -> bool {
        let Some(strategy) = self.strategies.get(index) else {
            return false;
        };
        let policy = &self.harvest_policy;
        let elapsed = now.saturating_sub(strategy.last_report_time);
        if elapsed < policy.min_report_interval {
            return false;
        }
        if strategy.force_harvest || elapsed >= policy.max_report_interval {
            return true;
        }

        let pending_yield = value.saturating_sub(strategy.deployed);
        let threshold =
            bps_of(strategy.total_debt(), policy.min_harvest_bps).unwrap_or(u64::MAX);
        pending_yield > 0 && pending_yield >= threshold
    }

    /// Realize gain or loss against the recorded debt
    pub fn report_strategy(
        &mut self,
        id: u16,
        valuation: StrategyValuation,
        now: i64,
    ) -> Result<StrategyReport> {
        let index = self.strategy_index(id)?;
        let strategy = self.strategies[index];
        let realized = valuation
            .value
            .checked_add(valuation.repaid)
            .ok_or(VaultError::MathOverflow)?;
        let gain = realized.saturating_sub(strategy.deployed);
        let loss = strategy.deployed.saturating_sub(realized);
        let performance_fee =
            bps_of(gain, self.fees.performance_fee_bps).ok_or(VaultError::MathOverflow)?;

        let idle_assets = self
            .idle_assets
            .checked_add(valuation.repaid)
            .ok_or(VaultError::MathOverflow)?;
        let accumulated_performance_fee = self
            .fees
            .accumulated_performance_fee
            .checked_add(performance_fee)
            .ok_or(VaultError::MathOverflow)?;
        let total_gain = strategy
            .total_gain
            .checked_add(gain)
            .ok_or(VaultError::MathOverflow)?;
        let total_loss = strategy
            .total_loss
            .checked_add(loss)
            .ok_or(VaultError::MathOverflow)?;

        // Management fee is charged on the pre-report asset base
        self.accrue_management_fee(now)?;

        let strategy = &mut self.strategies[index];
        strategy.deployed = valuation.value;
        strategy.total_gain = total_gain;
        strategy.total_loss = total_loss;
        strategy.last_report_time = now;
        strategy.force_harvest = false;
        self.idle_assets = idle_assets;
        self.fees.accumulated_performance_fee = accumulated_performance_fee;

        Ok(StrategyReport {
            strategy_id: id,
            gain,
            loss,
            repaid: valuation.repaid,
            performance_fee,
            total_debt: strategy.total_debt(),
            total_gain,
            total_loss,
        })
    }

    /// Strategy id under the round-robin pointer
    pub fn harvest_target(&self) -> Option<u16> {
        self.strategies
            .get(self.next_harvest_index as usize)
            .map(|s| s.id)
    }

    /// Keeper turn: if the strategy under the pointer, worth `value`, is due,
    /// step the pointer past it and return its index. Otherwise the pointer stays.
    pub fn take_harvest_turn(&mut self, value: u64, now: i64) -> Option<usize> {
        let index = self.next_harvest_index as usize;
        if !self.harvest_trigger(index, value, now) {
            return None;
        }
        self.advance_harvest_pointer();
        Some(index)
    }

    pub fn advance_harvest_pointer(&mut self) {
        let len = self.strategies.len();
        self.next_harvest_index = if len == 0 {
            0
        } else {
            ((self.next_harvest_index as usize + 1) % len) as u8
        };
    }

    /// First due strategy scanning round-robin from the pointer.
    /// `values` holds each strategy's current value in registry order.
    pub fn check_upkeep(&self, values: &[u64], now: i64) -> UpkeepStatus {
        let len = self.strategies.len();
        let start = self.next_harvest_index as usize;
        let target = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&index| {
                values
                    .get(index)
                    .is_some_and(|&value| self.harvest_trigger(index, value, now))
            })
            .map(|index| self.strategies[index].id);

        UpkeepStatus {
            needed: target.is_some(),
            target,
        }
    }
}
