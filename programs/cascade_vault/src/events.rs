// programs/cascade_vault/src/events.rs

use crate::state::{ConfigChange, StrategyKind, Tranche};
use anchor_lang::prelude::*;

/// Emitted when a vault is initialized
#[event]
pub struct VaultInitialized {
    pub vault: Pubkey,
    pub authority: Pubkey,
    pub operator: Pubkey,
    pub asset_mint: Pubkey,
    pub deposit_limit: u64,
    pub timestamp: i64,
}

/// Emitted when assets are deposited and shares minted
#[event]
pub struct Deposit {
    pub vault: Pubkey,
    pub depositor: Pubkey,
    pub receiver: Pubkey,
    pub assets: u64,
    pub shares: u64,
    pub timestamp: i64,
}

/// Emitted when shares are burned and assets paid out
#[event]
pub struct Withdraw {
    pub vault: Pubkey,
    pub owner: Pubkey,
    pub receiver: Pubkey,
    pub assets: u64,
    pub shares: u64,
    pub from_idle: u64,
    pub from_pending: u64,
    pub from_strategies: u64,
    pub timestamp: i64,
}

/// Point-in-time view of the ledger buckets
#[event]
pub struct VaultSnapshot {
    pub vault: Pubkey,
    pub total_assets: u64,
    pub idle_assets: u64,
    pub pending_assets: u64,
    pub deployed_assets: u64,
    pub total_shares: u64,
    pub price_per_share: u64,
    pub timestamp: i64,
}

#[event]
pub struct StrategyAdded {
    pub vault: Pubkey,
    pub strategy_id: u16,
    pub kind: StrategyKind,
    pub debt_ratio_bps: u16,
    pub source: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct StrategyRemoved {
    pub vault: Pubkey,
    pub strategy_id: u16,
    pub recovered: u64,
    pub timestamp: i64,
}

#[event]
pub struct StrategyAllocated {
    pub vault: Pubkey,
    pub strategy_id: u16,
    pub kind: StrategyKind,
    pub amount: u64,
    pub timestamp: i64,
}

#[event]
pub struct PendingInvestmentExecuted {
    pub vault: Pubkey,
    pub strategy_id: u16,
    pub amount: u64,
    pub remaining_pending: u64,
    pub deployed: u64,
    pub timestamp: i64,
}

/// Emitted when a strategy's gain/loss is realized
#[event]
pub struct StrategyReported {
    pub vault: Pubkey,
    pub strategy_id: u16,
    pub gain: u64,
    pub loss: u64,
    pub repaid: u64,
    pub performance_fee: u64,
    pub total_debt: u64,
    pub total_gain: u64,
    pub total_loss: u64,
    pub timestamp: i64,
}

#[event]
pub struct FeesClaimed {
    pub vault: Pubkey,
    pub fee_recipient: Pubkey,
    pub management_fee: u64,
    pub performance_fee: u64,
    pub timestamp: i64,
}

#[event]
pub struct ConfigChangeScheduled {
    pub vault: Pubkey,
    pub change: ConfigChange,
    pub eta: i64,
    pub timestamp: i64,
}

#[event]
pub struct ConfigChangeApplied {
    pub vault: Pubkey,
    pub change: ConfigChange,
    pub timestamp: i64,
}

#[event]
pub struct ConfigChangeCancelled {
    pub vault: Pubkey,
    pub change: ConfigChange,
    pub timestamp: i64,
}

#[event]
pub struct DepositLimitUpdated {
    pub vault: Pubkey,
    pub old_limit: u64,
    pub new_limit: u64,
    pub timestamp: i64,
}

#[event]
pub struct EmergencyShutdownUpdated {
    pub vault: Pubkey,
    pub active: bool,
    pub timestamp: i64,
}

#[event]
pub struct EmergencyWithdrawal {
    pub vault: Pubkey,
    pub released_pending: u64,
    pub recalled_from_strategies: u64,
    pub idle_assets: u64,
    pub timestamp: i64,
}

// ==================== ASYNC SETTLEMENT ====================

#[event]
pub struct DepositRequested {
    pub strategy: Pubkey,
    pub holder: Pubkey,
    pub assets: u64,
    pub total_pending_deposits: u64,
    pub timestamp: i64,
}

#[event]
pub struct DepositFulfilled {
    pub strategy: Pubkey,
    pub depositor: Pubkey,
    pub assets: u64,
    pub shares: u64,
    pub timestamp: i64,
}

#[event]
pub struct RedeemRequested {
    pub strategy: Pubkey,
    pub holder: Pubkey,
    pub shares: u64,
    pub total_pending_redeems: u64,
    pub timestamp: i64,
}

#[event]
pub struct RedeemFulfilled {
    pub strategy: Pubkey,
    pub redeemer: Pubkey,
    pub shares: u64,
    pub assets: u64,
    pub timestamp: i64,
}

#[event]
pub struct AsyncSharesClaimed {
    pub strategy: Pubkey,
    pub holder: Pubkey,
    pub receiver: Pubkey,
    pub shares: u64,
    pub timestamp: i64,
}

#[event]
pub struct AsyncAssetsClaimed {
    pub strategy: Pubkey,
    pub holder: Pubkey,
    pub receiver: Pubkey,
    pub assets: u64,
    pub timestamp: i64,
}

#[event]
pub struct AssetsWithdrawnToOperator {
    pub strategy: Pubkey,
    pub operator: Pubkey,
    pub amount: u64,
    pub off_chain_assets: u64,
    pub timestamp: i64,
}

#[event]
pub struct AssetsReturned {
    pub strategy: Pubkey,
    pub operator: Pubkey,
    pub amount: u64,
    pub off_chain_assets: u64,
    pub timestamp: i64,
}

#[event]
pub struct NavReported {
    pub strategy: Pubkey,
    pub old_nav: u64,
    pub new_nav: u64,
    pub total_assets: u64,
    pub total_shares: u64,
    pub timestamp: i64,
}

#[event]
pub struct YieldInjected {
    pub strategy: Pubkey,
    pub amount: u64,
    pub total_assets: u64,
    pub timestamp: i64,
}

// ==================== TRANCHES ====================

#[event]
pub struct TranchePoolInitialized {
    pub pool: Pubkey,
    pub vault: Pubkey,
    pub senior_mint: Pubkey,
    pub junior_mint: Pubkey,
    pub senior_target_apr_bps: u16,
    pub timestamp: i64,
}

#[event]
pub struct TrancheDeposit {
    pub pool: Pubkey,
    pub tranche: Tranche,
    pub depositor: Pubkey,
    pub amount: u64,
    pub tokens_minted: u64,
    pub vault_shares: u64,
    pub timestamp: i64,
}

#[event]
pub struct TrancheWithdrawal {
    pub pool: Pubkey,
    pub tranche: Tranche,
    pub owner: Pubkey,
    pub tokens_burned: u64,
    pub assets: u64,
    pub vault_shares: u64,
    pub timestamp: i64,
}

/// Emitted after gains/losses are reallocated between tranches
#[event]
pub struct WaterfallExecuted {
    pub pool: Pubkey,
    pub elapsed: i64,
    pub pool_value: u64,
    pub gain: u64,
    pub loss: u64,
    pub senior_priority_return: u64,
    pub senior_before: u64,
    pub junior_before: u64,
    pub senior_after: u64,
    pub junior_after: u64,
    pub timestamp: i64,
}
