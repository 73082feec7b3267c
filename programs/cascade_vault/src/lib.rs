// programs/cascade_vault/src/lib.rs
//
// Cascade Vault Program
// =====================
// Share-denominated vault that routes capital across yield strategies:
// - Ledger: shares priced at total assets / total shares
// - Buckets: idle, pending (reserved for async strategies), deployed
// - Sync strategies hold liquid capital in vault-owned reserves
// - Async strategies settle off-chain capital through request/fulfill/claim
// - Round-robin harvesting with management and performance fees
// Plus a senior/junior tranche pool layered on top of the ledger.

use anchor_lang::prelude::*;

pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;

use instructions::*;
use state::{ConfigChange, Tranche, UpkeepStatus};

declare_id!("CasVau1t111111111111111111111111111111111111");

#[program]
pub mod cascade_vault {
    use super::*;

    // ==================== INITIALIZATION ====================

    /// Create the vault and its custody account for one asset mint
    pub fn initialize_vault(
        ctx: Context<InitializeVault>,
        params: InitializeVaultParams,
    ) -> Result<()> {
        instructions::initialize::handler(ctx, params)
    }

    // ==================== LEDGER ====================

    /// Deposit assets, mint shares to `receiver`; returns shares minted
    pub fn deposit<'info>(
        ctx: Context<'_, '_, 'info, 'info, DepositAssets<'info>>,
        assets: u64,
        receiver: Pubkey,
        min_shares_out: u64,
    ) -> Result<u64> {
        instructions::ledger::deposit(ctx, assets, receiver, min_shares_out)
    }

    /// Withdraw exactly `assets`; returns shares burned
    pub fn withdraw<'info>(
        ctx: Context<'_, '_, 'info, 'info, WithdrawAssets<'info>>,
        assets: u64,
    ) -> Result<u64> {
        instructions::ledger::withdraw(ctx, assets)
    }

    /// Redeem exactly `shares`; returns assets paid
    pub fn redeem<'info>(
        ctx: Context<'_, '_, 'info, 'info, WithdrawAssets<'info>>,
        shares: u64,
        min_assets_out: u64,
    ) -> Result<u64> {
        instructions::ledger::redeem(ctx, shares, min_assets_out)
    }

    /// Emit a snapshot of the vault's buckets
    pub fn take_snapshot(ctx: Context<TakeSnapshot>) -> Result<()> {
        instructions::ledger::take_snapshot(ctx)
    }

    // ==================== STRATEGY REGISTRY ====================

    pub fn add_sync_strategy(
        ctx: Context<AddSyncStrategy>,
        strategy_id: u16,
        debt_ratio_bps: u16,
    ) -> Result<()> {
        instructions::strategies::add_sync_strategy(ctx, strategy_id, debt_ratio_bps)
    }

    pub fn add_async_strategy(
        ctx: Context<AddAsyncStrategy>,
        strategy_id: u16,
        debt_ratio_bps: u16,
    ) -> Result<()> {
        instructions::strategies::add_async_strategy(ctx, strategy_id, debt_ratio_bps)
    }

    /// Return a strategy's capital to idle and unregister it
    pub fn remove_strategy<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageStrategy<'info>>,
        strategy_id: u16,
    ) -> Result<()> {
        instructions::strategies::remove_strategy(ctx, strategy_id)
    }

    /// Move idle capital into one strategy
    pub fn allocate_to_strategy<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageStrategy<'info>>,
        strategy_id: u16,
        amount: u64,
    ) -> Result<()> {
        instructions::strategies::allocate_to_strategy(ctx, strategy_id, amount)
    }

    /// Hand pending capital to an async strategy (operator)
    pub fn execute_pending_investment(
        ctx: Context<ExecutePendingInvestment>,
        strategy_id: u16,
        amount: u64,
    ) -> Result<()> {
        instructions::strategies::execute_pending_investment(ctx, strategy_id, amount)
    }

    /// Queue a redemption of the vault's async strategy shares
    pub fn request_strategy_redeem(
        ctx: Context<RequestStrategyRedeem>,
        strategy_id: u16,
        shares: u64,
    ) -> Result<()> {
        instructions::strategies::request_strategy_redeem(ctx, strategy_id, shares)
    }

    // ==================== HARVEST ====================

    pub fn harvest_strategy<'info>(
        ctx: Context<'_, '_, 'info, 'info, Harvest<'info>>,
        strategy_id: u16,
    ) -> Result<()> {
        instructions::harvest::harvest_strategy(ctx, strategy_id)
    }

    pub fn harvest_all<'info>(ctx: Context<'_, '_, 'info, 'info, Harvest<'info>>) -> Result<()> {
        instructions::harvest::harvest_all(ctx)
    }

    /// Round-robin keeper entry point; returns whether a report happened
    pub fn harvest_next<'info>(ctx: Context<'_, '_, 'info, 'info, Harvest<'info>>) -> Result<bool> {
        instructions::harvest::harvest_next(ctx)
    }

    pub fn check_upkeep<'info>(
        ctx: Context<'_, '_, 'info, 'info, CheckUpkeep<'info>>,
    ) -> Result<UpkeepStatus> {
        instructions::harvest::check_upkeep(ctx)
    }

    // ==================== ASYNC SETTLEMENT ====================

    pub fn request_async_deposit(ctx: Context<RequestAsyncDeposit>, assets: u64) -> Result<()> {
        instructions::settlement::request_deposit(ctx, assets)
    }

    pub fn request_async_redeem(ctx: Context<RequestAsyncRedeem>, shares: u64) -> Result<()> {
        instructions::settlement::request_redeem(ctx, shares)
    }

    pub fn claim_async_shares(ctx: Context<ClaimAsyncShares>) -> Result<u64> {
        instructions::settlement::claim_shares(ctx)
    }

    pub fn claim_async_assets(ctx: Context<ClaimAsyncAssets>) -> Result<u64> {
        instructions::settlement::claim_assets(ctx)
    }

    /// Operator: take capital off-chain
    pub fn withdraw_to_operator(ctx: Context<OperatorTransfer>, amount: u64) -> Result<u64> {
        instructions::settlement::withdraw_to_operator(ctx, amount)
    }

    /// Operator: bring off-chain capital back into custody
    pub fn return_assets(ctx: Context<OperatorTransfer>, amount: u64) -> Result<()> {
        instructions::settlement::return_assets(ctx, amount)
    }

    /// Operator: deliver yield into custody
    pub fn inject_yield(ctx: Context<OperatorTransfer>, amount: u64) -> Result<()> {
        instructions::settlement::inject_yield(ctx, amount)
    }

    /// Operator: mark off-chain holdings
    pub fn report_nav(ctx: Context<ReportNav>, value: u64) -> Result<()> {
        instructions::settlement::report_nav(ctx, value)
    }

    pub fn fulfill_deposit(
        ctx: Context<FulfillRequest>,
        holder: Pubkey,
        shares: u64,
    ) -> Result<()> {
        instructions::settlement::fulfill_deposit(ctx, holder, shares)
    }

    pub fn fulfill_redeem(
        ctx: Context<FulfillRequest>,
        holder: Pubkey,
        assets: u64,
    ) -> Result<()> {
        instructions::settlement::fulfill_redeem(ctx, holder, assets)
    }

    // ==================== FEES & CONFIG ====================

    /// Pay accrued fees to the fee recipient; returns the amount paid
    pub fn claim_fees(ctx: Context<ClaimFees>) -> Result<u64> {
        instructions::config::claim_fees(ctx)
    }

    pub fn set_management_fee(ctx: Context<VaultAdmin>, bps: u16) -> Result<()> {
        instructions::config::set_management_fee(ctx, bps)
    }

    pub fn set_performance_fee(ctx: Context<VaultAdmin>, bps: u16) -> Result<()> {
        instructions::config::set_performance_fee(ctx, bps)
    }

    pub fn schedule_config_change(ctx: Context<VaultAdmin>, change: ConfigChange) -> Result<()> {
        instructions::config::schedule_config_change(ctx, change)
    }

    pub fn apply_config_change(ctx: Context<ApplyConfigChange>) -> Result<()> {
        instructions::config::apply_config_change(ctx)
    }

    pub fn cancel_config_change(ctx: Context<VaultAdmin>) -> Result<()> {
        instructions::config::cancel_config_change(ctx)
    }

    pub fn set_deposit_limit(ctx: Context<VaultAdmin>, limit: u64) -> Result<()> {
        instructions::config::set_deposit_limit(ctx, limit)
    }

    pub fn set_emergency_shutdown(ctx: Context<VaultAdmin>, active: bool) -> Result<()> {
        instructions::config::set_emergency_shutdown(ctx, active)
    }

    pub fn force_harvest(ctx: Context<VaultAdmin>, strategy_id: u16) -> Result<()> {
        instructions::config::force_harvest(ctx, strategy_id)
    }

    /// Recall all liquid strategy capital and halt deposits
    pub fn emergency_withdraw_all<'info>(
        ctx: Context<'_, '_, 'info, 'info, EmergencyWithdrawAll<'info>>,
    ) -> Result<()> {
        instructions::config::emergency_withdraw_all(ctx)
    }

    // ==================== TRANCHES ====================

    pub fn initialize_tranche_pool(
        ctx: Context<InitializeTranchePool>,
        senior_target_apr_bps: u16,
    ) -> Result<()> {
        instructions::tranche::initialize_tranche_pool(ctx, senior_target_apr_bps)
    }

    pub fn deposit_senior<'info>(
        ctx: Context<'_, '_, 'info, 'info, DepositTranche<'info>>,
        amount: u64,
    ) -> Result<u64> {
        instructions::tranche::deposit_tranche(ctx, Tranche::Senior, amount)
    }

    pub fn deposit_junior<'info>(
        ctx: Context<'_, '_, 'info, 'info, DepositTranche<'info>>,
        amount: u64,
    ) -> Result<u64> {
        instructions::tranche::deposit_tranche(ctx, Tranche::Junior, amount)
    }

    pub fn withdraw_tranche<'info>(
        ctx: Context<'_, '_, 'info, 'info, WithdrawTranche<'info>>,
        tranche: Tranche,
        tokens: u64,
    ) -> Result<u64> {
        instructions::tranche::withdraw_tranche(ctx, tranche, tokens)
    }

    /// Split pool gains/losses between tranches
    pub fn execute_waterfall(ctx: Context<ExecuteWaterfall>) -> Result<()> {
        instructions::tranche::execute_waterfall(ctx)
    }
}

/// Public helpers for CPI
pub mod vault_helpers {
    use super::*;

    pub fn vault_address(asset_mint: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[state::Vault::SEED_PREFIX, asset_mint.as_ref()], &ID)
    }

    pub fn position_address(vault: &Pubkey, owner: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(
            &[state::HolderPosition::SEED_PREFIX, vault.as_ref(), owner.as_ref()],
            &ID,
        )
    }

    pub fn async_strategy_address(vault: &Pubkey, strategy_id: u16) -> (Pubkey, u8) {
        Pubkey::find_program_address(
            &[
                state::AsyncStrategy::SEED_PREFIX,
                vault.as_ref(),
                &strategy_id.to_le_bytes(),
            ],
            &ID,
        )
    }

    pub fn async_request_address(strategy: &Pubkey, holder: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(
            &[state::AsyncRequest::SEED_PREFIX, strategy.as_ref(), holder.as_ref()],
            &ID,
        )
    }
}
