// programs/cascade_vault/src/state/invariants.rs
//
// Randomized interleavings of ledger operations, and the tranche pool
// running on top of the ledger.

use anchor_lang::prelude::*;
use cascade_core::constants::BPS_DENOMINATOR;
use cascade_core::prorate_annual_bps;
use proptest::prelude::*;

use super::strategy::{StrategyKind, StrategyValuation};
use super::tranche::{test_pool, Tranche, TranchePool, WaterfallOutcome};
use super::vault::{test_position, test_vault, HolderPosition, Vault, T0};

const ASYNC_ID: u16 = 1;
const SYNC_ID: u16 = 2;
const HOLDERS: usize = 3;

#[derive(Clone, Debug)]
enum Op {
    Deposit { holder: usize, assets: u64 },
    Withdraw { holder: usize, assets: u64 },
    Redeem { holder: usize, shares: u64 },
    Allocate { sync: bool, amount: u64 },
    Execute { amount: u64 },
    Harvest { sync: bool, value_bps: u16, repaid_bps: u16 },
    ClaimFees,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..HOLDERS, 1..1_000_000u64).prop_map(|(holder, assets)| Op::Deposit { holder, assets }),
        (0..HOLDERS, 1..1_000_000u64).prop_map(|(holder, assets)| Op::Withdraw { holder, assets }),
        (0..HOLDERS, 1..1_000_000u64).prop_map(|(holder, shares)| Op::Redeem { holder, shares }),
        (any::<bool>(), 1..500_000u64).prop_map(|(sync, amount)| Op::Allocate { sync, amount }),
        (1..500_000u64).prop_map(|amount| Op::Execute { amount }),
        (any::<bool>(), 5_000..15_000u16, 0..5_000u16).prop_map(|(sync, value_bps, repaid_bps)| {
            Op::Harvest {
                sync,
                value_bps,
                repaid_bps,
            }
        }),
        Just(Op::ClaimFees),
    ]
}

fn fresh_vault() -> Vault {
    let mut vault = test_vault();
    vault.fees.management_fee_bps = 200;
    vault.fees.performance_fee_bps = 1_000;
    vault
        .add_strategy(ASYNC_ID, 3_000, StrategyKind::Async, Pubkey::new_unique(), T0)
        .unwrap();
    vault
        .add_strategy(SYNC_ID, 5_000, StrategyKind::Sync, Pubkey::new_unique(), T0)
        .unwrap();
    vault
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Snapshot {
    idle_assets: u64,
    total_shares: u64,
    strategies: Vec<super::strategy::StrategyRecord>,
    fees: super::vault::FeeState,
    positions: Vec<u64>,
}

fn snapshot(vault: &Vault, positions: &[HolderPosition]) -> Snapshot {
    Snapshot {
        idle_assets: vault.idle_assets,
        total_shares: vault.total_shares,
        strategies: vault.strategies.clone(),
        fees: vault.fees,
        positions: positions.iter().map(|p| p.shares).collect(),
    }
}

/// Applies `op` and returns the expected change in total assets
fn apply(
    vault: &mut Vault,
    positions: &mut [HolderPosition],
    op: &Op,
    now: i64,
) -> Result<i128> {
    match *op {
        Op::Deposit { holder, assets } => {
            vault.deposit(&mut positions[holder], assets, 0, now)?;
            Ok(assets as i128)
        }
        Op::Withdraw { holder, assets } => {
            vault.withdraw(&mut positions[holder], assets, now)?;
            Ok(-(assets as i128))
        }
        Op::Redeem { holder, shares } => {
            let shares = shares.min(positions[holder].shares.max(1));
            let outcome = vault.redeem(&mut positions[holder], shares, 0, now)?;
            Ok(-(outcome.assets as i128))
        }
        Op::Allocate { sync, amount } => {
            let id = if sync { SYNC_ID } else { ASYNC_ID };
            vault.allocate_to_strategy(id, amount)?;
            Ok(0)
        }
        Op::Execute { amount } => {
            vault.execute_pending_investment(ASYNC_ID, amount)?;
            Ok(0)
        }
        Op::Harvest {
            sync,
            value_bps,
            repaid_bps,
        } => {
            let id = if sync { SYNC_ID } else { ASYNC_ID };
            let deployed = vault.strategy(id).map_or(0, |s| s.deployed);
            let marked = deployed as u128 * value_bps as u128 / BPS_DENOMINATOR as u128;
            let repaid = (marked * repaid_bps as u128 / BPS_DENOMINATOR as u128) as u64;
            let value = marked as u64 - repaid;
            vault.report_strategy(id, StrategyValuation { value, repaid }, now)?;
            Ok(marked as i128 - deployed as i128)
        }
        Op::ClaimFees => {
            let claim = vault.claim_fees(now)?;
            Ok(-(claim.total() as i128))
        }
    }
}

proptest! {
    #[test]
    fn prop_ledger_conservation(ops in prop::collection::vec(op(), 1..60)) {
        let mut vault = fresh_vault();
        let mut positions: Vec<HolderPosition> =
            (0..HOLDERS).map(|_| test_position(Pubkey::new_unique())).collect();
        let mut expected_total = vault.total_assets() as i128;

        for (step, op) in ops.iter().enumerate() {
            let now = T0 + step as i64 * 3_600;
            let before = snapshot(&vault, &positions);

            match apply(&mut vault, &mut positions, op, now) {
                Ok(delta) => expected_total += delta,
                // Rejected operations leave no trace
                Err(_) => prop_assert_eq!(&snapshot(&vault, &positions), &before),
            }

            let buckets = vault.idle_assets as i128
                + vault.strategies.iter().map(|s| s.pending as i128).sum::<i128>()
                + vault.strategies.iter().map(|s| s.deployed as i128).sum::<i128>();
            prop_assert_eq!(vault.total_assets() as i128, buckets);
            prop_assert_eq!(vault.total_assets() as i128, expected_total);
            prop_assert_eq!(
                vault.total_shares,
                positions.iter().map(|p| p.shares).sum::<u64>()
            );
            prop_assert!(vault.total_debt_ratio() <= BPS_DENOMINATOR);
            prop_assert_eq!(
                vault.custody_assets(),
                vault.idle_assets + vault.total_pending()
            );
        }
    }

    #[test]
    fn prop_deposit_redeem_round_trip(
        seed in 1..10_000_000u64,
        gain in 0..1_000_000u64,
        assets in 1..10_000_000u64,
    ) {
        let mut vault = fresh_vault();
        let mut seeder = test_position(Pubkey::new_unique());
        let mut depositor = test_position(Pubkey::new_unique());
        vault.deposit(&mut seeder, seed, 0, T0).unwrap();
        let deployed = vault.strategy(SYNC_ID).map_or(0, |s| s.deployed);
        vault
            .report_strategy(
                SYNC_ID,
                StrategyValuation { value: deployed + gain, repaid: 0 },
                T0,
            )
            .unwrap();

        if let Ok(outcome) = vault.deposit(&mut depositor, assets, 0, T0) {
            let returned = vault.redeem(&mut depositor, outcome.shares, 0, T0);
            if let Ok(returned) = returned {
                prop_assert!(returned.assets <= assets);
            }
        }
    }
}

// ==================== TRANCHE POOL OVER THE LEDGER ====================

const DAY: i64 = 86_400;
const USDC: u64 = 1_000_000;
const SENIOR_APR_BPS: u16 = 300;

/// Vault routing everything to one sync strategy, plus a pool holding a position in it
struct PoolFixture {
    vault: Vault,
    pool: TranchePool,
    position: HolderPosition,
}

impl PoolFixture {
    fn new() -> Self {
        let mut vault = test_vault();
        vault
            .add_strategy(SYNC_ID, 10_000, StrategyKind::Sync, Pubkey::new_unique(), T0)
            .unwrap();
        Self {
            vault,
            pool: test_pool(SENIOR_APR_BPS, T0),
            position: test_position(Pubkey::new_unique()),
        }
    }

    fn deposit(&mut self, tranche: Tranche, amount: u64, now: i64) -> Result<(WaterfallOutcome, u64)> {
        let (_, waterfall) = self.pool.mark_to_vault(&self.vault, &self.position, now)?;
        self.vault.deposit(&mut self.position, amount, 0, now)?;
        let tokens = self.pool.record_deposit(tranche, amount)?;
        Ok((waterfall, tokens))
    }

    fn withdraw(&mut self, tranche: Tranche, tokens: u64, now: i64) -> Result<(WaterfallOutcome, u64)> {
        let (_, waterfall) = self.pool.mark_to_vault(&self.vault, &self.position, now)?;
        let assets = self.pool.redemption_value(tranche, tokens)?;
        self.vault.withdraw(&mut self.position, assets, now)?;
        self.pool.record_withdrawal(tranche, tokens, assets)?;
        Ok((waterfall, assets))
    }

    /// Mark the sync strategy to `value` without moving capital
    fn report(&mut self, value: u64, now: i64) -> Result<()> {
        self.vault
            .report_strategy(SYNC_ID, StrategyValuation { value, repaid: 0 }, now)?;
        Ok(())
    }

    fn position_value(&self) -> u64 {
        TranchePool::position_value(&self.vault, &self.position).unwrap()
    }
}

#[test]
fn test_junior_exit_before_waterfall_still_takes_loss() {
    let mut fx = PoolFixture::new();
    fx.deposit(Tranche::Senior, 10_000, T0).unwrap();
    fx.deposit(Tranche::Junior, 10_000, T0).unwrap();

    // Strategy loses 5_000; no waterfall has run since
    fx.report(15_000, T0).unwrap();

    let (waterfall, paid) = fx.withdraw(Tranche::Junior, 10_000, T0).unwrap();
    assert_eq!(waterfall.loss, 5_000);
    assert_eq!(paid, 5_000);
    assert_eq!(fx.pool.junior_deposits, 0);
    assert_eq!(fx.pool.junior_total_assets, 0);

    // Senior carries none of the loss
    assert_eq!(fx.pool.senior_total_assets, 10_000);
    assert_eq!(fx.position_value(), 10_000);
    let (_, after) = fx.pool.mark_to_vault(&fx.vault, &fx.position, T0).unwrap();
    assert_eq!(after.loss, 0);
    assert_eq!(fx.pool.senior_total_assets, 10_000);
    assert_eq!(
        fx.pool.redemption_value(Tranche::Senior, 10_000).unwrap(),
        10_000
    );
}

#[test]
fn test_late_junior_deposit_does_not_share_unbooked_gain() {
    let mut fx = PoolFixture::new();
    fx.deposit(Tranche::Senior, 10_000 * USDC, T0).unwrap();
    fx.deposit(Tranche::Junior, 10_000 * USDC, T0).unwrap();
    let later = T0 + 30 * DAY;
    fx.report(20_200 * USDC, later).unwrap();

    let (waterfall, tokens) = fx.deposit(Tranche::Junior, 10_000 * USDC, later).unwrap();

    // The gain is split before the new money arrives
    assert_eq!(waterfall.gain, 200 * USDC);
    assert_eq!(waterfall.senior_priority_return, 24_657_534);
    assert!(tokens < 10_000 * USDC);
    let incumbent = fx
        .pool
        .redemption_value(Tranche::Junior, 10_000 * USDC)
        .unwrap();
    assert!(incumbent >= 10_000 * USDC + 175_342_466);
    let newcomer = fx.pool.redemption_value(Tranche::Junior, tokens).unwrap();
    assert!(newcomer <= 10_000 * USDC);
    assert!(newcomer + 2 >= 10_000 * USDC);

    // A senior deposit at the same instant earns no backdated priority
    let (waterfall, tokens) = fx.deposit(Tranche::Senior, 1_000 * USDC, later).unwrap();
    assert_eq!(waterfall.elapsed, 0);
    assert_eq!(waterfall.senior_priority_return, 0);
    assert!(tokens <= 1_000 * USDC);
}

#[test]
fn test_senior_priority_accrues_from_last_mark() {
    let mut fx = PoolFixture::new();
    fx.deposit(Tranche::Senior, 10_000 * USDC, T0).unwrap();
    fx.deposit(Tranche::Junior, 10_000 * USDC, T0).unwrap();

    // Mid-period senior top-up marks the pool; flat value means no gain to hand out
    let mid = T0 + 15 * DAY;
    let (waterfall, tokens) = fx.deposit(Tranche::Senior, 10_000 * USDC, mid).unwrap();
    assert_eq!(waterfall.elapsed, 15 * DAY);
    assert_eq!(waterfall.gain, 0);
    assert_eq!(tokens, 10_000 * USDC);
    assert_eq!(fx.pool.last_waterfall_time, mid);

    let end = T0 + 30 * DAY;
    fx.report(31_000 * USDC, end).unwrap();
    let (pool_value, outcome) = fx.pool.mark_to_vault(&fx.vault, &fx.position, end).unwrap();

    let priority = prorate_annual_bps(20_000 * USDC, SENIOR_APR_BPS, 15 * DAY).unwrap();
    assert_eq!(pool_value, 31_000 * USDC);
    assert_eq!(outcome.elapsed, 15 * DAY);
    assert_eq!(outcome.senior_priority_return, priority);
    assert_eq!(fx.pool.senior_total_assets, 20_000 * USDC + priority);
    assert_eq!(
        fx.pool.junior_total_assets,
        10_000 * USDC + 1_000 * USDC - priority
    );
}

#[test]
fn test_tranche_tokens_reprice_after_loss() {
    let mut fx = PoolFixture::new();
    fx.deposit(Tranche::Senior, 10_000, T0).unwrap();
    fx.deposit(Tranche::Junior, 10_000, T0).unwrap();
    fx.report(18_000, T0 + DAY).unwrap();

    // Junior is marked down 20%, so 800 buys 1_000 tokens
    let (waterfall, tokens) = fx.deposit(Tranche::Junior, 800, T0 + DAY).unwrap();
    assert_eq!(waterfall.loss, 2_000);
    assert_eq!(tokens, 1_000);
    assert_eq!(fx.pool.redemption_value(Tranche::Junior, 10_000).unwrap(), 8_000);
    assert_eq!(fx.pool.total_managed_assets(), fx.position_value());
}

#[derive(Clone, Debug)]
enum PoolOp {
    Deposit { senior: bool, amount: u64 },
    Withdraw { senior: bool, bps: u16 },
    Report { value_bps: u16 },
    Wait { days: i64 },
}

fn pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        (any::<bool>(), 1..1_000_000_000u64)
            .prop_map(|(senior, amount)| PoolOp::Deposit { senior, amount }),
        (any::<bool>(), 1..=10_000u16).prop_map(|(senior, bps)| PoolOp::Withdraw { senior, bps }),
        (7_000..13_000u16).prop_map(|value_bps| PoolOp::Report { value_bps }),
        (1..60i64).prop_map(|days| PoolOp::Wait { days }),
    ]
}

fn tranche_of(senior: bool) -> Tranche {
    if senior {
        Tranche::Senior
    } else {
        Tranche::Junior
    }
}

proptest! {
    #[test]
    fn prop_tranche_pool_tracks_vault_position(ops in prop::collection::vec(pool_op(), 1..40)) {
        let mut fx = PoolFixture::new();
        let mut now = T0;
        let mut waterfalls = Vec::new();

        for op in &ops {
            let saved = (fx.vault.clone(), fx.pool.clone(), fx.position.clone());
            let result = match *op {
                PoolOp::Deposit { senior, amount } => fx
                    .deposit(tranche_of(senior), amount, now)
                    .map(|(waterfall, _)| Some(waterfall)),
                PoolOp::Withdraw { senior, bps } => {
                    let tranche = tranche_of(senior);
                    let outstanding = fx.pool.tranche_deposits(tranche);
                    let tokens = (outstanding as u128 * bps as u128 / BPS_DENOMINATOR as u128)
                        .max(1) as u64;
                    fx.withdraw(tranche, tokens, now)
                        .map(|(waterfall, _)| Some(waterfall))
                }
                PoolOp::Report { value_bps } => {
                    let deployed = fx.vault.strategy(SYNC_ID).map_or(0, |s| s.deployed);
                    let value =
                        (deployed as u128 * value_bps as u128 / BPS_DENOMINATOR as u128) as u64;
                    fx.report(value, now).map(|_| None)
                }
                PoolOp::Wait { days } => {
                    now += days * DAY;
                    Ok(None)
                }
            };
            match result {
                Ok(Some(waterfall)) => waterfalls.push(waterfall),
                Ok(None) => {}
                Err(_) => (fx.vault, fx.pool, fx.position) = saved,
            }

            // After a mark the tranches account for exactly the position's value
            let (pool_value, outcome) =
                fx.pool.mark_to_vault(&fx.vault, &fx.position, now).unwrap();
            prop_assert_eq!(fx.pool.total_managed_assets(), pool_value);
            waterfalls.push(outcome);

            // Marking again at the same instant books nothing
            let (_, again) = fx.pool.mark_to_vault(&fx.vault, &fx.position, now).unwrap();
            prop_assert_eq!((again.gain, again.loss), (0, 0));
        }

        // Senior only loses once junior is exhausted
        for outcome in &waterfalls {
            if outcome.senior_after < outcome.senior_before {
                prop_assert_eq!(outcome.junior_after, 0);
            }
        }
    }
}
