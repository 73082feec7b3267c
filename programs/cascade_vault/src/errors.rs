// programs/cascade_vault/src/errors.rs

use anchor_lang::prelude::*;

#[error_code]
pub enum VaultError {
    // Validation
    #[msg("Zero amount not allowed")]
    ZeroAmount,

    #[msg("Operation would mint or burn zero shares")]
    ZeroShares,

    #[msg("Invalid basis points value (must be <= 10000)")]
    InvalidBasisPoints,

    #[msg("Sum of strategy debt ratios would exceed 10000 bps")]
    DebtRatioOverflow,

    #[msg("Strategy table is full")]
    TooManyStrategies,

    #[msg("Strategy not found")]
    StrategyNotFound,

    #[msg("Strategy account does not match the registry entry")]
    InvalidStrategyAccount,

    #[msg("Fee exceeds the configured maximum")]
    FeeTooHigh,

    #[msg("Harvest policy intervals are inconsistent")]
    InvalidHarvestPolicy,

    #[msg("Deposit would exceed the vault deposit limit")]
    DepositLimitExceeded,

    #[msg("Owner does not hold enough shares")]
    InsufficientShares,

    #[msg("Token account mint does not match the vault asset")]
    InvalidMint,

    #[msg("Fulfillment exceeds the NAV-implied amount")]
    FulfillmentExceedsNav,

    #[msg("Returned assets exceed assets held off-chain")]
    ReturnExceedsOffChain,

    #[msg("Math overflow in calculation")]
    MathOverflow,

    // Authorization
    #[msg("Unauthorized: caller lacks permission")]
    Unauthorized,

    #[msg("Caller is not the settlement operator")]
    NotOperator,

    #[msg("Caller does not own this position")]
    NotPositionOwner,

    // State
    #[msg("Emergency shutdown is active")]
    EmergencyShutdownActive,

    #[msg("Strategy id already registered")]
    DuplicateStrategy,

    #[msg("Strategy is not asynchronous")]
    StrategyNotAsync,

    #[msg("Strategy is not synchronous")]
    StrategyNotSync,

    #[msg("Invalid settlement transition for the current request phase")]
    InvalidSettlementTransition,

    #[msg("Vault holds shares but no assets")]
    ZeroTotalAssets,

    #[msg("A configuration change is already scheduled")]
    ChangeAlreadyPending,

    #[msg("No configuration change is scheduled")]
    NoPendingChange,

    #[msg("Configuration timelock has not elapsed")]
    TimelockNotElapsed,

    #[msg("Reserve attestation is missing or unhealthy")]
    ReservesUnhealthy,

    #[msg("Strategy custody balance does not cover tracked liabilities")]
    CustodyMismatch,

    #[msg("Tranche has claim tokens outstanding but no assets")]
    TrancheDepleted,

    // Insufficient liquidity
    #[msg("Insufficient liquidity to fund the request")]
    InsufficientLiquidity,

    #[msg("Insufficient idle assets")]
    InsufficientIdle,

    #[msg("Amount exceeds the strategy's pending reservation")]
    InsufficientPending,

    #[msg("Strategy still holds capital that cannot be withdrawn")]
    StrategyHasDebt,

    // Slippage
    #[msg("Output below caller-specified minimum")]
    SlippageExceeded,
}

/// Error taxonomy exposed to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    InsufficientLiquidity,
    Slippage,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        use VaultError::*;
        match self {
            ZeroAmount
            | ZeroShares
            | InvalidBasisPoints
            | DebtRatioOverflow
            | TooManyStrategies
            | StrategyNotFound
            | InvalidStrategyAccount
            | FeeTooHigh
            | InvalidHarvestPolicy
            | DepositLimitExceeded
            | InsufficientShares
            | InvalidMint
            | FulfillmentExceedsNav
            | ReturnExceedsOffChain
            | MathOverflow => ErrorKind::Validation,

            Unauthorized | NotOperator | NotPositionOwner => ErrorKind::Authorization,

            EmergencyShutdownActive
            | DuplicateStrategy
            | StrategyNotAsync
            | StrategyNotSync
            | InvalidSettlementTransition
            | ZeroTotalAssets
            | ChangeAlreadyPending
            | NoPendingChange
            | TimelockNotElapsed
            | ReservesUnhealthy
            | CustodyMismatch
            | TrancheDepleted => ErrorKind::State,

            InsufficientLiquidity | InsufficientIdle | InsufficientPending | StrategyHasDebt => {
                ErrorKind::InsufficientLiquidity
            }

            SlippageExceeded => ErrorKind::Slippage,
        }
    }
}

#[cfg(test)]
pub(crate) fn assert_vault_error<T: std::fmt::Debug>(result: Result<T>, expected: VaultError) {
    match result {
        Err(anchor_lang::error::Error::AnchorError(err)) => {
            assert_eq!(err.error_code_number, u32::from(expected), "{:?}", err)
        }
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}
