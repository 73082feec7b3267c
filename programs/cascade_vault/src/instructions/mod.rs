// programs/cascade_vault/src/instructions/mod.rs

pub mod config;
pub mod funding;
pub mod harvest;
pub mod initialize;
pub mod ledger;
pub mod settlement;
pub mod strategies;
pub mod tranche;

pub use config::*;
pub use harvest::*;
pub use initialize::*;
pub use ledger::*;
pub use settlement::*;
pub use strategies::*;
pub use tranche::*;
