// programs/cascade_vault/src/state/mod.rs
//
// Account layouts and the pure accounting engine. Every mutating method
// validates its inputs before touching any field, so a rejected call leaves
// the account exactly as it was.

pub mod settlement;
pub mod strategy;
pub mod tranche;
pub mod vault;

#[cfg(test)]
mod invariants;

pub use settlement::*;
pub use strategy::*;
pub use tranche::*;
pub use vault::*;
