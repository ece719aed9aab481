//! Interfaces to the chain modules the bridge depends on but does not own.

use alloy::primitives::U256;

use crate::{address::CosmosAddress, error::Result, token::Coin};

/// Read-only view of the staking module.
pub trait StakingKeeper {
    /// Every currently bonded validator, with its voting power.
    fn bonded_validators(&self) -> Vec<(CosmosAddress, u64)>;
}

/// The bank module. The bridge never mints or burns itself; it only asks the bank to move funds in and out of the
/// bridge's escrow.
pub trait BankKeeper {
    fn balance(&self, account: &CosmosAddress, denom: &str) -> U256;

    /// Move `coin` from `account` into escrow. Fails with
    /// [InsufficientFunds](crate::error::PeggyError::InsufficientFunds) without moving anything if the account's
    /// balance is too low.
    fn escrow(&mut self, account: &CosmosAddress, coin: &Coin) -> Result<()>;

    /// Return previously escrowed funds to `account`.
    fn refund(&mut self, account: &CosmosAddress, coin: &Coin) -> Result<()>;
}
