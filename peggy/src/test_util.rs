//! In-memory collaborators and fixtures, for tests of this crate and of code built on it.

use std::collections::BTreeMap;

use alloy::primitives::U256;

use crate::{
    address::{ADDRESS_LEN, CosmosAddress, EthAddress},
    error::{PeggyError, Result},
    external::{BankKeeper, StakingKeeper},
    token::Coin,
};

/// A native address made of `byte` repeated.
pub fn cosmos_address(byte: u8) -> CosmosAddress {
    CosmosAddress::new([byte; ADDRESS_LEN])
}

/// An Ethereum address made of `byte` repeated.
pub fn eth_address(byte: u8) -> EthAddress {
    EthAddress::repeat_byte(byte)
}

/// A fixed table of bonded validators.
#[derive(Debug, Clone, Default)]
pub struct StaticStaking {
    validators: Vec<(CosmosAddress, u64)>,
}

impl StaticStaking {
    pub fn new(validators: impl IntoIterator<Item = (CosmosAddress, u64)>) -> Self {
        StaticStaking {
            validators: validators.into_iter().collect(),
        }
    }

    /// Set the stake of `validator`, bonding it if it isn't already.
    pub fn set_stake(&mut self, validator: CosmosAddress, stake: u64) {
        match self.validators.iter_mut().find(|(v, _)| *v == validator) {
            Some((_, s)) => *s = stake,
            None => self.validators.push((validator, stake)),
        }
    }

    pub fn unbond(&mut self, validator: &CosmosAddress) {
        self.validators.retain(|(v, _)| v != validator);
    }
}

impl StakingKeeper for StaticStaking {
    fn bonded_validators(&self) -> Vec<(CosmosAddress, u64)> {
        self.validators.clone()
    }
}

/// Account balances and the bridge's escrow, per denom.
#[derive(Debug, Clone, Default)]
pub struct MemBank {
    balances: BTreeMap<(CosmosAddress, String), U256>,
    escrow: BTreeMap<String, U256>,
}

impl MemBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, account: &CosmosAddress, coin: &Coin) {
        let balance = self
            .balances
            .entry((*account, coin.denom.clone()))
            .or_default();
        *balance = balance.saturating_add(coin.amount);
    }

    pub fn escrowed(&self, denom: &str) -> U256 {
        self.escrow.get(denom).copied().unwrap_or_default()
    }
}

impl BankKeeper for MemBank {
    fn balance(&self, account: &CosmosAddress, denom: &str) -> U256 {
        self.balances
            .get(&(*account, denom.to_owned()))
            .copied()
            .unwrap_or_default()
    }

    fn escrow(&mut self, account: &CosmosAddress, coin: &Coin) -> Result<()> {
        let available = self.balance(account, &coin.denom);
        if available < coin.amount {
            return Err(PeggyError::InsufficientFunds {
                denom: coin.denom.clone(),
                required: coin.amount,
                available,
            });
        }
        self.balances
            .insert((*account, coin.denom.clone()), available - coin.amount);
        *self.escrow.entry(coin.denom.clone()).or_default() += coin.amount;
        Ok(())
    }

    fn refund(&mut self, account: &CosmosAddress, coin: &Coin) -> Result<()> {
        let escrowed = self.escrowed(&coin.denom);
        if escrowed < coin.amount {
            return Err(PeggyError::Precondition(format!(
                "cannot refund {coin}, only {escrowed} escrowed"
            )));
        }
        self.escrow.insert(coin.denom.clone(), escrowed - coin.amount);
        self.mint(account, coin);
        Ok(())
    }
}
