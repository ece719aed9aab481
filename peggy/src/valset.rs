//! The validator registry and validator set snapshots.
//!
//! Validators register the Ethereum address they sign with. A snapshot (a [Valset]) lists every bonded validator that
//! has registered, with its share of the total bonded stake scaled onto `[0, u32::MAX]`. This is the form in which the
//! Ethereum contract stores validator power, so the relayer can hand it over unchanged.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    address::{CosmosAddress, EthAddress},
    confirm::ValsetConfirm,
    db::{
        ETH_ADDRESS, ETH_ADDRESS_OWNER, KeyBuilder, KvStore, KvStoreExt, Order, SEQ_VALSET_NONCE,
        VALSETS,
    },
    error::{PeggyError, Result},
    external::StakingKeeper,
    keeper::Keeper,
};

/// A member of a [Valset].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeValidator {
    pub power: u32,
    pub ethereum_address: EthAddress,
}

/// An immutable snapshot of the validators which can sign for the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valset {
    pub nonce: u64,
    pub height: u64,
    /// Ordered by power descending, then by Ethereum address ascending.
    pub members: Vec<BridgeValidator>,
}

impl Valset {
    /// The sum of every member's power. Note this is usually slightly less than [u32::MAX], because each member's
    /// power is rounded down independently.
    pub fn total_power(&self) -> u64 {
        self.members.iter().map(|m| m.power as u64).sum()
    }
}

/// Scale `stake` out of `total` onto `[0, u32::MAX]`, rounding down. Returns zero if `total` is zero.
pub fn normalize_power(stake: u64, total: u128) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = stake as u128 * u32::MAX as u128 / total;
    // Only exceeds `u32::MAX` if `stake > total`, which a consistent staking table never reports.
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

fn eth_address_key(validator: &CosmosAddress) -> Vec<u8> {
    KeyBuilder::table(ETH_ADDRESS).cosmos(validator).build()
}

fn eth_address_owner_key(eth_address: &EthAddress) -> Vec<u8> {
    KeyBuilder::table(ETH_ADDRESS_OWNER).eth(eth_address).build()
}

fn valset_key(nonce: u64) -> Vec<u8> {
    KeyBuilder::table(VALSETS).u64(nonce).build()
}

impl<S: KvStore> Keeper<S> {
    /// Register the Ethereum address `validator` signs with, replacing any earlier registration.
    pub fn set_eth_address(
        &mut self,
        validator: &CosmosAddress,
        eth_address: EthAddress,
    ) -> Result<()> {
        match self.validator_by_eth_address(&eth_address)? {
            Some(owner) if owner != *validator => {
                if self.config.reject_duplicate_eth_addresses {
                    return Err(PeggyError::Precondition(format!(
                        "ethereum address {eth_address} is already registered to {owner}"
                    )));
                }
                warn!(%eth_address, %owner, new_owner = %validator, "ethereum address registered to two validators");
            }
            _ => {}
        }

        if let Some(previous) = self.eth_address(validator)? {
            if previous != eth_address
                && self.validator_by_eth_address(&previous)? == Some(*validator)
            {
                self.store.delete(&eth_address_owner_key(&previous))?;
            }
        }

        self.store
            .set_json(&eth_address_key(validator), &eth_address)?;
        self.store
            .set_json(&eth_address_owner_key(&eth_address), validator)?;
        debug!(%validator, %eth_address, "registered ethereum address");
        Ok(())
    }

    pub fn eth_address(&self, validator: &CosmosAddress) -> Result<Option<EthAddress>> {
        Ok(self.store.get_json(&eth_address_key(validator))?)
    }

    /// The validator which most recently registered `eth_address`.
    pub fn validator_by_eth_address(
        &self,
        eth_address: &EthAddress,
    ) -> Result<Option<CosmosAddress>> {
        Ok(self.store.get_json(&eth_address_owner_key(eth_address))?)
    }

    /// The members a snapshot taken now would have. Nothing is persisted.
    pub fn valset_members(&self, staking: &dyn StakingKeeper) -> Result<Vec<BridgeValidator>> {
        let bonded = staking.bonded_validators();
        let total: u128 = bonded.iter().map(|(_, stake)| *stake as u128).sum();

        let mut members = Vec::with_capacity(bonded.len());
        for (validator, stake) in &bonded {
            // Validators which haven't registered an Ethereum address can't sign for the bridge.
            let Some(ethereum_address) = self.eth_address(validator)? else {
                continue;
            };
            members.push(BridgeValidator {
                power: normalize_power(*stake, total),
                ethereum_address,
            });
        }
        members.sort_unstable_by(|a, b| {
            b.power
                .cmp(&a.power)
                .then_with(|| a.ethereum_address.cmp(&b.ethereum_address))
        });
        Ok(members)
    }

    /// Take a snapshot of the current bridge validators at `height` and persist it under the next valset nonce.
    pub fn build_valset(&mut self, height: u64, staking: &dyn StakingKeeper) -> Result<Valset> {
        let members = self.valset_members(staking)?;
        let nonce = self.next_sequence(SEQ_VALSET_NONCE)?;
        let valset = Valset {
            nonce,
            height,
            members,
        };
        self.store.set_json(&valset_key(nonce), &valset)?;
        info!(
            nonce,
            height,
            members = valset.members.len(),
            total_power = valset.total_power(),
            "created valset"
        );
        Ok(valset)
    }

    pub fn valset(&self, nonce: u64) -> Result<Option<Valset>> {
        Ok(self.store.get_json(&valset_key(nonce))?)
    }

    /// The valset with the highest nonce.
    pub fn latest_valset(&self) -> Result<Option<Valset>> {
        self.store
            .scan_json(&[VALSETS], Order::Descending)?
            .next()
            .transpose()
            .map_err(Into::into)
    }

    /// Up to `count` of the most recent valsets, ordered by nonce descending.
    pub fn last_valsets(&self, count: usize) -> Result<Vec<Valset>> {
        self.valsets_before(None, count)
    }

    /// Up to `count` valsets with a nonce below `before`, ordered by nonce descending. Without `before`, starts from
    /// the most recent valset.
    pub fn valsets_before(&self, before: Option<u64>, count: usize) -> Result<Vec<Valset>> {
        Ok(self
            .store
            .scan_json::<Valset>(&[VALSETS], Order::Descending)?
            .skip_while(|v| matches!((v, before), (Ok(v), Some(b)) if v.nonce >= b))
            .take(count)
            .collect::<anyhow::Result<_>>()?)
    }

    /// Delete a valset and every confirmation of it. Returns whether the valset existed.
    pub fn delete_valset(&mut self, nonce: u64) -> Result<bool> {
        let key = valset_key(nonce);
        if !self.store.contains(&key)? {
            return Ok(false);
        }
        self.store.delete(&key)?;
        let confirms = self.delete_confirms::<ValsetConfirm>(&nonce)?;
        info!(nonce, confirms, "pruned valset");
        Ok(true)
    }
}
