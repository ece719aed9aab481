//! The mapping between Ethereum token contracts and native denominations.
//!
//! Explicit mappings are set by governance or genesis. The latest mapping of a denom or contract replaces any earlier
//! one in either origin class, so the explicit mappings form one bijection. Any Ethereum token without an explicit
//! mapping is still bridgeable: it is represented natively by a voucher denom derived from its contract address.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    address::EthAddress,
    db::{DENOM_TO_ERC20, ERC20_TO_DENOM, KeyBuilder, KvStore, KvStoreExt},
    error::{PeggyError, Result},
    keeper::Keeper,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMapping {
    pub denom: String,
    pub erc20: EthAddress,
    /// Whether the native chain is the asset's issuer. If not, the native denom is a voucher for an Ethereum token.
    pub cosmos_originated: bool,
}

/// Checks `denom` has the shape of a native denomination: 3 to 128 characters, starting with a letter, made of
/// letters, digits and `/:._-`.
pub fn validate_denom(denom: &str) -> Result<()> {
    let valid_len = (3..=128).contains(&denom.len());
    let mut chars = denom.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_rest =
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
    if valid_len && valid_start && valid_rest {
        Ok(())
    } else {
        Err(PeggyError::invalid(
            "denom",
            format!("{denom:?} is not a valid denomination"),
        ))
    }
}

fn denom_key(cosmos_originated: bool, denom: &str) -> Vec<u8> {
    KeyBuilder::table(DENOM_TO_ERC20)
        .flag(cosmos_originated)
        .bytes(denom.as_bytes())
        .build()
}

fn erc20_key(cosmos_originated: bool, erc20: &EthAddress) -> Vec<u8> {
    KeyBuilder::table(ERC20_TO_DENOM)
        .flag(cosmos_originated)
        .eth(erc20)
        .build()
}

impl<S: KvStore> Keeper<S> {
    /// Map `denom` to `erc20` within the given origin class. Any existing mapping of either side, in either class, is
    /// replaced.
    pub fn set_asset_mapping(
        &mut self,
        denom: &str,
        erc20: EthAddress,
        cosmos_originated: bool,
    ) -> Result<()> {
        validate_denom(denom)?;
        let mapping = AssetMapping {
            denom: denom.to_owned(),
            erc20,
            cosmos_originated,
        };

        for class in [true, false] {
            let by_denom: Option<AssetMapping> = self.store.get_json(&denom_key(class, denom))?;
            let by_erc20: Option<AssetMapping> = self
                .store
                .get_json::<AssetMapping>(&erc20_key(class, &erc20))?
                .filter(|m| Some(m) != by_denom.as_ref());
            for previous in by_denom.into_iter().chain(by_erc20) {
                if previous == mapping {
                    continue;
                }
                self.remove_asset_mapping(&previous)?;
                warn!(
                    old_denom = %previous.denom,
                    old_erc20 = %previous.erc20,
                    old_cosmos_originated = previous.cosmos_originated,
                    denom,
                    %erc20,
                    cosmos_originated,
                    "replaced asset mapping"
                );
            }
        }

        self.store
            .set_json(&denom_key(cosmos_originated, denom), &mapping)?;
        self.store
            .set_json(&erc20_key(cosmos_originated, &erc20), &mapping)?;
        debug!(denom, %erc20, cosmos_originated, "set asset mapping");
        Ok(())
    }

    fn remove_asset_mapping(&mut self, mapping: &AssetMapping) -> Result<()> {
        self.store
            .delete(&denom_key(mapping.cosmos_originated, &mapping.denom))?;
        self.store
            .delete(&erc20_key(mapping.cosmos_originated, &mapping.erc20))?;
        Ok(())
    }

    /// The explicit mapping of `erc20`, if any.
    pub fn denom_of(&self, erc20: &EthAddress) -> Result<Option<AssetMapping>> {
        for cosmos_originated in [true, false] {
            if let Some(mapping) = self.store.get_json(&erc20_key(cosmos_originated, erc20))? {
                return Ok(Some(mapping));
            }
        }
        Ok(None)
    }

    /// The explicit mapping of `denom`, if any.
    pub fn contract_of(&self, denom: &str) -> Result<Option<AssetMapping>> {
        if validate_denom(denom).is_err() {
            return Ok(None);
        }
        for cosmos_originated in [true, false] {
            if let Some(mapping) = self.store.get_json(&denom_key(cosmos_originated, denom))? {
                return Ok(Some(mapping));
            }
        }
        Ok(None)
    }

    /// The voucher denom representing the Ethereum token `erc20` natively.
    pub fn voucher_denom(&self, erc20: &EthAddress) -> String {
        format!(
            "{}0x{}",
            self.config.voucher_denom_prefix,
            hex::encode(erc20.as_slice())
        )
    }

    /// The token contract a voucher denom stands for, or `None` if `denom` is not a voucher denom.
    pub fn parse_voucher_denom(&self, denom: &str) -> Option<EthAddress> {
        let hex = denom
            .strip_prefix(self.config.voucher_denom_prefix.as_str())?
            .strip_prefix("0x")?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes).ok()?;
        Some(EthAddress::from(bytes))
    }

    /// How `erc20` is represented natively: its explicit mapping, or else its voucher denom.
    pub fn erc20_to_denom(&self, erc20: &EthAddress) -> Result<AssetMapping> {
        if let Some(mapping) = self.denom_of(erc20)? {
            return Ok(mapping);
        }
        Ok(AssetMapping {
            denom: self.voucher_denom(erc20),
            erc20: *erc20,
            cosmos_originated: false,
        })
    }

    /// The Ethereum token `denom` is bridged as: its explicit mapping, or the contract its voucher denom encodes. A
    /// voucher denom for a contract with an explicit mapping is not bridgeable, so each contract has exactly one
    /// native denom.
    pub fn denom_to_erc20(&self, denom: &str) -> Result<Option<AssetMapping>> {
        if let Some(mapping) = self.contract_of(denom)? {
            return Ok(Some(mapping));
        }
        let Some(erc20) = self.parse_voucher_denom(denom) else {
            return Ok(None);
        };
        if let Some(mapping) = self.denom_of(&erc20)? {
            debug!(denom, mapped = %mapping.denom, "voucher denom shadowed by explicit mapping");
            return Ok(None);
        }
        Ok(Some(AssetMapping {
            denom: denom.to_owned(),
            erc20,
            cosmos_originated: false,
        }))
    }
}
