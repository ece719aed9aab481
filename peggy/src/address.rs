//! Addresses on both sides of the bridge.
//!
//! Ethereum addresses are plain [alloy::primitives::Address]es. Native addresses are 20-byte account addresses,
//! rendered as bech32 strings with the `cosmos` human readable part.

use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub use alloy::primitives::Address as EthAddress;

/// Human readable part of every native account address.
pub const ACCOUNT_HRP: Hrp = Hrp::parse_unchecked("cosmos");

/// Length in bytes of a native account address.
pub const ADDRESS_LEN: usize = 20;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid bech32 address {0:?}: {1}")]
    Bech32(String, String),
    #[error("address {address:?} has prefix {found:?}, expected \"cosmos\"")]
    WrongPrefix { address: String, found: String },
    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid ethereum address {0:?}")]
    InvalidEthAddress(String),
}

/// A native chain account address. Validators and orchestrators are identified by these.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CosmosAddress([u8; ADDRESS_LEN]);

impl CosmosAddress {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        CosmosAddress(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(CosmosAddress(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl FromStr for CosmosAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| AddressError::Bech32(s.to_owned(), e.to_string()))?;
        if hrp != ACCOUNT_HRP {
            return Err(AddressError::WrongPrefix {
                address: s.to_owned(),
                found: hrp.to_string(),
            });
        }
        CosmosAddress::from_slice(&data)
    }
}

impl Display for CosmosAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let encoded = bech32::encode::<Bech32>(ACCOUNT_HRP, &self.0).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl Debug for CosmosAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for CosmosAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CosmosAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

/// Parse a hex Ethereum address, with or without the `0x` prefix. Checksums are not enforced.
pub fn parse_eth_address(s: &str) -> Result<EthAddress, AddressError> {
    s.trim()
        .parse()
        .map_err(|_| AddressError::InvalidEthAddress(s.to_owned()))
}
