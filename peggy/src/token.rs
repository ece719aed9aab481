use std::fmt::{self, Display, Formatter};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::address::EthAddress;

/// An amount of an ERC20 token, identified by its contract on Ethereum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Token {
    pub contract: EthAddress,
    pub amount: U256,
}

impl Erc20Token {
    pub fn new(amount: U256, contract: EthAddress) -> Self {
        Erc20Token { contract, amount }
    }
}

/// An amount of a native denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: U256,
}

impl Coin {
    pub fn new(amount: U256, denom: impl Into<String>) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }
}

impl Display for Coin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}
