//! Key layout of every logical table.
//!
//! Each key starts with a one byte table prefix. Integers are fixed-width big-endian, so that byte order matches
//! numeric order and "last N" queries are a reverse prefix scan. Addresses are their raw 20 bytes. Variable-length
//! byte strings are prefixed with their length, so that no key of one subject can be a prefix of another subject's
//! key.

use alloy::primitives::U256;

use crate::address::{CosmosAddress, EthAddress};

// eth_address: validator -> ethereum address
// eth_address_owner: ethereum address -> validator
// valsets: nonce -> valset
// valset_confirms: nonce, orchestrator -> confirm
// outgoing_pool: id -> transfer
// pool_fee_index: token contract, fee, !id -> id
// batches: nonce, token contract -> batch
// batch_confirms: nonce, token contract, orchestrator -> confirm
// logic_calls: invalidation id, invalidation nonce -> call
// logic_call_confirms: invalidation id, invalidation nonce, orchestrator -> confirm
// denom_to_erc20: origin, denom -> mapping
// erc20_to_denom: origin, contract -> mapping
// sequences: name -> last issued value
// last_invalidation_nonce: invalidation id -> nonce
pub const ETH_ADDRESS: u8 = 0x01;
pub const ETH_ADDRESS_OWNER: u8 = 0x02;
pub const VALSETS: u8 = 0x03;
pub const VALSET_CONFIRMS: u8 = 0x04;
pub const OUTGOING_POOL: u8 = 0x05;
pub const POOL_FEE_INDEX: u8 = 0x06;
pub const BATCHES: u8 = 0x07;
pub const BATCH_CONFIRMS: u8 = 0x08;
pub const LOGIC_CALLS: u8 = 0x09;
pub const LOGIC_CALL_CONFIRMS: u8 = 0x0a;
pub const DENOM_TO_ERC20: u8 = 0x0b;
pub const ERC20_TO_DENOM: u8 = 0x0c;
pub const SEQUENCES: u8 = 0x0d;
pub const LAST_INVALIDATION_NONCE: u8 = 0x0e;

pub const SEQ_VALSET_NONCE: &[u8] = b"valset_nonce";
pub const SEQ_OUTGOING_TX_ID: &[u8] = b"outgoing_tx_id";
pub const SEQ_BATCH_NONCE: &[u8] = b"batch_nonce";

/// Incrementally builds a key. Every `push_*` appends a fixed-width or self-delimiting component.
#[derive(Debug, Clone)]
pub struct KeyBuilder(Vec<u8>);

impl KeyBuilder {
    pub fn table(prefix: u8) -> Self {
        KeyBuilder(vec![prefix])
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u256(mut self, value: U256) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes::<32>());
        self
    }

    pub fn cosmos(mut self, address: &CosmosAddress) -> Self {
        self.0.extend_from_slice(address.as_bytes());
        self
    }

    pub fn eth(mut self, address: &EthAddress) -> Self {
        self.0.extend_from_slice(address.as_slice());
        self
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.0.push(value as u8);
        self
    }

    /// A variable-length byte string of at most 255 bytes, prefixed with its length.
    ///
    /// # Panics
    ///
    /// If `value` is longer than 255 bytes. Callers validate lengths before building keys.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        let Ok(len) = u8::try_from(value.len()) else {
            panic!("key component of {} bytes exceeds 255", value.len());
        };
        self.0.push(len);
        self.0.extend_from_slice(value);
        self
    }

    pub fn raw(mut self, value: &[u8]) -> Self {
        self.0.extend_from_slice(value);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

pub fn sequence_key(name: &[u8]) -> Vec<u8> {
    KeyBuilder::table(SEQUENCES).raw(name).build()
}
