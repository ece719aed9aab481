//! One-shot contract calls to be executed on Ethereum.
//!
//! A call is identified by its invalidation id and invalidation nonce. The Ethereum contract will only execute a call
//! whose nonce is greater than the last nonce it executed for that id, so a newer call supersedes older ones without
//! this registry deleting anything. Enforcing that a submitted nonce increases is the caller's job; see
//! [Keeper::last_invalidation_nonce].

use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    address::EthAddress,
    confirm::LogicCallConfirm,
    db::{KeyBuilder, KvStore, KvStoreExt, LAST_INVALIDATION_NONCE, LOGIC_CALLS, Order},
    error::{PeggyError, Result},
    keeper::Keeper,
    token::Erc20Token,
};

/// Maximum length of an invalidation id. The Ethereum contract stores it as a `bytes32`.
pub const MAX_INVALIDATION_ID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicCallKey {
    pub invalidation_id: Bytes,
    pub invalidation_nonce: u64,
}

impl LogicCallKey {
    pub fn new(invalidation_id: impl Into<Bytes>, invalidation_nonce: u64) -> Self {
        LogicCallKey {
            invalidation_id: invalidation_id.into(),
            invalidation_nonce,
        }
    }

    pub(crate) fn encode(&self, key: KeyBuilder) -> KeyBuilder {
        key.bytes(&self.invalidation_id).u64(self.invalidation_nonce)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingLogicCall {
    pub transfers: Vec<Erc20Token>,
    pub fees: Vec<Erc20Token>,
    pub logic_contract_address: EthAddress,
    pub payload: Bytes,
    /// An Ethereum block height after which the call can no longer be executed. Not interpreted here.
    pub timeout: u64,
    pub invalidation_id: Bytes,
    pub invalidation_nonce: u64,
}

impl OutgoingLogicCall {
    pub fn key(&self) -> LogicCallKey {
        LogicCallKey {
            invalidation_id: self.invalidation_id.clone(),
            invalidation_nonce: self.invalidation_nonce,
        }
    }
}

pub fn validate_invalidation_id(invalidation_id: &[u8]) -> Result<()> {
    if invalidation_id.is_empty() || invalidation_id.len() > MAX_INVALIDATION_ID_LEN {
        return Err(PeggyError::invalid(
            "invalidation_id",
            format!(
                "must be 1 to {MAX_INVALIDATION_ID_LEN} bytes, got {}",
                invalidation_id.len()
            ),
        ));
    }
    Ok(())
}

fn logic_call_key(key: &LogicCallKey) -> Vec<u8> {
    key.encode(KeyBuilder::table(LOGIC_CALLS)).build()
}

fn last_invalidation_nonce_key(invalidation_id: &[u8]) -> Vec<u8> {
    KeyBuilder::table(LAST_INVALIDATION_NONCE)
        .bytes(invalidation_id)
        .build()
}

impl<S: KvStore> Keeper<S> {
    /// Store `call`, replacing any call with the same invalidation id and nonce.
    pub fn set_outgoing_logic_call(&mut self, call: &OutgoingLogicCall) -> Result<()> {
        validate_invalidation_id(&call.invalidation_id)?;
        self.store.set_json(&logic_call_key(&call.key()), call)?;
        info!(
            invalidation_id = %hex::encode(&call.invalidation_id),
            invalidation_nonce = call.invalidation_nonce,
            logic_contract = %call.logic_contract_address,
            "stored logic call"
        );
        Ok(())
    }

    pub fn get_outgoing_logic_call(&self, key: &LogicCallKey) -> Result<Option<OutgoingLogicCall>> {
        if validate_invalidation_id(&key.invalidation_id).is_err() {
            // Such a call could never have been stored.
            return Ok(None);
        }
        Ok(self.store.get_json(&logic_call_key(key))?)
    }

    /// Delete a logic call and every confirmation of it. Returns whether the call existed.
    pub fn delete_outgoing_logic_call(&mut self, key: &LogicCallKey) -> Result<bool> {
        validate_invalidation_id(&key.invalidation_id)?;
        let store_key = logic_call_key(key);
        if !self.store.contains(&store_key)? {
            return Ok(false);
        }
        self.store.delete(&store_key)?;
        let confirms = self.delete_confirms::<LogicCallConfirm>(key)?;
        debug!(
            invalidation_id = %hex::encode(&key.invalidation_id),
            invalidation_nonce = key.invalidation_nonce,
            confirms,
            "deleted logic call"
        );
        Ok(true)
    }

    /// Up to `count` logic calls, in descending key order: by invalidation id (shorter ids first in ascending order),
    /// then by invalidation nonce.
    pub fn last_logic_calls(&self, count: usize) -> Result<Vec<OutgoingLogicCall>> {
        self.logic_calls_before(None, count)
    }

    /// Up to `count` logic calls stored before `before` in descending key order. `before` need not exist.
    pub fn logic_calls_before(
        &self,
        before: Option<&LogicCallKey>,
        count: usize,
    ) -> Result<Vec<OutgoingLogicCall>> {
        if let Some(before) = before {
            validate_invalidation_id(&before.invalidation_id)?;
        }
        let before = before.map(logic_call_key);
        Ok(self
            .store
            .scan_json::<OutgoingLogicCall>(&[LOGIC_CALLS], Order::Descending)?
            .skip_while(|call| match (call, &before) {
                (Ok(call), Some(before)) => logic_call_key(&call.key()) >= *before,
                _ => false,
            })
            .take(count)
            .collect::<anyhow::Result<_>>()?)
    }

    /// The highest invalidation nonce accepted for `invalidation_id`, if any call with that id has been accepted.
    pub fn last_invalidation_nonce(&self, invalidation_id: &[u8]) -> Result<Option<u64>> {
        validate_invalidation_id(invalidation_id)?;
        Ok(self
            .store
            .get_u64(&last_invalidation_nonce_key(invalidation_id))?)
    }

    pub fn set_last_invalidation_nonce(&mut self, invalidation_id: &[u8], nonce: u64) -> Result<()> {
        validate_invalidation_id(invalidation_id)?;
        self.store
            .set_u64(&last_invalidation_nonce_key(invalidation_id), nonce)?;
        Ok(())
    }
}
