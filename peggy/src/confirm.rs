//! Validator signatures over valsets, batches and logic calls.
//!
//! All three kinds share one shape and one storage layout: `table | subject | orchestrator`. Orchestrator addresses
//! are fixed width, so a prefix scan over `table | subject` yields every confirmation of a subject, ordered by
//! orchestrator address. Each (subject, orchestrator) pair holds at most one record; a later submission replaces the
//! earlier one.

use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    address::{CosmosAddress, EthAddress},
    db::{
        BATCH_CONFIRMS, KeyBuilder, KvStore, KvStoreExt, LOGIC_CALL_CONFIRMS, Order,
        VALSET_CONFIRMS,
    },
    error::Result,
    keeper::Keeper,
    logic_call::LogicCallKey,
};

/// A signature by a validator's orchestrator over some subject.
pub trait Confirmation: Serialize + DeserializeOwned {
    /// Identifies the thing being signed.
    type Subject;

    /// Human readable name, used in logs and errors.
    const KIND: &'static str;

    /// Table prefix this kind of confirmation is stored under.
    const TABLE: u8;

    /// Append the encoding of `subject` to `key`. The encoding must be self-delimiting.
    fn encode_subject(subject: &Self::Subject, key: KeyBuilder) -> KeyBuilder;

    fn subject(&self) -> Self::Subject;

    fn orchestrator(&self) -> &CosmosAddress;

    /// The Ethereum address whose key produced [Self::signature].
    fn eth_signer(&self) -> &EthAddress;

    fn signature(&self) -> &Bytes;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetConfirm {
    pub nonce: u64,
    pub orchestrator: CosmosAddress,
    pub eth_signer: EthAddress,
    pub signature: Bytes,
}

impl Confirmation for ValsetConfirm {
    type Subject = u64;
    const KIND: &'static str = "valset";
    const TABLE: u8 = VALSET_CONFIRMS;

    fn encode_subject(nonce: &u64, key: KeyBuilder) -> KeyBuilder {
        key.u64(*nonce)
    }

    fn subject(&self) -> u64 {
        self.nonce
    }

    fn orchestrator(&self) -> &CosmosAddress {
        &self.orchestrator
    }

    fn eth_signer(&self) -> &EthAddress {
        &self.eth_signer
    }

    fn signature(&self) -> &Bytes {
        &self.signature
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfirm {
    pub nonce: u64,
    pub token_contract: EthAddress,
    pub orchestrator: CosmosAddress,
    pub eth_signer: EthAddress,
    pub signature: Bytes,
}

impl Confirmation for BatchConfirm {
    /// `(batch nonce, token contract)`
    type Subject = (u64, EthAddress);
    const KIND: &'static str = "batch";
    const TABLE: u8 = BATCH_CONFIRMS;

    fn encode_subject((nonce, token_contract): &(u64, EthAddress), key: KeyBuilder) -> KeyBuilder {
        key.u64(*nonce).eth(token_contract)
    }

    fn subject(&self) -> (u64, EthAddress) {
        (self.nonce, self.token_contract)
    }

    fn orchestrator(&self) -> &CosmosAddress {
        &self.orchestrator
    }

    fn eth_signer(&self) -> &EthAddress {
        &self.eth_signer
    }

    fn signature(&self) -> &Bytes {
        &self.signature
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicCallConfirm {
    pub invalidation_id: Bytes,
    pub invalidation_nonce: u64,
    pub orchestrator: CosmosAddress,
    pub eth_signer: EthAddress,
    pub signature: Bytes,
}

impl Confirmation for LogicCallConfirm {
    type Subject = LogicCallKey;
    const KIND: &'static str = "logic call";
    const TABLE: u8 = LOGIC_CALL_CONFIRMS;

    fn encode_subject(subject: &LogicCallKey, key: KeyBuilder) -> KeyBuilder {
        subject.encode(key)
    }

    fn subject(&self) -> LogicCallKey {
        LogicCallKey {
            invalidation_id: self.invalidation_id.clone(),
            invalidation_nonce: self.invalidation_nonce,
        }
    }

    fn orchestrator(&self) -> &CosmosAddress {
        &self.orchestrator
    }

    fn eth_signer(&self) -> &EthAddress {
        &self.eth_signer
    }

    fn signature(&self) -> &Bytes {
        &self.signature
    }
}

fn subject_prefix<C: Confirmation>(subject: &C::Subject) -> KeyBuilder {
    C::encode_subject(subject, KeyBuilder::table(C::TABLE))
}

fn confirm_key<C: Confirmation>(subject: &C::Subject, orchestrator: &CosmosAddress) -> Vec<u8> {
    subject_prefix::<C>(subject).cosmos(orchestrator).build()
}

impl<S: KvStore> Keeper<S> {
    /// Store `confirm`, replacing any earlier confirmation of the same subject by the same orchestrator. Returns the
    /// key the confirmation was stored under.
    pub fn set_confirm<C: Confirmation>(&mut self, confirm: &C) -> Result<Vec<u8>> {
        let key = confirm_key::<C>(&confirm.subject(), confirm.orchestrator());
        let replaced = self.store.contains(&key)?;
        self.store.set_json(&key, confirm)?;
        debug!(
            kind = C::KIND,
            orchestrator = %confirm.orchestrator(),
            eth_signer = %confirm.eth_signer(),
            replaced,
            "stored confirmation"
        );
        Ok(key)
    }

    pub fn get_confirm<C: Confirmation>(
        &self,
        subject: &C::Subject,
        orchestrator: &CosmosAddress,
    ) -> Result<Option<C>> {
        Ok(self
            .store
            .get_json(&confirm_key::<C>(subject, orchestrator))?)
    }

    pub fn has_confirm<C: Confirmation>(
        &self,
        subject: &C::Subject,
        orchestrator: &CosmosAddress,
    ) -> Result<bool> {
        Ok(self
            .store
            .contains(&confirm_key::<C>(subject, orchestrator))?)
    }

    /// Every confirmation of `subject`, ordered by orchestrator address.
    pub fn confirms<C: Confirmation>(&self, subject: &C::Subject) -> Result<Vec<C>> {
        let prefix = subject_prefix::<C>(subject).build();
        Ok(self
            .store
            .scan_json(&prefix, Order::Ascending)?
            .collect::<anyhow::Result<_>>()?)
    }

    /// Delete every confirmation of `subject`. Returns the number deleted.
    pub fn delete_confirms<C: Confirmation>(&mut self, subject: &C::Subject) -> Result<usize> {
        let prefix = subject_prefix::<C>(subject).build();
        let keys: Vec<_> = self
            .store
            .scan(&prefix, Order::Ascending)?
            .map(|kv| kv.map(|(key, _)| key))
            .collect::<anyhow::Result<_>>()?;
        for key in &keys {
            self.store.delete(key)?;
        }
        Ok(keys.len())
    }
}
