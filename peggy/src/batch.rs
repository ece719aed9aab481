//! Outgoing transaction batches.
//!
//! A batch takes the highest paying pooled transfers of one token and packages them for a single submission to the
//! Ethereum contract. Batch nonces come from one sequence shared by every token, so a nonce alone identifies a batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    address::EthAddress,
    confirm::BatchConfirm,
    db::{BATCHES, KeyBuilder, KvStore, KvStoreExt, Order, SEQ_BATCH_NONCE},
    error::{PeggyError, Result},
    keeper::Keeper,
    pool::OutgoingTransferTx,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTxBatch {
    pub batch_nonce: u64,
    /// Height of the block the batch was built in.
    pub block: u64,
    pub token_contract: EthAddress,
    /// Highest fee first, then oldest first.
    pub transactions: Vec<OutgoingTransferTx>,
}

fn batch_key(nonce: u64, token_contract: &EthAddress) -> Vec<u8> {
    KeyBuilder::table(BATCHES)
        .u64(nonce)
        .eth(token_contract)
        .build()
}

impl<S: KvStore> Keeper<S> {
    /// Move up to `max_size` of the best pooled transfers of `token_contract` into a new batch. Returns `None`, and
    /// changes nothing, if there are no pooled transfers of that token.
    pub fn build_outgoing_tx_batch(
        &mut self,
        height: u64,
        token_contract: EthAddress,
        max_size: usize,
    ) -> Result<Option<OutgoingTxBatch>> {
        if max_size == 0 {
            return Err(PeggyError::invalid("max_size", "must be positive"));
        }
        let selected = self.best_pool_transactions(&token_contract, max_size)?;
        if selected.is_empty() {
            debug!(%token_contract, "no transfers to batch");
            return Ok(None);
        }
        let ids: Vec<_> = selected.iter().map(|tx| tx.id).collect();
        let transactions = self.remove_from_outgoing_pool(&ids)?;

        let batch_nonce = self.next_sequence(SEQ_BATCH_NONCE)?;
        let nonce_prefix = KeyBuilder::table(BATCHES).u64(batch_nonce).build();
        if self
            .store
            .scan(&nonce_prefix, Order::Ascending)?
            .next()
            .is_some()
        {
            panic!("batch nonce {batch_nonce} is already in use");
        }

        let batch = OutgoingTxBatch {
            batch_nonce,
            block: height,
            token_contract,
            transactions,
        };
        self.store
            .set_json(&batch_key(batch_nonce, &token_contract), &batch)?;
        info!(
            batch_nonce,
            height,
            %token_contract,
            ?ids,
            "created batch"
        );
        Ok(Some(batch))
    }

    pub fn get_outgoing_tx_batch(
        &self,
        token_contract: &EthAddress,
        nonce: u64,
    ) -> Result<Option<OutgoingTxBatch>> {
        Ok(self.store.get_json(&batch_key(nonce, token_contract))?)
    }

    /// Up to `count` of the most recent batches, by nonce descending. If `token_contract` is given, only batches of
    /// that token are returned.
    pub fn last_batches(
        &self,
        count: usize,
        token_contract: Option<&EthAddress>,
    ) -> Result<Vec<OutgoingTxBatch>> {
        self.batches_before(None, count, token_contract)
    }

    /// Like [Keeper::last_batches], but only batches with a nonce below `before`.
    pub fn batches_before(
        &self,
        before: Option<u64>,
        count: usize,
        token_contract: Option<&EthAddress>,
    ) -> Result<Vec<OutgoingTxBatch>> {
        let mut batches = Vec::new();
        for batch in self
            .store
            .scan_json::<OutgoingTxBatch>(&[BATCHES], Order::Descending)?
        {
            if batches.len() >= count {
                break;
            }
            let batch = batch?;
            if before.is_some_and(|b| batch.batch_nonce >= b) {
                continue;
            }
            if token_contract.is_none_or(|c| *c == batch.token_contract) {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    /// Every batch, by nonce ascending.
    pub fn all_batches(&self) -> Result<Vec<OutgoingTxBatch>> {
        Ok(self
            .store
            .scan_json(&[BATCHES], Order::Ascending)?
            .collect::<anyhow::Result<_>>()?)
    }

    /// Cancel a batch which will never execute on Ethereum. Its transfers return to the pool with their original ids
    /// and fees, and the batch and its confirmations are deleted.
    pub fn cancel_outgoing_tx_batch(
        &mut self,
        token_contract: &EthAddress,
        nonce: u64,
    ) -> Result<OutgoingTxBatch> {
        let Some(batch) = self.get_outgoing_tx_batch(token_contract, nonce)? else {
            return Err(PeggyError::Precondition(format!(
                "no batch {nonce} for token {token_contract}"
            )));
        };
        for tx in &batch.transactions {
            self.insert_pool_entry(tx)?;
        }
        self.store.delete(&batch_key(nonce, token_contract))?;
        let confirms = self.delete_confirms::<BatchConfirm>(&(nonce, *token_contract))?;
        info!(
            batch_nonce = nonce,
            %token_contract,
            returned = batch.transactions.len(),
            confirms,
            "cancelled batch"
        );
        Ok(batch)
    }
}
