use std::collections::BTreeMap;

use alloy::primitives::U256;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    address::{CosmosAddress, EthAddress},
    db::{
        KeyBuilder, KvStore, KvStoreExt, OUTGOING_POOL, Order, POOL_FEE_INDEX, SEQ_OUTGOING_TX_ID,
        decode_u64,
    },
    error::{PeggyError, Result},
    external::BankKeeper,
    keeper::Keeper,
    token::{Coin, Erc20Token},
};

/// A request to send tokens to an Ethereum address, waiting to be included in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTransferTx {
    pub id: u64,
    pub sender: CosmosAddress,
    pub dest_address: EthAddress,
    /// The native denom escrowed for the amount and fee. A cancelled transfer is refunded in it.
    pub denom: String,
    pub erc20_token: Erc20Token,
    /// Always for the same contract as `erc20_token`.
    pub erc20_fee: Erc20Token,
}

/// The fees a batch of every pooled transfer of one token would pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFees {
    pub token: EthAddress,
    pub total_fees: U256,
    pub tx_count: u64,
}

fn pool_key(id: u64) -> Vec<u8> {
    KeyBuilder::table(OUTGOING_POOL).u64(id).build()
}

/// Entries of the fee index are sorted by contract, then by fee, then by *reverse* id. A descending scan over one
/// contract therefore yields the highest fee first, and for equal fees the oldest transfer first.
fn fee_index_key(tx: &OutgoingTransferTx) -> Vec<u8> {
    KeyBuilder::table(POOL_FEE_INDEX)
        .eth(&tx.erc20_fee.contract)
        .u256(tx.erc20_fee.amount)
        .u64(u64::MAX - tx.id)
        .build()
}

fn fee_index_prefix(contract: &EthAddress) -> Vec<u8> {
    KeyBuilder::table(POOL_FEE_INDEX).eth(contract).build()
}

impl<S: KvStore> Keeper<S> {
    /// Escrow `amount` and `fee` from `sender` and add a transfer of `amount` to `dest_address` to the pool. Returns
    /// the new transfer's id.
    ///
    /// Both coins must be of the same denom, and that denom must be bridgeable, either by an explicit mapping or as a
    /// voucher for an Ethereum token.
    pub fn add_to_outgoing_pool(
        &mut self,
        bank: &mut dyn BankKeeper,
        sender: &CosmosAddress,
        dest_address: EthAddress,
        amount: &Coin,
        fee: &Coin,
    ) -> Result<u64> {
        if amount.denom != fee.denom {
            return Err(PeggyError::invalid(
                "fee",
                format!(
                    "fee denom {} differs from amount denom {}",
                    fee.denom, amount.denom
                ),
            ));
        }
        if amount.amount.is_zero() {
            return Err(PeggyError::invalid("amount", "must be positive"));
        }
        let Some(mapping) = self.denom_to_erc20(&amount.denom)? else {
            return Err(PeggyError::invalid(
                "amount",
                format!("denom {} cannot be bridged", amount.denom),
            ));
        };
        let total = amount
            .amount
            .checked_add(fee.amount)
            .ok_or_else(|| PeggyError::invalid("fee", "amount plus fee overflows"))?;

        bank.escrow(sender, &Coin::new(total, amount.denom.clone()))?;

        let id = self.next_sequence(SEQ_OUTGOING_TX_ID)?;
        let tx = OutgoingTransferTx {
            id,
            sender: *sender,
            dest_address,
            denom: amount.denom.clone(),
            erc20_token: Erc20Token::new(amount.amount, mapping.erc20),
            erc20_fee: Erc20Token::new(fee.amount, mapping.erc20),
        };
        self.insert_pool_entry(&tx)?;
        info!(
            id,
            %sender,
            %dest_address,
            token = %mapping.erc20,
            amount = %amount.amount,
            fee = %fee.amount,
            "added transfer to outgoing pool"
        );
        Ok(id)
    }

    /// Write `tx` and its fee index entry.
    pub(crate) fn insert_pool_entry(&mut self, tx: &OutgoingTransferTx) -> Result<()> {
        self.store.set_json(&pool_key(tx.id), tx)?;
        self.store
            .set_u64(&fee_index_key(tx), tx.id)?;
        Ok(())
    }

    /// A transfer which is still in the pool.
    pub fn outgoing_tx(&self, id: u64) -> Result<Option<OutgoingTransferTx>> {
        Ok(self.store.get_json(&pool_key(id))?)
    }

    /// Remove the given transfers from the pool and return them, in the order given. Fails if any of them is not in
    /// the pool.
    pub fn remove_from_outgoing_pool(&mut self, ids: &[u64]) -> Result<Vec<OutgoingTransferTx>> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            let tx = self.outgoing_tx(*id)?.ok_or_else(|| {
                PeggyError::Precondition(format!("transfer {id} is not in the outgoing pool"))
            })?;
            self.store.delete(&pool_key(tx.id))?;
            self.store.delete(&fee_index_key(&tx))?;
            removed.push(tx);
        }
        debug!(?ids, "removed transfers from outgoing pool");
        Ok(removed)
    }

    /// Every pooled transfer of `contract`, highest fee first, then oldest first.
    pub fn pool_transactions(&self, contract: &EthAddress) -> Result<Vec<OutgoingTransferTx>> {
        self.best_pool_transactions(contract, usize::MAX)
    }

    /// The first `limit` transfers of [Keeper::pool_transactions].
    pub fn best_pool_transactions(
        &self,
        contract: &EthAddress,
        limit: usize,
    ) -> Result<Vec<OutgoingTransferTx>> {
        self.store
            .scan(&fee_index_prefix(contract), Order::Descending)?
            .take(limit)
            .map(|kv| -> Result<OutgoingTransferTx> {
                let (key, value) = kv?;
                let id = decode_u64(&value)?;
                let tx = self.outgoing_tx(id)?.ok_or_else(|| {
                    anyhow!(
                        "fee index entry {} points to missing transfer {id}",
                        hex::encode(key)
                    )
                })?;
                Ok(tx)
            })
            .collect()
    }

    /// Every pooled transfer, ordered by id.
    pub fn all_pool_transactions(&self) -> Result<Vec<OutgoingTransferTx>> {
        Ok(self
            .store
            .scan_json(&[OUTGOING_POOL], Order::Ascending)?
            .collect::<anyhow::Result<_>>()?)
    }

    /// Every pooled transfer sent by `sender`, ordered by id.
    pub fn pool_transactions_by_sender(
        &self,
        sender: &CosmosAddress,
    ) -> Result<Vec<OutgoingTransferTx>> {
        let mut txs = self.all_pool_transactions()?;
        txs.retain(|tx| tx.sender == *sender);
        Ok(txs)
    }

    /// Withdraw a transfer which has not been batched yet, refunding its amount and fee to the sender in the denom
    /// they were escrowed in.
    pub fn cancel_send_to_eth(
        &mut self,
        bank: &mut dyn BankKeeper,
        sender: &CosmosAddress,
        id: u64,
    ) -> Result<OutgoingTransferTx> {
        let Some(tx) = self.outgoing_tx(id)? else {
            return Err(PeggyError::Precondition(format!(
                "transfer {id} is not in the outgoing pool; it is unknown or already batched"
            )));
        };
        if tx.sender != *sender {
            return Err(PeggyError::Precondition(format!(
                "transfer {id} was sent by {}, not {sender}",
                tx.sender
            )));
        }
        let refund = tx
            .erc20_token
            .amount
            .checked_add(tx.erc20_fee.amount)
            .ok_or_else(|| anyhow!("transfer {id} amount plus fee overflows"))?;

        self.remove_from_outgoing_pool(&[id])?;
        bank.refund(sender, &Coin::new(refund, tx.denom.clone()))?;
        info!(id, %sender, %refund, denom = %tx.denom, "cancelled transfer");
        Ok(tx)
    }

    /// For each token with pooled transfers, the total fees and the number of transfers. Ordered by token contract.
    pub fn batch_fees(&self) -> Result<Vec<BatchFees>> {
        let mut fees: BTreeMap<EthAddress, BatchFees> = BTreeMap::new();
        for tx in self.all_pool_transactions()? {
            let entry = fees.entry(tx.erc20_fee.contract).or_insert(BatchFees {
                token: tx.erc20_fee.contract,
                total_fees: U256::ZERO,
                tx_count: 0,
            });
            entry.total_fees = entry.total_fees.saturating_add(tx.erc20_fee.amount);
            entry.tx_count += 1;
        }
        Ok(fees.into_values().collect())
    }
}
