//! Read-only views for off-chain orchestrators and relayers.
//!
//! [Querier] accepts the textual arguments an RPC front-end receives. Malformed arguments are rejected with an
//! [InputValidation](crate::error::ErrorKind::InputValidation) error before anything is read. Well-formed arguments
//! that match nothing give `Ok(None)` or an empty list. Every list has a fixed, documented order.

use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    address::{CosmosAddress, EthAddress, parse_eth_address},
    batch::OutgoingTxBatch,
    confirm::{BatchConfirm, Confirmation, LogicCallConfirm, ValsetConfirm},
    db::{BATCHES, KvStore, KvStoreExt, LOGIC_CALLS, Order, VALSETS},
    denom::{AssetMapping, validate_denom},
    error::{PeggyError, Result},
    keeper::Keeper,
    logic_call::{LogicCallKey, OutgoingLogicCall, validate_invalidation_id},
    pool::{BatchFees, OutgoingTransferTx},
    valset::Valset,
};

/// The requests in `requests` which `is_confirmed` says have not been confirmed yet, in the same order. Errors are
/// passed through.
pub fn pending<R>(
    requests: impl IntoIterator<Item = Result<R>>,
    mut is_confirmed: impl FnMut(&R) -> Result<bool>,
) -> impl Iterator<Item = Result<R>> {
    requests
        .into_iter()
        .filter_map(move |request| match request {
            Ok(request) => match is_confirmed(&request) {
                Ok(true) => None,
                Ok(false) => Some(Ok(request)),
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        })
}

/// Identifies the subject of a set of confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmSubject {
    Valset { nonce: u64 },
    Batch { nonce: u64, token_contract: EthAddress },
    LogicCall(LogicCallKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmRecord {
    Valset(ValsetConfirm),
    Batch(BatchConfirm),
    LogicCall(LogicCallConfirm),
}

impl ConfirmRecord {
    pub fn orchestrator(&self) -> &CosmosAddress {
        match self {
            ConfirmRecord::Valset(c) => c.orchestrator(),
            ConfirmRecord::Batch(c) => c.orchestrator(),
            ConfirmRecord::LogicCall(c) => c.orchestrator(),
        }
    }
}

/// A sender's transfers which have not executed on Ethereum yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSendToEth {
    /// Ordered by batch nonce, then by position within the batch.
    pub transfers_in_batches: Vec<OutgoingTransferTx>,
    /// Ordered by id.
    pub unbatched_transfers: Vec<OutgoingTransferTx>,
}

fn parse_nonce(field: &'static str, s: &str) -> Result<u64> {
    s.trim()
        .parse()
        .map_err(|_| PeggyError::invalid(field, format!("{s:?} is not a valid nonce")))
}

fn parse_cosmos_address(s: &str) -> Result<CosmosAddress> {
    Ok(s.trim().parse::<CosmosAddress>()?)
}

fn parse_eth(s: &str) -> Result<EthAddress> {
    Ok(parse_eth_address(s)?)
}

/// Invalidation ids are given as hex, with or without a `0x` prefix.
fn parse_invalidation_id(s: &str) -> Result<Bytes> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").unwrap_or(s);
    let id = hex::decode(hex).map_err(|e| {
        PeggyError::invalid("invalidation_id", format!("{s:?} is not valid hex: {e}"))
    })?;
    validate_invalidation_id(&id)?;
    Ok(id.into())
}

pub struct Querier<'a, S> {
    keeper: &'a Keeper<S>,
}

impl<'a, S: KvStore> Querier<'a, S> {
    pub fn new(keeper: &'a Keeper<S>) -> Self {
        Querier { keeper }
    }

    /// Clamp a caller supplied limit to a configured maximum.
    fn limit(requested: Option<usize>, max: usize) -> usize {
        requested.map_or(max, |r| r.min(max))
    }

    /// The most recent valset.
    pub fn current_valset(&self) -> Result<Option<Valset>> {
        self.keeper.latest_valset()
    }

    pub fn valset_request(&self, nonce: &str) -> Result<Option<Valset>> {
        self.keeper.valset(parse_nonce("nonce", nonce)?)
    }

    pub fn valset_confirm(&self, nonce: &str, orchestrator: &str) -> Result<Option<ValsetConfirm>> {
        let nonce = parse_nonce("nonce", nonce)?;
        let orchestrator = parse_cosmos_address(orchestrator)?;
        self.keeper.get_confirm(&nonce, &orchestrator)
    }

    /// Ordered by orchestrator address.
    pub fn valset_confirms(&self, nonce: &str) -> Result<Vec<ValsetConfirm>> {
        self.keeper.confirms(&parse_nonce("nonce", nonce)?)
    }

    /// Up to `limit` of the most recent valsets, nonce descending. The limit is capped by
    /// [Config::max_valset_requests_returned](crate::cfg::Config::max_valset_requests_returned).
    pub fn last_valset_requests(&self, limit: Option<usize>) -> Result<Vec<Valset>> {
        let limit = Self::limit(limit, self.keeper.config.max_valset_requests_returned);
        self.keeper.last_valsets(limit)
    }

    /// The next page of [Querier::last_valset_requests]: valsets older than nonce `before`.
    pub fn valset_requests_before(&self, before: &str, limit: Option<usize>) -> Result<Vec<Valset>> {
        let before = parse_nonce("before", before)?;
        let limit = Self::limit(limit, self.keeper.config.max_valset_requests_returned);
        self.keeper.valsets_before(Some(before), limit)
    }

    fn pending_valsets(
        &self,
        validator: CosmosAddress,
        before: Option<u64>,
    ) -> Result<impl Iterator<Item = Result<Valset>> + '_> {
        let valsets = self
            .keeper
            .store
            .scan_json::<Valset>(&[VALSETS], Order::Descending)?
            .skip_while(move |v| matches!((v, before), (Ok(v), Some(b)) if v.nonce >= b))
            .map(|v| v.map_err(PeggyError::from));
        Ok(pending(valsets, move |valset| {
            self.keeper
                .has_confirm::<ValsetConfirm>(&valset.nonce, &validator)
        }))
    }

    /// The most recent valset `validator` has not confirmed.
    pub fn last_pending_valset_request(&self, validator: &str) -> Result<Option<Valset>> {
        let validator = parse_cosmos_address(validator)?;
        trace!(%validator, "last pending valset");
        self.pending_valsets(validator, None)?.next().transpose()
    }

    /// Every valset `validator` has not confirmed, nonce descending, up to
    /// [Config::max_pending_returned](crate::cfg::Config::max_pending_returned) of them.
    pub fn pending_valset_requests(&self, validator: &str) -> Result<Vec<Valset>> {
        let validator = parse_cosmos_address(validator)?;
        self.pending_valsets(validator, None)?
            .take(self.keeper.config.max_pending_returned)
            .collect()
    }

    /// The next page of [Querier::pending_valset_requests]: unconfirmed valsets older than nonce `before`.
    pub fn pending_valset_requests_before(&self, validator: &str, before: &str) -> Result<Vec<Valset>> {
        let validator = parse_cosmos_address(validator)?;
        let before = parse_nonce("before", before)?;
        self.pending_valsets(validator, Some(before))?
            .take(self.keeper.config.max_pending_returned)
            .collect()
    }

    /// Up to `limit` of the most recent batches of any token, nonce descending.
    pub fn last_batches_request(&self, limit: Option<usize>) -> Result<Vec<OutgoingTxBatch>> {
        let limit = Self::limit(limit, self.keeper.config.max_batches_returned);
        self.keeper.last_batches(limit, None)
    }

    /// The next page of [Querier::last_batches_request]: batches older than nonce `before`.
    pub fn batches_request_before(
        &self,
        before: &str,
        limit: Option<usize>,
    ) -> Result<Vec<OutgoingTxBatch>> {
        let before = parse_nonce("before", before)?;
        let limit = Self::limit(limit, self.keeper.config.max_batches_returned);
        self.keeper.batches_before(Some(before), limit, None)
    }

    /// The most recent batch `validator` has not confirmed, optionally only considering batches of `token_contract`.
    pub fn last_pending_batch_request(
        &self,
        validator: &str,
        token_contract: Option<&str>,
    ) -> Result<Option<OutgoingTxBatch>> {
        let validator = parse_cosmos_address(validator)?;
        let token_contract = token_contract.map(parse_eth).transpose()?;
        let batches = self
            .keeper
            .store
            .scan_json::<OutgoingTxBatch>(&[BATCHES], Order::Descending)?
            .map(|b| b.map_err(PeggyError::from))
            .filter(|b| match (b, &token_contract) {
                (Ok(batch), Some(token)) => batch.token_contract == *token,
                _ => true,
            });
        pending(batches, |batch| {
            self.keeper.has_confirm::<BatchConfirm>(
                &(batch.batch_nonce, batch.token_contract),
                &validator,
            )
        })
        .next()
        .transpose()
    }

    pub fn batch_request(&self, nonce: &str, token_contract: &str) -> Result<Option<OutgoingTxBatch>> {
        let nonce = parse_nonce("nonce", nonce)?;
        let token_contract = parse_eth(token_contract)?;
        self.keeper.get_outgoing_tx_batch(&token_contract, nonce)
    }

    pub fn batch_confirm(
        &self,
        nonce: &str,
        token_contract: &str,
        orchestrator: &str,
    ) -> Result<Option<BatchConfirm>> {
        let nonce = parse_nonce("nonce", nonce)?;
        let token_contract = parse_eth(token_contract)?;
        let orchestrator = parse_cosmos_address(orchestrator)?;
        self.keeper
            .get_confirm(&(nonce, token_contract), &orchestrator)
    }

    /// Ordered by orchestrator address.
    pub fn batch_confirms(&self, nonce: &str, token_contract: &str) -> Result<Vec<BatchConfirm>> {
        let nonce = parse_nonce("nonce", nonce)?;
        let token_contract = parse_eth(token_contract)?;
        self.keeper.confirms(&(nonce, token_contract))
    }

    /// Fees on offer in the pool, per token. Ordered by token contract.
    pub fn batch_fees(&self) -> Result<Vec<BatchFees>> {
        self.keeper.batch_fees()
    }

    /// Up to `limit` logic calls, in descending key order.
    pub fn last_logic_call_requests(&self, limit: Option<usize>) -> Result<Vec<OutgoingLogicCall>> {
        let limit = Self::limit(limit, self.keeper.config.max_logic_calls_returned);
        self.keeper.last_logic_calls(limit)
    }

    /// The next page of [Querier::last_logic_call_requests]: calls after the given one in descending key order.
    pub fn logic_call_requests_before(
        &self,
        invalidation_id: &str,
        invalidation_nonce: &str,
        limit: Option<usize>,
    ) -> Result<Vec<OutgoingLogicCall>> {
        let before = LogicCallKey {
            invalidation_id: parse_invalidation_id(invalidation_id)?,
            invalidation_nonce: parse_nonce("invalidation_nonce", invalidation_nonce)?,
        };
        let limit = Self::limit(limit, self.keeper.config.max_logic_calls_returned);
        self.keeper.logic_calls_before(Some(&before), limit)
    }

    /// The first logic call, in descending key order, that `validator` has not confirmed.
    pub fn last_pending_logic_call_request(
        &self,
        validator: &str,
    ) -> Result<Option<OutgoingLogicCall>> {
        let validator = parse_cosmos_address(validator)?;
        let calls = self
            .keeper
            .store
            .scan_json::<OutgoingLogicCall>(&[LOGIC_CALLS], Order::Descending)?
            .map(|c| c.map_err(PeggyError::from));
        pending(calls, |call| {
            self.keeper
                .has_confirm::<LogicCallConfirm>(&call.key(), &validator)
        })
        .next()
        .transpose()
    }

    pub fn logic_call(
        &self,
        invalidation_id: &str,
        invalidation_nonce: &str,
    ) -> Result<Option<OutgoingLogicCall>> {
        let key = LogicCallKey {
            invalidation_id: parse_invalidation_id(invalidation_id)?,
            invalidation_nonce: parse_nonce("invalidation_nonce", invalidation_nonce)?,
        };
        self.keeper.get_outgoing_logic_call(&key)
    }

    /// Ordered by orchestrator address.
    pub fn logic_call_confirms(
        &self,
        invalidation_id: &str,
        invalidation_nonce: &str,
    ) -> Result<Vec<LogicCallConfirm>> {
        let key = LogicCallKey {
            invalidation_id: parse_invalidation_id(invalidation_id)?,
            invalidation_nonce: parse_nonce("invalidation_nonce", invalidation_nonce)?,
        };
        self.keeper.confirms(&key)
    }

    /// Every confirmation of `subject`, ordered by orchestrator address.
    pub fn all_confirms(&self, subject: &ConfirmSubject) -> Result<Vec<ConfirmRecord>> {
        Ok(match subject {
            ConfirmSubject::Valset { nonce } => self
                .keeper
                .confirms::<ValsetConfirm>(nonce)?
                .into_iter()
                .map(ConfirmRecord::Valset)
                .collect(),
            ConfirmSubject::Batch {
                nonce,
                token_contract,
            } => self
                .keeper
                .confirms::<BatchConfirm>(&(*nonce, *token_contract))?
                .into_iter()
                .map(ConfirmRecord::Batch)
                .collect(),
            ConfirmSubject::LogicCall(key) => {
                validate_invalidation_id(&key.invalidation_id)?;
                self.keeper
                    .confirms::<LogicCallConfirm>(key)?
                    .into_iter()
                    .map(ConfirmRecord::LogicCall)
                    .collect()
            }
        })
    }

    /// `sender`'s transfers, split into those already in a batch and those still in the pool.
    pub fn pending_send_to_eth(&self, sender: &str) -> Result<PendingSendToEth> {
        let sender = parse_cosmos_address(sender)?;
        let transfers_in_batches = self
            .keeper
            .all_batches()?
            .into_iter()
            .flat_map(|batch| batch.transactions)
            .filter(|tx| tx.sender == sender)
            .collect();
        let unbatched_transfers = self.keeper.pool_transactions_by_sender(&sender)?;
        Ok(PendingSendToEth {
            transfers_in_batches,
            unbatched_transfers,
        })
    }

    /// How the Ethereum token `erc20` is represented natively. Tokens without an explicit mapping are represented by
    /// their voucher denom.
    pub fn erc20_to_denom(&self, erc20: &str) -> Result<AssetMapping> {
        self.keeper.erc20_to_denom(&parse_eth(erc20)?)
    }

    /// The Ethereum token `denom` is bridged as, if it is bridgeable at all.
    pub fn denom_to_erc20(&self, denom: &str) -> Result<Option<AssetMapping>> {
        let denom = denom.trim();
        validate_denom(denom)?;
        self.keeper.denom_to_erc20(denom)
    }

    /// The Ethereum address `validator` has registered.
    pub fn eth_address_by_validator(&self, validator: &str) -> Result<Option<EthAddress>> {
        self.keeper.eth_address(&parse_cosmos_address(validator)?)
    }
}
