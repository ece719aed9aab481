//! Transaction messages.
//!
//! Each message is validated and applied inside a single [Keeper::transaction], so a rejected message leaves no trace
//! in the store.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    address::{CosmosAddress, EthAddress},
    batch::OutgoingTxBatch,
    confirm::{BatchConfirm, Confirmation, LogicCallConfirm, ValsetConfirm},
    db::{KvStore, StoreCache},
    denom::AssetMapping,
    error::{PeggyError, Result},
    external::{BankKeeper, StakingKeeper},
    keeper::Keeper,
    logic_call::{OutgoingLogicCall, validate_invalidation_id},
    pool::OutgoingTransferTx,
    token::Coin,
    valset::Valset,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    /// Register the Ethereum address a bonded validator signs with.
    SetEthAddress {
        validator: CosmosAddress,
        eth_address: EthAddress,
    },
    /// Take a new valset snapshot.
    ValsetRequest { requester: CosmosAddress },
    ValsetConfirm(ValsetConfirm),
    SendToEth {
        sender: CosmosAddress,
        eth_dest: EthAddress,
        amount: Coin,
        bridge_fee: Coin,
    },
    CancelSendToEth {
        sender: CosmosAddress,
        transaction_id: u64,
    },
    /// Batch the pooled transfers of the token `denom` is bridged as.
    RequestBatch {
        requester: CosmosAddress,
        denom: String,
    },
    ConfirmBatch(BatchConfirm),
    SubmitLogicCall(OutgoingLogicCall),
    ConfirmLogicCall(LogicCallConfirm),
    SetAssetMapping(AssetMapping),
}

impl Msg {
    fn name(&self) -> &'static str {
        match self {
            Msg::SetEthAddress { .. } => "set_eth_address",
            Msg::ValsetRequest { .. } => "valset_request",
            Msg::ValsetConfirm(_) => "valset_confirm",
            Msg::SendToEth { .. } => "send_to_eth",
            Msg::CancelSendToEth { .. } => "cancel_send_to_eth",
            Msg::RequestBatch { .. } => "request_batch",
            Msg::ConfirmBatch(_) => "confirm_batch",
            Msg::SubmitLogicCall(_) => "submit_logic_call",
            Msg::ConfirmLogicCall(_) => "confirm_logic_call",
            Msg::SetAssetMapping(_) => "set_asset_mapping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgResponse {
    Empty,
    Valset(Valset),
    TransferId(u64),
    CancelledTransfer(OutgoingTransferTx),
    /// `None` if there was nothing to batch.
    Batch(Option<OutgoingTxBatch>),
}

/// The chain context a message executes in.
pub struct BlockEnv<'a> {
    pub height: u64,
    pub staking: &'a dyn StakingKeeper,
    pub bank: &'a mut dyn BankKeeper,
}

fn check_signature<C: Confirmation>(
    keeper: &Keeper<impl KvStore>,
    confirm: &C,
) -> Result<()> {
    if confirm.signature().is_empty() {
        return Err(PeggyError::Precondition(format!(
            "empty signature on {} confirmation",
            C::KIND
        )));
    }
    let orchestrator = confirm.orchestrator();
    match keeper.eth_address(orchestrator)? {
        Some(registered) if registered == *confirm.eth_signer() => Ok(()),
        Some(registered) => Err(PeggyError::Precondition(format!(
            "{orchestrator} signs with {registered}, not {}",
            confirm.eth_signer()
        ))),
        None => Err(PeggyError::Precondition(format!(
            "{orchestrator} has not registered an ethereum address"
        ))),
    }
}

/// Validate and apply `msg` atomically.
pub fn handle<S: KvStore>(
    keeper: &mut Keeper<S>,
    env: &mut BlockEnv<'_>,
    msg: Msg,
) -> Result<MsgResponse> {
    let name = msg.name();
    debug!(msg = name, height = env.height, "handling message");
    let result = keeper.transaction(|k| apply(k, env, msg));
    if let Err(error) = &result {
        info!(msg = name, %error, kind = ?error.kind(), "message rejected");
    }
    result
}

fn apply<S: KvStore>(
    k: &mut Keeper<StoreCache<'_, S>>,
    env: &mut BlockEnv<'_>,
    msg: Msg,
) -> Result<MsgResponse> {
    match msg {
        Msg::SetEthAddress {
            validator,
            eth_address,
        } => {
            let bonded = env
                .staking
                .bonded_validators()
                .iter()
                .any(|(v, _)| *v == validator);
            if !bonded {
                return Err(PeggyError::Precondition(format!(
                    "{validator} is not a bonded validator"
                )));
            }
            k.set_eth_address(&validator, eth_address)?;
            Ok(MsgResponse::Empty)
        }
        Msg::ValsetRequest { requester } => {
            debug!(%requester, "valset requested");
            Ok(MsgResponse::Valset(k.build_valset(env.height, env.staking)?))
        }
        Msg::ValsetConfirm(confirm) => {
            if k.valset(confirm.nonce)?.is_none() {
                return Err(PeggyError::Precondition(format!(
                    "no valset with nonce {}",
                    confirm.nonce
                )));
            }
            check_signature(k, &confirm)?;
            k.set_confirm(&confirm)?;
            Ok(MsgResponse::Empty)
        }
        Msg::SendToEth {
            sender,
            eth_dest,
            amount,
            bridge_fee,
        } => {
            let id = k.add_to_outgoing_pool(env.bank, &sender, eth_dest, &amount, &bridge_fee)?;
            Ok(MsgResponse::TransferId(id))
        }
        Msg::CancelSendToEth {
            sender,
            transaction_id,
        } => {
            let tx = k.cancel_send_to_eth(env.bank, &sender, transaction_id)?;
            Ok(MsgResponse::CancelledTransfer(tx))
        }
        Msg::RequestBatch { requester, denom } => {
            let Some(mapping) = k.denom_to_erc20(&denom)? else {
                return Err(PeggyError::invalid(
                    "denom",
                    format!("{denom} is not bridged to ethereum"),
                ));
            };
            debug!(%requester, %denom, "batch requested");
            let max_size = k.config.default_batch_size;
            let batch = k.build_outgoing_tx_batch(env.height, mapping.erc20, max_size)?;
            Ok(MsgResponse::Batch(batch))
        }
        Msg::ConfirmBatch(confirm) => {
            if k
                .get_outgoing_tx_batch(&confirm.token_contract, confirm.nonce)?
                .is_none()
            {
                return Err(PeggyError::Precondition(format!(
                    "no batch {} for token {}",
                    confirm.nonce, confirm.token_contract
                )));
            }
            check_signature(k, &confirm)?;
            k.set_confirm(&confirm)?;
            Ok(MsgResponse::Empty)
        }
        Msg::SubmitLogicCall(call) => {
            validate_invalidation_id(&call.invalidation_id)?;
            if let Some(last) = k.last_invalidation_nonce(&call.invalidation_id)? {
                if call.invalidation_nonce <= last {
                    return Err(PeggyError::Precondition(format!(
                        "invalidation nonce {} does not exceed last accepted nonce {last} for id {}",
                        call.invalidation_nonce,
                        hex::encode(&call.invalidation_id)
                    )));
                }
            }
            k.set_outgoing_logic_call(&call)?;
            k.set_last_invalidation_nonce(&call.invalidation_id, call.invalidation_nonce)?;
            Ok(MsgResponse::Empty)
        }
        Msg::ConfirmLogicCall(confirm) => {
            validate_invalidation_id(&confirm.invalidation_id)?;
            if k.get_outgoing_logic_call(&confirm.subject())?.is_none() {
                return Err(PeggyError::Precondition(format!(
                    "no logic call with invalidation id {} and nonce {}",
                    hex::encode(&confirm.invalidation_id),
                    confirm.invalidation_nonce
                )));
            }
            check_signature(k, &confirm)?;
            k.set_confirm(&confirm)?;
            Ok(MsgResponse::Empty)
        }
        Msg::SetAssetMapping(mapping) => {
            k.set_asset_mapping(&mapping.denom, mapping.erc20, mapping.cosmos_originated)?;
            Ok(MsgResponse::Empty)
        }
    }
}
