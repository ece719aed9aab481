use alloy::primitives::Bytes;
use peggy::{
    confirm::LogicCallConfirm,
    error::ErrorKind,
    handler::Msg,
    logic_call::{LogicCallKey, OutgoingLogicCall},
    test_util::{cosmos_address, eth_address},
    token::Erc20Token,
};

use crate::{TestEnv, signature, token_contract, u256};

fn logic_call(invalidation_id: &[u8], invalidation_nonce: u64) -> OutgoingLogicCall {
    OutgoingLogicCall {
        transfers: vec![Erc20Token::new(u256(1000), token_contract())],
        fees: vec![Erc20Token::new(u256(10), token_contract())],
        logic_contract_address: eth_address(0xcc),
        payload: Bytes::from_static(b"\x12\x34\x56\x78"),
        timeout: 4766922941000,
        invalidation_id: Bytes::from(invalidation_id.to_vec()),
        invalidation_nonce,
    }
}

fn confirm(call: &OutgoingLogicCall, byte: u8) -> Msg {
    Msg::ConfirmLogicCall(LogicCallConfirm {
        invalidation_id: call.invalidation_id.clone(),
        invalidation_nonce: call.invalidation_nonce,
        orchestrator: cosmos_address(byte),
        eth_signer: eth_address(byte),
        signature: signature(byte),
    })
}

#[peggy_macros::test]
fn submitted_call_can_be_queried(mut env: TestEnv) {
    let call = logic_call(b"swap", 1);
    env.handle(Msg::SubmitLogicCall(call.clone())).unwrap();

    let querier = env.querier();
    assert_eq!(
        querier.logic_call(&hex::encode("swap"), "1").unwrap(),
        Some(call.clone())
    );
    assert_eq!(
        querier.logic_call("0x73776170", "1").unwrap(),
        Some(call.clone())
    );
    assert_eq!(querier.logic_call("0x73776170", "2").unwrap(), None);
    assert_eq!(querier.last_logic_call_requests(None).unwrap(), vec![call]);
}

#[peggy_macros::test]
fn invalidation_nonces_must_increase(mut env: TestEnv) {
    env.handle(Msg::SubmitLogicCall(logic_call(b"swap", 5)))
        .unwrap();
    for nonce in [5, 4] {
        let err = env
            .handle(Msg::SubmitLogicCall(logic_call(b"swap", nonce)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
    // Other ids are independent.
    env.handle(Msg::SubmitLogicCall(logic_call(b"other", 1)))
        .unwrap();
    env.handle(Msg::SubmitLogicCall(logic_call(b"swap", 6)))
        .unwrap();

    assert_eq!(env.keeper.last_invalidation_nonce(b"swap").unwrap(), Some(6));
    assert_eq!(env.keeper.last_invalidation_nonce(b"other").unwrap(), Some(1));
    assert_eq!(env.keeper.last_logic_calls(10).unwrap().len(), 3);
}

#[peggy_macros::test]
fn oversized_invalidation_ids_are_rejected(mut env: TestEnv) {
    for id in [&[][..], &[7; 33][..]] {
        let err = env
            .handle(Msg::SubmitLogicCall(logic_call(id, 1)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }
    env.handle(Msg::SubmitLogicCall(logic_call(&[7; 32], 1)))
        .unwrap();

    let querier = env.querier();
    for id in ["", "zz", hex::encode([7; 33]).as_str()] {
        let err = querier.logic_call(id, "1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation, "{id:?}");
    }
    let err = querier.logic_call(&hex::encode([7; 32]), "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);
}

#[peggy_macros::test]
fn pending_logic_call_advances_as_validator_confirms(mut env: TestEnv) {
    env.register_validators(&[1, 1]);
    let first = logic_call(b"swap", 1);
    let second = logic_call(b"swap", 2);
    env.handle(Msg::SubmitLogicCall(first.clone())).unwrap();
    env.handle(Msg::SubmitLogicCall(second.clone())).unwrap();

    let validator = cosmos_address(1).to_string();
    assert_eq!(
        env.querier()
            .last_pending_logic_call_request(&validator)
            .unwrap(),
        Some(second.clone())
    );

    env.handle(confirm(&second, 1)).unwrap();
    assert_eq!(
        env.querier()
            .last_pending_logic_call_request(&validator)
            .unwrap(),
        Some(first.clone())
    );

    env.handle(confirm(&first, 1)).unwrap();
    let querier = env.querier();
    assert_eq!(
        querier.last_pending_logic_call_request(&validator).unwrap(),
        None
    );
    // The other validator has confirmed nothing.
    assert_eq!(
        querier
            .last_pending_logic_call_request(&cosmos_address(2).to_string())
            .unwrap(),
        Some(second)
    );

    let confirms = querier.logic_call_confirms("73776170", "1").unwrap();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].orchestrator, cosmos_address(1));
}

#[peggy_macros::test]
fn confirming_unknown_call_is_rejected(mut env: TestEnv) {
    env.register_validators(&[1]);
    let err = env.handle(confirm(&logic_call(b"swap", 1), 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[peggy_macros::test]
fn deleting_call_removes_confirmations(mut env: TestEnv) {
    env.register_validators(&[1, 1]);
    let call = logic_call(b"swap", 1);
    env.handle(Msg::SubmitLogicCall(call.clone())).unwrap();
    env.handle(confirm(&call, 1)).unwrap();
    env.handle(confirm(&call, 2)).unwrap();

    let key = LogicCallKey::new(call.invalidation_id.clone(), 1);
    assert!(env.keeper.delete_outgoing_logic_call(&key).unwrap());
    assert!(!env.keeper.delete_outgoing_logic_call(&key).unwrap());
    let querier = env.querier();
    assert_eq!(querier.logic_call("73776170", "1").unwrap(), None);
    assert!(
        querier
            .logic_call_confirms("73776170", "1")
            .unwrap()
            .is_empty()
    );
}

#[peggy_macros::test]
fn logic_call_list_pages_with_a_cursor(mut env: TestEnv) {
    for (id, nonce) in [(&b"swap"[..], 1), (&b"swap"[..], 2), (&b"other"[..], 1)] {
        env.handle(Msg::SubmitLogicCall(logic_call(id, nonce)))
            .unwrap();
    }
    let querier = env.querier();
    let keys = |calls: Vec<OutgoingLogicCall>| -> Vec<LogicCallKey> {
        calls.iter().map(OutgoingLogicCall::key).collect()
    };
    let swap = |nonce| LogicCallKey::new(Bytes::from_static(b"swap"), nonce);

    // Longer ids sort after shorter ones, so "other" comes first in descending order.
    assert_eq!(
        keys(querier.last_logic_call_requests(None).unwrap()),
        vec![
            LogicCallKey::new(Bytes::from_static(b"other"), 1),
            swap(2),
            swap(1)
        ]
    );
    assert_eq!(
        keys(
            querier
                .logic_call_requests_before(&hex::encode("other"), "1", None)
                .unwrap()
        ),
        vec![swap(2), swap(1)]
    );
    assert_eq!(
        keys(
            querier
                .logic_call_requests_before(&hex::encode("swap"), "2", Some(1))
                .unwrap()
        ),
        vec![swap(1)]
    );
    // The cursor need not name a stored call.
    assert_eq!(
        keys(
            querier
                .logic_call_requests_before(&hex::encode("swap"), "9", None)
                .unwrap()
        ),
        vec![swap(2), swap(1)]
    );
    let err = querier
        .logic_call_requests_before("zz", "1", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);
}
