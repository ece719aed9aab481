use peggy::{
    denom::AssetMapping,
    error::{ErrorKind, PeggyError},
    external::BankKeeper,
    handler::{Msg, MsgResponse},
    test_util::cosmos_address,
    token::Coin,
};

use crate::{TestEnv, receiver, token_contract, u256};

#[peggy_macros::test]
fn insufficient_funds_leave_no_trace(mut env: TestEnv) {
    let sender = cosmos_address(1);
    env.fund(&sender, 100);
    let denom = env.token_denom();

    let err = env
        .handle(Msg::SendToEth {
            sender,
            eth_dest: receiver(),
            amount: Coin::new(u256(100), denom.clone()),
            bridge_fee: Coin::new(u256(1), denom.clone()),
        })
        .unwrap_err();
    assert!(matches!(err, PeggyError::InsufficientFunds { .. }));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(env.keeper.all_pool_transactions().unwrap().is_empty());
    assert_eq!(env.bank.balance(&sender, &denom), u256(100));
    assert_eq!(env.bank.escrowed(&denom), u256(0));

    // The failed message did not use up a transfer id.
    assert_eq!(env.send_to_eth(sender, 99, 1), 1);
    assert_eq!(env.bank.balance(&sender, &denom), u256(0));
    assert_eq!(env.bank.escrowed(&denom), u256(100));
}

#[peggy_macros::test]
fn malformed_transfers_are_rejected(mut env: TestEnv) {
    let sender = cosmos_address(1);
    env.fund(&sender, 100);
    let denom = env.token_denom();
    let cases = [
        (Coin::new(u256(0), denom.clone()), Coin::new(u256(1), denom.clone())),
        (Coin::new(u256(10), denom.clone()), Coin::new(u256(1), "stake")),
        (Coin::new(u256(10), "stake"), Coin::new(u256(1), "stake")),
    ];
    for (amount, bridge_fee) in cases {
        let err = env
            .handle(Msg::SendToEth {
                sender,
                eth_dest: receiver(),
                amount,
                bridge_fee,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }
    assert_eq!(env.bank.balance(&sender, &denom), u256(100));
}

#[peggy_macros::test]
fn cancelled_transfer_is_refunded(mut env: TestEnv) {
    let sender = cosmos_address(1);
    env.fund(&sender, 100);
    let denom = env.token_denom();
    let first = env.send_to_eth(sender, 30, 5);
    let second = env.send_to_eth(sender, 20, 5);

    let response = env
        .handle(Msg::CancelSendToEth {
            sender,
            transaction_id: first,
        })
        .unwrap();
    let MsgResponse::CancelledTransfer(tx) = response else {
        panic!("unexpected response {response:?}");
    };
    assert_eq!(tx.id, first);
    assert_eq!(tx.erc20_token.amount, u256(30));
    assert_eq!(env.bank.balance(&sender, &denom), u256(75));
    assert_eq!(env.bank.escrowed(&denom), u256(25));
    let remaining: Vec<_> = env
        .keeper
        .all_pool_transactions()
        .unwrap()
        .into_iter()
        .map(|tx| tx.id)
        .collect();
    assert_eq!(remaining, vec![second]);

    // Cancelling twice fails without refunding again.
    let err = env
        .handle(Msg::CancelSendToEth {
            sender,
            transaction_id: first,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(env.bank.balance(&sender, &denom), u256(75));
}

#[peggy_macros::test]
fn only_the_sender_can_cancel(mut env: TestEnv) {
    let sender = cosmos_address(1);
    env.fund(&sender, 100);
    let id = env.send_to_eth(sender, 30, 5);
    let err = env
        .handle(Msg::CancelSendToEth {
            sender: cosmos_address(2),
            transaction_id: id,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(env.keeper.outgoing_tx(id).unwrap().is_some());
}

#[peggy_macros::test]
fn batched_transfers_cannot_be_cancelled(mut env: TestEnv) {
    let sender = cosmos_address(1);
    env.fund(&sender, 100);
    let denom = env.token_denom();
    let id = env.send_to_eth(sender, 30, 5);
    env.request_batch().unwrap();

    let err = env
        .handle(Msg::CancelSendToEth {
            sender,
            transaction_id: id,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(env.bank.escrowed(&denom), u256(35));
}

#[peggy_macros::test]
fn messages_round_trip_through_json(mut env: TestEnv) {
    let validators = env.register_validators(&[1]);
    let json = format!(
        r#"{{"type":"valset_request","requester":"{}"}}"#,
        validators[0]
    );
    let msg: Msg = serde_json::from_str(&json).unwrap();
    assert_eq!(
        msg,
        Msg::ValsetRequest {
            requester: validators[0]
        }
    );
    let MsgResponse::Valset(valset) = env.handle(msg).unwrap() else {
        panic!("expected a valset");
    };
    assert_eq!(valset.members.len(), 1);
}

fn map_token(env: &mut TestEnv, denom: &str) {
    env.handle(Msg::SetAssetMapping(AssetMapping {
        denom: denom.to_owned(),
        erc20: token_contract(),
        cosmos_originated: false,
    }))
    .unwrap();
}

#[peggy_macros::test]
fn voucher_of_mapped_token_cannot_be_sent(mut env: TestEnv) {
    let voucher = env.token_denom();
    map_token(&mut env, "foo");
    let honest = cosmos_address(1);
    let other = cosmos_address(2);
    env.bank.mint(&honest, &Coin::new(u256(100), "foo"));
    env.fund(&other, 100);

    env.handle(Msg::SendToEth {
        sender: honest,
        eth_dest: receiver(),
        amount: Coin::new(u256(90), "foo"),
        bridge_fee: Coin::new(u256(10), "foo"),
    })
    .unwrap();
    let err = env
        .handle(Msg::SendToEth {
            sender: other,
            eth_dest: receiver(),
            amount: Coin::new(u256(90), voucher.clone()),
            bridge_fee: Coin::new(u256(10), voucher.clone()),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);

    assert_eq!(env.bank.balance(&other, &voucher), u256(100));
    assert_eq!(env.bank.balance(&other, "foo"), u256(0));
    assert_eq!(env.bank.escrowed("foo"), u256(100));
    assert_eq!(env.bank.escrowed(&voucher), u256(0));
    assert_eq!(env.keeper.all_pool_transactions().unwrap().len(), 1);
}

#[peggy_macros::test]
fn cancel_refunds_the_escrowed_denom(mut env: TestEnv) {
    let voucher = env.token_denom();
    let early = cosmos_address(1);
    let late = cosmos_address(2);
    env.fund(&early, 100);
    let voucher_id = env.send_to_eth(early, 90, 10);

    // The token gets an explicit mapping while a voucher transfer is still pooled.
    map_token(&mut env, "foo");
    env.bank.mint(&late, &Coin::new(u256(100), "foo"));
    let MsgResponse::TransferId(mapped_id) = env
        .handle(Msg::SendToEth {
            sender: late,
            eth_dest: receiver(),
            amount: Coin::new(u256(90), "foo"),
            bridge_fee: Coin::new(u256(10), "foo"),
        })
        .unwrap()
    else {
        panic!("expected a transfer id");
    };
    assert_eq!(env.keeper.outgoing_tx(voucher_id).unwrap().unwrap().denom, voucher);
    assert_eq!(env.keeper.outgoing_tx(mapped_id).unwrap().unwrap().denom, "foo");

    env.handle(Msg::CancelSendToEth {
        sender: early,
        transaction_id: voucher_id,
    })
    .unwrap();
    assert_eq!(env.bank.balance(&early, &voucher), u256(100));
    assert_eq!(env.bank.balance(&early, "foo"), u256(0));
    assert_eq!(env.bank.escrowed(&voucher), u256(0));
    assert_eq!(env.bank.escrowed("foo"), u256(100));

    env.handle(Msg::CancelSendToEth {
        sender: late,
        transaction_id: mapped_id,
    })
    .unwrap();
    assert_eq!(env.bank.balance(&late, "foo"), u256(100));
    assert_eq!(env.bank.escrowed("foo"), u256(0));
}
