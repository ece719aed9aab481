use peggy::{
    confirm::ValsetConfirm,
    error::ErrorKind,
    handler::Msg,
    query::{ConfirmRecord, ConfirmSubject},
    test_util::{cosmos_address, eth_address},
};
use rand::{Rng, seq::SliceRandom};

use crate::{TestEnv, signature, token_contract};

#[peggy_macros::test]
fn later_confirmation_replaces_earlier(mut env: TestEnv) {
    env.register_validators(&[1]);
    let valset = env.request_valset();
    env.confirm_valset(valset.nonce, 1);

    let replacement = ValsetConfirm {
        nonce: valset.nonce,
        orchestrator: cosmos_address(1),
        eth_signer: eth_address(1),
        signature: signature(0xee),
    };
    env.handle(Msg::ValsetConfirm(replacement.clone())).unwrap();

    let querier = env.querier();
    let confirms = querier.valset_confirms("1").unwrap();
    assert_eq!(confirms, vec![replacement.clone()]);
    assert_eq!(
        querier
            .valset_confirm("1", &cosmos_address(1).to_string())
            .unwrap(),
        Some(replacement)
    );
}

#[peggy_macros::test]
fn confirmations_are_ordered_by_orchestrator(mut env: TestEnv) {
    let count = env.rng.gen_range(1..=12);
    env.register_validators(&vec![1; count]);
    let valset = env.request_valset();

    let mut signers: Vec<u8> = (1..=count as u8).collect();
    signers.shuffle(&mut env.rng);
    let confirming = env.rng.gen_range(1..=count);
    for byte in &signers[..confirming] {
        env.confirm_valset(valset.nonce, *byte);
    }

    let confirms = env
        .querier()
        .valset_confirms(&valset.nonce.to_string())
        .unwrap();
    assert_eq!(confirms.len(), confirming);
    let orchestrators: Vec<_> = confirms.iter().map(|c| c.orchestrator).collect();
    let mut expected: Vec<_> = signers[..confirming]
        .iter()
        .map(|b| cosmos_address(*b))
        .collect();
    expected.sort();
    assert_eq!(orchestrators, expected);
}

#[peggy_macros::test]
fn confirmations_of_different_subjects_do_not_mix(mut env: TestEnv) {
    env.register_validators(&[1, 1]);
    let sender = cosmos_address(9);
    env.fund(&sender, 100);
    env.send_to_eth(sender, 10, 1);
    let first = env.request_valset();
    let second = env.request_valset();
    let batch = env.request_batch().unwrap();

    env.confirm_valset(first.nonce, 1);
    env.confirm_valset(second.nonce, 2);
    env.confirm_batch(batch.batch_nonce, token_contract(), 2);

    let querier = env.querier();
    let valset_confirms = querier
        .all_confirms(&ConfirmSubject::Valset { nonce: first.nonce })
        .unwrap();
    assert_eq!(valset_confirms.len(), 1);
    assert_eq!(*valset_confirms[0].orchestrator(), cosmos_address(1));

    let batch_confirms = querier
        .all_confirms(&ConfirmSubject::Batch {
            nonce: batch.batch_nonce,
            token_contract: token_contract(),
        })
        .unwrap();
    match batch_confirms.as_slice() {
        [ConfirmRecord::Batch(confirm)] => {
            assert_eq!(confirm.orchestrator, cosmos_address(2));
            assert_eq!(confirm.nonce, batch.batch_nonce);
        }
        other => panic!("unexpected confirmations {other:?}"),
    }

    // Repeated queries give the same answer.
    assert_eq!(
        querier
            .all_confirms(&ConfirmSubject::Valset { nonce: first.nonce })
            .unwrap(),
        valset_confirms
    );
    assert!(
        querier
            .all_confirms(&ConfirmSubject::Valset { nonce: 999999 })
            .unwrap()
            .is_empty()
    );
}

#[peggy_macros::test]
fn confirmation_signed_by_another_key_is_rejected(mut env: TestEnv) {
    env.register_validators(&[1, 1]);
    let valset = env.request_valset();
    let err = env
        .handle(Msg::ValsetConfirm(ValsetConfirm {
            nonce: valset.nonce,
            orchestrator: cosmos_address(1),
            eth_signer: eth_address(2),
            signature: signature(1),
        }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(env.querier().valset_confirms("1").unwrap().is_empty());
}

#[peggy_macros::test]
fn unregistered_orchestrator_cannot_confirm(mut env: TestEnv) {
    env.register_validators(&[1]);
    let valset = env.request_valset();
    let err = env
        .handle(Msg::ValsetConfirm(ValsetConfirm {
            nonce: valset.nonce,
            orchestrator: cosmos_address(7),
            eth_signer: eth_address(7),
            signature: signature(7),
        }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[peggy_macros::test]
fn empty_signature_is_rejected(mut env: TestEnv) {
    env.register_validators(&[1]);
    let valset = env.request_valset();
    let err = env
        .handle(Msg::ValsetConfirm(ValsetConfirm {
            nonce: valset.nonce,
            orchestrator: cosmos_address(1),
            eth_signer: eth_address(1),
            signature: Default::default(),
        }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[peggy_macros::test]
fn confirming_unknown_subject_is_rejected(mut env: TestEnv) {
    env.register_validators(&[1]);
    let err = env
        .handle(Msg::ValsetConfirm(ValsetConfirm {
            nonce: 1,
            orchestrator: cosmos_address(1),
            eth_signer: eth_address(1),
            signature: signature(1),
        }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(env.querier().valset_confirms("1").unwrap().is_empty());
}
