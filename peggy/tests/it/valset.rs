use peggy::{
    error::ErrorKind,
    external::StakingKeeper,
    handler::Msg,
    test_util::{cosmos_address, eth_address},
    valset::normalize_power,
};
use rand::Rng;

use crate::TestEnv;

#[peggy_macros::test]
fn equal_stakes_split_power_evenly(mut env: TestEnv) {
    let expected = [
        4294967295u32,
        2147483647,
        1431655765,
        1073741823,
        858993459,
        715827882,
    ];
    for (i, power) in expected.iter().enumerate() {
        env.register_validators(&vec![1; i + 1]);
        let valset = env.request_valset();
        assert_eq!(valset.members.len(), i + 1);
        assert!(valset.members.iter().all(|m| m.power == *power));
        // Equal powers are ordered by address.
        let addresses: Vec<_> = valset.members.iter().map(|m| m.ethereum_address).collect();
        let mut sorted = addresses.clone();
        sorted.sort();
        assert_eq!(addresses, sorted);
    }
}

#[peggy_macros::test]
fn nonces_increase_and_heights_are_recorded(mut env: TestEnv) {
    env.register_validators(&[5, 10]);
    let mut last_nonce = 0;
    for _ in 0..10 {
        let blocks = env.rng.gen_range(0..20);
        env.advance(blocks);
        let valset = env.request_valset();
        assert!(valset.nonce > last_nonce);
        assert_eq!(valset.height, env.height);
        last_nonce = valset.nonce;
        assert_eq!(env.keeper.valset(valset.nonce).unwrap(), Some(valset));
    }
    assert_eq!(last_nonce, 10);
}

#[peggy_macros::test]
fn powers_are_independently_scaled(mut env: TestEnv) {
    let count = env.rng.gen_range(1..=20);
    let stakes: Vec<u64> = (0..count)
        .map(|_| env.rng.gen_range(1..1_000_000_000_000))
        .collect();
    env.register_validators(&stakes);
    // Some bonded validators never register an Ethereum address. Their stake still counts towards the total.
    let unregistered = env.rng.gen_range(0..5u8);
    for i in 0..unregistered {
        let stake = env.rng.gen_range(1..1_000_000);
        env.staking.set_stake(cosmos_address(200 + i), stake);
    }

    let total: u128 = env
        .staking
        .bonded_validators()
        .iter()
        .map(|(_, stake)| *stake as u128)
        .sum();
    let valset = env.request_valset();
    assert_eq!(valset.members.len(), count);
    for (i, stake) in stakes.iter().enumerate() {
        let member = valset
            .members
            .iter()
            .find(|m| m.ethereum_address == eth_address(i as u8 + 1))
            .unwrap();
        let expected = (*stake as u128 * u32::MAX as u128 / total) as u32;
        assert_eq!(member.power, expected);
        assert_eq!(member.power, normalize_power(*stake, total));
    }
    assert!(valset.total_power() <= u32::MAX as u64);
    assert!(
        valset
            .members
            .windows(2)
            .all(|w| w[0].power >= w[1].power)
    );
}

#[peggy_macros::test]
fn unregistered_and_unbonded_validators_are_excluded(mut env: TestEnv) {
    let validators = env.register_validators(&[1, 1, 1]);
    env.staking.unbond(&validators[2]);
    env.staking.set_stake(cosmos_address(50), 1);

    let valset = env.request_valset();
    let addresses: Vec<_> = valset.members.iter().map(|m| m.ethereum_address).collect();
    assert_eq!(addresses, vec![eth_address(1), eth_address(2)]);
    // Two registered validators out of three equal stakes.
    assert!(valset.members.iter().all(|m| m.power == 1431655765));
}

#[peggy_macros::test]
fn only_bonded_validators_can_register(mut env: TestEnv) {
    let err = env
        .handle(Msg::SetEthAddress {
            validator: cosmos_address(9),
            eth_address: eth_address(9),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(env.keeper.eth_address(&cosmos_address(9)).unwrap(), None);
}

#[peggy_macros::test]
fn empty_staking_table_gives_empty_snapshot(mut env: TestEnv) {
    let valset = env.request_valset();
    assert_eq!(valset.nonce, 1);
    assert!(valset.members.is_empty());
    assert_eq!(valset.total_power(), 0);
}

#[peggy_macros::test]
fn pruning_removes_valset_and_confirms(mut env: TestEnv) {
    env.register_validators(&[1, 1]);
    let first = env.request_valset();
    let second = env.request_valset();
    env.confirm_valset(first.nonce, 1);
    env.confirm_valset(first.nonce, 2);
    env.confirm_valset(second.nonce, 1);

    assert!(env.keeper.delete_valset(first.nonce).unwrap());
    assert!(!env.keeper.delete_valset(first.nonce).unwrap());
    assert_eq!(env.keeper.valset(first.nonce).unwrap(), None);
    let querier = env.querier();
    assert!(querier.valset_confirms("1").unwrap().is_empty());
    assert_eq!(querier.valset_confirms("2").unwrap().len(), 1);
    assert_eq!(querier.current_valset().unwrap(), Some(second));
}
