//! Release economics: amounts are computed from funds raised at the instant a
//! milestone is verified, not from the target and not from a frozen snapshot.

extern crate std;

use soroban_sdk::{testutils::Address as _, Address, String};

use crate::invariants::assert_all_invariants;
use crate::test::Harness;

#[test]
fn test_release_uses_raised_at_verification_time() {
    let h = Harness::new();
    let id = h.create(&[40, 30, 30]);
    let funder = Address::generate(&h.env);

    h.fund(id, &funder, 1_000);
    assert_eq!(h.client.verify_milestone(&id, &0, &h.oracle), 400);
    assert_eq!(h.client.get_project(&id).funds_released, 400);

    h.fund(id, &funder, 1_000);
    assert_eq!(h.client.verify_milestone(&id, &1, &h.oracle), 600);
    assert_eq!(h.client.get_project(&id).funds_released, 1_000);

    assert_eq!(h.client.verify_milestone(&id, &2, &h.oracle), 600);
    let project = h.client.get_project(&id);
    assert_eq!(project.funds_raised, 2_000);
    assert_eq!(project.funds_released, 1_600);
    // Every milestone is complete, yet 400 stays in escrow.
    assert_eq!(project.undisbursed(), 400);
    assert_eq!(h.client.get_contract_balance(), 400);
    assert_eq!(h.token.balance(&h.creator), 1_600);
    assert_all_invariants(&h.client, &h.token, &[funder]);
}

#[test]
fn test_release_floors() {
    let h = Harness::new();
    let id = h.create(&[30, 70]);
    h.fund(id, &Address::generate(&h.env), 10_001);
    assert_eq!(h.client.verify_milestone(&id, &0, &h.oracle), 3_000);
}

#[test]
fn test_full_release_without_late_funding_loses_at_most_rounding() {
    let h = Harness::new();
    let id = h.create(&[33, 33, 34]);
    let funder = Address::generate(&h.env);
    h.fund(id, &funder, 1_001);
    for index in 0..3u32 {
        h.client.verify_milestone(&id, &index, &h.oracle);
    }

    let project = h.client.get_project(&id);
    // 330 + 330 + 340
    assert_eq!(project.funds_released, 1_000);
    assert!(project.undisbursed() <= 2);
    assert_all_invariants(&h.client, &h.token, &[funder]);
}

#[test]
fn test_release_draws_from_shared_escrow_balance() {
    let h = Harness::new();
    let funder = Address::generate(&h.env);
    let north = Address::generate(&h.env);
    let south = Address::generate(&h.env);
    let (titles, pcts) = h.plan(&[100]);
    let mut ids = std::vec::Vec::new();
    for (creator, name) in [(&north, "North"), (&south, "South")] {
        ids.push(h.client.create_project(
            creator,
            &String::from_str(&h.env, name),
            &String::from_str(&h.env, ""),
            &100,
            &titles,
            &pcts,
            &h.no_metadata(),
        ));
    }
    h.fund(ids[0], &funder, 700);
    h.fund(ids[1], &funder, 300);
    assert_eq!(h.client.get_contract_balance(), 1_000);

    assert_eq!(h.client.verify_milestone(&ids[1], &0, &h.oracle), 300);
    assert_eq!(h.client.get_contract_balance(), 700);
    assert_eq!(h.token.balance(&south), 300);
    assert_eq!(h.token.balance(&north), 0);
    assert_all_invariants(&h.client, &h.token, &[funder]);
}
