extern crate std;

use soroban_sdk::{
    testutils::{Address as _, Events, Ledger as _},
    vec, Address, IntoVal, String, TryIntoVal, Val,
};

use crate::events::{
    Funded, FundsReleased, MilestoneVerified, OracleUpdated, ProjectCreated, ProjectDeactivated,
    TOPIC_CREATED, TOPIC_DEACTIVATED, TOPIC_FUNDED, TOPIC_ORACLE, TOPIC_RELEASED, TOPIC_VERIFIED,
};
use crate::test::{Harness, NOW};

/// Events this contract published, oldest first.
fn escrow_events(h: &Harness) -> std::vec::Vec<(soroban_sdk::Vec<Val>, Val)> {
    h.env
        .events()
        .all()
        .iter()
        .filter(|e| e.0 == h.client.address)
        .map(|e| (e.1, e.2))
        .collect()
}

#[test]
fn test_project_created_event() {
    let h = Harness::new();
    let id = h.create(&[25, 75]);

    let all_events = h.env.events().all();
    let last_event = all_events.last().expect("No events found");

    assert_eq!(last_event.0, h.client.address);
    let expected_topics = vec![&h.env, TOPIC_CREATED.into_val(&h.env), id.into_val(&h.env)];
    assert_eq!(last_event.1, expected_topics);

    let event_data: ProjectCreated = last_event.2.try_into_val(&h.env).unwrap();
    assert_eq!(
        event_data,
        ProjectCreated {
            seq: 1,
            project_id: id,
            creator: h.creator.clone(),
            name: String::from_str(&h.env, "Solar farm"),
            target: 10_000,
            timestamp: NOW,
        }
    );
}

#[test]
fn test_funded_event_carries_running_total() {
    let h = Harness::new();
    let id = h.create(&[25, 75]);
    let funder = Address::generate(&h.env);
    h.fund(id, &funder, 1_000);
    h.fund(id, &funder, 250);

    let all_events = h.env.events().all();
    let last_event = all_events.last().expect("No events found");
    assert_eq!(last_event.0, h.client.address);
    assert_eq!(
        last_event.1,
        vec![&h.env, TOPIC_FUNDED.into_val(&h.env), id.into_val(&h.env)]
    );
    let event_data: Funded = last_event.2.try_into_val(&h.env).unwrap();
    assert_eq!(
        event_data,
        Funded {
            seq: 3,
            project_id: id,
            funder,
            amount: 250,
            total_raised: 1_250,
        }
    );
}

#[test]
fn test_verification_emits_verified_then_released() {
    let h = Harness::new();
    let id = h.create(&[25, 75]);
    h.fund(id, &Address::generate(&h.env), 4_000);
    h.env.ledger().set_timestamp(NOW + 60);

    h.client.verify_milestone(&id, &1, &h.oracle);

    let events = escrow_events(&h);
    let (verified_topics, verified_data) = events[events.len() - 2].clone();
    let (released_topics, released_data) = events[events.len() - 1].clone();

    assert_eq!(
        verified_topics,
        vec![&h.env, TOPIC_VERIFIED.into_val(&h.env), id.into_val(&h.env)]
    );
    let verified: MilestoneVerified = verified_data.try_into_val(&h.env).unwrap();
    assert_eq!(
        verified,
        MilestoneVerified {
            seq: 3,
            project_id: id,
            milestone_index: 1,
            title: String::from_str(&h.env, "Phase 2"),
            timestamp: NOW + 60,
        }
    );

    assert_eq!(
        released_topics,
        vec![&h.env, TOPIC_RELEASED.into_val(&h.env), id.into_val(&h.env)]
    );
    let released: FundsReleased = released_data.try_into_val(&h.env).unwrap();
    assert_eq!(
        released,
        FundsReleased {
            seq: 4,
            project_id: id,
            creator: h.creator.clone(),
            amount: 3_000,
            milestone_index: 1,
        }
    );
}

#[test]
fn test_deactivation_and_oracle_rotation_events() {
    let h = Harness::new();
    let id = h.create(&[25, 75]);
    h.fund(id, &Address::generate(&h.env), 100);
    h.client.deactivate_project(&id, &h.creator);

    let events = escrow_events(&h);
    let (topics, data) = events.last().cloned().expect("No events found");
    assert_eq!(
        topics,
        vec![&h.env, TOPIC_DEACTIVATED.into_val(&h.env), id.into_val(&h.env)]
    );
    let deactivated: ProjectDeactivated = data.try_into_val(&h.env).unwrap();
    assert_eq!(
        deactivated,
        ProjectDeactivated {
            seq: 3,
            project_id: id,
            undisbursed: 100,
        }
    );

    let next = Address::generate(&h.env);
    h.client.update_oracle(&next, &h.oracle);
    let events = escrow_events(&h);
    let (topics, data) = events.last().cloned().expect("No events found");
    assert_eq!(topics, vec![&h.env, TOPIC_ORACLE.into_val(&h.env)]);
    let rotated: OracleUpdated = data.try_into_val(&h.env).unwrap();
    assert_eq!(
        rotated,
        OracleUpdated {
            seq: 4,
            old: h.oracle.clone(),
            new: next,
        }
    );
    assert_eq!(h.client.last_event_seq(), 4);
}

#[test]
fn test_rejected_calls_emit_nothing() {
    let h = Harness::new();
    let id = h.create(&[25, 75]);
    let funder = Address::generate(&h.env);
    h.mint(&funder, 10);

    let _ = h.client.try_fund_project(&id, &funder, &0);
    let _ = h.client.try_verify_milestone(&id, &0, &h.creator);
    let _ = h.client.try_verify_milestone(&id, &0, &h.oracle);
    let _ = h.client.try_deactivate_project(&id, &h.oracle);
    let _ = h.client.try_update_oracle(&h.creator, &h.creator);

    assert_eq!(h.client.last_event_seq(), 1);
}

#[test]
fn test_sequence_numbers_are_contiguous() {
    let h = Harness::new();
    let id = h.create(&[25, 75]);
    let funder = Address::generate(&h.env);
    for i in 1..=4 {
        h.fund(id, &funder, i * 10);
        let all_events = h.env.events().all();
        let last_event = all_events.last().expect("No events found");
        let funded: Funded = last_event.2.try_into_val(&h.env).unwrap();
        assert_eq!(funded.seq, 1 + i as u64);
    }
    assert_eq!(h.client.last_event_seq(), 5);
}
