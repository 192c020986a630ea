extern crate std;

use soroban_sdk::{testutils::Address as _, testutils::Ledger as _, token, Address, Env, String, Vec};

use crate::invariants::{
    assert_all_invariants, assert_funding_invariant, assert_project_immutable_fields,
};
use crate::{Error, MilestoneEscrow, MilestoneEscrowClient, ProjectMetadata};

pub(crate) const NOW: u64 = 1_700_000_000;

/// Initialised escrow over a fresh asset, with the oracle and one creator.
pub(crate) struct Harness {
    pub env: Env,
    pub client: MilestoneEscrowClient<'static>,
    pub token: token::Client<'static>,
    pub oracle: Address,
    pub creator: Address,
}

impl Harness {
    pub fn new() -> Self {
        let env = Env::default();
        env.mock_all_auths();
        env.ledger().set_timestamp(NOW);

        let contract_id = env.register(MilestoneEscrow, ());
        let client = MilestoneEscrowClient::new(&env, &contract_id);
        let token = create_token(&env, &Address::generate(&env));
        let oracle = Address::generate(&env);
        let creator = Address::generate(&env);
        client.init(&oracle, &token.address);

        Harness {
            env,
            client,
            token,
            oracle,
            creator,
        }
    }

    pub fn plan(&self, percentages: &[u32]) -> (Vec<String>, Vec<u32>) {
        let mut titles = Vec::new(&self.env);
        let mut pcts = Vec::new(&self.env);
        for (i, p) in percentages.iter().enumerate() {
            titles.push_back(String::from_str(&self.env, &std::format!("Phase {}", i + 1)));
            pcts.push_back(*p);
        }
        (titles, pcts)
    }

    pub fn no_metadata(&self) -> ProjectMetadata {
        ProjectMetadata {
            category: None,
            evidence_subject: None,
            thresholds: Vec::new(&self.env),
        }
    }

    pub fn create(&self, percentages: &[u32]) -> u64 {
        let (titles, pcts) = self.plan(percentages);
        self.client.create_project(
            &self.creator,
            &String::from_str(&self.env, "Solar farm"),
            &String::from_str(&self.env, "Rooftop array for the community centre"),
            &10_000,
            &titles,
            &pcts,
            &self.no_metadata(),
        )
    }

    /// Mint `amount` to `funder`, then fund. Returns the new raised total.
    pub fn fund(&self, project_id: u64, funder: &Address, amount: i128) -> i128 {
        self.mint(funder, amount);
        self.client.fund_project(&project_id, funder, &amount)
    }

    pub fn mint(&self, to: &Address, amount: i128) {
        token::StellarAssetClient::new(&self.env, &self.token.address).mint(to, &amount);
    }
}

pub(crate) fn create_token<'a>(env: &Env, admin: &Address) -> token::Client<'a> {
    let addr = env.register_stellar_asset_contract_v2(admin.clone());
    token::Client::new(env, &addr.address())
}

// ─────────────────────────────────────────────────────────
// init
// ─────────────────────────────────────────────────────────

#[test]
fn test_init_only_once() {
    let h = Harness::new();
    let other = Address::generate(&h.env);
    assert_eq!(
        h.client.try_init(&other, &h.token.address),
        Err(Ok(Error::AlreadyInitialized))
    );
    assert_eq!(h.client.get_oracle(), h.oracle);
}

#[test]
fn test_uninitialised_contract_refuses_projects() {
    let env = Env::default();
    env.mock_all_auths();
    let client = MilestoneEscrowClient::new(&env, &env.register(MilestoneEscrow, ()));
    let creator = Address::generate(&env);
    let mut titles = Vec::new(&env);
    titles.push_back(String::from_str(&env, "only"));
    let mut pcts = Vec::new(&env);
    pcts.push_back(100u32);
    let metadata = ProjectMetadata {
        category: None,
        evidence_subject: None,
        thresholds: Vec::new(&env),
    };

    let result = client.try_create_project(
        &creator,
        &String::from_str(&env, "p"),
        &String::from_str(&env, ""),
        &1,
        &titles,
        &pcts,
        &metadata,
    );
    assert_eq!(result, Err(Ok(Error::NotInitialized)));
}

// ─────────────────────────────────────────────────────────
// create_project
// ─────────────────────────────────────────────────────────

#[test]
fn test_create_project_assigns_sequential_ids() {
    let h = Harness::new();
    assert_eq!(h.create(&[100]), 0);
    assert_eq!(h.create(&[50, 50]), 1);
    assert_eq!(h.create(&[40, 30, 30]), 2);
    assert_eq!(h.client.get_all_project_ids(), soroban_sdk::vec![&h.env, 0, 1, 2]);
}

#[test]
fn test_create_project_initial_state() {
    let h = Harness::new();
    let id = h.create(&[40, 30, 30]);

    let project = h.client.get_project(&id);
    assert_eq!(project.name, String::from_str(&h.env, "Solar farm"));
    assert_eq!(project.creator, h.creator);
    assert_eq!(project.target, 10_000);
    assert_eq!(project.funds_raised, 0);
    assert_eq!(project.funds_released, 0);
    assert!(project.active);
    assert_eq!(project.created_at, NOW);
    assert_eq!(project.milestone_count, 3);

    let milestones = h.client.get_milestones(&id);
    assert_eq!(milestones.len(), 3);
    let first = milestones.get(0).unwrap();
    assert_eq!(first.title, String::from_str(&h.env, "Phase 1"));
    assert_eq!(first.percentage, 40);
    assert!(milestones.iter().all(|m| !m.completed && m.completed_at.is_none()));
}

#[test]
fn test_create_project_rejects_bad_percentage_sums() {
    let h = Harness::new();
    let cases: [&[u32]; 5] = [&[50, 49], &[60, 50], &[99], &[34, 33, 34], &[100, 0]];
    for percentages in cases {
        let (titles, pcts) = h.plan(percentages);
        let result = h.client.try_create_project(
            &h.creator,
            &String::from_str(&h.env, "p"),
            &String::from_str(&h.env, ""),
            &10_000,
            &titles,
            &pcts,
            &h.no_metadata(),
        );
        assert_eq!(result, Err(Ok(Error::InvalidMilestones)), "{percentages:?}");
    }
    assert!(h.client.get_all_project_ids().is_empty());
    assert_eq!(h.client.last_event_seq(), 0);
}

#[test]
fn test_create_project_rejects_malformed_input() {
    let h = Harness::new();
    let (titles, pcts) = h.plan(&[50, 50]);
    let name = String::from_str(&h.env, "p");
    let empty = String::from_str(&h.env, "");

    assert_eq!(
        h.client
            .try_create_project(&h.creator, &empty, &empty, &10_000, &titles, &pcts, &h.no_metadata()),
        Err(Ok(Error::InvalidProject))
    );
    assert_eq!(
        h.client
            .try_create_project(&h.creator, &name, &empty, &0, &titles, &pcts, &h.no_metadata()),
        Err(Ok(Error::InvalidAmount))
    );

    let mut short_titles = titles.clone();
    short_titles.pop_back();
    assert_eq!(
        h.client.try_create_project(
            &h.creator,
            &name,
            &empty,
            &10_000,
            &short_titles,
            &pcts,
            &h.no_metadata()
        ),
        Err(Ok(Error::InvalidMilestones))
    );

    let (no_titles, no_pcts) = h.plan(&[]);
    assert_eq!(
        h.client.try_create_project(
            &h.creator,
            &name,
            &empty,
            &10_000,
            &no_titles,
            &no_pcts,
            &h.no_metadata()
        ),
        Err(Ok(Error::InvalidMilestones))
    );

    let mut thresholds = Vec::new(&h.env);
    thresholds.push_back(10u64);
    let wrong_thresholds = ProjectMetadata {
        thresholds,
        ..h.no_metadata()
    };
    assert_eq!(
        h.client
            .try_create_project(&h.creator, &name, &empty, &10_000, &titles, &pcts, &wrong_thresholds),
        Err(Ok(Error::InvalidMilestones))
    );
}

#[test]
fn test_rejected_creation_does_not_consume_an_id() {
    let h = Harness::new();
    let (titles, pcts) = h.plan(&[70]);
    assert!(h
        .client
        .try_create_project(
            &h.creator,
            &String::from_str(&h.env, "p"),
            &String::from_str(&h.env, ""),
            &10_000,
            &titles,
            &pcts,
            &h.no_metadata()
        )
        .is_err());
    assert_eq!(h.create(&[100]), 0);
}

#[test]
fn test_create_project_stores_metadata() {
    let h = Harness::new();
    let (titles, pcts) = h.plan(&[50, 50]);
    let mut thresholds = Vec::new(&h.env);
    thresholds.push_back(500u64);
    thresholds.push_back(1_000u64);
    let metadata = ProjectMetadata {
        category: Some(String::from_str(&h.env, "solar")),
        evidence_subject: Some(String::from_str(&h.env, "site-7")),
        thresholds,
    };
    let id = h.client.create_project(
        &h.creator,
        &String::from_str(&h.env, "p"),
        &String::from_str(&h.env, "d"),
        &10_000,
        &titles,
        &pcts,
        &metadata,
    );
    assert_eq!(h.client.get_project(&id).metadata, metadata);
}

// ─────────────────────────────────────────────────────────
// fund_project
// ─────────────────────────────────────────────────────────

#[test]
fn test_fund_project_accumulates_totals_and_contributions() {
    let h = Harness::new();
    let id = h.create(&[100]);
    let bob = Address::generate(&h.env);
    let carol = Address::generate(&h.env);

    assert_eq!(h.fund(id, &bob, 300), 300);
    let before = h.client.get_project(&id).funds_raised;
    assert_eq!(h.fund(id, &carol, 200), 500);
    assert_funding_invariant(before, h.client.get_project(&id).funds_raised, 200);
    assert_eq!(h.fund(id, &bob, 100), 600);

    assert_eq!(h.client.get_contribution(&id, &bob), 400);
    assert_eq!(h.client.get_contribution(&id, &carol), 200);
    assert_eq!(h.client.get_contribution(&id, &h.oracle), 0);
    assert_eq!(h.client.get_contract_balance(), 600);
    assert_eq!(h.token.balance(&bob), 0);
    assert_all_invariants(&h.client, &h.token, &[bob, carol]);
}

#[test]
fn test_fund_project_rejects_non_positive_amounts() {
    let h = Harness::new();
    let id = h.create(&[100]);
    let bob = Address::generate(&h.env);
    h.mint(&bob, 100);

    assert_eq!(h.client.try_fund_project(&id, &bob, &0), Err(Ok(Error::InvalidAmount)));
    assert_eq!(h.client.try_fund_project(&id, &bob, &-5), Err(Ok(Error::InvalidAmount)));
    assert_eq!(h.client.get_project(&id).funds_raised, 0);
    assert_eq!(h.token.balance(&bob), 100);
}

#[test]
fn test_fund_unknown_project() {
    let h = Harness::new();
    let bob = Address::generate(&h.env);
    h.mint(&bob, 10);
    assert_eq!(h.client.try_fund_project(&9, &bob, &10), Err(Ok(Error::ProjectNotFound)));
}

#[test]
fn test_fund_project_overflow_leaves_state_untouched() {
    let h = Harness::new();
    let id = h.create(&[100]);
    let whale = Address::generate(&h.env);
    let bob = Address::generate(&h.env);
    h.fund(id, &whale, i128::MAX);
    h.mint(&bob, 1);

    assert_eq!(
        h.client.try_fund_project(&id, &bob, &1),
        Err(Ok(Error::ArithmeticOverflow))
    );
    assert_eq!(h.client.get_project(&id).funds_raised, i128::MAX);
    assert_eq!(h.token.balance(&bob), 1);
}

#[test]
fn test_fund_without_balance_fails() {
    let h = Harness::new();
    let id = h.create(&[100]);
    let broke = Address::generate(&h.env);
    assert!(h.client.try_fund_project(&id, &broke, &10).is_err());
    assert_eq!(h.client.get_project(&id).funds_raised, 0);
}

#[test]
fn test_fund_requires_funder_authorization() {
    let h = Harness::new();
    let id = h.create(&[100]);
    let bob = Address::generate(&h.env);
    h.mint(&bob, 50);

    h.env.set_auths(&[]);
    assert!(h.client.try_fund_project(&id, &bob, &50).is_err());
    assert_eq!(h.client.get_project(&id).funds_raised, 0);
    assert_eq!(h.token.balance(&bob), 50);
}

// ─────────────────────────────────────────────────────────
// verify_milestone
// ─────────────────────────────────────────────────────────

#[test]
fn test_verify_milestone_releases_to_creator() {
    let h = Harness::new();
    let id = h.create(&[40, 30, 30]);
    let bob = Address::generate(&h.env);
    h.fund(id, &bob, 1_000);
    let original = h.client.get_project(&id);

    h.env.ledger().set_timestamp(NOW + 60);
    assert_eq!(h.client.verify_milestone(&id, &0, &h.oracle), 400);

    let auths = h.env.auths();
    assert_eq!(auths.len(), 1);
    assert_eq!(auths[0].0, h.oracle);

    let milestone = h.client.get_milestones(&id).get(0).unwrap();
    assert!(milestone.completed);
    assert_eq!(milestone.completed_at, Some(NOW + 60));

    let project = h.client.get_project(&id);
    assert_eq!(project.funds_released, 400);
    assert_eq!(h.token.balance(&h.creator), 400);
    assert_eq!(h.client.get_contract_balance(), 600);
    assert_project_immutable_fields(&original, &project);
    assert_all_invariants(&h.client, &h.token, &[bob]);
}

#[test]
fn test_verify_by_non_oracle_is_unauthorized() {
    let h = Harness::new();
    let id = h.create(&[100]);
    h.fund(id, &Address::generate(&h.env), 1_000);

    assert_eq!(
        h.client.try_verify_milestone(&id, &0, &h.creator),
        Err(Ok(Error::NotAuthorized))
    );
    assert_eq!(h.client.get_project(&id).funds_released, 0);
    assert!(!h.client.get_milestones(&id).get(0).unwrap().completed);
}

#[test]
fn test_verify_with_oracle_identity_but_no_oracle_signature_fails() {
    let h = Harness::new();
    let id = h.create(&[100]);
    h.fund(id, &Address::generate(&h.env), 1_000);
    let seq = h.client.last_event_seq();

    h.env.set_auths(&[]);
    assert!(h.client.try_verify_milestone(&id, &0, &h.oracle).is_err());
    assert_eq!(h.client.get_project(&id).funds_released, 0);
    assert_eq!(h.token.balance(&h.creator), 0);
    assert_eq!(h.client.last_event_seq(), seq);
}

#[test]
fn test_verify_twice_is_rejected_without_side_effects() {
    let h = Harness::new();
    let id = h.create(&[50, 50]);
    h.fund(id, &Address::generate(&h.env), 1_000);
    h.client.verify_milestone(&id, &0, &h.oracle);
    let seq = h.client.last_event_seq();

    assert_eq!(
        h.client.try_verify_milestone(&id, &0, &h.oracle),
        Err(Ok(Error::AlreadyCompleted))
    );
    assert_eq!(h.client.get_project(&id).funds_released, 500);
    assert_eq!(h.client.last_event_seq(), seq);
}

#[test]
fn test_verify_out_of_range_index() {
    let h = Harness::new();
    let id = h.create(&[50, 50]);
    h.fund(id, &Address::generate(&h.env), 1_000);
    assert_eq!(
        h.client.try_verify_milestone(&id, &2, &h.oracle),
        Err(Ok(Error::MilestoneNotFound))
    );
    assert_eq!(
        h.client.try_verify_milestone(&7, &0, &h.oracle),
        Err(Ok(Error::ProjectNotFound))
    );
}

#[test]
fn test_verify_unfunded_project_has_nothing_to_release() {
    let h = Harness::new();
    let id = h.create(&[100]);
    assert_eq!(
        h.client.try_verify_milestone(&id, &0, &h.oracle),
        Err(Ok(Error::NothingToRelease))
    );
    assert!(!h.client.get_milestones(&id).get(0).unwrap().completed);
}

#[test]
fn test_verify_out_of_order_is_allowed() {
    let h = Harness::new();
    let id = h.create(&[20, 30, 50]);
    h.fund(id, &Address::generate(&h.env), 1_000);

    assert_eq!(h.client.verify_milestone(&id, &2, &h.oracle), 500);
    assert_eq!(h.client.verify_milestone(&id, &0, &h.oracle), 200);
    let done: std::vec::Vec<bool> = h.client.get_milestones(&id).iter().map(|m| m.completed).collect();
    assert_eq!(done, [true, false, true]);
}

// ─────────────────────────────────────────────────────────
// deactivate_project / update_oracle
// ─────────────────────────────────────────────────────────

#[test]
fn test_deactivate_by_non_creator_is_unauthorized() {
    let h = Harness::new();
    let id = h.create(&[100]);
    assert_eq!(
        h.client.try_deactivate_project(&id, &h.oracle),
        Err(Ok(Error::NotAuthorized))
    );
    assert!(h.client.get_project(&id).active);
}

#[test]
fn test_deactivate_blocks_funding_and_verification() {
    let h = Harness::new();
    let id = h.create(&[50, 50]);
    let bob = Address::generate(&h.env);
    h.fund(id, &bob, 1_000);
    h.client.verify_milestone(&id, &0, &h.oracle);

    assert_eq!(h.client.deactivate_project(&id, &h.creator), 500);
    assert!(!h.client.get_project(&id).active);

    h.mint(&bob, 10);
    assert_eq!(h.client.try_fund_project(&id, &bob, &10), Err(Ok(Error::InactiveProject)));
    assert_eq!(
        h.client.try_verify_milestone(&id, &1, &h.oracle),
        Err(Ok(Error::InactiveProject))
    );
    assert_eq!(
        h.client.try_deactivate_project(&id, &h.creator),
        Err(Ok(Error::InactiveProject))
    );
    // Undisbursed funds stay in escrow.
    assert_eq!(h.client.get_contract_balance(), 500);
}

#[test]
fn test_deactivate_unknown_project() {
    let h = Harness::new();
    assert_eq!(
        h.client.try_deactivate_project(&3, &h.creator),
        Err(Ok(Error::ProjectNotFound))
    );
}

#[test]
fn test_oracle_rotation() {
    let h = Harness::new();
    let id = h.create(&[50, 50]);
    h.fund(id, &Address::generate(&h.env), 1_000);
    let successor = Address::generate(&h.env);

    assert_eq!(
        h.client.try_update_oracle(&successor, &h.creator),
        Err(Ok(Error::NotAuthorized))
    );
    h.client.update_oracle(&successor, &h.oracle);
    assert_eq!(h.client.get_oracle(), successor);

    assert_eq!(
        h.client.try_verify_milestone(&id, &0, &h.oracle),
        Err(Ok(Error::NotAuthorized))
    );
    assert_eq!(h.client.verify_milestone(&id, &0, &successor), 500);
}

#[test]
fn test_reads_on_unknown_project() {
    let h = Harness::new();
    let someone = Address::generate(&h.env);
    assert_eq!(h.client.try_get_project(&0), Err(Ok(Error::ProjectNotFound)));
    assert_eq!(h.client.try_get_milestones(&0), Err(Ok(Error::ProjectNotFound)));
    assert_eq!(
        h.client.try_get_contribution(&0, &someone),
        Err(Ok(Error::ProjectNotFound))
    );
    assert_eq!(h.client.get_contract_balance(), 0);
}
