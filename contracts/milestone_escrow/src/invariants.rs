extern crate std;

use soroban_sdk::{token, Address, Vec};

use crate::types::{Milestone, Project};
use crate::MilestoneEscrowClient;

/// INV-1: A project never releases more than it raised.
pub fn assert_released_within_raised(project: &Project) {
    assert!(
        project.funds_released <= project.funds_raised,
        "INV-1 violated: project {} released {} of {} raised",
        project.id,
        project.funds_released,
        project.funds_raised
    );
}

/// INV-2: Project target must always be positive.
pub fn assert_target_positive(project: &Project) {
    assert!(
        project.target > 0,
        "INV-2 violated: project {} has non-positive target ({})",
        project.id,
        project.target
    );
}

/// INV-3: Milestone percentages sum to exactly 100.
pub fn assert_percentages_sum_to_100(project_id: u64, milestones: &Vec<Milestone>) {
    let total: u32 = milestones.iter().map(|m| m.percentage).sum();
    assert_eq!(
        total, 100,
        "INV-3 violated: project {project_id} milestone percentages sum to {total}"
    );
}

/// INV-4: A completed milestone carries its completion timestamp and an
/// incomplete one does not.
pub fn assert_completion_timestamps(milestones: &Vec<Milestone>) {
    for (i, m) in milestones.iter().enumerate() {
        assert_eq!(
            m.completed,
            m.completed_at.is_some(),
            "INV-4 violated: milestone {i} completed={} completed_at={:?}",
            m.completed,
            m.completed_at
        );
    }
}

/// INV-5: After funding `amount`, raised grows by exactly `amount`.
pub fn assert_funding_invariant(raised_before: i128, raised_after: i128, amount: i128) {
    assert_eq!(
        raised_after,
        raised_before + amount,
        "INV-5 violated: funding invariant broken: {} + {} != {}",
        raised_before,
        amount,
        raised_after
    );
}

/// INV-6: Project IDs are sequential starting from 0.
pub fn assert_sequential_ids(ids: &Vec<u64>) {
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id, i as u64, "INV-6 violated: expected id {i}, got {id}");
    }
}

/// INV-7: Contributions from `funders` sum to the project's raised total.
pub fn assert_contributions_sum(client: &MilestoneEscrowClient, project_id: u64, funders: &[Address]) {
    let project = client.get_project(&project_id);
    let total: i128 = funders
        .iter()
        .map(|funder| client.get_contribution(&project_id, funder))
        .sum();
    assert_eq!(
        total, project.funds_raised,
        "INV-7 violated: contributions for project {project_id} sum to {total}, raised is {}",
        project.funds_raised
    );
}

/// INV-8: The escrow holds everything raised minus everything released.
pub fn assert_balance_conservation(client: &MilestoneEscrowClient) {
    let (raised, released) = client
        .get_all_project_ids()
        .iter()
        .map(|id| client.get_project(&id))
        .fold((0i128, 0i128), |(r, d), p| {
            (r + p.funds_raised, d + p.funds_released)
        });
    let balance = client.get_contract_balance();
    assert_eq!(
        balance,
        raised - released,
        "INV-8 violated: balance {balance} != raised {raised} - released {released}"
    );
}

/// INV-9: Fields fixed at creation do not change.
pub fn assert_project_immutable_fields(original: &Project, current: &Project) {
    assert_eq!(original.id, current.id, "INV-9 violated: project id changed");
    assert_eq!(
        original.creator, current.creator,
        "INV-9 violated: project creator changed"
    );
    assert_eq!(
        original.target, current.target,
        "INV-9 violated: project target changed"
    );
    assert_eq!(
        original.milestone_count, current.milestone_count,
        "INV-9 violated: milestone plan resized"
    );
    assert_eq!(
        original.created_at, current.created_at,
        "INV-9 violated: creation timestamp changed"
    );
}

/// INV-10: A creator's asset balance equals what its projects released.
/// Holds only while the creator receives the asset from nowhere else.
pub fn assert_payouts_match(client: &MilestoneEscrowClient, token: &token::Client, creator: &Address) {
    let released: i128 = client
        .get_all_project_ids()
        .iter()
        .map(|id| client.get_project(&id))
        .filter(|p| &p.creator == creator)
        .map(|p| p.funds_released)
        .sum();
    assert_eq!(
        token.balance(creator),
        released,
        "INV-10 violated: payout to creator does not match released total"
    );
}

/// Run every invariant over the whole ledger.
pub fn assert_all_invariants(client: &MilestoneEscrowClient, token: &token::Client, funders: &[Address]) {
    let ids = client.get_all_project_ids();
    assert_sequential_ids(&ids);
    for id in ids.iter() {
        let project = client.get_project(&id);
        let milestones = client.get_milestones(&id);
        assert_released_within_raised(&project);
        assert_target_positive(&project);
        assert_percentages_sum_to_100(id, &milestones);
        assert_completion_timestamps(&milestones);
        assert_contributions_sum(client, id, funders);
        assert_payouts_match(client, token, &project.creator);
    }
    assert_balance_conservation(client);
}
