//! Integration tests for the allocation queue through the dispatcher.
//!
//! Exercises reservation accounting against real ledger balances, FIFO
//! execution with auto-skip, explicit skipping, and role gating.

mod common;

use common::{addr, fixture, Fixture};
use treasury_contracts::{AllocationState, TreasuryError};
use treasury_protocol::{Amount, CollaboratorError, TokenId};

fn two_tokens(f: &Fixture, balance: Amount) -> (TokenId, TokenId) {
    let (usdc, dai) = (addr("usdc"), addr("dai"));
    f.fund(&usdc, balance);
    f.fund(&dai, balance);
    (usdc, dai)
}

/// Reserved amount per token equals the sum of pending entries.
fn assert_reservations_conserved(f: &Fixture, tokens: &[TokenId]) {
    let snapshot = f.treasury.snapshot();
    for token in tokens {
        let pending: Amount = snapshot
            .allocations
            .iter()
            .filter(|e| e.state == AllocationState::Pending)
            .flat_map(|e| e.tokens.iter().zip(&e.amounts))
            .filter(|(t, _)| *t == token)
            .map(|(_, a)| *a)
            .sum();
        assert_eq!(snapshot.reserved.get(token).copied().unwrap_or(0), pending);
    }
}

#[test]
fn skip_only_passes_aborted_entries() {
    let mut f = fixture();
    let (usdc, dai) = two_tokens(&f, 1_000);
    let recipient = addr("grantee");

    for _ in 0..2 {
        f.treasury
            .request_allocation(&f.governor, recipient, vec![usdc, dai], vec![500, 500])
            .unwrap();
    }
    // Fully reserved.
    assert!(matches!(
        f.treasury.request_allocation(&f.governor, recipient, vec![usdc], vec![1]),
        Err(TreasuryError::AmountExceedsUnallocatedBalance { .. })
    ));

    f.treasury.abort_allocation(&f.guardian, 0).unwrap();
    f.treasury.abort_allocation(&f.guardian, 1).unwrap();
    f.treasury
        .request_allocation(&f.governor, recipient, vec![usdc, dai], vec![500, 500])
        .unwrap();

    f.treasury.skip_aborted_allocation(&f.guardian).unwrap();
    f.treasury.skip_aborted_allocation(&f.guardian).unwrap();
    assert_eq!(
        f.treasury.skip_aborted_allocation(&f.guardian),
        Err(TreasuryError::NotAborted)
    );
    assert_eq!(f.treasury.snapshot().allocation_head, 2);
    assert_reservations_conserved(&f, &[usdc, dai]);
}

#[test]
fn execute_skips_aborted_head() {
    let mut f = fixture();
    let (usdc, _) = two_tokens(&f, 1_000);
    let recipient = addr("grantee");

    f.treasury
        .request_allocation(&f.governor, addr("other"), vec![usdc], vec![300])
        .unwrap();
    f.treasury.abort_allocation(&f.guardian, 0).unwrap();
    f.treasury
        .request_allocation(&f.governor, recipient, vec![usdc], vec![200])
        .unwrap();

    f.advance(60);
    let executed = f.treasury.execute_allocation(&f.guardian).unwrap();
    assert_eq!(executed.id, 1);
    assert_eq!(f.balance(&usdc, &recipient), 200);
    assert_eq!(f.treasury_balance(&usdc), 800);

    let snapshot = f.treasury.snapshot();
    assert_eq!(snapshot.allocations[0].state, AllocationState::Aborted);
    assert_eq!(snapshot.allocations[1].state, AllocationState::Executed);
    assert_eq!(snapshot.allocation_head, 2);
    assert!(snapshot.reserved.is_empty());
}

#[test]
fn execute_respects_delay_and_order() {
    let mut f = fixture();
    let (usdc, _) = two_tokens(&f, 1_000);
    assert_eq!(
        f.treasury.execute_allocation(&f.guardian),
        Err(TreasuryError::NoPendingAllocation)
    );

    f.treasury
        .request_allocation(&f.governor, addr("first"), vec![usdc], vec![100])
        .unwrap();
    f.advance(30);
    f.treasury
        .request_allocation(&f.governor, addr("second"), vec![usdc], vec![100])
        .unwrap();

    f.advance(29);
    assert!(matches!(
        f.treasury.execute_allocation(&f.guardian),
        Err(TreasuryError::TooEarly { .. })
    ));
    f.advance(1);
    assert_eq!(f.treasury.execute_allocation(&f.guardian).unwrap().recipient, addr("first"));
    assert!(matches!(
        f.treasury.execute_allocation(&f.guardian),
        Err(TreasuryError::TooEarly { .. })
    ));
    f.advance(30);
    assert_eq!(f.treasury.execute_allocation(&f.guardian).unwrap().recipient, addr("second"));
    assert_eq!(
        f.treasury.execute_allocation(&f.guardian),
        Err(TreasuryError::NoPendingAllocation)
    );
}

#[test]
fn roles_are_enforced() {
    let mut f = fixture();
    let (usdc, _) = two_tokens(&f, 1_000);
    let before = f.treasury.snapshot();

    assert_eq!(
        f.treasury.request_allocation(&f.guardian, addr("r"), vec![usdc], vec![1]),
        Err(TreasuryError::NotAuthorized)
    );
    assert_eq!(f.treasury.execute_allocation(&f.governor), Err(TreasuryError::NotGuardian));
    assert_eq!(f.treasury.abort_allocation(&f.governor, 0), Err(TreasuryError::NotGuardian));
    assert_eq!(
        f.treasury.skip_aborted_allocation(&f.stranger),
        Err(TreasuryError::NotGuardian)
    );
    assert_eq!(f.treasury.snapshot(), before);
}

#[test]
fn abort_targets_only_pending_entries() {
    let mut f = fixture();
    let (usdc, _) = two_tokens(&f, 1_000);
    assert_eq!(
        f.treasury.abort_allocation(&f.guardian, 0),
        Err(TreasuryError::AllocationNotPending(0))
    );
    f.treasury
        .request_allocation(&f.governor, addr("r"), vec![usdc], vec![400])
        .unwrap();
    f.treasury.abort_allocation(&f.guardian, 0).unwrap();
    assert_eq!(f.treasury.unallocated_balance(&usdc), 1_000);
    assert_eq!(
        f.treasury.abort_allocation(&f.guardian, 0),
        Err(TreasuryError::AllocationNotPending(0))
    );
}

#[test]
fn failed_payout_reverts_queue() {
    let mut f = fixture();
    let (usdc, _) = two_tokens(&f, 1_000);
    let vault = addr("vault");
    f.treasury
        .request_allocation(&f.governor, addr("r"), vec![usdc], vec![600])
        .unwrap();

    // Emergency withdrawal ignores reservations and drains the balance.
    f.treasury.pause(&f.governor).unwrap();
    f.treasury.request_emergency_withdrawal(&f.governor, vault).unwrap();
    f.advance(60);
    f.treasury.emergency_withdraw(&f.governor, &[usdc], &[1_000]).unwrap();
    assert_eq!(f.treasury.unallocated_balance(&usdc), 0);

    let before = f.treasury.snapshot();
    let err = f.treasury.execute_allocation(&f.guardian).unwrap_err();
    assert!(matches!(
        err,
        TreasuryError::Collaborator(CollaboratorError::InsufficientBalance { requested: 600, .. })
    ));
    assert_eq!(f.treasury.snapshot(), before);
    assert_eq!(f.treasury.snapshot().allocations[0].state, AllocationState::Pending);
}

#[test]
fn reservations_track_every_transition() {
    let mut f = fixture();
    let (usdc, dai) = two_tokens(&f, 10_000);
    let r = addr("r");
    f.treasury.request_allocation(&f.governor, r, vec![usdc, dai], vec![100, 200]).unwrap();
    f.treasury.request_allocation(&f.governor, r, vec![dai, dai], vec![300, 400]).unwrap();
    f.treasury.request_allocation(&f.governor, r, vec![usdc], vec![500]).unwrap();
    assert_reservations_conserved(&f, &[usdc, dai]);

    f.treasury.abort_allocation(&f.guardian, 1).unwrap();
    assert_reservations_conserved(&f, &[usdc, dai]);

    f.advance(60);
    f.treasury.execute_allocation(&f.guardian).unwrap();
    f.treasury.execute_allocation(&f.guardian).unwrap();
    assert_reservations_conserved(&f, &[usdc, dai]);
    assert_eq!(f.balance(&usdc, &r), 600);
    assert_eq!(f.balance(&dai, &r), 200);
}
