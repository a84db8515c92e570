use crate::chain_fixture::{fixture_config, seed_validator, tokens, ChainFixture};
use alloy::primitives::U256;
use stakescope::controller::RefreshOutcome;
use stakescope::error::{RefreshError, StakeError};
use stakescope::service::StakeIndex;
use stakescope::storage::SnapshotStore;
use stakescope::types::{
    ControllerPhase, DiscoveryTechnique, NetworkSnapshot, Provenance, ScanProvenance, TokenAmount,
};
use std::sync::Arc;
use std::time::Duration;

fn seeded_network() -> (Arc<ChainFixture>, Vec<crate::chain_fixture::SeededValidator>) {
    let fixture = ChainFixture::new("primary", 1_000);
    let validators = vec![
        seed_validator(&fixture, 0, "Aurora", 1),
        seed_validator(&fixture, 1, "Borealis", 3),
        seed_validator(&fixture, 2, "Cygnus", 2),
    ];
    (fixture, validators)
}

#[tokio::test]
async fn test_refresh_publishes_ranked_snapshot() {
    let (fixture, seeded) = seeded_network();
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    let outcome = index.refresh().await;
    assert!(
        matches!(outcome, RefreshOutcome::Published { generation: 1, validators: 3, .. }),
        "unexpected outcome: {outcome:?}"
    );

    let snapshot = index.snapshot().expect("snapshot should be published");
    let order = snapshot.validators.iter().map(|v| v.address).collect::<Vec<_>>();
    assert_eq!(order, vec![seeded[1].address, seeded[2].address, seeded[0].address]);
    assert_eq!(snapshot.total_staked.wei(), tokens(6));
    assert_eq!(snapshot.active_count, 3);
    assert_eq!(snapshot.inactive_count, 0);
    assert_eq!(snapshot.validators[0].voting_power_pct, 50.0);
    assert_eq!(snapshot.scan.from_block, 1);
    assert_eq!(snapshot.scan.to_block, 1_000);
    assert_eq!(snapshot.scan.chunks, 3);

    let top = &snapshot.validators[0];
    assert_eq!(top.technique, DiscoveryTechnique::TopicSlot);
    let metadata = top.metadata.as_ref().expect("metadata resolved");
    assert_eq!(metadata.moniker, "Borealis");
    assert_eq!(metadata.provenance, Provenance::Decoded);
    assert_eq!(metadata.owner, Some(seeded[1].owner));
    assert_eq!(top.self_delegation.wei(), tokens(1));

    let status = index.status();
    assert!(status.ready);
    assert!(!status.stale);
    assert_eq!(status.phase, ControllerPhase::Ready);
    assert_eq!(status.validator_count, 3);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot_and_marks_stale() {
    let (fixture, _) = seeded_network();
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());
    assert!(matches!(index.refresh().await, RefreshOutcome::Published { .. }));

    fixture.set_head_down(true);
    let outcome = index.refresh().await;
    match outcome {
        RefreshOutcome::Degraded {
            serving_generation,
            reason,
            ..
        } => {
            assert_eq!(serving_generation, Some(1));
            assert!(reason.contains("chain head unavailable"), "reason: {reason}");
        }
        other => panic!("expected a degraded outcome, got {other:?}"),
    }

    let snapshot = index.snapshot().expect("previous snapshot must stay served");
    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.validators.len(), 3);
    let status = index.status();
    assert!(status.ready);
    assert!(status.stale);
    assert!(status.degraded);
    assert!(status.degraded_since_ms.is_some());

    fixture.set_head_down(false);
    match index.refresh().await {
        RefreshOutcome::Published { generation, .. } => assert!(generation > 1),
        other => panic!("expected recovery, got {other:?}"),
    }
    let status = index.status();
    assert!(!status.stale);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_cold_start_reports_not_ready() {
    let fixture = ChainFixture::new("primary", 1_000);
    fixture.set_head_down(true);
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    let err = index.snapshot().expect_err("nothing published yet");
    assert!(err.is_not_ready());

    let outcome = index.refresh().await;
    assert!(matches!(
        outcome,
        RefreshOutcome::Degraded { serving_generation: None, .. }
    ));
    let err = index.snapshot().expect_err("still nothing published");
    assert!(err.is_not_ready());
    assert!(err.to_string().contains("last refresh failed"));
    assert!(!index.status().ready);
}

#[tokio::test]
async fn test_sanity_gate_rejects_thin_scan() {
    let (fixture, _) = seeded_network();
    let config = fixture_config(&[("SANITY_MIN_VALIDATORS", "5")]);
    let index = StakeIndex::from_pools(&config, fixture.pool(), Vec::new());

    match index.refresh().await {
        RefreshOutcome::Degraded { reason, .. } => {
            assert!(reason.contains("below the sanity minimum of 5"), "reason: {reason}")
        }
        other => panic!("expected the sanity gate to trip, got {other:?}"),
    }
    assert!(index.snapshot().is_err());
    assert_eq!(
        fixture.calls("eth_getTransactionByHash"),
        3,
        "metadata must not be resolved once the gate trips"
    );
}

#[tokio::test]
async fn test_concurrent_refreshes_publish_in_generation_order() {
    let (fixture, _) = seeded_network();
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    let (a, b) = tokio::join!(index.refresh(), index.refresh());
    let generations = [a, b]
        .into_iter()
        .filter_map(|o| match o {
            RefreshOutcome::Published { generation, .. } => Some(generation),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(generations.len(), 2);
    assert_eq!(index.status().generation, 2);
}

#[tokio::test]
async fn test_refresh_now_returns_published_snapshot() {
    let (fixture, _) = seeded_network();
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    let published = index.refresh_now().await.expect("refresh publishes");
    assert_eq!(published.generation, 1);
    assert_eq!(published.validators.len(), 3);
    let served = index.snapshot().expect("snapshot is live");
    assert!(Arc::ptr_eq(&published, &served));
}

#[tokio::test]
async fn test_refresh_now_cold_start_failure_is_not_ready() {
    let fixture = ChainFixture::new("primary", 1_000);
    fixture.set_head_down(true);
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    let err = index.refresh_now().await.expect_err("nothing to serve");
    assert!(err.is_not_ready(), "unexpected error: {err}");
    assert!(err.to_string().contains("chain head unavailable"));
}

#[tokio::test]
async fn test_sanity_failure_after_publish_keeps_previous_snapshot() {
    let (fixture, seeded) = seeded_network();
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());
    let published = index.refresh_now().await.expect("first refresh publishes");

    // Two of three validators drop to zero stake: one survivor, minimum is two.
    fixture.set_validator(seeded[0].address, U256::ZERO, U256::ZERO, 50_000, 0);
    fixture.set_validator(seeded[2].address, U256::ZERO, U256::ZERO, 50_000, 0);

    let err = index.refresh_now().await.expect_err("sanity gate trips");
    match &err {
        StakeError::Refresh(RefreshError::Degraded { reason, serving }) => {
            assert_eq!(*serving, 1);
            assert!(reason.contains("below the sanity minimum of 2"), "reason: {reason}");
        }
        other => panic!("expected a degraded refresh, got {other:?}"),
    }
    assert!(!err.is_not_ready());

    let served = index.snapshot().expect("previous snapshot must stay served");
    assert!(Arc::ptr_eq(&published, &served));
    assert_eq!(served.validators.len(), 3);
    assert_eq!(served.total_staked.wei(), tokens(6));

    let status = index.status();
    assert!(status.ready && status.stale && status.degraded);
    assert_eq!(status.generation, 1);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("sanity minimum")));
}

#[tokio::test]
async fn test_readers_keep_previous_snapshot_while_refresh_is_in_flight() {
    let (fixture, _) = seeded_network();
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());
    let first = index.refresh_now().await.expect("first refresh publishes");

    fixture.set_head_down(true);
    assert!(index.refresh_now().await.is_err());
    fixture.set_head_down(false);

    let gate = fixture.hold_logs();
    let background = tokio::spawn({
        let index = index.clone();
        async move { index.refresh().await }
    });
    gate.entered().await;

    let during = index.snapshot().expect("previous snapshot still served");
    assert!(Arc::ptr_eq(&first, &during));
    assert_eq!(during.validators.len(), 3);
    let status = index.status();
    assert_eq!(status.phase, ControllerPhase::Scanning);
    assert!(status.ready);
    assert!(status.degraded, "a cycle in progress does not clear degradation");
    assert!(status.stale);
    assert!(status.degraded_since_ms.is_some());
    assert_eq!(status.generation, 1);

    gate.open();
    let outcome = background.await.expect("refresh task completes");
    let generation = match outcome {
        RefreshOutcome::Published { generation, .. } => generation,
        other => panic!("expected a publish, got {other:?}"),
    };
    let after = index.snapshot().expect("new snapshot published");
    assert_eq!(after.generation, generation);
    assert!(generation > first.generation);
    assert_eq!(first.generation, 1);
    assert_eq!(first.validators.len(), 3);

    let status = index.status();
    assert!(!status.degraded && !status.stale);
    assert!(status.degraded_since_ms.is_none());
}

fn empty_snapshot(generation: u64) -> NetworkSnapshot {
    NetworkSnapshot {
        generation,
        validators: Vec::new(),
        total_staked: TokenAmount::ZERO,
        total_active_stake: TokenAmount::ZERO,
        active_count: 0,
        inactive_count: 0,
        scan: ScanProvenance::default(),
        built_at_ms: 1,
        build_duration_ms: 0,
    }
}

#[test]
fn test_store_discards_older_generation() {
    let store = SnapshotStore::new(Duration::from_secs(900));
    assert!(store.publish(empty_snapshot(2)).is_ok());
    match store.publish(empty_snapshot(1)) {
        Err(RefreshError::Superseded { generation, current }) => {
            assert_eq!(generation, 1);
            assert_eq!(current, 2);
        }
        other => panic!("older generation must be discarded, got {other:?}"),
    }
    assert_eq!(store.current_generation(), 2);
}

#[test]
fn test_not_ready_error_is_distinguishable() {
    let err = StakeError::NotReady("cold start".to_string());
    assert!(err.is_not_ready());
    assert!(!StakeError::InvalidAddress("0x1".to_string()).is_not_ready());
}
