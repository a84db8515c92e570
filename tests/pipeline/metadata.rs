use crate::chain_fixture::{create_validator_input, fixture_config, staking, tokens, ChainFixture};
use alloy::primitives::{Address, Bytes, B256};
use alloy::sol_types::SolEvent;
use stakescope::abi;
use stakescope::metadata::{MetadataResolver, ResolutionPath, ResolverSettings};
use stakescope::scanner::{LogEvent, LogScanner, ScanPolicies};
use stakescope::storage::SnapshotStore;
use stakescope::types::Provenance;
use std::sync::Arc;
use std::time::Duration;

fn resolver(
    primary: &Arc<ChainFixture>,
    officials: &[&Arc<ChainFixture>],
    store: Arc<SnapshotStore>,
) -> MetadataResolver {
    let config = fixture_config(&[]);
    let officials = officials
        .iter()
        .map(|f| {
            (
                "official".to_string(),
                LogScanner::new(f.pool(), ScanPolicies::default()),
            )
        })
        .collect();
    MetadataResolver::new(
        LogScanner::new(primary.pool(), ScanPolicies::default()),
        officials,
        store,
        ResolverSettings::from_config(&config),
    )
}

fn created_event(validator: Address, tx_hash: B256) -> LogEvent {
    LogEvent {
        address: staking(),
        topics: vec![abi::ValidatorCreated::SIGNATURE_HASH, validator.into_word()],
        data: Bytes::new(),
        tx_hash: Some(tx_hash),
        block_number: 950,
    }
}

#[tokio::test]
async fn test_decoded_metadata_is_cached_and_second_resolve_is_free() {
    let fixture = ChainFixture::new("primary", 1_000);
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(900)));
    let validator = Address::repeat_byte(0x51);
    let owner = Address::repeat_byte(0x52);
    let tx_hash = B256::repeat_byte(0x53);
    fixture.add_transaction(
        tx_hash,
        owner,
        staking(),
        create_validator_input("Aurora", 50_000),
        tokens(1),
        950,
    );
    let hints = vec![created_event(validator, tx_hash)];
    let resolver = resolver(&fixture, &[], Arc::clone(&store));

    let first = resolver.resolve(validator, &hints, 1_000, false).await;
    assert_eq!(first.path, ResolutionPath::Decoded);
    assert_eq!(first.metadata.moniker, "Aurora");
    assert_eq!(first.metadata.provenance, Provenance::Decoded);
    assert_eq!(first.metadata.owner, Some(owner));
    assert_eq!(first.metadata.commission_bps, Some(50_000));
    assert!(first.metadata.avatar_url.is_some());
    assert_eq!(fixture.calls("eth_getLogs"), 0, "decoded hint must short-circuit the search");

    fixture.reset_counts();
    let second = resolver.resolve(validator, &hints, 1_000, false).await;
    assert_eq!(second.path, ResolutionPath::Cached);
    assert_eq!(second.metadata, first.metadata);
    assert_eq!(fixture.total_calls(), 0);
    assert_eq!(store.metadata_len(), 1);
}

#[tokio::test]
async fn test_unresolvable_validator_gets_synthesized_name_and_is_retried() {
    let fixture = ChainFixture::new("primary", 1_000);
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(900)));
    let validator: Address = "0x00000000000000000000000000000000ab12cd34"
        .parse()
        .expect("valid address");
    let resolver = resolver(&fixture, &[], Arc::clone(&store));

    let resolution = resolver.resolve(validator, &[], 1_000, false).await;
    assert_eq!(resolution.path, ResolutionPath::Synthesized);
    assert_eq!(resolution.metadata.moniker, "Validator-12cd34");
    assert_eq!(resolution.metadata.provenance, Provenance::Fallback);

    fixture.reset_counts();
    let batch = resolver
        .resolve_all(&[validator], Arc::new(Vec::new()), 1_000)
        .await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].1.path, ResolutionPath::Synthesized);
    assert!(
        fixture.calls("eth_getLogs") > 0,
        "a cached fallback entry must be searched again"
    );
}

#[tokio::test]
async fn test_official_endpoint_recovers_missing_metadata() {
    let primary = ChainFixture::new("primary", 1_000);
    let official = ChainFixture::new("official", 5_000);
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(900)));
    let validator = Address::repeat_byte(0x54);
    let owner = Address::repeat_byte(0x55);
    let tx_hash = B256::repeat_byte(0x56);
    official.push_log(
        staking(),
        vec![abi::ValidatorCreated::SIGNATURE_HASH, validator.into_word(), owner.into_word()],
        Vec::new(),
        tx_hash,
        4_900,
    );
    official.add_transaction(
        tx_hash,
        owner,
        staking(),
        create_validator_input("Borealis", 20_000),
        tokens(1),
        4_900,
    );

    let resolution = resolver(&primary, &[&official], store)
        .resolve(validator, &[], 1_000, false)
        .await;
    assert_eq!(
        resolution.path,
        ResolutionPath::OfficialEndpoint("official".to_string())
    );
    assert_eq!(resolution.metadata.moniker, "Borealis");
    assert_eq!(official.calls("eth_blockNumber"), 1);
}

#[tokio::test]
async fn test_weaker_finding_never_replaces_cached_decode() {
    let fixture = ChainFixture::new("primary", 1_000);
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(900)));
    let validator = Address::repeat_byte(0x57);
    let mut decoded = stakescope::types::ValidatorMetadata::empty(Provenance::Decoded);
    decoded.moniker = "Cygnus".to_string();
    assert!(store.offer_metadata(&validator, decoded, false));

    let mut guess = stakescope::types::ValidatorMetadata::empty(Provenance::BasicInference);
    guess.moniker = "cygnus-guess".to_string();
    assert!(!store.offer_metadata(&validator, guess, false));

    let resolution = resolver(&fixture, &[], Arc::clone(&store))
        .resolve(validator, &[], 1_000, false)
        .await;
    assert_eq!(resolution.path, ResolutionPath::Cached);
    assert_eq!(resolution.metadata.moniker, "Cygnus");
    assert_eq!(fixture.total_calls(), 0);
}
