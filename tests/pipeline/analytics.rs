use crate::chain_fixture::{fixture_config, seed_validator, tokens, ChainFixture};
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::{SolCall, SolEvent};
use stakescope::abi;
use stakescope::analytics::{ConcentrationLabel, DelegatorStats};
use stakescope::error::StakeError;
use stakescope::service::StakeIndex;
use stakescope::types::{TxStatus, TxType};

fn amount_word(amount: u64) -> Vec<u8> {
    U256::from(amount).to_be_bytes::<32>().to_vec()
}

#[tokio::test]
async fn test_transaction_history_classifies_and_orders_newest_first() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x61);
    let delegator = Address::repeat_byte(0x71);
    let delegate_tx = B256::repeat_byte(0x81);
    let undelegate_tx = B256::repeat_byte(0x82);

    fixture.push_log(
        validator,
        vec![abi::Delegated::SIGNATURE_HASH, delegator.into_word(), validator.into_word()],
        amount_word(5),
        delegate_tx,
        950,
    );
    fixture.push_log(
        validator,
        vec![abi::Undelegated::SIGNATURE_HASH, delegator.into_word(), validator.into_word()],
        amount_word(777),
        undelegate_tx,
        960,
    );
    fixture.add_transaction(
        delegate_tx,
        delegator,
        validator,
        abi::delegateCall {}.abi_encode(),
        tokens(5),
        950,
    );
    fixture.add_receipt(delegate_tx, true, &[abi::Delegated::SIGNATURE_HASH], 950);
    fixture.add_transaction(
        undelegate_tx,
        delegator,
        validator,
        abi::undelegateCall {
            amount: U256::from(777u64),
        }
        .abi_encode(),
        U256::ZERO,
        960,
    );
    fixture.add_receipt(undelegate_tx, false, &[], 960);
    fixture.set_timestamp(950, 1_700_000_000);
    fixture.set_timestamp(960, 1_700_000_100);

    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());
    let history = index
        .transaction_history(&format!("{validator:#x}"))
        .await
        .expect("history should be available");

    assert_eq!(history.transactions.len(), 2);
    assert_eq!(history.lookups_failed, 0);
    let newest = &history.transactions[0];
    assert_eq!(newest.hash, undelegate_tx);
    assert_eq!(newest.tx_type, TxType::Undelegate);
    assert_eq!(newest.status, TxStatus::Failed);
    assert_eq!(newest.amount.wei(), U256::from(777u64));
    assert_eq!(newest.timestamp, 1_700_000_100);

    let oldest = &history.transactions[1];
    assert_eq!(oldest.tx_type, TxType::Delegate);
    assert_eq!(oldest.status, TxStatus::Success);
    assert_eq!(oldest.amount.wei(), tokens(5));
    assert_eq!(oldest.from, delegator);

    assert_eq!(history.summary.total, 2);
    assert_eq!(history.summary.by_status[&TxStatus::Failed], 1);
    assert_eq!(fixture.calls("eth_getBlockByNumber"), 2);
}

#[tokio::test]
async fn test_history_skips_transactions_without_receipt() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x62);
    let tx_hash = B256::repeat_byte(0x83);
    fixture.push_log(validator, vec![abi::Withdrawn::SIGNATURE_HASH], Vec::new(), tx_hash, 990);
    fixture.add_transaction(
        tx_hash,
        Address::repeat_byte(0x72),
        validator,
        abi::withdrawCall {}.abi_encode(),
        U256::ZERO,
        990,
    );

    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());
    let history = index
        .transaction_history(&format!("{validator:#x}"))
        .await
        .expect("history should be available");
    assert!(history.transactions.is_empty());
    assert_eq!(history.lookups_failed, 1);
}

#[tokio::test]
async fn test_delegator_analytics_ranks_discovered_and_known_delegators() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x63);
    let discovered = Address::repeat_byte(0x73);
    let known = Address::repeat_byte(0x74);
    fixture.push_log(
        validator,
        vec![abi::Delegated::SIGNATURE_HASH, discovered.into_word(), validator.into_word()],
        amount_word(5),
        B256::repeat_byte(0x84),
        970,
    );
    fixture.set_call(validator, abi::encode_tokens(), U256::from(1_000u64));
    fixture.set_call(validator, abi::encode_delegator_shares(), U256::from(2_000u64));
    fixture.set_delegation(validator, discovered, U256::from(500u64));
    fixture.set_delegation(validator, known, U256::from(1_500u64));

    let known_list = format!("{known:#x}");
    let config = fixture_config(&[("KNOWN_DELEGATOR_ADDRESSES", known_list.as_str())]);
    let index = StakeIndex::from_pools(&config, fixture.pool(), Vec::new());
    let report = index
        .delegator_analytics(&format!("{validator:#x}"))
        .await
        .expect("analytics should be available");

    assert_eq!(report.delegators.len(), 2);
    assert_eq!(report.delegators[0].delegator, known);
    assert_eq!(report.delegators[0].amount.wei(), U256::from(750u64));
    assert_eq!(report.delegators[0].percentage, 75.0);
    assert_eq!(report.delegators[1].delegator, discovered);
    assert_eq!(report.delegators[1].amount.wei(), U256::from(250u64));
    assert_eq!(report.coverage.known_probed, 1);

    let stats = &report.stats;
    assert_eq!(stats.total_staked.wei(), U256::from(1_000u64));
    assert_eq!(stats.median.wei(), U256::from(500u64));
    assert_eq!(stats.gini, 0.25);
    assert_eq!(stats.concentration, ConcentrationLabel::VeryHigh);
}

#[tokio::test]
async fn test_validator_without_delegators_reports_empty_stats() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x64);
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    let report = index
        .delegator_analytics(&format!("{validator:#x}"))
        .await
        .expect("analytics should be available");
    assert!(report.delegators.is_empty());
    assert_eq!(report.stats, DelegatorStats::empty());
    assert_eq!(
        serde_json::to_value(report.stats.concentration).expect("label serializes"),
        serde_json::json!("No delegators")
    );
}

#[tokio::test]
async fn test_wallet_delegations_need_a_snapshot() {
    let fixture = ChainFixture::new("primary", 1_000);
    let seeded = vec![
        seed_validator(&fixture, 0, "Aurora", 1),
        seed_validator(&fixture, 1, "Borealis", 3),
    ];
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());
    let wallet = format!("{:#x}", seeded[1].owner);

    let err = index
        .wallet_delegations(&wallet)
        .await
        .expect_err("no snapshot yet");
    assert!(err.is_not_ready());

    index.refresh_now().await.expect("refresh publishes");
    let positions = index
        .wallet_delegations(&wallet)
        .await
        .expect("snapshot is published");
    assert_eq!(positions.validators_checked, 2);
    assert_eq!(positions.positions.len(), 1);
    let position = &positions.positions[0];
    assert_eq!(position.validator, seeded[1].address);
    assert_eq!(position.moniker.as_deref(), Some("Borealis"));
    assert_eq!(position.amount.wei(), tokens(1));
    assert_eq!(position.percentage, 100.0);
    assert_eq!(positions.total.wei(), tokens(1));
}

#[tokio::test]
async fn test_invalid_addresses_are_rejected_before_any_rpc() {
    let fixture = ChainFixture::new("primary", 1_000);
    let index = StakeIndex::from_pools(&fixture_config(&[]), fixture.pool(), Vec::new());

    for raw in ["0x1234", "not-an-address", "0xZZ00000000000000000000000000000000000000"] {
        assert!(matches!(
            index.transaction_history(raw).await,
            Err(StakeError::InvalidAddress(_))
        ));
        assert!(matches!(
            index.delegator_analytics(raw).await,
            Err(StakeError::InvalidAddress(_))
        ));
        assert!(matches!(
            index.wallet_delegations(raw).await,
            Err(StakeError::InvalidAddress(_))
        ));
    }
    assert_eq!(fixture.total_calls(), 0);
}
