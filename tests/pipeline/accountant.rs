use crate::chain_fixture::ChainFixture;
use alloy::primitives::{Address, U256};
use stakescope::abi;
use stakescope::accountant::{DelegationAccountant, DelegationSource};
use stakescope::scanner::{LogScanner, ScanPolicies};
use std::time::Duration;

fn accountant(fixture: &std::sync::Arc<ChainFixture>) -> DelegationAccountant {
    DelegationAccountant::new(
        LogScanner::new(fixture.pool(), ScanPolicies::default()),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn test_delegation_converts_shares_at_pool_ratio() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x31);
    let delegator = Address::repeat_byte(0x32);
    fixture.set_call(validator, abi::encode_tokens(), U256::from(1_000u64));
    fixture.set_call(validator, abi::encode_delegator_shares(), U256::from(2_000u64));
    fixture.set_delegation(validator, delegator, U256::from(500u64));

    let quote = accountant(&fixture).compute_delegation(validator, delegator).await;
    assert_eq!(quote.source, DelegationSource::Computed);
    assert_eq!(quote.shares, U256::from(500u64));
    assert_eq!(quote.amount.wei(), U256::from(250u64));
    assert!(quote.is_positive());
}

#[tokio::test]
async fn test_zero_shares_skip_pool_reads() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x33);
    let delegator = Address::repeat_byte(0x34);
    fixture.set_delegation(validator, delegator, U256::ZERO);

    let quote = accountant(&fixture).compute_delegation(validator, delegator).await;
    assert_eq!(quote.source, DelegationSource::ZeroShares);
    assert!(quote.amount.is_zero());
    assert_eq!(fixture.calls("eth_call"), 1);
}

#[tokio::test]
async fn test_failed_delegation_read_yields_zero_quote() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x35);

    let quote = accountant(&fixture)
        .compute_delegation(validator, Address::repeat_byte(0x36))
        .await;
    assert!(matches!(quote.source, DelegationSource::CallFailed(_)));
    assert!(!quote.is_positive());
}

#[tokio::test]
async fn test_pool_read_failure_keeps_shares_but_no_amount() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x37);
    let delegator = Address::repeat_byte(0x38);
    fixture.set_delegation(validator, delegator, U256::from(10u64));
    fixture.set_call(validator, abi::encode_tokens(), U256::from(100u64));

    let quote = accountant(&fixture).compute_delegation(validator, delegator).await;
    assert!(matches!(quote.source, DelegationSource::PoolUnavailable(_)));
    assert_eq!(quote.shares, U256::from(10u64));
    assert!(quote.amount.is_zero());
}
