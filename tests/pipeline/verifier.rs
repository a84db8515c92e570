use crate::chain_fixture::{tokens, ChainFixture};
use alloy::primitives::{Address, U256};
use stakescope::abi;
use stakescope::extractor::CandidateAddress;
use stakescope::scanner::{LogScanner, ScanPolicies};
use stakescope::types::DiscoveryTechnique;
use stakescope::verifier::{
    RejectionReason, ValidatorVerifier, Verdict, VerificationStage, VerifierSettings,
};
use std::time::Duration;

fn verifier(fixture: &std::sync::Arc<ChainFixture>) -> ValidatorVerifier {
    ValidatorVerifier::new(
        LogScanner::new(fixture.pool(), ScanPolicies::default()),
        VerifierSettings {
            min_stake_floor: U256::from(1_000_000_000_000_000u64),
            batch_size: 3,
            probe_timeout: Duration::from_secs(2),
        },
    )
}

fn candidate(address: Address) -> CandidateAddress {
    CandidateAddress {
        address,
        technique: DiscoveryTechnique::TopicSlot,
    }
}

#[tokio::test]
async fn test_verifier_accepts_full_capability_surface() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x21);
    fixture.set_validator(validator, tokens(5), tokens(10), 75_000, 3);

    match verifier(&fixture).verify(candidate(validator)).await {
        Verdict::Accepted(accepted) => {
            assert_eq!(accepted.address, validator);
            assert_eq!(accepted.probes.tokens, tokens(5));
            assert_eq!(accepted.probes.delegator_shares, tokens(10));
            assert_eq!(accepted.probes.withdrawal_fee_gwei, U256::from(3u64));
            assert_eq!(accepted.commission_bps, 75_000);
        }
        Verdict::Rejected(r) => panic!("expected acceptance, got rejection: {}", r.reason),
    }
}

#[tokio::test]
async fn test_verifier_rejects_when_withdrawal_fee_probe_fails() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x22);
    fixture.set_call(validator, abi::encode_tokens(), tokens(5));
    fixture.set_call(validator, abi::encode_delegator_shares(), tokens(5));
    fixture.set_call(validator, abi::encode_commission_rate(), U256::from(10_000u64));

    match verifier(&fixture).verify(candidate(validator)).await {
        Verdict::Rejected(rejection) => {
            assert_eq!(rejection.stage, VerificationStage::StakeAboveFloor);
            assert!(matches!(
                rejection.reason,
                RejectionReason::WithdrawalFeeUnavailable(_)
            ));
        }
        Verdict::Accepted(_) => panic!("a failing withdrawal fee probe must reject"),
    }
    assert_eq!(fixture.calls("eth_call"), 4);
}

#[tokio::test]
async fn test_verifier_stops_probing_at_commission_out_of_range() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x23);
    fixture.set_validator(validator, tokens(5), tokens(5), 1_000_001, 0);

    match verifier(&fixture).verify(candidate(validator)).await {
        Verdict::Rejected(rejection) => {
            assert_eq!(rejection.stage, VerificationStage::ProbedCommission);
            assert_eq!(
                rejection.reason,
                RejectionReason::CommissionOutOfRange(U256::from(1_000_001u64))
            );
        }
        Verdict::Accepted(_) => panic!("commission above the maximum must reject"),
    }
    assert_eq!(fixture.calls("eth_call"), 3, "fee probe must not run");
}

#[tokio::test]
async fn test_verifier_rejects_stake_below_floor() {
    let fixture = ChainFixture::new("primary", 1_000);
    let validator = Address::repeat_byte(0x24);
    fixture.set_validator(validator, U256::from(999u64), U256::from(999u64), 0, 0);

    let report = verifier(&fixture).verify_all(&[candidate(validator)]).await;
    assert!(report.accepted.is_empty());
    assert_eq!(report.rejected_at(VerificationStage::CommissionInRange), 1);
}

#[tokio::test]
async fn test_verify_all_probes_each_address_once_and_keeps_order() {
    let fixture = ChainFixture::new("primary", 1_000);
    let first = Address::repeat_byte(0x25);
    let second = Address::repeat_byte(0x26);
    let contract_without_surface = Address::repeat_byte(0x27);
    fixture.set_validator(first, tokens(2), tokens(2), 0, 0);
    fixture.set_validator(second, tokens(3), tokens(3), 0, 0);

    let report = verifier(&fixture)
        .verify_all(&[
            candidate(first),
            candidate(contract_without_surface),
            candidate(second),
            candidate(first),
        ])
        .await;

    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(
        report.accepted.iter().map(|a| a.address).collect::<Vec<_>>(),
        vec![first, second]
    );
    assert_eq!(report.rejected_at(VerificationStage::Candidate), 1);
    assert_eq!(fixture.calls("eth_call"), 4 + 4 + 1);
}
