use alloy::primitives::{Address, Bytes, B256, U256};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, TestCaseError, TestRunner};
use stakescope::accountant::shares_to_tokens;
use stakescope::extractor::extract_candidates;
use stakescope::scanner::LogEvent;
use stakescope::types::{assign_percentages, DelegationRecord, DiscoveryTechnique, TokenAmount};

fn runner(cases: u32) -> TestRunner {
    TestRunner::new(ProptestConfig {
        cases,
        ..ProptestConfig::default()
    })
}

#[test]
fn test_delegation_percentages_sum_to_hundred() {
    let strategy = prop::collection::vec(1u64..1_000_000_000_000u64, 1..40);
    let result = runner(2_000).run(&strategy, |amounts| {
        let mut records = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| DelegationRecord {
                delegator: Address::with_last_byte(i as u8),
                shares: U256::from(*a),
                amount: TokenAmount::from_wei(U256::from(*a)),
                percentage: 0.0,
            })
            .collect::<Vec<_>>();
        assign_percentages(&mut records);
        let sum: f64 = records.iter().map(|r| r.percentage).sum();
        let tolerance = records.len() as f64 * 1e-6 + 1e-9;
        if (sum - 100.0).abs() > tolerance {
            return Err(TestCaseError::fail(format!("percentages sum to {sum}")));
        }
        if records.iter().any(|r| r.percentage < 0.0 || r.percentage > 100.0) {
            return Err(TestCaseError::fail("percentage out of range"));
        }
        Ok(())
    });
    if let Err(err) = result {
        panic!("delegation percentage proptest failed: {err}");
    }
}

#[test]
fn test_share_conversion_never_exceeds_pool() {
    let word = any::<[u8; 32]>().prop_map(U256::from_be_bytes);
    let strategy = (word.clone(), word.clone(), word);
    let result = runner(2_000).run(&strategy, |(a, b, c)| {
        let (shares, total_shares) = if a <= c { (a, c) } else { (c, a) };
        let amount = shares_to_tokens(shares, b, total_shares);
        if !total_shares.is_zero() && amount > b {
            return Err(TestCaseError::fail(format!(
                "{shares} of {total_shares} shares over {b} tokens gave {amount}"
            )));
        }
        Ok(())
    });
    if let Err(err) = result {
        panic!("share conversion proptest failed: {err}");
    }
}

#[test]
fn test_topic_slot_addresses_are_always_extracted() {
    let address = any::<[u8; 20]>()
        .prop_map(Address::from)
        .prop_filter("non-zero", |a| *a != Address::ZERO);
    let strategy = (address, any::<u64>());
    let result = runner(1_000).run(&strategy, |(address, block)| {
        let event = LogEvent {
            address: Address::repeat_byte(0xaa),
            topics: vec![B256::repeat_byte(0xee), address.into_word()],
            data: Bytes::new(),
            tx_hash: None,
            block_number: block,
        };
        let set = extract_candidates(&[event]);
        if set.technique_of(&address) != Some(DiscoveryTechnique::TopicSlot) {
            return Err(TestCaseError::fail(format!("{address:#x} not extracted")));
        }
        if set.len() != 1 {
            return Err(TestCaseError::fail(format!("expected one candidate, got {}", set.len())));
        }
        Ok(())
    });
    if let Err(err) = result {
        panic!("extraction proptest failed: {err}");
    }
}
