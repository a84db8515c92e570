use crate::chain_fixture::{fixture_config, staking, ChainFixture};
use alloy::primitives::B256;
use stakescope::scanner::{chunk_range, BlockRange, LogScanner, ScanPolicies};
use std::time::Duration;

#[tokio::test]
async fn test_failed_chunk_is_counted_and_other_chunks_kept() {
    let fixture = ChainFixture::new("primary", 1_000);
    for (i, block) in [10u64, 500, 950].into_iter().enumerate() {
        fixture.push_log(
            staking(),
            vec![B256::repeat_byte(0x01)],
            Vec::new(),
            B256::repeat_byte(0x30 + i as u8),
            block,
        );
    }
    fixture.fail_logs_between(401, 800);

    let scanner = LogScanner::new(fixture.pool(), ScanPolicies::from_config(&fixture_config(&[])));
    let ranges = chunk_range(1, 1_000, 400);
    assert_eq!(ranges.len(), 3);
    let outcome = scanner
        .scan_chunks(Some(staking()), &ranges, Duration::from_secs(5))
        .await;

    assert_eq!(outcome.ok_chunks, 2);
    assert_eq!(outcome.failed_chunks, 1);
    let blocks = outcome.events.iter().map(|e| e.block_number).collect::<Vec<_>>();
    assert_eq!(blocks, vec![10, 950]);
    assert_eq!(
        fixture.calls("eth_getLogs"),
        3,
        "a failed range is attempted once"
    );
}

#[tokio::test]
async fn test_failed_single_range_reads_as_empty() {
    let fixture = ChainFixture::new("primary", 1_000);
    fixture.push_log(staking(), vec![B256::repeat_byte(0x01)], Vec::new(), B256::repeat_byte(0x31), 500);
    fixture.fail_logs_between(500, 500);

    let scanner = LogScanner::new(fixture.pool(), ScanPolicies::from_config(&fixture_config(&[])));
    let events = scanner
        .scan_range(Some(staking()), BlockRange::new(401, 800), Duration::from_secs(5))
        .await;
    assert!(events.is_empty());
}
