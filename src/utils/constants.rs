/// Base-unit scale of the staking token.
pub const TOKEN_DECIMALS: u8 = 18;

/// Minimum stake a verified validator must hold (0.001 token).
pub const MIN_STAKE_FLOOR_WEI: u128 = 1_000_000_000_000_000;

/// Commission rates are expressed in basis points where 1_000_000 is 100%.
pub const COMMISSION_RATE_MAX: u64 = 1_000_000;

/// Offset of the amount word inside `undelegate(uint256)` calldata.
pub const UNDELEGATE_AMOUNT_OFFSET: usize = 4;

/// Calldata shorter than this is not worth a raw string scan.
pub const RAW_METADATA_MIN_INPUT_LEN: usize = 256;
