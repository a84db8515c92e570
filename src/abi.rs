//! Staking and delegation contract surface.

use crate::types::TxType;
use alloy::primitives::{Address, Bytes, B256};
use alloy::sol_types::{SolCall, SolEvent};

alloy::sol! {
    function tokens() external view returns (uint256);
    function delegatorShares() external view returns (uint256);
    function commissionRate() external view returns (uint256);
    function withdrawalFeeInGwei() external view returns (uint256);
    function getDelegation(address delegator) external view returns (uint256 shares);

    struct Description {
        string moniker;
        string identity;
        string website;
        string securityContact;
        string details;
    }

    struct CommissionRates {
        uint256 rate;
        uint256 maxRate;
        uint256 maxChangeRate;
    }

    function createValidator(
        Description description,
        CommissionRates commission,
        uint256 minSelfDelegation,
        bytes pubkey
    ) external payable;
    function delegate() external payable;
    function undelegate(uint256 amount) external;
    function withdraw() external;
    function updateCommissionRate(uint256 rate) external;
    function redelegate(address dstValidator, uint256 amount) external;
    function stake() external payable;

    event ValidatorCreated(address indexed validator, address indexed owner);
    event Delegated(address indexed delegator, address indexed validator, uint256 amount);
    event Undelegated(address indexed delegator, address indexed validator, uint256 amount);
    event Withdrawn(address indexed delegator, uint256 amount);
    event CommissionUpdated(address indexed validator, uint256 rate);
    event Redelegated(address indexed delegator, address indexed dstValidator, uint256 amount);
    event Staked(address indexed staker, uint256 amount);
}

pub fn selector_of(input: &[u8]) -> Option<[u8; 4]> {
    let head = input.get(..4)?;
    let mut out = [0u8; 4];
    out.copy_from_slice(head);
    Some(out)
}

/// Fixed selector map used for transaction classification.
pub fn classify_selector(selector: [u8; 4]) -> Option<TxType> {
    match selector {
        s if s == createValidatorCall::SELECTOR => Some(TxType::CreateValidator),
        s if s == delegateCall::SELECTOR => Some(TxType::Delegate),
        s if s == undelegateCall::SELECTOR => Some(TxType::Undelegate),
        s if s == withdrawCall::SELECTOR => Some(TxType::Withdraw),
        s if s == updateCommissionRateCall::SELECTOR => Some(TxType::UpdateCommission),
        s if s == redelegateCall::SELECTOR => Some(TxType::Redelegate),
        s if s == stakeCall::SELECTOR => Some(TxType::Stake),
        _ => None,
    }
}

/// Receipt topic0 → type, applied as the final override.
pub fn classify_event_topic(topic0: &B256) -> Option<TxType> {
    match *topic0 {
        t if t == ValidatorCreated::SIGNATURE_HASH => Some(TxType::CreateValidator),
        t if t == Delegated::SIGNATURE_HASH => Some(TxType::Delegate),
        t if t == Undelegated::SIGNATURE_HASH => Some(TxType::Undelegate),
        t if t == Withdrawn::SIGNATURE_HASH => Some(TxType::Withdraw),
        t if t == CommissionUpdated::SIGNATURE_HASH => Some(TxType::UpdateCommission),
        t if t == Redelegated::SIGNATURE_HASH => Some(TxType::Redelegate),
        t if t == Staked::SIGNATURE_HASH => Some(TxType::Stake),
        _ => None,
    }
}

pub fn is_create_validator(input: &[u8]) -> bool {
    selector_of(input) == Some(createValidatorCall::SELECTOR)
}

pub fn encode_tokens() -> Bytes {
    tokensCall {}.abi_encode().into()
}

pub fn encode_delegator_shares() -> Bytes {
    delegatorSharesCall {}.abi_encode().into()
}

pub fn encode_commission_rate() -> Bytes {
    commissionRateCall {}.abi_encode().into()
}

pub fn encode_withdrawal_fee() -> Bytes {
    withdrawalFeeInGweiCall {}.abi_encode().into()
}

pub fn encode_get_delegation(delegator: Address) -> Bytes {
    getDelegationCall { delegator }.abi_encode().into()
}
