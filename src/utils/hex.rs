use crate::error::StakeError;
use alloy::primitives::{Address, Bytes, B256, U256};
use serde_json::Value;
use std::str::FromStr;

/// Clean a hex string by removing "0x" prefix and whitespace
pub fn clean_hex(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Boundary validation: exactly `0x` followed by 40 hex digits.
pub fn parse_strict_address(raw: &str) -> Result<Address, StakeError> {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("0x") else {
        return Err(StakeError::InvalidAddress(trimmed.to_string()));
    };
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StakeError::InvalidAddress(trimmed.to_string()));
    }
    Address::from_str(trimmed).map_err(|_| StakeError::InvalidAddress(trimmed.to_string()))
}

/// Lowercased `0x` hex key used for every address-keyed set and cache.
pub fn address_key(address: &Address) -> String {
    format!("{address:#x}")
}

pub fn block_tag(block_number: u64) -> String {
    format!("0x{block_number:x}")
}

/// Parse a JSON-RPC quantity (`"0x1a"`) into u64.
pub fn quantity_u64(value: &Value) -> Option<u64> {
    let raw = value.as_str()?;
    let hex = clean_hex(raw);
    if hex.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(hex, 16).ok()
}

/// Parse a JSON-RPC quantity into U256.
pub fn quantity_u256(value: &Value) -> Option<U256> {
    let raw = value.as_str()?;
    let hex = clean_hex(raw);
    if hex.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(hex, 16).ok()
}

pub fn field_address(obj: &Value, key: &str) -> Option<Address> {
    let raw = obj.get(key)?.as_str()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "0x" {
        return None;
    }
    Address::from_str(trimmed).ok()
}

pub fn field_b256(obj: &Value, key: &str) -> Option<B256> {
    B256::from_str(obj.get(key)?.as_str()?.trim()).ok()
}

pub fn field_bytes(obj: &Value, key: &str) -> Option<Bytes> {
    let raw = obj.get(key)?.as_str()?.trim();
    if raw.is_empty() || raw == "0x" {
        return Some(Bytes::new());
    }
    Bytes::from_str(raw).ok()
}

/// Read the 32-byte big-endian word starting at `offset`.
pub fn word_at(data: &[u8], offset: usize) -> Option<U256> {
    let end = offset.checked_add(32)?;
    let word = data.get(offset..end)?;
    Some(U256::from_be_slice(word))
}

/// Decode the first return word of an `eth_call`, tolerating struct-shaped returns.
pub fn first_word(data: &[u8]) -> Option<U256> {
    word_at(data, 0)
}
