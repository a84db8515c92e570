//! Metadata extraction from `createValidator`-style calldata.
//!
//! Three strategies, strongest first: structured ABI decode, a length-prefixed
//! string scan when the selector matched but the layout did not, and the same
//! scan on unknown calldata long enough to plausibly carry a description.

use crate::abi;
use crate::types::{Provenance, ValidatorMetadata};
use crate::utils::constants::RAW_METADATA_MIN_INPUT_LEN;
use crate::utils::hex::word_at;
use alloy::primitives::U256;
use alloy::sol_types::SolCall;

const WORD: usize = 32;
const MAX_STRING_LEN: usize = 512;
const DETAILS_MIN_LEN: usize = 40;
const IDENTITY_LEN: usize = 16;

/// Structured decode of `createValidator(Description, CommissionRates, ...)`.
pub fn decode_create_validator(input: &[u8]) -> Option<ValidatorMetadata> {
    if !abi::is_create_validator(input) {
        return None;
    }
    let call = abi::createValidatorCall::abi_decode(input, true).ok()?;
    let d = call.description;
    let rate = call.commission.rate;
    let mut meta = ValidatorMetadata::empty(Provenance::Decoded);
    meta.moniker = d.moniker.trim().to_string();
    meta.identity = d.identity.trim().to_string();
    meta.website = d.website.trim().to_string();
    meta.security_contact = d.securityContact.trim().to_string();
    meta.details = d.details.trim().to_string();
    meta.commission_bps = (rate <= U256::from(u64::MAX)).then(|| rate.to::<u64>());
    Some(meta)
}

fn is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (0x20..=0x7e).contains(b))
}

/// Every ABI-style string (length word followed by printable bytes) found at a
/// word boundary after the selector. First-seen order, duplicates dropped.
pub fn scan_length_prefixed_strings(input: &[u8]) -> Vec<String> {
    let start = if input.len() % WORD == 4 { 4 } else { 0 };
    let mut out: Vec<String> = Vec::new();
    let mut offset = start;
    while offset + WORD <= input.len() {
        let Some(len_word) = word_at(input, offset) else {
            break;
        };
        if len_word > U256::ZERO && len_word <= U256::from(MAX_STRING_LEN) {
            let len = len_word.to::<usize>();
            let body_start = offset + WORD;
            if let Some(body) = input.get(body_start..body_start + len) {
                if is_printable(body) {
                    let text = String::from_utf8_lossy(body).trim().to_string();
                    if !text.is_empty() && !out.contains(&text) {
                        out.push(text);
                    }
                }
            }
        }
        offset += WORD;
    }
    out
}

fn looks_like_identity(s: &str) -> bool {
    s.len() == IDENTITY_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn looks_like_details(s: &str) -> bool {
    s.len() >= DETAILS_MIN_LEN && s.split_whitespace().count() >= 3
}

/// Assign scanned strings to metadata fields; first match per field wins.
pub fn classify_strings(strings: &[String], provenance: Provenance) -> Option<ValidatorMetadata> {
    let mut meta = ValidatorMetadata::empty(provenance);
    let mut any = false;
    for s in strings {
        let lower = s.to_ascii_lowercase();
        let slot = if lower.contains("http") {
            &mut meta.website
        } else if s.contains('@') {
            &mut meta.security_contact
        } else if looks_like_identity(s) {
            &mut meta.identity
        } else if looks_like_details(s) {
            &mut meta.details
        } else {
            &mut meta.moniker
        };
        if slot.is_empty() {
            *slot = s.clone();
            any = true;
        }
    }
    any.then_some(meta)
}

/// Run the calldata strategies in order and return the first that yields anything.
pub fn extract_from_input(input: &[u8]) -> Option<ValidatorMetadata> {
    if abi::is_create_validator(input) {
        if let Some(meta) = decode_create_validator(input) {
            return Some(meta);
        }
        return classify_strings(&scan_length_prefixed_strings(input), Provenance::HexExtracted);
    }
    let known_selector = abi::selector_of(input)
        .and_then(abi::classify_selector)
        .is_some();
    if !known_selector && input.len() >= RAW_METADATA_MIN_INPUT_LEN {
        return classify_strings(&scan_length_prefixed_strings(input), Provenance::BasicInference);
    }
    None
}
