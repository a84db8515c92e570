//! Stakescope library surface.
//!
//! Discovers the validator set of a proof-of-stake chain by scanning staking
//! contract logs over JSON-RPC, verifies every candidate with on-chain probes,
//! and keeps a generation-stamped snapshot that [`service::StakeIndex`] serves
//! alongside on-demand delegator and transaction analytics.

pub mod abi;
pub mod accountant;
pub mod analytics;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod runtime;
pub mod scanner;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;
pub mod verifier;
