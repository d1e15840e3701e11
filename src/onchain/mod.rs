//! SecureFlow escrow contract access.
//!
//! - `abi`: `sol!` bindings for the escrow and data streams contracts
//! - `types`: domain projections of contract reads (`EscrowSummary`, ratings)
//! - `client`: `EscrowReader` / `EscrowWriter` seams and the alloy-backed
//!   `SecureFlowClient`
//!
//! Reads are plain request/response round trips; nothing here caches.

pub mod abi;
pub mod client;
pub mod types;

pub use client::{ApplicationTuple, ContractError, EscrowReader, EscrowWriter, SecureFlowClient};
pub use types::{short_address, EscrowRating, EscrowStatus, EscrowSummary, FreelancerRating};
