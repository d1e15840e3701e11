//! Client side of the SecureFlow escrow marketplace.
//!
//! Contract reads and writes, application decoding, job scanning,
//! notifications and the event-stream watcher, shared by the `secureflow`,
//! `approvals` and `register-schemas` binaries.

pub mod actions;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod jobs;
pub mod notify;
pub mod onchain;
pub mod store;
pub mod streams;
pub mod subscriptions;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_utils;
