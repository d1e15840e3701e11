//! Event-stream side channel: schemas, payload codec, typed events,
//! log subscriptions and publishing.

pub mod client;
pub mod codec;
pub mod events;
pub mod publisher;
pub mod schemas;

pub use client::{EventSource, StreamClient, Subscription};
pub use codec::{SchemaCodec, StreamPayload};
pub use events::StreamEvent;
pub use publisher::{PublishRequest, StreamPublisher};
pub use schemas::{SchemaKind, StreamEventId};

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("transaction failed: {0}")]
    PendingTx(#[from] alloy::providers::PendingTransactionError),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("abi decode failed: {0}")]
    Abi(String),
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is not a {expected}")]
    FieldType { field: String, expected: String },
    #[error("not an entity id: {0}")]
    BadEntityId(B256),
    #[error("unknown event id `{0}`")]
    UnknownEvent(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("setup failed: {0}")]
    Setup(String),
}
