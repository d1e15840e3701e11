//! Log subscriptions on the streams contract.
//!
//! One subscription per (event id, entity id). Each runs as a spawned task
//! that decodes matching logs and forwards them into the caller's channel.
//! Dropping the `Subscription` aborts the task.

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::streams::codec::{encode_entity_id, encode_entity_id_numeric, normalize_entity_id};
use crate::streams::events::StreamEvent;
use crate::streams::schemas::StreamEventId;
use crate::streams::StreamError;

/// Handle for a live subscription.
#[derive(Debug)]
pub struct Subscription {
    event: StreamEventId,
    entity_id: u64,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(event: StreamEventId, entity_id: u64, task: JoinHandle<()>) -> Self {
        Self {
            event,
            entity_id,
            task: Some(task),
        }
    }

    /// A handle with no task behind it.
    pub fn detached(event: StreamEventId, entity_id: u64) -> Self {
        Self {
            event,
            entity_id,
            task: None,
        }
    }

    pub fn event(&self) -> StreamEventId {
        self.event
    }

    pub fn entity_id(&self) -> u64 {
        self.entity_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(false)
    }

    pub fn unsubscribe(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(event = %self.event, entity_id = self.entity_id, "unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort();
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start forwarding `event` for `entity_id` into `tx`.
    async fn subscribe(
        &self,
        event: StreamEventId,
        entity_id: u64,
        tx: UnboundedSender<StreamEvent>,
    ) -> Result<Subscription, StreamError>;
}

/// Streams contract client over a websocket provider.
#[derive(Clone)]
pub struct StreamClient {
    provider: DynProvider,
    streams_address: Address,
}

impl StreamClient {
    pub fn new(provider: DynProvider, streams_address: Address) -> Self {
        Self {
            provider,
            streams_address,
        }
    }

    pub async fn connect(ws_url: &str, streams_address: Address) -> Result<Self, StreamError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url))
            .await?
            .erased();
        info!(url = ws_url, streams = %streams_address, "streams client connected");
        Ok(Self::new(provider, streams_address))
    }

    /// Log filter for one event stream and entity. Both id encodings match.
    pub fn filter(&self, event: StreamEventId, entity_id: u64) -> Filter {
        Filter::new()
            .address(self.streams_address)
            .event_signature(event.topic())
            .topic1(vec![
                encode_entity_id(entity_id),
                encode_entity_id_numeric(entity_id),
            ])
    }
}

/// Decode a streams log and keep it only if it is for `entity_id`.
pub fn decode_log(event: StreamEventId, entity_id: u64, log: &Log) -> Result<Option<StreamEvent>, StreamError> {
    let topics = log.inner.data.topics();
    if topics.first() != Some(&event.topic()) {
        return Ok(None);
    }
    if let Some(topic_id) = topics.get(1).and_then(normalize_entity_id) {
        if topic_id != entity_id {
            return Ok(None);
        }
    }
    let decoded = StreamEvent::decode(event, &log.inner.data.data)?;
    // The topic may be absent or ambiguous; the payload's own id decides.
    if decoded.entity_id() != entity_id {
        return Ok(None);
    }
    Ok(Some(decoded))
}

#[async_trait]
impl EventSource for StreamClient {
    async fn subscribe(
        &self,
        event: StreamEventId,
        entity_id: u64,
        tx: UnboundedSender<StreamEvent>,
    ) -> Result<Subscription, StreamError> {
        let filter = self.filter(event, entity_id);
        let sub = self.provider.subscribe_logs(&filter).await?;
        let mut stream = sub.into_stream();
        info!(event = %event, entity_id, "subscribed");

        let task = tokio::spawn(async move {
            while let Some(log) = stream.next().await {
                match decode_log(event, entity_id, &log) {
                    Ok(Some(decoded)) => {
                        debug!(event = %decoded, tx = ?log.transaction_hash, "stream event");
                        if tx.send(decoded).is_err() {
                            debug!(event = %event, entity_id, "receiver dropped, stopping");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(event = %event, entity_id, error = %e, "undecodable stream log");
                    }
                }
            }
            debug!(event = %event, entity_id, "log stream ended");
        });

        Ok(Subscription::new(event, entity_id, task))
    }
}
