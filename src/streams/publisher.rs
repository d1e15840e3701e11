//! Publishing to the streams contract.
//!
//! Every publish writes one data stream record (keyed by a readable id such
//! as `job_7`) and emits one event whose first argument topic is the entity
//! id. The event data carries the same encoded payload so subscribers can
//! decode it straight from the log.

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use tracing::info;

use crate::onchain::abi::IDataStreams;
use crate::streams::codec::{encode_entity_id, text_to_bytes32, SchemaCodec, StreamPayload};
use crate::streams::schemas::{SchemaKind, StreamEventId};
use crate::streams::StreamError;

/// A ready-to-send `setAndEmitEvents` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub data_streams: Vec<IDataStreams::DataStream>,
    pub event_streams: Vec<IDataStreams::EventStream>,
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Build the request for `payload` published as `event` about `entity_id`.
pub fn build_request(
    event: StreamEventId,
    data_key: &str,
    entity_id: u64,
    payload: &StreamPayload,
) -> Result<PublishRequest, StreamError> {
    let kind = event.schema();
    let data = SchemaCodec::for_kind(kind)?.encode(payload)?;
    Ok(PublishRequest {
        data_streams: vec![IDataStreams::DataStream {
            id: text_to_bytes32(data_key)?,
            schemaId: kind.id(),
            data: data.clone().into(),
        }],
        event_streams: vec![IDataStreams::EventStream {
            id: event.as_str().to_string(),
            argumentTopics: vec![encode_entity_id(entity_id)],
            data: data.into(),
        }],
    })
}

pub fn job_posting(
    job_id: u64,
    creator: Address,
    title: &str,
    description: &str,
    budget: U256,
    status: u8,
    timestamp: u64,
) -> Result<PublishRequest, StreamError> {
    let payload = StreamPayload::new()
        .with_uint("timestamp", U256::from(timestamp), 64)
        .with_bytes32("jobId", encode_entity_id(job_id))
        .with_address("creator", creator)
        .with_string("title", title)
        .with_string("description", description)
        .with_uint("budget", budget, 256)
        .with_uint("status", U256::from(status), 8);
    build_request(StreamEventId::JobPosted, &format!("job_{job_id}"), job_id, &payload)
}

/// `event` must be one of the milestone event ids.
pub fn milestone_update(
    event: StreamEventId,
    escrow_id: u64,
    milestone_index: u8,
    status: u8,
    submitter: Address,
    description: &str,
    timestamp: u64,
) -> Result<PublishRequest, StreamError> {
    if event.schema() != SchemaKind::MilestoneUpdate {
        return Err(StreamError::Schema(format!("{event} is not a milestone event")));
    }
    let payload = StreamPayload::new()
        .with_uint("timestamp", U256::from(timestamp), 64)
        .with_bytes32("escrowId", encode_entity_id(escrow_id))
        .with_uint("milestoneIndex", U256::from(milestone_index), 8)
        .with_uint("status", U256::from(status), 8)
        .with_address("submitter", submitter)
        .with_string("description", description);
    build_request(
        event,
        &format!("milestone_{escrow_id}_{milestone_index}"),
        escrow_id,
        &payload,
    )
}

pub fn escrow_status(
    escrow_id: u64,
    old_status: u8,
    new_status: u8,
    initiator: Address,
    timestamp: u64,
) -> Result<PublishRequest, StreamError> {
    let payload = StreamPayload::new()
        .with_uint("timestamp", U256::from(timestamp), 64)
        .with_bytes32("escrowId", encode_entity_id(escrow_id))
        .with_uint("oldStatus", U256::from(old_status), 8)
        .with_uint("newStatus", U256::from(new_status), 8)
        .with_address("initiator", initiator);
    build_request(
        StreamEventId::EscrowStatusChanged,
        &format!("escrow_status_{escrow_id}"),
        escrow_id,
        &payload,
    )
}

pub fn application(
    job_id: u64,
    application_id: &str,
    applicant: Address,
    cover_letter: &str,
    proposed_timeline: &str,
    timestamp: u64,
) -> Result<PublishRequest, StreamError> {
    let payload = StreamPayload::new()
        .with_uint("timestamp", U256::from(timestamp), 64)
        .with_bytes32("jobId", encode_entity_id(job_id))
        .with_bytes32("applicationId", text_to_bytes32(application_id)?)
        .with_address("applicant", applicant)
        .with_string("coverLetter", cover_letter)
        .with_string("proposedTimeline", proposed_timeline);
    build_request(
        StreamEventId::ApplicationSubmitted,
        &format!("application_{application_id}"),
        job_id,
        &payload,
    )
}

pub fn dispute(
    escrow_id: u64,
    dispute_id: &str,
    milestone_index: u8,
    initiator: Address,
    status: u8,
    timestamp: u64,
) -> Result<PublishRequest, StreamError> {
    let payload = StreamPayload::new()
        .with_uint("timestamp", U256::from(timestamp), 64)
        .with_bytes32("escrowId", encode_entity_id(escrow_id))
        .with_bytes32("disputeId", text_to_bytes32(dispute_id)?)
        .with_uint("milestoneIndex", U256::from(milestone_index), 8)
        .with_address("initiator", initiator)
        .with_uint("status", U256::from(status), 8);
    build_request(
        StreamEventId::DisputeCreated,
        &format!("dispute_{dispute_id}"),
        escrow_id,
        &payload,
    )
}

pub fn rating(
    escrow_id: u64,
    freelancer: Address,
    rater: Address,
    rating: u8,
    average_rating: U256,
    timestamp: u64,
) -> Result<PublishRequest, StreamError> {
    let payload = StreamPayload::new()
        .with_uint("timestamp", U256::from(timestamp), 64)
        .with_bytes32("escrowId", encode_entity_id(escrow_id))
        .with_address("freelancer", freelancer)
        .with_address("rater", rater)
        .with_uint("rating", U256::from(rating), 8)
        .with_uint("averageRating", average_rating, 256);
    build_request(
        StreamEventId::FreelancerRated,
        &format!("rating_{escrow_id}"),
        escrow_id,
        &payload,
    )
}

/// Signing client for the streams contract.
pub struct StreamPublisher {
    contract: IDataStreams::IDataStreamsInstance<DynProvider>,
}

impl StreamPublisher {
    pub fn new(streams_address: Address, provider: DynProvider) -> Self {
        Self {
            contract: IDataStreams::new(streams_address, provider),
        }
    }

    pub fn connect(rpc_url: &str, streams_address: Address, private_key: &str) -> Result<Self, StreamError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| StreamError::Setup(format!("invalid private key: {e}")))?;
        let url = rpc_url
            .parse()
            .map_err(|e| StreamError::Setup(format!("bad rpc url {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().wallet(signer).connect_http(url).erased();
        Ok(Self::new(streams_address, provider))
    }

    pub fn now() -> u64 {
        now_millis()
    }

    pub async fn send(&self, request: PublishRequest) -> Result<TxHash, StreamError> {
        let event = request
            .event_streams
            .first()
            .map(|e| e.id.clone())
            .unwrap_or_default();
        let pending = self
            .contract
            .setAndEmitEvents(request.data_streams, request.event_streams)
            .send()
            .await?;
        let tx_hash = pending.watch().await?;
        info!(event = %event, tx = %tx_hash, "published to streams");
        Ok(tx_hash)
    }

    /// Register every schema, skipping ones that already exist.
    pub async fn register_schemas(&self) -> Result<TxHash, StreamError> {
        let pending = self
            .contract
            .registerDataSchemas(crate::streams::schemas::registrations(), true)
            .send()
            .await?;
        let tx_hash = pending.watch().await?;
        info!(tx = %tx_hash, "schemas registered");
        Ok(tx_hash)
    }
}
