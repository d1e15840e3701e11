//! Data-stream schemas and event ids.
//!
//! A schema is a comma separated list of `<solidity type> <name>` pairs. Its
//! id is the keccak256 of the schema string.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::onchain::abi::{keccak256, IDataStreams};
use crate::streams::StreamError;

pub const JOB_POSTING_SCHEMA: &str =
    "uint64 timestamp, bytes32 jobId, address creator, string title, string description, uint256 budget, uint8 status";

pub const MILESTONE_UPDATE_SCHEMA: &str =
    "uint64 timestamp, bytes32 escrowId, uint8 milestoneIndex, uint8 status, address submitter, string description";

pub const ESCROW_STATUS_SCHEMA: &str =
    "uint64 timestamp, bytes32 escrowId, uint8 oldStatus, uint8 newStatus, address initiator";

pub const APPLICATION_SCHEMA: &str =
    "uint64 timestamp, bytes32 jobId, bytes32 applicationId, address applicant, string coverLetter, string proposedTimeline";

pub const DISPUTE_SCHEMA: &str =
    "uint64 timestamp, bytes32 escrowId, bytes32 disputeId, uint8 milestoneIndex, address initiator, uint8 status";

pub const RATING_SCHEMA: &str =
    "uint64 timestamp, bytes32 escrowId, address freelancer, address rater, uint8 rating, uint256 averageRating";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    JobPosting,
    MilestoneUpdate,
    EscrowStatus,
    Application,
    Dispute,
    Rating,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 6] = [
        SchemaKind::JobPosting,
        SchemaKind::MilestoneUpdate,
        SchemaKind::EscrowStatus,
        SchemaKind::Application,
        SchemaKind::Dispute,
        SchemaKind::Rating,
    ];

    pub fn schema(&self) -> &'static str {
        match self {
            SchemaKind::JobPosting => JOB_POSTING_SCHEMA,
            SchemaKind::MilestoneUpdate => MILESTONE_UPDATE_SCHEMA,
            SchemaKind::EscrowStatus => ESCROW_STATUS_SCHEMA,
            SchemaKind::Application => APPLICATION_SCHEMA,
            SchemaKind::Dispute => DISPUTE_SCHEMA,
            SchemaKind::Rating => RATING_SCHEMA,
        }
    }

    /// Name the schema is registered under.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::JobPosting => "secureflow_job_posting",
            SchemaKind::MilestoneUpdate => "secureflow_milestone_update",
            SchemaKind::EscrowStatus => "secureflow_escrow_status",
            SchemaKind::Application => "secureflow_application",
            SchemaKind::Dispute => "secureflow_dispute",
            SchemaKind::Rating => "secureflow_rating",
        }
    }

    pub fn id(&self) -> B256 {
        schema_id(self.schema())
    }

    /// Field that carries the entity id the event is published under.
    pub fn entity_field(&self) -> &'static str {
        match self {
            SchemaKind::JobPosting | SchemaKind::Application => "jobId",
            _ => "escrowId",
        }
    }
}

pub fn schema_id(schema: &str) -> B256 {
    keccak256(schema.as_bytes())
}

/// Registration payload for every schema, with no parent schema.
pub fn registrations() -> Vec<IDataStreams::DataSchemaRegistration> {
    SchemaKind::ALL
        .iter()
        .map(|kind| IDataStreams::DataSchemaRegistration {
            schemaName: kind.name().to_string(),
            schema: kind.schema().to_string(),
            parentSchemaId: B256::ZERO,
        })
        .collect()
}

/// Named event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamEventId {
    JobPosted,
    MilestoneUpdated,
    MilestoneSubmitted,
    MilestoneApproved,
    MilestoneRejected,
    MilestoneResubmitted,
    EscrowStatusChanged,
    ApplicationSubmitted,
    DisputeCreated,
    FreelancerRated,
}

impl StreamEventId {
    pub const ALL: [StreamEventId; 10] = [
        StreamEventId::JobPosted,
        StreamEventId::MilestoneUpdated,
        StreamEventId::MilestoneSubmitted,
        StreamEventId::MilestoneApproved,
        StreamEventId::MilestoneRejected,
        StreamEventId::MilestoneResubmitted,
        StreamEventId::EscrowStatusChanged,
        StreamEventId::ApplicationSubmitted,
        StreamEventId::DisputeCreated,
        StreamEventId::FreelancerRated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventId::JobPosted => "JobPosted",
            StreamEventId::MilestoneUpdated => "MilestoneUpdated",
            StreamEventId::MilestoneSubmitted => "MilestoneSubmitted",
            StreamEventId::MilestoneApproved => "MilestoneApproved",
            StreamEventId::MilestoneRejected => "MilestoneRejected",
            StreamEventId::MilestoneResubmitted => "MilestoneResubmitted",
            StreamEventId::EscrowStatusChanged => "EscrowStatusChanged",
            StreamEventId::ApplicationSubmitted => "ApplicationSubmitted",
            StreamEventId::DisputeCreated => "DisputeCreated",
            StreamEventId::FreelancerRated => "FreelancerRated",
        }
    }

    pub fn schema(&self) -> SchemaKind {
        match self {
            StreamEventId::JobPosted => SchemaKind::JobPosting,
            StreamEventId::MilestoneUpdated
            | StreamEventId::MilestoneSubmitted
            | StreamEventId::MilestoneApproved
            | StreamEventId::MilestoneRejected
            | StreamEventId::MilestoneResubmitted => SchemaKind::MilestoneUpdate,
            StreamEventId::EscrowStatusChanged => SchemaKind::EscrowStatus,
            StreamEventId::ApplicationSubmitted => SchemaKind::Application,
            StreamEventId::DisputeCreated => SchemaKind::Dispute,
            StreamEventId::FreelancerRated => SchemaKind::Rating,
        }
    }

    /// Topic0 of logs carrying this event.
    pub fn topic(&self) -> B256 {
        crate::onchain::abi::event_topic(self.as_str())
    }

    pub fn from_topic(topic: &B256) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.topic() == *topic)
    }
}

impl fmt::Display for StreamEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamEventId {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| StreamError::UnknownEvent(s.to_string()))
    }
}
