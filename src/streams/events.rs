//! Typed stream events.

use alloy::primitives::{Address, U256};
use std::fmt;

use crate::streams::codec::{identifier_text, SchemaCodec, StreamPayload};
use crate::streams::schemas::StreamEventId;
use crate::streams::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationEvent {
    pub job_id: u64,
    /// Absent when the publisher left the field zeroed.
    pub application_id: Option<String>,
    pub applicant: Address,
    pub cover_letter: String,
    pub proposed_timeline: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowStatusEvent {
    pub escrow_id: u64,
    pub old_status: u8,
    pub new_status: u8,
    pub initiator: Address,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneEvent {
    pub escrow_id: u64,
    /// Zero-based.
    pub milestone_index: u8,
    pub status: u8,
    pub submitter: Address,
    pub description: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeEvent {
    pub escrow_id: u64,
    pub dispute_id: Option<String>,
    pub milestone_index: u8,
    pub initiator: Address,
    pub status: u8,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPostedEvent {
    pub job_id: u64,
    pub creator: Address,
    pub title: String,
    pub description: String,
    pub budget: U256,
    pub status: u8,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingEvent {
    pub escrow_id: u64,
    pub freelancer: Address,
    pub rater: Address,
    pub rating: u8,
    pub average_rating: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    JobPosted(JobPostedEvent),
    ApplicationSubmitted(ApplicationEvent),
    EscrowStatusChanged(EscrowStatusEvent),
    MilestoneUpdated(MilestoneEvent),
    MilestoneSubmitted(MilestoneEvent),
    MilestoneApproved(MilestoneEvent),
    MilestoneRejected(MilestoneEvent),
    MilestoneResubmitted(MilestoneEvent),
    DisputeCreated(DisputeEvent),
    FreelancerRated(RatingEvent),
}

fn optional_identifier(payload: &StreamPayload, name: &str) -> Result<Option<String>, StreamError> {
    let word = payload.bytes32(name)?;
    if word.is_zero() {
        Ok(None)
    } else {
        Ok(Some(identifier_text(&word)))
    }
}

fn milestone(payload: &StreamPayload) -> Result<MilestoneEvent, StreamError> {
    Ok(MilestoneEvent {
        escrow_id: payload.entity_id("escrowId")?,
        milestone_index: payload.u8("milestoneIndex")?,
        status: payload.u8("status")?,
        submitter: payload.address("submitter")?,
        description: payload.string("description")?.to_string(),
        timestamp: payload.u64("timestamp")?,
    })
}

impl StreamEvent {
    /// Build the typed event for `id` from decoded schema fields.
    pub fn from_payload(id: StreamEventId, payload: &StreamPayload) -> Result<Self, StreamError> {
        let event = match id {
            StreamEventId::JobPosted => StreamEvent::JobPosted(JobPostedEvent {
                job_id: payload.entity_id("jobId")?,
                creator: payload.address("creator")?,
                title: payload.string("title")?.to_string(),
                description: payload.string("description")?.to_string(),
                budget: payload.uint("budget")?,
                status: payload.u8("status")?,
                timestamp: payload.u64("timestamp")?,
            }),
            StreamEventId::ApplicationSubmitted => {
                StreamEvent::ApplicationSubmitted(ApplicationEvent {
                    job_id: payload.entity_id("jobId")?,
                    application_id: optional_identifier(payload, "applicationId")?,
                    applicant: payload.address("applicant")?,
                    cover_letter: payload.string("coverLetter")?.to_string(),
                    proposed_timeline: payload.string("proposedTimeline")?.to_string(),
                    timestamp: payload.u64("timestamp")?,
                })
            }
            StreamEventId::EscrowStatusChanged => StreamEvent::EscrowStatusChanged(EscrowStatusEvent {
                escrow_id: payload.entity_id("escrowId")?,
                old_status: payload.u8("oldStatus")?,
                new_status: payload.u8("newStatus")?,
                initiator: payload.address("initiator")?,
                timestamp: payload.u64("timestamp")?,
            }),
            StreamEventId::MilestoneUpdated => StreamEvent::MilestoneUpdated(milestone(payload)?),
            StreamEventId::MilestoneSubmitted => StreamEvent::MilestoneSubmitted(milestone(payload)?),
            StreamEventId::MilestoneApproved => StreamEvent::MilestoneApproved(milestone(payload)?),
            StreamEventId::MilestoneRejected => StreamEvent::MilestoneRejected(milestone(payload)?),
            StreamEventId::MilestoneResubmitted => {
                StreamEvent::MilestoneResubmitted(milestone(payload)?)
            }
            StreamEventId::DisputeCreated => StreamEvent::DisputeCreated(DisputeEvent {
                escrow_id: payload.entity_id("escrowId")?,
                dispute_id: optional_identifier(payload, "disputeId")?,
                milestone_index: payload.u8("milestoneIndex")?,
                initiator: payload.address("initiator")?,
                status: payload.u8("status")?,
                timestamp: payload.u64("timestamp")?,
            }),
            StreamEventId::FreelancerRated => StreamEvent::FreelancerRated(RatingEvent {
                escrow_id: payload.entity_id("escrowId")?,
                freelancer: payload.address("freelancer")?,
                rater: payload.address("rater")?,
                rating: payload.u8("rating")?,
                average_rating: payload.uint("averageRating")?,
                timestamp: payload.u64("timestamp")?,
            }),
        };
        Ok(event)
    }

    /// Decode raw log data published under `id`.
    pub fn decode(id: StreamEventId, data: &[u8]) -> Result<Self, StreamError> {
        let codec = SchemaCodec::for_kind(id.schema())?;
        let payload = codec.decode(data)?;
        Self::from_payload(id, &payload)
    }

    pub fn id(&self) -> StreamEventId {
        match self {
            StreamEvent::JobPosted(_) => StreamEventId::JobPosted,
            StreamEvent::ApplicationSubmitted(_) => StreamEventId::ApplicationSubmitted,
            StreamEvent::EscrowStatusChanged(_) => StreamEventId::EscrowStatusChanged,
            StreamEvent::MilestoneUpdated(_) => StreamEventId::MilestoneUpdated,
            StreamEvent::MilestoneSubmitted(_) => StreamEventId::MilestoneSubmitted,
            StreamEvent::MilestoneApproved(_) => StreamEventId::MilestoneApproved,
            StreamEvent::MilestoneRejected(_) => StreamEventId::MilestoneRejected,
            StreamEvent::MilestoneResubmitted(_) => StreamEventId::MilestoneResubmitted,
            StreamEvent::DisputeCreated(_) => StreamEventId::DisputeCreated,
            StreamEvent::FreelancerRated(_) => StreamEventId::FreelancerRated,
        }
    }

    /// Job or escrow id the event belongs to.
    pub fn entity_id(&self) -> u64 {
        match self {
            StreamEvent::JobPosted(e) => e.job_id,
            StreamEvent::ApplicationSubmitted(e) => e.job_id,
            StreamEvent::EscrowStatusChanged(e) => e.escrow_id,
            StreamEvent::MilestoneUpdated(e)
            | StreamEvent::MilestoneSubmitted(e)
            | StreamEvent::MilestoneApproved(e)
            | StreamEvent::MilestoneRejected(e)
            | StreamEvent::MilestoneResubmitted(e) => e.escrow_id,
            StreamEvent::DisputeCreated(e) => e.escrow_id,
            StreamEvent::FreelancerRated(e) => e.escrow_id,
        }
    }

    /// Key under which re-deliveries of the same event collapse.
    pub fn dedup_key(&self) -> String {
        match self {
            StreamEvent::ApplicationSubmitted(e) => match &e.application_id {
                Some(id) => id.clone(),
                None => format!("{}-{:#x}-{}", e.job_id, e.applicant, e.timestamp),
            },
            StreamEvent::EscrowStatusChanged(e) => {
                format!("{}-{}-{}", e.escrow_id, e.new_status, e.timestamp)
            }
            StreamEvent::MilestoneUpdated(e)
            | StreamEvent::MilestoneSubmitted(e)
            | StreamEvent::MilestoneApproved(e)
            | StreamEvent::MilestoneRejected(e)
            | StreamEvent::MilestoneResubmitted(e) => {
                format!("{}-{}-{}", e.escrow_id, e.milestone_index, e.timestamp)
            }
            StreamEvent::DisputeCreated(e) => {
                format!("{}-{}-{}", e.escrow_id, e.milestone_index, e.timestamp)
            }
            StreamEvent::JobPosted(e) => format!("{}-{}", e.job_id, e.timestamp),
            StreamEvent::FreelancerRated(e) => format!("{}-{:#x}-{}", e.escrow_id, e.rater, e.timestamp),
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id(), self.entity_id())
    }
}
