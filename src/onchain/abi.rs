//! Contract ABI bindings for the SecureFlow escrow and the data streams
//! protocol, plus keccak helpers for schema ids and event topics.
//!
//! We define minimal interfaces covering just the calls we make.

use alloy::primitives::B256;
use alloy::sol;

sol! {
    #[sol(rpc, all_derives)]
    interface ISecureFlow {
        /// One slot of `getApplicationsPage`.
        struct Application {
            address freelancer;
            string coverLetter;
            uint256 proposedTimeline;
            uint256 appliedAt;
            bool exists;
        }

        function nextEscrowId() external view returns (uint256);

        function getEscrowSummary(uint256 escrowId) external view returns (
            address depositor,
            address beneficiary,
            address[] arbiters,
            uint8 status,
            uint256 totalAmount,
            uint256 paidAmount,
            uint256 remaining,
            address token,
            uint256 deadline,
            uint256 workStartedAt,
            uint256 createdAt,
            uint256 milestoneCount,
            bool isOpenJob,
            string projectTitle,
            string projectDescription
        );

        function getApplicationCount(uint256 jobId) external view returns (uint256);

        function getApplicationsPage(uint256 jobId, uint256 offset, uint256 limit)
            external view returns (Application[] memory);

        function getFreelancerRating(address freelancer)
            external view returns (uint256 averageRating, uint256 totalRatings);

        function getEscrowRating(uint256 escrowId) external view returns (
            address rater,
            address freelancer,
            uint8 rating,
            uint256 ratedAt,
            bool exists
        );

        function acceptFreelancer(uint256 escrowId, address freelancer) external;

        function rateFreelancer(uint256 escrowId, uint8 rating) external;
    }
}

sol! {
    #[sol(rpc, all_derives)]
    interface IDataStreams {
        struct DataSchemaRegistration {
            string schemaName;
            string schema;
            bytes32 parentSchemaId;
        }

        struct DataStream {
            bytes32 id;
            bytes32 schemaId;
            bytes data;
        }

        struct EventStream {
            string id;
            bytes32[] argumentTopics;
            bytes data;
        }

        function registerDataSchemas(DataSchemaRegistration[] schemas, bool ignoreExistingSchemas)
            external returns (bytes32[] memory);

        function setAndEmitEvents(DataStream[] dataStreams, EventStream[] eventStreams) external;
    }
}

/// Compute keccak256 hash of a byte slice.
pub fn keccak256(data: &[u8]) -> B256 {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Topic0 used by the streams contract for a named event stream.
pub fn event_topic(event_id: &str) -> B256 {
    keccak256(event_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    #[test]
    fn test_keccak_matches_known_vectors() {
        assert_eq!(
            keccak256(b""),
            b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
        assert_eq!(
            keccak256(b"Transfer(address,address,uint256)"),
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_event_topics_are_distinct() {
        assert_ne!(event_topic("MilestoneApproved"), event_topic("MilestoneRejected"));
        assert_eq!(event_topic("DisputeCreated"), keccak256(b"DisputeCreated"));
    }
}
