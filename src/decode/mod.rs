//! Decoding of `getApplicationsPage` records into `Application`s.
//!
//! The record shape is fixed: `(address freelancer, string coverLetter,
//! uint256 proposedTimeline, uint256 appliedAt, bool exists)`. A record that
//! does not satisfy it is rejected with a `DecodeError`; nothing is invented
//! in its place.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::onchain::{ApplicationTuple, FreelancerRating};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("application {index}: slot is vacant")]
    Vacant { index: usize },
    #[error("application {index}: freelancer is the zero address")]
    ZeroAddress { index: usize },
    #[error("application {index}: cover letter is empty")]
    EmptyCoverLetter { index: usize },
    #[error("application {index}: {field} is zero")]
    Zero { index: usize, field: &'static str },
    #[error("application {index}: {field} does not fit")]
    Overflow { index: usize, field: &'static str },
    #[error("malformed applications page: {0}")]
    Abi(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

/// A freelancer's bid on an open job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub freelancer: Address,
    pub cover_letter: String,
    pub proposed_timeline_days: u32,
    pub applied_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    /// Filled in by the job fetcher; `None` when the rating read failed.
    pub rating: Option<FreelancerRating>,
}

fn narrow<T: TryFrom<U256>>(value: U256, index: usize, field: &'static str) -> Result<T, DecodeError> {
    if value.is_zero() {
        return Err(DecodeError::Zero { index, field });
    }
    T::try_from(value).map_err(|_| DecodeError::Overflow { index, field })
}

/// Decode one record. `index` is its position in the page, used in errors.
pub fn decode_application(index: usize, tuple: &ApplicationTuple) -> Result<Application, DecodeError> {
    if !tuple.exists {
        return Err(DecodeError::Vacant { index });
    }
    if tuple.freelancer == Address::ZERO {
        return Err(DecodeError::ZeroAddress { index });
    }
    let cover_letter = tuple.coverLetter.trim();
    if cover_letter.is_empty() {
        return Err(DecodeError::EmptyCoverLetter { index });
    }
    let proposed_timeline_days: u32 = narrow(tuple.proposedTimeline, index, "proposedTimeline")?;
    let applied_secs: i64 = narrow(tuple.appliedAt, index, "appliedAt")?;
    let applied_at = DateTime::from_timestamp(applied_secs, 0).ok_or(DecodeError::Overflow {
        index,
        field: "appliedAt",
    })?;

    Ok(Application {
        freelancer: tuple.freelancer,
        cover_letter: cover_letter.to_string(),
        proposed_timeline_days,
        applied_at,
        status: ApplicationStatus::Pending,
        rating: None,
    })
}

/// ABI-decode raw `getApplicationsPage` return data.
pub fn decode_page_bytes(data: &[u8]) -> Result<Vec<ApplicationTuple>, DecodeError> {
    Vec::<ApplicationTuple>::abi_decode(data).map_err(|e| DecodeError::Abi(e.to_string()))
}

/// The decoded applications of one job.
#[derive(Debug, Clone, Default)]
pub struct ApplicationBatch {
    pub applications: Vec<Application>,
    pub rejected: Vec<DecodeError>,
    /// Records dropped because their freelancer already applied earlier.
    pub duplicates: usize,
}

impl ApplicationBatch {
    /// Decode a job's records in order, keeping the first application of
    /// each freelancer.
    pub fn from_tuples<'a, I>(tuples: I) -> Self
    where
        I: IntoIterator<Item = &'a ApplicationTuple>,
    {
        let mut batch = ApplicationBatch::default();
        for (index, tuple) in tuples.into_iter().enumerate() {
            match decode_application(index, tuple) {
                Ok(app) => batch.push(app),
                Err(e) => {
                    warn!(error = %e, "dropping undecodable application");
                    batch.rejected.push(e);
                }
            }
        }
        batch
    }

    fn push(&mut self, app: Application) {
        if self.contains(&app.freelancer) {
            debug!(freelancer = %app.freelancer, "duplicate application suppressed");
            self.duplicates += 1;
            return;
        }
        self.applications.push(app);
    }

    pub fn contains(&self, freelancer: &Address) -> bool {
        self.applications.iter().any(|a| a.freelancer == *freelancer)
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::application_tuple;
    use alloy::primitives::address;

    #[test]
    fn test_decode_valid_record() {
        let tuple = application_tuple(address!("00000000000000000000000000000000000000f1"), "I can do it", 14, 1_700_000_000);
        let app = decode_application(0, &tuple).unwrap();
        assert_eq!(app.freelancer, tuple.freelancer);
        assert_eq!(app.cover_letter, "I can do it");
        assert_eq!(app.proposed_timeline_days, 14);
        assert_eq!(app.applied_at.timestamp(), 1_700_000_000);
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert!(app.rating.is_none());
    }

    #[test]
    fn test_rejections_are_explicit() {
        let who = address!("00000000000000000000000000000000000000f1");

        let mut vacant = application_tuple(who, "hi", 1, 1);
        vacant.exists = false;
        assert_eq!(decode_application(3, &vacant), Err(DecodeError::Vacant { index: 3 }));

        let zero = application_tuple(Address::ZERO, "hi", 1, 1);
        assert_eq!(decode_application(0, &zero), Err(DecodeError::ZeroAddress { index: 0 }));

        let blank = application_tuple(who, "   ", 1, 1);
        assert_eq!(decode_application(1, &blank), Err(DecodeError::EmptyCoverLetter { index: 1 }));

        let no_timeline = application_tuple(who, "hi", 0, 1);
        assert_eq!(
            decode_application(2, &no_timeline),
            Err(DecodeError::Zero { index: 2, field: "proposedTimeline" })
        );

        let mut huge = application_tuple(who, "hi", 1, 1);
        huge.proposedTimeline = U256::from(u64::MAX);
        assert_eq!(
            decode_application(4, &huge),
            Err(DecodeError::Overflow { index: 4, field: "proposedTimeline" })
        );
    }

    #[test]
    fn test_batch_keeps_first_application_per_freelancer() {
        let a = address!("00000000000000000000000000000000000000a1");
        let b = address!("00000000000000000000000000000000000000b2");
        let tuples = vec![
            application_tuple(a, "first from a", 10, 100),
            application_tuple(b, "from b", 20, 200),
            application_tuple(a, "second from a", 30, 300),
            application_tuple(Address::ZERO, "broken", 5, 400),
        ];

        let batch = ApplicationBatch::from_tuples(&tuples);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.applications[0].cover_letter, "first from a");
        assert_eq!(batch.applications[1].freelancer, b);
        assert_eq!(batch.duplicates, 1);
        assert_eq!(batch.rejected, vec![DecodeError::ZeroAddress { index: 3 }]);
    }

    #[test]
    fn test_decode_page_bytes() {
        let a = address!("00000000000000000000000000000000000000a1");
        let tuples = vec![application_tuple(a, "hello", 7, 1_650_000_000)];
        let encoded = tuples.abi_encode();
        let decoded = decode_page_bytes(&encoded).unwrap();
        assert_eq!(decoded, tuples);

        assert!(matches!(decode_page_bytes(&[0u8; 7]), Err(DecodeError::Abi(_))));
    }
}
