//! Domain projections of SecureFlow contract reads.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::onchain::abi::ISecureFlow;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Escrow lifecycle as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Pending,
    Active,
    Completed,
    Disputed,
}

impl EscrowStatus {
    /// Cancelled (4) and unknown codes are shown as pending.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Active,
            2 => Self::Completed,
            3 => Self::Disputed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowStatus::Pending => write!(f, "pending"),
            EscrowStatus::Active => write!(f, "active"),
            EscrowStatus::Completed => write!(f, "completed"),
            EscrowStatus::Disputed => write!(f, "disputed"),
        }
    }
}

/// Decoded `getEscrowSummary` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowSummary {
    pub id: u64,
    pub payer: Address,
    /// `None` while the job is open (zero address on-chain).
    pub beneficiary: Option<Address>,
    pub token: Address,
    pub total_amount: U256,
    pub released_amount: U256,
    pub status_code: u8,
    pub status: EscrowStatus,
    pub deadline: u64,
    pub created_at: u64,
    pub milestone_count: u64,
    pub title: String,
    pub description: String,
}

impl EscrowSummary {
    pub fn from_return(id: u64, ret: ISecureFlow::getEscrowSummaryReturn) -> Self {
        let beneficiary = if ret.beneficiary == Address::ZERO {
            None
        } else {
            Some(ret.beneficiary)
        };
        Self {
            id,
            payer: ret.depositor,
            beneficiary,
            token: ret.token,
            total_amount: ret.totalAmount,
            released_amount: ret.paidAmount,
            status_code: ret.status,
            status: EscrowStatus::from_code(ret.status),
            deadline: u64::try_from(ret.deadline).unwrap_or(u64::MAX),
            created_at: u64::try_from(ret.createdAt).unwrap_or(0),
            milestone_count: u64::try_from(ret.milestoneCount).unwrap_or(0),
            title: ret.projectTitle,
            description: ret.projectDescription,
        }
    }

    /// An escrow with no freelancer assigned yet.
    pub fn is_open_job(&self) -> bool {
        self.beneficiary.is_none()
    }

    pub fn is_payer(&self, account: Address) -> bool {
        self.payer == account
    }

    pub fn is_beneficiary(&self, account: Address) -> bool {
        self.beneficiary == Some(account)
    }

    /// Project title, else description, else `<fallback> #<id>`.
    pub fn display_title(&self, fallback: &str) -> String {
        if !self.title.trim().is_empty() {
            self.title.clone()
        } else if !self.description.trim().is_empty() {
            self.description.clone()
        } else {
            format!("{} #{}", fallback, self.id)
        }
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.created_at).ok()?, 0)
    }

    /// Whole days between creation and deadline.
    pub fn duration_days(&self) -> u64 {
        self.deadline.saturating_sub(self.created_at) / SECONDS_PER_DAY
    }
}

/// Aggregate rating of a freelancer. `average` is on a 0-500 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreelancerRating {
    pub average: u32,
    pub total: u32,
}

impl FreelancerRating {
    pub fn from_return(ret: ISecureFlow::getFreelancerRatingReturn) -> Self {
        Self {
            average: u32::try_from(ret.averageRating).unwrap_or(u32::MAX),
            total: u32::try_from(ret.totalRatings).unwrap_or(u32::MAX),
        }
    }

    /// Average expressed in stars (0.0 - 5.0).
    pub fn stars(&self) -> f64 {
        f64::from(self.average) / 100.0
    }
}

/// Rating left on a single escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowRating {
    pub rater: Address,
    pub freelancer: Address,
    pub rating: u8,
    pub rated_at: u64,
    pub exists: bool,
}

impl EscrowRating {
    pub fn from_return(ret: ISecureFlow::getEscrowRatingReturn) -> Self {
        Self {
            rater: ret.rater,
            freelancer: ret.freelancer,
            rating: ret.rating,
            rated_at: u64::try_from(ret.ratedAt).unwrap_or(0),
            exists: ret.exists,
        }
    }
}

/// Abbreviated address for messages, e.g. `0x742d...d8b6`.
pub fn short_address(address: &Address) -> String {
    let full = format!("{address:#x}");
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn summary(title: &str, description: &str) -> EscrowSummary {
        EscrowSummary {
            id: 7,
            payer: address!("00000000000000000000000000000000000000aa"),
            beneficiary: None,
            token: Address::ZERO,
            total_amount: U256::from(1_000u64),
            released_amount: U256::ZERO,
            status_code: 0,
            status: EscrowStatus::Pending,
            deadline: 1_700_000_000 + 10 * SECONDS_PER_DAY + 3600,
            created_at: 1_700_000_000,
            milestone_count: 2,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(EscrowStatus::from_code(0), EscrowStatus::Pending);
        assert_eq!(EscrowStatus::from_code(1), EscrowStatus::Active);
        assert_eq!(EscrowStatus::from_code(2), EscrowStatus::Completed);
        assert_eq!(EscrowStatus::from_code(3), EscrowStatus::Disputed);
        assert_eq!(EscrowStatus::from_code(4), EscrowStatus::Pending);
        assert_eq!(EscrowStatus::from_code(200), EscrowStatus::Pending);
    }

    #[test]
    fn test_display_title_fallbacks() {
        assert_eq!(summary("Logo", "Design").display_title("Job"), "Logo");
        assert_eq!(summary("", "Design").display_title("Job"), "Design");
        assert_eq!(summary(" ", "").display_title("Project"), "Project #7");
    }

    #[test]
    fn test_duration_days_truncates() {
        assert_eq!(summary("a", "b").duration_days(), 10);
    }

    #[test]
    fn test_short_address() {
        let addr = address!("742d35cc6634c0532925a3b8d4c9db96c4b4d8b6");
        assert_eq!(short_address(&addr), "0x742d...d8b6");
    }

    #[test]
    fn test_rating_stars() {
        let rating = FreelancerRating { average: 450, total: 3 };
        assert!((rating.stars() - 4.5).abs() < f64::EPSILON);
    }
}
