//! User actions that write to the escrow contract.

use alloy::primitives::{Address, TxHash};
use thiserror::Error;
use tracing::{info, warn};

use crate::jobs::Job;
use crate::notify::{application_notification, ApplicationAction, Details, NotificationDraft};
use crate::onchain::{ContractError, EscrowReader, EscrowWriter};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("escrow already rated ({0} stars)")]
    AlreadyRated(u8),
    #[error("job {0} is not open")]
    NotOpen(u64),
    #[error("{freelancer} has not applied to job {job_id}")]
    NotAnApplicant { job_id: u64, freelancer: Address },
    #[error("{0}")]
    Contract(#[from] ContractError),
}

/// Result of accepting a freelancer.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub tx_hash: TxHash,
    pub freelancer: Address,
    /// "Application approved" notification for the freelancer.
    pub notification: NotificationDraft,
}

pub async fn accept_freelancer<W: EscrowWriter + ?Sized>(
    writer: &W,
    job: &Job,
    freelancer: Address,
) -> Result<Accepted, ActionError> {
    if !job.is_open() {
        return Err(ActionError::NotOpen(job.id));
    }
    if job.application_from(&freelancer).is_none() {
        return Err(ActionError::NotAnApplicant {
            job_id: job.id,
            freelancer,
        });
    }

    let tx_hash = writer.accept_freelancer(job.id, freelancer).await?;
    info!(job_id = job.id, freelancer = %freelancer, tx = %tx_hash, "application approved");

    let notification = application_notification(
        ApplicationAction::Approved,
        job.id,
        freelancer,
        Details::new().with("jobTitle", job.title.clone()),
    );
    Ok(Accepted {
        tx_hash,
        freelancer,
        notification,
    })
}

pub async fn rate_freelancer<C: EscrowReader + EscrowWriter + ?Sized>(
    client: &C,
    escrow_id: u64,
    rating: u8,
) -> Result<TxHash, ActionError> {
    if !(1..=5).contains(&rating) {
        return Err(ActionError::InvalidRating(rating));
    }

    match client.escrow_rating(escrow_id).await {
        Ok(existing) if existing.exists => return Err(ActionError::AlreadyRated(existing.rating)),
        Ok(_) => {}
        Err(e) => warn!(escrow_id, error = %e, "could not read existing rating, sending anyway"),
    }

    match client.rate_freelancer(escrow_id, rating).await {
        Ok(tx_hash) => Ok(tx_hash),
        Err(e) if e.is_already_rated() => Err(ActionError::AlreadyRated(0)),
        Err(e) => Err(e.into()),
    }
}
