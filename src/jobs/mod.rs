//! Escrow scanning and open-job discovery.
//!
//! The contract has no owner index, so every query walks escrow ids
//! `1..nextEscrowId` one call at a time. A failed read for one id is logged
//! and skipped; the scan carries on with the next id. A long run of failed
//! reads ends the scan, so a bogus `nextEscrowId` cannot stall it.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decode::{Application, ApplicationBatch};
use crate::onchain::{ContractError, EscrowReader, EscrowStatus, EscrowSummary};

/// Consecutive failed summary reads after which the scan stops.
const MAX_CONSECUTIVE_MISSES: u32 = 64;

/// What routing needs to know about an escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowMeta {
    pub title: String,
    pub client: Address,
    pub freelancer: Option<Address>,
}

/// Per-account view of every escrow the account takes part in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Open jobs posted by the account (no freelancer assigned yet).
    pub client_job_ids: BTreeSet<u64>,
    /// Every escrow the account pays into.
    pub client_escrow_ids: BTreeSet<u64>,
    /// Every escrow where the account is the freelancer.
    pub freelancer_escrow_ids: BTreeSet<u64>,
    pub escrows: BTreeMap<u64, EscrowMeta>,
}

impl AccountSnapshot {
    pub fn from_summaries<'a, I>(account: Address, summaries: I) -> Self
    where
        I: IntoIterator<Item = &'a EscrowSummary>,
    {
        let mut snapshot = AccountSnapshot::default();
        for summary in summaries {
            let is_client = summary.is_payer(account);
            let is_freelancer = summary.is_beneficiary(account);
            if !is_client && !is_freelancer {
                continue;
            }
            if is_client {
                snapshot.client_escrow_ids.insert(summary.id);
                if summary.is_open_job() {
                    snapshot.client_job_ids.insert(summary.id);
                }
            }
            if is_freelancer {
                snapshot.freelancer_escrow_ids.insert(summary.id);
            }
            let fallback = if summary.is_open_job() { "Job" } else { "Project" };
            snapshot.escrows.insert(
                summary.id,
                EscrowMeta {
                    title: summary.display_title(fallback),
                    client: summary.payer,
                    freelancer: summary.beneficiary,
                },
            );
        }
        snapshot
    }

    /// Escrows where disputes can involve the account.
    pub fn dispute_escrow_ids(&self) -> BTreeSet<u64> {
        self.client_escrow_ids
            .union(&self.freelancer_escrow_ids)
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.escrows.is_empty()
    }
}

/// An open job with its decoded applications.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: u64,
    pub payer: Address,
    pub beneficiary: Option<Address>,
    pub token: Address,
    pub total_amount: U256,
    pub released_amount: U256,
    pub status: EscrowStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_days: u64,
    pub title: String,
    pub description: String,
    pub applications: Vec<Application>,
    /// Count reported by the contract, before decoding and de-duplication.
    pub application_count: u64,
}

impl Job {
    fn from_summary(summary: &EscrowSummary, application_count: u64, applications: Vec<Application>) -> Self {
        let description = if summary.description.trim().is_empty() {
            "No description".to_string()
        } else {
            summary.description.clone()
        };
        Self {
            id: summary.id,
            payer: summary.payer,
            beneficiary: summary.beneficiary,
            token: summary.token,
            total_amount: summary.total_amount,
            released_amount: summary.released_amount,
            status: summary.status,
            created_at: summary.created_at_utc(),
            duration_days: summary.duration_days(),
            title: summary.display_title("Job"),
            description,
            applications,
            application_count,
        }
    }

    pub fn is_open(&self) -> bool {
        self.beneficiary.is_none()
    }

    pub fn application_from(&self, freelancer: &Address) -> Option<&Application> {
        self.applications.iter().find(|a| a.freelancer == *freelancer)
    }
}

/// Walks escrows through an `EscrowReader`.
pub struct JobScanner<R: EscrowReader + ?Sized> {
    reader: Arc<R>,
    page_size: u64,
}

impl<R: EscrowReader + ?Sized> JobScanner<R> {
    pub fn new(reader: Arc<R>, page_size: u64) -> Self {
        Self {
            reader,
            page_size: page_size.max(1),
        }
    }

    /// Read every escrow summary. Ids whose read fails are skipped.
    pub async fn scan(&self) -> Result<Vec<EscrowSummary>, ContractError> {
        let next = self.reader.next_escrow_id().await?;
        let mut summaries = Vec::new();
        let mut misses = 0;
        for id in 1..next {
            match self.reader.escrow_summary(id).await {
                Ok(summary) => {
                    misses = 0;
                    summaries.push(summary);
                }
                Err(e) => {
                    warn!(escrow_id = id, error = %e, "escrow summary read failed, skipping");
                    misses += 1;
                    if misses >= MAX_CONSECUTIVE_MISSES {
                        warn!(
                            escrow_id = id,
                            next_escrow_id = next,
                            "hit {MAX_CONSECUTIVE_MISSES} failed reads in a row, ending scan"
                        );
                        break;
                    }
                }
            }
        }
        debug!(total = next.saturating_sub(1), read = summaries.len(), "escrow scan complete");
        Ok(summaries)
    }

    pub async fn snapshot(&self, account: Address) -> Result<AccountSnapshot, ContractError> {
        let summaries = self.scan().await?;
        let snapshot = AccountSnapshot::from_summaries(account, &summaries);
        info!(
            account = %account,
            open_jobs = snapshot.client_job_ids.len(),
            client_escrows = snapshot.client_escrow_ids.len(),
            freelancer_escrows = snapshot.freelancer_escrow_ids.len(),
            "account snapshot"
        );
        Ok(snapshot)
    }

    /// The account's open jobs, each with decoded and rated applications.
    pub async fn open_jobs_with_applications(&self, account: Address) -> Result<Vec<Job>, ContractError> {
        let summaries = self.scan().await?;
        let mut jobs = Vec::new();
        for summary in summaries
            .iter()
            .filter(|s| s.is_payer(account) && s.is_open_job())
        {
            let count = match self.reader.application_count(summary.id).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(job_id = summary.id, error = %e, "application count read failed");
                    0
                }
            };
            let applications = if count > 0 {
                self.fetch_applications(summary.id, count).await
            } else {
                Vec::new()
            };
            jobs.push(Job::from_summary(summary, count, applications));
        }
        Ok(jobs)
    }

    /// Page through a job's applications, decode them and attach ratings.
    pub async fn fetch_applications(&self, job_id: u64, count: u64) -> Vec<Application> {
        let mut tuples = Vec::new();
        let mut offset = 0;
        while offset < count {
            let limit = self.page_size.min(count - offset);
            match self.reader.applications_page(job_id, offset, limit).await {
                Ok(page) if page.is_empty() => break,
                Ok(page) => {
                    offset += page.len() as u64;
                    tuples.extend(page);
                }
                Err(e) => {
                    warn!(job_id, offset, error = %e, "applications page read failed");
                    break;
                }
            }
        }

        let batch = ApplicationBatch::from_tuples(&tuples);
        if !batch.rejected.is_empty() || batch.duplicates > 0 {
            info!(
                job_id,
                decoded = batch.len(),
                rejected = batch.rejected.len(),
                duplicates = batch.duplicates,
                "applications decoded with drops"
            );
        }

        let mut applications = batch.applications;
        for app in applications.iter_mut() {
            match self.reader.freelancer_rating(app.freelancer).await {
                Ok(rating) => app.rating = Some(rating),
                Err(e) => {
                    debug!(freelancer = %app.freelancer, error = %e, "no rating for freelancer");
                }
            }
        }
        applications
    }

    /// True once any open job of the account has at least one application.
    pub async fn has_pending_approvals(&self, account: Address) -> Result<bool, ContractError> {
        let next = self.reader.next_escrow_id().await?;
        for id in 1..next {
            let summary = match self.reader.escrow_summary(id).await {
                Ok(s) => s,
                Err(_) => continue,
            };
            if !summary.is_payer(account) || !summary.is_open_job() {
                continue;
            }
            match self.reader.application_count(id).await {
                Ok(count) if count > 0 => return Ok(true),
                Ok(_) => {}
                Err(e) => debug!(job_id = id, error = %e, "application count read failed"),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, application_tuple, escrow, MockEscrow};

    #[tokio::test]
    async fn test_scan_skips_failing_ids() {
        let client = addr(1);
        let mock = MockEscrow::default();
        mock.add_escrow(escrow(1, client, None, "One"));
        mock.add_escrow(escrow(3, client, None, "Three"));
        mock.set_next_id(4);

        let scanner = JobScanner::new(Arc::new(mock), 10);
        let summaries = scanner.scan().await.unwrap();
        let ids: Vec<u64> = summaries.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_scan_survives_bogus_next_id() {
        let mock = MockEscrow::default();
        mock.add_escrow(escrow(1, addr(1), None, "One"));
        mock.add_escrow(escrow(2, addr(1), Some(addr(2)), "Two"));
        mock.set_next_id(u64::MAX);

        let scanner = JobScanner::new(Arc::new(mock), 10);
        let summaries = scanner.scan().await.unwrap();
        assert_eq!(summaries.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_snapshot_partitions_roles() {
        let me = addr(1);
        let other = addr(2);
        let mock = MockEscrow::default();
        mock.add_escrow(escrow(1, me, None, "Open job"));
        mock.add_escrow(escrow(2, me, Some(other), "Hired"));
        mock.add_escrow(escrow(3, other, Some(me), "Working"));
        mock.add_escrow(escrow(4, other, None, "Not mine"));
        mock.set_next_id(5);

        let scanner = JobScanner::new(Arc::new(mock), 10);
        let snapshot = scanner.snapshot(me).await.unwrap();

        assert_eq!(snapshot.client_job_ids, BTreeSet::from([1]));
        assert_eq!(snapshot.client_escrow_ids, BTreeSet::from([1, 2]));
        assert_eq!(snapshot.freelancer_escrow_ids, BTreeSet::from([3]));
        assert_eq!(snapshot.dispute_escrow_ids(), BTreeSet::from([1, 2, 3]));
        assert_eq!(snapshot.escrows[&3].client, other);
        assert_eq!(snapshot.escrows[&2].freelancer, Some(other));
        assert!(!snapshot.escrows.contains_key(&4));
    }

    #[tokio::test]
    async fn test_open_jobs_page_through_and_dedupe() {
        let me = addr(1);
        let mock = MockEscrow::default();
        mock.add_escrow(escrow(1, me, None, "Logo"));
        mock.set_next_id(2);
        mock.set_applications(
            1,
            vec![
                application_tuple(addr(10), "a", 5, 1_000),
                application_tuple(addr(11), "b", 6, 2_000),
                application_tuple(addr(10), "a again", 7, 3_000),
                application_tuple(addr(12), "c", 8, 4_000),
                application_tuple(addr(13), "d", 9, 5_000),
            ],
        );
        mock.set_rating(addr(11), 450, 2);

        let mock = Arc::new(mock);
        let scanner = JobScanner::new(mock.clone(), 2);
        let jobs = scanner.open_jobs_with_applications(me).await.unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.application_count, 5);
        let freelancers: Vec<Address> = job.applications.iter().map(|a| a.freelancer).collect();
        assert_eq!(freelancers, vec![addr(10), addr(11), addr(12), addr(13)]);
        assert_eq!(job.applications[0].cover_letter, "a");
        assert_eq!(job.application_from(&addr(11)).unwrap().rating.unwrap().average, 450);
        assert!(job.application_from(&addr(12)).unwrap().rating.is_none());
        // 5 records at page size 2
        assert_eq!(mock.page_calls(), 3);
    }

    #[tokio::test]
    async fn test_pending_approvals() {
        let me = addr(1);
        let mock = MockEscrow::default();
        mock.add_escrow(escrow(1, me, None, "Empty"));
        mock.set_next_id(2);
        let mock = Arc::new(mock);
        let scanner = JobScanner::new(mock.clone(), 10);
        assert!(!scanner.has_pending_approvals(me).await.unwrap());

        mock.set_applications(1, vec![application_tuple(addr(9), "hi", 3, 10)]);
        assert!(scanner.has_pending_approvals(me).await.unwrap());
        assert!(!scanner.has_pending_approvals(addr(2)).await.unwrap());
    }
}
