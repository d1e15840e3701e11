//! In-memory stand-ins for the contract and the event stream.

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::onchain::{
    ApplicationTuple, ContractError, EscrowRating, EscrowReader, EscrowStatus, EscrowSummary,
    EscrowWriter, FreelancerRating,
};
use crate::notify::Notification;
use crate::store::{MemoryStore, NotificationStore, StoreError};
use crate::streams::{EventSource, StreamError, StreamEvent, StreamEventId, Subscription};

pub fn addr(n: u8) -> Address {
    Address::with_last_byte(n)
}

pub fn application_tuple(freelancer: Address, cover: &str, timeline: u64, applied_at: u64) -> ApplicationTuple {
    ApplicationTuple {
        freelancer,
        coverLetter: cover.to_string(),
        proposedTimeline: U256::from(timeline),
        appliedAt: U256::from(applied_at),
        exists: true,
    }
}

pub fn escrow(id: u64, client: Address, freelancer: Option<Address>, title: &str) -> EscrowSummary {
    let status_code = if freelancer.is_some() { 1 } else { 0 };
    EscrowSummary {
        id,
        payer: client,
        beneficiary: freelancer,
        token: Address::ZERO,
        total_amount: U256::from(1_000_000u64),
        released_amount: U256::ZERO,
        status_code,
        status: EscrowStatus::from_code(status_code),
        deadline: 1_700_000_000 + 30 * 86_400,
        created_at: 1_700_000_000,
        milestone_count: 2,
        title: title.to_string(),
        description: String::new(),
    }
}

#[derive(Default)]
struct EscrowState {
    next_id: u64,
    escrows: HashMap<u64, EscrowSummary>,
    applications: HashMap<u64, Vec<ApplicationTuple>>,
    ratings: HashMap<Address, FreelancerRating>,
    escrow_ratings: HashMap<u64, EscrowRating>,
    page_calls: usize,
    accepted: Vec<(u64, Address)>,
    rated: Vec<(u64, u8)>,
    rate_error: Option<String>,
}

/// Contract double. Missing escrow ids revert.
#[derive(Default)]
pub struct MockEscrow {
    state: Mutex<EscrowState>,
}

impl MockEscrow {
    pub fn add_escrow(&self, summary: EscrowSummary) {
        self.state.lock().unwrap().escrows.insert(summary.id, summary);
    }

    pub fn set_next_id(&self, next: u64) {
        self.state.lock().unwrap().next_id = next;
    }

    pub fn set_applications(&self, job_id: u64, tuples: Vec<ApplicationTuple>) {
        self.state.lock().unwrap().applications.insert(job_id, tuples);
    }

    pub fn set_rating(&self, freelancer: Address, average: u32, total: u32) {
        self.state
            .lock()
            .unwrap()
            .ratings
            .insert(freelancer, FreelancerRating { average, total });
    }

    pub fn set_escrow_rating(&self, escrow_id: u64, rating: u8) {
        self.state.lock().unwrap().escrow_ratings.insert(
            escrow_id,
            EscrowRating {
                rater: addr(1),
                freelancer: addr(2),
                rating,
                rated_at: 1_700_000_000,
                exists: true,
            },
        );
    }

    pub fn fail_rating_with(&self, message: &str) {
        self.state.lock().unwrap().rate_error = Some(message.to_string());
    }

    pub fn page_calls(&self) -> usize {
        self.state.lock().unwrap().page_calls
    }

    pub fn accepted(&self) -> Vec<(u64, Address)> {
        self.state.lock().unwrap().accepted.clone()
    }

    pub fn rated(&self) -> Vec<(u64, u8)> {
        self.state.lock().unwrap().rated.clone()
    }
}

#[async_trait]
impl EscrowReader for MockEscrow {
    async fn next_escrow_id(&self) -> Result<u64, ContractError> {
        Ok(self.state.lock().unwrap().next_id)
    }

    async fn escrow_summary(&self, escrow_id: u64) -> Result<EscrowSummary, ContractError> {
        self.state
            .lock()
            .unwrap()
            .escrows
            .get(&escrow_id)
            .cloned()
            .ok_or_else(|| ContractError::Other(format!("execution reverted: no escrow {escrow_id}")))
    }

    async fn application_count(&self, job_id: u64) -> Result<u64, ContractError> {
        let state = self.state.lock().unwrap();
        Ok(state.applications.get(&job_id).map(|a| a.len() as u64).unwrap_or(0))
    }

    async fn applications_page(
        &self,
        job_id: u64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ApplicationTuple>, ContractError> {
        let mut state = self.state.lock().unwrap();
        state.page_calls += 1;
        let all = state.applications.get(&job_id).cloned().unwrap_or_default();
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn freelancer_rating(&self, freelancer: Address) -> Result<FreelancerRating, ContractError> {
        self.state
            .lock()
            .unwrap()
            .ratings
            .get(&freelancer)
            .copied()
            .ok_or_else(|| ContractError::Other("execution reverted".into()))
    }

    async fn escrow_rating(&self, escrow_id: u64) -> Result<EscrowRating, ContractError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .escrow_ratings
            .get(&escrow_id)
            .cloned()
            .unwrap_or(EscrowRating {
                rater: Address::ZERO,
                freelancer: Address::ZERO,
                rating: 0,
                rated_at: 0,
                exists: false,
            }))
    }
}

#[async_trait]
impl EscrowWriter for MockEscrow {
    async fn accept_freelancer(&self, job_id: u64, freelancer: Address) -> Result<TxHash, ContractError> {
        let mut state = self.state.lock().unwrap();
        state.accepted.push((job_id, freelancer));
        Ok(TxHash::with_last_byte(state.accepted.len() as u8))
    }

    async fn rate_freelancer(&self, escrow_id: u64, rating: u8) -> Result<TxHash, ContractError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.rate_error.clone() {
            return Err(ContractError::Other(message));
        }
        state.rated.push((escrow_id, rating));
        Ok(TxHash::with_last_byte(0xaa))
    }
}

#[derive(Default)]
struct SourceState {
    subscribed: Vec<(StreamEventId, u64)>,
    failing: HashSet<(StreamEventId, u64)>,
    senders: HashMap<(StreamEventId, u64), UnboundedSender<StreamEvent>>,
}

/// Event source double. Tests push events with `emit`.
#[derive(Default)]
pub struct MockSource {
    state: Mutex<SourceState>,
}

impl MockSource {
    pub fn fail_on(&self, event: StreamEventId, entity_id: u64) {
        self.state.lock().unwrap().failing.insert((event, entity_id));
    }

    pub fn recover(&self, event: StreamEventId, entity_id: u64) {
        self.state.lock().unwrap().failing.remove(&(event, entity_id));
    }

    pub fn subscribe_calls(&self) -> Vec<(StreamEventId, u64)> {
        self.state.lock().unwrap().subscribed.clone()
    }

    /// Deliver `event` as if it arrived on the `(kind, entity_id)` stream.
    pub fn emit(&self, kind: StreamEventId, entity_id: u64, event: StreamEvent) -> bool {
        let state = self.state.lock().unwrap();
        match state.senders.get(&(kind, entity_id)) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl EventSource for MockSource {
    async fn subscribe(
        &self,
        event: StreamEventId,
        entity_id: u64,
        tx: UnboundedSender<StreamEvent>,
    ) -> Result<Subscription, StreamError> {
        let mut state = self.state.lock().unwrap();
        state.subscribed.push((event, entity_id));
        if state.failing.contains(&(event, entity_id)) {
            return Err(StreamError::Subscribe(format!("{event} {entity_id} refused")));
        }
        state.senders.insert((event, entity_id), tx);
        Ok(Subscription::detached(event, entity_id))
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationStore for FlakyStore {
    async fn load(&self, address: &Address) -> Result<Vec<Notification>, StoreError> {
        self.inner.load(address).await
    }

    async fn save(&self, address: &Address, notifications: &[Notification]) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.save(address, notifications).await
    }
}
