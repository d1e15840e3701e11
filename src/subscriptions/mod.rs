//! Per-entity subscription lifecycle and event de-duplication.
//!
//! Each watched category keeps at most one live subscription per entity id.
//! `reconcile` moves the registry to a new id set; a subscribe that fails
//! leaves the id unsubscribed until the next reconcile tries again.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::jobs::AccountSnapshot;
use crate::streams::{EventSource, StreamEvent, StreamEventId, Subscription};

/// Event categories the watcher subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Applications,
    EscrowStatus,
    MilestoneSubmissions,
    MilestoneApprovals,
    MilestoneRejections,
    Disputes,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Applications,
        Category::EscrowStatus,
        Category::MilestoneSubmissions,
        Category::MilestoneApprovals,
        Category::MilestoneRejections,
        Category::Disputes,
    ];

    pub fn event(&self) -> StreamEventId {
        match self {
            Category::Applications => StreamEventId::ApplicationSubmitted,
            Category::EscrowStatus => StreamEventId::EscrowStatusChanged,
            Category::MilestoneSubmissions => StreamEventId::MilestoneSubmitted,
            Category::MilestoneApprovals => StreamEventId::MilestoneApproved,
            Category::MilestoneRejections => StreamEventId::MilestoneRejected,
            Category::Disputes => StreamEventId::DisputeCreated,
        }
    }

    pub fn of(event: &StreamEvent) -> Option<Category> {
        Self::ALL.into_iter().find(|c| c.event() == event.id())
    }

    /// Entity ids of `snapshot` this category watches.
    pub fn ids(&self, snapshot: &AccountSnapshot) -> BTreeSet<u64> {
        match self {
            Category::Applications => snapshot.client_job_ids.clone(),
            Category::EscrowStatus | Category::MilestoneSubmissions => {
                snapshot.client_escrow_ids.clone()
            }
            Category::MilestoneApprovals | Category::MilestoneRejections => {
                snapshot.freelancer_escrow_ids.clone()
            }
            Category::Disputes => snapshot.dispute_escrow_ids(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event())
    }
}

#[derive(Debug)]
enum SubscriptionState {
    Subscribing,
    Subscribed(Subscription),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub subscribed: Vec<u64>,
    pub unsubscribed: Vec<u64>,
    pub failed: Vec<u64>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.subscribed.is_empty() && self.unsubscribed.is_empty() && self.failed.is_empty()
    }
}

/// Live subscriptions of one category.
pub struct SubscriptionRegistry {
    category: Category,
    entries: BTreeMap<u64, SubscriptionState>,
}

impl SubscriptionRegistry {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entries: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Ids with an established subscription.
    pub fn active_ids(&self) -> BTreeSet<u64> {
        self.entries
            .iter()
            .filter(|(_, s)| matches!(s, SubscriptionState::Subscribed(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_subscribed(&self, id: u64) -> bool {
        matches!(self.entries.get(&id), Some(SubscriptionState::Subscribed(_)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn reconcile<S: EventSource + ?Sized>(
        &mut self,
        ids: &BTreeSet<u64>,
        source: &S,
        tx: &UnboundedSender<StreamEvent>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let stale: Vec<u64> = self
            .entries
            .keys()
            .filter(|id| !ids.contains(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(SubscriptionState::Subscribed(sub)) = self.entries.remove(&id) {
                sub.unsubscribe();
            }
            report.unsubscribed.push(id);
        }

        let event = self.category.event();
        for &id in ids {
            if self.entries.contains_key(&id) {
                continue;
            }
            self.entries.insert(id, SubscriptionState::Subscribing);
            match source.subscribe(event, id, tx.clone()).await {
                Ok(sub) => {
                    self.entries.insert(id, SubscriptionState::Subscribed(sub));
                    report.subscribed.push(id);
                }
                Err(e) => {
                    self.entries.remove(&id);
                    warn!(category = %self.category, entity_id = id, error = %e, "subscribe failed");
                    report.failed.push(id);
                }
            }
        }

        if !report.is_noop() {
            debug!(
                category = %self.category,
                subscribed = ?report.subscribed,
                unsubscribed = ?report.unsubscribed,
                failed = ?report.failed,
                "subscriptions reconciled"
            );
        }
        report
    }

    /// Drop every subscription.
    pub fn teardown(&mut self) -> usize {
        let count = self.entries.len();
        for (_, state) in std::mem::take(&mut self.entries) {
            if let SubscriptionState::Subscribed(sub) = state {
                sub.unsubscribe();
            }
        }
        count
    }
}

/// Bounded set of seen keys; the oldest key is evicted first.
#[derive(Debug)]
pub struct EventDeduper {
    capacity: usize,
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl EventDeduper {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `key`; false when it was already seen.
    pub fn insert(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

/// Registries and dedup sets for every category.
pub struct SubscriptionSet {
    registries: BTreeMap<Category, SubscriptionRegistry>,
    dedupers: BTreeMap<Category, EventDeduper>,
}

impl SubscriptionSet {
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            registries: Category::ALL
                .into_iter()
                .map(|c| (c, SubscriptionRegistry::new(c)))
                .collect(),
            dedupers: Category::ALL
                .into_iter()
                .map(|c| (c, EventDeduper::new(dedup_capacity)))
                .collect(),
        }
    }

    pub fn registry(&self, category: Category) -> Option<&SubscriptionRegistry> {
        self.registries.get(&category)
    }

    pub async fn reconcile<S: EventSource + ?Sized>(
        &mut self,
        snapshot: &AccountSnapshot,
        source: &S,
        tx: &UnboundedSender<StreamEvent>,
    ) -> BTreeMap<Category, ReconcileReport> {
        let mut reports = BTreeMap::new();
        for (category, registry) in self.registries.iter_mut() {
            let ids = category.ids(snapshot);
            let report = registry.reconcile(&ids, source, tx).await;
            reports.insert(*category, report);
        }
        reports
    }

    /// `event` has not been recorded in its category yet. Events outside
    /// the watched categories are never new.
    pub fn is_new(&self, event: &StreamEvent) -> bool {
        let Some(category) = Category::of(event) else {
            return false;
        };
        match self.dedupers.get(&category) {
            Some(deduper) => !deduper.contains(&event.dedup_key()),
            None => false,
        }
    }

    /// Record `event` as handled so re-deliveries are skipped.
    pub fn mark_seen(&mut self, event: &StreamEvent) {
        if let Some(deduper) = Category::of(event).and_then(|c| self.dedupers.get_mut(&c)) {
            deduper.insert(event.dedup_key());
        }
    }

    pub fn teardown(&mut self) {
        let mut dropped = 0;
        for registry in self.registries.values_mut() {
            dropped += registry.teardown();
        }
        for deduper in self.dedupers.values_mut() {
            deduper.clear();
        }
        info!(dropped, "subscriptions torn down");
    }

    pub fn active_count(&self) -> usize {
        self.registries.values().map(|r| r.active_ids().len()).sum()
    }
}
