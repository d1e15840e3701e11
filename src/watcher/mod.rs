//! Account watcher: keeps subscriptions in line with the account's escrows
//! and turns stream events into notifications.
//!
//! Lifecycle: `connect` loads the account's notifications and performs the
//! first refresh; `refresh` rescans escrows and reconciles subscriptions;
//! `handle_event` de-duplicates, routes and delivers one event;
//! `disconnect` tears every subscription down.

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch::route;
use crate::jobs::{AccountSnapshot, JobScanner};
use crate::notify::{Notification, NotificationCenter, Toast};
use crate::onchain::{ContractError, EscrowReader};
use crate::store::StoreError;
use crate::streams::{EventSource, StreamEvent};
use crate::subscriptions::SubscriptionSet;

pub struct AccountWatcher<R: EscrowReader + ?Sized, S: EventSource + ?Sized> {
    account: Address,
    scanner: JobScanner<R>,
    source: Arc<S>,
    center: NotificationCenter,
    subscriptions: SubscriptionSet,
    snapshot: AccountSnapshot,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    event_rx: mpsc::UnboundedReceiver<StreamEvent>,
    toast_tx: Option<mpsc::UnboundedSender<Toast>>,
}

impl<R: EscrowReader + ?Sized, S: EventSource + ?Sized> AccountWatcher<R, S> {
    pub fn new(
        account: Address,
        scanner: JobScanner<R>,
        source: Arc<S>,
        center: NotificationCenter,
        dedup_capacity: usize,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            account,
            scanner,
            source,
            center,
            subscriptions: SubscriptionSet::new(dedup_capacity),
            snapshot: AccountSnapshot::default(),
            event_tx,
            event_rx,
            toast_tx: None,
        }
    }

    /// Send every routed toast to `tx` as well as the log.
    pub fn with_toasts(mut self, tx: mpsc::UnboundedSender<Toast>) -> Self {
        self.toast_tx = Some(tx);
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn snapshot(&self) -> &AccountSnapshot {
        &self.snapshot
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub async fn connect(&mut self) -> Result<(), WatchError> {
        self.center.connect(self.account).await?;
        self.refresh().await?;
        info!(
            account = %self.account,
            active = self.subscriptions.active_count(),
            unread = self.center.unread_count(),
            "watcher connected"
        );
        Ok(())
    }

    pub async fn refresh(&mut self) -> Result<(), WatchError> {
        let snapshot = self.scanner.snapshot(self.account).await?;
        self.subscriptions
            .reconcile(&snapshot, self.source.as_ref(), &self.event_tx)
            .await;
        self.snapshot = snapshot;
        Ok(())
    }

    /// Process one event. Returns the notification stored for the account.
    pub async fn handle_event(&mut self, event: StreamEvent) -> Result<Option<Notification>, WatchError> {
        if !self.subscriptions.is_new(&event) {
            return Ok(None);
        }
        let Some(delivery) = route(&event, self.account, &self.snapshot) else {
            self.subscriptions.mark_seen(&event);
            return Ok(None);
        };
        // Recorded only once stored, so a failed write can be redelivered.
        let notification = self.center.deliver(delivery.recipient, delivery.draft).await?;
        self.subscriptions.mark_seen(&event);
        info!(
            event = %event,
            title = %notification.title,
            toast = %delivery.toast.description,
            "notification delivered"
        );
        if let Some(tx) = &self.toast_tx {
            if tx.send(delivery.toast).is_err() {
                debug!(event = %event, "toast receiver dropped");
            }
        }
        Ok(Some(notification))
    }

    /// Handle events already queued without waiting for more.
    pub async fn drain_pending(&mut self) -> Result<usize, WatchError> {
        let mut delivered = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            if self.handle_event(event).await?.is_some() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub fn disconnect(&mut self) {
        self.subscriptions.teardown();
        self.center.disconnect();
        self.snapshot = AccountSnapshot::default();
        info!(account = %self.account, "watcher disconnected");
    }

    /// Run until ctrl-c. Escrows are rescanned every `refresh_interval`.
    pub async fn run(mut self, refresh_interval: Duration) -> Result<(), WatchError> {
        self.connect().await?;
        let mut ticker = tokio::time::interval(refresh_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.handle_event(event).await {
                        error!(error = %e, "event handling failed");
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "refresh failed, keeping previous subscriptions");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.disconnect();
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NotificationStore};
    use crate::streams::events::{DisputeEvent, MilestoneEvent};
    use crate::streams::StreamEventId;
    use crate::subscriptions::Category;
    use crate::test_utils::{addr, escrow, FlakyStore, MockEscrow, MockSource};

    struct Harness {
        watcher: AccountWatcher<MockEscrow, MockSource>,
        escrow: Arc<MockEscrow>,
        source: Arc<MockSource>,
        store: Arc<MemoryStore>,
        toasts: mpsc::UnboundedReceiver<Toast>,
    }

    fn harness(account: Address) -> Harness {
        let escrow_mock = Arc::new(MockEscrow::default());
        escrow_mock.add_escrow(escrow(1, addr(1), Some(addr(2)), "Website"));
        escrow_mock.add_escrow(escrow(2, addr(3), Some(addr(1)), "Copy"));
        escrow_mock.set_next_id(3);

        let source = Arc::new(MockSource::default());
        let store = Arc::new(MemoryStore::default());
        let center = NotificationCenter::new(store.clone(), 50);
        let (toast_tx, toasts) = mpsc::unbounded_channel();
        let watcher = AccountWatcher::new(
            account,
            JobScanner::new(escrow_mock.clone(), 10),
            source.clone(),
            center,
            64,
        )
        .with_toasts(toast_tx);
        Harness {
            watcher,
            escrow: escrow_mock,
            source,
            store,
            toasts,
        }
    }

    fn submitted(escrow_id: u64, timestamp: u64) -> StreamEvent {
        StreamEvent::MilestoneSubmitted(MilestoneEvent {
            escrow_id,
            milestone_index: 0,
            status: 0,
            submitter: addr(2),
            description: String::new(),
            timestamp,
        })
    }

    #[tokio::test]
    async fn test_redelivered_event_notifies_once() {
        let mut h = harness(addr(1));
        h.watcher.connect().await.unwrap();

        assert!(h.source.emit(StreamEventId::MilestoneSubmitted, 1, submitted(1, 100)));
        assert!(h.source.emit(StreamEventId::MilestoneSubmitted, 1, submitted(1, 100)));
        assert!(h.source.emit(StreamEventId::MilestoneSubmitted, 1, submitted(1, 101)));
        assert_eq!(h.watcher.drain_pending().await.unwrap(), 2);

        assert_eq!(h.watcher.center().list().len(), 2);
        assert_eq!(h.store.load(&addr(1)).await.unwrap().len(), 2);
        assert_eq!(h.toasts.try_recv().unwrap().title, "Milestone Submitted");
    }

    #[tokio::test]
    async fn test_refresh_follows_new_escrows() {
        let mut h = harness(addr(1));
        h.watcher.connect().await.unwrap();
        let disputes = |w: &AccountWatcher<MockEscrow, MockSource>| {
            w.subscriptions().registry(Category::Disputes).unwrap().active_ids()
        };
        assert_eq!(disputes(&h.watcher).into_iter().collect::<Vec<_>>(), vec![1, 2]);

        h.escrow.add_escrow(escrow(3, addr(1), None, "New job"));
        h.escrow.set_next_id(4);
        h.watcher.refresh().await.unwrap();

        assert_eq!(disputes(&h.watcher).into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(h.watcher.snapshot().client_job_ids.contains(&3));
        assert!(h
            .watcher
            .subscriptions()
            .registry(Category::Applications)
            .unwrap()
            .is_subscribed(3));
    }

    #[tokio::test]
    async fn test_dispute_from_client_reaches_freelancer_account() {
        let mut h = harness(addr(1));
        h.watcher.connect().await.unwrap();

        // account 1 is the freelancer on escrow 2, whose client is account 3
        let event = StreamEvent::DisputeCreated(DisputeEvent {
            escrow_id: 2,
            dispute_id: None,
            milestone_index: 1,
            initiator: addr(3),
            status: 0,
            timestamp: 9,
        });
        let stored = h.watcher.handle_event(event.clone()).await.unwrap().unwrap();
        assert_eq!(stored.title, "Milestone Disputed");
        assert!(h.toasts.try_recv().unwrap().destructive);

        // own dispute on escrow 1 is not echoed back
        let own = StreamEvent::DisputeCreated(DisputeEvent {
            escrow_id: 1,
            initiator: addr(1),
            ..match event {
                StreamEvent::DisputeCreated(e) => e,
                _ => unreachable!(),
            }
        });
        assert!(h.watcher.handle_event(own).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_clears_state_and_dedup() {
        let mut h = harness(addr(1));
        h.watcher.connect().await.unwrap();
        h.watcher.handle_event(submitted(1, 5)).await.unwrap().unwrap();

        h.watcher.disconnect();
        assert_eq!(h.watcher.subscriptions().active_count(), 0);
        assert!(h.watcher.center().list().is_empty());

        h.watcher.connect().await.unwrap();
        assert_eq!(h.watcher.center().list().len(), 1);
        assert!(h.watcher.handle_event(submitted(1, 5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_store_write_allows_redelivery() {
        let escrow_mock = Arc::new(MockEscrow::default());
        escrow_mock.add_escrow(escrow(1, addr(1), Some(addr(2)), "Website"));
        escrow_mock.set_next_id(2);
        let store = Arc::new(FlakyStore::default());
        let mut watcher = AccountWatcher::new(
            addr(1),
            JobScanner::new(escrow_mock, 10),
            Arc::new(MockSource::default()),
            NotificationCenter::new(store.clone(), 50),
            64,
        );
        watcher.connect().await.unwrap();

        store.fail_saves(true);
        assert!(matches!(
            watcher.handle_event(submitted(1, 7)).await,
            Err(WatchError::Store(_))
        ));

        store.fail_saves(false);
        assert!(watcher.handle_event(submitted(1, 7)).await.unwrap().is_some());
        assert!(watcher.handle_event(submitted(1, 7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_toast_channel_does_not_block_delivery() {
        let mut h = harness(addr(1));
        h.watcher.connect().await.unwrap();
        drop(h.toasts);

        assert!(h.watcher.handle_event(submitted(1, 3)).await.unwrap().is_some());
        assert_eq!(h.store.load(&addr(1)).await.unwrap().len(), 1);
    }
}
