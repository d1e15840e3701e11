//! Notifications of the connected account.
//!
//! The list is newest first and every change is written back to the
//! account's bucket. Notifications for other parties go straight into their
//! own buckets.

use alloy::primitives::Address;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::notify::{Notification, NotificationDraft, Toast};
use crate::store::{NotificationStore, StoreError};

pub struct NotificationCenter {
    store: Arc<dyn NotificationStore>,
    account: Option<Address>,
    notifications: Vec<Notification>,
    max_per_account: usize,
    toast_tx: Option<mpsc::UnboundedSender<Toast>>,
}

impl NotificationCenter {
    pub fn new(store: Arc<dyn NotificationStore>, max_per_account: usize) -> Self {
        Self {
            store,
            account: None,
            notifications: Vec::new(),
            max_per_account: max_per_account.max(1),
            toast_tx: None,
        }
    }

    /// Milestone and dispute notifications added with `add` also go to `tx`.
    pub fn with_toasts(mut self, tx: mpsc::UnboundedSender<Toast>) -> Self {
        self.toast_tx = Some(tx);
        self
    }

    pub async fn connect(&mut self, account: Address) -> Result<(), StoreError> {
        let mut loaded = self.store.load(&account).await?;
        loaded.truncate(self.max_per_account);
        info!(account = %account, count = loaded.len(), "notifications loaded");
        self.account = Some(account);
        self.notifications = loaded;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.account = None;
        self.notifications.clear();
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn list(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        match self.account {
            Some(account) => self.store.save(&account, &self.notifications).await,
            None => Ok(()),
        }
    }

    async fn push_own(&mut self, notification: Notification) -> Result<(), StoreError> {
        self.notifications.insert(0, notification);
        self.notifications.truncate(self.max_per_account);
        self.persist().await
    }

    async fn push_to_bucket(&self, recipient: Address, notification: Notification) -> Result<(), StoreError> {
        let mut list = self.store.load(&recipient).await?;
        list.insert(0, notification);
        list.truncate(self.max_per_account);
        self.store.save(&recipient, &list).await?;
        debug!(recipient = %recipient, "notification written to foreign bucket");
        Ok(())
    }

    /// Add `draft` for the current account.
    ///
    /// With `skip_current_user` the account only receives it when it is
    /// listed in `targets`. Returns the stored notification, if any.
    pub async fn add(
        &mut self,
        draft: NotificationDraft,
        targets: &[Address],
        skip_current_user: bool,
    ) -> Result<Option<Notification>, StoreError> {
        let Some(account) = self.account else {
            return Ok(None);
        };
        if skip_current_user && !targets.contains(&account) {
            return Ok(None);
        }
        let urgent = draft.is_urgent();
        let notification = draft.into_notification(Utc::now());
        self.push_own(notification.clone()).await?;
        if urgent {
            if let Some(tx) = &self.toast_tx {
                if tx.send(Toast::new(&notification.title, &notification.message)).is_err() {
                    debug!("toast receiver dropped");
                }
            }
        }
        Ok(Some(notification))
    }

    /// Notify the parties of an escrow other than the current account.
    /// Returns the addresses that received it.
    pub async fn add_cross_wallet(
        &mut self,
        draft: NotificationDraft,
        client: Option<Address>,
        freelancer: Option<Address>,
    ) -> Result<Vec<Address>, StoreError> {
        let mut targets = Vec::new();
        for party in [client, freelancer].into_iter().flatten() {
            if Some(party) != self.account && !targets.contains(&party) {
                targets.push(party);
            }
        }
        let notification = draft.into_notification(Utc::now());
        for target in &targets {
            self.push_to_bucket(*target, notification.clone()).await?;
        }
        Ok(targets)
    }

    /// Store `draft` for `recipient`, in memory too when it is the current account.
    pub async fn deliver(&mut self, recipient: Address, draft: NotificationDraft) -> Result<Notification, StoreError> {
        let notification = draft.into_notification(Utc::now());
        if Some(recipient) == self.account {
            self.push_own(notification.clone()).await?;
        } else {
            self.push_to_bucket(recipient, notification.clone()).await?;
        }
        Ok(notification)
    }

    pub async fn mark_read(&mut self, id: &str) -> Result<bool, StoreError> {
        let Some(n) = self.notifications.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        n.read = true;
        self.persist().await?;
        Ok(true)
    }

    pub async fn mark_all_read(&mut self) -> Result<(), StoreError> {
        for n in self.notifications.iter_mut() {
            n.read = true;
        }
        self.persist().await
    }

    pub async fn remove(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        if self.notifications.len() == before {
            return Ok(false);
        }
        self.persist().await?;
        Ok(true)
    }

    pub async fn clear(&mut self) -> Result<(), StoreError> {
        self.notifications.clear();
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{
        application_notification, milestone_notification, ApplicationAction, Details, MilestoneAction,
    };
    use crate::store::MemoryStore;

    fn draft(index: u8) -> NotificationDraft {
        milestone_notification(MilestoneAction::Submitted, 1, index, Details::new())
    }

    fn center(store: Arc<MemoryStore>) -> NotificationCenter {
        NotificationCenter::new(store, 3)
    }

    #[tokio::test]
    async fn test_add_is_newest_first_and_capped() {
        let store = Arc::new(MemoryStore::default());
        let mut c = center(store.clone());
        let me = Address::with_last_byte(1);
        c.connect(me).await.unwrap();

        for i in 0..4 {
            c.add(draft(i), &[], false).await.unwrap();
        }
        let messages: Vec<&str> = c.list().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Milestone 4 has been submitted for review",
                "Milestone 3 has been submitted for review",
                "Milestone 2 has been submitted for review",
            ]
        );
        assert_eq!(store.load(&me).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_add_toasts_milestones_and_disputes_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut c = center(Arc::new(MemoryStore::default())).with_toasts(tx);
        c.connect(Address::with_last_byte(1)).await.unwrap();

        c.add(draft(0), &[], false).await.unwrap();
        let toast = rx.try_recv().unwrap();
        assert_eq!(toast.title, "New Milestone Submitted");
        assert_eq!(toast.description, "Milestone 1 has been submitted for review");
        assert!(!toast.destructive);

        let approved = application_notification(
            ApplicationAction::Approved,
            4,
            Address::with_last_byte(2),
            Details::new().with("jobTitle", "Logo"),
        );
        c.add(approved, &[], false).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(c.list().len(), 2);
    }

    #[tokio::test]
    async fn test_skip_current_user_unless_targeted() {
        let mut c = center(Arc::new(MemoryStore::default()));
        let me = Address::with_last_byte(1);
        let other = Address::with_last_byte(2);
        c.connect(me).await.unwrap();

        assert!(c.add(draft(0), &[other], true).await.unwrap().is_none());
        assert!(c.add(draft(0), &[other, me], true).await.unwrap().is_some());
        assert_eq!(c.list().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_is_added_while_disconnected() {
        let mut c = center(Arc::new(MemoryStore::default()));
        assert!(c.add(draft(0), &[], false).await.unwrap().is_none());
        assert_eq!(c.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_cross_wallet_targets_other_parties() {
        let store = Arc::new(MemoryStore::default());
        let mut c = center(store.clone());
        let me = Address::with_last_byte(1);
        let freelancer = Address::with_last_byte(2);
        c.connect(me).await.unwrap();

        let targets = c.add_cross_wallet(draft(0), Some(me), Some(freelancer)).await.unwrap();
        assert_eq!(targets, vec![freelancer]);
        assert!(c.list().is_empty());
        assert_eq!(store.load(&freelancer).await.unwrap().len(), 1);
        assert!(store.load(&me).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_remove_clear_and_reconnect() {
        let store = Arc::new(MemoryStore::default());
        let mut c = center(store.clone());
        let me = Address::with_last_byte(1);
        c.connect(me).await.unwrap();

        let first = c.deliver(me, draft(0)).await.unwrap();
        let second = c.deliver(me, draft(1)).await.unwrap();
        assert_eq!(c.unread_count(), 2);

        assert!(c.mark_read(&first.id).await.unwrap());
        assert!(!c.mark_read("notification_0_missing").await.unwrap());
        assert_eq!(c.unread_count(), 1);

        c.disconnect();
        assert!(c.list().is_empty());
        c.connect(me).await.unwrap();
        assert_eq!(c.list().len(), 2);
        assert_eq!(c.unread_count(), 1);
        assert_eq!(c.list()[0].id, second.id);

        assert!(c.remove(&second.id).await.unwrap());
        assert!(!c.remove(&second.id).await.unwrap());
        c.mark_all_read().await.unwrap();
        assert_eq!(c.unread_count(), 0);

        c.clear().await.unwrap();
        assert!(store.load(&me).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_to_other_account_goes_to_their_bucket() {
        let store = Arc::new(MemoryStore::default());
        let mut c = center(store.clone());
        let me = Address::with_last_byte(1);
        let other = Address::with_last_byte(9);
        c.connect(me).await.unwrap();

        c.deliver(other, draft(0)).await.unwrap();
        assert!(c.list().is_empty());
        assert_eq!(store.load(&other).await.unwrap().len(), 1);
    }
}
