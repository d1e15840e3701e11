//! Notification records, builders and the per-account center.

pub mod center;

pub use center::NotificationCenter;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Milestone,
    Dispute,
    Escrow,
    Application,
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Everything but the id, timestamp and read flag.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub data: Value,
}

impl NotificationDraft {
    /// Stamp the draft into an unread notification.
    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: notification_id(now),
            kind: self.kind,
            title: self.title,
            message: self.message,
            timestamp: now,
            read: false,
            action_url: self.action_url,
            data: self.data,
        }
    }

    /// Kinds that also pop a toast when added directly.
    pub fn is_urgent(&self) -> bool {
        matches!(self.kind, NotificationKind::Milestone | NotificationKind::Dispute)
    }
}

/// `notification_<unix ms>_<9 random chars>`
pub fn notification_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("notification_{}_{}", now.timestamp_millis(), &random[..9])
}

/// Transient alert shown alongside a delivered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub destructive: bool,
}

impl Toast {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            destructive: false,
        }
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }
}

/// Extra payload fields merged into a notification's `data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Details(Map<String, Value>);

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn merged_into(self, mut base: Map<String, Value>) -> Value {
        base.extend(self.0);
        Value::Object(base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneAction {
    Submitted,
    Approved,
    Rejected,
    Disputed,
}

pub fn milestone_notification(
    action: MilestoneAction,
    escrow_id: u64,
    milestone_index: u8,
    details: Details,
) -> NotificationDraft {
    let mut base = Map::new();
    base.insert("escrowId".into(), json!(escrow_id.to_string()));
    base.insert("milestoneIndex".into(), json!(milestone_index));
    let number = u32::from(milestone_index) + 1;

    let (kind, title, message, url) = match action {
        MilestoneAction::Submitted => (
            NotificationKind::Milestone,
            "New Milestone Submitted",
            format!("Milestone {number} has been submitted for review"),
            format!("/dashboard?escrow={escrow_id}"),
        ),
        MilestoneAction::Approved => (
            NotificationKind::Milestone,
            "Milestone Approved!",
            format!("Milestone {number} has been approved and payment released"),
            format!("/freelancer?escrow={escrow_id}"),
        ),
        MilestoneAction::Rejected => (
            NotificationKind::Milestone,
            "Milestone Rejected",
            format!("Milestone {number} has been rejected. Please review and resubmit"),
            format!("/freelancer?escrow={escrow_id}"),
        ),
        MilestoneAction::Disputed => (
            NotificationKind::Dispute,
            "Milestone Disputed",
            format!("Milestone {number} is under dispute and requires admin review"),
            format!("/admin?escrow={escrow_id}"),
        ),
    };

    NotificationDraft {
        kind,
        title: title.to_string(),
        message,
        action_url: Some(url),
        data: details.merged_into(base),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    Created,
    Completed,
    Refunded,
    WorkStarted,
}

pub fn escrow_notification(action: EscrowAction, escrow_id: u64, details: Details) -> NotificationDraft {
    let mut base = Map::new();
    base.insert("escrowId".into(), json!(escrow_id.to_string()));

    let (title, message) = match action {
        EscrowAction::Created => (
            "New Escrow Created",
            "A new escrow has been created and is ready for work".to_string(),
        ),
        EscrowAction::Completed => (
            "Escrow Completed!",
            "All milestones have been completed and payments released".to_string(),
        ),
        EscrowAction::Refunded => (
            "Escrow Refunded",
            "The escrow has been refunded due to project cancellation".to_string(),
        ),
        EscrowAction::WorkStarted => {
            let freelancer = details.get_str("freelancerName").unwrap_or("Freelancer");
            let project = details
                .get_str("projectTitle")
                .map(str::to_string)
                .unwrap_or_else(|| format!("Project #{escrow_id}"));
            ("Work Started!", format!("{freelancer} has started work on {project}"))
        }
    };

    NotificationDraft {
        kind: NotificationKind::Escrow,
        title: title.to_string(),
        message,
        action_url: Some(format!("/dashboard?escrow={escrow_id}")),
        data: details.merged_into(base),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationAction {
    Submitted,
    Approved,
    Rejected,
}

pub fn application_notification(
    action: ApplicationAction,
    job_id: u64,
    freelancer: Address,
    details: Details,
) -> NotificationDraft {
    let mut base = Map::new();
    base.insert("jobId".into(), json!(job_id));
    base.insert("freelancerAddress".into(), json!(format!("{freelancer:#x}")));
    let job_title = details
        .get_str("jobTitle")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Job #{job_id}"));

    let (title, message, url) = match action {
        ApplicationAction::Submitted => (
            "New Job Application",
            format!("Someone applied to your job: {job_title}"),
            format!("/approvals?job={job_id}"),
        ),
        ApplicationAction::Approved => (
            "Application Approved!",
            format!("Your application for {job_title} has been approved"),
            format!("/freelancer?job={job_id}"),
        ),
        ApplicationAction::Rejected => (
            "Application Rejected",
            format!("Your application for {job_title} was not selected"),
            format!("/freelancer?job={job_id}"),
        ),
    };

    NotificationDraft {
        kind: NotificationKind::Application,
        title: title.to_string(),
        message,
        action_url: Some(url),
        data: details.merged_into(base),
    }
}
