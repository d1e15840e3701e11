//! Routing of stream events to the party that did not cause them.
//!
//! Every routed event has one direction: client to freelancer or freelancer
//! to client. Only the receiving side is notified, and only when it is the
//! watching account. Escrows where client and freelancer are the same
//! address never notify.

use alloy::primitives::Address;
use tracing::debug;

use crate::jobs::{AccountSnapshot, EscrowMeta};
use crate::notify::{
    application_notification, escrow_notification, milestone_notification, ApplicationAction,
    Details, EscrowAction, MilestoneAction, NotificationDraft, Toast,
};
use crate::onchain::short_address;
use crate::streams::events::{ApplicationEvent, DisputeEvent, EscrowStatusEvent, MilestoneEvent};
use crate::streams::StreamEvent;

/// Escrow status that means the freelancer started work.
const STATUS_WORK_STARTED: u8 = 1;
const COVER_LETTER_PREVIEW: usize = 120;

/// A notification bound for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: Address,
    pub draft: NotificationDraft,
    pub toast: Toast,
}

fn escrow_meta(snapshot: &AccountSnapshot, escrow_id: u64) -> Option<&EscrowMeta> {
    snapshot.escrows.get(&escrow_id)
}

fn project_title(meta: Option<&EscrowMeta>, escrow_id: u64) -> String {
    meta.map(|m| m.title.clone())
        .unwrap_or_else(|| format!("Project #{escrow_id}"))
}

fn preview(text: &str) -> String {
    text.chars().take(COVER_LETTER_PREVIEW).collect()
}

/// Work out who, if anyone, `event` should notify.
pub fn route(event: &StreamEvent, account: Address, snapshot: &AccountSnapshot) -> Option<Delivery> {
    let delivery = match event {
        StreamEvent::ApplicationSubmitted(e) => route_application(e, account, snapshot),
        StreamEvent::EscrowStatusChanged(e) => route_status(e, account, snapshot),
        StreamEvent::MilestoneSubmitted(e) => route_submission(e, account, snapshot),
        StreamEvent::MilestoneApproved(e) => {
            route_client_decision(e, MilestoneAction::Approved, account, snapshot)
        }
        StreamEvent::MilestoneRejected(e) => {
            route_client_decision(e, MilestoneAction::Rejected, account, snapshot)
        }
        StreamEvent::DisputeCreated(e) => route_dispute(e, account, snapshot),
        _ => None,
    };
    if delivery.is_none() {
        debug!(event = %event, account = %account, "event not routed");
    }
    delivery
}

fn route_application(e: &ApplicationEvent, account: Address, snapshot: &AccountSnapshot) -> Option<Delivery> {
    if !snapshot.client_job_ids.contains(&e.job_id) {
        return None;
    }
    let client = escrow_meta(snapshot, e.job_id).map(|m| m.client).unwrap_or(account);
    if client != account || e.applicant == account || e.applicant == Address::ZERO {
        return None;
    }
    let job_title = escrow_meta(snapshot, e.job_id)
        .map(|m| m.title.clone())
        .unwrap_or_else(|| format!("Job #{}", e.job_id));
    let applicant = short_address(&e.applicant);

    let draft = application_notification(
        ApplicationAction::Submitted,
        e.job_id,
        e.applicant,
        Details::new()
            .with("jobTitle", job_title.clone())
            .with("freelancerName", applicant.clone())
            .with("coverLetterPreview", preview(&e.cover_letter)),
    );
    Some(Delivery {
        recipient: client,
        draft,
        toast: Toast::new(
            "New Job Application",
            format!("{applicant} just applied to {job_title}"),
        ),
    })
}

fn route_status(e: &EscrowStatusEvent, account: Address, snapshot: &AccountSnapshot) -> Option<Delivery> {
    if e.new_status != STATUS_WORK_STARTED {
        return None;
    }
    let meta = escrow_meta(snapshot, e.escrow_id)?;
    let freelancer = meta.freelancer?;
    if meta.client == freelancer || meta.client != account || freelancer == account {
        return None;
    }
    let title = project_title(Some(meta), e.escrow_id);
    let freelancer_name = short_address(&freelancer);

    let draft = escrow_notification(
        EscrowAction::WorkStarted,
        e.escrow_id,
        Details::new()
            .with("projectTitle", title.clone())
            .with("freelancerName", freelancer_name.clone()),
    );
    Some(Delivery {
        recipient: meta.client,
        draft,
        toast: Toast::new(
            "Freelancer Started Work",
            format!("{freelancer_name} has started work on {title}"),
        ),
    })
}

/// Freelancer to client.
fn route_submission(e: &MilestoneEvent, account: Address, snapshot: &AccountSnapshot) -> Option<Delivery> {
    let meta = escrow_meta(snapshot, e.escrow_id)?;
    let freelancer = if e.submitter != Address::ZERO {
        e.submitter
    } else {
        meta.freelancer?
    };
    if meta.client == freelancer || meta.client != account || freelancer == account {
        return None;
    }
    let title = project_title(Some(meta), e.escrow_id);
    let freelancer_name = short_address(&freelancer);
    let number = u32::from(e.milestone_index) + 1;

    let draft = milestone_notification(
        MilestoneAction::Submitted,
        e.escrow_id,
        e.milestone_index,
        Details::new()
            .with("projectTitle", title.clone())
            .with("freelancerName", freelancer_name.clone()),
    );
    Some(Delivery {
        recipient: meta.client,
        draft,
        toast: Toast::new(
            "Milestone Submitted",
            format!("{freelancer_name} submitted milestone {number} for {title}"),
        ),
    })
}

/// Client to freelancer: approvals and rejections.
fn route_client_decision(
    e: &MilestoneEvent,
    action: MilestoneAction,
    account: Address,
    snapshot: &AccountSnapshot,
) -> Option<Delivery> {
    let meta = escrow_meta(snapshot, e.escrow_id)?;
    let freelancer = meta.freelancer?;
    if freelancer == meta.client || freelancer != account || meta.client == account {
        return None;
    }
    let title = project_title(Some(meta), e.escrow_id);
    let number = u32::from(e.milestone_index) + 1;

    let (details, toast) = match action {
        MilestoneAction::Rejected => {
            let reason = if e.description.trim().is_empty() {
                "No reason provided".to_string()
            } else {
                e.description.clone()
            };
            (
                Details::new()
                    .with("projectTitle", title.clone())
                    .with("reason", reason),
                Toast::new(
                    "Milestone Rejected",
                    format!("Milestone {number} rejected for {title}"),
                )
                .destructive(),
            )
        }
        _ => (
            Details::new().with("projectTitle", title.clone()),
            Toast::new(
                "Milestone Approved!",
                format!("Milestone {number} approved for {title}"),
            ),
        ),
    };

    Some(Delivery {
        recipient: freelancer,
        draft: milestone_notification(action, e.escrow_id, e.milestone_index, details),
        toast,
    })
}

/// Either direction, decided by the initiator.
fn route_dispute(e: &DisputeEvent, account: Address, snapshot: &AccountSnapshot) -> Option<Delivery> {
    let meta = escrow_meta(snapshot, e.escrow_id)?;
    let freelancer = meta.freelancer?;
    if freelancer == meta.client || e.initiator == account {
        return None;
    }
    let recipient = if e.initiator == meta.client {
        freelancer
    } else if e.initiator == freelancer {
        meta.client
    } else {
        return None;
    };
    if recipient != account {
        return None;
    }
    let title = project_title(Some(meta), e.escrow_id);
    let number = u32::from(e.milestone_index) + 1;

    let draft = milestone_notification(
        MilestoneAction::Disputed,
        e.escrow_id,
        e.milestone_index,
        Details::new()
            .with("projectTitle", title.clone())
            .with("reason", "A dispute has been opened for this milestone"),
    );
    Some(Delivery {
        recipient,
        draft,
        toast: Toast::new(
            "Milestone Disputed",
            format!("Milestone {number} has been disputed for {title}"),
        )
        .destructive(),
    })
}
