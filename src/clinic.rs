//! The clinic service: shared state plus the helpers every operation uses.
//!
//! Operations are split across `directory` (people and their records),
//! `scheduler` (booking and appointment status), `clinical` (treatments,
//! prescriptions, bills) and `inbox` (notifications and audit trail), each
//! adding an `impl Clinic` block.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::models::{AuditAction, AuditLog, Role, User};
use crate::outbox::{EmailMessage, Outbox, SideEffect};
use crate::presence::SocketEvent;
use crate::store::Database;
use crate::workflow::{StepProcess, WorkflowEvent, WorkflowReducer};

pub struct Clinic {
    pub db: Arc<Database>,
    pub calendar: RwLock<Calendar>,
    pub workflow: WorkflowReducer,
    pub outbox: Arc<Outbox>,
}

/// What to tell a set of users about one occurrence.
pub(crate) struct Announcement<'a> {
    pub event: &'a str,
    pub message: String,
    pub payload: Value,
    /// When set, every recipient with an address also gets an e-mail.
    pub email_subject: Option<&'a str>,
}

impl Clinic {
    pub fn new(db: Arc<Database>, outbox: Arc<Outbox>) -> Self {
        Clinic {
            db,
            calendar: RwLock::new(Calendar::new()),
            workflow: WorkflowReducer::new(),
            outbox,
        }
    }

    /// A clinic with fresh in-memory storage and its own outbox.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(Database::new()), Arc::new(Outbox::new()))
    }

    /// Hand an event to the step-process reducer. Rejections are logged and
    /// never fail the calling operation.
    pub(crate) async fn track(&self, event: WorkflowEvent) -> Option<StepProcess> {
        match self.workflow.publish(event).await {
            Ok(process) => Some(process),
            Err(err) => {
                warn!(
                    appointment = %event.appointment_id(),
                    event = event.name(),
                    error = %err,
                    "step process not updated"
                );
                None
            }
        }
    }

    pub async fn step_process(&self, appointment_id: Uuid) -> Option<StepProcess> {
        self.workflow.get(appointment_id).await
    }

    pub(crate) async fn users_with_roles(&self, roles: &[Role]) -> Vec<User> {
        self.db.users.find(|u| roles.contains(&u.role)).await
    }

    /// Accounts linked to a patient, doctor or staff record.
    pub(crate) async fn users_linked_to(&self, link_id: Uuid) -> Vec<User> {
        self.db.users.find(|u| u.link_id == link_id).await
    }

    /// Queue a notification for `recipients`: one stored notification with
    /// all of them as viewers, a live push per recipient and optionally an
    /// e-mail each.
    pub(crate) async fn announce(&self, recipients: &[User], announcement: Announcement<'_>) {
        if recipients.is_empty() {
            return;
        }

        let mut viewers: Vec<Uuid> = recipients.iter().map(|u| u.id).collect();
        viewers.sort();
        viewers.dedup();

        let mut effects = vec![SideEffect::StoreNotification {
            message: announcement.message.clone(),
            viewers,
        }];
        let event = SocketEvent::new(announcement.event, announcement.payload);
        for user in recipients {
            effects.push(SideEffect::Push {
                user_id: user.link_id,
                event: event.clone(),
            });
            if let Some(subject) = announcement.email_subject {
                effects.push(SideEffect::Email(EmailMessage {
                    to: user.email.clone(),
                    subject: subject.to_string(),
                    text: announcement.message.clone(),
                }));
            }
        }
        self.outbox.enqueue_all(effects).await;
    }

    /// Tell every connected client that a doctor's availability changed.
    pub(crate) async fn broadcast_availability(&self, doctor_id: Uuid, date: chrono::NaiveDate) {
        self.outbox
            .enqueue(SideEffect::Broadcast {
                event: SocketEvent::new(
                    "availability-changed",
                    serde_json::json!({ "doctor_id": doctor_id, "date": date }),
                ),
            })
            .await;
    }

    pub(crate) async fn audit(
        &self,
        action: AuditAction,
        entity: &str,
        entity_id: Uuid,
        detail: Option<String>,
    ) {
        self.db
            .audit_logs
            .insert(AuditLog {
                id: Uuid::new_v4(),
                action,
                entity: entity.to_string(),
                entity_id,
                detail,
                at: chrono::Utc::now(),
            })
            .await;
    }
}

impl Default for Clinic {
    fn default() -> Self {
        Self::in_memory()
    }
}
