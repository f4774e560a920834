//! Notification inbox and audit trail queries.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::clinic::Clinic;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{AuditLog, Notification};

impl Clinic {
    /// Notifications the user can see, newest first.
    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        let mut notifications = self
            .db
            .notifications
            .find(|n| n.viewers.iter().any(|v| v.user == user_id))
            .await;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }

    /// Mark a notification read for one of its viewers. The first read time
    /// is kept on repeated calls.
    pub async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> ClinicResult<Notification> {
        let (notification, found) = self
            .db
            .notifications
            .update(id, |n| match n.viewers.iter_mut().find(|v| v.user == user_id) {
                Some(viewer) => {
                    if !viewer.is_read {
                        viewer.is_read = true;
                        viewer.viewed_at = Some(Utc::now());
                    }
                    true
                }
                None => false,
            })
            .await
            .ok_or(ClinicError::not_found("Notification", id))?;
        if !found {
            return Err(ClinicError::not_found("Viewer", user_id));
        }
        debug!(notification = %id, user = %user_id, "notification read");
        Ok(notification)
    }

    /// Audit entries, newest first, optionally for one entity.
    pub async fn audit_trail(&self, entity_id: Option<Uuid>) -> Vec<AuditLog> {
        let mut entries = self
            .db
            .audit_logs
            .find(|e| entity_id.map_or(true, |id| e.entity_id == id))
            .await;
        entries.sort_by(|a, b| b.at.cmp(&a.at));
        entries
    }
}
