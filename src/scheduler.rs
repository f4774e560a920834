//! Appointment booking and status handling.
//!
//! The appointment record is the primary write of every operation here.
//! Slot release, step tracking and notifications follow it and are
//! best-effort: they are logged on failure and never change the result.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clinic::{Announcement, Clinic};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    Appointment, AppointmentStatus, AppointmentView, AuditAction, BookAppointment, Reschedule,
    Role,
};
use crate::outbox::{EmailMessage, SideEffect};
use crate::workflow::WorkflowEvent;

/// Filters for listing appointments.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
}

impl AppointmentFilter {
    fn matches(&self, apt: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| apt.patient_id == id)
            && self.doctor_id.map_or(true, |id| apt.doctor_id == id)
            && self.status.map_or(true, |s| apt.appointment_status == s)
            && self.date.map_or(true, |d| apt.appointment_date == d)
    }
}

impl Clinic {
    pub async fn get_appointment(&self, id: Uuid) -> ClinicResult<Appointment> {
        self.db
            .appointments
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Appointment", id))
    }

    /// Merge an appointment with the names of its patient and doctor.
    pub async fn view(&self, appointment: Appointment) -> AppointmentView {
        let patient_name = self
            .db
            .patients
            .get(appointment.patient_id)
            .await
            .map(|p| p.name);
        let doctor_name = self
            .db
            .doctors
            .get(appointment.doctor_id)
            .await
            .map(|d| d.name);
        AppointmentView {
            appointment,
            patient_name,
            doctor_name,
        }
    }

    pub async fn appointment_view(&self, id: Uuid) -> ClinicResult<AppointmentView> {
        let appointment = self.get_appointment(id).await?;
        Ok(self.view(appointment).await)
    }

    /// Appointments matching `filter`, ordered by date and start time.
    pub async fn list_appointments(&self, filter: &AppointmentFilter) -> Vec<AppointmentView> {
        let mut appointments = self.db.appointments.find(|a| filter.matches(a)).await;
        appointments.sort_by_key(|a| (a.appointment_date, a.start_time));

        let mut views = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            views.push(self.view(appointment).await);
        }
        views
    }

    /// Book a slot for a patient.
    pub async fn book_appointment(&self, request: BookAppointment) -> ClinicResult<AppointmentView> {
        let patient = self.get_patient(request.patient_id).await?;
        let doctor = self.get_doctor(request.doctor_id).await?;

        let appointment_id = Uuid::new_v4();
        let slot = self.calendar.write().await.reserve(
            doctor.id,
            request.appointment_date,
            request.slot_id,
            appointment_id,
        )?;

        let now = Utc::now();
        let appointment = self
            .db
            .appointments
            .insert(Appointment {
                id: appointment_id,
                patient_id: patient.id,
                doctor_id: doctor.id,
                appointment_date: request.appointment_date,
                slot_id: slot.slot_id,
                start_time: slot.start_time,
                end_time: slot.end_time,
                reason: request.reason,
                appointment_status: AppointmentStatus::Pending,
                task_created: false,
                created_at: now,
                updated_at: now,
            })
            .await;
        info!(
            appointment = %appointment.id,
            patient = %patient.id,
            doctor = %doctor.id,
            date = %appointment.appointment_date,
            "appointment booked"
        );
        self.audit(AuditAction::Created, "appointment", appointment.id, None).await;
        self.broadcast_availability(doctor.id, appointment.appointment_date).await;

        let tracked = self
            .track(WorkflowEvent::AppointmentBooked {
                appointment_id: appointment.id,
                patient_id: patient.id,
                doctor_id: doctor.id,
            })
            .await;
        let appointment = match tracked {
            Some(_) => self
                .db
                .appointments
                .update(appointment.id, |a| a.task_created = true)
                .await
                .map_or(appointment, |(a, ())| a),
            None => appointment,
        };

        let staff = self.users_with_roles(&[Role::Admin, Role::Staff]).await;
        self.announce(
            &staff,
            Announcement {
                event: "appointment-booked",
                message: format!(
                    "New appointment: {} with {} on {} at {}",
                    patient.name,
                    doctor.name,
                    appointment.appointment_date,
                    appointment.start_time.format("%H:%M")
                ),
                payload: json!({ "appointment_id": appointment.id }),
                email_subject: None,
            },
        )
        .await;

        Ok(AppointmentView {
            appointment,
            patient_name: Some(patient.name),
            doctor_name: Some(doctor.name),
        })
    }

    /// Write a new status and fan out its side effects.
    ///
    /// Any status may replace any other. Writing the status an appointment
    /// already has changes nothing else. The response reflects the stored
    /// appointment whether or not the follow-up effects succeed.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> ClinicResult<AppointmentView> {
        let (appointment, previous) = self
            .db
            .appointments
            .update(id, |a| {
                let previous = a.appointment_status;
                a.appointment_status = status;
                a.updated_at = Utc::now();
                previous
            })
            .await
            .ok_or(ClinicError::not_found("Appointment", id))?;
        info!(appointment = %id, from = %previous, to = %status, "appointment status updated");
        self.audit(
            AuditAction::StatusChanged,
            "appointment",
            id,
            Some(format!("{} -> {}", previous, status)),
        )
        .await;

        let view = self.view(appointment).await;
        if previous == status {
            debug!(appointment = %id, status = %status, "status repeated; no follow-up");
            return Ok(view);
        }
        if previous == AppointmentStatus::Cancelled {
            self.on_reopened(&view.appointment).await;
        }
        match status {
            AppointmentStatus::Confirmed => self.on_confirmed(&view).await,
            AppointmentStatus::Completed => {
                self.track(WorkflowEvent::TreatmentCompleted { appointment_id: id })
                    .await;
            }
            AppointmentStatus::Cancelled => self.on_cancelled(&view).await,
            AppointmentStatus::Reassigned => self.on_reassigned(&view).await,
            AppointmentStatus::Pending | AppointmentStatus::Rescheduled => {}
        }
        Ok(view)
    }

    /// Take back the slot a cancelled appointment gave up and reopen its
    /// step process. A slot that filled up in the meantime is logged and the
    /// status write stands.
    async fn on_reopened(&self, apt: &Appointment) {
        let reserved = self.calendar.write().await.reserve(
            apt.doctor_id,
            apt.appointment_date,
            apt.slot_id,
            apt.id,
        );
        match reserved {
            Ok(_) => {
                info!(appointment = %apt.id, slot = %apt.slot_id, "slot reserved again");
                self.broadcast_availability(apt.doctor_id, apt.appointment_date).await;
            }
            Err(err) => warn!(
                appointment = %apt.id,
                slot = %apt.slot_id,
                error = %err,
                "reopened appointment has no slot"
            ),
        }
        self.track(WorkflowEvent::AppointmentBooked {
            appointment_id: apt.id,
            patient_id: apt.patient_id,
            doctor_id: apt.doctor_id,
        })
        .await;
    }

    async fn on_confirmed(&self, view: &AppointmentView) {
        let apt = &view.appointment;
        self.track(WorkflowEvent::AppointmentConfirmed { appointment_id: apt.id })
            .await;

        self.notify_patient(
            apt.patient_id,
            Announcement {
                event: "appointment-confirmed",
                message: format!(
                    "Your appointment with {} on {} at {} is confirmed",
                    view.doctor_name.as_deref().unwrap_or("your doctor"),
                    apt.appointment_date,
                    apt.start_time.format("%H:%M")
                ),
                payload: json!({ "appointment_id": apt.id, "status": apt.appointment_status }),
                email_subject: Some("Appointment confirmed"),
            },
        )
        .await;
    }

    async fn on_cancelled(&self, view: &AppointmentView) {
        let apt = &view.appointment;
        self.release_slot(apt).await;
        self.broadcast_availability(apt.doctor_id, apt.appointment_date).await;
        self.track(WorkflowEvent::AppointmentCancelled { appointment_id: apt.id })
            .await;

        let mut recipients = self.users_with_roles(&[Role::Admin, Role::Staff]).await;
        recipients.extend(self.users_linked_to(apt.doctor_id).await);
        self.announce(
            &recipients,
            Announcement {
                event: "appointment-cancelled",
                message: format!(
                    "Appointment of {} with {} on {} at {} was cancelled",
                    view.patient_name.as_deref().unwrap_or("a patient"),
                    view.doctor_name.as_deref().unwrap_or("a doctor"),
                    apt.appointment_date,
                    apt.start_time.format("%H:%M")
                ),
                payload: json!({ "appointment_id": apt.id }),
                email_subject: Some("Appointment cancelled"),
            },
        )
        .await;
    }

    async fn on_reassigned(&self, view: &AppointmentView) {
        let apt = &view.appointment;
        let staff = self.users_with_roles(&[Role::Staff]).await;
        self.announce(
            &staff,
            Announcement {
                event: "appointment-reassigned",
                message: format!(
                    "Appointment of {} on {} needs to be re-assigned",
                    view.patient_name.as_deref().unwrap_or("a patient"),
                    apt.appointment_date
                ),
                payload: json!({ "appointment_id": apt.id }),
                email_subject: None,
            },
        )
        .await;
    }

    /// Return an appointment's place in its slot. Failures are logged only.
    async fn release_slot(&self, apt: &Appointment) {
        match self.calendar.write().await.release(apt.slot_id, apt.id) {
            Ok(true) => info!(appointment = %apt.id, slot = %apt.slot_id, "slot released"),
            Ok(false) => {}
            Err(err) => warn!(appointment = %apt.id, slot = %apt.slot_id, error = %err, "slot release failed"),
        }
    }

    /// Notify a patient through their accounts, or by e-mail to the address
    /// on file when they have none.
    pub(crate) async fn notify_patient(&self, patient_id: Uuid, announcement: Announcement<'_>) {
        let accounts = self.users_linked_to(patient_id).await;
        if !accounts.is_empty() {
            self.announce(&accounts, announcement).await;
            return;
        }
        if let (Some(subject), Some(patient)) =
            (announcement.email_subject, self.db.patients.get(patient_id).await)
        {
            self.outbox
                .enqueue(SideEffect::Email(EmailMessage {
                    to: patient.email,
                    subject: subject.to_string(),
                    text: announcement.message,
                }))
                .await;
        }
    }

    /// Move an appointment to another slot. The new slot is reserved before
    /// the old one is released, so a failed move leaves the booking intact.
    pub async fn reschedule(&self, id: Uuid, request: Reschedule) -> ClinicResult<AppointmentView> {
        let current = self.get_appointment(id).await?;
        if current.appointment_status == AppointmentStatus::Cancelled {
            return Err(ClinicError::validation(
                "A cancelled appointment cannot be rescheduled",
            ));
        }

        let slot = {
            let mut calendar = self.calendar.write().await;
            let slot = calendar.reserve(
                current.doctor_id,
                request.appointment_date,
                request.slot_id,
                current.id,
            )?;
            if current.slot_id != slot.slot_id {
                if let Err(err) = calendar.release(current.slot_id, current.id) {
                    warn!(appointment = %id, error = %err, "old slot release failed");
                }
            }
            slot
        };

        let (appointment, ()) = self
            .db
            .appointments
            .update(id, |a| {
                a.appointment_date = request.appointment_date;
                a.slot_id = slot.slot_id;
                a.start_time = slot.start_time;
                a.end_time = slot.end_time;
                a.appointment_status = AppointmentStatus::Rescheduled;
                a.updated_at = Utc::now();
            })
            .await
            .ok_or(ClinicError::not_found("Appointment", id))?;
        info!(appointment = %id, date = %appointment.appointment_date, "appointment rescheduled");
        self.audit(
            AuditAction::Updated,
            "appointment",
            id,
            Some(format!(
                "rescheduled to {} {}",
                appointment.appointment_date, appointment.start_time
            )),
        )
        .await;

        if current.appointment_date != request.appointment_date {
            self.broadcast_availability(current.doctor_id, current.appointment_date).await;
        }
        self.broadcast_availability(current.doctor_id, request.appointment_date).await;

        let view = self.view(appointment).await;
        self.notify_patient(
            view.appointment.patient_id,
            Announcement {
                event: "appointment-rescheduled",
                message: format!(
                    "Your appointment was moved to {} at {}",
                    view.appointment.appointment_date,
                    view.appointment.start_time.format("%H:%M")
                ),
                payload: json!({ "appointment_id": id }),
                email_subject: Some("Appointment rescheduled"),
            },
        )
        .await;
        Ok(view)
    }

    /// Delete an appointment that nothing clinical refers to yet.
    pub async fn delete_appointment(&self, id: Uuid) -> ClinicResult<Appointment> {
        let appointment = self.get_appointment(id).await?;

        let db = &self.db;
        let treatments = db.treatments.count(|t| t.appointment_id == id).await;
        let prescriptions = db.prescriptions.count(|p| p.appointment_id == id).await;
        let bills = db.bills.count(|b| b.appointment_id == id).await;
        if treatments + prescriptions + bills > 0 {
            return Err(ClinicError::HasDependents {
                entity: "appointment",
                reason: format!(
                    "still referenced by {} treatment(s), {} prescription(s), {} bill(s)",
                    treatments, prescriptions, bills
                ),
            });
        }

        db.appointments.remove(id).await;
        self.release_slot(&appointment).await;
        self.broadcast_availability(appointment.doctor_id, appointment.appointment_date).await;
        self.workflow.remove(id).await;
        info!(appointment = %id, "appointment deleted");
        self.audit(AuditAction::Deleted, "appointment", id, None).await;
        Ok(appointment)
    }
}
