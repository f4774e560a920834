//! Treatments, prescriptions and bills recorded against a completed
//! appointment.

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::clinic::{Announcement, Clinic};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    Appointment, AppointmentStatus, AuditAction, Bill, NewBill, NewPrescription, NewTreatment,
    PaymentStatus, Prescription, Treatment,
};
use crate::workflow::WorkflowEvent;

/// Format cents as a currency amount, e.g. `12345` as `123.45`.
pub fn format_amount(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

impl Clinic {
    async fn completed_appointment(&self, id: Uuid, what: &str) -> ClinicResult<Appointment> {
        let appointment = self.get_appointment(id).await?;
        if appointment.appointment_status != AppointmentStatus::Completed {
            return Err(ClinicError::validation(format!(
                "Cannot record a {} for an appointment that is {}; it must be Completed",
                what, appointment.appointment_status
            )));
        }
        Ok(appointment)
    }

    pub async fn create_treatment(&self, input: NewTreatment) -> ClinicResult<Treatment> {
        let appointment = self
            .completed_appointment(input.appointment_id, "treatment")
            .await?;
        let treatment = self
            .db
            .treatments
            .insert(Treatment::new(input, &appointment)?)
            .await;
        info!(treatment = %treatment.id, appointment = %appointment.id, "treatment recorded");
        self.audit(AuditAction::Created, "treatment", treatment.id, None).await;

        self.track(WorkflowEvent::TreatmentCompleted {
            appointment_id: appointment.id,
        })
        .await;
        self.notify_patient(
            appointment.patient_id,
            Announcement {
                event: "treatment-recorded",
                message: format!("Treatment recorded: {}", treatment.procedure),
                payload: json!({
                    "appointment_id": appointment.id,
                    "treatment_id": treatment.id,
                }),
                email_subject: None,
            },
        )
        .await;
        Ok(treatment)
    }

    pub async fn get_treatment(&self, id: Uuid) -> ClinicResult<Treatment> {
        self.db
            .treatments
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Treatment", id))
    }

    pub async fn treatments_for(&self, appointment_id: Uuid) -> ClinicResult<Vec<Treatment>> {
        self.get_appointment(appointment_id).await?;
        let mut treatments = self
            .db
            .treatments
            .find(|t| t.appointment_id == appointment_id)
            .await;
        treatments.sort_by_key(|t| t.created_at);
        Ok(treatments)
    }

    /// Delete a treatment that has not been billed.
    pub async fn delete_treatment(&self, id: Uuid) -> ClinicResult<Treatment> {
        self.get_treatment(id).await?;
        if self.db.bills.count(|b| b.treatment_id == id).await > 0 {
            return Err(ClinicError::HasDependents {
                entity: "treatment",
                reason: "it has already been billed".to_string(),
            });
        }
        let treatment = self
            .db
            .treatments
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Treatment", id))?;
        info!(treatment = %id, "treatment deleted");
        self.audit(AuditAction::Deleted, "treatment", id, None).await;
        Ok(treatment)
    }

    pub async fn create_prescription(&self, input: NewPrescription) -> ClinicResult<Prescription> {
        let appointment = self
            .completed_appointment(input.appointment_id, "prescription")
            .await?;
        let prescription = self
            .db
            .prescriptions
            .insert(Prescription::new(input, &appointment)?)
            .await;
        info!(
            prescription = %prescription.id,
            appointment = %appointment.id,
            medications = prescription.medications.len(),
            "prescription issued"
        );
        self.audit(AuditAction::Created, "prescription", prescription.id, None)
            .await;

        self.track(WorkflowEvent::PrescriptionIssued {
            appointment_id: appointment.id,
        })
        .await;
        let names: Vec<&str> = prescription
            .medications
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        self.notify_patient(
            appointment.patient_id,
            Announcement {
                event: "prescription-issued",
                message: format!("New prescription: {}", names.join(", ")),
                payload: json!({
                    "appointment_id": appointment.id,
                    "prescription_id": prescription.id,
                }),
                email_subject: None,
            },
        )
        .await;
        Ok(prescription)
    }

    pub async fn prescriptions_for(&self, appointment_id: Uuid) -> ClinicResult<Vec<Prescription>> {
        self.get_appointment(appointment_id).await?;
        let mut prescriptions = self
            .db
            .prescriptions
            .find(|p| p.appointment_id == appointment_id)
            .await;
        prescriptions.sort_by_key(|p| p.created_at);
        Ok(prescriptions)
    }

    /// Bill a treatment. A treatment is billed at most once.
    pub async fn create_bill(&self, input: NewBill) -> ClinicResult<Bill> {
        let treatment = self.get_treatment(input.treatment_id).await?;
        if self.db.bills.count(|b| b.treatment_id == treatment.id).await > 0 {
            return Err(ClinicError::validation(format!(
                "Treatment {} has already been billed",
                treatment.id
            )));
        }

        let bill = self.db.bills.insert(Bill::new(input, &treatment)?).await;
        info!(
            bill = %bill.id,
            invoice = %bill.invoice_number,
            total = bill.total,
            "bill created"
        );
        self.audit(AuditAction::Created, "bill", bill.id, None).await;

        self.track(WorkflowEvent::BillCreated {
            appointment_id: bill.appointment_id,
        })
        .await;

        let mut summary = format!("Invoice {}\n", bill.invoice_number);
        for item in &bill.items {
            summary.push_str(&format!("{}: {}\n", item.description, format_amount(item.amount)));
        }
        if bill.discount > 0 {
            summary.push_str(&format!("Discount: -{}\n", format_amount(bill.discount)));
        }
        summary.push_str(&format!("Total: {}", format_amount(bill.total)));

        self.notify_patient(
            bill.patient_id,
            Announcement {
                event: "bill-created",
                message: summary,
                payload: json!({
                    "bill_id": bill.id,
                    "invoice_number": bill.invoice_number,
                    "total": bill.total,
                }),
                email_subject: Some("Your invoice"),
            },
        )
        .await;
        Ok(bill)
    }

    pub async fn get_bill(&self, id: Uuid) -> ClinicResult<Bill> {
        self.db
            .bills
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Bill", id))
    }

    /// Mark a bill paid. Paying a paid bill keeps the original payment time.
    pub async fn pay_bill(&self, id: Uuid) -> ClinicResult<Bill> {
        let (bill, newly_paid) = self
            .db
            .bills
            .update(id, |b| {
                if b.payment_status == PaymentStatus::Paid {
                    return false;
                }
                b.payment_status = PaymentStatus::Paid;
                b.paid_at = Some(Utc::now());
                true
            })
            .await
            .ok_or(ClinicError::not_found("Bill", id))?;
        if newly_paid {
            info!(bill = %id, total = bill.total, "bill paid");
            self.audit(AuditAction::Updated, "bill", id, Some("paid".to_string()))
                .await;
        }
        Ok(bill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_render_with_two_decimals() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(12345), "123.45");
    }
}
