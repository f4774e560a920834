//! People and their standing records: accounts, patients, doctors, staff,
//! insurance, dental history and doctor schedules.
//!
//! Deletes are guarded by existence checks on dependent rows. A guarded
//! delete removes nothing and reports what still refers to the record.

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::calendar::{DayPlan, DoctorSchedule, NewSchedule, Slot};
use crate::clinic::Clinic;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    AuditAction, DentalHistory, Doctor, DoctorUpdate, Insurance, NewDentalHistory, NewDoctor,
    NewInsurance, NewPatient, NewStaff, NewUser, Patient, PatientUpdate, Role, Staff, User,
};

/// Join the non-zero dependent counts into a readable reason.
fn dependents_reason(counts: &[(usize, &str)]) -> Option<String> {
    let parts: Vec<String> = counts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, what)| format!("{} {}", n, what))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(format!("still referenced by {}", parts.join(", ")))
    }
}

impl Clinic {
    pub async fn create_user(&self, input: NewUser) -> ClinicResult<User> {
        let user = User::new(input)?;
        if !self.db.users.find(|u| u.email == user.email).await.is_empty() {
            return Err(ClinicError::validation(format!(
                "A user with email {} already exists",
                user.email
            )));
        }
        let user = self.db.users.insert(user).await;
        info!(user = %user.id, role = ?user.role, "user created");
        self.audit(AuditAction::Created, "user", user.id, None).await;
        Ok(user)
    }

    pub async fn list_users(&self, role: Option<Role>) -> Vec<User> {
        let mut users = self
            .db
            .users
            .find(|u| role.map_or(true, |r| u.role == r))
            .await;
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }

    pub async fn create_patient(&self, input: NewPatient) -> ClinicResult<Patient> {
        let patient = self.db.patients.insert(Patient::new(input)?).await;
        info!(patient = %patient.id, "patient created");
        self.audit(AuditAction::Created, "patient", patient.id, None).await;
        Ok(patient)
    }

    pub async fn get_patient(&self, id: Uuid) -> ClinicResult<Patient> {
        self.db
            .patients
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Patient", id))
    }

    pub async fn list_patients(&self) -> Vec<Patient> {
        let mut patients = self.db.patients.all().await;
        patients.sort_by(|a, b| a.name.cmp(&b.name));
        patients
    }

    pub async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> ClinicResult<Patient> {
        let (patient, result) = self
            .db
            .patients
            .update(id, |p| {
                // Validate on a copy so a bad field leaves the record untouched.
                let mut draft = p.clone();
                draft.apply(update).map(|()| *p = draft)
            })
            .await
            .ok_or(ClinicError::not_found("Patient", id))?;
        result?;
        self.audit(AuditAction::Updated, "patient", id, None).await;
        Ok(patient)
    }

    pub async fn delete_patient(&self, id: Uuid) -> ClinicResult<Patient> {
        self.get_patient(id).await?;

        let db = &self.db;
        let reason = dependents_reason(&[
            (db.appointments.count(|a| a.patient_id == id).await, "appointment(s)"),
            (db.treatments.count(|t| t.patient_id == id).await, "treatment(s)"),
            (db.bills.count(|b| b.patient_id == id).await, "bill(s)"),
            (db.insurances.count(|i| i.patient_id == id).await, "insurance record(s)"),
            (db.dental_histories.count(|h| h.patient_id == id).await, "dental history record(s)"),
        ]);
        if let Some(reason) = reason {
            return Err(ClinicError::HasDependents { entity: "patient", reason });
        }

        let patient = db
            .patients
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Patient", id))?;
        info!(patient = %id, "patient deleted");
        self.audit(AuditAction::Deleted, "patient", id, None).await;
        Ok(patient)
    }

    pub async fn create_doctor(&self, input: NewDoctor) -> ClinicResult<Doctor> {
        let doctor = self.db.doctors.insert(Doctor::new(input)?).await;
        info!(doctor = %doctor.id, "doctor created");
        self.audit(AuditAction::Created, "doctor", doctor.id, None).await;
        Ok(doctor)
    }

    pub async fn get_doctor(&self, id: Uuid) -> ClinicResult<Doctor> {
        self.db
            .doctors
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Doctor", id))
    }

    pub async fn list_doctors(&self) -> Vec<Doctor> {
        let mut doctors = self.db.doctors.all().await;
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        doctors
    }

    pub async fn update_doctor(&self, id: Uuid, update: DoctorUpdate) -> ClinicResult<Doctor> {
        let (doctor, result) = self
            .db
            .doctors
            .update(id, |d| {
                let mut draft = d.clone();
                draft.apply(update).map(|()| *d = draft)
            })
            .await
            .ok_or(ClinicError::not_found("Doctor", id))?;
        result?;
        self.audit(AuditAction::Updated, "doctor", id, None).await;
        Ok(doctor)
    }

    pub async fn delete_doctor(&self, id: Uuid) -> ClinicResult<Doctor> {
        self.get_doctor(id).await?;

        let db = &self.db;
        let schedules = self.calendar.read().await.schedules_for(id).len();
        let reason = dependents_reason(&[
            (db.appointments.count(|a| a.doctor_id == id).await, "appointment(s)"),
            (db.treatments.count(|t| t.doctor_id == id).await, "treatment(s)"),
            (schedules, "schedule(s)"),
        ]);
        if let Some(reason) = reason {
            return Err(ClinicError::HasDependents { entity: "doctor", reason });
        }

        let doctor = db
            .doctors
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Doctor", id))?;
        info!(doctor = %id, "doctor deleted");
        self.audit(AuditAction::Deleted, "doctor", id, None).await;
        Ok(doctor)
    }

    pub async fn create_staff(&self, input: NewStaff) -> ClinicResult<Staff> {
        let staff = self.db.staff.insert(Staff::new(input)?).await;
        info!(staff = %staff.id, "staff member created");
        self.audit(AuditAction::Created, "staff", staff.id, None).await;
        Ok(staff)
    }

    pub async fn get_staff(&self, id: Uuid) -> ClinicResult<Staff> {
        self.db
            .staff
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Staff", id))
    }

    pub async fn list_staff(&self) -> Vec<Staff> {
        let mut staff = self.db.staff.all().await;
        staff.sort_by(|a, b| a.name.cmp(&b.name));
        staff
    }

    pub async fn delete_staff(&self, id: Uuid) -> ClinicResult<Staff> {
        let staff = self
            .db
            .staff
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Staff", id))?;
        self.audit(AuditAction::Deleted, "staff", id, None).await;
        Ok(staff)
    }

    pub async fn add_insurance(&self, patient_id: Uuid, input: NewInsurance) -> ClinicResult<Insurance> {
        self.get_patient(patient_id).await?;
        let insurance = self
            .db
            .insurances
            .insert(Insurance::new(patient_id, input)?)
            .await;
        self.audit(AuditAction::Created, "insurance", insurance.id, None).await;
        Ok(insurance)
    }

    pub async fn insurance_for(&self, patient_id: Uuid) -> ClinicResult<Vec<Insurance>> {
        self.get_patient(patient_id).await?;
        Ok(self
            .db
            .insurances
            .find(|i| i.patient_id == patient_id)
            .await)
    }

    pub async fn delete_insurance(&self, id: Uuid) -> ClinicResult<Insurance> {
        let insurance = self
            .db
            .insurances
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Insurance", id))?;
        self.audit(AuditAction::Deleted, "insurance", id, None).await;
        Ok(insurance)
    }

    pub async fn add_dental_history(
        &self,
        patient_id: Uuid,
        input: NewDentalHistory,
    ) -> ClinicResult<DentalHistory> {
        self.get_patient(patient_id).await?;
        let entry = self
            .db
            .dental_histories
            .insert(DentalHistory::new(patient_id, input)?)
            .await;
        self.audit(AuditAction::Created, "dental-history", entry.id, None).await;
        Ok(entry)
    }

    /// A patient's dental history, most recent first.
    pub async fn dental_history_for(&self, patient_id: Uuid) -> ClinicResult<Vec<DentalHistory>> {
        self.get_patient(patient_id).await?;
        let mut entries = self
            .db
            .dental_histories
            .find(|h| h.patient_id == patient_id)
            .await;
        entries.sort_by(|a, b| b.recorded_on.cmp(&a.recorded_on));
        Ok(entries)
    }

    pub async fn delete_dental_history(&self, id: Uuid) -> ClinicResult<DentalHistory> {
        let entry = self
            .db
            .dental_histories
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Dental history", id))?;
        self.audit(AuditAction::Deleted, "dental-history", id, None).await;
        Ok(entry)
    }

    pub async fn create_schedule(&self, input: NewSchedule) -> ClinicResult<DoctorSchedule> {
        self.get_doctor(input.doctor_id).await?;
        let schedule = self.calendar.write().await.add_schedule(input)?;
        info!(schedule = %schedule.id, doctor = %schedule.doctor_id, date = %schedule.date, "schedule created");
        self.audit(AuditAction::Created, "schedule", schedule.id, None).await;
        self.broadcast_availability(schedule.doctor_id, schedule.date).await;
        Ok(schedule)
    }

    pub async fn generate_schedule(&self, plan: DayPlan) -> ClinicResult<DoctorSchedule> {
        self.get_doctor(plan.doctor_id).await?;
        let schedule = self.calendar.write().await.generate_daily(plan)?;
        info!(
            schedule = %schedule.id,
            doctor = %schedule.doctor_id,
            date = %schedule.date,
            slots = schedule.slots.len(),
            "schedule generated"
        );
        self.audit(AuditAction::Created, "schedule", schedule.id, None).await;
        self.broadcast_availability(schedule.doctor_id, schedule.date).await;
        Ok(schedule)
    }

    pub async fn schedules_for(&self, doctor_id: Uuid) -> ClinicResult<Vec<DoctorSchedule>> {
        self.get_doctor(doctor_id).await?;
        Ok(self.calendar.read().await.schedules_for(doctor_id))
    }

    pub async fn available_slots(&self, doctor_id: Uuid, date: NaiveDate) -> ClinicResult<Vec<Slot>> {
        self.get_doctor(doctor_id).await?;
        Ok(self.calendar.read().await.available_slots(doctor_id, date))
    }

    pub async fn delete_schedule(&self, id: Uuid) -> ClinicResult<DoctorSchedule> {
        let schedule = self.calendar.write().await.remove_schedule(id)?;
        self.audit(AuditAction::Deleted, "schedule", id, None).await;
        self.broadcast_availability(schedule.doctor_id, schedule.date).await;
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependents_reason_lists_only_nonzero_counts() {
        assert_eq!(dependents_reason(&[(0, "bill(s)")]), None);
        assert_eq!(
            dependents_reason(&[(2, "treatment(s)"), (0, "bill(s)"), (1, "insurance record(s)")]),
            Some("still referenced by 2 treatment(s), 1 insurance record(s)".to_string())
        );
    }
}
