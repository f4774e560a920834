//! Data models for the clinic.
//!
//! Records are plain owned structs keyed by UUID. Each `New*` input type is
//! validated by the matching record constructor before anything is stored.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ClinicError, ClinicResult};

fn require(value: &str, field: &str) -> ClinicResult<()> {
    if value.trim().is_empty() {
        return Err(ClinicError::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn require_email(value: &str) -> ClinicResult<()> {
    require(value, "Email")?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ClinicError::validation(format!("Invalid email: '{}'", value))),
    }
}

/// Account role, used to pick notification recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Doctor,
    Patient,
}

impl FromStr for Role {
    type Err = ClinicError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().trim() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            _ => Err(ClinicError::validation(format!(
                "Invalid role: '{}'. Must be one of: admin, staff, doctor, patient",
                value
            ))),
        }
    }
}

/// A login account. `link_id` points at the Patient, Doctor or Staff record
/// the account belongs to and is the key live sockets register under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub link_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub link_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn new(input: NewUser) -> ClinicResult<Self> {
        require(&input.name, "User name")?;
        require_email(&input.email)?;

        let id = Uuid::new_v4();
        Ok(User {
            id,
            // Admin accounts have no separate record; they link to themselves.
            link_id: input.link_id.unwrap_or(id),
            name: input.name,
            email: input.email,
            role: input.role,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

impl Patient {
    /// Create a new patient with validation.
    pub fn new(input: NewPatient) -> ClinicResult<Self> {
        require(&input.name, "Patient name")?;
        require_email(&input.email)?;
        require(&input.phone, "Patient phone")?;

        Ok(Patient {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            date_of_birth: input.date_of_birth,
            gender: input.gender,
            address: input.address,
            created_at: Utc::now(),
        })
    }

    pub fn apply(&mut self, update: PatientUpdate) -> ClinicResult<()> {
        if let Some(name) = update.name {
            require(&name, "Patient name")?;
            self.name = name;
        }
        if let Some(email) = update.email {
            require_email(&email)?;
            self.email = email;
        }
        if let Some(phone) = update.phone {
            require(&phone, "Patient phone")?;
            self.phone = phone;
        }
        if update.date_of_birth.is_some() {
            self.date_of_birth = update.date_of_birth;
        }
        if update.gender.is_some() {
            self.gender = update.gender;
        }
        if update.address.is_some() {
            self.address = update.address;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub specialization: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDoctor {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub specialization: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialization: Option<String>,
}

impl Doctor {
    pub fn new(input: NewDoctor) -> ClinicResult<Self> {
        require(&input.name, "Doctor name")?;
        require_email(&input.email)?;
        require(&input.phone, "Doctor phone")?;
        require(&input.specialization, "Specialization")?;

        Ok(Doctor {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            specialization: input.specialization,
            created_at: Utc::now(),
        })
    }

    pub fn apply(&mut self, update: DoctorUpdate) -> ClinicResult<()> {
        if let Some(name) = update.name {
            require(&name, "Doctor name")?;
            self.name = name;
        }
        if let Some(email) = update.email {
            require_email(&email)?;
            self.email = email;
        }
        if let Some(phone) = update.phone {
            require(&phone, "Doctor phone")?;
            self.phone = phone;
        }
        if let Some(specialization) = update.specialization {
            require(&specialization, "Specialization")?;
            self.specialization = specialization;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub position: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub position: String,
}

impl Staff {
    pub fn new(input: NewStaff) -> ClinicResult<Self> {
        require(&input.name, "Staff name")?;
        require_email(&input.email)?;
        require(&input.phone, "Staff phone")?;
        require(&input.position, "Position")?;

        Ok(Staff {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            position: input.position,
            created_at: Utc::now(),
        })
    }
}

/// Appointment status as written by staff, doctors and patients.
///
/// Any status may be written over any other; workflow ordering is enforced
/// by the step process, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Cancelled,
    Completed,
    #[serde(rename = "Re-assigned")]
    Reassigned,
}

impl AppointmentStatus {
    pub fn name(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Rescheduled => "Rescheduled",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Reassigned => "Re-assigned",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = ClinicError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().trim() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "rescheduled" => Ok(AppointmentStatus::Rescheduled),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            "re-assigned" | "reassigned" => Ok(AppointmentStatus::Reassigned),
            _ => Err(ClinicError::validation(format!(
                "Invalid status: '{}'. Must be one of: Pending, Confirmed, Rescheduled, Cancelled, Completed, Re-assigned",
                value
            ))),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A booked appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub slot_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: Option<String>,
    pub appointment_status: AppointmentStatus,
    pub task_created: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A patient's request to book a slot.
#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub slot_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reschedule {
    pub appointment_date: NaiveDate,
    pub slot_id: Uuid,
}

/// An appointment merged with the names of the people on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: Option<String>,
    pub doctor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub procedure: String,
    pub tooth_numbers: Vec<u8>,
    pub notes: Option<String>,
    /// Cost in minor currency units.
    pub cost: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTreatment {
    pub appointment_id: Uuid,
    pub procedure: String,
    #[serde(default)]
    pub tooth_numbers: Vec<u8>,
    pub notes: Option<String>,
    pub cost: u64,
}

impl Treatment {
    /// Build a treatment for an appointment. Tooth numbers follow the FDI
    /// two-digit notation (quadrant 1-8, tooth 1-8).
    pub fn new(input: NewTreatment, appointment: &Appointment) -> ClinicResult<Self> {
        require(&input.procedure, "Procedure")?;
        if let Some(bad) = input
            .tooth_numbers
            .iter()
            .find(|&&n| !(1..=8).contains(&(n / 10)) || !(1..=8).contains(&(n % 10)))
        {
            return Err(ClinicError::validation(format!("Invalid tooth number: {}", bad)));
        }

        Ok(Treatment {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            procedure: input.procedure,
            tooth_numbers: input.tooth_numbers,
            notes: input.notes,
            cost: input.cost,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medications: Vec<Medication>,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub appointment_id: Uuid,
    pub medications: Vec<Medication>,
    pub instructions: Option<String>,
}

impl Prescription {
    pub fn new(input: NewPrescription, appointment: &Appointment) -> ClinicResult<Self> {
        if input.medications.is_empty() {
            return Err(ClinicError::validation(
                "Prescription needs at least one medication",
            ));
        }
        for medication in &input.medications {
            require(&medication.name, "Medication name")?;
            require(&medication.dosage, "Medication dosage")?;
        }

        Ok(Prescription {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            medications: input.medications,
            instructions: input.instructions,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub description: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub invoice_number: String,
    pub treatment_id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub items: Vec<BillItem>,
    pub subtotal: u64,
    pub discount: u64,
    pub total: u64,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBill {
    pub treatment_id: Uuid,
    #[serde(default)]
    pub items: Vec<BillItem>,
    #[serde(default)]
    pub discount: u64,
}

impl Bill {
    /// Build the invoice for a treatment. With no explicit items the bill
    /// carries one line for the treatment itself.
    pub fn new(input: NewBill, treatment: &Treatment) -> ClinicResult<Self> {
        let items = if input.items.is_empty() {
            vec![BillItem {
                description: treatment.procedure.clone(),
                amount: treatment.cost,
            }]
        } else {
            input.items
        };
        for item in &items {
            require(&item.description, "Bill item description")?;
        }

        let subtotal = items
            .iter()
            .try_fold(0u64, |acc, item| acc.checked_add(item.amount))
            .ok_or_else(|| ClinicError::validation("Bill total overflows"))?;
        let created_at = Utc::now();
        let id = Uuid::new_v4();

        Ok(Bill {
            id,
            invoice_number: format!(
                "INV-{}-{}",
                created_at.format("%Y%m%d"),
                &id.simple().to_string()[..8].to_uppercase()
            ),
            treatment_id: treatment.id,
            appointment_id: treatment.appointment_id,
            patient_id: treatment.patient_id,
            items,
            subtotal,
            discount: input.discount,
            total: subtotal.saturating_sub(input.discount),
            payment_status: PaymentStatus::Unpaid,
            paid_at: None,
            created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider: String,
    pub policy_number: String,
    pub coverage_percent: u8,
    pub valid_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInsurance {
    pub provider: String,
    pub policy_number: String,
    pub coverage_percent: u8,
    pub valid_until: Option<NaiveDate>,
}

impl Insurance {
    pub fn new(patient_id: Uuid, input: NewInsurance) -> ClinicResult<Self> {
        require(&input.provider, "Insurance provider")?;
        require(&input.policy_number, "Policy number")?;
        if input.coverage_percent > 100 {
            return Err(ClinicError::validation(
                "Coverage percent must be between 0 and 100",
            ));
        }

        Ok(Insurance {
            id: Uuid::new_v4(),
            patient_id,
            provider: input.provider,
            policy_number: input.policy_number,
            coverage_percent: input.coverage_percent,
            valid_until: input.valid_until,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DentalHistory {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub condition: String,
    pub notes: Option<String>,
    pub recorded_on: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDentalHistory {
    pub condition: String,
    pub notes: Option<String>,
    pub recorded_on: Option<NaiveDate>,
}

impl DentalHistory {
    pub fn new(patient_id: Uuid, input: NewDentalHistory) -> ClinicResult<Self> {
        require(&input.condition, "Condition")?;

        Ok(DentalHistory {
            id: Uuid::new_v4(),
            patient_id,
            condition: input.condition,
            notes: input.notes,
            recorded_on: input.recorded_on.unwrap_or_else(|| Utc::now().date_naive()),
        })
    }
}

/// Per-user read state on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user: Uuid,
    pub is_read: bool,
    pub viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub viewers: Vec<Viewer>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: String, viewers: &[Uuid]) -> Self {
        Notification {
            id: Uuid::new_v4(),
            message,
            viewers: viewers
                .iter()
                .map(|&user| Viewer {
                    user,
                    is_read: false,
                    viewed_at: None,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }
}

/// A consumable the clinic keeps on its shelves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub quantity: u32,
    /// At or below this quantity the item is low on stock.
    pub reorder_level: u32,
    pub unit_cost: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub reorder_level: u32,
    #[serde(default)]
    pub unit_cost: u64,
}

/// Signed change to an item's stock: positive for deliveries, negative for use.
#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
    pub reason: Option<String>,
}

impl InventoryItem {
    pub fn new(input: NewInventoryItem) -> ClinicResult<Self> {
        require(&input.name, "Item name")?;
        require(&input.unit, "Unit")?;

        let now = Utc::now();
        Ok(InventoryItem {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            category: input.category,
            unit: input.unit,
            quantity: input.quantity,
            reorder_level: input.reorder_level,
            unit_cost: input.unit_cost,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_low(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    /// Apply a stock change. Stock never goes below zero.
    pub fn adjust(&mut self, delta: i64) -> ClinicResult<()> {
        let next = i64::from(self.quantity) + delta;
        if next < 0 {
            return Err(ClinicError::validation(format!(
                "Insufficient stock for {}: {} {} on hand, {} requested",
                self.name,
                self.quantity,
                self.unit,
                delta.unsigned_abs()
            )));
        }
        self.quantity = u32::try_from(next).map_err(|_| {
            ClinicError::validation(format!("Stock for {} exceeds the maximum", self.name))
        })?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Created,
    Updated,
    StatusChanged,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity: String,
    pub entity_id: Uuid,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment() -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            slot_id: Uuid::new_v4(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            reason: None,
            appointment_status: AppointmentStatus::Completed,
            task_created: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn gloves() -> InventoryItem {
        InventoryItem::new(NewInventoryItem {
            name: "Nitrile gloves".to_string(),
            category: Some("Disposables".to_string()),
            unit: "box".to_string(),
            quantity: 10,
            reorder_level: 4,
            unit_cost: 899,
        })
        .unwrap()
    }

    #[test]
    fn stock_cannot_go_negative() {
        let mut item = gloves();
        let err = item.adjust(-11).unwrap_err();
        assert!(err.to_string().contains("Insufficient stock"));
        assert_eq!(item.quantity, 10);

        item.adjust(-6).unwrap();
        assert_eq!(item.quantity, 4);
        assert!(item.is_low());
        item.adjust(20).unwrap();
        assert!(!item.is_low());
    }

    #[test]
    fn inventory_item_requires_name_and_unit() {
        let err = InventoryItem::new(NewInventoryItem {
            name: " ".to_string(),
            category: None,
            unit: "box".to_string(),
            quantity: 0,
            reorder_level: 0,
            unit_cost: 0,
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Item name cannot be empty");
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "confirmed".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Confirmed
        );
        assert_eq!(
            "Re-assigned".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Reassigned
        );
        assert!("Done".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn reassigned_serializes_with_hyphen() {
        let json = serde_json::to_string(&AppointmentStatus::Reassigned).unwrap();
        assert_eq!(json, "\"Re-assigned\"");
    }

    #[test]
    fn patient_requires_valid_email() {
        let input = NewPatient {
            name: "Ana".to_string(),
            email: "not-an-email".to_string(),
            phone: "555".to_string(),
            date_of_birth: None,
            gender: None,
            address: None,
        };
        assert!(matches!(Patient::new(input), Err(ClinicError::Validation(_))));
    }

    #[test]
    fn treatment_rejects_bad_tooth_numbers() {
        let input = NewTreatment {
            appointment_id: Uuid::new_v4(),
            procedure: "Filling".to_string(),
            tooth_numbers: vec![11, 95],
            notes: None,
            cost: 12_000,
        };
        assert!(Treatment::new(input, &appointment()).is_err());
    }

    #[test]
    fn bill_defaults_to_treatment_line_and_floors_total() {
        let apt = appointment();
        let treatment = Treatment::new(
            NewTreatment {
                appointment_id: apt.id,
                procedure: "Root canal".to_string(),
                tooth_numbers: vec![36],
                notes: None,
                cost: 50_000,
            },
            &apt,
        )
        .unwrap();

        let bill = Bill::new(
            NewBill {
                treatment_id: treatment.id,
                items: vec![],
                discount: 70_000,
            },
            &treatment,
        )
        .unwrap();

        assert_eq!(bill.items.len(), 1);
        assert_eq!(bill.items[0].description, "Root canal");
        assert_eq!(bill.subtotal, 50_000);
        assert_eq!(bill.total, 0);
        assert!(bill.invoice_number.starts_with("INV-"));
        assert_eq!(bill.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn insurance_coverage_is_bounded() {
        let input = NewInsurance {
            provider: "Delta".to_string(),
            policy_number: "P-1".to_string(),
            coverage_percent: 120,
            valid_until: None,
        };
        assert!(Insurance::new(Uuid::new_v4(), input).is_err());
    }
}
