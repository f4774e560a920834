//! Appointment step process.
//!
//! Every appointment is tracked through six fixed steps:
//! Appointment, Confirmation, Treatment, Prescription, Completed, Payment.
//!
//! Domain operations never touch a step process directly. They publish a
//! `WorkflowEvent` to the `WorkflowReducer`, which owns every process, holds
//! the transition rules, and is the only writer. Events that arrive out of
//! order are rejected; events that repeat the current state are accepted as
//! no-ops so duplicate submissions cannot corrupt the steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub const STEP_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepName {
    Appointment,
    Confirmation,
    Treatment,
    Prescription,
    Completed,
    Payment,
}

impl StepName {
    pub const ALL: [StepName; STEP_COUNT] = [
        StepName::Appointment,
        StepName::Confirmation,
        StepName::Treatment,
        StepName::Prescription,
        StepName::Completed,
        StepName::Payment,
    ];

    /// One-based position in the workflow.
    pub fn number(self) -> u8 {
        match self {
            StepName::Appointment => 1,
            StepName::Confirmation => 2,
            StepName::Treatment => 3,
            StepName::Prescription => 4,
            StepName::Completed => 5,
            StepName::Payment => 6,
        }
    }

    fn index(self) -> usize {
        usize::from(self.number()) - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl StepStatus {
    fn is_done(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_number: u8,
    pub step_name: StepName,
    pub status: StepStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Something that happened to an appointment and may move its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    AppointmentBooked {
        appointment_id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
    },
    AppointmentConfirmed { appointment_id: Uuid },
    TreatmentCompleted { appointment_id: Uuid },
    PrescriptionIssued { appointment_id: Uuid },
    BillCreated { appointment_id: Uuid },
    AppointmentCancelled { appointment_id: Uuid },
}

impl WorkflowEvent {
    pub fn appointment_id(&self) -> Uuid {
        match *self {
            WorkflowEvent::AppointmentBooked { appointment_id, .. }
            | WorkflowEvent::AppointmentConfirmed { appointment_id }
            | WorkflowEvent::TreatmentCompleted { appointment_id }
            | WorkflowEvent::PrescriptionIssued { appointment_id }
            | WorkflowEvent::BillCreated { appointment_id }
            | WorkflowEvent::AppointmentCancelled { appointment_id } => appointment_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::AppointmentBooked { .. } => "appointment-booked",
            WorkflowEvent::AppointmentConfirmed { .. } => "appointment-confirmed",
            WorkflowEvent::TreatmentCompleted { .. } => "treatment-completed",
            WorkflowEvent::PrescriptionIssued { .. } => "prescription-issued",
            WorkflowEvent::BillCreated { .. } => "bill-created",
            WorkflowEvent::AppointmentCancelled { .. } => "appointment-cancelled",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no step process for appointment {0}")]
    Missing(Uuid),

    #[error("{event} is not allowed at step {current_step} ({overall:?})")]
    OutOfOrder {
        event: &'static str,
        current_step: u8,
        overall: OverallStatus,
    },

    #[error("step process for appointment {0} is cancelled")]
    Cancelled(Uuid),
}

/// Whether an event moved the process or repeated its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProcess {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub steps: [Step; STEP_COUNT],
    pub current_step: u8,
    pub overall_status: OverallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepProcess {
    /// A fresh process with every step pending.
    pub fn new(appointment_id: Uuid, patient_id: Uuid, doctor_id: Uuid) -> Self {
        let now = Utc::now();
        StepProcess {
            id: Uuid::new_v4(),
            appointment_id,
            patient_id,
            doctor_id,
            steps: StepName::ALL.map(|name| Step {
                step_number: name.number(),
                step_name: name,
                status: StepStatus::Pending,
                updated_at: None,
            }),
            current_step: 1,
            overall_status: OverallStatus::NotStarted,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, name: StepName) -> &Step {
        &self.steps[name.index()]
    }

    fn status(&self, name: StepName) -> StepStatus {
        self.step(name).status
    }

    fn set(&mut self, name: StepName, status: StepStatus, at: DateTime<Utc>) {
        let step = &mut self.steps[name.index()];
        if step.status != status {
            step.status = status;
            step.updated_at = Some(at);
        }
    }

    fn out_of_order(&self, event: &WorkflowEvent) -> WorkflowError {
        WorkflowError::OutOfOrder {
            event: event.name(),
            current_step: self.current_step,
            overall: self.overall_status,
        }
    }

    /// Apply one event under the transition rules.
    pub fn apply(&mut self, event: &WorkflowEvent) -> Result<Transition, WorkflowError> {
        if self.overall_status == OverallStatus::Cancelled {
            return self.apply_cancelled(event);
        }
        self.advance(event)
    }

    /// A cancelled process ignores repeated cancellations and reopens on a
    /// new booking or confirmation. Anything else is rejected.
    fn apply_cancelled(&mut self, event: &WorkflowEvent) -> Result<Transition, WorkflowError> {
        match event {
            WorkflowEvent::AppointmentCancelled { .. } => Ok(Transition::Unchanged),
            WorkflowEvent::AppointmentBooked { .. } | WorkflowEvent::AppointmentConfirmed { .. } => {
                let mut reopened = self.clone();
                reopened.overall_status = OverallStatus::InProgress;
                reopened.advance(event)?;
                reopened.refresh_overall();
                reopened.updated_at = Utc::now();
                *self = reopened;
                Ok(Transition::Advanced)
            }
            _ => Err(WorkflowError::Cancelled(self.appointment_id)),
        }
    }

    fn advance(&mut self, event: &WorkflowEvent) -> Result<Transition, WorkflowError> {
        let current = self.current_step;
        let now = Utc::now();

        match event {
            WorkflowEvent::AppointmentBooked { .. } => {
                if current >= 2 {
                    return Ok(Transition::Unchanged);
                }
                self.set(StepName::Appointment, StepStatus::Completed, now);
                self.set(StepName::Confirmation, StepStatus::InProgress, now);
                self.current_step = 2;
            }
            WorkflowEvent::AppointmentConfirmed { .. } => {
                if current > 2 {
                    return Err(self.out_of_order(event));
                }
                if current == 2
                    && self.status(StepName::Appointment) == StepStatus::Completed
                    && self.status(StepName::Confirmation) == StepStatus::InProgress
                {
                    return Ok(Transition::Unchanged);
                }
                self.set(StepName::Appointment, StepStatus::Completed, now);
                self.set(StepName::Confirmation, StepStatus::InProgress, now);
                self.current_step = 2;
            }
            WorkflowEvent::TreatmentCompleted { .. } => {
                if current == 4 && self.status(StepName::Treatment) == StepStatus::Completed {
                    return Ok(Transition::Unchanged);
                }
                if !(2..=3).contains(&current) {
                    return Err(self.out_of_order(event));
                }
                self.set(StepName::Appointment, StepStatus::Completed, now);
                self.set(StepName::Confirmation, StepStatus::Completed, now);
                self.set(StepName::Treatment, StepStatus::Completed, now);
                self.set(StepName::Prescription, StepStatus::InProgress, now);
                self.current_step = 4;
            }
            WorkflowEvent::PrescriptionIssued { .. } => {
                if current >= 5 && self.status(StepName::Prescription) == StepStatus::Completed {
                    return Ok(Transition::Unchanged);
                }
                if current != 4 {
                    return Err(self.out_of_order(event));
                }
                self.set(StepName::Prescription, StepStatus::Completed, now);
                self.set(StepName::Completed, StepStatus::InProgress, now);
                self.current_step = 5;
            }
            WorkflowEvent::BillCreated { .. } => {
                if current == 6 && self.status(StepName::Payment) == StepStatus::Completed {
                    return Ok(Transition::Unchanged);
                }
                if current < 4 {
                    return Err(self.out_of_order(event));
                }
                // Payment closes the visit; a visit without a prescription skips that step.
                if self.status(StepName::Prescription) != StepStatus::Completed {
                    self.set(StepName::Prescription, StepStatus::Skipped, now);
                }
                self.set(StepName::Completed, StepStatus::Completed, now);
                self.set(StepName::Payment, StepStatus::Completed, now);
                self.current_step = 6;
            }
            WorkflowEvent::AppointmentCancelled { .. } => {
                if self.overall_status == OverallStatus::Completed {
                    return Err(self.out_of_order(event));
                }
                self.overall_status = OverallStatus::Cancelled;
                self.updated_at = now;
                return Ok(Transition::Advanced);
            }
        }

        self.refresh_overall();
        self.updated_at = now;
        Ok(Transition::Advanced)
    }

    /// Re-derive the overall status from the steps. Cancelled is sticky.
    fn refresh_overall(&mut self) {
        if self.overall_status == OverallStatus::Cancelled {
            return;
        }
        self.overall_status = if self.steps.iter().all(|s| s.status.is_done()) {
            OverallStatus::Completed
        } else if self.steps.iter().any(|s| s.status != StepStatus::Pending) {
            OverallStatus::InProgress
        } else {
            OverallStatus::NotStarted
        };
    }
}

/// Owner and sole writer of all step processes.
#[derive(Debug, Default)]
pub struct WorkflowReducer {
    processes: RwLock<HashMap<Uuid, StepProcess>>,
}

impl WorkflowReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event and return the resulting process.
    ///
    /// `AppointmentBooked` creates the process when none exists; every other
    /// event requires one.
    pub async fn publish(&self, event: WorkflowEvent) -> Result<StepProcess, WorkflowError> {
        let appointment_id = event.appointment_id();
        let mut processes = self.processes.write().await;

        let process = match event {
            WorkflowEvent::AppointmentBooked {
                patient_id,
                doctor_id,
                ..
            } => processes
                .entry(appointment_id)
                .or_insert_with(|| StepProcess::new(appointment_id, patient_id, doctor_id)),
            _ => processes
                .get_mut(&appointment_id)
                .ok_or(WorkflowError::Missing(appointment_id))?,
        };

        match process.apply(&event)? {
            Transition::Advanced => info!(
                appointment = %appointment_id,
                event = event.name(),
                current_step = process.current_step,
                overall = ?process.overall_status,
                "step process advanced"
            ),
            Transition::Unchanged => debug!(
                appointment = %appointment_id,
                event = event.name(),
                "step process unchanged"
            ),
        }
        Ok(process.clone())
    }

    pub async fn get(&self, appointment_id: Uuid) -> Option<StepProcess> {
        self.processes.read().await.get(&appointment_id).cloned()
    }

    /// Drop the process of a deleted appointment.
    pub async fn remove(&self, appointment_id: Uuid) -> Option<StepProcess> {
        self.processes.write().await.remove(&appointment_id)
    }
}
