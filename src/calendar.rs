//! Doctor schedules and slot capacity.
//!
//! A `DoctorSchedule` holds the bookable slots of one doctor on one date.
//! Booking reserves a place in a slot for an appointment id; cancelling
//! releases it. Reservations are keyed by appointment, so releasing twice
//! is harmless.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(Uuid),

    #[error("No slot {slot_id} on the doctor's schedule for {date}")]
    SlotNotFound { slot_id: Uuid, date: NaiveDate },

    #[error("Time slot {0} is fully booked")]
    SlotFull(Uuid),

    #[error("Time slot overlaps with existing slot: {0} - {1}")]
    Overlap(NaiveTime, NaiveTime),

    #[error("Doctor already has a schedule for {0}")]
    DuplicateSchedule(NaiveDate),

    #[error("Schedule {0} still holds reservations")]
    ScheduleInUse(Uuid),

    #[error("{0}")]
    InvalidSlot(String),
}

/// A bookable time window with room for `capacity` appointments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub reservations: Vec<Uuid>,
}

impl Slot {
    /// Create a new slot with validation.
    pub fn new(start_time: NaiveTime, end_time: NaiveTime, capacity: u32) -> Result<Self, CalendarError> {
        if end_time <= start_time {
            return Err(CalendarError::InvalidSlot(
                "End time must be after start time".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(CalendarError::InvalidSlot(
                "Slot capacity must be positive".to_string(),
            ));
        }

        Ok(Slot {
            slot_id: Uuid::new_v4(),
            start_time,
            end_time,
            capacity,
            reservations: Vec::new(),
        })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn overlaps_with(&self, other: &Slot) -> bool {
        self.start_time < other.end_time && self.end_time > other.start_time
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.reservations.len() as u32)
    }

    pub fn is_available(&self) -> bool {
        self.remaining() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    pub created_at: DateTime<Utc>,
}

impl DoctorSchedule {
    pub fn new(doctor_id: Uuid, date: NaiveDate) -> Self {
        DoctorSchedule {
            id: Uuid::new_v4(),
            doctor_id,
            date,
            slots: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Add a slot, rejecting any overlap with the slots already present.
    pub fn add_slot(&mut self, slot: Slot) -> Result<(), CalendarError> {
        if let Some(existing) = self.slots.iter().find(|s| slot.overlaps_with(s)) {
            return Err(CalendarError::Overlap(existing.start_time, existing.end_time));
        }
        self.slots.push(slot);
        self.slots.sort_by_key(|s| s.start_time);
        Ok(())
    }

    pub fn has_reservations(&self) -> bool {
        self.slots.iter().any(|s| !s.reservations.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotSpec {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<SlotSpec>,
}

/// Working-day template used to generate evenly sized slots.
#[derive(Debug, Clone, Deserialize)]
pub struct DayPlan {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
}

fn default_capacity() -> u32 {
    1
}

fn default_slot_minutes() -> u32 {
    30
}

fn minutes_to_time(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

/// All doctor schedules, indexed by schedule and by slot.
#[derive(Debug, Default)]
pub struct Calendar {
    schedules: HashMap<Uuid, DoctorSchedule>,
    slot_index: HashMap<Uuid, Uuid>,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, schedule: DoctorSchedule) -> Result<DoctorSchedule, CalendarError> {
        if self
            .schedules
            .values()
            .any(|s| s.doctor_id == schedule.doctor_id && s.date == schedule.date)
        {
            return Err(CalendarError::DuplicateSchedule(schedule.date));
        }
        for slot in &schedule.slots {
            self.slot_index.insert(slot.slot_id, schedule.id);
        }
        self.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    /// Add a schedule built from explicit slot times.
    pub fn add_schedule(&mut self, input: NewSchedule) -> Result<DoctorSchedule, CalendarError> {
        if input.slots.is_empty() {
            return Err(CalendarError::InvalidSlot(
                "Schedule needs at least one slot".to_string(),
            ));
        }
        let mut schedule = DoctorSchedule::new(input.doctor_id, input.date);
        for slot in input.slots {
            schedule.add_slot(Slot::new(slot.start_time, slot.end_time, slot.capacity)?)?;
        }
        self.insert(schedule)
    }

    /// Generate slots for a single working day, skipping any slot that
    /// touches the break.
    pub fn generate_daily(&mut self, plan: DayPlan) -> Result<DoctorSchedule, CalendarError> {
        if plan.start_hour >= plan.end_hour || plan.end_hour > 23 {
            return Err(CalendarError::InvalidSlot(format!(
                "Invalid working hours: {} - {}",
                plan.start_hour, plan.end_hour
            )));
        }
        if plan.slot_minutes == 0 {
            return Err(CalendarError::InvalidSlot(
                "Slot duration must be positive".to_string(),
            ));
        }

        let mut schedule = DoctorSchedule::new(plan.doctor_id, plan.date);
        let end = plan.end_hour * 60;
        let mut current = plan.start_hour * 60;

        while current + plan.slot_minutes <= end {
            let slot_end = current + plan.slot_minutes;
            let (Some(start_time), Some(end_time)) =
                (minutes_to_time(current), minutes_to_time(slot_end))
            else {
                break;
            };

            let in_break = match (plan.break_start, plan.break_end) {
                (Some(break_start), Some(break_end)) => {
                    start_time < break_end && end_time > break_start
                }
                _ => false,
            };

            if !in_break {
                schedule.add_slot(Slot::new(start_time, end_time, plan.capacity)?)?;
            }
            current = slot_end;
        }

        if schedule.slots.is_empty() {
            return Err(CalendarError::InvalidSlot(
                "Working hours leave no room for a slot".to_string(),
            ));
        }
        self.insert(schedule)
    }

    pub fn get(&self, schedule_id: Uuid) -> Option<&DoctorSchedule> {
        self.schedules.get(&schedule_id)
    }

    /// All schedules for a doctor, ordered by date.
    pub fn schedules_for(&self, doctor_id: Uuid) -> Vec<DoctorSchedule> {
        let mut schedules: Vec<DoctorSchedule> = self
            .schedules
            .values()
            .filter(|s| s.doctor_id == doctor_id)
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.date);
        schedules
    }

    pub fn has_schedules(&self, doctor_id: Uuid) -> bool {
        self.schedules.values().any(|s| s.doctor_id == doctor_id)
    }

    /// Slots with remaining capacity for a doctor on a date.
    pub fn available_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Vec<Slot> {
        self.schedules
            .values()
            .filter(|s| s.doctor_id == doctor_id && s.date == date)
            .flat_map(|s| s.slots.iter().filter(|slot| slot.is_available()).cloned())
            .collect()
    }

    pub fn remove_schedule(&mut self, schedule_id: Uuid) -> Result<DoctorSchedule, CalendarError> {
        let schedule = self
            .schedules
            .get(&schedule_id)
            .ok_or(CalendarError::ScheduleNotFound(schedule_id))?;
        if schedule.has_reservations() {
            return Err(CalendarError::ScheduleInUse(schedule_id));
        }

        let schedule = self
            .schedules
            .remove(&schedule_id)
            .ok_or(CalendarError::ScheduleNotFound(schedule_id))?;
        for slot in &schedule.slots {
            self.slot_index.remove(&slot.slot_id);
        }
        Ok(schedule)
    }

    /// Reserve a place in a slot for an appointment. Reserving again for the
    /// same appointment returns the slot unchanged.
    pub fn reserve(
        &mut self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Slot, CalendarError> {
        let not_found = CalendarError::SlotNotFound { slot_id, date };
        let schedule_id = *self.slot_index.get(&slot_id).ok_or(not_found.clone())?;
        let schedule = self
            .schedules
            .get_mut(&schedule_id)
            .ok_or(CalendarError::ScheduleNotFound(schedule_id))?;
        if schedule.doctor_id != doctor_id || schedule.date != date {
            return Err(not_found);
        }

        let slot = schedule
            .slots
            .iter_mut()
            .find(|s| s.slot_id == slot_id)
            .ok_or(not_found)?;

        if slot.reservations.contains(&appointment_id) {
            return Ok(slot.clone());
        }
        if !slot.is_available() {
            return Err(CalendarError::SlotFull(slot_id));
        }
        slot.reservations.push(appointment_id);
        Ok(slot.clone())
    }

    /// Return an appointment's place in a slot. Returns `false` when the
    /// appointment held no reservation there.
    pub fn release(&mut self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, CalendarError> {
        let schedule_id = *self
            .slot_index
            .get(&slot_id)
            .ok_or(CalendarError::InvalidSlot(format!("Unknown slot: {}", slot_id)))?;
        let slot = self
            .schedules
            .get_mut(&schedule_id)
            .and_then(|s| s.slots.iter_mut().find(|slot| slot.slot_id == slot_id))
            .ok_or(CalendarError::ScheduleNotFound(schedule_id))?;

        let before = slot.reservations.len();
        slot.reservations.retain(|&id| id != appointment_id);
        Ok(slot.reservations.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn plan(doctor_id: Uuid) -> DayPlan {
        DayPlan {
            doctor_id,
            date: date(),
            start_hour: 9,
            end_hour: 17,
            slot_minutes: 30,
            capacity: 1,
            break_start: Some(time(12, 0)),
            break_end: Some(time(13, 0)),
        }
    }

    #[test]
    fn generate_daily_skips_break() {
        let mut calendar = Calendar::new();
        let schedule = calendar.generate_daily(plan(Uuid::new_v4())).unwrap();

        // 16 half-hour slots between 9 and 17, minus two inside the break.
        assert_eq!(schedule.slots.len(), 14);
        assert!(schedule
            .slots
            .iter()
            .all(|s| s.end_time <= time(12, 0) || s.start_time >= time(13, 0)));
        assert!(schedule.slots.iter().all(|s| s.duration_minutes() == 30));
    }

    #[test]
    fn overlapping_slots_are_rejected() {
        let mut calendar = Calendar::new();
        let result = calendar.add_schedule(NewSchedule {
            doctor_id: Uuid::new_v4(),
            date: date(),
            slots: vec![
                SlotSpec { start_time: time(9, 0), end_time: time(10, 0), capacity: 1 },
                SlotSpec { start_time: time(9, 30), end_time: time(10, 30), capacity: 1 },
            ],
        });
        assert_eq!(result, Err(CalendarError::Overlap(time(9, 0), time(10, 0))));
    }

    #[test]
    fn second_schedule_for_same_day_is_rejected() {
        let mut calendar = Calendar::new();
        let doctor = Uuid::new_v4();
        calendar.generate_daily(plan(doctor)).unwrap();
        assert_eq!(
            calendar.generate_daily(plan(doctor)),
            Err(CalendarError::DuplicateSchedule(date()))
        );
    }

    #[test]
    fn reserve_respects_capacity_and_is_idempotent() {
        let mut calendar = Calendar::new();
        let doctor = Uuid::new_v4();
        let schedule = calendar.generate_daily(plan(doctor)).unwrap();
        let slot_id = schedule.slots[0].slot_id;
        let first = Uuid::new_v4();

        calendar.reserve(doctor, date(), slot_id, first).unwrap();
        let again = calendar.reserve(doctor, date(), slot_id, first).unwrap();
        assert_eq!(again.reservations, vec![first]);

        let second = calendar.reserve(doctor, date(), slot_id, Uuid::new_v4());
        assert_eq!(second, Err(CalendarError::SlotFull(slot_id)));
    }

    #[test]
    fn reserve_checks_doctor_and_date() {
        let mut calendar = Calendar::new();
        let doctor = Uuid::new_v4();
        let schedule = calendar.generate_daily(plan(doctor)).unwrap();
        let slot_id = schedule.slots[0].slot_id;

        let wrong_doctor = calendar.reserve(Uuid::new_v4(), date(), slot_id, Uuid::new_v4());
        assert!(matches!(wrong_doctor, Err(CalendarError::SlotNotFound { .. })));

        let other_day = date().succ_opt().unwrap();
        let wrong_date = calendar.reserve(doctor, other_day, slot_id, Uuid::new_v4());
        assert!(matches!(wrong_date, Err(CalendarError::SlotNotFound { .. })));
    }

    #[test]
    fn release_is_idempotent() {
        let mut calendar = Calendar::new();
        let doctor = Uuid::new_v4();
        let schedule = calendar.generate_daily(plan(doctor)).unwrap();
        let slot_id = schedule.slots[0].slot_id;
        let appointment = Uuid::new_v4();

        calendar.reserve(doctor, date(), slot_id, appointment).unwrap();
        assert_eq!(calendar.release(slot_id, appointment), Ok(true));
        assert_eq!(calendar.release(slot_id, appointment), Ok(false));
        assert_eq!(calendar.available_slots(doctor, date()).len(), 14);
    }

    #[test]
    fn schedule_with_reservations_cannot_be_removed() {
        let mut calendar = Calendar::new();
        let doctor = Uuid::new_v4();
        let schedule = calendar.generate_daily(plan(doctor)).unwrap();
        calendar
            .reserve(doctor, date(), schedule.slots[0].slot_id, Uuid::new_v4())
            .unwrap();

        assert_eq!(
            calendar.remove_schedule(schedule.id),
            Err(CalendarError::ScheduleInUse(schedule.id))
        );
        assert!(calendar.has_schedules(doctor));
    }
}
