//! In-process walkthrough of one appointment from booking to payment.
//!
//! Prints the step process after every transition, then the outbox and
//! inbox state, so the whole lifecycle can be seen without a client.

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveTime};
use std::sync::Arc;

use crate::calendar::DayPlan;
use crate::clinical::format_amount;
use crate::models::{
    AppointmentStatus, BookAppointment, Medication, NewBill, NewDoctor, NewPatient,
    NewPrescription, NewTreatment, NewUser, Role,
};
use crate::outbox::LogMailer;
use crate::server::Services;
use crate::settings::AppConfig;
use crate::workflow::StepProcess;

fn print_steps(label: &str, process: Option<StepProcess>) {
    println!("\n{}", label);
    let Some(process) = process else {
        println!("  (no step process)");
        return;
    };
    for step in &process.steps {
        println!(
            "  {}. {:13} {:?}",
            step.step_number,
            format!("{:?}", step.step_name),
            step.status
        );
    }
    println!(
        "  current step: {}  overall: {:?}",
        process.current_step, process.overall_status
    );
}

pub async fn run_demo() -> Result<()> {
    println!("\n{}", "=".repeat(60));
    println!("       EASYDENT CLINIC DEMO");
    println!("{}", "=".repeat(60));

    let services = Services::new();
    let clinic = services.clinic.clone();
    let worker = services.worker(&AppConfig::default(), Arc::new(LogMailer));

    clinic
        .create_user(NewUser {
            link_id: None,
            name: "Front Desk".to_string(),
            email: "desk@easydent.test".to_string(),
            role: Role::Staff,
        })
        .await?;
    let doctor = clinic
        .create_doctor(NewDoctor {
            name: "Dr. Demo".to_string(),
            email: "demo@easydent.test".to_string(),
            phone: "555-0100".to_string(),
            specialization: "General dentistry".to_string(),
        })
        .await?;
    let patient = clinic
        .create_patient(NewPatient {
            name: "John Smith".to_string(),
            email: "john@email.com".to_string(),
            phone: "555-0101".to_string(),
            date_of_birth: None,
            gender: None,
            address: None,
        })
        .await?;
    clinic
        .create_user(NewUser {
            link_id: Some(patient.id),
            name: patient.name.clone(),
            email: patient.email.clone(),
            role: Role::Patient,
        })
        .await?;

    let tomorrow = Local::now().date_naive() + Duration::days(1);
    let schedule = clinic
        .generate_schedule(DayPlan {
            doctor_id: doctor.id,
            date: tomorrow,
            start_hour: 9,
            end_hour: 17,
            slot_minutes: 30,
            capacity: 1,
            break_start: NaiveTime::from_hms_opt(12, 0, 0),
            break_end: NaiveTime::from_hms_opt(13, 0, 0),
        })
        .await?;
    println!(
        "Created schedule for {} on {} with {} slots",
        doctor.name,
        tomorrow,
        schedule.slots.len()
    );

    let slot = schedule
        .slots
        .first()
        .context("generated schedule has no slots")?;
    let booked = clinic
        .book_appointment(BookAppointment {
            patient_id: patient.id,
            doctor_id: doctor.id,
            appointment_date: tomorrow,
            slot_id: slot.slot_id,
            reason: Some("Tooth ache".to_string()),
        })
        .await?;
    let id = booked.appointment.id;
    println!(
        "\nBooked {} with {} at {}",
        patient.name,
        doctor.name,
        booked.appointment.start_time.format("%H:%M")
    );
    print_steps("After booking:", clinic.step_process(id).await);

    clinic.update_status(id, AppointmentStatus::Confirmed).await?;
    print_steps("After confirmation:", clinic.step_process(id).await);

    clinic.update_status(id, AppointmentStatus::Completed).await?;
    print_steps("After the visit:", clinic.step_process(id).await);

    let treatment = clinic
        .create_treatment(NewTreatment {
            appointment_id: id,
            procedure: "Filling".to_string(),
            tooth_numbers: vec![36],
            notes: None,
            cost: 12_000,
        })
        .await?;
    clinic
        .create_prescription(NewPrescription {
            appointment_id: id,
            medications: vec![Medication {
                name: "Ibuprofen".to_string(),
                dosage: "400mg".to_string(),
                frequency: "every 8 hours".to_string(),
                duration: "3 days".to_string(),
            }],
            instructions: Some("Take after meals".to_string()),
        })
        .await?;
    print_steps("After prescription:", clinic.step_process(id).await);

    let bill = clinic
        .create_bill(NewBill {
            treatment_id: treatment.id,
            items: Vec::new(),
            discount: 2_000,
        })
        .await?;
    clinic.pay_bill(bill.id).await?;
    println!(
        "\nInvoice {} total {} paid",
        bill.invoice_number,
        format_amount(bill.total)
    );
    print_steps("After billing:", clinic.step_process(id).await);

    let report = worker.run_once().await;
    println!(
        "\nOutbox: {} delivered, {} retried, {} dead",
        report.delivered, report.retried, report.dead
    );

    println!("\nNotifications:");
    for user in clinic.list_users(None).await {
        for notification in clinic.notifications_for(user.id).await {
            println!("  [{:12}] {}", user.name, notification.message.lines().next().unwrap_or(""));
        }
    }
    Ok(())
}
