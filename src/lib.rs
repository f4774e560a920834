//! Dental clinic management service.
//!
//! Appointments are booked into doctor schedules and tracked through a
//! six-step process (booking, confirmation, treatment, prescription,
//! completion, payment). Notifications, live pushes and e-mails are queued
//! on an outbox and delivered by a background worker.

pub mod calendar;
pub mod clinic;
pub mod clinical;
pub mod demo;
pub mod directory;
pub mod error;
pub mod inbox;
pub mod inventory;
pub mod models;
pub mod outbox;
pub mod presence;
pub mod routes;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod socket;
pub mod store;
pub mod workflow;

pub use clinic::Clinic;
pub use error::{ClinicError, ClinicResult};
pub use server::{start_server, Services};
pub use settings::AppConfig;
