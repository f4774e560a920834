//! HTTP API.
//!
//! Every response uses the envelope `{status, data?, message?}`: `success`
//! for 2xx, `fail` for 4xx and `error` for 5xx.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::calendar::{CalendarError, DayPlan, NewSchedule};
use crate::clinic::Clinic;
use crate::error::ClinicError;
use crate::models::{
    AppointmentStatus, BookAppointment, DoctorUpdate, NewBill, NewDentalHistory, NewDoctor,
    NewInsurance, NewInventoryItem, NewPatient, NewPrescription, NewStaff, NewTreatment, NewUser,
    PatientUpdate, Reschedule, Role, StockAdjustment,
};
use crate::presence::ConnectionRegistry;
use crate::scheduler::AppointmentFilter;
use crate::socket::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub clinic: Arc<Clinic>,
    pub presence: ConnectionRegistry,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ClinicError::Calendar(CalendarError::ScheduleNotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            ClinicError::Validation(_)
            | ClinicError::HasDependents { .. }
            | ClinicError::Calendar(_) => ApiError::BadRequest(err.to_string()),
            ClinicError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "fail"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "fail"),
            ApiError::Internal(message) => {
                error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "error")
            }
        };
        let body = Envelope::<()> {
            status: label,
            data: None,
            message: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult {
    Ok(respond(StatusCode::OK, data))
}

fn created<T: Serialize>(data: T) -> ApiResult {
    Ok(respond(StatusCode::CREATED, data))
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = Envelope {
        status: "success",
        data: Some(data),
        message: None,
    };
    (status, Json(body)).into_response()
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid {} id: '{}'", what, raw)))
}

fn parse_optional_id(raw: Option<&str>, what: &str) -> Result<Option<Uuid>, ApiError> {
    raw.map(|value| parse_id(value, what)).transpose()
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid date: '{}'. Expected YYYY-MM-DD", raw))
    })
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    let api = Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user).get(list_users))
        .route("/users/:id/notifications", get(user_notifications))
        .route("/patients", post(create_patient).get(list_patients))
        .route(
            "/patients/:id",
            get(get_patient).patch(update_patient).delete(delete_patient),
        )
        .route("/patients/:id/insurance", post(add_insurance).get(list_insurance))
        .route("/insurance/:id", delete(delete_insurance))
        .route(
            "/patients/:id/dental-history",
            post(add_dental_history).get(list_dental_history),
        )
        .route("/dental-history/:id", delete(delete_dental_history))
        .route("/doctors", post(create_doctor).get(list_doctors))
        .route(
            "/doctors/:id",
            get(get_doctor).patch(update_doctor).delete(delete_doctor),
        )
        .route("/doctors/:id/schedules", get(doctor_schedules))
        .route("/doctors/:id/slots", get(doctor_slots))
        .route("/staff", post(create_staff).get(list_staff))
        .route("/staff/:id", get(get_staff).delete(delete_staff))
        .route("/schedules", post(create_schedule))
        .route("/schedules/generate", post(generate_schedule))
        .route("/schedules/:id", delete(delete_schedule))
        .route("/appointments", post(book_appointment).get(list_appointments))
        .route(
            "/appointments/:id",
            get(get_appointment).delete(delete_appointment),
        )
        .route("/appointments/:id/status", patch(update_status))
        .route("/appointments/:id/reschedule", patch(reschedule))
        .route("/appointments/:id/steps", get(appointment_steps))
        .route("/appointments/:id/treatments", get(appointment_treatments))
        .route("/appointments/:id/prescriptions", get(appointment_prescriptions))
        .route("/treatments", post(create_treatment))
        .route("/treatments/:id", get(get_treatment).delete(delete_treatment))
        .route("/prescriptions", post(create_prescription))
        .route("/bills", post(create_bill))
        .route("/bills/:id", get(get_bill))
        .route("/bills/:id/pay", patch(pay_bill))
        .route("/inventory", post(create_inventory_item).get(list_inventory))
        .route(
            "/inventory/:id",
            get(get_inventory_item).delete(delete_inventory_item),
        )
        .route("/inventory/:id/adjust", patch(adjust_stock))
        .route("/notifications/:id/read", patch(mark_read))
        .route("/audit-logs", get(audit_logs));

    Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> ApiResult {
    ok(serde_json::json!({ "service": "easydent", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct RoleQuery {
    role: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_user(input).await?)
}

async fn list_users(
    State(state): State<AppState>,
    query: Result<Query<RoleQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let role = query
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()?;
    ok(state.clinic.list_users(role).await)
}

async fn user_notifications(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let user_id = parse_id(&id, "user")?;
    ok(state.clinic.notifications_for(user_id).await)
}

async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<NewPatient>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_patient(input).await?)
}

async fn list_patients(State(state): State<AppState>) -> ApiResult {
    ok(state.clinic.list_patients().await)
}

async fn get_patient(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "patient")?;
    ok(state.clinic.get_patient(id).await?)
}

async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PatientUpdate>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id, "patient")?;
    let Json(update) = payload?;
    ok(state.clinic.update_patient(id, update).await?)
}

async fn delete_patient(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "patient")?;
    ok(state.clinic.delete_patient(id).await?)
}

async fn add_insurance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewInsurance>, JsonRejection>,
) -> ApiResult {
    let patient_id = parse_id(&id, "patient")?;
    let Json(input) = payload?;
    created(state.clinic.add_insurance(patient_id, input).await?)
}

async fn list_insurance(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let patient_id = parse_id(&id, "patient")?;
    ok(state.clinic.insurance_for(patient_id).await?)
}

async fn delete_insurance(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "insurance")?;
    ok(state.clinic.delete_insurance(id).await?)
}

async fn add_dental_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewDentalHistory>, JsonRejection>,
) -> ApiResult {
    let patient_id = parse_id(&id, "patient")?;
    let Json(input) = payload?;
    created(state.clinic.add_dental_history(patient_id, input).await?)
}

async fn list_dental_history(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let patient_id = parse_id(&id, "patient")?;
    ok(state.clinic.dental_history_for(patient_id).await?)
}

async fn delete_dental_history(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "dental history")?;
    ok(state.clinic.delete_dental_history(id).await?)
}

async fn create_doctor(
    State(state): State<AppState>,
    payload: Result<Json<NewDoctor>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_doctor(input).await?)
}

async fn list_doctors(State(state): State<AppState>) -> ApiResult {
    ok(state.clinic.list_doctors().await)
}

async fn get_doctor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "doctor")?;
    ok(state.clinic.get_doctor(id).await?)
}

async fn update_doctor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DoctorUpdate>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id, "doctor")?;
    let Json(update) = payload?;
    ok(state.clinic.update_doctor(id, update).await?)
}

async fn delete_doctor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "doctor")?;
    ok(state.clinic.delete_doctor(id).await?)
}

async fn doctor_schedules(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "doctor")?;
    ok(state.clinic.schedules_for(id).await?)
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn doctor_slots(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> ApiResult {
    let id = parse_id(&id, "doctor")?;
    let Query(query) = query?;
    let raw = query
        .date
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'date' is required".to_string()))?;
    let date = parse_date(&raw)?;
    ok(state.clinic.available_slots(id, date).await?)
}

async fn create_staff(
    State(state): State<AppState>,
    payload: Result<Json<NewStaff>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_staff(input).await?)
}

async fn list_staff(State(state): State<AppState>) -> ApiResult {
    ok(state.clinic.list_staff().await)
}

async fn get_staff(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "staff")?;
    ok(state.clinic.get_staff(id).await?)
}

async fn delete_staff(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "staff")?;
    ok(state.clinic.delete_staff(id).await?)
}

async fn create_schedule(
    State(state): State<AppState>,
    payload: Result<Json<NewSchedule>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_schedule(input).await?)
}

async fn generate_schedule(
    State(state): State<AppState>,
    payload: Result<Json<DayPlan>, JsonRejection>,
) -> ApiResult {
    let Json(plan) = payload?;
    created(state.clinic.generate_schedule(plan).await?)
}

async fn delete_schedule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "schedule")?;
    ok(state.clinic.delete_schedule(id).await?)
}

async fn book_appointment(
    State(state): State<AppState>,
    payload: Result<Json<BookAppointment>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    created(state.clinic.book_appointment(request).await?)
}

#[derive(Debug, Deserialize)]
struct AppointmentQuery {
    patient_id: Option<String>,
    doctor_id: Option<String>,
    status: Option<String>,
    date: Option<String>,
}

async fn list_appointments(
    State(state): State<AppState>,
    query: Result<Query<AppointmentQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let filter = AppointmentFilter {
        patient_id: parse_optional_id(query.patient_id.as_deref(), "patient")?,
        doctor_id: parse_optional_id(query.doctor_id.as_deref(), "doctor")?,
        status: query
            .status
            .as_deref()
            .map(str::parse::<AppointmentStatus>)
            .transpose()?,
        date: query.date.as_deref().map(parse_date).transpose()?,
    };
    ok(state.clinic.list_appointments(&filter).await)
}

async fn get_appointment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    ok(state.clinic.appointment_view(id).await?)
}

async fn delete_appointment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    ok(state.clinic.delete_appointment(id).await?)
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    let Json(body) = payload?;
    let status: AppointmentStatus = body.status.parse()?;
    ok(state.clinic.update_status(id, status).await?)
}

async fn reschedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Reschedule>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    let Json(request) = payload?;
    ok(state.clinic.reschedule(id, request).await?)
}

async fn appointment_steps(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    state.clinic.get_appointment(id).await?;
    match state.clinic.step_process(id).await {
        Some(process) => ok(process),
        None => Err(ApiError::NotFound(format!(
            "No step process for appointment {}",
            id
        ))),
    }
}

async fn appointment_treatments(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    ok(state.clinic.treatments_for(id).await?)
}

async fn appointment_prescriptions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id, "appointment")?;
    ok(state.clinic.prescriptions_for(id).await?)
}

async fn create_treatment(
    State(state): State<AppState>,
    payload: Result<Json<NewTreatment>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_treatment(input).await?)
}

async fn get_treatment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "treatment")?;
    ok(state.clinic.get_treatment(id).await?)
}

async fn delete_treatment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "treatment")?;
    ok(state.clinic.delete_treatment(id).await?)
}

async fn create_prescription(
    State(state): State<AppState>,
    payload: Result<Json<NewPrescription>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_prescription(input).await?)
}

async fn create_bill(
    State(state): State<AppState>,
    payload: Result<Json<NewBill>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_bill(input).await?)
}

async fn get_bill(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "bill")?;
    ok(state.clinic.get_bill(id).await?)
}

async fn pay_bill(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "bill")?;
    ok(state.clinic.pay_bill(id).await?)
}

#[derive(Debug, Deserialize)]
struct ReadBody {
    user_id: String,
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ReadBody>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id, "notification")?;
    let Json(body) = payload?;
    let user_id = parse_id(&body.user_id, "user")?;
    ok(state.clinic.mark_notification_read(id, user_id).await?)
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    entity_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InventoryQuery {
    #[serde(default)]
    low_stock: bool,
}

async fn create_inventory_item(
    State(state): State<AppState>,
    payload: Result<Json<NewInventoryItem>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    created(state.clinic.create_inventory_item(input).await?)
}

async fn list_inventory(
    State(state): State<AppState>,
    query: Result<Query<InventoryQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    ok(state.clinic.list_inventory(query.low_stock).await)
}

async fn get_inventory_item(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "inventory item")?;
    ok(state.clinic.get_inventory_item(id).await?)
}

async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StockAdjustment>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id, "inventory item")?;
    let Json(adjustment) = payload?;
    ok(state.clinic.adjust_stock(id, adjustment).await?)
}

async fn delete_inventory_item(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id, "inventory item")?;
    ok(state.clinic.delete_inventory_item(id).await?)
}

async fn audit_logs(
    State(state): State<AppState>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let entity_id = parse_optional_id(query.entity_id.as_deref(), "entity")?;
    ok(state.clinic.audit_trail(entity_id).await)
}
