use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use easydent::outbox::LogMailer;
use easydent::{start_server, AppConfig, Services};

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            start_server(
                listener,
                Services::new(),
                &AppConfig::default(),
                Arc::new(LogMailer),
                async {
                    rx.await.ok();
                },
            )
            .await
        });
        TestServer {
            base: format!("http://{}/api", addr),
            client: reqwest::Client::new(),
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn patch(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .patch(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let response = self.client.delete(self.url(path)).send().await.unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        self.handle.await.unwrap().unwrap();
    }
}

/// Create a doctor with a generated morning and a patient; returns
/// (doctor id, patient id, first slot id).
async fn seed(server: &TestServer) -> (String, String, String) {
    let (status, doctor) = server
        .post(
            "/doctors",
            json!({
                "name": "Dr. Sara Malik",
                "email": "sara@clinic.test",
                "phone": "555-0110",
                "specialization": "Orthodontics"
            }),
        )
        .await;
    assert_eq!(status, 201);
    let doctor_id = doctor["data"]["id"].as_str().unwrap().to_string();

    let (status, patient) = server
        .post(
            "/patients",
            json!({ "name": "Jane Doe", "email": "jane@email.com", "phone": "555-0111" }),
        )
        .await;
    assert_eq!(status, 201);
    let patient_id = patient["data"]["id"].as_str().unwrap().to_string();

    let (status, schedule) = server
        .post(
            "/schedules/generate",
            json!({ "doctor_id": doctor_id, "date": "2030-05-06", "start_hour": 9, "end_hour": 12 }),
        )
        .await;
    assert_eq!(status, 201);
    let slot_id = schedule["data"]["slots"][0]["slot_id"]
        .as_str()
        .unwrap()
        .to_string();

    (doctor_id, patient_id, slot_id)
}

#[tokio::test]
async fn health_reports_success_envelope() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["service"], "easydent");
    server.stop().await;
}

#[tokio::test]
async fn invalid_and_unknown_ids_are_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server
        .patch("/appointments/not-a-uuid/status", json!({ "status": "Confirmed" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "fail");
    assert!(body["message"].as_str().unwrap().contains("Invalid appointment id"));

    let missing = uuid::Uuid::new_v4();
    let (status, body) = server
        .patch(
            &format!("/appointments/{}/status", missing),
            json!({ "status": "Confirmed" }),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["status"], "fail");

    let (status, _) = server.get(&format!("/patients/{}", missing)).await;
    assert_eq!(status, 404);
    server.stop().await;
}

#[tokio::test]
async fn malformed_body_returns_fail_envelope() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/patients", json!({ "name": "No Email" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "fail");
    assert!(body["message"].is_string());
    server.stop().await;
}

#[tokio::test]
async fn booking_and_status_flow_over_http() {
    let server = TestServer::start().await;
    let (doctor_id, patient_id, slot_id) = seed(&server).await;

    let (status, booked) = server
        .post(
            "/appointments",
            json!({
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "appointment_date": "2030-05-06",
                "slot_id": slot_id,
                "reason": "Braces check"
            }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(booked["data"]["appointment_status"], "Pending");
    assert_eq!(booked["data"]["patient_name"], "Jane Doe");
    let id = booked["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = server
        .patch(&format!("/appointments/{}/status", id), json!({ "status": "Unknown" }))
        .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("Invalid status"));

    let (status, body) = server
        .patch(&format!("/appointments/{}/status", id), json!({ "status": "Confirmed" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["appointment_status"], "Confirmed");
    assert_eq!(body["data"]["doctor_name"], "Dr. Sara Malik");

    let (status, steps) = server.get(&format!("/appointments/{}/steps", id)).await;
    assert_eq!(status, 200);
    assert_eq!(steps["data"]["current_step"], 2);
    assert_eq!(steps["data"]["steps"].as_array().unwrap().len(), 6);
    assert_eq!(steps["data"]["steps"][0]["status"], "completed");

    let (status, body) = server
        .post(
            "/treatments",
            json!({ "appointment_id": id, "procedure": "Adjustment", "cost": 8000 }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "fail");

    let (status, listed) = server
        .get(&format!("/appointments?patient_id={}&status=confirmed", patient_id))
        .await;
    assert_eq!(status, 200);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let (status, body) = server.delete(&format!("/patients/{}", patient_id)).await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("appointment"));

    server.stop().await;
}

#[tokio::test]
async fn audit_log_is_exposed() {
    let server = TestServer::start().await;
    let (doctor_id, _, _) = seed(&server).await;

    let (status, body) = server
        .get(&format!("/audit-logs?entity_id={}", doctor_id))
        .await;
    assert_eq!(status, 200);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "created");
    assert_eq!(entries[0]["entity"], "doctor");
    server.stop().await;
}

#[tokio::test]
async fn late_confirmation_is_written_without_moving_the_steps() {
    let server = TestServer::start().await;
    let (doctor_id, patient_id, slot_id) = seed(&server).await;

    let (_, booked) = server
        .post(
            "/appointments",
            json!({
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "appointment_date": "2030-05-06",
                "slot_id": slot_id
            }),
        )
        .await;
    let id = booked["data"]["id"].as_str().unwrap().to_string();
    let status_path = format!("/appointments/{}/status", id);

    let (status, _) = server.patch(&status_path, json!({ "status": "Completed" })).await;
    assert_eq!(status, 200);

    let (status, body) = server.patch(&status_path, json!({ "status": "Confirmed" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["appointment_status"], "Confirmed");

    let (_, steps) = server.get(&format!("/appointments/{}/steps", id)).await;
    assert_eq!(steps["data"]["current_step"], 4);
    assert_eq!(steps["data"]["steps"][2]["status"], "completed");
    assert_eq!(steps["data"]["steps"][3]["status"], "in-progress");
    assert_eq!(steps["data"]["overall_status"], "in-progress");

    server.stop().await;
}

#[tokio::test]
async fn prescription_endpoint_checks_the_appointment() {
    let server = TestServer::start().await;
    let (doctor_id, patient_id, slot_id) = seed(&server).await;
    let medication = json!({
        "name": "Ibuprofen",
        "dosage": "400mg",
        "frequency": "as needed",
        "duration": "3 days"
    });

    let (status, _) = server
        .post(
            "/prescriptions",
            json!({ "appointment_id": uuid::Uuid::new_v4(), "medications": [medication] }),
        )
        .await;
    assert_eq!(status, 404);

    let (_, booked) = server
        .post(
            "/appointments",
            json!({
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "appointment_date": "2030-05-06",
                "slot_id": slot_id
            }),
        )
        .await;
    let id = booked["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = server
        .post("/prescriptions", json!({ "appointment_id": id, "medications": [medication] }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "fail");

    server
        .patch(&format!("/appointments/{}/status", id), json!({ "status": "Completed" }))
        .await;
    let (status, _) = server
        .post("/prescriptions", json!({ "appointment_id": id, "medications": [] }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = server
        .post("/prescriptions", json!({ "appointment_id": id, "medications": [medication] }))
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["medications"][0]["name"], "Ibuprofen");

    let (_, steps) = server.get(&format!("/appointments/{}/steps", id)).await;
    assert_eq!(steps["data"]["current_step"], 5);

    server.stop().await;
}

#[tokio::test]
async fn inventory_adjustments_over_http() {
    let server = TestServer::start().await;

    let (status, item) = server
        .post(
            "/inventory",
            json!({ "name": "Composite resin", "unit": "syringe", "quantity": 6, "reorder_level": 5 }),
        )
        .await;
    assert_eq!(status, 201);
    let id = item["data"]["id"].as_str().unwrap().to_string();
    let adjust = format!("/inventory/{}/adjust", id);

    let (status, body) = server.patch(&adjust, json!({ "delta": -10 })).await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("Insufficient stock"));

    let (status, body) = server
        .patch(&adjust, json!({ "delta": -2, "reason": "Class II filling" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["quantity"], 4);

    let (_, low) = server.get("/inventory?low_stock=true").await;
    assert_eq!(low["data"].as_array().unwrap().len(), 1);

    let (status, _) = server.delete(&format!("/inventory/{}", id)).await;
    assert_eq!(status, 200);
    let (status, _) = server.get(&format!("/inventory/{}", id)).await;
    assert_eq!(status, 404);

    server.stop().await;
}
