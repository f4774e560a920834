//! Side-effect outbox.
//!
//! Request handlers never notify, push or mail inline. They enqueue a
//! `SideEffect` and return; the `OutboxWorker` dispatches due jobs in the
//! background and retries failures with exponential backoff. A job that
//! keeps failing ends up in the dead-letter list.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::Notification;
use crate::presence::{ConnectionRegistry, SocketEvent};
use crate::store::Database;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    StoreNotification { message: String, viewers: Vec<Uuid> },
    Push { user_id: Uuid, event: SocketEvent },
    Broadcast { event: SocketEvent },
    Email(EmailMessage),
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::StoreNotification { .. } => "store-notification",
            SideEffect::Push { .. } => "push",
            SideEffect::Broadcast { .. } => "broadcast",
            SideEffect::Email(_) => "email",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mail delivery to {to} failed: {reason}")]
    Mail { to: String, reason: String },
}

/// Outgoing mail seam. Real delivery lives outside this service.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

/// Mailer that only records the message in the log.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, subject = %message.subject, "email queued for delivery");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
struct Job {
    id: Uuid,
    effect: SideEffect,
    attempts: u32,
    not_before: Instant,
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job_id: Uuid,
    pub effect: SideEffect,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
}

/// Dead letters kept before the oldest are dropped.
pub const DEAD_LETTER_LIMIT: usize = 1000;

#[derive(Debug)]
pub struct Outbox {
    pending: Mutex<Vec<Job>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    dead_letter_limit: usize,
    wake: Notify,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::with_dead_letter_limit(DEAD_LETTER_LIMIT)
    }
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dead_letter_limit(limit: usize) -> Self {
        Outbox {
            pending: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(VecDeque::new()),
            dead_letter_limit: limit.max(1),
            wake: Notify::new(),
        }
    }

    pub async fn enqueue(&self, effect: SideEffect) -> Uuid {
        let id = Uuid::new_v4();
        debug!(job = %id, kind = effect.kind(), "side effect enqueued");
        self.pending.lock().await.push(Job {
            id,
            effect,
            attempts: 0,
            not_before: Instant::now(),
        });
        self.wake.notify_one();
        id
    }

    pub async fn enqueue_all(&self, effects: impl IntoIterator<Item = SideEffect>) {
        for effect in effects {
            self.enqueue(effect).await;
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.iter().cloned().collect()
    }

    /// Hand the dead letters to the caller and forget them.
    pub async fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.drain(..).collect()
    }

    async fn bury(&self, letter: DeadLetter) {
        let mut dead = self.dead_letters.lock().await;
        while dead.len() >= self.dead_letter_limit {
            if let Some(dropped) = dead.pop_front() {
                warn!(job = %dropped.job_id, kind = dropped.effect.kind(), "dead letter dropped");
            }
        }
        dead.push_back(letter);
    }

    async fn take_due(&self, now: Instant) -> Vec<Job> {
        let mut pending = self.pending.lock().await;
        let (due, waiting): (Vec<Job>, Vec<Job>) =
            pending.drain(..).partition(|job| job.not_before <= now);
        *pending = waiting;
        due
    }

    async fn requeue(&self, job: Job) {
        self.pending.lock().await.push(job);
    }
}

pub struct OutboxWorker {
    outbox: Arc<Outbox>,
    db: Arc<Database>,
    presence: ConnectionRegistry,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
}

impl OutboxWorker {
    pub fn new(
        outbox: Arc<Outbox>,
        db: Arc<Database>,
        presence: ConnectionRegistry,
        mailer: Arc<dyn Mailer>,
        policy: RetryPolicy,
    ) -> Self {
        OutboxWorker {
            outbox,
            db,
            presence,
            mailer,
            policy,
        }
    }

    async fn dispatch(&self, effect: &SideEffect) -> Result<(), DeliveryError> {
        match effect {
            SideEffect::StoreNotification { message, viewers } => {
                if viewers.is_empty() {
                    debug!("notification has no viewers; skipped");
                    return Ok(());
                }
                self.db
                    .notifications
                    .insert(Notification::new(message.clone(), viewers))
                    .await;
                Ok(())
            }
            SideEffect::Push { user_id, event } => {
                if !self.presence.emit(*user_id, event.clone()).await {
                    debug!(user = %user_id, event = %event.event, "user offline; push skipped");
                }
                Ok(())
            }
            SideEffect::Broadcast { event } => {
                let reached = self.presence.broadcast(event.clone()).await;
                debug!(event = %event.event, reached, "broadcast sent");
                Ok(())
            }
            SideEffect::Email(message) => self.mailer.send(message).await,
        }
    }

    /// Dispatch every job that is due now. Jobs requeued for retry are not
    /// picked up again within the same pass.
    pub async fn run_once(&self) -> DispatchReport {
        let mut report = DispatchReport::default();

        for mut job in self.outbox.take_due(Instant::now()).await {
            match self.dispatch(&job.effect).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    job.attempts += 1;
                    if job.attempts >= self.policy.max_attempts {
                        error!(
                            job = %job.id,
                            kind = job.effect.kind(),
                            attempts = job.attempts,
                            error = %err,
                            "side effect abandoned"
                        );
                        self.outbox
                            .bury(DeadLetter {
                                job_id: job.id,
                                effect: job.effect,
                                attempts: job.attempts,
                                last_error: err.to_string(),
                            })
                            .await;
                        report.dead += 1;
                    } else {
                        let delay = self.policy.backoff(job.attempts);
                        warn!(
                            job = %job.id,
                            kind = job.effect.kind(),
                            attempt = job.attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %err,
                            "side effect failed; will retry"
                        );
                        job.not_before = Instant::now() + delay;
                        self.outbox.requeue(job).await;
                        report.retried += 1;
                    }
                }
            }
        }
        report
    }

    /// Run until `shutdown` fires, waking on every enqueue and at least
    /// once per `poll_interval`.
    pub async fn run(self, poll_interval: Duration, mut shutdown: oneshot::Receiver<()>) {
        info!("outbox worker started");
        loop {
            self.run_once().await;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.outbox.wake.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        let report = self.run_once().await;
        let pending = self.outbox.pending_len().await;
        info!(delivered = report.delivered, pending, "outbox worker stopped");
    }
}
