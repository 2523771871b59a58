//! Outbound account emails. Delivery is fire-and-forget: requests enqueue a
//! [`Notification`] and return; one background worker drains the queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use crate::services::metrics::NOTIFICATIONS_COUNTER;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    LoginAlert {
        to: String,
        name: String,
        ip: String,
        user_agent: String,
        at: DateTime<Utc>,
    },
    PasswordReset {
        to: String,
        name: String,
        reset_url: String,
        expires_at: DateTime<Utc>,
    },
    PasswordChanged {
        to: String,
        name: String,
    },
    EmailVerification {
        to: String,
        name: String,
        verify_url: String,
        expires_at: DateTime<Utc>,
    },
    Invitation {
        to: String,
        inviter_name: String,
        role: String,
        accept_url: String,
        expires_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::LoginAlert { .. } => "login_alert",
            Notification::PasswordReset { .. } => "password_reset",
            Notification::PasswordChanged { .. } => "password_changed",
            Notification::EmailVerification { .. } => "email_verification",
            Notification::Invitation { .. } => "invitation",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::LoginAlert { to, .. }
            | Notification::PasswordReset { to, .. }
            | Notification::PasswordChanged { to, .. }
            | Notification::EmailVerification { to, .. }
            | Notification::Invitation { to, .. } => to,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Used when SMTP is not configured: logs the event, never the link.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            kind = notification.kind(),
            "email disabled, dropping notification for {}",
            notification.recipient()
        );
        Ok(())
    }
}

/// Cheap to clone handle onto the notification queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Spawns the worker. Each job gets `timeout`; failures are logged, not retried.
    pub fn start(notifier: Arc<dyn Notifier>, capacity: usize, timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                deliver(notifier.as_ref(), &job, timeout).await;
            }
        });
        Self { tx }
    }

    /// Never blocks the caller. A full queue drops the job.
    pub fn dispatch(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                NOTIFICATIONS_COUNTER
                    .with_label_values(&[job.kind(), "dropped"])
                    .inc();
                warn!(kind = job.kind(), "notification queue full, dropping job");
            }
            Err(TrySendError::Closed(job)) => {
                NOTIFICATIONS_COUNTER
                    .with_label_values(&[job.kind(), "dropped"])
                    .inc();
                warn!(kind = job.kind(), "notification worker stopped, dropping job");
            }
        }
    }
}

async fn deliver(notifier: &dyn Notifier, job: &Notification, timeout: Duration) {
    let status = match tokio::time::timeout(timeout, notifier.send(job)).await {
        Ok(Ok(())) => "sent",
        Ok(Err(e)) => {
            warn!(kind = job.kind(), "notification delivery failed: {}", e);
            "failed"
        }
        Err(_) => {
            warn!(kind = job.kind(), "notification delivery timed out after {:?}", timeout);
            "timeout"
        }
    };
    NOTIFICATIONS_COUNTER
        .with_label_values(&[job.kind(), status])
        .inc();
}
