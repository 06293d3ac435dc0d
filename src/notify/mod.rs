//! Fire-and-forget notifications for return decisions.
//!
//! Terminal transitions queue a [`Notification`] describing the decision to
//! the original requester. Dispatch is decoupled from the transactional
//! path: enqueueing never blocks, and a delivery failure is logged, not
//! propagated.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{Money, OrderId, ReturnId, ReturnStatus, UserId};
use crate::infra::Result;

/// Decision event delivered to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnEvent {
    Approved,
    Rejected,
    Refunded,
    Cancelled,
}

impl ReturnEvent {
    /// Maps a terminal-ish transition target to its event, if one is due.
    pub fn for_status(status: ReturnStatus) -> Option<Self> {
        match status {
            ReturnStatus::Approved => Some(ReturnEvent::Approved),
            ReturnStatus::Rejected => Some(ReturnEvent::Rejected),
            ReturnStatus::Refunded => Some(ReturnEvent::Refunded),
            ReturnStatus::Cancelled => Some(ReturnEvent::Cancelled),
            ReturnStatus::Pending => None,
        }
    }
}

/// Outbound notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub return_id: ReturnId,
    pub order_id: OrderId,
    pub event: ReturnEvent,
    pub refund_amount: Money,
}

/// External delivery gateway (mail/push). Best-effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Default sink: structured log only. Stands in until a real gateway is
/// wired; keeps local development free of external dependencies.
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            return_id = %notification.return_id,
            event = ?notification.event,
            "return notification delivered"
        );
        Ok(())
    }
}

/// Enqueue side of the dispatcher. Implementations must never block or fail
/// the caller.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Channel-backed dispatcher with a background delivery worker.
pub struct QueuedDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl QueuedDispatcher {
    /// Spawn the delivery worker and return the enqueue handle.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = sink.deliver(&notification).await {
                    warn!(
                        return_id = %notification.return_id,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
        });

        Arc::new(Self { tx })
    }
}

impl NotificationDispatcher for QueuedDispatcher {
    fn dispatch(&self, notification: Notification) {
        // A closed channel means we are shutting down; dropping the
        // notification is acceptable for a best-effort side channel.
        if self.tx.send(notification).is_err() {
            warn!("notification queue closed, dropping notification");
        }
    }
}

/// Dispatcher that drops everything. Useful for tests and offline tools.
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn dispatch(&self, _notification: Notification) {}
}
