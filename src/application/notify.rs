use super::manager::PaymentManager;
use crate::domain::operations::{NotifyEvent, NotifyHeaders};
use crate::domain::ports::{EventSinkHandle, LedgerHandle};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What happened to an inbound notification that passed verification.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// First sighting: the event was forwarded downstream.
    Forwarded(NotifyEvent),
    /// Re-delivery within the TTL window: nothing was forwarded.
    Duplicate(NotifyEvent),
}

/// Transport-independent notification pipeline:
/// resolve driver -> verify -> ledger claim -> forward.
#[derive(Clone)]
pub struct NotificationHandler {
    manager: Arc<PaymentManager>,
    ledger: LedgerHandle,
    sink: EventSinkHandle,
}

impl NotificationHandler {
    pub fn new(manager: Arc<PaymentManager>, ledger: LedgerHandle, sink: EventSinkHandle) -> Self {
        Self {
            manager,
            ledger,
            sink,
        }
    }

    /// Processes one raw callback for `provider`.
    ///
    /// Driver lookup, verification and ledger failures are returned unchanged; nothing is
    /// forwarded in those cases.
    #[instrument(skip(self, headers, body), fields(body_len = body.len()))]
    pub async fn handle(
        &self,
        provider: &str,
        headers: &NotifyHeaders,
        body: &[u8],
    ) -> Result<NotifyOutcome> {
        let driver = self.manager.get_driver(provider)?;

        let event = driver.parse_notify(headers, body).await.inspect_err(|e| {
            warn!(code = e.code(), error = %e, "rejected notification");
        })?;

        if !self.ledger.claim(&event.idempotency_key).await? {
            warn!(key = %event.idempotency_key, "duplicate notification, not forwarding");
            return Ok(NotifyOutcome::Duplicate(event));
        }

        self.sink.publish(&event).await;
        info!(
            key = %event.idempotency_key,
            event_type = %event.event_type,
            "notification forwarded"
        );
        Ok(NotifyOutcome::Forwarded(event))
    }
}
