use super::intent::PayIntent;
use super::operations::{
    CaptureRequest, CaptureResult, CloseRequest, CombinedCreateRequest, NotifyEvent,
    NotifyHeaders, PaymentCreated, ProfitShareRequest, ProfitShareResult, QueryRequest,
    RefundRequest, RefundResult,
};
use super::transaction::{ClientAction, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The operation set every gateway integration implements.
///
/// Drivers reject scenes they do not serve with `PaymentError::UnsupportedScene` and
/// operations they do not offer with `PaymentError::NotImplemented`.
#[async_trait]
pub trait PayDriver: Send + Sync {
    /// Registry name, also the `{provider}` segment of the notification route.
    fn name(&self) -> &'static str;

    async fn create(&self, intent: &PayIntent) -> Result<PaymentCreated>;
    async fn query(&self, req: &QueryRequest) -> Result<Transaction>;
    async fn close(&self, req: &CloseRequest) -> Result<()>;
    async fn refund(&self, req: &RefundRequest) -> Result<RefundResult>;
    async fn capture(&self, req: &CaptureRequest) -> Result<CaptureResult>;
    /// Verifies (and decrypts where applicable) a raw inbound callback.
    async fn parse_notify(&self, headers: &NotifyHeaders, body: &[u8]) -> Result<NotifyEvent>;
    async fn profit_share(&self, req: &ProfitShareRequest) -> Result<ProfitShareResult>;
    async fn create_combined(&self, req: &CombinedCreateRequest) -> Result<ClientAction>;
}

/// Key -> first-sighting store with TTL semantics.
///
/// An empty key carries no idempotency information: it is never a duplicate and is
/// never recorded.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    async fn is_duplicate(&self, key: &str) -> Result<bool>;
    async fn mark_key(&self, key: &str) -> Result<()>;
    /// Atomic `is_duplicate` + `mark_key`. Returns `true` when this call recorded the
    /// first live sighting and the caller should process the event.
    async fn claim(&self, key: &str) -> Result<bool>;
}

/// Downstream consumer of deduplicated notification events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &NotifyEvent);
}

pub type DriverHandle = Arc<dyn PayDriver>;
pub type LedgerHandle = Arc<dyn IdempotencyLedger>;
pub type EventSinkHandle = Arc<dyn EventSink>;
