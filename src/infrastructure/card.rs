//! Card acquirer placeholder. Registered so routing and configuration work end to end;
//! every operation reports `NotImplemented`.

use crate::config::CardConfig;
use crate::domain::intent::PayIntent;
use crate::domain::operations::{
    CaptureRequest, CaptureResult, CloseRequest, CombinedCreateRequest, NotifyEvent,
    NotifyHeaders, PaymentCreated, ProfitShareRequest, ProfitShareResult, QueryRequest,
    RefundRequest, RefundResult,
};
use crate::domain::ports::PayDriver;
use crate::domain::transaction::{ClientAction, Transaction};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;

pub const NAME: &str = "card";

pub struct CardDriver {
    gateway: String,
    threeds_enabled: bool,
}

impl CardDriver {
    pub fn new(cfg: &CardConfig) -> Self {
        Self {
            gateway: cfg.gateway.clone(),
            threeds_enabled: cfg.threeds_enabled,
        }
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn threeds_enabled(&self) -> bool {
        self.threeds_enabled
    }

    fn unsupported<T>(op: &str) -> Result<T> {
        Err(PaymentError::NotImplemented(format!("{NAME} {op}")))
    }
}

#[async_trait]
impl PayDriver for CardDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, _intent: &PayIntent) -> Result<PaymentCreated> {
        Self::unsupported("create")
    }

    async fn query(&self, _req: &QueryRequest) -> Result<Transaction> {
        Self::unsupported("query")
    }

    async fn close(&self, _req: &CloseRequest) -> Result<()> {
        Self::unsupported("close")
    }

    async fn refund(&self, _req: &RefundRequest) -> Result<RefundResult> {
        Self::unsupported("refund")
    }

    async fn capture(&self, _req: &CaptureRequest) -> Result<CaptureResult> {
        Self::unsupported("capture")
    }

    async fn parse_notify(&self, _headers: &NotifyHeaders, _body: &[u8]) -> Result<NotifyEvent> {
        Self::unsupported("notify")
    }

    async fn profit_share(&self, _req: &ProfitShareRequest) -> Result<ProfitShareResult> {
        Self::unsupported("profit share")
    }

    async fn create_combined(&self, _req: &CombinedCreateRequest) -> Result<ClientAction> {
        Self::unsupported("combined create")
    }
}
