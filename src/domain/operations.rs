use super::intent::Scene;
use super::transaction::{ClientAction, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Inbound notification headers, keyed by lowercase header name.
pub type NotifyHeaders = HashMap<String, String>;

/// Provider body preserved verbatim for audit and dispute resolution.
///
/// Guaranteed keys per driver:
/// * alipay: the unwrapped `<method>_response` object (`code`, `msg`, plus method fields such
///   as `qr_code`, `trade_no`, `trade_status`); for notifications, every posted form field.
/// * wechat: the response JSON (`code_url`, `prepay_id`, `trade_state`, `transaction_id`,
///   `refund_id`, ...); for notifications, the decrypted resource object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderPayload(Value);

impl ProviderPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Reads a field that the provider may encode either as a string or a number.
    pub fn get_text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Outcome of a successful `create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentCreated {
    pub action: ClientAction,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub out_trade_no: String,
    #[serde(default)]
    pub provider_txn_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub out_trade_no: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub out_refund_no: String,
    #[serde(default)]
    pub out_trade_no: String,
    #[serde(default)]
    pub provider_txn_id: String,
    pub amount: i64,
    /// Original order total; defaults to `amount` (full refund).
    pub total: Option<i64>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResult {
    pub success: bool,
    pub out_refund_no: String,
    pub refund_id: String,
    pub raw: Option<ProviderPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub out_trade_no: String,
    #[serde(default)]
    pub provider_txn_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub success: bool,
    pub raw: Option<ProviderPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitShareReceiver {
    #[serde(rename = "type")]
    pub kind: String,
    pub account: String,
    pub amount: i64,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitShareRequest {
    #[serde(default)]
    pub out_trade_no: String,
    pub provider_txn_id: String,
    pub out_order_no: String,
    pub receivers: Vec<ProfitShareReceiver>,
    #[serde(default)]
    pub unfreeze_unsplit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitShareResult {
    pub success: bool,
    pub raw: Option<ProviderPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSubOrder {
    pub mch_id: String,
    pub app_id: String,
    pub out_trade_no: String,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payer_open_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedCreateRequest {
    pub combine_out_trade_no: String,
    pub scene: Scene,
    pub sub_orders: Vec<CombinedSubOrder>,
    #[serde(default)]
    pub notify_url: String,
    #[serde(default)]
    pub payer_open_id: String,
}

/// A verified inbound gateway notification.
///
/// Two events carrying the same `idempotency_key` within the ledger TTL are one logical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub event_type: String,
    pub transaction: Option<Transaction>,
    pub refund: Option<RefundResult>,
    pub idempotency_key: String,
}
