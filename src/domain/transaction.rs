use super::intent::{Channel, PayerInfo, Scene};
use super::operations::ProviderPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gateway-observed lifecycle of a payment.
///
/// Forward path: `Created -> Pending -> {Paid | Authorized} -> Captured -> Closed`.
/// `Refunded`, `PartiallyRefunded`, `Failed` and `Expired` are terminal and reachable from
/// any non-terminal state. Nothing moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Created,
    Pending,
    Paid,
    Authorized,
    Captured,
    Closed,
    Refunded,
    PartiallyRefunded,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Refunded | Self::PartiallyRefunded | Self::Failed | Self::Expired
        )
    }

    fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Pending => 1,
            Self::Paid | Self::Authorized => 2,
            Self::Captured => 3,
            Self::Closed => 4,
            Self::Refunded | Self::PartiallyRefunded | Self::Failed | Self::Expired => 5,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Refunded | Self::PartiallyRefunded | Self::Failed | Self::Expired => true,
            _ => next.rank() > self.rank(),
        }
    }
}

/// How the presentation layer continues the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientActionKind {
    /// Data: `url`.
    #[serde(rename = "redirect")]
    Redirect,
    /// Data: `code_url`, the content to render as a QR code.
    #[serde(rename = "qrcode")]
    QrCode,
    /// Data: `orderString`, handed unchanged to the native SDK.
    #[serde(rename = "invokeSDK")]
    InvokeSdk,
    /// Data: `url`.
    #[serde(rename = "deeplink")]
    DeepLink,
    /// Data: `appId`, `timeStamp`, `nonceStr`, `package`, `signType`, `paySign`.
    #[serde(rename = "miniProgramParams")]
    MiniProgramParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAction {
    pub kind: ClientActionKind,
    pub data: BTreeMap<String, String>,
}

impl ClientAction {
    pub fn new(kind: ClientActionKind) -> Self {
        Self {
            kind,
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        Self::new(ClientActionKind::Redirect).with("url", url)
    }

    pub fn qr_code(code_url: impl Into<String>) -> Self {
        Self::new(ClientActionKind::QrCode).with("code_url", code_url)
    }

    pub fn invoke_sdk(order_string: impl Into<String>) -> Self {
        Self::new(ClientActionKind::InvokeSdk).with("orderString", order_string)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub status: TransactionStatus,
    pub provider: String,
    pub channel: Option<Channel>,
    pub scene: Option<Scene>,
    pub out_trade_no: String,
    pub provider_txn_id: String,
    pub amount: i64,
    pub currency: String,
    pub payer: PayerInfo,
    pub raw: Option<ProviderPayload>,
}

impl Transaction {
    pub fn new(provider: &str, status: TransactionStatus) -> Self {
        Self {
            status,
            provider: provider.to_string(),
            channel: None,
            scene: None,
            out_trade_no: String::new(),
            provider_txn_id: String::new(),
            amount: 0,
            currency: String::new(),
            payer: PayerInfo::default(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: ProviderPayload) -> Self {
        self.raw = Some(raw);
        self
    }
}
