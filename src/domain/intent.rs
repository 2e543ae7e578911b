use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Currency applied when an intent leaves it empty.
pub const DEFAULT_CURRENCY: &str = "CNY";

/// The payment UX context that selects a gateway sub-API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Scene {
    App,
    #[strum(serialize = "H5")]
    H5,
    PcQr,
    Jsapi,
    MiniProgram,
    Native,
    #[serde(rename = "MICROPAY")]
    #[strum(serialize = "MICROPAY")]
    MicroPay,
    #[serde(rename = "PREAUTH")]
    #[strum(serialize = "PREAUTH")]
    PreAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Channel {
    Alipay,
    Wechat,
    Card,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayerInfo {
    #[serde(default)]
    pub open_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub card_token: String,
}

/// One profit-share leg attached to an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub receiver: String,
    pub amount: i64,
    #[serde(default)]
    pub desc: String,
}

/// A caller's request to collect money.
///
/// `amount` is in minor units (cents). `out_trade_no` must be unique per merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayIntent {
    pub out_trade_no: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub scene: Scene,
    pub channel: Option<Channel>,
    #[serde(default)]
    pub notify_url: String,
    #[serde(default)]
    pub return_url: String,
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payer: PayerInfo,
    #[serde(default)]
    pub attach: BTreeMap<String, String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    #[serde(default)]
    pub split: Vec<SplitInfo>,
}

impl PayIntent {
    pub fn new(out_trade_no: impl Into<String>, amount: i64, scene: Scene) -> Self {
        Self {
            out_trade_no: out_trade_no.into(),
            amount,
            currency: String::new(),
            subject: String::new(),
            description: String::new(),
            scene,
            channel: None,
            notify_url: String::new(),
            return_url: String::new(),
            expire_at: None,
            payer: PayerInfo::default(),
            attach: BTreeMap::new(),
            extra: BTreeMap::new(),
            split: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_payer_open_id(mut self, open_id: impl Into<String>) -> Self {
        self.payer.open_id = open_id.into();
        self
    }

    /// Rejects intents that must never reach a gateway and fills in the default currency.
    pub fn normalize(&mut self) -> crate::error::Result<()> {
        if self.amount <= 0 {
            return Err(crate::error::PaymentError::InvalidIntent(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.currency.is_empty() {
            self.currency = DEFAULT_CURRENCY.to_string();
        }
        Ok(())
    }
}

/// Formats minor units as a two-decimal major-unit string, e.g. `1234` -> `"12.34"`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parses a major-unit decimal string such as `"12.3"` into minor units.
pub fn parse_major_units(value: &str) -> Option<i64> {
    let value = value.trim();
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}
