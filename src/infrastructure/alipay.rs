//! Redirect/QR gateway with RSA2 form signing over a key-sorted parameter string.

use super::crypto::{RsaSigner, RsaVerifier};
use super::http::build_client;
use crate::config::AlipayConfig;
use crate::domain::intent::{Channel, PayIntent, Scene, format_minor_units, parse_major_units};
use crate::domain::operations::{
    CaptureRequest, CaptureResult, CloseRequest, CombinedCreateRequest, NotifyEvent,
    NotifyHeaders, PaymentCreated, ProfitShareRequest, ProfitShareResult, ProviderPayload,
    QueryRequest, RefundRequest, RefundResult,
};
use crate::domain::ports::PayDriver;
use crate::domain::transaction::{ClientAction, Transaction, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "alipay";

const PRODUCTION_GATEWAY: &str = "https://openapi.alipay.com/gateway.do";
const SANDBOX_GATEWAY: &str = "https://openapi.alipaydev.com/gateway.do";
const SUCCESS_CODE: &str = "10000";
const UNAVAILABLE_CODE: &str = "20000";

/// Gateway wall-clock strings are read as GMT+8 regardless of where the caller runs.
const GATEWAY_UTC_OFFSET_HOURS: i64 = 8;

const METHOD_PRECREATE: &str = "alipay.trade.precreate";
const METHOD_APP_PAY: &str = "alipay.trade.app.pay";
const METHOD_WAP_PAY: &str = "alipay.trade.wap.pay";
const METHOD_QUERY: &str = "alipay.trade.query";
const METHOD_CLOSE: &str = "alipay.trade.close";
const METHOD_REFUND: &str = "alipay.trade.refund";
const METHOD_SETTLE: &str = "alipay.trade.order.settle";

pub struct AlipayDriver {
    app_id: String,
    notify_url: String,
    return_url: String,
    gateway: String,
    signer: RsaSigner,
    verifier: RsaVerifier,
    client: reqwest::Client,
}

impl AlipayDriver {
    /// Loads both keys eagerly; unreadable or malformed keys fail here, not per request.
    pub fn new(cfg: &AlipayConfig, timeout: Duration) -> Result<Self> {
        if cfg.app_id.is_empty() {
            return Err(PaymentError::Config("alipay.app_id is empty".into()));
        }
        let gateway = match &cfg.gateway {
            Some(url) => url.clone(),
            None if cfg.sandbox => SANDBOX_GATEWAY.to_string(),
            None => PRODUCTION_GATEWAY.to_string(),
        };
        Ok(Self {
            app_id: cfg.app_id.clone(),
            notify_url: cfg.notify_url.clone(),
            return_url: cfg.return_url.clone(),
            gateway,
            signer: RsaSigner::from_pem_file(&cfg.private_key_path)?,
            verifier: RsaVerifier::from_pem_file(&cfg.alipay_public_key_path)?,
            client: build_client(timeout)?,
        })
    }

    /// Signs the public parameters for `method`. Only `method`, `biz_content` and the
    /// method-specific `extra` entries vary between calls.
    fn signed_params(
        &self,
        method: &str,
        biz_content: &Value,
        extra: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut params = BTreeMap::from([
            ("app_id".to_string(), self.app_id.clone()),
            ("method".to_string(), method.to_string()),
            ("format".to_string(), "JSON".to_string()),
            ("charset".to_string(), "utf-8".to_string()),
            ("sign_type".to_string(), "RSA2".to_string()),
            ("timestamp".to_string(), gateway_time(Utc::now())),
            ("version".to_string(), "1.0".to_string()),
            ("biz_content".to_string(), biz_content.to_string()),
        ]);
        if !self.notify_url.is_empty() {
            params.insert("notify_url".into(), self.notify_url.clone());
        }
        params.extend(extra);

        let sign = self.sign_params(&params)?;
        params.insert("sign".into(), sign);
        Ok(params)
    }

    /// Base64 RSA-SHA256 signature over the canonical form of `params`.
    pub fn sign_params(&self, params: &BTreeMap<String, String>) -> Result<String> {
        let content = canonical_string(params.iter());
        self.signer.sign_base64(content.as_bytes())
    }

    async fn call(
        &self,
        method: &str,
        biz_content: Value,
        extra: BTreeMap<String, String>,
    ) -> Result<ProviderPayload> {
        let params = self.signed_params(method, &biz_content, extra)?;
        debug!(method, gateway = %self.gateway, "calling alipay");
        let body = self
            .client
            .post(&self.gateway)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form_encode(&params))
            .send()
            .await?
            .bytes()
            .await?;
        let envelope: Value = serde_json::from_slice(&body).map_err(|e| {
            PaymentError::gateway("BadResponse", format!("undecodable response: {e}"), true, None)
        })?;

        let resp = ProviderPayload::new(unwrap_envelope(method, envelope));
        let code = resp.get_text("code");
        if code != SUCCESS_CODE {
            let sub_code = resp.get_text("sub_code");
            let message = match resp.get_str("sub_msg") {
                Some(msg) => msg.to_string(),
                None => resp.get_text("msg"),
            };
            let code = if sub_code.is_empty() { code } else { sub_code };
            let retryable = resp.get_text("code") == UNAVAILABLE_CODE;
            return Err(PaymentError::gateway(code, message, retryable, Some(resp)));
        }
        Ok(resp)
    }

    fn created(intent: &PayIntent, raw: Option<ProviderPayload>) -> Transaction {
        Transaction {
            channel: Some(Channel::Alipay),
            scene: Some(intent.scene),
            out_trade_no: intent.out_trade_no.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            payer: intent.payer.clone(),
            raw,
            ..Transaction::new(NAME, TransactionStatus::Created)
        }
    }
}

/// `k=v` pairs joined by `&`, keys in lexicographic order, empty values and `sign` dropped.
///
/// The input must already be key-sorted (e.g. a `BTreeMap` iterator).
pub fn canonical_string<'a>(params: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    params
        .filter(|(k, v)| !v.is_empty() && k.as_str() != "sign")
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// `yyyy-MM-dd HH:mm:ss` in the gateway's GMT+8 wall clock.
pub fn gateway_time(at: DateTime<Utc>) -> String {
    (at.naive_utc() + TimeDelta::hours(GATEWAY_UTC_OFFSET_HOURS))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Every response sits under `<method with '.' replaced by '_'>_response`.
pub fn unwrap_envelope(method: &str, mut envelope: Value) -> Value {
    let key = format!("{}_response", method.replace('.', "_"));
    match envelope.get_mut(&key).map(Value::take) {
        Some(inner @ Value::Object(_)) => inner,
        _ => match envelope.get_mut("error_response").map(Value::take) {
            Some(inner @ Value::Object(_)) => inner,
            _ => envelope,
        },
    }
}

pub fn map_trade_status(status: &str) -> TransactionStatus {
    match status {
        "TRADE_SUCCESS" => TransactionStatus::Paid,
        "TRADE_FINISHED" | "TRADE_CLOSED" => TransactionStatus::Closed,
        _ => TransactionStatus::Pending,
    }
}

fn event_type_for(status: &str) -> &'static str {
    match status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => "payment.succeeded",
        "TRADE_CLOSED" => "payment.closed",
        _ => "payment.pending",
    }
}

fn form_encode(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

fn trade_identifiers(out_trade_no: &str, trade_no: &str) -> Result<Map<String, Value>> {
    if out_trade_no.is_empty() && trade_no.is_empty() {
        return Err(PaymentError::InvalidRequest(
            "either out_trade_no or provider_txn_id is required".into(),
        ));
    }
    let mut biz = Map::new();
    if !out_trade_no.is_empty() {
        biz.insert("out_trade_no".into(), json!(out_trade_no));
    }
    if !trade_no.is_empty() {
        biz.insert("trade_no".into(), json!(trade_no));
    }
    Ok(biz)
}

#[async_trait]
impl PayDriver for AlipayDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, intent: &PayIntent) -> Result<PaymentCreated> {
        let (method, product_code) = match intent.scene {
            Scene::PcQr => (METHOD_PRECREATE, None),
            Scene::App => (METHOD_APP_PAY, Some("QUICK_MSECURITY_PAY")),
            Scene::H5 => (METHOD_WAP_PAY, Some("QUICK_WAP_WAY")),
            scene => {
                return Err(PaymentError::UnsupportedScene {
                    provider: NAME,
                    scene,
                });
            }
        };

        let mut biz = Map::new();
        biz.insert("subject".into(), json!(intent.subject));
        biz.insert("out_trade_no".into(), json!(intent.out_trade_no));
        biz.insert("total_amount".into(), json!(format_minor_units(intent.amount)));
        if let Some(code) = product_code {
            biz.insert("product_code".into(), json!(code));
        }
        if let Some(expire_at) = intent.expire_at {
            biz.insert("time_expire".into(), json!(gateway_time(expire_at)));
        }
        for (k, v) in &intent.extra {
            biz.insert(k.clone(), json!(v));
        }
        let biz = Value::Object(biz);

        let mut extra = BTreeMap::new();
        if !intent.notify_url.is_empty() {
            extra.insert("notify_url".to_string(), intent.notify_url.clone());
        }

        if intent.scene == Scene::PcQr {
            let resp = self.call(method, biz, extra).await?;
            let qr = resp.get_text("qr_code");
            if qr.is_empty() {
                return Err(PaymentError::gateway(
                    "MissingQrCode",
                    "precreate succeeded without qr_code",
                    false,
                    Some(resp),
                ));
            }
            return Ok(PaymentCreated {
                action: ClientAction::qr_code(qr),
                transaction: Self::created(intent, Some(resp)),
            });
        }

        if intent.scene == Scene::H5 {
            let return_url = if intent.return_url.is_empty() {
                &self.return_url
            } else {
                &intent.return_url
            };
            if !return_url.is_empty() {
                extra.insert("return_url".to_string(), return_url.clone());
            }
        }
        let params = self.signed_params(method, &biz, extra)?;
        let query = form_encode(&params);

        let action = if intent.scene == Scene::App {
            ClientAction::invoke_sdk(query)
        } else {
            ClientAction::redirect(format!("{}?{}", self.gateway, query))
        };
        Ok(PaymentCreated {
            action,
            transaction: Self::created(intent, None),
        })
    }

    async fn query(&self, req: &QueryRequest) -> Result<Transaction> {
        let biz = trade_identifiers(&req.out_trade_no, &req.provider_txn_id)?;
        let resp = self.call(METHOD_QUERY, Value::Object(biz), BTreeMap::new()).await?;

        let trade_status = resp.get_text("trade_status");
        let out_trade_no = match resp.get_str("out_trade_no") {
            Some(v) => v.to_string(),
            None => req.out_trade_no.clone(),
        };
        Ok(Transaction {
            channel: Some(Channel::Alipay),
            out_trade_no,
            provider_txn_id: resp.get_text("trade_no"),
            amount: parse_major_units(&resp.get_text("total_amount")).unwrap_or_default(),
            raw: Some(resp),
            ..Transaction::new(NAME, map_trade_status(&trade_status))
        })
    }

    async fn close(&self, req: &CloseRequest) -> Result<()> {
        let biz = trade_identifiers(&req.out_trade_no, "")?;
        self.call(METHOD_CLOSE, Value::Object(biz), BTreeMap::new()).await?;
        Ok(())
    }

    async fn refund(&self, req: &RefundRequest) -> Result<RefundResult> {
        if req.amount <= 0 {
            return Err(PaymentError::InvalidRequest(
                "refund amount must be positive".into(),
            ));
        }
        let mut biz = trade_identifiers(&req.out_trade_no, &req.provider_txn_id)?;
        biz.insert("refund_amount".into(), json!(format_minor_units(req.amount)));
        biz.insert("out_request_no".into(), json!(req.out_refund_no));
        if !req.reason.is_empty() {
            biz.insert("refund_reason".into(), json!(req.reason));
        }
        let resp = self.call(METHOD_REFUND, Value::Object(biz), BTreeMap::new()).await?;
        Ok(RefundResult {
            success: true,
            out_refund_no: req.out_refund_no.clone(),
            refund_id: req.out_refund_no.clone(),
            raw: Some(resp),
        })
    }

    async fn capture(&self, _req: &CaptureRequest) -> Result<CaptureResult> {
        Err(PaymentError::NotImplemented("alipay capture".into()))
    }

    async fn parse_notify(&self, _headers: &NotifyHeaders, body: &[u8]) -> Result<NotifyEvent> {
        let mut fields: BTreeMap<String, String> = url::form_urlencoded::parse(body)
            .into_owned()
            .collect();
        if fields.is_empty() {
            return Err(PaymentError::BadNotification("empty form body".into()));
        }

        let sign = fields.remove("sign").ok_or(PaymentError::VerifyFailed)?;
        fields.remove("sign_type");
        let content = canonical_string(fields.iter());
        if !self.verifier.verify_base64(content.as_bytes(), &sign) {
            return Err(PaymentError::VerifyFailed);
        }
        if fields.get("app_id").is_some_and(|id| *id != self.app_id) {
            return Err(PaymentError::VerifyFailed);
        }

        let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
        let trade_status = get("trade_status");
        let amount = match fields.get("total_amount") {
            Some(v) => parse_major_units(v).ok_or_else(|| {
                PaymentError::BadNotification(format!("invalid total_amount {v:?}"))
            })?,
            None => 0,
        };
        let transaction = Transaction {
            channel: Some(Channel::Alipay),
            out_trade_no: get("out_trade_no"),
            provider_txn_id: get("trade_no"),
            amount,
            raw: Some(ProviderPayload::new(json!(fields))),
            ..Transaction::new(NAME, map_trade_status(&trade_status))
        };

        Ok(NotifyEvent {
            event_type: event_type_for(&trade_status).to_string(),
            idempotency_key: transaction.out_trade_no.clone(),
            transaction: Some(transaction),
            refund: None,
        })
    }

    async fn profit_share(&self, req: &ProfitShareRequest) -> Result<ProfitShareResult> {
        let royalties: Vec<Value> = req
            .receivers
            .iter()
            .map(|r| {
                let mut item = json!({
                    "trans_in": r.account,
                    "amount": format_minor_units(r.amount),
                    "desc": r.desc,
                });
                if !r.kind.is_empty() {
                    item["trans_in_type"] = json!(r.kind);
                }
                item
            })
            .collect();
        let biz = json!({
            "out_request_no": req.out_order_no,
            "trade_no": req.provider_txn_id,
            "royalty_parameters": royalties,
        });
        let resp = self.call(METHOD_SETTLE, biz, BTreeMap::new()).await?;
        Ok(ProfitShareResult {
            success: true,
            raw: Some(resp),
        })
    }

    async fn create_combined(&self, _req: &CombinedCreateRequest) -> Result<ClientAction> {
        Err(PaymentError::NotImplemented("alipay combined create".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_string_sorts_and_skips() {
        let p = params(&[
            ("method", "alipay.trade.query"),
            ("app_id", "2021"),
            ("sign", "zzz"),
            ("notify_url", ""),
            ("biz_content", "{\"a\":1}"),
        ]);
        assert_eq!(
            canonical_string(p.iter()),
            "app_id=2021&biz_content={\"a\":1}&method=alipay.trade.query"
        );
    }

    #[test]
    fn test_unwrap_envelope() {
        let body = json!({
            "alipay_trade_precreate_response": {"code": "10000", "qr_code": "https://qr"},
            "sign": "abc"
        });
        let inner = unwrap_envelope("alipay.trade.precreate", body);
        assert_eq!(inner["qr_code"], "https://qr");

        let err = json!({"error_response": {"code": "40002", "msg": "Invalid Arguments"}});
        assert_eq!(unwrap_envelope("alipay.trade.query", err)["code"], "40002");

        let bare = json!({"code": "10000"});
        assert_eq!(unwrap_envelope("alipay.trade.query", bare.clone()), bare);
    }

    #[test]
    fn test_trade_status_mapping() {
        assert_eq!(map_trade_status("TRADE_SUCCESS"), TransactionStatus::Paid);
        assert_eq!(map_trade_status("TRADE_FINISHED"), TransactionStatus::Closed);
        assert_eq!(map_trade_status("TRADE_CLOSED"), TransactionStatus::Closed);
        assert_eq!(map_trade_status("WAIT_BUYER_PAY"), TransactionStatus::Pending);
        assert_eq!(map_trade_status("SOMETHING_NEW"), TransactionStatus::Pending);
    }

    #[test]
    fn test_gateway_time_is_gmt8() {
        let at = "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(gateway_time(at), "2030-01-01 08:00:00");

        let late = "2030-01-01T17:30:05Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(gateway_time(late), "2030-01-02 01:30:05");
    }

    #[test]
    fn test_form_encoding_escapes_signature_chars() {
        let p = params(&[("sign", "a+b/c="), ("subject", "hi there")]);
        assert_eq!(form_encode(&p), "sign=a%2Bb%2Fc%3D&subject=hi+there");
    }
}
