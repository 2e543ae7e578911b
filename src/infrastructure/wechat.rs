//! REST/JSON gateway: RSA-signed `Authorization` header on every call, AES-256-GCM
//! encrypted webhooks, and a separate client-side `paySign` for in-app invocation.

use super::crypto::{RsaSigner, RsaVerifier, aes_256_gcm_open, nonce_str};
use super::http::build_client;
use crate::config::WechatConfig;
use crate::domain::intent::{Channel, DEFAULT_CURRENCY, PayIntent, PayerInfo, Scene};
use crate::domain::operations::{
    CaptureRequest, CaptureResult, CloseRequest, CombinedCreateRequest, NotifyEvent,
    NotifyHeaders, PaymentCreated, ProfitShareRequest, ProfitShareResult, ProviderPayload,
    QueryRequest, RefundRequest, RefundResult,
};
use crate::domain::ports::PayDriver;
use crate::domain::transaction::{ClientAction, ClientActionKind, Transaction, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "wechat";

const API_BASE: &str = "https://api.mch.weixin.qq.com";
const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";
const API_V3_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PAY_SIGN_TYPE: &str = "RSA";

const HEADER_TIMESTAMP: &str = "wechatpay-timestamp";
const HEADER_NONCE: &str = "wechatpay-nonce";
const HEADER_SIGNATURE: &str = "wechatpay-signature";

pub struct WechatDriver {
    mch_id: String,
    app_id: String,
    api_v3_key: Vec<u8>,
    serial_no: String,
    notify_url: String,
    api_base: String,
    signer: RsaSigner,
    platform_verifier: Option<RsaVerifier>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct NotifyEnvelope {
    #[serde(default)]
    event_type: String,
    resource: EncryptedResource,
}

#[derive(Deserialize)]
struct EncryptedResource {
    ciphertext: String,
    #[serde(default)]
    associated_data: String,
    nonce: String,
}

impl WechatDriver {
    pub fn new(cfg: &WechatConfig, timeout: Duration) -> Result<Self> {
        for (field, value) in [
            ("mch_id", &cfg.mch_id),
            ("app_id", &cfg.app_id),
            ("serial_no", &cfg.serial_no),
        ] {
            if value.is_empty() {
                return Err(PaymentError::Config(format!("wechat.{field} is empty")));
            }
        }
        if cfg.api_v3_key.len() != API_V3_KEY_LEN {
            return Err(PaymentError::Config(format!(
                "wechat.api_v3_key must be {API_V3_KEY_LEN} bytes, got {}",
                cfg.api_v3_key.len()
            )));
        }
        let platform_verifier = cfg
            .platform_public_key_path
            .as_deref()
            .map(RsaVerifier::from_pem_file)
            .transpose()?;

        Ok(Self {
            mch_id: cfg.mch_id.clone(),
            app_id: cfg.app_id.clone(),
            api_v3_key: cfg.api_v3_key.as_bytes().to_vec(),
            serial_no: cfg.serial_no.clone(),
            notify_url: cfg.notify_url.clone(),
            api_base: cfg
                .api_base
                .clone()
                .unwrap_or_else(|| API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            signer: RsaSigner::from_pem_file(&cfg.private_key_path)?,
            platform_verifier,
            client: build_client(timeout)?,
        })
    }

    /// Value of the `Authorization` header for one request.
    ///
    /// `path` is the request path including any query string.
    pub fn authorization(
        &self,
        method: &str,
        path: &str,
        timestamp: i64,
        nonce: &str,
        body: &str,
    ) -> Result<String> {
        let message = build_message(method, path, timestamp, nonce, body);
        let signature = self.signer.sign_base64(message.as_bytes())?;
        Ok(format!(
            r#"{AUTH_SCHEMA} mchid="{}",serial_no="{}",nonce_str="{nonce}",timestamp="{timestamp}",signature="{signature}""#,
            self.mch_id, self.serial_no
        ))
    }

    /// Client-side invocation signature. Not interchangeable with the request signature.
    pub fn pay_sign(
        &self,
        app_id: &str,
        timestamp: &str,
        nonce: &str,
        package: &str,
    ) -> Result<String> {
        let message = format!("{app_id}\n{timestamp}\n{nonce}\n{package}\n");
        self.signer.sign_base64(message.as_bytes())
    }

    fn mini_program_params(&self, app_id: &str, prepay_id: &str) -> Result<ClientAction> {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = nonce_str(NONCE_LEN);
        let package = format!("prepay_id={prepay_id}");
        let pay_sign = self.pay_sign(app_id, &timestamp, &nonce, &package)?;
        Ok(ClientAction::new(ClientActionKind::MiniProgramParams)
            .with("appId", app_id)
            .with("timeStamp", timestamp)
            .with("nonceStr", nonce)
            .with("package", package)
            .with("signType", PAY_SIGN_TYPE)
            .with("paySign", pay_sign))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ProviderPayload> {
        let body = body.map(Value::to_string).unwrap_or_default();
        let nonce = nonce_str(NONCE_LEN);
        let authorization =
            self.authorization(method.as_str(), path, Utc::now().timestamp(), &nonce, &body)?;
        debug!(%method, path, "calling wechat");

        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.api_base))
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::ACCEPT, "application/json");
        if !body.is_empty() {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        let payload = ProviderPayload::new(payload);

        if !status.is_success() {
            let code = match payload.get_str("code") {
                Some(code) => code.to_string(),
                None => status.as_u16().to_string(),
            };
            let message = payload.get_text("message");
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err(PaymentError::gateway(code, message, retryable, Some(payload)));
        }
        Ok(payload)
    }

    fn resolve_notify_url<'a>(&'a self, requested: &'a str) -> Result<&'a str> {
        let url = if requested.is_empty() {
            self.notify_url.as_str()
        } else {
            requested
        };
        if url.is_empty() {
            return Err(PaymentError::InvalidIntent("notify_url is required".into()));
        }
        Ok(url)
    }

    fn verify_notify_headers(&self, headers: &NotifyHeaders, body: &[u8]) -> Result<()> {
        let Some(verifier) = &self.platform_verifier else {
            return Ok(());
        };
        let header = |name: &str| headers.get(name).ok_or(PaymentError::VerifyFailed);
        let timestamp = header(HEADER_TIMESTAMP)?;
        let nonce = header(HEADER_NONCE)?;
        let signature = header(HEADER_SIGNATURE)?;

        let mut message = format!("{timestamp}\n{nonce}\n").into_bytes();
        message.extend_from_slice(body);
        message.push(b'\n');
        if !verifier.verify_base64(&message, signature) {
            return Err(PaymentError::VerifyFailed);
        }
        Ok(())
    }
}

/// `METHOD\nPATH\nTIMESTAMP\nNONCE\nBODY\n`; `body` is empty for GET.
pub fn build_message(
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &str,
) -> String {
    format!("{method}\n{path}\n{timestamp}\n{nonce}\n{body}\n")
}

pub fn map_trade_state(state: &str) -> TransactionStatus {
    match state {
        "SUCCESS" => TransactionStatus::Paid,
        "NOTPAY" | "USERPAYING" => TransactionStatus::Pending,
        "CLOSED" | "PAYERROR" => TransactionStatus::Failed,
        _ => TransactionStatus::Pending,
    }
}

fn scene_for_trade_type(trade_type: &str) -> Option<Scene> {
    match trade_type {
        "NATIVE" => Some(Scene::Native),
        "JSAPI" => Some(Scene::Jsapi),
        "APP" => Some(Scene::App),
        "MWEB" => Some(Scene::H5),
        "MICROPAY" => Some(Scene::MicroPay),
        _ => None,
    }
}

/// Builds a Transaction from a query response or a decrypted notification resource.
fn transaction_from(payload: ProviderPayload) -> Transaction {
    let value = payload.as_value();
    let amount = &value["amount"];
    Transaction {
        channel: Some(Channel::Wechat),
        scene: scene_for_trade_type(&payload.get_text("trade_type")),
        out_trade_no: payload.get_text("out_trade_no"),
        provider_txn_id: payload.get_text("transaction_id"),
        amount: amount["total"].as_i64().unwrap_or_default(),
        currency: amount["currency"].as_str().unwrap_or(DEFAULT_CURRENCY).to_string(),
        payer: PayerInfo {
            open_id: value["payer"]["openid"].as_str().unwrap_or_default().to_string(),
            ..PayerInfo::default()
        },
        ..Transaction::new(NAME, map_trade_state(&payload.get_text("trade_state")))
    }
    .with_raw(payload)
}

fn required<'a>(payload: &'a ProviderPayload, key: &str) -> Result<&'a str> {
    match payload.get_str(key) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PaymentError::gateway(
            "MissingField",
            format!("response has no {key}"),
            false,
            Some(payload.clone()),
        )),
    }
}

/// Identifiers interpolated into a request path. The gateway restricts them to
/// `[0-9A-Za-z_-|*@]`, which also keeps the signed path identical to the one sent.
fn path_segment<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let valid = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'|' | b'*' | b'@'));
    if !valid {
        return Err(PaymentError::InvalidRequest(format!(
            "{field} contains characters outside [0-9A-Za-z_-|*@]: {value:?}"
        )));
    }
    Ok(value)
}

#[async_trait]
impl PayDriver for WechatDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, intent: &PayIntent) -> Result<PaymentCreated> {
        let path = match intent.scene {
            Scene::Native => "/v3/pay/transactions/native",
            Scene::Jsapi | Scene::MiniProgram => "/v3/pay/transactions/jsapi",
            scene => {
                return Err(PaymentError::UnsupportedScene {
                    provider: NAME,
                    scene,
                });
            }
        };
        let description = if intent.subject.is_empty() {
            &intent.description
        } else {
            &intent.subject
        };

        let mut body = json!({
            "appid": self.app_id,
            "mchid": self.mch_id,
            "description": description,
            "out_trade_no": intent.out_trade_no,
            "notify_url": self.resolve_notify_url(&intent.notify_url)?,
            "amount": {"total": intent.amount, "currency": intent.currency},
        });
        if let Some(expire_at) = intent.expire_at {
            body["time_expire"] = json!(expire_at.to_rfc3339_opts(SecondsFormat::Secs, false));
        }
        if let Some(attach) = intent.attach.get("attach") {
            body["attach"] = json!(attach);
        }
        if intent.scene != Scene::Native {
            if intent.payer.open_id.is_empty() {
                return Err(PaymentError::InvalidIntent(
                    "payer open_id is required for JSAPI and MINI_PROGRAM".into(),
                ));
            }
            body["payer"] = json!({"openid": intent.payer.open_id});
        }

        let resp = self.request(Method::POST, path, Some(&body)).await?;
        let action = if intent.scene == Scene::Native {
            ClientAction::qr_code(required(&resp, "code_url")?)
        } else {
            self.mini_program_params(&self.app_id, required(&resp, "prepay_id")?)?
        };

        let transaction = Transaction {
            channel: Some(Channel::Wechat),
            scene: Some(intent.scene),
            out_trade_no: intent.out_trade_no.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            payer: intent.payer.clone(),
            ..Transaction::new(NAME, TransactionStatus::Created)
        }
        .with_raw(resp);
        Ok(PaymentCreated {
            action,
            transaction,
        })
    }

    async fn query(&self, req: &QueryRequest) -> Result<Transaction> {
        let path = if !req.out_trade_no.is_empty() {
            format!(
                "/v3/pay/transactions/out-trade-no/{}?mchid={}",
                path_segment("out_trade_no", &req.out_trade_no)?,
                self.mch_id
            )
        } else if !req.provider_txn_id.is_empty() {
            format!(
                "/v3/pay/transactions/id/{}?mchid={}",
                path_segment("provider_txn_id", &req.provider_txn_id)?,
                self.mch_id
            )
        } else {
            return Err(PaymentError::InvalidRequest(
                "either out_trade_no or provider_txn_id is required".into(),
            ));
        };
        let resp = self.request(Method::GET, &path, None).await?;
        Ok(transaction_from(resp))
    }

    async fn close(&self, req: &CloseRequest) -> Result<()> {
        if req.out_trade_no.is_empty() {
            return Err(PaymentError::InvalidRequest("out_trade_no is required".into()));
        }
        let path = format!(
            "/v3/pay/transactions/out-trade-no/{}/close",
            path_segment("out_trade_no", &req.out_trade_no)?
        );
        self.request(Method::POST, &path, Some(&json!({"mchid": self.mch_id})))
            .await?;
        Ok(())
    }

    async fn refund(&self, req: &RefundRequest) -> Result<RefundResult> {
        if req.amount <= 0 {
            return Err(PaymentError::InvalidRequest(
                "refund amount must be positive".into(),
            ));
        }
        let mut body = json!({
            "out_refund_no": req.out_refund_no,
            "amount": {
                "refund": req.amount,
                "total": req.total.unwrap_or(req.amount),
                "currency": DEFAULT_CURRENCY,
            },
        });
        if !req.out_trade_no.is_empty() {
            body["out_trade_no"] = json!(req.out_trade_no);
        } else if !req.provider_txn_id.is_empty() {
            body["transaction_id"] = json!(req.provider_txn_id);
        } else {
            return Err(PaymentError::InvalidRequest(
                "either out_trade_no or provider_txn_id is required".into(),
            ));
        }
        if !req.reason.is_empty() {
            body["reason"] = json!(req.reason);
        }

        let resp = self
            .request(Method::POST, "/v3/refund/domestic/refunds", Some(&body))
            .await?;
        let status = resp.get_text("status");
        Ok(RefundResult {
            success: matches!(status.as_str(), "SUCCESS" | "PROCESSING"),
            out_refund_no: req.out_refund_no.clone(),
            refund_id: resp.get_text("refund_id"),
            raw: Some(resp),
        })
    }

    async fn capture(&self, _req: &CaptureRequest) -> Result<CaptureResult> {
        Err(PaymentError::NotImplemented("wechat capture".into()))
    }

    async fn parse_notify(&self, headers: &NotifyHeaders, body: &[u8]) -> Result<NotifyEvent> {
        self.verify_notify_headers(headers, body)?;

        let envelope: NotifyEnvelope = serde_json::from_slice(body)
            .map_err(|e| PaymentError::BadNotification(format!("invalid envelope: {e}")))?;
        if envelope.event_type.is_empty() {
            return Err(PaymentError::BadNotification("missing event_type".into()));
        }
        let resource = envelope.resource;
        let ciphertext = STANDARD
            .decode(resource.ciphertext.trim())
            .map_err(|e| PaymentError::BadNotification(format!("ciphertext is not base64: {e}")))?;

        let plaintext = aes_256_gcm_open(
            &self.api_v3_key,
            resource.nonce.as_bytes(),
            resource.associated_data.as_bytes(),
            &ciphertext,
        )?;
        let decrypted: Value = serde_json::from_slice(&plaintext)
            .map_err(|e| PaymentError::BadNotification(format!("invalid resource: {e}")))?;
        let decrypted = ProviderPayload::new(decrypted);

        if envelope.event_type.starts_with("REFUND.") {
            let refund = RefundResult {
                success: decrypted.get_text("refund_status") == "SUCCESS",
                out_refund_no: decrypted.get_text("out_refund_no"),
                refund_id: decrypted.get_text("refund_id"),
                raw: Some(decrypted),
            };
            return Ok(NotifyEvent {
                event_type: envelope.event_type,
                idempotency_key: refund.out_refund_no.clone(),
                transaction: None,
                refund: Some(refund),
            });
        }

        let transaction = transaction_from(decrypted);
        Ok(NotifyEvent {
            event_type: envelope.event_type,
            idempotency_key: transaction.out_trade_no.clone(),
            transaction: Some(transaction),
            refund: None,
        })
    }

    async fn profit_share(&self, req: &ProfitShareRequest) -> Result<ProfitShareResult> {
        if req.receivers.is_empty() {
            return Err(PaymentError::InvalidRequest("no profit share receivers".into()));
        }
        let receivers: Vec<Value> = req
            .receivers
            .iter()
            .map(|r| {
                json!({
                    "type": r.kind,
                    "account": r.account,
                    "amount": r.amount,
                    "description": r.desc,
                })
            })
            .collect();
        let body = json!({
            "appid": self.app_id,
            "transaction_id": req.provider_txn_id,
            "out_order_no": req.out_order_no,
            "receivers": receivers,
            "unfreeze_unsplit": req.unfreeze_unsplit,
        });
        let resp = self
            .request(Method::POST, "/v3/profitsharing/orders", Some(&body))
            .await?;
        Ok(ProfitShareResult {
            success: true,
            raw: Some(resp),
        })
    }

    async fn create_combined(&self, req: &CombinedCreateRequest) -> Result<ClientAction> {
        let path = match req.scene {
            Scene::Native => "/v3/combine-transactions/native",
            Scene::Jsapi | Scene::MiniProgram => "/v3/combine-transactions/jsapi",
            Scene::H5 => "/v3/combine-transactions/h5",
            scene => {
                return Err(PaymentError::UnsupportedScene {
                    provider: NAME,
                    scene,
                });
            }
        };
        if req.sub_orders.is_empty() {
            return Err(PaymentError::InvalidRequest("combined order has no sub orders".into()));
        }

        let sub_orders: Vec<Value> = req
            .sub_orders
            .iter()
            .map(|sub| {
                let mch_id = if sub.mch_id.is_empty() { &self.mch_id } else { &sub.mch_id };
                let app_id = if sub.app_id.is_empty() { &self.app_id } else { &sub.app_id };
                json!({
                    "mchid": mch_id,
                    "appid": app_id,
                    "out_trade_no": sub.out_trade_no,
                    "description": sub.description,
                    "amount": {"total_amount": sub.amount, "currency": DEFAULT_CURRENCY},
                })
            })
            .collect();
        let mut body = json!({
            "combine_appid": self.app_id,
            "combine_mchid": self.mch_id,
            "combine_out_trade_no": req.combine_out_trade_no,
            "sub_orders": sub_orders,
            "notify_url": self.resolve_notify_url(&req.notify_url)?,
        });
        if matches!(req.scene, Scene::Jsapi | Scene::MiniProgram) {
            if req.payer_open_id.is_empty() {
                return Err(PaymentError::InvalidRequest(
                    "payer_open_id is required for JSAPI and MINI_PROGRAM".into(),
                ));
            }
            body["combine_payer_info"] = json!({"openid": req.payer_open_id});
        }

        let resp = self.request(Method::POST, path, Some(&body)).await?;
        match req.scene {
            Scene::Native => Ok(ClientAction::qr_code(required(&resp, "code_url")?)),
            Scene::H5 => Ok(ClientAction::redirect(required(&resp, "h5_url")?)),
            _ => self.mini_program_params(&self.app_id, required(&resp, "prepay_id")?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::{Aead, KeyInit, Payload};
    use aes_gcm::{Aes256Gcm, Nonce};
    use std::path::PathBuf;

    const API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn config() -> WechatConfig {
        WechatConfig {
            mch_id: "1900000001".into(),
            app_id: "wx0000000000000001".into(),
            api_v3_key: API_V3_KEY.into(),
            serial_no: "5157F09EFDC096DE15EBE81A47057A72".into(),
            private_key_path: fixture("merchant_private.pem"),
            platform_public_key_path: None,
            notify_url: "https://merchant.example.com/pay/notify/wechat".into(),
            api_base: Some("http://127.0.0.1:9".into()),
        }
    }

    fn driver() -> WechatDriver {
        WechatDriver::new(&config(), Duration::from_secs(1)).unwrap()
    }

    fn seal(key: &str, nonce: &str, aad: &str, plaintext: &Value) -> String {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).unwrap();
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: plaintext.to_string().as_bytes(),
                    aad: aad.as_bytes(),
                },
            )
            .unwrap();
        STANDARD.encode(sealed)
    }

    fn notification(event_type: &str, key: &str, resource: &Value) -> Vec<u8> {
        json!({
            "id": "EV-2018022511223320873",
            "event_type": event_type,
            "resource_type": "encrypt-resource",
            "resource": {
                "algorithm": "AEAD_AES_256_GCM",
                "ciphertext": seal(key, "fdasflkjhdsa", "transaction", resource),
                "associated_data": "transaction",
                "nonce": "fdasflkjhdsa",
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_build_message_layout() {
        let nonce = "593BEC0C930BF1AFEB40B4A08C8FB242";
        assert_eq!(
            build_message("GET", "/v3/certificates", 1554208460, nonce, ""),
            "GET\n/v3/certificates\n1554208460\n593BEC0C930BF1AFEB40B4A08C8FB242\n\n"
        );
    }

    #[test]
    fn test_authorization_header_is_verifiable() {
        let driver = driver();
        let header = driver
            .authorization("POST", "/v3/pay/transactions/native", 1700000000, "abc", "{}")
            .unwrap();

        assert!(header.starts_with("WECHATPAY2-SHA256-RSA2048 mchid=\"1900000001\","));
        assert!(header.contains("serial_no=\"5157F09EFDC096DE15EBE81A47057A72\""));
        assert!(header.contains("nonce_str=\"abc\""));
        assert!(header.contains("timestamp=\"1700000000\""));

        let signature = header
            .split("signature=\"")
            .nth(1)
            .and_then(|s| s.strip_suffix('"'))
            .unwrap();
        let verifier = RsaVerifier::from_pem_file(&fixture("merchant_public.pem")).unwrap();
        let message = build_message("POST", "/v3/pay/transactions/native", 1700000000, "abc", "{}");
        assert!(verifier.verify_base64(message.as_bytes(), signature));
    }

    #[test]
    fn test_pay_sign_differs_from_request_signature() {
        let package = "prepay_id=wx201410272009395522657a690389285100";
        let pay_sign = driver()
            .pay_sign("wx0000000000000001", "1700000000", "abc", package)
            .unwrap();
        let verifier = RsaVerifier::from_pem_file(&fixture("merchant_public.pem")).unwrap();
        let message = format!("wx0000000000000001\n1700000000\nabc\n{package}\n");
        assert!(verifier.verify_base64(message.as_bytes(), &pay_sign));
        let request_message = build_message("wx0000000000000001", "1700000000", 0, "abc", package);
        assert!(!verifier.verify_base64(request_message.as_bytes(), &pay_sign));
    }

    #[test]
    fn test_mini_program_params_keys() {
        let action = driver()
            .mini_program_params("wx0000000000000001", "wx2014")
            .unwrap();
        assert_eq!(action.kind, ClientActionKind::MiniProgramParams);
        assert_eq!(action.get("package"), Some("prepay_id=wx2014"));
        assert_eq!(action.get("signType"), Some("RSA"));
        for key in ["appId", "timeStamp", "nonceStr", "paySign"] {
            assert!(action.get(key).is_some_and(|v| !v.is_empty()), "{key}");
        }
    }

    #[test]
    fn test_trade_state_mapping() {
        assert_eq!(map_trade_state("SUCCESS"), TransactionStatus::Paid);
        assert_eq!(map_trade_state("NOTPAY"), TransactionStatus::Pending);
        assert_eq!(map_trade_state("USERPAYING"), TransactionStatus::Pending);
        assert_eq!(map_trade_state("CLOSED"), TransactionStatus::Failed);
        assert_eq!(map_trade_state("PAYERROR"), TransactionStatus::Failed);
        assert_eq!(map_trade_state("REVOKED"), TransactionStatus::Pending);
    }

    #[test]
    fn test_short_api_v3_key_is_rejected() {
        let cfg = WechatConfig {
            api_v3_key: "short".into(),
            ..config()
        };
        assert!(matches!(
            WechatDriver::new(&cfg, Duration::from_secs(1)),
            Err(PaymentError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_parse_transaction_notification() {
        let resource = json!({
            "mchid": "1900000001",
            "appid": "wx0000000000000001",
            "out_trade_no": "o-1001",
            "transaction_id": "4200000001",
            "trade_type": "NATIVE",
            "trade_state": "SUCCESS",
            "amount": {"total": 1000, "currency": "CNY"},
            "payer": {"openid": "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"}
        });
        let body = notification("TRANSACTION.SUCCESS", API_V3_KEY, &resource);

        let event = driver().parse_notify(&NotifyHeaders::new(), &body).await.unwrap();
        assert_eq!(event.event_type, "TRANSACTION.SUCCESS");
        assert_eq!(event.idempotency_key, "o-1001");
        let txn = event.transaction.unwrap();
        assert_eq!(txn.status, TransactionStatus::Paid);
        assert_eq!(txn.provider_txn_id, "4200000001");
        assert_eq!(txn.amount, 1000);
        assert_eq!(txn.scene, Some(Scene::Native));
        assert_eq!(txn.payer.open_id, "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o");
        assert_eq!(txn.raw.unwrap().as_value(), &resource);
    }

    #[tokio::test]
    async fn test_parse_refund_notification_keys_on_refund_no() {
        let resource = json!({
            "out_trade_no": "o-1001",
            "out_refund_no": "r-1",
            "refund_id": "50000000382019052709732678859",
            "refund_status": "SUCCESS"
        });
        let body = notification("REFUND.SUCCESS", API_V3_KEY, &resource);

        let event = driver().parse_notify(&NotifyHeaders::new(), &body).await.unwrap();
        assert_eq!(event.idempotency_key, "r-1");
        assert!(event.transaction.is_none());
        let refund = event.refund.unwrap();
        assert!(refund.success);
        assert_eq!(refund.refund_id, "50000000382019052709732678859");
    }

    #[tokio::test]
    async fn test_wrong_key_is_decrypt_failed() {
        let body = notification(
            "TRANSACTION.SUCCESS",
            "fedcba9876543210fedcba9876543210",
            &json!({"out_trade_no": "o-1"}),
        );
        let err = driver()
            .parse_notify(&NotifyHeaders::new(), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DecryptFailed));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_notification() {
        let err = driver()
            .parse_notify(&NotifyHeaders::new(), b"not json")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::BadNotification(_)));
    }

    #[tokio::test]
    async fn test_platform_signature_checked_when_configured() {
        let cfg = WechatConfig {
            platform_public_key_path: Some(fixture("gateway_public.pem")),
            ..config()
        };
        let driver = WechatDriver::new(&cfg, Duration::from_secs(1)).unwrap();
        let body = notification(
            "TRANSACTION.SUCCESS",
            API_V3_KEY,
            &json!({"out_trade_no": "o-7", "trade_state": "SUCCESS"}),
        );

        let err = driver
            .parse_notify(&NotifyHeaders::new(), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::VerifyFailed));

        let platform = RsaSigner::from_pem_file(&fixture("gateway_private.pem")).unwrap();
        let mut message = b"1700000000\nnonce-1\n".to_vec();
        message.extend_from_slice(&body);
        message.push(b'\n');
        let headers = NotifyHeaders::from([
            (HEADER_TIMESTAMP.to_string(), "1700000000".to_string()),
            (HEADER_NONCE.to_string(), "nonce-1".to_string()),
            (HEADER_SIGNATURE.to_string(), platform.sign_base64(&message).unwrap()),
        ]);
        let event = driver.parse_notify(&headers, &body).await.unwrap();
        assert_eq!(event.idempotency_key, "o-7");

        let mut tampered = headers.clone();
        tampered.insert(HEADER_NONCE.to_string(), "nonce-2".to_string());
        assert!(matches!(
            driver.parse_notify(&tampered, &body).await,
            Err(PaymentError::VerifyFailed)
        ));
    }

    #[test]
    fn test_path_segment_rejects_request_target_characters() {
        assert_eq!(path_segment("out_trade_no", "o-2001_a|b*c@d").unwrap(), "o-2001_a|b*c@d");
        for id in ["o/../refunds", "o?mchid=1", "o#frag", "o 1", "o%2F"] {
            assert!(
                matches!(path_segment("out_trade_no", id), Err(PaymentError::InvalidRequest(_))),
                "{id}"
            );
        }
    }

    #[tokio::test]
    async fn test_unsupported_scene() {
        let intent = PayIntent::new("o-1", 100, Scene::PcQr);
        let err = driver().create(&intent).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::UnsupportedScene { provider: "wechat", scene: Scene::PcQr }
        ));
    }
}
