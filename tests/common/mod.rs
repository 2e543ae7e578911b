#![allow(dead_code)]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use paycore::config::{AlipayConfig, WechatConfig};
use paycore::infrastructure::alipay::canonical_string;
use paycore::infrastructure::crypto::{RsaSigner, RsaVerifier};
use paycore::infrastructure::wechat::build_message;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const ALIPAY_APP_ID: &str = "2021000000000001";
pub const WECHAT_MCH_ID: &str = "1900000001";
pub const WECHAT_APP_ID: &str = "wx0000000000000001";
pub const API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const NOTIFY_NONCE: &str = "fdasflkjhdsa";

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn merchant_verifier() -> RsaVerifier {
    RsaVerifier::from_pem_file(&fixture("merchant_public.pem")).unwrap()
}

pub fn gateway_signer() -> RsaSigner {
    RsaSigner::from_pem_file(&fixture("gateway_private.pem")).unwrap()
}

pub fn alipay_config(gateway: &str) -> AlipayConfig {
    AlipayConfig {
        app_id: ALIPAY_APP_ID.into(),
        private_key_path: fixture("merchant_private.pem"),
        alipay_public_key_path: fixture("gateway_public.pem"),
        notify_url: "https://merchant.example.com/pay/notify/alipay".into(),
        return_url: "https://merchant.example.com/return".into(),
        sandbox: false,
        gateway: Some(gateway.to_string()),
    }
}

pub fn wechat_config(api_base: &str) -> WechatConfig {
    WechatConfig {
        mch_id: WECHAT_MCH_ID.into(),
        app_id: WECHAT_APP_ID.into(),
        api_v3_key: API_V3_KEY.into(),
        serial_no: "5157F09EFDC096DE15EBE81A47057A72".into(),
        private_key_path: fixture("merchant_private.pem"),
        platform_public_key_path: None,
        notify_url: "https://merchant.example.com/pay/notify/wechat".into(),
        api_base: Some(api_base.to_string()),
    }
}

/// Binds `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_mock(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Form body signed the way the gateway signs asynchronous notifications.
///
/// `fields` must not contain `sign` or `sign_type`; both are appended last.
pub fn alipay_notify_body(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = fields.to_vec();
    sorted.sort();
    let content = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let sign = gateway_signer().sign_base64(content.as_bytes()).unwrap();

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().copied())
        .append_pair("sign_type", "RSA2")
        .append_pair("sign", &sign)
        .finish()
}

pub fn seal(key: &str, nonce: &str, aad: &str, plaintext: &[u8]) -> String {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).unwrap();
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .unwrap();
    STANDARD.encode(sealed)
}

pub fn wechat_notify_body(event_type: &str, key: &str, resource: &Value) -> Vec<u8> {
    json!({
        "id": "EV-2018022511223320873",
        "create_time": "2015-05-20T13:29:35+08:00",
        "event_type": event_type,
        "resource_type": "encrypt-resource",
        "resource": {
            "algorithm": "AEAD_AES_256_GCM",
            "ciphertext": seal(key, NOTIFY_NONCE, "transaction", resource.to_string().as_bytes()),
            "associated_data": "transaction",
            "nonce": NOTIFY_NONCE,
        }
    })
    .to_string()
    .into_bytes()
}

/// Every form the mock gateway received, in arrival order.
pub type Received = Arc<Mutex<Vec<BTreeMap<String, String>>>>;

#[derive(Clone)]
struct AlipayMock {
    verifier: Arc<RsaVerifier>,
    received: Received,
}

/// Form gateway: checks the request signature, then answers per `method`.
pub fn alipay_mock() -> Router {
    alipay_recording_mock().0
}

pub fn alipay_recording_mock() -> (Router, Received) {
    let received = Received::default();
    let state = AlipayMock {
        verifier: Arc::new(merchant_verifier()),
        received: Arc::clone(&received),
    };
    let router = Router::new()
        .route("/gateway.do", axum::routing::post(alipay_gateway))
        .with_state(state);
    (router, received)
}

async fn alipay_gateway(State(mock): State<AlipayMock>, body: Bytes) -> Json<Value> {
    let params: BTreeMap<String, String> =
        url::form_urlencoded::parse(&body).into_owned().collect();
    mock.received.lock().unwrap().push(params.clone());
    let verifier = &mock.verifier;
    let method = params.get("method").cloned().unwrap_or_default();
    let envelope_key = format!("{}_response", method.replace('.', "_"));
    let sign = params.get("sign").cloned().unwrap_or_default();
    let biz: Value = params
        .get("biz_content")
        .and_then(|b| serde_json::from_str(b).ok())
        .unwrap_or(Value::Null);
    let out_trade_no = biz["out_trade_no"].as_str().unwrap_or_default().to_string();

    let inner = if !verifier.verify_base64(canonical_string(params.iter()).as_bytes(), &sign) {
        json!({
            "code": "40002", "msg": "Invalid Arguments",
            "sub_code": "isv.invalid-signature", "sub_msg": "bad signature",
        })
    } else if out_trade_no == "o-fail" {
        json!({
            "code": "40004", "msg": "Business Failed",
            "sub_code": "ACQ.TRADE_HAS_SUCCESS", "sub_msg": "trade already paid",
        })
    } else {
        match method.as_str() {
            "alipay.trade.precreate" => json!({
                "code": "10000", "msg": "Success",
                "out_trade_no": out_trade_no,
                "qr_code": "https://qr.alipay.com/bax03431ljhokirwl38f00a7",
            }),
            "alipay.trade.query" => json!({
                "code": "10000", "msg": "Success",
                "out_trade_no": out_trade_no,
                "trade_no": "2024010122001412345",
                "trade_status": "TRADE_SUCCESS",
                "total_amount": "88.88",
            }),
            "alipay.trade.close" => {
                json!({"code": "10000", "msg": "Success", "out_trade_no": out_trade_no})
            }
            "alipay.trade.refund" => json!({
                "code": "10000", "msg": "Success",
                "fund_change": "Y",
                "refund_fee": biz["refund_amount"],
            }),
            "alipay.trade.order.settle" => {
                json!({"code": "10000", "msg": "Success", "trade_no": biz["trade_no"]})
            }
            _ => json!({"code": "20000", "msg": "Service Currently Unavailable"}),
        }
    };
    let mut envelope = serde_json::Map::new();
    envelope.insert(envelope_key, inner);
    envelope.insert("sign".into(), json!("ignored-by-client"));
    Json(Value::Object(envelope))
}

/// REST gateway: checks the `Authorization` signature, then answers per path.
pub fn wechat_mock() -> Router {
    Router::new()
        .fallback(wechat_api)
        .with_state(Arc::new(merchant_verifier()))
}

fn authorization_fields(header: &str) -> BTreeMap<String, String> {
    header
        .strip_prefix("WECHATPAY2-SHA256-RSA2048 ")
        .unwrap_or_default()
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string()))
        .collect()
}

async fn wechat_api(
    State(verifier): State<Arc<RsaVerifier>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(authorization_fields)
        .unwrap_or_default();
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let body = String::from_utf8_lossy(&body).into_owned();
    let message = build_message(
        method.as_str(),
        path,
        auth.get("timestamp").and_then(|t| t.parse().ok()).unwrap_or_default(),
        auth.get("nonce_str").map(String::as_str).unwrap_or_default(),
        &body,
    );
    let signed = auth.get("mchid").map(String::as_str) == Some(WECHAT_MCH_ID)
        && auth
            .get("signature")
            .is_some_and(|sig| verifier.verify_base64(message.as_bytes(), sig));
    if !signed {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "SIGN_ERROR", "message": "signature mismatch"})),
        )
            .into_response();
    }

    let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let uri_path = uri.path();
    match (&method, uri_path) {
        (&Method::POST, "/v3/pay/transactions/native") => {
            if request["out_trade_no"] == "o-busy" {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"code": "SYSTEM_ERROR", "message": "system busy"})),
                )
                    .into_response();
            }
            Json(json!({"code_url": "weixin://wxpay/bizpayurl?pr=p4lpSuKzz"})).into_response()
        }
        (&Method::POST, "/v3/pay/transactions/jsapi") => {
            Json(json!({"prepay_id": "wx26112221580621e9b071c00d9e093b0000"})).into_response()
        }
        (&Method::GET, p) if p.starts_with("/v3/pay/transactions/out-trade-no/") => {
            let no = p.trim_start_matches("/v3/pay/transactions/out-trade-no/");
            Json(json!({
                "appid": WECHAT_APP_ID,
                "mchid": WECHAT_MCH_ID,
                "out_trade_no": no,
                "transaction_id": "1217752501201407033233368018",
                "trade_type": "NATIVE",
                "trade_state": "SUCCESS",
                "amount": {"total": 1000, "currency": "CNY"},
                "payer": {"openid": "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"},
            }))
            .into_response()
        }
        (&Method::POST, p) if p.ends_with("/close") => StatusCode::NO_CONTENT.into_response(),
        (&Method::POST, "/v3/refund/domestic/refunds") => Json(json!({
            "refund_id": "50000000382019052709732678859",
            "out_refund_no": request["out_refund_no"],
            "status": "PROCESSING",
            "amount": request["amount"],
        }))
        .into_response(),
        (&Method::POST, "/v3/profitsharing/orders") => Json(json!({
            "order_id": "3008450740201411110007820472",
            "out_order_no": request["out_order_no"],
            "state": "PROCESSING",
        }))
        .into_response(),
        (&Method::POST, "/v3/combine-transactions/h5") => {
            let h5_url = "https://wx.tenpay.com/cgi-bin/mmpayweb-bin/checkmweb?prepay_id=wx2916";
            Json(json!({"h5_url": h5_url})).into_response()
        }
        (&Method::POST, "/v3/combine-transactions/jsapi") => {
            if request["combine_payer_info"]["openid"].as_str().is_none_or(str::is_empty) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"code": "PARAM_ERROR", "message": "combine_payer_info required"})),
                )
                    .into_response();
            }
            Json(json!({"prepay_id": "wx201410272009395522657a690389285100"})).into_response()
        }
        (&Method::POST, "/v3/combine-transactions/native") => {
            Json(json!({"code_url": "weixin://wxpay/bizpayurl?pr=combined"})).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"code": "RESOURCE_NOT_EXISTS", "message": "unknown endpoint"})),
        )
            .into_response(),
    }
}
