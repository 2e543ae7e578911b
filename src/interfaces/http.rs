use crate::application::notify::{NotificationHandler, NotifyOutcome};
use crate::domain::operations::{NotifyEvent, NotifyHeaders};
use crate::error::{PaymentError, Result};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{self as tower_trace, TraceLayer};
use tracing::info;

pub const NOTIFY_ROUTE: &str = "/pay/notify/{provider}";

/// Body returned for every notification, whatever the provider.
///
/// Gateways generally expect their own acknowledgement format (plain `success`, or an
/// XML/JSON `SUCCESS` code). This endpoint always answers with this JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotifyEvent>,
}

impl NotifyResponse {
    fn accepted(event: NotifyEvent, msg: Option<&str>) -> Self {
        Self {
            success: true,
            msg: msg.map(str::to_string),
            data: Some(event),
        }
    }
}

struct NotifyError(PaymentError);

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PaymentError::DriverNotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::BadNotification(_) => StatusCode::BAD_REQUEST,
            PaymentError::VerifyFailed | PaymentError::DecryptFailed => StatusCode::UNAUTHORIZED,
            PaymentError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(NotifyResponse {
            success: false,
            msg: Some(self.0.to_string()),
            data: None,
        });
        (status, body).into_response()
    }
}

/// Header names are already lowercase; repeated headers are joined with `, `.
fn collect_headers(headers: &HeaderMap) -> NotifyHeaders {
    let mut collected = NotifyHeaders::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

async fn notify(
    State(handler): State<Arc<NotificationHandler>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<NotifyResponse>, NotifyError> {
    let headers = collect_headers(&headers);
    let outcome = handler
        .handle(&provider, &headers, &body)
        .await
        .map_err(NotifyError)?;
    let response = match outcome {
        NotifyOutcome::Forwarded(event) => NotifyResponse::accepted(event, None),
        NotifyOutcome::Duplicate(event) => NotifyResponse::accepted(event, Some("duplicate")),
    };
    Ok(Json(response))
}

pub fn router(handler: Arc<NotificationHandler>) -> Router {
    let logging_layer = TraceLayer::new_for_http()
        .on_request(tower_trace::DefaultOnRequest::new().level(tracing::Level::INFO))
        .on_response(
            tower_trace::DefaultOnResponse::new()
                .level(tracing::Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        );

    Router::new()
        .route("/health", axum::routing::get(|| async { "ok" }))
        .route(NOTIFY_ROUTE, post(notify))
        .layer(logging_layer)
        .with_state(handler)
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "notification endpoint listening");
    }
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
