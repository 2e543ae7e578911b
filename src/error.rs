use crate::domain::intent::Scene;
use crate::domain::operations::ProviderPayload;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// A non-success business answer from a gateway.
#[derive(Debug, Clone)]
pub struct GatewayError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub provider_raw: Option<ProviderPayload>,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("pay driver '{0}' not found")]
    DriverNotFound(String),
    #[error("{provider} does not support scene {scene}")]
    UnsupportedScene { provider: &'static str, scene: Scene },
    #[error("{0} not implemented")]
    NotImplemented(String),
    #[error("malformed notification: {0}")]
    BadNotification(String),
    #[error("notification signature verification failed")]
    VerifyFailed,
    #[error("notification decryption failed")]
    DecryptFailed,
    #[error("gateway returned {}: {}", .0.code, .0.message)]
    Gateway(GatewayError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidIntent(_) => "InvalidIntent",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::DriverNotFound(_) => "DriverNotFound",
            Self::UnsupportedScene { .. } => "UnsupportedScene",
            Self::NotImplemented(_) => "NotImplemented",
            Self::BadNotification(_) => "BadRequest",
            Self::VerifyFailed => "VerifyFailed",
            Self::DecryptFailed => "DecryptFailed",
            Self::Gateway(e) => &e.code,
            Self::Transport(_) => "Transport",
            Self::Config(_) => "Config",
            Self::Crypto(_) => "Crypto",
            Self::IoError(_) => "Io",
            #[cfg(feature = "storage-rocksdb")]
            Self::Storage(_) => "Storage",
            Self::InternalError(_) => "Internal",
        }
    }

    /// Whether the caller may retry the same call with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.retryable,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn provider_raw(&self) -> Option<&ProviderPayload> {
        match self {
            Self::Gateway(e) => e.provider_raw.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn gateway(
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
        provider_raw: Option<ProviderPayload>,
    ) -> Self {
        Self::Gateway(GatewayError {
            code: code.into(),
            message: message.into(),
            retryable,
            provider_raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codes_are_distinguishable() {
        let unsupported = PaymentError::UnsupportedScene {
            provider: "wechat",
            scene: Scene::App,
        };
        let protocol = PaymentError::gateway("ORDERNOTEXIST", "order missing", false, None);

        assert_eq!(unsupported.code(), "UnsupportedScene");
        assert_eq!(protocol.code(), "ORDERNOTEXIST");
        assert_eq!(PaymentError::VerifyFailed.code(), "VerifyFailed");
        assert_eq!(PaymentError::DecryptFailed.code(), "DecryptFailed");
    }

    #[test]
    fn test_gateway_error_carries_raw_and_retry_flag() {
        let raw = ProviderPayload::new(json!({"code": "SYSTEM_ERROR"}));
        let err = PaymentError::gateway("SYSTEM_ERROR", "busy", true, Some(raw));

        assert!(err.is_retryable());
        assert_eq!(
            err.provider_raw().and_then(|r| r.get_str("code")),
            Some("SYSTEM_ERROR")
        );
        assert!(!PaymentError::InvalidIntent("x".into()).is_retryable());
    }
}
