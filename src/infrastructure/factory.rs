//! Builds drivers from configuration. The set of providers is closed and known at
//! compile time; nothing registers itself at load time.

use super::alipay::AlipayDriver;
use super::card::CardDriver;
use super::wechat::WechatDriver;
use crate::application::manager::PaymentManager;
use crate::config::PayConfig;
use crate::domain::ports::DriverHandle;
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::info;

/// Supported providers, in default-selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    Wechat,
    Alipay,
    Card,
}

impl ProviderKind {
    pub fn is_configured(self, cfg: &PayConfig) -> bool {
        match self {
            Self::Wechat => cfg.wechat.is_some(),
            Self::Alipay => cfg.alipay.is_some(),
            Self::Card => cfg.card.is_some(),
        }
    }
}

/// Constructs the driver for `kind`, or `None` when its section is absent.
pub fn build_driver(kind: ProviderKind, cfg: &PayConfig) -> Result<Option<DriverHandle>> {
    let timeout = cfg.timeout();
    let driver: DriverHandle = match kind {
        ProviderKind::Wechat => match &cfg.wechat {
            Some(section) => Arc::new(WechatDriver::new(section, timeout)?),
            None => return Ok(None),
        },
        ProviderKind::Alipay => match &cfg.alipay {
            Some(section) => Arc::new(AlipayDriver::new(section, timeout)?),
            None => return Ok(None),
        },
        ProviderKind::Card => match &cfg.card {
            Some(section) => Arc::new(CardDriver::new(section)),
            None => return Ok(None),
        },
    };
    Ok(Some(driver))
}

/// Registers every configured driver and selects the default one.
///
/// An explicit `default` must name a configured provider; otherwise the first configured
/// provider in `ProviderKind` order wins. A manager with no drivers is valid.
pub fn build_manager(cfg: &PayConfig) -> Result<PaymentManager> {
    let mut manager = PaymentManager::new();
    for kind in ProviderKind::iter() {
        if let Some(driver) = build_driver(kind, cfg)? {
            info!(provider = %kind, "registered pay driver");
            manager.add_driver(kind.to_string(), driver);
        }
    }

    if !cfg.default.is_empty() {
        let kind: ProviderKind = cfg.default.parse().map_err(|_| {
            PaymentError::Config(format!("unknown default provider '{}'", cfg.default))
        })?;
        if !kind.is_configured(cfg) {
            return Err(PaymentError::Config(format!(
                "default provider '{kind}' has no configuration section"
            )));
        }
        manager.set_default_driver(&kind.to_string())?;
    } else if let Some(kind) = ProviderKind::iter().find(|k| k.is_configured(cfg)) {
        manager.set_default_driver(&kind.to_string())?;
    }
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CardConfig;

    #[test]
    fn test_provider_kind_names() {
        assert_eq!(ProviderKind::Wechat.to_string(), "wechat");
        assert_eq!("alipay".parse::<ProviderKind>().unwrap(), ProviderKind::Alipay);
        assert!("paypal".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_empty_config_builds_empty_manager() {
        let manager = build_manager(&PayConfig::default()).unwrap();
        assert!(manager.driver_names().is_empty());
        assert_eq!(manager.default_driver_name(), None);
    }

    #[test]
    fn test_card_only_becomes_default() {
        let cfg = PayConfig {
            card: Some(CardConfig::default()),
            ..PayConfig::default()
        };
        let manager = build_manager(&cfg).unwrap();
        assert_eq!(manager.driver_names(), vec!["card"]);
        assert_eq!(manager.default_driver_name(), Some("card"));
    }

    #[test]
    fn test_default_must_be_configured() {
        let cfg = PayConfig {
            default: "wechat".into(),
            card: Some(CardConfig::default()),
            ..PayConfig::default()
        };
        assert!(matches!(build_manager(&cfg), Err(PaymentError::Config(_))));

        let cfg = PayConfig {
            default: "paypal".into(),
            ..PayConfig::default()
        };
        assert!(matches!(build_manager(&cfg), Err(PaymentError::Config(_))));
    }
}
