use crate::domain::intent::PayIntent;
use crate::domain::operations::{
    CaptureRequest, CaptureResult, CloseRequest, CombinedCreateRequest, PaymentCreated,
    ProfitShareRequest, ProfitShareResult, QueryRequest, RefundRequest, RefundResult,
};
use crate::domain::ports::DriverHandle;
use crate::domain::transaction::{ClientAction, Transaction};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Registry of named gateway drivers and the entry point for outbound operations.
///
/// `PaymentManager` validates intents before dispatch and otherwise delegates to the
/// default driver. All gateway-specific validation lives in the drivers.
#[derive(Default, Clone)]
pub struct PaymentManager {
    drivers: HashMap<String, DriverHandle>,
    default: Option<String>,
}

impl PaymentManager {
    /// Creates an empty manager with no default driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `driver` under `name`, replacing any driver already registered there.
    pub fn add_driver(&mut self, name: impl Into<String>, driver: DriverHandle) {
        self.drivers.insert(name.into(), driver);
    }

    /// Selects the driver used when callers do not name one.
    ///
    /// # Errors
    ///
    /// Returns `DriverNotFound` if `name` was never registered.
    pub fn set_default_driver(&mut self, name: &str) -> Result<()> {
        if !self.drivers.contains_key(name) {
            return Err(PaymentError::DriverNotFound(name.to_string()));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_driver_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Registered driver names, sorted.
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves `name`, or the default driver when `name` is empty.
    pub fn get_driver(&self, name: &str) -> Result<DriverHandle> {
        let resolved = if name.is_empty() {
            self.default.as_deref().unwrap_or_default()
        } else {
            name
        };
        self.drivers
            .get(resolved)
            .cloned()
            .ok_or_else(|| PaymentError::DriverNotFound(resolved.to_string()))
    }

    fn default_driver(&self) -> Result<DriverHandle> {
        self.get_driver("")
    }

    /// Validates the intent and creates the payment through the default driver.
    ///
    /// Non-positive amounts fail with `InvalidIntent` before any driver is contacted.
    pub async fn create(&self, mut intent: PayIntent) -> Result<PaymentCreated> {
        intent.normalize()?;
        let driver = self.default_driver()?;
        debug!(
            driver = driver.name(),
            out_trade_no = %intent.out_trade_no,
            scene = %intent.scene,
            "creating payment"
        );
        driver.create(&intent).await
    }

    pub async fn query(&self, req: &QueryRequest) -> Result<Transaction> {
        self.default_driver()?.query(req).await
    }

    pub async fn close(&self, req: &CloseRequest) -> Result<()> {
        self.default_driver()?.close(req).await
    }

    pub async fn refund(&self, req: &RefundRequest) -> Result<RefundResult> {
        self.default_driver()?.refund(req).await
    }

    pub async fn capture(&self, req: &CaptureRequest) -> Result<CaptureResult> {
        self.default_driver()?.capture(req).await
    }

    pub async fn profit_share(&self, req: &ProfitShareRequest) -> Result<ProfitShareResult> {
        self.default_driver()?.profit_share(req).await
    }

    pub async fn create_combined(&self, req: &CombinedCreateRequest) -> Result<ClientAction> {
        self.default_driver()?.create_combined(req).await
    }
}
