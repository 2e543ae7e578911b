use crate::error::Result;
use std::time::Duration;

/// Builds the outbound client shared by a driver. The timeout is the only cutoff: calls
/// are neither retried nor cancelled.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("paycore/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
