//! Domain layer: the provider-neutral payment vocabulary and the ports that
//! gateway drivers, idempotency ledgers and event sinks plug into.

pub mod intent;
pub mod ledger;
pub mod operations;
pub mod ports;
pub mod transaction;
