//! Application layer orchestrating drivers, the idempotency ledger and event delivery.
//!
//! `PaymentManager` is the entry point for outbound operations; `NotificationHandler`
//! runs the inbound notification pipeline independently of any HTTP framework.

pub mod manager;
pub mod notify;
