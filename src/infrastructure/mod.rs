//! Adapters for the domain ports: gateway drivers, ledgers and the event bus.

pub mod alipay;
pub mod card;
pub mod crypto;
pub mod event_bus;
pub mod factory;
pub mod http;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod wechat;
