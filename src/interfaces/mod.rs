//! Inbound adapters. Only HTTP today.

pub mod http;
