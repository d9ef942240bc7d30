//! Payconfirm backend library
//!
//! Payment confirmation reconciliation engine: takes a checkout attempt
//! through an externally-hosted gateway flow and determines, exactly once,
//! whether the payment succeeded, reconciling the gateway's webhook pushes
//! against direct verification calls without ever double-fulfilling an order.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod notify;
pub mod reconcile;
pub mod reference;
pub mod services;
