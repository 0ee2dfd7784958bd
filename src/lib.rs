//! Payment processing backend for raffle campaigns.
//!
//! Charges are created against per-tenant PIX gateway configurations,
//! identified by signed human-typeable codes, and advanced through a
//! fixed state machine by processor webhooks and an expiration worker.

pub mod api;
pub mod codes;
pub mod config;
pub mod database;
pub mod error;
pub mod gateways;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod services;
pub mod workers;
