//! Services module for business logic

pub mod payment_lifecycle;
pub mod webhook_processor;

pub use payment_lifecycle::{
    CreatePaymentRequest, LifecycleConfig, LifecycleError, LifecycleResult, PaymentLifecycle,
    PaymentStatus, WebhookOutcome,
};
pub use webhook_processor::{DropReason, WebhookDisposition, WebhookProcessor};
