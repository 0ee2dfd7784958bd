//! HTTP handlers.

pub mod payments;
pub mod webhooks;

pub use payments::{create_payment, get_payment, PaymentApiState};
pub use webhooks::{receive_pix_webhook, WebhookApiState};
