pub mod payment_expiration;

pub use payment_expiration::{PaymentExpirationConfig, PaymentExpirationWorker};
