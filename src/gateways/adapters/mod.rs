pub mod paggue;
pub mod suitpay;

pub use paggue::PaggueGateway;
pub use suitpay::SuitPayGateway;
