pub mod expiration;
pub mod handlers;
pub mod models;
pub mod service;
pub mod webhooks;

pub use expiration::{ExpirationJob, ExpirationSummary};
pub use service::BoostService;
pub use webhooks::WebhookService;
