pub mod handlers;
pub mod models;
pub mod push;
pub mod service;

pub use push::{FcmTransport, LogOnlyTransport, PushError, PushPayload, PushTransport};
pub use service::NotificationService;
