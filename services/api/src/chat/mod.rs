pub mod handlers;
pub mod hub;
pub mod models;
pub mod service;
pub mod websocket;

pub use hub::ChatHub;
pub use service::{ConversationService, SendOutcome};
