//! HTTP handlers for the chat relay.

pub mod analytics;
pub mod chat;
pub mod health;
pub mod metrics;

pub use self::analytics::*;
pub use self::chat::*;
pub use self::health::*;
pub use self::metrics::*;
