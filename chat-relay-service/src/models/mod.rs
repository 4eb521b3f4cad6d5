//! Domain models for the chat relay.

pub mod analytics;
pub mod message;
pub mod request_record;
pub mod usage;

pub use analytics::{Overview, RecentRequest, TimelineBucket};
pub use message::{Message, Role};
pub use request_record::{NewRequestRecord, RequestRecord};
pub use usage::{estimate_tokens, TokenUsage};
