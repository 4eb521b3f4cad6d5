pub mod analytics;
pub mod chat;
pub mod conversation;
pub mod database;
pub mod metrics;
pub mod providers;

pub use analytics::{AnalyticsQueryService, AnalyticsRecorder};
pub use chat::{ChatError, ChatService, ChatTurn};
pub use conversation::ConversationStore;
pub use database::AnalyticsDb;
