//! Mock provider implementation for testing.

use super::{ChatProvider, Completion, ProviderError};
use crate::models::Message;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a [`MockProvider`] does when called.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Reply(String),
    Fail(ProviderError),
    /// Panic inside `complete`, standing in for an unexpected bug.
    Panic,
}

/// Scripted provider that counts its calls and remembers the history it saw.
pub struct MockProvider {
    name: String,
    model: String,
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_history: Mutex<Vec<Message>>,
}

impl MockProvider {
    pub fn new(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            model: format!("{}-model", name),
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
            last_history: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(name: &str, text: &str) -> Self {
        Self::new(name, MockBehavior::Reply(text.to_string()))
    }

    pub fn failing(name: &str) -> Self {
        Self::new(
            name,
            MockBehavior::Fail(ProviderError::NotConfigured(format!(
                "{} mock disabled",
                name
            ))),
        )
    }

    /// Sleep before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_history(&self) -> Vec<Message> {
        self.last_history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        history: &[Message],
        _system_instruction: &str,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_history.lock() {
            *last = history.to_vec();
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Reply(text) => Ok(Completion {
                text: text.clone(),
                provider: self.name.clone(),
                model: self.model.clone(),
            }),
            MockBehavior::Fail(err) => Err(err.clone()),
            MockBehavior::Panic => panic!("{} mock provider panicked", self.name),
        }
    }
}
