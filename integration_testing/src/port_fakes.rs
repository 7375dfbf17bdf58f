//! Port fakes for tests that assert on side effects rather than delivery.

use app_core::{ClientRegistryPort, CrError, CrEvent, CrEventStream, CrResult, CrTopic};
use async_trait::async_trait;
use std::sync::Mutex;

/// Recording client registry: keeps every published (room, event) pair and
/// never delivers anything. Subscriptions yield a stream that stays open and
/// silent.
#[derive(Default)]
pub struct CrRecorder {
    published: Mutex<Vec<(CrTopic, CrEvent)>>,
}

impl CrRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(CrTopic, CrEvent)> {
        self.published.lock().expect("recorder lock").clone()
    }

    pub fn events(&self) -> Vec<CrEvent> {
        self.published().into_iter().map(|(_, e)| e).collect()
    }

    /// Events published to rooms of another tenant than `user_id`.
    pub fn foreign_events(&self, user_id: i64) -> Vec<(CrTopic, CrEvent)> {
        self.published()
            .into_iter()
            .filter(|(topic, _)| topic.user_id() != user_id)
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().expect("recorder lock").clear();
    }
}

#[async_trait]
impl ClientRegistryPort for CrRecorder {
    async fn subscribe(&self, _topic: CrTopic) -> CrResult<CrEventStream> {
        Ok(Box::pin(futures_util::stream::pending()))
    }

    async fn publish(&self, topic: CrTopic, event: CrEvent) -> CrResult<()> {
        self.published
            .lock()
            .map_err(|_| CrError::Other(anyhow::anyhow!("recorder poisoned")))?
            .push((topic, event));
        Ok(())
    }
}
