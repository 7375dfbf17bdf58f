// implementation of trait ClientRegistryPort

use app_core::{ClientRegistryPort, CrError, CrEvent, CrEventStream, CrResult, CrTopic};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::Stream;
use futures_util::StreamExt;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Bounded per-room buffer. A subscriber that falls this far behind is
/// disconnected rather than blocking publishers; it resubscribes and
/// reconciles via a fetch.
const ROOM_BUFFER: usize = 128;

type CrRooms = Arc<DashMap<CrTopic, broadcast::Sender<CrEvent>>>;

/// RAII stream wrapper that can drop the underlying receiver and
/// remove an empty room when the stream goes out of scope.
struct CrSubscriptionStream {
    inner: CrEventStream,
    rooms: CrRooms,
    topic: CrTopic,
}

impl Stream for CrSubscriptionStream {
    type Item = CrEvent;
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for CrSubscriptionStream {
    fn drop(&mut self) {
        // Remove the room if no receivers remain (saves memory).
        if let Some(room) = self.rooms.get(&self.topic) {
            if room.receiver_count() == 0 {
                // release guard before remove
                drop(room);
                self.rooms.remove(&self.topic);
            }
        }
        // Dropping the stream drops the broadcast::Receiver
    }
}

/// In-memory implementation using DashMap + tokio::broadcast, one sender per
/// tenant-scoped room.
#[derive(Clone, Default)]
pub struct CrSingleInstance {
    // One broadcast sender per room (created on first subscribe).
    rooms: CrRooms,
}

impl CrSingleInstance {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// Create a room only when a client subscribes (avoid orphan rooms).
    fn ensure_room(&self, topic: &CrTopic) -> broadcast::Sender<CrEvent> {
        self.rooms
            .entry(topic.clone())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel::<CrEvent>(ROOM_BUFFER);
                tx
            })
            .clone()
    }

    /// For publishing: access an existing room without creating a new one.
    fn get_room(&self, topic: &CrTopic) -> Option<broadcast::Sender<CrEvent>> {
        self.rooms.get(topic).map(|g| g.clone())
    }
}

#[async_trait]
impl ClientRegistryPort for CrSingleInstance {
    async fn subscribe(&self, topic: CrTopic) -> CrResult<CrEventStream> {
        if topic.user_id() <= 0 {
            return Err(CrError::InvalidTopic(topic.room_name()));
        }
        debug!(room = %topic.room_name(), "client_subscribing");
        let tx = self.ensure_room(&topic);
        let rx = tx.subscribe();

        // Lagging receivers observe end-of-stream instead of stalling the
        // room: the first lag error terminates the stream.
        let base = BroadcastStream::new(rx)
            .take_while(|res| futures_util::future::ready(res.is_ok()))
            .filter_map(|res| async move { res.ok() });

        // Wrap to perform RAII cleanup when the stream is dropped.
        let wrapped = CrSubscriptionStream {
            inner: Box::pin(base),
            rooms: Arc::clone(&self.rooms),
            topic,
        };

        Ok(Box::pin(wrapped))
    }

    async fn publish(&self, topic: CrTopic, event: CrEvent) -> CrResult<()> {
        if let Some(tx) = self.get_room(&topic) {
            debug!(room = %topic.room_name(), "publishing_event");
            // best-effort fan-out
            let _ = tx.send(event);
        }
        // If there is no room, nobody is listening; intentionally do nothing.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use uuid::Uuid;

    fn topic(user: i64) -> CrTopic {
        CrTopic::Tournament {
            user_id: user,
            tournament_id: Uuid::new_v4(),
        }
    }

    fn event(tournament_id: Uuid) -> CrEvent {
        CrEvent::TournamentUpdated { tournament_id }
    }

    #[tokio::test]
    async fn given_subscriber_when_publish_then_event_is_delivered() {
        let registry = CrSingleInstance::new();
        let t = topic(1);
        let mut stream = registry.subscribe(t.clone()).await.unwrap();

        let id = Uuid::new_v4();
        registry.publish(t, event(id)).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("delivery within a second")
            .expect("stream open");
        assert_eq!(received, CrEvent::TournamentUpdated { tournament_id: id });
    }

    #[tokio::test]
    async fn given_no_subscriber_when_publish_then_no_room_is_created() {
        let registry = CrSingleInstance::new();
        registry
            .publish(topic(1), event(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(registry.rooms.is_empty());
    }

    #[tokio::test]
    async fn given_two_tenants_when_publish_then_rooms_are_isolated() {
        let registry = CrSingleInstance::new();
        let topic_a = topic(1);
        let topic_b = topic(2);
        let mut stream_a = registry.subscribe(topic_a.clone()).await.unwrap();
        let mut stream_b = registry.subscribe(topic_b.clone()).await.unwrap();

        let id = Uuid::new_v4();
        registry.publish(topic_a, event(id)).await.unwrap();

        let got_a = tokio::time::timeout(Duration::from_secs(1), stream_a.next())
            .await
            .expect("tenant 1 receives")
            .expect("stream open");
        assert_eq!(got_a, CrEvent::TournamentUpdated { tournament_id: id });

        // tenant 2 must see nothing
        let got_b = tokio::time::timeout(Duration::from_millis(100), stream_b.next()).await;
        assert!(got_b.is_err(), "no cross-tenant delivery");
    }

    #[tokio::test]
    async fn given_dropped_stream_when_last_receiver_gone_then_room_is_removed() {
        let registry = CrSingleInstance::new();
        let t = topic(1);
        let stream = registry.subscribe(t.clone()).await.unwrap();
        assert_eq!(registry.rooms.len(), 1);

        drop(stream);
        assert!(
            registry.rooms.is_empty(),
            "room removed once the last subscriber is gone"
        );
    }

    #[tokio::test]
    async fn given_invalid_tenant_when_subscribe_then_rejected() {
        let registry = CrSingleInstance::new();
        let err = registry.subscribe(topic(0)).await.err().expect("rejected");
        assert!(matches!(err, CrError::InvalidTopic(_)));
    }

    #[tokio::test]
    async fn given_lagging_subscriber_when_buffer_overflows_then_stream_ends() {
        let registry = CrSingleInstance::new();
        let t = topic(1);
        let mut stream = registry.subscribe(t.clone()).await.unwrap();

        // overflow the bounded room buffer without reading
        for _ in 0..(ROOM_BUFFER * 2) {
            registry
                .publish(t.clone(), event(Uuid::new_v4()))
                .await
                .unwrap();
        }

        // the subscriber reads what fits, then the stream terminates
        let mut received = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(100), stream.next()).await
        {
            received += 1;
        }
        assert!(received <= ROOM_BUFFER);
    }
}
