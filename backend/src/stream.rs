//! Server-sent events for a tank's live view.

use std::time::Duration;

use actix_web::web::Bytes;
use common::req::RealtimeSnapshot;
use futures_util::{future, stream, Stream, StreamExt};
use tokio::time::{interval_at, Instant};

use crate::live::Subscription;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// First event of every stream, `None` while the tank has not reported yet.
    Snapshot(Option<RealtimeSnapshot>),
    Message(RealtimeSnapshot),
    KeepAlive,
}

impl LiveEvent {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            LiveEvent::Snapshot(snapshot) => frame("snapshot", snapshot.as_ref()),
            LiveEvent::Message(snapshot) => frame("message", Some(snapshot)),
            LiveEvent::KeepAlive => Bytes::from_static(b": keep-alive\n\n"),
        }
    }
}

fn frame(event: &str, snapshot: Option<&RealtimeSnapshot>) -> Bytes {
    let data = serde_json::to_string(&snapshot).unwrap_or_else(|_| "null".to_string());
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// Current snapshot, then every update, with keep-alive comments in between.
///
/// Ends when the tank is removed. When the client goes away the body is dropped
/// and the subscription with it.
pub fn events(
    current: Option<RealtimeSnapshot>,
    subscription: Subscription,
    heartbeat: Duration,
) -> impl Stream<Item = LiveEvent> {
    let ticker = interval_at(Instant::now() + heartbeat, heartbeat);

    let updates = stream::unfold((subscription, ticker), |(mut sub, mut ticker)| async move {
        tokio::select! {
            next = sub.next() => next.map(|s| (LiveEvent::Message(s), (sub, ticker))),
            _ = ticker.tick() => Some((LiveEvent::KeepAlive, (sub, ticker))),
        }
    });

    stream::once(future::ready(LiveEvent::Snapshot(current))).chain(updates)
}

pub fn body(
    current: Option<RealtimeSnapshot>,
    subscription: Subscription,
    heartbeat: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    events(current, subscription, heartbeat)
        .map(|event| Ok::<_, actix_web::Error>(event.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveHub;
    use chrono::{TimeZone, Utc};
    use common::req::TankStatus;

    fn snapshot(distance_cm: f64) -> RealtimeSnapshot {
        RealtimeSnapshot {
            tank_code: "T1".to_string(),
            distance_cm,
            fill_height_cm: 10.0 - distance_cm,
            water_level_percent: 100.0,
            status: TankStatus::Good,
            status_text: TankStatus::Good.text().to_string(),
            updated_at: Utc.timestamp_millis_opt(0).unwrap(),
        }
    }

    #[test]
    fn frames_follow_sse_format() {
        assert_eq!(
            LiveEvent::Snapshot(None).to_bytes(),
            Bytes::from_static(b"event: snapshot\ndata: null\n\n")
        );

        let text = LiveEvent::Message(snapshot(8.0)).to_bytes();
        let text = std::str::from_utf8(&text).unwrap();
        assert!(text.starts_with("event: message\ndata: {"));
        assert!(text.ends_with("}\n\n"));
        assert!(text.contains("\"tankCode\":\"T1\""));
        assert!(text.contains("\"status\":\"GOOD\""));
    }

    #[tokio::test]
    async fn stream_starts_with_snapshot_then_messages() {
        let hub = LiveHub::new();
        hub.register("T1");
        hub.put(snapshot(1.0));
        let (current, sub) = hub.subscribe("T1").unwrap();
        let mut events = Box::pin(events(current, sub, Duration::from_secs(3600)));

        assert_eq!(
            events.next().await,
            Some(LiveEvent::Snapshot(Some(snapshot(1.0))))
        );
        hub.put(snapshot(2.0));
        assert_eq!(events.next().await, Some(LiveEvent::Message(snapshot(2.0))));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_sends_keep_alive() {
        let hub = LiveHub::new();
        hub.register("T1");
        let (current, sub) = hub.subscribe("T1").unwrap();
        let mut events = Box::pin(events(current, sub, Duration::from_secs(15)));

        assert_eq!(events.next().await, Some(LiveEvent::Snapshot(None)));
        assert_eq!(events.next().await, Some(LiveEvent::KeepAlive));
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let hub = LiveHub::new();
        hub.register("T1");
        let (current, sub) = hub.subscribe("T1").unwrap();
        let events = events(current, sub, Duration::from_secs(15));
        assert_eq!(hub.subscriber_count("T1"), 1);

        drop(events);
        assert_eq!(hub.subscriber_count("T1"), 0);
    }

    #[tokio::test]
    async fn stream_ends_when_tank_is_removed() {
        let hub = LiveHub::new();
        hub.register("T1");
        let (current, sub) = hub.subscribe("T1").unwrap();
        let mut events = Box::pin(events(current, sub, Duration::from_secs(3600)));
        assert_eq!(events.next().await, Some(LiveEvent::Snapshot(None)));

        hub.remove("T1");
        assert_eq!(events.next().await, None);
    }
}
