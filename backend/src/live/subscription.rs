use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use common::req::RealtimeSnapshot;
use futures_util::Stream;
use tokio::sync::mpsc;

use super::LiveHub;

/// A live view on one tank. Dropping it removes it from the hub.
pub struct Subscription {
    tank_code: String,
    id: u64,
    rx: mpsc::Receiver<RealtimeSnapshot>,
    hub: Weak<LiveHub>,
}

impl Subscription {
    pub(super) fn new(
        tank_code: String,
        id: u64,
        rx: mpsc::Receiver<RealtimeSnapshot>,
        hub: Weak<LiveHub>,
    ) -> Self {
        Self {
            tank_code,
            id,
            rx,
            hub,
        }
    }

    /// Waits for the next snapshot. `None` once the tank has been removed or the
    /// subscriber was dropped for stalling.
    pub async fn recv(&mut self) -> Option<RealtimeSnapshot> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RealtimeSnapshot> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = RealtimeSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.tank_code, self.id);
        }
    }
}
