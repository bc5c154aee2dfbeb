use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const SUBSCRIBER_QUEUE: usize = 64;
const OUTBOUND_QUEUE: usize = 16;

/// Push-channel lifecycle. `Fallback` means the caller should lean on the
/// polling loop; this component never reconnects on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Disabled,
    Connecting,
    Connected,
    Fallback { reason: String },
}

impl ChannelStatus {
    pub fn label(&self) -> &str {
        match self {
            ChannelStatus::Disabled => "polling",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "live",
            ChannelStatus::Fallback { .. } => "polling",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelStatus::Connected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Json(Value),
    Raw(String),
}

impl RealtimeEvent {
    pub fn kind(&self) -> &str {
        match self {
            RealtimeEvent::Json(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("event"),
            RealtimeEvent::Raw(_) => "message",
        }
    }
}

fn classify_frame(text: &str) -> RealtimeEvent {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => RealtimeEvent::Json(value),
        Err(_) => RealtimeEvent::Raw(text.to_string()),
    }
}

/// Handle for one event subscriber. Dropping it (or calling `cancel`)
/// detaches the subscriber; the channel prunes it on the next fanout.
pub struct Subscription {
    rx: mpsc::Receiver<RealtimeEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// WebSocket event channel with watchable status. One connection at most;
/// a closed or failed connection parks in `Fallback` until the caller calls
/// `connect` again.
pub struct RealtimeChannel {
    ws_url: String,
    status_tx: watch::Sender<ChannelStatus>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<RealtimeEvent>>>>,
    outbound: Arc<Mutex<Option<mpsc::Sender<Value>>>>,
}

impl RealtimeChannel {
    pub fn new(ws_url: impl Into<String>) -> Self {
        let ws_url = ws_url.into();
        let initial = if ws_url.is_empty() {
            ChannelStatus::Disabled
        } else {
            ChannelStatus::Fallback {
                reason: "not started".to_string(),
            }
        };
        let (status_tx, _) = watch::channel(initial);
        Self {
            ws_url,
            status_tx,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            outbound: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> ChannelStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push(tx);
        Subscription { rx }
    }

    /// Queues a JSON frame for the socket. Returns false when not connected.
    pub fn send_json(&self, value: Value) -> bool {
        let outbound = self.outbound.lock().expect("outbound slot poisoned");
        match outbound.as_ref() {
            Some(tx) => tx.try_send(value).is_ok(),
            None => false,
        }
    }

    /// Attempts one connection. Unconfigured stays `Disabled` forever; any
    /// failure or close lands in `Fallback` and is not retried here.
    pub fn connect(&self) {
        if self.ws_url.is_empty() {
            self.status_tx.send_replace(ChannelStatus::Disabled);
            debug!("realtime disabled: no websocket url configured");
            return;
        }

        let url = match url::Url::parse(&self.ws_url) {
            Ok(url) => url,
            Err(err) => {
                warn!(url = %self.ws_url, error = %err, "invalid websocket url");
                self.status_tx.send_replace(ChannelStatus::Fallback {
                    reason: format!("invalid url: {err}"),
                });
                return;
            }
        };

        let status_tx = self.status_tx.clone();
        let subscribers = Arc::clone(&self.subscribers);
        let outbound_slot = Arc::clone(&self.outbound);

        tokio::spawn(async move {
            status_tx.send_replace(ChannelStatus::Connecting);

            let (stream, _) = match connect_async(url.as_str()).await {
                Ok(connected) => connected,
                Err(err) => {
                    warn!(error = %err, "websocket connect failed");
                    status_tx.send_replace(ChannelStatus::Fallback {
                        reason: err.to_string(),
                    });
                    return;
                }
            };
            info!(url = %url, "websocket connected");
            status_tx.send_replace(ChannelStatus::Connected);

            let (out_tx, mut out_rx) = mpsc::channel(OUTBOUND_QUEUE);
            *outbound_slot.lock().expect("outbound slot poisoned") = Some(out_tx);

            let (mut sink, mut source) = stream.split();
            let reason = loop {
                tokio::select! {
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            fanout(&subscribers, classify_frame(&text));
                        }
                        Some(Ok(Message::Close(_))) | None => break "closed".to_string(),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break err.to_string(),
                    },
                    queued = out_rx.recv() => {
                        let Some(value) = queued else { break "closed".to_string() };
                        if sink.send(Message::Text(value.to_string())).await.is_err() {
                            break "send failed".to_string();
                        }
                    }
                }
            };

            *outbound_slot.lock().expect("outbound slot poisoned") = None;
            warn!(%reason, "websocket down, polling continues");
            status_tx.send_replace(ChannelStatus::Fallback { reason });
        });
    }
}

fn fanout(subscribers: &Mutex<Vec<mpsc::Sender<RealtimeEvent>>>, event: RealtimeEvent) {
    let mut subscribers = subscribers.lock().expect("subscriber list poisoned");
    subscribers.retain(|tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

/// Fixed-interval tick source. Runs regardless of channel state as the
/// resilience fallback; dropping the handle stops it.
pub struct Poller {
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(period: Duration) -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });
        (Self { handle }, rx)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn unconfigured_channel_stays_disabled() {
        let channel = RealtimeChannel::new("");
        assert_eq!(channel.current_status(), ChannelStatus::Disabled);
        channel.connect();
        assert_eq!(channel.current_status(), ChannelStatus::Disabled);
        assert!(!channel.send_json(serde_json::json!({"type": "ping"})));
    }

    #[tokio::test]
    async fn invalid_url_falls_back_while_polling_continues() {
        let channel = RealtimeChannel::new("not a url");
        channel.connect();
        assert!(matches!(
            channel.current_status(),
            ChannelStatus::Fallback { .. }
        ));

        // The safety-net poller is independent of channel state.
        let (_poller, mut ticks) = Poller::spawn(Duration::from_millis(5));
        assert!(timeout(Duration::from_secs(1), ticks.recv())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let channel = RealtimeChannel::new("ws://127.0.0.1:9/events");
        let mut status = channel.status();
        channel.connect();
        let settled = timeout(
            Duration::from_secs(5),
            status.wait_for(|value| matches!(value, ChannelStatus::Fallback { .. })),
        )
        .await;
        assert!(settled.is_ok());
        assert!(!channel.send_json(serde_json::json!({"type": "ping"})));
    }

    #[test]
    fn frames_classify_as_json_or_raw() {
        let event = classify_frame(r#"{"type":"run.updated","runId":"run-1"}"#);
        assert_eq!(event.kind(), "run.updated");
        match classify_frame("plain text") {
            RealtimeEvent::Raw(text) => assert_eq!(text, "plain text"),
            other => panic!("expected raw event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fanout_prunes_cancelled_subscriptions() {
        let channel = RealtimeChannel::new("ws://example.invalid/events");
        let mut keep = channel.subscribe();
        let cancelled = channel.subscribe();
        cancelled.cancel();

        fanout(
            &channel.subscribers,
            RealtimeEvent::Raw("hello".to_string()),
        );
        assert_eq!(
            keep.recv().await,
            Some(RealtimeEvent::Raw("hello".to_string()))
        );
        assert_eq!(
            channel
                .subscribers
                .lock()
                .expect("subscriber list poisoned")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn poller_ticks_until_dropped() {
        let (poller, mut ticks) = Poller::spawn(Duration::from_millis(5));
        assert!(timeout(Duration::from_secs(1), ticks.recv())
            .await
            .unwrap()
            .is_some());
        assert!(timeout(Duration::from_secs(1), ticks.recv())
            .await
            .unwrap()
            .is_some());
        drop(poller);
        // Receiver drains whatever was queued, then sees the closed channel.
        let drained = timeout(Duration::from_secs(1), async {
            while ticks.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }
}
