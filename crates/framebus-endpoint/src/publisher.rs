use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use framebus_frame::{Frame, FrameCodec};
use framebus_transport::{AsyncListener, AsyncStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec;
use crate::handshake::{nonblocking, HandshakeConfig, Pattern};
use crate::message::Message;

struct SubscriberSlot {
    id: u64,
    queue: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct Subscribers {
    slots: Mutex<Vec<SubscriberSlot>>,
    next_id: AtomicU64,
}

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Vec<SubscriberSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out handle for the publish socket.
///
/// Cheap to clone; every clone publishes to the same subscriber set.
#[derive(Clone, Default)]
pub struct Publisher {
    subscribers: Arc<Subscribers>,
}

impl Publisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue `message` for every attached subscriber without blocking.
    ///
    /// Returns how many subscribers accepted it. A subscriber whose queue is
    /// full misses this notification.
    pub fn notify(&self, message: &Message) -> usize {
        let payload = match codec::encode(message) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to encode notification");
                return 0;
            }
        };
        let frame = Frame::message(payload);

        let mut delivered = 0usize;
        self.subscribers
            .lock()
            .retain(|slot| match slot.queue.try_send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    error!(subscriber = slot.id, "subscriber queue full, notification dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = slot.id, "subscriber gone");
                    false
                }
            });
        delivered
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn register(&self, queue: mpsc::Sender<Frame>) -> u64 {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers.lock().push(SubscriberSlot { id, queue });
        id
    }

    fn unregister(&self, id: u64) {
        self.subscribers.lock().retain(|slot| slot.id != id);
    }

    pub(crate) fn clear(&self) {
        self.subscribers.lock().clear();
    }
}

/// Settings shared by every subscriber connection.
#[derive(Clone)]
pub(crate) struct PublishSettings {
    pub queue: usize,
    pub max_payload: usize,
    pub handshake: HandshakeConfig,
}

/// Accept subscribers until `token` is cancelled.
pub(crate) async fn run_publish_socket(
    listener: AsyncListener,
    publisher: Publisher,
    settings: PublishSettings,
    token: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    connections.spawn(serve_subscriber(
                        stream,
                        publisher.clone(),
                        settings.clone(),
                        token.clone(),
                    ));
                }
                Err(err) => warn!(error = %err, "publish socket accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    publisher.clear();
    // Subscribers see the cancelled token and close on their own; the grace
    // timeout in `Server::disconnect` bounds this.
    while connections.join_next().await.is_some() {}
    debug!(endpoint = %listener.local_endpoint(), "publish socket closed");
}

async fn serve_subscriber(
    stream: AsyncStream,
    publisher: Publisher,
    settings: PublishSettings,
    token: CancellationToken,
) {
    let mut framed = Framed::new(stream, FrameCodec::with_max_payload(settings.max_payload));
    if let Err(err) = nonblocking::read_greeting(&mut framed, Pattern::Pub, &settings.handshake).await
    {
        debug!(error = %err, "subscriber handshake failed");
        return;
    }
    let greeting = match nonblocking::greeting_frame(Pattern::Pub, &settings.handshake) {
        Ok(frame) => frame,
        Err(err) => {
            error!(error = %err, "failed to encode greeting");
            return;
        }
    };

    // The greeting goes out through the queue after registration, so a
    // subscriber that has read it is guaranteed to see every later notify.
    let (queue, mut outbound) = mpsc::channel(settings.queue.max(1) + 1);
    if queue.try_send(greeting).is_err() {
        return;
    }
    let id = publisher.register(queue);
    debug!(subscriber = id, "subscriber attached");

    let (mut sink, mut inbound) = framed.split();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = outbound.recv() => match next {
                Some(frame) => {
                    if let Err(err) = sink.send(frame).await {
                        debug!(subscriber = id, error = %err, "subscriber write failed");
                        break;
                    }
                }
                None => break,
            },
            incoming = inbound.next() => match incoming {
                Some(Ok(frame)) => {
                    debug!(subscriber = id, kind = frame.kind, "ignoring frame from subscriber");
                }
                Some(Err(err)) => {
                    debug!(subscriber = id, error = %err, "subscriber stream error");
                    break;
                }
                None => break,
            },
        }
    }

    publisher.unregister(id);
    match sink.reunite(inbound) {
        Ok(framed) => {
            if let Err(err) = framed.get_ref().set_zero_linger() {
                debug!(subscriber = id, error = %err, "failed to disable linger");
            }
        }
        Err(err) => debug!(subscriber = id, error = %err, "subscriber halves do not match"),
    }
    debug!(subscriber = id, "subscriber detached");
}
