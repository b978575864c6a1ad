use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framebus_frame::{kind_name, Frame, FrameCodec, MESSAGE};
use framebus_transport::{AsyncListener, AsyncStream, Endpoint};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::handler::{panic_text, RequestHandler};
use crate::handshake::{nonblocking, HandshakeConfig, Pattern};
use crate::message::{Message, HANDLER_NOT_DEFINED};
use crate::publisher::{run_publish_socket, PublishSettings, Publisher};

#[cfg(feature = "schema")]
type SchemaHandle = Option<Arc<framebus_schema::SchemaRegistry>>;
#[cfg(not(feature = "schema"))]
type SchemaHandle = ();

/// Shared state of the reply path.
struct ReplyPath {
    handler: Option<Arc<dyn RequestHandler>>,
    // Held from request decode until the reply is written: one request at a
    // time across all connections.
    turn: tokio::sync::Mutex<()>,
    error_backoff: Duration,
    max_payload: usize,
    handshake: HandshakeConfig,
    #[cfg_attr(not(feature = "schema"), allow(dead_code))]
    schemas: SchemaHandle,
}

enum Outcome {
    Replied(Message),
    Failed(Message),
}

impl ReplyPath {
    async fn respond(&self, frame: &Frame) -> Outcome {
        if frame.kind != MESSAGE {
            warn!(kind = kind_name(frame.kind), "non-message frame on reply socket");
            return Outcome::Replied(Message::invalid_format());
        }

        let request = match codec::try_decode(&frame.payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "undecodable request");
                return Outcome::Replied(Message::invalid_format());
            }
        };

        #[cfg(feature = "schema")]
        {
            if let Some(registry) = &self.schemas {
                if let Err(err) = registry.validate(&request.to_value()) {
                    warn!(error = %err, "request rejected by schema");
                    let err = crate::error::EndpointError::from(err);
                    return Outcome::Replied(Message::error(err.to_string()));
                }
            }
        }

        let Some(handler) = self.handler.clone() else {
            debug!("no request handler installed");
            return Outcome::Replied(Message::error(HANDLER_NOT_DEFINED));
        };

        let request_type = request.message_type();
        match tokio::task::spawn_blocking(move || handler.handle(request)).await {
            Ok(Ok(reply)) => Outcome::Replied(reply),
            Ok(Err(err)) => {
                error!(error = %err, request_type = ?request_type, "request handler failed");
                Outcome::Failed(Message::error(err.to_string()))
            }
            Err(join) if join.is_panic() => {
                let text = panic_text(join.into_panic().as_ref());
                error!(error = %text, request_type = ?request_type, "request handler panicked");
                Outcome::Failed(Message::error(text))
            }
            Err(join) => {
                error!(error = %join, "request handler task cancelled");
                Outcome::Failed(Message::error(join.to_string()))
            }
        }
    }
}

/// A bound framebus server: one reply socket and one publish socket.
///
/// Dropping the server without calling [`disconnect`](Self::disconnect)
/// aborts its tasks.
pub struct Server {
    reply_endpoint: Endpoint,
    publish_endpoint: Endpoint,
    publisher: Publisher,
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    running: AtomicBool,
    shutdown_grace: Duration,
}

impl Server {
    /// Bind both sockets and start serving. Must run inside a tokio runtime.
    ///
    /// Without a handler every request is answered with
    /// `{"status":"error","message":"Handler is not defined"}`.
    pub async fn bind(config: ServerConfig, handler: Option<Arc<dyn RequestHandler>>) -> Result<Self> {
        Self::bind_inner(config, handler, SchemaHandle::default()).await
    }

    /// Bind with a schema registry; schema-invalid requests never reach the handler.
    #[cfg(feature = "schema")]
    pub async fn bind_with_schemas(
        config: ServerConfig,
        handler: Option<Arc<dyn RequestHandler>>,
        schemas: Arc<framebus_schema::SchemaRegistry>,
    ) -> Result<Self> {
        Self::bind_inner(config, handler, Some(schemas)).await
    }

    async fn bind_inner(
        config: ServerConfig,
        handler: Option<Arc<dyn RequestHandler>>,
        schemas: SchemaHandle,
    ) -> Result<Self> {
        let reply_listener = AsyncListener::bind(&config.reply)?;
        let publish_listener = AsyncListener::bind(&config.publish)?;
        let reply_endpoint = reply_listener.local_endpoint().clone();
        let publish_endpoint = publish_listener.local_endpoint().clone();

        let path = Arc::new(ReplyPath {
            handler,
            turn: tokio::sync::Mutex::new(()),
            error_backoff: config.error_backoff,
            max_payload: config.max_payload,
            handshake: config.handshake.clone(),
            schemas,
        });
        let publisher = Publisher::new();
        let settings = PublishSettings {
            queue: config.subscriber_queue,
            max_payload: config.max_payload,
            handshake: config.handshake,
        };

        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(run_reply_socket(reply_listener, path, token.clone()));
        tasks.spawn(run_publish_socket(
            publish_listener,
            publisher.clone(),
            settings,
            token.clone(),
        ));

        info!(reply = %reply_endpoint, publish = %publish_endpoint, "server bound");
        Ok(Self {
            reply_endpoint,
            publish_endpoint,
            publisher,
            token,
            tasks: Mutex::new(tasks),
            running: AtomicBool::new(true),
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Resolved reply endpoint (real port when bound to `:0`).
    pub fn reply_endpoint(&self) -> &Endpoint {
        &self.reply_endpoint
    }

    /// Resolved publish endpoint.
    pub fn publish_endpoint(&self) -> &Endpoint {
        &self.publish_endpoint
    }

    /// Publish to every attached subscriber; never blocks.
    pub fn notify(&self, message: &Message) -> usize {
        self.publisher.notify(message)
    }

    /// A publishing handle usable from other tasks or threads.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop serving and close both sockets. Later calls are no-ops.
    ///
    /// Tasks get the configured grace period to finish their current reply
    /// and are aborted after it.
    pub async fn disconnect(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.token.cancel();

        let mut tasks = self.take_tasks();
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(grace = ?self.shutdown_grace, "server tasks still running, aborting");
            tasks.shutdown().await;
        }
        info!(reply = %self.reply_endpoint, publish = %self.publish_endpoint, "server disconnected");
    }
}

impl Server {
    fn take_tasks(&self) -> JoinSet<()> {
        let mut guard = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_reply_socket(listener: AsyncListener, path: Arc<ReplyPath>, token: CancellationToken) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    connections.spawn(serve_requester(stream, Arc::clone(&path), token.clone()));
                }
                Err(err) => warn!(error = %err, "reply socket accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    // Let an in-flight reply finish; the grace timeout in `disconnect` bounds this.
    while connections.join_next().await.is_some() {}
    debug!(endpoint = %listener.local_endpoint(), "reply socket closed");
}

async fn serve_requester(stream: AsyncStream, path: Arc<ReplyPath>, token: CancellationToken) {
    let mut framed = Framed::new(stream, FrameCodec::with_max_payload(path.max_payload));
    if let Err(err) = nonblocking::handshake_accept(&mut framed, Pattern::Rep, &path.handshake).await
    {
        debug!(error = %err, "requester handshake failed");
        return;
    }
    debug!("requester attached");

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = framed.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                debug!(error = %err, "requester stream error");
                break;
            }
            None => break,
        };

        let turn = tokio::select! {
            _ = token.cancelled() => break,
            turn = path.turn.lock() => turn,
        };

        let (reply, failed) = match path.respond(&frame).await {
            Outcome::Replied(reply) => (reply, false),
            Outcome::Failed(reply) => (reply, true),
        };
        let payload = match codec::encode(&reply) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to encode reply");
                break;
            }
        };
        if let Err(err) = framed.send(Frame::message(payload)).await {
            debug!(error = %err, "reply write failed");
            break;
        }
        if failed {
            tokio::time::sleep(path.error_backoff).await;
        }
        drop(turn);
    }

    if let Err(err) = framed.get_ref().set_zero_linger() {
        debug!(error = %err, "failed to disable linger");
    }
    debug!("requester detached");
}
