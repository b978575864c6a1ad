use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::async_socket::{AsyncReqSocket, AsyncSubSocket};
use crate::client::{reply_payload, NotificationCallback, RequestFailure};
use crate::config::ClientConfig;
use crate::message::Message;

struct ListenerTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cooperative (tokio) client for a framebus server.
///
/// The request path takes `&mut self`, so at most one request is in flight.
pub struct AsyncClient {
    config: ClientConfig,
    request: Option<AsyncReqSocket>,
    connected: bool,
    callback: Arc<Mutex<Option<NotificationCallback>>>,
    listener: Option<ListenerTask>,
}

impl AsyncClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            request: None,
            connected: false,
            callback: Arc::new(Mutex::new(None)),
            listener: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect the request socket. True when connected.
    pub async fn connect(&mut self) -> bool {
        if self.request.is_some() {
            return true;
        }
        match AsyncReqSocket::connect(&self.config.reply, &self.config.handshake).await {
            Ok(socket) => {
                self.request = Some(socket);
                self.connected = true;
                debug!(endpoint = %self.config.reply, "client connected");
                true
            }
            Err(err) => {
                warn!(endpoint = %self.config.reply, error = %err, "client connect failed");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Stop the listener and close every socket. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        self.stop_notification_listener().await;
        self.connected = false;
        if let Some(socket) = self.request.take() {
            socket.close();
            debug!(endpoint = %self.config.reply, "client disconnected");
        }
    }

    /// Send `message`; true iff an ok reply arrived within the timeout.
    pub async fn send_message(&mut self, message: &Message) -> bool {
        match self.roundtrip(message).await {
            Ok(reply) => reply.is_ok(),
            Err(failure) => {
                debug!(error = %failure, "send_message failed");
                false
            }
        }
    }

    /// Send `request` and return the reply's `response` payload.
    pub async fn send_request(&mut self, request: &Message) -> Result<Value, RequestFailure> {
        reply_payload(self.roundtrip(request).await?)
    }

    async fn roundtrip(&mut self, message: &Message) -> Result<Message, RequestFailure> {
        if !self.connected {
            return Err(RequestFailure::NotConnected);
        }
        if self.request.is_none() {
            self.request = self.reconnect().await;
        }
        let Some(socket) = self.request.as_mut() else {
            return Err(RequestFailure::Transport(
                "request socket unavailable".to_string(),
            ));
        };

        match socket.request(message, self.config.timeout).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if err.is_timeout() {
                    warn!(timeout = ?self.config.timeout, "request timed out, recreating socket");
                } else {
                    error!(error = %err, "request failed, recreating socket");
                }
                if let Some(stale) = self.request.take() {
                    stale.close();
                }
                self.request = self.reconnect().await;
                Err(err.into())
            }
        }
    }

    async fn reconnect(&self) -> Option<AsyncReqSocket> {
        match AsyncReqSocket::connect(&self.config.reply, &self.config.handshake).await {
            Ok(socket) => Some(socket),
            Err(err) => {
                warn!(endpoint = %self.config.reply, error = %err, "request socket reconnect failed");
                None
            }
        }
    }

    /// Replace the notification callback; takes effect for the next notification.
    pub fn set_notification_callback<F>(&self, callback: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let mut slot = self
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(callback));
    }

    /// Subscribe and spawn the listener task. False if subscribing failed.
    ///
    /// When this returns true the subscription is registered with the server.
    pub async fn start_notification_listener(&mut self) -> bool {
        if self
            .listener
            .as_ref()
            .is_some_and(|listener| !listener.handle.is_finished())
        {
            return true;
        }

        let mut socket =
            match AsyncSubSocket::connect(&self.config.publish, &self.config.handshake).await {
                Ok(socket) => socket,
                Err(err) => {
                    warn!(endpoint = %self.config.publish, error = %err, "subscribe failed");
                    return false;
                }
            };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let callback = Arc::clone(&self.callback);
        let poll = self.config.poll_interval;
        let handle = tokio::spawn(async move {
            while !cancelled.is_cancelled() {
                match socket.recv_timeout(poll).await {
                    Ok(Some(message)) => {
                        let current = callback
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .clone();
                        if let Some(callback) = current {
                            callback(message);
                        }
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        if !cancelled.is_cancelled() {
                            error!(error = %err, "notification listener stopped");
                        }
                        break;
                    }
                }
            }
            socket.close();
        });

        self.listener = Some(ListenerTask { token, handle });
        true
    }

    /// Stop the listener, aborting it after the shutdown grace period.
    pub async fn stop_notification_listener(&mut self) {
        let Some(ListenerTask { token, mut handle }) = self.listener.take() else {
            return;
        };
        token.cancel();

        match tokio::time::timeout(self.config.shutdown_grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_panic() => error!("notification listener panicked"),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(grace = ?self.config.shutdown_grace, "listener did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| !listener.handle.is_finished())
    }
}

impl Drop for AsyncClient {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.token.cancel();
            listener.handle.abort();
        }
    }
}
