use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use framebus_transport::IpcStream;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::EndpointError;
use crate::message::Message;
use crate::socket::{ReqSocket, SubSocket};

/// Callback invoked with every received notification.
pub type NotificationCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Why `send_request` produced no payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestFailure {
    /// The client is not connected.
    #[error("client is not connected")]
    NotConnected,
    /// No reply arrived within the request timeout.
    #[error("no reply within the request timeout")]
    Timeout,
    /// Socket, framing or serialization failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The server answered with a non-ok status.
    #[error("request rejected: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { message: Option<String> },
}

impl From<EndpointError> for RequestFailure {
    fn from(err: EndpointError) -> Self {
        if err.is_timeout() {
            RequestFailure::Timeout
        } else {
            RequestFailure::Transport(err.to_string())
        }
    }
}

/// Payload of an ok reply, or why there is none.
pub(crate) fn reply_payload(reply: Message) -> Result<Value, RequestFailure> {
    if reply.is_ok() {
        Ok(reply.response().cloned().unwrap_or(Value::Null))
    } else {
        Err(RequestFailure::Rejected {
            message: reply.error_message().map(str::to_string),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct ListenerThread {
    running: Arc<AtomicBool>,
    shutdown: Option<IpcStream>,
    handle: JoinHandle<()>,
}

/// Blocking client for a framebus server.
///
/// `Send + Sync`: requests from several threads are serialized, and the
/// notification listener runs on its own thread.
pub struct Client {
    config: ClientConfig,
    request: Mutex<Option<ReqSocket>>,
    connected: AtomicBool,
    callback: Arc<Mutex<Option<NotificationCallback>>>,
    listener: Mutex<Option<ListenerThread>>,
}

impl Client {
    /// A client for `config`; nothing is connected until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            request: Mutex::new(None),
            connected: AtomicBool::new(false),
            callback: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect the request socket. True when connected.
    pub fn connect(&self) -> bool {
        let mut request = lock(&self.request);
        if request.is_some() {
            return true;
        }
        match ReqSocket::connect(&self.config.reply, &self.config.handshake) {
            Ok(socket) => {
                *request = Some(socket);
                self.connected.store(true, Ordering::SeqCst);
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
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop the listener and close every socket. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.stop_notification_listener();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(socket) = lock(&self.request).take() {
            socket.close();
            debug!(endpoint = %self.config.reply, "client disconnected");
        }
    }

    /// Send `message`; true iff an ok reply arrived within the timeout.
    pub fn send_message(&self, message: &Message) -> bool {
        match self.roundtrip(message) {
            Ok(reply) => reply.is_ok(),
            Err(failure) => {
                debug!(error = %failure, "send_message failed");
                false
            }
        }
    }

    /// Send `request` and return the reply's `response` payload.
    ///
    /// An ok reply without `response` yields `Value::Null`.
    pub fn send_request(&self, request: &Message) -> Result<Value, RequestFailure> {
        reply_payload(self.roundtrip(request)?)
    }

    fn roundtrip(&self, message: &Message) -> Result<Message, RequestFailure> {
        if !self.is_connected() {
            return Err(RequestFailure::NotConnected);
        }

        let mut slot = lock(&self.request);
        if slot.is_none() {
            *slot = self.reconnect();
        }
        let Some(socket) = slot.as_mut() else {
            return Err(RequestFailure::Transport(
                "request socket unavailable".to_string(),
            ));
        };

        match socket.request(message, self.config.timeout) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if err.is_timeout() {
                    warn!(timeout = ?self.config.timeout, "request timed out, recreating socket");
                } else {
                    error!(error = %err, "request failed, recreating socket");
                }
                if let Some(stale) = slot.take() {
                    stale.close();
                }
                *slot = self.reconnect();
                Err(err.into())
            }
        }
    }

    fn reconnect(&self) -> Option<ReqSocket> {
        match ReqSocket::connect(&self.config.reply, &self.config.handshake) {
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
        *lock(&self.callback) = Some(Arc::new(callback));
    }

    /// Subscribe and start the listener thread. False if it could not start.
    ///
    /// When this returns true the subscription is registered with the server.
    pub fn start_notification_listener(&self) -> bool {
        let mut listener = lock(&self.listener);
        if listener.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return true;
        }

        let mut socket = match SubSocket::connect(
            &self.config.publish,
            self.config.poll_interval,
            &self.config.handshake,
        ) {
            Ok(socket) => socket,
            Err(err) => {
                warn!(endpoint = %self.config.publish, error = %err, "subscribe failed");
                return false;
            }
        };
        let shutdown = match socket.shutdown_handle() {
            Ok(handle) => Some(handle),
            Err(err) => {
                debug!(error = %err, "no shutdown handle for listener");
                None
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let callback = Arc::clone(&self.callback);
        let spawned = thread::Builder::new()
            .name("framebus-listener".to_string())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    match socket.recv() {
                        Ok(Some(message)) => {
                            let current = lock(&callback).clone();
                            if let Some(callback) = current {
                                callback(message);
                            }
                        }
                        Ok(None) => continue,
                        Err(err) => {
                            if flag.load(Ordering::SeqCst) {
                                error!(error = %err, "notification listener stopped");
                            }
                            break;
                        }
                    }
                }
                socket.close();
            });

        match spawned {
            Ok(handle) => {
                *listener = Some(ListenerThread {
                    running,
                    shutdown,
                    handle,
                });
                true
            }
            Err(err) => {
                error!(error = %err, "failed to spawn listener thread");
                false
            }
        }
    }

    /// Stop the listener, forcing it out after the shutdown grace period.
    ///
    /// Returns within the grace plus one poll interval. A thread still busy
    /// in the callback by then is detached and exits once the callback
    /// returns.
    pub fn stop_notification_listener(&self) {
        let Some(listener) = lock(&self.listener).take() else {
            return;
        };
        listener.running.store(false, Ordering::SeqCst);

        if !wait_finished(&listener.handle, self.config.shutdown_grace) {
            warn!(grace = ?self.config.shutdown_grace, "listener did not stop in time, forcing shutdown");
            if let Some(stream) = &listener.shutdown {
                if let Err(err) = stream.shutdown() {
                    debug!(error = %err, "listener socket shutdown failed");
                }
            }
            if !wait_finished(&listener.handle, self.config.poll_interval) {
                warn!("listener thread still busy in callback, detaching it");
                return;
            }
        }

        if listener.handle.join().is_err() {
            error!("notification listener panicked");
        }
    }

    /// True while the listener thread runs.
    pub fn is_listening(&self) -> bool {
        lock(&self.listener)
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }
}

fn wait_finished(handle: &JoinHandle<()>, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ok_reply_yields_response() {
        let reply = Message::ok(json!(7));
        assert_eq!(reply_payload(reply), Ok(json!(7)));
    }

    #[test]
    fn ok_reply_without_response_is_null() {
        let reply = Message::status_only(crate::message::Status::Ok);
        assert_eq!(reply_payload(reply), Ok(Value::Null));
    }

    #[test]
    fn error_reply_is_rejected() {
        let reply = Message::error("Handler is not defined");
        assert_eq!(
            reply_payload(reply),
            Err(RequestFailure::Rejected {
                message: Some("Handler is not defined".to_string())
            })
        );
    }

    #[test]
    fn timeouts_map_to_timeout_failure() {
        let failure = RequestFailure::from(EndpointError::Timeout(Duration::from_millis(5)));
        assert_eq!(failure, RequestFailure::Timeout);
        let failure = RequestFailure::from(EndpointError::Disconnected);
        assert!(matches!(failure, RequestFailure::Transport(_)));
    }

    #[test]
    fn unconnected_client_fails_fast() {
        let client = Client::new(ClientConfig::default());
        assert!(!client.is_connected());
        assert!(!client.send_message(&Message::request("GENERAL")));
        assert_eq!(
            client.send_request(&Message::request("GENERAL")),
            Err(RequestFailure::NotConnected)
        );
        client.disconnect();
        client.disconnect();
    }

    #[test]
    fn client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Client>();
    }
}
