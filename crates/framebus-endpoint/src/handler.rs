use crate::message::Message;

/// Error type a request handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Turns one request into its reply.
///
/// Runs on a blocking worker; a returned error or a panic becomes a
/// status-error reply carrying the error text.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Message) -> Result<Message, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(Message) -> Result<Message, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, request: Message) -> Result<Message, HandlerError> {
        self(request)
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "request handler panicked".to_string()
    }
}
