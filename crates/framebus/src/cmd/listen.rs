use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use framebus_endpoint::{Client, ClientConfig, Endpoint, Message};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{transport_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_value, OutputFormat};

const WAKE_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let publish: Endpoint = args
        .publish_endpoint
        .parse()
        .map_err(|err| transport_error("invalid publish endpoint", err))?;

    let client = Client::new(ClientConfig {
        publish: publish.clone(),
        ..ClientConfig::default()
    });
    let (tx, rx) = mpsc::channel::<Message>();
    client.set_notification_callback(move |message| {
        let _ = tx.send(message);
    });
    if !client.start_notification_listener() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("could not subscribe to {publish}"),
        ));
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    install_ctrlc_handler(move || flag.store(false, Ordering::SeqCst))?;

    let mut printed = 0usize;
    let mut result = Ok(SUCCESS);
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(WAKE_INTERVAL) {
            Ok(message) => {
                print_value(&message.to_value(), format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !client.is_listening() {
                    result = Err(CliError::new(TRANSPORT_ERROR, "subscription closed by server"));
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    client.disconnect();
    result
}
