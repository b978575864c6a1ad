use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use framebus_endpoint::{
    AsyncClient, Client, ClientConfig, Endpoint, HandlerError, Message, RequestFailure,
    RequestHandler, Server, ServerConfig,
};
use serde_json::{json, Value};
use tokio::runtime::Runtime;

fn loopback() -> ServerConfig {
    ServerConfig::new(Endpoint::tcp("127.0.0.1:0"), Endpoint::tcp("127.0.0.1:0"))
}

fn client_for(server: &Server) -> ClientConfig {
    ClientConfig::new(
        server.reply_endpoint().clone(),
        server.publish_endpoint().clone(),
    )
}

fn collector() -> (Arc<Mutex<Vec<Value>>>, impl Fn(Message) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = move |message: Message| {
        let index = message.get("index").cloned().unwrap_or(Value::Null);
        sink.lock().expect("collector lock").push(index);
    };
    (seen, callback)
}

fn wait_for(seen: &Mutex<Vec<Value>>, count: usize) -> Vec<Value> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let current = seen.lock().expect("collector lock").clone();
        if current.len() >= count || Instant::now() >= deadline {
            return current;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn frame_notification(index: i64) -> Message {
    Message::notification("NTF_FRAME").with("index", index)
}

fn stalling_callback(
    stall: Duration,
) -> (Arc<AtomicBool>, impl Fn(Message) + Send + Sync + 'static) {
    let entered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&entered);
    let callback = move |_message: Message| {
        flag.store(true, Ordering::SeqCst);
        thread::sleep(stall);
    };
    (entered, callback)
}

fn wait_until(flag: &AtomicBool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(flag.load(Ordering::SeqCst), "callback never ran");
}

#[test]
fn notifications_fan_out_in_order() {
    let runtime = Runtime::new().expect("runtime");
    let server = runtime
        .block_on(Server::bind(loopback(), None))
        .expect("bind server");

    // Nobody is subscribed yet: this one is lost for good.
    assert_eq!(server.notify(&frame_notification(-1)), 0);

    let first = Client::new(client_for(&server));
    let second = Client::new(client_for(&server));
    let (first_seen, first_callback) = collector();
    let (second_seen, second_callback) = collector();
    first.set_notification_callback(first_callback);
    second.set_notification_callback(second_callback);
    assert!(first.start_notification_listener());
    assert!(second.start_notification_listener());
    assert_eq!(server.subscriber_count(), 2);

    for index in 0..5 {
        assert_eq!(server.notify(&frame_notification(index)), 2);
    }

    let expected: Vec<Value> = (0..5).map(|index| json!(index)).collect();
    assert_eq!(wait_for(&first_seen, 5), expected);
    assert_eq!(wait_for(&second_seen, 5), expected);

    first.disconnect();
    second.disconnect();
    runtime.block_on(server.disconnect());
}

#[test]
fn stopped_listener_is_pruned() {
    let runtime = Runtime::new().expect("runtime");
    let server = runtime
        .block_on(Server::bind(loopback(), None))
        .expect("bind server");

    let client = Client::new(client_for(&server));
    let (seen, callback) = collector();
    client.set_notification_callback(callback);
    assert!(client.start_notification_listener());
    assert!(client.is_listening());
    assert_eq!(server.notify(&frame_notification(0)), 1);
    assert_eq!(wait_for(&seen, 1), vec![json!(0)]);

    client.stop_notification_listener();
    assert!(!client.is_listening());

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.subscriber_count() > 0 && Instant::now() < deadline {
        server.notify(&frame_notification(1));
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(server.subscriber_count(), 0);

    runtime.block_on(server.disconnect());
}

#[test]
fn server_shutdown_ends_listener() {
    let runtime = Runtime::new().expect("runtime");
    let server = runtime
        .block_on(Server::bind(loopback(), None))
        .expect("bind server");

    let client = Client::new(client_for(&server));
    let (seen, callback) = collector();
    client.set_notification_callback(callback);
    assert!(client.start_notification_listener());
    assert_eq!(server.notify(&frame_notification(0)), 1);
    assert_eq!(wait_for(&seen, 1), vec![json!(0)]);

    runtime.block_on(server.disconnect());
    assert_eq!(server.subscriber_count(), 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    while client.is_listening() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!client.is_listening());
    client.disconnect();
}

#[test]
fn stuck_callback_does_not_hold_up_stop() {
    let runtime = Runtime::new().expect("runtime");
    let server = runtime
        .block_on(Server::bind(loopback(), None))
        .expect("bind server");

    let config = client_for(&server);
    let budget = config.shutdown_grace + config.poll_interval;
    let client = Client::new(config);
    let (entered, callback) = stalling_callback(Duration::from_secs(4));
    client.set_notification_callback(callback);
    assert!(client.start_notification_listener());
    assert_eq!(server.notify(&frame_notification(0)), 1);
    wait_until(&entered);

    let started = Instant::now();
    client.stop_notification_listener();
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(900),
        "stopped before the grace period: {elapsed:?}"
    );
    assert!(
        elapsed < budget + Duration::from_millis(400),
        "stop took {elapsed:?}"
    );
    assert!(!client.is_listening());

    client.disconnect();
    runtime.block_on(server.disconnect());
}

#[test]
fn callback_can_be_replaced_while_listening() {
    let runtime = Runtime::new().expect("runtime");
    let server = runtime
        .block_on(Server::bind(loopback(), None))
        .expect("bind server");

    let client = Client::new(client_for(&server));
    let (before, first_callback) = collector();
    client.set_notification_callback(first_callback);
    assert!(client.start_notification_listener());
    server.notify(&frame_notification(0));
    assert_eq!(wait_for(&before, 1), vec![json!(0)]);

    let (after, second_callback) = collector();
    client.set_notification_callback(second_callback);
    server.notify(&frame_notification(1));
    assert_eq!(wait_for(&after, 1), vec![json!(1)]);
    assert_eq!(before.lock().expect("collector lock").len(), 1);

    client.disconnect();
    runtime.block_on(server.disconnect());
}

#[test]
fn publisher_handle_notifies_from_other_threads() {
    let runtime = Runtime::new().expect("runtime");
    let server = runtime
        .block_on(Server::bind(loopback(), None))
        .expect("bind server");

    let client = Client::new(client_for(&server));
    let (seen, callback) = collector();
    client.set_notification_callback(callback);
    assert!(client.start_notification_listener());

    let publisher = server.publisher();
    thread::spawn(move || {
        for index in 0..3 {
            publisher.notify(&frame_notification(index));
        }
    })
    .join()
    .expect("publisher thread");

    assert_eq!(wait_for(&seen, 3), vec![json!(0), json!(1), json!(2)]);

    client.disconnect();
    runtime.block_on(server.disconnect());
}

fn echo_handler() -> Arc<dyn RequestHandler> {
    Arc::new(|request: Message| -> Result<Message, HandlerError> {
        Ok(Message::ok(request.get("value").cloned().unwrap_or(json!(null))))
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_client_requests_and_listens() {
    let server = Server::bind(loopback(), Some(echo_handler()))
        .await
        .expect("bind server");
    let mut client = AsyncClient::new(client_for(&server));
    assert!(client.connect().await);

    assert_eq!(
        client
            .send_request(&Message::request("GENERAL").with("value", 7))
            .await,
        Ok(json!(7))
    );
    assert!(client.send_message(&Message::request("GENERAL")).await);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_notification_callback(move |message: Message| {
        let _ = tx.send(message);
    });
    assert!(client.start_notification_listener().await);
    assert_eq!(server.notify(&frame_notification(3)), 1);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification in time")
        .expect("notification");
    assert_eq!(received.get("index"), Some(&json!(3)));
    assert_eq!(received.get("type"), Some(&json!("NTF_FRAME")));

    client.disconnect().await;
    client.disconnect().await;
    assert!(!client.is_listening());
    server.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_client_recovers_after_timeout() {
    let slow = Arc::new(AtomicBool::new(true));
    let first = Arc::clone(&slow);
    let handler: Arc<dyn RequestHandler> =
        Arc::new(move |request: Message| -> Result<Message, HandlerError> {
            if first.swap(false, Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(2));
            }
            Ok(Message::ok(request.get("value").cloned().unwrap_or(json!(null))))
        });
    let server = Server::bind(loopback(), Some(handler))
        .await
        .expect("bind server");
    let mut client =
        AsyncClient::new(client_for(&server).with_timeout(Duration::from_millis(500)));
    assert!(client.connect().await);

    let started = Instant::now();
    assert_eq!(
        client
            .send_request(&Message::request("GENERAL").with("value", 1))
            .await,
        Err(RequestFailure::Timeout)
    );
    // The reply socket answers one request at a time, so nothing gets
    // through until the slow handler returns.
    tokio::time::sleep_until((started + Duration::from_millis(2100)).into()).await;
    assert_eq!(
        client
            .send_request(&Message::request("GENERAL").with("value", 2))
            .await,
        Ok(json!(2))
    );

    client.disconnect().await;
    server.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_listener_is_aborted_after_grace() {
    let server = Server::bind(loopback(), None)
        .await
        .expect("bind server");
    let config = client_for(&server);
    let grace = config.shutdown_grace;
    let mut client = AsyncClient::new(config);
    let (entered, callback) = stalling_callback(Duration::from_secs(3));
    client.set_notification_callback(callback);
    assert!(client.start_notification_listener().await);
    assert_eq!(server.notify(&frame_notification(0)), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !entered.load(Ordering::SeqCst) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(entered.load(Ordering::SeqCst), "callback never ran");

    let started = Instant::now();
    client.stop_notification_listener().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= grace - Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < grace + Duration::from_millis(500), "{elapsed:?}");
    assert!(!client.is_listening());

    server.disconnect().await;
}
