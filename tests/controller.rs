//! Capture controller tests against a scripted capture backend.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pushsniff::capture::{CaptureBackend, PacketIter, PacketSource};
use pushsniff::{CaptureController, CaptureError, Extractor, PacketObservation};

const CONNECT_PAYLOAD: &[u8] = b"\x02\0\0\0\x07connect\0\x03app\0\x04live\0tcUrl\0rtmp://push.example.com/live\0\0\t";
const PUBLISH_PAYLOAD: &[u8] = b"\x02\0\0\0\tFCPublish\0@\0\0\0\0\x05\x02\0\x20stream-42?token=abcXYZ-1&sig=99C\0";

/// What a scripted interface delivers next.
enum Frame {
    Payload(Vec<u8>),
    Fail,
}

/// Backend whose interfaces are fed from test channels.
#[derive(Default)]
struct ScriptedBackend {
    feeds: Mutex<HashMap<String, Receiver<Frame>>>,
}

impl ScriptedBackend {
    /// Register an interface and return the sender feeding it.
    fn feed(&self, interface: &str) -> Sender<Frame> {
        let (tx, rx) = mpsc::channel();
        self.feeds.lock().unwrap().insert(interface.to_string(), rx);
        tx
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, CaptureError> {
        let rx = self
            .feeds
            .lock()
            .unwrap()
            .remove(interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?;

        Ok(Box::new(ScriptedSource {
            name: interface.to_string(),
            rx: Some(rx),
        }))
    }
}

struct ScriptedSource {
    name: String,
    rx: Option<Receiver<Frame>>,
}

impl PacketSource for ScriptedSource {
    fn capture_tcp_payloads(&mut self, running: Arc<AtomicBool>) -> Result<PacketIter<'_>, CaptureError> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| CaptureError::ChannelCreation("already captured".to_string()))?;

        Ok(Box::new(std::iter::from_fn(move || loop {
            if !running.load(Ordering::SeqCst) {
                return None;
            }
            match rx.recv_timeout(Duration::from_millis(5)) {
                Ok(Frame::Payload(payload)) => return Some(Ok(observation(payload))),
                Ok(Frame::Fail) => {
                    return Some(Err(CaptureError::Receive(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "adapter removed",
                    ))))
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        })))
    }

    fn interface_name(&self) -> &str {
        &self.name
    }
}

fn observation(payload: Vec<u8>) -> PacketObservation {
    let src: SocketAddr = "192.168.1.10:51000".parse().unwrap();
    let dst: SocketAddr = "203.0.113.5:1935".parse().unwrap();
    PacketObservation::new(src, dst, payload)
}

fn payload(bytes: &[u8]) -> Frame {
    Frame::Payload(bytes.to_vec())
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

type Calls = Arc<Mutex<Vec<(String, String)>>>;

fn controller_with_recorder(backend: Arc<ScriptedBackend>) -> (CaptureController, Calls) {
    let controller = CaptureController::new(backend, Extractor::rtmp().unwrap())
        .with_stop_timeout(Duration::from_millis(500));
    let calls: Calls = Arc::default();
    let recorded = Arc::clone(&calls);
    controller.add_callback(move |server, key| {
        recorded
            .lock()
            .unwrap()
            .push((server.to_string(), key.to_string()));
        Ok(())
    });
    (controller, calls)
}

#[test]
fn test_end_to_end_single_interface() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    assert!(controller.is_active());

    feed.send(payload(CONNECT_PAYLOAD)).unwrap();
    wait_until("server address", || controller.server_address().is_some());

    assert_eq!(
        controller.server_address().as_deref(),
        Some("rtmp://push.example.com/live")
    );
    assert_eq!(controller.stream_key(), None);
    assert!(calls.lock().unwrap().is_empty());
    assert!(controller.is_active());

    feed.send(payload(PUBLISH_PAYLOAD)).unwrap();
    wait_until("session end", || !controller.is_active());

    assert_eq!(
        controller.stream_key().as_deref(),
        Some("stream-42?token=abcXYZ-1&sig=99")
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(
            "rtmp://push.example.com/live".to_string(),
            "stream-42?token=abcXYZ-1&sig=99".to_string()
        )]
    );
}

#[test]
fn test_first_match_wins() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, _calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://a1.example.com/live\0")).unwrap();
    feed.send(payload(b"connect\0rtmp://a2.example.com/live\0")).unwrap();
    feed.send(payload(b"unrelated traffic")).unwrap();
    feed.send(payload(b"FCPublish\0stream-1?k=v\0")).unwrap();
    wait_until("session end", || !controller.is_active());

    assert_eq!(
        controller.server_address().as_deref(),
        Some("rtmp://a1.example.com/live")
    );
}

#[test]
fn test_stream_key_only_leaves_server_unset() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    feed.send(payload(b"FCPublish\0stream-123?key=abcC\0rtmp://host/app"))
        .unwrap();
    wait_until("stream key", || controller.stream_key().is_some());

    assert_eq!(controller.stream_key().as_deref(), Some("stream-123?key=abc"));
    assert_eq!(controller.server_address(), None);
    assert!(calls.lock().unwrap().is_empty());
    assert!(controller.is_active());

    controller.stop();
    assert!(!controller.is_active());
}

#[test]
fn test_undecodable_bytes_do_not_block_extraction() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, _calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    let mut bytes = vec![0xff, 0xfe, 0x80];
    bytes.extend_from_slice(b"connect\0rtmp://host/app\0\xc3\x28");
    feed.send(Frame::Payload(bytes)).unwrap();
    wait_until("server address", || controller.server_address().is_some());

    assert_eq!(controller.server_address().as_deref(), Some("rtmp://host/app"));
    controller.stop();
}

#[test]
fn test_callbacks_invoked_once_across_interfaces() {
    const LOOPS: usize = 4;

    let backend = Arc::new(ScriptedBackend::default());
    let names: Vec<String> = (0..LOOPS).map(|i| format!("sim{}", i)).collect();
    let feeds: Vec<_> = names.iter().map(|name| backend.feed(name)).collect();
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start_multi(names.as_slice());
    assert_eq!(controller.current_session().unwrap().interfaces(), names.as_slice());

    let barrier = Arc::new(Barrier::new(LOOPS));
    let senders: Vec<_> = feeds
        .into_iter()
        .enumerate()
        .map(|(i, feed)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let both = format!(
                    "connect\0rtmp://host{}.example.com/live\0FCPublish\0stream-{}?k=v\0",
                    i, i
                );
                let _ = feed.send(Frame::Payload(both.into_bytes()));
                feed
            })
        })
        .collect();
    let _feeds: Vec<_> = senders.into_iter().map(|h| h.join().unwrap()).collect();

    wait_until("session end", || !controller.is_active());
    thread::sleep(Duration::from_millis(50));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (server, key) = &calls[0];
    // Whichever loop won, the pair comes from the same payload
    let winner = server
        .trim_start_matches("rtmp://host")
        .trim_end_matches(".example.com/live");
    assert_eq!(key, &format!("stream-{}?k=v", winner));
}

#[test]
fn test_callback_errors_are_isolated() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let controller = CaptureController::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>, Extractor::rtmp().unwrap());

    let order = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&order);
    controller.add_callback(move |_, _| {
        first.lock().unwrap().push("failing");
        anyhow::bail!("clipboard unavailable")
    });
    let second = Arc::clone(&order);
    controller.add_callback(move |_, _| {
        second.lock().unwrap().push("panicking");
        panic!("callback bug");
    });
    let third = Arc::clone(&order);
    controller.add_callback(move |_, _| {
        third.lock().unwrap().push("ok");
        Ok(())
    });

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://host/app\0FCPublish\0stream-5?a=b\0"))
        .unwrap();
    wait_until("session end", || !controller.is_active());

    assert_eq!(*order.lock().unwrap(), vec!["failing", "panicking", "ok"]);
    assert!(controller.result().is_some());
}

#[test]
fn test_stop_when_inactive_is_noop() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.stop();
    assert!(!controller.is_active());

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://host/app\0FCPublish\0stream-5?a=b\0"))
        .unwrap();
    wait_until("session end", || !controller.is_active());

    controller.stop();
    controller.stop();

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(controller.server_address().as_deref(), Some("rtmp://host/app"));
}

#[test]
fn test_start_while_active_keeps_discovered_values() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, _calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://host/app\0")).unwrap();
    wait_until("server address", || controller.server_address().is_some());

    // Would fail to open if a second session were created
    controller.start("eth-sim");

    assert!(controller.is_active());
    assert_eq!(controller.server_address().as_deref(), Some("rtmp://host/app"));
    controller.stop();
}

#[test]
fn test_restart_clears_previous_values() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://first/app\0FCPublish\0stream-1?a=b\0"))
        .unwrap();
    wait_until("first session end", || !controller.is_active());

    let feed = backend.feed("eth-sim");
    controller.start("eth-sim");
    assert_eq!(controller.server_address(), None);
    assert_eq!(controller.stream_key(), None);

    feed.send(payload(b"connect\0rtmp://second/app\0FCPublish\0stream-2?a=b\0"))
        .unwrap();
    wait_until("second session end", || !controller.is_active());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, "rtmp://second/app");
}

#[test]
fn test_start_with_blank_names_clears_previous_values() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://first/app\0FCPublish\0stream-1?a=b\0"))
        .unwrap();
    wait_until("session end", || !controller.is_active());

    controller.start_multi(&["", "  "]);

    assert!(!controller.is_active());
    assert_eq!(controller.server_address(), None);
    assert_eq!(controller.stream_key(), None);
    assert_eq!(controller.result(), None);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn test_missing_interface_only_aborts_its_loop() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start_multi(&["missing0", "eth-sim"]);
    let session = controller.current_session().unwrap();
    wait_until("missing loop exit", || session.live_loops() == 1);
    assert!(controller.is_active());

    feed.send(payload(b"connect\0rtmp://host/app\0FCPublish\0stream-5?a=b\0"))
        .unwrap();
    wait_until("session end", || !controller.is_active());

    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn test_all_interfaces_missing_ends_session() {
    let backend = Arc::new(ScriptedBackend::default());
    let (controller, _calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("missing0");
    wait_until("session end", || !controller.is_active());

    // The caller may retry
    let _feed = backend.feed("missing0");
    controller.start("missing0");
    assert!(controller.is_active());
    controller.stop();
}

#[test]
fn test_receive_failure_ends_loop() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let (controller, calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://host/app\0")).unwrap();
    feed.send(Frame::Fail).unwrap();
    wait_until("session end", || !controller.is_active());

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(controller.server_address().as_deref(), Some("rtmp://host/app"));
}

#[test]
fn test_stop_from_callback() {
    let backend = Arc::new(ScriptedBackend::default());
    let feed = backend.feed("eth-sim");
    let controller = Arc::new(CaptureController::new(
        Arc::clone(&backend) as Arc<dyn CaptureBackend>,
        Extractor::rtmp().unwrap(),
    ));

    let stopped = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&controller);
    let counter = Arc::clone(&stopped);
    controller.add_callback(move |_, _| {
        if let Some(controller) = weak.upgrade() {
            assert_eq!(controller.server_address().as_deref(), Some("rtmp://host/app"));
            controller.stop();
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    controller.start("eth-sim");
    feed.send(payload(b"connect\0rtmp://host/app\0FCPublish\0stream-5?a=b\0"))
        .unwrap();
    wait_until("session end", || !controller.is_active());

    assert_eq!(stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_waits_for_loop_exit() {
    let backend = Arc::new(ScriptedBackend::default());
    let _feed = backend.feed("eth-sim");
    let (controller, _calls) = controller_with_recorder(Arc::clone(&backend));

    controller.start("eth-sim");
    let session = controller.current_session().unwrap();

    controller.stop();

    assert!(!controller.is_active());
    assert_eq!(session.live_loops(), 0);
}
