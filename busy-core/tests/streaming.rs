//! End-to-end orchestrator tests against in-memory devices.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

use busy_core::mirror::rle_encode;
use busy_core::{
    BusyError, CanonicalFrame, ConnectionKind, Connector, Device, DeviceSnapshot, DisplaySpec,
    FRONT_DISPLAY, FrameStream, InputKey, KeyMap, Orchestrator, PeriodicJob, Renderer,
    SessionOptions, SessionState, StreamMessage,
};

// ── Fakes ────────────────────────────────────────────────────────

#[derive(Default)]
struct Log {
    connects: AtomicUsize,
    polls: AtomicUsize,
    streams: Mutex<Vec<u8>>,
    keys: Mutex<Vec<InputKey>>,
    snapshots: AtomicUsize,
    clears: AtomicUsize,
}

struct FakeDevice {
    connection: ConnectionKind,
    log: Arc<Log>,
    /// Messages delivered before the stream stays open forever.
    messages: Mutex<Option<Vec<Result<StreamMessage, BusyError>>>>,
    /// Stream ends after `messages` instead of staying open.
    close_after: bool,
    /// Poll results, in order; the last one repeats.
    polls: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    /// How long a snapshot takes.
    snapshot_delay: Duration,
}

#[async_trait]
impl Device for FakeDevice {
    fn connection(&self) -> ConnectionKind {
        self.connection
    }

    fn base_url(&self) -> &str {
        "http://fake-bar"
    }

    async fn send_input_key(&self, key: InputKey) -> Result<(), BusyError> {
        self.log.keys.lock().unwrap().push(key);
        Ok(())
    }

    async fn get_screen_frame(&self, _display: &DisplaySpec) -> Result<Vec<u8>, BusyError> {
        self.log.polls.fetch_add(1, Ordering::SeqCst);
        let mut polls = self.polls.lock().unwrap();
        let next = if polls.len() > 1 {
            polls.pop_front()
        } else {
            polls.front().cloned()
        };
        match next {
            Some(Ok(data)) => Ok(data),
            Some(Err(msg)) => Err(BusyError::Other(msg)),
            None => Err(BusyError::Other("no frame".into())),
        }
    }

    async fn stream_screen(&self, display: &DisplaySpec) -> Result<FrameStream, BusyError> {
        self.log.streams.lock().unwrap().push(display.index);
        let messages = self.messages.lock().unwrap().take().unwrap_or_default();
        let head = stream::iter(messages);
        if self.close_after {
            Ok(Box::pin(head))
        } else {
            Ok(Box::pin(futures::StreamExt::chain(head, stream::pending())))
        }
    }

    async fn snapshot(&self) -> Result<DeviceSnapshot, BusyError> {
        self.log.snapshots.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.snapshot_delay).await;
        Ok(DeviceSnapshot {
            name: Some("desk".into()),
            battery_charge: Some(55),
            ..Default::default()
        })
    }

    async fn clear_display(&self) -> Result<(), BusyError> {
        self.log.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn account_state(&self) -> Result<Option<String>, BusyError> {
        Ok(Some("connected".into()))
    }
}

/// Hands out a fresh device per session, built by `make`.
struct FakeConnector {
    log: Arc<Log>,
    make: Box<dyn Fn(Arc<Log>) -> FakeDevice + Send + Sync>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn Device>, BusyError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new((self.make)(self.log.clone())))
    }
}

#[derive(Default)]
struct FakeRenderer {
    frames: Mutex<Vec<CanonicalFrame>>,
    statuses: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
    links: Mutex<Vec<String>>,
    command_lines: Mutex<Vec<Option<(String, usize)>>>,
    help_toggles: AtomicUsize,
}

impl FakeRenderer {
    fn has_status(&self, wanted: impl Fn(&str) -> bool) -> bool {
        self.statuses.lock().unwrap().iter().any(|s| wanted(s))
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, frame: &CanonicalFrame) {
        self.frames.lock().unwrap().push(frame.clone());
    }

    fn update_status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }

    fn toggle_help(&self) {
        self.help_toggles.fetch_add(1, Ordering::SeqCst);
    }

    fn update_info(&self, text: &str) {
        self.infos.lock().unwrap().push(text.to_string());
    }

    fn update_link(&self, state: &str) {
        self.links.lock().unwrap().push(state.to_string());
    }

    fn update_command_line(&self, text: Option<&str>, cursor: usize) {
        self.command_lines
            .lock()
            .unwrap()
            .push(text.map(|t| (t.to_string(), cursor)));
    }
}

// ── Helpers ──────────────────────────────────────────────────────

const CTRL_Q: &[u8] = &[0x11];

fn device(connection: ConnectionKind, log: Arc<Log>) -> FakeDevice {
    FakeDevice {
        connection,
        log,
        messages: Mutex::new(None),
        close_after: false,
        polls: Mutex::new(VecDeque::new()),
        snapshot_delay: Duration::ZERO,
    }
}

fn setup(
    options: SessionOptions,
    make: impl Fn(Arc<Log>) -> FakeDevice + Send + Sync + 'static,
) -> (Orchestrator, Arc<Log>, Arc<FakeRenderer>) {
    let log = Arc::new(Log::default());
    let connector = FakeConnector {
        log: log.clone(),
        make: Box::new(make),
    };
    let renderer = Arc::new(FakeRenderer::default());
    let orchestrator = Orchestrator::new(
        Arc::new(connector),
        renderer.clone(),
        KeyMap::default_map(),
        options,
    );
    (orchestrator, log, renderer)
}

fn polling(interval_ms: u64) -> SessionOptions {
    SessionOptions {
        poll_interval: Some(Duration::from_millis(interval_ms)),
        ..Default::default()
    }
}

async fn wait_until(cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(3), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Run the orchestrator next to a driver future, with a global deadline.
async fn drive<F>(
    orchestrator: &Orchestrator,
    keys: &mut mpsc::Receiver<Vec<u8>>,
    driver: F,
) -> Result<(), BusyError>
where
    F: Future<Output = ()>,
{
    let (result, ()) = timeout(Duration::from_secs(5), async {
        tokio::join!(orchestrator.run(keys), driver)
    })
    .await
    .expect("orchestrator did not finish");
    result
}

// ── Tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn polled_zero_front_frame_renders_blank() {
    let (orchestrator, log, renderer) = setup(polling(10), |log| {
        let d = device(ConnectionKind::Local, log);
        d.polls.lock().unwrap().push_back(Ok(vec![0u8; 3456]));
        d
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        wait_until(|| !renderer.frames.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    let frames = renderer.frames.lock().unwrap();
    assert!(frames[0].is_blank());
    assert_eq!(frames[0].spec(), &FRONT_DISPLAY);
    assert_eq!(frames[0].len(), 3456);
    assert!(log.streams.lock().unwrap().is_empty());
    assert_eq!(orchestrator.state(), SessionState::Stopped);
}

#[tokio::test]
async fn websocket_ignores_text_frames() {
    let mut raw = vec![0u8; 3456];
    raw[..3].copy_from_slice(&[255, 0, 0]);
    let encoded = rle_encode(&raw, 3).unwrap();

    let (orchestrator, _log, renderer) = setup(SessionOptions::default(), move |log| {
        let d = device(ConnectionKind::Local, log);
        *d.messages.lock().unwrap() = Some(vec![
            Ok(StreamMessage::Text("hello".into())),
            Ok(StreamMessage::Binary(encoded.clone())),
        ]);
        d
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        wait_until(|| !renderer.frames.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    let frames = renderer.frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pixel(0, 0), [255, 0, 0]);
    let statuses = renderer.statuses.lock().unwrap();
    assert!(statuses.iter().any(|s| s == "First frame received; streaming started"));
}

#[tokio::test]
async fn websocket_error_surfaces() {
    let (orchestrator, _log, _renderer) = setup(SessionOptions::default(), |log| {
        let d = device(ConnectionKind::Local, log);
        *d.messages.lock().unwrap() = Some(vec![Err(BusyError::Other("socket reset".into()))]);
        d
    });
    let (_tx, mut rx) = mpsc::channel::<Vec<u8>>(8);

    let result = drive(&orchestrator, &mut rx, async {}).await;

    assert!(matches!(result, Err(BusyError::Other(msg)) if msg == "socket reset"));
    assert_eq!(orchestrator.state(), SessionState::Stopped);
}

#[tokio::test]
async fn closed_stream_stops_without_error() {
    let (orchestrator, log, _renderer) = setup(SessionOptions::default(), |log| {
        let mut d = device(ConnectionKind::Local, log);
        d.close_after = true;
        d
    });
    let (_tx, mut rx) = mpsc::channel::<Vec<u8>>(8);

    let result = drive(&orchestrator, &mut rx, async {}).await;

    assert_ok!(result);
    assert_eq!(log.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tab_restarts_on_back_display() {
    let (orchestrator, log, _renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let mut states = orchestrator.subscribe();
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        wait_until(|| log.streams.lock().unwrap().len() == 1).await;
        tx.send(b"\t".to_vec()).await.unwrap();
        wait_until(|| log.streams.lock().unwrap().len() == 2).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(*log.streams.lock().unwrap(), [0, 1]);
    assert_eq!(log.connects.load(Ordering::SeqCst), 2);
    assert!(log.keys.lock().unwrap().is_empty());
    assert_eq!(*states.borrow_and_update(), SessionState::Stopped);
}

#[tokio::test]
async fn poll_failures_are_retried() {
    let (orchestrator, log, renderer) = setup(polling(5), |log| {
        let d = device(ConnectionKind::Network, log);
        let mut polls = d.polls.lock().unwrap();
        polls.push_back(Err("timeout".into()));
        polls.push_back(Err("timeout".into()));
        polls.push_back(Ok(vec![0u8; 3456]));
        drop(polls);
        d
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        wait_until(|| !renderer.frames.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert!(log.polls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn cloud_never_opens_websocket() {
    let (orchestrator, log, renderer) = setup(SessionOptions::default(), |log| {
        let d = device(ConnectionKind::Cloud, log);
        d.polls.lock().unwrap().push_back(Ok(vec![0u8; 3456]));
        d
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        wait_until(|| !renderer.frames.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert!(log.streams.lock().unwrap().is_empty());
    assert!(renderer.statuses.lock().unwrap().iter().any(|s| s == "Starting HTTP polling"));
}

#[tokio::test]
async fn mapped_keys_are_forwarded() {
    let (orchestrator, log, renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b"\x1b".to_vec()).await.unwrap();
        tx.send(b"[A".to_vec()).await.unwrap();
        tx.send(b"h".to_vec()).await.unwrap();
        tx.send(b"zz".to_vec()).await.unwrap();
        wait_until(|| !log.keys.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(*log.keys.lock().unwrap(), [InputKey::Up]);
    assert_eq!(renderer.help_toggles.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lone_escape_resolves_after_timeout() {
    let (orchestrator, log, _renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b"\x1b".to_vec()).await.unwrap();
        wait_until(|| !log.keys.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(*log.keys.lock().unwrap(), [InputKey::Back]);
}

#[tokio::test]
async fn command_line_runs_off_the_frame_path() {
    let (orchestrator, log, renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b":key down\r".to_vec()).await.unwrap();
        tx.send(b":".to_vec()).await.unwrap();
        tx.send(b"reboot\r".to_vec()).await.unwrap();
        wait_until(|| {
            renderer
                .statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "command: Unknown command: reboot")
        })
        .await;
        wait_until(|| !renderer.infos.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(*log.keys.lock().unwrap(), [InputKey::Down]);
    assert!(renderer.statuses.lock().unwrap().iter().any(|s| s == "sent key down"));
    assert_eq!(renderer.infos.lock().unwrap()[0], "desk | bat 55%");
}

#[tokio::test]
async fn closed_input_quits() {
    let (orchestrator, _log, _renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(8);
    drop(tx);

    let result = drive(&orchestrator, &mut rx, async {}).await;

    assert_ok!(result);
    assert_eq!(orchestrator.state(), SessionState::Stopped);
}

#[tokio::test]
async fn keys_after_a_command_in_the_same_chunk_are_forwarded() {
    let (orchestrator, log, renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b":display\r\x1b[A".to_vec()).await.unwrap();
        wait_until(|| !log.keys.lock().unwrap().is_empty()).await;
        wait_until(|| renderer.has_status(|s| s.starts_with("front (72x16)"))).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(*log.keys.lock().unwrap(), [InputKey::Up]);
}

#[tokio::test]
async fn slow_refresh_does_not_delay_commands() {
    let options = SessionOptions {
        periodic: vec![(PeriodicJob::Dashboard, Duration::from_millis(10))],
        ..Default::default()
    };
    let (orchestrator, log, renderer) = setup(options, |log| FakeDevice {
        snapshot_delay: Duration::from_millis(50),
        ..device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        // Let many ticks pass while each snapshot takes five of them.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let sent = Instant::now();
        tx.send(b":display\r".to_vec()).await.unwrap();
        wait_until(|| renderer.has_status(|s| s.starts_with("front (72x16)"))).await;
        assert!(sent.elapsed() < Duration::from_millis(500), "{:?}", sent.elapsed());
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert!(log.snapshots.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn quit_command_stops_the_run() {
    let (orchestrator, log, _renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b":quit\r".to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(orchestrator.state(), SessionState::Stopped);
    assert_eq!(log.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clear_command_reaches_the_device() {
    let (orchestrator, log, renderer) = setup(SessionOptions::default(), |log| {
        device(ConnectionKind::Local, log)
    });
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b":clear\r".to_vec()).await.unwrap();
        wait_until(|| renderer.has_status(|s| s == "display cleared")).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(log.clears.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn link_check_reports_account_state() {
    let options = SessionOptions {
        periodic: vec![(PeriodicJob::LinkCheck, Duration::from_millis(20))],
        ..Default::default()
    };
    let (orchestrator, log, renderer) = setup(options, |log| device(ConnectionKind::Local, log));
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        wait_until(|| !renderer.links.lock().unwrap().is_empty()).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(renderer.links.lock().unwrap()[0], "connected");
    assert_eq!(log.snapshots.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn history_recalls_and_persists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.log");
    let options = SessionOptions {
        history_file: Some(path.clone()),
        ..Default::default()
    };
    let (orchestrator, log, renderer) = setup(options, |log| device(ConnectionKind::Local, log));
    let (tx, mut rx) = mpsc::channel(8);

    let result = drive(&orchestrator, &mut rx, async {
        tx.send(b":key ok\r".to_vec()).await.unwrap();
        wait_until(|| log.keys.lock().unwrap().len() == 1).await;
        tx.send(b":".to_vec()).await.unwrap();
        tx.send(b"\x1b[A".to_vec()).await.unwrap();
        tx.send(b"\r".to_vec()).await.unwrap();
        wait_until(|| log.keys.lock().unwrap().len() == 2).await;
        tx.send(CTRL_Q.to_vec()).await.unwrap();
    })
    .await;

    assert_ok!(result);
    assert_eq!(*log.keys.lock().unwrap(), [InputKey::Ok, InputKey::Ok]);
    let lines = renderer.command_lines.lock().unwrap();
    assert!(lines.contains(&Some(("key ok".to_string(), 6))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "key ok\nkey ok\n");
}
