//! Stream orchestrator.
//!
//! Per session, four units run concurrently on the caller's task under one
//! [`CancellationToken`]:
//!
//! 1. transport loop: WebSocket receive/decode/render, or HTTP
//!    poll/decode/render/sleep
//! 2. key loop: stdin chunks → key decoder → device
//! 3. periodic loop: one ticker per [`PeriodicJob`], each enqueueing
//!    [`QueuedCommand::Refresh`] unless that job is already queued
//! 4. command queue: runs `:` lines and periodic jobs off the frame path
//!
//! Every unit re-checks the token at each suspension point. A session ends
//! when any unit cancels the token; all four are joined before the next
//! session starts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::Connector;
use crate::display::{DisplaySpec, FRONT_DISPLAY};
use crate::error::BusyError;
use crate::input::{
    COMMAND_PREFIX, CommandEdit, CommandLine, DecodedKey, History, KeyDecoder, KeyEvent, KeyMap,
    is_switch_chord,
};
use crate::mirror::decoder::FrameDecoder;
use crate::mirror::transport::{TransportKind, select_transport};
use crate::mirror::types::StreamMessage;
use crate::session::commands::{CommandContext, CommandOutcome, CommandRegistry, QueuedCommand};
use crate::session::periodic::{PendingJobs, PeriodicJob};
use crate::session::{Renderer, SessionEnd, SessionState, StreamSession};

// ── SessionOptions ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Display of the first session.
    pub display: &'static DisplaySpec,
    /// User-requested poll interval; `None` means WebSocket when allowed.
    pub poll_interval: Option<Duration>,
    /// Background jobs and their periods. A zero period disables the job.
    pub periodic: Vec<(PeriodicJob, Duration)>,
    /// Bounded wait for the next stdin chunk.
    pub key_timeout: Duration,
    /// Forward mapped keys to the device.
    pub send_input: bool,
    /// Where `:` command history is kept; `None` keeps it in memory only.
    pub history_file: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            display: &FRONT_DISPLAY,
            poll_interval: None,
            periodic: PeriodicJob::defaults(),
            key_timeout: Duration::from_millis(100),
            send_input: true,
            history_file: None,
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    renderer: Arc<dyn Renderer>,
    keymap: KeyMap,
    commands: CommandRegistry,
    options: SessionOptions,
    shutdown: CancellationToken,
    state_tx: watch::Sender<SessionState>,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        renderer: Arc<dyn Renderer>,
        keymap: KeyMap,
        options: SessionOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            connector,
            renderer,
            keymap,
            commands: CommandRegistry::default(),
            options,
            shutdown: CancellationToken::new(),
            state_tx,
        }
    }

    /// Replace the `:` command registry.
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Token that stops the orchestrator from outside. Every session token
    /// is a child of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn set_state(&self, state: SessionState) {
        debug!("session state -> {state}");
        self.state_tx.send_replace(state);
    }

    fn status(&self, text: &str) {
        info!("{text}");
        self.renderer.update_status(text);
    }

    /// Run sessions until the user quits, the stream closes, or the
    /// transport fails.
    ///
    /// `keys` carries raw stdin chunks. A closed channel counts as quit.
    pub async fn run(&self, keys: &mut mpsc::Receiver<Vec<u8>>) -> Result<(), BusyError> {
        let mut spec = self.options.display;
        let mut key_decoder = KeyDecoder::new(self.keymap.clone());
        let mut command_line = match &self.options.history_file {
            Some(path) => CommandLine::with_history(History::load(path, History::DEFAULT_MAX)),
            None => CommandLine::new(),
        };
        self.status("Initializing remote stream");

        let result = loop {
            self.set_state(SessionState::Connecting);
            let device = match self.connector.connect().await {
                Ok(device) => device,
                Err(e) => break Err(e),
            };
            self.status(&format!("Connecting to bar at {}", device.base_url()));

            let transport = select_transport(device.connection(), self.options.poll_interval);
            info!("session on {spec} using {transport}");
            let session =
                StreamSession::new(spec, transport, self.shutdown.child_token(), device);

            match self
                .run_session(&session, keys, &mut key_decoder, &mut command_line)
                .await
            {
                Ok(SessionEnd::Switch) => {
                    self.set_state(SessionState::Switching);
                    spec = spec.other();
                    drop(session);
                    info!("switching to {spec}");
                }
                Ok(end) => {
                    info!("session ended: {end:?}");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.set_state(SessionState::Stopped);
        result
    }

    /// Run the four units of one session and join them.
    async fn run_session(
        &self,
        session: &StreamSession,
        keys: &mut mpsc::Receiver<Vec<u8>>,
        key_decoder: &mut KeyDecoder,
        command_line: &mut CommandLine,
    ) -> Result<SessionEnd, BusyError> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let pending = PendingJobs::default();

        let (transport_end, key_end, (), command_end) = tokio::join!(
            self.transport_loop(session),
            self.key_loop(session, keys, key_decoder, command_line, queue_tx.clone()),
            self.periodic_loop(session, queue_tx, &pending),
            self.command_queue(session, queue_rx, &pending),
        );

        // Key loop first, then the command queue, then the transport.
        match (transport_end?, key_end.or(command_end)) {
            (_, Some(end)) => Ok(end),
            (Some(end), None) => Ok(end),
            (None, None) => Ok(SessionEnd::Quit),
        }
    }

    // ── Transport ────────────────────────────────────────────────

    async fn transport_loop(
        &self,
        session: &StreamSession,
    ) -> Result<Option<SessionEnd>, BusyError> {
        let result = match session.transport() {
            TransportKind::WebSocket => self.websocket_loop(session).await,
            TransportKind::HttpPoll { interval } => {
                self.poll_loop(session, interval).await;
                Ok(None)
            }
        };
        if result.is_err() {
            session.cancel();
        }
        result
    }

    async fn websocket_loop(
        &self,
        session: &StreamSession,
    ) -> Result<Option<SessionEnd>, BusyError> {
        let cancel = session.cancel_token();
        let mut decoder = FrameDecoder::new(session.spec());

        self.status("Opening WebSocket stream");
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            stream = session.device().stream_screen(session.spec()) => stream?,
        };
        self.set_state(SessionState::Streaming);
        self.status("Waiting for the first frame");

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                message = stream.next() => message,
            };

            match message {
                Some(Ok(StreamMessage::Binary(data))) => {
                    if let Some(frame) = decoder.decode(&data, true) {
                        if decoder.decoded() == 1 {
                            self.status("First frame received; streaming started");
                        }
                        self.renderer.render(&frame);
                    }
                }
                Some(Ok(StreamMessage::Text(text))) => {
                    debug!("ignoring text frame: {text}");
                }
                Some(Err(e)) => {
                    warn!("websocket stream failed: {e}");
                    return Err(e);
                }
                None => {
                    info!("device closed the screen stream");
                    session.cancel();
                    return Ok(Some(SessionEnd::StreamClosed));
                }
            }
        }
    }

    /// Poll forever; failures are logged and retried after `interval`.
    async fn poll_loop(&self, session: &StreamSession, interval: Duration) {
        let cancel = session.cancel_token();
        let mut decoder = FrameDecoder::new(session.spec());

        self.status("Starting HTTP polling");
        self.set_state(SessionState::Polling);

        while !cancel.is_cancelled() {
            let polled = tokio::select! {
                _ = cancel.cancelled() => return,
                polled = session.device().get_screen_frame(session.spec()) => polled,
            };

            match polled {
                Ok(data) => {
                    if let Some(frame) = decoder.decode(&data, false) {
                        if decoder.decoded() == 1 {
                            self.status("First frame received; streaming started");
                        }
                        self.renderer.render(&frame);
                    }
                }
                Err(e) => warn!("screen poll failed, retrying in {interval:?}: {e}"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    // ── Keys ─────────────────────────────────────────────────────

    async fn key_loop(
        &self,
        session: &StreamSession,
        keys: &mut mpsc::Receiver<Vec<u8>>,
        decoder: &mut KeyDecoder,
        line: &mut CommandLine,
        queue: mpsc::UnboundedSender<QueuedCommand>,
    ) -> Option<SessionEnd> {
        let cancel = session.cancel_token();
        let mut command_open = false;

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return None,
                received = timeout(self.options.key_timeout, keys.recv()) => received,
            };

            let mut chunk = match received {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    info!("input closed");
                    session.cancel();
                    return Some(SessionEnd::Quit);
                }
                Err(_) => {
                    // Input went quiet; resolve whatever is buffered (a lone ESC).
                    let flushed = decoder.flush();
                    if let Some(end) = self.dispatch_keys(session, flushed).await {
                        return Some(end);
                    }
                    continue;
                }
            };

            // A chunk may close the command line and carry keys after it.
            while !chunk.is_empty() {
                if command_open {
                    match self.edit_command(line, &chunk, &queue) {
                        Some(rest) => {
                            command_open = false;
                            chunk = rest;
                        }
                        None => break,
                    }
                    continue;
                }

                if is_switch_chord(&chunk) {
                    debug!("display switch requested");
                    session.cancel();
                    return Some(SessionEnd::Switch);
                }

                if decoder.pending() == 0 && chunk[0] == COMMAND_PREFIX {
                    line.begin();
                    command_open = true;
                    self.renderer.update_command_line(Some(""), 0);
                    chunk.remove(0);
                    continue;
                }

                let decoded = decoder.feed(&chunk);
                if let Some(end) = self.dispatch_keys(session, decoded).await {
                    return Some(end);
                }
                break;
            }
        }
    }

    /// Feed bytes to the open command line. Returns the bytes after the
    /// line once it is submitted or cancelled, `None` while it stays open.
    fn edit_command(
        &self,
        line: &mut CommandLine,
        bytes: &[u8],
        queue: &mpsc::UnboundedSender<QueuedCommand>,
    ) -> Option<Vec<u8>> {
        let (edits, rest) = line.feed(bytes);
        let mut closed = false;
        for edit in edits {
            match edit {
                CommandEdit::Update { text, cursor } => {
                    self.renderer.update_command_line(Some(&text), cursor);
                }
                CommandEdit::Submit(text) => {
                    self.renderer.update_command_line(None, 0);
                    if !text.is_empty() {
                        let _ = queue.send(QueuedCommand::Line(text));
                    }
                    closed = true;
                }
                CommandEdit::Cancel => {
                    self.renderer.update_command_line(None, 0);
                    closed = true;
                }
            }
        }
        closed.then_some(rest)
    }

    async fn dispatch_keys(
        &self,
        session: &StreamSession,
        decoded: Vec<DecodedKey>,
    ) -> Option<SessionEnd> {
        for (seq, event) in decoded {
            match event {
                Some(KeyEvent::Exit) => {
                    info!("exit key pressed");
                    session.cancel();
                    return Some(SessionEnd::Quit);
                }
                Some(KeyEvent::Help) => self.renderer.toggle_help(),
                Some(KeyEvent::Key(key)) => {
                    if !self.options.send_input {
                        debug!("input forwarding disabled, dropping {key}");
                        continue;
                    }
                    if let Err(e) = session.device().send_input_key(key).await {
                        debug!("send_input_key {key} failed: {e}");
                    }
                }
                None => debug!("unmapped input {seq:02x?}"),
            }
        }
        None
    }

    // ── Background work ──────────────────────────────────────────

    async fn periodic_loop(
        &self,
        session: &StreamSession,
        queue: mpsc::UnboundedSender<QueuedCommand>,
        pending: &PendingJobs,
    ) {
        let tickers = self
            .options
            .periodic
            .iter()
            .filter(|(_, period)| !period.is_zero())
            .map(|&(job, period)| {
                self.periodic_ticker(session, job, period, queue.clone(), pending)
            });
        join_all(tickers).await;
    }

    async fn periodic_ticker(
        &self,
        session: &StreamSession,
        job: PeriodicJob,
        period: Duration,
        queue: mpsc::UnboundedSender<QueuedCommand>,
        pending: &PendingJobs,
    ) {
        let cancel = session.cancel_token();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if !pending.mark(job) {
                debug!("{job} still queued, skipping tick");
                continue;
            }
            if queue.send(QueuedCommand::Refresh(job)).is_err() {
                return;
            }
        }
    }

    /// Drain queued jobs until cancelled; whatever is still queued then is
    /// dropped with the receiver. Returns `Quit` when a command asked for it.
    async fn command_queue(
        &self,
        session: &StreamSession,
        mut queue: mpsc::UnboundedReceiver<QueuedCommand>,
        pending: &PendingJobs,
    ) -> Option<SessionEnd> {
        let cancel = session.cancel_token();
        let ctx = CommandContext {
            device: session.device(),
            spec: session.spec(),
        };

        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => return None,
                },
            };

            match job {
                QueuedCommand::Refresh(job) => {
                    pending.clear(job);
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        () = job.run(session.device(), self.renderer.as_ref()) => {}
                    }
                }
                QueuedCommand::Line(line) => {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return None,
                        outcome = self.commands.execute(&line, &ctx) => outcome,
                    };
                    match outcome {
                        CommandOutcome::Status(message) => self.status(&message),
                        CommandOutcome::Quit => {
                            info!("quit requested by command");
                            session.cancel();
                            return Some(SessionEnd::Quit);
                        }
                    }
                }
            }
        }
    }
}
