//! `:` command handling and the background job queue.
//!
//! Handlers are tried in registration order; the first one whose
//! [`CommandHandler::matches`] accepts the line runs it. The registry always
//! ends with a catch-all so every line produces a status message.

use async_trait::async_trait;

use crate::device::Device;
use crate::display::DisplaySpec;
use crate::error::BusyError;
use crate::input::InputKey;
use crate::session::periodic::PeriodicJob;

// ── QueuedCommand ────────────────────────────────────────────────

/// Work drained by the command queue, off the frame path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedCommand {
    /// A submitted `:` line.
    Line(String),
    /// A periodic background job.
    Refresh(PeriodicJob),
}

// ── CommandOutcome ───────────────────────────────────────────────

/// What a finished command asks of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Show this on the status line.
    Status(String),
    /// End the whole run.
    Quit,
}

impl From<String> for CommandOutcome {
    fn from(message: String) -> Self {
        Self::Status(message)
    }
}

// ── CommandContext ───────────────────────────────────────────────

/// What a handler may touch while running.
pub struct CommandContext<'a> {
    pub device: &'a dyn Device,
    pub spec: &'static DisplaySpec,
}

// ── CommandHandler ───────────────────────────────────────────────

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, line: &str) -> bool;

    /// Run the command; `Err` is shown as a status message.
    async fn run(
        &self,
        line: &str,
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError>;
}

/// First word of a command line, case-insensitive.
fn verb(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// `key <name>`: send one input key.
pub struct KeyCommand;

#[async_trait]
impl CommandHandler for KeyCommand {
    fn name(&self) -> &'static str {
        "key"
    }

    fn matches(&self, line: &str) -> bool {
        verb(line) == "key"
    }

    async fn run(
        &self,
        line: &str,
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError> {
        let arg = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| BusyError::Other("usage: key <name>".into()))?;
        let key: InputKey = arg.parse()?;
        ctx.device.send_input_key(key).await?;
        Ok(format!("sent key {key}").into())
    }
}

/// `display`: report the display being mirrored.
pub struct DisplayCommand;

#[async_trait]
impl CommandHandler for DisplayCommand {
    fn name(&self) -> &'static str {
        "display"
    }

    fn matches(&self, line: &str) -> bool {
        verb(line) == "display"
    }

    async fn run(
        &self,
        _line: &str,
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError> {
        Ok(format!("{}: {}", ctx.spec, ctx.spec.description).into())
    }
}

/// `status`: fetch a device snapshot now.
pub struct StatusCommand;

#[async_trait]
impl CommandHandler for StatusCommand {
    fn name(&self) -> &'static str {
        "status"
    }

    fn matches(&self, line: &str) -> bool {
        verb(line) == "status"
    }

    async fn run(
        &self,
        _line: &str,
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError> {
        Ok(ctx.device.snapshot().await?.summary().into())
    }
}

/// `quit` / `q` / `exit`: end the run.
pub struct QuitCommand;

#[async_trait]
impl CommandHandler for QuitCommand {
    fn name(&self) -> &'static str {
        "quit"
    }

    fn matches(&self, line: &str) -> bool {
        matches!(verb(line).as_str(), "quit" | "q" | "exit")
    }

    async fn run(
        &self,
        _line: &str,
        _ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError> {
        Ok(CommandOutcome::Quit)
    }
}

/// `clear` / `c`: wipe whatever apps drew on the device.
pub struct ClearCommand;

#[async_trait]
impl CommandHandler for ClearCommand {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn matches(&self, line: &str) -> bool {
        matches!(verb(line).as_str(), "clear" | "c")
    }

    async fn run(
        &self,
        _line: &str,
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError> {
        ctx.device.clear_display().await?;
        Ok("display cleared".to_string().into())
    }
}

/// Catch-all, always registered last.
pub struct UnknownCommand;

#[async_trait]
impl CommandHandler for UnknownCommand {
    fn name(&self) -> &'static str {
        "unknown"
    }

    fn matches(&self, _line: &str) -> bool {
        true
    }

    async fn run(
        &self,
        line: &str,
        _ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, BusyError> {
        Ok(format!("command: Unknown command: {}", line.trim()).into())
    }
}

// ── CommandRegistry ──────────────────────────────────────────────

pub struct CommandRegistry {
    handlers: Vec<Box<dyn CommandHandler>>,
    fallback: Box<dyn CommandHandler>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
            .with(KeyCommand)
            .with(DisplayCommand)
            .with(StatusCommand)
            .with(ClearCommand)
            .with(QuitCommand)
    }
}

impl CommandRegistry {
    /// Empty registry; only the catch-all answers.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            fallback: Box::new(UnknownCommand),
        }
    }

    /// Register a handler ahead of the catch-all.
    pub fn with(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers
            .iter()
            .map(|h| h.name())
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }

    /// Run `line` through the first matching handler.
    ///
    /// Handler errors become the status message; they never end the session.
    pub async fn execute(&self, line: &str, ctx: &CommandContext<'_>) -> CommandOutcome {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.matches(line))
            .unwrap_or(&self.fallback);

        tracing::debug!("command {:?} -> {}", line, handler.name());
        match handler.run(line, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => CommandOutcome::Status(format!("command: {e}")),
        }
    }
}
