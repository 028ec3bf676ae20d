//! Truecolor terminal renderer.
//!
//! Draws canonical frames as one glyph per pixel with 24-bit ANSI colours.
//! Pure black pixels are left blank. Below the frame sit two footer rows:
//! the status (or the `:` command being typed, cursor in reverse video) and
//! the device summary with the cloud link state.

use std::io::{self, Stdout, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, queue};

use busy_core::{BACK_DISPLAY, CanonicalFrame, DisplaySpec, FRONT_DISPLAY, Renderer};

const FOOTER_ROWS: u16 = 2;
const SIZE_CHECK_PERIOD: Duration = Duration::from_secs(1);
const KEY_HINT: &str = "h help | Tab/Ctrl+R switch | : command | Ctrl+Q quit";

// ── Options ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub spacer: String,
    pub pixel_char: String,
}

impl RenderOptions {
    fn pixel_width(&self) -> usize {
        self.pixel_char.chars().count().max(1)
    }

    fn spacer_width(&self) -> usize {
        self.spacer.chars().count()
    }

    /// Columns and rows needed to draw `spec` plus the footer.
    pub fn required_size(&self, spec: &DisplaySpec) -> (u16, u16) {
        let cell = self.pixel_width() + self.spacer_width();
        let cols = (spec.width * cell).saturating_sub(self.spacer_width());
        let rows = spec.height + FOOTER_ROWS as usize;
        (
            u16::try_from(cols).unwrap_or(u16::MAX),
            u16::try_from(rows).unwrap_or(u16::MAX),
        )
    }
}

// ── Size tracking ────────────────────────────────────────────────

enum SizeSource {
    Terminal,
    Fixed(u16, u16),
}

struct SizeCheck {
    source: SizeSource,
    next_check: Option<Instant>,
    cols: u16,
    rows: u16,
}

impl SizeCheck {
    /// Current size, re-read from the terminal at most once per second.
    fn current(&mut self) -> (u16, u16) {
        let now = Instant::now();
        if self.next_check.is_none_or(|at| now >= at) {
            let (cols, rows) = match self.source {
                SizeSource::Terminal => terminal::size().unwrap_or((80, 24)),
                SizeSource::Fixed(cols, rows) => (cols, rows),
            };
            self.cols = cols;
            self.rows = rows;
            self.next_check = Some(now + SIZE_CHECK_PERIOD);
        }
        (self.cols, self.rows)
    }
}

// ── TerminalRenderer ─────────────────────────────────────────────

struct View<W> {
    out: W,
    options: RenderOptions,
    help_lines: Vec<String>,
    help_visible: bool,
    status: String,
    info: String,
    link: String,
    /// Text and character cursor of the open `:` line.
    command: Option<(String, usize)>,
    size: SizeCheck,
    cleared: bool,
    spec: Option<&'static DisplaySpec>,
    last_frame: Option<CanonicalFrame>,
}

pub struct TerminalRenderer<W: Write + Send = Stdout> {
    view: Mutex<View<W>>,
}

impl TerminalRenderer<Stdout> {
    /// Render to stdout, sizing against the real terminal.
    pub fn stdout(options: RenderOptions, help_lines: Vec<String>) -> Self {
        Self::build(io::stdout(), options, help_lines, SizeSource::Terminal)
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    /// Render to `out` as if the terminal were `cols` × `rows`.
    pub fn with_size(
        out: W,
        options: RenderOptions,
        help_lines: Vec<String>,
        cols: u16,
        rows: u16,
    ) -> Self {
        Self::build(out, options, help_lines, SizeSource::Fixed(cols, rows))
    }

    fn build(out: W, options: RenderOptions, help_lines: Vec<String>, source: SizeSource) -> Self {
        Self {
            view: Mutex::new(View {
                out,
                options,
                help_lines,
                help_visible: false,
                status: String::new(),
                info: String::new(),
                link: String::new(),
                command: None,
                size: SizeCheck {
                    source,
                    next_check: None,
                    cols: 0,
                    rows: 0,
                },
                cleared: false,
                spec: None,
                last_frame: None,
            }),
        }
    }

    pub fn into_writer(self) -> W {
        self.view
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    fn lock(&self) -> MutexGuard<'_, View<W>> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report(result: io::Result<()>) {
        if let Err(e) = result {
            tracing::debug!("terminal write failed: {e}");
        }
    }
}

impl<W: Write + Send> View<W> {
    fn draw_frame(&mut self, frame: &CanonicalFrame) -> io::Result<()> {
        let spec = frame.spec();
        let (cols, rows) = self.size.current();
        let (need_cols, need_rows) = self.options.required_size(spec);

        if self.spec != Some(spec) {
            self.spec = Some(spec);
            self.cleared = false;
        }

        if cols < need_cols || rows < need_rows {
            self.cleared = false;
            return self.draw_size_warning(cols, rows, need_cols, need_rows);
        }

        if !self.cleared {
            queue!(self.out, Clear(ClearType::All))?;
            self.cleared = true;
        }

        if self.help_visible {
            self.draw_help(spec.height)?;
        } else {
            let blank = " ".repeat(self.options.pixel_width());
            for (y, row) in frame.rows().enumerate() {
                queue!(self.out, MoveTo(0, y as u16))?;
                for (x, px) in row.chunks_exact(3).enumerate() {
                    if x > 0 && !self.options.spacer.is_empty() {
                        queue!(self.out, Print(&self.options.spacer))?;
                    }
                    if px == [0, 0, 0] {
                        queue!(self.out, Print(&blank))?;
                    } else {
                        queue!(
                            self.out,
                            SetForegroundColor(Color::Rgb {
                                r: px[0],
                                g: px[1],
                                b: px[2],
                            }),
                            Print(&self.options.pixel_char),
                            ResetColor
                        )?;
                    }
                }
            }
        }

        self.draw_footer()
    }

    fn draw_help(&mut self, height: usize) -> io::Result<()> {
        for y in 0..height {
            queue!(self.out, MoveTo(0, y as u16), Clear(ClearType::CurrentLine))?;
            if let Some(line) = self.help_lines.get(y) {
                queue!(self.out, Print(line))?;
            }
        }
        Ok(())
    }

    fn draw_size_warning(
        &mut self,
        cols: u16,
        rows: u16,
        need_cols: u16,
        need_rows: u16,
    ) -> io::Result<()> {
        let mut lines = vec![format!(
            " Terminal {cols}x{rows} too small; need {need_cols}x{need_rows} "
        )];
        if !self.options.spacer.is_empty() {
            lines.push(" Try --spacer \"\" for compact output ".into());
        }
        let front = self.options.required_size(&FRONT_DISPLAY);
        let back = self.options.required_size(&BACK_DISPLAY);
        lines.push(format!(
            " Front needs {}x{}; Back needs {}x{} ",
            front.0, front.1, back.0, back.1
        ));
        lines.push(" Switch display: Tab or Ctrl+R ".into());

        let inner = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0).max(10);
        let border = format!("+{}+", "-".repeat(inner));
        let top = rows.saturating_sub(lines.len() as u16 + 2) / 2;
        let left = cols.saturating_sub(border.chars().count() as u16) / 2;

        queue!(self.out, Clear(ClearType::All), MoveTo(left, top), Print(&border))?;
        for (i, line) in lines.iter().enumerate() {
            queue!(
                self.out,
                MoveTo(left, top + 1 + i as u16),
                Print(format!("|{line:<inner$}|"))
            )?;
        }
        queue!(
            self.out,
            MoveTo(left, top + 1 + lines.len() as u16),
            Print(&border)
        )?;
        self.out.flush()
    }

    fn draw_footer(&mut self) -> io::Result<()> {
        let top = self.spec.map_or(0, |s| s.height as u16);
        queue!(self.out, MoveTo(0, top), Clear(ClearType::CurrentLine))?;
        match &self.command {
            Some((text, cursor)) => {
                let before: String = text.chars().take(*cursor).collect();
                let mut rest = text.chars().skip(*cursor);
                let at = rest.next().unwrap_or(' ');
                let after: String = rest.collect();
                queue!(
                    self.out,
                    Print(format!(":{before}")),
                    SetAttribute(Attribute::Reverse),
                    Print(at),
                    SetAttribute(Attribute::NoReverse),
                    Print(after)
                )?;
            }
            None => queue!(self.out, Print(&self.status))?,
        }

        let mut second: Vec<String> = Vec::new();
        if !self.info.is_empty() {
            second.push(self.info.clone());
        }
        if !self.link.is_empty() {
            second.push(format!("cloud: {}", self.link));
        }
        second.push(KEY_HINT.to_string());
        queue!(
            self.out,
            MoveTo(0, top + 1),
            Clear(ClearType::CurrentLine),
            Print(second.join(" | "))
        )?;
        self.out.flush()
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&self, frame: &CanonicalFrame) {
        let mut view = self.lock();
        let result = view.draw_frame(frame);
        view.last_frame = Some(frame.clone());
        Self::report(result);
    }

    fn update_status(&self, text: &str) {
        let mut view = self.lock();
        view.status = text.to_string();
        Self::report(view.draw_footer());
    }

    fn toggle_help(&self) {
        let mut view = self.lock();
        view.help_visible = !view.help_visible;
        view.cleared = false;
        if let Some(frame) = view.last_frame.take() {
            let result = view.draw_frame(&frame);
            view.last_frame = Some(frame);
            Self::report(result);
        }
    }

    fn update_command_line(&self, text: Option<&str>, cursor: usize) {
        let mut view = self.lock();
        view.command = text.map(|t| (t.to_string(), cursor));
        Self::report(view.draw_footer());
    }

    fn update_info(&self, text: &str) {
        let mut view = self.lock();
        view.info = text.to_string();
        Self::report(view.draw_footer());
    }

    fn update_link(&self, state: &str) {
        let mut view = self.lock();
        view.link = state.to_string();
        Self::report(view.draw_footer());
    }
}

// ── TerminalGuard ────────────────────────────────────────────────

/// Raw mode plus alternate screen for as long as it lives.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

// ── Tests ────────────────────────────────────────────────────────
