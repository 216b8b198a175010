//! Display surface
//!
//! The [`Surface`] trait is everything the main loop needs from a window:
//! a canvas to draw into, presentation, input, clipboard and title.
//! [`HostWindow`] implements it on top of the terminal the program was
//! started in, using crossterm.

use std::io::{self, BufWriter, Write};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
    },
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Theme;
use crate::core::term::ScrollDirection;
use crate::ui::canvas::{Canvas, CanvasCell, CellAttrs};
use crate::ui::display::{CellPos, SelectionState};
use crate::ui::keymapper::Modifiers;

/// Lines moved per wheel notch
const SCROLL_LINES: usize = 3;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Failed to set up host terminal: {0}")]
    Setup(#[source] io::Error),

    #[error("Surface already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    pub hwaccel: bool,
    pub vsync: bool,
    pub theme: Theme,
}

/// Input delivered from the surface to the main loop
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// Non-text key, or a key with Ctrl/Alt held
    Key(KeyCode, Modifiers),
    /// Typed text
    Char(char),
    /// New size in cells (cols, rows)
    Resize(u16, u16),
    Selection(SelectionState, CellPos),
    Scroll(ScrollDirection, usize),
    Paste(String),
}

pub trait Surface {
    /// Open the surface; `cols`/`rows` is the preferred size
    fn initialize(&mut self, cols: u16, rows: u16, options: &SurfaceOptions) -> Result<(), SurfaceError>;

    /// Current size in cells (cols, rows)
    fn size(&self) -> (u16, u16);

    fn canvas(&mut self) -> &mut Canvas;

    /// Present the canvas if `significant`, then queue pending input
    fn draw_and_poll(&mut self, significant: bool);

    fn clipboard_read(&mut self) -> Option<String>;

    fn clipboard_write(&mut self, text: &str);

    fn set_title(&mut self, title: &str);

    fn is_open(&self) -> bool;
}

/// The controlling terminal as a surface
pub struct HostWindow {
    events: Sender<WindowEvent>,
    canvas: Canvas,
    clipboard: Option<arboard::Clipboard>,
    vsync: bool,
    initialized: bool,
    open: bool,
}

impl HostWindow {
    pub fn new() -> (Self, Receiver<WindowEvent>) {
        let (events, rx) = channel();
        let window = Self {
            events,
            canvas: Canvas::default(),
            clipboard: None,
            vsync: true,
            initialized: false,
            open: false,
        };
        (window, rx)
    }

    fn setup(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        self.initialized = true;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste,
            DisableLineWrap,
            Hide,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        Ok(())
    }

    fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show, EnableLineWrap);
        let _ = execute!(stdout, DisableBracketedPaste, DisableMouseCapture);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();

        terminal::disable_raw_mode()
    }

    /// Repaint the rows the canvas marked dirty
    fn present(&mut self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = BufWriter::with_capacity(65536, stdout.lock());

        if self.vsync {
            queue!(out, BeginSynchronizedUpdate)?;
        }

        for row in self.canvas.take_dirty_rows() {
            queue!(out, MoveTo(0, row))?;
            let mut last: Option<&CanvasCell> = None;
            for cell in self.canvas.row(row) {
                if cell.is_continuation() {
                    continue;
                }
                let restyle = last.map_or(true, |prev| {
                    prev.fg != cell.fg || prev.bg != cell.bg || prev.attrs != cell.attrs
                });
                if restyle {
                    apply_style(&mut out, cell)?;
                }
                queue!(out, Print(cell.printable()))?;
                last = Some(cell);
            }
        }

        queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
        if self.vsync {
            queue!(out, EndSynchronizedUpdate)?;
        }
        out.flush()
    }

    fn poll(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            let ev = event::read()?;
            if let Event::Key(key) = &ev {
                if is_close_key(key) {
                    info!("close requested");
                    self.open = false;
                    return Ok(());
                }
            }
            if let Some(ev) = translate(ev) {
                if self.events.send(ev).is_err() {
                    debug!("window event dropped, receiver gone");
                }
            }
        }
        Ok(())
    }

    /// OSC 52 fallback when no system clipboard is reachable
    fn osc52_copy(&self, text: &str) {
        let mut stdout = io::stdout();
        let sequence = format!("\x1b]52;c;{}\x07", STANDARD.encode(text));
        if let Err(e) = stdout.write_all(sequence.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("while writing OSC 52 clipboard sequence: {}", e);
        }
    }
}

impl Surface for HostWindow {
    fn initialize(&mut self, cols: u16, rows: u16, options: &SurfaceOptions) -> Result<(), SurfaceError> {
        if self.initialized {
            return Err(SurfaceError::AlreadyInitialized);
        }

        if let Err(e) = self.setup() {
            let _ = self.cleanup();
            return Err(SurfaceError::Setup(e));
        }
        self.open = true;
        self.vsync = options.vsync;

        let (cols, rows) = terminal::size().unwrap_or((cols, rows));
        self.canvas.resize(cols, rows);

        self.clipboard = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                debug!("arboard clipboard init failed: {}", e);
                None
            }
        };

        info!(
            "host window {}x{} (theme {}, hwaccel {}, vsync {})",
            cols, rows, options.theme.name, options.hwaccel, options.vsync
        );
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        self.canvas.size()
    }

    fn canvas(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    fn draw_and_poll(&mut self, significant: bool) {
        if !self.open {
            return;
        }
        if significant {
            if let Err(e) = self.present() {
                warn!("while presenting frame: {}", e);
            }
        }
        if let Err(e) = self.poll() {
            warn!("while polling input: {}", e);
            self.open = false;
        }
    }

    fn clipboard_read(&mut self) -> Option<String> {
        let clipboard = self.clipboard.as_mut()?;
        match clipboard.get_text() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("while reading clipboard: {}", e);
                None
            }
        }
    }

    fn clipboard_write(&mut self, text: &str) {
        match self.clipboard.as_mut() {
            Some(clipboard) => {
                if let Err(e) = clipboard.set_text(text.to_string()) {
                    warn!("while writing clipboard: {}", e);
                    self.osc52_copy(text);
                }
            }
            None => self.osc52_copy(text),
        }
    }

    fn set_title(&mut self, title: &str) {
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, SetTitle(title)) {
            warn!("while setting title: {}", e);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for HostWindow {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn apply_style<W: Write>(out: &mut W, cell: &CanvasCell) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset))?;
    if cell.attrs.contains(CellAttrs::BOLD) {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if cell.attrs.contains(CellAttrs::ITALIC) {
        queue!(out, SetAttribute(Attribute::Italic))?;
    }
    if cell.attrs.contains(CellAttrs::UNDERLINE) {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    queue!(
        out,
        SetForegroundColor(cell.fg.to_crossterm()),
        SetBackgroundColor(cell.bg.to_crossterm())
    )
}

/// Ctrl+Alt+Q
fn is_close_key(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && key.modifiers.contains(KeyModifiers::CONTROL | KeyModifiers::ALT)
        && matches!(key.code, KeyCode::Char('q' | 'Q'))
}

/// Map a host input event to a window event
pub fn translate(ev: Event) -> Option<WindowEvent> {
    match ev {
        Event::Key(key) => {
            if key.kind == KeyEventKind::Release {
                return None;
            }
            let mods = Modifiers::from(key.modifiers);
            match key.code {
                KeyCode::Char(ch) if !mods.intersects(Modifiers::CTRL | Modifiers::ALT) => {
                    Some(WindowEvent::Char(ch))
                }
                code => Some(WindowEvent::Key(code, mods)),
            }
        }
        Event::Mouse(mouse) => {
            let pos = CellPos {
                row: mouse.row,
                col: mouse.column,
            };
            match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => {
                    Some(WindowEvent::Selection(SelectionState::Start, pos))
                }
                MouseEventKind::Drag(MouseButton::Left) => {
                    Some(WindowEvent::Selection(SelectionState::Update, pos))
                }
                MouseEventKind::Up(MouseButton::Left) => {
                    Some(WindowEvent::Selection(SelectionState::End, pos))
                }
                MouseEventKind::ScrollUp => Some(WindowEvent::Scroll(ScrollDirection::Up, SCROLL_LINES)),
                MouseEventKind::ScrollDown => Some(WindowEvent::Scroll(ScrollDirection::Down, SCROLL_LINES)),
                _ => None,
            }
        }
        Event::Resize(cols, rows) => Some(WindowEvent::Resize(cols, rows)),
        Event::Paste(text) => Some(WindowEvent::Paste(text)),
        _ => None,
    }
}
