//! Terminal interpreter
//!
//! Screen state is maintained by `vt100`; this wrapper owns the write half
//! of the pty, so everything flowing back to the child (keys, pastes,
//! resizes) goes through here. Notifications for the orchestrator (copy,
//! paste requests, title changes) are sent as [`TermEvent`]s.

use std::sync::mpsc::Sender;

use crossterm::event::KeyCode;
use tracing::{debug, warn};

use crate::core::pty::{PtyInput, PtySize, Result as PtyResult};
use crate::ui::display::{Display, SelectionRange};
use crate::ui::keymapper::{InputModes, KeyMapper, Modifiers};

/// Notifications from the terminal to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermEvent {
    /// Text should be placed on the clipboard
    Copy(String),
    /// The user asked to paste the clipboard
    PasteRequested,
    /// The child changed the window title
    Title(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Towards older output
    Up,
    /// Towards the live screen
    Down,
}

/// Screen state plus the input side of the child
pub struct Terminal {
    parser: vt100::Parser,
    pty: Box<dyn PtyInput>,
    events: Sender<TermEvent>,
    title: String,
}

impl Terminal {
    pub fn new(size: PtySize, scrollback: usize, pty: Box<dyn PtyInput>, events: Sender<TermEvent>) -> Self {
        Self {
            parser: vt100::Parser::new(size.rows, size.cols, scrollback),
            pty,
            events,
            title: String::new(),
        }
    }

    /// Feed child output into the screen state
    pub fn write_to_screen(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);

        let title = self.parser.screen().title();
        if title != self.title {
            self.title = title.to_string();
            self.emit(TermEvent::Title(self.title.clone()));
        }
    }

    /// Publish the current screen to the display model
    pub fn draw(&self, display: &mut Display) {
        display.update(self.parser.screen());
    }

    /// Send a key press to the child
    pub fn write_keysym_to_pty(&mut self, code: KeyCode, mods: Modifiers) {
        if mods.contains(Modifiers::CTRL | Modifiers::SHIFT) && matches!(code, KeyCode::Char('v' | 'V')) {
            self.emit(TermEvent::PasteRequested);
            return;
        }

        let modes = InputModes {
            application_cursor: self.parser.screen().application_cursor(),
        };
        if let Some(bytes) = KeyMapper::map(code, mods, modes) {
            self.write_input(&bytes);
        }
    }

    /// Send a typed character to the child
    pub fn write_unicode_to_pty(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        let bytes = ch.encode_utf8(&mut buf).as_bytes().to_vec();
        self.write_input(&bytes);
    }

    /// Send clipboard text to the child, bracketed if it asked for that
    pub fn paste(&mut self, text: &str) {
        let normalized = text.replace("\r\n", "\r").replace('\n', "\r");
        let bytes = if self.parser.screen().bracketed_paste() {
            format!("\x1b[200~{}\x1b[201~", normalized.replace("\x1b[201~", ""))
        } else {
            normalized
        };
        self.write_input(bytes.as_bytes());
    }

    /// Move the view through scrollback
    pub fn scroll(&mut self, direction: ScrollDirection, distance: usize) {
        let current = self.parser.screen().scrollback();
        let target = match direction {
            ScrollDirection::Up => current.saturating_add(distance),
            ScrollDirection::Down => current.saturating_sub(distance),
        };
        self.parser.set_scrollback(target);
    }

    /// Lines the view is currently scrolled back by
    pub fn scroll_offset(&self) -> usize {
        self.parser.screen().scrollback()
    }

    /// Copy the text under a selection
    pub fn copy_range(&mut self, range: SelectionRange) {
        let text = self.parser.screen().contents_between(
            range.start.row,
            range.start.col,
            range.end.row,
            range.end.col.saturating_add(1),
        );
        let text = text.trim_end().to_string();
        if !text.is_empty() {
            self.emit(TermEvent::Copy(text));
        }
    }

    /// Resize the screen and tell the child
    pub fn resize(&mut self, size: PtySize) -> PtyResult<()> {
        self.parser.set_size(size.rows, size.cols);
        self.pty.resize(size)
    }

    #[allow(dead_code)]
    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    fn write_input(&mut self, bytes: &[u8]) {
        // Typing returns the view to the live screen.
        if self.scroll_offset() > 0 {
            self.parser.set_scrollback(0);
        }
        if let Err(e) = self.pty.write_all(bytes) {
            warn!("while writing to pty: {}", e);
        }
    }

    fn emit(&self, event: TermEvent) {
        if self.events.send(event).is_err() {
            debug!("terminal event dropped, receiver gone");
        }
    }
}
