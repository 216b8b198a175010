//! Session orchestration
//!
//! Wires the pty, reader thread, terminal interpreter, display model and
//! surface together, then runs the paced main loop until the surface
//! closes or the shell's output reaches end-of-stream.

use std::sync::mpsc::{channel, Receiver};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::pty::{Pty, PtyInput, PtySize, PtySource};
use crate::core::reader::ReaderThread;
use crate::core::router::CancellationRouter;
use crate::core::signals::{install_wake_handler, ChildWatcher};
use crate::core::term::{TermEvent, Terminal};
use crate::pacer::FramePacer;
use crate::ui::display::{Display, SelectionState};
use crate::ui::window::{HostWindow, Surface, SurfaceOptions, WindowEvent};

/// Size the pty is opened with, before the surface reports its own
const INITIAL_SIZE: PtySize = PtySize { cols: 80, rows: 24 };

/// Family registered after the configured fonts
const DEFAULT_FONT: &str = "monospace";

pub struct App<S: Surface> {
    config: Config,
    surface: S,
    window_events: Receiver<WindowEvent>,
    router: &'static CancellationRouter,
}

impl App<HostWindow> {
    pub fn new(config: Config) -> Self {
        let (surface, window_events) = HostWindow::new();
        Self::with_surface(config, surface, window_events, CancellationRouter::global())
    }
}

impl<S: Surface> App<S> {
    pub fn with_surface(
        config: Config,
        surface: S,
        window_events: Receiver<WindowEvent>,
        router: &'static CancellationRouter,
    ) -> Self {
        Self {
            config,
            surface,
            window_events,
            router,
        }
    }

    /// Spawn the configured shell and run it until it exits or the window
    /// is closed
    pub fn run(&mut self) -> Result<()> {
        install_wake_handler();
        let mut watcher = ChildWatcher::spawn(self.router).context("while installing signal handlers")?;

        let shell = self.config.shell();
        let pty = Pty::spawn(&shell, &["-i"], INITIAL_SIZE).context("while initializing pty")?;
        let reader = pty.reader().context("while initializing pty")?;
        let writer = pty.writer().context("while initializing pty")?;
        info!("shell {} running as pid {}", shell, pty.pid());

        let result = self.run_session(reader, Box::new(writer));

        watcher.close();
        drop(pty);
        result
    }

    /// Run the main loop over an already-open child
    pub fn run_session<R: PtySource>(&mut self, source: R, input: Box<dyn PtyInput>) -> Result<()> {
        let mut reader = ReaderThread::spawn(source).context("while starting pty reader")?;

        let options = SurfaceOptions {
            hwaccel: self.config.hwaccel(),
            vsync: self.config.vsync(),
            theme: self.config.theme(),
        };
        self.surface
            .initialize(INITIAL_SIZE.cols, INITIAL_SIZE.rows, &options)
            .context("while initializing window")?;

        let (term_tx, term_events) = channel();
        let mut session = Session {
            term: Terminal::new(INITIAL_SIZE, self.config.scrollback, input, term_tx),
            display: Display::new(options.theme, INITIAL_SIZE.cols, INITIAL_SIZE.rows),
            term_events,
        };

        for font in self.config.fonts() {
            if let Err(e) = session.display.add_font(&font.name, font.size) {
                warn!("while registering font: {}", e);
            }
        }
        if let Err(e) = session.display.add_font(DEFAULT_FONT, self.config.font_defaults_size()) {
            warn!("while registering font: {}", e);
        }

        let (cols, rows) = self.surface.size();
        session.resize(cols, rows);

        self.main_loop(&mut reader, &mut session);
        Ok(())
    }

    fn main_loop(&mut self, reader: &mut ReaderThread, session: &mut Session) {
        self.router.register_active(reader.waker());

        let mut pacer = FramePacer::new(self.config.fps());
        let force_full = !self.config.hwaccel();
        info!("main loop started at {} fps", self.config.fps());

        while self.surface.is_open() && !reader.is_done() {
            pacer.pace();

            let output = reader.buffer().read_and_clear();
            if !output.is_empty() {
                session.term.write_to_screen(&output);
            }

            session.term.draw(&mut session.display);
            let significant = session.display.draw(self.surface.canvas(), force_full);
            self.surface.draw_and_poll(significant);

            while let Ok(event) = self.window_events.try_recv() {
                session.handle_window_event(event);
            }
            while let Ok(event) = session.term_events.try_recv() {
                self.handle_term_event(session, event);
            }
        }

        if reader.is_done() {
            info!("shell output ended");
        } else {
            info!("window closed");
        }

        // Unregister first so a late SIGCHLD cannot target a reader that is
        // being torn down.
        self.router.clear_active();
        reader.stop();
        debug!("pty reader {:?}", reader.state());
    }

    fn handle_term_event(&mut self, session: &mut Session, event: TermEvent) {
        match event {
            TermEvent::Copy(text) => {
                debug!("copying {} bytes to clipboard", text.len());
                self.surface.clipboard_write(&text);
            }
            TermEvent::PasteRequested => match self.surface.clipboard_read() {
                Some(text) => session.term.paste(&text),
                None => debug!("clipboard empty or unavailable"),
            },
            TermEvent::Title(title) => self.surface.set_title(&title),
        }
    }

    #[cfg(test)]
    fn surface(&self) -> &S {
        &self.surface
    }
}

/// Per-session state owned by the main loop
struct Session {
    term: Terminal,
    display: Display,
    term_events: Receiver<TermEvent>,
}

impl Session {
    fn handle_window_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Key(code, mods) => self.term.write_keysym_to_pty(code, mods),
            WindowEvent::Char(ch) => self.term.write_unicode_to_pty(ch),
            WindowEvent::Resize(cols, rows) => self.resize(cols, rows),
            WindowEvent::Selection(SelectionState::End, pos) => {
                if let Some(range) = self.display.end_selection(pos) {
                    self.term.copy_range(range);
                }
            }
            WindowEvent::Selection(state, pos) => self.display.set_selection(state, pos),
            WindowEvent::Scroll(direction, distance) => self.term.scroll(direction, distance),
            WindowEvent::Paste(text) => self.term.paste(&text),
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        if let Err(e) = self.display.resize(cols, rows) {
            warn!("while resizing terminal display: {}", e);
            return;
        }
        if let Err(e) = self.term.resize(PtySize::new(cols, rows)) {
            warn!("while resizing pty: {}", e);
        }
        debug!("resized to {}x{}", cols, rows);
    }
}
