//! Display model
//!
//! Sits between the terminal interpreter and the surface: holds a
//! theme-resolved copy of the visible screen, the mouse selection and the
//! registered fonts, and writes the result onto a [`Canvas`].

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Color, Theme};
use crate::ui::canvas::{Canvas, CanvasCell, CellAttrs};

#[derive(Error, Debug, PartialEq)]
pub enum DisplayError {
    #[error("Invalid display size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },

    #[error("Invalid size {size} for font `{name}`")]
    InvalidFont { name: String, size: f32 },
}

/// A font registered with the display
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub name: String,
    pub size: f32,
}

/// Phase of a mouse selection gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Start,
    Update,
    End,
}

/// Cell coordinate on the visible screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CellPos {
    pub row: u16,
    pub col: u16,
}

/// Inclusive, normalized selection (start is never after end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub start: CellPos,
    pub end: CellPos,
}

impl SelectionRange {
    fn between(a: CellPos, b: CellPos) -> Self {
        // CellPos orders by row, then column.
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        if pos.row < self.start.row || pos.row > self.end.row {
            return false;
        }
        if self.start.row == self.end.row {
            pos.col >= self.start.col && pos.col <= self.end.col
        } else if pos.row == self.start.row {
            pos.col >= self.start.col
        } else if pos.row == self.end.row {
            pos.col <= self.end.col
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    anchor: CellPos,
    head: CellPos,
    dragged: bool,
}

pub struct Display {
    theme: Theme,
    fonts: Vec<FontSpec>,
    cols: u16,
    rows: u16,
    cells: Vec<CanvasCell>,
    cursor: Option<CellPos>,
    selection: Option<Selection>,
    /// Set after a resize, so the next draw repaints everything
    stale: bool,
}

impl Display {
    pub fn new(theme: Theme, cols: u16, rows: u16) -> Self {
        let blank = CanvasCell::blank(theme.foreground, theme.background);
        Self {
            cells: vec![blank; cols as usize * rows as usize],
            theme,
            fonts: Vec::new(),
            cols,
            rows,
            cursor: None,
            selection: None,
            stale: true,
        }
    }

    /// Register a font; registering the same name twice is a no-op
    pub fn add_font(&mut self, name: &str, size: f32) -> Result<(), DisplayError> {
        if size.is_nan() || size <= 0.0 {
            return Err(DisplayError::InvalidFont {
                name: name.to_string(),
                size,
            });
        }
        if self.fonts.iter().any(|f| f.name == name) {
            debug!("font {} already registered", name);
            return Ok(());
        }
        info!("registered font {} at {}pt", name, size);
        self.fonts.push(FontSpec {
            name: name.to_string(),
            size,
        });
        Ok(())
    }

    #[allow(dead_code)]
    pub fn fonts(&self) -> &[FontSpec] {
        &self.fonts
    }

    #[allow(dead_code)]
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), DisplayError> {
        if cols == 0 || rows == 0 {
            return Err(DisplayError::InvalidSize { cols, rows });
        }
        self.cols = cols;
        self.rows = rows;
        self.cells = vec![self.blank(); cols as usize * rows as usize];
        self.cursor = None;
        self.selection = None;
        self.stale = true;
        Ok(())
    }

    /// Copy the visible screen into the model
    pub fn update(&mut self, screen: &vt100::Screen) {
        let (screen_rows, screen_cols) = screen.size();
        let blank = self.blank();

        for row in 0..self.rows {
            for col in 0..self.cols {
                let cell = if row < screen_rows && col < screen_cols {
                    screen.cell(row, col).map(|cell| self.resolve(cell))
                } else {
                    None
                };
                let idx = self.index(row, col);
                self.cells[idx] = cell.unwrap_or_else(|| blank.clone());
            }
        }

        let (row, col) = screen.cursor_position();
        self.cursor = if screen.hide_cursor() || screen.scrollback() > 0 {
            None
        } else {
            Some(CellPos { row, col })
        };
    }

    /// Write the model onto `canvas`
    ///
    /// Returns whether anything on the canvas changed. `force_full` marks
    /// every row for repaint regardless.
    pub fn draw(&mut self, canvas: &mut Canvas, force_full: bool) -> bool {
        if canvas.size() != (self.cols, self.rows) {
            canvas.resize(self.cols, self.rows);
        }
        if force_full || self.stale {
            canvas.mark_all_dirty();
            self.stale = false;
        }

        let range = self.selection.map(|s| SelectionRange::between(s.anchor, s.head));
        for row in 0..self.rows {
            for col in 0..self.cols {
                let pos = CellPos { row, col };
                let mut cell = self.cells[self.index(row, col)].clone();

                if range.is_some_and(|r| r.contains(pos)) {
                    cell.fg = self.theme.selection_fg;
                    cell.bg = self.theme.selection_bg;
                }
                if self.cursor == Some(pos) {
                    cell.fg = self.theme.background;
                    cell.bg = self.theme.cursor;
                }
                canvas.set(row, col, cell);
            }
        }

        canvas.has_dirty()
    }

    /// Start or extend a selection
    pub fn set_selection(&mut self, state: SelectionState, pos: CellPos) {
        let pos = self.clamp(pos);
        if state != SelectionState::Start {
            if let Some(selection) = self.selection.as_mut() {
                if selection.head != pos {
                    selection.head = pos;
                    selection.dragged = true;
                }
                return;
            }
        }
        self.selection = Some(Selection {
            anchor: pos,
            head: pos,
            dragged: false,
        });
    }

    /// Finish the gesture, returning the range to copy
    ///
    /// A click without a drag clears the selection and returns `None`.
    /// Otherwise the selection stays highlighted until the next click.
    pub fn end_selection(&mut self, pos: CellPos) -> Option<SelectionRange> {
        self.set_selection(SelectionState::End, pos);
        let selection = self.selection?;
        if !selection.dragged {
            self.selection = None;
            return None;
        }
        Some(SelectionRange::between(selection.anchor, selection.head))
    }

    #[allow(dead_code)]
    pub fn selection(&self) -> Option<SelectionRange> {
        self.selection.map(|s| SelectionRange::between(s.anchor, s.head))
    }

    fn resolve(&self, cell: &vt100::Cell) -> CanvasCell {
        let mut fg = self.color(cell.fgcolor(), self.theme.foreground);
        let mut bg = self.color(cell.bgcolor(), self.theme.background);
        if cell.inverse() {
            std::mem::swap(&mut fg, &mut bg);
        }

        let mut attrs = CellAttrs::empty();
        attrs.set(CellAttrs::BOLD, cell.bold());
        attrs.set(CellAttrs::ITALIC, cell.italic());
        attrs.set(CellAttrs::UNDERLINE, cell.underline());

        let text = if cell.is_wide_continuation() {
            String::new()
        } else if cell.has_contents() {
            cell.contents()
        } else {
            " ".to_string()
        };

        CanvasCell { text, fg, bg, attrs }
    }

    fn color(&self, color: vt100::Color, default: Color) -> Color {
        match color {
            vt100::Color::Default => default,
            vt100::Color::Idx(idx) => self.theme.indexed(idx),
            vt100::Color::Rgb(r, g, b) => Color::new(r, g, b),
        }
    }

    fn blank(&self) -> CanvasCell {
        CanvasCell::blank(self.theme.foreground, self.theme.background)
    }

    fn clamp(&self, pos: CellPos) -> CellPos {
        CellPos {
            row: pos.row.min(self.rows.saturating_sub(1)),
            col: pos.col.min(self.cols.saturating_sub(1)),
        }
    }

    fn index(&self, row: u16, col: u16) -> usize {
        row as usize * self.cols as usize + col as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: u16, col: u16) -> CellPos {
        CellPos { row, col }
    }

    fn screen(bytes: &[u8]) -> vt100::Parser {
        let mut parser = vt100::Parser::new(4, 10, 0);
        parser.process(bytes);
        parser
    }

    #[test]
    fn test_add_font_deduplicates() {
        let mut display = Display::new(Theme::default(), 10, 4);
        display.add_font("Mono", 12.0).unwrap();
        display.add_font("Mono", 14.0).unwrap();
        display.add_font("Sans", 11.0).unwrap();

        assert_eq!(display.fonts().len(), 2);
        assert_eq!(display.fonts()[0].size, 12.0);
        assert!(display.add_font("Bad", 0.0).is_err());
    }

    #[test]
    fn test_resize_rejects_zero() {
        let mut display = Display::new(Theme::default(), 10, 4);
        assert_eq!(
            display.resize(0, 4),
            Err(DisplayError::InvalidSize { cols: 0, rows: 4 })
        );
        assert!(display.resize(20, 5).is_ok());
        assert_eq!(display.size(), (20, 5));
    }

    #[test]
    fn test_draw_reports_only_real_changes() {
        let theme = Theme::default();
        let mut display = Display::new(theme.clone(), 10, 4);
        let mut canvas = Canvas::new(10, 4);
        let parser = screen(b"\x1b[?25lhi");

        display.update(parser.screen());
        assert!(display.draw(&mut canvas, false));
        assert_eq!(canvas.row_text(0), "hi");
        canvas.take_dirty_rows();

        display.update(parser.screen());
        assert!(!display.draw(&mut canvas, false));

        assert!(display.draw(&mut canvas, true));
        assert_eq!(canvas.take_dirty_rows().len(), 4);
    }

    #[test]
    fn test_inverse_and_indexed_colors() {
        let theme = Theme::default();
        let mut display = Display::new(theme.clone(), 10, 4);
        let mut canvas = Canvas::new(10, 4);

        display.update(screen(b"\x1b[?25l\x1b[7ma\x1b[0m\x1b[31mb").screen());
        display.draw(&mut canvas, false);

        let row = canvas.row(0);
        assert_eq!(row[0].fg, theme.background);
        assert_eq!(row[0].bg, theme.foreground);
        assert_eq!(row[1].fg, theme.palette[1]);
    }

    #[test]
    fn test_cursor_is_drawn() {
        let theme = Theme::default();
        let mut display = Display::new(theme.clone(), 10, 4);
        let mut canvas = Canvas::new(10, 4);

        display.update(screen(b"ab").screen());
        display.draw(&mut canvas, false);
        assert_eq!(canvas.row(0)[2].bg, theme.cursor);

        display.update(screen(b"ab\x1b[?25l").screen());
        display.draw(&mut canvas, false);
        assert_eq!(canvas.row(0)[2].bg, theme.background);
    }

    #[test]
    fn test_selection_highlight_and_range() {
        let theme = Theme::default();
        let mut display = Display::new(theme.clone(), 10, 4);
        let mut canvas = Canvas::new(10, 4);
        display.update(screen(b"\x1b[?25lhello").screen());

        // Dragging backwards still yields a normalized range.
        display.set_selection(SelectionState::Start, pos(1, 2));
        display.set_selection(SelectionState::Update, pos(0, 3));
        let range = display.end_selection(pos(0, 3)).unwrap();
        assert_eq!(range.start, pos(0, 3));
        assert_eq!(range.end, pos(1, 2));

        display.draw(&mut canvas, false);
        assert_eq!(canvas.row(0)[2].bg, theme.background);
        assert_eq!(canvas.row(0)[3].bg, theme.selection_bg);
        assert_eq!(canvas.row(1)[0].bg, theme.selection_bg);
        assert_eq!(canvas.row(1)[3].bg, theme.background);
    }

    #[test]
    fn test_click_without_drag_clears() {
        let mut display = Display::new(Theme::default(), 10, 4);
        display.set_selection(SelectionState::Start, pos(0, 0));
        display.set_selection(SelectionState::Update, pos(0, 4));
        assert!(display.end_selection(pos(0, 4)).is_some());
        assert!(display.selection().is_some());

        display.set_selection(SelectionState::Start, pos(2, 2));
        assert_eq!(display.end_selection(pos(2, 2)), None);
        assert_eq!(display.selection(), None);
    }

    #[test]
    fn test_selection_clamped_to_screen() {
        let mut display = Display::new(Theme::default(), 10, 4);
        display.set_selection(SelectionState::Start, pos(0, 0));
        let range = display.end_selection(pos(50, 50)).unwrap();
        assert_eq!(range.end, pos(3, 9));
    }
}
