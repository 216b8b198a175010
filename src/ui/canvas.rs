//! Cell canvas
//!
//! The surface-side grid the display draws into. Every write is compared
//! with what is already there, so a row is only marked dirty when something
//! visible actually changed; the surface repaints just those rows.

use bitflags::bitflags;
use unicode_width::UnicodeWidthStr;

use crate::config::Color;

bitflags! {
    /// Text attributes the host can render
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CellAttrs: u8 {
        const BOLD      = 0b0001;
        const ITALIC    = 0b0010;
        const UNDERLINE = 0b0100;
    }
}

/// One resolved cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasCell {
    /// Grapheme to draw; empty for the right half of a wide character
    pub text: String,
    pub fg: Color,
    pub bg: Color,
    pub attrs: CellAttrs,
}

impl CanvasCell {
    pub fn blank(fg: Color, bg: Color) -> Self {
        Self {
            text: " ".to_string(),
            fg,
            bg,
            attrs: CellAttrs::empty(),
        }
    }

    /// Continuation cell of a wide character
    pub fn is_continuation(&self) -> bool {
        self.text.is_empty()
    }

    /// Text as it should be emitted; zero-width content prints as a space
    pub fn printable(&self) -> &str {
        if self.text.width() == 0 {
            " "
        } else {
            &self.text
        }
    }
}

impl Default for CanvasCell {
    fn default() -> Self {
        Self::blank(Color::new(229, 229, 229), Color::new(0, 0, 0))
    }
}

#[derive(Debug, Default)]
pub struct Canvas {
    cols: u16,
    rows: u16,
    cells: Vec<CanvasCell>,
    dirty: Vec<bool>,
}

impl Canvas {
    #[allow(dead_code)]
    pub fn new(cols: u16, rows: u16) -> Self {
        let mut canvas = Self::default();
        canvas.resize(cols, rows);
        canvas
    }

    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// Reallocate to a new size; everything becomes dirty
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.cells = vec![CanvasCell::default(); cols as usize * rows as usize];
        self.dirty = vec![true; rows as usize];
    }

    /// Store a cell, marking its row dirty if it changed
    ///
    /// Out-of-range writes are ignored.
    pub fn set(&mut self, row: u16, col: u16, cell: CanvasCell) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let idx = row as usize * self.cols as usize + col as usize;
        if self.cells[idx] != cell {
            self.cells[idx] = cell;
            self.dirty[row as usize] = true;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = true);
    }

    pub fn has_dirty(&self) -> bool {
        self.dirty.iter().any(|d| *d)
    }

    /// Indices of rows changed since the last call, clearing the marks
    pub fn take_dirty_rows(&mut self) -> Vec<u16> {
        let rows = self
            .dirty
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .map(|(i, _)| i as u16)
            .collect();
        self.dirty.iter_mut().for_each(|d| *d = false);
        rows
    }

    pub fn row(&self, row: u16) -> &[CanvasCell] {
        if row >= self.rows {
            return &[];
        }
        let start = row as usize * self.cols as usize;
        &self.cells[start..start + self.cols as usize]
    }

    /// Plain text of a row, trailing blanks removed
    #[cfg(test)]
    pub fn row_text(&self, row: u16) -> String {
        let text: String = self
            .row(row)
            .iter()
            .filter(|c| !c.is_continuation())
            .map(|c| c.printable())
            .collect();
        text.trim_end().to_string()
    }
}
