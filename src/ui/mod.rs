//! User interface: drawing and input.
//!
//! - **canvas**: cell grid with per-row dirty tracking
//! - **display**: theme-resolved screen model, selection overlay, fonts
//! - **window**: the `Surface` trait and the host-terminal implementation
//! - **keymapper**: keyboard input to PTY byte sequence mapping

pub mod canvas;
pub mod display;
pub mod keymapper;
pub mod window;
