//! Presenter contract.
//!
//! The interpreter core never draws or blocks on its own: everything
//! screen- or key-shaped goes through this trait. A terminal frontend
//! implements it with curses-alikes; the driver uses the capture
//! implementation in `screen_headless`.

use std::fmt;

/// ZSCII key codes the input paths traffic in
pub const ZC_TIME_OUT: u8 = 0x00;
pub const ZC_RETURN: u8 = 0x0d;

/// Stages of a restart, so the presenter can reset itself around the
/// header rewrite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RestartStage {
    Begin,
    WpropSet,
    End,
}

/// Everything the core requires of a presentation layer. Coordinates are
/// 1-based, timeouts are tenths of a second, characters are ZSCII unless
/// noted.
pub trait Screen {
    /// Append a character to the current window at the cursor.
    fn display_char(&mut self, c: u16);

    fn display_string(&mut self, s: &str) {
        for ch in s.chars() {
            self.display_char(ch as u16);
        }
    }

    /// Erase a window: -1 unsplits and clears, -2 clears the whole screen,
    /// 0/1 clear one window.
    fn erase_window(&mut self, window: i16);

    /// Erase from the cursor to the end of the line.
    fn erase_line(&mut self);

    /// Erase a rectangular area (1-based, inclusive corners).
    fn erase_area(&mut self, _top: u16, _left: u16, _bottom: u16, _right: u16) {}

    /// Scroll a rectangular area by the given number of lines (negative
    /// scrolls down).
    fn scroll_area(&mut self, _top: u16, _left: u16, _bottom: u16, _right: u16, _units: i16) {}

    fn split_window(&mut self, lines: u16);

    fn set_window(&mut self, window: u16);

    fn set_cursor(&mut self, row: u16, col: u16);

    fn set_text_style(&mut self, style: u16);

    fn set_colour(&mut self, foreground: u16, background: u16);

    /// Select a font, returning the previous one, or 0 if unavailable.
    fn set_font(&mut self, font: u16) -> u16;

    fn buffer_mode(&mut self, buffered: bool);

    /// Can a read be satisfied right now? Interactive presenters block,
    /// so they always can; capture presenters answer from their queue.
    fn has_pending_input(&self) -> bool {
        true
    }

    /// Queue a line for the next read. Interactive presenters have no
    /// queue and ignore this.
    fn queue_input(&mut self, _line: &str) {}

    /// Read one key; ZC_TIME_OUT on expiry.
    fn read_key(&mut self, timeout: u16) -> u8;

    /// Read an input line, echoing edits. Returns the line and the
    /// terminating key (ZC_RETURN, a terminating function key, or
    /// ZC_TIME_OUT).
    fn read_line(&mut self, max: usize, initial: &str, timeout: u16) -> (String, u8);

    /// V3 status line.
    fn show_status(&mut self, location: &str, score: i16, moves: u16);

    /// Restart notification, called at each stage.
    fn restart_game(&mut self, stage: RestartStage);

    /// Guest-initiated save: persist the snapshot, return success.
    fn request_save(&mut self, data: &[u8]) -> bool;

    /// Guest-initiated restore: produce a previously saved snapshot.
    fn request_restore(&mut self) -> Option<Vec<u8>>;

    /// Unrecoverable interpreter error.
    fn fatal(&mut self, message: &str);

    fn rows(&self) -> u8;

    fn cols(&self) -> u8;

    /// Drain the text accumulated in the story window since the last
    /// drain. Only capture presenters return anything.
    fn drain_output(&mut self) -> String {
        String::new()
    }
}

/// Screen-side failure, for frontends with real I/O underneath.
#[derive(Debug, Clone)]
pub struct ScreenError {
    pub message: String,
}

impl ScreenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Screen error: {}", self.message)
    }
}

impl std::error::Error for ScreenError {}

impl From<ScreenError> for String {
    fn from(error: ScreenError) -> String {
        error.message
    }
}
