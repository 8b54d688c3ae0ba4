//! Capture presenter for programmatic play and tests.
//!
//! Story-window output accumulates in a buffer the driver drains after
//! each step; the upper window and status line are kept separately so
//! they never leak into observations. Guest saves go to an in-memory
//! slot. Input never blocks: `read_line` answers from a queue the driver
//! fills, one line per step.

use crate::screen_trait::{RestartStage, Screen, ZC_RETURN, ZC_TIME_OUT};
use log::debug;
use std::collections::VecDeque;

pub struct HeadlessScreen {
    /// Lower (story) window text since the last drain
    output: String,
    /// Upper window contents, row-major; rebuilt on split
    upper: Vec<String>,
    current_window: u16,
    cursor: (u16, u16),
    status_line: String,
    /// Queued input lines, one consumed per read
    pending_input: VecDeque<String>,
    /// In-memory slot for guest-initiated save/restore
    save_slot: Option<Vec<u8>>,
    fatal_message: Option<String>,
    rows: u8,
    cols: u8,
}

impl HeadlessScreen {
    pub fn new() -> Self {
        HeadlessScreen {
            output: String::new(),
            upper: Vec::new(),
            current_window: 0,
            cursor: (1, 1),
            status_line: String::new(),
            pending_input: VecDeque::new(),
            save_slot: None,
            fatal_message: None,
            rows: 24,
            cols: 80,
        }
    }

    /// Queue the next input line.
    pub fn push_input(&mut self, line: &str) {
        self.pending_input.push_back(line.to_string());
    }

    pub fn has_pending_input(&self) -> bool {
        !self.pending_input.is_empty()
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn fatal_message(&self) -> Option<&str> {
        self.fatal_message.as_deref()
    }
}

impl Default for HeadlessScreen {
    fn default() -> Self {
        HeadlessScreen::new()
    }
}

impl Screen for HeadlessScreen {
    fn display_char(&mut self, c: u16) {
        if self.current_window != 0 {
            // Upper-window text is positional; keep it out of the
            // observation stream.
            let row = self.cursor.0.max(1) as usize - 1;
            if row < self.upper.len() {
                self.upper[row].push(char::from_u32(c as u32).unwrap_or('?'));
            }
            self.cursor.1 += 1;
            return;
        }
        match c {
            13 => self.output.push('\n'),
            0 => {}
            _ => self.output.push(char::from_u32(c as u32).unwrap_or('?')),
        }
    }

    fn erase_window(&mut self, window: i16) {
        debug!("headless: erase_window({window})");
        match window {
            -1 | -2 => {
                self.output.clear();
                self.upper.clear();
            }
            0 => self.output.clear(),
            1 => {
                for row in &mut self.upper {
                    row.clear();
                }
            }
            _ => {}
        }
    }

    fn erase_line(&mut self) {}

    fn split_window(&mut self, lines: u16) {
        debug!("headless: split_window({lines})");
        self.upper.resize(lines as usize, String::new());
    }

    fn set_window(&mut self, window: u16) {
        self.current_window = window;
        if window != 0 {
            self.cursor = (1, 1);
        }
    }

    fn set_cursor(&mut self, row: u16, col: u16) {
        self.cursor = (row, col);
    }

    fn set_text_style(&mut self, _style: u16) {}

    fn set_colour(&mut self, _foreground: u16, _background: u16) {}

    fn set_font(&mut self, font: u16) -> u16 {
        if font == 1 || font == 4 {
            1
        } else {
            0
        }
    }

    fn buffer_mode(&mut self, _buffered: bool) {}

    fn has_pending_input(&self) -> bool {
        !self.pending_input.is_empty()
    }

    fn queue_input(&mut self, line: &str) {
        self.push_input(line);
    }

    fn read_key(&mut self, _timeout: u16) -> u8 {
        // Keystroke reads consume the head of the queued line.
        match self.pending_input.front_mut() {
            Some(line) if !line.is_empty() => {
                let c = line.remove(0);
                if line.is_empty() {
                    self.pending_input.pop_front();
                }
                c as u8
            }
            Some(_) => {
                self.pending_input.pop_front();
                ZC_RETURN
            }
            None => ZC_TIME_OUT,
        }
    }

    fn read_line(&mut self, max: usize, _initial: &str, _timeout: u16) -> (String, u8) {
        match self.pending_input.pop_front() {
            Some(line) => {
                let mut line = line;
                line.truncate(max);
                (line, ZC_RETURN)
            }
            None => (String::new(), ZC_TIME_OUT),
        }
    }

    fn show_status(&mut self, location: &str, score: i16, moves: u16) {
        self.status_line = format!("{location}  Score: {score}  Moves: {moves}");
    }

    fn restart_game(&mut self, stage: RestartStage) {
        if stage == RestartStage::Begin {
            self.output.clear();
            self.upper.clear();
            self.current_window = 0;
        }
    }

    fn request_save(&mut self, data: &[u8]) -> bool {
        self.save_slot = Some(data.to_vec());
        true
    }

    fn request_restore(&mut self) -> Option<Vec<u8>> {
        self.save_slot.clone()
    }

    fn fatal(&mut self, message: &str) {
        debug!("headless: fatal: {message}");
        self.fatal_message = Some(message.to_string());
    }

    fn rows(&self) -> u8 {
        self.rows
    }

    fn cols(&self) -> u8 {
        self.cols
    }

    fn drain_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_window_text_is_drained() {
        let mut screen = HeadlessScreen::new();
        screen.display_string("West of House");
        screen.display_char(13);
        assert_eq!(screen.drain_output(), "West of House\n");
        assert_eq!(screen.drain_output(), "");
    }

    #[test]
    fn upper_window_stays_out_of_observations() {
        let mut screen = HeadlessScreen::new();
        screen.split_window(1);
        screen.set_window(1);
        screen.display_string("STATUS");
        screen.set_window(0);
        screen.display_string("story text");
        assert_eq!(screen.drain_output(), "story text");
    }

    #[test]
    fn queued_lines_feed_read_line() {
        let mut screen = HeadlessScreen::new();
        screen.push_input("open mailbox");
        let (line, term) = screen.read_line(40, "", 0);
        assert_eq!(line, "open mailbox");
        assert_eq!(term, ZC_RETURN);
        let (_, term) = screen.read_line(40, "", 0);
        assert_eq!(term, ZC_TIME_OUT);
    }

    #[test]
    fn save_slot_round_trips() {
        let mut screen = HeadlessScreen::new();
        assert!(screen.request_restore().is_none());
        assert!(screen.request_save(b"snapshot"));
        assert_eq!(screen.request_restore().unwrap(), b"snapshot");
    }
}
