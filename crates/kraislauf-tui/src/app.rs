use std::path::PathBuf;

use kraislauf_core::{Conversation, ImageUpload};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    ImagePath,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text buffer with a character cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInput {
    text: String,
    cursor: usize,
}

impl LineInput {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| !c.is_control()) {
            self.insert(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Transcript and the single pending request live here
    pub conversation: Conversation,

    pub query_input: LineInput,
    pub image_input: LineInput,
    pub status: Option<String>,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub api_url: String,
}

impl App {
    pub fn new(conversation: Conversation, api_url: &str) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            conversation,
            query_input: LineInput::default(),
            image_input: LineInput::default(),
            status: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            api_url: api_url.to_string(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.conversation.is_awaiting_response()
    }

    /// Send the typed question. The input is only cleared if the
    /// conversation accepted it.
    pub fn submit_query(&mut self) {
        if self.conversation.submit(self.query_input.text()) {
            self.query_input.clear();
            self.status = None;
            self.animation_frame = 0;
            // Scroll to bottom so "Thinking..." is visible
            self.scroll_to_bottom();
        } else if self.is_loading() {
            self.status = Some("Still waiting for the last answer...".to_string());
        }
    }

    pub fn start_image_prompt(&mut self) {
        self.image_input.clear();
        self.status = None;
        self.input_mode = InputMode::ImagePath;
    }

    pub async fn submit_image(&mut self) {
        let raw = self.image_input.text().trim();
        if raw.is_empty() {
            return;
        }
        if self.is_loading() {
            self.status = Some("Still waiting for the last answer...".to_string());
            return;
        }

        let path = expand_tilde(raw);
        match ImageUpload::from_path(&path).await {
            Ok(image) => {
                info!(path = %path.display(), "Uploading image");
                if self.conversation.submit_image(image) {
                    self.image_input.clear();
                    self.status = None;
                    self.input_mode = InputMode::Editing;
                    self.scroll_to_bottom();
                }
            }
            Err(e) => {
                self.status = Some(e.to_string());
            }
        }
    }

    /// Tick animation frame and pick up a finished reply (called by Tick event)
    pub fn tick(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if self.conversation.poll_settled() {
            self.scroll_to_bottom();
        }
    }

    pub fn scroll_down(&mut self) {
        let max = self.total_chat_lines().saturating_sub(self.visible_height());
        self.chat_scroll = (self.chat_scroll + 1).min(max);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self
            .total_chat_lines()
            .saturating_sub(self.visible_height());
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Estimate of rendered transcript lines after wrapping.
    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.conversation.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content().lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 {
                    1
                } else {
                    (char_count / wrap_width) + 1
                };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.is_loading() {
            total_lines = total_lines.saturating_add(2); // Role line + "Thinking..."
        }
        total_lines
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
