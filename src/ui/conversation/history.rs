//! Conversation history display component

use crate::session::{Message, Role, Snapshot};
use crate::ui::conversation::indicator::PendingIndicator;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget, Widget},
};
use std::cell::Cell;
use uuid::Uuid;

const EMPTY_HINT: &str = "Start a conversation by typing a message below...";

/// Conversation history display component
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    session_id: Uuid,
    messages: Vec<Message>,
    pending: bool,
    indicator: PendingIndicator,
    show_timestamps: bool,
    /// First visible line while scrolled back; `None` follows new messages
    scroll_top: Option<usize>,
    /// Largest valid `scroll_top` at the last render
    max_top: Cell<usize>,
    page_height: Cell<usize>,
}

impl ConversationHistory {
    pub fn new(show_timestamps: bool) -> Self {
        Self {
            session_id: Uuid::nil(),
            messages: Vec::new(),
            pending: false,
            indicator: PendingIndicator::new(),
            show_timestamps,
            scroll_top: None,
            max_top: Cell::new(0),
            page_height: Cell::new(10),
        }
    }

    /// Replace the displayed state with a controller snapshot
    pub fn update(&mut self, snapshot: &Snapshot) {
        if snapshot.session_id != self.session_id {
            self.session_id = snapshot.session_id;
            self.scroll_top = None;
        }
        self.messages = snapshot.messages.clone();
        self.pending = snapshot.is_pending();
    }

    pub fn tick(&mut self) {
        if self.pending {
            self.indicator.tick();
        }
    }

    pub fn is_following(&self) -> bool {
        self.scroll_top.is_none()
    }

    /// Scroll up, pinning the view so new lines do not move it
    pub fn scroll_up(&mut self, lines: usize) {
        let max_top = self.max_top.get();
        if max_top == 0 || lines == 0 {
            return;
        }
        let top = self.scroll_top.unwrap_or(max_top).min(max_top);
        self.scroll_top = Some(top.saturating_sub(lines));
    }

    /// Scroll down; reaching the bottom resumes following
    pub fn scroll_down(&mut self, lines: usize) {
        if let Some(top) = self.scroll_top {
            let next = top + lines;
            self.scroll_top = (next < self.max_top.get()).then_some(next);
        }
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.page_height.get().saturating_sub(1).max(1));
    }

    pub fn page_down(&mut self) {
        self.scroll_down(self.page_height.get().saturating_sub(1).max(1));
    }

    /// Scroll to bottom
    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = None;
    }

    fn all_lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for message in &self.messages {
            lines.extend(self.render_message(message, width));
            // spacing between messages
            lines.push(Line::default());
        }
        if self.pending {
            lines.push(self.indicator.line());
        }
        lines
    }

    /// Render a single message into lines
    fn render_message(&self, message: &Message, width: u16) -> Vec<Line<'static>> {
        let style = content_style(message.role());
        let mut header = vec![Span::styled(
            message.role().label(),
            style.add_modifier(Modifier::BOLD),
        )];
        if self.show_timestamps {
            let timestamp = message.created_at().with_timezone(&chrono::Local).format("%H:%M:%S");
            header.push(Span::styled(
                format!("  {timestamp}"),
                Style::default().fg(Color::DarkGray),
            ));
        }

        let mut lines = vec![Line::from(header)];
        for content_line in wrap_text(message.content(), width.saturating_sub(2) as usize) {
            lines.push(Line::from(vec![Span::raw("  "), Span::styled(content_line, style)]));
        }
        lines
    }
}

impl Widget for &ConversationHistory {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = if self.is_following() {
            "Conversation"
        } else {
            "Conversation (scrolled, PageDown to follow)"
        };
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner_area = block.inner(area);
        block.render(area, buf);

        let height = inner_area.height as usize;
        self.page_height.set(height);

        if self.messages.is_empty() && !self.pending {
            let hint = Line::from(vec![Span::styled(EMPTY_HINT, Style::default().fg(Color::Gray))]);
            if height > 0 {
                buf.set_line(inner_area.x, inner_area.y + (height as u16 / 2), &hint, inner_area.width);
            }
            self.max_top.set(0);
            return;
        }

        // Leave a column for the scrollbar.
        let text_width = inner_area.width.saturating_sub(1);
        let all_lines = self.all_lines(text_width);
        let total = all_lines.len();
        let max_top = total.saturating_sub(height);
        self.max_top.set(max_top);

        let start = self.scroll_top.map_or(max_top, |top| top.min(max_top));
        let end = (start + height).min(total);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, text_width);
        }

        if max_top > 0 {
            let mut state = ScrollbarState::new(max_top).position(start);
            Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .render(inner_area, buf, &mut state);
        }
    }
}

/// Get content style based on role
fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Cyan),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::SystemError => Style::default().fg(Color::Red),
    }
}

/// Wrap text to fit within the given width, keeping explicit line breaks
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            // Hard-split words longer than a full line.
            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current_line));
                    current_len = 0;
                }
                lines.push(word.drain(..width).collect());
            }

            if current_len > 0 && current_len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            if current_len > 0 {
                current_line.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current_line.extend(word);
        }

        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextPolicy;
    use crate::error::CompletionError;
    use crate::llm::{CompletionClient, LlmMessage};
    use crate::session::SessionController;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl CompletionClient for Echo {
        async fn complete(&self, messages: &[LlmMessage]) -> Result<String, CompletionError> {
            Ok(format!("echo: {}", messages.last().map(|m| m.content.as_str()).unwrap_or("")))
        }
    }

    async fn snapshot_with_turns(turns: usize) -> Snapshot {
        let session = SessionController::new(Arc::new(Echo), ContextPolicy::LatestOnly);
        for i in 0..turns {
            session.submit(&format!("message number {i}")).await.unwrap();
        }
        session.snapshot()
    }

    fn buffer_text(buf: &Buffer) -> String {
        let area = buf.area;
        let mut out = String::new();
        for y in area.y..area.y + area.height {
            for x in area.x..area.x + area.width {
                out.push_str(buf.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    fn render(history: &ConversationHistory, width: u16, height: u16) -> String {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        history.render(area, &mut buf);
        buffer_text(&buf)
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap_text("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_text("first\nsecond", 20), vec!["first", "second"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn empty_history_shows_hint() {
        let history = ConversationHistory::new(false);
        let text = render(&history, 60, 8);
        assert!(text.contains(EMPTY_HINT));
    }

    #[tokio::test]
    async fn follows_the_newest_message() {
        let mut history = ConversationHistory::new(false);
        history.update(&snapshot_with_turns(10).await);

        let text = render(&history, 60, 8);
        assert!(text.contains("echo: message number 9"));
        assert!(!text.contains("message number 0"));
    }

    #[tokio::test]
    async fn scrolling_up_reveals_older_messages() {
        let mut history = ConversationHistory::new(false);
        history.update(&snapshot_with_turns(10).await);
        render(&history, 60, 8);

        history.scroll_up(1_000);
        assert!(!history.is_following());
        let text = render(&history, 60, 8);
        assert!(text.contains("message number 0"));

        history.scroll_down(1_000);
        assert!(history.is_following());
        assert!(render(&history, 60, 8).contains("echo: message number 9"));
    }

    /// Rendered rows without the scrollbar and right border columns
    fn text_rows(history: &ConversationHistory, width: u16, height: u16) -> Vec<String> {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        history.render(area, &mut buf);
        (0..height)
            .map(|y| (0..width - 2).map(|x| buf.get(x, y).symbol()).collect())
            .collect()
    }

    #[tokio::test]
    async fn scrolled_view_stays_put_as_messages_arrive() {
        let session = SessionController::new(Arc::new(Echo), ContextPolicy::LatestOnly);
        for i in 0..10 {
            session.submit(&format!("message number {i}")).await.unwrap();
        }

        let mut history = ConversationHistory::new(false);
        history.update(&session.snapshot());
        render(&history, 60, 8);
        history.scroll_up(10);
        let before = text_rows(&history, 60, 8);

        session.submit("message number 10").await.unwrap();
        history.update(&session.snapshot());
        assert!(!history.is_following());
        assert_eq!(text_rows(&history, 60, 8), before);

        history.scroll_to_bottom();
        assert!(render(&history, 60, 8).contains("echo: message number 10"));
    }

    #[tokio::test]
    async fn reset_snapshot_resumes_following() {
        let mut history = ConversationHistory::new(false);
        history.update(&snapshot_with_turns(5).await);
        render(&history, 60, 6);
        history.page_up();
        assert!(!history.is_following());

        history.update(&snapshot_with_turns(1).await);
        assert!(history.is_following());
    }

    #[test]
    fn pending_snapshot_shows_thinking_row() {
        let mut history = ConversationHistory::new(true);
        let snapshot = Snapshot {
            request_state: crate::session::RequestState::Pending,
            ..Snapshot::default()
        };
        history.update(&snapshot);
        assert!(render(&history, 60, 6).contains("Thinking"));
    }
}
