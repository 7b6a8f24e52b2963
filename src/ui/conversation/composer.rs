use crate::ui::conversation::commands::{
    CommandEntry, ParsedCommand, command_entries, parse_slash_command,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Byte offset, always on a char boundary
    pub cursor_position: usize,
}

/// Conversation composer for user input
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    /// Plain-text sends are refused while a request is pending
    send_enabled: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            send_enabled: true,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else if self.show_command_palette && self.apply_selected_command() {
                    return ComposerResult::None;
                } else if !self.state.content.trim().is_empty() {
                    if let Some(command) = parse_slash_command(&self.state.content) {
                        self.clear();
                        return ComposerResult::Command(command);
                    }
                    if self.send_enabled {
                        let content = std::mem::take(&mut self.state.content);
                        self.state.cursor_position = 0;
                        self.close_command_palette();
                        return ComposerResult::Submitted(content);
                    }
                }
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => {
                self.apply_selected_command();
            }
            KeyCode::Char(_)
                if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {}
            KeyCode::Char(c) => {
                self.insert_char(c);
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => {
                self.state.cursor_position = self.prev_boundary();
            }
            KeyCode::Right => {
                self.state.cursor_position = self.next_boundary();
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.content.len();
            }
            _ => {}
        }

        ComposerResult::None
    }

    /// Insert a character at the cursor position
    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor_position, c);
        self.state.cursor_position += c.len_utf8();
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        if self.state.cursor_position == 0 {
            return false;
        }
        let prev = self.prev_boundary();
        self.state.content.remove(prev);
        self.state.cursor_position = prev;
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor_position >= self.state.content.len() {
            return false;
        }
        self.state.content.remove(self.state.cursor_position);
        true
    }

    fn prev_boundary(&self) -> usize {
        self.state.content[..self.state.cursor_position]
            .char_indices()
            .next_back()
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    fn next_boundary(&self) -> usize {
        self.state.content[self.state.cursor_position..]
            .chars()
            .next()
            .map(|c| self.state.cursor_position + c.len_utf8())
            .unwrap_or(self.state.content.len())
    }

    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let typing_keyword = content.starts_with('/') && !content.contains(char::is_whitespace);
        if typing_keyword {
            if !self.show_command_palette {
                self.show_command_palette = true;
                self.selected_command = Some(0);
            }
            self.refresh_command_palette();
        } else if self.show_command_palette {
            self.close_command_palette();
        }
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        self.selected_command = if self.filtered_commands.is_empty() {
            None
        } else {
            let index = self.selected_command.unwrap_or(0);
            Some(index.min(self.filtered_commands.len() - 1))
        };
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            return false;
        };

        let completed = format!("/{}", entry.keyword);
        if self.state.content == completed {
            self.close_command_palette();
            return false;
        }

        self.state.content = completed;
        self.state.cursor_position = self.state.content.len();
        self.close_command_palette();
        true
    }

    pub fn set_send_enabled(&mut self, enabled: bool) {
        self.send_enabled = enabled;
    }

    pub fn palette_open(&self) -> bool {
        self.show_command_palette
    }

    /// Get current content
    pub fn content(&self) -> &str {
        &self.state.content
    }

    /// Put text back into an empty composer after a rejected send
    pub fn restore(&mut self, text: String) {
        if self.state.content.is_empty() {
            self.state.cursor_position = text.len();
            self.state.content = text;
        }
    }

    /// Clear content
    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
        self.close_command_palette();
    }

    /// Rows needed to show the current content, borders included
    pub fn desired_height(&self) -> u16 {
        let lines = self.state.content.split('\n').count().clamp(1, 6);
        lines as u16 + 2
    }

    fn title(&self) -> &'static str {
        if self.send_enabled {
            "Message (Enter to send)"
        } else {
            "Waiting for reply... (Esc to cancel)"
        }
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border_style = if self.send_enabled {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .style(border_style);

        let inner_area = block.inner(area);
        block.render(area, buf);

        if inner_area.height == 0 || inner_area.width == 0 {
            return;
        }

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let mut content = self.state.content.clone();
            content.insert(self.state.cursor_position.min(content.len()), '▌');

            let lines: Vec<&str> = content.split('\n').collect();
            let height = inner_area.height as usize;
            let start = lines.len().saturating_sub(height);
            for (i, line_text) in lines[start..].iter().enumerate() {
                let line = Line::from(vec![Span::raw(*line_text)]);
                buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
            }
        }

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(5) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height < 3 {
                return;
            }

            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            ratatui::widgets::Clear.render(palette_area, buf);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if !self.send_enabled && !entry.command.available_while_pending() {
                    Style::default().fg(Color::DarkGray)
                } else if self.selected_command == Some(index) {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled("  ", Style::default()),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::conversation::commands::SlashCommand;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            composer.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "Hello");

        let result = composer.handle_key(key(KeyCode::Enter));
        assert_eq!(result, ComposerResult::Submitted("Hello".into()));
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn blank_input_is_not_submitted() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "   ");
        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ComposerResult::None);
        assert_eq!(composer.content(), "   ");
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "a");
        composer.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT));
        type_text(&mut composer, "b");
        assert_eq!(composer.content(), "a\nb");
        assert_eq!(composer.desired_height(), 4);
    }

    #[test]
    fn sends_are_held_while_disabled() {
        let mut composer = ConversationComposer::new("Type...");
        composer.set_send_enabled(false);
        type_text(&mut composer, "next question");

        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ComposerResult::None);
        assert_eq!(composer.content(), "next question");

        composer.set_send_enabled(true);
        assert_eq!(
            composer.handle_key(key(KeyCode::Enter)),
            ComposerResult::Submitted("next question".into())
        );
    }

    #[test]
    fn commands_work_while_disabled() {
        let mut composer = ConversationComposer::new("Type...");
        composer.set_send_enabled(false);
        type_text(&mut composer, "/cancel ");

        match composer.handle_key(key(KeyCode::Enter)) {
            ComposerResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::Cancel),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn palette_completes_selected_command() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "/cl");
        composer.handle_key(key(KeyCode::Tab));
        assert_eq!(composer.content(), "/clear");

        match composer.handle_key(key(KeyCode::Enter)) {
            ComposerResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::Clear),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn fully_typed_command_runs_on_first_enter() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "/help");

        match composer.handle_key(key(KeyCode::Enter)) {
            ComposerResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::Help),
            other => panic!("expected command, got {other:?}"),
        }
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn renders_into_areas_without_inner_rows() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "hello");
        for height in 0..=3 {
            let area = Rect::new(0, 0, 30, height);
            let mut buf = Buffer::empty(area);
            composer.render(area, &mut buf);
        }
    }

    #[test]
    fn palette_greys_commands_unavailable_while_pending() {
        let mut composer = ConversationComposer::new("Type...");
        composer.set_send_enabled(false);
        type_text(&mut composer, "/");
        assert!(composer.palette_open());

        // Palette is drawn above the composer area.
        let full = Rect::new(0, 0, 40, 12);
        let mut buf = Buffer::empty(full);
        composer.render(Rect::new(0, 9, 40, 3), &mut buf);

        let clear_row = (0..full.height)
            .find(|&y| {
                let row: String = (0..full.width).map(|x| buf.get(x, y).symbol()).collect();
                row.contains("/clear")
            })
            .unwrap();
        let clear_x = (0..full.width)
            .find(|&x| buf.get(x, clear_row).symbol() == "/")
            .unwrap();
        assert_eq!(buf.get(clear_x, clear_row).fg, Color::DarkGray);

        composer.handle_key(key(KeyCode::Esc));
        assert!(!composer.palette_open());
    }

    #[test]
    fn cursor_editing_respects_multibyte_chars() {
        let mut composer = ConversationComposer::new("Type...");
        type_text(&mut composer, "héllo");
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Backspace));
        assert_eq!(composer.content(), "hllo");

        composer.handle_key(key(KeyCode::Home));
        composer.handle_key(key(KeyCode::Delete));
        assert_eq!(composer.content(), "llo");
    }

    #[test]
    fn restore_only_fills_empty_composer() {
        let mut composer = ConversationComposer::new("Type...");
        composer.restore("lost text".into());
        assert_eq!(composer.content(), "lost text");

        composer.restore("other".into());
        assert_eq!(composer.content(), "lost text");
    }

    #[test]
    fn renders_placeholder_when_empty() {
        let composer = ConversationComposer::new("Type your message here...");
        let area = Rect::new(0, 0, 40, 3);
        let mut buf = Buffer::empty(area);
        (&composer).render(area, &mut buf);

        let row: String = (0..area.width)
            .map(|x| buf.get(x, 1).symbol().to_string())
            .collect();
        assert!(row.contains("Type your message here..."));
    }
}
