use crate::events::AppEvent;
use crate::session::{SessionController, Snapshot};
use crate::ui::conversation::{
    ComposerResult, ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand,
    get_help_text,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Manages the conversation flow and UI components
pub struct ConversationManager {
    session: Arc<SessionController>,
    history: ConversationHistory,
    composer: ConversationComposer,
    events: mpsc::UnboundedSender<AppEvent>,
    /// One-line notice under the composer (help hints, refused commands)
    notice: Option<String>,
    pending: bool,
}

impl ConversationManager {
    pub fn new(
        session: Arc<SessionController>,
        events: mpsc::UnboundedSender<AppEvent>,
        placeholder: impl Into<String>,
        show_timestamps: bool,
    ) -> Self {
        let mut manager = Self {
            session,
            history: ConversationHistory::new(show_timestamps),
            composer: ConversationComposer::new(placeholder),
            events,
            notice: None,
            pending: false,
        };
        let snapshot = manager.session.snapshot();
        manager.apply_snapshot(&snapshot);
        manager
    }

    /// Re-render state from a controller snapshot
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.pending = snapshot.is_pending();
        self.history.update(snapshot);
        self.composer.set_send_enabled(!self.pending);
    }

    pub fn tick(&mut self) {
        self.history.tick();
    }

    pub fn handle_app_event(&mut self, event: AppEvent) -> ConversationAction {
        match event {
            AppEvent::SubmitRejected { text, kind } => {
                debug!(%kind, "submit rejected, restoring input");
                self.composer.restore(text);
                self.notice = Some("A reply is still pending; your message was kept.".to_string());
                ConversationAction::None
            }
            AppEvent::SubmitSettled { outcome } => {
                debug!(?outcome, "submit settled");
                ConversationAction::None
            }
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => return ConversationAction::Exit,
                KeyCode::Char('l') => {
                    self.run_command(SlashCommand::Clear);
                    return ConversationAction::None;
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::PageUp => {
                self.history.page_up();
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.history.page_down();
                return ConversationAction::None;
            }
            KeyCode::Esc if self.pending && !self.composer.palette_open() => {
                self.session.cancel();
                return ConversationAction::None;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(text) => {
                self.notice = None;
                self.submit(text);
                ConversationAction::None
            }
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::None => ConversationAction::None,
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.history.scroll_up(3),
            MouseEventKind::ScrollDown => self.history.scroll_down(3),
            _ => {}
        }
    }

    /// Pasted text goes into the composer verbatim
    pub fn handle_paste(&mut self, text: &str) {
        for c in text.chars() {
            let code = if c == '\n' || c == '\r' {
                KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT)
            } else {
                KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
            };
            self.composer.handle_key(code);
        }
    }

    /// Hand text to the controller on a background task
    fn submit(&mut self, text: String) {
        self.history.scroll_to_bottom();
        let session = self.session.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match session.submit(&text).await {
                Ok(outcome) => AppEvent::SubmitSettled { outcome },
                Err(err) => AppEvent::SubmitRejected {
                    text,
                    kind: err.kind(),
                },
            };
            let _ = events.send(event);
        });
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        debug!(command = command.command.command(), argument = ?command.argument, "slash command");
        if self.pending && !command.command.available_while_pending() {
            self.notice = Some(format!(
                "/{} is unavailable while a reply is pending",
                command.command.command()
            ));
            return ConversationAction::None;
        }
        self.run_command(command.command)
    }

    fn run_command(&mut self, command: SlashCommand) -> ConversationAction {
        self.notice = None;
        match command {
            SlashCommand::Clear => {
                if self.session.reset().is_err() {
                    self.notice = Some("Cannot clear while a reply is pending".to_string());
                }
                ConversationAction::None
            }
            SlashCommand::Cancel => {
                if !self.session.cancel() {
                    self.notice = Some("Nothing to cancel".to_string());
                }
                ConversationAction::None
            }
            SlashCommand::Help => {
                self.notice = Some(get_help_text());
                ConversationAction::None
            }
            SlashCommand::Quit => ConversationAction::Exit,
        }
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}

impl Widget for &ConversationManager {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let notice_lines: Vec<&str> = self.notice().map(|n| n.lines().collect()).unwrap_or_default();
        let notice_height = (notice_lines.len() as u16).min(area.height / 3);

        // History takes most space, composer and notices at the bottom.
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(self.composer.desired_height()),
                Constraint::Length(notice_height),
            ])
            .split(area);

        self.history.render(chunks[0], buf);
        self.composer.render(chunks[1], buf);

        let notice_area = chunks[2];
        for (i, text) in notice_lines.iter().take(notice_area.height as usize).enumerate() {
            let line = Line::from(vec![Span::styled(*text, Style::default().fg(Color::Yellow))]);
            buf.set_line(notice_area.x, notice_area.y + i as u16, &line, notice_area.width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextPolicy;
    use crate::error::CompletionError;
    use crate::llm::{CompletionClient, LlmMessage};
    use crate::session::Role;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl CompletionClient for Fixed {
        async fn complete(&self, _messages: &[LlmMessage]) -> Result<String, CompletionError> {
            Ok("Hi there".to_string())
        }
    }

    /// Never answers; only cancellation settles it
    struct Stalled;

    #[async_trait]
    impl CompletionClient for Stalled {
        async fn complete(&self, _messages: &[LlmMessage]) -> Result<String, CompletionError> {
            std::future::pending().await
        }
    }

    type Harness = (ConversationManager, Arc<SessionController>, mpsc::UnboundedReceiver<AppEvent>);

    fn manager_with(client: Arc<dyn CompletionClient>) -> Harness {
        let session = Arc::new(SessionController::new(client, ContextPolicy::FullHistory));
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = ConversationManager::new(session.clone(), tx, "Type...", false);
        (manager, session, rx)
    }

    fn manager() -> Harness {
        manager_with(Arc::new(Fixed))
    }

    async fn wait_pending(session: &SessionController) {
        let mut snapshots = session.subscribe();
        snapshots.wait_for(|s| s.is_pending()).await.unwrap();
    }

    fn press(manager: &mut ConversationManager, code: KeyCode) -> ConversationAction {
        manager.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[tokio::test]
    async fn typed_message_reaches_the_controller() {
        let (mut manager, session, mut rx) = manager();
        manager.handle_paste("Hello");
        press(&mut manager, KeyCode::Enter);

        match rx.recv().await.unwrap() {
            AppEvent::SubmitSettled { outcome } => {
                assert_eq!(outcome, crate::session::SubmitOutcome::Answered { sequence: 1 })
            }
            other => panic!("unexpected event {other:?}"),
        }

        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages[0].role(), Role::User);
        assert_eq!(snapshot.messages[0].content(), "Hello");
        assert_eq!(snapshot.messages[1].content(), "Hi there");
    }

    #[tokio::test]
    async fn rejected_submit_restores_text() {
        let (mut manager, _session, _rx) = manager();
        let action = manager.handle_app_event(AppEvent::SubmitRejected {
            text: "keep me".into(),
            kind: crate::error::ErrorKind::Busy,
        });
        assert_eq!(action, ConversationAction::None);
        assert_eq!(manager.composer.content(), "keep me");
        assert!(manager.notice().is_some());
    }

    #[tokio::test]
    async fn quit_and_ctrl_c_exit() {
        let (mut manager, _session, _rx) = manager();
        manager.handle_paste("/quit");
        assert_eq!(press(&mut manager, KeyCode::Enter), ConversationAction::Exit);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(manager.handle_key(ctrl_c), ConversationAction::Exit);
    }

    #[tokio::test]
    async fn clear_command_resets_session() {
        let (mut manager, session, mut rx) = manager();
        manager.handle_paste("Hello");
        press(&mut manager, KeyCode::Enter);
        rx.recv().await.unwrap();
        assert_eq!(session.snapshot().messages.len(), 2);

        manager.handle_paste("/clear");
        press(&mut manager, KeyCode::Enter);
        assert!(session.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn help_notice_renders_in_short_terminals() {
        let (mut manager, _session, _rx) = manager();
        manager.handle_paste("/help");
        press(&mut manager, KeyCode::Enter);
        assert!(manager.notice().is_some());

        for height in 0..=12 {
            let area = Rect::new(0, 0, 50, height);
            let mut buf = Buffer::empty(area);
            (&manager).render(area, &mut buf);
        }
    }

    #[tokio::test]
    async fn esc_cancels_pending_request_with_draft_text() {
        let (mut manager, session, mut rx) = manager_with(Arc::new(Stalled));
        manager.handle_paste("Hello");
        press(&mut manager, KeyCode::Enter);
        wait_pending(&session).await;
        manager.apply_snapshot(&session.snapshot());

        manager.handle_paste("follow-up draft");
        press(&mut manager, KeyCode::Esc);

        match rx.recv().await.unwrap() {
            AppEvent::SubmitSettled { outcome } => assert!(matches!(
                outcome,
                crate::session::SubmitOutcome::Failed {
                    kind: crate::error::ErrorKind::Cancelled,
                    ..
                }
            )),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(manager.composer.content(), "follow-up draft");
    }

    #[tokio::test]
    async fn esc_closes_palette_before_cancelling() {
        let (mut manager, session, _rx) = manager_with(Arc::new(Stalled));
        manager.handle_paste("Hello");
        press(&mut manager, KeyCode::Enter);
        wait_pending(&session).await;
        manager.apply_snapshot(&session.snapshot());

        manager.handle_paste("/");
        press(&mut manager, KeyCode::Esc);
        assert!(session.snapshot().is_pending());
        session.cancel();
    }

    #[tokio::test]
    async fn help_shows_notice() {
        let (mut manager, _session, _rx) = manager();
        manager.handle_paste("/help");
        press(&mut manager, KeyCode::Enter);
        assert!(manager.notice().unwrap().contains("/quit"));
    }
}
