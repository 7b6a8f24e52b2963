use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

/// Animated "Thinking..." row shown while a request is pending
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingIndicator {
    frame: u64,
}

impl PendingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one animation frame
    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    fn dots(&self) -> &'static str {
        match self.frame % 4 {
            0 => ".",
            1 => "..",
            2 => "...",
            _ => "   ",
        }
    }

    pub fn line(&self) -> Line<'static> {
        Line::from(vec![
            Span::styled("Assistant ", Style::default().fg(Color::Green)),
            Span::styled("Thinking", Style::default().fg(Color::Green)),
            Span::styled(self.dots(), Style::default().fg(Color::Yellow)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn dots_cycle_every_four_frames() {
        let mut indicator = PendingIndicator::new();
        assert_eq!(text(&indicator.line()), "Assistant Thinking.");
        indicator.tick();
        indicator.tick();
        assert_eq!(text(&indicator.line()), "Assistant Thinking...");
        indicator.tick();
        indicator.tick();
        assert_eq!(text(&indicator.line()), "Assistant Thinking.");
    }
}
