use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a fresh conversation
    Clear,
    /// Cancel the request in progress
    Cancel,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Clear => "discard this conversation and start over",
            SlashCommand::Cancel => "cancel the request in progress",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a request is pending.
    pub fn available_while_pending(self) -> bool {
        match self {
            SlashCommand::Cancel | SlashCommand::Help | SlashCommand::Quit => true,
            SlashCommand::Clear => false,
        }
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let tail: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head).ok().or_else(|| match head.as_str() {
        "q" | "exit" | "bye" => Some(SlashCommand::Quit),
        "reset" | "new" => Some(SlashCommand::Clear),
        "stop" => Some(SlashCommand::Cancel),
        "h" | "?" => Some(SlashCommand::Help),
        _ => None,
    })?;

    let argument = if tail.is_empty() {
        None
    } else {
        Some(tail.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n");
    for entry in command_entries() {
        help.push_str(&format!("/{} - {}\n", entry.keyword, entry.description));
    }

    help.push_str("\nAliases: /q, /exit, /bye for /quit; /reset for /clear; /stop for /cancel.");
    help.push_str("\nEnter sends, Shift+Enter inserts a newline, Esc cancels, PageUp/PageDown scroll.");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_and_aliases() {
        let parsed = parse_slash_command("/clear").unwrap();
        assert_eq!(parsed.command, SlashCommand::Clear);
        assert_eq!(parsed.argument, None);

        assert_eq!(parse_slash_command("/Q").unwrap().command, SlashCommand::Quit);
        assert_eq!(parse_slash_command("  /stop ").unwrap().command, SlashCommand::Cancel);
        assert_eq!(
            parse_slash_command("/help me please").unwrap().argument.as_deref(),
            Some("me please")
        );
    }

    #[test]
    fn ordinary_text_is_not_a_command() {
        assert!(parse_slash_command("hello /quit").is_none());
        assert!(parse_slash_command("/").is_none());
        assert!(parse_slash_command("/unknown").is_none());
    }

    #[test]
    fn clear_is_blocked_while_pending() {
        assert!(!SlashCommand::Clear.available_while_pending());
        assert!(SlashCommand::Cancel.available_while_pending());
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for entry in command_entries() {
            assert!(help.contains(&format!("/{}", entry.keyword)));
        }
    }
}
