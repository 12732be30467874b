//! REPL commands
//!
//! Plain lines are chat messages; lines starting with `/` are commands for
//! inspecting and curating the traveller's memory.

use std::fmt;

/// Built-in slash commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Memory,
    Remember,
    Forget,
    Consolidate,
    Clear,
    Undo,
    Save,
    Quit,
    Exit,
}

impl SlashCommand {
    pub fn all() -> &'static [SlashCommand] {
        &[
            SlashCommand::Help,
            SlashCommand::Memory,
            SlashCommand::Remember,
            SlashCommand::Forget,
            SlashCommand::Consolidate,
            SlashCommand::Clear,
            SlashCommand::Undo,
            SlashCommand::Save,
            SlashCommand::Quit,
            SlashCommand::Exit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SlashCommand::Help => "help",
            SlashCommand::Memory => "memory",
            SlashCommand::Remember => "remember",
            SlashCommand::Forget => "forget",
            SlashCommand::Consolidate => "consolidate",
            SlashCommand::Clear => "clear",
            SlashCommand::Undo => "undo",
            SlashCommand::Save => "save",
            SlashCommand::Quit => "quit",
            SlashCommand::Exit => "exit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SlashCommand::Help => "Show available commands",
            SlashCommand::Memory => "Show profile, global and session notes",
            SlashCommand::Remember => "Add a long-term note: /remember <text>",
            SlashCommand::Forget => "Delete a note: /forget <global|session> <n>",
            SlashCommand::Consolidate => "Merge session notes into long-term memory",
            SlashCommand::Clear => "Clear the conversation (memory is kept)",
            SlashCommand::Undo => "Remove the last exchange from the conversation",
            SlashCommand::Save => "Save state now",
            SlashCommand::Quit => "Save and quit",
            SlashCommand::Exit => "Save and quit",
        }
    }

    pub fn parse(name: &str) -> Option<SlashCommand> {
        let name = name.to_lowercase();
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }
}

impl fmt::Display for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Which note list a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTier {
    Global,
    Session,
}

impl MemoryTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "global" | "g" => Some(Self::Global),
            "session" | "s" => Some(Self::Session),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Session => write!(f, "session"),
        }
    }
}

/// A parsed line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Message for the concierge
    Chat(String),
    Help,
    Memory,
    Remember(String),
    /// `index` is 1-based, as shown by `/memory`
    Forget { tier: MemoryTier, index: usize },
    Consolidate,
    Clear,
    Undo,
    Save,
    Quit,
    /// Known command with bad arguments; carries the usage text
    Usage(SlashCommand),
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let Some(rest) = input.strip_prefix('/') else {
        return Some(Command::Chat(input.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let Some(cmd) = SlashCommand::parse(name) else {
        return Some(Command::Unknown(name.to_string()));
    };

    let parsed = match cmd {
        SlashCommand::Help => Command::Help,
        SlashCommand::Memory => Command::Memory,
        SlashCommand::Remember if args.is_empty() => Command::Usage(cmd),
        SlashCommand::Remember => Command::Remember(args.to_string()),
        SlashCommand::Forget => parse_forget(args).unwrap_or(Command::Usage(cmd)),
        SlashCommand::Consolidate => Command::Consolidate,
        SlashCommand::Clear => Command::Clear,
        SlashCommand::Undo => Command::Undo,
        SlashCommand::Save => Command::Save,
        SlashCommand::Quit | SlashCommand::Exit => Command::Quit,
    };
    Some(parsed)
}

fn parse_forget(args: &str) -> Option<Command> {
    let mut parts = args.split_whitespace();
    let tier = MemoryTier::parse(parts.next()?)?;
    let index: usize = parts.next()?.parse().ok()?;
    if index == 0 || parts.next().is_some() {
        return None;
    }
    Some(Command::Forget { tier, index })
}

/// Help text listing every command
pub fn help_text() -> String {
    let mut out = String::from("Commands:\n");
    for cmd in SlashCommand::all() {
        out.push_str(&format!("  {:<14} {}\n", cmd.to_string(), cmd.description()));
    }
    out.push_str("Anything else is sent to the concierge.");
    out
}
