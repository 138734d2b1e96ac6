//! Command parsing for `/tofubot` comments.
use std::fmt;

/// Token a comment must start with to be treated as a command.
pub const TRIGGER: &str = "/tofubot";

/// The commands tofubot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    /// Print the command overview
    Help,
    /// Request a backport of the current pull request to a release line
    Backport,
    /// Withdraw a pending backport request
    CancelBackport,
}

/// Command vocabulary, keyed by the word that follows the trigger.
pub const COMMANDS: &[(&str, CommandName)] = &[
    ("help", CommandName::Help),
    ("backport", CommandName::Backport),
    ("cancel-backport", CommandName::CancelBackport),
];

impl CommandName {
    pub fn lookup(word: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, command)| *command)
    }

    pub fn as_str(self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(_, command)| *command == self)
            .map(|(name, _)| *name)
            .unwrap_or("help")
    }

    /// Number of positional arguments the command must be given, if fixed.
    pub fn arity(self) -> Option<usize> {
        match self {
            CommandName::Help => None,
            CommandName::Backport | CommandName::CancelBackport => Some(1),
        }
    }

    /// Invocation example shown when the command is used incorrectly.
    pub fn usage(self) -> String {
        match self {
            CommandName::Help => format!("{TRIGGER} help"),
            CommandName::Backport | CommandName::CancelBackport => {
                format!("{TRIGGER} {} vX.Y", self.as_str())
            }
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command invocation extracted from a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: CommandName,
    /// Positional arguments, verbatim.
    pub args: Vec<String>,
}

impl Command {
    pub fn help() -> Self {
        Self {
            name: CommandName::Help,
            args: Vec::new(),
        }
    }

    /// Whether the argument count matches what the command requires.
    pub fn has_expected_arity(&self) -> bool {
        self.name.arity().map_or(true, |n| self.args.len() == n)
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of parsing a comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// The comment does not start with the trigger
    NotACommand,
    /// The trigger was followed by a word outside the vocabulary
    Unrecognized { attempted: String },
    /// A command from the vocabulary
    Command(Command),
}

/// Splits a comment body into tokens.
///
/// Swapping the tokenizer is how quoting support would be added without
/// touching the parser or the dispatch logic.
pub trait Tokenizer {
    fn tokenize<'a>(&self, input: &'a str) -> Vec<&'a str>;
}

/// Splits on any run of whitespace. No quoting or escaping.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize<'a>(&self, input: &'a str) -> Vec<&'a str> {
        input.split_whitespace().collect()
    }
}

#[derive(Debug, Clone)]
pub struct CommandParser<T = WhitespaceTokenizer> {
    trigger: String,
    tokenizer: T,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandParser {
    pub fn new() -> Self {
        Self::with_tokenizer(TRIGGER, WhitespaceTokenizer)
    }
}

impl<T: Tokenizer> CommandParser<T> {
    pub fn with_tokenizer(trigger: impl Into<String>, tokenizer: T) -> Self {
        Self {
            trigger: trigger.into(),
            tokenizer,
        }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Parse a comment body.
    ///
    /// The first token must be exactly the trigger. A bare trigger, or a
    /// trigger followed by `help`, is the help command; any further tokens
    /// after `help` are dropped.
    pub fn parse(&self, body: &str) -> ParseResult {
        let tokens = self.tokenizer.tokenize(body);
        let Some((first, rest)) = tokens.split_first() else {
            return ParseResult::NotACommand;
        };
        if *first != self.trigger {
            return ParseResult::NotACommand;
        }

        let Some((word, args)) = rest.split_first() else {
            return ParseResult::Command(Command::help());
        };

        match CommandName::lookup(word) {
            Some(CommandName::Help) => ParseResult::Command(Command::help()),
            Some(name) => ParseResult::Command(Command {
                name,
                args: args.iter().map(|arg| arg.to_string()).collect(),
            }),
            None => ParseResult::Unrecognized {
                attempted: word.to_string(),
            },
        }
    }
}

/// Parse a comment body with the default trigger and tokenizer.
pub fn parse_comment(body: &str) -> ParseResult {
    CommandParser::new().parse(body)
}
