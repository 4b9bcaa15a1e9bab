//! Error types and location tracking for CFG processing
//!
//! Every error raised while tokenizing, parsing or evaluating CFG source
//! carries the [`Location`] where the problem was detected. Errors are
//! layered: [`TokenizerError`] is wrapped by [`ParserError`], which is in turn
//! wrapped by [`ConfigError`] when a configuration is loaded or a path is
//! parsed. [`CfgError`] is the umbrella type used by the serde entry points.

use std::fmt;
use thiserror::Error;

use crate::lexer::TokenKind;

/// Represents a line and column location in CFG source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based; 0 only for the end of a line break)
    pub column: u32,
}

impl Location {
    /// Creates a location at the start of input
    pub fn new() -> Self {
        Self { line: 1, column: 1 }
    }

    /// Creates a location at the given line and column
    pub fn at(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Moves to the first column of the next line
    pub fn next_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    /// Copies another location into this one
    pub fn update(&mut self, other: &Location) {
        *self = *other;
    }

    /// Returns the location one column to the left
    pub(crate) fn previous_column(self) -> Self {
        Self {
            line: self.line,
            column: self.column.saturating_sub(1),
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.line, self.column)
    }
}

/// Context information for rendering an error against its source text
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The original source text
    pub source: String,
    /// Where the error occurred
    pub location: Location,
    /// Suggested fixes for the error
    pub suggestions: Vec<String>,
    /// Additional help text
    pub help: Option<String>,
}

impl ErrorContext {
    /// Creates a new error context
    pub fn new(source: impl Into<String>, location: Location) -> Self {
        Self {
            source: source.into(),
            location,
            suggestions: Vec::new(),
            help: None,
        }
    }

    /// Adds a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Adds help text for the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Extracts the source lines around the error with a caret marker
    pub fn source_snippet(&self) -> String {
        self.extract_lines_around(2)
    }

    /// Extracts lines around the error location with context
    pub fn extract_lines_around(&self, context_lines: usize) -> String {
        let lines: Vec<&str> = self.source.lines().collect();
        if lines.is_empty() {
            return String::new();
        }

        let error_line = (self.location.line as usize)
            .saturating_sub(1)
            .min(lines.len() - 1);
        let context_start = error_line.saturating_sub(context_lines);
        let context_end = (error_line + context_lines + 1).min(lines.len());
        let width = context_end.to_string().len();

        let mut result = String::new();
        for (i, line) in lines[context_start..context_end].iter().enumerate() {
            let line_num = context_start + i + 1;
            result.push_str(&format!("{:width$} | {}\n", line_num, line, width = width));
            if line_num == error_line + 1 {
                let spaces =
                    " ".repeat(width + 3 + (self.location.column as usize).saturating_sub(1));
                result.push_str(&format!("{}^\n", spaces));
            }
        }
        result
    }

    /// Formats the error message together with the source snippet
    pub fn format_error(&self, error_message: &str) -> String {
        let mut output = format!("Error at {}: {}\n\n", self.location, error_message);
        output.push_str(&self.source_snippet());

        if !self.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }
        if let Some(help) = &self.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }
        output
    }
}

/// Main error type for the serde-facing entry points
#[derive(Debug, Error)]
pub enum CfgError {
    /// Tokenizer error
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    /// Parser error
    #[error(transparent)]
    Parser(#[from] ParserError),
    /// Evaluation or lookup error
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Serde deserialization error
    #[error("Serde error: {0}")]
    Serde(#[from] SerdeError),
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning characters into tokens
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenizerError {
    /// A character which cannot start any token
    #[error("Unexpected character: {character}")]
    UnexpectedCharacter { character: char, location: Location },
    /// A numeric literal which is malformed or cannot be converted
    #[error("Invalid character in number: {text}")]
    InvalidNumber { text: String, location: Location },
    /// A `_` separator which does not follow a digit
    #[error("Invalid '_' in number: {text}")]
    InvalidUnderscore { text: String, location: Location },
    /// A `_` separator at the end of a numeric literal
    #[error("Invalid '_' at end of number: {text}")]
    TrailingUnderscore { text: String, location: Location },
    /// A quoted string with no closing quote
    #[error("Unterminated quoted string: {text}")]
    UnterminatedString { text: String, location: Location },
    /// A backtick string with no closing backtick
    #[error("Unterminated backtick string: {text}")]
    UnterminatedBacktick { text: String, location: Location },
    /// A control character inside a backtick string
    #[error("Invalid character {character:?} in backtick string")]
    InvalidBacktickCharacter { character: char, location: Location },
    /// An unknown or malformed escape sequence
    #[error("Invalid escape sequence at index {index}")]
    InvalidEscape { index: usize, location: Location },
    /// A string literal longer than the configured limit
    #[error("String exceeds maximum length of {limit} characters")]
    StringTooLong { limit: usize, location: Location },
}

impl TokenizerError {
    /// Returns the location where the error was detected
    pub fn location(&self) -> Location {
        match self {
            Self::UnexpectedCharacter { location, .. }
            | Self::InvalidNumber { location, .. }
            | Self::InvalidUnderscore { location, .. }
            | Self::TrailingUnderscore { location, .. }
            | Self::UnterminatedString { location, .. }
            | Self::UnterminatedBacktick { location, .. }
            | Self::InvalidBacktickCharacter { location, .. }
            | Self::InvalidEscape { location, .. }
            | Self::StringTooLong { location, .. } => *location,
        }
    }
}

/// Grammar violations found by the parser
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserError {
    /// The tokenizer failed underneath the parser
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    /// A specific token was required but another was found
    #[error("Expected {expected} but got {found}")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        location: Location,
    },
    /// A mapping key which is neither a word nor a string
    #[error("Unexpected type for key: {found}")]
    UnexpectedKeyType { found: TokenKind, location: Location },
    /// A mapping key not followed by `:` or `=`
    #[error("Expected key-value separator, found: {found}")]
    MissingSeparator { found: TokenKind, location: Location },
    /// An index or slice part holding other than exactly one expression
    #[error("Invalid index at {location}: expected 1 expression, found {found}")]
    ExpressionCount { found: usize, location: Location },
    /// A token which cannot start a value
    #[error("Unexpected when looking for value: {found}")]
    AtomExpected { found: TokenKind, location: Location },
    /// The document does not start with a mapping or list
    #[error("Expected container (mapping or list) but got {found}")]
    ContainerExpected { found: TokenKind, location: Location },
    /// Input left over after a complete path
    #[error("Unexpected trailing text: {found}")]
    TrailingText { found: TokenKind, location: Location },
    /// Maximum nesting depth exceeded
    #[error("Maximum nesting depth exceeded at {location}")]
    MaxDepthExceeded { location: Location },
}

impl ParserError {
    /// Returns the location where the error was detected
    pub fn location(&self) -> Location {
        match self {
            Self::Tokenizer(e) => e.location(),
            Self::UnexpectedToken { location, .. }
            | Self::UnexpectedKeyType { location, .. }
            | Self::MissingSeparator { location, .. }
            | Self::ExpressionCount { location, .. }
            | Self::AtomExpected { location, .. }
            | Self::ContainerExpected { location, .. }
            | Self::TrailingText { location, .. }
            | Self::MaxDepthExceeded { location } => *location,
        }
    }
}

/// Errors raised while loading, evaluating or querying a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The source could not be tokenized or parsed
    #[error(transparent)]
    Syntax(#[from] ParserError),
    /// A file could not be read
    #[error("Unable to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    /// A lookup was attempted before anything was loaded
    #[error("No configuration has been loaded")]
    NotLoaded,
    /// The top level of a configuration is not a mapping
    #[error("Root configuration must be a mapping")]
    RootNotMapping { location: Location },
    /// A key appears twice in one mapping
    #[error("Duplicate key {key} seen at {location} (previously at {original})")]
    DuplicateKey {
        key: String,
        location: Location,
        original: Location,
    },
    /// A key is absent from the configuration
    #[error("Not found in configuration: {key}")]
    NotFound {
        key: String,
        location: Option<Location>,
    },
    /// A bare word is absent from the evaluation context
    #[error("Unknown variable '{name}' at {location}")]
    UnknownVariable { name: String, location: Location },
    /// A special string matched no conversion rule
    #[error("Unable to convert string {text}")]
    Conversion { text: String },
    /// The operand of `@` did not evaluate to a string
    #[error("@ operand must be a string, but is {found}")]
    IncludeNotString { found: String, location: Location },
    /// An included file was not found on the include path
    #[error("Unable to locate {name}")]
    IncludeNotFound { name: String, location: Location },
    /// A file includes itself directly or through its ancestors
    #[error("Configuration cannot include itself: {name}")]
    SelfInclude { name: String },
    /// A binary operator applied to operands it does not support
    #[error("Unable to {operation} {lhs} and {rhs} at {location}")]
    InvalidOperands {
        operation: &'static str,
        lhs: String,
        rhs: String,
        location: Location,
    },
    /// A unary operator applied to an operand it does not support
    #[error("Unable to {operation} {operand} at {location}")]
    InvalidOperand {
        operation: &'static str,
        operand: String,
        location: Location,
    },
    /// An operation the language leaves undefined
    #[error("Operation not supported: {operation} at {location}")]
    Unsupported {
        operation: &'static str,
        location: Location,
    },
    /// Integer arithmetic overflowed
    #[error("Integer overflow in {operation} at {location}")]
    Overflow {
        operation: &'static str,
        location: Location,
    },
    /// Integer division or modulo by zero
    #[error("Division by zero at {location}")]
    DivisionByZero { location: Location },
    /// Evaluation nested deeper than the configured limit
    #[error("Maximum evaluation depth of {limit} exceeded")]
    RecursionLimit { limit: usize },
    /// A lazy value outlived the configuration that owns it
    #[error("The configuration owning this value is no longer available")]
    Detached,
    /// A lookup key could not be parsed as a path
    #[error("Invalid path: {path}")]
    InvalidPath { path: String, source: ParserError },
    /// An index or slice of the wrong type or out of range
    #[error("{message}")]
    BadIndex { message: String, location: Location },
    /// A chain of references which leads back to itself
    #[error("Circular reference: {}", format_references(.references))]
    CircularReference { references: Vec<(String, Location)> },
}

fn format_references(references: &[(String, Location)]) -> String {
    references
        .iter()
        .map(|(source, location)| format!("{} {}", source, location))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    /// Returns the location where the error was detected, if known
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Syntax(e) => Some(e.location()),
            Self::InvalidPath { source, .. } => Some(source.location()),
            Self::RootNotMapping { location }
            | Self::DuplicateKey { location, .. }
            | Self::UnknownVariable { location, .. }
            | Self::IncludeNotString { location, .. }
            | Self::IncludeNotFound { location, .. }
            | Self::InvalidOperands { location, .. }
            | Self::InvalidOperand { location, .. }
            | Self::Unsupported { location, .. }
            | Self::Overflow { location, .. }
            | Self::DivisionByZero { location }
            | Self::BadIndex { location, .. } => Some(*location),
            Self::NotFound { location, .. } => *location,
            Self::CircularReference { references } => references.first().map(|(_, loc)| *loc),
            Self::Io { .. }
            | Self::NotLoaded
            | Self::Conversion { .. }
            | Self::SelfInclude { .. }
            | Self::RecursionLimit { .. }
            | Self::Detached => None,
        }
    }

    /// Returns true if a lookup default may stand in for this error
    ///
    /// Path-shape errors, reference cycles, syntax and I/O failures always
    /// reach the caller even when a default value is supplied.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Syntax(_)
                | Self::Io { .. }
                | Self::InvalidPath { .. }
                | Self::BadIndex { .. }
                | Self::CircularReference { .. }
        )
    }
}

/// Serde integration errors
#[derive(Debug, Error)]
pub enum SerdeError {
    /// Custom serde error message
    #[error("{0}")]
    Custom(String),
    /// Type mismatch during deserialization
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
}

impl serde::de::Error for CfgError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CfgError::Serde(SerdeError::Custom(msg.to_string()))
    }
}
