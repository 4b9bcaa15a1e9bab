//! Character-level tokenizer for CFG source text
//!
//! The [`Tokenizer`] reads a `&str` one character at a time, tracking the
//! [`Location`] of every character so that each [`Token`] spans exactly the
//! lexeme it was built from. A small pushback stack provides the lookahead
//! needed for multi-character operators, numeric suffixes and triple-quoted
//! strings.
//!
//! ```rust
//! use cfg_config::lexer::{TokenKind, Tokenizer};
//!
//! let mut tokenizer = Tokenizer::new("a = 0x1F");
//! let kinds: Vec<TokenKind> = tokenizer
//!     .all_tokens()
//!     .unwrap()
//!     .iter()
//!     .map(|t| t.kind)
//!     .collect();
//! assert_eq!(
//!     kinds,
//!     vec![TokenKind::Word, TokenKind::Assign, TokenKind::Integer, TokenKind::Eof]
//! );
//! ```

use std::fmt;
use std::str::Chars;

use log::trace;
use num_complex::Complex64;

use crate::error::{Location, TokenizerError};

/// The kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Eof,
    Word,
    Integer,
    Float,
    Complex,
    String,
    BackTick,
    Newline,
    LeftCurly,
    RightCurly,
    LeftBracket,
    RightBracket,
    LeftParenthesis,
    RightParenthesis,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Assign,
    Equal,
    Unequal,
    AltUnequal,
    LeftShift,
    RightShift,
    Dot,
    Comma,
    Colon,
    At,
    Plus,
    Minus,
    Star,
    Power,
    Slash,
    SlashSlash,
    Modulo,
    Dollar,
    True,
    False,
    /// The `null` keyword
    Null,
    Is,
    In,
    Not,
    And,
    Or,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseComplement,
    /// The combined `is not` comparison, produced by the parser
    IsNot,
    /// The combined `not in` comparison, produced by the parser
    NotIn,
}

impl TokenKind {
    /// Returns the upper-case name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Eof => "EOF",
            TokenKind::Word => "WORD",
            TokenKind::Integer => "INTEGER",
            TokenKind::Float => "FLOAT",
            TokenKind::Complex => "COMPLEX",
            TokenKind::String => "STRING",
            TokenKind::BackTick => "BACKTICK",
            TokenKind::Newline => "NEWLINE",
            TokenKind::LeftCurly => "LEFT_CURLY",
            TokenKind::RightCurly => "RIGHT_CURLY",
            TokenKind::LeftBracket => "LEFT_BRACKET",
            TokenKind::RightBracket => "RIGHT_BRACKET",
            TokenKind::LeftParenthesis => "LEFT_PARENTHESIS",
            TokenKind::RightParenthesis => "RIGHT_PARENTHESIS",
            TokenKind::LessThan => "LESS_THAN",
            TokenKind::GreaterThan => "GREATER_THAN",
            TokenKind::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            TokenKind::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            TokenKind::Assign => "ASSIGN",
            TokenKind::Equal => "EQUAL",
            TokenKind::Unequal => "UNEQUAL",
            TokenKind::AltUnequal => "ALT_UNEQUAL",
            TokenKind::LeftShift => "LEFT_SHIFT",
            TokenKind::RightShift => "RIGHT_SHIFT",
            TokenKind::Dot => "DOT",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
            TokenKind::At => "AT",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "STAR",
            TokenKind::Power => "POWER",
            TokenKind::Slash => "SLASH",
            TokenKind::SlashSlash => "SLASH_SLASH",
            TokenKind::Modulo => "MODULO",
            TokenKind::Dollar => "DOLLAR",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::Null => "NONE",
            TokenKind::Is => "IS",
            TokenKind::In => "IN",
            TokenKind::Not => "NOT",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::BitwiseAnd => "BITWISE_AND",
            TokenKind::BitwiseOr => "BITWISE_OR",
            TokenKind::BitwiseXor => "BITWISE_XOR",
            TokenKind::BitwiseComplement => "BITWISE_COMPLEMENT",
            TokenKind::IsNot => "IS_NOT",
            TokenKind::NotIn => "NOT_IN",
        }
    }

    /// Returns the source form of an operator kind, if it has one
    pub fn symbol(self) -> Option<&'static str> {
        let s = match self {
            TokenKind::LeftCurly => "{",
            TokenKind::RightCurly => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftParenthesis => "(",
            TokenKind::RightParenthesis => ")",
            TokenKind::LessThan => "<",
            TokenKind::GreaterThan => ">",
            TokenKind::LessThanOrEqual => "<=",
            TokenKind::GreaterThanOrEqual => ">=",
            TokenKind::Assign => "=",
            TokenKind::Equal => "==",
            TokenKind::Unequal => "!=",
            TokenKind::AltUnequal => "<>",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::At => "@",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Power => "**",
            TokenKind::Slash => "/",
            TokenKind::SlashSlash => "//",
            TokenKind::Modulo => "%",
            TokenKind::Dollar => "$",
            TokenKind::Is => "is",
            TokenKind::In => "in",
            TokenKind::Not => "not",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::BitwiseAnd => "&",
            TokenKind::BitwiseOr => "|",
            TokenKind::BitwiseXor => "^",
            TokenKind::BitwiseComplement => "~",
            TokenKind::IsNot => "is not",
            TokenKind::NotIn => "not in",
            _ => return None,
        };
        Some(s)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The decoded value carried by literal and word tokens
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    /// The `null` keyword, distinct from a token with no value
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Complex(Complex64),
    /// Decoded contents of a quoted or backtick string
    String(String),
    /// The text of a WORD token
    Identifier(String),
}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenValue::Null => write!(f, "null"),
            TokenValue::Bool(b) => write!(f, "{}", b),
            TokenValue::Integer(i) => write!(f, "{}", i),
            TokenValue::Float(v) => write!(f, "{}", v),
            TokenValue::Complex(c) => write!(f, "{}+{}j", c.re, c.im),
            TokenValue::String(s) | TokenValue::Identifier(s) => write!(f, "{}", s),
        }
    }
}

/// A lexical token together with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The raw lexeme as it appeared in the source
    pub text: String,
    /// The decoded value, for literals and words
    pub value: Option<TokenValue>,
    /// Location of the first character
    pub start: Location,
    /// Location of the last character
    pub end: Location,
}

impl Token {
    /// Creates a token spanning `start..=end`
    pub fn new(
        kind: TokenKind,
        text: impl Into<String>,
        value: Option<TokenValue>,
        start: Location,
        end: Location,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            value,
            start,
            end,
        }
    }

    /// Returns the identifier text of a WORD token
    pub fn identifier(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::Identifier(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the decoded text of a STRING or BACKTICK token
    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "Token({}, {:?}, {})", self.kind, self.text, v),
            None => write!(f, "Token({}, {:?})", self.kind, self.text),
        }
    }
}

/// Configuration options for the tokenizer
#[derive(Debug, Clone)]
pub struct LexerConfig {
    /// Maximum length in characters of a single string literal
    pub max_string_length: usize,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self {
            max_string_length: 1024 * 1024, // 1MB default
        }
    }
}

impl LexerConfig {
    /// Sets the maximum string literal length
    pub fn with_max_string_length(mut self, limit: usize) -> Self {
        self.max_string_length = limit;
        self
    }
}

fn keyword(text: &str) -> Option<(TokenKind, Option<TokenValue>)> {
    let entry = match text {
        "true" => (TokenKind::True, Some(TokenValue::Bool(true))),
        "false" => (TokenKind::False, Some(TokenValue::Bool(false))),
        "null" => (TokenKind::Null, Some(TokenValue::Null)),
        "is" => (TokenKind::Is, None),
        "in" => (TokenKind::In, None),
        "not" => (TokenKind::Not, None),
        "and" => (TokenKind::And, None),
        "or" => (TokenKind::Or, None),
        _ => return None,
    };
    Some(entry)
}

fn punctuation(c: char) -> Option<TokenKind> {
    let kind = match c {
        ':' => TokenKind::Colon,
        '-' => TokenKind::Minus,
        '+' => TokenKind::Plus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '%' => TokenKind::Modulo,
        ',' => TokenKind::Comma,
        '{' => TokenKind::LeftCurly,
        '}' => TokenKind::RightCurly,
        '[' => TokenKind::LeftBracket,
        ']' => TokenKind::RightBracket,
        '(' => TokenKind::LeftParenthesis,
        ')' => TokenKind::RightParenthesis,
        '@' => TokenKind::At,
        '$' => TokenKind::Dollar,
        '<' => TokenKind::LessThan,
        '>' => TokenKind::GreaterThan,
        '!' => TokenKind::Not,
        '~' => TokenKind::BitwiseComplement,
        '&' => TokenKind::BitwiseAnd,
        '|' => TokenKind::BitwiseOr,
        '^' => TokenKind::BitwiseXor,
        '.' => TokenKind::Dot,
        _ => return None,
    };
    Some(kind)
}

fn simple_escape(c: char) -> Option<char> {
    let r = match c {
        'a' => '\u{0007}',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{000B}',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        _ => return None,
    };
    Some(r)
}

/// Replaces escape sequences in string contents with the characters they denote
///
/// The index reported on failure is the character offset of the offending
/// backslash within `text`.
pub fn parse_escapes(text: &[char], location: Location) -> Result<String, TokenizerError> {
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let n = text.len();

    while i < n {
        let c = text[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        let fail = TokenizerError::InvalidEscape { index: i, location };
        let Some(&e) = text.get(i + 1) else {
            return Err(fail);
        };
        if let Some(r) = simple_escape(e) {
            out.push(r);
            i += 2;
            continue;
        }
        let digits = match e {
            'x' | 'X' => 2,
            'u' => 4,
            'U' => 8,
            _ => return Err(fail),
        };
        let end = i + 2 + digits;
        if end > n || !text[i + 2..end].iter().all(|d| d.is_ascii_hexdigit()) {
            return Err(fail);
        }
        let hex: String = text[i + 2..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| fail.clone())?;
        // from_u32 rejects surrogates and anything above U+10FFFF
        let ch = char::from_u32(code).ok_or(fail)?;
        out.push(ch);
        i = end;
    }
    Ok(out)
}

/// CFG tokenizer over an in-memory source string
pub struct Tokenizer<'a> {
    /// Remaining unread input
    chars: Chars<'a>,
    /// Where the next character will be read
    location: Location,
    /// Location of the most recently read character
    char_location: Location,
    /// Characters returned to the input, with their original locations
    pushed_back: Vec<(char, Location)>,
    /// Tokenizer configuration
    config: LexerConfig,
    /// Set once EOF or an error has been yielded by the iterator
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    /// Creates a tokenizer with default configuration
    pub fn new(source: &'a str) -> Self {
        Self::with_config(source, LexerConfig::default())
    }

    /// Creates a tokenizer with custom configuration
    pub fn with_config(source: &'a str, config: LexerConfig) -> Self {
        Self {
            chars: source.chars(),
            location: Location::new(),
            char_location: Location::new(),
            pushed_back: Vec::new(),
            config,
            finished: false,
        }
    }

    /// Returns the location where the next character will be read
    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    #[inline]
    fn get_char(&mut self) -> Option<char> {
        let c = match self.pushed_back.pop() {
            Some((c, loc)) => {
                self.char_location = loc;
                self.location = loc;
                Some(c)
            }
            None => {
                self.char_location = self.location;
                self.chars.next()
            }
        };
        if let Some(ch) = c {
            self.location.column += 1;
            if ch == '\n' {
                self.location.next_line();
            }
        }
        c
    }

    /// Returns the most recently read character to the input
    #[inline]
    fn push_back(&mut self, c: char) {
        self.pushed_back.push((c, self.char_location));
    }

    #[inline]
    fn push_back_at(&mut self, c: char, location: Location) {
        self.pushed_back.push((c, location));
    }

    #[inline]
    fn check_string_length(&self, length: usize, start: Location) -> Result<(), TokenizerError> {
        if length > self.config.max_string_length {
            return Err(TokenizerError::StringTooLong {
                limit: self.config.max_string_length,
                location: start,
            });
        }
        Ok(())
    }

    /// Reads the rest of a numeric literal whose first characters are in `text`
    fn get_number(
        &mut self,
        text: &mut Vec<char>,
        start: Location,
        end: &mut Location,
    ) -> Result<(TokenKind, TokenValue), TokenizerError> {
        let mut kind = TokenKind::Integer;
        let mut radix = 0;
        let mut in_exponent = false;
        let mut last_was_digit = text.last().is_some_and(|c| c.is_ascii_digit());

        // the character which stopped the number, if any
        let stopper = loop {
            let Some(ch) = self.get_char() else {
                break None;
            };
            if ch == '_' {
                if last_was_digit {
                    text.push(ch);
                    *end = self.char_location;
                    last_was_digit = false;
                    continue;
                }
                let mut bad: String = text.iter().collect();
                bad.push('_');
                return Err(TokenizerError::InvalidUnderscore {
                    text: bad,
                    location: self.char_location,
                });
            }
            last_was_digit = false;
            let accepted_digit = match radix {
                0 => ch.is_ascii_digit(),
                2 => matches!(ch, '0' | '1'),
                8 => matches!(ch, '0'..='7'),
                _ => ch.is_ascii_hexdigit(),
            };
            if accepted_digit {
                last_was_digit = true;
            } else if text.last() == Some(&'_') {
                break Some(ch);
            } else if matches!(ch, 'o' | 'O' | 'x' | 'X' | 'b' | 'B') && text[..] == ['0'] {
                radix = match ch {
                    'o' | 'O' => 8,
                    'x' | 'X' => 16,
                    _ => 2,
                };
            } else if radix == 0
                && ((ch == '.' && !in_exponent && !text.contains(&'.'))
                    || (ch == '-' && matches!(text.last(), Some('e' | 'E'))))
            {
                // fraction point or exponent sign
            } else if radix == 0 && matches!(ch, 'e' | 'E') && !in_exponent {
                in_exponent = true;
            } else {
                break Some(ch);
            }
            text.push(ch);
            *end = self.char_location;
        };

        if text.last() == Some(&'_') {
            return Err(TokenizerError::TrailingUnderscore {
                text: text.iter().collect(),
                location: *end,
            });
        }
        match stopper {
            Some(ch @ ('j' | 'J')) if radix == 0 => {
                text.push(ch);
                *end = self.char_location;
                kind = TokenKind::Complex;
                if let Some(next) = self.get_char() {
                    if next == '.' || next.is_alphanumeric() {
                        return Err(TokenizerError::InvalidNumber {
                            text: next.to_string(),
                            location: self.char_location,
                        });
                    }
                    self.push_back(next);
                }
            }
            Some(ch) if ch == '.' || ch.is_alphanumeric() => {
                return Err(TokenizerError::InvalidNumber {
                    text: ch.to_string(),
                    location: self.char_location,
                });
            }
            Some(ch) => self.push_back(ch),
            None => {}
        }

        let literal: String = text.iter().collect();
        let digits = literal.replace('_', "");
        let conversion_error = || TokenizerError::InvalidNumber {
            text: literal.clone(),
            location: start,
        };
        let value = if radix != 0 {
            let v = i64::from_str_radix(&digits[2..], radix).map_err(|_| conversion_error())?;
            TokenValue::Integer(v)
        } else if kind == TokenKind::Complex {
            let v: f64 = digits[..digits.len() - 1]
                .parse()
                .map_err(|_| conversion_error())?;
            TokenValue::Complex(Complex64::new(0.0, v))
        } else if in_exponent || digits.contains('.') {
            kind = TokenKind::Float;
            TokenValue::Float(digits.parse().map_err(|_| conversion_error())?)
        } else {
            let (negative, body) = match digits.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, digits.as_str()),
            };
            let base = if body.len() > 1 && body.starts_with('0') {
                8
            } else {
                10
            };
            let v = i64::from_str_radix(body, base).map_err(|_| conversion_error())?;
            TokenValue::Integer(if negative { -v } else { v })
        };
        Ok((kind, value))
    }

    /// Reads a `#` comment up to, but not including, the line break
    fn get_comment(&mut self, text: &mut String, end: &mut Location) {
        loop {
            match self.get_char() {
                None => break,
                Some('\n') => {
                    *end = self.location.previous_column();
                    break;
                }
                Some(c) => {
                    text.push(c);
                    *end = self.char_location;
                }
            }
        }
    }

    fn get_backtick(
        &mut self,
        text: &mut Vec<char>,
        start: Location,
        end: &mut Location,
    ) -> Result<TokenValue, TokenizerError> {
        loop {
            match self.get_char() {
                None => {
                    return Err(TokenizerError::UnterminatedBacktick {
                        text: text.iter().collect(),
                        location: start,
                    });
                }
                Some(c) if c.is_control() => {
                    return Err(TokenizerError::InvalidBacktickCharacter {
                        character: c,
                        location: self.char_location,
                    });
                }
                Some(c) => {
                    text.push(c);
                    *end = self.char_location;
                    self.check_string_length(text.len(), start)?;
                    if c == '`' {
                        break;
                    }
                }
            }
        }
        let body = &text[1..text.len() - 1];
        Ok(TokenValue::String(parse_escapes(body, start)?))
    }

    fn get_quoted(
        &mut self,
        quote: char,
        text: &mut Vec<char>,
        start: Location,
        end: &mut Location,
    ) -> Result<TokenValue, TokenizerError> {
        let unterminated = |text: &[char]| TokenizerError::UnterminatedString {
            text: text.iter().collect(),
            location: start,
        };
        let mut multi_line = false;

        match self.get_char() {
            None => return Err(unterminated(text.as_slice())),
            Some(c1) if c1 != quote => self.push_back(c1),
            Some(c1) => {
                let c1_location = self.char_location;
                match self.get_char() {
                    Some(c2) if c2 == quote => {
                        multi_line = true;
                        text.push(quote);
                        text.push(quote);
                        *end = self.char_location;
                    }
                    Some(c2) => {
                        self.push_back(c2);
                        self.push_back_at(c1, c1_location);
                    }
                    None => self.push_back_at(c1, c1_location),
                }
            }
        }

        let quoter_len = text.len();
        let mut escaped = false;
        loop {
            let Some(c) = self.get_char() else {
                return Err(unterminated(text.as_slice()));
            };
            text.push(c);
            *end = self.char_location;
            self.check_string_length(text.len(), start)?;
            if c == quote && !escaped {
                let n = text.len();
                if !multi_line
                    || (n >= 6 && text[n - 3..] == text[..3] && text[n - 4] != '\\')
                {
                    break;
                }
            }
            escaped = c == '\\' && !escaped;
        }
        let body = &text[quoter_len..text.len() - quoter_len];
        Ok(TokenValue::String(parse_escapes(body, start)?))
    }

    /// Extends a one-character operator with a second character if it matches
    fn two_char_operator(
        &mut self,
        text: &mut Vec<char>,
        end: &mut Location,
        options: &[(char, TokenKind)],
    ) -> Option<TokenKind> {
        let nc = self.get_char()?;
        for &(c, kind) in options {
            if c == nc {
                text.push(nc);
                *end = self.char_location;
                return Some(kind);
            }
        }
        self.push_back(nc);
        None
    }

    /// Returns the next token from the input
    pub fn next_token(&mut self) -> Result<Token, TokenizerError> {
        let mut text: Vec<char> = Vec::new();
        let mut value = None;
        let mut start;
        let mut end;

        let kind = loop {
            let c = self.get_char();
            start = self.char_location;
            end = self.char_location;

            let Some(ch) = c else {
                break TokenKind::Eof;
            };
            match ch {
                '#' => {
                    let mut comment = String::from("#");
                    self.get_comment(&mut comment, &mut end);
                    text = comment.chars().collect();
                    break TokenKind::Newline;
                }
                '\n' => {
                    text.push(ch);
                    end = self.location.previous_column();
                    break TokenKind::Newline;
                }
                '\r' => {
                    text.push(ch);
                    match self.get_char() {
                        Some('\n') => {
                            text.push('\n');
                            end = self.location.previous_column();
                        }
                        Some(other) => self.push_back(other),
                        None => {}
                    }
                    break TokenKind::Newline;
                }
                '\\' => match self.get_char() {
                    Some('\n') => continue,
                    Some('\r') => match self.get_char() {
                        Some('\n') => continue,
                        _ => {
                            return Err(TokenizerError::UnexpectedCharacter {
                                character: '\\',
                                location: self.char_location,
                            });
                        }
                    },
                    _ => {
                        return Err(TokenizerError::UnexpectedCharacter {
                            character: '\\',
                            location: self.char_location,
                        });
                    }
                },
                c if c.is_whitespace() => continue,
                c if c.is_alphabetic() || c == '_' => {
                    text.push(c);
                    while let Some(nc) = self.get_char() {
                        if nc.is_alphanumeric() || nc == '_' {
                            text.push(nc);
                            end = self.char_location;
                        } else {
                            self.push_back(nc);
                            break;
                        }
                    }
                    let word: String = text.iter().collect();
                    match keyword(&word) {
                        Some((k, v)) => {
                            value = v;
                            break k;
                        }
                        None => {
                            value = Some(TokenValue::Identifier(word));
                            break TokenKind::Word;
                        }
                    }
                }
                '`' => {
                    text.push(ch);
                    value = Some(self.get_backtick(&mut text, start, &mut end)?);
                    break TokenKind::BackTick;
                }
                '\'' | '"' => {
                    text.push(ch);
                    value = Some(self.get_quoted(ch, &mut text, start, &mut end)?);
                    break TokenKind::String;
                }
                c if c.is_ascii_digit() => {
                    text.push(c);
                    let (k, v) = self.get_number(&mut text, start, &mut end)?;
                    value = Some(v);
                    break k;
                }
                '=' => {
                    text.push(ch);
                    let k = self.two_char_operator(&mut text, &mut end, &[('=', TokenKind::Equal)]);
                    break k.unwrap_or(TokenKind::Assign);
                }
                c => {
                    let Some(kind) = punctuation(c) else {
                        return Err(TokenizerError::UnexpectedCharacter {
                            character: c,
                            location: self.char_location,
                        });
                    };
                    text.push(c);
                    let extended = match c {
                        '-' | '.' => match self.get_char() {
                            Some(nc) if nc.is_ascii_digit() || (c == '-' && nc == '.') => {
                                text.push(nc);
                                end = self.char_location;
                                let (k, v) = self.get_number(&mut text, start, &mut end)?;
                                value = Some(v);
                                Some(k)
                            }
                            Some(nc) => {
                                self.push_back(nc);
                                None
                            }
                            None => None,
                        },
                        '<' => self.two_char_operator(
                            &mut text,
                            &mut end,
                            &[
                                ('=', TokenKind::LessThanOrEqual),
                                ('<', TokenKind::LeftShift),
                                ('>', TokenKind::AltUnequal),
                            ],
                        ),
                        '>' => self.two_char_operator(
                            &mut text,
                            &mut end,
                            &[
                                ('=', TokenKind::GreaterThanOrEqual),
                                ('>', TokenKind::RightShift),
                            ],
                        ),
                        '!' => self.two_char_operator(
                            &mut text,
                            &mut end,
                            &[('=', TokenKind::Unequal)],
                        ),
                        '*' => {
                            self.two_char_operator(&mut text, &mut end, &[('*', TokenKind::Power)])
                        }
                        '/' => self.two_char_operator(
                            &mut text,
                            &mut end,
                            &[('/', TokenKind::SlashSlash)],
                        ),
                        '&' => {
                            self.two_char_operator(&mut text, &mut end, &[('&', TokenKind::And)])
                        }
                        '|' => {
                            self.two_char_operator(&mut text, &mut end, &[('|', TokenKind::Or)])
                        }
                        _ => None,
                    };
                    break extended.unwrap_or(kind);
                }
            }
        };

        let token = Token {
            kind,
            text: text.into_iter().collect(),
            value,
            start,
            end,
        };
        trace!(kind:% = token.kind, start:% = token.start, end:% = token.end; "token");
        Ok(token)
    }

    /// Returns every remaining token, ending with EOF
    pub fn all_tokens(&mut self) -> Result<Vec<Token>, TokenizerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, TokenizerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        if !matches!(&result, Ok(t) if t.kind != TokenKind::Eof) {
            self.finished = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(source: &str) -> Token {
        Tokenizer::new(source)
            .next_token()
            .expect("Should tokenize")
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        Tokenizer::new(source)
            .all_tokens()
            .expect("Should tokenize")
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_single_tokens() {
        let cases: Vec<(&str, TokenKind, &str, Option<TokenValue>, Location)> = vec![
            ("", TokenKind::Eof, "", None, Location::at(1, 1)),
            (
                "# a comment\n",
                TokenKind::Newline,
                "# a comment",
                None,
                Location::at(2, 0),
            ),
            (
                "foo",
                TokenKind::Word,
                "foo",
                Some(TokenValue::Identifier("foo".into())),
                Location::at(1, 3),
            ),
            (
                "`foo`",
                TokenKind::BackTick,
                "`foo`",
                Some(TokenValue::String("foo".into())),
                Location::at(1, 5),
            ),
            (
                "'foo'",
                TokenKind::String,
                "'foo'",
                Some(TokenValue::String("foo".into())),
                Location::at(1, 5),
            ),
            (
                "2.71828",
                TokenKind::Float,
                "2.71828",
                Some(TokenValue::Float(2.71828)),
                Location::at(1, 7),
            ),
            (".5", TokenKind::Float, ".5", Some(TokenValue::Float(0.5)), Location::at(1, 2)),
            ("-.5", TokenKind::Float, "-.5", Some(TokenValue::Float(-0.5)), Location::at(1, 3)),
            (
                "0x123aBc",
                TokenKind::Integer,
                "0x123aBc",
                Some(TokenValue::Integer(0x123abc)),
                Location::at(1, 8),
            ),
            ("0o123", TokenKind::Integer, "0o123", Some(TokenValue::Integer(83)), Location::at(1, 5)),
            ("0123", TokenKind::Integer, "0123", Some(TokenValue::Integer(83)), Location::at(1, 4)),
            (
                "0b0001_0110_0111",
                TokenKind::Integer,
                "0b0001_0110_0111",
                Some(TokenValue::Integer(0x167)),
                Location::at(1, 16),
            ),
            ("1e8", TokenKind::Float, "1e8", Some(TokenValue::Float(1e8)), Location::at(1, 3)),
            ("1e-8", TokenKind::Float, "1e-8", Some(TokenValue::Float(1e-8)), Location::at(1, 4)),
            ("-4", TokenKind::Integer, "-4", Some(TokenValue::Integer(-4)), Location::at(1, 2)),
            ("-4e8", TokenKind::Float, "-4e8", Some(TokenValue::Float(-4e8)), Location::at(1, 4)),
            (
                "\"\"",
                TokenKind::String,
                "\"\"",
                Some(TokenValue::String(String::new())),
                Location::at(1, 2),
            ),
            (
                "''",
                TokenKind::String,
                "''",
                Some(TokenValue::String(String::new())),
                Location::at(1, 2),
            ),
            (
                "\"\"\"\"\"\"",
                TokenKind::String,
                "\"\"\"\"\"\"",
                Some(TokenValue::String(String::new())),
                Location::at(1, 6),
            ),
            (
                "\"\"\"abc\ndef\n\"\"\"",
                TokenKind::String,
                "\"\"\"abc\ndef\n\"\"\"",
                Some(TokenValue::String("abc\ndef\n".into())),
                Location::at(3, 3),
            ),
        ];

        for (source, kind, text, value, end) in cases {
            let mut tokenizer = Tokenizer::new(source);
            let t = tokenizer.next_token().expect("Should tokenize");
            assert_eq!(t.kind, kind, "kind for {:?}", source);
            assert_eq!(t.text, text, "text for {:?}", source);
            assert_eq!(t.value, value, "value for {:?}", source);
            assert_eq!(t.start, Location::at(1, 1), "start for {:?}", source);
            assert_eq!(t.end, end, "end for {:?}", source);
            let next = tokenizer.next_token().expect("Should reach EOF");
            assert_eq!(next.kind, TokenKind::Eof, "trailing token for {:?}", source);
        }
    }

    #[test]
    fn test_word_location() {
        let t = first("foo");
        assert_eq!(t.start, Location::at(1, 1));
        assert_eq!(t.end, Location::at(1, 3));
    }

    #[test]
    fn test_complex_expression() {
        let tokens = Tokenizer::new("9+4j+a*b")
            .all_tokens()
            .expect("Should tokenize");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Integer,
                TokenKind::Plus,
                TokenKind::Complex,
                TokenKind::Plus,
                TokenKind::Word,
                TokenKind::Star,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["9", "+", "4j", "+", "a", "*", "b", ""]);
        assert_eq!(tokens[0].value, Some(TokenValue::Integer(9)));
        assert_eq!(
            tokens[2].value,
            Some(TokenValue::Complex(Complex64::new(0.0, 4.0)))
        );
    }

    #[test]
    fn test_punctuation() {
        let source = "< > { } [ ] ( ) + - * / ** // % . <= <> << >= >> == != , : @ ~ & | ^ $ && ||";
        let tokens = Tokenizer::new(source)
            .all_tokens()
            .expect("Should tokenize");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        use TokenKind::*;
        assert_eq!(
            kinds,
            vec![
                LessThan,
                GreaterThan,
                LeftCurly,
                RightCurly,
                LeftBracket,
                RightBracket,
                LeftParenthesis,
                RightParenthesis,
                Plus,
                Minus,
                Star,
                Slash,
                Power,
                SlashSlash,
                Modulo,
                Dot,
                LessThanOrEqual,
                AltUnequal,
                LeftShift,
                GreaterThanOrEqual,
                RightShift,
                Equal,
                Unequal,
                Comma,
                Colon,
                At,
                BitwiseComplement,
                BitwiseAnd,
                BitwiseOr,
                BitwiseXor,
                Dollar,
                And,
                Or,
                Eof,
            ]
        );
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        let expected: Vec<&str> = source.split(' ').chain(std::iter::once("")).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_keywords() {
        use TokenKind::*;
        assert_eq!(
            kinds("true false null is in not and or"),
            vec![True, False, Null, Is, In, Not, And, Or, Eof]
        );
        assert_eq!(first("false").value, Some(TokenValue::Bool(false)));
        assert_eq!(first("true").value, Some(TokenValue::Bool(true)));
        assert_eq!(first("null").value, Some(TokenValue::Null));
        assert_eq!(first("in").value, None);
    }

    #[test]
    fn test_newlines() {
        use TokenKind::*;
        assert_eq!(kinds("\n \r \r\n"), vec![Newline, Newline, Newline, Eof]);
    }

    #[test]
    fn test_line_continuation() {
        let tokens = Tokenizer::new("a \\\nb")
            .all_tokens()
            .expect("Should tokenize");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "b");
        assert_eq!(tokens[1].start, Location::at(2, 1));
    }

    #[test]
    fn test_unicode_locations() {
        let source = "unicode = 'Grüß Gott'\nmore_unicode: 'Øresund'";
        let tokens = Tokenizer::new(source)
            .all_tokens()
            .expect("Should tokenize");
        let expected = vec![
            (TokenKind::Word, "unicode", (1, 1), (1, 7)),
            (TokenKind::Assign, "=", (1, 9), (1, 9)),
            (TokenKind::String, "'Grüß Gott'", (1, 11), (1, 21)),
            (TokenKind::Newline, "\n", (1, 22), (2, 0)),
            (TokenKind::Word, "more_unicode", (2, 1), (2, 12)),
            (TokenKind::Colon, ":", (2, 13), (2, 13)),
            (TokenKind::String, "'Øresund'", (2, 15), (2, 23)),
            (TokenKind::Eof, "", (2, 24), (2, 24)),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (t, (kind, text, (sl, sc), (el, ec))) in tokens.iter().zip(expected) {
            assert_eq!(t.kind, kind);
            assert_eq!(t.text, text);
            assert_eq!(t.start, Location::at(sl, sc), "start of {}", text);
            assert_eq!(t.end, Location::at(el, ec), "end of {}", text);
        }
        assert_eq!(tokens[2].value, Some(TokenValue::String("Grüß Gott".into())));
    }

    #[test]
    fn test_unicode_identifiers() {
        let t = first("नमस्ते_world");
        assert_eq!(t.kind, TokenKind::Word);
        let t = first("日本語");
        assert_eq!(t.identifier(), Some("日本語"));
    }

    #[test]
    fn test_bad_tokens() {
        let cases: Vec<(&str, &str, u32, u32)> = vec![
            ("9a", "Invalid character in number", 1, 2),
            ("079", "Invalid character in number", 1, 1),
            ("0xaBcz", "Invalid character in number", 1, 6),
            ("0o79", "Invalid character in number", 1, 4),
            (".5z", "Invalid character in number", 1, 3),
            ("0.5.7", "Invalid character in number", 1, 4),
            (" 0.4e-z", "Invalid character in number", 1, 7),
            (" 0.4e-8.3", "Invalid character in number", 1, 8),
            (" 089z", "Invalid character in number", 1, 5),
            ("0o89z", "Invalid character in number", 1, 3),
            ("0X89g", "Invalid character in number", 1, 5),
            ("10z", "Invalid character in number", 1, 3),
            (" 0.4e-8Z", "Invalid character in number: Z", 1, 8),
            ("123_", "Invalid '_' at end of number: 123_", 1, 4),
            ("1__23", "Invalid '_' in number: 1__", 1, 3),
            ("1_2__3", "Invalid '_' in number: 1_2__", 1, 5),
            (" 0.4e-8_", "Invalid '_' at end of number: 0.4e-8_", 1, 8),
            (" 0.4_e-8", "Invalid '_' at end of number: 0.4_", 1, 5),
            (" 0._4e-8", "Invalid '_' in number: 0._", 1, 4),
            ("\\ ", "Unexpected character: \\", 1, 2),
            ("'", "Unterminated quoted string:", 1, 1),
            ("\"", "Unterminated quoted string:", 1, 1),
            ("'''", "Unterminated quoted string:", 1, 1),
            ("  ;", "Unexpected character: ;", 1, 3),
            ("\"abc", "Unterminated quoted string: ", 1, 1),
            ("\"abc\\\ndef", "Unterminated quoted string: ", 1, 1),
            ("`abc", "Unterminated backtick string", 1, 1),
        ];

        for (source, message, line, column) in cases {
            let err = Tokenizer::new(source)
                .next_token()
                .expect_err("Should fail to tokenize");
            assert!(
                err.to_string().contains(message),
                "{:?}: {:?} does not contain {:?}",
                source,
                err.to_string(),
                message
            );
            assert_eq!(
                err.location(),
                Location::at(line, column),
                "location for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_backtick_control_character() {
        let err = first_err("`a\tb`");
        assert!(matches!(
            err,
            TokenizerError::InvalidBacktickCharacter { character: '\t', .. }
        ));
    }

    fn first_err(source: &str) -> TokenizerError {
        Tokenizer::new(source)
            .next_token()
            .expect_err("Should fail to tokenize")
    }

    #[test]
    fn test_escapes() {
        let good = vec![
            ("'\\a'", "\u{0007}"),
            ("'\\b'", "\u{0008}"),
            ("'\\f'", "\u{000C}"),
            ("'\\n'", "\n"),
            ("'\\r'", "\r"),
            ("'\\t'", "\t"),
            ("'\\v'", "\u{000B}"),
            ("'\\\\'", "\\"),
            ("'\\''", "'"),
            ("'\\\"'", "\""),
            ("'\\xAB'", "\u{00AB}"),
            ("'\\u2803'", "\u{2803}"),
            ("'\\u28A0abc\\u28A0'", "\u{28a0}abc\u{28a0}"),
            ("'\\u28A0abc'", "\u{28a0}abc"),
            ("'\\uE000'", "\u{e000}"),
            ("'\\U0010ffff'", "\u{10ffff}"),
        ];
        for (source, expected) in good {
            let t = first(source);
            assert_eq!(t.string_value(), Some(expected), "escape {:?}", source);
            assert_eq!(t.text, source);
        }

        let bad = vec![
            "'\\z'",
            "'\\x'",
            "'\\xa'",
            "'\\xaz'",
            "'\\u'",
            "'\\u0'",
            "'\\u01'",
            "'\\u012'",
            "'\\u012z'",
            "'\\u012zA'",
            "'\\ud800'",
            "'\\udfff'",
            "'\\U00110000'",
            "'\\x+a'",
        ];
        for source in bad {
            let err = first_err(source);
            assert!(
                err.to_string().contains("Invalid escape sequence"),
                "{:?} gave {}",
                source,
                err
            );
        }
    }

    #[test]
    fn test_escape_index() {
        let err = first_err("'abc\\qdef'");
        assert_eq!(
            err,
            TokenizerError::InvalidEscape {
                index: 3,
                location: Location::at(1, 1)
            }
        );
    }

    #[test]
    fn test_retokenize_text() {
        for source in ["0x1F", "1_000", "3.5e-3", "7j", "'a\\tb'", "`x`", "\"\"\"m\nl\"\"\""] {
            let t = first(source);
            let again = first(&t.text);
            assert_eq!(t.kind, again.kind);
            assert_eq!(t.value, again.value);
            assert_eq!(t.text, again.text);
        }
    }

    #[test]
    fn test_string_too_long() {
        let config = LexerConfig::default().with_max_string_length(4);
        let err = Tokenizer::with_config("'abcdefgh'", config)
            .next_token()
            .expect_err("Should reject long strings");
        assert!(matches!(err, TokenizerError::StringTooLong { limit: 4, .. }));
    }

    #[test]
    fn test_iterator_stops_after_eof() {
        let tokens: Vec<_> = Tokenizer::new("a b").collect();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| t.is_ok()));

        let results: Vec<_> = Tokenizer::new("a ;b").collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_operator_pushback() {
        use TokenKind::*;
        assert_eq!(kinds("a&b"), vec![Word, BitwiseAnd, Word, Eof]);
        assert_eq!(kinds("a|b"), vec![Word, BitwiseOr, Word, Eof]);
        assert_eq!(kinds("!a"), vec![Not, Word, Eof]);
        assert_eq!(kinds("a=b"), vec![Word, Assign, Word, Eof]);
        assert_eq!(kinds("x-1"), vec![Word, Integer, Eof]);
        assert_eq!(kinds("x - a"), vec![Word, Minus, Word, Eof]);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(TokenKind::RightBracket.to_string(), "RIGHT_BRACKET");
        assert_eq!(TokenKind::Null.to_string(), "NONE");
        assert_eq!(TokenKind::IsNot.to_string(), "IS_NOT");
    }
}
