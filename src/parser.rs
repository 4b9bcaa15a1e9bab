//! Recursive-descent parser for CFG source text
//!
//! This module turns the token stream produced by the [`Tokenizer`] into a
//! [`Node`] tree. The grammar, from lowest to highest precedence:
//!
//! ```text
//! expr        := and_expr ( OR and_expr )*
//! and_expr    := not_expr ( AND not_expr )*
//! not_expr    := NOT not_expr | comparison
//! comparison  := bitor_expr ( comp_op bitor_expr )*
//! bitor_expr  := bitxor_expr ( '|' bitxor_expr )*
//! bitxor_expr := bitand_expr ( '^' bitand_expr )*
//! bitand_expr := shift_expr ( '&' shift_expr )*
//! shift_expr  := add_expr ( (<< | >>) add_expr )*
//! add_expr    := mul_expr ( (+ | -) mul_expr )*
//! mul_expr    := unary_expr ( (* | / | // | %) unary_expr )*
//! unary_expr  := (+ | - | ~ | @) unary_expr | power
//! power       := primary ( '**' unary_expr )*
//! primary     := atom ( '.' WORD | '[' trailer ']' )*
//! atom        := mapping | list | '${' primary '}' | value | '(' expr ')'
//! ```
//!
//! It also provides the helpers used for path lookups: [`parse_path`],
//! [`unpack_path`] and [`to_source`].

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{ConfigError, Location, ParserError};
use crate::lexer::{LexerConfig, Token, TokenKind, TokenValue, Tokenizer};

/// Configuration options for the parser
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum nesting depth to prevent stack overflow
    pub max_depth: usize,
    /// Options passed through to the tokenizer
    pub lexer: LexerConfig,
}

impl ParserConfig {
    /// Creates a new parser configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the tokenizer options
    pub fn with_lexer_config(mut self, lexer: LexerConfig) -> Self {
        self.lexer = lexer;
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: 128,
            lexer: LexerConfig::default(),
        }
    }
}

/// A node of the abstract syntax tree
///
/// List and mapping elements are reference counted so that lazily evaluated
/// containers can hold on to them without copying subtrees.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A literal or a word
    Token(Token),
    /// A prefix operator applied to one operand
    Unary {
        kind: TokenKind,
        operand: Box<Node>,
        start: Location,
    },
    /// A binary operator, or a trailer (`.`, `[index]`, `[slice]`) applied to `lhs`
    Binary {
        kind: TokenKind,
        lhs: Box<Node>,
        rhs: Box<Node>,
        start: Location,
    },
    /// The contents of a `[start:stop:step]` trailer
    Slice {
        start: Option<Box<Node>>,
        stop: Option<Box<Node>>,
        step: Option<Box<Node>>,
        location: Location,
    },
    List {
        elements: Vec<Rc<Node>>,
        start: Location,
    },
    Mapping {
        elements: Vec<(Token, Rc<Node>)>,
        start: Location,
    },
}

impl Node {
    /// Returns the token kind which best describes this node
    pub fn kind(&self) -> TokenKind {
        match self {
            Node::Token(t) => t.kind,
            Node::Unary { kind, .. } | Node::Binary { kind, .. } => *kind,
            Node::Slice { .. } => TokenKind::Colon,
            Node::List { .. } => TokenKind::LeftBracket,
            Node::Mapping { .. } => TokenKind::LeftCurly,
        }
    }

    /// Returns the location of the first token of this node
    pub fn start(&self) -> Location {
        match self {
            Node::Token(t) => t.start,
            Node::Unary { start, .. }
            | Node::Binary { start, .. }
            | Node::List { start, .. }
            | Node::Mapping { start, .. } => *start,
            Node::Slice { location, .. } => *location,
        }
    }

    /// Returns the token if this node is a leaf
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Node::Token(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_source(self))
    }
}

fn is_expression_starter(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::LeftCurly
            | TokenKind::LeftBracket
            | TokenKind::LeftParenthesis
            | TokenKind::At
            | TokenKind::Dollar
            | TokenKind::BackTick
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::BitwiseComplement
            | TokenKind::Integer
            | TokenKind::Float
            | TokenKind::Complex
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Not
            | TokenKind::String
            | TokenKind::Word
    )
}

fn is_value_starter(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Word
            | TokenKind::Integer
            | TokenKind::Float
            | TokenKind::Complex
            | TokenKind::String
            | TokenKind::BackTick
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
    )
}

fn is_comparison_operator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::LessThan
            | TokenKind::LessThanOrEqual
            | TokenKind::GreaterThan
            | TokenKind::GreaterThanOrEqual
            | TokenKind::Equal
            | TokenKind::Unequal
            | TokenKind::AltUnequal
            | TokenKind::Is
            | TokenKind::In
            | TokenKind::Not
    )
}

/// CFG parser with one token of lookahead
pub struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    next_token: Token,
    config: ParserConfig,
    current_depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser with default configuration and reads the first token
    pub fn new(source: &'a str) -> Result<Self, ParserError> {
        Self::with_config(source, ParserConfig::default())
    }

    /// Creates a parser with custom configuration and reads the first token
    pub fn with_config(source: &'a str, config: ParserConfig) -> Result<Self, ParserError> {
        let mut tokenizer = Tokenizer::with_config(source, config.lexer.clone());
        let next_token = tokenizer.next_token()?;
        Ok(Self {
            tokenizer,
            next_token,
            config,
            current_depth: 0,
        })
    }

    /// Returns true once all input has been consumed
    pub fn at_end(&self) -> bool {
        self.next_token.kind == TokenKind::Eof
    }

    /// Returns the start of the lookahead token
    pub fn location(&self) -> Location {
        self.next_token.start
    }

    /// Returns the lookahead token
    pub fn peek(&self) -> &Token {
        &self.next_token
    }

    fn advance(&mut self) -> Result<TokenKind, ParserError> {
        self.next_token = self.tokenizer.next_token()?;
        Ok(self.next_token.kind)
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParserError {
        ParserError::UnexpectedToken {
            expected: expected.into(),
            found: self.next_token.kind,
            location: self.next_token.start,
        }
    }

    /// Consumes a token of the given kind, or fails at the token found instead
    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParserError> {
        if self.next_token.kind != kind {
            return Err(self.unexpected(kind.name()));
        }
        let token = self.next_token.clone();
        self.advance()?;
        Ok(token)
    }

    fn consume_newlines(&mut self) -> Result<TokenKind, ParserError> {
        let mut kind = self.next_token.kind;
        while kind == TokenKind::Newline {
            kind = self.advance()?;
        }
        Ok(kind)
    }

    /// Runs one level of recursion under the depth limit
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParserError>,
    ) -> Result<T, ParserError> {
        if self.current_depth >= self.config.max_depth {
            return Err(ParserError::MaxDepthExceeded {
                location: self.next_token.start,
            });
        }
        self.current_depth += 1;
        let result = f(self);
        self.current_depth -= 1;
        result
    }

    /// Parses one or more adjacent string literals into a single token
    pub fn strings(&mut self) -> Result<Token, ParserError> {
        let mut result = self.next_token.clone();
        if self.advance()? != TokenKind::String {
            return Ok(result);
        }
        let mut value = result.string_value().unwrap_or_default().to_string();
        while self.next_token.kind == TokenKind::String {
            result.text.push_str(&self.next_token.text);
            value.push_str(self.next_token.string_value().unwrap_or_default());
            result.end = self.next_token.end;
            self.advance()?;
        }
        result.value = Some(TokenValue::String(value));
        Ok(result)
    }

    /// Parses a literal or a word
    pub fn value(&mut self) -> Result<Token, ParserError> {
        let kind = self.next_token.kind;
        if !is_value_starter(kind) {
            return Err(ParserError::AtomExpected {
                found: kind,
                location: self.next_token.start,
            });
        }
        if kind == TokenKind::String {
            return self.strings();
        }
        let token = self.next_token.clone();
        self.advance()?;
        Ok(token)
    }

    /// Parses a mapping, list, reference, value or parenthesized expression
    pub fn atom(&mut self) -> Result<Node, ParserError> {
        match self.next_token.kind {
            TokenKind::LeftCurly => self.mapping(),
            TokenKind::LeftBracket => self.list(),
            TokenKind::LeftParenthesis => {
                self.advance()?;
                let result = self.expr()?;
                self.expect(TokenKind::RightParenthesis)?;
                Ok(result)
            }
            TokenKind::Dollar => {
                let start = self.next_token.start;
                self.advance()?;
                self.expect(TokenKind::LeftCurly)?;
                if self.next_token.kind != TokenKind::Word {
                    return Err(self.unexpected(TokenKind::Word.name()));
                }
                let operand = self.primary()?;
                self.expect(TokenKind::RightCurly)?;
                Ok(Node::Unary {
                    kind: TokenKind::Dollar,
                    operand: Box::new(operand),
                    start,
                })
            }
            _ => Ok(Node::Token(self.value()?)),
        }
    }

    /// Parses the single expression allowed in each part of an index or slice
    fn list_element(&mut self) -> Result<Node, ParserError> {
        let location = self.next_token.start;
        let mut elements = self.list_body()?;
        if elements.len() != 1 {
            return Err(ParserError::ExpressionCount {
                found: elements.len(),
                location,
            });
        }
        Ok(elements.remove(0))
    }

    /// Parses `.WORD`, `[index]` or `[start:stop:step]`
    ///
    /// Returns the trailer kind (`DOT`, `LEFT_BRACKET` or `COLON`) and its operand.
    pub fn trailer(&mut self) -> Result<(TokenKind, Node), ParserError> {
        if self.next_token.kind != TokenKind::LeftBracket {
            self.expect(TokenKind::Dot)?;
            let word = self.expect(TokenKind::Word)?;
            return Ok((TokenKind::Dot, Node::Token(word)));
        }

        let mut kind = self.advance()?;
        let location = self.next_token.start;
        let mut start = None;
        let is_slice = if kind == TokenKind::Colon {
            true
        } else {
            start = Some(Box::new(self.list_element()?));
            self.next_token.kind == TokenKind::Colon
        };

        let result = match (is_slice, start) {
            (false, Some(index)) => {
                kind = TokenKind::LeftBracket;
                *index
            }
            (_, start) => {
                let mut stop = None;
                let mut step = None;
                let tk = self.advance()?;
                if tk == TokenKind::Colon {
                    if self.advance()? != TokenKind::RightBracket {
                        step = Some(Box::new(self.list_element()?));
                    }
                } else if tk != TokenKind::RightBracket {
                    stop = Some(Box::new(self.list_element()?));
                    if self.next_token.kind == TokenKind::Colon
                        && self.advance()? != TokenKind::RightBracket
                    {
                        step = Some(Box::new(self.list_element()?));
                    }
                }
                kind = TokenKind::Colon;
                Node::Slice {
                    start,
                    stop,
                    step,
                    location,
                }
            }
        };
        self.expect(TokenKind::RightBracket)?;
        Ok((kind, result))
    }

    /// Parses an atom followed by any number of trailers
    pub fn primary(&mut self) -> Result<Node, ParserError> {
        let mut result = self.atom()?;
        while matches!(
            self.next_token.kind,
            TokenKind::Dot | TokenKind::LeftBracket
        ) {
            let start = self.next_token.start;
            let (kind, rhs) = self.trailer()?;
            result = Node::Binary {
                kind,
                lhs: Box::new(result),
                rhs: Box::new(rhs),
                start,
            };
        }
        Ok(result)
    }

    /// Parses comma- or newline-separated expressions
    pub fn list_body(&mut self) -> Result<Vec<Node>, ParserError> {
        let mut kind = self.consume_newlines()?;
        let mut result = Vec::new();
        while is_expression_starter(kind) {
            result.push(self.expr()?);
            kind = self.next_token.kind;
            if kind != TokenKind::Newline && kind != TokenKind::Comma {
                break;
            }
            self.advance()?;
            kind = self.consume_newlines()?;
        }
        Ok(result)
    }

    /// Parses `[ list_body ]`
    pub fn list(&mut self) -> Result<Node, ParserError> {
        let start = self.expect(TokenKind::LeftBracket)?.start;
        let elements = self.list_body()?.into_iter().map(Rc::new).collect();
        self.expect(TokenKind::RightBracket)?;
        Ok(Node::List { elements, start })
    }

    fn object_key(&mut self) -> Result<Token, ParserError> {
        if self.next_token.kind == TokenKind::String {
            return self.strings();
        }
        let key = self.next_token.clone();
        self.advance()?;
        Ok(key)
    }

    /// Parses `key: value` entries separated by commas or newlines
    pub fn mapping_body(&mut self) -> Result<Node, ParserError> {
        let mut kind = self.consume_newlines()?;
        let start = self.next_token.start;
        let mut elements = Vec::new();

        if kind == TokenKind::RightCurly || kind == TokenKind::Eof {
            return Ok(Node::Mapping { elements, start });
        }
        if kind != TokenKind::Word && kind != TokenKind::String {
            return Err(ParserError::UnexpectedKeyType {
                found: kind,
                location: self.next_token.start,
            });
        }
        while kind == TokenKind::Word || kind == TokenKind::String {
            let key = self.object_key()?;
            kind = self.next_token.kind;
            if kind != TokenKind::Colon && kind != TokenKind::Assign {
                return Err(ParserError::MissingSeparator {
                    found: kind,
                    location: self.next_token.start,
                });
            }
            self.advance()?;
            self.consume_newlines()?;
            elements.push((key, Rc::new(self.expr()?)));
            kind = self.next_token.kind;
            if kind == TokenKind::Newline || kind == TokenKind::Comma {
                self.advance()?;
                kind = self.consume_newlines()?;
            } else if kind != TokenKind::RightCurly && kind != TokenKind::Eof {
                return Err(self.unexpected("RIGHT_CURLY or EOF"));
            }
        }
        Ok(Node::Mapping { elements, start })
    }

    /// Parses `{ mapping_body }`
    pub fn mapping(&mut self) -> Result<Node, ParserError> {
        let start = self.expect(TokenKind::LeftCurly)?.start;
        let body = self.mapping_body()?;
        self.expect(TokenKind::RightCurly)?;
        match body {
            Node::Mapping { elements, .. } => Ok(Node::Mapping { elements, start }),
            other => Ok(other),
        }
    }

    /// Parses a whole document: a mapping, a list, or a bare mapping body
    pub fn container(&mut self) -> Result<Node, ParserError> {
        let kind = self.consume_newlines()?;
        let result = match kind {
            TokenKind::LeftCurly => self.mapping()?,
            TokenKind::LeftBracket => self.list()?,
            TokenKind::Word | TokenKind::String | TokenKind::Eof => self.mapping_body()?,
            _ => {
                return Err(ParserError::ContainerExpected {
                    found: kind,
                    location: self.next_token.start,
                });
            }
        };
        if self.consume_newlines()? != TokenKind::Eof {
            return Err(self.unexpected(TokenKind::Eof.name()));
        }
        Ok(result)
    }

    /// Parses `primary ( ** unary_expr )*`
    pub fn power(&mut self) -> Result<Node, ParserError> {
        let mut lhs = self.primary()?;
        while self.next_token.kind == TokenKind::Power {
            let start = self.next_token.start;
            self.advance()?;
            let rhs = self.unary_expr()?;
            lhs = Node::Binary {
                kind: TokenKind::Power,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                start,
            };
        }
        Ok(lhs)
    }

    /// Parses a prefix `+`, `-`, `~` or `@` expression
    pub fn unary_expr(&mut self) -> Result<Node, ParserError> {
        self.nested(|p| {
            let kind = p.next_token.kind;
            if !matches!(
                kind,
                TokenKind::Plus | TokenKind::Minus | TokenKind::BitwiseComplement | TokenKind::At
            ) {
                return p.power();
            }
            let start = p.next_token.start;
            p.advance()?;
            let operand = p.unary_expr()?;
            Ok(Node::Unary {
                kind,
                operand: Box::new(operand),
                start,
            })
        })
    }

    /// Parses a left-associative chain of binary operators
    fn left_assoc(
        &mut self,
        operators: &[TokenKind],
        operand: fn(&mut Self) -> Result<Node, ParserError>,
    ) -> Result<Node, ParserError> {
        let mut lhs = operand(self)?;
        while operators.contains(&self.next_token.kind) {
            let kind = self.next_token.kind;
            let start = self.next_token.start;
            self.advance()?;
            let rhs = operand(self)?;
            lhs = Node::Binary {
                kind,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                start,
            };
        }
        Ok(lhs)
    }

    pub fn mul_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(
            &[
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::SlashSlash,
                TokenKind::Modulo,
            ],
            Self::unary_expr,
        )
    }

    pub fn add_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(&[TokenKind::Plus, TokenKind::Minus], Self::mul_expr)
    }

    pub fn shift_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(
            &[TokenKind::LeftShift, TokenKind::RightShift],
            Self::add_expr,
        )
    }

    pub fn bitand_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(&[TokenKind::BitwiseAnd], Self::shift_expr)
    }

    pub fn bitxor_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(&[TokenKind::BitwiseXor], Self::bitand_expr)
    }

    pub fn bitor_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(&[TokenKind::BitwiseOr], Self::bitxor_expr)
    }

    /// Consumes a comparison operator, combining `is not` and `not in`
    fn comparison_operator(&mut self) -> Result<TokenKind, ParserError> {
        let kind = self.next_token.kind;
        let next = self.advance()?;
        match (kind, next) {
            (TokenKind::Is, TokenKind::Not) => {
                self.advance()?;
                Ok(TokenKind::IsNot)
            }
            (TokenKind::Not, TokenKind::In) => {
                self.advance()?;
                Ok(TokenKind::NotIn)
            }
            (TokenKind::Not, _) => Err(self.unexpected(TokenKind::In.name())),
            _ => Ok(kind),
        }
    }

    pub fn comparison(&mut self) -> Result<Node, ParserError> {
        let mut lhs = self.bitor_expr()?;
        while is_comparison_operator(self.next_token.kind) {
            let start = self.next_token.start;
            let kind = self.comparison_operator()?;
            let rhs = self.bitor_expr()?;
            lhs = Node::Binary {
                kind,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                start,
            };
        }
        Ok(lhs)
    }

    pub fn not_expr(&mut self) -> Result<Node, ParserError> {
        if self.next_token.kind != TokenKind::Not {
            return self.comparison();
        }
        self.nested(|p| {
            let start = p.next_token.start;
            p.advance()?;
            let operand = p.not_expr()?;
            Ok(Node::Unary {
                kind: TokenKind::Not,
                operand: Box::new(operand),
                start,
            })
        })
    }

    pub fn and_expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(&[TokenKind::And], Self::not_expr)
    }

    /// Parses a complete expression
    pub fn expr(&mut self) -> Result<Node, ParserError> {
        self.left_assoc(&[TokenKind::Or], Self::and_expr)
    }
}

/// One step of a path such as `a.b[0][1:3]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathElement<'a> {
    /// The root word, or a `.word` step
    Attribute(&'a Token),
    /// A `[expr]` step
    Index(&'a Node),
    /// A `[start:stop:step]` step; always a [`Node::Slice`]
    Slice(&'a Node),
}

/// Parses a lookup key such as `a.b[2]['c']` into a path expression
pub fn parse_path(path: &str) -> Result<Node, ConfigError> {
    let invalid = |source| ConfigError::InvalidPath {
        path: path.to_string(),
        source,
    };
    let mut parser = Parser::new(path).map_err(invalid)?;

    if parser.next_token.kind != TokenKind::Word {
        return Err(invalid(parser.unexpected(TokenKind::Word.name())));
    }
    let node = parser.primary().map_err(invalid)?;
    if !parser.at_end() {
        return Err(invalid(ParserError::TrailingText {
            found: parser.next_token.kind,
            location: parser.next_token.start,
        }));
    }
    Ok(node)
}

/// Flattens a path expression into its steps, root first
///
/// A `${...}` node unpacks to the steps of its operand. Nodes which are not
/// path expressions are rejected.
pub fn unpack_path(node: &Node) -> Result<SmallVec<[PathElement<'_>; 4]>, ParserError> {
    fn visit<'a>(
        path: &mut SmallVec<[PathElement<'a>; 4]>,
        node: &'a Node,
    ) -> Result<(), ParserError> {
        let not_a_path = |n: &Node| ParserError::UnexpectedToken {
            expected: "a path".to_string(),
            found: n.kind(),
            location: n.start(),
        };
        match node {
            Node::Token(t) if t.kind == TokenKind::Word => path.push(PathElement::Attribute(t)),
            Node::Unary {
                kind: TokenKind::Dollar,
                operand,
                ..
            } => visit(path, operand)?,
            Node::Binary { kind, lhs, rhs, .. } => {
                visit(path, lhs)?;
                match (kind, rhs.as_ref()) {
                    (TokenKind::Dot, Node::Token(t)) => path.push(PathElement::Attribute(t)),
                    (TokenKind::LeftBracket, index) => path.push(PathElement::Index(index)),
                    (TokenKind::Colon, slice @ Node::Slice { .. }) => {
                        path.push(PathElement::Slice(slice))
                    }
                    _ => return Err(not_a_path(node)),
                }
            }
            _ => return Err(not_a_path(node)),
        }
        Ok(())
    }

    let mut path = SmallVec::new();
    visit(&mut path, node)?;
    Ok(path)
}

/// Renders a node back into source form
///
/// Paths round-trip exactly (`foo[::-1]`, `a.b['c']`); other expressions are
/// rendered with single spaces around binary operators.
pub fn to_source(node: &Node) -> String {
    let mut out = String::new();
    write_source(&mut out, node);
    out
}

fn write_source(out: &mut String, node: &Node) {
    match node {
        Node::Token(t) => out.push_str(&t.text),
        Node::Unary { kind, operand, .. } => match kind {
            TokenKind::Dollar => {
                out.push_str("${");
                write_source(out, operand);
                out.push('}');
            }
            TokenKind::Not => {
                out.push_str("not ");
                write_source(out, operand);
            }
            k => {
                out.push_str(k.symbol().unwrap_or_default());
                write_source(out, operand);
            }
        },
        Node::Binary { kind, lhs, rhs, .. } => {
            write_source(out, lhs);
            match kind {
                TokenKind::Dot => {
                    out.push('.');
                    write_source(out, rhs);
                }
                TokenKind::LeftBracket | TokenKind::Colon => {
                    out.push('[');
                    write_source(out, rhs);
                    out.push(']');
                }
                k => {
                    out.push(' ');
                    out.push_str(k.symbol().unwrap_or_default());
                    out.push(' ');
                    write_source(out, rhs);
                }
            }
        }
        Node::Slice {
            start, stop, step, ..
        } => {
            if let Some(n) = start {
                write_source(out, n);
            }
            out.push(':');
            if let Some(n) = stop {
                write_source(out, n);
            }
            if let Some(n) = step {
                out.push(':');
                write_source(out, n);
            }
        }
        Node::List { elements, .. } => {
            out.push('[');
            for (i, e) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_source(out, e);
            }
            out.push(']');
        }
        Node::Mapping { elements, .. } => {
            out.push('{');
            for (i, (k, v)) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&k.text);
                out.push_str(": ");
                write_source(out, v);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Node {
        Parser::new(source)
            .expect("Should create parser")
            .expr()
            .expect("Should parse expression")
    }

    fn word(node: &Node) -> &str {
        node.as_token()
            .and_then(|t| t.identifier())
            .expect("Should be a word")
    }

    fn first_token_kind(source: &str) -> TokenKind {
        Tokenizer::new(source)
            .next_token()
            .expect("Should tokenize")
            .kind
    }

    #[test]
    fn test_token_values() {
        let node = parse_expr("a + 4");
        let Node::Binary { kind, lhs, rhs, .. } = node else {
            panic!("Expected binary node");
        };
        assert_eq!(kind, TokenKind::Plus);
        assert_eq!(word(&lhs), "a");
        let rhs = rhs.as_token().expect("Should be a token");
        assert_eq!(rhs.kind, TokenKind::Integer);
        assert_eq!(rhs.value, Some(TokenValue::Integer(4)));
    }

    #[test]
    fn test_fragments() {
        assert_eq!(word(&parse_expr("foo")), "foo");

        let node = parse_expr("0.5");
        assert_eq!(node.kind(), TokenKind::Float);

        let node = parse_expr("'foo' \"bar\"");
        let t = node.as_token().expect("Should be a token");
        assert_eq!(t.kind, TokenKind::String);
        assert_eq!(t.string_value(), Some("foobar"));
        assert_eq!(t.text, "'foo'\"bar\"");
        assert_eq!(t.start, Location::at(1, 1));
        assert_eq!(t.end, Location::at(1, 11));

        let node = parse_expr("a.b");
        let Node::Binary { kind, lhs, rhs, .. } = node else {
            panic!("Expected binary node");
        };
        assert_eq!(kind, TokenKind::Dot);
        assert_eq!(word(&lhs), "a");
        assert_eq!(word(&rhs), "b");
    }

    #[test]
    fn test_unaries() {
        for op in ["+", "-", "~", "not ", "@"] {
            let node = parse_expr(&format!("{}foo", op));
            let Node::Unary { kind, operand, .. } = node else {
                panic!("Expected unary node for {:?}", op);
            };
            assert_eq!(kind, first_token_kind(op));
            assert_eq!(word(&operand), "foo");
        }
    }

    fn check_binary_level(ops: &[&str]) {
        for op in ops {
            let node = parse_expr(&format!("foo{}bar", op));
            let Node::Binary { kind, lhs, rhs, .. } = node else {
                panic!("Expected binary node for {:?}", op);
            };
            assert_eq!(kind, first_token_kind(op));
            assert_eq!(word(&lhs), "foo");
            assert_eq!(word(&rhs), "bar");
        }
        // every pair of operators at one level groups to the left
        for op1 in ops {
            for op2 in ops {
                let node = parse_expr(&format!("foo{}bar{}baz", op1, op2));
                let Node::Binary { kind, lhs, rhs, .. } = node else {
                    panic!("Expected binary node");
                };
                assert_eq!(kind, first_token_kind(op2));
                assert_eq!(word(&rhs), "baz");
                assert_eq!(lhs.kind(), first_token_kind(op1));
            }
        }
    }

    #[test]
    fn test_binaries() {
        check_binary_level(&["*", "/", "//", "%"]);
        check_binary_level(&["+", " - "]);
        check_binary_level(&["<<", ">>"]);
        check_binary_level(&["&"]);
        check_binary_level(&["^"]);
        check_binary_level(&["|"]);
        check_binary_level(&[" and ", "&&"]);
        check_binary_level(&[" or ", "||"]);
        check_binary_level(&["<", "<=", ">", ">=", "==", "!=", "<>", " in "]);
    }

    #[test]
    fn test_combined_comparisons() {
        let node = parse_expr("a is not b");
        assert_eq!(node.kind(), TokenKind::IsNot);
        let node = parse_expr("a not in b");
        assert_eq!(node.kind(), TokenKind::NotIn);
        let node = parse_expr("a is b");
        assert_eq!(node.kind(), TokenKind::Is);

        let err = Parser::new("a not b")
            .expect("Should create parser")
            .expr()
            .expect_err("Should reject bare not");
        assert_eq!(err.to_string(), "Expected IN but got WORD");
    }

    #[test]
    fn test_power_is_right_associative() {
        let node = parse_expr("foo**bar**baz");
        let Node::Binary { kind, lhs, rhs, .. } = node else {
            panic!("Expected binary node");
        };
        assert_eq!(kind, TokenKind::Power);
        assert_eq!(word(&lhs), "foo");
        let Node::Binary { kind, lhs, rhs, .. } = *rhs else {
            panic!("Expected nested power");
        };
        assert_eq!(kind, TokenKind::Power);
        assert_eq!(word(&lhs), "bar");
        assert_eq!(word(&rhs), "baz");
    }

    #[test]
    fn test_precedence() {
        // a + b * c parses as a + (b * c)
        let node = parse_expr("a + b * c");
        let Node::Binary { kind, rhs, .. } = node else {
            panic!("Expected binary node");
        };
        assert_eq!(kind, TokenKind::Plus);
        assert_eq!(rhs.kind(), TokenKind::Star);

        // not binds looser than comparisons
        let node = parse_expr("not a == b");
        let Node::Unary { kind, operand, .. } = node else {
            panic!("Expected unary node");
        };
        assert_eq!(kind, TokenKind::Not);
        assert_eq!(operand.kind(), TokenKind::Equal);

        // -a ** b parses as -(a ** b)
        let node = parse_expr("-a ** b");
        let Node::Unary { operand, .. } = node else {
            panic!("Expected unary node");
        };
        assert_eq!(operand.kind(), TokenKind::Power);
    }

    fn slice_parts(source: &str) -> (Option<String>, Option<String>, Option<String>) {
        let node = parse_expr(source);
        let Node::Binary { kind, rhs, .. } = node else {
            panic!("Expected trailer");
        };
        assert_eq!(kind, TokenKind::Colon);
        let Node::Slice {
            start, stop, step, ..
        } = *rhs
        else {
            panic!("Expected slice");
        };
        let render = |n: Option<Box<Node>>| n.map(|n| to_source(&n));
        (render(start), render(stop), render(step))
    }

    #[test]
    fn test_slices() {
        let some = |s: &str| Some(s.to_string());
        assert_eq!(
            slice_parts("foo[start:stop:step]"),
            (some("start"), some("stop"), some("step"))
        );
        assert_eq!(slice_parts("foo[start:stop]"), (some("start"), some("stop"), None));
        assert_eq!(slice_parts("foo[start:stop:]"), (some("start"), some("stop"), None));
        assert_eq!(slice_parts("foo[start:]"), (some("start"), None, None));
        assert_eq!(slice_parts("foo[:stop]"), (None, some("stop"), None));
        assert_eq!(slice_parts("foo[::step]"), (None, None, some("step")));
        assert_eq!(slice_parts("foo[::]"), (None, None, None));
        assert_eq!(slice_parts("foo[:]"), (None, None, None));
        assert_eq!(slice_parts("foo[start::]"), (some("start"), None, None));

        let node = parse_expr("foo[start]");
        assert_eq!(node.kind(), TokenKind::LeftBracket);
    }

    #[test]
    fn test_bad_slices() {
        let cases = [
            (
                "foo[start::step:]",
                "Expected RIGHT_BRACKET but got COLON",
                Location::at(1, 16),
            ),
            (
                "foo[a, b:c:d]",
                "Invalid index at (1, 5): expected 1 expression, found 2",
                Location::at(1, 5),
            ),
            (
                "foo[a:b, c:d]",
                "Invalid index at (1, 7): expected 1 expression, found 2",
                Location::at(1, 7),
            ),
            (
                "foo[a:b:c,d, e]",
                "Invalid index at (1, 9): expected 1 expression, found 3",
                Location::at(1, 9),
            ),
        ];
        for (source, message, location) in cases {
            let err = Parser::new(source)
                .expect("Should create parser")
                .expr()
                .expect_err("Should fail to parse");
            assert_eq!(err.to_string(), message, "for {:?}", source);
            assert_eq!(err.location(), location, "for {:?}", source);
        }
    }

    #[test]
    fn test_mapping_body_errors() {
        let err = Parser::new("1: 2")
            .expect("Should create parser")
            .mapping_body()
            .expect_err("Should reject integer keys");
        assert_eq!(err.to_string(), "Unexpected type for key: INTEGER");

        let err = Parser::new("a 2")
            .expect("Should create parser")
            .mapping_body()
            .expect_err("Should require a separator");
        assert_eq!(err.to_string(), "Expected key-value separator, found: INTEGER");
        assert_eq!(err.location(), Location::at(1, 3));

        let err = Parser::new("a: 1 b: 2")
            .expect("Should create parser")
            .mapping_body()
            .expect_err("Should require a separator between entries");
        assert_eq!(err.to_string(), "Expected RIGHT_CURLY or EOF but got WORD");
    }

    #[test]
    fn test_container() {
        let node = Parser::new("\n\na: 1\nb = 'x',\n'c d': [1, 2,\n 3,]\n\n")
            .expect("Should create parser")
            .container()
            .expect("Should parse");
        let Node::Mapping { elements, .. } = node else {
            panic!("Expected mapping");
        };
        let keys: Vec<&str> = elements.iter().map(|(k, _)| k.text.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "'c d'"]);
        let Node::List { elements, .. } = elements[2].1.as_ref() else {
            panic!("Expected list");
        };
        assert_eq!(elements.len(), 3);

        let node = Parser::new("")
            .expect("Should create parser")
            .container()
            .expect("Should parse empty input");
        assert!(matches!(node, Node::Mapping { ref elements, .. } if elements.is_empty()));

        let err = Parser::new("1")
            .expect("Should create parser")
            .container()
            .expect_err("Should reject scalar documents");
        assert_eq!(err.to_string(), "Expected container (mapping or list) but got INTEGER");

        let err = Parser::new("{a: 1} b")
            .expect("Should create parser")
            .container()
            .expect_err("Should reject trailing input");
        assert_eq!(err.to_string(), "Expected EOF but got WORD");
    }

    #[test]
    fn test_node_locations() {
        let node = parse_expr("  foo.bar + [1]");
        assert_eq!(node.start(), Location::at(1, 11));
        let Node::Binary { lhs, rhs, .. } = node else {
            panic!("Expected binary node");
        };
        assert_eq!(lhs.start(), Location::at(1, 6));
        assert_eq!(rhs.start(), Location::at(1, 13));
    }

    #[test]
    fn test_reference() {
        let node = parse_expr("${a.b[1]}");
        assert_eq!(node.kind(), TokenKind::Dollar);
        assert_eq!(to_source(&node), "${a.b[1]}");

        let err = Parser::new("${1}")
            .expect("Should create parser")
            .expr()
            .expect_err("Should require a word");
        assert_eq!(err.to_string(), "Expected WORD but got INTEGER");
    }

    #[test]
    fn test_parse_path() {
        for good in ["foo", "foo.bar", "foo[0]", "foo['x'].y[1:2]", "foo[::-1]"] {
            let node = parse_path(good).expect("Should parse path");
            assert_eq!(to_source(&node), good);
        }

        let bad = ["foo[1, 2]", "foo.", "foo[1] bar", "foo.123", "foo.bar baz", "1foo", "'x'"];
        for path in bad {
            let err = parse_path(path).expect_err("Should reject path");
            assert!(
                matches!(err, ConfigError::InvalidPath { .. }),
                "{:?} gave {:?}",
                path,
                err
            );
            assert_eq!(err.to_string(), format!("Invalid path: {}", path));
        }
    }

    #[test]
    fn test_unpack_path() {
        let node = parse_path("a.b[2]['c'][1:]").expect("Should parse path");
        let path = unpack_path(&node).expect("Should unpack");
        assert_eq!(path.len(), 5);
        assert!(matches!(path[0], PathElement::Attribute(t) if t.text == "a"));
        assert!(matches!(path[1], PathElement::Attribute(t) if t.text == "b"));
        assert!(matches!(path[2], PathElement::Index(n) if to_source(n) == "2"));
        assert!(matches!(path[3], PathElement::Index(n) if to_source(n) == "'c'"));
        assert!(matches!(path[4], PathElement::Slice(Node::Slice { .. })));

        let node = parse_expr("a + b");
        assert!(unpack_path(&node).is_err());
    }

    #[test]
    fn test_to_source() {
        let cases = [
            ("foo[::-1]", "foo[::-1]"),
            ("foo[:]", "foo[:]"),
            ("foo[::]", "foo[:]"),
            ("foo[3]", "foo[3]"),
            ("a.b['c']", "a.b['c']"),
            ("a.b[-x]", "a.b[-x]"),
            ("a+b*2", "a + b * 2"),
            ("[1,2]", "[1, 2]"),
            ("{a:1}", "{a: 1}"),
        ];
        for (source, expected) in cases {
            assert_eq!(to_source(&parse_expr(source)), expected);
        }
    }

    #[test]
    fn test_max_depth() {
        let config = ParserConfig::new().with_max_depth(8);
        let deep = format!("{}1{}", "[".repeat(20), "]".repeat(20));
        let err = Parser::with_config(&deep, config)
            .expect("Should create parser")
            .expr()
            .expect_err("Should exceed depth");
        assert!(matches!(err, ParserError::MaxDepthExceeded { .. }));

        let shallow = format!("{}1{}", "[".repeat(5), "]".repeat(5));
        let config = ParserConfig::new().with_max_depth(8);
        assert!(
            Parser::with_config(&shallow, config)
                .expect("Should create parser")
                .expr()
                .is_ok()
        );
    }
}
