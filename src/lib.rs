//! # CFG Rust Config
//!
//! A tokenizer, parser and lazy evaluator for the CFG configuration language,
//! with serde integration.
//!
//! ## Overview
//!
//! CFG is a JSON-like configuration format which adds expressions, references
//! between values, includes of other files, and special strings which are
//! converted into dates, environment variables or interpolated text. A
//! document is parsed once and each value is evaluated only when it is looked
//! up.
//!
//! ## Key Features
//!
//! - **Familiar syntax**: JSON-style mappings and lists, with optional
//!   braces at the top level, `#` comments and newlines as separators
//! - **References**: `${a.b[0]}` refers to another value in the configuration
//! - **Expressions**: arithmetic, bitwise and logical operators, plus mapping
//!   merges with `+` and `|`
//! - **Includes**: `@'other.cfg'` pulls in another file as a nested
//!   configuration
//! - **Paths and slices**: `config.get("servers[-1].ports[1:]")`
//! - **Special strings**: `` `$HOME|/tmp` ``, `` `2019-03-28` ``,
//!   `` `${host}:${port}` ``
//! - **Serde Integration**: deserialize any value with `#[derive(Deserialize)]`
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cfg-rust-config = "0.1"
//! serde = { version = "1.0", features = ["derive"] }
//! ```
//!
//! ## Basic Usage
//!
//! ```rust
//! use cfg_config::{Config, Value};
//!
//! let config = Config::from_source(r#"
//!     ## A small service description
//!     name: 'my-server'
//!     port: 8000 + 80
//!     hosts: ['alpha', 'beta', 'gamma']
//!     primary: ${hosts[0]}
//! "#)?;
//!
//! assert_eq!(config.get("port")?, Value::Integer(8080));
//! assert_eq!(config.get("primary")?, Value::from("alpha"));
//! assert_eq!(config.get("hosts[1:]")?.to_string(), "[beta, gamma]");
//! # Ok::<(), cfg_config::ConfigError>(())
//! ```
//!
//! ## Typed Extraction
//!
//! ```rust
//! use serde::Deserialize;
//! use cfg_config::Config;
//!
//! #[derive(Debug, Deserialize)]
//! struct Database {
//!     host: String,
//!     port: u16,
//! }
//!
//! let config = Config::from_source("database: {host: 'db', port: 5432}")?;
//! let database: Database = config.get_as("database")?;
//! assert_eq!(database.port, 5432);
//! # Ok::<(), cfg_config::CfgError>(())
//! ```
//!
//! ## Merging and Includes
//!
//! ```rust
//! use cfg_config::{Config, MemoryFileResolver};
//!
//! let files = MemoryFileResolver::new()
//!     .with_file("/etc/app/base.cfg", "logging: {level: 'info', file: 'app.log'}");
//!
//! let config = Config::new();
//! config.set_file_resolver(files);
//! config.add_include("/etc/app");
//! config.load("base: @'base.cfg'\nlogging: ${base.logging} + {level: 'debug'}")?;
//!
//! assert_eq!(config.get("logging")?.to_string(), "{level: debug, file: app.log}");
//! # Ok::<(), cfg_config::ConfigError>(())
//! ```
//!
//! ## Error Handling
//!
//! Every error carries the location where it was detected:
//!
//! ```rust
//! use cfg_config::{Config, ConfigError};
//!
//! match Config::from_source("key: 'unterminated") {
//!     Err(ConfigError::Syntax(error)) => {
//!         let location = error.location();
//!         assert_eq!((location.line, location.column), (1, 6));
//!     }
//!     other => panic!("unexpected result: {:?}", other),
//! }
//! ```
//!
//! Lookups which fail because a key is absent can fall back to a default with
//! [`Config::get_or`]; malformed paths and circular references are always
//! reported.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: `debug!` for loads and includes,
//! `trace!` for tokens and path steps, and `warn!` for strings which could
//! not be converted. No logger is installed by the crate itself.

pub mod config;
pub mod converter;
pub mod deserializer;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod value;
pub mod variables;

#[cfg(test)]
mod error_tests;

// Re-export main types and functions
pub use config::{Config, ConfigOptions};
pub use deserializer::{ValueDeserializer, from_config, from_str, from_value};
pub use error::{CfgError, ConfigError, ErrorContext, Location, ParserError, TokenizerError};
pub use lexer::{LexerConfig, Token, TokenKind, TokenValue, Tokenizer};
pub use parser::{Node, Parser, ParserConfig, parse_path, to_source, unpack_path};
pub use value::{DictWrapper, Item, ListWrapper, Value};

// Re-export collaborator traits and their implementations
pub use converter::{
    DefaultStringConverter, MapObjectResolver, NullObjectResolver, ObjectReference,
    ObjectResolver, StringConverter,
};
pub use resolver::{FileResolver, FileSystemResolver, MemoryFileResolver};
pub use variables::{
    ChainedVariableHandler, EnvironmentVariableHandler, MapVariableHandler, VariableHandler,
};
