//! Variable handlers used by `$NAME` backtick strings
//!
//! The default converter looks names up through the configuration's
//! [`VariableHandler`]. The process environment is used unless another
//! handler is installed.

use std::collections::HashMap;

/// Trait for resolving `$NAME` variables
pub trait VariableHandler {
    /// Resolves a variable by name
    fn resolve_variable(&self, name: &str) -> Option<String>;
}

impl<F> VariableHandler for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve_variable(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Environment variable handler
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentVariableHandler;

impl VariableHandler for EnvironmentVariableHandler {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Map-based variable handler
#[derive(Debug, Default, Clone)]
pub struct MapVariableHandler {
    variables: HashMap<String, String>,
}

impl MapVariableHandler {
    /// Creates a new map variable handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler from an existing map
    pub fn from_map(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }

    /// Inserts a variable
    pub fn insert(&mut self, name: String, value: String) {
        self.variables.insert(name, value);
    }

    /// Gets a reference to the internal map
    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }
}

impl VariableHandler for MapVariableHandler {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}

/// Chained variable handler that tries multiple handlers in order
#[derive(Default)]
pub struct ChainedVariableHandler {
    handlers: Vec<Box<dyn VariableHandler>>,
}

impl ChainedVariableHandler {
    /// Creates a new chained handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler to the end of the chain
    pub fn add_handler(&mut self, handler: Box<dyn VariableHandler>) {
        self.handlers.push(handler);
    }

    /// Creates a chained handler from a vector of handlers
    pub fn from_handlers(handlers: Vec<Box<dyn VariableHandler>>) -> Self {
        Self { handlers }
    }
}

impl VariableHandler for ChainedVariableHandler {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        self.handlers
            .iter()
            .find_map(|handler| handler.resolve_variable(name))
    }
}
