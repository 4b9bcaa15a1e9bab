//! Configuration objects
//!
//! A [`Config`] holds the parsed top-level mapping of a CFG document
//! together with the settings and collaborators used to evaluate it. Values
//! are only evaluated when looked up:
//!
//! ```rust
//! use cfg_config::{Config, Value};
//!
//! let config = Config::from_source("base: 10\nderived: ${base} * 2").unwrap();
//! assert_eq!(config.get("derived").unwrap(), Value::Integer(20));
//! ```
//!
//! Keys which are not plain identifiers are treated as paths, so
//! `config.get("servers[0].host")` walks into nested mappings and lists, and
//! through any configurations pulled in with `@"file.cfg"`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::converter::{
    DefaultStringConverter, IDENTIFIER_PATTERN, NullObjectResolver, ObjectResolver,
    StringConverter,
};
use crate::error::{CfgError, ConfigError};
use crate::evaluator::{DEFAULT_MAX_EVALUATION_DEPTH, Evaluator};
use crate::parser::{Node, Parser, ParserConfig, parse_path};
use crate::resolver::{FileResolver, FileSystemResolver};
use crate::value::{DictWrapper, Item, Value};
use crate::variables::{EnvironmentVariableHandler, VariableHandler};

/// Settings for a new [`Config`]
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    /// Reject mappings which repeat a key
    pub no_duplicates: bool,
    /// Fail on backtick strings which no conversion rule accepts
    pub strict_conversions: bool,
    /// Remember the result of each lookup until the next load
    pub cached: bool,
    /// Values for bare words used in expressions
    pub context: IndexMap<String, Value>,
    /// Directories searched for `@` includes after the including file's own directory
    pub include_path: Vec<PathBuf>,
    /// Limit on nested lookups within one resolution
    pub max_evaluation_depth: usize,
    pub parser: ParserConfig,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            no_duplicates: true,
            strict_conversions: true,
            cached: false,
            context: IndexMap::new(),
            include_path: Vec::new(),
            max_evaluation_depth: DEFAULT_MAX_EVALUATION_DEPTH,
            parser: ParserConfig::default(),
        }
    }
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_no_duplicates(mut self, no_duplicates: bool) -> Self {
        self.no_duplicates = no_duplicates;
        self
    }

    pub fn with_strict_conversions(mut self, strict: bool) -> Self {
        self.strict_conversions = strict;
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn with_context(mut self, context: IndexMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Appends a directory to the include path
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_path.push(dir.into());
        self
    }

    pub fn with_max_evaluation_depth(mut self, depth: usize) -> Self {
        self.max_evaluation_depth = depth;
        self
    }

    pub fn with_parser_config(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }
}

pub(crate) struct ConfigInner {
    no_duplicates: Cell<bool>,
    strict_conversions: Cell<bool>,
    context: RefCell<IndexMap<String, Value>>,
    include_path: RefCell<Vec<PathBuf>>,
    path: RefCell<Option<PathBuf>>,
    root_dir: RefCell<Option<PathBuf>>,
    parser: ParserConfig,
    string_converter: RefCell<Rc<dyn StringConverter>>,
    file_resolver: RefCell<Rc<dyn FileResolver>>,
    variable_handler: RefCell<Rc<dyn VariableHandler>>,
    object_resolver: RefCell<Rc<dyn ObjectResolver>>,
    parent: Weak<ConfigInner>,
    data: RefCell<Option<DictWrapper>>,
    cache: RefCell<Option<IndexMap<String, Item>>>,
    /// Configurations included from files, keyed by absolute path
    includes: RefCell<IndexMap<PathBuf, Config>>,
    evaluator: Evaluator,
}

/// A loaded CFG configuration
///
/// `Config` is a cheap handle: clones share the same underlying state, and
/// two handles compare equal only if they refer to the same configuration.
#[derive(Clone)]
pub struct Config {
    inner: Rc<ConfigInner>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates an empty configuration with default settings
    pub fn new() -> Self {
        Self::with_options(ConfigOptions::default())
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self {
            inner: Rc::new(ConfigInner {
                no_duplicates: Cell::new(options.no_duplicates),
                strict_conversions: Cell::new(options.strict_conversions),
                context: RefCell::new(options.context),
                include_path: RefCell::new(options.include_path),
                path: RefCell::new(None),
                root_dir: RefCell::new(None),
                parser: options.parser,
                string_converter: RefCell::new(Rc::new(DefaultStringConverter)),
                file_resolver: RefCell::new(Rc::new(FileSystemResolver)),
                variable_handler: RefCell::new(Rc::new(EnvironmentVariableHandler)),
                object_resolver: RefCell::new(Rc::new(NullObjectResolver)),
                parent: Weak::new(),
                data: RefCell::new(None),
                cache: RefCell::new(options.cached.then(IndexMap::new)),
                includes: RefCell::new(IndexMap::new()),
                evaluator: Evaluator::new(options.max_evaluation_depth),
            }),
        }
    }

    /// Loads a configuration from a file with default settings
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::new();
        config.load_file(path)?;
        Ok(config)
    }

    /// Loads a configuration from source text with default settings
    pub fn from_source(source: &str) -> Result<Self, ConfigError> {
        let config = Self::new();
        config.load(source)?;
        Ok(config)
    }

    /// Parses `source` and makes its top-level mapping the data of this configuration
    ///
    /// Any cached lookups and included configurations are discarded.
    pub fn load(&self, source: &str) -> Result<(), ConfigError> {
        let elements = match self.parse_container(source)? {
            Node::Mapping { elements, .. } => elements,
            other => {
                return Err(ConfigError::RootNotMapping {
                    location: other.start(),
                });
            }
        };
        let data = DictWrapper::wrap(self, &elements, self.no_duplicates())?;
        debug!(keys = data.len(); "configuration loaded");
        self.set_data(data);
        Ok(())
    }

    /// Reads all of `reader` and loads it
    pub fn load_reader(&self, mut reader: impl Read) -> Result<(), ConfigError> {
        let mut source = String::new();
        reader
            .read_to_string(&mut source)
            .map_err(|source| ConfigError::Io {
                path: "<reader>".to_string(),
                source,
            })?;
        self.load(&source)
    }

    /// Loads a file through the file resolver
    ///
    /// The file's absolute path becomes this configuration's path, and its
    /// directory is searched first for relative includes.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let resolver = self.file_resolver();
        let absolute = resolver.resolve_absolute(path);
        debug!(path:? = absolute; "loading configuration file");
        let source = resolver
            .read_to_string(&absolute)
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        *self.inner.root_dir.borrow_mut() = absolute.parent().map(Path::to_path_buf);
        *self.inner.path.borrow_mut() = Some(absolute);
        self.load(&source)
    }

    /// Returns true if `key` is a plain identifier rather than a path
    pub fn is_identifier(key: &str) -> bool {
        IDENTIFIER_PATTERN.is_match(key)
    }

    /// Looks up `key`, returning the lazily evaluated item
    ///
    /// An identifier must name a top-level key; anything else is parsed as a
    /// path such as `a.b[0]['c'][1:]`.
    pub fn base_get(&self, key: &str) -> Result<Item, ConfigError> {
        let cached = self
            .inner
            .cache
            .borrow()
            .as_ref()
            .and_then(|cache| cache.get(key).cloned());
        if let Some(item) = cached {
            return Ok(item);
        }

        let data = self.data()?;
        let evaluator = &self.inner.evaluator;
        let resolution = evaluator.enter(self)?;
        let item = match data.slot(key) {
            Some(slot) => evaluator.resolve_slot(&slot)?,
            None if Self::is_identifier(key) => {
                return Err(ConfigError::NotFound {
                    key: key.to_string(),
                    location: None,
                });
            }
            None => evaluator.get_from_path(self, &parse_path(key)?)?,
        };
        drop(resolution);

        if let Some(cache) = self.inner.cache.borrow_mut().as_mut() {
            cache.insert(key.to_string(), item.clone());
        }
        Ok(item)
    }

    /// Like [`base_get`](Self::base_get), with a fallback for recoverable errors
    pub fn base_get_or(&self, key: &str, default: Item) -> Result<Item, ConfigError> {
        match self.base_get(key) {
            Err(e) if e.is_recoverable() => Ok(default),
            other => other,
        }
    }

    /// Looks up `key` and fully evaluates the result
    ///
    /// Included configurations stay as [`Value::Config`].
    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        self.base_get(key)?.unwrap()
    }

    /// Like [`get`](Self::get), returning `default` when the key cannot be
    /// resolved
    ///
    /// Malformed paths, bad indices and circular references are still
    /// reported, see [`ConfigError::is_recoverable`].
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value, ConfigError> {
        match self.get(key) {
            Err(e) if e.is_recoverable() => Ok(default),
            other => other,
        }
    }

    /// Looks up `key` and deserializes the result into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, CfgError> {
        crate::deserializer::from_value(self.get(key)?.into_plain()?)
    }

    /// Returns true if the top-level mapping has `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.data().is_ok_and(|data| data.contains_key(key))
    }

    /// Fully evaluates the whole configuration, included files too
    pub fn as_dict(&self) -> Result<IndexMap<String, Value>, ConfigError> {
        self.data()?.as_dict()
    }

    /// Runs the string converter on the text of a backtick string
    pub fn convert_string(&self, text: &str) -> Result<Value, ConfigError> {
        let converter = self.string_converter();
        match converter.convert(text, self) {
            Some(value) => Ok(value),
            None if self.strict_conversions() => {
                warn!(text = text; "unable to convert string");
                Err(ConfigError::Conversion {
                    text: text.to_string(),
                })
            }
            None => Ok(Value::String(text.to_string())),
        }
    }

    pub fn no_duplicates(&self) -> bool {
        self.inner.no_duplicates.get()
    }

    /// Applies to mappings wrapped after the change, including the next load
    pub fn set_no_duplicates(&self, no_duplicates: bool) {
        self.inner.no_duplicates.set(no_duplicates);
    }

    pub fn strict_conversions(&self) -> bool {
        self.inner.strict_conversions.get()
    }

    pub fn set_strict_conversions(&self, strict: bool) {
        self.inner.strict_conversions.set(strict);
    }

    pub fn is_cached(&self) -> bool {
        self.inner.cache.borrow().is_some()
    }

    /// Turns lookup caching on or off; turning it off discards the cache
    pub fn set_cached(&self, cached: bool) {
        let mut cache = self.inner.cache.borrow_mut();
        match (cached, cache.is_some()) {
            (true, false) => *cache = Some(IndexMap::new()),
            (false, true) => *cache = None,
            _ => {}
        }
    }

    pub fn context(&self) -> IndexMap<String, Value> {
        self.inner.context.borrow().clone()
    }

    /// Replaces the values available to bare words, discarding cached lookups
    pub fn set_context(&self, context: IndexMap<String, Value>) {
        *self.inner.context.borrow_mut() = context;
        self.clear_cache();
        self.inner.includes.borrow_mut().clear();
    }

    pub(crate) fn context_value(&self, name: &str) -> Option<Value> {
        self.inner.context.borrow().get(name).cloned()
    }

    pub fn include_path(&self) -> Vec<PathBuf> {
        self.inner.include_path.borrow().clone()
    }

    pub fn set_include_path(&self, include_path: Vec<PathBuf>) {
        *self.inner.include_path.borrow_mut() = include_path;
    }

    /// Appends a directory to the include path
    pub fn add_include(&self, dir: impl Into<PathBuf>) {
        self.inner.include_path.borrow_mut().push(dir.into());
    }

    /// The absolute path of the file this configuration was loaded from
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.path.borrow().clone()
    }

    pub fn root_dir(&self) -> Option<PathBuf> {
        self.inner.root_dir.borrow().clone()
    }

    /// The configuration which included this one, if it is still alive
    pub fn parent(&self) -> Option<Config> {
        self.inner.parent.upgrade().map(|inner| Config { inner })
    }

    pub fn string_converter(&self) -> Rc<dyn StringConverter> {
        Rc::clone(&self.inner.string_converter.borrow())
    }

    pub fn set_string_converter(&self, converter: impl StringConverter + 'static) {
        *self.inner.string_converter.borrow_mut() = Rc::new(converter);
    }

    pub fn file_resolver(&self) -> Rc<dyn FileResolver> {
        Rc::clone(&self.inner.file_resolver.borrow())
    }

    pub fn set_file_resolver(&self, resolver: impl FileResolver + 'static) {
        *self.inner.file_resolver.borrow_mut() = Rc::new(resolver);
    }

    pub fn variable_handler(&self) -> Rc<dyn VariableHandler> {
        Rc::clone(&self.inner.variable_handler.borrow())
    }

    pub fn set_variable_handler(&self, handler: impl VariableHandler + 'static) {
        *self.inner.variable_handler.borrow_mut() = Rc::new(handler);
    }

    pub fn object_resolver(&self) -> Rc<dyn ObjectResolver> {
        Rc::clone(&self.inner.object_resolver.borrow())
    }

    pub fn set_object_resolver(&self, resolver: impl ObjectResolver + 'static) {
        *self.inner.object_resolver.borrow_mut() = Rc::new(resolver);
    }

    /// Returns true if both handles refer to the same configuration
    pub fn ptr_eq(&self, other: &Config) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn evaluator(&self) -> &Evaluator {
        &self.inner.evaluator
    }

    pub(crate) fn data(&self) -> Result<DictWrapper, ConfigError> {
        self.inner
            .data
            .borrow()
            .clone()
            .ok_or(ConfigError::NotLoaded)
    }

    pub(crate) fn set_data(&self, data: DictWrapper) {
        *self.inner.data.borrow_mut() = Some(data);
        self.clear_cache();
        self.inner.includes.borrow_mut().clear();
    }

    fn clear_cache(&self) {
        if let Some(cache) = self.inner.cache.borrow_mut().as_mut() {
            cache.clear();
        }
    }

    pub(crate) fn evaluate(&self, node: &Node) -> Result<Item, ConfigError> {
        self.inner.evaluator.evaluate(self, node)
    }

    pub(crate) fn downgrade(&self) -> Weak<ConfigInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<ConfigInner>) -> Result<Config, ConfigError> {
        inner
            .upgrade()
            .map(|inner| Config { inner })
            .ok_or(ConfigError::Detached)
    }

    pub(crate) fn parse_container(&self, source: &str) -> Result<Node, ConfigError> {
        let mut parser = Parser::with_config(source, self.inner.parser.clone())?;
        Ok(parser.container()?)
    }

    /// Returns true if `path` is the file of this configuration or of any
    /// configuration which included it
    pub(crate) fn include_chain_contains(&self, path: &Path) -> bool {
        let mut current = Some(self.clone());
        while let Some(config) = current {
            if config.inner.path.borrow().as_deref() == Some(path) {
                return true;
            }
            current = config.parent();
        }
        false
    }

    pub(crate) fn cached_include(&self, path: &Path) -> Option<Config> {
        self.inner.includes.borrow().get(path).cloned()
    }

    pub(crate) fn remember_include(&self, path: PathBuf, child: Config) {
        self.inner.includes.borrow_mut().insert(path, child);
    }

    /// Creates the configuration for an included file
    ///
    /// The child shares this configuration's settings and collaborators but
    /// has its own data, cache and evaluator.
    pub(crate) fn new_child(&self, path: &Path) -> Config {
        let inner = &self.inner;
        Config {
            inner: Rc::new(ConfigInner {
                no_duplicates: Cell::new(inner.no_duplicates.get()),
                strict_conversions: Cell::new(inner.strict_conversions.get()),
                context: RefCell::new(inner.context.borrow().clone()),
                include_path: RefCell::new(inner.include_path.borrow().clone()),
                path: RefCell::new(Some(path.to_path_buf())),
                root_dir: RefCell::new(path.parent().map(Path::to_path_buf)),
                parser: inner.parser.clone(),
                string_converter: RefCell::new(self.string_converter()),
                file_resolver: RefCell::new(self.file_resolver()),
                variable_handler: RefCell::new(self.variable_handler()),
                object_resolver: RefCell::new(self.object_resolver()),
                parent: Rc::downgrade(inner),
                data: RefCell::new(None),
                cache: RefCell::new(self.is_cached().then(IndexMap::new)),
                includes: RefCell::new(IndexMap::new()),
                evaluator: Evaluator::new(inner.evaluator.max_depth()),
            }),
        }
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.inner.path.borrow())
            .field("loaded", &self.inner.data.borrow().is_some())
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_dict() {
            Ok(map) => write!(f, "{}", Value::Mapping(map)),
            Err(_) => match self.inner.path.borrow().as_deref() {
                Some(path) => write!(f, "<Config {}>", path.display()),
                None => f.write_str("<Config>"),
            },
        }
    }
}
