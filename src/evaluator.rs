//! Lazy evaluation of parsed CFG expressions
//!
//! Every [`Config`] owns one [`Evaluator`]. It turns AST nodes into
//! [`Item`]s on demand, walks path expressions such as `a.b[2][1:]`,
//! resolves `@` includes, and detects reference cycles by recording each
//! `${...}` node it passes through during a single lookup.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, trace};
use num_complex::Complex64;

use crate::config::Config;
use crate::error::{ConfigError, Location};
use crate::lexer::{Token, TokenKind};
use crate::parser::{Node, PathElement, to_source, unpack_path};
use crate::resolver::FileResolver;
use crate::value::{DictWrapper, Item, ListWrapper, Slot, Value, key_text};

/// Default limit on nested lookups within one resolution
pub const DEFAULT_MAX_EVALUATION_DEPTH: usize = 100;

/// Per-configuration evaluation state
#[derive(Debug)]
pub struct Evaluator {
    refs_seen: RefCell<BTreeSet<(String, Location)>>,
    depth: Cell<usize>,
    max_depth: usize,
}

/// An open lookup on an evaluator
///
/// The set of seen references is cleared when the outermost lookup closes.
pub(crate) struct Resolution {
    config: Config,
}

impl Drop for Resolution {
    fn drop(&mut self) {
        let evaluator = self.config.evaluator();
        let depth = evaluator.depth.get().saturating_sub(1);
        evaluator.depth.set(depth);
        if depth == 0 {
            evaluator.refs_seen.borrow_mut().clear();
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVALUATION_DEPTH)
    }
}

impl Evaluator {
    pub fn new(max_depth: usize) -> Self {
        Self {
            refs_seen: RefCell::new(BTreeSet::new()),
            depth: Cell::new(0),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns the references recorded by the lookup in progress, sorted
    pub fn references_seen(&self) -> Vec<(String, Location)> {
        self.refs_seen.borrow().iter().cloned().collect()
    }

    /// Opens a lookup on `config`, whose evaluator must be `self`
    pub(crate) fn enter(&self, config: &Config) -> Result<Resolution, ConfigError> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(ConfigError::RecursionLimit {
                limit: self.max_depth,
            });
        }
        if depth == 0 {
            self.refs_seen.borrow_mut().clear();
        }
        self.depth.set(depth + 1);
        Ok(Resolution {
            config: config.clone(),
        })
    }

    /// Records a `${...}` node, failing if it was already seen in this lookup
    fn check_reference(&self, node: &Node) -> Result<(), ConfigError> {
        let Node::Unary {
            kind: TokenKind::Dollar,
            operand,
            start,
        } = node
        else {
            return Ok(());
        };
        let key = (to_source(operand), *start);
        let mut seen = self.refs_seen.borrow_mut();
        if seen.contains(&key) {
            return Err(ConfigError::CircularReference {
                references: seen.iter().cloned().collect(),
            });
        }
        trace!(reference:% = key.0, location:% = key.1; "reference");
        seen.insert(key);
        Ok(())
    }

    /// Evaluates a slot reached during a lookup on this evaluator
    pub(crate) fn resolve_slot(&self, slot: &Slot) -> Result<Item, ConfigError> {
        match slot {
            Slot::Ready(item) => Ok(item.clone()),
            Slot::Pending { node, owner } => {
                self.check_reference(node)?;
                Config::upgrade(owner)?.evaluate(node)
            }
        }
    }

    /// Evaluates `node` in the context of `config`
    pub fn evaluate(&self, config: &Config, node: &Node) -> Result<Item, ConfigError> {
        match node {
            Node::Token(token) => self.evaluate_token(config, token),
            Node::Mapping { elements, .. } => Ok(Item::Mapping(DictWrapper::wrap(
                config,
                elements,
                config.no_duplicates(),
            )?)),
            Node::List { elements, .. } => Ok(Item::List(ListWrapper::wrap(config, elements))),
            Node::Unary {
                kind,
                operand,
                start,
            } => self.evaluate_unary(config, *kind, operand, *start),
            Node::Binary {
                kind,
                lhs,
                rhs,
                start,
            } => self.evaluate_binary(config, *kind, lhs, rhs, *start),
            Node::Slice { location, .. } => Err(ConfigError::Unsupported {
                operation: "slice outside of brackets",
                location: *location,
            }),
        }
    }

    fn evaluate_token(&self, config: &Config, token: &Token) -> Result<Item, ConfigError> {
        match token.kind {
            TokenKind::Word => {
                let name = token.identifier().unwrap_or(&token.text);
                config
                    .context_value(name)
                    .map(Item::from)
                    .ok_or_else(|| ConfigError::UnknownVariable {
                        name: name.to_string(),
                        location: token.start,
                    })
            }
            TokenKind::BackTick => {
                let text = token.string_value().unwrap_or_default();
                Ok(Item::from(config.convert_string(text)?))
            }
            _ => match &token.value {
                Some(value) => Ok(Item::from(Value::from(value))),
                None => Err(ConfigError::Unsupported {
                    operation: "evaluate punctuation",
                    location: token.start,
                }),
            },
        }
    }

    fn evaluate_unary(
        &self,
        config: &Config,
        kind: TokenKind,
        operand: &Node,
        location: Location,
    ) -> Result<Item, ConfigError> {
        match kind {
            TokenKind::At => self.include(config, operand, location),
            TokenKind::Dollar => self.get_from_path(config, operand),
            TokenKind::Not => {
                let value = self.evaluate(config, operand)?;
                Ok(Item::Value(Value::Bool(!value.is_truthy())))
            }
            _ => {
                let value = self.evaluate(config, operand)?;
                negate_or_complement(kind, value, location)
            }
        }
    }

    fn evaluate_binary(
        &self,
        config: &Config,
        kind: TokenKind,
        lhs: &Node,
        rhs: &Node,
        location: Location,
    ) -> Result<Item, ConfigError> {
        match kind {
            TokenKind::And => {
                let result = self.evaluate(config, lhs)?.is_truthy()
                    && self.evaluate(config, rhs)?.is_truthy();
                Ok(Item::Value(Value::Bool(result)))
            }
            TokenKind::Or => {
                let result = self.evaluate(config, lhs)?.is_truthy()
                    || self.evaluate(config, rhs)?.is_truthy();
                Ok(Item::Value(Value::Bool(result)))
            }
            TokenKind::Dot | TokenKind::LeftBracket | TokenKind::Colon => {
                let element = match (kind, rhs) {
                    (TokenKind::Dot, Node::Token(token)) => PathElement::Attribute(token),
                    (TokenKind::LeftBracket, index) => PathElement::Index(index),
                    (TokenKind::Colon, slice) => PathElement::Slice(slice),
                    _ => {
                        return Err(ConfigError::Unsupported {
                            operation: "attribute access",
                            location,
                        });
                    }
                };
                let base = self.evaluate(config, lhs)?;
                self.walk(config, base, &[element])
            }
            _ => {
                let l = self.evaluate(config, lhs)?;
                let r = self.evaluate(config, rhs)?;
                apply_binary(kind, l, r, location)
            }
        }
    }

    /// Finds an include target: absolute paths as given, otherwise the
    /// directory of the including file and then each include path entry
    fn locate(&self, config: &Config, name: &str, resolver: &dyn FileResolver) -> Option<PathBuf> {
        let path = Path::new(name);
        let mut candidates = Vec::new();
        if path.is_absolute() {
            candidates.push(path.to_path_buf());
        } else {
            candidates.push(match config.root_dir() {
                Some(dir) => dir.join(path),
                None => path.to_path_buf(),
            });
            candidates.extend(config.include_path().iter().map(|dir| dir.join(path)));
        }
        candidates.into_iter().find(|c| resolver.exists(c))
    }

    fn include(&self, config: &Config, operand: &Node, location: Location) -> Result<Item, ConfigError> {
        let item = self.evaluate(config, operand)?;
        let Item::Value(Value::String(name)) = &item else {
            return Err(ConfigError::IncludeNotString {
                found: item.describe(),
                location,
            });
        };
        let resolver = config.file_resolver();
        let found = self
            .locate(config, name, resolver.as_ref())
            .ok_or_else(|| ConfigError::IncludeNotFound {
                name: name.clone(),
                location,
            })?;
        let absolute = resolver.resolve_absolute(&found);

        if config.include_chain_contains(&absolute) {
            let name = absolute
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            return Err(ConfigError::SelfInclude { name });
        }
        if let Some(child) = config.cached_include(&absolute) {
            return Ok(Item::Config(child));
        }

        debug!(path:? = absolute; "including file");
        let source = resolver
            .read_to_string(&absolute)
            .map_err(|source| ConfigError::Io {
                path: absolute.display().to_string(),
                source,
            })?;
        match config.parse_container(&source)? {
            Node::Mapping { elements, .. } => {
                let child = config.new_child(&absolute);
                child.set_data(DictWrapper::wrap(&child, &elements, child.no_duplicates())?);
                config.remember_include(absolute, child.clone());
                Ok(Item::Config(child))
            }
            Node::List { elements, .. } => Ok(Item::List(ListWrapper::wrap(config, &elements))),
            other => Err(ConfigError::RootNotMapping {
                location: other.start(),
            }),
        }
    }

    /// Resolves a path expression rooted at a key of `config`
    pub fn get_from_path(&self, config: &Config, node: &Node) -> Result<Item, ConfigError> {
        let path = unpack_path(node).map_err(|source| ConfigError::InvalidPath {
            path: to_source(node),
            source,
        })?;
        let _resolution = self.enter(config)?;
        trace!(path:% = node; "resolving path");
        self.walk(config, Item::Config(config.clone()), &path)
    }

    /// Applies path steps to `start`
    ///
    /// Stepping into an included configuration moves all further reference
    /// tracking to that configuration's evaluator.
    fn walk(
        &self,
        config: &Config,
        start: Item,
        path: &[PathElement<'_>],
    ) -> Result<Item, ConfigError> {
        let mut current = config.clone();
        let mut resolutions = Vec::new();
        let mut result = start;

        for element in path {
            result = match *element {
                PathElement::Attribute(token) => {
                    let key = key_text(token);
                    match result {
                        Item::Config(next) => {
                            repeg(&mut current, &mut resolutions, next)?;
                            lookup(&current, &current.data()?, &key, token.start)?
                        }
                        Item::Mapping(dict) => lookup(&current, &dict, &key, token.start)?,
                        other => {
                            return Err(ConfigError::BadIndex {
                                message: format!(
                                    "cannot look up {} in {}",
                                    key,
                                    other.describe()
                                ),
                                location: token.start,
                            });
                        }
                    }
                }
                PathElement::Index(node) => {
                    let location = node.start();
                    let index = self.evaluate(config, node)?;
                    match (result, index) {
                        (Item::List(list), Item::Value(Value::Integer(i))) => {
                            let position = list_index(i, list.len(), location)?;
                            let evaluator = current.evaluator();
                            list.resolve_with(position, |slot| evaluator.resolve_slot(slot))?
                        }
                        (Item::List(_), other) => {
                            return Err(ConfigError::BadIndex {
                                message: format!(
                                    "integer required, but found {}",
                                    other.describe()
                                ),
                                location,
                            });
                        }
                        (Item::Config(next), Item::Value(Value::String(key))) => {
                            repeg(&mut current, &mut resolutions, next)?;
                            lookup(&current, &current.data()?, &key, location)?
                        }
                        (Item::Mapping(dict), Item::Value(Value::String(key))) => {
                            lookup(&current, &dict, &key, location)?
                        }
                        (Item::Config(_) | Item::Mapping(_), other) => {
                            return Err(ConfigError::BadIndex {
                                message: format!(
                                    "string required, but found {}",
                                    other.describe()
                                ),
                                location,
                            });
                        }
                        (other, _) => {
                            return Err(ConfigError::BadIndex {
                                message: format!("cannot index {}", other.describe()),
                                location,
                            });
                        }
                    }
                }
                PathElement::Slice(node) => {
                    let Node::Slice {
                        start,
                        stop,
                        step,
                        location,
                    } = node
                    else {
                        return Err(ConfigError::Unsupported {
                            operation: "slice",
                            location: node.start(),
                        });
                    };
                    let Item::List(list) = result else {
                        return Err(ConfigError::BadIndex {
                            message: "slices can only operate on lists".to_string(),
                            location: *location,
                        });
                    };
                    let start = self.slice_bound(config, start.as_deref())?;
                    let stop = self.slice_bound(config, stop.as_deref())?;
                    let step = self.slice_bound(config, step.as_deref())?;
                    Item::List(list.slice(start, stop, step, *location)?)
                }
            };
        }
        drop(resolutions);
        Ok(result)
    }

    fn slice_bound(&self, config: &Config, node: Option<&Node>) -> Result<Option<i64>, ConfigError> {
        let Some(node) = node else {
            return Ok(None);
        };
        match self.evaluate(config, node)? {
            Item::Value(Value::Integer(i)) => Ok(Some(i)),
            other => Err(ConfigError::BadIndex {
                message: format!(
                    "slice index must be an integer, but found {}",
                    other.describe()
                ),
                location: node.start(),
            }),
        }
    }
}

fn repeg(
    current: &mut Config,
    resolutions: &mut Vec<Resolution>,
    next: Config,
) -> Result<(), ConfigError> {
    if !current.ptr_eq(&next) {
        resolutions.push(next.evaluator().enter(&next)?);
        *current = next;
    }
    Ok(())
}

fn lookup(
    current: &Config,
    dict: &DictWrapper,
    key: &str,
    location: Location,
) -> Result<Item, ConfigError> {
    let slot = dict.slot(key).ok_or_else(|| ConfigError::NotFound {
        key: key.to_string(),
        location: Some(location),
    })?;
    trace!(key = key, location:% = location; "path step");
    current.evaluator().resolve_slot(&slot)
}

/// Converts a possibly negative index into a position in a list of `len` elements
fn list_index(index: i64, len: usize, location: Location) -> Result<usize, ConfigError> {
    let size = len as i64;
    let adjusted = if index < 0 && index >= -size {
        index + size
    } else {
        index
    };
    if adjusted < 0 || adjusted >= size {
        return Err(ConfigError::BadIndex {
            message: format!(
                "index out of range: is {}, must be between 0 and {}",
                index,
                size - 1
            ),
            location,
        });
    }
    Ok(adjusted as usize)
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Float(f64),
    Complex(Complex64),
}

impl Number {
    fn of(item: &Item) -> Option<Self> {
        match item {
            Item::Value(Value::Integer(i)) => Some(Number::Integer(*i)),
            Item::Value(Value::Float(f)) => Some(Number::Float(*f)),
            Item::Value(Value::Complex(c)) => Some(Number::Complex(*c)),
            _ => None,
        }
    }

    fn as_float(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
            Number::Complex(c) => c.re,
        }
    }

    fn as_complex(self) -> Complex64 {
        match self {
            Number::Integer(i) => Complex64::new(i as f64, 0.0),
            Number::Float(f) => Complex64::new(f, 0.0),
            Number::Complex(c) => c,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Integer(i) => i == 0,
            Number::Float(f) => f == 0.0,
            Number::Complex(c) => c.re == 0.0 && c.im == 0.0,
        }
    }
}

fn integer(value: i64) -> Item {
    Item::Value(Value::Integer(value))
}

fn boolean(value: bool) -> Item {
    Item::Value(Value::Bool(value))
}

fn invalid_operands(operation: &'static str, lhs: &Item, rhs: &Item, location: Location) -> ConfigError {
    ConfigError::InvalidOperands {
        operation,
        lhs: lhs.describe(),
        rhs: rhs.describe(),
        location,
    }
}

/// Applies integer, float and complex versions of an arithmetic operator
/// after promoting both operands to a common type
fn arithmetic(
    operation: &'static str,
    lhs: Number,
    rhs: Number,
    location: Location,
    on_integers: impl Fn(i64, i64) -> Option<i64>,
    on_floats: impl Fn(f64, f64) -> f64,
    on_complex: impl Fn(Complex64, Complex64) -> Complex64,
) -> Result<Item, ConfigError> {
    let value = match (lhs, rhs) {
        (Number::Integer(a), Number::Integer(b)) => {
            Value::Integer(on_integers(a, b).ok_or(ConfigError::Overflow { operation, location })?)
        }
        (Number::Complex(_), _) | (_, Number::Complex(_)) => {
            Value::Complex(on_complex(lhs.as_complex(), rhs.as_complex()))
        }
        _ => Value::Float(on_floats(lhs.as_float(), rhs.as_float())),
    };
    Ok(Item::Value(value))
}

/// Applies an operator that only takes two integers
fn integer_only(
    operation: &'static str,
    lhs: &Item,
    rhs: &Item,
    location: Location,
    f: impl Fn(i64, i64) -> Result<i64, ConfigError>,
) -> Result<Item, ConfigError> {
    match (lhs, rhs) {
        (Item::Value(Value::Integer(a)), Item::Value(Value::Integer(b))) => Ok(integer(f(*a, *b)?)),
        _ => Err(invalid_operands(operation, lhs, rhs, location)),
    }
}

fn negate_or_complement(kind: TokenKind, item: Item, location: Location) -> Result<Item, ConfigError> {
    let invalid = |operation, item: &Item| ConfigError::InvalidOperand {
        operation,
        operand: item.describe(),
        location,
    };
    let value = match (kind, Number::of(&item)) {
        (TokenKind::Minus, Some(Number::Integer(i))) => Value::Integer(i.checked_neg().ok_or(
            ConfigError::Overflow {
                operation: "negate",
                location,
            },
        )?),
        (TokenKind::Minus, Some(Number::Float(f))) => Value::Float(-f),
        (TokenKind::Minus, Some(Number::Complex(c))) => Value::Complex(-c),
        (TokenKind::Minus, None) => return Err(invalid("negate", &item)),
        (TokenKind::Plus, Some(_)) => return Ok(item),
        (TokenKind::Plus, None) => return Err(invalid("apply unary plus to", &item)),
        (TokenKind::BitwiseComplement, Some(Number::Integer(i))) => Value::Integer(!i),
        (TokenKind::BitwiseComplement, _) => return Err(invalid("complement", &item)),
        _ => {
            return Err(ConfigError::Unsupported {
                operation: "unary operator",
                location,
            });
        }
    };
    Ok(Item::Value(value))
}

/// Deep merge: keys present on both sides whose values are both mappings are
/// merged recursively, otherwise the right-hand value wins
pub(crate) fn merge_dicts(left: &DictWrapper, right: &DictWrapper) -> Result<DictWrapper, ConfigError> {
    let mut result = left.entries().clone();
    for (key, slot) in right.entries() {
        let merged = match result.get(key) {
            Some(existing) => match existing.resolve()?.as_dict_wrapper() {
                Some(target) => match slot.resolve()?.as_dict_wrapper() {
                    Some(source) => Slot::Ready(Item::Mapping(merge_dicts(&target, &source)?)),
                    None => slot.clone(),
                },
                None => slot.clone(),
            },
            None => slot.clone(),
        };
        result.insert(key.clone(), merged);
    }
    Ok(DictWrapper::from_slots(result))
}

/// Keys of `left` which do not appear in `right`
fn subtract_dicts(left: &DictWrapper, right: &DictWrapper) -> DictWrapper {
    DictWrapper::from_slots(
        left.entries()
            .iter()
            .filter(|(key, _)| !right.contains_key(key))
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect(),
    )
}

fn floor_div(a: i64, b: i64, location: Location) -> Result<i64, ConfigError> {
    if b == 0 {
        return Err(ConfigError::DivisionByZero { location });
    }
    let q = a.checked_div(b).ok_or(ConfigError::Overflow {
        operation: "integer divide",
        location,
    })?;
    Ok(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
}

fn floor_mod(a: i64, b: i64, location: Location) -> Result<i64, ConfigError> {
    if b == 0 {
        return Err(ConfigError::DivisionByZero { location });
    }
    let r = a.checked_rem(b).unwrap_or(0);
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn shift(a: i64, b: i64, left: bool, location: Location) -> Result<i64, ConfigError> {
    let operation = if left { "left shift" } else { "right shift" };
    let Ok(amount) = u32::try_from(b) else {
        return Err(ConfigError::Overflow { operation, location });
    };
    if left {
        let result = a.checked_shl(amount).ok_or(ConfigError::Overflow { operation, location })?;
        if result >> amount != a {
            return Err(ConfigError::Overflow { operation, location });
        }
        Ok(result)
    } else {
        Ok(a >> amount.min(63))
    }
}

fn power(lhs: Number, rhs: Number, location: Location) -> Result<Item, ConfigError> {
    match (lhs, rhs) {
        (Number::Integer(a), Number::Integer(b)) if b < 0 => {
            Ok(Item::Value(Value::Float((a as f64).powf(b as f64))))
        }
        (Number::Integer(a), Number::Integer(b)) => {
            let overflow = ConfigError::Overflow {
                operation: "power",
                location,
            };
            let exponent = u32::try_from(b).map_err(|_| ConfigError::Overflow {
                operation: "power",
                location,
            })?;
            Ok(integer(a.checked_pow(exponent).ok_or(overflow)?))
        }
        (Number::Complex(_), _) | (_, Number::Complex(_)) => Ok(Item::Value(Value::Complex(
            lhs.as_complex().powc(rhs.as_complex()),
        ))),
        _ => Ok(Item::Value(Value::Float(lhs.as_float().powf(rhs.as_float())))),
    }
}

/// Equality with numeric promotion, so that `1 == 1.0`
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(_) | Value::Float(_) | Value::Complex(_), Value::Integer(_) | Value::Float(_) | Value::Complex(_)) => {
            a.as_complex() == b.as_complex()
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Mapping(x), Value::Mapping(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(container: &Item, needle: &Item, location: Location) -> Result<bool, ConfigError> {
    match (container, needle) {
        (Item::Value(Value::String(haystack)), Item::Value(Value::String(s))) => {
            Ok(haystack.contains(s.as_str()))
        }
        (Item::Mapping(dict), Item::Value(Value::String(key))) => Ok(dict.contains_key(key)),
        (Item::Config(config), Item::Value(Value::String(key))) => Ok(config.contains_key(key)),
        (Item::List(list), _) => {
            let needle = needle.unwrap()?;
            for i in 0..list.len() {
                if values_equal(&list.get(i)?.unwrap()?, &needle) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(invalid_operands("test membership of", needle, container, location)),
    }
}

fn apply_binary(kind: TokenKind, lhs: Item, rhs: Item, location: Location) -> Result<Item, ConfigError> {
    let numbers = Number::of(&lhs).zip(Number::of(&rhs));
    match kind {
        TokenKind::Plus => {
            if let (Some(l), Some(r)) = (lhs.as_dict_wrapper(), rhs.as_dict_wrapper()) {
                return Ok(Item::Mapping(merge_dicts(&l, &r)?));
            }
            match (&lhs, &rhs) {
                (Item::List(l), Item::List(r)) => {
                    let mut slots = l.slots();
                    slots.extend(r.slots());
                    Ok(Item::List(ListWrapper::from_slots(slots)))
                }
                (Item::Value(Value::String(l)), Item::Value(Value::String(r))) => {
                    Ok(Item::Value(Value::String(format!("{}{}", l, r))))
                }
                _ => match numbers {
                    Some((l, r)) => arithmetic("add", l, r, location, i64::checked_add, |a, b| a + b, |a, b| a + b),
                    None => Err(invalid_operands("add", &lhs, &rhs, location)),
                },
            }
        }
        TokenKind::Minus => {
            if let (Some(l), Some(r)) = (lhs.as_dict_wrapper(), rhs.as_dict_wrapper()) {
                return Ok(Item::Mapping(subtract_dicts(&l, &r)));
            }
            if let (Item::List(_), Item::List(_)) = (&lhs, &rhs) {
                return Err(ConfigError::Unsupported {
                    operation: "list subtraction",
                    location,
                });
            }
            match numbers {
                Some((l, r)) => arithmetic("subtract", l, r, location, i64::checked_sub, |a, b| a - b, |a, b| a - b),
                None => Err(invalid_operands("subtract", &lhs, &rhs, location)),
            }
        }
        TokenKind::Star => match numbers {
            Some((l, r)) => arithmetic("multiply", l, r, location, i64::checked_mul, |a, b| a * b, |a, b| a * b),
            None => Err(invalid_operands("multiply", &lhs, &rhs, location)),
        },
        TokenKind::Slash => match numbers {
            Some((_, r)) if r.is_zero() => Err(ConfigError::DivisionByZero { location }),
            Some((l @ Number::Complex(_), r)) | Some((l, r @ Number::Complex(_))) => {
                Ok(Item::Value(Value::Complex(l.as_complex() / r.as_complex())))
            }
            Some((l, r)) => Ok(Item::Value(Value::Float(l.as_float() / r.as_float()))),
            None => Err(invalid_operands("divide", &lhs, &rhs, location)),
        },
        TokenKind::SlashSlash => {
            integer_only("integer divide", &lhs, &rhs, location, |a, b| floor_div(a, b, location))
        }
        TokenKind::Modulo => integer_only("modulo", &lhs, &rhs, location, |a, b| floor_mod(a, b, location)),
        TokenKind::LeftShift => {
            integer_only("left shift", &lhs, &rhs, location, |a, b| shift(a, b, true, location))
        }
        TokenKind::RightShift => {
            integer_only("right shift", &lhs, &rhs, location, |a, b| shift(a, b, false, location))
        }
        TokenKind::BitwiseAnd => integer_only("bitwise-and", &lhs, &rhs, location, |a, b| Ok(a & b)),
        TokenKind::BitwiseXor => integer_only("bitwise-xor", &lhs, &rhs, location, |a, b| Ok(a ^ b)),
        TokenKind::BitwiseOr => {
            if let (Some(l), Some(r)) = (lhs.as_dict_wrapper(), rhs.as_dict_wrapper()) {
                return Ok(Item::Mapping(merge_dicts(&l, &r)?));
            }
            integer_only("bitwise-or", &lhs, &rhs, location, |a, b| Ok(a | b))
        }
        TokenKind::Power => match numbers {
            Some((l, r)) => power(l, r, location),
            None => Err(invalid_operands("raise", &lhs, &rhs, location)),
        },
        TokenKind::Equal | TokenKind::Unequal | TokenKind::AltUnequal => {
            let equal = values_equal(&lhs.unwrap()?, &rhs.unwrap()?);
            Ok(boolean(equal == (kind == TokenKind::Equal)))
        }
        TokenKind::Is | TokenKind::IsNot => {
            let identical = lhs.unwrap()? == rhs.unwrap()?;
            Ok(boolean(identical == (kind == TokenKind::Is)))
        }
        TokenKind::In | TokenKind::NotIn => {
            let found = contains(&rhs, &lhs, location)?;
            Ok(boolean(found == (kind == TokenKind::In)))
        }
        TokenKind::LessThan
        | TokenKind::LessThanOrEqual
        | TokenKind::GreaterThan
        | TokenKind::GreaterThanOrEqual => {
            let order = ordering(&lhs.unwrap()?, &rhs.unwrap()?)
                .ok_or_else(|| invalid_operands("compare", &lhs, &rhs, location))?;
            let result = match kind {
                TokenKind::LessThan => order == Ordering::Less,
                TokenKind::LessThanOrEqual => order != Ordering::Greater,
                TokenKind::GreaterThan => order == Ordering::Greater,
                _ => order != Ordering::Less,
            };
            Ok(boolean(result))
        }
        _ => Err(ConfigError::Unsupported {
            operation: "binary operator",
            location,
        }),
    }
}
