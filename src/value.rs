//! Evaluated values and the lazy wrappers around unevaluated containers
//!
//! [`Value`] is the plain result domain handed out by [`Config::get`].
//! [`Item`] is the lazy domain used during evaluation: mappings and lists
//! stay as [`DictWrapper`] and [`ListWrapper`] until something looks inside
//! them.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use num_complex::Complex64;
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::config::{Config, ConfigInner};
use crate::error::{ConfigError, Location};
use crate::lexer::{Token, TokenValue};
use crate::parser::Node;

/// Containers nested deeper than this cannot be unwrapped
pub const MAX_UNWRAP_DEPTH: usize = 256;

/// A fully evaluated configuration value
///
/// `Null` is a value in its own right. A key which is absent is reported as
/// [`ConfigError::NotFound`], never as `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Complex(Complex64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    List(Vec<Value>),
    Mapping(IndexMap<String, Value>),
    /// A configuration produced by including a mapping file
    Config(Config),
}

impl Value {
    /// Returns a short name for the type of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Mapping(_) => "mapping",
            Value::Config(_) => "configuration",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float, promoting integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the value as a complex number, promoting integers and floats
    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            Value::Integer(i) => Some(Complex64::new(*i as f64, 0.0)),
            Value::Float(f) => Some(Complex64::new(*f, 0.0)),
            Value::Complex(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Config> {
        match self {
            Value::Config(config) => Some(config),
            _ => None,
        }
    }

    /// Returns the truth value used by `not`, `and` and `or`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Complex(c) => c.re != 0.0 || c.im != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
            Value::Date(_) | Value::DateTime(_) | Value::Config(_) => true,
        }
    }

    /// Converts nested configurations into plain mappings
    pub fn into_plain(self) -> Result<Value, ConfigError> {
        match self {
            Value::Config(config) => Ok(Value::Mapping(config.as_dict()?)),
            Value::List(items) => Ok(Value::List(
                items
                    .into_iter()
                    .map(Value::into_plain)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Mapping(map) => Ok(Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| Ok((k, v.into_plain()?)))
                    .collect::<Result<_, ConfigError>>()?,
            )),
            other => Ok(other),
        }
    }
}

/// Formats a float the way the configuration language prints it: integral
/// values keep a `.0` suffix and very large or very small magnitudes use a
/// two-digit signed exponent (`1.0e-07`).
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = f.abs();
    if f != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", f);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{}.0", mantissa)
        };
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }
    let formatted = format!("{}", f);
    if formatted.contains('.') {
        formatted
    } else {
        format!("{}.0", formatted)
    }
}

fn format_component(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e16 {
        format!("{}", f as i64)
    } else {
        format_float(f)
    }
}

/// Formats a complex number as `(re+imj)`, or `imj` when the real part is zero
pub fn format_complex(c: Complex64) -> String {
    if c.re == 0.0 && c.re.is_sign_positive() {
        return format!("{}j", format_component(c.im));
    }
    let sign = if c.im < 0.0 || (c.im == 0.0 && c.im.is_sign_negative()) {
        '-'
    } else {
        '+'
    };
    format!(
        "({}{}{}j)",
        format_component(c.re),
        sign,
        format_component(c.im.abs())
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::Complex(c) => f.write_str(&format_complex(*c)),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Mapping(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Config(config) => write!(f, "{}", config),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Complex(c) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&c.re)?;
                seq.serialize_element(&c.im)?;
                seq.end()
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(_) | Value::DateTime(_) => serializer.collect_str(self),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Config(config) => {
                let map = config
                    .as_dict()
                    .map_err(|e| <S::Error as ser::Error>::custom(e))?;
                Value::Mapping(map).serialize(serializer)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Complex64> for Value {
    fn from(value: Complex64) -> Self {
        Value::Complex(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(value: IndexMap<String, Value>) -> Self {
        Value::Mapping(value)
    }
}

impl From<Config> for Value {
    fn from(value: Config) -> Self {
        Value::Config(value)
    }
}

impl From<&TokenValue> for Value {
    fn from(value: &TokenValue) -> Self {
        match value {
            TokenValue::Null => Value::Null,
            TokenValue::Bool(b) => Value::Bool(*b),
            TokenValue::Integer(i) => Value::Integer(*i),
            TokenValue::Float(f) => Value::Float(*f),
            TokenValue::Complex(c) => Value::Complex(*c),
            TokenValue::String(s) | TokenValue::Identifier(s) => Value::String(s.clone()),
        }
    }
}

/// A partially evaluated value
///
/// Scalars are held as `Item::Value`; containers stay lazy.
#[derive(Debug, Clone)]
pub enum Item {
    Value(Value),
    List(ListWrapper),
    Mapping(DictWrapper),
    Config(Config),
}

impl Item {
    /// Returns the scalar value, if this item holds one
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Item::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the mapping view of this item, for mappings and configurations
    pub fn as_dict_wrapper(&self) -> Option<DictWrapper> {
        match self {
            Item::Mapping(dict) => Some(dict.clone()),
            Item::Config(config) => config.data().ok(),
            _ => None,
        }
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Item::Value(Value::String(s)) => format!("{:?}", s),
            Item::Value(v) => v.to_string(),
            Item::List(list) => format!("a list of {} elements", list.len()),
            Item::Mapping(dict) => format!("a mapping with {} keys", dict.len()),
            Item::Config(config) => config.to_string(),
        }
    }

    /// Returns the truth value used by `not`, `and` and `or`
    pub fn is_truthy(&self) -> bool {
        match self {
            Item::Value(v) => v.is_truthy(),
            Item::List(list) => !list.is_empty(),
            Item::Mapping(dict) => !dict.is_empty(),
            Item::Config(_) => true,
        }
    }

    /// Fully evaluates this item, leaving included configurations in place
    pub fn unwrap(&self) -> Result<Value, ConfigError> {
        self.unwrap_at(false, 0)
    }

    /// Fully evaluates this item, converting included configurations too
    pub fn unwrap_all(&self) -> Result<Value, ConfigError> {
        self.unwrap_at(true, 0)
    }

    fn unwrap_at(&self, configs: bool, depth: usize) -> Result<Value, ConfigError> {
        if depth > MAX_UNWRAP_DEPTH {
            return Err(ConfigError::RecursionLimit {
                limit: MAX_UNWRAP_DEPTH,
            });
        }
        match self {
            Item::Value(v) => Ok(v.clone()),
            Item::List(list) => {
                let mut result = Vec::with_capacity(list.len());
                for i in 0..list.len() {
                    result.push(list.get(i)?.unwrap_at(configs, depth + 1)?);
                }
                Ok(Value::List(result))
            }
            Item::Mapping(dict) => {
                let mut result = IndexMap::with_capacity(dict.len());
                for (key, slot) in dict.entries() {
                    let item = slot.resolve()?;
                    result.insert(key.clone(), item.unwrap_at(configs, depth + 1)?);
                }
                Ok(Value::Mapping(result))
            }
            Item::Config(config) if configs => Item::Mapping(config.data()?).unwrap_at(configs, depth + 1),
            Item::Config(config) => Ok(Value::Config(config.clone())),
        }
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        match value {
            Value::List(items) => Item::List(ListWrapper::from_items(
                items.into_iter().map(Item::from).collect(),
            )),
            Value::Mapping(map) => Item::Mapping(DictWrapper::from_items(
                map.into_iter().map(|(k, v)| (k, Item::from(v))).collect(),
            )),
            Value::Config(config) => Item::Config(config),
            other => Item::Value(other),
        }
    }
}

/// One element of a lazy container
#[derive(Debug, Clone)]
pub enum Slot {
    /// Not yet evaluated; `owner` is the configuration the node belongs to
    Pending {
        node: Rc<Node>,
        owner: Weak<ConfigInner>,
    },
    Ready(Item),
}

impl Slot {
    pub(crate) fn pending(node: &Rc<Node>, owner: &Config) -> Self {
        Slot::Pending {
            node: Rc::clone(node),
            owner: owner.downgrade(),
        }
    }

    /// Evaluates the slot against its owning configuration
    pub fn resolve(&self) -> Result<Item, ConfigError> {
        match self {
            Slot::Ready(item) => Ok(item.clone()),
            Slot::Pending { node, owner } => Config::upgrade(owner)?.evaluate(node),
        }
    }

    /// Returns the unevaluated node, if any
    pub fn node(&self) -> Option<&Rc<Node>> {
        match self {
            Slot::Pending { node, .. } => Some(node),
            Slot::Ready(_) => None,
        }
    }
}

/// Returns the key text of a mapping key token
pub(crate) fn key_text(token: &Token) -> String {
    token
        .string_value()
        .or_else(|| token.identifier())
        .unwrap_or(&token.text)
        .to_string()
}

/// A lazily evaluated mapping
///
/// Lookups are not memoized: every access evaluates the stored node again
/// through the owning configuration.
#[derive(Debug, Clone, Default)]
pub struct DictWrapper {
    entries: Rc<IndexMap<String, Slot>>,
}

impl DictWrapper {
    /// Wraps the entries of a mapping node without evaluating them
    pub(crate) fn wrap(
        owner: &Config,
        elements: &[(Token, Rc<Node>)],
        no_duplicates: bool,
    ) -> Result<Self, ConfigError> {
        let mut entries: IndexMap<String, Slot> = IndexMap::with_capacity(elements.len());
        let mut seen: IndexMap<String, Location> = IndexMap::new();

        for (token, node) in elements {
            let key = key_text(token);
            if no_duplicates {
                if let Some(original) = seen.get(&key) {
                    return Err(ConfigError::DuplicateKey {
                        key,
                        location: token.start,
                        original: *original,
                    });
                }
                seen.insert(key.clone(), token.start);
            }
            entries.insert(key, Slot::pending(node, owner));
        }
        Ok(Self {
            entries: Rc::new(entries),
        })
    }

    /// Builds a mapping from already evaluated items
    pub fn from_items(items: IndexMap<String, Item>) -> Self {
        Self::from_slots(items.into_iter().map(|(k, v)| (k, Slot::Ready(v))).collect())
    }

    pub(crate) fn from_slots(entries: IndexMap<String, Slot>) -> Self {
        Self {
            entries: Rc::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub(crate) fn entries(&self) -> &IndexMap<String, Slot> {
        &self.entries
    }

    pub(crate) fn slot(&self, key: &str) -> Option<Slot> {
        self.entries.get(key).cloned()
    }

    /// Evaluates the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<Item>, ConfigError> {
        self.entries.get(key).map(Slot::resolve).transpose()
    }

    /// Produces a fully evaluated snapshot of this mapping
    pub fn as_dict(&self) -> Result<IndexMap<String, Value>, ConfigError> {
        match Item::Mapping(self.clone()).unwrap_all()? {
            Value::Mapping(map) => Ok(map),
            _ => Ok(IndexMap::new()),
        }
    }
}

/// A lazily evaluated list
///
/// Reading an element evaluates it once and stores the result back into the
/// slot, so every clone of the wrapper sees the evaluated element.
#[derive(Debug, Clone, Default)]
pub struct ListWrapper {
    items: Rc<Vec<RefCell<Slot>>>,
}

impl ListWrapper {
    /// Wraps the elements of a list node without evaluating them
    pub(crate) fn wrap(owner: &Config, elements: &[Rc<Node>]) -> Self {
        Self::from_slots(elements.iter().map(|n| Slot::pending(n, owner)).collect())
    }

    /// Builds a list from already evaluated items
    pub fn from_items(items: Vec<Item>) -> Self {
        Self::from_slots(items.into_iter().map(Slot::Ready).collect())
    }

    pub(crate) fn from_slots(slots: Vec<Slot>) -> Self {
        Self {
            items: Rc::new(slots.into_iter().map(RefCell::new).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns a copy of every slot, evaluated or not
    pub(crate) fn slots(&self) -> Vec<Slot> {
        self.items.iter().map(|s| s.borrow().clone()).collect()
    }

    /// Returns true if the element at `index` has been evaluated
    pub fn is_evaluated(&self, index: usize) -> bool {
        self.items
            .get(index)
            .is_some_and(|s| matches!(*s.borrow(), Slot::Ready(_)))
    }

    /// Evaluates the element at `index`, memoizing the result
    pub fn get(&self, index: usize) -> Result<Item, ConfigError> {
        self.resolve_with(index, |slot| slot.resolve())
    }

    /// Evaluates the element at `index` with a custom resolver, memoizing the result
    ///
    /// No borrow of the slot is held while `resolve` runs.
    pub(crate) fn resolve_with(
        &self,
        index: usize,
        resolve: impl FnOnce(&Slot) -> Result<Item, ConfigError>,
    ) -> Result<Item, ConfigError> {
        let Some(cell) = self.items.get(index) else {
            return Err(ConfigError::BadIndex {
                message: format!(
                    "index out of range: is {}, must be between 0 and {}",
                    index,
                    self.len().saturating_sub(1)
                ),
                location: Location::default(),
            });
        };
        let slot = cell.borrow().clone();
        if let Slot::Ready(item) = slot {
            return Ok(item);
        }
        let item = resolve(&slot)?;
        *cell.borrow_mut() = Slot::Ready(item.clone());
        Ok(item)
    }

    /// Returns the elements selected by `start:stop:step` as a new list
    ///
    /// Negative bounds count from the end; out-of-range bounds are clamped.
    pub fn slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
        location: Location,
    ) -> Result<ListWrapper, ConfigError> {
        let size = self.len() as i64;
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(ConfigError::BadIndex {
                message: "slice step cannot be zero".to_string(),
                location,
            });
        }
        let mut start_index = match start {
            None => 0,
            Some(i) if i < 0 => {
                if i >= -size {
                    i + size
                } else {
                    0
                }
            }
            Some(i) if i >= size => size - 1,
            Some(i) => i,
        };
        let mut stop_index = match stop {
            None => size - 1,
            Some(mut i) => {
                if i < 0 {
                    i = if i >= -size { i + size } else { 0 };
                }
                i = i.min(size);
                if step < 0 { i + 1 } else { i - 1 }
            }
        };
        if step < 0 && start_index < stop_index {
            std::mem::swap(&mut start_index, &mut stop_index);
        }

        let mut result = Vec::new();
        let mut i = start_index;
        while (step > 0 && i <= stop_index) || (step < 0 && i >= stop_index) {
            if let Some(cell) = usize::try_from(i).ok().and_then(|i| self.items.get(i)) {
                result.push(cell.borrow().clone());
            }
            i += step;
        }
        Ok(ListWrapper::from_slots(result))
    }
}
