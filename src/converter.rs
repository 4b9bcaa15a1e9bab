//! Conversion of backtick strings into values
//!
//! A backtick string such as `` `$HOME|/tmp` `` is handed to the
//! configuration's [`StringConverter`]. The [`DefaultStringConverter`] tries,
//! in order: an ISO-8601 date or date-time, an environment variable with an
//! optional default, an object reference resolved through the configuration's
//! [`ObjectResolver`], and finally `${path}` interpolation against the
//! configuration itself.

use std::fmt;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Captures, Regex};

use crate::config::Config;
use crate::value::Value;

lazy_static! {
    pub(crate) static ref IDENTIFIER_PATTERN: Regex = Regex::new(r"^[\pL_]\w*$").unwrap();
    static ref ISO_DATETIME_PATTERN: Regex = Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(([ T])(((\d{2}):(\d{2}):(\d{2}))(\.\d{1,6})?(([+-])(\d{2}):(\d{2})(:(\d{2})(\.\d{1,6})?)?)?))?$"
    )
    .unwrap();
    static ref ENV_VALUE_PATTERN: Regex = Regex::new(r"^\$(\w+)(\|(.*))?$").unwrap();
    static ref OBJECT_REFERENCE_PATTERN: Regex =
        Regex::new(r"^([\pL_][\w/]*(?:::[\pL_]\w*)*)\.([\pL_]\w*(?:\.[\pL_]\w*)*)$").unwrap();
    static ref INTERPOLATION_PATTERN: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// Turns the text of a backtick string into a value
///
/// Returning `None` means no rule applied. Under strict conversions the
/// configuration then reports an error; otherwise the text is kept as a string.
pub trait StringConverter {
    fn convert(&self, text: &str, config: &Config) -> Option<Value>;
}

impl<F> StringConverter for F
where
    F: Fn(&str, &Config) -> Option<Value>,
{
    fn convert(&self, text: &str, config: &Config) -> Option<Value> {
        self(text, config)
    }
}

/// A `Namespace::Class.member.member` style reference to a host object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    /// Everything before the first `.`, e.g. `Package/Module::Class`
    pub namespace: String,
    /// The dotted member chain after the namespace
    pub members: Vec<String>,
}

impl ObjectReference {
    /// Parses a reference, returning `None` if the text does not have the right shape
    pub fn parse(text: &str) -> Option<Self> {
        let caps = OBJECT_REFERENCE_PATTERN.captures(text)?;
        Some(Self {
            namespace: caps[1].to_string(),
            members: caps[2].split('.').map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.members.join("."))
    }
}

/// Resolves object references to values
pub trait ObjectResolver {
    fn resolve(&self, reference: &ObjectReference) -> Option<Value>;
}

impl<F> ObjectResolver for F
where
    F: Fn(&ObjectReference) -> Option<Value>,
{
    fn resolve(&self, reference: &ObjectReference) -> Option<Value> {
        self(reference)
    }
}

/// Resolver which knows no objects
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObjectResolver;

impl ObjectResolver for NullObjectResolver {
    fn resolve(&self, _reference: &ObjectReference) -> Option<Value> {
        None
    }
}

/// Resolver backed by a map from reference text to value
#[derive(Debug, Default, Clone)]
pub struct MapObjectResolver {
    objects: IndexMap<String, Value>,
}

impl MapObjectResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under a reference such as `Time.now`
    pub fn insert(&mut self, reference: impl Into<String>, value: impl Into<Value>) {
        self.objects.insert(reference.into(), value.into());
    }

    pub fn with(mut self, reference: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(reference, value);
        self
    }
}

impl ObjectResolver for MapObjectResolver {
    fn resolve(&self, reference: &ObjectReference) -> Option<Value> {
        self.objects.get(&reference.to_string()).cloned()
    }
}

/// The built-in date, environment, object and interpolation converter
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStringConverter;

impl StringConverter for DefaultStringConverter {
    fn convert(&self, text: &str, config: &Config) -> Option<Value> {
        if let Some(caps) = ISO_DATETIME_PATTERN.captures(text) {
            return parse_datetime(&caps);
        }
        if let Some(caps) = ENV_VALUE_PATTERN.captures(text) {
            let name = &caps[1];
            return Some(match config.variable_handler().resolve_variable(name) {
                Some(value) => Value::String(value),
                None => match caps.get(3) {
                    Some(default) => Value::from(default.as_str()),
                    None => Value::Null,
                },
            });
        }
        if let Some(reference) = ObjectReference::parse(text) {
            let result = config.object_resolver().resolve(&reference);
            if result.is_none() {
                debug!(reference:% = reference; "unresolved object reference");
            }
            return result;
        }
        if INTERPOLATION_PATTERN.is_match(text) {
            return interpolate(text, config);
        }
        None
    }
}

fn number<T: std::str::FromStr>(caps: &Captures, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

fn fraction_nanos(caps: &Captures, i: usize) -> Option<u32> {
    match caps.get(i) {
        None => Some(0),
        Some(m) => {
            let fraction: f64 = m.as_str().parse().ok()?;
            Some((fraction * 1.0e9).round() as u32)
        }
    }
}

fn parse_datetime(caps: &Captures) -> Option<Value> {
    let date = NaiveDate::from_ymd_opt(number(caps, 1)?, number(caps, 2)?, number(caps, 3)?)?;
    if caps.get(5).is_none() {
        return Some(Value::Date(date));
    }
    let time = NaiveTime::from_hms_nano_opt(
        number(caps, 8)?,
        number(caps, 9)?,
        number(caps, 10)?,
        fraction_nanos(caps, 11)?,
    )?;
    let offset_seconds = match caps.get(13) {
        None => 0,
        Some(sign) => {
            let hours: i32 = number(caps, 14)?;
            let minutes: i32 = number(caps, 15)?;
            let seconds: i32 = number(caps, 17).unwrap_or(0);
            let magnitude = hours * 3600 + minutes * 60 + seconds;
            if sign.as_str() == "-" { -magnitude } else { magnitude }
        }
    };
    let offset = FixedOffset::east_opt(offset_seconds)?;
    let datetime = offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()?;
    Some(Value::DateTime(datetime))
}

/// Replaces every `${path}` in `text` with the value found at that path
///
/// Returns `None` if any segment fails to resolve.
fn interpolate(text: &str, config: &Config) -> Option<Value> {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for caps in INTERPOLATION_PATTERN.captures_iter(text) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        result.push_str(&text[last..whole.start()]);
        match config.get(path.as_str()) {
            Ok(value) => result.push_str(&value.to_string()),
            Err(e) => {
                warn!(path = path.as_str(), error:% = e; "interpolation failed");
                return None;
            }
        }
        last = whole.end();
    }
    result.push_str(&text[last..]);
    Some(Value::String(result))
}
