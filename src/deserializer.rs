//! Serde deserializer for evaluated configuration values
//!
//! This module provides the serde integration, allowing a [`Config`] (or any
//! [`Value`] taken out of one) to be deserialized directly into Rust types
//! using the standard serde derive macros.
//!
//! ```rust
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Server {
//!     host: String,
//!     port: u16,
//! }
//!
//! let server: Server = cfg_config::from_str("host: 'localhost'\nport: 8000 + 80").unwrap();
//! assert_eq!(server.port, 8080);
//! ```

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, Visitor};

use crate::config::Config;
use crate::error::{CfgError, SerdeError};
use crate::value::Value;

/// Deserializer over a single evaluated [`Value`]
pub struct ValueDeserializer {
    value: Value,
}

impl ValueDeserializer {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    fn mismatch(expected: &str, value: &Value) -> CfgError {
        CfgError::Serde(SerdeError::TypeMismatch {
            expected: expected.to_string(),
            found: value.type_name().to_string(),
        })
    }
}

impl<'de> IntoDeserializer<'de, CfgError> for Value {
    type Deserializer = ValueDeserializer;

    fn into_deserializer(self) -> Self::Deserializer {
        ValueDeserializer::new(self)
    }
}

impl<'de> de::Deserializer<'de> for ValueDeserializer {
    type Error = CfgError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Integer(i) => visitor.visit_i64(i),
            Value::Float(f) => visitor.visit_f64(f),
            Value::Complex(c) => visitor.visit_seq(SeqAccess::new(vec![
                Value::Float(c.re),
                Value::Float(c.im),
            ])),
            Value::String(s) => visitor.visit_string(s),
            date @ (Value::Date(_) | Value::DateTime(_)) => visitor.visit_string(date.to_string()),
            Value::List(items) => visitor.visit_seq(SeqAccess::new(items)),
            Value::Mapping(map) => visitor.visit_map(MapAccess::new(map)),
            // Included configurations are evaluated in full
            Value::Config(config) => visitor.visit_map(MapAccess::new(config.as_dict()?)),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Bool(b) => visitor.visit_bool(b),
            other => Err(Self::mismatch("boolean", &other)),
        }
    }

    fn deserialize_i64<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Integer(i) => visitor.visit_i64(i),
            other => Err(Self::mismatch("integer", &other)),
        }
    }

    fn deserialize_u64<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Integer(i) if i >= 0 => visitor.visit_u64(i as u64),
            other => Err(Self::mismatch("unsigned integer", &other)),
        }
    }

    fn deserialize_f64<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Float(f) => visitor.visit_f64(f),
            Value::Integer(i) => visitor.visit_f64(i as f64),
            other => Err(Self::mismatch("float", &other)),
        }
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => visitor.visit_char(c),
                    _ => Err(CfgError::Serde(SerdeError::TypeMismatch {
                        expected: "single character".to_string(),
                        found: format!("string of length {}", s.chars().count()),
                    })),
                }
            }
            other => Err(Self::mismatch("character", &other)),
        }
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::String(s) => visitor.visit_string(s),
            date @ (Value::Date(_) | Value::DateTime(_)) => visitor.visit_string(date.to_string()),
            other => Err(Self::mismatch("string", &other)),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Null => visitor.visit_unit(),
            other => Err(Self::mismatch("null", &other)),
        }
    }

    fn deserialize_unit_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::List(items) => visitor.visit_seq(SeqAccess::new(items)),
            Value::Complex(c) => visitor.visit_seq(SeqAccess::new(vec![
                Value::Float(c.re),
                Value::Float(c.im),
            ])),
            other => Err(Self::mismatch("list", &other)),
        }
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Mapping(map) => visitor.visit_map(MapAccess::new(map)),
            Value::Config(config) => visitor.visit_map(MapAccess::new(config.as_dict()?)),
            other => Err(Self::mismatch("mapping", &other)),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            // Unit variant
            Value::String(variant) => visitor.visit_enum(EnumAccess {
                variant,
                value: None,
            }),
            // Data variant: a mapping with a single key
            Value::Mapping(mut map) if map.len() == 1 => match map.pop() {
                Some((variant, value)) => visitor.visit_enum(EnumAccess {
                    variant,
                    value: Some(value),
                }),
                None => Err(CfgError::Serde(SerdeError::Custom(
                    "Empty enum mapping".to_string(),
                ))),
            },
            Value::Mapping(map) => Err(CfgError::Serde(SerdeError::TypeMismatch {
                expected: "enum (string or single-key mapping)".to_string(),
                found: format!("mapping with {} keys", map.len()),
            })),
            other => Err(Self::mismatch("enum (string or mapping)", &other)),
        }
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        i128 u128 bytes byte_buf
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_f64(visitor)
    }
}

struct SeqAccess {
    items: std::vec::IntoIter<Value>,
}

impl SeqAccess {
    fn new(items: Vec<Value>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

impl<'de> de::SeqAccess<'de> for SeqAccess {
    type Error = CfgError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.items.next() {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct MapAccess {
    entries: indexmap::map::IntoIter<String, Value>,
    current_value: Option<Value>,
}

impl MapAccess {
    fn new(map: IndexMap<String, Value>) -> Self {
        Self {
            entries: map.into_iter(),
            current_value: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for MapAccess {
    type Error = CfgError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.entries.next() {
            Some((key, value)) => {
                self.current_value = Some(value);
                seed.deserialize(ValueDeserializer::new(Value::String(key)))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        match self.current_value.take() {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)),
            None => Err(CfgError::Serde(SerdeError::Custom(
                "No value available for map entry".to_string(),
            ))),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct EnumAccess {
    variant: String,
    value: Option<Value>,
}

impl<'de> de::EnumAccess<'de> for EnumAccess {
    type Error = CfgError;
    type Variant = VariantAccess;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self::Variant), Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        let variant = seed.deserialize(ValueDeserializer::new(Value::String(self.variant)))?;
        Ok((variant, VariantAccess { value: self.value }))
    }
}

struct VariantAccess {
    value: Option<Value>,
}

impl<'de> de::VariantAccess<'de> for VariantAccess {
    type Error = CfgError;

    fn unit_variant(self) -> Result<(), Self::Error> {
        match self.value {
            None | Some(Value::Null) => Ok(()),
            Some(_) => Err(CfgError::Serde(SerdeError::Custom(
                "Expected unit variant, found data".to_string(),
            ))),
        }
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.value {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)),
            None => Err(CfgError::Serde(SerdeError::Custom(
                "Expected newtype variant data, found unit".to_string(),
            ))),
        }
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Some(Value::List(items)) => visitor.visit_seq(SeqAccess::new(items)),
            Some(value) => visitor.visit_seq(SeqAccess::new(vec![value])),
            None => Err(CfgError::Serde(SerdeError::Custom(
                "Expected tuple variant data, found unit".to_string(),
            ))),
        }
    }

    fn struct_variant<V>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Some(Value::Mapping(map)) => visitor.visit_map(MapAccess::new(map)),
            Some(Value::Config(config)) => visitor.visit_map(MapAccess::new(config.as_dict()?)),
            Some(_) => Err(CfgError::Serde(SerdeError::Custom(
                "Expected struct variant data (mapping), found other type".to_string(),
            ))),
            None => Err(CfgError::Serde(SerdeError::Custom(
                "Expected struct variant data, found unit".to_string(),
            ))),
        }
    }
}

/// Deserializes an evaluated value into a Rust type
pub fn from_value<T>(value: Value) -> Result<T, CfgError>
where
    T: DeserializeOwned,
{
    T::deserialize(ValueDeserializer::new(value))
}

/// Deserializes a whole configuration, evaluating every key
pub fn from_config<T>(config: &Config) -> Result<T, CfgError>
where
    T: DeserializeOwned,
{
    from_value(Value::Mapping(config.as_dict()?))
}

/// Loads CFG source with default settings and deserializes it
pub fn from_str<T>(source: &str) -> Result<T, CfgError>
where
    T: DeserializeOwned,
{
    from_config(&Config::from_source(source)?)
}
