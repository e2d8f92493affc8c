//! Response body decoding.
//!
//! Decoding is a strategy object the session holds, not something responses
//! know how to do themselves. A [`ResponseDecoder`] turns raw bytes into a
//! `serde_json::Value`; [`decode_with`] then deserializes that value into the
//! caller's type. Date handling belongs to the caller's types (serde field
//! attributes), so decoders only deal with structure and key naming.

use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// How object keys in a payload map onto Rust field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Keys are used as they appear in the payload.
    #[default]
    UseDefault,
    /// `camelCase` / `PascalCase` keys are rewritten to `snake_case` at every depth.
    ConvertFromCamelCase,
}

pub trait ResponseDecoder: Send + Sync {
    fn decode_value(&self, body: &[u8]) -> Result<Value>;

    fn name(&self) -> &'static str;
}

/// JSON decoder with an optional key strategy.
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    key_strategy: KeyStrategy,
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }
}

impl ResponseDecoder for JsonDecoder {
    fn decode_value(&self, body: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            Error::decode_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_details(format!("line {}, column {}", e.line(), e.column()))
                    .with_source("json_decoder"),
            )
        })?;
        Ok(match self.key_strategy {
            KeyStrategy::UseDefault => value,
            KeyStrategy::ConvertFromCamelCase => rewrite_keys(value),
        })
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Decode `body` with `decoder` into `T`.
pub fn decode_with<T: DeserializeOwned>(decoder: &dyn ResponseDecoder, body: &[u8]) -> Result<T> {
    let value = decoder.decode_value(body)?;
    serde_json::from_value(value).map_err(|e| {
        Error::decode_with_context(
            e.to_string(),
            ErrorContext::new()
                .with_details(format!("target type {}", std::any::type_name::<T>()))
                .with_source(decoder.name()),
        )
    })
}

fn rewrite_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(snake_case(&k), rewrite_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(rewrite_keys).collect()),
        other => other,
    }
}

pub(crate) fn snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
                let boundary = prev.is_ascii_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_ascii_uppercase() && next_is_lower);
                if boundary && !out.ends_with('_') {
                    out.push('_');
                }
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
