// src/packages/keyblock.rs

//! Parser and serializer for `%KEY%` blocks
//!
//! ```text
//! %NAME%
//! bash
//!
//! %LICENSE%
//! GPL-3.0-or-later
//! custom
//! ```
//!
//! A key line is wrapped in `%` markers and followed by one value per line
//! until the next key line. Blank lines only separate blocks.

use super::schema::{self, Arity, Scope, ValueKind};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Raw key/value storage of a descriptor, checked against the schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBlock {
    values: BTreeMap<String, Vec<String>>,
}

fn header_key(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('%')?.strip_suffix('%')?;
    if !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        Some(inner)
    } else {
        None
    }
}

impl KeyBlock {
    /// Split text into key blocks and validate them for the given variant
    pub fn parse(content: &str, variant: Scope) -> Result<Self> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            if line.is_empty() {
                continue;
            }

            if let Some(key) = header_key(line) {
                values.entry(key.to_string()).or_default();
                current = Some(key.to_string());
                continue;
            }

            match &current {
                Some(key) => values.entry(key.clone()).or_default().push(line.to_string()),
                None => debug!("Ignoring value outside of any key: {}", line),
            }
        }

        let block = Self { values };
        block.validate(variant)?;
        Ok(block)
    }

    fn validate(&self, variant: Scope) -> Result<()> {
        for (key, values) in &self.values {
            let Some(spec) = schema::lookup(key) else {
                debug!("Keeping unknown descriptor key %{}%", key);
                continue;
            };

            if !spec.scope.allows(variant) {
                return Err(Error::Validation(format!(
                    "%{}% is not allowed in a {} descriptor",
                    key,
                    match variant {
                        Scope::Local => "local",
                        _ => "sync",
                    }
                )));
            }

            if spec.arity == Arity::Single && values.len() > 1 {
                return Err(Error::Validation(format!(
                    "%{}% takes a single value, found {}",
                    key,
                    values.len()
                )));
            }

            if spec.kind == ValueKind::Integer {
                for value in values {
                    value.parse::<i64>().map_err(|_| {
                        Error::Validation(format!("%{}% is not a number: '{}'", key, value))
                    })?;
                }
            }
        }

        for spec in schema::FIELDS.iter().filter(|spec| spec.required) {
            match self.first(spec.key) {
                Some(value) if !value.trim().is_empty() => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "required field %{}% is missing or empty",
                        spec.key
                    )));
                }
            }
        }

        Ok(())
    }

    /// All values of a key
    pub fn get(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a key
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// First value of an integer key; validated at parse time
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.first(key).and_then(|v| v.parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: &str, values: Vec<String>) {
        self.values.insert(key.to_string(), values);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Write the blocks back in schema order, unknown keys last
    pub fn serialize(&self) -> String {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort_by_key(|key| (schema::position(key), key.as_str()));

        let mut out = String::new();
        for key in keys {
            out.push('%');
            out.push_str(key);
            out.push_str("%\n");
            for value in &self.values[key] {
                out.push_str(value);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}
