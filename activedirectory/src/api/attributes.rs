//! Attribute codec
//!
//! LDAP carries every attribute as an ordered list of values. The
//! reconciliation layer works with one value per attribute, so decoding keeps
//! the first value only and encoding wraps each value in a one-element list.
//! Attribute names are case-insensitive in LDAP and are stored lowercased.

use std::collections::BTreeMap;

/// Attribute name to every value, as exchanged with the directory
pub type MultiValued = BTreeMap<String, Vec<String>>;

/// Attribute name to a single value, names lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    values: BTreeMap<String, String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under the lowercased `name`, replacing any earlier value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.values.insert(name.as_ref().to_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Like `get`, but absent attributes read as the empty string.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: &Attributes) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attributes = Attributes::new();
        for (name, value) in iter {
            attributes.insert(name, value);
        }
        attributes
    }
}

/// The LDAP representation: every value wrapped in a one-element list.
pub fn encode(attributes: &Attributes) -> MultiValued {
    attributes
        .iter()
        .map(|(name, value)| (name.to_string(), vec![value.to_string()]))
        .collect()
}

/// Collapses each value list to its first element, or `""` when empty.
pub fn decode(attributes: &MultiValued) -> Attributes {
    attributes
        .iter()
        .map(|(name, values)| (name.as_str(), first_value(values)))
        .collect()
}

pub fn first_value(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or("")
}
