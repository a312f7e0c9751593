//! Test helpers for the directory API

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use unicase::UniCase;

use super::attributes::MultiValued;
use super::dn::{dn_eq, parent_dn};
use super::error::{SessionError, RC_ALREADY_EXISTS, RC_NO_SUCH_OBJECT};
use super::session::{DirectorySession, Modification, RawEntry, SearchScope};

const RC_UNWILLING_TO_PERFORM: u32 = 53;

/// One request as received by `MemorySession`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Search {
        base: String,
        scope: SearchScope,
        filter: String,
        attributes: Vec<String>,
    },
    Add {
        dn: String,
        object_classes: Vec<String>,
        attributes: MultiValued,
    },
    Modify {
        dn: String,
        changes: Modification,
    },
    ModifyDn {
        dn: String,
        new_rdn: String,
        delete_old_rdn: bool,
        new_parent: Option<String>,
    },
    Delete {
        dn: String,
    },
}

impl Request {
    pub fn is_write(&self) -> bool {
        !matches!(self, Request::Search { .. })
    }
}

#[derive(Default)]
struct Inner {
    entries: Vec<RawEntry>,
    requests: Vec<Request>,
    fail_next: Option<SessionError>,
    fail_next_write: Option<SessionError>,
    range_size: Option<usize>,
}

/// In-memory directory that records every request it serves
#[derive(Default)]
pub struct MemorySession {
    inner: Mutex<Inner>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer multi-valued reads in AD ranged chunks of `size` values.
    pub fn with_range_size(self, size: usize) -> Self {
        self.inner.lock().unwrap().range_size = Some(size);
        self
    }

    pub fn insert(&self, dn: &str, object_classes: &[&str], attributes: &[(&str, &str)]) {
        let multi: Vec<(&str, Vec<String>)> = attributes
            .iter()
            .map(|(k, v)| (*k, vec![v.to_string()]))
            .collect();
        self.insert_multi(dn, object_classes, &multi);
    }

    pub fn insert_multi(
        &self,
        dn: &str,
        object_classes: &[&str],
        attributes: &[(&str, Vec<String>)],
    ) {
        let mut stored: MultiValued = BTreeMap::new();
        stored.insert(
            "objectClass".to_string(),
            object_classes.iter().map(|c| c.to_string()).collect(),
        );
        for (name, values) in attributes {
            stored.insert(name.to_string(), values.clone());
        }
        self.inner.lock().unwrap().entries.push(RawEntry {
            dn: dn.to_string(),
            attributes: stored,
        });
    }

    pub fn fail_next(&self, error: SessionError) {
        self.inner.lock().unwrap().fail_next = Some(error);
    }

    /// Like `fail_next`, but searches pass until the next write request.
    pub fn fail_next_write(&self, error: SessionError) {
        self.inner.lock().unwrap().fail_next_write = Some(error);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn writes(&self) -> Vec<Request> {
        self.requests().into_iter().filter(Request::is_write).collect()
    }

    pub fn clear_requests(&self) {
        self.inner.lock().unwrap().requests.clear();
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.entry(dn).is_some()
    }

    pub fn entry(&self, dn: &str) -> Option<RawEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| dn_eq(&e.dn, dn))
            .cloned()
    }

    pub fn values(&self, dn: &str, attribute: &str) -> Vec<String> {
        self.entry(dn)
            .and_then(|e| {
                e.attributes
                    .into_iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(attribute))
                    .map(|(_, v)| v)
            })
            .unwrap_or_default()
    }

    fn record(&self, request: Request) -> Result<std::sync::MutexGuard<'_, Inner>, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let failure = match inner.fail_next.take() {
            Some(error) => Some(error),
            None if request.is_write() => inner.fail_next_write.take(),
            None => None,
        };
        inner.requests.push(request);
        match failure {
            Some(error) => Err(error),
            None => Ok(inner),
        }
    }
}

fn no_such_object(dn: &str) -> SessionError {
    SessionError::ResultCode {
        rc: RC_NO_SUCH_OBJECT,
        text: format!("no such object: {}", dn),
    }
}

fn find_attribute<'a>(attributes: &'a mut MultiValued, name: &str) -> Option<&'a mut Vec<String>> {
    attributes
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn is_below(dn: &str, base: &str) -> bool {
    let mut current = Some(dn.to_string());
    while let Some(candidate) = current {
        if dn_eq(&candidate, base) {
            return true;
        }
        current = parent_dn(&candidate);
    }
    false
}

fn project(entry: &RawEntry, requested: &[&str], range_size: Option<usize>) -> RawEntry {
    if requested.is_empty() || requested.contains(&"*") {
        return entry.clone();
    }

    let mut attributes = MultiValued::new();
    for wanted in requested {
        let (name, low) = match wanted.split_once(";range=") {
            Some((name, range)) => {
                let low = range
                    .split_once('-')
                    .and_then(|(l, _)| l.parse::<usize>().ok())
                    .unwrap_or(0);
                (name, Some(low))
            }
            None => (*wanted, None),
        };

        let Some((key, values)) = entry
            .attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        else {
            continue;
        };

        match range_size {
            Some(size) if low.is_some() || values.len() > size => {
                let low = low.unwrap_or(0).min(values.len());
                let high = (low + size).min(values.len());
                let label = if high >= values.len() {
                    format!("{};range={}-*", key, low)
                } else {
                    format!("{};range={}-{}", key, low, high - 1)
                };
                attributes.insert(label, values[low..high].to_vec());
            }
            _ => {
                attributes.insert(key.clone(), values.clone());
            }
        }
    }

    RawEntry {
        dn: entry.dn.clone(),
        attributes,
    }
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<RawEntry>, SessionError> {
        let inner = self.record(Request::Search {
            base: base.to_string(),
            scope,
            filter: filter.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        })?;

        let parsed = Filter::parse(filter).ok_or_else(|| SessionError::ResultCode {
            rc: 87,
            text: format!("bad filter {}", filter),
        })?;

        match scope {
            SearchScope::Base => match inner.entries.iter().find(|e| dn_eq(&e.dn, base)) {
                Some(entry) if parsed.matches(entry) => {
                    Ok(vec![project(entry, attributes, inner.range_size)])
                }
                Some(_) => Ok(vec![]),
                None => Err(no_such_object(base)),
            },
            SearchScope::Subtree => Ok(inner
                .entries
                .iter()
                .filter(|e| is_below(&e.dn, base) && parsed.matches(e))
                .map(|e| project(e, attributes, inner.range_size))
                .collect()),
        }
    }

    async fn add(
        &self,
        dn: &str,
        object_classes: &[&str],
        attributes: MultiValued,
    ) -> Result<(), SessionError> {
        let mut inner = self.record(Request::Add {
            dn: dn.to_string(),
            object_classes: object_classes.iter().map(|c| c.to_string()).collect(),
            attributes: attributes.clone(),
        })?;

        if inner.entries.iter().any(|e| dn_eq(&e.dn, dn)) {
            return Err(SessionError::ResultCode {
                rc: RC_ALREADY_EXISTS,
                text: format!("entry already exists: {}", dn),
            });
        }

        let mut stored = attributes;
        stored.retain(|_, v| !v.is_empty());
        stored.insert(
            "objectClass".to_string(),
            object_classes.iter().map(|c| c.to_string()).collect(),
        );
        inner.entries.push(RawEntry {
            dn: dn.to_string(),
            attributes: stored,
        });
        Ok(())
    }

    async fn modify(&self, dn: &str, changes: Modification) -> Result<(), SessionError> {
        let mut inner = self.record(Request::Modify {
            dn: dn.to_string(),
            changes: changes.clone(),
        })?;

        let entry = inner
            .entries
            .iter_mut()
            .find(|e| dn_eq(&e.dn, dn))
            .ok_or_else(|| no_such_object(dn))?;

        for (name, values) in changes.add {
            match find_attribute(&mut entry.attributes, &name) {
                Some(existing) => {
                    for value in values {
                        if !existing.contains(&value) {
                            existing.push(value);
                        }
                    }
                }
                None => {
                    entry.attributes.insert(name, values);
                }
            }
        }
        for (name, values) in changes.replace {
            entry.attributes.retain(|k, _| !k.eq_ignore_ascii_case(&name));
            if !values.is_empty() {
                entry.attributes.insert(name, values);
            }
        }
        for (name, values) in changes.delete {
            if values.is_empty() {
                entry.attributes.retain(|k, _| !k.eq_ignore_ascii_case(&name));
            } else if let Some(existing) = find_attribute(&mut entry.attributes, &name) {
                existing.retain(|v| !values.contains(v));
            }
        }
        entry.attributes.retain(|_, v| !v.is_empty());
        Ok(())
    }

    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_parent: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut inner = self.record(Request::ModifyDn {
            dn: dn.to_string(),
            new_rdn: new_rdn.to_string(),
            delete_old_rdn,
            new_parent: new_parent.map(str::to_string),
        })?;

        let parent = new_parent
            .map(str::to_string)
            .or_else(|| parent_dn(dn))
            .unwrap_or_default();
        let target = format!("{},{}", new_rdn, parent);

        if dn_eq(&target, dn) {
            return Err(SessionError::ResultCode {
                rc: RC_UNWILLING_TO_PERFORM,
                text: "source and target are identical".to_string(),
            });
        }
        if inner.entries.iter().any(|e| dn_eq(&e.dn, &target)) {
            return Err(SessionError::ResultCode {
                rc: RC_ALREADY_EXISTS,
                text: format!("entry already exists: {}", target),
            });
        }

        let entry = inner
            .entries
            .iter_mut()
            .find(|e| dn_eq(&e.dn, dn))
            .ok_or_else(|| no_such_object(dn))?;
        entry.dn = target;
        if let Some((_, value)) = new_rdn.split_once('=') {
            entry.attributes.retain(|k, _| !k.eq_ignore_ascii_case("cn"));
            entry
                .attributes
                .insert("cn".to_string(), vec![value.replace('\\', "")]);
        }
        Ok(())
    }

    async fn delete(&self, dn: &str) -> Result<(), SessionError> {
        let mut inner = self.record(Request::Delete { dn: dn.to_string() })?;

        let before = inner.entries.len();
        inner.entries.retain(|e| !dn_eq(&e.dn, dn));
        if inner.entries.len() == before {
            return Err(no_such_object(dn));
        }
        Ok(())
    }
}

/// Just enough of RFC 4515 for the filters this crate issues
#[derive(Debug)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
}

impl Filter {
    fn parse(input: &str) -> Option<Filter> {
        let (filter, rest) = Self::parse_one(input.trim())?;
        rest.is_empty().then_some(filter)
    }

    fn parse_one(input: &str) -> Option<(Filter, &str)> {
        let body = input.strip_prefix('(')?;
        match body.chars().next()? {
            '&' | '|' => {
                let mut rest = &body[1..];
                let mut children = Vec::new();
                while !rest.starts_with(')') {
                    let (child, tail) = Self::parse_one(rest)?;
                    children.push(child);
                    rest = tail;
                }
                let filter = if body.starts_with('&') {
                    Filter::And(children)
                } else {
                    Filter::Or(children)
                };
                Some((filter, &rest[1..]))
            }
            '!' => {
                let (child, rest) = Self::parse_one(&body[1..])?;
                Some((Filter::Not(Box::new(child)), rest.strip_prefix(')')?))
            }
            _ => {
                let end = body.find(')')?;
                let (name, value) = body[..end].split_once('=')?;
                let filter = if value == "*" {
                    Filter::Present(name.to_string())
                } else {
                    Filter::Equal(name.to_string(), unescape(value)?)
                };
                Some((filter, &body[end + 1..]))
            }
        }
    }

    fn matches(&self, entry: &RawEntry) -> bool {
        let values = |name: &str| {
            entry
                .attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        match self {
            Filter::And(children) => children.iter().all(|c| c.matches(entry)),
            Filter::Or(children) => children.iter().any(|c| c.matches(entry)),
            Filter::Not(child) => !child.matches(entry),
            Filter::Present(name) => !values(name).is_empty(),
            Filter::Equal(name, wanted) => values(name)
                .iter()
                .any(|v| UniCase::new(v.as_str()) == UniCase::new(wanted.as_str())),
        }
    }
}

fn unescape(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let hex = value.get(i + 1..i + 3)?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_match_nested_conditions() {
        let entry = RawEntry {
            dn: "cn=jane,dc=x".to_string(),
            attributes: [
                ("objectClass".to_string(), vec!["top".to_string(), "user".to_string()]),
                ("sAMAccountName".to_string(), vec!["jdoe".to_string()]),
            ]
            .into_iter()
            .collect(),
        };

        assert!(Filter::parse("(&(objectClass=user)(samaccountname=JDOE))")
            .unwrap()
            .matches(&entry));
        assert!(!Filter::parse("(&(objectClass=group)(sAMAccountName=jdoe))")
            .unwrap()
            .matches(&entry));
        assert!(Filter::parse("(!(objectClass=group))").unwrap().matches(&entry));
        assert!(Filter::parse("(objectClass=*)").unwrap().matches(&entry));
    }

    #[test]
    fn escaped_filter_values_are_decoded() {
        assert_eq!(unescape("a\\28b\\29").as_deref(), Some("a(b)"));
    }
}
