//! Object lookups against the directory
//!
//! Every lookup goes to the directory; nothing is cached between calls.

use std::sync::Arc;
use unicase::UniCase;

use super::attributes::{decode, Attributes};
use super::error::{DirectoryError, Result};
use super::session::{DirectorySession, RawEntry, SearchScope};

const OBJECT_CLASS: &str = "objectClass";
const MATCH_ALL: &str = "(objectClass=*)";

/// Snapshot of one directory entry with single-valued attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryObject {
    pub dn: String,
    pub attributes: Attributes,
    /// Kept apart from `attributes`, which only holds the first value.
    pub object_classes: Vec<String>,
}

impl DirectoryObject {
    fn from_raw(entry: RawEntry) -> Self {
        let object_classes = entry
            .attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(OBJECT_CLASS))
            .map(|(_, values)| values.clone())
            .unwrap_or_default();

        Self {
            attributes: decode(&entry.attributes),
            dn: entry.dn,
            object_classes,
        }
    }

    pub fn is_kind(&self, object_class: &str) -> bool {
        self.object_classes
            .iter()
            .any(|c| UniCase::new(c.as_str()) == UniCase::new(object_class))
    }

    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.value(name)
    }
}

#[derive(Clone)]
pub struct ObjectRepository {
    session: Arc<dyn DirectorySession>,
}

impl ObjectRepository {
    pub fn new(session: Arc<dyn DirectorySession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &dyn DirectorySession {
        self.session.as_ref()
    }

    /// Subtree search expecting at most one match
    pub async fn find_one(
        &self,
        filter: &str,
        base: &str,
        attributes: &[&str],
    ) -> Result<Option<DirectoryObject>> {
        tracing::debug!("Searching {} under {}", filter, base);
        self.unique(base, SearchScope::Subtree, filter, attributes).await
    }

    /// Base-scope lookup of the entry named by `dn`
    pub async fn get_by_dn(
        &self,
        dn: &str,
        attributes: &[&str],
    ) -> Result<Option<DirectoryObject>> {
        tracing::debug!("Fetching {}", dn);
        self.unique(dn, SearchScope::Base, MATCH_ALL, attributes).await
    }

    /// Every value of a multi-valued attribute, following AD ranged retrieval
    /// (`member;range=0-1499`) until the final range is returned.
    pub async fn member_values(&self, dn: &str, attribute: &str) -> Result<Vec<String>> {
        let mut values = Vec::new();
        let mut requested = attribute.to_string();

        loop {
            let entries = match self
                .session
                .search(dn, SearchScope::Base, MATCH_ALL, &[requested.as_str()])
                .await
            {
                Ok(entries) => entries,
                Err(e) if e.is_no_such_object() => return Ok(values),
                Err(e) => return Err(DirectoryError::transport("read members", dn, e)),
            };

            let Some(entry) = entries.into_iter().next() else {
                return Ok(values);
            };

            let mut next = None;
            for (name, chunk) in entry.attributes {
                if name.eq_ignore_ascii_case(attribute) {
                    values.extend(chunk);
                } else if let Some(upper) = range_upper_bound(&name, attribute) {
                    values.extend(chunk);
                    next = match upper {
                        RangeEnd::Last => None,
                        RangeEnd::At(high) => Some(format!("{};range={}-*", attribute, high + 1)),
                    };
                }
            }

            match next {
                Some(range) => {
                    tracing::debug!("Fetching {} of {}", range, dn);
                    requested = range;
                }
                None => return Ok(values),
            }
        }
    }

    async fn unique(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Option<DirectoryObject>> {
        let mut requested: Vec<&str> = attributes.to_vec();
        if !requested.iter().any(|a| a.eq_ignore_ascii_case(OBJECT_CLASS)) {
            requested.push(OBJECT_CLASS);
        }

        let mut entries = match self.session.search(base, scope, filter, &requested).await {
            Ok(entries) => entries,
            Err(e) if e.is_no_such_object() => return Ok(None),
            Err(e) => {
                return Err(DirectoryError::transport(
                    "search",
                    format!("{} under {}", filter, base),
                    e,
                ))
            }
        };

        match entries.len() {
            0 => Ok(None),
            1 => Ok(entries.pop().map(DirectoryObject::from_raw)),
            count => Err(DirectoryError::AmbiguousResult {
                filter: filter.to_string(),
                base: base.to_string(),
                count,
            }),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RangeEnd {
    At(u64),
    Last,
}

/// Parses `<attribute>;range=<low>-<high>` returned by AD for large attributes.
fn range_upper_bound(name: &str, attribute: &str) -> Option<RangeEnd> {
    let (base, options) = name.split_once(';')?;
    if !base.eq_ignore_ascii_case(attribute) {
        return None;
    }
    let range = options
        .split(';')
        .find_map(|o| o.strip_prefix("range=").or_else(|| o.strip_prefix("Range=")))?;
    let (_, high) = range.split_once('-')?;
    if high == "*" {
        Some(RangeEnd::Last)
    } else {
        high.parse().ok().map(RangeEnd::At)
    }
}
