//! Directory-facing half of the provider: the session abstraction, its ldap3
//! implementation, attribute and DN helpers, and object lookups.

pub mod attributes;
pub mod client;
pub mod dn;
pub mod error;
pub mod repository;
pub mod session;

#[cfg(test)]
pub mod test_helpers;

pub use attributes::{decode, encode, Attributes, MultiValued};
pub use client::LdapSession;
pub use error::{DirectoryError, Result, SessionError};
pub use repository::{DirectoryObject, ObjectRepository};
pub use session::{DirectorySession, Modification, RawEntry, SearchScope};
