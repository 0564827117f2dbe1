//! Journal XML format
//!
//! ```text
//! <FedoraJournal repositoryHash="..." timestamp="...">
//!   <JournalEntry method="ingest" sequence="7" timestamp="...">
//!     <context>
//!       <password type="1">...</password><noOp>false</noOp><now>...</now>
//!       <multimap name="environment"><key name="..."><value>...</value></key></multimap>
//!       ...subject, action, resource, recovery
//!     </context>
//!     <argument name="pid" type="string">demo:1</argument>
//!   </JournalEntry>
//! </FedoraJournal>
//! ```
//!
//! Text content is written without indentation so values round-trip
//! byte for byte; whitespace between elements is ignored on read.

mod events;
mod reader;
mod writer;

pub use reader::{JournalFileReader, read_context, read_entry};
pub use writer::{JournalXmlWriter, entry_to_xml, write_context};

use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) const ROOT: &str = "FedoraJournal";
pub(crate) const ENTRY: &str = "JournalEntry";
pub(crate) const CONTEXT: &str = "context";
pub(crate) const PASSWORD: &str = "password";
pub(crate) const NO_OP: &str = "noOp";
pub(crate) const NOW: &str = "now";
pub(crate) const MULTIMAP: &str = "multimap";
pub(crate) const KEY: &str = "key";
pub(crate) const VALUE: &str = "value";
pub(crate) const ARGUMENT: &str = "argument";
pub(crate) const ELEMENT: &str = "element";

pub(crate) const ATTR_REPOSITORY_HASH: &str = "repositoryHash";
pub(crate) const ATTR_TIMESTAMP: &str = "timestamp";
pub(crate) const ATTR_METHOD: &str = "method";
pub(crate) const ATTR_SEQUENCE: &str = "sequence";
pub(crate) const ATTR_NAME: &str = "name";
pub(crate) const ATTR_TYPE: &str = "type";

/// Attributes of the `FedoraJournal` root element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalHeader {
    pub repository_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Journal timestamp form, millisecond precision in UTC
#[must_use]
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> crate::error::JournalResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| crate::error::JournalError::malformed(format!("bad timestamp {s:?}: {e}")))
}
