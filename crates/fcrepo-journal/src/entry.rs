//! Journal entry model

use crate::context::Context;
use crate::error::{JournalError, JournalResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Management operations that are journaled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagementMethod {
    Ingest,
    ModifyObject,
    PurgeObject,
    AddDatastream,
    ModifyDatastreamByReference,
    ModifyDatastreamByValue,
    SetDatastreamState,
    SetDatastreamVersionable,
    PurgeDatastream,
    AddRelationship,
    PurgeRelationship,
    GetNextPid,
    PutTempStream,
}

impl ManagementMethod {
    pub const ALL: [Self; 13] = [
        Self::Ingest,
        Self::ModifyObject,
        Self::PurgeObject,
        Self::AddDatastream,
        Self::ModifyDatastreamByReference,
        Self::ModifyDatastreamByValue,
        Self::SetDatastreamState,
        Self::SetDatastreamVersionable,
        Self::PurgeDatastream,
        Self::AddRelationship,
        Self::PurgeRelationship,
        Self::GetNextPid,
        Self::PutTempStream,
    ];

    /// Name used in the `method` attribute
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::ModifyObject => "modifyObject",
            Self::PurgeObject => "purgeObject",
            Self::AddDatastream => "addDatastream",
            Self::ModifyDatastreamByReference => "modifyDatastreamByReference",
            Self::ModifyDatastreamByValue => "modifyDatastreamByValue",
            Self::SetDatastreamState => "setDatastreamState",
            Self::SetDatastreamVersionable => "setDatastreamVersionable",
            Self::PurgeDatastream => "purgeDatastream",
            Self::AddRelationship => "addRelationship",
            Self::PurgeRelationship => "purgeRelationship",
            Self::GetNextPid => "getNextPid",
            Self::PutTempStream => "putTempStream",
        }
    }
}

impl fmt::Display for ManagementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagementMethod {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| JournalError::malformed(format!("unknown method {s:?}")))
    }
}

/// One argument value of a journaled call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    String(String),
    Integer(i64),
    Boolean(bool),
    Date(DateTime<Utc>),
    StringArray(Vec<String>),
    Binary(Vec<u8>),
    Null,
}

impl Argument {
    /// Name used in the `type` attribute
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::StringArray(_) => "stringArray",
            Self::Binary(_) => "binary",
            Self::Null => "null",
        }
    }
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Argument {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Argument {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Argument {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Vec<String>> for Argument {
    fn from(v: Vec<String>) -> Self {
        Self::StringArray(v)
    }
}

impl From<Vec<u8>> for Argument {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Argument {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Record of one committed management call
///
/// `sequence` is 0 until the journal writer assigns one. The entry
/// timestamp is the context's `now`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    method: ManagementMethod,
    sequence: u64,
    context: Context,
    arguments: Vec<(String, Argument)>,
}

impl JournalEntry {
    #[must_use]
    pub const fn new(method: ManagementMethod, context: Context) -> Self {
        Self {
            method,
            sequence: 0,
            context,
            arguments: Vec::new(),
        }
    }

    /// Append an argument; order is preserved
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Argument>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub(crate) const fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    #[must_use]
    pub const fn method(&self) -> ManagementMethod {
        self.method
    }

    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.context.now()
    }

    #[must_use]
    pub fn arguments(&self) -> &[(String, Argument)] {
        &self.arguments
    }

    /// First argument called `name`
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn bad_argument(&self, name: &str, detail: impl Into<String>) -> JournalError {
        JournalError::Argument {
            sequence: self.sequence,
            method: self.method.to_string(),
            argument: name.to_string(),
            detail: detail.into(),
        }
    }

    fn required(&self, name: &str) -> JournalResult<&Argument> {
        self.argument(name)
            .ok_or_else(|| self.bad_argument(name, "missing"))
    }

    pub fn string_arg(&self, name: &str) -> JournalResult<&str> {
        match self.required(name)? {
            Argument::String(s) => Ok(s),
            other => Err(self.bad_argument(name, format!("expected string, got {}", other.type_name()))),
        }
    }

    /// String argument that may be absent or null
    pub fn optional_string_arg(&self, name: &str) -> JournalResult<Option<&str>> {
        match self.argument(name) {
            None | Some(Argument::Null) => Ok(None),
            Some(Argument::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.bad_argument(
                name,
                format!("expected string, got {}", other.type_name()),
            )),
        }
    }

    pub fn binary_arg(&self, name: &str) -> JournalResult<&[u8]> {
        match self.required(name)? {
            Argument::Binary(b) => Ok(b),
            other => Err(self.bad_argument(name, format!("expected binary, got {}", other.type_name()))),
        }
    }

    pub fn string_array_arg(&self, name: &str) -> JournalResult<&[String]> {
        match self.required(name)? {
            Argument::StringArray(v) => Ok(v),
            Argument::Null => Ok(&[]),
            other => Err(self.bad_argument(
                name,
                format!("expected stringArray, got {}", other.type_name()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> Context {
        Context::new(Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap())
    }

    #[test]
    fn test_method_names() {
        for method in ManagementMethod::ALL {
            assert_eq!(method.as_str().parse::<ManagementMethod>().unwrap(), method);
        }
        assert!("reboot".parse::<ManagementMethod>().unwrap_err().is_malformed());
    }

    #[test]
    fn test_typed_argument_access() {
        let entry = JournalEntry::new(ManagementMethod::Ingest, context())
            .with_argument("pid", "demo:1")
            .with_argument("serialization", b"<foxml/>".to_vec())
            .with_argument("logMessage", None::<String>)
            .with_argument("versionIds", vec!["DC.0".to_string()]);

        assert_eq!(entry.string_arg("pid").unwrap(), "demo:1");
        assert_eq!(entry.binary_arg("serialization").unwrap(), b"<foxml/>");
        assert_eq!(entry.optional_string_arg("logMessage").unwrap(), None);
        assert_eq!(entry.optional_string_arg("absent").unwrap(), None);
        assert_eq!(entry.string_array_arg("versionIds").unwrap(), ["DC.0"]);

        assert!(matches!(
            entry.string_arg("serialization"),
            Err(JournalError::Argument { .. })
        ));
        assert!(matches!(
            entry.binary_arg("missing"),
            Err(JournalError::Argument { .. })
        ));
        assert_eq!(entry.timestamp(), context().now());
    }
}
