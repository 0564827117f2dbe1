//! Core type definitions for fcrepo
//!
//! This module defines the identifiers shared by the storage and journal
//! crates: the persistent identifier of a digital object (`Pid`) and the key
//! under which content is kept in a low-level store (`StoreKey`).

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a normalized PID
pub const MAX_PID_LENGTH: usize = 64;

/// Maximum length of a datastream or datastream version identifier
pub const MAX_DATASTREAM_ID_LENGTH: usize = 64;

/// URI prefix a PID may carry when it arrives in `info:fedora/` form
const INFO_FEDORA_PREFIX: &str = "info:fedora/";

/// Separator between the parts of a datastream store key
const DATASTREAM_SEPARATOR: char = '+';

/// Persistent identifier of a digital object
///
/// Always held in normalized form (`namespace:localname`). Two PIDs are
/// equal iff their normalized forms are equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Pid(String);

impl Pid {
    /// Parse and normalize a PID
    ///
    /// Accepts the plain `ns:local` form and the `info:fedora/ns:local` URI
    /// form. Hex digits of `%XX` escapes are upper-cased.
    pub fn new(value: impl AsRef<str>) -> Result<Self, PidError> {
        Self::normalize(value.as_ref()).map(Self)
    }

    /// Get the normalized PID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part (before the first colon)
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map_or("", |(ns, _)| ns)
    }

    /// Local part (after the first colon)
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, local)| local)
    }

    /// The `info:fedora/` URI form of this PID
    #[must_use]
    pub fn to_uri(&self) -> String {
        format!("{INFO_FEDORA_PREFIX}{}", self.0)
    }

    /// File-system safe form: `:` becomes `_` and `%` becomes `=`
    #[must_use]
    pub fn to_filename(&self) -> String {
        self.0.replacen(':', "_", 1).replace('%', "=")
    }

    /// Inverse of [`Pid::to_filename`]
    ///
    /// Namespaces cannot contain `_`, so the first underscore is always the
    /// separator.
    pub fn from_filename(filename: &str) -> Result<Self, PidError> {
        let (ns, local) = filename
            .split_once('_')
            .ok_or_else(|| PidError::MissingColon(filename.to_string()))?;
        Self::new(format!("{ns}:{}", local.replace('=', "%")))
    }

    fn normalize(raw: &str) -> Result<String, PidError> {
        if raw.is_empty() {
            return Err(PidError::Empty);
        }

        let stripped = match raw.get(..INFO_FEDORA_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(INFO_FEDORA_PREFIX) => {
                &raw[INFO_FEDORA_PREFIX.len()..]
            }
            _ => raw,
        };

        if stripped.len() > MAX_PID_LENGTH {
            return Err(PidError::TooLong(stripped.len()));
        }

        let (ns, local) = stripped
            .split_once(':')
            .ok_or_else(|| PidError::MissingColon(raw.to_string()))?;

        if ns.is_empty() {
            return Err(PidError::EmptyNamespace);
        }
        if let Some(c) = ns
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
        {
            return Err(PidError::InvalidNamespaceChar(c));
        }

        if local.is_empty() {
            return Err(PidError::EmptyLocalName);
        }

        let mut normalized = String::with_capacity(stripped.len());
        normalized.push_str(ns);
        normalized.push(':');

        let mut chars = local.chars();
        while let Some(c) = chars.next() {
            match c {
                '%' => {
                    let hi = chars.next();
                    let lo = chars.next();
                    match (hi, lo) {
                        (Some(hi), Some(lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                            normalized.push('%');
                            normalized.push(hi.to_ascii_uppercase());
                            normalized.push(lo.to_ascii_uppercase());
                        }
                        _ => return Err(PidError::BadEscape(raw.to_string())),
                    }
                }
                c if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '~' | '_') => {
                    normalized.push(c);
                }
                c => return Err(PidError::InvalidLocalChar(c)),
            }
        }

        Ok(normalized)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({:?})", self.0)
    }
}

impl FromStr for Pid {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Pid {
    type Error = PidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Pid> for String {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

/// Errors that can occur when parsing a PID or store key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PidError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier is {0} characters, max is {MAX_PID_LENGTH}")]
    TooLong(usize),
    #[error("identifier has no namespace separator: {0:?}")]
    MissingColon(String),
    #[error("namespace is empty")]
    EmptyNamespace,
    #[error("local name is empty")]
    EmptyLocalName,
    #[error("namespace contains invalid character: {0:?}")]
    InvalidNamespaceChar(char),
    #[error("local name contains invalid character: {0:?}")]
    InvalidLocalChar(char),
    #[error("malformed percent escape in {0:?}")]
    BadEscape(String),
    #[error("invalid datastream key: {0:?}")]
    InvalidDatastreamKey(String),
}

/// Key under which a low-level store keeps one piece of content
///
/// Objects are keyed by their PID. Datastream content is keyed per version
/// as `pid+dsId+dsVersionId`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoreKey {
    Object(Pid),
    Datastream {
        pid: Pid,
        ds_id: String,
        version_id: String,
    },
}

impl StoreKey {
    /// Key for an object's serialized form
    #[must_use]
    pub const fn object(pid: Pid) -> Self {
        Self::Object(pid)
    }

    /// Key for one version of a datastream
    pub fn datastream(
        pid: Pid,
        ds_id: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Result<Self, PidError> {
        let ds_id = ds_id.into();
        let version_id = version_id.into();
        validate_datastream_part(&ds_id)?;
        validate_datastream_part(&version_id)?;
        Ok(Self::Datastream {
            pid,
            ds_id,
            version_id,
        })
    }

    /// Parse either `ns:local` or `ns:local+dsId+versionId`
    pub fn parse(value: &str) -> Result<Self, PidError> {
        let mut parts = value.split(DATASTREAM_SEPARATOR);
        let pid = Pid::new(parts.next().unwrap_or_default())?;
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => Ok(Self::Object(pid)),
            (Some(ds_id), Some(version_id), None) => Self::datastream(pid, ds_id, version_id),
            _ => Err(PidError::InvalidDatastreamKey(value.to_string())),
        }
    }

    /// The object this key belongs to
    #[must_use]
    pub const fn pid(&self) -> &Pid {
        match self {
            Self::Object(pid) | Self::Datastream { pid, .. } => pid,
        }
    }

    #[must_use]
    pub const fn is_datastream(&self) -> bool {
        matches!(self, Self::Datastream { .. })
    }

    /// File-system safe form, reversible via [`StoreKey::from_filename`]
    #[must_use]
    pub fn to_filename(&self) -> String {
        match self {
            Self::Object(pid) => pid.to_filename(),
            Self::Datastream {
                pid,
                ds_id,
                version_id,
            } => format!(
                "{}{DATASTREAM_SEPARATOR}{ds_id}{DATASTREAM_SEPARATOR}{version_id}",
                pid.to_filename()
            ),
        }
    }

    /// Decode a file name produced by [`StoreKey::to_filename`]
    pub fn from_filename(filename: &str) -> Result<Self, PidError> {
        let mut parts = filename.split(DATASTREAM_SEPARATOR);
        let pid = Pid::from_filename(parts.next().unwrap_or_default())?;
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => Ok(Self::Object(pid)),
            (Some(ds_id), Some(version_id), None) => Self::datastream(pid, ds_id, version_id),
            _ => Err(PidError::InvalidDatastreamKey(filename.to_string())),
        }
    }
}

fn validate_datastream_part(part: &str) -> Result<(), PidError> {
    let valid = !part.is_empty()
        && part.len() <= MAX_DATASTREAM_ID_LENGTH
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'));
    if valid {
        Ok(())
    } else {
        Err(PidError::InvalidDatastreamKey(part.to_string()))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(pid) => write!(f, "{pid}"),
            Self::Datastream {
                pid,
                ds_id,
                version_id,
            } => write!(
                f,
                "{pid}{DATASTREAM_SEPARATOR}{ds_id}{DATASTREAM_SEPARATOR}{version_id}"
            ),
        }
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({self})")
    }
}

impl From<Pid> for StoreKey {
    fn from(pid: Pid) -> Self {
        Self::Object(pid)
    }
}

impl FromStr for StoreKey {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StoreKey {
    type Error = PidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> Self {
        key.to_string()
    }
}
