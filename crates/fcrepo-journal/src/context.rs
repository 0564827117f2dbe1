//! Security context captured with every journal entry
//!
//! `Context` is an immutable snapshot. `JournalEntryContext` is the writable
//! builder used when reading a journal and when a replay needs to adjust
//! the context (recovery attributes, no-op flag) before applying an entry.

use chrono::{DateTime, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// String keys to ordered lists of string values
///
/// Equality compares the values of each key as sets: `[a, b]` equals
/// `[b, a, a]`. Keys with an empty value list are kept and compare equal
/// only to other empty lists.
#[derive(Clone, Default)]
pub struct MultiValueMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl MultiValueMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for `key`, empty if absent
    #[must_use]
    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Replace every value of `key`
    pub fn set<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.entries
            .insert(key.into(), values.into_iter().map(Into::into).collect());
    }

    /// Append one value to `key`
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn same_values(a: &[String], b: &[String]) -> bool {
    a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v))
}

impl PartialEq for MultiValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.entries.get(k).is_some_and(|o| same_values(v, o)))
    }
}

impl Eq for MultiValueMap {}

impl fmt::Debug for MultiValueMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a MultiValueMap {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for MultiValueMap {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// The five attribute maps of a context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeMap {
    Environment,
    Subject,
    Action,
    Resource,
    Recovery,
}

impl AttributeMap {
    /// Serialization order
    pub const ALL: [Self; 5] = [
        Self::Environment,
        Self::Subject,
        Self::Action,
        Self::Resource,
        Self::Recovery,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Subject => "subject",
            Self::Action => "action",
            Self::Resource => "resource",
            Self::Recovery => "recovery",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable security context of one management call
///
/// `now` is kept at millisecond precision, the precision it has in the
/// journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    maps: [MultiValueMap; 5],
    password: String,
    now: DateTime<Utc>,
    no_op: bool,
}

const fn slot(map: AttributeMap) -> usize {
    match map {
        AttributeMap::Environment => 0,
        AttributeMap::Subject => 1,
        AttributeMap::Action => 2,
        AttributeMap::Resource => 3,
        AttributeMap::Recovery => 4,
    }
}

impl Context {
    /// Empty context at `now`
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            maps: Default::default(),
            password: String::new(),
            now: now.trunc_subsecs(3),
            no_op: false,
        }
    }

    #[must_use]
    pub fn builder(now: DateTime<Utc>) -> JournalEntryContext {
        JournalEntryContext::new(now)
    }

    #[must_use]
    pub const fn attributes(&self, map: AttributeMap) -> &MultiValueMap {
        &self.maps[slot(map)]
    }

    #[must_use]
    pub const fn environment(&self) -> &MultiValueMap {
        self.attributes(AttributeMap::Environment)
    }

    #[must_use]
    pub const fn subject(&self) -> &MultiValueMap {
        self.attributes(AttributeMap::Subject)
    }

    #[must_use]
    pub const fn action(&self) -> &MultiValueMap {
        self.attributes(AttributeMap::Action)
    }

    #[must_use]
    pub const fn resource(&self) -> &MultiValueMap {
        self.attributes(AttributeMap::Resource)
    }

    #[must_use]
    pub const fn recovery(&self) -> &MultiValueMap {
        self.attributes(AttributeMap::Recovery)
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Whether the operation was a dry run that changed nothing
    #[must_use]
    pub const fn no_op(&self) -> bool {
        self.no_op
    }
}

/// Writable context, deep-copied from any `Context`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntryContext {
    inner: Context,
}

impl JournalEntryContext {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Context::new(now),
        }
    }

    #[must_use]
    pub fn from_context(context: &Context) -> Self {
        Self {
            inner: context.clone(),
        }
    }

    pub fn attributes_mut(&mut self, map: AttributeMap) -> &mut MultiValueMap {
        &mut self.inner.maps[slot(map)]
    }

    /// Replace the values of one attribute
    #[must_use]
    pub fn attribute<I, V>(mut self, map: AttributeMap, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes_mut(map).set(key, values);
        self
    }

    /// Set a recovery attribute, as replay does for generated identifiers
    pub fn set_recovery_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes_mut(AttributeMap::Recovery)
            .set(key, [value.into()]);
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.inner.password = password.into();
        self
    }

    #[must_use]
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.inner.now = now.trunc_subsecs(3);
        self
    }

    #[must_use]
    pub const fn no_op(mut self, no_op: bool) -> Self {
        self.inner.no_op = no_op;
        self
    }

    pub fn set_no_op(&mut self, no_op: bool) {
        self.inner.no_op = no_op;
    }

    /// Read access to the context being built
    #[must_use]
    pub const fn as_context(&self) -> &Context {
        &self.inner
    }

    #[must_use]
    pub fn build(self) -> Context {
        self.inner
    }
}

impl From<Context> for JournalEntryContext {
    fn from(inner: Context) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_multimap_set_equality() {
        let mut a = MultiValueMap::new();
        a.set("role", ["admin", "user"]);
        let mut b = MultiValueMap::new();
        b.set("role", ["user", "admin", "user"]);
        assert_eq!(a, b);

        b.add("role", "guest");
        assert_ne!(a, b);

        let mut c = MultiValueMap::new();
        c.set("role", ["admin", "user"]);
        c.set("empty", Vec::<String>::new());
        assert_ne!(a, c);
        assert_eq!(c.get("empty"), &[] as &[String]);
        assert_eq!(c.get("missing"), &[] as &[String]);
    }

    #[test]
    fn test_builder_deep_copies() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap();
        let original = Context::builder(now)
            .attribute(
                AttributeMap::Subject,
                "urn:fedora:names:fedora:2.1:subject:loginId",
                ["fedoraAdmin"],
            )
            .password("secret")
            .build();

        let mut copy = JournalEntryContext::from_context(&original);
        copy.set_recovery_value("info:fedora/fedora-system:def/recovery#pid", "demo:1");
        copy.set_no_op(true);
        let replay = copy.build();

        assert!(original.recovery().is_empty());
        assert!(!original.no_op());
        assert_eq!(replay.subject(), original.subject());
        assert_eq!(
            replay.recovery().get("info:fedora/fedora-system:def/recovery#pid"),
            ["demo:1".to_string()]
        );
        assert_eq!(replay.password(), "secret");
    }

    #[test]
    fn test_now_truncated_to_millis() {
        let now = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let context = Context::new(now);
        assert_eq!(context.now().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_attribute_map_names() {
        for map in AttributeMap::ALL {
            assert_eq!(AttributeMap::from_name(map.name()), Some(map));
        }
        assert_eq!(AttributeMap::from_name("other"), None);
    }
}
