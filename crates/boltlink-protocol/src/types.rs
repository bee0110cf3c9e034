//! Core message types.
//!
//! An application message is a type tag plus a small set of named fields.
//! Field values are deliberately limited to three scalar kinds (boolean,
//! number, text) and at most one level of grouping, which is exactly what
//! the pipe-delimited wire format can carry:
//!
//! ```text
//! state|round=2|player.x=5|player.alive=false
//! ─────  ───────  ──────────────────────────
//! type   scalar   group "player" with two subkeys
//! ```

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A player's identity within one session.
///
/// The host is always player 1. Clients are handed 2 or 3 by the host when
/// they connect, lowest free slot first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// The host's fixed identity.
    pub const HOST: Self = Self(1);

    /// Identities the host hands out to clients, in assignment order.
    pub const CLIENT_SLOTS: [Self; 2] = [Self(2), Self(3)];

    /// Converts a wire number into a player id, if it names a real player.
    ///
    /// Accepts only integral values in `1..=3`.
    pub fn from_number(n: f64) -> Option<Self> {
        if n.fract() != 0.0 {
            return None;
        }
        match n as i64 {
            1 => Some(Self::HOST),
            2 => Some(Self::CLIENT_SLOTS[0]),
            3 => Some(Self::CLIENT_SLOTS[1]),
            _ => None,
        }
    }
}

/// Defaults to [`PlayerId::HOST`], which is also what a client reports
/// before the host assigns it a slot.
impl Default for PlayerId {
    fn default() -> Self {
        Self::HOST
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single field value.
///
/// `Display` produces the wire form: `true`/`false`, numbers in their
/// shortest form (`5`, `-1`, `3.5`), and text as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            // f64's Display never uses an exponent and drops a zero
            // fraction, so 5.0 prints as "5".
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<PlayerId> for Value {
    fn from(id: PlayerId) -> Self {
        Self::Number(f64::from(id.0))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// One level of nested fields, written on the wire as `group.key=value`.
///
/// Insertion order is kept for encoding; equality ignores it.
#[derive(Debug, Clone, Default)]
pub struct Group {
    entries: Vec<(String, Value)>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`, replacing any earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Group {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GroupVisitor;

        impl<'de> Visitor<'de> for GroupVisitor {
            type Value = Group;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Group, A::Error> {
                let mut group = Group::new();
                while let Some((k, v)) = access.next_entry::<String, Value>()? {
                    group.insert(k, v);
                }
                Ok(group)
            }
        }

        deserializer.deserialize_map(GroupVisitor)
    }
}

// ---------------------------------------------------------------------------
// Field / Fields
// ---------------------------------------------------------------------------

/// A top-level field: a scalar, or a group of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Scalar(Value),
    Group(Group),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::Scalar(_) => None,
        }
    }
}

/// The named fields of a message.
///
/// Keys are unique. Writing an existing key replaces it in place, whether
/// the old entry was a scalar or a group, so the last write wins.
/// Insertion order is kept for encoding; equality ignores it.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, Field)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    ///
    /// ```rust
    /// use boltlink_protocol::Fields;
    ///
    /// let fields = Fields::new().with("x", 3.5).with("alive", true);
    /// assert_eq!(fields.number("x"), Some(3.5));
    /// ```
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`insert_group`](Self::insert_group).
    pub fn with_group(mut self, key: impl Into<String>, group: Group) -> Self {
        self.insert_group(key, group);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.put(key.into(), Field::Scalar(value.into()));
    }

    pub fn insert_group(&mut self, key: impl Into<String>, group: Group) {
        self.put(key.into(), Field::Group(group));
    }

    /// Sets `group.subkey`, creating the group if needed. A scalar already
    /// stored under `group` is replaced by a fresh group.
    pub fn insert_grouped(
        &mut self,
        group: impl Into<String>,
        subkey: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let group = group.into();
        match self.entries.iter_mut().find(|(k, _)| *k == group) {
            Some((_, Field::Group(g))) => g.insert(subkey, value),
            Some((_, slot)) => *slot = Field::Group(Group::new().with(subkey, value)),
            None => self
                .entries
                .push((group, Field::Group(Group::new().with(subkey, value)))),
        }
    }

    fn put(&mut self, key: String, field: Field) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = field,
            None => self.entries.push((key, field)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    /// The scalar stored under `key`, if any.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Field::as_value)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(Value::as_f64)
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(Value::as_bool)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn group(&self, key: &str) -> Option<&Group> {
        self.get(key).and_then(Field::as_group)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Fields {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, f)| other.get(k) == Some(f))
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, f) in self.iter() {
            map.serialize_entry(k, f)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Fields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of scalars or one-level groups")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
                let mut fields = Fields::new();
                while let Some((k, f)) = access.next_entry::<String, Field>()? {
                    fields.put(k, f);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An application message: a type tag plus its fields.
///
/// The JSON form is `{"type": "...", "data": {...}}`; the text form is
/// described in [`TextCodec`](crate::TextCodec).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "data", default)]
    pub fields: Fields,
}

impl Message {
    /// A message with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), fields: Fields::new() }
    }

    pub fn with_fields(kind: impl Into<String>, fields: Fields) -> Self {
        Self { kind: kind.into(), fields }
    }

    /// Builder: adds a scalar field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key, value);
        self
    }

    /// Builder: adds a group field.
    pub fn with_group(mut self, key: impl Into<String>, group: Group) -> Self {
        self.fields.insert_group(key, group);
        self
    }
}

// =========================================================================
// Tests
// =========================================================================
