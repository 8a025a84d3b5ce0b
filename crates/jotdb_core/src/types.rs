//! Core type definitions for jotdb.

use serde_json::Value;
use std::fmt;

/// User-supplied record identifier.
///
/// Keys are either strings or integers, matching what the wire format
/// accepts for the `id` field. String keys must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A string identifier.
    Str(String),
    /// An integer identifier.
    Int(i64),
}

impl Key {
    /// Extracts a key from a JSON value, if it has an admissible shape.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Int),
            _ => None,
        }
    }

    /// The JSON representation of this key.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(i) => Value::Number((*i).into()),
        }
    }

    /// Whether this key is admissible as a record id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Str(s) => !s.is_empty(),
            Self::Int(_) => true,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// Operation tag carried by every record line (`_oid`).
///
/// `1` marks a set, `2` a delete. Values `3` and `4` are reserved for
/// relationship operations and round-trip untouched when read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpTag(u8);

impl OpTag {
    /// A set (upsert) of a record.
    pub const SET: Self = Self(1);
    /// A delete tombstone.
    pub const DELETE: Self = Self(2);

    /// Creates a tag from its raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    /// Whether this tag marks a set.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 == 1
    }

    /// Whether this tag marks a delete.
    #[must_use]
    pub const fn is_delete(self) -> bool {
        self.0 == 2
    }
}

impl fmt::Display for OpTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op:{}", self.0)
    }
}

/// Sequence number totally ordering every mutation in a store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SeqNo(pub u64);

impl SeqNo {
    /// Creates a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Stable per-key record identity (`_rid`).
///
/// Assigned on first insert, preserved across updates, freed on delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Rid(pub u64);

impl Rid {
    /// Creates a record id.
    #[must_use]
    pub const fn new(rid: u64) -> Self {
        Self(rid)
    }

    /// The raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The next record id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid:{}", self.0)
    }
}
