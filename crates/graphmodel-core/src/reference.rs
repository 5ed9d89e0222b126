//! Entity references: permanent store identities and session-local placeholders.
//!
//! A reference is a tagged value, never a prefixed string. The text forms
//! (`$42` for a permanent id, `_n3` / `_r3` for placeholders) exist only at the
//! serialization boundary, where a write request is shipped to a store and the
//! store's placeholder mapping comes back.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// What a placeholder stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    /// A node not yet persisted.
    Node,
    /// A relationship not yet persisted.
    Relationship,
}

impl TokenKind {
    const fn prefix(self) -> char {
        match self {
            TokenKind::Node => 'n',
            TokenKind::Relationship => 'r',
        }
    }
}

/// A session-local placeholder for an entity that has no permanent identity yet.
///
/// Tokens are unique within the session that issued them; they mean nothing to
/// any other session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempToken {
    kind: TokenKind,
    seq: u64,
}

impl TempToken {
    /// Create a token. Only the mapping context should mint fresh ones.
    #[must_use]
    pub const fn new(kind: TokenKind, seq: u64) -> Self {
        Self { kind, seq }
    }

    /// The kind of entity this token stands in for.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The per-kind sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for TempToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}{}", self.kind.prefix(), self.seq)
    }
}

impl FromStr for TempToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.parse::<EntityRef>()? {
            EntityRef::Temporary(token) => Ok(token),
            EntityRef::Permanent(_) => Err(Error::malformed(s, "expected a temporary token")),
        }
    }
}

/// A handle to a node or relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// Identity assigned by the store.
    Permanent(i64),
    /// Placeholder issued by the session.
    Temporary(TempToken),
}

impl EntityRef {
    /// Check if this reference is a store identity.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, EntityRef::Permanent(_))
    }

    /// Check if this reference is a session placeholder.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, EntityRef::Temporary(_))
    }

    /// The permanent id, if known.
    #[must_use]
    pub const fn permanent_id(&self) -> Option<i64> {
        match self {
            EntityRef::Permanent(id) => Some(*id),
            EntityRef::Temporary(_) => None,
        }
    }

    /// The placeholder token, if this is temporary.
    #[must_use]
    pub const fn token(&self) -> Option<TempToken> {
        match self {
            EntityRef::Permanent(_) => None,
            EntityRef::Temporary(token) => Some(*token),
        }
    }
}

impl From<TempToken> for EntityRef {
    fn from(token: TempToken) -> Self {
        EntityRef::Temporary(token)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Permanent(id) => write!(f, "${id}"),
            EntityRef::Temporary(token) => write!(f, "{token}"),
        }
    }
}

fn parse_digits(input: &str, digits: &str) -> Result<u64> {
    if digits.is_empty() {
        return Err(Error::malformed(input, "missing number"));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(input, "not a number"));
    }
    digits
        .parse::<u64>()
        .map_err(|_| Error::malformed(input, "number out of range"))
}

impl FromStr for EntityRef {
    type Err = Error;

    /// Parse `$<id>` or `<id>` as permanent, `_n<seq>` / `_r<seq>` as temporary.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::malformed(s, "empty reference"));
        }

        if let Some(rest) = s.strip_prefix('_') {
            let mut chars = rest.chars();
            let kind = match chars.next() {
                Some('n') => TokenKind::Node,
                Some('r') => TokenKind::Relationship,
                _ => return Err(Error::malformed(s, "unknown placeholder kind")),
            };
            let seq = parse_digits(s, chars.as_str())?;
            return Ok(EntityRef::Temporary(TempToken::new(kind, seq)));
        }

        let digits = s.strip_prefix('$').unwrap_or(s);
        let id = parse_digits(s, digits)?;
        let id = i64::try_from(id).map_err(|_| Error::malformed(s, "number out of range"))?;
        Ok(EntityRef::Permanent(id))
    }
}

impl Serialize for EntityRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The store's answer to a write request: which permanent id each placeholder
/// received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    ids: HashMap<TempToken, i64>,
}

impl PlaceholderMap {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from the raw `token -> id` pairs a store returns.
    ///
    /// Keys that are not placeholder tokens fail with
    /// [`Error::MalformedReference`]. A key that parses as a permanent id
    /// carries no information and is skipped.
    pub fn parse<I, K>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut ids = HashMap::new();
        for (key, id) in raw {
            let key = key.as_ref();
            match key.parse::<EntityRef>()? {
                EntityRef::Temporary(token) => {
                    ids.insert(token, id);
                }
                EntityRef::Permanent(existing) => {
                    tracing::warn!(key, existing, id, "Ignoring permanent id in placeholder map");
                }
            }
        }
        Ok(Self { ids })
    }

    /// Record the id assigned to a placeholder.
    pub fn insert(&mut self, token: TempToken, id: i64) -> Option<i64> {
        self.ids.insert(token, id)
    }

    /// Look up the id assigned to a placeholder.
    #[must_use]
    pub fn get(&self, token: &TempToken) -> Option<i64> {
        self.ids.get(token).copied()
    }

    /// Check if a placeholder has an assigned id.
    #[must_use]
    pub fn contains(&self, token: &TempToken) -> bool {
        self.ids.contains_key(token)
    }

    /// Turn a reference into a permanent id.
    ///
    /// Permanent references pass through; temporary ones must be present in
    /// the mapping or [`Error::UnresolvedReference`] is returned.
    pub fn resolve(&self, reference: &EntityRef) -> Result<i64> {
        match reference {
            EntityRef::Permanent(id) => Ok(*id),
            EntityRef::Temporary(token) => self.get(token).ok_or_else(|| Error::unresolved(token)),
        }
    }

    /// Number of mapped placeholders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over `(token, id)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&TempToken, &i64)> {
        self.ids.iter()
    }
}

impl FromIterator<(TempToken, i64)> for PlaceholderMap {
    fn from_iter<I: IntoIterator<Item = (TempToken, i64)>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
