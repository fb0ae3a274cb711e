// Room identifiers.
//
// Every presence, subscription, and lock lookup is keyed by the same
// composite identifier: a room kind plus the numeric id of the owning
// entity, serialized as `"<kind>:<id>"`. The kind is part of the key so
// a topic and a relationship sharing a numeric id never collide.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The kind of entity a room belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomKind {
    /// A shared discussion topic.
    Topic,
    /// A relationship thread between two users.
    Relationship,
    /// A private admin-escalation chat.
    Private,
    /// The site-wide breaking-news feed (a single room).
    Breaking,
}

impl RoomKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Relationship => "relationship",
            Self::Private => "private",
            Self::Breaking => "breaking",
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKind {
    type Err = ParseRoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topic" => Ok(Self::Topic),
            "relationship" => Ok(Self::Relationship),
            "private" => Ok(Self::Private),
            "breaking" => Ok(Self::Breaking),
            _ => Err(ParseRoomIdError::UnknownKind(s.to_owned())),
        }
    }
}

/// A room's composite key: `(kind, target id)`.
///
/// The wire form is `"<kind>:<id>"` for every interface (stream query
/// parameter, presence keys, unlock requests). The breaking feed is a
/// single room with target id 0; `"breaking"` without an id is accepted
/// on parse for compatibility and always re-serialized as `"breaking:0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId {
    pub kind: RoomKind,
    pub target: i64,
}

impl RoomId {
    pub const fn new(kind: RoomKind, target: i64) -> Self {
        Self { kind, target }
    }

    pub const fn topic(target: i64) -> Self {
        Self::new(RoomKind::Topic, target)
    }

    pub const fn relationship(target: i64) -> Self {
        Self::new(RoomKind::Relationship, target)
    }

    pub const fn private(target: i64) -> Self {
        Self::new(RoomKind::Private, target)
    }

    pub const fn breaking() -> Self {
        Self::new(RoomKind::Breaking, 0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.target)
    }
}

/// Failure to parse a `"<kind>:<id>"` room identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRoomIdError {
    #[error("unknown room kind '{0}'")]
    UnknownKind(String),
    #[error("room id '{0}' is not of the form '<kind>:<id>'")]
    MissingSeparator(String),
    #[error("room target id '{0}' is not an integer")]
    InvalidTarget(String),
}

impl FromStr for RoomId {
    type Err = ParseRoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, target)) = s.split_once(':') else {
            // Bare "breaking" predates the composite form.
            if s == "breaking" {
                return Ok(Self::breaking());
            }
            return Err(ParseRoomIdError::MissingSeparator(s.to_owned()));
        };

        let kind = kind.parse::<RoomKind>()?;
        let target = target
            .parse::<i64>()
            .map_err(|_| ParseRoomIdError::InvalidTarget(target.to_owned()))?;

        Ok(Self { kind, target })
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
