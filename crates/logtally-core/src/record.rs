//! Log record model.
//!
//! One log line decodes to a [`Record`]. The `event_type` string is kept
//! verbatim; [`EventKind`] splits it into the three recognised
//! [`RequestKind`]s and everything else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in one UTC day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// One decoded log line.
///
/// Extra JSON fields are ignored; the four fields below are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Request type as written in the log.
    pub event_type: String,
    /// Ids in the request body, duplicates and order preserved.
    pub ids: Vec<i64>,
    /// Raw URL query string (`k=v` pairs joined by `&`).
    pub query_string: String,
}

impl Record {
    /// The UTC day this record falls on.
    #[must_use]
    pub const fn day(&self) -> DayBucket {
        DayBucket::from_timestamp(self.timestamp)
    }

    /// The request kind, recognised or not.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event_type.as_str())
    }
}

/// The three recognised request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
}

/// Error returned when parsing an unrecognised request type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRequestKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown request kind '{}': expected one of create, update, delete",
            self.raw
        )
    }
}

impl std::error::Error for UnknownRequestKind {}

impl RequestKind {
    /// All recognised kinds in report order.
    pub const ALL: [Self; 3] = [Self::Create, Self::Update, Self::Delete];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = UnknownRequestKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(UnknownRequestKind { raw: s.to_string() }),
        }
    }
}

/// A request kind as observed in the log.
///
/// Unrecognised kinds keep their literal string so that they can be counted
/// under their own slot instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Known(RequestKind),
    Unrecognized(String),
}

impl EventKind {
    /// Whether this is one of the three recognised kinds.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(kind) => kind.as_str(),
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for EventKind {
    fn from(raw: &str) -> Self {
        raw.parse::<RequestKind>()
            .map_or_else(|_| Self::Unrecognized(raw.to_string()), Self::Known)
    }
}

impl From<RequestKind> for EventKind {
    fn from(kind: RequestKind) -> Self {
        Self::Known(kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    NonValid,
}

impl Validity {
    /// Both groups in report order.
    pub const ALL: [Self; 2] = [Self::Valid, Self::NonValid];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NonValid => "non_valid",
        }
    }
}

impl From<bool> for Validity {
    fn from(valid: bool) -> Self {
        if valid { Self::Valid } else { Self::NonValid }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start of a UTC day, in seconds since the epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DayBucket(u64);

impl DayBucket {
    /// Truncate a timestamp to the midnight that starts its UTC day.
    #[must_use]
    pub const fn from_timestamp(timestamp: u64) -> Self {
        Self(timestamp / SECONDS_PER_DAY * SECONDS_PER_DAY)
    }

    /// Seconds since the epoch of the day start.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
