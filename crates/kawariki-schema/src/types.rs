//! Newtype wrappers for manifest identifiers and the distribution version type.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// A platform identifier, either a host id (`linux-x86_64`) or a
    /// distribution-specific id (`linux64`).
    PlatformId
);

string_newtype!(
    /// On-disk identity of a distribution below the install root.
    Slug
);

/// One component of a distribution version.
///
/// Numeric components order before textual ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionPart {
    Num(u64),
    Tag(String),
}

impl Ord for VersionPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.cmp(b),
            (Self::Tag(a), Self::Tag(b)) => a.cmp(b),
            (Self::Num(_), Self::Tag(_)) => Ordering::Less,
            (Self::Tag(_), Self::Num(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for VersionPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Tag(s) => f.write_str(s),
        }
    }
}

impl From<u64> for VersionPart {
    fn from(n: u64) -> Self {
        Self::Num(n)
    }
}

/// A distribution version tuple such as `0.72.0` or `1.4.0-beta`.
///
/// Comparison is component-wise; a shorter version that is a prefix of a
/// longer one orders first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(Vec<VersionPart>);

impl Version {
    pub fn new(parts: Vec<VersionPart>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[VersionPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `n` components.
    pub fn truncated(&self, n: usize) -> Self {
        Self(self.0.iter().take(n).cloned().collect())
    }

    /// Whether `prefix` equals the leading components of this version.
    pub fn starts_with(&self, prefix: &Version) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Parse a dotted string such as `0.72.1`. Components that are not plain
    /// integers are kept as text.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        Some(Self(
            s.split('.')
                .map(|p| {
                    p.parse::<u64>()
                        .map_or_else(|_| VersionPart::Tag(p.to_owned()), VersionPart::Num)
                })
                .collect(),
        ))
    }

    /// Read a version from a manifest value: a list of integers/strings, or a
    /// dotted string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Number(n) => n.as_u64().map(VersionPart::Num),
                    Value::String(s) => Some(VersionPart::Tag(s.clone())),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[u64; N]> for Version {
    fn from(parts: [u64; N]) -> Self {
        Self(parts.into_iter().map(VersionPart::Num).collect())
    }
}
