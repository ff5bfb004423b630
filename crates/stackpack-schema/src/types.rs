//! Newtype wrappers for component names and versions.
//!
//! Both serialize as plain strings. Versions are opaque dotted strings: the
//! only structure ever extracted from them is the `.`-separated segments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
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
                f.write_str(&self.0)
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

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_newtype!(
    /// Name of a stack component, e.g. `rockylinux`, `postgresql`, `pgpool`.
    ComponentName
);

string_newtype!(
    /// Dotted version string such as `15.8` or `4.4.4`.
    Version
);

impl Version {
    /// The `index`-th `.`-separated segment, if present.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.0.split('.').nth(index)
    }

    /// Leading segment. Always present (it is the whole string when there is no dot).
    pub fn major(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    pub fn minor(&self) -> Option<&str> {
        self.segment(1)
    }

    pub fn patch(&self) -> Option<&str> {
        self.segment(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_segments() {
        let v = Version::new("4.4.4");
        assert_eq!(v.major(), "4");
        assert_eq!(v.minor(), Some("4"));
        assert_eq!(v.patch(), Some("4"));
        assert_eq!(v.segment(3), None);
    }

    #[test]
    fn single_segment_version_is_its_own_major() {
        let v = Version::new("9");
        assert_eq!(v.major(), "9");
        assert_eq!(v.minor(), None);
    }

    #[test]
    fn trailing_zero_is_preserved() {
        let v = Version::new("8.10");
        assert_eq!(v.as_str(), "8.10");
        assert_eq!(v.minor(), Some("10"));
    }

    #[test]
    fn version_serializes_as_plain_string() {
        let v = Version::new("15.8");
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"15.8\"");
        let back: Version = serde_json::from_str("\"15.8\"").unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn component_name_compares_with_str() {
        let n = ComponentName::from("pgpool");
        assert_eq!(n, "pgpool");
        assert_eq!(n.to_string(), "pgpool");
    }
}
