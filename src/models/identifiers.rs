use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! impl_id_type {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Backends occasionally hand back blank identifiers for removed content
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }
    };
}

// Primary key of a row in the backing store
impl_id_type!(RecordId);
// External video platform identifiers
impl_id_type!(VideoId);
impl_id_type!(ChannelId);
impl_id_type!(UserId);
impl_id_type!(CategoryId);

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_id_type {
        ($modname:ident, $name:ident) => {
            mod $modname {
                use super::*;

                #[test]
                fn test_conversions_agree() {
                    let a = $name::new("abc123");
                    let b = $name::from("abc123".to_string());
                    let c: $name = "abc123".parse().unwrap();
                    assert_eq!(a, b);
                    assert_eq!(b, c);
                    assert_eq!(a.to_string(), "abc123");
                }

                #[test]
                fn test_serializes_as_plain_string() {
                    let id = $name::new("abc123");
                    let json = serde_json::to_string(&id).unwrap();
                    assert_eq!(json, "\"abc123\"");

                    let back: $name = serde_json::from_str(&json).unwrap();
                    assert_eq!(back, id);
                }

                #[test]
                fn test_blank_detection() {
                    assert!($name::new("  ").is_blank());
                    assert!(!$name::new("x").is_blank());
                }
            }
        };
    }

    test_id_type!(record_id, RecordId);
    test_id_type!(video_id, VideoId);
    test_id_type!(channel_id, ChannelId);
    test_id_type!(user_id, UserId);
    test_id_type!(category_id, CategoryId);
}
