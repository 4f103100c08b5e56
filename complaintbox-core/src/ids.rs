//! Validated identity types
//!
//! Every identifier is a newtype over `String` that can only be built through
//! `new`/`parse`, both of which validate. On the wire and on disk each one is
//! a bare JSON string (`"dev-session"`), never an object.
//!
//! | Type | Rule |
//! |------|------|
//! | [`ComplaintId`] | UUID v4, lowercase hyphenated |
//! | [`AgentId`] | 1-100 chars of `[A-Za-z0-9_-.]` plus whitespace |
//! | [`SessionId`] | same as agent, but may be empty (absent) |
//! | [`ProjectId`] | same as agent, but may be empty (absent) |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{Uuid, Variant};

/// Maximum length of agent, session, and project identifiers.
pub const MAX_LABEL_LEN: usize = 100;

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c.is_whitespace()
}

fn validate_label(field: &'static str, raw: &str, allow_empty: bool) -> Result<()> {
    if raw.is_empty() {
        if allow_empty {
            return Ok(());
        }
        return Err(Error::validation(field, "must not be empty"));
    }
    if raw.trim().is_empty() {
        return Err(Error::validation(field, "must not be only whitespace"));
    }
    let len = raw.chars().count();
    if len > MAX_LABEL_LEN {
        return Err(Error::validation(
            field,
            format!("too long ({len} chars, max {MAX_LABEL_LEN})"),
        ));
    }
    if let Some(bad) = raw.chars().find(|c| !is_label_char(*c)) {
        return Err(Error::validation(
            field,
            format!("disallowed character {bad:?} (allowed: letters, digits, '-', '_', '.', whitespace)"),
        ));
    }
    Ok(())
}

// ============================================
// ComplaintId
// ============================================

/// Server-generated complaint identifier (UUID v4).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComplaintId(String);

impl ComplaintId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate and wrap an existing identifier.
    ///
    /// Accepts any case; the stored form is lowercase so that file names stay
    /// stable.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            return Err(Error::validation("id", "must not be empty"));
        }
        let uuid = Uuid::try_parse(raw)
            .map_err(|e| Error::validation("id", format!("not a UUID: {e}")))?;
        if raw.len() != 36 {
            return Err(Error::validation(
                "id",
                "must use the hyphenated form (8-4-4-4-12)",
            ));
        }
        if uuid.get_variant() != Variant::RFC4122 {
            return Err(Error::validation(
                "id",
                format!("wrong UUID variant {:?}, expected RFC 4122", uuid.get_variant()),
            ));
        }
        match uuid.get_version_num() {
            4 => Ok(Self(uuid.hyphenated().to_string())),
            other => Err(Error::validation(
                "id",
                format!("wrong UUID version {other}, expected 4"),
            )),
        }
    }

    /// Deserialization entry point; identical validation to [`Self::new`].
    pub fn parse(raw: &str) -> Result<Self> {
        Self::new(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Always false for a constructed value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        Self::new(&self.0).is_ok()
    }

    /// First eight hex digits, used in human-facing file names.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComplaintId({})", self.0)
    }
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ComplaintId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ComplaintId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ComplaintId> for String {
    fn from(id: ComplaintId) -> String {
        id.0
    }
}

// ============================================
// Label identifiers
// ============================================

/// Defines a validated label identifier. `optional` labels accept the empty
/// string as the "absent" value and implement `Default`.
macro_rules! label_id {
    ($(#[$meta:meta])* $name:ident, $field:literal, optional = $optional:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Result<Self> {
                let raw = raw.into();
                validate_label($field, &raw, $optional)?;
                Ok(Self(raw))
            }

            /// Deserialization entry point; identical validation to `new`.
            pub fn parse(raw: &str) -> Result<Self> {
                Self::new(raw)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn is_valid(&self) -> bool {
                validate_label($field, &self.0, $optional).is_ok()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

label_id!(
    /// Self-chosen name of the agent filing or resolving a complaint.
    AgentId,
    "agent_id",
    optional = false
);

label_id!(
    /// Session the complaint was filed from. Empty when unknown.
    SessionId,
    "session_id",
    optional = true
);

label_id!(
    /// Project the complaint is about. Empty when unknown.
    ProjectId,
    "project_id",
    optional = true
);

impl Default for SessionId {
    fn default() -> Self {
        Self(String::new())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complaint_id_generate_is_v4() {
        let id = ComplaintId::generate();
        assert!(id.is_valid());
        assert!(!id.is_empty());
        assert_eq!(ComplaintId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_complaint_id_normalizes_case() {
        let id = ComplaintId::new("550E8400-E29B-41D4-A716-446655440000").unwrap();
        assert_eq!(id.as_str(), "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(id.short(), "550e8400");
    }

    #[test]
    fn test_complaint_id_rejections() {
        let err = ComplaintId::new("").unwrap_err();
        assert!(err.to_string().contains("must not be empty"));

        let err = ComplaintId::new("not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("not a UUID"));

        // Version 1 UUID
        let err = ComplaintId::new("c232ab00-9414-11ec-b3c8-9f6bdeced846").unwrap_err();
        assert!(err.to_string().contains("wrong UUID version 1"));

        // Simple (unhyphenated) form
        let err = ComplaintId::new("550e8400e29b41d4a716446655440000").unwrap_err();
        assert!(err.to_string().contains("hyphenated"));

        // Version nibble is 4 but the variant bits are NCS, not RFC 4122
        let err = ComplaintId::new("550e8400-e29b-41d4-0716-446655440000").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("variant"));
    }

    #[test]
    fn test_agent_id_rules() {
        assert!(AgentId::new("AI-Assistant").is_ok());
        assert!(AgentId::new("agent_2 v1.0").is_ok());

        let err = AgentId::new("").unwrap_err();
        assert!(matches!(err, Error::Validation { field: "agent_id", .. }));

        let err = AgentId::new("   ").unwrap_err();
        assert!(err.to_string().contains("whitespace"));

        let err = AgentId::new("a".repeat(101)).unwrap_err();
        assert!(err.to_string().contains("too long"));
        assert!(AgentId::new("a".repeat(100)).is_ok());

        let err = AgentId::new("agent/../etc").unwrap_err();
        assert!(err.to_string().contains("disallowed character '/'"));
    }

    #[test]
    fn test_optional_labels_accept_empty() {
        let session = SessionId::new("").unwrap();
        assert!(session.is_empty());
        assert!(session.is_valid());
        assert_eq!(session, SessionId::default());

        let project = ProjectId::default();
        assert!(project.is_empty());
        assert!(ProjectId::new("my project").is_ok());
        assert!(ProjectId::new("my:project").is_err());
    }

    #[test]
    fn test_ids_serialize_as_bare_strings() {
        let agent = AgentId::new("AI-Assistant").unwrap();
        assert_eq!(serde_json::to_string(&agent).unwrap(), "\"AI-Assistant\"");

        let id = ComplaintId::new("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            serde_json::json!("550e8400-e29b-41d4-a716-446655440000")
        );

        let session: SessionId = serde_json::from_str("\"\"").unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<AgentId>("\"\"").is_err());
        assert!(serde_json::from_str::<AgentId>("{\"Value\":\"x\"}").is_err());
        assert!(serde_json::from_str::<ComplaintId>("\"nope\"").is_err());
    }
}
