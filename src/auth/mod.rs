pub mod gate;
pub mod password;
pub mod token;

use axum::{extract::FromRequestParts, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Role ordinals are ordered: several authorization decisions compare rank,
/// not just set membership. `Student` is ordinal 0 and is a real role, never
/// an "unset" marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Super,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::Super => "super",
        }
    }

    pub fn ordinal(&self) -> i32 {
        *self as i32
    }
}

impl TryFrom<&str> for Role {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            "super" => Ok(Role::Super),
            _ => Err(()),
        }
    }
}

impl TryFrom<i32> for Role {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Student),
            1 => Ok(Role::Teacher),
            2 => Ok(Role::Admin),
            3 => Ok(Role::Super),
            _ => Err(()),
        }
    }
}

/// Signed claim bag shared by auth and refresh tokens; the two flavors differ
/// only in which secret signs them and which optional fields they carry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub iss: String,
    pub sub: i64,
    pub iat: usize,
    pub exp: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<usize>,
    /// Authentication method the session originated from ("local", "google", ...).
    pub method: String,
    /// Auth tokens embed resolved roles so gate checks skip the database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
    /// Refresh tokens carry the issuer of the original login so rotation
    /// preserves provenance.
    #[serde(rename = "originalIss", skip_serializing_if = "Option::is_none")]
    pub original_iss: Option<String>,
}

// Helper extractor: pull verified claims from request extensions.
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or((StatusCode::UNAUTHORIZED, "No claims in request"))
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_string_roundtrip() {
        assert_eq!(Role::Student.as_str(), "student");
        assert_eq!(Role::Super.as_str(), "super");

        assert_eq!(Role::try_from("teacher"), Ok(Role::Teacher));
        assert_eq!(Role::try_from("admin"), Ok(Role::Admin));
        assert!(Role::try_from("principal").is_err());
    }

    #[test]
    fn ordinals_are_ordered() {
        assert_eq!(Role::Student.ordinal(), 0);
        assert_eq!(Role::Super.ordinal(), 3);
        assert!(Role::Student < Role::Teacher);
        assert!(Role::Admin < Role::Super);

        assert_eq!(Role::try_from(1), Ok(Role::Teacher));
        assert!(Role::try_from(4).is_err());
    }
}
