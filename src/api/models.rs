use serde::{Deserialize, Serialize};
use std::fmt;

/// Success envelope wrapping every payload the API returns.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub version: Option<Vec<u32>>,
    pub data: T,
}

/// Users are granted permissions based on their access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum AccessLevel {
    User,
    Moderator,
    Administrator,
    Superuser,
}

impl TryFrom<u16> for AccessLevel {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AccessLevel::User),
            20 => Ok(AccessLevel::Moderator),
            30 => Ok(AccessLevel::Administrator),
            99 => Ok(AccessLevel::Superuser),
            other => Err(format!("unknown access level {}", other)),
        }
    }
}

impl From<AccessLevel> for u16 {
    fn from(level: AccessLevel) -> Self {
        match level {
            AccessLevel::User => 1,
            AccessLevel::Moderator => 20,
            AccessLevel::Administrator => 30,
            AccessLevel::Superuser => 99,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccessLevel::User => "User",
            AccessLevel::Moderator => "Moderator",
            AccessLevel::Administrator => "Administrator",
            AccessLevel::Superuser => "Superuser",
        };
        write!(f, "{}", label)
    }
}

/// A user as returned by `GET /user/{pk}`.
///
/// `email`, `auth_token` and `verification_code` are only present when the
/// requester is looking at their own record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub pk: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub verification_code: Option<String>,
    pub is_active: bool,
    pub access_level: AccessLevel,
    pub nickname: String,
    pub timezone: String,
    pub language: String,
    pub date_created: String,
    #[serde(default)]
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
    pub pk: i64,
    pub verification_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub pk: i64,
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegeneratedToken {
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserList {
    pub users: Vec<UserRecord>,
}

/// Form body of `POST /user/create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub timezone: String,
    pub language: String,
    pub nickname: String,
}

/// Form body of `POST /user/edit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileEdit {
    pub email: String,
    pub nickname: String,
    pub timezone: String,
    pub language: String,
}

/// Validation failure codes attached to `INVALID_INPUT` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCode {
    Length,
    Characters,
    Email,
    Other(String),
}

impl From<&str> for FailureCode {
    fn from(code: &str) -> Self {
        match code {
            "LENGTH" => FailureCode::Length,
            "CHARACTERS" => FailureCode::Characters,
            "EMAIL" => FailureCode::Email,
            other => FailureCode::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: String,
    pub code: FailureCode,
}

/// Error body discriminated by its `reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    DuplicateKey { field: String },
    InvalidInput { fields: Vec<FieldFailure> },
    Unhandled { error: String },
    /// A reason this client does not know, or a body without one.
    Unknown { reason: String },
}

#[derive(Deserialize)]
struct RawFailure {
    reason: String,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    fields: Vec<(String, String)>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiFailure {
    pub fn from_body(body: &str) -> Self {
        let raw: RawFailure = match serde_json::from_str(body) {
            Ok(raw) => raw,
            Err(_) => {
                return ApiFailure::Unknown {
                    reason: "EMPTY_OR_INVALID_BODY".to_string(),
                }
            }
        };

        match raw.reason.as_str() {
            "DUPLICATE_KEY" => ApiFailure::DuplicateKey {
                field: raw.field.unwrap_or_default(),
            },
            "INVALID_INPUT" => ApiFailure::InvalidInput {
                fields: raw
                    .fields
                    .into_iter()
                    .map(|(field, code)| FieldFailure {
                        code: FailureCode::from(code.as_str()),
                        field,
                    })
                    .collect(),
            },
            "UNHANDLED_ERROR" => ApiFailure::Unhandled {
                error: raw.error.unwrap_or_default(),
            },
            _ => ApiFailure::Unknown { reason: raw.reason },
        }
    }

    /// Short label used in opaque fallback messages.
    pub fn reason(&self) -> &str {
        match self {
            ApiFailure::DuplicateKey { .. } => "DUPLICATE_KEY",
            ApiFailure::InvalidInput { .. } => "INVALID_INPUT",
            ApiFailure::Unhandled { .. } => "UNHANDLED_ERROR",
            ApiFailure::Unknown { reason } => reason,
        }
    }
}
