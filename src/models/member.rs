//! Member record as served by the read endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DirectoryError;

/// Status label shown when a member carries no status.
pub const DEFAULT_STATUS: &str = "Active";

/// A single directory entry.
///
/// Optional strings keep `None` and `Some("")` apart: an absent link hides the
/// corresponding affordance, an empty one is passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    /// Raw role tag; see [`Member::role_category`] for the display category.
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skills: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub github_handle: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Check the invariants the rest of the directory relies on.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.id.is_empty() {
            return Err(DirectoryError::Decode("member id is empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(DirectoryError::Decode(format!(
                "member {} has an empty name",
                self.id
            )));
        }
        Ok(())
    }

    /// Display category of the raw role tag.
    pub fn role_category(&self) -> RoleCategory {
        RoleCategory::from_role(&self.role)
    }

    /// Status label with the `Active` default applied.
    pub fn status_label(&self) -> &str {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STATUS)
    }
}

/// Known role categories. Unknown roles fall into [`RoleCategory::Member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleCategory {
    Lead,
    Member,
    Alumni,
}

impl RoleCategory {
    pub fn from_role(role: &str) -> Self {
        match role {
            "Lead" => RoleCategory::Lead,
            "Alumni" => RoleCategory::Alumni,
            _ => RoleCategory::Member,
        }
    }
}

/// Body of `GET /members`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<Member>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
