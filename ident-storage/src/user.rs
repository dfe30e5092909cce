use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(
    Debug,
    Default,
    Deserialize,
    Serialize,
    ToSchema,
    Validate,
    PartialEq,
    Clone,
)]
pub struct User {
    pub id: String,
    #[validate(length(min = 1, max = 191))]
    pub name: String,
    /// Stable identifier put into the `sub` claim of identity tokens.
    #[validate(email)]
    pub email: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Staff roles, highest privilege first.
#[derive(
    Debug,
    Default,
    Deserialize,
    Serialize,
    ToSchema,
    PartialEq,
    Eq,
    Clone,
    Copy,
)]
pub enum Role {
    Owner,
    Administrator,
    Editor,
    Author,
    #[default]
    Contributor,
}

impl Role {
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Administrator => "Administrator",
            Self::Editor => "Editor",
            Self::Author => "Author",
            Self::Contributor => "Contributor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Owner" => Ok(Self::Owner),
            "Administrator" => Ok(Self::Administrator),
            "Editor" => Ok(Self::Editor),
            "Author" => Ok(Self::Author),
            "Contributor" => Ok(Self::Contributor),
            _ => Err(format!("unknown role `{s}`")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub role: Option<Role>,
    pub email: Option<String>,
}

impl ListParams {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(role) = self.role {
            if user.role != role {
                return false;
            }
        }
        if let Some(ref email) = self.email {
            if !user.email.eq_ignore_ascii_case(email) {
                return false;
            }
        }
        true
    }
}
