use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_AUTHOR: &str = "author";
pub const ROLE_READER: &str = "reader";

/// Closed set of platform roles. Serialized lowercase in tokens and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Author,
    #[default]
    Reader,
}

pub const ROLE_HIERARCHY: [Role; 3] = [Role::Admin, Role::Author, Role::Reader];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::Author => ROLE_AUTHOR,
            Role::Reader => ROLE_READER,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            ROLE_ADMIN => Ok(Role::Admin),
            ROLE_AUTHOR => Ok(Role::Author),
            ROLE_READER => Ok(Role::Reader),
            _ => Err(UnknownRole(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" author ".parse::<Role>().unwrap(), Role::Author);
        assert!("cashier".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let value = serde_json::to_value(Role::Author).unwrap();
        assert_eq!(value, serde_json::json!("author"));
        for role in ROLE_HIERARCHY {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }
}
