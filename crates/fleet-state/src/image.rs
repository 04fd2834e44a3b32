//! Container image references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    /// Everything before the first `:`.
    pub name: String,
    /// The reference as given, formatted `registry/name:tag`.
    pub full_name: String,
}

impl Image {
    /// Parse a `registry/name:tag` reference.
    ///
    /// The tag may be empty (`"img:"`), the name may not (`":tag"`).
    pub fn parse(full_name: &str) -> StateResult<Self> {
        let Some((name, _tag)) = full_name.split_once(':') else {
            return Err(StateError::InvalidReference(
                "separator \":\" not found".to_string(),
            ));
        };
        if name.is_empty() {
            return Err(StateError::InvalidReference("name not found".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            full_name: full_name.to_string(),
        })
    }

    /// Last path segment of the name (`registry/team/api` → `api`).
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl FromStr for Image {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}
