use std::fmt::{Display, Formatter};
use std::str::FromStr;

use recordgate_core::AppError;
use serde::{Deserialize, Serialize};

/// Operations a policy type may authorize on its target entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read access to a target entity.
    View,
    /// Modify access to a target entity.
    Update,
    /// Delete access to a target entity.
    Delete,
    /// Create access for new target entities.
    Create,
}

impl Operation {
    /// Returns a stable storage value for the operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Create => "create",
        }
    }

    /// Returns all known operations.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Operation] = &[
            Operation::View,
            Operation::Update,
            Operation::Delete,
            Operation::Create,
        ];

        ALL
    }
}

impl FromStr for Operation {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "view" => Ok(Self::View),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "create" => Ok(Self::Create),
            _ => Err(AppError::Validation(format!("unknown operation '{value}'"))),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}
