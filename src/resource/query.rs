//! Query seam
//!
//! The resolver never talks to Azure directly. It asks a [`QuerySource`]
//! for the raw documents behind a [`QueryTarget`], which keeps the
//! expansion logic testable without a live tenant.

use crate::azure::QueryError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Sentinel id requesting every resource visible to the account
pub const ALL_RESOURCES: &str = "all";

/// What a single query asks for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTarget {
    /// Every resource (the `all` sentinel)
    All,
    /// Exactly one resource id
    Id(String),
}

impl QueryTarget {
    /// Parse a user-supplied id. `all` is matched case-insensitively.
    pub fn parse(id: &str) -> Self {
        if id.eq_ignore_ascii_case(ALL_RESOURCES) {
            Self::All
        } else {
            Self::Id(id.to_string())
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_RESOURCES),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// Something that can answer resource graph queries
///
/// Implementations return every row matching the target. An empty vector
/// means "not found" and is not an error.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn query(&self, target: &QueryTarget) -> Result<Vec<Value>, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sentinel_is_case_insensitive() {
        assert_eq!(QueryTarget::parse("all"), QueryTarget::All);
        assert_eq!(QueryTarget::parse("ALL"), QueryTarget::All);
        assert_eq!(QueryTarget::parse("All"), QueryTarget::All);
        assert!(QueryTarget::parse("aLl").is_all());
    }

    #[test]
    fn test_regular_id_is_kept_verbatim() {
        let id = "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1";
        assert_eq!(QueryTarget::parse(id), QueryTarget::Id(id.to_string()));
        assert_eq!(QueryTarget::parse(id).to_string(), id);
        assert!(!QueryTarget::parse("allowed").is_all());
    }
}
