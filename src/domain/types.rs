//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mutation that can make cached schema artifacts stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
    BulkSave,
    BulkDelete,
    BulkPublish,
    BulkDepublish,
}

impl MutationOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationOperation::Create => "create",
            MutationOperation::Update => "update",
            MutationOperation::Delete => "delete",
            MutationOperation::BulkSave => "bulk_save",
            MutationOperation::BulkDelete => "bulk_delete",
            MutationOperation::BulkPublish => "bulk_publish",
            MutationOperation::BulkDepublish => "bulk_depublish",
        }
    }

    /// Bulk operations touch objects, never schema definitions.
    pub fn is_bulk(self) -> bool {
        matches!(
            self,
            MutationOperation::BulkSave
                | MutationOperation::BulkDelete
                | MutationOperation::BulkPublish
                | MutationOperation::BulkDepublish
        )
    }
}

impl fmt::Display for MutationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of facet entry held by the facet cache.
///
/// `Config` rows hold discovery metadata (which fields are facetable); the
/// other kinds hold computed aggregation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetType {
    Terms,
    DateHistogram,
    Range,
    Config,
}

impl FacetType {
    pub const ALL: [FacetType; 4] = [
        FacetType::Terms,
        FacetType::DateHistogram,
        FacetType::Range,
        FacetType::Config,
    ];

    pub const RESULTS: [FacetType; 3] =
        [FacetType::Terms, FacetType::DateHistogram, FacetType::Range];

    pub fn as_str(self) -> &'static str {
        match self {
            FacetType::Terms => "terms",
            FacetType::DateHistogram => "date_histogram",
            FacetType::Range => "range",
            FacetType::Config => "config",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn is_result(self) -> bool {
        !matches!(self, FacetType::Config)
    }
}

impl fmt::Display for FacetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_operations_are_flagged() {
        assert!(MutationOperation::BulkSave.is_bulk());
        assert!(MutationOperation::BulkDepublish.is_bulk());
        assert!(!MutationOperation::Update.is_bulk());
        assert!(!MutationOperation::Delete.is_bulk());
    }

    #[test]
    fn operation_serializes_as_snake_case() {
        let json = serde_json::to_string(&MutationOperation::BulkPublish).expect("serialize");
        assert_eq!(json, "\"bulk_publish\"");
        assert_eq!(MutationOperation::BulkPublish.to_string(), "bulk_publish");
    }

    #[test]
    fn facet_type_parses_persisted_names() {
        for kind in FacetType::ALL {
            assert_eq!(FacetType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FacetType::parse("histogram"), None);
        assert!(!FacetType::Config.is_result());
        assert!(FacetType::RESULTS.iter().all(|kind| kind.is_result()));
    }
}
