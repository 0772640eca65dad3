//! Cache key definitions.
//!
//! `ArtifactKey` names what is stored in the schema cache table; the helper
//! functions build the composite strings that index the memory tiers.

use std::fmt;

use crate::domain::types::FacetType;

/// Field name under which facet discovery is stored in the facet cache table.
pub const FACETABLE_FIELDS: &str = "facetable_fields";

const CUSTOM_PREFIX: &str = "custom:";

/// Named, cacheable projection of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    /// The full schema snapshot.
    SchemaObject,
    /// Facet discovery for the schema.
    FacetableFields,
    /// The schema's `configuration` object.
    Configuration,
    /// The schema's `properties` object.
    Properties,
    /// Caller-defined artifact.
    Custom(String),
}

impl ArtifactKey {
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Value of the `cache_key` column.
    pub fn cache_key(&self) -> String {
        match self {
            ArtifactKey::SchemaObject => "schema_object".to_string(),
            ArtifactKey::FacetableFields => FACETABLE_FIELDS.to_string(),
            ArtifactKey::Configuration => "configuration".to_string(),
            ArtifactKey::Properties => "properties".to_string(),
            ArtifactKey::Custom(name) => format!("{CUSTOM_PREFIX}{name}"),
        }
    }

    /// Payload tag expected for rows stored under this key.
    pub fn artifact(&self) -> &'static str {
        match self {
            ArtifactKey::SchemaObject => "schema_object",
            ArtifactKey::FacetableFields => FACETABLE_FIELDS,
            ArtifactKey::Configuration => "configuration",
            ArtifactKey::Properties => "properties",
            ArtifactKey::Custom(_) => "custom",
        }
    }

    /// Memory-tier key, e.g. `schema_object_7`.
    pub fn memory_key(&self, schema_id: i64) -> String {
        format!("{}_{schema_id}", self.cache_key())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Memory-tier key of a schema's facet discovery, e.g. `facetable_fields_7`.
pub fn facetable_fields_key(schema_id: i64) -> String {
    ArtifactKey::FacetableFields.memory_key(schema_id)
}

/// Memory-tier key of a computed facet, e.g. `facet_terms_7_status`.
pub fn facet_result_key(schema_id: i64, facet_type: FacetType, field_name: &str) -> String {
    format!("facet_{}_{schema_id}_{field_name}", facet_type.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_keys_embed_the_schema_id() {
        assert_eq!(ArtifactKey::SchemaObject.memory_key(7), "schema_object_7");
        assert_eq!(ArtifactKey::Configuration.memory_key(7), "configuration_7");
        assert_eq!(ArtifactKey::Properties.memory_key(12), "properties_12");
        assert_eq!(facetable_fields_key(7), "facetable_fields_7");
        assert_eq!(ArtifactKey::FacetableFields.cache_key(), FACETABLE_FIELDS);
        assert_eq!(
            facet_result_key(7, FacetType::DateHistogram, "created"),
            "facet_date_histogram_7_created"
        );
    }

    #[test]
    fn custom_keys_cannot_shadow_builtin_artifacts() {
        let custom = ArtifactKey::custom("properties");
        assert_eq!(custom.cache_key(), "custom:properties");
        assert_ne!(custom.cache_key(), ArtifactKey::Properties.cache_key());
    }
}
