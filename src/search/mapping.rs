//! Index mapping applied when the scan indices are created

use crate::search::error::{SearchError, SearchResult};
use serde_json::Value;
use std::path::Path;

const BUNDLED_MAPPING: &str = include_str!("../../config/elastic_mapping.json");

/// Field-type schema for the scan indices
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMapping {
    body: Value,
}

impl IndexMapping {
    /// Load the mapping from `path`, or the bundled one when `path` is `None`
    pub fn load(path: Option<&Path>) -> SearchResult<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    SearchError::Mapping(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::parse(&text)
            }
            None => Self::bundled(),
        }
    }

    /// The mapping shipped with the crate
    pub fn bundled() -> SearchResult<Self> {
        Self::parse(BUNDLED_MAPPING)
    }

    fn parse(text: &str) -> SearchResult<Self> {
        let body: Value = serde_json::from_str(text)
            .map_err(|e| SearchError::Mapping(format!("Invalid mapping JSON: {}", e)))?;

        if body.get("mappings").and_then(Value::as_object).is_none() {
            return Err(SearchError::Mapping(
                "mapping has no \"mappings\" object".to_string(),
            ));
        }

        Ok(Self { body })
    }

    /// Request body for index creation
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Declared type of a top-level field
    pub fn field_type(&self, field: &str) -> Option<&str> {
        self.body
            .get("mappings")?
            .get("properties")?
            .get(field)?
            .get("type")?
            .as_str()
    }
}
