//! Search requests and results.

use serde::{Deserialize, Serialize};

use super::filter::FilterExpr;
use super::record::Record;
use crate::domain::errors::{DomainError, DomainResult};

/// Default `nprobe` for IVF searches
pub const DEFAULT_NPROBE: u32 = 12;

/// One approximate nearest neighbour search over one embedding field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnSearchRequest {
    /// Embedding field to search
    pub field: String,

    /// Query vector
    pub vector: Vec<f32>,

    /// Number of IVF clusters probed
    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    /// Candidate limit for this request
    pub limit: usize,

    #[serde(default)]
    pub filter: Option<FilterExpr>,

    /// Scalar fields returned with each hit; empty returns all of them
    #[serde(default)]
    pub output_fields: Vec<String>,
}

const fn default_nprobe() -> u32 {
    DEFAULT_NPROBE
}

impl AnnSearchRequest {
    pub fn new(field: &str, vector: Vec<f32>, limit: usize) -> Self {
        Self {
            field: field.to_string(),
            vector,
            nprobe: DEFAULT_NPROBE,
            limit,
            filter: None,
            output_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_nprobe(mut self, nprobe: u32) -> Self {
        self.nprobe = nprobe;
        self
    }

    #[must_use]
    pub fn with_output_fields(mut self, fields: &[&str]) -> Self {
        self.output_fields = fields.iter().map(ToString::to_string).collect();
        self
    }

    pub fn output_field_refs(&self) -> Vec<&str> {
        self.output_fields.iter().map(String::as_str).collect()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.limit == 0 {
            return Err(DomainError::ValidationFailed(
                "search limit must be at least 1".to_string(),
            ));
        }
        if self.vector.is_empty() {
            return Err(DomainError::ValidationFailed(
                "query vector is empty".to_string(),
            ));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// A single search hit. Lower distance is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub distance: f32,
    pub record: Record,
}

/// Server-side paged search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorRequest {
    pub field: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    pub batch_size: usize,
    /// Total records the cursor may ever yield
    pub limit: usize,
    #[serde(default)]
    pub output_fields: Vec<String>,
}

impl IteratorRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.batch_size == 0 {
            return Err(DomainError::ValidationFailed(
                "iterator batch size must be at least 1".to_string(),
            ));
        }
        if self.vector.is_empty() {
            return Err(DomainError::ValidationFailed(
                "query vector is empty".to_string(),
            ));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Sort key for scalar queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }
}

/// Scalar-only query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub filter: FilterExpr,
    #[serde(default)]
    pub output_fields: Vec<String>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryRequest {
    pub fn new(filter: FilterExpr) -> Self {
        Self {
            filter,
            output_fields: Vec::new(),
            sort: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn sorted_by(mut self, keys: &[&str]) -> Self {
        self.sort = keys.iter().map(|k| SortKey::asc(k)).collect();
        self
    }

    #[must_use]
    pub fn with_output_fields(mut self, fields: &[&str]) -> Self {
        self.output_fields = fields.iter().map(ToString::to_string).collect();
        self
    }
}

/// Result of a paged retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagedResults {
    pub hits: Vec<SearchHit>,
    /// Non-empty batches fetched from the cursor
    pub batches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(AnnSearchRequest::new("v", vec![1.0], 1).validate().is_ok());
        assert!(AnnSearchRequest::new("v", vec![1.0], 0).validate().is_err());
        assert!(AnnSearchRequest::new("v", vec![], 1).validate().is_err());
        assert!(AnnSearchRequest::new("v", vec![1.0], 1)
            .with_filter(FilterExpr::eq("bad field", 1_i64))
            .validate()
            .is_err());
    }

    #[test]
    fn test_nprobe_defaults_when_missing() {
        let request: AnnSearchRequest =
            serde_json::from_str(r#"{"field":"v","vector":[0.5],"limit":3}"#).unwrap();
        assert_eq!(request.nprobe, DEFAULT_NPROBE);
        assert!(request.filter.is_none());
    }
}
