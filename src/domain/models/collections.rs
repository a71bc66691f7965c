//! Collection schemas and typed views over their records.
//!
//! Three collections are indexed: document chunks, lecture chunks and
//! projects. Every embedding field shares the process-wide dimension.

use serde::{Deserialize, Serialize};

use super::filter::FilterExpr;
use super::record::{FieldValue, Record};
use crate::domain::errors::{DomainError, DomainResult};

/// Default embedding dimension (all-MiniLM-L6-v2)
pub const DEFAULT_DIMENSION: usize = 384;

pub const DOCUMENTS: &str = "documents";
pub const LECTURES: &str = "lectures";
pub const PROJECTS: &str = "projects";

/// Field names shared by the collection schemas.
pub mod fields {
    pub const PROJECT_ID: &str = "project_id";
    pub const DOCUMENT_ID: &str = "document_id";
    pub const NAME: &str = "name";
    pub const VERSION: &str = "version";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const TEXT: &str = "text";
    pub const TEXT_EMBEDDING: &str = "text_embedding";

    pub const CONTENT: &str = "content";
    pub const DIFFICULTY: &str = "difficulty";
    pub const MIN_AGE: &str = "min_age";
    pub const MAX_AGE: &str = "max_age";
    pub const CREATOR_ID: &str = "creator_id";
    pub const NAME_EMBEDDING: &str = "name_embedding";
    pub const CONTENT_EMBEDDING: &str = "content_embedding";

    pub const DESCRIPTION: &str = "description";
    pub const BUDGET: &str = "budget";
    pub const PROJECT_TYPE: &str = "type";
    pub const DESCRIPTION_EMBEDDING: &str = "description_embedding";
}

/// Scalar column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int,
    Float,
    Varchar { max_length: usize },
}

/// A scalar column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarField {
    pub name: String,
    pub kind: ScalarKind,
}

impl ScalarField {
    fn int(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ScalarKind::Int,
        }
    }

    fn varchar(name: &str, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: ScalarKind::Varchar { max_length },
        }
    }
}

/// Layout of a vector collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,

    /// Whether the store assigns primary keys
    pub auto_id: bool,

    pub scalar_fields: Vec<ScalarField>,
    pub vector_fields: Vec<String>,
    pub dimension: usize,
}

impl CollectionSchema {
    pub fn documents(dimension: usize) -> Self {
        Self {
            name: DOCUMENTS.to_string(),
            auto_id: true,
            scalar_fields: vec![
                ScalarField::int(fields::PROJECT_ID),
                ScalarField::int(fields::DOCUMENT_ID),
                ScalarField::varchar(fields::NAME, 255),
                ScalarField::int(fields::VERSION),
                ScalarField::int(fields::CHUNK_INDEX),
                ScalarField::varchar(fields::TEXT, 65_535),
            ],
            vector_fields: vec![fields::TEXT_EMBEDDING.to_string()],
            dimension,
        }
    }

    pub fn lectures(dimension: usize) -> Self {
        Self {
            name: LECTURES.to_string(),
            auto_id: true,
            scalar_fields: vec![
                ScalarField::varchar(fields::NAME, 255),
                ScalarField::varchar(fields::CONTENT, 20_000),
                ScalarField::int(fields::DIFFICULTY),
                ScalarField::int(fields::MIN_AGE),
                ScalarField::int(fields::MAX_AGE),
                ScalarField::int(fields::CREATOR_ID),
                ScalarField::int(fields::CHUNK_INDEX),
            ],
            vector_fields: vec![
                fields::NAME_EMBEDDING.to_string(),
                fields::CONTENT_EMBEDDING.to_string(),
            ],
            dimension,
        }
    }

    pub fn projects(dimension: usize) -> Self {
        Self {
            name: PROJECTS.to_string(),
            auto_id: false,
            scalar_fields: vec![
                ScalarField::varchar(fields::NAME, 50),
                ScalarField::varchar(fields::DESCRIPTION, 500),
                ScalarField::int(fields::BUDGET),
                ScalarField::varchar(fields::PROJECT_TYPE, 8),
            ],
            vector_fields: vec![
                fields::NAME_EMBEDDING.to_string(),
                fields::DESCRIPTION_EMBEDDING.to_string(),
            ],
            dimension,
        }
    }

    /// The three collections the bot manages.
    pub fn all(dimension: usize) -> Vec<Self> {
        vec![
            Self::documents(dimension),
            Self::lectures(dimension),
            Self::projects(dimension),
        ]
    }

    pub fn has_scalar(&self, name: &str) -> bool {
        name == "id" || self.scalar_fields.iter().any(|f| f.name == name)
    }

    pub fn has_vector(&self, name: &str) -> bool {
        self.vector_fields.iter().any(|f| f == name)
    }

    /// Check a record against the schema before it is written.
    pub fn validate(&self, record: &Record) -> DomainResult<()> {
        if !self.auto_id && record.id.is_none() {
            return Err(DomainError::InvalidInput(format!(
                "collection '{}' requires an explicit id",
                self.name
            )));
        }

        for field in &self.scalar_fields {
            let value = record.scalar(&field.name).ok_or_else(|| {
                DomainError::InvalidInput(format!(
                    "missing field '{}' for collection '{}'",
                    field.name, self.name
                ))
            })?;
            let fits = match (field.kind, value) {
                (ScalarKind::Int, FieldValue::Int(_))
                | (ScalarKind::Float, FieldValue::Int(_) | FieldValue::Float(_)) => true,
                (ScalarKind::Varchar { max_length }, FieldValue::Str(s)) => {
                    if s.chars().count() > max_length {
                        return Err(DomainError::InvalidInput(format!(
                            "field '{}' exceeds {max_length} characters",
                            field.name
                        )));
                    }
                    true
                }
                _ => false,
            };
            if !fits {
                return Err(DomainError::InvalidInput(format!(
                    "field '{}' has the wrong type: {value:?}",
                    field.name
                )));
            }
        }

        if let Some(unknown) = record.scalars.keys().find(|name| !self.has_scalar(name)) {
            return Err(DomainError::InvalidInput(format!(
                "unknown field '{unknown}' for collection '{}'",
                self.name
            )));
        }

        for name in &self.vector_fields {
            let vector = record.vector(name).ok_or_else(|| {
                DomainError::InvalidInput(format!("missing embedding field '{name}'"))
            })?;
            if vector.len() != self.dimension {
                return Err(DomainError::InvalidInput(format!(
                    "embedding '{name}' has dimension {}, expected {}",
                    vector.len(),
                    self.dimension
                )));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(DomainError::InvalidInput(format!(
                    "embedding '{name}' contains non-finite values"
                )));
            }
        }

        if let Some(unknown) = record.vectors.keys().find(|name| !self.has_vector(name)) {
            return Err(DomainError::InvalidInput(format!(
                "unknown embedding field '{unknown}' for collection '{}'",
                self.name
            )));
        }

        Ok(())
    }
}

/// Identity of one version of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub project_id: i64,
    pub document_id: i64,
    pub version: i64,
}

impl DocumentKey {
    /// Filter selecting every chunk of this document version.
    pub fn filter(&self) -> FilterExpr {
        FilterExpr::all([
            FilterExpr::eq(fields::PROJECT_ID, self.project_id),
            FilterExpr::eq(fields::DOCUMENT_ID, self.document_id),
            FilterExpr::eq(fields::VERSION, self.version),
        ])
    }

    pub fn source_id(&self) -> String {
        format!("{}/{}@{}", self.project_id, self.document_id, self.version)
    }
}

/// One chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Option<i64>,
    pub project_id: i64,
    pub document_id: i64,
    pub name: String,
    pub version: i64,
    pub chunk_index: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_embedding: Vec<f32>,
}

impl DocumentChunk {
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            project_id: self.project_id,
            document_id: self.document_id,
            version: self.version,
        }
    }

    pub fn to_record(&self) -> Record {
        let record = Record::new()
            .with_scalar(fields::PROJECT_ID, self.project_id)
            .with_scalar(fields::DOCUMENT_ID, self.document_id)
            .with_scalar(fields::NAME, self.name.as_str())
            .with_scalar(fields::VERSION, self.version)
            .with_scalar(fields::CHUNK_INDEX, self.chunk_index)
            .with_scalar(fields::TEXT, self.text.as_str())
            .with_vector(fields::TEXT_EMBEDDING, self.text_embedding.clone());
        match self.id {
            Some(id) => record.with_id(id),
            None => record,
        }
    }

    pub fn from_record(record: &Record) -> DomainResult<Self> {
        Ok(Self {
            id: record.id,
            project_id: require_int(record, fields::PROJECT_ID)?,
            document_id: require_int(record, fields::DOCUMENT_ID)?,
            name: require_str(record, fields::NAME)?,
            version: require_int(record, fields::VERSION)?,
            chunk_index: require_index(record)?,
            text: require_str(record, fields::TEXT)?,
            text_embedding: optional_vector(record, fields::TEXT_EMBEDDING),
        })
    }
}

/// One chunk of a lecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LectureChunk {
    pub id: Option<i64>,
    pub name: String,
    pub content: String,
    pub difficulty: i64,
    pub min_age: i64,
    pub max_age: i64,
    pub creator_id: i64,
    pub chunk_index: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_embedding: Vec<f32>,
}

impl LectureChunk {
    pub fn to_record(&self) -> Record {
        let record = Record::new()
            .with_scalar(fields::NAME, self.name.as_str())
            .with_scalar(fields::CONTENT, self.content.as_str())
            .with_scalar(fields::DIFFICULTY, self.difficulty)
            .with_scalar(fields::MIN_AGE, self.min_age)
            .with_scalar(fields::MAX_AGE, self.max_age)
            .with_scalar(fields::CREATOR_ID, self.creator_id)
            .with_scalar(fields::CHUNK_INDEX, self.chunk_index)
            .with_vector(fields::NAME_EMBEDDING, self.name_embedding.clone())
            .with_vector(fields::CONTENT_EMBEDDING, self.content_embedding.clone());
        match self.id {
            Some(id) => record.with_id(id),
            None => record,
        }
    }

    pub fn from_record(record: &Record) -> DomainResult<Self> {
        Ok(Self {
            id: record.id,
            name: require_str(record, fields::NAME)?,
            content: require_str(record, fields::CONTENT)?,
            difficulty: require_int(record, fields::DIFFICULTY)?,
            min_age: require_int(record, fields::MIN_AGE)?,
            max_age: require_int(record, fields::MAX_AGE)?,
            creator_id: require_int(record, fields::CREATOR_ID)?,
            chunk_index: require_index(record)?,
            name_embedding: optional_vector(record, fields::NAME_EMBEDDING),
            content_embedding: optional_vector(record, fields::CONTENT_EMBEDDING),
        })
    }
}

/// A project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub budget: i64,
    #[serde(rename = "type")]
    pub project_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description_embedding: Vec<f32>,
}

impl Project {
    pub fn to_record(&self) -> Record {
        Record::new()
            .with_id(self.id)
            .with_scalar(fields::NAME, self.name.as_str())
            .with_scalar(fields::DESCRIPTION, self.description.as_str())
            .with_scalar(fields::BUDGET, self.budget)
            .with_scalar(fields::PROJECT_TYPE, self.project_type.as_str())
            .with_vector(fields::NAME_EMBEDDING, self.name_embedding.clone())
            .with_vector(
                fields::DESCRIPTION_EMBEDDING,
                self.description_embedding.clone(),
            )
    }

    pub fn from_record(record: &Record) -> DomainResult<Self> {
        Ok(Self {
            id: record
                .id
                .ok_or_else(|| DomainError::SerializationError("project record without id".into()))?,
            name: require_str(record, fields::NAME)?,
            description: require_str(record, fields::DESCRIPTION)?,
            budget: require_int(record, fields::BUDGET)?,
            project_type: require_str(record, fields::PROJECT_TYPE)?,
            name_embedding: optional_vector(record, fields::NAME_EMBEDDING),
            description_embedding: optional_vector(record, fields::DESCRIPTION_EMBEDDING),
        })
    }
}

fn require_int(record: &Record, field: &str) -> DomainResult<i64> {
    record
        .int(field)
        .ok_or_else(|| DomainError::SerializationError(format!("record lacks integer '{field}'")))
}

fn require_str(record: &Record, field: &str) -> DomainResult<String> {
    record
        .str(field)
        .map(ToString::to_string)
        .ok_or_else(|| DomainError::SerializationError(format!("record lacks string '{field}'")))
}

fn require_index(record: &Record) -> DomainResult<u32> {
    let raw = require_int(record, fields::CHUNK_INDEX)?;
    u32::try_from(raw).map_err(|_| {
        DomainError::SerializationError(format!("chunk index out of range: {raw}"))
    })
}

fn optional_vector(record: &Record, field: &str) -> Vec<f32> {
    record.vector(field).map(<[f32]>::to_vec).unwrap_or_default()
}
