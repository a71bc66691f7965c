//! Records stored in vector collections.
//!
//! A record is a bag of named scalar attributes plus one or more named
//! embedding fields. Typed views over the three collections live in
//! [`super::collections`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    /// Numeric view used for range comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A row of a vector collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key. `None` until the store assigns one for auto-id collections.
    pub id: Option<i64>,

    /// Scalar attributes by field name
    #[serde(default)]
    pub scalars: BTreeMap<String, FieldValue>,

    /// Embedding fields by field name
    #[serde(default)]
    pub vectors: BTreeMap<String, Vec<f32>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_scalar(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.scalars.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_vector(mut self, name: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(name.to_string(), vector);
        self
    }

    pub fn scalar(&self, name: &str) -> Option<&FieldValue> {
        self.scalars.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.scalar(name).and_then(FieldValue::as_i64)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.scalar(name).and_then(FieldValue::as_str)
    }

    pub fn vector(&self, name: &str) -> Option<&[f32]> {
        self.vectors.get(name).map(Vec::as_slice)
    }

    /// Copy of the record restricted to the given scalar fields, without vectors.
    ///
    /// An empty field list keeps every scalar.
    #[must_use]
    pub fn project(&self, output_fields: &[&str]) -> Self {
        let scalars = if output_fields.is_empty() {
            self.scalars.clone()
        } else {
            self.scalars
                .iter()
                .filter(|(name, _)| output_fields.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        };
        Self {
            id: self.id,
            scalars,
            vectors: BTreeMap::new(),
        }
    }
}
