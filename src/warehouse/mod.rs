//! Parameterized access to the analytics warehouse.
//!
//! Query text only ever contains table paths. Every value that comes from a
//! user or from a previous row travels as a named, typed parameter.

#[cfg(feature = "bigquery")]
pub mod bigquery;

#[cfg(feature = "bigquery")]
pub use bigquery::BigQueryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::Record;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WarehouseError {
    /// The warehouse service itself rejected or failed the call.
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    String,
    Int64,
}

impl ScalarType {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "STRING",
            ScalarType::Int64 => "INT64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    String(String),
    Int64(i64),
    /// A typed SQL `NULL`. Comparisons against it match no rows.
    Null(ScalarType),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::String(_) => ScalarType::String,
            ScalarValue::Int64(_) => ScalarType::Int64,
            ScalarValue::Null(ty) => *ty,
        }
    }

    /// The warehouse type name used when binding this value.
    pub fn type_name(&self) -> &'static str {
        self.scalar_type().name()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "{}", s),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Null(_) => write!(f, "NULL"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<Option<&str>> for ScalarValue {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(s) => ScalarValue::String(s.to_string()),
            None => ScalarValue::Null(ScalarType::String),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: ScalarValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterizedQuery {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

impl ParameterizedQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ScalarValue> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Anything that can run a parameterized query and hand back rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run(&self, query: &ParameterizedQuery) -> Result<Vec<Record>, WarehouseError>;
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for std::sync::Arc<T> {
    async fn run(&self, query: &ParameterizedQuery) -> Result<Vec<Record>, WarehouseError> {
        (**self).run(query).await
    }
}
