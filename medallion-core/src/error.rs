//! Error types for the Medallion engine.
//!
//! Separates "bad configuration" (fatal, aborts the job) from "bad data",
//! which never surfaces here: unparsable cells are nulled by the operators.

use std::path::PathBuf;

/// Top-level error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A structurally valid spec carries a semantically invalid value.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A referenced column is absent at the point of use.
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// A computed-column expression could not be parsed, typed or bound.
    #[error("Formula error in '{formula}': {message}")]
    Formula { formula: String, message: String },

    /// A required input table or file is absent.
    #[error("Not found: {location}")]
    NotFound { location: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    /// Shorthand for the most common schema failure.
    pub fn missing_column(column: &str) -> Self {
        Self::Schema {
            message: format!("column '{column}' not found"),
        }
    }

    pub fn formula(formula: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Formula {
            formula: formula.into(),
            message: msg.into(),
        }
    }

    pub fn not_found(location: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            location: location.into(),
        }
    }

    /// True for errors caused by the job spec rather than by I/O or data.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Formula { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::config("unknown output mode: upsert");
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown output mode: upsert"
        );

        let err = EngineError::missing_column("Qty");
        assert_eq!(err.to_string(), "Schema error: column 'Qty' not found");

        let err = EngineError::formula("a +", "unexpected end of expression");
        assert_eq!(
            err.to_string(),
            "Formula error in 'a +': unexpected end of expression"
        );
    }

    #[test]
    fn test_is_configuration() {
        assert!(EngineError::config("x").is_configuration());
        assert!(EngineError::formula("x", "y").is_configuration());
        assert!(!EngineError::missing_column("x").is_configuration());
        assert!(!EngineError::not_found("a/b.parquet").is_configuration());
    }
}
