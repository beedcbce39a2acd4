//! Error types for the UpCloud image builder

use crate::duration::DurationError;
use std::fmt;
use thiserror::Error;

/// Main error type for the image builder
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Raw configuration could not be decoded
    #[error("Configuration decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Decoded configuration failed one or more validation rules
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// Build definition file missing
    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: String },

    /// API client construction errors
    #[error("API client error: {0}")]
    Client(String),
}

/// Result type alias for image builder operations
pub type Result<T> = std::result::Result<T, BuilderError>;

/// Structural errors raised while decoding raw configuration.
///
/// Decoding is the one fail-fast stage: a `DecodeError` is never aggregated
/// with validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A raw input was not a key/value map
    #[error("expected a map of configuration values, got {found}")]
    NotAMap { found: String },

    /// A key that no part of the configuration consumes
    #[error("unknown configuration key: {key:?}")]
    UnknownKey { key: String },

    /// Raw inputs could not be merged
    #[error("failed to merge configuration: {0}")]
    Merge(String),

    /// A template expression could not be rendered
    #[error("error interpolating {field}: {message}")]
    Interpolation { field: String, message: String },

    /// A value had the wrong type for its field
    #[error("failed to decode configuration: {0}")]
    Type(String),
}

/// A single violated validation rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field left empty
    #[error("\"{field}\" must be specified")]
    MissingField { field: String },

    /// Referenced file does not exist on disk
    #[error("{field} does not exist")]
    FileNotFound { field: String },

    /// Duration string could not be parsed
    #[error("Failed to parse {field}: {source}")]
    InvalidDuration { field: String, source: DurationError },

    /// Field set to a value outside what is accepted
    #[error("{field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Name of the configuration key this error refers to
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::FileNotFound { field }
            | ValidationError::InvalidDuration { field, .. }
            | ValidationError::InvalidValue { field, .. } => field,
        }
    }

    pub fn missing(field: &str) -> Self {
        ValidationError::MissingField {
            field: field.to_string(),
        }
    }

    pub fn file_not_found(field: &str) -> Self {
        ValidationError::FileNotFound {
            field: field.to_string(),
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Every validation error produced by a single load attempt, in the order the
/// checks ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Errors referring to the given field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.0.iter().filter(move |e| e.field() == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.0.len() == 1 { "error" } else { "errors" };
        write!(f, "{} {} occurred:", self.0.len(), noun)?;
        for error in &self.0 {
            write!(f, "\n* {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl Extend<ValidationError> for ValidationErrors {
    fn extend<I: IntoIterator<Item = ValidationError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
