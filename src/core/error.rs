use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    #[error("Network error on {target}: {message}")]
    Network {
        target: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Record '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Operation already in progress: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl<T> From<std::sync::PoisonError<T>> for DashboardError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl DashboardError {
    pub fn network(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            target: target.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn http_status(target: impl Into<String>, status: u16) -> Self {
        Self::Network {
            target: target.into(),
            status: Some(status),
            message: format!("HTTP {status}"),
        }
    }

    pub fn not_found(collection: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.to_string(),
        }
    }

    /// Discriminator handed to the rendering layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::NotFound { .. } | Self::CollectionNotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidRelation(_) => ErrorKind::InvalidRelation,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Lock(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Errors the join layer downgrades to `null` / `[]` instead of aborting.
    pub fn is_recoverable_for_relation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::NotFound
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            fields: match self {
                Self::Validation(fields) => Some(fields.clone()),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    NotFound,
    Conflict,
    Validation,
    InvalidRelation,
    InvalidInput,
    Forbidden,
    Internal,
}

/// Plain error object for toasts and banners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

/// Field name to message map produced by input validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`; the first message per field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, message) in other.0 {
            self.add(field, message);
        }
    }

    /// `Ok(())` when empty, otherwise the errors themselves.
    pub fn into_result(self) -> std::result::Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl From<FieldErrors> for DashboardError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}
