use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::fetch::FetchError,
    domain::error::DomainError,
    infra::{archive::ArchiveLookupError, error::InfraError},
};

/// Flattened view of an error and its source chain, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the CLI: 2 for caller mistakes, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(DomainError::BlogNotFound { .. }) => 2,
            AppError::Infra(_) | AppError::Fetch(_) | AppError::Unexpected(_) => 1,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::BlogNotFound { .. }) => "Resource not found",
            AppError::Fetch(_) => "Entries temporarily unavailable",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) | AppError::Infra(InfraError::Archive { .. }) => {
                "Content archive could not be read"
            }
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

impl From<ArchiveLookupError> for AppError {
    fn from(error: ArchiveLookupError) -> Self {
        match error {
            ArchiveLookupError::Infra(err) => AppError::Infra(err),
            ArchiveLookupError::Domain(err) => AppError::Domain(err),
        }
    }
}
