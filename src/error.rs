// src/error.rs
//! Error taxonomy shared by every production component.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudioError {
    /// The gateway call itself rejected (network or service error).
    #[error("Generation request failed: {0}")]
    FetchFailure(String),

    /// The gateway answered with data that failed structural validation.
    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),

    /// The gateway reported success but carried no usable payload.
    #[error("Generation returned no {0}")]
    MissingArtifact(String),

    /// The credential gating the gateway is absent, invalid or not entitled.
    #[error("A valid API credential is required: {0}")]
    CredentialRequired(String),

    /// An operation was invoked out of order.
    #[error("Operation not allowed: {0}")]
    PreconditionError(String),

    /// An artifact already marked successful could not be fetched at export time.
    #[error("Bundle assembly failed: {0}")]
    BundleAssemblyFailure(String),

    /// The work was abandoned because the workflow moved on (restart or re-selection).
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl StudioError {
    /// Errors the user can clear by re-triggering the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StudioError::FetchFailure(_)
                | StudioError::MalformedResponse(_)
                | StudioError::MissingArtifact(_)
        )
    }

    /// Errors that stop an in-progress user action instead of leaving a retry prompt.
    pub fn interrupts_user(&self) -> bool {
        matches!(
            self,
            StudioError::BundleAssemblyFailure(_) | StudioError::CredentialRequired(_)
        )
    }

    /// Message suitable for showing to the user. Malformed responses are
    /// presented the same way as plain fetch failures.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::FetchFailure(_) | StudioError::MalformedResponse(_) => {
                "The generation service did not return a usable result. Please try again.".to_string()
            }
            StudioError::MissingArtifact(what) => {
                format!("No {} was produced. Try regenerating it.", what)
            }
            StudioError::CredentialRequired(_) => {
                "This action needs an API key with billing enabled. Select a key and retry.".to_string()
            }
            StudioError::PreconditionError(reason) => reason.clone(),
            StudioError::BundleAssemblyFailure(reason) => {
                format!("Export failed: {}", reason)
            }
            StudioError::Cancelled(_) => "The operation was cancelled.".to_string(),
        }
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        StudioError::FetchFailure(err.to_string())
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        StudioError::MalformedResponse(err.to_string())
    }
}

impl From<zip::result::ZipError> for StudioError {
    fn from(err: zip::result::ZipError) -> Self {
        StudioError::BundleAssemblyFailure(err.to_string())
    }
}

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        StudioError::BundleAssemblyFailure(err.to_string())
    }
}

pub type StudioResult<T> = Result<T, StudioError>;
