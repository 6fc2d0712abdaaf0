//! Error types for the retriever.

use fit_history_client::{AuthorizationOutcome, FitError, RequestCode};
use thiserror::Error;

/// Everything a single fetch cycle can end with besides a report.
#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("authorization {code} ended with {outcome:?}")]
    AuthorizationDenied {
        code: RequestCode,
        outcome: AuthorizationOutcome,
    },

    #[error("provider request {operation} failed: {source}")]
    ProviderRequestFailed {
        operation: &'static str,
        #[source]
        source: FitError,
    },

    #[error("identity provider error: {0}")]
    Identity(#[source] FitError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[source] FitError),

    #[error("empty {0} series")]
    EmptySeries(&'static str),
}

impl RetrieverError {
    pub(crate) fn provider(operation: &'static str) -> impl FnOnce(FitError) -> Self {
        move |source| RetrieverError::ProviderRequestFailed { operation, source }
    }
}

/// Result type alias for retriever operations.
pub type RetrieverResult<T> = Result<T, RetrieverError>;
