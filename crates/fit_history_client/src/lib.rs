//! Client side of the fitness history retriever: the data model returned by the
//! fitness provider, authorization scopes, the two provider seams
//! (`IdentityProvider`, `FitnessDataProvider`) and reqwest-based implementations.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod identity;
pub mod model;
pub mod observability;
pub mod reduce;
pub mod retry;
pub mod scope;
pub mod time_window;

pub use model::{
    Bucket, DataPoint, DataReadRequest, DataReadResponse, DataSet, DataSource, DataSourceKind,
    DataType, Field, FieldFormat, Session, SessionReadRequest, SessionReadResponse, Value,
};
pub use scope::{Access, AuthorizationOutcome, AuthorizationScope, Category, RequestCode};
pub use time_window::TimeWindow;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding {what}: {message}")]
    Decode { what: &'static str, message: String },
    #[error("consent channel closed")]
    ConsentUnavailable,
    #[error("empty {0} series")]
    EmptySeries(&'static str),
}

impl FitError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => FitError::NotFound(body),
            401 | 403 => FitError::Auth(body),
            400 | 422 => FitError::InvalidInput(body),
            _ => FitError::Status { status, body },
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FitError::Http(e) => e.is_timeout() || e.is_connect(),
            FitError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// The signed-in account a request is made on behalf of.
#[derive(Clone, Debug, Default)]
pub struct Account {
    pub email: Option<String>,
    pub access_token: Option<SecretString>,
}

impl Account {
    pub fn with_token(token: SecretString) -> Self {
        Self {
            email: None,
            access_token: Some(token),
        }
    }

    /// Bearer token for provider calls.
    pub fn bearer(&self) -> Result<&str, FitError> {
        self.access_token
            .as_ref()
            .map(|t| t.expose_secret())
            .ok_or_else(|| FitError::Auth("account has no access token".into()))
    }
}

/// Identity and consent collaborator.
///
/// `request_permissions` only launches the interactive flow; its outcome is
/// delivered out of band together with the same `RequestCode`.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn account_for_scope(&self, scope: &AuthorizationScope) -> Result<Account, FitError>;
    async fn has_permissions(
        &self,
        account: &Account,
        scope: &AuthorizationScope,
    ) -> Result<bool, FitError>;
    async fn request_permissions(
        &self,
        code: RequestCode,
        account: &Account,
        scope: &AuthorizationScope,
    ) -> Result<(), FitError>;
}

/// Fitness data collaborator.
#[async_trait]
pub trait FitnessDataProvider: Send + Sync + 'static {
    /// Read sessions in the request window together with their per-session data sets.
    async fn read_sessions(
        &self,
        account: &Account,
        request: &SessionReadRequest,
    ) -> Result<SessionReadResponse, FitError>;

    /// Read an aggregated, bucketed history series.
    async fn read_history(
        &self,
        account: &Account,
        request: &DataReadRequest,
    ) -> Result<DataReadResponse, FitError>;
}
