//! HTTP client implementation for the Google Fit REST API.
//!
//! This module provides a reqwest-based implementation of the
//! [`FitnessDataProvider`](crate::FitnessDataProvider) trait.

use crate::config::Config;
use crate::model::PLATFORM_PACKAGE;
use crate::observability;
use crate::retry::RetryPolicy;
use crate::{
    Account, DataReadRequest, DataReadResponse, DataSet, DataSource, DataType, FitError,
    FitnessDataProvider, Session, SessionReadRequest, SessionReadResponse,
};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Client for the Google Fit REST API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestFitnessClient {
    base_url: String,
    app_package: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl ReqwestFitnessClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g. "https://www.googleapis.com")
    /// * `timeout` - upper bound for every single HTTP call
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FitError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_package: None,
            retry: RetryPolicy::default(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FitError> {
        Ok(Self::new(&config.base_url, config.request_timeout)?
            .with_app_package(config.app_package.clone()))
    }

    pub fn with_app_package(mut self, app_package: Option<String>) -> Self {
        self.app_package = app_package;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build an authenticated GET request.
    fn get_request(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.get(url).bearer_auth(token)
    }

    /// Build an authenticated POST request.
    fn post_request(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.post(url).bearer_auth(token)
    }

    /// Execute a request and expect a JSON response, retrying transient failures.
    async fn execute_json<T, B>(&self, operation: &'static str, build: B) -> Result<T, FitError>
    where
        T: DeserializeOwned + Send,
        B: Fn() -> reqwest::RequestBuilder + Sync,
    {
        observability::record_request(operation);
        let result = self
            .retry
            .retry_async_when(
                || {
                    let request = build();
                    async move {
                        let resp = request.send().await?;
                        handle_response(resp).await
                    }
                },
                FitError::is_transient,
            )
            .await;
        if let Err(e) = &result {
            observability::record_failure(operation);
            tracing::warn!(operation, error = %e, "provider request failed");
        }
        result
    }

    fn keeps_session(&self, request: &SessionReadRequest, session: &Session) -> bool {
        let package = session.package_name();
        if !request.include_sessions && package == Some(PLATFORM_PACKAGE) {
            return false;
        }
        match (&self.app_package, request.all_apps) {
            (Some(own), false) => package == Some(own.as_str()),
            _ => true,
        }
    }

    /// One data set per requested type, read from the platform's merged stream
    /// over the session's own interval.
    async fn read_session_data(
        &self,
        token: &str,
        session: &Session,
        data_types: &[DataType],
    ) -> Result<Vec<DataSet>, FitError> {
        let start = session.start_millis.saturating_mul(1_000_000);
        let end = session.end_millis.saturating_mul(1_000_000);
        let mut data_sets = Vec::with_capacity(data_types.len());
        for data_type in data_types {
            let source = DataSource::merged(*data_type)?;
            let stream_id = source.stream_id();
            let url = format!(
                "{}/fitness/v1/users/me/dataSources/{}/datasets/{}-{}",
                self.base_url, stream_id, start, end
            );
            let mut data_set: DataSet = self
                .execute_json("read_dataset", || self.get_request(&url, token))
                .await?;
            if data_set.data_source_id.is_empty() {
                data_set.data_source_id = stream_id;
            }
            data_set.points.sort_by_key(|p| p.start_time_nanos);
            data_sets.push(data_set);
        }
        Ok(data_sets)
    }
}

#[derive(Deserialize)]
struct SessionsPayload {
    #[serde(default, rename = "session")]
    sessions: Vec<Session>,
}

#[async_trait]
impl FitnessDataProvider for ReqwestFitnessClient {
    async fn read_sessions(
        &self,
        account: &Account,
        request: &SessionReadRequest,
    ) -> Result<SessionReadResponse, FitError> {
        let token = account.bearer()?;
        let url = format!("{}/fitness/v1/users/me/sessions", self.base_url);
        let query = [
            ("startTime", request.window.start_rfc3339()),
            ("endTime", request.window.end_rfc3339()),
            ("includeDeleted", "false".to_string()),
        ];
        if !request.server_queries {
            tracing::debug!("REST session reads are always evaluated server-side");
        }

        let payload: SessionsPayload = self
            .execute_json("read_sessions", || {
                self.get_request(&url, token).query(&query)
            })
            .await?;
        let sessions: Vec<Session> = payload
            .sessions
            .into_iter()
            .filter(|s| self.keeps_session(request, s))
            .collect();
        tracing::debug!(sessions = sessions.len(), "sessions in window");

        let reads = sessions
            .iter()
            .map(|s| self.read_session_data(token, s, &request.data_types));
        let data_sets = try_join_all(reads).await?;

        Ok(SessionReadResponse {
            data_sets: sessions.iter().map(|s| s.id.clone()).zip(data_sets).collect(),
            sessions,
        })
    }

    async fn read_history(
        &self,
        account: &Account,
        request: &DataReadRequest,
    ) -> Result<DataReadResponse, FitError> {
        let token = account.bearer()?;
        let url = format!("{}/fitness/v1/users/me/dataset:aggregate", self.base_url);
        let body = serde_json::json!({
            // Aggregate by source alone; the source already names its data type.
            "aggregateBy": [{ "dataSourceId": request.aggregate.stream_id() }],
            "bucketByTime": { "durationMillis": request.bucket_width.num_milliseconds() },
            "startTimeMillis": request.window.start_millis(),
            "endTimeMillis": request.window.end_millis(),
        });
        self.execute_json("read_history", || {
            self.post_request(&url, token).json(&body)
        })
        .await
    }
}

/// Handle a response, converting status codes to appropriate errors.
pub(crate) async fn handle_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, FitError> {
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    // Read body as text first so decode errors can carry a snippet of it.
    let text = resp.text().await?;
    serde_json::from_str::<T>(&text).map_err(|e| {
        let body_snippet: String = text.chars().take(256).collect();
        FitError::Decode {
            what: std::any::type_name::<T>(),
            message: format!("{e} - body: {body_snippet}"),
        }
    })
}

/// Extract error information from a failed response.
pub(crate) async fn error_from_response(resp: reqwest::Response) -> FitError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let body_snippet: String = body.chars().take(256).collect();
    FitError::from_status(status, body_snippet)
}
