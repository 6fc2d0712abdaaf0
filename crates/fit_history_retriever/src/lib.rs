//! Fitness data retriever: gates each fetch on the account's authorization,
//! resumes it when an interactive consent flow completes, and reduces the
//! provider's answers into heart-rate and step reports.

use std::sync::Arc;

use chrono::DateTime;
use fit_history_client::config::Config;
use fit_history_client::reduce::{
    daily_totals, heart_rate_samples, time_weighted_average, total_steps,
};
use fit_history_client::{
    Account, AuthorizationOutcome, AuthorizationScope, DataReadRequest, DataSource, DataType,
    FitnessDataProvider, IdentityProvider, RequestCode, SessionReadRequest,
};
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

pub mod clock;
pub mod error;
pub mod pending;
pub mod state;
mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{RetrieverError, RetrieverResult};
pub use pending::PendingRequests;
pub use state::{
    Gate, HeartRateReport, Pipeline, Report, Retrieval, RetrievalEvent, SeriesAverage,
    SessionHeartRate, StepReport,
};

const FETCH_OUTCOMES: &str = "fit_history_fetch_outcomes_total";

#[derive(Clone, Debug, PartialEq)]
pub struct RetrieverSettings {
    pub lookback_days: u32,
    pub bucket_width: chrono::Duration,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            lookback_days: fit_history_client::config::DEFAULT_LOOKBACK_DAYS,
            bucket_width: chrono::Duration::days(1),
        }
    }
}

impl RetrieverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lookback_days: config.lookback_days,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct FitnessDataRetriever {
    identity: Arc<dyn IdentityProvider>,
    fitness: Arc<dyn FitnessDataProvider>,
    settings: RetrieverSettings,
    clock: Arc<dyn Clock>,
    pending: PendingRequests,
    observer: Option<mpsc::UnboundedSender<RetrievalEvent>>,
}

impl FitnessDataRetriever {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        fitness: Arc<dyn FitnessDataProvider>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            identity,
            fitness,
            settings,
            clock: Arc::new(SystemClock),
            pending: PendingRequests::new(),
            observer: None,
        }
    }

    /// Publish every outcome on `tx` in addition to returning it.
    pub fn with_observer(mut self, tx: mpsc::UnboundedSender<RetrievalEvent>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Check whether the account holds `scope`; if not, launch the consent
    /// flow tagged with `code` and return without waiting for it.
    pub async fn ensure_authorized(
        &self,
        code: RequestCode,
        scope: &AuthorizationScope,
    ) -> RetrieverResult<Gate> {
        let account = self
            .identity
            .account_for_scope(scope)
            .await
            .map_err(RetrieverError::Identity)?;
        if self
            .identity
            .has_permissions(&account, scope)
            .await
            .map_err(RetrieverError::Identity)?
        {
            return Ok(Gate::Granted(account));
        }

        if !self.pending.insert(code).await {
            tracing::debug!(request_code = code.0, "authorization already pending");
            return Ok(Gate::Pending(code));
        }
        if let Err(e) = self
            .identity
            .request_permissions(code, &account, scope)
            .await
        {
            self.pending.remove(code).await;
            return Err(RetrieverError::Identity(e));
        }
        if let Some(pipeline) = Pipeline::from_code(code) {
            self.publish(RetrievalEvent::AuthorizationPending { pipeline, code });
        }
        Ok(Gate::Pending(code))
    }

    /// Average heart rate per session and data series over the lookback window.
    pub async fn fetch_heart_rate(&self) -> RetrieverResult<Retrieval<HeartRateReport>> {
        let pipeline = Pipeline::HeartRate;
        match self.gate(pipeline).await? {
            Gate::Pending(code) => Ok(Retrieval::PendingAuthorization(code)),
            Gate::Granted(account) => self.run_heart_rate(account).await.map(Retrieval::Ready),
        }
    }

    /// Total and daily steps over the lookback window.
    pub async fn fetch_steps(&self) -> RetrieverResult<Retrieval<StepReport>> {
        let pipeline = Pipeline::Steps;
        match self.gate(pipeline).await? {
            Gate::Pending(code) => Ok(Retrieval::PendingAuthorization(code)),
            Gate::Granted(account) => self.run_steps(account).await.map(Retrieval::Ready),
        }
    }

    /// Resumption channel for consent flows started by the gate.
    ///
    /// A granted outcome re-issues the matching fetch exactly once, without a
    /// second permission check. Codes that are unknown or no longer pending
    /// are ignored and yield `Ok(None)`.
    pub async fn on_authorization_result(
        &self,
        code: RequestCode,
        outcome: AuthorizationOutcome,
    ) -> RetrieverResult<Option<Report>> {
        let Some(pipeline) = Pipeline::from_code(code) else {
            tracing::debug!(request_code = code.0, "authorization result for another requester");
            return Ok(None);
        };
        if !self.pending.remove(code).await {
            tracing::warn!(request_code = code.0, "authorization result without pending request");
            return Ok(None);
        }
        if !outcome.is_granted() {
            tracing::info!(%pipeline, ?outcome, "authorization not granted");
            let err = RetrieverError::AuthorizationDenied { code, outcome };
            self.record_failure(pipeline, &err);
            return Err(err);
        }

        let account = match self.identity.account_for_scope(&pipeline.scope()).await {
            Ok(account) => account,
            Err(e) => {
                let err = RetrieverError::Identity(e);
                self.record_failure(pipeline, &err);
                return Err(err);
            }
        };
        let report = match pipeline {
            Pipeline::HeartRate => self.run_heart_rate(account).await.map(Report::HeartRate),
            Pipeline::Steps => self.run_steps(account).await.map(Report::Steps),
        };
        report.map(Some)
    }

    async fn gate(&self, pipeline: Pipeline) -> RetrieverResult<Gate> {
        let result = self.ensure_authorized(pipeline.code(), &pipeline.scope()).await;
        if let Err(e) = &result {
            self.record_failure(pipeline, e);
        }
        result
    }

    async fn run_heart_rate(&self, account: Account) -> RetrieverResult<HeartRateReport> {
        let span = tracing::info_span!(
            "fetch",
            pipeline = %Pipeline::HeartRate,
            cycle = %Uuid::new_v4()
        );
        let result = self.read_heart_rate(&account).instrument(span).await;
        self.settle(Pipeline::HeartRate, result, |r| RetrievalEvent::Ready {
            report: Report::HeartRate(r),
        })
    }

    async fn run_steps(&self, account: Account) -> RetrieverResult<StepReport> {
        let span = tracing::info_span!(
            "fetch",
            pipeline = %Pipeline::Steps,
            cycle = %Uuid::new_v4()
        );
        let result = self.read_steps(&account).instrument(span).await;
        self.settle(Pipeline::Steps, result, |r| RetrievalEvent::Ready {
            report: Report::Steps(r),
        })
    }

    async fn read_heart_rate(&self, account: &Account) -> RetrieverResult<HeartRateReport> {
        let window = self.clock.window(self.settings.lookback_days);
        let request = SessionReadRequest::builder(window)
            .include_activity_sessions()
            .enable_server_queries()
            .read_sessions_from_all_apps()
            .read(DataType::HEART_RATE_BPM)
            .build()
            .map_err(RetrieverError::InvalidRequest)?;
        let response = self
            .fitness
            .read_sessions(account, &request)
            .await
            .map_err(RetrieverError::provider("read_sessions"))?;

        let sessions = response
            .sessions
            .iter()
            .map(|session| {
                let series = response
                    .data_sets_for(session)
                    .iter()
                    .map(|data_set| {
                        let samples = heart_rate_samples(data_set);
                        let average_bpm = match time_weighted_average(&samples) {
                            Ok(avg) => Some(avg),
                            Err(e) => {
                                tracing::debug!(
                                    session = %session.id,
                                    error = %e,
                                    "no heart rate average"
                                );
                                None
                            }
                        };
                        SeriesAverage {
                            data_source_id: data_set.data_source_id.clone(),
                            sample_count: samples.len(),
                            average_bpm,
                        }
                    })
                    .collect();
                SessionHeartRate {
                    session_id: session.id.clone(),
                    name: session.name.clone(),
                    start: DateTime::from_timestamp_millis(session.start_millis)
                        .unwrap_or_default(),
                    end: DateTime::from_timestamp_millis(session.end_millis)
                        .unwrap_or_default(),
                    series,
                }
            })
            .collect::<Vec<_>>();
        tracing::info!(sessions = sessions.len(), "heart rate sessions reduced");
        Ok(HeartRateReport { window, sessions })
    }

    async fn read_steps(&self, account: &Account) -> RetrieverResult<StepReport> {
        let window = self.clock.window(self.settings.lookback_days);
        let request = DataReadRequest::aggregate(
            DataSource::estimated_steps(),
            self.settings.bucket_width,
            window,
        )
        .map_err(RetrieverError::InvalidRequest)?;
        let response = self
            .fitness
            .read_history(account, &request)
            .await
            .map_err(RetrieverError::provider("read_history"))?;

        let total_steps = total_steps(response.data_points()).ok();
        tracing::info!(buckets = response.buckets.len(), ?total_steps, "step history reduced");
        Ok(StepReport {
            window,
            total_steps,
            days: daily_totals(&response),
        })
    }

    /// Publish the outcome of a fetch cycle and hand it back to the caller.
    fn settle<T: Clone>(
        &self,
        pipeline: Pipeline,
        result: RetrieverResult<T>,
        ready: impl FnOnce(T) -> RetrievalEvent,
    ) -> RetrieverResult<T> {
        match result {
            Ok(value) => {
                metrics::counter!(
                    FETCH_OUTCOMES,
                    "pipeline" => pipeline.to_string(),
                    "outcome" => "ready"
                )
                .increment(1);
                self.publish(ready(value.clone()));
                Ok(value)
            }
            Err(e) => {
                self.record_failure(pipeline, &e);
                Err(e)
            }
        }
    }

    fn record_failure(&self, pipeline: Pipeline, error: &RetrieverError) {
        let outcome = match error {
            RetrieverError::AuthorizationDenied { .. } => "denied",
            _ => "failed",
        };
        metrics::counter!(FETCH_OUTCOMES, "pipeline" => pipeline.to_string(), "outcome" => outcome)
            .increment(1);
        if outcome == "failed" {
            tracing::warn!(%pipeline, error = %error, "fetch failed");
        }
        self.publish(RetrievalEvent::from_error(pipeline, error));
    }

    fn publish(&self, event: RetrievalEvent) {
        if let Some(tx) = &self.observer
            && tx.send(event).is_err()
        {
            tracing::debug!("retrieval observer dropped");
        }
    }
}
