use std::fmt;

use chrono::{DateTime, Utc};
use fit_history_client::reduce::DailyBucket;
use fit_history_client::{
    Account, AuthorizationOutcome, AuthorizationScope, DataType, RequestCode, TimeWindow,
};
use serde::Serialize;

use crate::error::RetrieverError;

/// The two independent fetch pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    HeartRate,
    Steps,
}

impl Pipeline {
    pub fn code(self) -> RequestCode {
        match self {
            Pipeline::HeartRate => RequestCode::SESSION_PERMISSIONS,
            Pipeline::Steps => RequestCode::HISTORY_PERMISSIONS,
        }
    }

    pub fn from_code(code: RequestCode) -> Option<Self> {
        [Pipeline::HeartRate, Pipeline::Steps]
            .into_iter()
            .find(|p| p.code() == code)
    }

    pub fn scope(self) -> AuthorizationScope {
        match self {
            Pipeline::HeartRate => AuthorizationScope::sessions(&[DataType::HEART_RATE_BPM]),
            Pipeline::Steps => AuthorizationScope::history(&[DataType::STEP_COUNT_DELTA]),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::HeartRate => f.write_str("heart_rate"),
            Pipeline::Steps => f.write_str("steps"),
        }
    }
}

/// Result of the authorization gate.
#[derive(Debug)]
pub enum Gate {
    Granted(Account),
    Pending(RequestCode),
}

/// Result of starting a fetch: either the report, or a pending consent flow
/// whose outcome has to be fed back through the resumption dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum Retrieval<T> {
    Ready(T),
    PendingAuthorization(RequestCode),
}

impl<T> Retrieval<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Retrieval::Ready(v) => Some(v),
            Retrieval::PendingAuthorization(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesAverage {
    pub data_source_id: String,
    pub sample_count: usize,
    /// Time-weighted average; `None` when the series had no samples.
    pub average_bpm: Option<f64>,
}

impl SeriesAverage {
    pub fn average(&self) -> Result<f64, RetrieverError> {
        self.average_bpm
            .ok_or(RetrieverError::EmptySeries("heart rate"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionHeartRate {
    pub session_id: String,
    pub name: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub series: Vec<SeriesAverage>,
}

/// Per-session, per-series averages. Series are never merged.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeartRateReport {
    pub window: TimeWindow,
    pub sessions: Vec<SessionHeartRate>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepReport {
    pub window: TimeWindow,
    /// `None` when the provider returned no step data points at all.
    pub total_steps: Option<i64>,
    pub days: Vec<DailyBucket>,
}

impl StepReport {
    pub fn total(&self) -> Result<i64, RetrieverError> {
        self.total_steps
            .ok_or(RetrieverError::EmptySeries("step count"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    HeartRate(HeartRateReport),
    Steps(StepReport),
}

/// Observable outcome of a fetch cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RetrievalEvent {
    AuthorizationPending {
        pipeline: Pipeline,
        code: RequestCode,
    },
    AuthorizationDenied {
        pipeline: Pipeline,
        code: RequestCode,
        outcome: AuthorizationOutcome,
    },
    Ready {
        report: Report,
    },
    Failed {
        pipeline: Pipeline,
        error: String,
    },
}

impl RetrievalEvent {
    pub(crate) fn from_error(pipeline: Pipeline, error: &RetrieverError) -> Self {
        match error {
            RetrieverError::AuthorizationDenied { code, outcome } => {
                RetrievalEvent::AuthorizationDenied {
                    pipeline,
                    code: *code,
                    outcome: *outcome,
                }
            }
            other => RetrievalEvent::Failed {
                pipeline,
                error: other.to_string(),
            },
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        match self {
            RetrievalEvent::AuthorizationPending { pipeline, .. }
            | RetrievalEvent::AuthorizationDenied { pipeline, .. }
            | RetrievalEvent::Failed { pipeline, .. } => *pipeline,
            RetrievalEvent::Ready {
                report: Report::HeartRate(_),
            } => Pipeline::HeartRate,
            RetrievalEvent::Ready {
                report: Report::Steps(_),
            } => Pipeline::Steps,
        }
    }

    /// Whether the pipeline is finished once this event is seen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetrievalEvent::AuthorizationPending { .. })
    }
}
