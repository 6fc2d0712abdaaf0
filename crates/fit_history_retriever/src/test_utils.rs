//! Mock identity and fitness providers shared by the retriever's unit tests.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};
use fit_history_client::{
    Account, AuthorizationScope, Bucket, DataPoint, DataReadRequest, DataReadResponse, DataSet,
    DataType, FitError, FitnessDataProvider, IdentityProvider, RequestCode, Session,
    SessionReadRequest, SessionReadResponse, Value,
};
use secrecy::SecretString;
use tokio::sync::Mutex;

use crate::clock::FixedClock;

/// 2024-06-15T12:00:00Z.
pub fn fixed_clock() -> Arc<FixedClock> {
    let now = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
        .unwrap();
    Arc::new(FixedClock(now))
}

/// Identity provider whose grant state is flipped by the test.
#[derive(Default)]
pub struct MockIdentity {
    pub granted: AtomicBool,
    pub fail_launch: AtomicBool,
    pub checks: AtomicUsize,
    pub launched: Mutex<Vec<RequestCode>>,
}

impl MockIdentity {
    pub fn granted() -> Arc<Self> {
        let mock = Self::default();
        mock.granted.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn not_granted() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn launched(&self) -> Vec<RequestCode> {
        self.launched.lock().await.clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn account_for_scope(&self, _scope: &AuthorizationScope) -> Result<Account, FitError> {
        Ok(Account::with_token(SecretString::new("mock-token".into())))
    }

    async fn has_permissions(
        &self,
        _account: &Account,
        _scope: &AuthorizationScope,
    ) -> Result<bool, FitError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn request_permissions(
        &self,
        code: RequestCode,
        _account: &Account,
        _scope: &AuthorizationScope,
    ) -> Result<(), FitError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(FitError::ConsentUnavailable);
        }
        self.launched.lock().await.push(code);
        Ok(())
    }
}

/// Fitness provider answering with canned responses.
#[derive(Default)]
pub struct MockFitness {
    pub sessions: SessionReadResponse,
    pub history: DataReadResponse,
    pub fail_with_status: Option<u16>,
    pub session_reads: AtomicUsize,
    pub history_reads: AtomicUsize,
    pub last_session_request: Mutex<Option<SessionReadRequest>>,
    pub last_history_request: Mutex<Option<DataReadRequest>>,
}

impl MockFitness {
    /// One session with heart rate 60, 70, 80 at one-minute spacing.
    pub fn with_heart_rate() -> Self {
        let points = [(0, 60.0), (60_000, 70.0), (120_000, 80.0)]
            .into_iter()
            .map(|(t, bpm)| {
                DataPoint::new(&DataType::HEART_RATE_BPM, t, t, vec![Value::float(bpm)])
            })
            .collect();
        let session = Session {
            id: "run-1".into(),
            name: Some("Morning run".into()),
            start_millis: 0,
            end_millis: 120_000,
            ..Session::default()
        };
        let mut data_sets = HashMap::new();
        data_sets.insert(
            session.id.clone(),
            vec![DataSet {
                data_source_id:
                    "derived:com.google.heart_rate.bpm:com.google.android.gms:merge_heart_rate_bpm"
                        .into(),
                points,
            }],
        );
        Self {
            sessions: SessionReadResponse {
                sessions: vec![session],
                data_sets,
            },
            ..Self::default()
        }
    }

    /// Step deltas 100, 150 and 200 across two daily buckets.
    pub fn with_steps() -> Self {
        let day = 86_400_000;
        let bucket = |start: i64, steps: &[i64]| Bucket {
            start_millis: start,
            end_millis: start + day,
            data_sets: vec![DataSet {
                data_source_id: "estimated_steps".into(),
                points: steps
                    .iter()
                    .map(|s| {
                        DataPoint::new(
                            &DataType::STEP_COUNT_DELTA,
                            start,
                            start + 1,
                            vec![Value::int(*s)],
                        )
                    })
                    .collect(),
            }],
        };
        Self {
            history: DataReadResponse {
                buckets: vec![bucket(0, &[100, 150]), bucket(day, &[200])],
            },
            ..Self::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_with_status: Some(status),
            ..Self::default()
        }
    }

    fn failure(&self) -> Result<(), FitError> {
        match self.fail_with_status {
            Some(status) => Err(FitError::from_status(status, "mock failure".into())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FitnessDataProvider for MockFitness {
    async fn read_sessions(
        &self,
        _account: &Account,
        request: &SessionReadRequest,
    ) -> Result<SessionReadResponse, FitError> {
        self.session_reads.fetch_add(1, Ordering::SeqCst);
        *self.last_session_request.lock().await = Some(request.clone());
        self.failure()?;
        Ok(self.sessions.clone())
    }

    async fn read_history(
        &self,
        _account: &Account,
        request: &DataReadRequest,
    ) -> Result<DataReadResponse, FitError> {
        self.history_reads.fetch_add(1, Ordering::SeqCst);
        *self.last_history_request.lock().await = Some(request.clone());
        self.failure()?;
        Ok(self.history.clone())
    }
}
