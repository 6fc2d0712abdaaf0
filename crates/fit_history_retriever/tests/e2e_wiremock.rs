//! End-to-end retrieval cycles with the real OAuth and REST providers talking
//! to a mock Google Fit backend.

use std::sync::Arc;

use chrono::{FixedOffset, TimeZone};
use fit_history_client::AuthorizationOutcome;
use fit_history_client::config::Config;
use fit_history_client::http_client::ReqwestFitnessClient;
use fit_history_client::identity::{ConsentRequest, OAuthIdentityProvider};
use fit_history_retriever::{
    FitnessDataRetriever, FixedClock, Pipeline, Report, Retrieval, RetrievalEvent, RetrieverError,
    RetrieverSettings,
};
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALL_FITNESS_SCOPES: &str = "https://www.googleapis.com/auth/fitness.activity.read https://www.googleapis.com/auth/fitness.heart_rate.read";

struct Harness {
    retriever: FitnessDataRetriever,
    identity: Arc<OAuthIdentityProvider>,
    consents: mpsc::UnboundedReceiver<ConsentRequest>,
    events: mpsc::UnboundedReceiver<RetrievalEvent>,
}

fn harness(server: &MockServer, token: Option<&str>) -> Harness {
    let uri = server.uri();
    let token = token.map(str::to_string);
    let config = Config::from_env_with(move |k| match k {
        "FIT_HISTORY_CLIENT_ID" => Some("client-1".into()),
        "FIT_HISTORY_BASE_URL" => Some(uri.clone()),
        "FIT_HISTORY_TOKEN_URL" => Some(format!("{uri}/token")),
        "FIT_HISTORY_TOKENINFO_URL" => Some(format!("{uri}/tokeninfo")),
        "FIT_HISTORY_TIMEOUT_SECS" => Some("5".into()),
        "FIT_HISTORY_ACCESS_TOKEN" => token.clone(),
        _ => None,
    })
    .expect("config");

    let (consent_tx, consents) = mpsc::unbounded_channel();
    let identity = Arc::new(OAuthIdentityProvider::new(&config, consent_tx).expect("identity"));
    let fitness = Arc::new(ReqwestFitnessClient::from_config(&config).expect("client"));
    let (event_tx, events) = mpsc::unbounded_channel();
    let now = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
        .unwrap();
    let retriever = FitnessDataRetriever::new(
        identity.clone(),
        fitness,
        RetrieverSettings::from_config(&config),
    )
    .with_clock(Arc::new(FixedClock(now)))
    .with_observer(event_tx);

    Harness {
        retriever,
        identity,
        consents,
        events,
    }
}

async fn mount_tokeninfo(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("access_token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scope": ALL_FITNESS_SCOPES,
            "email": "runner@example.com"
        })))
        .mount(server)
        .await;
}

async fn mount_step_history(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/fitness/v1/users/me/dataset:aggregate"))
        .and(body_string_contains("estimated_steps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucket": [
                {"startTimeMillis": "1717545600000", "endTimeMillis": "1717632000000", "dataset": [{"dataSourceId": "derived:com.google.step_count.delta:com.google.android.gms:aggregated", "point": [
                    {"startTimeNanos": "1717545600000000000", "endTimeNanos": "1717549200000000000", "dataTypeName": "com.google.step_count.delta", "value": [{"intVal": 100}]},
                    {"startTimeNanos": "1717549200000000000", "endTimeNanos": "1717552800000000000", "dataTypeName": "com.google.step_count.delta", "value": [{"intVal": 150}]}
                ]}]},
                {"startTimeMillis": "1717632000000", "endTimeMillis": "1717718400000", "dataset": [{"dataSourceId": "derived:com.google.step_count.delta:com.google.android.gms:aggregated", "point": [
                    {"startTimeNanos": "1717632000000000000", "endTimeNanos": "1717635600000000000", "dataTypeName": "com.google.step_count.delta", "value": [{"intVal": 200}]}
                ]}]}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn authorized_account_gets_heart_rate_average() {
    let server = MockServer::start().await;
    mount_tokeninfo(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/fitness/v1/users/me/sessions"))
        .and(query_param("startTime", "2024-06-05T00:00:00.000Z"))
        .and(query_param("endTime", "2024-06-15T12:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "session": [{
                "id": "walk-1",
                "name": "Evening walk",
                "startTimeMillis": "1718000000000",
                "endTimeMillis": "1718000120000",
                "application": {"packageName": "com.example.tracker"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(
            r"^/fitness/v1/users/me/dataSources/derived:com\.google\.heart_rate\.bpm:.+/datasets/1718000000000000000-1718000120000000000$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "dataSourceId": "derived:com.google.heart_rate.bpm:com.google.android.gms:merge_heart_rate_bpm",
            "point": [
                {"startTimeNanos": "1718000000000000000", "endTimeNanos": "1718000000000000000", "dataTypeName": "com.google.heart_rate.bpm", "value": [{"fpVal": 60.0}]},
                {"startTimeNanos": "1718000060000000000", "endTimeNanos": "1718000060000000000", "dataTypeName": "com.google.heart_rate.bpm", "value": [{"fpVal": 70.0}]},
                {"startTimeNanos": "1718000120000000000", "endTimeNanos": "1718000120000000000", "dataTypeName": "com.google.heart_rate.bpm", "value": [{"fpVal": 80.0}]}
            ]
        })))
        .mount(&server)
        .await;

    let mut h = harness(&server, Some("tok"));
    let report = h
        .retriever
        .fetch_heart_rate()
        .await
        .expect("fetch")
        .ready()
        .expect("granted");
    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].name.as_deref(), Some("Evening walk"));
    assert_eq!(report.sessions[0].series[0].average().unwrap(), 70.0);
    assert!(h.consents.try_recv().is_err());
    assert!(matches!(
        h.events.try_recv().unwrap(),
        RetrievalEvent::Ready {
            report: Report::HeartRate(_)
        }
    ));
}

#[tokio::test]
async fn consent_flow_resumes_step_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=granted-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;
    mount_step_history(&server).await;

    let mut h = harness(&server, None);
    let started = h.retriever.fetch_steps().await.expect("fetch");
    assert!(matches!(started, Retrieval::PendingAuthorization(_)));

    let consent = h.consents.try_recv().expect("consent requested");
    let url = url_state(&consent.url);
    assert_eq!(url, consent.code.to_string());
    assert!(matches!(
        h.events.try_recv().unwrap(),
        RetrievalEvent::AuthorizationPending {
            pipeline: Pipeline::Steps,
            ..
        }
    ));

    h.identity.exchange_code("granted-code").await.expect("exchange");
    let report = h
        .retriever
        .on_authorization_result(consent.code, AuthorizationOutcome::Granted)
        .await
        .expect("resume");
    let Some(Report::Steps(steps)) = report else {
        panic!("expected step report, got {report:?}");
    };
    assert_eq!(steps.total().unwrap(), 450);
    assert_eq!(steps.days.len(), 2);

    // The request code is consumed by the first resumption.
    let again = h
        .retriever
        .on_authorization_result(consent.code, AuthorizationOutcome::Granted)
        .await
        .expect("duplicate");
    assert!(again.is_none());
}

#[tokio::test]
async fn cancelled_consent_never_reaches_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fitness/v1/users/me/dataset:aggregate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut h = harness(&server, None);
    h.retriever.fetch_steps().await.expect("fetch");
    let consent = h.consents.try_recv().expect("consent requested");

    let res = h
        .retriever
        .on_authorization_result(consent.code, AuthorizationOutcome::Cancelled)
        .await;
    assert!(matches!(res, Err(RetrieverError::AuthorizationDenied { .. })));
}

#[tokio::test]
async fn expired_token_reports_provider_failure() {
    let server = MockServer::start().await;
    mount_tokeninfo(&server, "tok").await;
    Mock::given(method("POST"))
        .and(path("/fitness/v1/users/me/dataset:aggregate"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness(&server, Some("tok"));
    let res = h.retriever.fetch_steps().await;
    assert!(matches!(
        res,
        Err(RetrieverError::ProviderRequestFailed {
            operation: "read_history",
            ..
        })
    ));
    assert!(matches!(
        h.events.try_recv().unwrap(),
        RetrievalEvent::Failed {
            pipeline: Pipeline::Steps,
            ..
        }
    ));
}

fn url_state(url: &str) -> String {
    url.split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("state="))
        .unwrap_or_default()
        .to_string()
}
