use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use fit_history_client::http_client::ReqwestFitnessClient;
use fit_history_client::reduce::{HeartRateSample, time_weighted_average, total_steps};
use fit_history_client::{
    Account, DataReadRequest, DataSource, FitnessDataProvider, TimeWindow,
};
use secrecy::SecretString;
use tokio::runtime::Builder;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bench_time_weighted_average(c: &mut Criterion) {
    // a day of one-second samples
    let samples: Vec<HeartRateSample> = (0..86_400)
        .map(|i| HeartRateSample::new(i * 1_000, 60.0 + (i % 90) as f64))
        .collect();
    c.bench_function("time_weighted_average_day", |b| {
        b.iter(|| time_weighted_average(std::hint::black_box(&samples)).expect("average"))
    });
}

fn bench_step_history(c: &mut Criterion) {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    let server = rt.block_on(async {
        let server = MockServer::start().await;
        let buckets: Vec<serde_json::Value> = (0..10)
            .map(|day| {
                let points: Vec<serde_json::Value> = (0..500)
                    .map(|i| serde_json::json!({
                        "startTimeNanos": (i * 1_000_000).to_string(),
                        "endTimeNanos": (i * 1_000_000 + 1).to_string(),
                        "dataTypeName": "com.google.step_count.delta",
                        "value": [{"intVal": 17}]
                    }))
                    .collect();
                serde_json::json!({
                    "startTimeMillis": (day * 86_400_000_i64).to_string(),
                    "endTimeMillis": ((day + 1) * 86_400_000_i64).to_string(),
                    "dataset": [{"dataSourceId": "bench", "point": points}]
                })
            })
            .collect();
        Mock::given(method("POST"))
            .and(path("/fitness/v1/users/me/dataset:aggregate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "bucket": buckets })),
            )
            .mount(&server)
            .await;
        server
    });

    let client =
        ReqwestFitnessClient::new(&server.uri(), Duration::from_secs(5)).expect("client");
    let account = Account::with_token(SecretString::new("tok".into()));
    let window = TimeWindow::last_days(&chrono::Utc::now(), 10);
    let request =
        DataReadRequest::aggregate(DataSource::estimated_steps(), chrono::Duration::days(1), window)
            .expect("request");

    c.bench_function("read_history_and_sum", |b| {
        b.to_async(&rt).iter(|| {
            let client = client.clone();
            let account = account.clone();
            let request = request.clone();
            async move {
                let response = client
                    .read_history(&account, &request)
                    .await
                    .expect("history");
                total_steps(response.data_points()).expect("steps")
            }
        })
    });
}

criterion_group!(benches, bench_time_weighted_average, bench_step_history);
criterion_main!(benches);
