use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use fit_history_client::AuthorizationOutcome;
use fit_history_client::config::Config;
use fit_history_client::http_client::ReqwestFitnessClient;
use fit_history_client::identity::{ConsentRequest, OAuthIdentityProvider};
use fit_history_retriever::{FitnessDataRetriever, Pipeline, RetrievalEvent, RetrieverSettings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `FIT_HISTORY_LOG_LEVEL`, then `RUST_LOG`, then `info`.
    let log_env = std::env::var("FIT_HISTORY_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::try_new(format!("{log_env},hyper=warn,reqwest=warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::info!("fit-history: log filter: {}", log_env);

    let config = Config::from_env().context("loading configuration")?;
    let (consent_tx, mut consent_rx) = mpsc::unbounded_channel::<ConsentRequest>();
    let identity = Arc::new(OAuthIdentityProvider::new(&config, consent_tx)?);
    let fitness = Arc::new(ReqwestFitnessClient::from_config(&config)?);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let retriever = FitnessDataRetriever::new(
        identity.clone(),
        fitness,
        RetrieverSettings::from_config(&config),
    )
    .with_observer(event_tx);

    // Outcomes arrive on the event channel; returned errors are already published there.
    let heart_rate = retriever.clone();
    tokio::spawn(async move {
        let _ = heart_rate.fetch_heart_rate().await;
    });
    let steps = retriever.clone();
    tokio::spawn(async move {
        let _ = steps.fetch_steps().await;
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut finished = HashSet::new();
    let mut failed = Vec::new();

    while finished.len() < 2 {
        tokio::select! {
            Some(consent) = consent_rx.recv() => {
                eprintln!(
                    "Authorize access for request {} by opening:\n  {}\n\
                     then paste the authorization code (empty line cancels):",
                    consent.code, consent.url
                );
                let line = stdin.next_line().await?.unwrap_or_default();
                let outcome = match line.trim() {
                    "" => AuthorizationOutcome::Cancelled,
                    code => match identity.exchange_code(code).await {
                        Ok(()) => AuthorizationOutcome::Granted,
                        Err(e) => {
                            tracing::error!(error = %e, "authorization code exchange failed");
                            AuthorizationOutcome::Failed(1)
                        }
                    },
                };
                let resumed = retriever.clone();
                tokio::spawn(async move {
                    let _ = resumed.on_authorization_result(consent.code, outcome).await;
                });
            }
            Some(event) = event_rx.recv() => {
                match &event {
                    RetrievalEvent::Ready { report } => {
                        println!("{}", serde_json::to_string_pretty(report)?);
                    }
                    RetrievalEvent::AuthorizationPending { pipeline, code } => {
                        tracing::info!(
                            %pipeline,
                            request_code = code.0,
                            "waiting for authorization"
                        );
                    }
                    RetrievalEvent::AuthorizationDenied { pipeline, outcome, .. } => {
                        failed.push(format!("{pipeline}: authorization {outcome:?}"));
                    }
                    RetrievalEvent::Failed { pipeline, error } => {
                        failed.push(format!("{pipeline}: {error}"));
                    }
                }
                if event.is_terminal() {
                    finished.insert(event.pipeline());
                }
            }
            else => break,
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("retrieval incomplete: {}", failed.join("; "));
    }
    tracing::info!(
        pipelines = ?[Pipeline::HeartRate, Pipeline::Steps],
        "fit-history: all reports ready"
    );
    Ok(())
}
