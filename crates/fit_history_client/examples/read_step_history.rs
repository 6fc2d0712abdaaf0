use fit_history_client::{
    Account, DataReadRequest, DataSource, FitnessDataProvider, TimeWindow, config::Config,
    http_client::ReqwestFitnessClient, reduce,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example: expects FIT_HISTORY_CLIENT_ID and FIT_HISTORY_ACCESS_TOKEN in env
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(());
        }
    };
    let Some(token) = cfg.access_token.clone() else {
        eprintln!("FIT_HISTORY_ACCESS_TOKEN not set");
        return Ok(());
    };
    let client = ReqwestFitnessClient::from_config(&cfg)?;
    let window = TimeWindow::last_days(&chrono::Local::now(), cfg.lookback_days);
    let request = DataReadRequest::aggregate(
        DataSource::estimated_steps(),
        chrono::Duration::days(1),
        window,
    )?;
    let response = client
        .read_history(&Account::with_token(token), &request)
        .await?;
    for day in reduce::daily_totals(&response) {
        println!("{}  {:>7} steps", day.start.format("%Y-%m-%d"), day.steps);
    }
    Ok(())
}
