use std::collections::HashSet;
use std::sync::Arc;

use fit_history_client::RequestCode;
use tokio::sync::Mutex;

/// Consent flows launched and not yet resolved.
///
/// A code is present from the moment its flow is launched until its outcome
/// is dispatched, so a flow is never launched twice and an outcome is never
/// acted on twice.
#[derive(Clone, Default)]
pub struct PendingRequests {
    codes: Arc<Mutex<HashSet<RequestCode>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `code` was already pending.
    pub async fn insert(&self, code: RequestCode) -> bool {
        self.codes.lock().await.insert(code)
    }

    /// Returns `false` when `code` was not pending.
    pub async fn remove(&self, code: RequestCode) -> bool {
        self.codes.lock().await.remove(&code)
    }

    pub async fn contains(&self, code: RequestCode) -> bool {
        self.codes.lock().await.contains(&code)
    }
}
