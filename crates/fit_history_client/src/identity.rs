//! OAuth 2.0 implementation of [`IdentityProvider`](crate::IdentityProvider).
//!
//! Permission checks ask the token-info endpoint which scopes the current
//! access token carries. Consent is interactive and happens outside this
//! process: `request_permissions` publishes a [`ConsentRequest`] for the host
//! to present, and the host later reports the outcome with the same code.

use std::collections::HashSet;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{RwLock, mpsc};

use crate::config::Config;
use crate::http_client::handle_response;
use crate::observability;
use crate::{Account, AuthorizationScope, FitError, IdentityProvider, RequestCode};

/// A consent flow the host has to present to the user.
#[derive(Clone, Debug)]
pub struct ConsentRequest {
    pub code: RequestCode,
    pub url: String,
    pub scope: AuthorizationScope,
}

pub struct OAuthIdentityProvider {
    client_id: String,
    client_secret: Option<SecretString>,
    auth_url: String,
    token_url: String,
    tokeninfo_url: String,
    redirect_uri: String,
    access_token: RwLock<Option<SecretString>>,
    /// Account email reported by token info for the current token.
    email: RwLock<Option<String>>,
    consent_tx: mpsc::UnboundedSender<ConsentRequest>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    scope: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl OAuthIdentityProvider {
    pub fn new(
        config: &Config,
        consent_tx: mpsc::UnboundedSender<ConsentRequest>,
    ) -> Result<Self, FitError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            tokeninfo_url: config.tokeninfo_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            access_token: RwLock::new(config.access_token.clone()),
            email: RwLock::new(None),
            consent_tx,
            client,
        })
    }

    /// Consent URL for `scope`; the request code travels in `state`.
    pub fn authorization_url(
        &self,
        code: RequestCode,
        account: &Account,
        scope: &AuthorizationScope,
    ) -> Result<String, FitError> {
        let mut url = url::Url::parse(&self.auth_url)
            .map_err(|e| FitError::Config(format!("invalid auth url {}: {e}", self.auth_url)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &scope.oauth_scopes().join(" "))
                .append_pair("state", &code.to_string())
                .append_pair("access_type", "offline")
                .append_pair("include_granted_scopes", "true");
            if let Some(email) = &account.email {
                pairs.append_pair("login_hint", email);
            }
        }
        Ok(url.to_string())
    }

    /// Trade an authorization code for an access token and use it from now on.
    pub async fn exchange_code(&self, authorization_code: &str) -> Result<(), FitError> {
        let mut form = vec![
            ("code", authorization_code.to_string()),
            ("client_id", self.client_id.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("grant_type", "authorization_code".to_string()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret().to_string()));
        }
        observability::record_request("exchange_code");
        let token: TokenResponse = async {
            let resp = self.client.post(&self.token_url).form(&form).send().await?;
            handle_response(resp).await
        }
        .await
        .inspect_err(|e| {
            observability::record_failure("exchange_code");
            tracing::warn!(error = %e, "authorization code exchange failed");
        })?;
        self.set_access_token(SecretString::new(token.access_token.into()))
            .await;
        tracing::info!("access token installed");
        Ok(())
    }

    /// Install `token`; the cached account email is dropped until token info
    /// is asked again.
    pub async fn set_access_token(&self, token: SecretString) {
        *self.access_token.write().await = Some(token);
        *self.email.write().await = None;
    }

    /// `None` when the token is rejected outright.
    async fn token_info(&self, token: &SecretString) -> Result<Option<TokenInfo>, FitError> {
        let resp = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("access_token", token.expose_secret())])
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status == 400 || status == 401 {
            tracing::debug!(status, "access token rejected by token info");
            return Ok(None);
        }
        handle_response(resp).await.map(Some)
    }
}

#[async_trait]
impl IdentityProvider for OAuthIdentityProvider {
    async fn account_for_scope(&self, _scope: &AuthorizationScope) -> Result<Account, FitError> {
        Ok(Account {
            email: self.email.read().await.clone(),
            access_token: self.access_token.read().await.clone(),
        })
    }

    async fn has_permissions(
        &self,
        account: &Account,
        scope: &AuthorizationScope,
    ) -> Result<bool, FitError> {
        let Some(token) = &account.access_token else {
            return Ok(false);
        };
        observability::record_request("token_info");
        let info = self.token_info(token).await.inspect_err(|e| {
            observability::record_failure("token_info");
            tracing::warn!(error = %e, "token info lookup failed");
        })?;
        let Some(info) = info else {
            return Ok(false);
        };
        if info.email.is_some() {
            *self.email.write().await = info.email.clone();
        }
        let granted: HashSet<&str> = info.scope.split_whitespace().collect();
        let missing: Vec<String> = scope
            .oauth_scopes()
            .into_iter()
            .filter(|s| !granted.contains(s.as_str()))
            .collect();
        if !missing.is_empty() {
            tracing::debug!(?missing, account = ?info.email, "scopes not granted");
        }
        Ok(missing.is_empty())
    }

    async fn request_permissions(
        &self,
        code: RequestCode,
        account: &Account,
        scope: &AuthorizationScope,
    ) -> Result<(), FitError> {
        if scope.is_empty() {
            return Err(FitError::InvalidInput(
                "authorization scope has no entries".into(),
            ));
        }
        let url = self.authorization_url(code, account, scope)?;
        observability::record_consent_request();
        tracing::info!(request_code = code.0, "requesting interactive authorization");
        self.consent_tx
            .send(ConsentRequest {
                code,
                url,
                scope: scope.clone(),
            })
            .map_err(|_| FitError::ConsentUnavailable)
    }
}
