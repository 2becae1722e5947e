//! Exchange login
//!
//! Trades the account email and password for the session token the
//! notification feed expects.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::error::{LedgerError, Result};

const DEVICE_NAME: &str = "BalanceLedger";
const DEVICE_ID: &str = "f8c8a829-c1fa-405f-b9e3-0d50c7d2b9f0";

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    device_name: &'a str,
    unique_device_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    success: bool,
    #[serde(default)]
    msg: Option<serde_json::Value>,
    #[serde(default)]
    payload: Option<SignInPayload>,
}

#[derive(Debug, Deserialize)]
struct SignInPayload {
    token: String,
    #[serde(default)]
    two_factor: bool,
}

/// Logs in against the exchange REST API
pub struct Authenticator {
    client: reqwest::Client,
    url: String,
    email: String,
    password: String,
}

impl Authenticator {
    pub fn new(config: &Config) -> Result<Self> {
        if config.email.is_empty() || config.password.is_empty() {
            return Err(LedgerError::ConfigError(
                "email and password are required for the notification feed".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/api/v2/auth/signin/", config.api_url.trim_end_matches('/')),
            email: config.email.clone(),
            password: config.password.clone(),
        })
    }

    /// Sign in and return the feed session token
    pub async fn login(&self) -> Result<String> {
        info!(email = %self.email, "Signing in to exchange");

        let body = self
            .client
            .post(&self.url)
            .json(&SignInRequest {
                email: &self.email,
                password: &self.password,
                device_name: DEVICE_NAME,
                unique_device_id: DEVICE_ID,
            })
            .send()
            .await?
            .text()
            .await?;

        let token = parse_sign_in(&body)?;
        info!("Signed in");
        Ok(token)
    }
}

fn parse_sign_in(body: &str) -> Result<String> {
    let response: SignInResponse = serde_json::from_str(body)?;

    if !response.success {
        let msg = response
            .msg
            .map(|m| m.to_string())
            .unwrap_or_else(|| "sign in rejected".to_string());
        return Err(LedgerError::AuthError(msg));
    }

    let payload = response
        .payload
        .ok_or_else(|| LedgerError::AuthError("response without payload".to_string()))?;

    if payload.two_factor {
        return Err(LedgerError::AuthError(
            "account requires two factor authentication".to_string(),
        ));
    }
    if payload.token.is_empty() {
        return Err(LedgerError::AuthError("empty session token".to_string()));
    }

    Ok(payload.token)
}
