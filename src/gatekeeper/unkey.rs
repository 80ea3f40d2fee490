//! Unkey `keys.verifyKey` client.

use super::{KeyVerdict, KeyVerifier, VerifyError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;

const VERIFY_KEY_PATH: &str = "v1/keys.verifyKey";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VerifyKeyRequest<'a> {
    api_id: &'a str,
    key: &'a str,
}

#[derive(Deserialize, Debug)]
struct VerifyKeyResponse {
    valid: bool,
    #[serde(default)]
    code: Option<String>,
}

pub struct UnkeyVerifier {
    client: Client,
    endpoint: Url,
    root_key: SecretString,
}

impl std::fmt::Debug for UnkeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnkeyVerifier")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl UnkeyVerifier {
    /// Build a verifier for `base_url` whose every call is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, root_key: SecretString, timeout: Duration) -> Result<Self> {
        let endpoint = verify_endpoint(base_url)?;

        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build key verification HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            root_key,
        })
    }
}

fn verify_endpoint(base_url: &str) -> Result<Url> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|base| base.join(VERIFY_KEY_PATH))
        .with_context(|| format!("Invalid key verification URL: {base_url}"))
}

#[async_trait]
impl KeyVerifier for UnkeyVerifier {
    async fn verify(&self, api_id: &str, key: &str) -> Result<KeyVerdict, VerifyError> {
        let span = info_span!(
            "http.client",
            http.method = "POST",
            http.url = self.endpoint.as_str()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.root_key.expose_secret())
            .json(&VerifyKeyRequest { api_id, key })
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let verdict: VerifyKeyResponse = response.json().await?;
        debug!(
            code = verdict.code.as_deref().unwrap_or("none"),
            "Key verification verdict"
        );

        Ok(if verdict.valid {
            KeyVerdict::Valid
        } else {
            KeyVerdict::Invalid
        })
    }
}
