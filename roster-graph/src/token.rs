//! Bearer token sources.

use std::time::{Duration, Instant};

use roster_core::AuthConfig;
use serde::Deserialize;

use crate::error::GraphError;

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub trait TokenSource {
    fn token(&mut self) -> Result<String, GraphError>;
}

/// A pre-issued token, used as-is.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn token(&mut self) -> Result<String, GraphError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials grant against the tenant's token endpoint.
pub struct ClientCredentials {
    agent: ureq::Agent,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Option<(String, Instant)>,
}

impl ClientCredentials {
    pub fn new(agent: ureq::Agent, auth: &AuthConfig, client_secret: String) -> Self {
        Self {
            agent,
            token_url: token_url(DEFAULT_AUTHORITY, &auth.tenant_id),
            client_id: auth.client_id.clone(),
            client_secret,
            cached: None,
        }
    }

    fn request(&self) -> Result<(String, Instant), GraphError> {
        let response = self
            .agent
            .post(&self.token_url)
            .send_form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("scope", GRAPH_SCOPE),
            ])
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => {
                    let body = resp.into_string().unwrap_or_default();
                    GraphError::Token(format!("HTTP {code}: {body}"))
                }
                ureq::Error::Transport(t) => GraphError::Token(t.to_string()),
            })?;
        let parsed: TokenResponse = response
            .into_json()
            .map_err(|e| GraphError::Token(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(GraphError::MissingAccessToken)?;
        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3_600));
        let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);
        Ok((token, expires_at))
    }
}

impl TokenSource for ClientCredentials {
    fn token(&mut self) -> Result<String, GraphError> {
        if let Some((token, expires_at)) = &self.cached {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }
        tracing::debug!("requesting access token from {}", self.token_url);
        let (token, expires_at) = self.request()?;
        self.cached = Some((token.clone(), expires_at));
        Ok(token)
    }
}

pub fn token_url(authority: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority.trim_end_matches('/'),
        tenant_id
    )
}
