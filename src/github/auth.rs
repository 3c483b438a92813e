//! GitHub App installation-token exchange.
//!
//! App id + private key sign a short-lived JWT, which is traded for an
//! installation token scoped to the organisation's repositories.

use crate::config::GitHubCredentials;
use crate::error::{GitHubError, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Clock skew allowance applied to `iat`
const ISSUED_AT_SKEW_SECS: i64 = 60;
/// JWT lifetime; GitHub caps it at ten minutes
const JWT_LIFETIME_SECS: i64 = 540;

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Token returned by the installation access-token endpoint
#[derive(Clone, Deserialize)]
pub struct InstallationToken {
    /// Bearer token
    pub token: String,
    /// Expiry timestamp (RFC 3339)
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Sign the app JWT used to request installation tokens
pub fn app_jwt(credentials: &GitHubCredentials, now: i64) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes()).map_err(|e| {
        GitHubError::Authentication {
            reason: format!("invalid GitHub App private key: {e}"),
        }
    })?;

    let claims = AppClaims {
        iat: now - ISSUED_AT_SKEW_SECS,
        exp: now + JWT_LIFETIME_SECS,
        iss: credentials.app_id.clone(),
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| {
        GitHubError::Authentication {
            reason: format!("failed to sign app JWT: {e}"),
        }
        .into()
    })
}

/// Exchange app credentials for an installation token
pub async fn installation_token(
    http: &reqwest::Client,
    api_url: &str,
    credentials: &GitHubCredentials,
) -> Result<InstallationToken> {
    let jwt = app_jwt(credentials, chrono::Utc::now().timestamp())?;
    let url = format!(
        "{}/app/installations/{}/access_tokens",
        api_url.trim_end_matches('/'),
        credentials.installation_id
    );

    log::debug!("POST {url}");
    let response = http.post(&url).bearer_auth(jwt).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GitHubError::Authentication {
            reason: format!("installation token exchange returned {status}: {body}"),
        }
        .into());
    }

    Ok(response.json::<InstallationToken>().await?)
}
