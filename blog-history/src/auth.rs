//! Password-grant login against the platform's OAuth2 token endpoint.
//!
//! Produces the bearer [`Session`] the content client attaches to every call.

use std::fmt;

use blog_history_core::client::Session;
use blog_history_core::error::ClientError;
use serde::Deserialize;

/// What the user types at the prompt.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registered OAuth application the login is performed on behalf of.
#[derive(Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthApp")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges username and password for an access token.
///
/// A rejected grant (400/401/403) is reported as [`ClientError::Auth`].
pub async fn login(
    token_url: &str,
    app: &OAuthApp,
    credentials: &Credentials,
) -> Result<Session, ClientError> {
    tracing::info!(username = %credentials.username, token_url, "Logging in");

    let form = [
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
        ("grant_type", "password"),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
    ];
    let response = reqwest::Client::new()
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|source| ClientError::Transport {
            url: token_url.to_owned(),
            source,
        })?;

    let status = response.status().as_u16();
    match status {
        200..=299 => {}
        400 | 401 | 403 => {
            tracing::error!(status, "Login rejected");
            return Err(ClientError::Auth {
                url: token_url.to_owned(),
                status,
            });
        }
        _ => {
            tracing::error!(status, "Login endpoint returned an error");
            return Err(ClientError::HttpStatus {
                url: token_url.to_owned(),
                status,
            });
        }
    }

    let token: TokenResponse = response.json().await.map_err(|e| ClientError::Malformed {
        what: "token response".to_owned(),
        message: e.to_string(),
    })?;
    tracing::info!(username = %credentials.username, "Login succeeded");
    Ok(Session::new(token.access_token))
}
