use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use snafu::{Location, OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::config;

/// OAuth client secrets, in the "installed application" layout the API
/// console hands out.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Previously granted token, in the layout Google's client libraries write.
const TOKEN_FILE: &str = "youtube_token.json";

/// Refresh this long before the recorded expiry to absorb clock skew.
const EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display(
        "could not read `{}`: download the OAuth client secrets from the API console first",
        path.display()
    ))]
    MissingCredentials {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not parse `{}`", path.display()))]
    MalformedCredentials {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display(
        "could not read `{}`: authorize the account once and place the token there",
        path.display()
    ))]
    MissingToken {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not parse `{}`", path.display()))]
    MalformedToken {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// stored token is expired and has no refresh token; re-authorize the account
    Unrefreshable,

    /// could not reach the token endpoint to refresh the access token
    RefreshToken {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("token endpoint rejected the refresh: {message}"))]
    RefreshDenied { message: String },

    /// could not serialize the refreshed token
    EncodeToken { source: serde_json::Error },

    #[snafu(display("could not persist the refreshed token to `{}`", path.display()))]
    PersistToken {
        path: PathBuf,
        source: std::io::Error,
    },

    /// access token does not form a valid authorization header
    MalformedAccessToken {
        source: reqwest::header::InvalidHeaderValue,
    },

    /// could not build the authorized HTTP client
    BuildAuthorizedClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Produces an HTTP client that attaches the account's bearer token to every
/// request, refreshing the stored token first when it is at or past expiry.
///
/// Acquiring the initial grant is interactive and out of scope here: the
/// operator authorizes once, drops `credentials.json` and `youtube_token.json`
/// into the credentials directory, and unattended runs refresh from then on.
pub struct Authorizer {
    credentials_dir: PathBuf,
    http: Client,
}

impl Authorizer {
    pub fn new(credentials_dir: PathBuf, http: Client) -> Self {
        Self { credentials_dir, http }
    }

    #[instrument(skip(self))]
    pub async fn authorize(&self) -> Result<Client, AuthError> {
        let secrets = self.load_secrets().await?;
        let token_path = self.credentials_dir.join(TOKEN_FILE);
        let mut token = load_token(&token_path).await?;

        if token.needs_refresh(Utc::now()) {
            tracing::info!("access token at or past expiry, refreshing");
            token = self.refresh(&secrets, &token).await?;
            persist_token(&token_path, &token).await?;
        }

        authorized_client(&token.access_token)
    }

    async fn load_secrets(&self) -> Result<ClientSecrets, AuthError> {
        let path = self.credentials_dir.join(CREDENTIALS_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .context(MissingCredentialsSnafu { path: &path })?;
        let file: CredentialsFile =
            serde_json::from_str(&raw).context(MalformedCredentialsSnafu { path: &path })?;

        Ok(file.installed)
    }

    async fn refresh(
        &self,
        secrets: &ClientSecrets,
        token: &StoredToken,
    ) -> Result<StoredToken, AuthError> {
        let refresh_token = token.refresh_token.as_deref().context(UnrefreshableSnafu)?;
        let response = self
            .http
            .post(&secrets.token_uri)
            .form(&[
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context(RefreshTokenSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RefreshDenial>(&body)
                .map(RefreshDenial::into_message)
                .unwrap_or_else(|_| format!("status {status}"));

            return RefreshDeniedSnafu { message }.fail();
        }

        let grant: RefreshGrant = response.json().await.context(RefreshTokenSnafu)?;

        Ok(StoredToken {
            access_token: grant.access_token,
            token_type: token.token_type.clone(),
            // the endpoint rarely rotates the refresh token; keep ours if not
            refresh_token: grant.refresh_token.or_else(|| token.refresh_token.clone()),
            expiry: grant.expires_in.map(|seconds| Utc::now() + Duration::seconds(seconds)),
        })
    }
}

async fn load_token(path: &Path) -> Result<StoredToken, AuthError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .context(MissingTokenSnafu { path })?;

    serde_json::from_str(&raw).context(MalformedTokenSnafu { path })
}

async fn persist_token(path: &Path, token: &StoredToken) -> Result<(), AuthError> {
    let pretty = serde_json::to_string_pretty(token).context(EncodeTokenSnafu)?;

    tokio::fs::write(path, pretty)
        .await
        .context(PersistTokenSnafu { path })
}

fn authorized_client(access_token: &str) -> Result<Client, AuthError> {
    let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .context(MalformedAccessTokenSnafu)?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);

    Client::builder()
        .user_agent(config::USER_AGENT)
        .default_headers(headers)
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context(BuildAuthorizedClientSnafu)
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: ClientSecrets,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    token_uri: String,
}

/// Token in the shape Google's client libraries persist: snake_case keys,
/// RFC 3339 expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Whether the token should be refreshed before use. A token without an
    /// expiry is taken at face value.
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_LEEWAY_SECS) >= expiry,
            None => false,
        }
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct RefreshGrant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshDenial {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl RefreshDenial {
    fn into_message(self) -> String {
        match self.error_description {
            Some(description) => format!("{} ({description})", self.error),
            None => self.error,
        }
    }
}
