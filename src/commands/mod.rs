pub mod stream;
pub mod sun;
pub mod update;

use std::time::Duration;

use reqwest::Client;
use snafu::ResultExt;

use crate::auth::Authorizer;
use crate::config::{self, Config};
use crate::error::{BuildHttpClientSnafu, LauncherError};
use crate::lifecycle::LifecycleController;
use crate::resolver::Resolver;
use crate::sun::{HttpGeocoder, SunriseSunsetOrg};
use crate::youtube::YouTubePlatform;

/// Client for the unauthenticated public APIs.
fn public_client() -> Result<Client, LauncherError> {
    Client::builder()
        .user_agent(config::USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context(BuildHttpClientSnafu)
}

fn resolver(config: &Config) -> Result<Resolver<HttpGeocoder, SunriseSunsetOrg>, LauncherError> {
    let client = public_client()?;

    Ok(Resolver::new(
        HttpGeocoder::new(client.clone(), config),
        SunriseSunsetOrg::new(client, config),
    ))
}

/// Authorizes against the platform and wires up the lifecycle controller.
async fn controller(config: &Config) -> Result<LifecycleController<YouTubePlatform>, LauncherError> {
    let authorizer = Authorizer::new(config.credentials_dir(), public_client()?);
    let authorized = authorizer.authorize().await?;

    Ok(LifecycleController::new(
        YouTubePlatform::new(authorized, config),
        config,
    ))
}
