use snafu::{Location, Snafu};

use crate::auth::AuthError;
use crate::commands::update::UpdateError;
use crate::handoff::HandoffError;
use crate::lifecycle::LifecycleError;
use crate::resolver::ResolveError;
use crate::tasks::TaskError;

/// Top of the error tree; everything `main` can fail with funnels through
/// here so the report reads as one cause chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LauncherError {
    /// could not load configuration from the environment
    LoadConfig {
        source: envy::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not initialize the logger
    InitializeLogger {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not build the HTTP client
    BuildHttpClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not determine the path of the running executable
    LocateExecutable {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(transparent)]
    Auth { source: AuthError },

    #[snafu(transparent)]
    Resolve { source: ResolveError },

    #[snafu(transparent)]
    Lifecycle { source: LifecycleError },

    #[snafu(transparent)]
    Tasks { source: TaskError },

    #[snafu(transparent)]
    Handoff { source: HandoffError },

    #[snafu(transparent)]
    Update { source: UpdateError },
}
