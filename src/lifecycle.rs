use std::time::Duration;

use async_trait::async_trait;
use snafu::{Location, OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::config::Config;
use crate::model::{
    Broadcast, BroadcastId, BroadcastSpec, EndpointNaming, IngestEndpoint, LifecycleState,
};
use crate::youtube::PlatformError;

/// What the launcher needs from a live-streaming platform.
#[async_trait]
pub trait BroadcastPlatform: Send + Sync {
    async fn create_broadcast(&self, spec: &BroadcastSpec) -> Result<Broadcast, PlatformError>;

    async fn list_ingest_endpoints(&self) -> Result<Vec<IngestEndpoint>, PlatformError>;

    async fn create_ingest_endpoint(&self, title: &str) -> Result<IngestEndpoint, PlatformError>;

    /// Binds a broadcast to the ingest endpoint it will be fed from.
    async fn bind(&self, broadcast: &BroadcastId, endpoint: &str) -> Result<(), PlatformError>;

    /// Requests a lifecycle transition; the platform rejects transitions the
    /// broadcast has already made.
    async fn transition(
        &self,
        broadcast: &BroadcastId,
        target: LifecycleState,
    ) -> Result<(), PlatformError>;

    /// Current state of a broadcast, or `None` when the platform has never
    /// heard of the id.
    async fn broadcast_state(
        &self,
        broadcast: &BroadcastId,
    ) -> Result<Option<LifecycleState>, PlatformError>;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LifecycleError {
    /// could not create the broadcast
    BroadcastCreate {
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not list the account's ingest endpoints
    StreamLookup {
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not create ingest endpoint `{title}`"))]
    StreamCreate {
        title: String,
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not bind broadcast `{broadcast_id}` to endpoint `{endpoint_id}`"))]
    Bind {
        broadcast_id: BroadcastId,
        endpoint_id: String,
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not take broadcast `{broadcast_id}` live"))]
    GoLive {
        broadcast_id: BroadcastId,
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("broadcast `{broadcast_id}` does not exist on the platform"))]
    MissingBroadcast { broadcast_id: BroadcastId },

    #[snafu(display("could not end broadcast `{broadcast_id}`"))]
    EndStream {
        broadcast_id: BroadcastId,
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Drives a broadcast through schedule, go-live, and end.
pub struct LifecycleController<P> {
    platform: P,
    ingest_title: String,
    naming: EndpointNaming,
    testing_delay: Duration,
    verify_before_live: bool,
}

impl<P: BroadcastPlatform> LifecycleController<P> {
    pub fn new(platform: P, config: &Config) -> Self {
        Self {
            platform,
            ingest_title: config.ingest_title.clone(),
            naming: config.endpoint_naming,
            testing_delay: config.testing_delay(),
            verify_before_live: config.verify_before_live,
        }
    }

    /// Creates the broadcast, finds or creates an ingest endpoint, and binds
    /// the two together.
    ///
    /// There is no rollback: when a later step gives out, the broadcast stays
    /// behind on the platform for the operator to repair or delete, and the
    /// error names the step that failed.
    #[instrument(skip(self, spec), fields(title = %spec.title))]
    pub async fn schedule(
        &self,
        spec: &BroadcastSpec,
    ) -> Result<(Broadcast, IngestEndpoint), LifecycleError> {
        let broadcast = self
            .platform
            .create_broadcast(spec)
            .await
            .context(BroadcastCreateSnafu)?;
        tracing::info!(broadcast = %broadcast.id, "broadcast created");

        let endpoint = self.find_or_create_endpoint(&spec.title).await?;
        self.platform
            .bind(&broadcast.id, &endpoint.id)
            .await
            .context(BindSnafu {
                broadcast_id: broadcast.id.clone(),
                endpoint_id: endpoint.id.clone(),
            })?;
        tracing::info!(broadcast = %broadcast.id, endpoint = %endpoint.id, "bound broadcast to ingest endpoint");

        Ok((broadcast, endpoint))
    }

    async fn find_or_create_endpoint(
        &self,
        broadcast_title: &str,
    ) -> Result<IngestEndpoint, LifecycleError> {
        let wanted = self.naming.endpoint_title(&self.ingest_title, broadcast_title);
        let existing = self
            .platform
            .list_ingest_endpoints()
            .await
            .context(StreamLookupSnafu)?;

        match existing.into_iter().find(|endpoint| endpoint.title == wanted) {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint.id, title = %wanted, "reusing ingest endpoint");

                Ok(endpoint)
            }
            None => {
                let endpoint = self
                    .platform
                    .create_ingest_endpoint(&wanted)
                    .await
                    .context(StreamCreateSnafu { title: wanted.clone() })?;
                tracing::info!(endpoint = %endpoint.id, title = %wanted, "created ingest endpoint");

                Ok(endpoint)
            }
        }
    }

    /// Takes a scheduled broadcast live.
    ///
    /// The testing transition is allowed to fail: a broadcast that already
    /// passed through testing rejects it, and that must not stop a retry of
    /// this command. The live transition is the one that counts.
    #[instrument(skip(self))]
    pub async fn go_live(&self, id: &BroadcastId) -> Result<(), LifecycleError> {
        if self.verify_before_live {
            let state = self
                .platform
                .broadcast_state(id)
                .await
                .context(GoLiveSnafu { broadcast_id: id.clone() })?
                .context(MissingBroadcastSnafu { broadcast_id: id.clone() })?;
            tracing::debug!(%state, "broadcast found on the platform");
        }

        match self.platform.transition(id, LifecycleState::Testing).await {
            Ok(()) => {
                tracing::info!(broadcast = %id, "entered testing, letting the preview settle");
                tokio::time::sleep(self.testing_delay).await;
            }
            Err(error) => {
                tracing::info!(broadcast = %id, %error, "testing transition rejected, broadcast is already past testing");
            }
        }

        self.platform
            .transition(id, LifecycleState::Live)
            .await
            .context(GoLiveSnafu { broadcast_id: id.clone() })
    }

    /// Ends a live broadcast and lets the platform archive it.
    #[instrument(skip(self))]
    pub async fn end(&self, id: &BroadcastId) -> Result<(), LifecycleError> {
        self.platform
            .transition(id, LifecycleState::Ended)
            .await
            .context(EndStreamSnafu { broadcast_id: id.clone() })
    }
}
