use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::{Location, OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::config::{api_root, Config};
use crate::lifecycle::BroadcastPlatform;
use crate::model::{Broadcast, BroadcastId, BroadcastSpec, IngestEndpoint, LifecycleState, Privacy};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PlatformError {
    /// could not reach the platform API
    Transport {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("platform API answered {status}: {message}"))]
    Api { status: StatusCode, message: String },

    /// could not decode the platform's answer
    Decode {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// platform created an ingest endpoint without ingestion details
    IncompleteEndpoint,

    #[snafu(display("state `{state}` cannot be requested from the platform"))]
    UnsupportedTransition { state: LifecycleState },
}

/// YouTube Live implementation of the broadcast platform.
pub struct YouTubePlatform {
    client: Client,
    base: String,
}

impl YouTubePlatform {
    /// `client` must already attach the account's bearer token.
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base: api_root(&config.youtube_api_base),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }
}

#[async_trait]
impl BroadcastPlatform for YouTubePlatform {
    #[instrument(skip(self, spec), fields(title = %spec.title))]
    async fn create_broadcast(&self, spec: &BroadcastSpec) -> Result<Broadcast, PlatformError> {
        let response = self
            .client
            .post(self.endpoint("liveBroadcasts"))
            .query(&[("part", "snippet,contentDetails,status")])
            .json(&InsertBroadcast::from_spec(spec))
            .send()
            .await
            .context(TransportSnafu)?;
        let resource: BroadcastResource = decode(response).await?;
        let state = resource.state().unwrap_or(LifecycleState::Created);

        Ok(Broadcast::new(
            BroadcastId::new(resource.id),
            spec.title.clone(),
            spec.scheduled_start,
            spec.privacy,
            state,
        ))
    }

    #[instrument(skip(self))]
    async fn list_ingest_endpoints(&self) -> Result<Vec<IngestEndpoint>, PlatformError> {
        let response = self
            .client
            .get(self.endpoint("liveStreams"))
            .query(&[("part", "snippet,cdn"), ("mine", "true"), ("maxResults", "50")])
            .send()
            .await
            .context(TransportSnafu)?;
        let list: StreamList = decode(response).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(StreamResource::into_endpoint)
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_ingest_endpoint(&self, title: &str) -> Result<IngestEndpoint, PlatformError> {
        let response = self
            .client
            .post(self.endpoint("liveStreams"))
            .query(&[("part", "snippet,cdn")])
            .json(&InsertStream::titled(title))
            .send()
            .await
            .context(TransportSnafu)?;
        let resource: StreamResource = decode(response).await?;

        resource.into_endpoint().context(IncompleteEndpointSnafu)
    }

    #[instrument(skip(self))]
    async fn bind(&self, broadcast: &BroadcastId, endpoint: &str) -> Result<(), PlatformError> {
        let response = self
            .client
            .post(self.endpoint("liveBroadcasts/bind"))
            .query(&[
                ("part", "id,contentDetails"),
                ("id", broadcast.as_str()),
                ("streamId", endpoint),
            ])
            .send()
            .await
            .context(TransportSnafu)?;

        accept(response).await
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        broadcast: &BroadcastId,
        target: LifecycleState,
    ) -> Result<(), PlatformError> {
        let status = target
            .transition_status()
            .context(UnsupportedTransitionSnafu { state: target })?;
        let response = self
            .client
            .post(self.endpoint("liveBroadcasts/transition"))
            .query(&[
                ("part", "status"),
                ("id", broadcast.as_str()),
                ("broadcastStatus", status),
            ])
            .send()
            .await
            .context(TransportSnafu)?;

        accept(response).await
    }

    #[instrument(skip(self))]
    async fn broadcast_state(
        &self,
        broadcast: &BroadcastId,
    ) -> Result<Option<LifecycleState>, PlatformError> {
        let response = self
            .client
            .get(self.endpoint("liveBroadcasts"))
            .query(&[("part", "status"), ("id", broadcast.as_str())])
            .send()
            .await
            .context(TransportSnafu)?;
        let list: BroadcastList = decode(response).await?;

        Ok(list
            .items
            .into_iter()
            .next()
            .map(|item| item.state().unwrap_or(LifecycleState::Created)))
    }
}

/// Public watch page for a broadcast.
pub fn watch_url(id: &BroadcastId) -> String {
    format!("https://youtube.com/watch?v={id}")
}

/// Control-room page where the operator monitors the stream.
pub fn studio_url(id: &BroadcastId) -> String {
    format!("https://studio.youtube.com/video/{id}/livestreaming")
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, PlatformError> {
    let status = response.status();
    if !status.is_success() {
        return api_failure(status, response).await;
    }

    response.json().await.context(DecodeSnafu)
}

async fn accept(response: Response) -> Result<(), PlatformError> {
    let status = response.status();
    if !status.is_success() {
        return api_failure(status, response).await;
    }

    Ok(())
}

async fn api_failure<T>(status: StatusCode, response: Response) -> Result<T, PlatformError> {
    let message = response
        .json::<ApiErrorEnvelope>()
        .await
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| "no error detail".to_string());

    ApiSnafu { status, message }.fail()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertBroadcast {
    snippet: BroadcastSnippet,
    content_details: BroadcastContentDetails,
    status: BroadcastStatusBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastSnippet {
    title: String,
    description: String,
    scheduled_start_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastContentDetails {
    enable_auto_start: bool,
    enable_auto_stop: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastStatusBody {
    privacy_status: Privacy,
    self_declared_made_for_kids: bool,
}

impl InsertBroadcast {
    fn from_spec(spec: &BroadcastSpec) -> Self {
        Self {
            snippet: BroadcastSnippet {
                title: spec.title.clone(),
                description: spec.description.clone(),
                scheduled_start_time: spec.scheduled_start.to_rfc3339(),
            },
            // transitions stay manual; automation here would race go-live
            content_details: BroadcastContentDetails {
                enable_auto_start: false,
                enable_auto_stop: false,
            },
            status: BroadcastStatusBody {
                privacy_status: spec.privacy,
                self_declared_made_for_kids: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct InsertStream {
    snippet: StreamTitle,
    cdn: CdnSettings,
}

#[derive(Debug, Serialize)]
struct StreamTitle {
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CdnSettings {
    frame_rate: &'static str,
    ingestion_type: &'static str,
    resolution: &'static str,
}

impl InsertStream {
    fn titled(title: &str) -> Self {
        Self {
            snippet: StreamTitle {
                title: title.to_string(),
            },
            // "variable" lets the encoder decide; ingestion stays plain RTMP
            cdn: CdnSettings {
                frame_rate: "variable",
                ingestion_type: "rtmp",
                resolution: "variable",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct BroadcastResource {
    id: String,
    #[serde(default)]
    status: Option<BroadcastStatusReport>,
}

impl BroadcastResource {
    fn state(&self) -> Option<LifecycleState> {
        self.status
            .as_ref()
            .and_then(|status| status.life_cycle_status.as_deref())
            .and_then(LifecycleState::from_remote)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastStatusReport {
    #[serde(default)]
    life_cycle_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BroadcastList {
    #[serde(default)]
    items: Vec<BroadcastResource>,
}

#[derive(Debug, Deserialize)]
struct StreamList {
    #[serde(default)]
    items: Vec<StreamResource>,
}

#[derive(Debug, Deserialize)]
struct StreamResource {
    id: String,
    #[serde(default)]
    snippet: Option<StreamSnippet>,
    #[serde(default)]
    cdn: Option<StreamCdn>,
}

#[derive(Debug, Deserialize)]
struct StreamSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamCdn {
    #[serde(default)]
    ingestion_info: Option<IngestionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionInfo {
    #[serde(default)]
    stream_name: String,
    #[serde(default)]
    ingestion_address: String,
}

impl StreamResource {
    /// Streams the API reports without ingestion details cannot be pushed
    /// to, so they map to nothing.
    fn into_endpoint(self) -> Option<IngestEndpoint> {
        let info = self.cdn?.ingestion_info?;
        let title = self.snippet.map(|snippet| snippet.title).unwrap_or_default();

        Some(IngestEndpoint::new(
            self.id,
            title,
            info.ingestion_address,
            info.stream_name,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}
