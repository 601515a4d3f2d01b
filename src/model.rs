use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate};
use clap::ValueEnum;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Identifier of a broadcast on the streaming platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(String);

impl BroadcastId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BroadcastId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for BroadcastId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

/// Lifecycle of a broadcast, collapsed to the states the launcher acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unscheduled,
    Created,
    Bound,
    Testing,
    Live,
    Ended,
}

impl LifecycleState {
    /// Status string the platform's transition endpoint understands.
    ///
    /// Only the three states an operator can drive a broadcast into are
    /// addressable; the rest are observed, never requested.
    pub fn transition_status(self) -> Option<&'static str> {
        match self {
            Self::Testing => Some("testing"),
            Self::Live => Some("live"),
            Self::Ended => Some("complete"),
            _ => None,
        }
    }

    /// Maps a life cycle status reported by the platform into the launcher's
    /// view of it.
    pub fn from_remote(status: &str) -> Option<Self> {
        match status {
            "created" => Some(Self::Created),
            "ready" => Some(Self::Bound),
            "testStarting" | "testing" => Some(Self::Testing),
            "liveStarting" | "live" => Some(Self::Live),
            "complete" | "revoked" => Some(Self::Ended),
            _ => None,
        }
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            Self::Unscheduled => "unscheduled",
            Self::Created => "created",
            Self::Bound => "bound",
            Self::Testing => "testing",
            Self::Live => "live",
            Self::Ended => "ended",
        };

        f.write_str(name)
    }
}

/// Audience visibility of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Display for Privacy {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        };

        f.write_str(name)
    }
}

/// Everything needed to create a broadcast.
#[derive(Debug, Clone, new)]
pub struct BroadcastSpec {
    pub title: String,
    pub description: String,
    pub privacy: Privacy,
    pub scheduled_start: DateTime<Local>,
}

/// A broadcast the platform has accepted.
#[derive(Debug, Clone, new)]
pub struct Broadcast {
    pub id: BroadcastId,
    pub title: String,
    pub scheduled_start: DateTime<Local>,
    pub privacy: Privacy,
    pub state: LifecycleState,
}

/// How ingest endpoint titles are chosen when one must be created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointNaming {
    /// One operator-configured title, shared by every broadcast.
    #[default]
    Fixed,
    /// A title derived from the broadcast, one endpoint per show.
    PerBroadcast,
}

impl EndpointNaming {
    pub fn endpoint_title(self, fixed: &str, broadcast_title: &str) -> String {
        match self {
            Self::Fixed => fixed.to_owned(),
            Self::PerBroadcast => format!("{broadcast_title} - Stream"),
        }
    }
}

/// A reusable ingest endpoint and the secret that authorizes pushing to it.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IngestEndpoint {
    pub id: String,
    pub title: String,
    pub ingestion_address: String,
    pub stream_key: String,
}

impl IngestEndpoint {
    /// Full RTMP URL an encoder can be pointed at.
    pub fn rtmp_url(&self) -> String {
        format!("{}/{}", self.ingestion_address, self.stream_key)
    }
}

/// Expands a title template, substituting `{date}` with the given date in
/// `MM/DD/YYYY` form.
pub fn default_title(template: &str, date: NaiveDate) -> String {
    template.replace("{date}", &date.format("%m/%d/%Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_operator_driven_states_are_addressable() {
        assert_eq!(LifecycleState::Testing.transition_status(), Some("testing"));
        assert_eq!(LifecycleState::Live.transition_status(), Some("live"));
        assert_eq!(LifecycleState::Ended.transition_status(), Some("complete"));

        assert_eq!(LifecycleState::Unscheduled.transition_status(), None);
        assert_eq!(LifecycleState::Created.transition_status(), None);
        assert_eq!(LifecycleState::Bound.transition_status(), None);
    }

    #[test]
    fn remote_statuses_collapse_onto_launcher_states() {
        assert_eq!(LifecycleState::from_remote("ready"), Some(LifecycleState::Bound));
        assert_eq!(LifecycleState::from_remote("testStarting"), Some(LifecycleState::Testing));
        assert_eq!(LifecycleState::from_remote("liveStarting"), Some(LifecycleState::Live));
        assert_eq!(LifecycleState::from_remote("revoked"), Some(LifecycleState::Ended));
        assert_eq!(LifecycleState::from_remote("deleted"), None);
    }

    #[test]
    fn fixed_naming_ignores_the_broadcast_title() {
        let title = EndpointNaming::Fixed.endpoint_title("Studio Feed", "Morning Show");

        assert_eq!(title, "Studio Feed");
    }

    #[test]
    fn per_broadcast_naming_derives_from_the_broadcast_title() {
        let title = EndpointNaming::PerBroadcast.endpoint_title("Studio Feed", "Morning Show");

        assert_eq!(title, "Morning Show - Stream");
    }

    #[test]
    fn rtmp_url_joins_address_and_key() {
        let endpoint = IngestEndpoint::new(
            "endpoint-1".into(),
            "Studio Feed".into(),
            "rtmp://a.rtmp.youtube.com/live2".into(),
            "abcd-1234".into(),
        );

        assert_eq!(endpoint.rtmp_url(), "rtmp://a.rtmp.youtube.com/live2/abcd-1234");
    }

    #[test]
    fn title_template_expands_the_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();

        assert_eq!(default_title("Dawn Watch ({date})", date), "Dawn Watch (03/07/2026)");
        assert_eq!(default_title("No date here", date), "No date here");
    }

    #[test]
    fn broadcast_id_serializes_as_a_bare_string() {
        let id = BroadcastId::new("xyz123");

        assert_eq!(serde_json::to_string(&id).unwrap(), r#""xyz123""#);
    }
}
