use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use snafu::{ensure, Location, ResultExt, Snafu};
use tracing::instrument;

use crate::model::BroadcastId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HandoffError {
    #[snafu(display(
        "no handoff file at `{}`: run `heliocast stream schedule` first, or pass --id",
        path.display()
    ))]
    NoBroadcast { path: PathBuf },

    #[snafu(display("could not read the handoff file `{}`", path.display()))]
    ReadHandoff {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("handoff file `{}` is empty", path.display()))]
    EmptyHandoff { path: PathBuf },

    #[snafu(display("could not write the handoff file `{}`", path.display()))]
    WriteHandoff {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Carries the broadcast id from the scheduling run to the deferred start
/// and end runs through a file on disk.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    path: PathBuf,
}

impl HandoffStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self))]
    pub async fn write(&self, id: &BroadcastId) -> Result<(), HandoffError> {
        tokio::fs::write(&self.path, id.as_str())
            .await
            .context(WriteHandoffSnafu { path: &self.path })
    }

    #[instrument(skip(self))]
    pub async fn read(&self) -> Result<BroadcastId, HandoffError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return NoBroadcastSnafu { path: &self.path }.fail();
            }
            Err(error) => return Err(error).context(ReadHandoffSnafu { path: &self.path }),
        };

        let id = raw.trim();
        ensure!(!id.is_empty(), EmptyHandoffSnafu { path: &self.path });

        Ok(BroadcastId::new(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_written_id_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(dir.path().join("broadcast_id.txt"));

        store.write(&BroadcastId::new("bcast-42")).await.unwrap();
        let id = store.read().await.unwrap();

        assert_eq!(id.as_str(), "bcast-42");
    }

    #[tokio::test]
    async fn surrounding_whitespace_is_trimmed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broadcast_id.txt");
        tokio::fs::write(&path, "\n  bcast-42  \n").await.unwrap();

        let id = HandoffStore::new(path).read().await.unwrap();

        assert_eq!(id.as_str(), "bcast-42");
    }

    #[tokio::test]
    async fn a_missing_file_tells_the_operator_to_schedule_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(dir.path().join("broadcast_id.txt"));

        let error = store.read().await.unwrap_err();

        assert!(matches!(error, HandoffError::NoBroadcast { .. }));
        assert!(error.to_string().contains("stream schedule"));
    }

    #[tokio::test]
    async fn a_blank_file_is_reported_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broadcast_id.txt");
        tokio::fs::write(&path, "   \n").await.unwrap();

        let error = HandoffStore::new(path).read().await.unwrap_err();

        assert!(matches!(error, HandoffError::EmptyHandoff { .. }));
    }
}
