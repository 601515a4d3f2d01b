use std::path::{Path, PathBuf};

use snafu::{Location, ResultExt, Snafu};
use tokio::process::Command;
use tracing::instrument;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ObsError {
    #[snafu(display("could not launch OBS at `{}`", path.display()))]
    Launch {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Launches OBS detached, already streaming to its configured ingest.
pub struct ObsLauncher {
    path: PathBuf,
}

impl ObsLauncher {
    /// Uses `path` when given, otherwise the conventional install location
    /// for this operating system.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(|| default_path(std::env::consts::OS)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spawns OBS with `--startstreaming` and lets go of the child: the
    /// launcher exits long before OBS does.
    ///
    /// OBS finds its locale and plugin files relative to the working
    /// directory, so the spawn runs from the binary's own directory.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn launch(&self) -> Result<(), ObsError> {
        let mut command = Command::new(&self.path);
        command.arg("--startstreaming");

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command.spawn().context(LaunchSnafu { path: &self.path })?;
        tracing::info!(pid = child.id(), "OBS launched");

        Ok(())
    }
}

/// Conventional OBS install location per operating system; the bare `obs`
/// falls back to a PATH lookup.
fn default_path(os: &str) -> PathBuf {
    match os {
        "windows" => PathBuf::from(r"C:\Program Files\obs-studio\bin\64bit\obs64.exe"),
        "macos" => PathBuf::from("/Applications/OBS.app/Contents/MacOS/OBS"),
        _ => PathBuf::from("obs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_platform_gets_its_conventional_install_path() {
        assert_eq!(
            default_path("windows"),
            PathBuf::from(r"C:\Program Files\obs-studio\bin\64bit\obs64.exe")
        );
        assert_eq!(
            default_path("macos"),
            PathBuf::from("/Applications/OBS.app/Contents/MacOS/OBS")
        );
        assert_eq!(default_path("linux"), PathBuf::from("obs"));
    }

    #[test]
    fn an_explicit_path_wins_over_the_default() {
        let launcher = ObsLauncher::new(Some(PathBuf::from("/opt/obs/bin/obs")));

        assert_eq!(launcher.path(), Path::new("/opt/obs/bin/obs"));
    }

    #[tokio::test]
    async fn launch_failure_names_the_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ObsLauncher::new(Some(dir.path().join("no-such-obs")));

        let error = launcher.launch().unwrap_err();

        assert!(matches!(error, ObsError::Launch { .. }));
        assert!(error.to_string().contains("no-such-obs"));
    }
}
