use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::{ensure, Location, OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::config::{api_root, Config};
use crate::error::{LauncherError, LocateExecutableSnafu};

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum UpdateError {
    /// could not reach the release feed
    FetchRelease {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("release feed answered {status}"))]
    ReleaseDenied { status: reqwest::StatusCode },

    #[snafu(display("release {tag} has no `{asset}` asset for this platform"))]
    NoAsset { tag: String, asset: String },

    /// could not download the release asset
    Download {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not stage the new binary at `{}`", path.display()))]
    Stage {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not swap the new binary into place
    Swap {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Replaces the running binary with the newest published release, if there
/// is one.
pub async fn run(config: &Config) -> Result<(), LauncherError> {
    let client = super::public_client()?;
    let base = api_root(&config.release_api_base);

    let release = latest_release(&client, &base).await?;
    if is_current(&release.tag_name) {
        println!("Already up to date ({CURRENT_VERSION})");
        return Ok(());
    }

    let wanted = asset_name(std::env::consts::OS, std::env::consts::ARCH);
    let asset = release
        .assets
        .iter()
        .find(|asset| asset.name == wanted)
        .context(NoAssetSnafu {
            tag: release.tag_name.clone(),
            asset: wanted.clone(),
        })?;

    println!("Updating {CURRENT_VERSION} -> {}", release.tag_name);

    let exe = std::env::current_exe().context(LocateExecutableSnafu)?;
    let staged = exe.with_extension("new");
    download_to(&client, &asset.browser_download_url, &staged).await?;
    swap_in(&staged, &exe).await.context(SwapSnafu)?;

    println!("Updated to {}", release.tag_name);

    Ok(())
}

#[instrument(skip(client))]
async fn latest_release(client: &reqwest::Client, base: &str) -> Result<Release, UpdateError> {
    let response = client
        .get(format!("{base}/latest"))
        .send()
        .await
        .context(FetchReleaseSnafu)?;

    let status = response.status();
    ensure!(status.is_success(), ReleaseDeniedSnafu { status });

    response.json().await.context(FetchReleaseSnafu)
}

async fn download_to(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<(), UpdateError> {
    let response = client.get(url).send().await.context(DownloadSnafu)?;
    let response = response.error_for_status().context(DownloadSnafu)?;

    let bytes = response.bytes().await.context(DownloadSnafu)?;

    tokio::fs::write(path, &bytes).await.context(StageSnafu { path })
}

/// Release tags compare with or without their leading `v`.
fn is_current(tag: &str) -> bool {
    tag.trim_start_matches('v') == CURRENT_VERSION
}

/// Release assets are named `heliocast-<os>-<arch>`, with `.exe` on Windows.
fn asset_name(os: &str, arch: &str) -> String {
    let suffix = if os == "windows" { ".exe" } else { "" };

    format!("heliocast-{os}-{arch}{suffix}")
}

#[cfg(unix)]
async fn swap_in(staged: &Path, exe: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(staged, std::fs::Permissions::from_mode(0o755)).await?;
    tokio::fs::rename(staged, exe).await
}

/// The running binary cannot be removed on Windows, only renamed; the stale
/// `.old` copy is swept by the next update.
#[cfg(windows)]
async fn swap_in(staged: &Path, exe: &Path) -> std::io::Result<()> {
    let retired = exe.with_extension("old");
    let _ = tokio::fs::remove_file(&retired).await;
    tokio::fs::rename(exe, &retired).await?;

    tokio::fs::rename(staged, exe).await
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_with_or_without_the_v_prefix() {
        assert!(is_current(concat!("v", env!("CARGO_PKG_VERSION"))));
        assert!(is_current(env!("CARGO_PKG_VERSION")));
        assert!(!is_current("v99.0.0"));
    }

    #[test]
    fn asset_names_carry_platform_and_architecture() {
        assert_eq!(asset_name("windows", "x86_64"), "heliocast-windows-x86_64.exe");
        assert_eq!(asset_name("linux", "aarch64"), "heliocast-linux-aarch64");
        assert_eq!(asset_name("macos", "aarch64"), "heliocast-macos-aarch64");
    }

    #[test]
    fn releases_decode_the_fields_we_read() {
        let release: Release = serde_json::from_str(
            r#"{
                "tag_name": "v0.2.0",
                "name": "0.2.0",
                "prerelease": false,
                "assets": [{
                    "name": "heliocast-linux-x86_64",
                    "browser_download_url": "https://releases.example/heliocast-linux-x86_64",
                    "size": 1048576
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(release.tag_name, "v0.2.0");
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].name, "heliocast-linux-x86_64");
    }
}
