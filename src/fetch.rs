//! # Snapshot Download
//!
//! OSCAR snapshots are served gzip-compressed (`oscar_vel9134.nc.gz`). This
//! module fetches one into the local data directory and inflates it next to
//! where the dataset reader expects it. A file already present on disk is
//! reused as is, so restarts don't re-download.

use flate2::read::GzDecoder;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// Errors that can occur while fetching a snapshot.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (network, server, or protocol error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing or inflating the local copy failed
    #[error("download IO: {0}")]
    Io(#[from] io::Error),
}

/// Local path of the inflated snapshot for `filename`.
pub fn local_path(data_dir: &Path, filename: &str) -> PathBuf {
    data_dir.join(filename.strip_suffix(".gz").unwrap_or(filename))
}

/// Download `<base_url>/<filename>` into `data_dir`, inflating `.gz` payloads.
///
/// Returns the path of the usable file.
pub async fn download_dataset(
    base_url: &str,
    filename: &str,
    data_dir: &Path,
) -> Result<PathBuf, FetchError> {
    let target = local_path(data_dir, filename);
    if target.exists() {
        info!(path = %target.display(), "using cached dataset");
        return Ok(target);
    }

    let url = format!("{}/{}", base_url.trim_end_matches('/'), filename);
    info!(%url, "downloading dataset");
    let body = reqwest::get(&url).await?.error_for_status()?.bytes().await?;

    fs::create_dir_all(data_dir)?;
    write_payload(&body, filename.ends_with(".gz"), &target)?;
    info!(
        path = %target.display(),
        bytes = body.len(),
        "dataset stored"
    );
    Ok(target)
}

/// Write `body` to `target`, gunzipping when `compressed`.
///
/// Goes through a `.part` file so a failed inflate never leaves a truncated
/// snapshot behind for the cache check to pick up.
fn write_payload(body: &[u8], compressed: bool, target: &Path) -> Result<(), io::Error> {
    let partial = target.with_extension("part");
    {
        let mut out = fs::File::create(&partial)?;
        if compressed {
            io::copy(&mut GzDecoder::new(body), &mut out)?;
        } else {
            io::copy(&mut &body[..], &mut out)?;
        }
    }
    fs::rename(&partial, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    #[test]
    fn test_local_path_drops_gz() {
        let dir = Path::new("/data/oscar");
        assert_eq!(
            local_path(dir, "oscar_vel9134.nc.gz"),
            PathBuf::from("/data/oscar/oscar_vel9134.nc")
        );
        assert_eq!(
            local_path(dir, "oscar_vel9134.nc"),
            PathBuf::from("/data/oscar/oscar_vel9134.nc")
        );
    }

    #[test]
    fn test_gzip_payload_is_inflated() {
        let dir = tempfile::tempdir().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"netcdf bytes").unwrap();
        let gz = enc.finish().unwrap();

        let target = local_path(dir.path(), "oscar_vel1.nc.gz");
        write_payload(&gz, true, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"netcdf bytes");
        assert!(!target.with_extension("part").exists());
    }

    #[test]
    fn test_corrupt_gzip_leaves_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let target = local_path(dir.path(), "oscar_vel1.nc.gz");
        assert!(write_payload(b"not gzip", true, &target).is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_existing_file_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let target = local_path(dir.path(), "oscar_vel1.nc.gz");
        fs::write(&target, b"cached").unwrap();
        // unroutable base URL: any network access would fail the test
        let path = download_dataset("http://127.0.0.1:9", "oscar_vel1.nc.gz", dir.path())
            .await
            .unwrap();
        assert_eq!(path, target);
    }
}
