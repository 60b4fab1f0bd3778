//! Bootstrapping the SteamCMD distribution.
//!
//! SteamCMD ships as a small tar.gz containing `steamcmd.sh` and a 32-bit
//! runtime; on first launch it updates itself. Bootstrapping therefore only
//! has to put that archive's contents into the tool directory.
//!
//! The archive is streamed: the HTTP body is piped through a gzip decoder into
//! the tar reader, so nothing larger than a read buffer is held in memory.
//! Entries land in a staging directory first and are promoted into the tool
//! directory only after the whole archive unpacked, so an interrupted download
//! never leaves behind an entry point that looks installed.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path};
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::BootstrapError;
use crate::paths;

// ============================================================================
// Bootstrap Source
// ============================================================================

/// Where the SteamCMD distribution is downloaded from.
#[cfg(target_os = "macos")]
pub const DEFAULT_BOOTSTRAP_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_osx.tar.gz";

/// Where the SteamCMD distribution is downloaded from.
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_BOOTSTRAP_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";

/// Allowed domains for downloading SteamCMD.
const ALLOWED_DOMAINS: &[&str] = &["akamaihd.net", "steamstatic.com", "steampowered.com"];

/// Default limit for the whole download, body included.
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Validates that a URL is safe for downloading.
///
/// Checks:
/// - URL scheme must be HTTPS
/// - Host must be one of Valve's CDN domains
fn validate_url(url_str: &str) -> Result<(), BootstrapError> {
    let invalid = |reason: String| BootstrapError::InvalidUrl {
        url: url_str.to_string(),
        reason,
    };

    let url = Url::parse(url_str).map_err(|e| invalid(e.to_string()))?;

    if url.scheme() != "https" {
        return Err(invalid("URL must use HTTPS".to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| invalid("URL must have a host".to_string()))?;

    let is_allowed = ALLOWED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)));

    if !is_allowed {
        return Err(invalid(format!(
            "domain {} not allowed, expected one of {:?}",
            host, ALLOWED_DOMAINS
        )));
    }

    Ok(())
}

// ============================================================================
// Fetch Pipeline
// ============================================================================

/// Downloads an archive and unpacks it into a directory.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Fetches `url` and extracts its contents into `dest`, which exists.
    async fn fetch_and_extract(&self, url: &str, dest: &Path) -> Result<(), BootstrapError>;
}

/// Streams a tar.gz over HTTPS straight into the destination directory.
#[derive(Debug, Clone)]
pub struct HttpTarballFetcher {
    timeout: Duration,
}

impl Default for HttpTarballFetcher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl HttpTarballFetcher {
    /// Creates a fetcher that gives up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ArchiveFetcher for HttpTarballFetcher {
    async fn fetch_and_extract(&self, url: &str, dest: &Path) -> Result<(), BootstrapError> {
        validate_url(url)?;

        let url = url.to_string();
        let dest = dest.to_path_buf();
        let timeout = self.timeout;

        // reqwest's blocking body implements Read, which the tar reader needs.
        let unpacked =
            tokio::task::spawn_blocking(move || download_and_unpack(&url, &dest, timeout))
                .await??;

        debug!("Unpacked {} archive entries", unpacked);
        Ok(())
    }
}

fn download_and_unpack(url: &str, dest: &Path, timeout: Duration) -> Result<usize, BootstrapError> {
    info!("Downloading {} to {}", url, dest.display());

    let download_err = |source| BootstrapError::Download {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(download_err)?;

    let response = client.get(url).send().map_err(download_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(BootstrapError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    debug!("Content-Length: {:?}", response.content_length());

    let decoder = GzDecoder::new(BufReader::new(response));
    unpack_tar(decoder, dest).map_err(|source| BootstrapError::Extract {
        path: dest.to_path_buf(),
        source,
    })
}

// ============================================================================
// TAR Extraction
// ============================================================================

/// Unpacks a tar stream into `dest_dir`, returning the number of files written.
///
/// Links, absolute paths and `..` components are skipped. Executable bits from
/// the archive are kept.
pub fn unpack_tar<R: Read>(reader: R, dest_dir: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut written = 0;

    fs::create_dir_all(dest_dir)?;

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping link in steamcmd archive");
            continue;
        }

        let path = entry.path()?.into_owned();
        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            warn!("Skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)?;
            io::copy(&mut entry, &mut outfile)?;
            outfile.flush()?;

            #[cfg(unix)]
            {
                if let Ok(mode) = entry.header().mode() {
                    set_unix_permissions(&dest_path, mode)?;
                }
            }

            written += 1;
        }
    }

    debug!("TAR extraction complete");
    Ok(written)
}

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if mode & 0o111 != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode((mode & 0o7777) | 0o755))?;
    }
    Ok(())
}

// ============================================================================
// Presence Check
// ============================================================================

/// True if `path` is a file carrying at least one execute bit.
///
/// Any failure to inspect the file counts as "not executable".
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Makes sure SteamCMD is present and executable in `tool_dir`.
///
/// Performs no network access when the entry point is already executable.
/// Callers must hold the tool directory lock.
pub(crate) async fn ensure_installed(
    tool_dir: &Path,
    url: &str,
    fetcher: &dyn ArchiveFetcher,
) -> Result<(), BootstrapError> {
    let entry = paths::entry_point(tool_dir);
    if is_executable(&entry) {
        debug!("SteamCMD already present at {}", entry.display());
        return Ok(());
    }

    info!(
        "SteamCMD not found at {}, bootstrapping from {}",
        entry.display(),
        url
    );

    tokio::fs::create_dir_all(tool_dir)
        .await
        .map_err(|source| BootstrapError::CreateDir {
            path: tool_dir.to_path_buf(),
            source,
        })?;

    let staging = paths::staging_dir(tool_dir);

    // Clean up any previous partial bootstrap
    if tokio::fs::metadata(&staging).await.is_ok() {
        tokio::fs::remove_dir_all(&staging)
            .await
            .map_err(|source| BootstrapError::Extract {
                path: staging.clone(),
                source,
            })?;
    }
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(|source| BootstrapError::CreateDir {
            path: staging.clone(),
            source,
        })?;

    if let Err(e) = fetcher.fetch_and_extract(url, &staging).await {
        if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
            warn!("Failed to clean up {}: {}", staging.display(), cleanup);
        }
        return Err(e);
    }

    promote(&staging, tool_dir)
        .await
        .map_err(|source| BootstrapError::Extract {
            path: tool_dir.to_path_buf(),
            source,
        })?;

    if !is_executable(&entry) {
        return Err(BootstrapError::EntryPointMissing(entry));
    }

    info!("SteamCMD bootstrapped into {}", tool_dir.display());
    Ok(())
}

/// Moves every top-level entry of `staging` into `dest`, replacing old copies.
async fn promote(staging: &Path, dest: &Path) -> io::Result<()> {
    let mut entries = tokio::fs::read_dir(staging).await?;

    while let Some(entry) = entries.next_entry().await? {
        let source = entry.path();
        let target = dest.join(entry.file_name());

        if let Ok(existing) = tokio::fs::symlink_metadata(&target).await {
            if existing.is_dir() {
                tokio::fs::remove_dir_all(&target).await?;
            } else {
                tokio::fs::remove_file(&target).await?;
            }
        }

        tokio::fs::rename(&source, &target).await?;
    }

    tokio::fs::remove_dir(staging).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Builds an in-memory tar.gz from `(path, mode, contents)` triples.
    fn tar_gz(files: &[(&str, u32, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, mode, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Fake pipeline: unpacks a fixed archive and counts invocations.
    struct FakeFetcher {
        archive: Vec<u8>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ArchiveFetcher for FakeFetcher {
        async fn fetch_and_extract(&self, _url: &str, dest: &Path) -> Result<(), BootstrapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            unpack_tar(GzDecoder::new(Cursor::new(self.archive.clone())), dest)
                .map(|_| ())
                .map_err(|source| BootstrapError::Extract {
                    path: dest.to_path_buf(),
                    source,
                })
        }
    }

    fn steamcmd_archive() -> Vec<u8> {
        tar_gz(&[
            ("steamcmd.sh", 0o755, &b"#!/bin/sh\nexit 0\n"[..]),
            ("linux32/steamcmd", 0o755, &b"\x7fELF"[..]),
        ])
    }

    fn fake(archive: Vec<u8>) -> (FakeFetcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            FakeFetcher {
                archive,
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[test]
    fn test_validate_url_https_required() {
        assert!(validate_url(DEFAULT_BOOTSTRAP_URL).is_ok());
        assert!(validate_url(
            "http://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz"
        )
        .is_err());
    }

    #[test]
    fn test_validate_url_allowed_domains() {
        assert!(validate_url("https://cdn.steamstatic.com/steamcmd.tar.gz").is_ok());
        assert!(validate_url("https://evil.com/steamcmd.tar.gz").is_err());
        assert!(validate_url("https://akamaihd.net.evil.org/steamcmd.tar.gz").is_err());
    }

    #[test]
    fn test_validate_url_invalid() {
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_unpack_tar_gz_stream() {
        let temp_dir = TempDir::new().unwrap();
        let archive = steamcmd_archive();

        let written = unpack_tar(GzDecoder::new(Cursor::new(archive)), temp_dir.path()).unwrap();

        assert_eq!(written, 2);
        assert!(temp_dir.path().join("linux32/steamcmd").is_file());
        let script = fs::read_to_string(temp_dir.path().join("steamcmd.sh")).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_keeps_exec_bits() {
        let temp_dir = TempDir::new().unwrap();
        let archive = tar_gz(&[
            ("steamcmd.sh", 0o755, &b"#!/bin/sh\n"[..]),
            ("README.txt", 0o644, &b"hello"[..]),
        ]);

        unpack_tar(GzDecoder::new(Cursor::new(archive)), temp_dir.path()).unwrap();

        assert!(is_executable(&temp_dir.path().join("steamcmd.sh")));
        assert!(!is_executable(&temp_dir.path().join("README.txt")));
    }

    #[test]
    fn test_unpack_skips_links() {
        let temp_dir = TempDir::new().unwrap();
        let extract_dir = temp_dir.path().join("extracted");
        let escape_target = temp_dir.path().join("escaped_file.txt");

        let archive = {
            let encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            builder
                .append_link(&mut header, "escape_link", "../escaped_file.txt")
                .unwrap();

            let data = b"This should NOT appear outside extraction dir!";
            let mut file_header = tar::Header::new_gnu();
            file_header.set_path("escape_link").unwrap();
            file_header.set_size(data.len() as u64);
            file_header.set_mode(0o644);
            file_header.set_cksum();
            builder.append(&file_header, &data[..]).unwrap();

            builder.into_inner().unwrap().finish().unwrap()
        };

        unpack_tar(GzDecoder::new(Cursor::new(archive)), &extract_dir).unwrap();

        assert!(!escape_target.exists());
        assert!(extract_dir.join("escape_link").is_file());
    }

    #[test]
    fn test_unpack_truncated_archive_fails() {
        let temp_dir = TempDir::new().unwrap();

        // Poorly compressible payload so truncation lands inside file data.
        let mut state: u32 = 0x2545_f491;
        let payload: Vec<u8> = (0..256 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();

        let archive = tar_gz(&[("linux32/steamcmd", 0o755, payload.as_slice())]);
        let truncated = &archive[..archive.len() / 2];

        let result = unpack_tar(GzDecoder::new(Cursor::new(truncated)), temp_dir.path());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("steamcmd.sh");

        assert!(!is_executable(&path));

        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&path));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o744)).unwrap();
        assert!(is_executable(&path));

        assert!(!is_executable(temp_dir.path()));
    }

    #[tokio::test]
    async fn test_ensure_installed_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let tool_dir = temp_dir.path().join("steamcmd");
        let (fetcher, calls) = fake(steamcmd_archive());

        ensure_installed(&tool_dir, DEFAULT_BOOTSTRAP_URL, &fetcher)
            .await
            .unwrap();
        ensure_installed(&tool_dir, DEFAULT_BOOTSTRAP_URL, &fetcher)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(is_executable(&paths::entry_point(&tool_dir)));
        assert!(tool_dir.join("linux32/steamcmd").is_file());
        assert!(!paths::staging_dir(&tool_dir).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_entry_point_triggers_bootstrap() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let tool_dir = temp_dir.path().to_path_buf();
        let entry = paths::entry_point(&tool_dir);
        fs::write(&entry, "stale").unwrap();
        fs::set_permissions(&entry, fs::Permissions::from_mode(0o644)).unwrap();

        let (fetcher, calls) = fake(steamcmd_archive());
        ensure_installed(&tool_dir, DEFAULT_BOOTSTRAP_URL, &fetcher)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(is_executable(&entry));
        assert!(fs::read_to_string(&entry).unwrap().starts_with("#!/bin/sh"));
    }

    #[tokio::test]
    async fn test_failed_bootstrap_leaves_no_entry_point() {
        struct PartialFetcher;

        #[async_trait]
        impl ArchiveFetcher for PartialFetcher {
            async fn fetch_and_extract(
                &self,
                _url: &str,
                dest: &Path,
            ) -> Result<(), BootstrapError> {
                fs::write(dest.join("steamcmd.sh"), "#!/bin/sh\n").unwrap();
                Err(BootstrapError::Extract {
                    path: dest.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset"),
                })
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let tool_dir = temp_dir.path().join("steamcmd");

        let err = ensure_installed(&tool_dir, DEFAULT_BOOTSTRAP_URL, &PartialFetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Extract { .. }));
        assert!(!paths::entry_point(&tool_dir).exists());
        assert!(!paths::staging_dir(&tool_dir).exists());

        // Retrying with a working pipeline succeeds.
        let (fetcher, calls) = fake(steamcmd_archive());
        ensure_installed(&tool_dir, DEFAULT_BOOTSTRAP_URL, &fetcher)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(is_executable(&paths::entry_point(&tool_dir)));
    }

    #[tokio::test]
    async fn test_archive_without_entry_point_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (fetcher, _calls) = fake(tar_gz(&[("README.txt", 0o644, &b"nothing here"[..])]));

        let err = ensure_installed(temp_dir.path(), DEFAULT_BOOTSTRAP_URL, &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::EntryPointMissing(_)));
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_untrusted_url() {
        let temp_dir = TempDir::new().unwrap();
        let err = HttpTarballFetcher::default()
            .fetch_and_extract("http://example.com/steamcmd.tar.gz", temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidUrl { .. }));
    }
}
