//! File download operations with atomic writes and streaming
//!
//! Bytes are streamed into a temporary file created next to the destination
//! and renamed into place only once the transfer completes. An interrupted
//! transfer drops the temporary file, so the final path never holds a
//! partial download.

use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use tempfile::{Builder, NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

/// What a completed download produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Filename advertised by `Content-Disposition`, if any
    pub cd_filename: Option<String>,
}

/// File download operations handler
pub struct DownloadHandler<'a> {
    http_handler: &'a HttpHandler,
}

impl<'a> DownloadHandler<'a> {
    pub fn new(http_handler: &'a HttpHandler) -> Self {
        Self { http_handler }
    }

    /// Downloads `url` to `destination`, replacing any existing file
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails, the server answers with
    /// an error status, writing fails, or the final rename fails
    pub async fn download_file(
        &self,
        url: &Url,
        destination: &Path,
    ) -> DownloadResult<DownloadOutcome> {
        let response = self.http_handler.get_response(url).await?;
        let cd_filename = content_disposition_filename(response.headers());

        let temp_file = temp_file_for(destination)?;
        let (std_file, temp_path) = temp_file.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        install_atomically(temp_path, destination)?;
        tracing::info!(
            "Downloaded {} ({} bytes)",
            destination.display(),
            bytes
        );

        Ok(DownloadOutcome { bytes, cd_filename })
    }
}

/// Create a temporary file in the destination's directory, creating the
/// directory if needed
fn temp_file_for(destination: &Path) -> DownloadResult<NamedTempFile> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    Ok(Builder::new()
        .prefix(files::TEMP_FILE_PREFIX)
        .suffix(files::TEMP_FILE_SUFFIX)
        .tempfile_in(parent)?)
}

/// Atomically move a completed temporary file to its final path
pub fn install_atomically(temp_path: TempPath, destination: &Path) -> DownloadResult<()> {
    let temp = temp_path.to_path_buf();
    temp_path
        .persist(destination)
        .map_err(|e| {
            tracing::error!(
                "Rename {} -> {} failed: {}",
                temp.display(),
                destination.display(),
                e.error
            );
            DownloadError::AtomicOperationFailed {
                temp_path: temp,
                final_path: destination.to_path_buf(),
            }
        })
}

/// Write `contents` to `destination` with the same temp-then-rename pattern
pub fn write_atomically(destination: &Path, contents: &[u8]) -> DownloadResult<()> {
    let mut temp_file = temp_file_for(destination)?;
    temp_file.write_all(contents)?;
    temp_file.as_file().sync_all()?;
    install_atomically(temp_file.into_temp_path(), destination)
}

/// Filename from a `Content-Disposition` header
///
/// `filename*` (RFC 5987) wins over `filename`. Any directory part is
/// stripped.
pub fn content_disposition_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    parse_content_disposition(value)
}

fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let raw = raw.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
                extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
            }
            "filename" => plain = Some(raw.to_string()),
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|name| {
            name.rsplit(['/', '\\'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tempfile::tempdir;

    #[test]
    fn test_content_disposition_plain() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="Episode 1.mp3""#),
            Some("Episode 1.mp3".to_string())
        );
    }

    #[test]
    fn test_content_disposition_extended_wins() {
        assert_eq!(
            parse_content_disposition(
                "attachment; filename=\"fallback.mp3\"; filename*=UTF-8''%C3%A9pisode%201.mp3"
            ),
            Some("épisode 1.mp3".to_string())
        );
    }

    #[test]
    fn test_content_disposition_strips_directories() {
        assert_eq!(
            parse_content_disposition("attachment; filename=\"../../etc/passwd\""),
            Some("passwd".to_string())
        );
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_disposition_filename(&headers), None);
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=ep.mp3"),
        );
        assert_eq!(
            content_disposition_filename(&headers),
            Some("ep.mp3".to_string())
        );
    }

    #[test]
    fn test_write_atomically_creates_directories_and_replaces() {
        let temp_dir = tempdir().unwrap();
        let destination = temp_dir.path().join("nested").join("feed.xml");

        write_atomically(&destination, b"first").unwrap();
        write_atomically(&destination, b"second").unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(destination.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(files::TEMP_FILE_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }
}
