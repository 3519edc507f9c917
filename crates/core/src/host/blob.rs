//! Blob transfers against pre-signed URIs.
//!
//! Pre-signed URIs carry their own authorization in the query string, so
//! these requests never send the host bearer token, and URIs are logged
//! with the query stripped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::HostError;

/// File name used when the download URI has no usable last path segment.
pub const FALLBACK_OUTPUT_NAME: &str = "project-output.zip";

/// HTTP client for pre-signed blob URIs.
#[derive(Clone)]
pub struct BlobClient {
    client: Client,
}

impl BlobClient {
    pub fn new(timeout: Duration) -> Result<Self, HostError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HostError::from_reqwest)?;
        Ok(Self { client })
    }

    /// Upload a local file as a block blob. Returns the number of bytes sent.
    pub async fn put_file(&self, uri: &str, path: &Path) -> Result<u64, HostError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        let len = data.len() as u64;

        debug!("Uploading {} bytes from {:?} to {}", len, path, redact_uri(uri));

        let response = self
            .client
            .put(uri)
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(HostError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                endpoint: redact_uri(uri),
            });
        }

        Ok(len)
    }

    /// Stream a blob into `destination` (a directory, created if missing).
    ///
    /// The body is written to a `.part` file first and renamed once complete,
    /// so an interrupted download never leaves a truncated output behind.
    pub async fn get_to_dir(&self, uri: &str, destination: &Path) -> Result<PathBuf, HostError> {
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| HostError::io(destination, e))?;

        let name = blob_file_name(uri).unwrap_or_else(|| FALLBACK_OUTPUT_NAME.to_string());
        let target = destination.join(&name);
        let partial = destination.join(format!("{}.part", name));

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(HostError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                endpoint: redact_uri(uri),
            });
        }

        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {:?}: {}", partial, cleanup);
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| HostError::io(&target, e))?;

        debug!("Downloaded {} bytes from {} to {:?}", written, redact_uri(uri), target);
        Ok(target)
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64, HostError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| HostError::io(path, e))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(HostError::from_reqwest)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| HostError::io(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| HostError::io(path, e))?;
    Ok(written)
}

/// Last non-empty path segment of the URI, percent-decoded.
pub fn blob_file_name(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?.to_string();
    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);
    if decoded.is_empty() || decoded.contains('/') || decoded == ".." {
        None
    } else {
        Some(decoded)
    }
}

/// Drop the query string (which carries the signature) for logging.
pub fn redact_uri(uri: &str) -> String {
    match uri.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => uri.to_string(),
    }
}
