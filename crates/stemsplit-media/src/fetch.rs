//! Streaming download of the source audio.
//!
//! The input file can be large, so the body is streamed to disk chunk by
//! chunk and the byte cap is enforced as data arrives rather than after
//! the fact. The file extension is derived from the response content type
//! so demucs sees a sensible input name.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Picks a file extension from the response content type, defaulting to wav.
fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.contains("audio/wav") || ct.contains("audio/x-wav") => "wav",
        Some(ct) if ct.contains("audio/mpeg") || ct.contains("audio/mp3") => "mp3",
        Some(ct) if ct.contains("audio/flac") || ct.contains("audio/x-flac") => "flac",
        Some(ct) if ct.contains("audio/ogg") => "ogg",
        _ => "wav",
    }
}

/// Downloads `url` into `dest_dir`, returning the path of the written file.
///
/// Fails with [`MediaError::ResourceLimit`] as soon as the body exceeds
/// `max_bytes`, whether the server declared a Content-Length or not. The
/// partial file is left behind for the caller's temp dir cleanup.
pub async fn download_audio(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    max_bytes: u64,
) -> MediaResult<PathBuf> {
    debug!("Downloading source audio from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MediaError::fetch_failed(format!("request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::fetch_failed(format!(
            "{} returned {}",
            url, status
        )));
    }

    if let Some(declared) = response.content_length() {
        if declared > max_bytes {
            return Err(MediaError::ResourceLimit(format!(
                "input size {} bytes exceeds limit of {} bytes",
                declared, max_bytes
            )));
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let ext = extension_for(content_type.as_deref());

    let path = dest_dir.join(format!("input.{}", ext));
    let mut file = File::create(&path).await?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| MediaError::fetch_failed(format!("stream from {} failed: {}", url, e)))?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(MediaError::ResourceLimit(format!(
                "input exceeded limit of {} bytes while streaming",
                max_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    info!(
        "Downloaded {} bytes to {} (content type {:?})",
        written,
        path.display(),
        content_type
    );
    Ok(path)
}
