//! ffprobe wrapper for stem metadata.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Format-level metadata of an audio file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    /// Duration in seconds. Zero when ffprobe reports none.
    pub duration: f64,
    /// Size in bytes as reported by the container.
    pub size: u64,
}

// ffprobe's -print_format json; numbers arrive as strings
#[derive(Debug, Deserialize)]
struct ProbeJson {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Probes an audio file with ffprobe.
pub async fn probe_audio(path: &Path) -> MediaResult<AudioInfo> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    if which::which("ffprobe").is_err() {
        return Err(MediaError::FfprobeNotFound);
    }

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed {
            message: format!("ffprobe exited with {:?}", output.status.code()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }

    let parsed: ProbeJson = serde_json::from_slice(&output.stdout)?;
    let format = parsed.format.unwrap_or_default();

    let duration: f64 = format.duration.and_then(|d| d.parse().ok()).unwrap_or(0.0);
    let size: u64 = format.size.and_then(|s| s.parse().ok()).unwrap_or(0);

    debug!(
        "Probed {}: duration {:.2}s, size {} bytes",
        path.display(),
        duration,
        size
    );

    Ok(AudioInfo { duration, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = probe_audio(Path::new("/nonexistent/input.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn ffprobe_json_parses_with_string_numbers() {
        let raw = r#"{"format":{"duration":"184.32","size":"29184000"}}"#;
        let parsed: ProbeJson = serde_json::from_str(raw).unwrap();
        let format = parsed.format.unwrap();
        assert_eq!(format.duration.as_deref(), Some("184.32"));
        assert_eq!(format.size.as_deref(), Some("29184000"));
    }

    #[test]
    fn ffprobe_json_tolerates_missing_fields() {
        let raw = r#"{"format":{}}"#;
        let parsed: ProbeJson = serde_json::from_str(raw).unwrap();
        assert!(parsed.format.unwrap().duration.is_none());
    }
}
