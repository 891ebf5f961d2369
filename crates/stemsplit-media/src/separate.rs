//! The demucs separation subprocess.
//!
//! Separation is delegated to the demucs CLI so the GPU-heavy Python stack
//! stays out of this process. The [`Separator`] trait is the seam the worker
//! tests mock; [`DemucsSeparator`] is the real thing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use stemsplit_models::{ModelVariant, StemType};

use crate::error::{MediaError, MediaResult};

/// How much of the subprocess stderr to keep in error reports.
const STDERR_TAIL_CHARS: usize = 2048;

/// One separated stem on disk.
#[derive(Debug, Clone)]
pub struct SeparatedStem {
    pub stem_type: StemType,
    pub path: PathBuf,
}

/// Splits an input file into stems under `out_dir`.
///
/// The future must be cancel-safe: dropping it kills any child process so
/// the worker can enforce a wall-clock deadline with `tokio::time::timeout`.
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
        model: ModelVariant,
    ) -> MediaResult<Vec<SeparatedStem>>;
}

/// Runs `demucs -n <model> -o <out_dir> <input>`.
pub struct DemucsSeparator {
    bin: String,
}

impl DemucsSeparator {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Reads `DEMUCS_BIN`, defaulting to `demucs` on the PATH.
    pub fn from_env() -> Self {
        Self::new(std::env::var("DEMUCS_BIN").unwrap_or_else(|_| "demucs".to_string()))
    }
}

#[async_trait]
impl Separator for DemucsSeparator {
    async fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
        model: ModelVariant,
    ) -> MediaResult<Vec<SeparatedStem>> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        which::which(&self.bin).map_err(|_| MediaError::DemucsNotFound(self.bin.clone()))?;

        info!(
            "Running {} with model {} on {}",
            self.bin,
            model.as_str(),
            input.display()
        );

        let output = Command::new(&self.bin)
            .args(["-n", model.as_str(), "-o"])
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::SeparationFailed {
                message: format!("demucs exited with {:?}", output.status.code()),
                stderr: Some(tail(&stderr, STDERR_TAIL_CHARS)),
                exit_code: output.status.code(),
            });
        }

        collect_stems(out_dir, model, input)
    }
}

/// Locates the stem files demucs wrote.
///
/// The CLI lays files out as `<out>/<model>/<track>/<stem>.wav` where
/// `<track>` is the input file stem; older invocations write straight into
/// `<out>/<model>/`. Both layouts are accepted.
fn collect_stems(
    out_dir: &Path,
    model: ModelVariant,
    input: &Path,
) -> MediaResult<Vec<SeparatedStem>> {
    let model_dir = out_dir.join(model.as_str());
    let base = match input.file_stem() {
        Some(track) if model_dir.join(track).is_dir() => model_dir.join(track),
        _ => model_dir,
    };

    let mut stems = Vec::new();
    for stem_type in model.expected_stems() {
        let path = base.join(format!("{}.wav", stem_type.as_str()));
        if path.is_file() {
            debug!("Found stem {} at {}", stem_type.as_str(), path.display());
            stems.push(SeparatedStem {
                stem_type: *stem_type,
                path,
            });
        } else {
            warn!(
                "Expected stem {} missing at {}",
                stem_type.as_str(),
                path.display()
            );
        }
    }

    if stems.is_empty() {
        return Err(MediaError::SeparationFailed {
            message: format!("no stems produced under {}", base.display()),
            stderr: None,
            exit_code: None,
        });
    }
    Ok(stems)
}

/// Last `n` characters of `s`, on a char boundary.
fn tail(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        s.to_string()
    } else {
        s.chars().skip(count - n).collect()
    }
}
