//! Stem kinds and uploaded-artifact metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of audio stem produced by separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemType {
    Drums,
    Bass,
    Other,
    Vocals,
    Guitar,
    Piano,
}

impl StemType {
    /// Stem name as it appears in separation output filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            StemType::Drums => "drums",
            StemType::Bass => "bass",
            StemType::Other => "other",
            StemType::Vocals => "vocals",
            StemType::Guitar => "guitar",
            StemType::Piano => "piano",
        }
    }

    /// Human-readable name used in callback payloads.
    pub fn display_name(&self) -> &'static str {
        match self {
            StemType::Drums => "Drums",
            StemType::Bass => "Bass",
            StemType::Other => "Other",
            StemType::Vocals => "Vocals",
            StemType::Guitar => "Guitar",
            StemType::Piano => "Piano",
        }
    }
}

impl fmt::Display for StemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StemType {
    type Err = StemParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drums" => Ok(StemType::Drums),
            "bass" => Ok(StemType::Bass),
            "other" => Ok(StemType::Other),
            "vocals" => Ok(StemType::Vocals),
            "guitar" => Ok(StemType::Guitar),
            "piano" => Ok(StemType::Piano),
            _ => Err(StemParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown stem type: {0}")]
pub struct StemParseError(String);

/// Metadata for one uploaded stem artifact, as reported in the callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemInfo {
    /// Stem kind
    #[serde(rename = "type")]
    pub stem_type: StemType,
    /// Display name ("Drums", "Vocals", ...)
    pub name: String,
    /// Storage locator of the uploaded artifact
    pub url: String,
    /// Artifact size in bytes
    pub size: u64,
    /// Duration in seconds (0.0 when probing failed)
    pub duration: f64,
    /// Content hash, algorithm-prefixed ("sha256:<hex>")
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_filenames() {
        assert_eq!("vocals".parse::<StemType>().unwrap(), StemType::Vocals);
        assert_eq!("DRUMS".parse::<StemType>().unwrap(), StemType::Drums);
        assert!("strings".parse::<StemType>().is_err());
    }

    #[test]
    fn stem_info_wire_shape() {
        let info = StemInfo {
            stem_type: StemType::Vocals,
            name: "Vocals".to_string(),
            url: "https://cdn.example/v1/vocals.wav".to_string(),
            size: 1024,
            duration: 180.5,
            checksum: "sha256:abcd".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "vocals");
        assert_eq!(json["name"], "Vocals");
        assert_eq!(json["size"], 1024);
        assert_eq!(json["checksum"], "sha256:abcd");
    }
}
