//! Separation model variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::stem::StemType;

/// Demucs model variant selecting which processing configuration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Hybrid transformer model, the default 4-stem configuration
    #[default]
    Htdemucs,
    /// Fine-tuned variant, slower but higher quality
    HtdemucsFt,
    /// 6-stem variant adding guitar and piano
    #[serde(rename = "htdemucs_6s")]
    Htdemucs6s,
    /// Legacy MDX model
    Mdx,
    /// Legacy MDX trained with extra data
    MdxExtra,
}

impl ModelVariant {
    /// Model name as passed to the separation CLI (`-n <name>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Htdemucs => "htdemucs",
            ModelVariant::HtdemucsFt => "htdemucs_ft",
            ModelVariant::Htdemucs6s => "htdemucs_6s",
            ModelVariant::Mdx => "mdx",
            ModelVariant::MdxExtra => "mdx_extra",
        }
    }

    /// The stems this model produces.
    pub fn expected_stems(&self) -> &'static [StemType] {
        match self {
            ModelVariant::Htdemucs6s => &[
                StemType::Drums,
                StemType::Bass,
                StemType::Other,
                StemType::Vocals,
                StemType::Guitar,
                StemType::Piano,
            ],
            _ => &[
                StemType::Drums,
                StemType::Bass,
                StemType::Other,
                StemType::Vocals,
            ],
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "htdemucs" => Ok(ModelVariant::Htdemucs),
            "htdemucs_ft" => Ok(ModelVariant::HtdemucsFt),
            "htdemucs_6s" => Ok(ModelVariant::Htdemucs6s),
            "mdx" => Ok(ModelVariant::Mdx),
            "mdx_extra" => Ok(ModelVariant::MdxExtra),
            _ => Err(ModelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown model variant: {0}")]
pub struct ModelParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_names() {
        assert_eq!("htdemucs".parse::<ModelVariant>().unwrap(), ModelVariant::Htdemucs);
        assert_eq!("htdemucs_6s".parse::<ModelVariant>().unwrap(), ModelVariant::Htdemucs6s);
        assert!("spleeter".parse::<ModelVariant>().is_err());
    }

    #[test]
    fn wire_name_matches_cli_name() {
        for model in [
            ModelVariant::Htdemucs,
            ModelVariant::HtdemucsFt,
            ModelVariant::Htdemucs6s,
            ModelVariant::Mdx,
            ModelVariant::MdxExtra,
        ] {
            let json = serde_json::to_string(&model).unwrap();
            assert_eq!(json, format!("\"{}\"", model.as_str()));
        }
    }

    #[test]
    fn six_stem_model_adds_guitar_and_piano() {
        assert_eq!(ModelVariant::Htdemucs.expected_stems().len(), 4);
        assert_eq!(ModelVariant::Htdemucs6s.expected_stems().len(), 6);
    }
}
