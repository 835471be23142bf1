//! Target raster format configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unknown encoder '{0}', expected one of webp, jpeg, png, avif")]
    UnknownEncoder(String),

    #[error("Quality {value} out of range {min}..={max} for {encoder}")]
    QualityOutOfRange {
        encoder: Encoder,
        value: u8,
        min: u8,
        max: u8,
    },

    #[error("Effort {value} exceeds maximum {max} for {encoder}")]
    EffortOutOfRange { encoder: Encoder, value: u8, max: u8 },

    #[error("Compression level {0} exceeds maximum 9")]
    CompressionOutOfRange(u8),
}

/// Output encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    #[default]
    Webp,
    Jpeg,
    Png,
    Avif,
}

impl Encoder {
    /// File extension written for this encoder, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Encoder::Webp => "webp",
            Encoder::Jpeg => "jpeg",
            Encoder::Png => "png",
            Encoder::Avif => "avif",
        }
    }

    /// Effort used when none is configured
    fn default_effort(&self) -> Option<u8> {
        match self {
            Encoder::Webp => Some(6),
            Encoder::Avif => Some(4),
            Encoder::Jpeg | Encoder::Png => None,
        }
    }

    fn max_effort(&self) -> Option<u8> {
        match self {
            Encoder::Webp => Some(6),
            Encoder::Avif => Some(9),
            Encoder::Jpeg | Encoder::Png => None,
        }
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Encoder {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(Encoder::Webp),
            "jpeg" | "jpg" => Ok(Encoder::Jpeg),
            "png" => Ok(Encoder::Png),
            "avif" => Ok(Encoder::Avif),
            other => Err(FormatError::UnknownEncoder(other.to_string())),
        }
    }
}

/// Encoder plus its numeric parameters.
///
/// `quality` is ignored by png, `compression_level` only applies to png and
/// `effort` only to webp (0-6) and avif (0-9).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FormatConfig {
    #[serde(default)]
    pub encoder: Encoder,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub effort: Option<u8>,
    #[serde(default)]
    pub compression_level: Option<u8>,
    #[serde(default)]
    pub lossless: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            encoder: Encoder::Webp,
            quality: default_quality(),
            effort: None,
            compression_level: None,
            lossless: false,
        }
    }
}

fn default_quality() -> u8 {
    80
}

impl FormatConfig {
    pub fn new(encoder: Encoder, quality: u8) -> Self {
        Self {
            encoder,
            quality,
            effort: None,
            compression_level: None,
            lossless: false,
        }
    }

    pub fn extension(&self) -> &'static str {
        self.encoder.extension()
    }

    /// Configured effort, else the encoder's default
    pub fn effective_effort(&self) -> Option<u8> {
        self.effort.or_else(|| self.encoder.default_effort())
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        let min = match self.encoder {
            Encoder::Webp => 0,
            _ => 1,
        };
        if self.encoder != Encoder::Png && !(min..=100).contains(&self.quality) {
            return Err(FormatError::QualityOutOfRange {
                encoder: self.encoder,
                value: self.quality,
                min,
                max: 100,
            });
        }

        if let (Some(effort), Some(max)) = (self.effort, self.encoder.max_effort()) {
            if effort > max {
                return Err(FormatError::EffortOutOfRange {
                    encoder: self.encoder,
                    value: effort,
                    max,
                });
            }
        }

        match self.compression_level {
            Some(level) if level > 9 => Err(FormatError::CompressionOutOfRange(level)),
            _ => Ok(()),
        }
    }
}
