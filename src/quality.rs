//! # Quality Tiers
//!
//! A batch run uses exactly one tier. Each tier maps to the numeric
//! parameters of every codec tool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compression aggressiveness selected for a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Smallest files, most visible loss
    Low,
    #[default]
    Medium,
    /// Largest files, least visible loss
    High,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Low, Quality::Medium, Quality::High];

    /// Quality range passed to pngquant as `--quality=<lo>-<hi>`
    pub fn png_quality_range(self) -> &'static str {
        match self {
            Quality::Low => "40-60",
            Quality::Medium => "60-80",
            Quality::High => "75-90",
        }
    }

    /// cjpeg `-quality` value (0-100)
    pub fn jpeg_quality(self) -> u8 {
        match self {
            Quality::Low => 60,
            Quality::Medium => 75,
            Quality::High => 85,
        }
    }

    /// cwebp `-q` value (0-100)
    pub fn webp_quality(self) -> u8 {
        match self {
            Quality::Low => 60,
            Quality::Medium => 75,
            Quality::High => 85,
        }
    }

    /// gifsicle `-O<level>`; lower visual quality means heavier optimization
    pub fn gif_optimize_level(self) -> u8 {
        match self {
            Quality::Low => 3,
            Quality::Medium => 2,
            Quality::High => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(format!("unknown quality tier '{}' (expected low, medium or high)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gif_level_is_inverse_of_tier() {
        assert!(Quality::Low.gif_optimize_level() > Quality::Medium.gif_optimize_level());
        assert!(Quality::Medium.gif_optimize_level() > Quality::High.gif_optimize_level());
    }

    #[test]
    fn test_jpeg_webp_values_in_range() {
        for tier in Quality::ALL {
            assert!(tier.jpeg_quality() <= 100);
            assert!(tier.webp_quality() <= 100);
        }
        assert_eq!(Quality::Medium.png_quality_range(), "60-80");
    }

    #[test]
    fn test_parse_round_trip() {
        assert_eq!("HIGH".parse::<Quality>(), Ok(Quality::High));
        assert!("ultra".parse::<Quality>().is_err());
        assert_eq!(Quality::default(), Quality::Medium);
    }
}
