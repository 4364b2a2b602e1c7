//! Generation model catalog and spend accounting.
//!
//! Costs are tracked in micro-dollars so that per-job prices such as
//! $0.004 stay exact when summed.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::job::JobKind;

// =============================================================================
// Cost
// =============================================================================

/// Amount of money in micro-dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cost(u64);

impl Cost {
    pub const ZERO: Cost = Cost(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Convert a dollar amount, rounding to the nearest micro-dollar.
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() || dollars <= 0.0 {
            return Self::ZERO;
        }
        Self((dollars * 1_000_000.0).round() as u64)
    }

    pub fn micros(&self) -> u64 {
        self.0
    }

    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn times(&self, count: usize) -> Self {
        Self(self.0.saturating_mul(count as u64))
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Self {
        iter.fold(Cost::ZERO, |a, b| a + b)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.3}", self.as_dollars())
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Output framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
}

impl AspectRatio {
    /// Value sent to image models.
    pub fn image_param(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }

    /// Value sent to video models, which only know two framings.
    /// Square falls back to landscape.
    pub fn video_param(&self) -> &'static str {
        match self {
            AspectRatio::Portrait => "portrait",
            AspectRatio::Square | AspectRatio::Landscape => "landscape",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1:1" | "square" => Ok(AspectRatio::Square),
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" => Ok(AspectRatio::Portrait),
            other => Err(ModelError::invalid_field("aspect ratio", other)),
        }
    }
}

/// Output resolution for models that accept one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

impl FromStr for Resolution {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(Resolution::OneK),
            "2K" => Ok(Resolution::TwoK),
            "4K" => Ok(Resolution::FourK),
            other => Err(ModelError::invalid_field("resolution", other)),
        }
    }
}

/// Clip length for video models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoLength {
    #[default]
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "15")]
    Fifteen,
}

impl VideoLength {
    /// Value of the vendor's `n_frames` field.
    pub fn n_frames(&self) -> &'static str {
        match self {
            VideoLength::Ten => "10",
            VideoLength::Fifteen => "15",
        }
    }

    pub fn seconds(&self) -> u32 {
        match self {
            VideoLength::Ten => 10,
            VideoLength::Fifteen => 15,
        }
    }
}

impl FromStr for VideoLength {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "10" => Ok(VideoLength::Ten),
            "15" => Ok(VideoLength::Fifteen),
            other => Err(ModelError::invalid_field("video length", other)),
        }
    }
}

// =============================================================================
// Models
// =============================================================================

/// Hosted generation models the pipeline can submit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationModel {
    /// Fast text-to-image, no reference support
    ZImage,
    /// Reference-guided image generation
    NanoBananaPro,
    /// Image-to-video
    Sora2,
}

impl GenerationModel {
    pub const ALL: &'static [GenerationModel] = &[
        GenerationModel::ZImage,
        GenerationModel::NanoBananaPro,
        GenerationModel::Sora2,
    ];

    /// Name used on the command line.
    pub fn cli_name(&self) -> &'static str {
        match self {
            GenerationModel::ZImage => "z-image",
            GenerationModel::NanoBananaPro => "nano-banana-pro",
            GenerationModel::Sora2 => "sora-2",
        }
    }

    /// Identifier sent in the vendor's `model` field.
    pub fn vendor_id(&self) -> &'static str {
        match self {
            GenerationModel::ZImage => "z-image",
            GenerationModel::NanoBananaPro => "nano-banana-pro",
            GenerationModel::Sora2 => "sora-2-image-to-video",
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            GenerationModel::ZImage | GenerationModel::NanoBananaPro => JobKind::Image,
            GenerationModel::Sora2 => JobKind::Video,
        }
    }

    pub fn unit_cost(&self) -> Cost {
        match self {
            GenerationModel::ZImage => Cost::from_micros(4_000),
            GenerationModel::NanoBananaPro => Cost::from_micros(90_000),
            GenerationModel::Sora2 => Cost::from_micros(500_000),
        }
    }

    pub fn max_prompt_chars(&self) -> usize {
        match self {
            GenerationModel::ZImage => 1_000,
            GenerationModel::NanoBananaPro | GenerationModel::Sora2 => 10_000,
        }
    }

    pub fn supports_reference_image(&self) -> bool {
        !matches!(self, GenerationModel::ZImage)
    }

    pub fn supports_resolution(&self) -> bool {
        matches!(self, GenerationModel::NanoBananaPro)
    }

    pub fn default_aspect_ratio(&self) -> AspectRatio {
        match self {
            GenerationModel::Sora2 => AspectRatio::Landscape,
            _ => AspectRatio::Square,
        }
    }

    /// Cheapest model producing `kind`.
    pub fn cheapest(kind: JobKind) -> GenerationModel {
        Self::ALL
            .iter()
            .copied()
            .filter(|m| m.kind() == kind)
            .min_by_key(|m| m.unit_cost())
            .unwrap_or(match kind {
                JobKind::Image => GenerationModel::ZImage,
                JobKind::Video => GenerationModel::Sora2,
            })
    }

    pub fn estimate(&self, count: usize) -> CostEstimate {
        CostEstimate {
            model: *self,
            count,
            unit: self.unit_cost(),
            total: self.unit_cost().times(count),
        }
    }
}

impl fmt::Display for GenerationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for GenerationModel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.cli_name() == s || m.vendor_id() == s)
            .ok_or(ModelError::UnknownModel(s))
    }
}

/// Projected spend for a batch of submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: GenerationModel,
    pub count: usize,
    pub unit: Cost,
    pub total: Cost,
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {} @ {} = {}",
            self.count, self.model, self.unit, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_display_and_sum() {
        let total: Cost = vec![Cost::from_micros(4_000), Cost::from_micros(90_000)]
            .into_iter()
            .sum();
        assert_eq!(total.micros(), 94_000);
        assert_eq!(total.to_string(), "$0.094");
        assert_eq!(Cost::from_dollars(0.5), Cost::from_micros(500_000));
        assert_eq!(Cost::from_dollars(-1.0), Cost::ZERO);
    }

    #[test]
    fn test_model_lookup() {
        assert_eq!("sora-2".parse::<GenerationModel>().unwrap(), GenerationModel::Sora2);
        assert_eq!(
            "sora-2-image-to-video".parse::<GenerationModel>().unwrap(),
            GenerationModel::Sora2
        );
        assert!("dall-e".parse::<GenerationModel>().is_err());
    }

    #[test]
    fn test_cheapest_per_kind() {
        assert_eq!(GenerationModel::cheapest(JobKind::Image), GenerationModel::ZImage);
        assert_eq!(GenerationModel::cheapest(JobKind::Video), GenerationModel::Sora2);
    }

    #[test]
    fn test_estimate() {
        let est = GenerationModel::NanoBananaPro.estimate(3);
        assert_eq!(est.total, Cost::from_micros(270_000));
        assert_eq!(est.to_string(), "3 x nano-banana-pro @ $0.090 = $0.270");
    }

    #[test]
    fn test_aspect_ratio_params() {
        let ratio: AspectRatio = "portrait".parse().unwrap();
        assert_eq!(ratio.image_param(), "9:16");
        assert_eq!(ratio.video_param(), "portrait");
        assert_eq!(AspectRatio::Square.video_param(), "landscape");
    }

    #[test]
    fn test_model_capabilities() {
        assert!(!GenerationModel::ZImage.supports_reference_image());
        assert!(GenerationModel::NanoBananaPro.supports_resolution());
        assert_eq!(GenerationModel::ZImage.max_prompt_chars(), 1_000);
        assert_eq!(GenerationModel::Sora2.kind(), JobKind::Video);
    }
}
