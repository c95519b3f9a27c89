//! Heatmap renderer contract and the sound level legend.

use serde::{Deserialize, Serialize};

use crate::{BoundingRegion, WeightedPoint};

/// Color gradient keyed by normalized weight thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapGradient {
    /// Colors from quietest to loudest.
    pub colors: Vec<String>,
    /// Normalized weight at which each color starts. Same length as `colors`.
    pub start_points: Vec<f64>,
    /// Resolution of the interpolated color map.
    pub color_map_size: u32,
}

impl Default for HeatmapGradient {
    fn default() -> Self {
        Self {
            colors: ["green", "yellow", "orange", "red"]
                .into_iter()
                .map(String::from)
                .collect(),
            start_points: vec![0.01, 0.25, 0.5, 1.0],
            color_map_size: 200,
        }
    }
}

/// Display settings handed to the heatmap renderer alongside the points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapDisplay {
    /// Point radius in pixels.
    pub radius: u32,
    /// Layer opacity, 0 to 1.
    pub opacity: f64,
    /// Color gradient.
    pub gradient: HeatmapGradient,
}

impl Default for HeatmapDisplay {
    fn default() -> Self {
        Self {
            radius: 50,
            opacity: 0.7,
            gradient: HeatmapGradient::default(),
        }
    }
}

/// Everything the renderer needs for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapLayer {
    /// Region the points were computed for.
    pub region: BoundingRegion,
    /// Ordered samples.
    pub points: Vec<WeightedPoint>,
    /// Renderer settings.
    pub display: HeatmapDisplay,
}

/// One row of the map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendBand {
    /// Gradient color shown for this band.
    pub color: String,
    /// Human-readable label, e.g. `"65-79 dB"`.
    pub label: String,
    /// Lower bound in decibels (inclusive).
    pub min_db: u32,
    /// Upper bound in decibels (inclusive), `None` for the open top band.
    pub max_db: Option<u32>,
}

/// The map key, loudest band first.
#[must_use]
pub fn legend() -> Vec<LegendBand> {
    [
        ("red", 80, None),
        ("orange", 65, Some(79)),
        ("yellow", 50, Some(64)),
        ("green", 10, Some(49)),
    ]
    .into_iter()
    .map(|(color, min_db, max_db)| LegendBand {
        color: color.to_string(),
        label: max_db.map_or_else(|| format!("{min_db}+ dB"), |max| format!("{min_db}-{max} dB")),
        min_db,
        max_db,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_thresholds_align_with_colors() {
        let gradient = HeatmapGradient::default();
        assert_eq!(gradient.colors.len(), gradient.start_points.len());
        for window in gradient.start_points.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn legend_bands_do_not_overlap() {
        let bands = legend();
        assert_eq!(bands[0].label, "80+ dB");
        assert_eq!(bands[3].label, "10-49 dB");
        for window in bands.windows(2) {
            let lower = &window[1];
            assert_eq!(lower.max_db.map(|m| m + 1), Some(window[0].min_db));
        }
    }

    #[test]
    fn legend_colors_match_gradient() {
        let gradient = HeatmapGradient::default();
        let mut legend_colors: Vec<String> = legend().into_iter().map(|b| b.color).collect();
        legend_colors.reverse();
        assert_eq!(legend_colors, gradient.colors);
    }
}
